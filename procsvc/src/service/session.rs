//! Service - Session
//! =================
//!
//! The one service registration a process may hold.
//!
//! [`serve`] validates the request, claims the process-wide slot and starts
//! the `service-dispatcher` thread, which hands a [`ControlHandler`] to a
//! [`ServiceControlManager`] and blocks in its dispatch loop. It returns as
//! soon as the thread exists; registration failures surface later, when the
//! thread ends and the session tears itself down.
//!
//! ```text
//!  serve ──→ slot claimed ──→ dispatcher thread
//!                               └─ manager.dispatch(handler)   (blocks)
//!                                    ├─ handler.report_running()
//!                                    └─ handler.handle_control(code) …
//!                               └─ teardown: sink released, slot freed
//! ```
//!
//! Teardown is the only path that frees the slot.

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread,
    time::Duration,
};

use bon::Builder;

use super::{control::*, error::*, manager::*, rendezvous::*};
use crate::process::OsError;

static ACTIVE: Mutex<Option<Arc<SessionShared>>> = Mutex::new(None);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Arguments of [`serve`].
#[derive(Debug, Clone, Builder)]
pub struct ServeRequest {
    #[builder(into)]
    pub name: String,
    /// Raw accepted-controls mask; validated by [`serve`].
    pub mask: i64,
    /// Command the control code is appended to.
    #[builder(into)]
    pub command_template: String,
}

#[derive(Debug, Clone)]
pub enum ServeStatus {
    Started(ServiceSession),
    AlreadyRunning,
}

impl ServeStatus {
    /// `0` when started, `1` when another session is running.
    pub fn code(&self) -> i64 {
        match self {
            Self::Started(_) => 0,
            Self::AlreadyRunning => 1,
        }
    }
}

struct SessionShared {
    name: String,
    command_template: String,
    status: Mutex<ServiceStatus>,
    stopped: Condvar,
    sink: Mutex<Option<Arc<dyn ControlSink>>>,
    // one control at a time
    delivery: Mutex<()>,
    finished: Mutex<Option<std::result::Result<(), ServiceError>>>,
    finished_cv: Condvar,
}

impl SessionShared {
    fn new(request: ServeRequest, accepted: ControlMask, sink: Arc<dyn ControlSink>) -> Self {
        Self {
            name: request.name,
            command_template: request.command_template,
            status: Mutex::new(ServiceStatus::start_pending(accepted)),
            stopped: Condvar::new(),
            sink: Mutex::new(Some(sink)),
            delivery: Mutex::new(()),
            finished: Mutex::new(None),
            finished_cv: Condvar::new(),
        }
    }

    fn teardown(self: &Arc<Self>, outcome: std::result::Result<(), ServiceError>) {
        lock(&self.sink).take();
        {
            let mut status = lock(&self.status);
            status.state = ServiceState::Stopped;
            self.stopped.notify_all();
        }
        {
            let mut active = lock(&ACTIVE);
            if active.as_ref().is_some_and(|a| Arc::ptr_eq(a, self)) {
                *active = None;
            }
        }
        *lock(&self.finished) = Some(outcome);
        self.finished_cv.notify_all();
        crate::info!("Service '{}' torn down", self.name);
    }
}

/// Starts a service session.
///
/// The mask is checked before anything else. While another session is
/// active this returns [`ServeStatus::AlreadyRunning`] and changes nothing.
/// Failing to start the dispatcher thread is an [`ServiceError::Os`] and
/// leaves no session behind.
pub fn serve(
    request: ServeRequest,
    sink: Arc<dyn ControlSink>,
    manager: Box<dyn ServiceControlManager>,
) -> Result<ServeStatus> {
    let accepted = ControlMask::from_bits(request.mask)?;

    let mut active = lock(&ACTIVE);
    if let Some(existing) = active.as_ref() {
        crate::info!(
            "serve '{}' ignored: service '{}' is already running",
            request.name,
            existing.name
        );
        return Ok(ServeStatus::AlreadyRunning);
    }

    let shared = Arc::new(SessionShared::new(request, accepted, sink));
    let dispatched = Arc::clone(&shared);
    let spawned = thread::Builder::new()
        .name("service-dispatcher".to_owned())
        .spawn(move || run_dispatcher(dispatched, manager));

    match spawned {
        Ok(_detached) => {
            *active = Some(Arc::clone(&shared));
            crate::info!(
                "Service '{}' dispatching (controls {accepted})",
                shared.name
            );
            Ok(ServeStatus::Started(ServiceSession { shared }))
        }
        Err(e) => {
            crate::error!("Failed to start the dispatcher for '{}': {e}", shared.name);
            lock(&shared.sink).take();
            Err(ServiceError::Os(OsError::from_io(&e)))
        }
    }
}

fn run_dispatcher(shared: Arc<SessionShared>, manager: Box<dyn ServiceControlManager>) {
    let handler = ControlHandler {
        shared: Arc::clone(&shared),
    };
    let outcome = manager.dispatch(handler);
    match &outcome {
        Ok(()) => crate::info!("Dispatch loop for '{}' returned", shared.name),
        Err(e) => crate::error!("Dispatch loop for '{}' failed: {e}", shared.name),
    }
    shared.teardown(outcome);
}

/// The session currently holding the slot, if any.
pub fn active_session() -> Option<ServiceSession> {
    lock(&ACTIVE)
        .as_ref()
        .map(|shared| ServiceSession {
            shared: Arc::clone(shared),
        })
}

/// Caller's view of a started session.
#[derive(Clone)]
pub struct ServiceSession {
    shared: Arc<SessionShared>,
}

impl ServiceSession {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn command_template(&self) -> &str {
        &self.shared.command_template
    }

    pub fn status(&self) -> ServiceStatus {
        *lock(&self.shared.status)
    }

    pub fn state(&self) -> ServiceState {
        self.status().state
    }

    /// `true` until the dispatcher thread has torn the session down.
    pub fn is_active(&self) -> bool {
        lock(&self.shared.finished).is_none()
    }

    /// Blocks until teardown and returns how the dispatch loop ended.
    pub fn wait(&self) -> Result<()> {
        let mut finished = lock(&self.shared.finished);
        loop {
            if let Some(outcome) = finished.as_ref() {
                return outcome.clone();
            }
            finished = self
                .shared
                .finished_cv
                .wait(finished)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`ServiceSession::wait`], giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<()>> {
        let finished = lock(&self.shared.finished);
        let (finished, _) = self
            .shared
            .finished_cv
            .wait_timeout_while(finished, timeout, |f| f.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        finished.clone()
    }

    pub fn same_session(&self, other: &ServiceSession) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl std::fmt::Debug for ServiceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceSession")
            .field("name", &self.shared.name)
            .field("status", &self.status())
            .field("active", &self.is_active())
            .finish()
    }
}

/// The session's side of a control manager: what a manager calls when the
/// service starts and whenever a control arrives.
#[derive(Clone)]
pub struct ControlHandler {
    shared: Arc<SessionShared>,
}

impl ControlHandler {
    pub fn service_name(&self) -> &str {
        &self.shared.name
    }

    pub fn controls_accepted(&self) -> ControlMask {
        lock(&self.shared.status).controls_accepted
    }

    pub fn status(&self) -> ServiceStatus {
        *lock(&self.shared.status)
    }

    /// Publishes `Running`. If that is refused while pre-shutdown is among
    /// the accepted controls, it is retried once without it.
    pub fn report_running(&self, reporter: &dyn StatusReporter) -> std::result::Result<(), OsError> {
        let mut status = lock(&self.shared.status);
        status.state = ServiceState::Running;
        status.checkpoint = 0;
        status.wait_hint = 0;

        match reporter.report(&status) {
            Ok(()) => Ok(()),
            Err(e) if status.controls_accepted.contains(ControlMask::PRESHUTDOWN) => {
                crate::warn!(
                    "'{}' refused pre-shutdown ({e}); retrying without it",
                    self.shared.name
                );
                status.controls_accepted = status.controls_accepted.without(ControlMask::PRESHUTDOWN);
                reporter.report(&status)
            }
            Err(e) => Err(e),
        }
    }

    /// Delivers one control: marks it for the interpreter thread, waits for
    /// the acknowledgement, then updates and publishes the status. Returns
    /// the state after the control.
    ///
    /// Interrogate returns at once. Controls are handled one at a time.
    pub fn handle_control(&self, code: u32, reporter: &dyn StatusReporter) -> ServiceState {
        if code == ControlCode::Interrogate.raw() {
            return self.status().state;
        }

        let _serial = lock(&self.shared.delivery);
        let command = format!("{} {code}", self.shared.command_template);
        crate::info!("Service '{}' received control {code}", self.shared.name);

        let (request, acked) = ControlRequest::new(code, command);
        let sink = lock(&self.shared.sink).clone();
        let marked = match sink {
            Some(sink) => sink.mark(request),
            None => false,
        };
        if !marked {
            crate::warn!(
                "Control {code} for '{}' had no interpreter to run it",
                self.shared.name
            );
        }
        // the sender lives inside the request; once it is gone recv returns
        let _ = acked.recv();

        let mut status = lock(&self.shared.status);
        status.checkpoint = 0;
        status.wait_hint = 0;
        if let Some(next) = ControlCode::from_raw(code).and_then(ControlCode::target_state) {
            status.state = next;
        }
        if let Err(e) = reporter.report(&status) {
            crate::warn!("Publishing status of '{}' failed: {e}", self.shared.name);
        }
        if status.state == ServiceState::Stopped {
            self.shared.stopped.notify_all();
        }
        status.state
    }

    /// Blocks until a control has moved the service to `Stopped`.
    pub fn wait_until_stopped(&self) {
        let mut status = lock(&self.shared.status);
        while status.state != ServiceState::Stopped {
            status = self
                .shared
                .stopped
                .wait(status)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
