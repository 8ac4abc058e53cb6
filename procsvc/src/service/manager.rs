//! Service - Control managers
//! ==========================
//!
//! A [`ServiceControlManager`] attaches a session to whatever delivers
//! control events and blocks until the service is done.
//!
//! | Manager                  | Controls come from                         |
//! |--------------------------|--------------------------------------------|
//! | `WindowsServiceManager`  | the Service Control Manager (Windows only) |
//! | `SignalControlManager`   | `SIGINT` / `SIGTERM` (Unix only)           |
//! | [`ManualControlManager`] | a [`ControlInjector`] held by the embedder |

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, mpsc},
    thread,
    time::Duration,
};

use super::{control::*, error::*, session::ControlHandler};
use crate::process::OsError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publishes a service status to the control manager.
pub trait StatusReporter {
    fn report(&self, status: &ServiceStatus) -> std::result::Result<(), OsError>;
}

pub trait ServiceControlManager: Send {
    /// Registers the handler's service and runs the dispatch loop. Returns
    /// once the service has stopped, or with an error if registration failed.
    fn dispatch(self: Box<Self>, handler: ControlHandler) -> Result<()>;
}

/// The manager `serve` uses when the host does not pick one.
pub fn default_manager() -> Box<dyn ServiceControlManager> {
    #[cfg(windows)]
    return Box::new(WindowsServiceManager);
    #[cfg(unix)]
    return Box::new(SignalControlManager);
}

/// Reporter that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn report(&self, status: &ServiceStatus) -> std::result::Result<(), OsError> {
        crate::info!(
            "service status: {} (controls {})",
            status.state,
            status.controls_accepted
        );
        Ok(())
    }
}

// ── manual ───────────────────────────────────────────────────────────────

struct Injected {
    code: u32,
    reply: mpsc::SyncSender<ServiceState>,
}

#[derive(Default)]
struct StatusLog {
    statuses: Mutex<Vec<ServiceStatus>>,
    changed: Condvar,
}

/// In-process manager driven through a [`ControlInjector`].
pub struct ManualControlManager {
    requests: mpsc::Receiver<Injected>,
    registration: std::result::Result<(), OsError>,
    reject_preshutdown: bool,
    log: Arc<StatusLog>,
}

/// Delivers control codes to a [`ManualControlManager`].
#[derive(Clone)]
pub struct ControlInjector {
    requests: mpsc::Sender<Injected>,
    log: Arc<StatusLog>,
}

impl ManualControlManager {
    pub fn new() -> (Self, ControlInjector) {
        Self::build(Ok(()), false)
    }

    /// A manager whose registration fails with `code`.
    pub fn failing(code: i32) -> (Self, ControlInjector) {
        Self::build(Err(OsError::new(code)), false)
    }

    /// A manager that refuses any status accepting pre-shutdown, as older
    /// Windows releases do.
    pub fn rejecting_preshutdown() -> (Self, ControlInjector) {
        Self::build(Ok(()), true)
    }

    fn build(
        registration: std::result::Result<(), OsError>,
        reject_preshutdown: bool,
    ) -> (Self, ControlInjector) {
        let (tx, rx) = mpsc::channel();
        let log = Arc::new(StatusLog::default());
        let manager = Self {
            requests: rx,
            registration,
            reject_preshutdown,
            log: Arc::clone(&log),
        };
        (manager, ControlInjector { requests: tx, log })
    }
}

struct RecordingReporter<'a> {
    log: &'a StatusLog,
    reject_preshutdown: bool,
}

impl StatusReporter for RecordingReporter<'_> {
    fn report(&self, status: &ServiceStatus) -> std::result::Result<(), OsError> {
        if self.reject_preshutdown && status.controls_accepted.contains(ControlMask::PRESHUTDOWN) {
            return Err(OsError::invalid_parameter());
        }
        lock(&self.log.statuses).push(*status);
        self.log.changed.notify_all();
        Ok(())
    }
}

impl ServiceControlManager for ManualControlManager {
    fn dispatch(self: Box<Self>, handler: ControlHandler) -> Result<()> {
        let Self {
            requests,
            registration,
            reject_preshutdown,
            log,
        } = *self;
        registration?;
        let reporter = RecordingReporter {
            log: &log,
            reject_preshutdown,
        };
        handler.report_running(&reporter)?;

        for Injected { code, reply } in requests.iter() {
            let state = handler.handle_control(code, &reporter);
            let _ = reply.send(state);
            if state == ServiceState::Stopped {
                break;
            }
        }
        Ok(())
    }
}

impl ControlInjector {
    /// Delivers `code` and blocks until the control has been acknowledged
    /// and the resulting status published. Returns that state.
    pub fn send(&self, code: u32) -> Result<ServiceState> {
        let (reply, replied) = mpsc::sync_channel(1);
        self.requests
            .send(Injected { code, reply })
            .map_err(|_| ServiceError::Disconnected)?;
        replied.recv().map_err(|_| ServiceError::Disconnected)
    }

    /// Sends `Stop` from a helper thread, for hosts whose own thread must
    /// stay free to run the control command.
    pub fn stop_in_background(&self) -> thread::JoinHandle<Result<ServiceState>> {
        let injector = self.clone();
        thread::spawn(move || injector.send(ControlCode::Stop.raw()))
    }

    /// Every status published so far, oldest first.
    pub fn statuses(&self) -> Vec<ServiceStatus> {
        lock(&self.log.statuses).clone()
    }

    /// Blocks until `Running` has been published or `timeout` passed.
    pub fn wait_until_running(&self, timeout: Duration) -> bool {
        let statuses = lock(&self.log.statuses);
        let (statuses, _) = self
            .log
            .changed
            .wait_timeout_while(statuses, timeout, |s| {
                !s.iter().any(|status| status.state == ServiceState::Running)
            })
            .unwrap_or_else(PoisonError::into_inner);
        statuses.iter().any(|status| status.state == ServiceState::Running)
    }
}

// ── unix signals ─────────────────────────────────────────────────────────

#[cfg(unix)]
pub use signals::SignalControlManager;

#[cfg(unix)]
mod signals {
    use std::sync::{Mutex, OnceLock, mpsc};

    use super::*;

    static ROUTE: Mutex<Option<mpsc::Sender<()>>> = Mutex::new(None);
    static INSTALLED: OnceLock<std::result::Result<(), String>> = OnceLock::new();

    /// Turns `SIGINT`/`SIGTERM` into a `Stop` control (or `Shutdown` when
    /// only that is accepted). Without a running session the signal ends the
    /// process as usual.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SignalControlManager;

    fn install() -> std::result::Result<(), String> {
        INSTALLED
            .get_or_init(|| {
                ctrlc::set_handler(|| {
                    let delivered = lock(&ROUTE)
                        .as_ref()
                        .is_some_and(|route| route.send(()).is_ok());
                    if !delivered {
                        std::process::exit(130);
                    }
                })
                .map_err(|e| e.to_string())
            })
            .clone()
    }

    impl ServiceControlManager for SignalControlManager {
        fn dispatch(self: Box<Self>, handler: ControlHandler) -> Result<()> {
            install().map_err(|reason| ServiceError::Registration { reason })?;

            let (tx, signals) = mpsc::channel();
            *lock(&ROUTE) = Some(tx);
            let result = run(&handler, &signals);
            lock(&ROUTE).take();
            result
        }
    }

    fn run(handler: &ControlHandler, signals: &mpsc::Receiver<()>) -> Result<()> {
        handler.report_running(&LogReporter)?;
        crate::info!(
            "Service '{}' running; SIGINT/SIGTERM stops it",
            handler.service_name()
        );

        while signals.recv().is_ok() {
            let accepted = handler.controls_accepted();
            let code = if accepted.contains(ControlMask::STOP) {
                ControlCode::Stop
            } else if accepted.contains(ControlMask::SHUTDOWN) {
                ControlCode::Shutdown
            } else {
                crate::warn!("'{}' accepts neither stop nor shutdown", handler.service_name());
                continue;
            };
            if handler.handle_control(code.raw(), &LogReporter) == ServiceState::Stopped {
                break;
            }
        }
        Ok(())
    }
}

// ── windows scm ──────────────────────────────────────────────────────────

#[cfg(windows)]
pub use scm::WindowsServiceManager;

#[cfg(windows)]
mod scm {
    use std::sync::Mutex;

    use windows::{
        Win32::{
            Foundation::{ERROR_CALL_NOT_IMPLEMENTED, NO_ERROR},
            System::Services::{
                RegisterServiceCtrlHandlerExW, SERVICE_CONTROL_INTERROGATE, SERVICE_PAUSED,
                SERVICE_RUNNING, SERVICE_START_PENDING, SERVICE_STATUS, SERVICE_STATUS_CURRENT_STATE,
                SERVICE_STATUS_HANDLE, SERVICE_STOPPED, SERVICE_TABLE_ENTRYW,
                SERVICE_WIN32_OWN_PROCESS, SetServiceStatus, StartServiceCtrlDispatcherW,
            },
        },
        core::{PCWSTR, PWSTR},
    };

    use super::*;

    // the SCM callbacks carry no Rust state, so the handler lives here
    static HANDLER: Mutex<Option<ControlHandler>> = Mutex::new(None);
    static STATUS_HANDLE: Mutex<Option<usize>> = Mutex::new(None);

    /// Attaches to the Windows Service Control Manager.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct WindowsServiceManager;

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    impl ServiceControlManager for WindowsServiceManager {
        fn dispatch(self: Box<Self>, handler: ControlHandler) -> Result<()> {
            let mut name = wide(handler.service_name());
            *lock(&HANDLER) = Some(handler);

            let table = [
                SERVICE_TABLE_ENTRYW {
                    lpServiceName: PWSTR(name.as_mut_ptr()),
                    lpServiceProc: Some(service_main),
                },
                SERVICE_TABLE_ENTRYW::default(),
            ];
            let result = unsafe { StartServiceCtrlDispatcherW(table.as_ptr()) }
                .map_err(|e| ServiceError::Os(OsError::from_win(&e)));

            lock(&HANDLER).take();
            lock(&STATUS_HANDLE).take();
            result
        }
    }

    unsafe extern "system" fn service_main(_argc: u32, _argv: *mut PWSTR) {
        let Some(handler) = lock(&HANDLER).clone() else {
            return;
        };
        let name = wide(handler.service_name());

        let registered = unsafe {
            RegisterServiceCtrlHandlerExW(PCWSTR(name.as_ptr()), Some(control_handler), None)
        };
        let status_handle = match registered {
            Ok(h) => h,
            Err(e) => {
                crate::error!("RegisterServiceCtrlHandlerExW failed: {e}");
                return;
            }
        };
        *lock(&STATUS_HANDLE) = Some(status_handle.0 as usize);

        if let Err(e) = handler.report_running(&ScmReporter(status_handle)) {
            crate::error!("SetServiceStatus(running) failed: {e}");
            return;
        }
        handler.wait_until_stopped();
    }

    unsafe extern "system" fn control_handler(
        control: u32,
        _event_type: u32,
        _event_data: *mut core::ffi::c_void,
        _context: *mut core::ffi::c_void,
    ) -> u32 {
        if control == SERVICE_CONTROL_INTERROGATE {
            return NO_ERROR.0;
        }
        let handler = lock(&HANDLER).clone();
        let status_handle = *lock(&STATUS_HANDLE);
        match (handler, status_handle) {
            (Some(handler), Some(raw)) => {
                let reporter = ScmReporter(SERVICE_STATUS_HANDLE(raw as *mut core::ffi::c_void));
                handler.handle_control(control, &reporter);
                NO_ERROR.0
            }
            _ => ERROR_CALL_NOT_IMPLEMENTED.0,
        }
    }

    struct ScmReporter(SERVICE_STATUS_HANDLE);

    fn current_state(state: ServiceState) -> SERVICE_STATUS_CURRENT_STATE {
        match state {
            ServiceState::StartPending => SERVICE_START_PENDING,
            ServiceState::Running => SERVICE_RUNNING,
            ServiceState::Paused => SERVICE_PAUSED,
            ServiceState::Stopped => SERVICE_STOPPED,
        }
    }

    impl StatusReporter for ScmReporter {
        fn report(&self, status: &ServiceStatus) -> std::result::Result<(), OsError> {
            let raw = SERVICE_STATUS {
                dwServiceType: SERVICE_WIN32_OWN_PROCESS,
                dwCurrentState: current_state(status.state),
                dwControlsAccepted: status.controls_accepted.bits(),
                dwWin32ExitCode: NO_ERROR.0,
                dwServiceSpecificExitCode: 0,
                dwCheckPoint: status.checkpoint,
                dwWaitHint: status.wait_hint,
            };
            unsafe { SetServiceStatus(self.0, &raw) }.map_err(|e| OsError::from_win(&e))
        }
    }
}
