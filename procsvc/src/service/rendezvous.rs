//! Service - Rendezvous
//! ====================
//!
//! The hand-off between the thread the OS delivers controls on and the thread
//! that owns the command interpreter.
//!
//! A [`ControlRequest`] carries the command to run and an acknowledgement.
//! The control thread *marks* it on a [`ControlSink`] and blocks until the
//! acknowledgement fires; the interpreter thread picks it up during its
//! normal event processing and calls [`ControlRequest::complete`].
//!
//! The acknowledgement fires when the request is dropped, so a request that
//! is discarded (queue closed, host shutting down) never leaves the control
//! thread blocked.

use std::sync::mpsc;

use crate::binding::{CommandError, Value};

/// Anything that can run one command line on its own thread.
pub trait CommandInterpreter {
    fn eval(&mut self, command: &str) -> Result<Value, CommandError>;
}

#[derive(Debug)]
struct Acknowledgement(Option<mpsc::SyncSender<()>>);

impl Drop for Acknowledgement {
    fn drop(&mut self) {
        if let Some(ack) = self.0.take() {
            let _ = ack.send(());
        }
    }
}

/// One control event waiting to be run by the interpreter thread.
#[derive(Debug)]
pub struct ControlRequest {
    code: u32,
    command: String,
    ack: Acknowledgement,
}

impl ControlRequest {
    /// Creates a request and the receiver its acknowledgement arrives on.
    pub fn new(code: u32, command: impl Into<String>) -> (Self, mpsc::Receiver<()>) {
        let (ack, acked) = mpsc::sync_channel(1);
        let request = Self {
            code,
            command: command.into(),
            ack: Acknowledgement(Some(ack)),
        };
        (request, acked)
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Runs the command on `interp`, then acknowledges. The command's own
    /// failure does not prevent the acknowledgement.
    pub fn complete<I>(self, interp: &mut I) -> Result<Value, CommandError>
    where
        I: CommandInterpreter + ?Sized,
    {
        crate::debug!("running control command '{}'", self.command);
        let result = interp.eval(&self.command);
        if let Err(e) = &result {
            crate::warn!("control command '{}' failed: {e}", self.command);
        }
        drop(self);
        result
    }
}

/// Where control requests are marked for the interpreter thread.
pub trait ControlSink: Send + Sync {
    /// Queues `request`. Returns `false` when nobody will ever run it; the
    /// request has then been dropped and thereby acknowledged.
    fn mark(&self, request: ControlRequest) -> bool;
}

impl ControlSink for mpsc::Sender<ControlRequest> {
    fn mark(&self, request: ControlRequest) -> bool {
        self.send(request).is_ok()
    }
}

impl ControlSink for mpsc::SyncSender<ControlRequest> {
    fn mark(&self, request: ControlRequest) -> bool {
        self.send(request).is_ok()
    }
}
