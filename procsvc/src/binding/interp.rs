//! Binding - Interpreter
//! =====================
//!
//! A small, single-threaded command interpreter. A line is split into words
//! (see [`split_words`](super::value::split_words)); the first word names a
//! registered command, which receives the words as [`Args`] and returns a
//! [`Value`] or raises a [`CommandError`].
//!
//! The interpreter also owns the host-side plumbing of service control: the
//! [`ControlSink`] that `serve` hands to a session, and the factory that
//! picks the [`ServiceControlManager`]. With the default sink, control
//! requests queue inside the interpreter and are run by
//! [`Interp::process_pending_controls`] / [`Interp::wait_for_control`];
//! a host with its own event loop installs its own sink instead.

use std::{
    collections::BTreeMap,
    sync::{Arc, mpsc},
};

use super::{error::*, value::*};
use crate::service::{
    CommandInterpreter, ControlRequest, ControlSink, ServiceControlManager, ServiceRegistry,
    ServiceSession, default_manager,
};

pub type CommandFn = fn(&mut Interp, &Args<'_>) -> Result<Value, CommandError>;

/// How many arguments a command takes, not counting its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(self, count: usize) -> bool {
        match self {
            Self::Exact(n) => count == n,
            Self::Range(min, max) => (min..=max).contains(&count),
            Self::AtLeast(min) => count >= min,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub arity: Arity,
    pub usage: &'static str,
    pub help: &'static str,
    pub run: CommandFn,
}

pub type ManagerFactory = Box<dyn FnMut() -> Box<dyn ServiceControlManager>>;

pub struct Interp {
    commands: BTreeMap<&'static str, CommandSpec>,
    registry: ServiceRegistry,
    control_sink: Arc<dyn ControlSink>,
    pending_controls: Option<mpsc::Receiver<ControlRequest>>,
    manager_factory: ManagerFactory,
    session: Option<ServiceSession>,
    started_sessions: Vec<ServiceSession>,
    exit_code: Option<i32>,
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

impl Interp {
    /// An interpreter with every built-in command registered.
    pub fn new() -> Self {
        let mut interp = Self::empty();
        crate::commands::register_all(&mut interp);
        interp
    }

    /// An interpreter with no commands.
    pub fn empty() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            commands: BTreeMap::new(),
            registry: ServiceRegistry::system(),
            control_sink: Arc::new(tx),
            pending_controls: Some(rx),
            manager_factory: Box::new(default_manager),
            session: None,
            started_sessions: Vec::new(),
            exit_code: None,
        }
    }

    pub fn with_registry(mut self, registry: ServiceRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Routes control requests to `sink`. The internal queue is dropped.
    pub fn with_control_sink(mut self, sink: Arc<dyn ControlSink>) -> Self {
        self.control_sink = sink;
        self.pending_controls = None;
        self
    }

    pub fn with_manager_factory<F>(mut self, factory: F) -> Self
    where
        F: FnMut() -> Box<dyn ServiceControlManager> + 'static,
    {
        self.manager_factory = Box::new(factory);
        self
    }

    pub fn register(
        &mut self,
        name: &'static str,
        arity: Arity,
        usage: &'static str,
        help: &'static str,
        run: CommandFn,
    ) {
        self.commands.insert(
            name,
            CommandSpec {
                name,
                arity,
                usage,
                help,
                run,
            },
        );
    }

    pub fn command(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name)
    }

    /// Registered commands in name order.
    pub fn commands(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.values()
    }

    pub fn eval(&mut self, line: &str) -> Result<Value, CommandError> {
        let words = split_words(line)?;
        self.eval_words(&words)
    }

    /// Runs an already split command.
    pub fn eval_words(&mut self, words: &[String]) -> Result<Value, CommandError> {
        let Some(name) = words.first() else {
            return Ok(Value::Empty);
        };
        let spec = self
            .commands
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| CommandError::unknown_command(name))?;

        let args = Args::new(words);
        if !spec.arity.accepts(args.len()) {
            return Err(CommandError::wrong_args(spec.name, spec.usage));
        }
        crate::trace!("eval {words:?}");
        (spec.run)(self, &args)
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn control_sink(&self) -> Arc<dyn ControlSink> {
        Arc::clone(&self.control_sink)
    }

    pub fn make_manager(&mut self) -> Box<dyn ServiceControlManager> {
        (self.manager_factory)()
    }

    /// Records a session started by `serve`.
    pub fn attach_session(&mut self, session: ServiceSession) {
        self.started_sessions.push(session.clone());
        self.session = Some(session);
    }

    pub fn session(&self) -> Option<&ServiceSession> {
        self.session.as_ref()
    }

    /// Sessions started since the last call, for hosts that watch teardown.
    pub fn take_started_sessions(&mut self) -> Vec<ServiceSession> {
        std::mem::take(&mut self.started_sessions)
    }

    /// `true` while a session started here has not torn down.
    pub fn service_active(&self) -> bool {
        self.session.as_ref().is_some_and(ServiceSession::is_active)
    }

    pub fn request_exit(&mut self, code: i32) {
        self.exit_code = Some(code);
    }

    pub fn exit_requested(&self) -> Option<i32> {
        self.exit_code
    }

    /// Runs every control request already queued on the internal sink.
    /// Returns how many ran.
    pub fn process_pending_controls(&mut self) -> usize {
        let Some(pending) = self.pending_controls.take() else {
            return 0;
        };
        let mut ran = 0;
        while let Ok(request) = pending.try_recv() {
            let _ = request.complete(self);
            ran += 1;
        }
        self.pending_controls = Some(pending);
        ran
    }

    /// Blocks until one control request arrives on the internal sink and
    /// runs it. `false` when there is no internal sink.
    pub fn wait_for_control(&mut self) -> bool {
        let Some(pending) = self.pending_controls.take() else {
            return false;
        };
        let ran = match pending.recv() {
            Ok(request) => {
                let _ = request.complete(self);
                true
            }
            Err(_) => false,
        };
        self.pending_controls = Some(pending);
        ran
    }
}

impl CommandInterpreter for Interp {
    fn eval(&mut self, command: &str) -> Result<Value, CommandError> {
        Interp::eval(self, command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(_: &mut Interp, args: &Args<'_>) -> Result<Value, CommandError> {
        Ok(Value::Int(args.int(1)? + args.int(2)?))
    }

    fn interp() -> Interp {
        let mut interp = Interp::empty();
        interp.register("add", Arity::Exact(2), "a b", "Adds two integers.", add);
        interp
    }

    #[test]
    fn eval_dispatches_registered_command() {
        let mut interp = interp();
        assert_eq!(interp.eval("add 2 0x3").unwrap(), Value::Int(5));
        assert_eq!(interp.eval("   ").unwrap(), Value::Empty);
    }

    #[test]
    fn wrong_arg_count_is_reported_with_usage() {
        let err = interp().eval("add 1").unwrap_err();
        assert_eq!(err.kind, ConditionKind::WrongArgs);
        assert_eq!(err.message, "wrong # args: should be \"add a b\"");
    }

    #[test]
    fn unknown_command() {
        let err = interp().eval("frobnicate").unwrap_err();
        assert_eq!(err.kind, ConditionKind::UnknownCommand);
        assert_eq!(err.message, "invalid command name \"frobnicate\"");
    }

    #[test]
    fn queued_control_runs_on_the_interpreter() {
        let mut interp = interp();
        let (request, acked) = ControlRequest::new(2, "add 40 2");
        assert!(interp.control_sink().mark(request));
        assert!(acked.try_recv().is_err());

        assert_eq!(interp.process_pending_controls(), 1);
        assert!(acked.try_recv().is_ok());
        assert_eq!(interp.process_pending_controls(), 0);
    }

    #[test]
    fn custom_sink_replaces_internal_queue() {
        let (tx, rx) = mpsc::channel::<ControlRequest>();
        let mut interp = interp().with_control_sink(Arc::new(tx));
        let (request, _acked) = ControlRequest::new(1, "add 1 1");
        assert!(interp.control_sink().mark(request));
        assert!(!interp.wait_for_control());
        assert_eq!(rx.try_recv().unwrap().command(), "add 1 1");
    }
}
