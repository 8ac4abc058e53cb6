//! Commands
//! ========
//!
//! The built-in commands of [`Interp`].
//!
//! Each command reads its arguments, calls the core and turns the outcome
//! into a result. Two error channels stay apart here: malformed calls raise
//! a [`CommandError`], while failed OS calls come back as ordinary numbers
//! for the caller to branch on.
//!
//! | Command         | Result                                        |
//! |-----------------|-----------------------------------------------|
//! | `kill`          | number of processes terminated                |
//! | `validpid`      | `1` alive, `0` not                            |
//! | `regservice`    | `0` or OS error code                          |
//! | `unregservice`  | `0` or OS error code                          |
//! | `serve`         | `0` started, `1` already running, or OS code  |
//! | `execsuspended` | `"process thread"` handles, or OS code        |
//! | `resume`        | previous suspend count, or negated OS code    |
//! | `terminate`     | `0` or OS error code                          |
//! | `wait`          | signalled index, or negated OS code           |
//! | `close`         | number of handles closed                      |
//! | `version`       | version string                                |

use std::fmt::Write;

use indenter::indented;

use crate::{
    PROCSVC_VERSION,
    binding::{Args, Arity, CommandError, HandleArg, Interp, Value},
    process::{self, AncestryLevel, OsError, ProcessError, Selector},
    service::{self, ServeRequest, ServeStatus, ServiceDefinition, ServiceError, StartType},
};

type CommandResult = Result<Value, CommandError>;

pub fn register_all(interp: &mut Interp) {
    interp.register("version", Arity::Exact(0), "", VERSION_HELP, version);
    interp.register("kill", Arity::Exact(2), "id level", KILL_HELP, kill);
    interp.register("validpid", Arity::Exact(1), "pid", VALIDPID_HELP, validpid);
    interp.register(
        "regservice",
        Arity::Exact(4),
        "name description command starttype",
        REGSERVICE_HELP,
        regservice,
    );
    interp.register("unregservice", Arity::Exact(1), "name", UNREGSERVICE_HELP, unregservice);
    interp.register("serve", Arity::Exact(3), "name bitmask command", SERVE_HELP, serve);
    interp.register("execsuspended", Arity::Exact(1), "command", EXECSUSPENDED_HELP, execsuspended);
    interp.register("resume", Arity::Exact(1), "threadhandle", RESUME_HELP, resume);
    interp.register("terminate", Arity::Exact(2), "handle exitcode", TERMINATE_HELP, terminate);
    interp.register("wait", Arity::Exact(1), "handle", WAIT_HELP, wait);
    interp.register("close", Arity::Exact(1), "handle", CLOSE_HELP, close);
    interp.register("help", Arity::Range(0, 1), "?name?", HELP_HELP, help);
    interp.register("echo", Arity::AtLeast(0), "?arg ...?", ECHO_HELP, echo);
    interp.register("exec", Arity::AtLeast(1), "program ?arg ...?", EXEC_HELP, exec);
    interp.register("exit", Arity::Range(0, 1), "?code?", EXIT_HELP, exit);
}

fn os_code(e: OsError) -> Value {
    Value::Int(e.code as i64)
}

// ── process ─────────────────────────────────────────────────────────────

fn version(_: &mut Interp, _: &Args<'_>) -> CommandResult {
    Ok(Value::from(PROCSVC_VERSION))
}

fn kill(_: &mut Interp, args: &Args<'_>) -> CommandResult {
    let selector = Selector::parse(args.string(1)?);
    let level = AncestryLevel::try_from(args.int(2)?)?;
    Ok(Value::Int(process::kill(&selector, level) as i64))
}

fn validpid(_: &mut Interp, args: &Args<'_>) -> CommandResult {
    Ok(Value::Int(process::valid_pid(args.int(1)?) as i64))
}

fn execsuspended(_: &mut Interp, args: &Args<'_>) -> CommandResult {
    match process::launch_suspended(args.string(1)?) {
        Ok(launched) => Ok(Value::List(vec![
            Value::Int(launched.process.0 as i64),
            Value::Int(launched.thread.0 as i64),
        ])),
        Err(e) => Ok(Value::Str(e.code.to_string())),
    }
}

fn resume(_: &mut Interp, args: &Args<'_>) -> CommandResult {
    match process::resume(args.handle(1)?) {
        Ok(previous) => Ok(Value::Int(previous as i64)),
        Err(e) => Ok(Value::Int(e.negated())),
    }
}

fn terminate(_: &mut Interp, args: &Args<'_>) -> CommandResult {
    let handle = args.handle(1)?;
    let exit_code = args.int(2)? as u32;
    match process::terminate(handle, exit_code) {
        Ok(()) => Ok(Value::Int(0)),
        Err(e) => Ok(os_code(e)),
    }
}

fn wait(_: &mut Interp, args: &Args<'_>) -> CommandResult {
    let outcome = match args.handles(1)? {
        HandleArg::One(handle) => process::wait(handle).map(|()| 0).map_err(ProcessError::from),
        HandleArg::Many(handles) => process::wait_any(&handles),
    };
    match outcome {
        Ok(index) => Ok(Value::Int(index as i64)),
        Err(ProcessError::Os(e)) => Ok(Value::Int(e.negated())),
        Err(e) => Err(e.into()),
    }
}

fn close(_: &mut Interp, args: &Args<'_>) -> CommandResult {
    let closed = match args.handles(1)? {
        HandleArg::One(handle) => process::close(handle) as usize,
        HandleArg::Many(handles) => process::close_all(&handles),
    };
    Ok(Value::Int(closed as i64))
}

// ── service ─────────────────────────────────────────────────────────────

fn regservice(interp: &mut Interp, args: &Args<'_>) -> CommandResult {
    let start_type = StartType::try_from(args.int(4)?)?;
    let definition = ServiceDefinition::builder()
        .name(args.string(1)?)
        .description(args.string(2)?)
        .command_line(args.string(3)?)
        .start_type(start_type)
        .build();
    match interp.registry().register(&definition) {
        Ok(()) => Ok(Value::Int(0)),
        Err(e) => Ok(os_code(e)),
    }
}

fn unregservice(interp: &mut Interp, args: &Args<'_>) -> CommandResult {
    match interp.registry().unregister(args.string(1)?) {
        Ok(()) => Ok(Value::Int(0)),
        Err(e) => Ok(os_code(e)),
    }
}

fn serve(interp: &mut Interp, args: &Args<'_>) -> CommandResult {
    let request = ServeRequest::builder()
        .name(args.string(1)?)
        .mask(args.int(2)?)
        .command_template(args.string(3)?)
        .build();
    let sink = interp.control_sink();
    let manager = interp.make_manager();

    match service::serve(request, sink, manager) {
        Ok(status) => {
            let code = status.code();
            if let ServeStatus::Started(session) = status {
                interp.attach_session(session);
            }
            Ok(Value::Int(code))
        }
        Err(ServiceError::Os(e)) => Ok(os_code(e)),
        Err(e) => Err(e.into()),
    }
}

// ── host ────────────────────────────────────────────────────────────────

fn help(interp: &mut Interp, args: &Args<'_>) -> CommandResult {
    let mut out = String::new();
    let wanted = args.get(1).filter(|name| !name.is_empty());

    let specs: Vec<_> = match wanted {
        Some(name) => match interp.command(name) {
            Some(spec) => vec![spec.clone()],
            None => {
                let _ = writeln!(out, "Command {name} not supported.");
                interp.commands().cloned().collect()
            }
        },
        None => interp.commands().cloned().collect(),
    };

    let _ = writeln!(out, "procsvc {PROCSVC_VERSION} commands:");
    for spec in specs {
        let _ = writeln!(out, "  Command {}", spec.name);
        let _ = writeln!(out, "    Syntax:");
        if spec.usage.is_empty() {
            let _ = writeln!(out, "      {}", spec.name);
        } else {
            let _ = writeln!(out, "      {} {}", spec.name, spec.usage);
        }
        let _ = writeln!(out, "    Description:");
        let _ = writeln!(indented(&mut out).with_str("      "), "{}", spec.help);
    }
    Ok(Value::Str(out.trim_end().to_owned()))
}

fn echo(_: &mut Interp, args: &Args<'_>) -> CommandResult {
    Ok(Value::Str(args.rest().join(" ")))
}

fn exec(_: &mut Interp, args: &Args<'_>) -> CommandResult {
    let program = args.string(1)?;
    let status = std::process::Command::new(program)
        .args(&args.rest()[1..])
        .status();
    match status {
        Ok(status) => Ok(Value::Int(status.code().map_or(-1, i64::from))),
        Err(e) => Ok(Value::Int(OsError::from_io(&e).negated())),
    }
}

fn exit(interp: &mut Interp, args: &Args<'_>) -> CommandResult {
    let code = match args.get(1) {
        Some(_) => args.int(1)? as i32,
        None => 0,
    };
    interp.request_exit(code);
    Ok(Value::Empty)
}

// ── help text ───────────────────────────────────────────────────────────

const VERSION_HELP: &str = "Returns the version of the command set.";

const KILL_HELP: &str = "\
Kills processes. id is a process id or an executable name.
level 0 kills the matching processes only, 1 also their direct
children, 2 their whole process trees.
Returns the number of processes killed.";

const VALIDPID_HELP: &str = "\
Returns 1 if pid names a running process, else 0.";

const REGSERVICE_HELP: &str = "\
Registers a service. starttype is 2 (automatic), 3 (on demand)
or 4 (disabled).
Returns 0, or the OS error code.";

const UNREGSERVICE_HELP: &str = "\
Deletes a service registration.
Returns 0, or the OS error code.";

const SERVE_HELP: &str = "\
Runs this program as the service name. bitmask selects the accepted
controls: 1 stop, 2 pause/continue, 4 shutdown, 256 pre-shutdown.
For every control, command is run with the control code appended
(1 stop, 2 pause, 3 continue, 5 shutdown, 15 pre-shutdown).
Returns 0, 1 if a service is already running, or the OS error code.";

const EXECSUSPENDED_HELP: &str = "\
Starts command with its main thread suspended.
Returns the process and thread handles, or the OS error code.";

const RESUME_HELP: &str = "\
Resumes the thread returned by execsuspended.
Returns the previous suspend count, or the negated OS error code.";

const TERMINATE_HELP: &str = "\
Terminates the process behind handle with exitcode.
Returns 0, or the OS error code.";

const WAIT_HELP: &str = "\
Waits for a process or thread to finish. For a list of at most 64
handles, waits for the first one.
Returns the index of the signalled handle, or the negated OS error code.";

const CLOSE_HELP: &str = "\
Closes a handle or a list of handles.
Returns the number of handles closed.";

const HELP_HELP: &str = "Describes one command, or all of them.";

const ECHO_HELP: &str = "Returns its arguments joined by spaces.";

const EXEC_HELP: &str = "\
Runs program and waits for it.
Returns its exit code, -1 if it was killed by a signal.";

const EXIT_HELP: &str = "Stops the host after the current command.";
