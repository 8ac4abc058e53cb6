mod common;

use std::time::{Duration, Instant};

use common::*;
use procsvc::*;
use serial_test::serial;

#[test]
#[serial]
fn suspended_launch_runs_only_after_resume() {
    let mut interp = Interp::new();
    let value = interp.eval(&format!("execsuspended {{{SHORT_CMD_LINE}}}")).unwrap();
    let (process, thread) = launched(&value);
    assert_ne!(process, thread);

    assert_eq!(interp.eval(&format!("resume {thread}")).unwrap(), Value::Int(1));
    assert_eq!(interp.eval(&format!("wait {process}")).unwrap(), Value::Int(0));
    assert_eq!(interp.eval(&format!("close {{{process} {thread}}}")).unwrap(), Value::Int(2));

    // closed handles are gone
    assert_eq!(interp.eval(&format!("close {process}")).unwrap(), Value::Int(0));
    assert!(interp.eval(&format!("wait {process}")).unwrap().as_int().unwrap() < 0);
}

#[test]
#[serial]
fn terminate_ends_a_suspended_launch() {
    let mut interp = Interp::new();
    let value = interp.eval(&format!("execsuspended {{{LONG_CMD_LINE}}}")).unwrap();
    let (process, thread) = launched(&value);

    assert_eq!(interp.eval(&format!("terminate {process} 3")).unwrap(), Value::Int(0));
    let terminated = Instant::now();
    assert_eq!(
        interp.eval(&format!("wait {{{thread} {process}}}")).unwrap(),
        Value::Int(0)
    );
    assert!(terminated.elapsed() < Duration::from_secs(5));
    assert_eq!(interp.eval(&format!("close {{{process} {thread}}}")).unwrap(), Value::Int(2));
}

#[test]
#[serial]
fn wait_list_reports_the_first_finished_handle() {
    let mut interp = Interp::new();
    let (long_process, long_thread) =
        launched(&interp.eval(&format!("execsuspended {{{LONG_CMD_LINE}}}")).unwrap());
    let (short_process, short_thread) =
        launched(&interp.eval(&format!("execsuspended {{{SHORT_CMD_LINE}}}")).unwrap());

    interp.eval(&format!("resume {long_thread}")).unwrap();
    interp.eval(&format!("resume {short_thread}")).unwrap();
    assert_eq!(
        interp.eval(&format!("wait {{{long_process} {short_process}}}")).unwrap(),
        Value::Int(1)
    );

    interp.eval(&format!("terminate {long_process} 0")).unwrap();
    interp.eval(&format!("wait {long_process}")).unwrap();
    let closed = interp
        .eval(&format!(
            "close {{{long_process} {long_thread} {short_process} {short_thread}}}"
        ))
        .unwrap();
    assert_eq!(closed, Value::Int(4));
}

#[test]
#[serial]
fn kill_by_pid_and_validpid_agree() {
    let mut child = std::process::Command::new(if cfg!(windows) { "timeout.exe" } else { "sleep" })
        .args(if cfg!(windows) { vec!["/T", "30", "/NOBREAK"] } else { vec!["30"] })
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .spawn()
        .unwrap();
    let pid = child.id();

    let mut interp = Interp::new();
    assert_eq!(interp.eval(&format!("validpid {pid}")).unwrap(), Value::Int(1));
    assert_eq!(interp.eval(&format!("kill {pid} 0")).unwrap(), Value::Int(1));
    child.wait().unwrap();
    assert_eq!(interp.eval(&format!("validpid {pid}")).unwrap(), Value::Int(0));
}

#[test]
#[serial]
fn kill_checks_level_and_matches_unknown_names_to_nothing() {
    let mut interp = Interp::new();
    // nothing here is named like this
    assert_eq!(
        interp.eval("kill procsvc-no-such-image 2").unwrap(),
        Value::Int(0)
    );
    let err = interp.eval("kill 1 3").unwrap_err();
    assert_eq!(err.kind, ConditionKind::ValueOutOfRange);
    assert_eq!(err.message, "Value out of range (0 - 2)");
}

#[test]
fn too_many_handles_is_raised() {
    let list = (1..=65).map(|i| (i * 4).to_string()).collect::<Vec<_>>().join(" ");
    let err = Interp::new().eval(&format!("wait {{{list}}}")).unwrap_err();
    assert_eq!(err.kind, ConditionKind::Overflow);
    assert_eq!(err.message, "List too long (max. 64) entries");
}

#[test]
#[serial]
fn missing_program_returns_a_code_and_leaves_no_handles() {
    let mut interp = Interp::new();
    let value = interp.eval("execsuspended {/no/such/program-procsvc now}").unwrap();
    assert!(value.to_string().parse::<i64>().is_ok(), "got handles: {value}");
    assert!(!value.to_string().contains(' '));
}
