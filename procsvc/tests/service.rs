mod common;

use std::{sync::Mutex, thread, time::Duration};

use common::*;
use procsvc::*;
use serial_test::serial;

static RECORDED: Mutex<Vec<String>> = Mutex::new(Vec::new());

fn record(_: &mut Interp, args: &Args<'_>) -> Result<Value, CommandError> {
    RECORDED.lock().unwrap().push(args.rest().join(" "));
    Ok(Value::Empty)
}

fn recorded() -> Vec<String> {
    RECORDED.lock().unwrap().clone()
}

fn with_recorder(mut interp: Interp) -> Interp {
    RECORDED.lock().unwrap().clear();
    interp.register("record", Arity::AtLeast(0), "?arg ...?", "Records its arguments.", record);
    interp
}

fn stop(interp: &mut Interp, slot: &InjectorSlot) {
    let stopping = injector(slot).stop_in_background();
    assert!(interp.wait_for_control());
    assert_eq!(stopping.join().unwrap().unwrap(), ServiceState::Stopped);
    let session = interp.session().unwrap().clone();
    session.wait_timeout(Duration::from_secs(5)).unwrap().unwrap();
}

#[test]
#[serial]
fn serve_runs_controls_on_the_interpreter_thread() {
    let (interp, slot) = manual_interp();
    let mut interp = with_recorder(interp);

    assert_eq!(interp.eval("serve demo 0x3 {record ctl}").unwrap(), Value::Int(0));
    assert!(interp.service_active());
    let session = interp.session().unwrap().clone();
    assert_eq!(session.name(), "demo");
    assert!(injector(&slot).wait_until_running(Duration::from_secs(5)));

    let pausing = {
        let injector = injector(&slot);
        thread::spawn(move || injector.send(2))
    };
    assert!(interp.wait_for_control());
    assert_eq!(pausing.join().unwrap().unwrap(), ServiceState::Paused);
    assert_eq!(recorded(), vec!["ctl 2"]);
    assert_eq!(session.state(), ServiceState::Paused);

    let resuming = {
        let injector = injector(&slot);
        thread::spawn(move || injector.send(3))
    };
    assert!(interp.wait_for_control());
    assert_eq!(resuming.join().unwrap().unwrap(), ServiceState::Running);

    stop(&mut interp, &slot);
    assert_eq!(recorded(), vec!["ctl 2", "ctl 3", "ctl 1"]);
    assert!(!interp.service_active());
    assert!(active_session().is_none());

    let published: Vec<ServiceState> = injector(&slot).statuses().iter().map(|s| s.state).collect();
    assert_eq!(
        published,
        vec![
            ServiceState::Running,
            ServiceState::Paused,
            ServiceState::Running,
            ServiceState::Stopped
        ]
    );
    assert!(injector(&slot).statuses().iter().all(|s| s.checkpoint == 0 && s.wait_hint == 0));
}

#[test]
#[serial]
fn second_serve_reports_already_running_and_changes_nothing() {
    let (interp, slot) = manual_interp();
    let mut interp = with_recorder(interp);

    assert_eq!(interp.eval("serve first 0x1 {record a}").unwrap(), Value::Int(0));
    let first = injector(&slot);
    assert_eq!(interp.eval("serve second 0x7 {record b}").unwrap(), Value::Int(1));

    let session = active_session().unwrap();
    assert_eq!(session.name(), "first");
    assert_eq!(session.status().controls_accepted, ControlMask::STOP);
    assert!(session.same_session(interp.session().unwrap()));

    // the rejected call did not replace the manager in use
    *slot.lock().unwrap() = Some(first);
    stop(&mut interp, &slot);
    assert_eq!(recorded(), vec!["a 1"]);

    // the slot is free again
    assert_eq!(interp.eval("serve third 0x1 {record c}").unwrap(), Value::Int(0));
    stop(&mut interp, &slot);
}

#[test]
#[serial]
fn controls_are_delivered_one_at_a_time() {
    let (interp, slot) = manual_interp();
    let mut interp = with_recorder(interp);
    assert_eq!(interp.eval("serve demo 0x3 {record ctl}").unwrap(), Value::Int(0));
    assert!(injector(&slot).wait_until_running(Duration::from_secs(5)));

    let senders: Vec<_> = [2u32, 3]
        .into_iter()
        .map(|code| {
            let injector = injector(&slot);
            thread::spawn(move || injector.send(code))
        })
        .collect();

    thread::sleep(Duration::from_millis(300));
    // the second control waits for the first acknowledgement before it is marked
    assert_eq!(interp.process_pending_controls(), 1);
    assert!(interp.wait_for_control());
    for sender in senders {
        sender.join().unwrap().unwrap();
    }
    assert_eq!(recorded().len(), 2);

    stop(&mut interp, &slot);
}

#[test]
#[serial]
fn registration_failure_tears_the_session_down() {
    let mut interp = failing_interp(1063);
    assert_eq!(interp.eval("serve demo 0x1 {echo}").unwrap(), Value::Int(0));

    let session = interp.session().unwrap().clone();
    let outcome = session.wait_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(outcome, Err(ServiceError::Os(OsError::new(1063))));
    assert!(!interp.service_active());
    assert!(active_session().is_none());
}

#[test]
#[serial]
fn bad_mask_never_starts_a_session() {
    let (mut interp, _slot) = manual_interp();
    let err = interp.eval("serve demo 0x200 {echo}").unwrap_err();
    assert_eq!(err.kind, ConditionKind::ValueOutOfRange);
    assert!(interp.session().is_none());
    assert!(active_session().is_none());
}
