//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use procsvc::*;

#[cfg(unix)]
pub const LONG_CMD_LINE: &str = "sleep 30";
#[cfg(windows)]
pub const LONG_CMD_LINE: &str = "timeout.exe /T 30 /NOBREAK";

#[cfg(unix)]
pub const SHORT_CMD_LINE: &str = "sleep 1";
#[cfg(windows)]
pub const SHORT_CMD_LINE: &str = "timeout.exe /T 1 /NOBREAK";

/// Injector of the most recent manual manager handed out by the interpreter.
pub type InjectorSlot = Arc<Mutex<Option<ControlInjector>>>;

/// An interpreter whose `serve` attaches to in-process manual managers.
pub fn manual_interp() -> (Interp, InjectorSlot) {
    let slot: InjectorSlot = Arc::new(Mutex::new(None));
    let handed_out = Arc::clone(&slot);
    let interp = Interp::new().with_manager_factory(move || -> Box<dyn ServiceControlManager> {
        let (manager, injector) = ManualControlManager::new();
        *handed_out.lock().unwrap() = Some(injector);
        Box::new(manager)
    });
    (interp, slot)
}

/// Same, but every registration fails with `code`.
pub fn failing_interp(code: i32) -> Interp {
    Interp::new().with_manager_factory(move || -> Box<dyn ServiceControlManager> {
        Box::new(ManualControlManager::failing(code).0)
    })
}

pub fn injector(slot: &InjectorSlot) -> ControlInjector {
    slot.lock().unwrap().clone().expect("serve handed out a manager")
}

/// `execsuspended` result split into (process, thread).
pub fn launched(value: &Value) -> (i64, i64) {
    let text = value.to_string();
    let mut parts = text.split_whitespace().map(|p| p.parse::<i64>().unwrap());
    (parts.next().unwrap(), parts.next().unwrap())
}
