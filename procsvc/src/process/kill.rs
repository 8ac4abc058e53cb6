//! Process - Kill
//! ==============
//!
//! Tiered termination of processes selected by pid or executable name.
//!
//! The work is split in two so the selection logic can run against any
//! process table:
//!
//! 1. **Mark** – [`mark_deletion_set`] flags the records to terminate.
//!    * [`AncestryLevel::Exact`] – the processes matching the selector.
//!    * [`AncestryLevel::Children`] – plus their direct children.
//!    * [`AncestryLevel::Descendants`] – plus every transitive descendant,
//!      regardless of the order the records are listed in.
//! 2. **Terminate** – [`kill_records`] hands each marked pid to a terminator
//!    and counts how many terminations succeeded.
//!
//! [`kill`] wires both to a fresh [`take_snapshot`] and a forceful
//! termination (`SIGKILL` / `TerminateProcess`). Processes that already
//! exited, and failures to open or terminate an individual process, are
//! skipped; the count is the result.

use std::collections::HashSet;

use super::{error::*, snapshot::*};

/// Which processes a kill targets.
#[derive(serde::Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// A process id. `0` matches nothing.
    Pid(u32),
    /// An executable file name, compared exactly. An empty name matches nothing.
    Name(String),
}

impl Selector {
    /// Reads an argument the way `kill` does: anything that parses as an
    /// integer is a pid, everything else is a name. Integers that cannot be a
    /// pid select nothing.
    pub fn parse(raw: &str) -> Self {
        match crate::binding::value::parse_int(raw) {
            Some(id) => Self::Pid(u32::try_from(id).unwrap_or(0)),
            None => Self::Name(raw.to_owned()),
        }
    }

    pub fn matches(&self, record: &ProcessRecord) -> bool {
        match self {
            Self::Pid(0) => false,
            Self::Pid(pid) => record.pid == *pid,
            Self::Name(name) => !name.is_empty() && record.executable_name == *name,
        }
    }
}

impl From<u32> for Selector {
    fn from(pid: u32) -> Self {
        Self::Pid(pid)
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pid(pid) => write!(f, "pid {pid}"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}

#[derive(serde::Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AncestryLevel {
    Exact = 0,
    Children = 1,
    Descendants = 2,
}

impl TryFrom<i64> for AncestryLevel {
    type Error = ProcessError;

    fn try_from(level: i64) -> Result<Self> {
        match level {
            0 => Ok(Self::Exact),
            1 => Ok(Self::Children),
            2 => Ok(Self::Descendants),
            value => Err(ProcessError::ValueOutOfRange {
                what: "level",
                min: 0,
                max: 2,
                value,
            }),
        }
    }
}

/// Flags every record in the deletion set for `selector` at `level` and
/// returns how many records are flagged.
pub fn mark_deletion_set(
    records: &mut [ProcessRecord],
    selector: &Selector,
    level: AncestryLevel,
) -> usize {
    for record in records.iter_mut() {
        if selector.matches(record) {
            record.marked_for_deletion = true;
        }
    }

    match level {
        AncestryLevel::Exact => (),
        AncestryLevel::Children => {
            // only the parents matched above; a freshly marked child never
            // pulls in its own children
            let parents: HashSet<u32> = marked_pids(records).collect();
            for record in records.iter_mut() {
                if !record.marked_for_deletion && parents.contains(&record.parent_pid) {
                    record.marked_for_deletion = true;
                }
            }
        }
        AncestryLevel::Descendants => {
            let mut marked: HashSet<u32> = marked_pids(records).collect();
            let mut j = 0;
            while j < records.len() {
                let record = &mut records[j];
                if !record.marked_for_deletion && marked.contains(&record.parent_pid) {
                    record.marked_for_deletion = true;
                    marked.insert(record.pid);
                    // rescan: an earlier record may be a child of this one
                    j = 0;
                } else {
                    j += 1;
                }
            }
        }
    }

    records.iter().filter(|r| r.marked_for_deletion).count()
}

fn marked_pids(records: &[ProcessRecord]) -> impl Iterator<Item = u32> + '_ {
    records
        .iter()
        .filter(|r| r.marked_for_deletion)
        .map(|r| r.pid)
}

/// Marks the deletion set, then terminates each marked pid in table order.
/// Returns the number of successful terminations.
pub fn kill_records<F>(
    records: &mut [ProcessRecord],
    selector: &Selector,
    level: AncestryLevel,
    mut terminate: F,
) -> usize
where
    F: FnMut(u32) -> std::result::Result<(), OsError>,
{
    mark_deletion_set(records, selector, level);

    let mut killed = 0;
    for record in records.iter().filter(|r| r.marked_for_deletion) {
        if record.exited {
            crate::debug!(
                "Skipping {} (PID {}): already exited",
                record.executable_name,
                record.pid
            );
            continue;
        }
        match terminate(record.pid) {
            Ok(()) => {
                crate::info!("Terminated {} (PID {})", record.executable_name, record.pid);
                killed += 1;
            }
            Err(e) => crate::debug!(
                "Could not terminate {} (PID {}): {e}",
                record.executable_name,
                record.pid
            ),
        }
    }
    killed
}

/// Forcefully terminates the processes selected by `selector` at `level` and
/// returns how many were terminated. An unusable snapshot yields `0`.
pub fn kill(selector: &Selector, level: AncestryLevel) -> usize {
    let mut records = take_snapshot();
    let killed = kill_records(&mut records, selector, level, terminate_pid);
    crate::info!("kill {selector} (level {}) terminated {killed}", level as i32);
    killed
}

#[cfg(unix)]
pub fn terminate_pid(pid: u32) -> std::result::Result<(), OsError> {
    use nix::{
        sys::signal::{Signal, kill},
        unistd::Pid,
    };

    // 0 and negative pids address process groups
    let raw = i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .ok_or_else(OsError::invalid_parameter)?;
    // a zombie accepts the signal but is already gone
    #[cfg(target_os = "linux")]
    if super::pid::is_zombie(pid) {
        return Err(nix::errno::Errno::ESRCH.into());
    }
    kill(Pid::from_raw(raw), Signal::SIGKILL).map_err(OsError::from)
}

#[cfg(windows)]
pub fn terminate_pid(pid: u32) -> std::result::Result<(), OsError> {
    use windows::Win32::{
        Foundation::CloseHandle,
        System::Threading::{OpenProcess, PROCESS_TERMINATE, TerminateProcess},
    };

    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, false, pid).map_err(|e| OsError::from_win(&e))?;
        let result = TerminateProcess(handle, 0).map_err(|e| OsError::from_win(&e));
        let _ = CloseHandle(handle);
        result
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::process::tests_helpers::*;

    //  1 (init)
    //  ├── 10 app
    //  │   ├── 11 worker
    //  │   │   └── 12 helper
    //  │   │       └── 13 helper
    //  │   └── 14 worker
    //  └── 20 other
    //      └── 21 app
    fn tree() -> Vec<ProcessRecord> {
        vec![
            ProcessRecord::new(1, 0, "init"),
            ProcessRecord::new(10, 1, "app"),
            ProcessRecord::new(11, 10, "worker"),
            ProcessRecord::new(12, 11, "helper"),
            ProcessRecord::new(13, 12, "helper"),
            ProcessRecord::new(14, 10, "worker"),
            ProcessRecord::new(20, 1, "other"),
            ProcessRecord::new(21, 20, "app"),
        ]
    }

    fn marked(records: &[ProcessRecord]) -> Vec<u32> {
        marked_pids(records).collect()
    }

    #[test]
    fn exact_level_marks_only_matches() {
        let mut records = tree();
        assert_eq!(mark_deletion_set(&mut records, &Selector::Pid(11), AncestryLevel::Exact), 1);
        assert_eq!(marked(&records), vec![11]);

        let mut records = tree();
        mark_deletion_set(&mut records, &Selector::Name("app".into()), AncestryLevel::Exact);
        assert_eq!(marked(&records), vec![10, 21]);
    }

    #[test]
    fn children_level_stops_at_direct_children() {
        let mut records = tree();
        mark_deletion_set(&mut records, &Selector::Pid(10), AncestryLevel::Children);
        assert_eq!(marked(&records), vec![10, 11, 14]);
    }

    #[test]
    fn children_level_ignores_listing_order() {
        // 12 is listed after its parent 11; marking 11 as a child must not
        // pull 12 in on the same pass
        let mut records = tree();
        mark_deletion_set(&mut records, &Selector::Pid(1), AncestryLevel::Children);
        assert_eq!(marked(&records), vec![1, 10, 20]);
    }

    #[test]
    fn descendants_level_marks_whole_tree() {
        let mut records = tree();
        let count = mark_deletion_set(&mut records, &Selector::Pid(10), AncestryLevel::Descendants);
        assert_eq!(count, 5);
        assert_eq!(marked(&records), vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn descendants_level_handles_children_listed_first() {
        let mut records = vec![
            ProcessRecord::new(13, 12, "helper"),
            ProcessRecord::new(12, 11, "helper"),
            ProcessRecord::new(11, 10, "worker"),
            ProcessRecord::new(10, 1, "app"),
            ProcessRecord::new(30, 1, "bystander"),
        ];
        mark_deletion_set(&mut records, &Selector::Name("app".into()), AncestryLevel::Descendants);
        let mut set = marked(&records);
        set.sort();
        assert_eq!(set, vec![10, 11, 12, 13]);
    }

    #[test]
    fn zero_pid_and_empty_name_match_nothing() {
        let mut records = tree();
        records.push(ProcessRecord::new(0, 0, "idle"));
        assert_eq!(mark_deletion_set(&mut records, &Selector::Pid(0), AncestryLevel::Descendants), 0);
        assert_eq!(
            mark_deletion_set(&mut records, &Selector::Name(String::new()), AncestryLevel::Descendants),
            0
        );
    }

    #[test]
    fn kill_records_counts_only_successful_terminations() {
        let mut records = tree();
        let mut attempted = Vec::new();
        let killed = kill_records(&mut records, &Selector::Pid(10), AncestryLevel::Descendants, |pid| {
            attempted.push(pid);
            if pid == 12 { Err(OsError::new(5)) } else { Ok(()) }
        });
        assert_eq!(attempted, vec![10, 11, 12, 13, 14]);
        assert_eq!(killed, 4);
    }

    #[test]
    fn exited_records_are_marked_but_not_counted() {
        let mut records = tree();
        records[2] = ProcessRecord::new(11, 10, "worker").as_exited();
        let mut attempted = Vec::new();
        let killed = kill_records(&mut records, &Selector::Pid(10), AncestryLevel::Descendants, |pid| {
            attempted.push(pid);
            Ok(())
        });
        // 11 still links 12 and 13 to the tree
        assert_eq!(marked(&records), vec![10, 11, 12, 13, 14]);
        assert_eq!(attempted, vec![10, 12, 13, 14]);
        assert_eq!(killed, 4);
    }

    #[test]
    #[serial]
    #[cfg(unix)]
    fn unreaped_child_is_not_counted() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        std::thread::sleep(std::time::Duration::from_millis(300));
        assert!(!crate::process::valid_pid(pid as i64));

        assert_eq!(kill(&Selector::Pid(pid), AncestryLevel::Exact), 0);
        assert!(child.wait().unwrap().success());
    }

    #[test]
    fn selector_parse() {
        assert_eq!(Selector::parse("42"), Selector::Pid(42));
        assert_eq!(Selector::parse("0x10"), Selector::Pid(16));
        assert_eq!(Selector::parse("-3"), Selector::Pid(0));
        assert_eq!(Selector::parse("notepad.exe"), Selector::Name("notepad.exe".into()));
    }

    #[test]
    fn level_out_of_range() {
        assert_eq!(AncestryLevel::try_from(2).unwrap(), AncestryLevel::Descendants);
        let err = AncestryLevel::try_from(3).unwrap_err();
        assert_eq!(err.to_string(), "Value out of range (0 - 2)");
        assert!(AncestryLevel::try_from(-1).is_err());
    }

    #[test]
    #[serial]
    fn kill_live_process_by_pid() {
        let mut child = long_cmd().spawn().unwrap();
        let pid = child.id();

        assert_eq!(kill(&Selector::Pid(pid), AncestryLevel::Exact), 1);
        let status = child.wait().unwrap();
        assert!(!status.success());

        // reaped: nothing left to kill
        assert_eq!(kill(&Selector::Pid(pid), AncestryLevel::Exact), 0);
    }

    #[test]
    #[serial]
    #[cfg(unix)]
    fn kill_live_tree_with_descendants() {
        use std::{thread, time::Duration};

        // sh ─ sh ─ sleep
        let mut root = std::process::Command::new("sh")
            .args(["-c", "sh -c 'sleep 30; true' & wait"])
            .spawn()
            .unwrap();
        thread::sleep(Duration::from_millis(300));

        let mut records = take_snapshot();
        let count =
            mark_deletion_set(&mut records, &Selector::Pid(root.id()), AncestryLevel::Descendants);
        assert_eq!(count, 3, "root, inner shell and sleep are marked");

        let killed = kill(&Selector::Pid(root.id()), AncestryLevel::Descendants);
        assert_eq!(killed, 3);
        assert!(!root.wait().unwrap().success());

        // the tree is gone: repeated kills find nothing
        thread::sleep(Duration::from_millis(300));
        assert_eq!(kill(&Selector::Pid(root.id()), AncestryLevel::Descendants), 0);
        assert_eq!(kill(&Selector::Pid(root.id()), AncestryLevel::Descendants), 0);
    }
}
