//! Process - Snapshot
//! ==================
//!
//! A point-in-time listing of every process on the system, as seen by
//! `sysinfo`. Each entry carries just enough to walk parent/child relations:
//! the pid, the parent pid and the executable's file name.

use sysinfo::{ProcessRefreshKind, ProcessStatus, RefreshKind, UpdateKind};

/// Linux truncates `comm` to this many bytes.
#[cfg(target_os = "linux")]
const LINUX_COMM_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    /// `0` when the parent is unknown or the process is a root.
    pub parent_pid: u32,
    /// File name only, no directory.
    pub executable_name: String,
    /// Finished but not yet reaped (a zombie). Such a record still links
    /// its children to the tree but cannot be terminated again.
    pub exited: bool,
    pub marked_for_deletion: bool,
}

impl ProcessRecord {
    pub fn new(pid: u32, parent_pid: u32, executable_name: impl Into<String>) -> Self {
        Self {
            pid,
            parent_pid,
            executable_name: executable_name.into(),
            exited: false,
            marked_for_deletion: false,
        }
    }

    pub fn as_exited(mut self) -> Self {
        self.exited = true;
        self
    }
}

/// Lists all processes, ordered by pid. Unreadable entries are skipped.
pub fn take_snapshot() -> Vec<ProcessRecord> {
    let sys = sysinfo::System::new_with_specifics(
        RefreshKind::nothing()
            .with_processes(ProcessRefreshKind::nothing().with_exe(UpdateKind::OnlyIfNotSet)),
    );

    let mut records: Vec<ProcessRecord> = sys
        .processes()
        .values()
        // Linux threads show up as tasks
        .filter(|p| p.thread_kind().is_none())
        .map(|p| {
            let record = ProcessRecord::new(
                p.pid().as_u32(),
                p.parent().map_or(0, |parent| parent.as_u32()),
                executable_name(p),
            );
            match p.status() {
                ProcessStatus::Zombie | ProcessStatus::Dead => record.as_exited(),
                _ => record,
            }
        })
        .collect();

    records.sort_by_key(|r| r.pid);
    crate::trace!("snapshot holds {} processes", records.len());
    records
}

fn executable_name(process: &sysinfo::Process) -> String {
    let name = process.name().to_string_lossy();

    // A name cut at the comm limit is replaced by the real file name.
    #[cfg(target_os = "linux")]
    if name.len() >= LINUX_COMM_LEN {
        if let Some(file_name) = process.exe().and_then(|exe| exe.file_name()) {
            return file_name.to_string_lossy().into_owned();
        }
    }

    name.into_owned()
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::process::tests_helpers::*;

    #[test]
    fn snapshot_contains_current_process() {
        let me = std::process::id();
        let records = take_snapshot();
        let own = records.iter().find(|r| r.pid == me).expect("own pid listed");
        assert!(!own.executable_name.is_empty());
        assert!(!own.executable_name.contains(std::path::MAIN_SEPARATOR));
        assert!(!own.marked_for_deletion);
    }

    #[test]
    fn snapshot_is_sorted_by_pid() {
        let records = take_snapshot();
        assert!(records.windows(2).all(|w| w[0].pid < w[1].pid));
    }

    #[test]
    #[serial]
    fn spawned_child_reports_this_process_as_parent() {
        let mut child = long_cmd().spawn().unwrap();
        let pid = child.id();

        let records = take_snapshot();
        let record = records.iter().find(|r| r.pid == pid).expect("child listed");
        assert_eq!(record.parent_pid, std::process::id());

        #[cfg(unix)]
        assert_eq!(record.executable_name, "sleep");
        #[cfg(windows)]
        assert_eq!(record.executable_name.to_ascii_lowercase(), "timeout.exe");

        assert!(!record.exited);

        let _ = child.kill();
        let _ = child.wait();
    }

    #[test]
    #[serial]
    #[cfg(unix)]
    fn unreaped_child_is_listed_as_exited() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        std::thread::sleep(std::time::Duration::from_millis(300));

        let records = take_snapshot();
        let record = records.iter().find(|r| r.pid == pid).expect("zombie listed");
        assert!(record.exited);

        child.wait().unwrap();
    }
}
