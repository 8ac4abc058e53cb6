pub mod error;
pub mod handle;
pub mod kill;
pub mod launch;
pub mod pid;
pub mod snapshot;

pub use error::{OsError, ProcessError};
pub use handle::*;
pub use kill::*;
pub use launch::*;
pub use pid::*;
pub use snapshot::*;

/// Upper bound on the handles one wait can observe (`MAXIMUM_WAIT_OBJECTS`).
pub const MAX_WAIT_HANDLES: usize = 64;

#[cfg(test)]
// Shared test utilities for process management
pub(crate) mod tests_helpers {

    #[cfg(unix)]
    pub fn long_cmd() -> std::process::Command {
        let mut c = std::process::Command::new("sleep");
        c.arg("30");
        c
    }
    #[cfg(windows)]
    pub fn long_cmd() -> std::process::Command {
        let mut c = std::process::Command::new("timeout.exe");
        c.args(["/T", "30", "/NOBREAK"]);
        c
    }

    #[cfg(unix)]
    pub const LONG_CMD_LINE: &str = "sleep 30";
    #[cfg(windows)]
    pub const LONG_CMD_LINE: &str = "timeout.exe /T 30 /NOBREAK";

    #[cfg(unix)]
    pub const SHORT_CMD_LINE: &str = "sleep 1";
    #[cfg(windows)]
    pub const SHORT_CMD_LINE: &str = "timeout.exe /T 1 /NOBREAK";

    /// Linux run-state letter from `/proc/<pid>/stat` (`T` when stopped).
    #[cfg(target_os = "linux")]
    pub fn proc_state(pid: u32) -> Option<char> {
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        // the comm field may hold spaces; the state follows its closing paren
        stat.rsplit_once(')')?.1.trim_start().chars().next()
    }
}
