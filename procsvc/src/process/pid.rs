//! Process - PID
//! =============
//!
//! Liveness probe behind the `validpid` command.
//!
//! A pid is *valid* while it names a process that has not finished: on Unix
//! the kernel still knows it and it is not a zombie, on Windows its exit code
//! still reads `STILL_ACTIVE`. A process we may not inspect still counts as
//! alive.

#[cfg(unix)]
pub fn valid_pid(pid: i64) -> bool {
    use nix::errno::Errno;

    let Some(pid) = u32::try_from(pid).ok().filter(|pid| *pid > 0) else {
        return false;
    };
    match pid_alive(pid) {
        Ok(alive) => alive,
        // exists, just not ours
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> std::result::Result<bool, nix::errno::Errno> {
    use nix::{errno::Errno, sys::signal::kill, unistd::Pid};

    let raw = i32::try_from(pid).map_err(|_| Errno::EINVAL)?;

    // ① Does the kernel still know this PID?
    match kill(Pid::from_raw(raw), None) {
        Err(Errno::ESRCH) => return Ok(false),
        Err(e) => return Err(e),
        Ok(_) => (),
    }

    // ② On Linux: zombie == not alive
    #[cfg(target_os = "linux")]
    if is_zombie(pid) {
        return Ok(false);
    }

    Ok(true)
}

/// `true` when `/proc` reports `pid` as finished but not yet reaped.
#[cfg(target_os = "linux")]
pub(crate) fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/status")).is_ok_and(|status| {
        status
            .lines()
            .find(|l| l.starts_with("State:"))
            .and_then(|l| l.split_whitespace().nth(1))
            == Some("Z")
    })
}

#[cfg(windows)]
pub fn valid_pid(pid: i64) -> bool {
    use windows::Win32::{
        Foundation::{CloseHandle, ERROR_ACCESS_DENIED, STILL_ACTIVE},
        System::Threading::{
            GetExitCodeProcess, OpenProcess, PROCESS_QUERY_INFORMATION,
            PROCESS_QUERY_LIMITED_INFORMATION,
        },
    };

    let Ok(pid) = u32::try_from(pid) else {
        return false;
    };

    unsafe {
        // the limited right is unavailable before Vista
        let opened = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid)
            .or_else(|_| OpenProcess(PROCESS_QUERY_INFORMATION, false, pid));

        match opened {
            Ok(handle) => {
                let mut exit_code = 0u32;
                let alive = match GetExitCodeProcess(handle, &mut exit_code) {
                    Ok(()) => exit_code == STILL_ACTIVE.0 as u32,
                    Err(_) => true,
                };
                let _ = CloseHandle(handle);
                alive
            }
            Err(e) => crate::process::OsError::from_win(&e).code == ERROR_ACCESS_DENIED.0 as i32,
        }
    }
}
