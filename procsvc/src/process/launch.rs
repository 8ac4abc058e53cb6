//! Process - Launch
//! ================
//!
//! Starts a command line with its primary thread held before the first
//! instruction, so the caller can finish bookkeeping before anything runs.
//!
//! * **Windows** – `CreateProcessW` with `CREATE_SUSPENDED`; the returned
//!   thread handle is resumed with `ResumeThread`.
//! * **Unix** – the command runs under `/bin/sh -c 'kill -STOP $$ && exec …'`.
//!   The shell stops itself before `exec`, we wait for the stop with
//!   `WUNTRACED`, and resuming sends `SIGCONT`. The same pid then becomes
//!   the command.

use super::{error::*, handle::*};

/// Handles produced by a suspended launch. Both must be closed by the caller.
#[derive(serde::Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchedProcess {
    pub process: HandleRef,
    pub thread: HandleRef,
    pub pid: u32,
}

#[cfg(unix)]
pub fn launch_suspended(command_line: &str) -> std::result::Result<LaunchedProcess, OsError> {
    use nix::{
        sys::{
            signal::{Signal, kill},
            wait::{WaitPidFlag, WaitStatus, waitpid},
        },
        unistd::Pid,
    };

    // the shell would stop before exec could fail, so check the program now
    let program = resolve_program(command_line)?;
    crate::trace!("'{command_line}' resolves to {}", program.display());

    let script = format!("kill -STOP $$ && exec {command_line}");
    let child = std::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(&script)
        .spawn()
        .map_err(|e| OsError::from_io(&e))?;
    let pid = child.id();
    let raw_pid = Pid::from_raw(pid as i32);
    let slot = ChildSlot::new(pid, true);

    match waitpid(raw_pid, Some(WaitPidFlag::WUNTRACED)) {
        Ok(WaitStatus::Stopped(..)) => {
            let reaped = std::sync::Arc::clone(&slot);
            let reaper = std::thread::Builder::new()
                .name(format!("reaper-{pid}"))
                .spawn(move || {
                    let mut child = child;
                    match child.wait() {
                        Ok(status) => crate::debug!("PID {} exited: {status}", reaped.pid()),
                        Err(e) => crate::warn!("Failed to reap PID {}: {e}", reaped.pid()),
                    }
                    reaped.mark_exited();
                });
            if let Err(e) = reaper {
                let _ = kill(raw_pid, Signal::SIGKILL);
                let _ = waitpid(raw_pid, None);
                return Err(OsError::from_io(&e));
            }
        }
        Ok(status) => {
            // the shell ended before stopping and has been reaped already
            crate::warn!("Launch of '{command_line}' ended early: {status:?}");
            slot.mark_exited();
        }
        Err(e) => {
            let _ = kill(raw_pid, Signal::SIGKILL);
            let _ = waitpid(raw_pid, None);
            return Err(e.into());
        }
    }

    let table = HandleTable::global();
    let launched = LaunchedProcess {
        process: table.insert(HandleKind::Process, std::sync::Arc::clone(&slot)),
        thread: table.insert(HandleKind::Thread, slot),
        pid,
    };
    crate::info!(
        "Launched '{command_line}' suspended as PID {pid} (process {}, thread {})",
        launched.process,
        launched.thread
    );
    Ok(launched)
}

/// Finds the program a command line would `exec`: a path when the first
/// word has a slash, a `PATH` lookup otherwise. Fails with `ENOENT` when
/// nothing is found and `EACCES` when only non-executable files are.
#[cfg(unix)]
fn resolve_program(command_line: &str) -> std::result::Result<std::path::PathBuf, OsError> {
    use std::path::PathBuf;

    use nix::{
        errno::Errno,
        unistd::{AccessFlags, access},
    };

    let program = command_line
        .split_whitespace()
        .next()
        .map(|word| word.trim_matches(|c: char| c == '\'' || c == '"'))
        .filter(|word| !word.is_empty())
        .ok_or_else(OsError::invalid_parameter)?;

    let candidates: Vec<PathBuf> = if program.contains('/') {
        vec![PathBuf::from(program)]
    } else {
        std::env::var_os("PATH")
            .map(|path| std::env::split_paths(&path).map(|dir| dir.join(program)).collect())
            .unwrap_or_default()
    };

    let mut denied = false;
    for candidate in candidates {
        if !candidate.is_file() {
            continue;
        }
        match access(&candidate, AccessFlags::X_OK) {
            Ok(()) => return Ok(candidate),
            Err(_) => denied = true,
        }
    }
    Err(if denied { Errno::EACCES } else { Errno::ENOENT }.into())
}

#[cfg(windows)]
pub fn launch_suspended(command_line: &str) -> std::result::Result<LaunchedProcess, OsError> {
    use windows::{
        Win32::System::Threading::{
            CREATE_SUSPENDED, CreateProcessW, PROCESS_INFORMATION, STARTUPINFOW,
        },
        core::{PCWSTR, PWSTR},
    };

    // CreateProcessW may write into the command line buffer
    let mut wide: Vec<u16> = command_line.encode_utf16().chain(std::iter::once(0)).collect();
    let startup = STARTUPINFOW {
        cb: std::mem::size_of::<STARTUPINFOW>() as u32,
        ..Default::default()
    };
    let mut info = PROCESS_INFORMATION::default();

    unsafe {
        CreateProcessW(
            PCWSTR::null(),
            Some(PWSTR(wide.as_mut_ptr())),
            None,
            None,
            false,
            CREATE_SUSPENDED,
            None,
            PCWSTR::null(),
            &startup,
            &mut info,
        )
    }
    .map_err(|e| OsError::from_win(&e))?;

    let launched = LaunchedProcess {
        process: imp::from_raw(info.hProcess),
        thread: imp::from_raw(info.hThread),
        pid: info.dwProcessId,
    };
    crate::info!("Launched '{command_line}' suspended as PID {}", launched.pid);
    Ok(launched)
}

/// Lets a suspended primary thread run. Returns the suspend count before the
/// call: `1` for a freshly launched process, `0` once it already runs.
#[cfg(unix)]
pub fn resume(thread: HandleRef) -> std::result::Result<u32, OsError> {
    HandleTable::global()
        .lookup_kind(thread, HandleKind::Thread)?
        .resume()
}

#[cfg(windows)]
pub fn resume(thread: HandleRef) -> std::result::Result<u32, OsError> {
    use windows::Win32::System::Threading::ResumeThread;

    match unsafe { ResumeThread(imp::raw(thread)) } {
        u32::MAX => Err(OsError::last()),
        previous => Ok(previous),
    }
}

/// Forcefully ends the process behind `process`. On Unix the exit code is not
/// observable and the process dies from `SIGKILL`.
///
/// A process that already exited fails with `ESRCH` on Unix, whereas Windows
/// reports `ERROR_ACCESS_DENIED` (5) for it.
#[cfg(unix)]
pub fn terminate(process: HandleRef, exit_code: u32) -> std::result::Result<(), OsError> {
    let slot = HandleTable::global().lookup_kind(process, HandleKind::Process)?;
    crate::debug!("Terminating PID {} (exit code {exit_code})", slot.pid());
    slot.terminate()
}

/// Forcefully ends the process behind `process` with `exit_code`.
///
/// A process that already exited fails with `ERROR_ACCESS_DENIED` (5), where
/// Unix reports `ESRCH`.
#[cfg(windows)]
pub fn terminate(process: HandleRef, exit_code: u32) -> std::result::Result<(), OsError> {
    use windows::Win32::System::Threading::TerminateProcess;

    unsafe { TerminateProcess(imp::raw(process), exit_code) }.map_err(|e| OsError::from_win(&e))
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::process::tests_helpers::*;

    #[test]
    #[serial]
    fn launched_process_waits_for_resume() {
        let launched = launch_suspended(LONG_CMD_LINE).unwrap();
        assert!(crate::process::valid_pid(launched.pid as i64));

        #[cfg(target_os = "linux")]
        assert_eq!(proc_state(launched.pid), Some('T'));

        assert_eq!(resume(launched.thread).unwrap(), 1);
        assert_eq!(resume(launched.thread).unwrap(), 0);

        #[cfg(target_os = "linux")]
        {
            std::thread::sleep(std::time::Duration::from_millis(200));
            assert_ne!(proc_state(launched.pid), Some('T'));
        }

        terminate(launched.process, 1).unwrap();
        let terminated = std::time::Instant::now();
        wait(launched.process).unwrap();
        assert!(terminated.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(close_all(&[launched.process, launched.thread]), 2);
    }

    #[test]
    #[serial]
    fn terminate_of_suspended_process_is_prompt() {
        let launched = launch_suspended(LONG_CMD_LINE).unwrap();
        terminate(launched.process, 7).unwrap();
        let terminated = std::time::Instant::now();
        wait(launched.process).unwrap();
        assert!(terminated.elapsed() < std::time::Duration::from_secs(5));
        assert!(!crate::process::valid_pid(launched.pid as i64));
        close_all(&[launched.process, launched.thread]);
    }

    #[test]
    #[cfg(unix)]
    fn missing_program_fails_before_anything_starts() {
        use nix::errno::Errno;

        assert_eq!(
            launch_suspended("/no/such/program-procsvc --flag"),
            Err(OsError::from(Errno::ENOENT))
        );
        assert_eq!(
            launch_suspended("procsvc-no-such-program 1"),
            Err(OsError::from(Errno::ENOENT))
        );
        assert_eq!(launch_suspended("   "), Err(OsError::invalid_parameter()));
    }

    #[test]
    #[cfg(unix)]
    fn non_executable_program_is_access_denied() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("not-executable.sh");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();

        assert_eq!(
            launch_suspended(&script.display().to_string()),
            Err(OsError::from(nix::errno::Errno::EACCES))
        );
    }

    #[test]
    #[serial]
    fn short_command_runs_to_completion_after_resume() {
        let launched = launch_suspended(SHORT_CMD_LINE).unwrap();
        resume(launched.thread).unwrap();
        let started = std::time::Instant::now();
        wait(launched.process).unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        assert!(!crate::process::valid_pid(launched.pid as i64));
        close_all(&[launched.process, launched.thread]);
    }

    #[test]
    #[serial]
    #[cfg(unix)]
    fn handle_kinds_are_not_interchangeable() {
        let launched = launch_suspended(LONG_CMD_LINE).unwrap();
        assert_eq!(resume(launched.process), Err(OsError::invalid_handle()));
        assert_eq!(terminate(launched.thread, 1), Err(OsError::invalid_handle()));

        terminate(launched.process, 1).unwrap();
        wait(launched.process).unwrap();
        // already gone
        assert_eq!(
            terminate(launched.process, 1),
            Err(OsError::from(nix::errno::Errno::ESRCH))
        );
        close_all(&[launched.process, launched.thread]);
    }
}
