//! Process - Handles
//! =================
//!
//! Opaque, caller-owned references to launched processes and their primary
//! threads. A [`HandleRef`] stays usable until it is passed to [`close`];
//! afterwards every operation on it fails with the platform's invalid-handle
//! code.
//!
//! ```text
//!  Windows   HandleRef ── kernel HANDLE value
//!  Unix      HandleRef ── table slot ──┐
//!                                      ├─ Arc<ChildSlot> ── reaper thread
//!            HandleRef ── table slot ──┘   (process + thread share a child)
//! ```
//!
//! Waiting never polls: on Unix each launched child has a reaper thread that
//! blocks in `waitpid` and wakes the waiters registered on its slot.

use super::{MAX_WAIT_HANDLES, error::*};

#[derive(serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct HandleRef(pub u64);

impl std::fmt::Display for HandleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for HandleRef {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Blocks until the object behind `handle` is signalled (the process exited).
pub fn wait(handle: HandleRef) -> std::result::Result<(), OsError> {
    imp::wait_any(&[handle]).map(|_| ())
}

/// Blocks until any of `handles` is signalled and returns the lowest index
/// among the signalled ones.
///
/// More than [`MAX_WAIT_HANDLES`] handles is a [`ProcessError::TooManyHandles`]
/// and no OS call is made. An empty list is rejected by the OS layer as an
/// invalid parameter.
pub fn wait_any(handles: &[HandleRef]) -> Result<usize> {
    if handles.len() > MAX_WAIT_HANDLES {
        return Err(ProcessError::TooManyHandles {
            count: handles.len(),
            max: MAX_WAIT_HANDLES,
        });
    }
    if handles.is_empty() {
        return Err(OsError::invalid_parameter().into());
    }
    Ok(imp::wait_any(handles)?)
}

/// Releases a handle. `false` when it was not a live handle.
pub fn close(handle: HandleRef) -> bool {
    let closed = imp::close(handle);
    if !closed {
        crate::debug!("close on invalid handle {handle}");
    }
    closed
}

/// Closes every handle, last to first, and returns how many closes succeeded.
pub fn close_all(handles: &[HandleRef]) -> usize {
    let mut closed = 0;
    for handle in handles.iter().rev() {
        if close(*handle) {
            closed += 1;
        }
    }
    closed
}

#[cfg(unix)]
pub(crate) use imp::{ChildSlot, HandleKind, HandleTable};

#[cfg(unix)]
pub(crate) mod imp {
    use std::{
        collections::HashMap,
        sync::{
            Arc, LazyLock, Mutex, MutexGuard, PoisonError,
            atomic::{AtomicU64, Ordering},
            mpsc,
        },
    };

    use nix::{
        errno::Errno,
        sys::signal::{Signal, kill},
        unistd::Pid,
    };

    use super::HandleRef;
    use crate::process::OsError;

    static TABLE: LazyLock<HandleTable> = LazyLock::new(HandleTable::default);
    static NEXT_WATCH: AtomicU64 = AtomicU64::new(1);

    pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum HandleKind {
        Process,
        Thread,
    }

    /// One launched child, shared by its process and thread handles.
    #[derive(Debug)]
    pub(crate) struct ChildSlot {
        pid: u32,
        state: Mutex<SlotState>,
    }

    #[derive(Debug)]
    struct SlotState {
        exited: bool,
        suspended: bool,
        watchers: Vec<Watcher>,
    }

    #[derive(Debug)]
    struct Watcher {
        id: u64,
        index: usize,
        wake: mpsc::Sender<usize>,
    }

    impl ChildSlot {
        pub(crate) fn new(pid: u32, suspended: bool) -> Arc<Self> {
            Arc::new(Self {
                pid,
                state: Mutex::new(SlotState {
                    exited: false,
                    suspended,
                    watchers: Vec::new(),
                }),
            })
        }

        pub(crate) fn pid(&self) -> u32 {
            self.pid
        }

        pub(crate) fn has_exited(&self) -> bool {
            lock(&self.state).exited
        }

        /// Called once the child has been reaped; wakes every waiter.
        pub(crate) fn mark_exited(&self) {
            let mut state = lock(&self.state);
            state.exited = true;
            state.suspended = false;
            for watcher in state.watchers.drain(..) {
                let _ = watcher.wake.send(watcher.index);
            }
        }

        /// Registers a waiter. `false` when the child already exited, in which
        /// case nothing is registered.
        fn watch(&self, id: u64, index: usize, wake: mpsc::Sender<usize>) -> bool {
            let mut state = lock(&self.state);
            if state.exited {
                return false;
            }
            state.watchers.push(Watcher { id, index, wake });
            true
        }

        fn unwatch(&self, id: u64) {
            lock(&self.state).watchers.retain(|w| w.id != id);
        }

        /// Continues a stopped child. Returns the suspend count before the
        /// call, as `ResumeThread` does.
        pub(crate) fn resume(&self) -> Result<u32, OsError> {
            let mut state = lock(&self.state);
            if state.exited || !state.suspended {
                return Ok(0);
            }
            kill(self.raw_pid()?, Signal::SIGCONT)?;
            state.suspended = false;
            Ok(1)
        }

        /// `ESRCH` once the child exited (Windows says `ERROR_ACCESS_DENIED`).
        pub(crate) fn terminate(&self) -> Result<(), OsError> {
            let state = lock(&self.state);
            if state.exited {
                return Err(Errno::ESRCH.into());
            }
            kill(self.raw_pid()?, Signal::SIGKILL)?;
            Ok(())
        }

        fn raw_pid(&self) -> Result<Pid, OsError> {
            i32::try_from(self.pid)
                .map(Pid::from_raw)
                .map_err(|_| OsError::invalid_parameter())
        }
    }

    #[derive(Debug)]
    pub(crate) struct HandleTable {
        next: AtomicU64,
        entries: Mutex<HashMap<u64, (HandleKind, Arc<ChildSlot>)>>,
    }

    impl Default for HandleTable {
        fn default() -> Self {
            Self {
                // handle values look like kernel handles: non-zero multiples of 4
                next: AtomicU64::new(4),
                entries: Mutex::new(HashMap::new()),
            }
        }
    }

    impl HandleTable {
        pub(crate) fn global() -> &'static Self {
            &TABLE
        }

        pub(crate) fn insert(&self, kind: HandleKind, slot: Arc<ChildSlot>) -> HandleRef {
            let raw = self.next.fetch_add(4, Ordering::Relaxed);
            lock(&self.entries).insert(raw, (kind, slot));
            HandleRef(raw)
        }

        pub(crate) fn lookup(&self, handle: HandleRef) -> Result<(HandleKind, Arc<ChildSlot>), OsError> {
            lock(&self.entries)
                .get(&handle.0)
                .map(|(kind, slot)| (*kind, Arc::clone(slot)))
                .ok_or_else(OsError::invalid_handle)
        }

        /// Looks up a handle of one particular kind.
        pub(crate) fn lookup_kind(&self, handle: HandleRef, want: HandleKind) -> Result<Arc<ChildSlot>, OsError> {
            match self.lookup(handle)? {
                (kind, slot) if kind == want => Ok(slot),
                _ => Err(OsError::invalid_handle()),
            }
        }

        pub(crate) fn remove(&self, handle: HandleRef) -> bool {
            lock(&self.entries).remove(&handle.0).is_some()
        }
    }

    pub(crate) fn wait_any(handles: &[HandleRef]) -> Result<usize, OsError> {
        let table = HandleTable::global();
        let slots = handles
            .iter()
            .map(|h| table.lookup(*h).map(|(_, slot)| slot))
            .collect::<Result<Vec<_>, _>>()?;

        let watch_id = NEXT_WATCH.fetch_add(1, Ordering::Relaxed);
        let (wake, woken) = mpsc::channel();
        let mut ready = None;
        for (index, slot) in slots.iter().enumerate() {
            if !slot.watch(watch_id, index, wake.clone()) {
                ready = Some(index);
                break;
            }
        }
        drop(wake);

        let signalled = match ready {
            Some(index) => Ok(index),
            None => woken.recv().map_err(|_| OsError::from(Errno::EINTR)),
        };
        for slot in &slots {
            slot.unwatch(watch_id);
        }
        let signalled = signalled?;

        // report the lowest signalled index
        Ok(slots[..signalled]
            .iter()
            .position(|slot| slot.has_exited())
            .unwrap_or(signalled))
    }

    pub(crate) fn close(handle: HandleRef) -> bool {
        HandleTable::global().remove(handle)
    }
}

#[cfg(windows)]
pub(crate) mod imp {
    use windows::Win32::{
        Foundation::{CloseHandle, HANDLE, WAIT_FAILED, WAIT_OBJECT_0},
        System::Threading::{INFINITE, WaitForMultipleObjects},
    };

    use super::HandleRef;
    use crate::process::OsError;

    pub(crate) fn raw(handle: HandleRef) -> HANDLE {
        HANDLE(handle.0 as usize as *mut core::ffi::c_void)
    }

    pub(crate) fn from_raw(handle: HANDLE) -> HandleRef {
        HandleRef(handle.0 as usize as u64)
    }

    pub(crate) fn wait_any(handles: &[HandleRef]) -> Result<usize, OsError> {
        let raw_handles: Vec<HANDLE> = handles.iter().map(|h| raw(*h)).collect();
        let result = unsafe { WaitForMultipleObjects(&raw_handles, false, INFINITE) };
        if result == WAIT_FAILED {
            return Err(OsError::last());
        }
        Ok((result.0.wrapping_sub(WAIT_OBJECT_0.0) & 0x7f) as usize)
    }

    pub(crate) fn close(handle: HandleRef) -> bool {
        unsafe { CloseHandle(raw(handle)) }.is_ok()
    }
}
