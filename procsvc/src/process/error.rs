/// A platform error code: a Win32 error on Windows, an `errno` value on Unix.
///
/// OS failures are not exceptional at the command surface; they travel back
/// to the caller as plain numbers (see `commands`).
#[derive(serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[error("os error {code}")]
pub struct OsError {
    pub code: i32,
}

impl OsError {
    pub const fn new(code: i32) -> Self {
        Self { code }
    }

    /// The calling thread's last OS error.
    pub fn last() -> Self {
        Self::from_io(&std::io::Error::last_os_error())
    }

    pub fn from_io(e: &std::io::Error) -> Self {
        Self::new(e.raw_os_error().unwrap_or(Self::invalid_parameter().code))
    }

    #[cfg(windows)]
    pub fn from_win(e: &windows::core::Error) -> Self {
        // HRESULT_FROM_WIN32 packs the Win32 code into facility 7
        let hr = e.code().0 as u32;
        if hr & 0xFFFF_0000 == 0x8007_0000 {
            Self::new((hr & 0xFFFF) as i32)
        } else {
            Self::new(hr as i32)
        }
    }

    pub fn invalid_handle() -> Self {
        #[cfg(windows)]
        return Self::new(windows::Win32::Foundation::ERROR_INVALID_HANDLE.0 as i32);
        #[cfg(unix)]
        return Self::new(nix::errno::Errno::EBADF as i32);
    }

    pub fn invalid_parameter() -> Self {
        #[cfg(windows)]
        return Self::new(windows::Win32::Foundation::ERROR_INVALID_PARAMETER.0 as i32);
        #[cfg(unix)]
        return Self::new(nix::errno::Errno::EINVAL as i32);
    }

    /// Negated code, the form `wait` reports failures in.
    pub const fn negated(self) -> i64 {
        -(self.code as i64)
    }
}

#[cfg(unix)]
impl From<nix::errno::Errno> for OsError {
    fn from(e: nix::errno::Errno) -> Self {
        Self::new(e as i32)
    }
}

#[derive(serde::Serialize, Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    /// A numeric argument lies outside the range the operation accepts.
    #[error("Value out of range ({min} - {max})")]
    ValueOutOfRange {
        what: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },

    /// More handles than a single wait can observe.
    #[error("List too long (max. {max}) entries")]
    TooManyHandles { count: usize, max: usize },

    #[error(transparent)]
    Os(#[from] OsError),
}

pub type Result<T> = std::result::Result<T, ProcessError>;
