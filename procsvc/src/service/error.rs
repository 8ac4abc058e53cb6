use crate::process::OsError;

#[derive(serde::Serialize, Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The accepted-controls mask holds bits outside the recognised set.
    #[error("Invalid bit mask value")]
    InvalidControlMask { mask: i64 },

    #[error("Value out of range (2 - 4)")]
    InvalidStartType { value: i64 },

    /// The control manager could not be attached to this process.
    #[error("service registration failed: {reason}")]
    Registration { reason: String },

    /// The control manager side of a session went away.
    #[error("service control manager disconnected")]
    Disconnected,

    #[error(transparent)]
    Os(#[from] OsError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
