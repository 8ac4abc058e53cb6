// top-level error for the public API

#[derive(serde::Serialize, Debug, thiserror::Error)]
pub enum ProcsvcError {
    #[error(transparent)]
    Process(#[from] crate::process::error::ProcessError),

    #[error(transparent)]
    Service(#[from] crate::service::error::ServiceError),

    #[error(transparent)]
    Command(#[from] crate::binding::error::CommandError),

    #[error("invalid {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("configuration error: {reason}")]
    Config { reason: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("{operation} failed for '{path}'")]
    FileSystem {
        operation: &'static str,
        path: std::path::PathBuf,
        #[source]
        #[serde(serialize_with = "std_io_error_to_string")]
        source: std::io::Error,
    },
}

pub type ProcsvcResult<T> = std::result::Result<T, ProcsvcError>;

impl ProcsvcError {
    pub fn file_system(
        operation: &'static str,
        path: impl Into<std::path::PathBuf>,
        err: impl Into<std::io::Error>,
    ) -> Self {
        Self::FileSystem {
            operation,
            path: path.into(),
            source: err.into(),
        }
    }
}

pub(crate) fn std_io_error_to_string<S>(e: &impl std::fmt::Display, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&e.to_string())
}
