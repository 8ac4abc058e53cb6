use crate::process::ProcessError;

/// Category of a raised condition.
#[derive(serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    TypeMismatch,
    Overflow,
    DivideByZero,
    ValueOutOfRange,
    WrongArgs,
    UnknownCommand,
}

/// A condition raised by a command: the call was malformed, as opposed to an
/// OS operation that merely failed.
#[derive(serde::Serialize, Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CommandError {
    pub kind: ConditionKind,
    pub message: String,
}

impl CommandError {
    pub fn raise(kind: ConditionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::raise(ConditionKind::TypeMismatch, message)
    }

    pub fn value_out_of_range(min: i64, max: i64) -> Self {
        Self::raise(
            ConditionKind::ValueOutOfRange,
            format!("Value out of range ({min} - {max})"),
        )
    }

    pub fn wrong_args(name: &str, usage: &str) -> Self {
        let message = if usage.is_empty() {
            format!("wrong # args: should be \"{name}\"")
        } else {
            format!("wrong # args: should be \"{name} {usage}\"")
        };
        Self::raise(ConditionKind::WrongArgs, message)
    }

    pub fn unknown_command(name: &str) -> Self {
        Self::raise(
            ConditionKind::UnknownCommand,
            format!("invalid command name \"{name}\""),
        )
    }
}

impl From<ProcessError> for CommandError {
    fn from(e: ProcessError) -> Self {
        let kind = match &e {
            ProcessError::ValueOutOfRange { .. } => ConditionKind::ValueOutOfRange,
            ProcessError::TooManyHandles { .. } => ConditionKind::Overflow,
            // callers report OS codes as results; reaching here is a misuse
            ProcessError::Os(_) => ConditionKind::TypeMismatch,
        };
        Self::raise(kind, e.to_string())
    }
}

impl From<crate::service::ServiceError> for CommandError {
    fn from(e: crate::service::ServiceError) -> Self {
        use crate::service::ServiceError;

        let kind = match &e {
            ServiceError::InvalidStartType { .. } => ConditionKind::ValueOutOfRange,
            ServiceError::InvalidControlMask { .. } => ConditionKind::ValueOutOfRange,
            _ => ConditionKind::TypeMismatch,
        };
        Self::raise(kind, e.to_string())
    }
}
