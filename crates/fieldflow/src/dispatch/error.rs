use crate::queue::error_codes::ErrorCode;
use crate::queue::task::{TaskKind, UnknownTaskType};

/// Failure reported by a task handler. The code decides whether the task is retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct TaskError {
    pub code: ErrorCode,
    pub message: String,
}

impl TaskError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_payload(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadPayload, message)
    }

    pub fn dependency_down(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DependencyDown, message)
    }

    pub fn db(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::DbError, err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(
        "no handler registered for: {}",
        .0.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
    )]
    MissingHandlers(Vec<TaskKind>),
    #[error(transparent)]
    UnknownTaskType(#[from] UnknownTaskType),
    #[error("invalid dispatcher configuration: {0}")]
    Config(String),
}
