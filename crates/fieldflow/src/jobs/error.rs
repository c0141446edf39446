use uuid::Uuid;

use crate::jobs::model::JobStatus;
use crate::queue::client::EnqueueError;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("job {0} not found")]
    NotFound(Uuid),
    #[error("cannot move job from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<sqlx::Error> for JobError {
    fn from(e: sqlx::Error) -> Self {
        JobError::Store(e.into())
    }
}

impl From<EnqueueError> for JobError {
    fn from(e: EnqueueError) -> Self {
        match e {
            EnqueueError::Validation(v) => JobError::Validation(v.to_string()),
            other => JobError::Store(other.into()),
        }
    }
}
