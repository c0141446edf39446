use crate::queue::{
    attempts::AttemptsRepo,
    error_codes::ErrorCode,
    repo::TasksRepo,
    retry::{classify_error, next_delay_seconds, ErrorClass, RetryConfig},
};
use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, SeedableRng};
use uuid::Uuid;

pub const REASON_NON_RETRYABLE: &str = "NON_RETRYABLE";
pub const REASON_MAX_ATTEMPTS_EXCEEDED: &str = "MAX_ATTEMPTS_EXCEEDED";

/// What happened to a task after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDecision {
    Retrying { next_run_at: DateTime<Utc> },
    Failed { reason_code: &'static str },
    /// Another worker owns the task now; nothing was recorded.
    LeaseLost,
}

/// The leased delivery being reported on.
#[derive(Debug, Clone)]
pub struct AttemptRef<'a> {
    pub task_id: Uuid,
    pub attempt_id: Uuid,
    pub worker_id: &'a str,
    pub attempt_no: i32,
    pub max_attempts: i32,
    pub latency_ms: i32,
}

/// Records attempt outcomes and moves the task to its next state.
#[derive(Clone)]
pub struct TaskRunner {
    tasks: TasksRepo,
    attempts: AttemptsRepo,
    retry_cfg: RetryConfig,
}

impl TaskRunner {
    pub fn new(tasks: TasksRepo, attempts: AttemptsRepo, retry_cfg: RetryConfig) -> Self {
        Self {
            tasks,
            attempts,
            retry_cfg,
        }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry_cfg
    }

    /// Record a success. Returns `false` when the lease was lost first, in which case
    /// neither the task nor the attempt row is touched.
    pub async fn on_success(&self, attempt: &AttemptRef<'_>) -> anyhow::Result<bool> {
        let owned = self
            .tasks
            .mark_succeeded(attempt.task_id, attempt.worker_id)
            .await?;
        if !owned {
            tracing::warn!(
                task_id = %attempt.task_id,
                worker_id = attempt.worker_id,
                "lease lost before success could be recorded"
            );
            return Ok(false);
        }

        self.attempts
            .finish_succeeded(attempt.attempt_id, attempt.latency_ms)
            .await?;
        Ok(true)
    }

    pub async fn on_failure(
        &self,
        attempt: &AttemptRef<'_>,
        error_code: ErrorCode,
        error_message: &str,
    ) -> anyhow::Result<FailureDecision> {
        let class = classify_error(error_code);
        let can_retry =
            class == ErrorClass::Retryable && attempt.attempt_no < attempt.max_attempts;

        let (owned, decision) = if can_retry {
            let mut rng = StdRng::from_entropy();
            let delay_secs = next_delay_seconds(attempt.attempt_no, &self.retry_cfg, &mut rng);
            let next_run_at = Utc::now() + chrono::Duration::seconds(delay_secs);

            let owned = self
                .tasks
                .reschedule_for_retry(
                    attempt.task_id,
                    attempt.worker_id,
                    next_run_at,
                    error_code.as_str(),
                    error_message,
                )
                .await?;
            (owned, FailureDecision::Retrying { next_run_at })
        } else {
            let reason_code = match class {
                ErrorClass::NonRetryable => REASON_NON_RETRYABLE,
                ErrorClass::Retryable => REASON_MAX_ATTEMPTS_EXCEEDED,
            };

            let owned = self
                .tasks
                .mark_failed(
                    attempt.task_id,
                    attempt.worker_id,
                    reason_code,
                    error_code.as_str(),
                    error_message,
                )
                .await?;
            (owned, FailureDecision::Failed { reason_code })
        };

        if !owned {
            tracing::warn!(
                task_id = %attempt.task_id,
                worker_id = attempt.worker_id,
                "lease lost before failure could be recorded"
            );
            return Ok(FailureDecision::LeaseLost);
        }

        self.attempts
            .finish_failed(
                attempt.attempt_id,
                attempt.latency_ms,
                error_code.as_str(),
                error_message,
            )
            .await?;
        Ok(decision)
    }
}
