use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// One delivery of a task to a handler.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TaskAttempt {
    pub id: Uuid,
    pub task_id: Uuid,
    pub attempt_no: i32,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub status: String,

    pub error_code: Option<String>,
    pub error_message: Option<String>,

    pub latency_ms: Option<i32>,
    pub worker_id: String,
}

pub enum AttemptStatus {
    Running,
    Succeeded,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Running => "running",
            AttemptStatus::Succeeded => "succeeded",
            AttemptStatus::Failed => "failed",
        }
    }
}

#[derive(Clone)]
pub struct AttemptsRepo {
    pool: PgPool,
}

impl AttemptsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the attempt row as "running".
    /// `attempt_no` is the task's `attempts` counter right after leasing.
    pub async fn start_attempt(
        &self,
        task_id: Uuid,
        attempt_no: i32,
        worker_id: &str,
    ) -> anyhow::Result<TaskAttempt> {
        let attempt = sqlx::query_as::<_, TaskAttempt>(
            r#"
            INSERT INTO task_attempts (task_id, attempt_no, status, worker_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (task_id, attempt_no) DO UPDATE
              SET status = EXCLUDED.status,
                  worker_id = EXCLUDED.worker_id,
                  started_at = now(),
                  finished_at = NULL,
                  error_code = NULL,
                  error_message = NULL,
                  latency_ms = NULL
            RETURNING *
            "#,
        )
        .bind(task_id)
        .bind(attempt_no)
        .bind(AttemptStatus::Running.as_str())
        .bind(worker_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(attempt)
    }

    pub async fn finish_succeeded(&self, attempt_id: Uuid, latency_ms: i32) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE task_attempts
            SET status = $2,
                finished_at = now(),
                latency_ms = $3
            WHERE id = $1
            "#,
        )
        .bind(attempt_id)
        .bind(AttemptStatus::Succeeded.as_str())
        .bind(latency_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn finish_failed(
        &self,
        attempt_id: Uuid,
        latency_ms: i32,
        error_code: &str,
        error_message: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE task_attempts
            SET status = $2,
                finished_at = now(),
                latency_ms = $3,
                error_code = $4,
                error_message = $5
            WHERE id = $1
            "#,
        )
        .bind(attempt_id)
        .bind(AttemptStatus::Failed.as_str())
        .bind(latency_ms)
        .bind(error_code)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_for_task(&self, task_id: Uuid) -> anyhow::Result<Vec<TaskAttempt>> {
        let rows = sqlx::query_as::<_, TaskAttempt>(
            r#"
            SELECT *
            FROM task_attempts
            WHERE task_id = $1
            ORDER BY attempt_no ASC
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
