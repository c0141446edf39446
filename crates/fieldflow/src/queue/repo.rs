// crates/fieldflow/src/queue/repo.rs

use crate::api::models::TaskListItem;
use crate::queue::model::{NewTask, QueuedTask, TaskStatus};
use crate::queue::retry::RetryConfig;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Clone)]
pub struct TasksRepo {
    pool: PgPool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    Replayed(Uuid),
    NotFound,
    NotFailed(TaskStatus),
}

/// What `reap_expired_leases` did with tasks whose worker stopped renewing the lease.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub requeued: u64,
    pub failed: u64,
}

impl TasksRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ----------------------------
    // Enqueue
    // ----------------------------

    /// Insert through any executor, so producers can enqueue inside their own transaction.
    pub async fn insert<'e, E>(executor: E, task: &NewTask) -> anyhow::Result<Uuid>
    where
        E: PgExecutor<'e>,
    {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO tasks (task_type, payload_json, run_at, status, priority, max_attempts, replay_of_task_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&task.task_type)
        .bind(&task.payload_json)
        .bind(task.run_at)
        .bind(TaskStatus::Pending.as_str())
        .bind(task.priority)
        .bind(task.max_attempts)
        .bind(task.replay_of_task_id)
        .fetch_one(executor)
        .await?;

        Ok(id)
    }

    // ----------------------------
    // Reads
    // ----------------------------

    pub async fn get_task(&self, task_id: Uuid) -> anyhow::Result<Option<QueuedTask>> {
        let task = sqlx::query_as::<_, QueuedTask>("SELECT * FROM tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    /// Cursor-paginated list of tasks, newest first.
    /// Cursor is (created_at, id) of the last row of the previous page.
    ///
    /// - status/task_type are optional filters
    /// - limit is clamped to [1, 500]
    pub async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        task_type: Option<&str>,
        limit: i64,
        cursor: Option<(DateTime<Utc>, Uuid)>,
    ) -> anyhow::Result<Vec<TaskListItem>> {
        let limit = limit.clamp(1, 500);
        let (cursor_created_at, cursor_id) = cursor.unzip();

        let rows = sqlx::query_as::<_, TaskListItem>(
            r#"
            SELECT
                id, task_type, status,
                run_at, priority, attempts, max_attempts,
                last_error_code, last_error_message,
                failure_reason_code,
                created_at, updated_at
            FROM tasks
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR task_type = $2)
              AND ($3::timestamptz IS NULL OR (created_at, id) < ($3, $4))
            ORDER BY created_at DESC, id DESC
            LIMIT $5
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(task_type)
        .bind(cursor_created_at)
        .bind(cursor_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Failed-terminal tasks kept for inspection, most recent failure first.
    pub async fn list_failed(&self, limit: i64) -> anyhow::Result<Vec<TaskListItem>> {
        let rows = sqlx::query_as::<_, TaskListItem>(
            r#"
            SELECT
                id, task_type, status,
                run_at, priority, attempts, max_attempts,
                last_error_code, last_error_message,
                failure_reason_code,
                created_at, updated_at
            FROM tasks
            WHERE status = 'failed'
            ORDER BY failed_at DESC NULLS LAST, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ----------------------------
    // Leasing
    // ----------------------------

    /// Lease exactly one runnable task for this worker and count the delivery attempt.
    ///
    /// Correctness: SELECT ... FOR UPDATE SKIP LOCKED, so two workers never claim the same row.
    /// Order: priority DESC, then run_at, then created_at (FIFO within a priority tier).
    pub async fn lease_one(
        &self,
        worker_id: &str,
        lease_seconds: i64,
    ) -> anyhow::Result<Option<QueuedTask>> {
        let mut tx = self.pool.begin().await?;

        let task = sqlx::query_as::<_, QueuedTask>(
            r#"
            WITH candidate AS (
              SELECT id
              FROM tasks
              WHERE status = 'pending'
                AND run_at <= now()
              ORDER BY priority DESC, run_at ASC, created_at ASC
              FOR UPDATE SKIP LOCKED
              LIMIT 1
            )
            UPDATE tasks t
            SET status = 'running',
                attempts = t.attempts + 1,
                locked_by = $1,
                locked_at = now(),
                lock_expires_at = now() + ($2::int * interval '1 second'),
                updated_at = now()
            FROM candidate
            WHERE t.id = candidate.id
            RETURNING t.*
            "#,
        )
        .bind(worker_id)
        .bind(lease_seconds as i32)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(task)
    }

    /// Push the lease forward while the handler is still running.
    /// Returns false when this worker no longer owns the task.
    pub async fn extend_lease(
        &self,
        task_id: Uuid,
        worker_id: &str,
        lease_seconds: i64,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE tasks
            SET lock_expires_at = now() + ($3::int * interval '1 second'),
                updated_at = now()
            WHERE id = $1
              AND status = 'running'
              AND locked_by = $2
            "#,
        )
        .bind(task_id)
        .bind(worker_id)
        .bind(lease_seconds as i32)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    /// Reclaim tasks from dead workers. The lost delivery still counts as an attempt:
    /// tasks with attempts left go back to pending after the usual retry backoff
    /// (without jitter), the rest become failed-terminal.
    pub async fn reap_expired_leases(&self, retry: &RetryConfig) -> anyhow::Result<ReapReport> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE task_attempts a
            SET status = 'failed',
                finished_at = now(),
                error_code = 'LEASE_EXPIRED',
                error_message = 'lease expired before the worker reported back'
            FROM tasks t
            WHERE a.task_id = t.id
              AND a.attempt_no = t.attempts
              AND a.status = 'running'
              AND t.status = 'running'
              AND t.lock_expires_at < now()
            "#,
        )
        .execute(&mut *tx)
        .await?;

        let failed = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'failed',
                failure_reason_code = 'MAX_ATTEMPTS_EXCEEDED',
                failed_at = now(),
                last_error_code = 'LEASE_EXPIRED',
                last_error_message = 'lease expired before the worker reported back',
                locked_at = NULL,
                locked_by = NULL,
                lock_expires_at = NULL,
                updated_at = now()
            WHERE status = 'running'
              AND lock_expires_at < now()
              AND attempts >= max_attempts
            "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let requeued = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'pending',
                run_at = now() + make_interval(secs => LEAST(
                    $1::float8 * power(2::float8, LEAST(GREATEST(attempts - 1, 0), 62)::float8),
                    $2::float8
                )),
                last_error_code = 'LEASE_EXPIRED',
                last_error_message = 'lease expired before the worker reported back',
                locked_at = NULL,
                locked_by = NULL,
                lock_expires_at = NULL,
                updated_at = now()
            WHERE status = 'running'
              AND lock_expires_at < now()
            "#,
        )
        .bind(retry.base_seconds as f64)
        .bind(retry.max_seconds as f64)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(ReapReport { requeued, failed })
    }

    // ----------------------------
    // State transitions
    // ----------------------------
    //
    // Each update is guarded by `locked_by`: a worker that lost its lease cannot
    // overwrite the outcome recorded by whoever holds it now. They return whether
    // the row was actually updated.

    pub async fn mark_succeeded(&self, task_id: Uuid, worker_id: &str) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'succeeded',
                completed_at = now(),
                locked_at = NULL,
                locked_by = NULL,
                lock_expires_at = NULL,
                updated_at = now()
            WHERE id = $1
              AND status = 'running'
              AND locked_by = $2
            "#,
        )
        .bind(task_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    pub async fn reschedule_for_retry(
        &self,
        task_id: Uuid,
        worker_id: &str,
        next_run_at: DateTime<Utc>,
        last_error_code: &str,
        last_error_message: &str,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'pending',
                run_at = $3,
                locked_at = NULL,
                locked_by = NULL,
                lock_expires_at = NULL,
                updated_at = now(),
                last_error_code = $4,
                last_error_message = $5
            WHERE id = $1
              AND status = 'running'
              AND locked_by = $2
            "#,
        )
        .bind(task_id)
        .bind(worker_id)
        .bind(next_run_at)
        .bind(last_error_code)
        .bind(last_error_message)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    pub async fn mark_failed(
        &self,
        task_id: Uuid,
        worker_id: &str,
        reason_code: &str,
        last_error_code: &str,
        last_error_message: &str,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'failed',
                failure_reason_code = $3,
                failed_at = now(),
                locked_at = NULL,
                locked_by = NULL,
                lock_expires_at = NULL,
                updated_at = now(),
                last_error_code = $4,
                last_error_message = $5
            WHERE id = $1
              AND status = 'running'
              AND locked_by = $2
            "#,
        )
        .bind(task_id)
        .bind(worker_id)
        .bind(reason_code)
        .bind(last_error_code)
        .bind(last_error_message)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    // ----------------------------
    // Replay
    // ----------------------------

    /// Operator-initiated: enqueue a fresh copy of a failed-terminal task.
    /// The original row stays as it is for diagnosis.
    pub async fn replay_task(
        &self,
        task_id: Uuid,
        run_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<ReplayOutcome> {
        let mut tx = self.pool.begin().await?;

        let src = sqlx::query_as::<_, QueuedTask>(
            r#"
            SELECT *
            FROM tasks
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(task_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(src) = src else {
            return Ok(ReplayOutcome::NotFound);
        };
        if src.status != TaskStatus::Failed {
            return Ok(ReplayOutcome::NotFailed(src.status));
        }

        let new_id = Self::insert(
            &mut *tx,
            &NewTask {
                task_type: src.task_type,
                payload_json: src.payload_json,
                run_at: run_at.unwrap_or_else(Utc::now),
                priority: src.priority,
                max_attempts: src.max_attempts,
                replay_of_task_id: Some(src.id),
            },
        )
        .await?;

        tx.commit().await?;
        Ok(ReplayOutcome::Replayed(new_id))
    }
}
