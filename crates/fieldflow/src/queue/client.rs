//! Producer-side handle on the durable task queue.
//!
//! A [`JobQueue`] is built explicitly with [`JobQueue::connect`] (or [`JobQueue::from_pool`]) and
//! passed to whoever needs it. Nothing here is process-global.

use std::time::Duration;

use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::queue::{
    attempts::AttemptsRepo,
    enqueue_guard::{EnqueueGuard, EnqueueGuardConfig, GuardViolation},
    metrics::MetricsRepo,
    model::NewTask,
    repo::TasksRepo,
    task::Task,
};

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub default_max_attempts: i32,
    pub guard: EnqueueGuardConfig,
}

impl QueueSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            default_max_attempts: cfg.default_max_attempts,
            guard: EnqueueGuardConfig {
                max_payload_bytes: cfg.max_payload_bytes,
                ..EnqueueGuardConfig::default()
            },
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            guard: EnqueueGuardConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub delay: Option<Duration>,
    /// Higher runs first. Defaults to 0.
    pub priority: Option<i32>,
    pub max_attempts: Option<i32>,
}

impl EnqueueOptions {
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("invalid task: {0}")]
    Validation(#[from] GuardViolation),
    #[error("could not encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("could not persist task: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct JobQueue {
    pool: PgPool,
    tasks: TasksRepo,
    attempts: AttemptsRepo,
    guard: EnqueueGuard,
    default_max_attempts: i32,
}

impl JobQueue {
    pub async fn connect(database_url: &str, settings: QueueSettings) -> anyhow::Result<Self> {
        let pool = db::make_pool(database_url).await?;
        Ok(Self::from_pool(pool, settings))
    }

    pub fn from_pool(pool: PgPool, settings: QueueSettings) -> Self {
        Self {
            tasks: TasksRepo::new(pool.clone()),
            attempts: AttemptsRepo::new(pool.clone()),
            guard: EnqueueGuard::new(settings.guard),
            default_max_attempts: settings.default_max_attempts,
            pool,
        }
    }

    /// Waits for checked-out connections to be returned, then closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn tasks(&self) -> &TasksRepo {
        &self.tasks
    }

    pub fn attempts(&self) -> &AttemptsRepo {
        &self.attempts
    }

    pub fn metrics(&self) -> MetricsRepo {
        MetricsRepo::new(self.pool.clone())
    }

    /// Persist a task. Returns once the row is committed.
    pub async fn enqueue(
        &self,
        task: impl Into<Task>,
        opts: EnqueueOptions,
    ) -> Result<Uuid, EnqueueError> {
        let new_task = self.prepare(task.into(), &opts)?;
        let id = TasksRepo::insert(&self.pool, &new_task).await?;
        tracing::debug!(task_id = %id, task_type = %new_task.task_type, "task enqueued");
        Ok(id)
    }

    /// Persist a task inside the caller's transaction. The task only becomes visible to
    /// workers if that transaction commits.
    pub async fn enqueue_in_tx(
        &self,
        conn: &mut PgConnection,
        task: impl Into<Task>,
        opts: EnqueueOptions,
    ) -> Result<Uuid, EnqueueError> {
        let new_task = self.prepare(task.into(), &opts)?;
        let id = TasksRepo::insert(conn, &new_task).await?;
        tracing::debug!(task_id = %id, task_type = %new_task.task_type, "task enqueued in transaction");
        Ok(id)
    }

    fn prepare(&self, task: Task, opts: &EnqueueOptions) -> Result<NewTask, EnqueueError> {
        let priority = opts.priority.unwrap_or(0);
        let max_attempts = opts.max_attempts.unwrap_or(self.default_max_attempts);
        self.guard.check_options(priority, max_attempts, opts.delay)?;

        let payload_json = task.payload_json()?;
        let payload_bytes = serde_json::to_vec(&payload_json)?.len();
        self.guard.check_payload(payload_bytes)?;

        let delay = opts
            .delay
            .map(|d| chrono::Duration::milliseconds(d.as_millis().min(i64::MAX as u128) as i64))
            .unwrap_or_else(chrono::Duration::zero);

        Ok(NewTask {
            task_type: task.kind().as_str().to_string(),
            payload_json,
            run_at: Utc::now() + delay,
            priority,
            max_attempts,
            replay_of_task_id: None,
        })
    }
}
