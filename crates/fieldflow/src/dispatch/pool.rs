use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::dispatch::error::{DispatchError, TaskError};
use crate::dispatch::registry::{HandlerRegistry, TaskContext};
use crate::queue::{
    client::JobQueue,
    error_codes::ErrorCode,
    model::QueuedTask,
    repo::ReapReport,
    retry::RetryConfig,
    runner::{AttemptRef, FailureDecision, TaskRunner},
    task::TaskKind,
};

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    pub worker_id: String,
    /// Number of consumer slots; each slot runs one task at a time.
    pub concurrency: usize,
    pub lease_seconds: i64,
    pub poll_interval: Duration,
    pub reap_interval: Duration,
}

impl DispatcherConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            worker_id: cfg.worker_id.clone(),
            concurrency: cfg.concurrency,
            lease_seconds: cfg.lease_seconds,
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            reap_interval: Duration::from_millis(cfg.reap_interval_ms),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker-1".to_string(),
            concurrency: 4,
            lease_seconds: 30,
            poll_interval: Duration::from_millis(250),
            reap_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded {
        task_id: Uuid,
        attempt_no: i32,
    },
    Retrying {
        task_id: Uuid,
        attempt_no: i32,
        error_code: ErrorCode,
        next_run_at: DateTime<Utc>,
    },
    Failed {
        task_id: Uuid,
        attempt_no: i32,
        error_code: ErrorCode,
        reason_code: &'static str,
    },
    /// The lease moved to another worker; this delivery recorded nothing.
    LeaseLost {
        task_id: Uuid,
        attempt_no: i32,
    },
}

/// How a handler run ended.
enum Execution {
    Finished(Result<(), TaskError>),
    /// The handler was stopped because the lease could not be kept.
    LeaseLost,
}

/// Fixed-size pool of consumers pulling from the task queue.
#[derive(Clone)]
pub struct Dispatcher {
    queue: JobQueue,
    registry: Arc<HandlerRegistry>,
    runner: TaskRunner,
    cfg: DispatcherConfig,
}

impl Dispatcher {
    /// Fails when a task type has no handler or the pool would be empty.
    pub fn new(
        queue: JobQueue,
        registry: Arc<HandlerRegistry>,
        retry: RetryConfig,
        cfg: DispatcherConfig,
    ) -> Result<Self, DispatchError> {
        registry.ensure_complete()?;
        if cfg.concurrency == 0 {
            return Err(DispatchError::Config("concurrency must be at least 1".into()));
        }
        if cfg.lease_seconds < 1 {
            return Err(DispatchError::Config("lease must be at least 1 second".into()));
        }

        let runner = TaskRunner::new(queue.tasks().clone(), queue.attempts().clone(), retry);
        Ok(Self {
            queue,
            registry,
            runner,
            cfg,
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.cfg
    }

    /// Run all slots plus the lease reaper until `shutdown` is cancelled.
    /// Slots finish the task in hand before exiting.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(
            worker_id = %self.cfg.worker_id,
            concurrency = self.cfg.concurrency,
            lease_seconds = self.cfg.lease_seconds,
            "dispatcher starting"
        );

        let mut set = JoinSet::new();

        for slot in 0..self.cfg.concurrency {
            let this = self.clone();
            let token = shutdown.clone();
            let slot_id = format!("{}-{}", self.cfg.worker_id, slot);
            set.spawn(async move { this.slot_loop(slot_id, token).await });
        }

        {
            let this = self.clone();
            let token = shutdown.clone();
            set.spawn(async move { this.reaper_loop(token).await });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "dispatcher slot exited abnormally");
            }
        }

        tracing::info!(worker_id = %self.cfg.worker_id, "dispatcher stopped");
        Ok(())
    }

    async fn slot_loop(&self, worker_id: String, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.process_next(&worker_id).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(worker_id = %worker_id, error = %e, "queue error, backing off");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.cfg.poll_interval) => {}
            }
        }
    }

    async fn reaper_loop(&self, shutdown: CancellationToken) {
        let mut tick = tokio::time::interval(self.cfg.reap_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {}
            }
            match self.reap_once().await {
                Ok(r) if r.requeued > 0 || r.failed > 0 => tracing::warn!(
                    requeued = r.requeued,
                    failed = r.failed,
                    "reaped expired leases"
                ),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "lease reaper failed"),
            }
        }
    }

    pub async fn reap_once(&self) -> anyhow::Result<ReapReport> {
        self.queue
            .tasks()
            .reap_expired_leases(self.runner.retry_config())
            .await
    }

    /// Lease one runnable task, run its handler and record the outcome.
    /// Returns `None` when nothing was runnable.
    pub async fn process_next(&self, worker_id: &str) -> anyhow::Result<Option<TaskOutcome>> {
        let Some(task) = self
            .queue
            .tasks()
            .lease_one(worker_id, self.cfg.lease_seconds)
            .await?
        else {
            return Ok(None);
        };

        let span = tracing::info_span!(
            "task",
            task_id = %task.id,
            task_type = %task.task_type,
            attempt_no = task.attempts,
            worker_id = %worker_id,
        );

        self.deliver(task, worker_id).instrument(span).await.map(Some)
    }

    async fn deliver(&self, task: QueuedTask, worker_id: &str) -> anyhow::Result<TaskOutcome> {
        let attempt_no = task.attempts;
        let attempt = self
            .queue
            .attempts()
            .start_attempt(task.id, attempt_no, worker_id)
            .await?;

        tracing::debug!("task leased");
        let start = Instant::now();
        let result = self.execute(&task, worker_id).await;
        let latency_ms = start.elapsed().as_millis().min(i32::MAX as u128) as i32;

        let attempt_ref = AttemptRef {
            task_id: task.id,
            attempt_id: attempt.id,
            worker_id,
            attempt_no,
            max_attempts: task.max_attempts,
            latency_ms,
        };

        let lease_lost = TaskOutcome::LeaseLost {
            task_id: task.id,
            attempt_no,
        };

        let result = match result {
            Execution::Finished(result) => result,
            Execution::LeaseLost => {
                tracing::warn!(latency_ms, "handler stopped, lease lost");
                return Ok(lease_lost);
            }
        };

        match result {
            Ok(()) => {
                if !self.runner.on_success(&attempt_ref).await? {
                    return Ok(lease_lost);
                }
                tracing::info!(latency_ms, "task succeeded");
                Ok(TaskOutcome::Succeeded {
                    task_id: task.id,
                    attempt_no,
                })
            }
            Err(err) => {
                let decision = self
                    .runner
                    .on_failure(&attempt_ref, err.code, &err.message)
                    .await?;
                match decision {
                    FailureDecision::Retrying { next_run_at } => {
                        tracing::warn!(
                            error_code = %err.code,
                            error = %err.message,
                            %next_run_at,
                            "task failed, retry scheduled"
                        );
                        Ok(TaskOutcome::Retrying {
                            task_id: task.id,
                            attempt_no,
                            error_code: err.code,
                            next_run_at,
                        })
                    }
                    FailureDecision::Failed { reason_code } => {
                        tracing::error!(
                            error_code = %err.code,
                            error = %err.message,
                            reason_code,
                            "task failed terminally"
                        );
                        Ok(TaskOutcome::Failed {
                            task_id: task.id,
                            attempt_no,
                            error_code: err.code,
                            reason_code,
                        })
                    }
                    FailureDecision::LeaseLost => Ok(lease_lost),
                }
            }
        }
    }

    /// Run the handler while renewing the lease, so long handlers are not reaped.
    /// The handler is dropped (and its task aborted) once the lease is gone: another worker
    /// refused the renewal, or renewals kept failing for a whole lease period.
    async fn execute(&self, task: &QueuedTask, worker_id: &str) -> Execution {
        let kind: TaskKind = match task.task_type.parse() {
            Ok(kind) => kind,
            Err(e) => {
                return Execution::Finished(Err(TaskError::new(
                    ErrorCode::UnknownTaskType,
                    e.to_string(),
                )))
            }
        };

        let Some(entry) = self.registry.handler_for(kind) else {
            return Execution::Finished(Err(TaskError::new(
                ErrorCode::UnknownTaskType,
                format!("no handler for task_type={kind}"),
            )));
        };

        let ctx = TaskContext {
            task_id: task.id,
            attempt_no: task.attempts,
            max_attempts: task.max_attempts,
            worker_id: worker_id.to_string(),
        };

        let run = entry.run(task.payload_json.clone(), ctx);
        tokio::pin!(run);

        let lease = Duration::from_secs(self.cfg.lease_seconds as u64);
        let beat_every = Duration::from_secs((self.cfg.lease_seconds as u64 / 3).max(1));
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + beat_every, beat_every);
        let mut renewed_at = Instant::now();

        loop {
            tokio::select! {
                res = &mut run => return Execution::Finished(res),
                _ = heartbeat.tick() => {
                    match self
                        .queue
                        .tasks()
                        .extend_lease(task.id, worker_id, self.cfg.lease_seconds)
                        .await
                    {
                        Ok(true) => renewed_at = Instant::now(),
                        Ok(false) => return Execution::LeaseLost,
                        Err(e) if renewed_at.elapsed() >= lease => {
                            tracing::warn!(error = %e, "lease expired while renewals were failing");
                            return Execution::LeaseLost;
                        }
                        Err(e) => tracing::warn!(error = %e, "could not extend lease"),
                    }
                }
            }
        }
    }
}
