use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Serialize)]
pub struct QueueStats {
    pub at: DateTime<Utc>,

    pub pending: i64,
    /// Pending tasks whose run_at has passed.
    pub runnable: i64,
    pub delayed: i64,
    pub running: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub oldest_runnable_age_secs: Option<f64>,

    // last 60s window
    pub tasks_per_sec: f64,
    pub success_rate: f64,
    pub retry_rate: f64,
    pub mean_latency_ms: f64,
}

#[derive(Debug, sqlx::FromRow)]
struct CountsRow {
    pending: i64,
    runnable: i64,
    running: i64,
    succeeded: i64,
    failed: i64,
    oldest_runnable_age_secs: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
struct WindowRow {
    finished_count: f64,
    succeeded_count: f64,
    retry_count: f64,
    started_count: f64,
    mean_latency_ms: f64,
}

#[derive(Clone)]
pub struct MetricsRepo {
    pool: PgPool,
}

impl MetricsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn snapshot(&self) -> anyhow::Result<QueueStats> {
        let counts = sqlx::query_as::<_, CountsRow>(
            r#"
            SELECT
              COUNT(*) FILTER (WHERE status = 'pending') AS pending,
              COUNT(*) FILTER (WHERE status = 'pending' AND run_at <= now()) AS runnable,
              COUNT(*) FILTER (WHERE status = 'running') AS running,
              COUNT(*) FILTER (WHERE status = 'succeeded') AS succeeded,
              COUNT(*) FILTER (WHERE status = 'failed') AS failed,
              EXTRACT(EPOCH FROM now() - MIN(run_at) FILTER (
                WHERE status = 'pending' AND run_at <= now()
              ))::float8 AS oldest_runnable_age_secs
            FROM tasks
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        // Attempts window stats (last 60 seconds)
        // - throughput ~ attempts finished per sec
        // - success_rate = succeeded / finished
        // - retry_rate = attempts with attempt_no >= 2 / attempts started
        let window = sqlx::query_as::<_, WindowRow>(
            r#"
            WITH a AS (
              SELECT *
              FROM task_attempts
              WHERE started_at >= now() - interval '60 seconds'
            ),
            finished AS (
              SELECT *
              FROM a
              WHERE finished_at IS NOT NULL
            )
            SELECT
              (SELECT COUNT(*) FROM finished)::float8 AS finished_count,
              (SELECT COUNT(*) FROM finished WHERE status = 'succeeded')::float8 AS succeeded_count,
              (SELECT COUNT(*) FROM a WHERE attempt_no >= 2)::float8 AS retry_count,
              (SELECT COUNT(*) FROM a)::float8 AS started_count,
              COALESCE((SELECT AVG(latency_ms)::float8 FROM finished), 0.0) AS mean_latency_ms
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let success_rate = if window.finished_count > 0.0 {
            window.succeeded_count / window.finished_count
        } else {
            0.0
        };

        let retry_rate = if window.started_count > 0.0 {
            window.retry_count / window.started_count
        } else {
            0.0
        };

        Ok(QueueStats {
            at: Utc::now(),
            pending: counts.pending,
            runnable: counts.runnable,
            delayed: counts.pending - counts.runnable,
            running: counts.running,
            succeeded: counts.succeeded,
            failed: counts.failed,
            oldest_runnable_age_secs: counts.oldest_runnable_age_secs,
            tasks_per_sec: window.finished_count / 60.0,
            success_rate,
            retry_rate,
            mean_latency_ms: window.mean_latency_ms,
        })
    }
}
