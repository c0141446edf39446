use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

/// How long finished tasks are kept before the maintenance loop removes them.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub succeeded_max_age_hours: i64,
    /// The newest N succeeded tasks are kept regardless of age.
    pub succeeded_keep_latest: i64,
    pub failed_max_age_days: i64,
    pub batch: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            succeeded_max_age_hours: 24,
            succeeded_keep_latest: 1000,
            failed_max_age_days: 7,
            batch: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub succeeded_deleted: u64,
    pub failed_deleted: u64,
}

#[derive(Clone)]
pub struct MaintenanceRepo {
    pool: PgPool,
}

impl MaintenanceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete succeeded tasks finished before `cutoff`, sparing the `keep_latest` newest.
    /// Attempts go with them through ON DELETE CASCADE. Returns rows deleted.
    pub async fn prune_succeeded(
        &self,
        cutoff: DateTime<Utc>,
        keep_latest: i64,
        batch: i64,
    ) -> anyhow::Result<u64> {
        let deleted = sqlx::query(
            r#"
            WITH keep AS (
                SELECT id
                FROM tasks
                WHERE status = 'succeeded'
                ORDER BY completed_at DESC NULLS LAST, id DESC
                LIMIT $2
            ),
            candidates AS (
                SELECT id
                FROM tasks
                WHERE status = 'succeeded'
                  AND COALESCE(completed_at, updated_at) < $1
                  AND id NOT IN (SELECT id FROM keep)
                ORDER BY completed_at ASC NULLS FIRST
                FOR UPDATE SKIP LOCKED
                LIMIT $3
            )
            DELETE FROM tasks t
            USING candidates c
            WHERE t.id = c.id
            "#,
        )
        .bind(cutoff)
        .bind(keep_latest.max(0))
        .bind(batch.max(1))
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted)
    }

    /// Delete failed-terminal tasks that failed before `cutoff`. Returns rows deleted.
    pub async fn prune_failed(&self, cutoff: DateTime<Utc>, batch: i64) -> anyhow::Result<u64> {
        let deleted = sqlx::query(
            r#"
            WITH candidates AS (
                SELECT id
                FROM tasks
                WHERE status = 'failed'
                  AND COALESCE(failed_at, updated_at) < $1
                ORDER BY failed_at ASC NULLS FIRST
                FOR UPDATE SKIP LOCKED
                LIMIT $2
            )
            DELETE FROM tasks t
            USING candidates c
            WHERE t.id = c.id
            "#,
        )
        .bind(cutoff)
        .bind(batch.max(1))
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted)
    }

    /// One retention pass with the configured limits.
    pub async fn run_retention(&self, cfg: &RetentionConfig) -> anyhow::Result<PruneReport> {
        let succeeded_deleted = self
            .prune_succeeded(
                cutoff_hours(cfg.succeeded_max_age_hours),
                cfg.succeeded_keep_latest,
                cfg.batch,
            )
            .await?;
        let failed_deleted = self
            .prune_failed(cutoff_days(cfg.failed_max_age_days), cfg.batch)
            .await?;

        Ok(PruneReport {
            succeeded_deleted,
            failed_deleted,
        })
    }
}

/// Convenience: compute cutoff like "now - N days"
pub fn cutoff_days(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

pub fn cutoff_hours(hours: i64) -> DateTime<Utc> {
    Utc::now() - Duration::hours(hours)
}
