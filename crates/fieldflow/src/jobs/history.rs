use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::jobs::model::{Actor, JobStatus, StatusHistoryEntry};

#[derive(Clone)]
pub struct HistoryRepo {
    pool: PgPool,
}

impl HistoryRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one ledger entry. Must run in the same transaction as the job update,
    /// with the job row already locked so `seq` cannot race.
    pub async fn append(
        conn: &mut PgConnection,
        job_id: Uuid,
        from: Option<JobStatus>,
        to: JobStatus,
        actor: Actor,
        note: &str,
    ) -> anyhow::Result<StatusHistoryEntry> {
        let entry = sqlx::query_as::<_, StatusHistoryEntry>(
            r#"
            INSERT INTO job_status_history (job_id, seq, from_status, to_status, actor, note)
            VALUES (
              $1,
              COALESCE((SELECT MAX(seq) FROM job_status_history WHERE job_id = $1), 0) + 1,
              $2, $3, $4, $5
            )
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(from.map(|s| s.as_str()))
        .bind(to.as_str())
        .bind(actor.as_str())
        .bind(note)
        .fetch_one(&mut *conn)
        .await?;

        Ok(entry)
    }

    /// Ledger for one job, oldest first.
    pub async fn list_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<StatusHistoryEntry>> {
        let rows = sqlx::query_as::<_, StatusHistoryEntry>(
            r#"
            SELECT *
            FROM job_status_history
            WHERE job_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
