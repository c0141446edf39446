use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::jobs::model::{Job, JobStatus, ProductType, Urgency};

#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_number: String,
    pub customer_id: Uuid,
    pub product_type: ProductType,
    pub urgency: Urgency,
    pub issue_description: String,
}

/// Field changes; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct JobFields {
    pub assigned_technician: Option<String>,
    pub quoted_amount_cents: Option<i64>,
    pub final_amount_cents: Option<i64>,
    pub completion_notes: Option<String>,
}

#[derive(Clone)]
pub struct JobsRepo {
    pool: PgPool,
}

impl JobsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    pub async fn get_by_number(&self, job_number: &str) -> anyhow::Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE job_number = $1")
            .bind(job_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Jobs with an appointment in `[from, to)`, earliest first.
    pub async fn list_scheduled_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, Job>(
            r#"
            SELECT *
            FROM jobs
            WHERE scheduled_at >= $1
              AND scheduled_at < $2
              AND status NOT IN ('cancelled', 'complete')
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Lock the job row for the rest of the transaction.
    pub async fn lock_for_update(conn: &mut PgConnection, job_id: Uuid) -> anyhow::Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(job)
    }

    pub async fn insert(conn: &mut PgConnection, job: &NewJob) -> anyhow::Result<Job> {
        let row = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (job_number, customer_id, product_type, urgency, issue_description, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&job.job_number)
        .bind(job.customer_id)
        .bind(job.product_type.as_str())
        .bind(job.urgency.as_str())
        .bind(&job.issue_description)
        .bind(JobStatus::New.as_str())
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }

    /// Write a new status. `completed_at` is stamped when entering `complete`.
    pub async fn set_status(
        conn: &mut PgConnection,
        job_id: Uuid,
        to: JobStatus,
    ) -> anyhow::Result<Job> {
        let row = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = $2,
                completed_at = CASE WHEN $2 = 'complete' THEN now() ELSE completed_at END,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(to.as_str())
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }

    pub async fn set_schedule(
        conn: &mut PgConnection,
        job_id: Uuid,
        scheduled_at: DateTime<Utc>,
        technician: Option<&str>,
        calendar_event_id: Option<&str>,
    ) -> anyhow::Result<Job> {
        let row = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'scheduled',
                scheduled_at = $2,
                assigned_technician = $3,
                calendar_event_id = $4,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(scheduled_at)
        .bind(technician)
        .bind(calendar_event_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }

    /// Move to `to` with no appointment, technician or calendar event.
    pub async fn clear_schedule(
        conn: &mut PgConnection,
        job_id: Uuid,
        to: JobStatus,
    ) -> anyhow::Result<Job> {
        let row = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = $2,
                scheduled_at = NULL,
                assigned_technician = NULL,
                calendar_event_id = NULL,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(to.as_str())
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }

    pub async fn set_calendar_event(
        conn: &mut PgConnection,
        job_id: Uuid,
        calendar_event_id: Option<&str>,
    ) -> anyhow::Result<Job> {
        let row = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET calendar_event_id = $2,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(calendar_event_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }

    pub async fn update_fields(
        conn: &mut PgConnection,
        job_id: Uuid,
        fields: &JobFields,
    ) -> anyhow::Result<Job> {
        let row = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET assigned_technician = COALESCE($2, assigned_technician),
                quoted_amount_cents = COALESCE($3, quoted_amount_cents),
                final_amount_cents = COALESCE($4, final_amount_cents),
                completion_notes = COALESCE($5, completion_notes),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(&fields.assigned_technician)
        .bind(fields.quoted_amount_cents)
        .bind(fields.final_amount_cents)
        .bind(&fields.completion_notes)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }
}
