//! The job state machine.
//!
//! Every accepted status change updates the job row and appends exactly one ledger entry in the
//! same transaction, with the job row locked (`FOR UPDATE`) so concurrent changes serialize.
//! Calendar calls happen outside that transaction and never decide whether it commits.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, SubsecRound, TimeZone, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::calendar::{
    CalendarCredentials, CalendarEvent, CalendarGateway, EventPatch, GatewayError,
    NewCalendarEvent,
};
use crate::config::Config;
use crate::jobs::{
    customers::{CustomersRepo, NewCustomer},
    error::JobError,
    history::HistoryRepo,
    model::{Actor, Customer, Job, JobStatus, ProductType, StatusHistoryEntry, Urgency},
    numbering,
    repo::{JobFields, JobsRepo, NewJob},
    transitions::TransitionPolicy,
};
use crate::queue::{
    client::{EnqueueOptions, JobQueue},
    task::{AppointmentReminder, CreateCalendarEvent, CustomerConfirmation, OfficeNotification, SyncCustomer},
};

pub const DEFAULT_DURATION_MINUTES: i64 = 60;
pub const UNSCHEDULE_NOTE: &str = "Appointment cancelled";

#[derive(Debug, Clone)]
pub struct MachineSettings {
    pub policy: TransitionPolicy,
    /// Offset used to decide which year a job number belongs to and where a day starts.
    pub business_offset: FixedOffset,
    pub calendar_timeout: Duration,
    /// How long before an appointment the reminder goes out.
    pub reminder_lead: chrono::Duration,
}

impl MachineSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            policy: cfg.transition_policy,
            business_offset: cfg.business_offset,
            calendar_timeout: cfg.calendar_timeout(),
            reminder_lead: chrono::Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobIntake {
    pub customer_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub suburb: String,
    pub product_type: ProductType,
    pub urgency: Urgency,
    pub issue_description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedJob {
    pub job: Job,
    pub customer: Customer,
    pub customer_created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub job: Job,
    /// `None` when the job already had the requested status.
    pub entry: Option<StatusHistoryEntry>,
}

struct AppliedTransition {
    job: Job,
    entry: StatusHistoryEntry,
    dropped_event: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub job_id: Uuid,
    pub fields: JobFields,
    pub status: Option<JobStatus>,
    pub actor: Actor,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub job_id: Uuid,
    pub start: DateTime<Utc>,
    /// Defaults to an hour.
    pub duration_minutes: Option<i64>,
    pub technician: Option<String>,
    pub actor: Actor,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleOutcome {
    pub job: Job,
    pub entry: StatusHistoryEntry,
    pub calendar_event_id: Option<String>,
    pub calendar_synced: bool,
    pub calendar_connected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnscheduleOutcome {
    pub job: Job,
    pub entry: StatusHistoryEntry,
    pub calendar_deleted: bool,
    pub calendar_connected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayAgenda {
    pub date: NaiveDate,
    pub jobs: Vec<Job>,
    pub calendar_events: Vec<CalendarEvent>,
    pub calendar_connected: bool,
    pub calendar_synced: bool,
}

#[derive(Clone)]
pub struct JobStateMachine {
    pool: PgPool,
    queue: JobQueue,
    jobs: JobsRepo,
    history: HistoryRepo,
    customers: CustomersRepo,
    calendar: Arc<dyn CalendarGateway>,
    credentials: CalendarCredentials,
    settings: MachineSettings,
}

impl JobStateMachine {
    pub fn new(
        queue: JobQueue,
        calendar: Arc<dyn CalendarGateway>,
        settings: MachineSettings,
    ) -> Self {
        let pool = queue.pool().clone();
        Self {
            jobs: JobsRepo::new(pool.clone()),
            history: HistoryRepo::new(pool.clone()),
            customers: CustomersRepo::new(pool.clone()),
            credentials: CalendarCredentials::new(pool.clone()),
            pool,
            queue,
            calendar,
            settings,
        }
    }

    pub fn jobs(&self) -> &JobsRepo {
        &self.jobs
    }

    pub fn customers(&self) -> &CustomersRepo {
        &self.customers
    }

    pub fn credentials(&self) -> &CalendarCredentials {
        &self.credentials
    }

    pub fn calendar(&self) -> &Arc<dyn CalendarGateway> {
        &self.calendar
    }

    // ----------------------------
    // Reads
    // ----------------------------

    pub async fn get_job(&self, job_id: Uuid) -> Result<Job, JobError> {
        self.jobs.get(job_id).await?.ok_or(JobError::NotFound(job_id))
    }

    pub async fn history(&self, job_id: Uuid) -> Result<Vec<StatusHistoryEntry>, JobError> {
        let entries = self.history.list_for_job(job_id).await?;
        if entries.is_empty() && self.jobs.get(job_id).await?.is_none() {
            return Err(JobError::NotFound(job_id));
        }
        Ok(entries)
    }

    /// Jobs booked on `date` (business time) plus whatever the calendar holds for that day.
    pub async fn day_agenda(&self, date: NaiveDate) -> Result<DayAgenda, JobError> {
        let (day_start, day_end) = self.day_bounds(date)?;
        let jobs = self.jobs.list_scheduled_between(day_start, day_end).await?;

        let token = self.credentials.refresh_token().await?;
        let calendar_connected = token.is_some();
        let (calendar_events, calendar_synced) = match token {
            Some(token) => match self
                .call_calendar(self.calendar.list_events_for_day(&token, day_start, day_end))
                .await
            {
                Ok(events) => (events, true),
                Err(e) => {
                    tracing::warn!(%date, error = %e, "calendar agenda unavailable");
                    (Vec::new(), false)
                }
            },
            None => (Vec::new(), false),
        };

        Ok(DayAgenda {
            date,
            jobs,
            calendar_events,
            calendar_connected,
            calendar_synced,
        })
    }

    // ----------------------------
    // Intake
    // ----------------------------

    /// Create the job (and its customer on first contact) with its first ledger entry.
    /// Confirmation, office notification and, for a new customer, accounting sync are
    /// enqueued in the same transaction.
    pub async fn create_job(&self, intake: JobIntake) -> Result<CreatedJob, JobError> {
        let intake = validate_intake(intake)?;
        let year = Utc::now().with_timezone(&self.settings.business_offset).year();

        let mut tx = self.pool.begin().await?;

        let (customer, customer_created) = CustomersRepo::find_or_create(
            &mut *tx,
            &NewCustomer {
                name: intake.customer_name.clone(),
                phone: intake.phone.clone(),
                email: intake.email.clone(),
                suburb: intake.suburb.clone(),
            },
        )
        .await?;

        let job_number = numbering::next_job_number(&mut *tx, year).await?;
        let job = JobsRepo::insert(
            &mut *tx,
            &NewJob {
                job_number,
                customer_id: customer.id,
                product_type: intake.product_type,
                urgency: intake.urgency,
                issue_description: intake.issue_description,
            },
        )
        .await?;

        HistoryRepo::append(&mut *tx, job.id, None, JobStatus::New, Actor::System, "Job created")
            .await?;

        if customer_created {
            self.queue
                .enqueue_in_tx(
                    &mut *tx,
                    SyncCustomer {
                        customer_id: customer.id,
                    },
                    EnqueueOptions::default(),
                )
                .await?;
        }
        self.queue
            .enqueue_in_tx(
                &mut *tx,
                CustomerConfirmation {
                    job_id: job.id,
                    job_number: job.job_number.clone(),
                    customer_phone: customer.phone.clone(),
                },
                EnqueueOptions::default(),
            )
            .await?;
        self.queue
            .enqueue_in_tx(
                &mut *tx,
                OfficeNotification { job_id: job.id },
                EnqueueOptions::default(),
            )
            .await?;

        tx.commit().await?;

        tracing::info!(job_id = %job.id, job_number = %job.job_number, customer_created, "job created");
        Ok(CreatedJob {
            job,
            customer,
            customer_created,
        })
    }

    // ----------------------------
    // Status changes
    // ----------------------------

    /// Move a job along its pipeline. Appointments are only booked through [`Self::schedule`];
    /// moving a booked job back or cancelling it clears the booking and removes the calendar
    /// event once the change is committed.
    pub async fn change_status(
        &self,
        job_id: Uuid,
        to: JobStatus,
        actor: Actor,
        note: &str,
    ) -> Result<TransitionOutcome, JobError> {
        let mut tx = self.pool.begin().await?;

        let job = JobsRepo::lock_for_update(&mut *tx, job_id)
            .await?
            .ok_or(JobError::NotFound(job_id))?;

        if job.status == to {
            tx.rollback().await?;
            return Ok(TransitionOutcome { job, entry: None });
        }

        let applied = self.apply_transition(&mut *tx, job, to, actor, note).await?;
        tx.commit().await?;

        Ok(self.finish_transition(applied).await)
    }

    /// Field edits with an optional status change, applied together.
    pub async fn update_job(&self, update: JobUpdate) -> Result<TransitionOutcome, JobError> {
        validate_fields(&update.fields)?;

        let mut tx = self.pool.begin().await?;
        let job = JobsRepo::lock_for_update(&mut *tx, update.job_id)
            .await?
            .ok_or(JobError::NotFound(update.job_id))?;

        let target = update.status.filter(|to| *to != job.status);
        if let Some(to) = target {
            self.check_transition(&job, to)?;
        }

        let job = JobsRepo::update_fields(&mut *tx, update.job_id, &update.fields).await?;
        let Some(to) = target else {
            tx.commit().await?;
            return Ok(TransitionOutcome { job, entry: None });
        };

        let note = update.note.as_deref().unwrap_or("");
        let applied = self
            .apply_transition(&mut *tx, job, to, update.actor, note)
            .await?;
        tx.commit().await?;

        Ok(self.finish_transition(applied).await)
    }

    // ----------------------------
    // Scheduling
    // ----------------------------

    /// Book (or move) the appointment. The calendar is updated first on a best-effort basis;
    /// the job is scheduled either way and the outcome says whether the calendar kept up.
    pub async fn schedule(&self, req: ScheduleRequest) -> Result<ScheduleOutcome, JobError> {
        let duration_minutes = req.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        if !(1..=24 * 60).contains(&duration_minutes) {
            return Err(JobError::Validation(format!(
                "duration must be between 1 and 1440 minutes, got {duration_minutes}"
            )));
        }
        let technician = req
            .technician
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        // stored with microsecond precision
        let start = req.start.trunc_subsecs(6);
        let end = start + chrono::Duration::minutes(duration_minutes);

        let job = self.get_job(req.job_id).await?;
        self.check(job.status, JobStatus::Scheduled)?;

        let token = self.credentials.refresh_token().await?;
        let calendar_connected = token.is_some();

        let mut created_event = None;
        let (event_id, calendar_synced) = match &token {
            Some(token) => {
                let event = self.event_for(&job, start, end, technician).await?;
                match self.push_event(token, job.calendar_event_id.as_deref(), &event).await {
                    Ok((id, created)) => {
                        if created {
                            created_event = Some(id.clone());
                        }
                        (Some(id), true)
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %job.id, error = %e, "calendar sync failed, scheduling anyway");
                        (job.calendar_event_id.clone(), false)
                    }
                }
            }
            None => (job.calendar_event_id.clone(), false),
        };

        let mut tx = self.pool.begin().await?;
        let locked = JobsRepo::lock_for_update(&mut *tx, req.job_id)
            .await?
            .ok_or(JobError::NotFound(req.job_id))?;
        let from = locked.status;

        if let Err(e) = self.check(from, JobStatus::Scheduled) {
            tx.rollback().await?;
            if let (Some(token), Some(id)) = (&token, &created_event) {
                if let Err(err) = self.call_calendar(self.calendar.delete_event(token, id)).await {
                    tracing::warn!(job_id = %req.job_id, error = %err, "could not remove orphaned calendar event");
                }
            }
            return Err(e);
        }

        let job =
            JobsRepo::set_schedule(&mut *tx, req.job_id, start, technician, event_id.as_deref())
                .await?;

        let default_note = format!(
            "{} for {}",
            if from == JobStatus::Scheduled { "Rescheduled" } else { "Scheduled" },
            start
                .with_timezone(&self.settings.business_offset)
                .format("%a %d %b %Y %H:%M")
        );
        let entry = HistoryRepo::append(
            &mut *tx,
            req.job_id,
            Some(from),
            JobStatus::Scheduled,
            req.actor,
            req.note.as_deref().unwrap_or(&default_note),
        )
        .await?;

        let remind_at = start - self.settings.reminder_lead;
        let now = Utc::now();
        if remind_at > now {
            let delay = (remind_at - now).to_std().unwrap_or_default();
            self.queue
                .enqueue_in_tx(
                    &mut *tx,
                    AppointmentReminder {
                        job_id: req.job_id,
                        scheduled_at: start,
                    },
                    EnqueueOptions::delayed(delay),
                )
                .await?;
        }

        if calendar_connected && !calendar_synced && event_id.is_none() {
            self.queue
                .enqueue_in_tx(
                    &mut *tx,
                    CreateCalendarEvent {
                        job_id: req.job_id,
                        scheduled_at: start,
                        duration_minutes,
                    },
                    EnqueueOptions::default(),
                )
                .await?;
        }

        tx.commit().await?;

        tracing::info!(
            job_id = %job.id,
            job_number = %job.job_number,
            scheduled_at = %start,
            calendar_connected,
            calendar_synced,
            "job scheduled"
        );

        Ok(ScheduleOutcome {
            job,
            entry,
            calendar_event_id: event_id,
            calendar_synced,
            calendar_connected,
        })
    }

    /// Back to `new`: the appointment, technician and calendar event are cleared.
    pub async fn unschedule(&self, job_id: Uuid, actor: Actor) -> Result<UnscheduleOutcome, JobError> {
        let token = self.credentials.refresh_token().await?;
        let calendar_connected = token.is_some();

        let mut tx = self.pool.begin().await?;
        let locked = JobsRepo::lock_for_update(&mut *tx, job_id)
            .await?
            .ok_or(JobError::NotFound(job_id))?;

        if locked.status != JobStatus::Scheduled {
            return Err(JobError::InvalidTransition {
                from: locked.status,
                to: JobStatus::New,
            });
        }

        let job = JobsRepo::clear_schedule(&mut *tx, job_id, JobStatus::New).await?;
        let entry = HistoryRepo::append(
            &mut *tx,
            job_id,
            Some(JobStatus::Scheduled),
            JobStatus::New,
            actor,
            UNSCHEDULE_NOTE,
        )
        .await?;
        tx.commit().await?;

        let calendar_deleted = match (&token, &locked.calendar_event_id) {
            (Some(token), Some(event_id)) => {
                match self.call_calendar(self.calendar.delete_event(token, event_id)).await {
                    Ok(()) | Err(GatewayError::NotFound) => true,
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "calendar event not deleted");
                        false
                    }
                }
            }
            _ => false,
        };

        tracing::info!(job_id = %job_id, job_number = %job.job_number, calendar_deleted, "job unscheduled");
        Ok(UnscheduleOutcome {
            job,
            entry,
            calendar_deleted,
            calendar_connected,
        })
    }

    /// Record an event created after the fact, but only if the job is still booked for
    /// `scheduled_at` and has no event yet. Returns whether the id was stored.
    pub async fn attach_calendar_event(
        &self,
        job_id: Uuid,
        event_id: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<bool, JobError> {
        let mut tx = self.pool.begin().await?;
        let job = JobsRepo::lock_for_update(&mut *tx, job_id)
            .await?
            .ok_or(JobError::NotFound(job_id))?;

        let still_current = job.status == JobStatus::Scheduled
            && job.scheduled_at == Some(scheduled_at)
            && job.calendar_event_id.is_none();
        if !still_current {
            tx.rollback().await?;
            return Ok(false);
        }

        JobsRepo::set_calendar_event(&mut *tx, job_id, Some(event_id)).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Calendar event body for a job's appointment.
    pub async fn event_for(
        &self,
        job: &Job,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        technician: Option<&str>,
    ) -> Result<NewCalendarEvent, JobError> {
        let customer = self.customers.get(job.customer_id).await?;

        let mut description = format!(
            "{}\nUrgency: {}\n\n{}",
            job.job_number, job.urgency, job.issue_description
        );
        if let Some(c) = &customer {
            description.push_str(&format!("\n\nCustomer: {} ({})", c.name, c.phone));
        }
        if let Some(t) = technician.or(job.assigned_technician.as_deref()) {
            description.push_str(&format!("\nTechnician: {t}"));
        }

        Ok(NewCalendarEvent {
            title: format!(
                "{} {} - {}",
                job.job_number,
                job.product_type,
                customer.as_ref().map(|c| c.name.as_str()).unwrap_or("customer")
            ),
            description,
            location: customer.map(|c| c.suburb),
            start,
            end,
        })
    }

    // ----------------------------
    // Internals
    // ----------------------------

    fn check(&self, from: JobStatus, to: JobStatus) -> Result<(), JobError> {
        if self.settings.policy.allows(from, to) {
            Ok(())
        } else {
            Err(JobError::InvalidTransition { from, to })
        }
    }

    /// Rules for a plain status change, on top of the transition policy.
    fn check_transition(&self, job: &Job, to: JobStatus) -> Result<(), JobError> {
        self.check(job.status, to)?;
        if to == JobStatus::Scheduled {
            return Err(JobError::Validation(
                "a job is scheduled by booking an appointment time".into(),
            ));
        }
        Ok(())
    }

    /// Write a checked status change and its ledger entry on the caller's transaction.
    async fn apply_transition(
        &self,
        conn: &mut PgConnection,
        job: Job,
        to: JobStatus,
        actor: Actor,
        note: &str,
    ) -> Result<AppliedTransition, JobError> {
        self.check_transition(&job, to)?;
        let from = job.status;

        // back before the visit: the appointment is off
        let clears_booking = job.scheduled_at.is_some()
            && (matches!(to, JobStatus::New | JobStatus::Quoted | JobStatus::WaitingParts)
                || (to == JobStatus::Cancelled && from == JobStatus::Scheduled));
        let dropped_event = if clears_booking || to == JobStatus::Cancelled {
            job.calendar_event_id.clone()
        } else {
            None
        };

        let updated = if clears_booking {
            JobsRepo::clear_schedule(&mut *conn, job.id, to).await?
        } else {
            if dropped_event.is_some() {
                JobsRepo::set_calendar_event(&mut *conn, job.id, None).await?;
            }
            JobsRepo::set_status(&mut *conn, job.id, to).await?
        };
        let entry = HistoryRepo::append(&mut *conn, job.id, Some(from), to, actor, note).await?;

        Ok(AppliedTransition {
            job: updated,
            entry,
            dropped_event,
        })
    }

    /// Post-commit side effects of a status change.
    async fn finish_transition(&self, applied: AppliedTransition) -> TransitionOutcome {
        let AppliedTransition {
            job,
            entry,
            dropped_event,
        } = applied;
        tracing::info!(
            job_id = %job.id,
            job_number = %job.job_number,
            from = ?entry.from_status,
            to = %entry.to_status,
            "job status changed"
        );

        if let Some(event_id) = dropped_event {
            self.delete_event_best_effort(job.id, &event_id).await;
        }

        TransitionOutcome {
            job,
            entry: Some(entry),
        }
    }

    fn day_bounds(&self, date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), JobError> {
        let start = date
            .and_hms_opt(0, 0, 0)
            .and_then(|t| self.settings.business_offset.from_local_datetime(&t).single())
            .ok_or_else(|| JobError::Validation(format!("invalid date {date}")))?;
        let start = start.with_timezone(&Utc);
        Ok((start, start + chrono::Duration::days(1)))
    }

    /// Run a gateway call under the configured calendar timeout.
    pub async fn call_calendar<T>(
        &self,
        fut: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        match tokio::time::timeout(self.settings.calendar_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(GatewayError::Timeout),
        }
    }

    /// Update the existing event, or create one. Returns the event id and whether it is new.
    async fn push_event(
        &self,
        token: &str,
        existing: Option<&str>,
        event: &NewCalendarEvent,
    ) -> Result<(String, bool), GatewayError> {
        if let Some(event_id) = existing {
            let patch = EventPatch {
                title: Some(event.title.clone()),
                description: Some(event.description.clone()),
                location: event.location.clone(),
                start: Some(event.start),
                end: Some(event.end),
            };
            match self
                .call_calendar(self.calendar.update_event(token, event_id, &patch))
                .await
            {
                Ok(updated) => return Ok((updated.id, false)),
                Err(GatewayError::NotFound) => {
                    tracing::info!(event_id, "calendar event vanished, creating a new one");
                }
                Err(e) => return Err(e),
            }
        }

        let created = self
            .call_calendar(self.calendar.create_event(token, event))
            .await?;
        Ok((created.id, true))
    }

    async fn delete_event_best_effort(&self, job_id: Uuid, event_id: &str) {
        let token = match self.credentials.refresh_token().await {
            Ok(Some(token)) => token,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "could not read calendar credential");
                return;
            }
        };
        match self.call_calendar(self.calendar.delete_event(&token, event_id)).await {
            Ok(()) | Err(GatewayError::NotFound) => {}
            Err(e) => tracing::warn!(job_id = %job_id, error = %e, "calendar event not deleted"),
        }
    }
}

fn validate_intake(mut intake: JobIntake) -> Result<JobIntake, JobError> {
    intake.customer_name = intake.customer_name.trim().to_string();
    intake.suburb = intake.suburb.trim().to_string();
    intake.issue_description = intake.issue_description.trim().to_string();
    intake.phone = normalize_phone(&intake.phone);
    intake.email = intake
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());

    if intake.customer_name.chars().count() < 2 {
        return Err(JobError::Validation("customer name is too short".into()));
    }
    if !is_mobile_number(&intake.phone) {
        return Err(JobError::Validation(
            "phone must be an Australian mobile number (04xxxxxxxx)".into(),
        ));
    }
    if let Some(email) = &intake.email {
        if !email.contains('@') {
            return Err(JobError::Validation(format!("invalid email: {email}")));
        }
    }
    if intake.suburb.chars().count() < 2 {
        return Err(JobError::Validation("suburb is required".into()));
    }
    if intake.issue_description.chars().count() < 10 {
        return Err(JobError::Validation(
            "please describe the issue in at least 10 characters".into(),
        ));
    }
    Ok(intake)
}

fn validate_fields(fields: &JobFields) -> Result<(), JobError> {
    for (name, amount) in [
        ("quoted amount", fields.quoted_amount_cents),
        ("final amount", fields.final_amount_cents),
    ] {
        if amount.is_some_and(|a| a < 0) {
            return Err(JobError::Validation(format!("{name} cannot be negative")));
        }
    }
    Ok(())
}

/// Strip spaces, dashes and brackets; `+61 4…` becomes `04…`.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    match digits.strip_prefix("+61") {
        Some(rest) => format!("0{rest}"),
        None => digits,
    }
}

pub fn is_mobile_number(phone: &str) -> bool {
    phone.len() == 10 && phone.starts_with("04") && phone.chars().all(|c| c.is_ascii_digit())
}
