//! Handlers for every task type, wired into a [`HandlerRegistry`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::calendar::GatewayError;
use crate::dispatch::{HandlerOptions, HandlerRegistry, TaskContext, TaskError};
use crate::jobs::{JobError, JobStateMachine, JobStatus};
use crate::notify::{Channel, Envelope, Notifier, NotifyError};
use crate::queue::error_codes::ErrorCode;
use crate::queue::task::{
    AppointmentReminder, CreateCalendarEvent, CustomerConfirmation, OfficeNotification,
    SyncCustomer,
};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);
const CALENDAR_TASK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct HandlerDeps {
    pub machine: JobStateMachine,
    pub notifier: Arc<dyn Notifier>,
}

impl From<NotifyError> for TaskError {
    fn from(e: NotifyError) -> Self {
        let code = match &e {
            NotifyError::Timeout => ErrorCode::Timeout,
            NotifyError::RateLimited => ErrorCode::RateLimit,
            NotifyError::Http(_) | NotifyError::Rejected { .. } => ErrorCode::DependencyDown,
        };
        TaskError::new(code, e.to_string())
    }
}

impl From<GatewayError> for TaskError {
    fn from(e: GatewayError) -> Self {
        let code = match &e {
            GatewayError::NotConnected | GatewayError::Unauthorized(_) => {
                ErrorCode::CalendarNotConnected
            }
            GatewayError::Timeout => ErrorCode::Timeout,
            GatewayError::Remote { status: 429, .. } => ErrorCode::RateLimit,
            GatewayError::Http(_) | GatewayError::Remote { .. } | GatewayError::NotFound => {
                ErrorCode::DependencyDown
            }
            GatewayError::Decode(_) => ErrorCode::Unknown,
        };
        TaskError::new(code, e.to_string())
    }
}

impl From<JobError> for TaskError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::NotFound(_) | JobError::Validation(_) | JobError::InvalidTransition { .. } => {
                TaskError::bad_payload(e.to_string())
            }
            JobError::Store(err) => TaskError::db(err),
        }
    }
}

pub fn build_registry(deps: HandlerDeps) -> Arc<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    let notify = HandlerOptions::new().timeout(NOTIFY_TIMEOUT);

    {
        let deps = deps.clone();
        registry.register_with_options(
            move |p: SyncCustomer, ctx| {
                let deps = deps.clone();
                async move { sync_customer(&deps, p, ctx).await }
            },
            notify.clone(),
        );
    }
    {
        let deps = deps.clone();
        registry.register_with_options(
            move |p: CustomerConfirmation, ctx| {
                let deps = deps.clone();
                async move { send_confirmation(&deps, p, ctx).await }
            },
            notify.clone(),
        );
    }
    {
        let deps = deps.clone();
        registry.register_with_options(
            move |p: OfficeNotification, ctx| {
                let deps = deps.clone();
                async move { notify_office(&deps, p, ctx).await }
            },
            notify.clone(),
        );
    }
    {
        let deps = deps.clone();
        registry.register_with_options(
            move |p: AppointmentReminder, ctx| {
                let deps = deps.clone();
                async move { send_reminder(&deps, p, ctx).await }
            },
            notify,
        );
    }
    registry.register_with_options(
        move |p: CreateCalendarEvent, ctx| {
            let deps = deps.clone();
            async move { create_calendar_event(&deps, p, ctx).await }
        },
        HandlerOptions::new()
            .timeout(CALENDAR_TASK_TIMEOUT)
            .max_concurrency(2),
    );

    Arc::new(registry)
}

async fn sync_customer(deps: &HandlerDeps, p: SyncCustomer, _ctx: TaskContext) -> Result<(), TaskError> {
    let customer = deps
        .machine
        .customers()
        .get(p.customer_id)
        .await
        .map_err(TaskError::db)?
        .ok_or_else(|| TaskError::bad_payload(format!("customer {} not found", p.customer_id)))?;

    let envelope = Envelope {
        event: "customer.sync",
        data: json!({
            "customer_id": customer.id,
            "name": customer.name,
            "phone": customer.phone,
            "email": customer.email,
            "suburb": customer.suburb,
        }),
    };
    deps.notifier.send(Channel::Accounting, &envelope).await?;
    Ok(())
}

async fn send_confirmation(
    deps: &HandlerDeps,
    p: CustomerConfirmation,
    _ctx: TaskContext,
) -> Result<(), TaskError> {
    let envelope = Envelope {
        event: "job.confirmation",
        data: json!({
            "job_id": p.job_id,
            "job_number": p.job_number,
            "to": p.customer_phone,
            "message": format!(
                "Thanks, we have your request. Your job number is {}. We'll be in touch to book a time.",
                p.job_number
            ),
        }),
    };
    deps.notifier.send(Channel::Customer, &envelope).await?;
    Ok(())
}

async fn notify_office(
    deps: &HandlerDeps,
    p: OfficeNotification,
    _ctx: TaskContext,
) -> Result<(), TaskError> {
    let job = deps.machine.get_job(p.job_id).await?;

    let envelope = Envelope {
        event: "job.created",
        data: json!({
            "job_id": job.id,
            "job_number": job.job_number,
            "product_type": job.product_type,
            "urgency": job.urgency,
            "issue_description": job.issue_description,
        }),
    };
    deps.notifier.send(Channel::Office, &envelope).await?;
    Ok(())
}

async fn send_reminder(
    deps: &HandlerDeps,
    p: AppointmentReminder,
    _ctx: TaskContext,
) -> Result<(), TaskError> {
    let job = deps.machine.get_job(p.job_id).await?;
    if job.status != JobStatus::Scheduled || job.scheduled_at != Some(p.scheduled_at) {
        tracing::info!(job_id = %job.id, "appointment changed since reminder was queued, skipping");
        return Ok(());
    }

    let customer = deps
        .machine
        .customers()
        .get(job.customer_id)
        .await
        .map_err(TaskError::db)?
        .ok_or_else(|| TaskError::bad_payload(format!("customer {} not found", job.customer_id)))?;

    let envelope = Envelope {
        event: "appointment.reminder",
        data: json!({
            "job_id": job.id,
            "job_number": job.job_number,
            "to": customer.phone,
            "scheduled_at": p.scheduled_at,
            "technician": job.assigned_technician,
        }),
    };
    deps.notifier.send(Channel::Customer, &envelope).await?;
    Ok(())
}

/// Retry path for an appointment whose calendar event could not be created at booking time.
async fn create_calendar_event(
    deps: &HandlerDeps,
    p: CreateCalendarEvent,
    _ctx: TaskContext,
) -> Result<(), TaskError> {
    let machine = &deps.machine;
    let job = machine.get_job(p.job_id).await?;

    if job.status != JobStatus::Scheduled || job.scheduled_at != Some(p.scheduled_at) {
        tracing::info!(job_id = %job.id, "appointment changed, calendar event no longer needed");
        return Ok(());
    }
    if job.calendar_event_id.is_some() {
        return Ok(());
    }

    let token = machine
        .credentials()
        .refresh_token()
        .await
        .map_err(TaskError::db)?
        .ok_or(GatewayError::NotConnected)?;

    let end = p.scheduled_at + chrono::Duration::minutes(p.duration_minutes.max(1));
    let event = machine.event_for(&job, p.scheduled_at, end, None).await?;
    let created = machine
        .call_calendar(machine.calendar().create_event(&token, &event))
        .await?;

    let attached = machine
        .attach_calendar_event(job.id, &created.id, p.scheduled_at)
        .await?;
    if !attached {
        tracing::info!(job_id = %job.id, event_id = %created.id, "job moved on while creating event, removing it");
        if let Err(e) = machine
            .call_calendar(machine.calendar().delete_event(&token, &created.id))
            .await
        {
            tracing::warn!(job_id = %job.id, error = %e, "could not remove orphaned calendar event");
        }
    } else {
        tracing::info!(job_id = %job.id, event_id = %created.id, "calendar event attached");
    }
    Ok(())
}
