//! Typed task payloads.
//!
//! Every kind of deferred work has its own payload struct. Producers enqueue a [`Task`];
//! the queue stores `task_type` + `payload_json`, and each typed handler in the registry
//! decodes the payload back into its own struct.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "sync-customer-to-external-accounting")]
    SyncCustomerToAccounting,
    #[serde(rename = "send-customer-confirmation")]
    SendCustomerConfirmation,
    #[serde(rename = "send-office-notification")]
    SendOfficeNotification,
    #[serde(rename = "send-appointment-reminder")]
    SendAppointmentReminder,
    #[serde(rename = "create-calendar-event")]
    CreateCalendarEvent,
}

impl TaskKind {
    pub const ALL: [TaskKind; 5] = [
        TaskKind::SyncCustomerToAccounting,
        TaskKind::SendCustomerConfirmation,
        TaskKind::SendOfficeNotification,
        TaskKind::SendAppointmentReminder,
        TaskKind::CreateCalendarEvent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::SyncCustomerToAccounting => "sync-customer-to-external-accounting",
            TaskKind::SendCustomerConfirmation => "send-customer-confirmation",
            TaskKind::SendOfficeNotification => "send-office-notification",
            TaskKind::SendAppointmentReminder => "send-appointment-reminder",
            TaskKind::CreateCalendarEvent => "create-calendar-event",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task type: {0}")]
pub struct UnknownTaskType(pub String);

impl FromStr for TaskKind {
    type Err = UnknownTaskType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownTaskType(s.to_string()))
    }
}

/// A payload type bound to exactly one [`TaskKind`].
pub trait TaskPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: TaskKind;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCustomer {
    pub customer_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerConfirmation {
    pub job_id: Uuid,
    pub job_number: String,
    pub customer_phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficeNotification {
    pub job_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentReminder {
    pub job_id: Uuid,
    /// The appointment this reminder was issued for; a rescheduled job makes it stale.
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCalendarEvent {
    pub job_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i64,
}

impl TaskPayload for SyncCustomer {
    const KIND: TaskKind = TaskKind::SyncCustomerToAccounting;
}

impl TaskPayload for CustomerConfirmation {
    const KIND: TaskKind = TaskKind::SendCustomerConfirmation;
}

impl TaskPayload for OfficeNotification {
    const KIND: TaskKind = TaskKind::SendOfficeNotification;
}

impl TaskPayload for AppointmentReminder {
    const KIND: TaskKind = TaskKind::SendAppointmentReminder;
}

impl TaskPayload for CreateCalendarEvent {
    const KIND: TaskKind = TaskKind::CreateCalendarEvent;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    SyncCustomerToAccounting(SyncCustomer),
    SendCustomerConfirmation(CustomerConfirmation),
    SendOfficeNotification(OfficeNotification),
    SendAppointmentReminder(AppointmentReminder),
    CreateCalendarEvent(CreateCalendarEvent),
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::SyncCustomerToAccounting(_) => TaskKind::SyncCustomerToAccounting,
            Task::SendCustomerConfirmation(_) => TaskKind::SendCustomerConfirmation,
            Task::SendOfficeNotification(_) => TaskKind::SendOfficeNotification,
            Task::SendAppointmentReminder(_) => TaskKind::SendAppointmentReminder,
            Task::CreateCalendarEvent(_) => TaskKind::CreateCalendarEvent,
        }
    }

    pub fn payload_json(&self) -> Result<Value, serde_json::Error> {
        match self {
            Task::SyncCustomerToAccounting(p) => serde_json::to_value(p),
            Task::SendCustomerConfirmation(p) => serde_json::to_value(p),
            Task::SendOfficeNotification(p) => serde_json::to_value(p),
            Task::SendAppointmentReminder(p) => serde_json::to_value(p),
            Task::CreateCalendarEvent(p) => serde_json::to_value(p),
        }
    }
}

impl From<SyncCustomer> for Task {
    fn from(p: SyncCustomer) -> Self {
        Task::SyncCustomerToAccounting(p)
    }
}

impl From<CustomerConfirmation> for Task {
    fn from(p: CustomerConfirmation) -> Self {
        Task::SendCustomerConfirmation(p)
    }
}

impl From<OfficeNotification> for Task {
    fn from(p: OfficeNotification) -> Self {
        Task::SendOfficeNotification(p)
    }
}

impl From<AppointmentReminder> for Task {
    fn from(p: AppointmentReminder) -> Self {
        Task::SendAppointmentReminder(p)
    }
}

impl From<CreateCalendarEvent> for Task {
    fn from(p: CreateCalendarEvent) -> Self {
        Task::CreateCalendarEvent(p)
    }
}
