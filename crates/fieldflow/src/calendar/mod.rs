//! External calendar access.
//!
//! Every gateway call returns a [`GatewayError`] on failure. Callers in the job state machine
//! treat those as advisory: the job mutation commits regardless.

pub mod credentials;
pub mod google;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use credentials::{CalendarConnection, CalendarCredentials};
pub use google::GoogleCalendar;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCalendarEvent {
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Partial update; `None` fields are left as they are on the remote event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub html_link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reminder {
    pub method: &'static str,
    pub minutes: u32,
}

/// Attached to every created event: an email a day before and a popup an hour before.
pub const EVENT_REMINDERS: [Reminder; 2] = [
    Reminder {
        method: "email",
        minutes: 24 * 60,
    },
    Reminder {
        method: "popup",
        minutes: 60,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("calendar is not connected")]
    NotConnected,
    #[error("calendar rejected credentials: {0}")]
    Unauthorized(String),
    #[error("calendar call timed out")]
    Timeout,
    #[error("calendar request failed: {0}")]
    Http(String),
    #[error("calendar returned {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("calendar event not found")]
    NotFound,
    #[error("unexpected calendar response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait CalendarGateway: Send + Sync {
    async fn create_event(
        &self,
        refresh_token: &str,
        event: &NewCalendarEvent,
    ) -> Result<CalendarEvent, GatewayError>;

    async fn update_event(
        &self,
        refresh_token: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, GatewayError>;

    async fn delete_event(&self, refresh_token: &str, event_id: &str) -> Result<(), GatewayError>;

    /// Events overlapping `[day_start, day_end)`, ordered by start time.
    async fn list_events_for_day(
        &self,
        refresh_token: &str,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, GatewayError>;
}
