// src/queue/error_codes.rs
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Timeout,
    DependencyDown,
    RateLimit,
    DbError,
    Panic,
    BadPayload,
    UnknownTaskType,
    CalendarNotConnected,
    LeaseExpired,
    Unknown,
}

impl ErrorCode {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "TIMEOUT" => Self::Timeout,
            "DEPENDENCY_DOWN" => Self::DependencyDown,
            "RATE_LIMIT" => Self::RateLimit,
            "DB_ERROR" => Self::DbError,
            "PANIC" => Self::Panic,
            "BAD_PAYLOAD" => Self::BadPayload,
            "UNKNOWN_TASK_TYPE" => Self::UnknownTaskType,
            "CALENDAR_NOT_CONNECTED" => Self::CalendarNotConnected,
            "LEASE_EXPIRED" => Self::LeaseExpired,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::DependencyDown => "DEPENDENCY_DOWN",
            Self::RateLimit => "RATE_LIMIT",
            Self::DbError => "DB_ERROR",
            Self::Panic => "PANIC",
            Self::BadPayload => "BAD_PAYLOAD",
            Self::UnknownTaskType => "UNKNOWN_TASK_TYPE",
            Self::CalendarNotConnected => "CALENDAR_NOT_CONNECTED",
            Self::LeaseExpired => "LEASE_EXPIRED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn suggested_action(code: &str) -> &'static str {
    match ErrorCode::parse(code) {
        ErrorCode::Timeout => {
            "Check downstream latency (calendar, webhook). Raise the handler or gateway timeout if the remote is just slow."
        }
        ErrorCode::DependencyDown => {
            "Retry later. Check the webhook endpoint or calendar API health and credentials."
        }
        ErrorCode::RateLimit => {
            "Back off. Lower worker concurrency or ask the receiving side for a higher quota."
        }
        ErrorCode::DbError => "Retry is OK. Check database connectivity and lock contention.",
        ErrorCode::Panic => {
            "Investigate the handler crash in the worker logs. Replay once fixed."
        }
        ErrorCode::BadPayload => {
            "Non-retryable. The payload does not match the task type or refers to a missing job/customer."
        }
        ErrorCode::UnknownTaskType => {
            "Non-retryable. The row was written by a producer this worker version does not understand."
        }
        ErrorCode::CalendarNotConnected => {
            "Connect the calendar (fieldctl calendar connect) and replay the task."
        }
        ErrorCode::LeaseExpired => {
            "A worker died or stalled mid-task. Check worker restarts and handler run time vs lease."
        }
        ErrorCode::Unknown => {
            "Inspect error_message + logs. Decide if retryable; add mapping once understood."
        }
    }
}
