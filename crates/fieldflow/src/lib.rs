//! Service-job tracking core: a durable task queue, its dispatcher, the job state machine
//! with its status-history ledger, and the calendar gateway.

pub mod api;
pub mod calendar;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod handlers;
pub mod jobs;
pub mod logging;
pub mod notify;
pub mod queue;
