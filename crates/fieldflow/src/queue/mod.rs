pub mod attempts;
pub mod client;
pub mod enqueue_guard;
pub mod error_codes;
pub mod maintenance;
pub mod metrics;
pub mod model;
pub mod repo;
pub mod retry;
pub mod runner;
pub mod task;
pub mod timeline;

pub use attempts::AttemptsRepo;
pub use client::{EnqueueError, EnqueueOptions, JobQueue, QueueSettings};
pub use error_codes::ErrorCode;
pub use model::{QueuedTask, TaskStatus};
pub use repo::TasksRepo;
pub use task::{Task, TaskKind, TaskPayload};
