pub mod customers;
pub mod error;
pub mod history;
pub mod machine;
pub mod model;
pub mod numbering;
pub mod repo;
pub mod transitions;

pub use error::JobError;
pub use machine::{
    CreatedJob, DayAgenda, JobIntake, JobStateMachine, JobUpdate, MachineSettings,
    ScheduleOutcome, ScheduleRequest, TransitionOutcome, UnscheduleOutcome,
};
pub use model::{Actor, Customer, Job, JobStatus, ProductType, StatusHistoryEntry, Urgency};
pub use transitions::TransitionPolicy;
