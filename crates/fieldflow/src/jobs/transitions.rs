use crate::jobs::model::JobStatus;

/// How strictly status changes are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Only edges of the service pipeline are accepted.
    #[default]
    Strict,
    /// Any change except leaving a terminal state. For data migrated from older systems.
    Permissive,
}

impl TransitionPolicy {
    pub fn allows(&self, from: JobStatus, to: JobStatus) -> bool {
        match self {
            TransitionPolicy::Strict => is_pipeline_edge(from, to),
            TransitionPolicy::Permissive => !from.is_terminal() || from == to,
        }
    }
}

/// The strict graph:
/// - nothing leaves `complete` or `cancelled`
/// - `cancelled` is reachable from every other state
/// - forward moves may skip stages
/// - `scheduled -> new` (un-schedule) is the only backward move
/// - `scheduled -> scheduled` is a reschedule
pub fn is_pipeline_edge(from: JobStatus, to: JobStatus) -> bool {
    if from.is_terminal() {
        return false;
    }
    if to == JobStatus::Cancelled {
        return true;
    }
    match (from, to) {
        (JobStatus::Scheduled, JobStatus::New) => true,
        (JobStatus::Scheduled, JobStatus::Scheduled) => true,
        _ => match (from.pipeline_rank(), to.pipeline_rank()) {
            (Some(a), Some(b)) => b > a,
            _ => false,
        },
    }
}
