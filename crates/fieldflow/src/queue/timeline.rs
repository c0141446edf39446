use crate::queue::{
    attempts::AttemptsRepo, error_codes, model::TaskStatus, repo::TasksRepo,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct TaskTimeline {
    pub task_id: Uuid,
    pub task_type: String,
    pub status: TaskStatus,
    pub replay_of_task_id: Option<Uuid>,
    pub run_at: DateTime<Utc>,

    pub next_run_at: Option<DateTime<Utc>>,
    pub last_worker_id: Option<String>,
    pub last_error: Option<LastError>,
    pub failure_reason_code: Option<String>,

    pub attempts: Vec<TimelineAttempt>,

    /// One-line narrative for operators, e.g. "failed after 3 attempts: TIMEOUT".
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct TimelineAttempt {
    pub id: Uuid,
    pub attempt_no: i32,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub latency_ms: Option<i32>,
    pub worker_id: String,
    pub suggested_action: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LastError {
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

pub async fn build_timeline(
    tasks: &TasksRepo,
    attempts: &AttemptsRepo,
    task_id: Uuid,
) -> anyhow::Result<Option<TaskTimeline>> {
    let task = match tasks.get_task(task_id).await? {
        Some(t) => t,
        None => return Ok(None),
    };

    let raw_attempts = attempts.list_for_task(task_id).await?;

    let last_worker_id = raw_attempts.last().map(|a| a.worker_id.clone());
    let last_failed = raw_attempts.iter().rev().find(|a| a.status == "failed");

    let last_error = last_failed.map(|a| LastError {
        error_code: a.error_code.clone(),
        error_message: a.error_message.clone(),
    });

    let next_run_at = (task.status == TaskStatus::Pending).then_some(task.run_at);

    let attempts_out: Vec<TimelineAttempt> = raw_attempts
        .into_iter()
        .map(|a| {
            let suggested = a
                .error_code
                .as_deref()
                .map(|code| error_codes::suggested_action(code).to_string());

            TimelineAttempt {
                id: a.id,
                attempt_no: a.attempt_no,
                status: a.status,
                started_at: a.started_at,
                finished_at: a.finished_at,
                error_code: a.error_code,
                error_message: a.error_message,
                latency_ms: a.latency_ms,
                worker_id: a.worker_id,
                suggested_action: suggested,
            }
        })
        .collect();

    let summary = summarize(
        task.status,
        task.attempts,
        task.max_attempts,
        task.last_error_code.as_deref(),
        task.failure_reason_code.as_deref(),
    );

    Ok(Some(TaskTimeline {
        task_id: task.id,
        task_type: task.task_type,
        status: task.status,
        replay_of_task_id: task.replay_of_task_id,
        run_at: task.run_at,
        next_run_at,
        last_worker_id,
        last_error,
        failure_reason_code: task.failure_reason_code,
        attempts: attempts_out,
        summary,
    }))
}

fn summarize(
    status: TaskStatus,
    attempts: i32,
    max_attempts: i32,
    last_error_code: Option<&str>,
    failure_reason_code: Option<&str>,
) -> String {
    match status {
        TaskStatus::Pending if attempts == 0 => "waiting for its first attempt".to_string(),
        TaskStatus::Pending => format!(
            "retrying after {attempts}/{max_attempts} attempts, last error {}",
            last_error_code.unwrap_or("UNKNOWN")
        ),
        TaskStatus::Running => format!("attempt {attempts}/{max_attempts} in progress"),
        TaskStatus::Succeeded if attempts <= 1 => "succeeded on the first attempt".to_string(),
        TaskStatus::Succeeded => format!("succeeded on attempt {attempts}"),
        TaskStatus::Failed => format!(
            "failed after {attempts} attempt(s): {} ({})",
            last_error_code.unwrap_or("UNKNOWN"),
            failure_reason_code.unwrap_or("UNKNOWN")
        ),
    }
}
