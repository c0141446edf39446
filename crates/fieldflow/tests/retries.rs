mod common;

use common::{office_task, setup_db};
use fieldflow::queue::error_codes::ErrorCode;
use fieldflow::queue::retry::RetryConfig;
use fieldflow::queue::runner::{
    AttemptRef, FailureDecision, TaskRunner, REASON_MAX_ATTEMPTS_EXCEEDED, REASON_NON_RETRYABLE,
};
use fieldflow::queue::{AttemptsRepo, TaskStatus, TasksRepo};

use chrono::Utc;
use serial_test::serial;
use uuid::Uuid;

fn runner(tasks: &TasksRepo, attempts: &AttemptsRepo) -> TaskRunner {
    TaskRunner::new(
        tasks.clone(),
        attempts.clone(),
        RetryConfig {
            base_seconds: 1,
            max_seconds: 15,
            jitter_pct: 0.0, // deterministic test
        },
    )
}

/// Lease the task, open its attempt row and fail it with `code`.
async fn fail_once(
    tasks: &TasksRepo,
    attempts: &AttemptsRepo,
    runner: &TaskRunner,
    code: ErrorCode,
) -> (Uuid, i32, FailureDecision) {
    let task = tasks.lease_one("worker-a", 30).await.unwrap().unwrap();
    let attempt = attempts
        .start_attempt(task.id, task.attempts, "worker-a")
        .await
        .unwrap();

    let decision = runner
        .on_failure(
            &AttemptRef {
                task_id: task.id,
                attempt_id: attempt.id,
                worker_id: "worker-a",
                attempt_no: task.attempts,
                max_attempts: task.max_attempts,
                latency_ms: 5,
            },
            code,
            "boom",
        )
        .await
        .unwrap();
    (task.id, task.attempts, decision)
}

async fn make_runnable(pool: &sqlx::PgPool, id: Uuid) {
    sqlx::query("UPDATE tasks SET run_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
#[serial]
async fn retry_schedules_increasing_run_at() {
    let pool = setup_db().await;
    let tasks = TasksRepo::new(pool.clone());
    let attempts = AttemptsRepo::new(pool.clone());
    let runner = runner(&tasks, &attempts);

    let id = office_task(&pool, 10).await;

    let before = Utc::now();
    let (_, n1, d1) = fail_once(&tasks, &attempts, &runner, ErrorCode::Timeout).await;
    let FailureDecision::Retrying { next_run_at: r1 } = d1.clone() else {
        panic!("expected retry, got {d1:?}");
    };
    assert_eq!(n1, 1);
    assert!(r1 >= before + chrono::Duration::milliseconds(900));

    let task = tasks.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.locked_by.is_none());
    assert_eq!(task.last_error_code.as_deref(), Some("TIMEOUT"));

    make_runnable(&pool, id).await;
    let before = Utc::now();
    let (_, n2, d2) = fail_once(&tasks, &attempts, &runner, ErrorCode::DependencyDown).await;
    let FailureDecision::Retrying { next_run_at: r2 } = d2.clone() else {
        panic!("expected retry, got {d2:?}");
    };
    assert_eq!(n2, 2);
    // base * 2^(2-1) = 2s
    assert!(r2 >= before + chrono::Duration::milliseconds(1900));
}

#[tokio::test]
#[serial]
async fn exhausting_attempts_fails_the_task() {
    let pool = setup_db().await;
    let tasks = TasksRepo::new(pool.clone());
    let attempts = AttemptsRepo::new(pool.clone());
    let runner = runner(&tasks, &attempts);

    let id = office_task(&pool, 2).await;

    let (_, _, d1) = fail_once(&tasks, &attempts, &runner, ErrorCode::RateLimit).await;
    assert!(matches!(d1, FailureDecision::Retrying { .. }));
    make_runnable(&pool, id).await;

    let (_, n2, d2) = fail_once(&tasks, &attempts, &runner, ErrorCode::RateLimit).await;
    assert_eq!(n2, 2);
    assert_eq!(
        d2,
        FailureDecision::Failed {
            reason_code: REASON_MAX_ATTEMPTS_EXCEEDED
        }
    );

    let task = tasks.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempts, 2);
    assert!(task.failed_at.is_some());
    assert_eq!(
        task.failure_reason_code.as_deref(),
        Some(REASON_MAX_ATTEMPTS_EXCEEDED)
    );

    let history = attempts.list_for_task(id).await.unwrap();
    let numbers: Vec<i32> = history.iter().map(|a| a.attempt_no).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert!(history.iter().all(|a| a.status == "failed"));

    // failed tasks are never leased again
    assert!(tasks.lease_one("worker-b", 30).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn non_retryable_error_fails_on_first_attempt() {
    let pool = setup_db().await;
    let tasks = TasksRepo::new(pool.clone());
    let attempts = AttemptsRepo::new(pool.clone());
    let runner = runner(&tasks, &attempts);

    let id = office_task(&pool, 5).await;
    let (_, _, decision) = fail_once(&tasks, &attempts, &runner, ErrorCode::BadPayload).await;

    assert_eq!(
        decision,
        FailureDecision::Failed {
            reason_code: REASON_NON_RETRYABLE
        }
    );
    let task = tasks.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempts, 1);
    assert_eq!(task.last_error_code.as_deref(), Some("BAD_PAYLOAD"));
}

#[tokio::test]
#[serial]
async fn success_closes_attempt_with_latency() {
    let pool = setup_db().await;
    let tasks = TasksRepo::new(pool.clone());
    let attempts = AttemptsRepo::new(pool.clone());
    let runner = runner(&tasks, &attempts);

    let id = office_task(&pool, 3).await;
    let task = tasks.lease_one("worker-a", 30).await.unwrap().unwrap();
    let attempt = attempts
        .start_attempt(task.id, task.attempts, "worker-a")
        .await
        .unwrap();

    let recorded = runner
        .on_success(&AttemptRef {
            task_id: id,
            attempt_id: attempt.id,
            worker_id: "worker-a",
            attempt_no: 1,
            max_attempts: 3,
            latency_ms: 42,
        })
        .await
        .unwrap();
    assert!(recorded);

    let task = tasks.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Succeeded);
    assert!(task.completed_at.is_some());

    let history = attempts.list_for_task(id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, "succeeded");
    assert_eq!(history[0].latency_ms, Some(42));
    assert!(history[0].finished_at.is_some());
}

#[tokio::test]
#[serial]
async fn success_on_last_attempt_stops_retrying() {
    let pool = setup_db().await;
    let tasks = TasksRepo::new(pool.clone());
    let attempts = AttemptsRepo::new(pool.clone());
    let runner = runner(&tasks, &attempts);

    let id = office_task(&pool, 3).await;
    for _ in 0..2 {
        let (_, _, d) = fail_once(&tasks, &attempts, &runner, ErrorCode::DependencyDown).await;
        assert!(matches!(d, FailureDecision::Retrying { .. }));
        make_runnable(&pool, id).await;
    }

    let task = tasks.lease_one("worker-a", 30).await.unwrap().unwrap();
    assert_eq!(task.attempts, 3);
    let attempt = attempts
        .start_attempt(task.id, task.attempts, "worker-a")
        .await
        .unwrap();
    runner
        .on_success(&AttemptRef {
            task_id: id,
            attempt_id: attempt.id,
            worker_id: "worker-a",
            attempt_no: task.attempts,
            max_attempts: task.max_attempts,
            latency_ms: 7,
        })
        .await
        .unwrap();

    let history = attempts.list_for_task(id).await.unwrap();
    let succeeded = history.iter().filter(|a| a.status == "succeeded").count();
    assert_eq!(succeeded, 1);
    assert_eq!(history.len(), 3);
    assert_eq!(
        tasks.get_task(id).await.unwrap().unwrap().status,
        TaskStatus::Succeeded
    );
    assert!(tasks.lease_one("worker-b", 30).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn stale_worker_outcomes_are_not_recorded() {
    let pool = setup_db().await;
    let tasks = TasksRepo::new(pool.clone());
    let attempts = AttemptsRepo::new(pool.clone());
    let runner = runner(&tasks, &attempts);

    let id = office_task(&pool, 3).await;
    let task = tasks.lease_one("worker-a", 30).await.unwrap().unwrap();
    let attempt = attempts
        .start_attempt(task.id, task.attempts, "worker-a")
        .await
        .unwrap();
    let stale = AttemptRef {
        task_id: id,
        attempt_id: attempt.id,
        worker_id: "worker-a",
        attempt_no: task.attempts,
        max_attempts: task.max_attempts,
        latency_ms: 9,
    };

    sqlx::query("UPDATE tasks SET lock_expires_at = now() - interval '1 second' WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();
    tasks
        .reap_expired_leases(runner.retry_config())
        .await
        .unwrap();
    make_runnable(&pool, id).await;
    tasks.lease_one("worker-b", 30).await.unwrap().unwrap();

    assert!(!runner.on_success(&stale).await.unwrap());
    let decision = runner
        .on_failure(&stale, ErrorCode::DependencyDown, "late")
        .await
        .unwrap();
    assert_eq!(decision, FailureDecision::LeaseLost);

    let task = tasks.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.locked_by.as_deref(), Some("worker-b"));

    let history = attempts.list_for_task(id).await.unwrap();
    assert_eq!(history[0].status, "failed");
    assert_eq!(history[0].error_code.as_deref(), Some("LEASE_EXPIRED"));
    assert_eq!(history[0].latency_ms, None);
}
