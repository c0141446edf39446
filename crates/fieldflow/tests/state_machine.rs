mod common;

use chrono::{DateTime, Datelike, Duration, SubsecRound, Utc};
use common::{
    business_offset, connect_calendar, intake, machine, setup_db, task_types, CalendarCall,
    FakeCalendar,
};
use fieldflow::jobs::history::HistoryRepo;
use fieldflow::jobs::machine::UNSCHEDULE_NOTE;
use fieldflow::jobs::repo::{JobFields, JobsRepo};
use fieldflow::jobs::{
    Actor, JobError, JobStateMachine, JobStatus, JobUpdate, ScheduleRequest, StatusHistoryEntry,
};
use fieldflow::queue::task::OfficeNotification;
use fieldflow::queue::EnqueueOptions;

use serial_test::serial;
use uuid::Uuid;

fn assert_chain(entries: &[StatusHistoryEntry]) {
    assert!(!entries.is_empty());
    assert_eq!(entries[0].from_status, None);
    assert_eq!(entries[0].to_status, JobStatus::New);
    for (i, pair) in entries.windows(2).enumerate() {
        assert_eq!(pair[1].from_status, Some(pair[0].to_status), "broken link at {i}");
        assert_eq!(pair[1].seq, pair[0].seq + 1);
    }
    assert_eq!(entries[0].seq, 1);
}

fn from_now(d: Duration) -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0) + d
}

fn schedule_req(job_id: Uuid, start: DateTime<Utc>) -> ScheduleRequest {
    ScheduleRequest {
        job_id,
        start,
        duration_minutes: Some(90),
        technician: Some("Alex".into()),
        actor: Actor::User,
        note: None,
    }
}

async fn new_job(m: &JobStateMachine) -> Uuid {
    m.create_job(intake("0412 345 678")).await.unwrap().job.id
}

#[tokio::test]
#[serial]
async fn create_job_numbers_logs_and_enqueues_follow_ups() {
    let pool = setup_db().await;
    let m = machine(&pool, FakeCalendar::new());
    let year = Utc::now().with_timezone(&business_offset()).year();

    let first = m.create_job(intake("+61 412 345 678")).await.unwrap();
    assert!(first.customer_created);
    assert_eq!(first.customer.phone, "0412345678");
    assert_eq!(first.job.job_number, format!("JOB-{year}-0001"));
    assert_eq!(first.job.status, JobStatus::New);

    let history = m.history(first.job.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].actor, Actor::System);
    assert_chain(&history);

    let mut types = task_types(&pool).await;
    types.sort();
    assert_eq!(
        types,
        vec![
            "send-customer-confirmation",
            "send-office-notification",
            "sync-customer-to-external-accounting",
        ]
    );

    // same phone: existing customer, no second accounting sync
    let second = m.create_job(intake("0412345678")).await.unwrap();
    assert!(!second.customer_created);
    assert_eq!(second.customer.id, first.customer.id);
    assert_eq!(second.job.job_number, format!("JOB-{year}-0002"));
    assert_eq!(task_types(&pool).await.len(), 5);
}

#[tokio::test]
#[serial]
async fn invalid_intake_writes_nothing() {
    let pool = setup_db().await;
    let m = machine(&pool, FakeCalendar::new());

    let mut bad = intake("0812345678");
    bad.customer_name = "Landline".into();
    assert!(matches!(m.create_job(bad).await, Err(JobError::Validation(_))));

    let jobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(jobs, 0);
    assert!(task_types(&pool).await.is_empty());
}

#[tokio::test]
#[serial]
async fn every_status_change_appends_one_linked_entry() {
    let pool = setup_db().await;
    let m = machine(&pool, FakeCalendar::new());
    let id = new_job(&m).await;

    m.change_status(id, JobStatus::Quoted, Actor::User, "quote sent")
        .await
        .unwrap();
    m.schedule(schedule_req(id, from_now(Duration::days(3))))
        .await
        .unwrap();
    m.change_status(id, JobStatus::InProgress, Actor::User, "")
        .await
        .unwrap();
    let done = m
        .change_status(id, JobStatus::Complete, Actor::User, "replaced pump seal")
        .await
        .unwrap();

    assert_eq!(done.job.status, JobStatus::Complete);
    assert!(done.job.completed_at.is_some());
    assert_eq!(done.entry.as_ref().unwrap().note, "replaced pump seal");

    let history = m.history(id).await.unwrap();
    let path: Vec<JobStatus> = history.iter().map(|e| e.to_status).collect();
    assert_eq!(
        path,
        vec![
            JobStatus::New,
            JobStatus::Quoted,
            JobStatus::Scheduled,
            JobStatus::InProgress,
            JobStatus::Complete,
        ]
    );
    assert_chain(&history);
}

#[tokio::test]
#[serial]
async fn rejected_and_repeated_changes_leave_the_ledger_alone() {
    let pool = setup_db().await;
    let m = machine(&pool, FakeCalendar::new());
    let id = new_job(&m).await;

    // same status is a no-op
    let same = m
        .change_status(id, JobStatus::New, Actor::User, "")
        .await
        .unwrap();
    assert!(same.entry.is_none());

    // scheduling needs an appointment time
    assert!(matches!(
        m.change_status(id, JobStatus::Scheduled, Actor::User, "").await,
        Err(JobError::Validation(_))
    ));

    m.change_status(id, JobStatus::Cancelled, Actor::User, "customer fixed it")
        .await
        .unwrap();

    // terminal states are final
    match m.change_status(id, JobStatus::Quoted, Actor::User, "").await {
        Err(JobError::InvalidTransition { from, to }) => {
            assert_eq!(from, JobStatus::Cancelled);
            assert_eq!(to, JobStatus::Quoted);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }

    assert_eq!(m.history(id).await.unwrap().len(), 2);
    assert!(matches!(
        m.change_status(Uuid::new_v4(), JobStatus::Quoted, Actor::User, "").await,
        Err(JobError::NotFound(_))
    ));
}

#[tokio::test]
#[serial]
async fn concurrent_changes_serialize_into_one_chain() {
    let pool = setup_db().await;
    let m = machine(&pool, FakeCalendar::new());
    let id = new_job(&m).await;

    let targets = [
        JobStatus::Quoted,
        JobStatus::WaitingParts,
        JobStatus::InProgress,
        JobStatus::Quoted,
        JobStatus::Complete,
        JobStatus::WaitingParts,
        JobStatus::Cancelled,
        JobStatus::InProgress,
    ];
    let mut handles = Vec::new();
    for to in targets {
        let m = m.clone();
        handles.push(tokio::spawn(async move {
            m.change_status(id, to, Actor::User, "race").await
        }));
    }

    let mut applied = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(outcome) if outcome.entry.is_some() => applied += 1,
            Ok(_) | Err(JobError::InvalidTransition { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let history = m.history(id).await.unwrap();
    assert_eq!(history.len(), applied + 1);
    assert_chain(&history);

    let job = m.get_job(id).await.unwrap();
    assert_eq!(Some(job.status), history.last().map(|e| e.to_status));
}

#[tokio::test]
#[serial]
async fn update_job_applies_fields_and_status_together() {
    let pool = setup_db().await;
    let m = machine(&pool, FakeCalendar::new());
    let id = new_job(&m).await;

    let out = m
        .update_job(JobUpdate {
            job_id: id,
            fields: JobFields {
                quoted_amount_cents: Some(45_000),
                ..Default::default()
            },
            status: Some(JobStatus::Quoted),
            actor: Actor::User,
            note: Some("quoted $450".into()),
        })
        .await
        .unwrap();
    assert_eq!(out.job.quoted_amount_cents, Some(45_000));
    assert_eq!(out.job.status, JobStatus::Quoted);
    assert_eq!(out.entry.unwrap().note, "quoted $450");

    let bad = m
        .update_job(JobUpdate {
            job_id: id,
            fields: JobFields {
                final_amount_cents: Some(-1),
                ..Default::default()
            },
            status: None,
            actor: Actor::User,
            note: None,
        })
        .await;
    assert!(matches!(bad, Err(JobError::Validation(_))));
    assert_eq!(m.history(id).await.unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn schedule_without_calendar_still_books_and_queues_reminder() {
    let pool = setup_db().await;
    let cal = FakeCalendar::new();
    let m = machine(&pool, cal.clone());
    let id = new_job(&m).await;

    let start = from_now(Duration::days(3));
    let out = m.schedule(schedule_req(id, start)).await.unwrap();

    assert_eq!(out.job.status, JobStatus::Scheduled);
    assert_eq!(out.job.scheduled_at, Some(start));
    assert_eq!(out.job.assigned_technician.as_deref(), Some("Alex"));
    assert!(!out.calendar_connected);
    assert!(!out.calendar_synced);
    assert!(out.calendar_event_id.is_none());
    assert!(cal.calls().is_empty());

    let reminder_at: DateTime<Utc> = sqlx::query_scalar(
        "SELECT run_at FROM tasks WHERE task_type = 'send-appointment-reminder'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    let expected = start - Duration::hours(24);
    assert!((reminder_at - expected).num_seconds().abs() <= 5);

    // no calendar to retry against
    assert!(!task_types(&pool)
        .await
        .contains(&"create-calendar-event".to_string()));
}

#[tokio::test]
#[serial]
async fn appointment_within_a_day_gets_no_reminder() {
    let pool = setup_db().await;
    let m = machine(&pool, FakeCalendar::new());
    let id = new_job(&m).await;

    m.schedule(schedule_req(id, from_now(Duration::hours(2))))
        .await
        .unwrap();

    assert!(!task_types(&pool)
        .await
        .contains(&"send-appointment-reminder".to_string()));
}

#[tokio::test]
#[serial]
async fn schedule_creates_then_reschedule_updates_the_event() {
    let pool = setup_db().await;
    connect_calendar(&pool).await;
    let cal = FakeCalendar::new();
    let m = machine(&pool, cal.clone());
    let id = new_job(&m).await;

    let first = m
        .schedule(schedule_req(id, from_now(Duration::days(2))))
        .await
        .unwrap();
    assert!(first.calendar_connected);
    assert!(first.calendar_synced);
    assert_eq!(first.calendar_event_id.as_deref(), Some("evt-1"));
    assert_eq!(first.job.calendar_event_id.as_deref(), Some("evt-1"));

    let moved = m
        .schedule(schedule_req(id, from_now(Duration::days(4))))
        .await
        .unwrap();
    assert_eq!(moved.calendar_event_id.as_deref(), Some("evt-1"));
    assert!(moved.entry.note.starts_with("Rescheduled"));
    assert_eq!(moved.entry.from_status, Some(JobStatus::Scheduled));

    let calls = cal.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(calls[0], CalendarCall::Create { .. }));
    assert_eq!(
        calls[1],
        CalendarCall::Update {
            event_id: "evt-1".into()
        }
    );
}

#[tokio::test]
#[serial]
async fn unreachable_calendar_does_not_block_scheduling() {
    let pool = setup_db().await;
    connect_calendar(&pool).await;
    let cal = FakeCalendar::new();
    cal.fail();
    let m = machine(&pool, cal.clone());
    let id = new_job(&m).await;

    let out = m
        .schedule(schedule_req(id, from_now(Duration::days(2))))
        .await
        .unwrap();

    assert_eq!(out.job.status, JobStatus::Scheduled);
    assert!(out.calendar_connected);
    assert!(!out.calendar_synced);
    assert!(out.job.calendar_event_id.is_none());
    assert!(task_types(&pool)
        .await
        .contains(&"create-calendar-event".to_string()));
}

#[tokio::test]
#[serial]
async fn hanging_calendar_times_out_and_job_is_still_scheduled() {
    let pool = setup_db().await;
    connect_calendar(&pool).await;
    let cal = FakeCalendar::new();
    cal.hang();
    let m = machine(&pool, cal.clone());
    let id = new_job(&m).await;

    let out = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        m.schedule(schedule_req(id, from_now(Duration::days(2)))),
    )
    .await
    .expect("schedule waited on the calendar")
    .unwrap();

    assert_eq!(out.job.status, JobStatus::Scheduled);
    assert!(!out.calendar_synced);
}

#[tokio::test]
#[serial]
async fn unschedule_clears_booking_and_deletes_event() {
    let pool = setup_db().await;
    connect_calendar(&pool).await;
    let cal = FakeCalendar::new();
    let m = machine(&pool, cal.clone());
    let id = new_job(&m).await;

    m.schedule(schedule_req(id, from_now(Duration::days(2))))
        .await
        .unwrap();
    let out = m.unschedule(id, Actor::User).await.unwrap();

    assert_eq!(out.job.status, JobStatus::New);
    assert!(out.job.scheduled_at.is_none());
    assert!(out.job.assigned_technician.is_none());
    assert!(out.job.calendar_event_id.is_none());
    assert!(out.calendar_deleted);
    assert_eq!(out.entry.note, UNSCHEDULE_NOTE);
    assert_eq!(out.entry.from_status, Some(JobStatus::Scheduled));
    assert!(cal.calls().contains(&CalendarCall::Delete {
        event_id: "evt-1".into()
    }));

    // only scheduled jobs can be unscheduled
    assert!(matches!(
        m.unschedule(id, Actor::User).await,
        Err(JobError::InvalidTransition { .. })
    ));
}

#[tokio::test]
#[serial]
async fn unschedule_commits_even_when_calendar_delete_fails() {
    let pool = setup_db().await;
    connect_calendar(&pool).await;
    let cal = FakeCalendar::new();
    let m = machine(&pool, cal.clone());
    let id = new_job(&m).await;

    m.schedule(schedule_req(id, from_now(Duration::days(2))))
        .await
        .unwrap();
    cal.fail();
    let out = m.unschedule(id, Actor::User).await.unwrap();

    assert!(!out.calendar_deleted);
    assert_eq!(m.get_job(id).await.unwrap().status, JobStatus::New);
}

#[tokio::test]
#[serial]
async fn crash_before_commit_leaves_job_and_ledger_untouched() {
    let pool = setup_db().await;
    let m = machine(&pool, FakeCalendar::new());
    let id = new_job(&m).await;
    let tasks_before = task_types(&pool).await.len();

    {
        let mut tx = pool.begin().await.unwrap();
        JobsRepo::lock_for_update(&mut *tx, id).await.unwrap().unwrap();
        JobsRepo::set_status(&mut *tx, id, JobStatus::Quoted)
            .await
            .unwrap();
        HistoryRepo::append(
            &mut *tx,
            id,
            Some(JobStatus::New),
            JobStatus::Quoted,
            Actor::User,
            "never committed",
        )
        .await
        .unwrap();
        fieldflow::queue::JobQueue::from_pool(pool.clone(), Default::default())
            .enqueue_in_tx(&mut *tx, OfficeNotification { job_id: id }, EnqueueOptions::default())
            .await
            .unwrap();
        // dropped without commit
    }

    assert_eq!(m.get_job(id).await.unwrap().status, JobStatus::New);
    assert_eq!(m.history(id).await.unwrap().len(), 1);
    assert_eq!(task_types(&pool).await.len(), tasks_before);
}

#[tokio::test]
#[serial]
async fn permissive_policy_allows_backward_moves_but_not_out_of_terminal() {
    let pool = setup_db().await;
    let mut settings = common::settings();
    settings.policy = fieldflow::jobs::TransitionPolicy::Permissive;
    let m = JobStateMachine::new(common::queue(&pool), FakeCalendar::new(), settings);
    let id = new_job(&m).await;

    m.change_status(id, JobStatus::InProgress, Actor::User, "")
        .await
        .unwrap();
    m.change_status(id, JobStatus::Quoted, Actor::User, "back to quoting")
        .await
        .unwrap();
    m.change_status(id, JobStatus::Complete, Actor::User, "")
        .await
        .unwrap();
    assert!(matches!(
        m.change_status(id, JobStatus::InProgress, Actor::User, "").await,
        Err(JobError::InvalidTransition { .. })
    ));
    assert_chain(&m.history(id).await.unwrap());
}

async fn booked_job(m: &JobStateMachine) -> Uuid {
    let id = new_job(m).await;
    let out = m
        .schedule(schedule_req(id, from_now(Duration::days(2))))
        .await
        .unwrap();
    assert_eq!(out.job.calendar_event_id.as_deref(), Some("evt-1"));
    id
}

#[tokio::test]
#[serial]
async fn update_job_back_to_new_clears_the_booking_and_event() {
    let pool = setup_db().await;
    connect_calendar(&pool).await;
    let cal = FakeCalendar::new();
    let m = machine(&pool, cal.clone());
    let id = booked_job(&m).await;

    let out = m
        .update_job(JobUpdate {
            job_id: id,
            fields: JobFields::default(),
            status: Some(JobStatus::New),
            actor: Actor::User,
            note: Some("customer will call back".into()),
        })
        .await
        .unwrap();

    assert_eq!(out.job.status, JobStatus::New);
    assert!(out.job.scheduled_at.is_none());
    assert!(out.job.assigned_technician.is_none());
    assert!(out.job.calendar_event_id.is_none());
    assert_eq!(out.entry.unwrap().from_status, Some(JobStatus::Scheduled));
    assert!(cal.calls().contains(&CalendarCall::Delete {
        event_id: "evt-1".into()
    }));
    assert_chain(&m.history(id).await.unwrap());
}

#[tokio::test]
#[serial]
async fn status_edits_cannot_book_an_appointment() {
    let pool = setup_db().await;
    connect_calendar(&pool).await;
    let cal = FakeCalendar::new();
    let m = machine(&pool, cal.clone());
    let id = new_job(&m).await;
    let tasks_before = task_types(&pool).await.len();

    let out = m
        .update_job(JobUpdate {
            job_id: id,
            fields: JobFields {
                assigned_technician: Some("Alex".into()),
                ..Default::default()
            },
            status: Some(JobStatus::Scheduled),
            actor: Actor::User,
            note: None,
        })
        .await;
    assert!(matches!(out, Err(JobError::Validation(_))));

    let job = m.get_job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::New);
    assert!(job.assigned_technician.is_none());
    assert!(cal.calls().is_empty());
    assert_eq!(task_types(&pool).await.len(), tasks_before);
    assert_eq!(m.history(id).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn cancelling_a_booked_job_removes_its_event() {
    let pool = setup_db().await;
    connect_calendar(&pool).await;
    let cal = FakeCalendar::new();
    let m = machine(&pool, cal.clone());
    let id = booked_job(&m).await;

    let out = m
        .update_job(JobUpdate {
            job_id: id,
            fields: JobFields::default(),
            status: Some(JobStatus::Cancelled),
            actor: Actor::User,
            note: Some("customer sold the house".into()),
        })
        .await
        .unwrap();

    assert_eq!(out.job.status, JobStatus::Cancelled);
    assert!(out.job.scheduled_at.is_none());
    assert!(out.job.calendar_event_id.is_none());
    assert_eq!(
        cal.calls().last(),
        Some(&CalendarCall::Delete {
            event_id: "evt-1".into()
        })
    );
}

#[tokio::test]
#[serial]
async fn cancelling_mid_visit_drops_the_event_but_keeps_the_visit_record() {
    let pool = setup_db().await;
    connect_calendar(&pool).await;
    let cal = FakeCalendar::new();
    let m = machine(&pool, cal.clone());
    let id = booked_job(&m).await;

    m.change_status(id, JobStatus::InProgress, Actor::User, "")
        .await
        .unwrap();
    let out = m
        .change_status(id, JobStatus::Cancelled, Actor::User, "unsafe site")
        .await
        .unwrap();

    assert!(out.job.scheduled_at.is_some());
    assert_eq!(out.job.assigned_technician.as_deref(), Some("Alex"));
    assert!(out.job.calendar_event_id.is_none());
    assert!(cal.calls().contains(&CalendarCall::Delete {
        event_id: "evt-1".into()
    }));
}

#[tokio::test]
#[serial]
async fn permissive_move_out_of_scheduled_clears_the_booking() {
    let pool = setup_db().await;
    connect_calendar(&pool).await;
    let cal = FakeCalendar::new();
    let mut settings = common::settings();
    settings.policy = fieldflow::jobs::TransitionPolicy::Permissive;
    let m = JobStateMachine::new(common::queue(&pool), cal.clone(), settings);
    let id = booked_job(&m).await;

    let out = m
        .change_status(id, JobStatus::Quoted, Actor::User, "re-quoting")
        .await
        .unwrap();

    assert_eq!(out.job.status, JobStatus::Quoted);
    assert!(out.job.scheduled_at.is_none());
    assert!(out.job.calendar_event_id.is_none());
    assert!(cal.calls().contains(&CalendarCall::Delete {
        event_id: "evt-1".into()
    }));
}

#[tokio::test]
#[serial]
async fn reschedule_without_technician_clears_the_assignment() {
    let pool = setup_db().await;
    let m = machine(&pool, FakeCalendar::new());
    let id = new_job(&m).await;

    m.schedule(schedule_req(id, from_now(Duration::days(2))))
        .await
        .unwrap();
    let mut req = schedule_req(id, from_now(Duration::days(3)));
    req.technician = None;
    let out = m.schedule(req).await.unwrap();

    assert_eq!(out.job.status, JobStatus::Scheduled);
    assert!(out.job.assigned_technician.is_none());
}

#[tokio::test]
#[serial]
async fn unschedule_that_cannot_read_credentials_changes_nothing() {
    let pool = setup_db().await;
    let cal = FakeCalendar::new();
    let m = machine(&pool, cal.clone());
    let id = new_job(&m).await;
    m.schedule(schedule_req(id, from_now(Duration::days(2))))
        .await
        .unwrap();

    sqlx::query("ALTER TABLE system_config RENAME TO system_config_away")
        .execute(&pool)
        .await
        .unwrap();
    let out = m.unschedule(id, Actor::User).await;
    sqlx::query("ALTER TABLE system_config_away RENAME TO system_config")
        .execute(&pool)
        .await
        .unwrap();

    assert!(out.is_err());
    let job = m.get_job(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Scheduled);
    assert!(job.scheduled_at.is_some());
    assert_eq!(m.history(id).await.unwrap().len(), 2);
}
