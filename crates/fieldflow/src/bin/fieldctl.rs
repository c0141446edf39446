use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use fieldflow::calendar::{CalendarCredentials, CalendarGateway, GoogleCalendar};
use fieldflow::config::Config;
use fieldflow::jobs::{JobStateMachine, MachineSettings};
use fieldflow::queue::repo::ReplayOutcome;
use fieldflow::queue::timeline::build_timeline;
use fieldflow::queue::{JobQueue, QueueSettings};
use fieldflow::{db, logging};

/// Operator tooling for the fieldflow task queue and job ledger.
///
/// Reads the same environment as the worker (DATABASE_URL, FIELDFLOW_*).
#[derive(Parser, Debug)]
#[command(name = "fieldctl")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending database migrations.
    Migrate,
    /// Queue depth and last-minute throughput.
    Stats,
    /// Failed-terminal tasks, most recent first.
    Failed {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Attempt history of a task.
    Timeline { task_id: Uuid },
    /// Enqueue a fresh copy of a failed task.
    Replay { task_id: Uuid },
    /// Status ledger of a job, by id or job number.
    History { job: String },
    /// Booked jobs and calendar events for a day (YYYY-MM-DD, business time).
    Agenda { date: NaiveDate },
    #[command(subcommand)]
    Calendar(CalendarCommand),
}

#[derive(Subcommand, Debug)]
enum CalendarCommand {
    /// Store a refresh token obtained from the authorization flow.
    Connect { refresh_token: String },
    Disconnect,
    Status,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = Config::from_env()?;
    logging::init(&cfg.log)?;

    let pool = db::make_pool(&cfg.database_url).await?;
    let queue = JobQueue::from_pool(pool.clone(), QueueSettings::from_config(&cfg));

    match cli.command {
        Command::Migrate => {
            db::run_migrations(&pool).await?;
            println!("migrations applied");
        }
        Command::Stats => print_json(&queue.metrics().snapshot().await?)?,
        Command::Failed { limit } => print_json(&queue.tasks().list_failed(limit).await?)?,
        Command::Timeline { task_id } => {
            match build_timeline(queue.tasks(), queue.attempts(), task_id).await? {
                Some(tl) => print_json(&tl)?,
                None => anyhow::bail!("task {task_id} not found"),
            }
        }
        Command::Replay { task_id } => match queue.tasks().replay_task(task_id, None).await? {
            ReplayOutcome::Replayed(new_id) => println!("replayed {task_id} as {new_id}"),
            ReplayOutcome::NotFound => anyhow::bail!("task {task_id} not found"),
            ReplayOutcome::NotFailed(status) => {
                anyhow::bail!("task {task_id} is {status}; only failed tasks can be replayed")
            }
        },
        Command::History { job } => {
            let machine = state_machine(&cfg, queue.clone())?;
            let job_id = match job.parse::<Uuid>() {
                Ok(id) => id,
                Err(_) => machine
                    .jobs()
                    .get_by_number(&job)
                    .await?
                    .map(|j| j.id)
                    .ok_or_else(|| anyhow::anyhow!("job {job} not found"))?,
            };
            print_json(&machine.history(job_id).await?)?;
        }
        Command::Agenda { date } => {
            let machine = state_machine(&cfg, queue.clone())?;
            print_json(&machine.day_agenda(date).await?)?;
        }
        Command::Calendar(cmd) => {
            let creds = CalendarCredentials::new(pool.clone());
            match cmd {
                CalendarCommand::Connect { refresh_token } => {
                    creds.connect(&refresh_token).await?;
                    println!("calendar connected");
                }
                CalendarCommand::Disconnect => {
                    creds.disconnect().await?;
                    println!("calendar disconnected");
                }
                CalendarCommand::Status => print_json(&creds.status().await?)?,
            }
        }
    }

    queue.close().await;
    Ok(())
}

fn state_machine(cfg: &Config, queue: JobQueue) -> anyhow::Result<JobStateMachine> {
    let calendar: Arc<dyn CalendarGateway> = Arc::new(GoogleCalendar::new(cfg.calendar.clone())?);
    Ok(JobStateMachine::new(
        queue,
        calendar,
        MachineSettings::from_config(cfg),
    ))
}
