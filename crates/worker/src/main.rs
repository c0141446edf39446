use std::sync::Arc;
use std::time::Duration;

use fieldflow::api;
use fieldflow::calendar::{CalendarGateway, GoogleCalendar};
use fieldflow::config;
use fieldflow::db;
use fieldflow::dispatch::{Dispatcher, DispatcherConfig};
use fieldflow::handlers::{build_registry, HandlerDeps};
use fieldflow::jobs::{JobStateMachine, MachineSettings};
use fieldflow::logging;
use fieldflow::notify::{Notifier, WebhookNotifier};
use fieldflow::queue::maintenance::MaintenanceRepo;
use fieldflow::queue::{JobQueue, QueueSettings};

use tokio_util::sync::CancellationToken;

const NOTIFY_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::from_env()?;
    logging::init(&cfg.log)?;

    tracing::info!(
        worker_id = %cfg.worker_id,
        concurrency = cfg.concurrency,
        lease_seconds = cfg.lease_seconds,
        reap_interval_ms = cfg.reap_interval_ms,
        api = %cfg.admin_addr.as_deref().unwrap_or("disabled"),
        migrate_on_startup = cfg.migrate_on_startup,
        transition_policy = ?cfg.transition_policy,
        maintenance_interval_secs = cfg.maintenance_interval_secs,
        "fieldflow worker starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let queue = JobQueue::from_pool(pool.clone(), QueueSettings::from_config(&cfg));
    let calendar: Arc<dyn CalendarGateway> = Arc::new(GoogleCalendar::new(cfg.calendar.clone())?);
    let machine = JobStateMachine::new(queue.clone(), calendar, MachineSettings::from_config(&cfg));
    let notifier: Arc<dyn Notifier> =
        Arc::new(WebhookNotifier::new(&cfg.notify, NOTIFY_HTTP_TIMEOUT)?);

    let registry = build_registry(HandlerDeps { machine, notifier });
    let dispatcher = Dispatcher::new(
        queue.clone(),
        registry,
        cfg.retry.clone(),
        DispatcherConfig::from_config(&cfg),
    )?;

    let shutdown = CancellationToken::new();

    // ---- API task ----
    let app = api::router(api::ApiState {
        queue: queue.clone(),
    });
    let api_addr = cfg.admin_addr.clone();
    let api_handle = {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Some(addr) = api_addr {
                let listener = tokio::net::TcpListener::bind(&addr).await?;
                tracing::info!(%addr, "admin api listening");
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { token.cancelled().await })
                    .await?;
            }
            Ok::<(), anyhow::Error>(())
        })
    };

    // ---- Maintenance task ----
    let maintenance_handle = {
        let maintenance = MaintenanceRepo::new(pool.clone());
        let retention = cfg.retention.clone();
        let interval = Duration::from_secs(cfg.maintenance_interval_secs.max(1));
        let token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                match maintenance.run_retention(&retention).await {
                    Ok(r) if r.succeeded_deleted > 0 || r.failed_deleted > 0 => tracing::info!(
                        succeeded_deleted = r.succeeded_deleted,
                        failed_deleted = r.failed_deleted,
                        "pruned finished tasks"
                    ),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "retention pass failed"),
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        })
    };

    // ---- Shutdown signal ----
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "could not listen for ctrl-c");
                return;
            }
            tracing::info!("shutdown requested, finishing tasks in hand");
            token.cancel();
        });
    }

    let result = dispatcher.run(shutdown.clone()).await;
    shutdown.cancel();

    match api_handle.await {
        Ok(Err(e)) => tracing::error!(error = %e, "admin api failed"),
        Err(e) => tracing::error!(error = %e, "admin api task panicked"),
        Ok(Ok(())) => {}
    }
    if let Err(e) = maintenance_handle.await {
        tracing::error!(error = %e, "maintenance task panicked");
    }

    queue.close().await;
    tracing::info!("fieldflow worker stopped");
    result
}
