//! Worker wiring and lifecycle.

use axum::{Router, routing::get};
use axum_helpers::health_router;
use core_config::app_info;
use eyre::{Result, WrapErr};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use domain_agents::{AgentService, PgAgentRepository};
use domain_commands::{CommandQueue, PgCommandRepository};
use domain_events::{EventBus, PgEventRepository};
use domain_pricing::models::RunCounters;
use domain_pricing::{
    Consolidator, HttpBackfillProvider, PgPricingRepository, PricingService,
};
use domain_replicas::emergency::{EmergencyConfig, EmergencyOrchestrator};
use domain_replicas::{PgReplicaRepository, ReplicaCoordinator, ReplicaService};

use crate::config::Config;
use crate::partitions;

type Agents = AgentService<PgAgentRepository, PgEventRepository, PgPricingRepository>;
type Orchestrator = EmergencyOrchestrator<
    PgReplicaRepository,
    PgAgentRepository,
    PgCommandRepository,
    PgEventRepository,
    PgPricingRepository,
>;
type Coordinator = ReplicaCoordinator<
    PgReplicaRepository,
    PgAgentRepository,
    PgCommandRepository,
    PgEventRepository,
    PgPricingRepository,
>;

struct Services {
    agents: Agents,
    events: EventBus<PgEventRepository>,
    coordinator: Coordinator,
    orchestrator: Orchestrator,
    consolidator: Arc<Consolidator<PgPricingRepository>>,
}

fn build(db: &DatabaseConnection, config: &Config) -> Services {
    let agent_repository = Arc::new(PgAgentRepository::new(db.clone()));
    let pricing_repository = Arc::new(PgPricingRepository::new(db.clone()));

    let events = EventBus::new(PgEventRepository::new(db.clone()));
    let commands = CommandQueue::new(PgCommandRepository::new(db.clone()), events.clone());
    let pricing = PricingService::new(PgPricingRepository::new(db.clone()));
    let agents = AgentService::new(agent_repository.clone(), events.clone(), pricing.clone());

    let replicas = ReplicaService::new(
        Arc::new(PgReplicaRepository::new(db.clone())),
        commands.clone(),
        events.clone(),
    );

    let coordinator = ReplicaCoordinator::new(
        replicas.clone(),
        agent_repository.clone(),
        events.clone(),
        pricing.clone(),
        config.engine.replica_price_margin_percent,
        Duration::from_secs(config.engine.replica_coordinator_interval_seconds),
    );

    let orchestrator = EmergencyOrchestrator::new(
        replicas,
        agent_repository,
        commands,
        events.clone(),
        pricing,
        EmergencyConfig {
            rebalance_deadline_seconds: config.engine.emergency_rebalance_deadline_seconds,
            termination_deadline_seconds: config.engine.emergency_termination_deadline_seconds,
            failure_threshold: config.engine.emergency_failure_threshold,
            ..EmergencyConfig::default()
        },
    );

    let backfill = config.backfill_base_url.as_ref().map(|url| {
        Arc::new(HttpBackfillProvider::new(url.clone())) as Arc<dyn domain_pricing::BackfillProvider>
    });
    let consolidator = Arc::new(
        Consolidator::new(pricing_repository, backfill)
            .with_horizon_hours(config.engine.consolidation_interval_hours as i64),
    );

    Services {
        agents,
        events,
        coordinator,
        orchestrator,
        consolidator,
    }
}

/// Run all background workers until a shutdown signal arrives.
pub async fn run(db: DatabaseConnection, config: Config) -> Result<()> {
    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, "Starting fleet scheduler");

    let services = build(&db, &config);

    // Set up a shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    // Health and metrics server
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = serve_health(health_port).await {
            error!(error = %e, "Health server failed");
        }
    });

    // Replica coordinator: single-flight loop
    let coordinator = services.coordinator;
    let coordinator_rx = shutdown_rx.clone();
    let coordinator_task = tokio::spawn(async move {
        coordinator.run(coordinator_rx).await;
    });

    // Consolidation on a cron cadence
    let mut scheduler = JobScheduler::new()
        .await
        .wrap_err("Failed to create job scheduler")?;
    let cron = format!("0 0 */{} * * *", config.engine.consolidation_interval_hours);
    info!(cron = %cron, "Scheduling pricing consolidation");

    let consolidator = services.consolidator.clone();
    let consolidation_rx = shutdown_rx.clone();
    scheduler
        .add(
            Job::new_async(cron.as_str(), move |_uuid, _lock| {
                let consolidator = consolidator.clone();
                let shutdown = consolidation_rx.clone();
                Box::pin(async move {
                    observability::PricingMetrics::record_consolidation_started();
                    let started = std::time::Instant::now();
                    match consolidator.run(Some(shutdown)).await {
                        Ok(counters) => {
                            observability::PricingMetrics::record_consolidation_completed(
                                counters.snapshots_processed as usize,
                                counters.duplicates_removed as usize,
                                counters.gaps_filled as usize,
                                counters.backfills_added as usize,
                                started.elapsed().as_secs_f64(),
                            );
                        }
                        Err(e) => {
                            observability::PricingMetrics::record_consolidation_failed();
                            warn!("Consolidation run failed: {}", e);
                        }
                    }
                })
            })
            .wrap_err("Invalid consolidation cron")?,
        )
        .await
        .wrap_err("Failed to schedule consolidation")?;
    scheduler.start().await.wrap_err("Scheduler start failed")?;

    // Minute cadence: liveness, deadlines, SSE expiry
    let agents = services.agents;
    let events = services.events;
    let orchestrator = services.orchestrator;
    let engine = config.engine.clone();
    let mut minutely_rx = shutdown_rx.clone();
    let minutely_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match agents.mark_stale_offline(engine.heartbeat_stale_seconds).await {
                        Ok(0) => {}
                        Ok(n) => info!("Marked {} agents offline (stale heartbeat)", n),
                        Err(e) => warn!("Stale heartbeat check failed: {}", e),
                    }
                    match orchestrator.escalate_overdue().await {
                        Ok(0) => {}
                        Ok(n) => {
                            observability::EmergencyMetrics::record_escalations(n);
                            warn!("Escalated {} agents past their notice deadline", n);
                        }
                        Err(e) => warn!("Deadline escalation failed: {}", e),
                    }
                    if let Err(e) = events.cleanup_expired().await {
                        warn!("SSE expiry cleanup failed: {}", e);
                    }
                }
                _ = minutely_rx.changed() => {
                    if *minutely_rx.borrow() {
                        return;
                    }
                }
            }
        }
    });

    // Six-hour cadence: zombie retention and partition maintenance
    let agents_for_purge = AgentService::new(
        Arc::new(PgAgentRepository::new(db.clone())),
        EventBus::new(PgEventRepository::new(db.clone())),
        PricingService::new(PgPricingRepository::new(db.clone())),
    );
    let purge_db = db.clone();
    let retention_days = config.engine.zombie_retention_days;
    let mut maintenance_rx = shutdown_rx.clone();
    let maintenance_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(6 * 3600));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match agents_for_purge.purge_zombies(retention_days).await {
                        Ok(0) => {}
                        Ok(n) => {
                            observability::SwitchMetrics::record_zombies_terminated(n as usize);
                            info!("Purged {} zombies past retention", n);
                        }
                        Err(e) => warn!("Zombie purge failed: {}", e),
                    }
                    if let Err(e) = partitions::maintain(&purge_db).await {
                        warn!("Partition maintenance failed: {}", e);
                    }
                }
                _ = maintenance_rx.changed() => {
                    if *maintenance_rx.borrow() {
                        return;
                    }
                }
            }
        }
    });

    // Wait for shutdown and drain the workers
    let mut wait_rx = shutdown_rx;
    while !*wait_rx.borrow() {
        if wait_rx.changed().await.is_err() {
            break;
        }
    }

    info!("Draining workers...");
    let _ = tokio::join!(coordinator_task, minutely_task, maintenance_task);
    scheduler.shutdown().await.ok();

    info!("Fleet scheduler stopped");
    Ok(())
}

/// One consolidation pass for the `consolidate-once` subcommand.
pub async fn consolidate_once(db: DatabaseConnection, config: &Config) -> Result<RunCounters> {
    let services = build(&db, config);
    services
        .consolidator
        .run(None)
        .await
        .map_err(|e| eyre::eyre!("{}", e))
}

/// Recent consolidation runs for the `status` subcommand.
pub async fn recent_runs(
    db: DatabaseConnection,
) -> Result<Vec<domain_pricing::ConsolidationRun>> {
    let pricing = PricingService::new(PgPricingRepository::new(db));
    pricing.recent_runs(20).await.map_err(|e| eyre::eyre!("{}", e))
}

async fn serve_health(port: u16) -> Result<()> {
    let app: Router = health_router(app_info!())
        .merge(Router::new().route("/metrics", get(observability::metrics_handler)));

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", addr))?;

    info!(port = %port, "Health and metrics server listening");

    axum::serve(listener, app).await.wrap_err("Health server failed")?;
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
