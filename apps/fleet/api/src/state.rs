//! Application state: one explicit value constructed at startup and threaded
//! through handlers; no process-wide singletons.

use std::sync::Arc;

use domain_agents::handlers::FleetApi;
use domain_agents::{AgentService, PgAgentRepository, SwitchingService};
use domain_commands::{CommandQueue, PgCommandRepository};
use domain_events::{EventBus, PgEventRepository};
use domain_pricing::{PgPricingRepository, PricingService};
use domain_replicas::emergency::{EmergencyConfig, EmergencyOrchestrator};
use domain_replicas::handlers::ReplicasApi;
use domain_replicas::{PgReplicaRepository, ReplicaService};
use sea_orm::DatabaseConnection;

use crate::config::Config;

pub type Events = EventBus<PgEventRepository>;
pub type Commands = CommandQueue<PgCommandRepository, PgEventRepository>;
pub type Pricing = PricingService<PgPricingRepository>;
pub type Agents = AgentService<PgAgentRepository, PgEventRepository, PgPricingRepository>;
pub type Switching = SwitchingService<
    PgAgentRepository,
    PgCommandRepository,
    PgEventRepository,
    PgPricingRepository,
>;
pub type Replicas = ReplicaService<PgReplicaRepository, PgCommandRepository, PgEventRepository>;
pub type Orchestrator = EmergencyOrchestrator<
    PgReplicaRepository,
    PgAgentRepository,
    PgCommandRepository,
    PgEventRepository,
    PgPricingRepository,
>;

pub type Fleet = FleetApi<
    PgAgentRepository,
    PgCommandRepository,
    PgEventRepository,
    PgPricingRepository,
>;
pub type ReplicasState = ReplicasApi<
    PgReplicaRepository,
    PgAgentRepository,
    PgCommandRepository,
    PgEventRepository,
    PgPricingRepository,
>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: DatabaseConnection,
    pub agent_repository: Arc<PgAgentRepository>,
    pub events: Events,
    pub commands: Commands,
    pub pricing: Pricing,
    pub fleet: Arc<Fleet>,
    pub replicas: Arc<ReplicasState>,
}

impl AppState {
    pub fn new(config: Config, db: DatabaseConnection) -> Self {
        let agent_repository = Arc::new(PgAgentRepository::new(db.clone()));

        let events = EventBus::new(PgEventRepository::new(db.clone()));
        let commands = CommandQueue::new(PgCommandRepository::new(db.clone()), events.clone());
        let pricing = PricingService::new(PgPricingRepository::new(db.clone()));

        let agents = AgentService::new(agent_repository.clone(), events.clone(), pricing.clone());
        let switching = SwitchingService::new(
            agent_repository.clone(),
            commands.clone(),
            events.clone(),
            pricing.clone(),
        );

        let replica_service = ReplicaService::new(
            Arc::new(PgReplicaRepository::new(db.clone())),
            commands.clone(),
            events.clone(),
        );
        let orchestrator = EmergencyOrchestrator::new(
            replica_service.clone(),
            agent_repository.clone(),
            commands.clone(),
            events.clone(),
            pricing.clone(),
            EmergencyConfig {
                rebalance_deadline_seconds: config.engine.emergency_rebalance_deadline_seconds,
                termination_deadline_seconds: config.engine.emergency_termination_deadline_seconds,
                failure_threshold: config.engine.emergency_failure_threshold,
                ..EmergencyConfig::default()
            },
        );

        let fleet = Arc::new(FleetApi {
            agents: agents.clone(),
            switching,
            commands: commands.clone(),
            pricing: pricing.clone(),
        });
        let replicas = Arc::new(ReplicasApi {
            orchestrator,
            replicas: replica_service,
            agents,
        });

        Self {
            config,
            db,
            agent_repository,
            events,
            commands,
            pricing,
            fleet,
            replicas,
        }
    }
}
