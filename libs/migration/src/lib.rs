pub use sea_orm_migration::prelude::*;

mod m20250810_000000_bootstrap;
mod m20250810_000001_create_clients;
mod m20250811_000000_create_agents;
mod m20250811_000001_create_pools;
mod m20250812_000000_create_instances;
mod m20250813_000000_create_commands;
mod m20250814_000000_create_switches;
mod m20250815_000000_create_pricing;
mod m20250816_000000_create_replicas;
mod m20250817_000000_create_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250810_000000_bootstrap::Migration),
            Box::new(m20250810_000001_create_clients::Migration),
            Box::new(m20250811_000000_create_agents::Migration),
            Box::new(m20250811_000001_create_pools::Migration),
            Box::new(m20250812_000000_create_instances::Migration),
            Box::new(m20250813_000000_create_commands::Migration),
            Box::new(m20250814_000000_create_switches::Migration),
            Box::new(m20250815_000000_create_pricing::Migration),
            Box::new(m20250816_000000_create_replicas::Migration),
            Box::new(m20250817_000000_create_events::Migration),
        ]
    }
}
