pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_monitored_target;
mod m20261001_000002_create_check_outcome;
mod m20261001_000003_create_incident;
mod m20261001_000004_create_alert_configuration;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_monitored_target::Migration),
            Box::new(m20261001_000002_create_check_outcome::Migration),
            Box::new(m20261001_000003_create_incident::Migration),
            Box::new(m20261001_000004_create_alert_configuration::Migration),
        ]
    }
}
