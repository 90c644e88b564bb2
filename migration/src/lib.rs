pub use sea_orm_migration::prelude::*;

mod m20260801_000001_create_shops;
mod m20260801_000002_create_listings;
mod m20260801_000003_create_price_history;
mod m20260801_000004_create_fraud_alerts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260801_000001_create_shops::Migration),
            Box::new(m20260801_000002_create_listings::Migration),
            Box::new(m20260801_000003_create_price_history::Migration),
            Box::new(m20260801_000004_create_fraud_alerts::Migration),
        ]
    }
}
