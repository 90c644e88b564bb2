// src/lib.rs

use handlers::fraud_ws::AlertBroadcaster;
use sea_orm::DatabaseConnection;
use services::fraud_alert::FraudAlertService;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub fraud: FraudAlertService,
}

impl AppState {
    pub fn new(db: DatabaseConnection) -> Self {
        let fraud = FraudAlertService::new(db.clone(), AlertBroadcaster::new());
        Self { db, fraud }
    }
}

pub mod entities {
    pub mod prelude;
    pub mod fraud_alerts;
    pub mod listings;
    pub mod price_history;
    pub mod shops;
}

pub mod services {
    pub mod fraud_alert;
    pub mod price_stats;
}

pub mod models;
pub mod handlers;
