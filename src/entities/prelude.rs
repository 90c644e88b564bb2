pub use super::fraud_alerts::Entity as FraudAlerts;
pub use super::listings::Entity as Listings;
pub use super::price_history::Entity as PriceHistory;
pub use super::shops::Entity as Shops;
