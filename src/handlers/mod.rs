pub mod fraud;
pub mod fraud_ws;
pub mod listing_price;
