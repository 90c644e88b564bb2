//! Listing price update request/response models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::fraud::AlertResponse;

/// Body of PATCH /api/listings/{id}/price
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePriceRequest {
    pub price: Decimal,
}

/// Result of a price update, including whatever the fraud engine flagged
#[derive(Debug, Clone, Serialize)]
pub struct UpdatePriceResponse {
    pub success: bool,
    pub listing_id: String,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_alert: Option<AlertResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_alert: Option<AlertResponse>,
}
