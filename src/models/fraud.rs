//! Fraud alert enums, DTOs and broadcast event types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::entities::fraud_alerts;

/// Marker token carried in the reason of every party-escalation alert.
///
/// The strike counter skips any alert tagged with it, so escalation alerts
/// never feed back into the escalation threshold.
pub const ESCALATION_MARKER: &str = "[repeat-offender]";

/// Alert severity tiers
///
/// `Low` is accepted when parsing stored alerts (upstream classification
/// schemes may write it) but the price-deviation path never emits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Classify an anomalous deviation by direction.
    ///
    /// Underpricing tolerates a wider deviation before counting as high
    /// severity; clearance pricing is common, overpricing is not. Runs on the
    /// unrounded percentage so 30.0001% classifies above the 30% boundary.
    pub fn classify(direction: PriceDirection, deviation_percent: Decimal) -> Self {
        let high_bound = match direction {
            PriceDirection::Above => dec!(30),
            PriceDirection::Below => dec!(50),
        };
        if deviation_percent > high_bound {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// Which side of the tolerance band a candidate price landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriceDirection {
    Above,
    Below,
}

impl std::fmt::Display for PriceDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceDirection::Above => write!(f, "ABOVE"),
            PriceDirection::Below => write!(f, "BELOW"),
        }
    }
}

/// Discriminator on broadcast events so a dashboard can attribute the alert
/// to a listing or to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Listing,
    Party,
}

/// Alert event pushed to the live dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub alert_id: i64,
    pub listing_id: String,
    pub severity: String,
    pub reason: String,
    pub reference_price: Decimal,
    pub observed_price: Decimal,
    pub deviation_percent: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responsible_party_id: Option<String>,
    /// Milliseconds since epoch
    pub timestamp: i64,
}

impl AlertEvent {
    pub fn listing(alert: &fraud_alerts::Model) -> Self {
        Self::from_model(AlertKind::Listing, alert)
    }

    pub fn party(alert: &fraud_alerts::Model) -> Self {
        Self::from_model(AlertKind::Party, alert)
    }

    fn from_model(kind: AlertKind, alert: &fraud_alerts::Model) -> Self {
        Self {
            kind,
            alert_id: alert.id,
            listing_id: alert.listing_id.clone(),
            severity: alert.severity.clone(),
            reason: alert.reason.clone(),
            reference_price: alert.reference_price,
            observed_price: alert.observed_price,
            deviation_percent: alert.deviation_percent,
            responsible_party_id: alert.responsible_party_id.clone(),
            timestamp: alert.created_at.timestamp_millis(),
        }
    }
}

/// Alert as returned by the moderation endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertResponse {
    pub id: i64,
    pub listing_id: String,
    pub severity: String,
    pub reason: String,
    pub reference_price: Decimal,
    pub observed_price: Decimal,
    pub deviation_percent: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responsible_party_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<fraud_alerts::Model> for AlertResponse {
    fn from(alert: fraud_alerts::Model) -> Self {
        Self {
            id: alert.id,
            listing_id: alert.listing_id,
            severity: alert.severity,
            reason: alert.reason,
            reference_price: alert.reference_price,
            observed_price: alert.observed_price,
            deviation_percent: alert.deviation_percent,
            responsible_party_id: alert.responsible_party_id,
            is_read: alert.is_read,
            created_at: alert.created_at.with_timezone(&Utc),
        }
    }
}

/// Optional filters for alert listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertListFilter {
    pub is_read: Option<bool>,
    pub severity: Option<Severity>,
    pub listing_id: Option<String>,
}

/// Response for GET /api/fraud/alerts
#[derive(Debug, Clone, Serialize)]
pub struct AlertsListResponse {
    pub alerts: Vec<AlertResponse>,
    pub count: usize,
}

/// Response for single-alert moderation actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub success: bool,
}

/// Response for bulk moderation actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkMarkResponse {
    pub affected: u64,
}

/// Response for administrative per-listing cleanup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteAlertsResponse {
    pub deleted: u64,
}

/// Generic error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}
