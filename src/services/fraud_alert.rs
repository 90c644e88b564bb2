//! Price-anomaly fraud engine
//!
//! Runs on every price-change event: evaluates the candidate price against
//! the listing's recorded history, persists a listing alert for out-of-band
//! candidates, and escalates to a party-level alert once the responsible
//! seller (or shop owner) has accumulated repeated strikes.
//!
//! Escalation is an enrichment step. Once the listing alert is committed,
//! nothing that happens afterwards (attribution, strike counting, the
//! escalation insert, broadcasting) may roll it back or hide it from the
//! caller.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, JoinType,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
};
use tracing::{debug, info, warn};

use crate::entities::prelude::{FraudAlerts, Listings, PriceHistory, Shops};
use crate::entities::{fraud_alerts, listings, price_history, shops};
use crate::handlers::fraud_ws::AlertBroadcaster;
use crate::models::fraud::{
    AlertEvent, AlertListFilter, AlertResponse, ESCALATION_MARKER, PriceDirection, Severity,
};
use crate::services::price_stats::{self, PriceAnomaly, PriceEvaluation};

/// Prior genuine strikes required before a party-level alert is raised.
/// The alert for the triggering event itself comes on top of these.
const ESCALATION_STRIKE_THRESHOLD: usize = 2;

/// Fatal engine errors. Expected no-action outcomes (listing gone, zero
/// median, in-band candidate, no responsible party, threshold unmet) are not
/// errors and surface as empty slots in [`FraudCheckOutcome`].
#[derive(Debug)]
pub enum FraudCheckError {
    Storage(DbErr),
    /// Broken input or broken reference; the triggering price change should
    /// be rejected or retried by its own policy
    Contract(String),
}

impl std::fmt::Display for FraudCheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FraudCheckError::Storage(e) => write!(f, "Storage error: {}", e),
            FraudCheckError::Contract(msg) => write!(f, "Contract violation: {}", msg),
        }
    }
}

impl std::error::Error for FraudCheckError {}

impl From<DbErr> for FraudCheckError {
    fn from(e: DbErr) -> Self {
        FraudCheckError::Storage(e)
    }
}

/// Result of one price-change evaluation. Both slots empty means no anomaly
/// was detected, the frequent non-error outcome.
#[derive(Debug, Clone, Default)]
pub struct FraudCheckOutcome {
    pub listing_alert: Option<fraud_alerts::Model>,
    pub party_alert: Option<fraud_alerts::Model>,
}

/// Registry of per-party async locks serializing the escalation window
/// (count strikes, dedup check, insert). Two concurrent evaluations for
/// listings of the same party would otherwise race the threshold.
#[derive(Clone, Default)]
struct PartyLocks {
    inner: Arc<parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl PartyLocks {
    // TODO: evict idle entries once per-party alert volume makes this map noticeable
    fn for_party(&self, party_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock();
        map.entry(party_id.to_string()).or_default().clone()
    }
}

#[derive(Clone)]
pub struct FraudAlertService {
    db: DatabaseConnection,
    broadcaster: AlertBroadcaster,
    party_locks: PartyLocks,
}

impl FraudAlertService {
    pub fn new(db: DatabaseConnection, broadcaster: AlertBroadcaster) -> Self {
        Self {
            db,
            broadcaster,
            party_locks: PartyLocks::default(),
        }
    }

    pub fn broadcaster(&self) -> &AlertBroadcaster {
        &self.broadcaster
    }

    /// Evaluate a candidate price for a listing.
    ///
    /// Runs the full pipeline: history → median evaluation → listing alert →
    /// responsible-party attribution → escalation. Returns the committed
    /// alerts; an outcome with both slots empty means the candidate was
    /// unremarkable.
    pub async fn evaluate_price_change(
        &self,
        listing_id: &str,
        candidate: Decimal,
    ) -> Result<FraudCheckOutcome, FraudCheckError> {
        if candidate.is_sign_negative() {
            return Err(FraudCheckError::Contract(format!(
                "negative candidate price {} for listing {}",
                candidate, listing_id
            )));
        }

        let Some(listing) = Listings::find_by_id(listing_id).one(&self.db).await? else {
            // Deleted concurrently with the price change; nothing to evaluate
            debug!(listing_id, "listing not found, skipping fraud check");
            return Ok(FraudCheckOutcome::default());
        };

        let history: Vec<Decimal> = PriceHistory::find()
            .filter(price_history::Column::ListingId.eq(listing_id))
            .order_by_asc(price_history::Column::RecordedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|point| point.price)
            .collect();

        let anomaly = match price_stats::evaluate_candidate(&history, listing.price, candidate) {
            PriceEvaluation::NotEvaluable => {
                debug!(listing_id, "zero median baseline, not evaluable");
                return Ok(FraudCheckOutcome::default());
            }
            PriceEvaluation::Normal { .. } => return Ok(FraudCheckOutcome::default()),
            PriceEvaluation::Anomalous(anomaly) => anomaly,
        };

        let severity = Severity::classify(anomaly.direction, anomaly.deviation_percent);
        let listing_alert = fraud_alerts::ActiveModel {
            listing_id: Set(listing.id.clone()),
            severity: Set(severity.to_string()),
            reason: Set(listing_alert_reason(&anomaly)),
            reference_price: Set(anomaly.median),
            observed_price: Set(candidate),
            deviation_percent: Set(anomaly.rounded_percent()),
            responsible_party_id: Set(None),
            is_read: Set(false),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        warn!(
            listing_id = %listing.id,
            severity = %severity,
            deviation = listing_alert.deviation_percent,
            "price anomaly recorded"
        );
        self.broadcaster.broadcast(AlertEvent::listing(&listing_alert));

        let party_alert = match self.try_escalate(&listing, &listing_alert, &anomaly).await {
            Ok(alert) => alert,
            Err(e) => {
                // The listing alert is committed; escalation failures are
                // logged and swallowed so the caller still sees it
                warn!(
                    listing_id = %listing.id,
                    error = %e,
                    "escalation check failed after listing alert commit"
                );
                None
            }
        };

        Ok(FraudCheckOutcome {
            listing_alert: Some(listing_alert),
            party_alert,
        })
    }

    /// Escalate to a party-level alert when the responsible party has
    /// accumulated enough prior strikes. Serialized per party; at most one
    /// escalation alert per party per UTC day.
    async fn try_escalate(
        &self,
        listing: &listings::Model,
        current: &fraud_alerts::Model,
        anomaly: &PriceAnomaly,
    ) -> Result<Option<fraud_alerts::Model>, FraudCheckError> {
        let Some(party_id) = self.resolve_responsible_party(listing).await? else {
            debug!(listing_id = %listing.id, "no responsible party, escalation skipped");
            return Ok(None);
        };

        let lock = self.party_locks.for_party(&party_id);
        let _guard = lock.lock().await;

        let prior_strikes = self.count_prior_strikes(&party_id, current.id).await?;
        if prior_strikes < ESCALATION_STRIKE_THRESHOLD {
            debug!(
                party_id = %party_id,
                prior_strikes,
                "below escalation threshold"
            );
            return Ok(None);
        }

        let day_start = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        let already_escalated = FraudAlerts::find()
            .filter(fraud_alerts::Column::ResponsiblePartyId.eq(party_id.as_str()))
            .filter(fraud_alerts::Column::CreatedAt.gte(day_start))
            .one(&self.db)
            .await?;
        if already_escalated.is_some() {
            info!(party_id = %party_id, "party already escalated today, skipping duplicate");
            return Ok(None);
        }

        let party_alert = fraud_alerts::ActiveModel {
            listing_id: Set(listing.id.clone()),
            severity: Set(Severity::High.to_string()),
            reason: Set(escalation_reason(&party_id, prior_strikes + 1)),
            reference_price: Set(anomaly.median),
            observed_price: Set(current.observed_price),
            deviation_percent: Set(current.deviation_percent),
            responsible_party_id: Set(Some(party_id.clone())),
            is_read: Set(false),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        warn!(
            party_id = %party_id,
            strikes = prior_strikes + 1,
            "repeated anomalies escalated to party-level alert"
        );
        self.broadcaster.broadcast(AlertEvent::party(&party_alert));

        Ok(Some(party_alert))
    }

    /// Seller if the listing has one, else the owning shop's owner, else none.
    async fn resolve_responsible_party(
        &self,
        listing: &listings::Model,
    ) -> Result<Option<String>, FraudCheckError> {
        if let Some(seller_id) = &listing.seller_id {
            return Ok(Some(seller_id.clone()));
        }
        let Some(shop_id) = &listing.shop_id else {
            return Ok(None);
        };
        match Shops::find_by_id(shop_id.as_str()).one(&self.db).await? {
            Some(shop) => Ok(Some(shop.owner_id)),
            None => Err(FraudCheckError::Contract(format!(
                "listing {} references missing shop {}",
                listing.id, shop_id
            ))),
        }
    }

    /// All alerts attributable to a party: escalation alerts tagged with the
    /// party directly, plus alerts on listings the party sells or whose shop
    /// the party owns (owner attribution only applies to seller-less
    /// listings).
    pub async fn find_alerts_by_responsible_party(
        &self,
        party_id: &str,
    ) -> Result<Vec<fraud_alerts::Model>, DbErr> {
        FraudAlerts::find()
            .join(JoinType::InnerJoin, fraud_alerts::Relation::Listings.def())
            .join(JoinType::LeftJoin, listings::Relation::Shops.def())
            .filter(
                Condition::any()
                    .add(fraud_alerts::Column::ResponsiblePartyId.eq(party_id))
                    .add(listings::Column::SellerId.eq(party_id))
                    .add(
                        Condition::all()
                            .add(listings::Column::SellerId.is_null())
                            .add(shops::Column::OwnerId.eq(party_id)),
                    ),
            )
            .order_by_desc(fraud_alerts::Column::CreatedAt)
            .all(&self.db)
            .await
    }

    /// Genuine strikes recorded before the current alert. Escalation alerts
    /// are excluded so they never feed back into the threshold.
    async fn count_prior_strikes(
        &self,
        party_id: &str,
        current_alert_id: i64,
    ) -> Result<usize, FraudCheckError> {
        let alerts = self.find_alerts_by_responsible_party(party_id).await?;
        Ok(alerts
            .iter()
            .filter(|alert| {
                alert.id != current_alert_id
                    && alert.responsible_party_id.is_none()
                    && !alert.reason.contains(ESCALATION_MARKER)
            })
            .count())
    }

    /// Alerts for the moderation dashboard, newest first.
    pub async fn list_alerts(&self, filter: &AlertListFilter) -> Result<Vec<AlertResponse>, DbErr> {
        let mut query = FraudAlerts::find();
        if let Some(is_read) = filter.is_read {
            query = query.filter(fraud_alerts::Column::IsRead.eq(is_read));
        }
        if let Some(severity) = filter.severity {
            query = query.filter(fraud_alerts::Column::Severity.eq(severity.to_string()));
        }
        if let Some(listing_id) = &filter.listing_id {
            query = query.filter(fraud_alerts::Column::ListingId.eq(listing_id.as_str()));
        }
        let alerts = query
            .order_by_desc(fraud_alerts::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(alerts.into_iter().map(AlertResponse::from).collect())
    }

    /// Mark one alert as read. Returns false when the id matches nothing.
    pub async fn mark_read(&self, alert_id: i64) -> Result<bool, DbErr> {
        let result = FraudAlerts::update_many()
            .col_expr(fraud_alerts::Column::IsRead, Expr::value(true))
            .filter(fraud_alerts::Column::Id.eq(alert_id))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn mark_all_read(&self) -> Result<u64, DbErr> {
        let result = FraudAlerts::update_many()
            .col_expr(fraud_alerts::Column::IsRead, Expr::value(true))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn mark_all_unread(&self) -> Result<u64, DbErr> {
        let result = FraudAlerts::update_many()
            .col_expr(fraud_alerts::Column::IsRead, Expr::value(false))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Administrative cleanup when a listing is removed.
    pub async fn delete_alerts_for_listing(&self, listing_id: &str) -> Result<u64, DbErr> {
        let result = FraudAlerts::delete_many()
            .filter(fraud_alerts::Column::ListingId.eq(listing_id))
            .exec(&self.db)
            .await?;
        if result.rows_affected > 0 {
            info!(listing_id, deleted = result.rows_affected, "deleted alerts for listing");
        }
        Ok(result.rows_affected)
    }
}

fn listing_alert_reason(anomaly: &PriceAnomaly) -> String {
    match anomaly.direction {
        PriceDirection::Above => format!(
            "Price ~{}% above the listing's market median",
            anomaly.rounded_percent()
        ),
        PriceDirection::Below => format!(
            "Price ~{}% below the listing's market median",
            anomaly.rounded_percent()
        ),
    }
}

fn escalation_reason(party_id: &str, strikes: usize) -> String {
    format!(
        "{} Repeated pricing anomalies attributed to user {} ({} flagged price changes)",
        ESCALATION_MARKER, party_id, strikes
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_escalation_reason_carries_marker() {
        let reason = escalation_reason("user-1", 3);
        assert!(reason.contains(ESCALATION_MARKER));
        assert!(reason.contains("user-1"));
        assert!(reason.contains("3 flagged"));
    }

    #[test]
    fn test_listing_alert_reason_direction() {
        let above = PriceAnomaly {
            median: dec!(100),
            direction: PriceDirection::Above,
            deviation_percent: dec!(42),
        };
        assert!(listing_alert_reason(&above).contains("42% above"));

        let below = PriceAnomaly {
            direction: PriceDirection::Below,
            ..above
        };
        assert!(listing_alert_reason(&below).contains("42% below"));
    }

    #[test]
    fn test_party_locks_return_same_lock_per_party() {
        let locks = PartyLocks::default();
        let a = locks.for_party("u1");
        let b = locks.for_party("u1");
        let c = locks.for_party("u2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
