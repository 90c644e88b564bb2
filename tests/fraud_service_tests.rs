//! FraudAlertService orchestration tests over a mocked database backend.
//!
//! Query results are appended in the exact order the service issues them:
//! listing lookup, price history, listing-alert insert, then (for escalation)
//! shop lookup / attributable alerts / same-day dedup / party-alert insert.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
use tokio::sync::broadcast;

use marketwatch_backend::entities::{fraud_alerts, listings, price_history, shops};
use marketwatch_backend::handlers::fraud_ws::AlertBroadcaster;
use marketwatch_backend::models::fraud::{AlertEvent, AlertKind, ESCALATION_MARKER};
use marketwatch_backend::services::fraud_alert::{FraudAlertService, FraudCheckError};

fn build_service(db: DatabaseConnection) -> (FraudAlertService, broadcast::Receiver<AlertEvent>) {
    let broadcaster = AlertBroadcaster::new();
    let events = broadcaster.subscribe();
    (FraudAlertService::new(db, broadcaster), events)
}

fn listing(
    id: &str,
    price: Decimal,
    seller_id: Option<&str>,
    shop_id: Option<&str>,
) -> listings::Model {
    listings::Model {
        id: id.to_string(),
        title: "Vintage desk lamp".to_string(),
        price,
        seller_id: seller_id.map(str::to_string),
        shop_id: shop_id.map(str::to_string),
        created_at: None,
        updated_at: None,
    }
}

fn history_point(id: i64, listing_id: &str, price: Decimal) -> price_history::Model {
    price_history::Model {
        id,
        listing_id: listing_id.to_string(),
        previous_price: None,
        price,
        recorded_at: Utc::now().into(),
    }
}

fn flat_history(listing_id: &str, price: Decimal, count: i64) -> Vec<price_history::Model> {
    (1..=count)
        .map(|i| history_point(i, listing_id, price))
        .collect()
}

fn listing_alert(id: i64, listing_id: &str) -> fraud_alerts::Model {
    fraud_alerts::Model {
        id,
        listing_id: listing_id.to_string(),
        severity: "HIGH".to_string(),
        reason: "Price ~100% above the listing's market median".to_string(),
        reference_price: dec!(100),
        observed_price: dec!(200),
        deviation_percent: 100,
        responsible_party_id: None,
        is_read: false,
        created_at: Utc::now().into(),
    }
}

fn party_alert(id: i64, listing_id: &str, party_id: &str) -> fraud_alerts::Model {
    fraud_alerts::Model {
        responsible_party_id: Some(party_id.to_string()),
        reason: format!(
            "{} Repeated pricing anomalies attributed to user {} (3 flagged price changes)",
            ESCALATION_MARKER, party_id
        ),
        ..listing_alert(id, listing_id)
    }
}

fn spare_exec_results() -> Vec<MockExecResult> {
    (0..4)
        .map(|_| MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        })
        .collect()
}

#[tokio::test]
async fn missing_listing_yields_empty_outcome() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<listings::Model>::new()])
        .into_connection();
    let (service, _events) = build_service(db);

    let outcome = service.evaluate_price_change("gone", dec!(200)).await.unwrap();

    assert!(outcome.listing_alert.is_none());
    assert!(outcome.party_alert.is_none());
}

#[tokio::test]
async fn candidate_inside_tolerance_band_is_ignored() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![listing("l1", dec!(100), Some("u1"), None)]])
        .append_query_results([vec![history_point(1, "l1", dec!(90))]])
        .into_connection();
    let (service, mut events) = build_service(db);

    let outcome = service.evaluate_price_change("l1", dec!(95)).await.unwrap();

    assert!(outcome.listing_alert.is_none());
    assert!(outcome.party_alert.is_none());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn zero_median_is_not_evaluable() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![listing("l2", dec!(0), Some("u1"), None)]])
        .append_query_results([Vec::<price_history::Model>::new()])
        .into_connection();
    let (service, _events) = build_service(db);

    let outcome = service.evaluate_price_change("l2", dec!(50)).await.unwrap();

    assert!(outcome.listing_alert.is_none());
    assert!(outcome.party_alert.is_none());
}

#[tokio::test]
async fn empty_history_falls_back_to_current_price() {
    // current price 100: candidate 60 sits inside [50, 110]
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![listing("l3", dec!(100), Some("u1"), None)]])
        .append_query_results([Vec::<price_history::Model>::new()])
        .into_connection();
    let (service, _events) = build_service(db);

    let outcome = service.evaluate_price_change("l3", dec!(60)).await.unwrap();

    assert!(outcome.listing_alert.is_none());
}

#[tokio::test]
async fn overpriced_candidate_records_and_broadcasts_listing_alert() {
    let current = listing_alert(10, "l4");
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![listing("l4", dec!(100), Some("u1"), None)]])
        .append_query_results([flat_history("l4", dec!(100), 3)])
        .append_query_results([vec![current.clone()]])
        // attributable alerts: only the one just created
        .append_query_results([vec![current.clone()]])
        .append_exec_results(spare_exec_results())
        .into_connection();
    let (service, mut events) = build_service(db);

    let outcome = service.evaluate_price_change("l4", dec!(200)).await.unwrap();

    let alert = outcome.listing_alert.expect("listing alert expected");
    assert_eq!(alert.id, 10);
    assert_eq!(alert.severity, "HIGH");
    assert!(outcome.party_alert.is_none());

    let event = events.try_recv().expect("broadcast expected");
    assert_eq!(event.kind, AlertKind::Listing);
    assert_eq!(event.alert_id, 10);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn single_prior_strike_does_not_escalate() {
    let current = listing_alert(10, "l5");
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![listing("l5", dec!(100), Some("u2"), None)]])
        .append_query_results([flat_history("l5", dec!(100), 3)])
        .append_query_results([vec![current.clone()]])
        // one genuine prior strike besides the current alert
        .append_query_results([vec![current.clone(), listing_alert(8, "l5")]])
        .append_exec_results(spare_exec_results())
        .into_connection();
    let (service, mut events) = build_service(db);

    let outcome = service.evaluate_price_change("l5", dec!(200)).await.unwrap();

    assert!(outcome.listing_alert.is_some());
    assert!(outcome.party_alert.is_none());
    // only the listing alert was broadcast
    assert!(events.try_recv().is_ok());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn two_prior_strikes_escalate_to_party_alert() {
    let current = listing_alert(10, "l6");
    let escalated = party_alert(11, "l6", "u2");
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![listing("l6", dec!(100), Some("u2"), None)]])
        .append_query_results([flat_history("l6", dec!(100), 3)])
        .append_query_results([vec![current.clone()]])
        .append_query_results([vec![
            current.clone(),
            listing_alert(8, "l6"),
            listing_alert(9, "other-listing"),
        ]])
        // no escalation recorded for the party today
        .append_query_results([Vec::<fraud_alerts::Model>::new()])
        .append_query_results([vec![escalated.clone()]])
        .append_exec_results(spare_exec_results())
        .into_connection();
    let (service, mut events) = build_service(db);

    let outcome = service.evaluate_price_change("l6", dec!(200)).await.unwrap();

    assert!(outcome.listing_alert.is_some());
    let party = outcome.party_alert.expect("party alert expected");
    assert_eq!(party.responsible_party_id.as_deref(), Some("u2"));
    assert!(party.reason.contains(ESCALATION_MARKER));
    assert_eq!(party.severity, "HIGH");

    let first = events.try_recv().expect("listing event expected");
    assert_eq!(first.kind, AlertKind::Listing);
    let second = events.try_recv().expect("party event expected");
    assert_eq!(second.kind, AlertKind::Party);
    assert_eq!(second.responsible_party_id.as_deref(), Some("u2"));
}

#[tokio::test]
async fn escalation_alerts_are_excluded_from_strike_count() {
    let current = listing_alert(10, "l7");
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![listing("l7", dec!(100), Some("u2"), None)]])
        .append_query_results([flat_history("l7", dec!(100), 3)])
        .append_query_results([vec![current.clone()]])
        // prior escalation alerts must not count as strikes
        .append_query_results([vec![
            current.clone(),
            listing_alert(8, "l7"),
            party_alert(6, "l7", "u2"),
            party_alert(7, "l7", "u2"),
        ]])
        .append_exec_results(spare_exec_results())
        .into_connection();
    let (service, _events) = build_service(db);

    let outcome = service.evaluate_price_change("l7", dec!(200)).await.unwrap();

    assert!(outcome.listing_alert.is_some());
    assert!(outcome.party_alert.is_none());
}

#[tokio::test]
async fn same_day_escalation_is_idempotent() {
    let current = listing_alert(10, "l8");
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![listing("l8", dec!(100), Some("u2"), None)]])
        .append_query_results([flat_history("l8", dec!(100), 3)])
        .append_query_results([vec![current.clone()]])
        .append_query_results([vec![
            current.clone(),
            listing_alert(8, "l8"),
            listing_alert(9, "l8"),
        ]])
        // the party was already escalated earlier today
        .append_query_results([vec![party_alert(7, "l8", "u2")]])
        .append_exec_results(spare_exec_results())
        .into_connection();
    let (service, mut events) = build_service(db);

    let outcome = service.evaluate_price_change("l8", dec!(200)).await.unwrap();

    assert!(outcome.listing_alert.is_some());
    assert!(outcome.party_alert.is_none());
    // no second party-level broadcast
    assert!(events.try_recv().is_ok());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn shop_owner_is_fallback_responsible_party() {
    let current = listing_alert(10, "l9");
    let escalated = party_alert(11, "l9", "w1");
    let shop = shops::Model {
        id: "s1".to_string(),
        name: "Second Hand Hi-Fi".to_string(),
        owner_id: "w1".to_string(),
        created_at: None,
    };
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![listing("l9", dec!(100), None, Some("s1"))]])
        .append_query_results([flat_history("l9", dec!(100), 3)])
        .append_query_results([vec![current.clone()]])
        .append_query_results([vec![shop]])
        .append_query_results([vec![
            current.clone(),
            listing_alert(8, "l9"),
            listing_alert(9, "l9"),
        ]])
        .append_query_results([Vec::<fraud_alerts::Model>::new()])
        .append_query_results([vec![escalated]])
        .append_exec_results(spare_exec_results())
        .into_connection();
    let (service, _events) = build_service(db);

    let outcome = service.evaluate_price_change("l9", dec!(200)).await.unwrap();

    let party = outcome.party_alert.expect("party alert expected");
    assert_eq!(party.responsible_party_id.as_deref(), Some("w1"));
}

#[tokio::test]
async fn dangling_shop_reference_is_swallowed_after_commit() {
    // The listing alert is committed before attribution runs; a broken shop
    // reference must not take it away from the caller
    let current = listing_alert(10, "l10");
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![listing("l10", dec!(100), None, Some("missing-shop"))]])
        .append_query_results([flat_history("l10", dec!(100), 3)])
        .append_query_results([vec![current.clone()]])
        .append_query_results([Vec::<shops::Model>::new()])
        .append_exec_results(spare_exec_results())
        .into_connection();
    let (service, _events) = build_service(db);

    let outcome = service.evaluate_price_change("l10", dec!(200)).await.unwrap();

    assert!(outcome.listing_alert.is_some());
    assert!(outcome.party_alert.is_none());
}

#[tokio::test]
async fn listing_without_party_skips_escalation() {
    let current = listing_alert(10, "l11");
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![listing("l11", dec!(100), None, None)]])
        .append_query_results([flat_history("l11", dec!(100), 3)])
        .append_query_results([vec![current.clone()]])
        .append_exec_results(spare_exec_results())
        .into_connection();
    let (service, _events) = build_service(db);

    let outcome = service.evaluate_price_change("l11", dec!(200)).await.unwrap();

    assert!(outcome.listing_alert.is_some());
    assert!(outcome.party_alert.is_none());
}

#[tokio::test]
async fn negative_candidate_is_a_contract_violation() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let (service, _events) = build_service(db);

    let result = service.evaluate_price_change("l12", dec!(-5)).await;

    assert!(matches!(result, Err(FraudCheckError::Contract(_))));
}

#[tokio::test]
async fn mark_read_reports_whether_alert_existed() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }])
        .into_connection();
    let (service, _events) = build_service(db);
    assert!(service.mark_read(42).await.unwrap());

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 0,
        }])
        .into_connection();
    let (service, _events) = build_service(db);
    assert!(!service.mark_read(42).await.unwrap());
}

#[tokio::test]
async fn bulk_mark_operations_return_affected_counts() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 3,
            },
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 2,
            },
        ])
        .into_connection();
    let (service, _events) = build_service(db);

    assert_eq!(service.mark_all_read().await.unwrap(), 3);
    assert_eq!(service.mark_all_unread().await.unwrap(), 2);
}

#[tokio::test]
async fn delete_alerts_for_listing_returns_deleted_count() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 2,
        }])
        .into_connection();
    let (service, _events) = build_service(db);

    assert_eq!(service.delete_alerts_for_listing("l1").await.unwrap(), 2);
}

#[tokio::test]
async fn list_alerts_maps_party_attribution() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![party_alert(2, "l1", "u1"), listing_alert(1, "l1")]])
        .into_connection();
    let (service, _events) = build_service(db);

    let alerts = service.list_alerts(&Default::default()).await.unwrap();

    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].responsible_party_id.as_deref(), Some("u1"));
    assert!(alerts[1].responsible_party_id.is_none());
}
