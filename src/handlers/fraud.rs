//! Fraud alert moderation endpoints
//!
//! REST surface for the administrative dashboard: list alerts and flip their
//! read state. Alerts themselves are only ever created by the engine.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::error;

use crate::AppState;
use crate::models::fraud::{
    AlertListFilter, AlertsListResponse, BulkMarkResponse, DeleteAlertsResponse, ErrorResponse,
    MarkReadResponse,
};

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn database_error(e: sea_orm::DbErr) -> HandlerError {
    error!(error = %e, "Database error in fraud handler");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("Database error: {}", e),
            code: Some("DATABASE_ERROR".to_string()),
        }),
    )
}

/// GET /api/fraud/alerts
///
/// Returns alerts newest first. Supports optional `is_read`, `severity` and
/// `listing_id` query filters.
pub async fn get_alerts(
    State(state): State<AppState>,
    Query(filter): Query<AlertListFilter>,
) -> Result<Json<AlertsListResponse>, HandlerError> {
    let alerts = state
        .fraud
        .list_alerts(&filter)
        .await
        .map_err(database_error)?;

    let count = alerts.len();
    Ok(Json(AlertsListResponse { alerts, count }))
}

/// PATCH /api/fraud/read/{id}
pub async fn mark_read(
    State(state): State<AppState>,
    Path(alert_id): Path<i64>,
) -> Result<Json<MarkReadResponse>, HandlerError> {
    let success = state
        .fraud
        .mark_read(alert_id)
        .await
        .map_err(database_error)?;

    Ok(Json(MarkReadResponse { success }))
}

/// PATCH /api/fraud/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
) -> Result<Json<BulkMarkResponse>, HandlerError> {
    let affected = state.fraud.mark_all_read().await.map_err(database_error)?;
    Ok(Json(BulkMarkResponse { affected }))
}

/// PATCH /api/fraud/unread-all
pub async fn mark_all_unread(
    State(state): State<AppState>,
) -> Result<Json<BulkMarkResponse>, HandlerError> {
    let affected = state.fraud.mark_all_unread().await.map_err(database_error)?;
    Ok(Json(BulkMarkResponse { affected }))
}

/// DELETE /api/fraud/listing/{listing_id}
///
/// Administrative cleanup invoked when a listing is removed.
pub async fn delete_alerts_for_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<String>,
) -> Result<Json<DeleteAlertsResponse>, HandlerError> {
    let deleted = state
        .fraud
        .delete_alerts_for_listing(&listing_id)
        .await
        .map_err(database_error)?;

    Ok(Json(DeleteAlertsResponse { deleted }))
}
