//! Listing price update endpoint
//!
//! PATCH /api/listings/{id}/price is the engine's consumer: every accepted
//! price change runs the fraud check against the history recorded so far,
//! then appends the new price point and updates the listing. The check's
//! outcome rides along in the response but never blocks the update itself.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tracing::{error, info, warn};

use crate::AppState;
use crate::entities::{listings, prelude::Listings, price_history};
use crate::models::fraud::ErrorResponse;
use crate::models::listing::{UpdatePriceRequest, UpdatePriceResponse};
use crate::services::fraud_alert::FraudCheckError;

type HandlerError = (StatusCode, Json<ErrorResponse>);

/// PATCH /api/listings/{id}/price
///
/// # Response
/// - 200: Price updated; any alerts the engine raised are included
/// - 400: Rejected candidate price (engine contract violation)
/// - 404: Listing not found
/// - 500: Database error
pub async fn update_listing_price(
    State(state): State<AppState>,
    Path(listing_id): Path<String>,
    Json(req): Json<UpdatePriceRequest>,
) -> Result<Json<UpdatePriceResponse>, HandlerError> {
    let listing = Listings::find_by_id(listing_id.as_str())
        .one(&state.db)
        .await
        .map_err(|e| {
            error!(error = %e, "Database error loading listing");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Database error: {}", e),
                    code: Some("DATABASE_ERROR".to_string()),
                }),
            )
        })?;

    let Some(listing) = listing else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Listing not found".to_string(),
                code: Some("LISTING_NOT_FOUND".to_string()),
            }),
        ));
    };

    // Evaluate against the history recorded so far, before the new price
    // becomes part of it
    let outcome = state
        .fraud
        .evaluate_price_change(&listing_id, req.price)
        .await
        .map_err(|e| match e {
            FraudCheckError::Contract(msg) => {
                warn!(listing_id = %listing_id, reason = %msg, "candidate price rejected");
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: msg,
                        code: Some("INVALID_PRICE".to_string()),
                    }),
                )
            }
            FraudCheckError::Storage(db_err) => {
                error!(error = %db_err, "Fraud check failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: format!("Database error: {}", db_err),
                        code: Some("DATABASE_ERROR".to_string()),
                    }),
                )
            }
        })?;

    let previous_price = listing.price;
    price_history::ActiveModel {
        listing_id: Set(listing.id.clone()),
        previous_price: Set(Some(previous_price)),
        price: Set(req.price),
        recorded_at: Set(Utc::now().into()),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to record price history");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Database error: {}", e),
                code: Some("DATABASE_ERROR".to_string()),
            }),
        )
    })?;

    let mut active: listings::ActiveModel = listing.into();
    active.price = Set(req.price);
    active.updated_at = Set(Some(Utc::now().into()));
    let updated = active.update(&state.db).await.map_err(|e| {
        error!(error = %e, "Failed to update listing price");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Database error: {}", e),
                code: Some("DATABASE_ERROR".to_string()),
            }),
        )
    })?;

    info!(
        listing_id = %updated.id,
        previous = %previous_price,
        price = %updated.price,
        flagged = outcome.listing_alert.is_some(),
        "listing price updated"
    );

    Ok(Json(UpdatePriceResponse {
        success: true,
        listing_id: updated.id,
        price: updated.price,
        listing_alert: outcome.listing_alert.map(Into::into),
        party_alert: outcome.party_alert.map(Into::into),
    }))
}
