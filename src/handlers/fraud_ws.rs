//! WebSocket handler for real-time fraud alert streaming
//!
//! Provides `/api/fraud/ws` for the moderation dashboard. Clients subscribe
//! once and then receive every alert the engine records, each tagged so the
//! dashboard can attribute it to a listing or to a user.
//!
//! Broadcasting is best-effort by design: a send with no subscribers (or a
//! lagged receiver) never affects the stored alert record.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::entities::fraud_alerts;
use crate::models::fraud::{AlertEvent, AlertResponse};

/// Shared state for alert broadcasting
#[derive(Clone)]
pub struct AlertBroadcaster {
    tx: broadcast::Sender<AlertEvent>,
}

impl AlertBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self { tx }
    }

    /// Broadcast an alert event to all subscribers
    pub fn broadcast(&self, event: AlertEvent) {
        // Ignore errors if no subscribers
        let _ = self.tx.send(event);
    }

    /// Subscribe to alert events
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.tx.subscribe()
    }
}

impl Default for AlertBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket subscription request from client
#[derive(Debug, Clone, Deserialize)]
pub struct WsSubscribeRequest {
    /// Action type (subscribe, unsubscribe, ping)
    pub action: String,
}

/// WebSocket message to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    /// Subscription confirmed
    #[serde(rename = "subscribed")]
    Subscribed,
    /// New alert recorded by the engine
    #[serde(rename = "alert")]
    Alert(AlertEvent),
    /// Error message
    #[serde(rename = "error")]
    Error { message: String },
    /// Pong response
    #[serde(rename = "pong")]
    Pong,
    /// Initial state with currently unread alerts
    #[serde(rename = "initial")]
    Initial { alerts: Vec<AlertResponse> },
}

/// GET /api/fraud/ws - WebSocket endpoint for alert streaming
///
/// Client sends a subscription request:
/// ```json
/// { "action": "subscribe" }
/// ```
///
/// Server streams alert events:
/// ```json
/// {
///   "type": "alert",
///   "kind": "listing",
///   "alert_id": 42,
///   "listing_id": "...",
///   "severity": "HIGH",
///   "deviation_percent": 100,
///   "timestamp": 1234567890
/// }
/// ```
pub async fn fraud_alerts_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    info!("New fraud alerts WebSocket connection");

    if let Err(e) = wait_for_subscription(&mut receiver).await {
        let _ = sender
            .send(Message::Text(
                serde_json::to_string(&WsMessage::Error {
                    message: e.to_string(),
                })
                .unwrap()
                .into(),
            ))
            .await;
        return;
    }

    let _ = sender
        .send(Message::Text(
            serde_json::to_string(&WsMessage::Subscribed).unwrap().into(),
        ))
        .await;

    // Send initial state - unread alerts so the dashboard can catch up
    if let Ok(unread) = fraud_alerts::Entity::find()
        .filter(fraud_alerts::Column::IsRead.eq(false))
        .order_by_desc(fraud_alerts::Column::CreatedAt)
        .all(&state.db)
        .await
    {
        let alerts: Vec<AlertResponse> = unread.into_iter().map(Into::into).collect();
        let _ = sender
            .send(Message::Text(
                serde_json::to_string(&WsMessage::Initial { alerts })
                    .unwrap()
                    .into(),
            ))
            .await;
    }

    // Subscribe to broadcast channel
    let mut broadcast_rx = state.fraud.broadcaster().subscribe();

    // Heartbeat interval
    let mut heartbeat = tokio::time::interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            // Handle broadcast events
            result = broadcast_rx.recv() => {
                match result {
                    Ok(event) => {
                        let msg = WsMessage::Alert(event);
                        if let Err(e) = sender.send(Message::Text(
                            serde_json::to_string(&msg).unwrap().into()
                        )).await {
                            debug!("WebSocket send error: {}", e);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Missed {} broadcast events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcast channel closed");
                        break;
                    }
                }
            }

            // Handle heartbeat
            _ = heartbeat.tick() => {
                if let Err(e) = sender.send(Message::Ping(axum::body::Bytes::new())).await {
                    debug!("Heartbeat failed: {}", e);
                    break;
                }
            }

            // Handle incoming messages
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(req) = serde_json::from_str::<WsSubscribeRequest>(&text) {
                            match req.action.as_str() {
                                "ping" => {
                                    let _ = sender.send(Message::Text(
                                        serde_json::to_string(&WsMessage::Pong).unwrap().into()
                                    )).await;
                                }
                                "unsubscribe" => {
                                    info!("Client unsubscribed");
                                    break;
                                }
                                _ => {}
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket closed by client");
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket receive error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Fraud alerts WebSocket connection closed");
}

async fn wait_for_subscription(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Wait up to 30 seconds for subscription request
    let timeout = tokio::time::timeout(Duration::from_secs(30), async {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let req: WsSubscribeRequest = serde_json::from_str(&text)?;

                    if req.action != "subscribe" {
                        return Err("First message must be subscribe action".into());
                    }

                    return Ok(());
                }
                Ok(Message::Ping(_)) => {
                    continue;
                }
                Ok(Message::Close(_)) => {
                    return Err("Connection closed before subscription".into());
                }
                Err(e) => {
                    return Err(format!("WebSocket error: {}", e).into());
                }
                _ => continue,
            }
        }
        Err("Connection ended before subscription".into())
    });

    timeout.await.map_err(|_| "Subscription timeout")?
}
