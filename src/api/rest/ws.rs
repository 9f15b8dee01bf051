use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::LocationPing;
use crate::state::AppState;

/// Customer tracking view: one JSON location ping per message until the
/// order reaches a terminal state. The feed is resolved before the
/// upgrade so lookup failures still map to proper HTTP statuses.
pub async fn track_order(
    ws: WebSocketUpgrade,
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let stream = state.feed.subscribe(id).await?;
    Ok(ws.on_upgrade(move |socket| relay_pings(socket, id, stream)))
}

async fn relay_pings(socket: WebSocket, order_id: Uuid, mut pings: ReceiverStream<LocationPing>) {
    let (mut sender, mut receiver) = socket.split();

    info!(order_id = %order_id, "tracking client connected");

    let send_task = tokio::spawn(async move {
        while let Some(ping) = pings.next().await {
            let json = match serde_json::to_string(&ping) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize location ping");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }

        // Feed completed: the order is terminal. Close politely.
        let _ = sender.send(Message::Close(None)).await;
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(order_id = %order_id, "tracking client disconnected");
}
