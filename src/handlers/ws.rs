//! WebSocket push of stop transitions to route viewers.

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppError;
use crate::ports::RealtimeNotifier;
use crate::services::realtime::ProgressSubscription;

/// Upgrade handler for `/trips/:id/progress/ws`.
pub async fn progress_ws(
    ws: WebSocketUpgrade,
    Path(trip_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    // Reject unknown trips before upgrading.
    state.trips.progress(trip_id).await?;

    let subscription = state.realtime.subscribe(Some(trip_id));
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, subscription)))
}

async fn handle_socket(socket: WebSocket, mut subscription: ProgressSubscription) {
    let (mut sender, mut receiver) = socket.split();

    // Drain client messages so close frames are noticed.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => {
                    tracing::info!("viewer closed connection");
                    break;
                }
                Message::Text(text) => {
                    tracing::debug!("ignoring viewer message: {}", text);
                }
                _ => {}
            }
        }
    });

    // Forward stop transitions and heartbeats to the viewer.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat_interval = tokio::time::interval(tokio::time::Duration::from_secs(30));

        loop {
            tokio::select! {
                _ = heartbeat_interval.tick() => {
                    if sender.send(Message::Ping(vec![])).await.is_err() {
                        tracing::info!("viewer disconnected during heartbeat");
                        break;
                    }
                }
                update = subscription.next() => {
                    let Some(update) = update else {
                        tracing::info!("progress channel closed");
                        break;
                    };
                    let json = match serde_json::to_string(&update) {
                        Ok(json) => json,
                        Err(err) => {
                            tracing::error!("failed to serialize update: {}", err);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        tracing::info!("viewer disconnected");
                        break;
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    tracing::info!("progress websocket closed");
}
