//! WebSocket handler for real-time notifications.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, State,
    },
    response::IntoResponse,
};
use cgw_core::notify::NotificationEvent;
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::context::RequestContext;
use crate::state::GatewayState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Extension(ctx): Extension<RequestContext>,
) -> impl IntoResponse {
    ctx.set_request_type("notifications");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

fn encode(event: &NotificationEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!(error = %e, kind = %event.kind, "Notification not serializable");
            None
        }
    }
}

/// Handle individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.bus.subscribe();

    let receiver_count = state.bus.receiver_count();
    info!(receiver_count, "WebSocket client connected");

    if let Some(greeting) = encode(&NotificationEvent::connected()) {
        if sender.send(greeting).await.is_err() {
            debug!("WebSocket closed before greeting");
            return;
        }
    }

    // Forward broadcast events to this client
    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "WebSocket client lagging, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let Some(message) = encode(&event) else {
                continue;
            };
            debug!(kind = %event.kind, "Sending notification to WebSocket client");
            if sender.send(message).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    // Client messages carry no commands; they are only logged
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    debug!("Received from WebSocket client: {}", text.as_str());
                }
                Message::Close(_) => {
                    debug!("WebSocket client sent close frame");
                    break;
                }
                _ => {}
            }
        }
    });

    // The first task to finish aborts the other, releasing the subscription.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("WebSocket client disconnected");
}
