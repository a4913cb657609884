//! WebSocket live feed.
//!
//! A client connecting to `/ws` first receives one text frame per registered
//! endpoint, then one frame per completed probe. Client frames are ignored;
//! the feed ends when the client disconnects or its queue overflows.

use crate::api::AppState;
use crate::fanout::FanOut;
use crate::registry::EndpointRegistry;
use axum::extract::ws::{Message, WebSocket};
use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// WebSocket upgrade handler for the live feed
pub async fn live_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.registry, state.fanout))
}

async fn handle_socket(socket: WebSocket, registry: Arc<EndpointRegistry>, fanout: Arc<FanOut>) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = fanout.subscribe(&registry).await;
    let id = subscription.id;

    // Drain client frames so close and ping are processed
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    debug!(subscriber = id, error = %e, "Live feed receive error");
                    break;
                }
                _ => {}
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut recv_task => {
                debug!(subscriber = id, "Live feed client disconnected");
                break;
            }
            message = subscription.rx.recv() => {
                // None: the fan-out dropped this subscriber
                let Some(message) = message else {
                    warn!(subscriber = id, "Live feed subscriber dropped by fan-out");
                    break;
                };
                if let Err(e) = sender.send(Message::Text(message)).await {
                    debug!(subscriber = id, error = %e, "Failed to send live update");
                    break;
                }
            }
        }
    }

    recv_task.abort();
    fanout.unsubscribe(id).await;
    let _ = sender.close().await;
}
