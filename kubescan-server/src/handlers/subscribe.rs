use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};

use crate::infra::app_state::AppState;

/// `GET /subscribe`: upgrades to a WebSocket that receives one JSON string
/// frame per newly stored image id.
pub async fn subscribe_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut subscriber = state.hub().subscribe();
    let subscriber_id = subscriber.id();
    tracing::info!(subscriber = %subscriber_id, "websocket subscriber connected");

    // Forward hub notifications to the socket
    let hub = state.hub().clone();
    let mut delivery = tokio::spawn(async move {
        while let Some(image_id) = subscriber.recv().await {
            let frame = match serde_json::to_string(&image_id) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode notification");
                    continue;
                }
            };
            if let Err(e) = ws_sender.send(Message::Text(frame.into())).await {
                tracing::debug!(subscriber = %subscriber_id, error = %e, "websocket write failed");
                break;
            }
        }
        hub.unsubscribe(subscriber_id);
    });

    // Client frames carry nothing; read only to notice the close
    loop {
        tokio::select! {
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(subscriber = %subscriber_id, error = %e, "websocket read failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
            _ = &mut delivery => break,
        }
    }

    delivery.abort();
    state.hub().unsubscribe(subscriber_id);
    tracing::info!(subscriber = %subscriber_id, "websocket subscriber disconnected");
}
