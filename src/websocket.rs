use axum::{
    extract::{ws::Message, State, WebSocketUpgrade},
    response::Response,
};
use axum::extract::ws::WebSocket;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::handlers::{self, Connection};
use crate::state::AppState;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let client_uid = state.generate_client_uid();
    info!("New WebSocket connection: {}", client_uid);

    let (mut sender, mut receiver) = socket.split();

    // Turns finish on their own tasks; every frame goes through one writer.
    let (outbox, mut inbox) = mpsc::unbounded_channel::<Value>();
    let writer_uid = client_uid.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = inbox.recv().await {
            if let Err(e) = sender.send(Message::Text(frame.to_string())).await {
                error!("Failed to send to {}: {}", writer_uid, e);
                break;
            }
        }
    });

    let mut connection = Connection::new(client_uid.clone(), outbox);
    connection.send(json!({
        "type": "connection-established",
        "client_uid": client_uid
    }));

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(e) = handlers::handle_message(&state, &mut connection, &text).await {
                    error!("Error handling message: {}", e);
                    connection.send_error(e);
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client {} disconnected", client_uid);
                break;
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    // Cancel any running turn
    if let Some((_, handle)) = state.conversation_tasks.remove(&client_uid) {
        handle.abort();
    }
    drop(connection);
    writer.abort();

    info!("Cleaned up client {}", client_uid);
}
