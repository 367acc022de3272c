use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::conversations::types::{ConversationContext, Message, TurnRequest};
use crate::state::AppState;

/// Conversation state of one websocket connection. Never shared across
/// connections.
#[derive(Debug, Default)]
pub struct Session {
    pub context: ConversationContext,
    pub selected_agency: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
}

pub struct Connection {
    pub client_uid: String,
    pub(crate) session: Arc<Mutex<Session>>,
    outbox: UnboundedSender<Value>,
}

impl Connection {
    pub fn new(client_uid: String, outbox: UnboundedSender<Value>) -> Self {
        Self { client_uid, session: Arc::default(), outbox }
    }

    pub fn send(&self, frame: Value) {
        if self.outbox.send(frame).is_err() {
            debug!("Client {} writer closed, dropping frame", self.client_uid);
        }
    }

    pub fn send_error(&self, message: impl ToString) {
        self.send(json!({ "type": "error", "message": message.to_string() }));
    }
}

pub async fn handle_message(state: &AppState, connection: &mut Connection, text: &str) -> anyhow::Result<()> {
    let msg: Value = serde_json::from_str(text)?;
    let msg_type = msg.get("type").and_then(|v| v.as_str());

    match msg_type {
        Some("text-input") => {
            handle_text_input(state, connection, &msg).await;
        }
        Some("select-agency") => {
            handle_select_agency(connection, &msg).await;
        }
        Some("interrupt-signal") => {
            handle_interrupt(state, connection);
        }
        Some("reset-conversation") => {
            handle_reset(state, connection).await;
        }
        _ => {
            warn!("Unknown message type: {:?}", msg_type);
            connection.send_error(format!("unknown message type: {}", msg_type.unwrap_or("<missing>")));
        }
    }

    Ok(())
}

fn text_field(msg: &Value, key: &str) -> Option<String> {
    msg.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Routes the turn on its own task so an interrupt can abort it. A newer
/// input replaces a turn still in flight.
async fn handle_text_input(state: &AppState, connection: &Connection, msg: &Value) {
    let text = msg.get("text").and_then(|v| v.as_str()).unwrap_or("");

    let request = {
        let mut session = connection.session.lock().await;
        if let Some(country) = text_field(msg, "country") {
            session.country = Some(country);
        }
        if let Some(language) = text_field(msg, "language") {
            session.language = Some(language);
        }
        TurnRequest::new(
            text,
            session.context.clone(),
            session.country.clone(),
            session.language.clone(),
            session.selected_agency.clone(),
        )
    };
    let request = match request {
        Ok(request) => request,
        Err(e) => {
            connection.send_error(e);
            return;
        }
    };

    if let Some((_, previous)) = state.conversation_tasks.remove(&connection.client_uid) {
        previous.abort();
    }

    let router = state.router.clone();
    let session = connection.session.clone();
    let outbox = connection.outbox.clone();
    let task = tokio::spawn(async move {
        let response = router.route(&request).await;
        {
            let mut session = session.lock().await;
            session.context.push(Message::user(&request.message));
            session.context.push(Message::assistant(&response.response));
        }
        let _ = outbox.send(json!({ "type": "turn-result", "data": response }));
    });
    state
        .conversation_tasks
        .insert(connection.client_uid.clone(), task.abort_handle());
}

async fn handle_select_agency(connection: &Connection, msg: &Value) {
    let agency = text_field(msg, "agency");
    info!("Client {} selected agency {:?}", connection.client_uid, agency);
    connection.session.lock().await.selected_agency = agency;
}

fn handle_interrupt(state: &AppState, connection: &Connection) {
    info!("Interrupt signal from {}", connection.client_uid);
    if let Some((_, handle)) = state.conversation_tasks.remove(&connection.client_uid) {
        handle.abort();
    }
}

async fn handle_reset(state: &AppState, connection: &Connection) {
    handle_interrupt(state, connection);
    *connection.session.lock().await = Session::default();
    info!("Client {} reset its conversation", connection.client_uid);
}
