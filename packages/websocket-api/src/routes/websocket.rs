use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared::models::messages::{ClientEvent, ServerEvent};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(upgrade))
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Parses a text frame. Anything unparseable becomes the error event the
/// client should see.
pub fn parse_frame(text: &str) -> Result<ClientEvent, ServerEvent> {
    serde_json::from_str(text).map_err(|e| ServerEvent::Error {
        code: "validation_error".to_string(),
        message: format!("Invalid message format: {}", e),
    })
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    let manager = state.session_manager;
    info!(connection_id = %connection_id, "WebSocket connection established");

    let (mut sink, mut stream) = socket.split();
    let (outbound, mut outbox) = mpsc::unbounded_channel::<ServerEvent>();
    manager
        .register_connection(&connection_id, outbound.clone())
        .await;

    let writer_id = connection_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!(connection_id = %writer_id, error = %e, "Failed to serialize event");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                debug!(connection_id = %writer_id, "Socket closed while writing");
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match parse_frame(&text) {
                Ok(event) => manager.handle_event(&connection_id, event).await,
                Err(rejection) => {
                    warn!(connection_id = %connection_id, "Unparseable client message");
                    let _ = outbound.send(rejection);
                }
            },
            Ok(Message::Binary(_)) => {
                let _ = outbound.send(ServerEvent::Error {
                    code: "validation_error".to_string(),
                    message: "Binary messages are not supported".to_string(),
                });
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "WebSocket read failed");
                break;
            }
        }
    }

    manager.disconnect(&connection_id).await;
    writer.abort();
    info!(connection_id = %connection_id, "WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_accepts_client_event() {
        let event = parse_frame(r#"{"action":"ping"}"#).unwrap();

        assert_eq!(event, ClientEvent::Ping);
    }

    #[test]
    fn test_parse_frame_rejects_unknown_action() {
        match parse_frame(r#"{"action":"teleport"}"#) {
            Err(ServerEvent::Error { code, .. }) => assert_eq!(code, "validation_error"),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_frame_rejects_malformed_json() {
        assert!(parse_frame("{not json").is_err());
    }
}
