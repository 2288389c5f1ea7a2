//! The socket endpoint: one task reads inbound frames in order, a writer
//! task drains the outbound channel. Every failed action answers with an
//! `error` event; nothing here closes the socket except the client.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::AppState;

use super::proto::{ClientEvent, ServerEvent, UserSummary};
use super::{ChatError, MatchOutcome};

pub async fn chat_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else { continue };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // set by the first successful join; operations before that get a state error
    let mut token: Option<String> = None;

    while let Some(Ok(frame)) = stream.next().await {
        let text = match frame {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let event = match serde_json::from_str::<ClientEvent>(text.as_str()) {
            Ok(event) => event,
            Err(err) => {
                warn!(%err, "unparsable frame");
                let _ = tx.send(ServerEvent::Error { message: "Invalid message format".to_owned() });
                continue;
            }
        };

        match event {
            ClientEvent::Join { session_token, device_fingerprint } => {
                let session_token = session_token.unwrap_or_else(mint_id);
                let fingerprint = device_fingerprint.unwrap_or_else(mint_id);
                match state.chat.join(&session_token, &fingerprint, tx.clone()).await {
                    Ok(user) => {
                        token = Some(session_token);
                        let _ = tx.send(ServerEvent::Joined { user: UserSummary::from(&user) });
                    }
                    Err(err) => {
                        warn!(%err, "join failed");
                        let _ = tx.send(ServerEvent::Error { message: "Failed to join".to_owned() });
                    }
                }
            }
            ClientEvent::FindPartner => {
                let Some(token) = token.as_deref() else {
                    let _ = tx.send(error_event(&ChatError::NoIdentity));
                    continue;
                };
                match state.chat.find_partner(token).await {
                    // matched sockets were notified inside the matchmaker
                    Ok(MatchOutcome::Matched { .. }) => {}
                    Ok(MatchOutcome::Searching) => {
                        let _ = tx.send(ServerEvent::Searching);
                    }
                    Err(err @ ChatError::NoIdentity) => {
                        let _ = tx.send(error_event(&err));
                    }
                    Err(err) => {
                        warn!(%err, "find_partner failed");
                        let _ = tx.send(ServerEvent::Error {
                            message: "Failed to find partner".to_owned(),
                        });
                    }
                }
            }
            ClientEvent::SendMessage { content } => {
                let Some(token) = token.as_deref() else {
                    let _ = tx.send(error_event(&ChatError::NoIdentity));
                    continue;
                };
                match state.chat.send_message(token, &content).await {
                    // fan-out already happened, including the echo to us
                    Ok(_) => {}
                    Err(err @ (ChatError::NoIdentity | ChatError::NoActiveSession)) => {
                        let _ = tx.send(error_event(&err));
                    }
                    Err(err) => {
                        warn!(%err, "send_message failed");
                        let _ = tx.send(ServerEvent::Error {
                            message: "Failed to send message".to_owned(),
                        });
                    }
                }
            }
            ClientEvent::Disconnect => {
                if let Some(token) = token.as_deref() {
                    if let Err(err) = state.chat.disconnect(token).await {
                        warn!(%err, "disconnect failed");
                    }
                }
            }
        }
    }

    if let Some(token) = token.as_deref() {
        if let Err(err) = state.chat.socket_closed(token, &tx).await {
            warn!(%err, "socket teardown failed");
        }
    }
    writer.abort();
}

fn error_event(err: &ChatError) -> ServerEvent {
    let message = match err {
        ChatError::NoIdentity => "User not found",
        ChatError::NoActiveSession => "No active chat session",
        ChatError::Storage(_) => "Internal error",
    };
    ServerEvent::Error { message: message.to_owned() }
}

fn mint_id() -> String {
    Uuid::now_v7().to_string()
}
