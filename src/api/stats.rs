use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::chat::ChatService;

/// Live sockets with a resolved identity, not total stored users.
pub(super) async fn stats(State(chat): State<Arc<ChatService>>) -> Json<Value> {
    Json(json!({ "onlineUsers": chat.online_count().await }))
}
