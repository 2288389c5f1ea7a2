//! REST surface next to the socket: own-profile reads, email updates,
//! online stats, and the payment-provider webhook.

mod billing;
mod stats;
mod users;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(users::me))
        .route("/users/email", put(users::update_email).delete(users::remove_email))
        .route("/stats", get(stats::stats))
        .route("/billing/webhook", post(billing::webhook))
}

/// The session token the browser sends on every REST call.
fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-session-id")?.to_str().ok()
}

fn reply(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}
