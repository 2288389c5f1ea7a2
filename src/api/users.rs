use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::storage::Storage;
use crate::AppResult;

use super::{reply, session_token};

pub(super) async fn me(
    State(storage): State<Storage>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let Some(token) = session_token(&headers) else {
        return Ok(reply(StatusCode::UNAUTHORIZED, "Session ID required"));
    };
    Ok(match storage.get_user_by_session_token(token).await? {
        Some(user) => Json(user).into_response(),
        None => reply(StatusCode::NOT_FOUND, "User not found"),
    })
}

#[derive(Deserialize)]
pub(super) struct EmailBody {
    email: String,
}

pub(super) async fn update_email(
    State(storage): State<Storage>,
    headers: HeaderMap,
    Json(EmailBody { email }): Json<EmailBody>,
) -> AppResult<Response> {
    let Some(token) = session_token(&headers) else {
        return Ok(reply(StatusCode::UNAUTHORIZED, "Session ID required"));
    };
    if email.is_empty() {
        return Ok(reply(StatusCode::BAD_REQUEST, "Email is required"));
    }
    let Some(user) = storage.get_user_by_session_token(token).await? else {
        return Ok(reply(StatusCode::NOT_FOUND, "User not found"));
    };

    if let Some(existing) = storage.get_user_by_email(&email).await? {
        if existing.id != user.id {
            return Ok(reply(StatusCode::CONFLICT, "Email already in use"));
        }
    }

    let updated = storage.update_user_email(user.id, Some(&email)).await?;
    Ok(Json(updated).into_response())
}

pub(super) async fn remove_email(
    State(storage): State<Storage>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let Some(token) = session_token(&headers) else {
        return Ok(reply(StatusCode::UNAUTHORIZED, "Session ID required"));
    };
    let Some(user) = storage.get_user_by_session_token(token).await? else {
        return Ok(reply(StatusCode::NOT_FOUND, "User not found"));
    };
    let updated = storage.update_user_email(user.id, None).await?;
    Ok(Json(updated).into_response())
}
