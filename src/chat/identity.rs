//! Maps a connection's claimed session token and device fingerprint to a
//! durable user record.

use crate::storage::{Storage, User};

/// Three-tier resolution: exact token match, then fingerprint fallback, then
/// a fresh anonymous user. The fingerprint tier is what lets someone who
/// cleared their session storage keep their premium status; collisions
/// between real devices are an accepted tradeoff of that.
pub async fn resolve(
    storage: &Storage,
    session_token: &str,
    device_fingerprint: &str,
) -> Result<User, sqlx::Error> {
    if let Some(user) = storage.get_user_by_session_token(session_token).await? {
        return Ok(user);
    }
    if let Some(user) = storage.get_user_by_fingerprint(device_fingerprint).await? {
        return Ok(user);
    }
    storage.create_user(session_token, device_fingerprint).await
}
