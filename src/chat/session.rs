//! Chat-session lifecycle: open, close, and the one-active-session-per-user
//! guard. Callers hold the service mutex, so open/close transitions are
//! atomic with respect to matching and disconnect handling.

use tracing::{info, warn};

use crate::storage::{ChatSession, Storage};

use super::proto::ServerEvent;
use super::registry::Registry;
use super::ChatError;

/// Why a session ended. The peer sees a uniform `partner_disconnected`
/// either way; the reason only shows up in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Explicit,
    PeerDisconnect,
    Superseded,
}

/// Open a session between two users. If either slot still has an active
/// session this force-closes it first; the matchmaker is supposed to have
/// cleared the requester already, so hitting the guard is logged loudly.
pub(crate) async fn open(
    storage: &Storage,
    registry: &mut Registry,
    user1_id: i64,
    user2_id: i64,
) -> Result<ChatSession, ChatError> {
    for user_id in [user1_id, user2_id] {
        if let Some(stale) = storage.get_active_chat_session_for_user(user_id).await? {
            warn!(user_id, session_id = stale.id, "user still in an active session on open, force-closing");
            close(storage, registry, stale.id, user_id, CloseReason::Superseded).await?;
        }
    }

    let session = storage.create_chat_session(user1_id, user2_id).await?;
    info!(session_id = session.id, user1_id, user2_id, "chat session opened");
    Ok(session)
}

/// End a session and tell the participant opposite `leaving_user_id`, if
/// their socket is still open. Closing an already-ended session is a no-op.
pub(crate) async fn close(
    storage: &Storage,
    registry: &mut Registry,
    session_id: i64,
    leaving_user_id: i64,
    reason: CloseReason,
) -> Result<(), ChatError> {
    let Some(session) = storage.get_chat_session(session_id).await? else {
        return Ok(());
    };
    if !session.is_active {
        return Ok(());
    }

    storage.end_chat_session(session.id).await?;
    let peer_id = session.peer_of(leaving_user_id);
    registry.send_to_user(peer_id, ServerEvent::PartnerDisconnected);
    info!(session_id, leaving_user_id, peer_id, ?reason, "chat session closed");
    Ok(())
}
