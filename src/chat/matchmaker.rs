//! Pairs a requester with a waiting stranger.

use rand::seq::IndexedRandom;
use tracing::info;

use crate::storage::Storage;

use super::proto::{PartnerSummary, ServerEvent};
use super::registry::Registry;
use super::session::{self, CloseReason};
use super::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Nobody eligible right now; the requester stays in the waiting set
    /// until another user's search selects them.
    Searching,
    Matched { session_id: i64, partner_id: i64 },
}

/// Runs under the service mutex, so the whole check-pick-open-notify
/// sequence is atomic with respect to other searches and disconnects.
pub(crate) async fn find_partner(
    storage: &Storage,
    registry: &mut Registry,
    user_id: i64,
) -> Result<MatchOutcome, ChatError> {
    // a fresh search always supersedes a stale pairing
    if let Some(stale) = storage.get_active_chat_session_for_user(user_id).await? {
        session::close(storage, registry, stale.id, user_id, CloseReason::Superseded).await?;
    }

    // waiting set: connected, identity-bound, not in an active session
    let busy = storage.active_participant_ids().await?;
    let waiting: Vec<i64> = registry
        .user_ids()
        .into_iter()
        .filter(|id| *id != user_id && !busy.contains(id))
        .collect();

    // any waiting user is equally eligible, no priority ordering
    let Some(&partner_id) = waiting.choose(&mut rand::rng()) else {
        return Ok(MatchOutcome::Searching);
    };

    let requester = storage.get_user(user_id).await?.ok_or(ChatError::NoIdentity)?;
    let partner = storage.get_user(partner_id).await?.ok_or(ChatError::NoIdentity)?;

    let session = session::open(storage, registry, user_id, partner_id).await?;

    // best effort on both ends; a socket that closed since the waiting-set
    // read simply misses the notification and gets reconciled on its own
    // disconnect path
    registry.send_to_user(
        partner_id,
        ServerEvent::PartnerFound {
            session_id: session.id,
            partner: PartnerSummary::from(&requester),
        },
    );
    registry.send_to_user(
        user_id,
        ServerEvent::PartnerFound {
            session_id: session.id,
            partner: PartnerSummary::from(&partner),
        },
    );

    info!(session_id = session.id, user_id, partner_id, "matched");
    Ok(MatchOutcome::Matched { session_id: session.id, partner_id })
}
