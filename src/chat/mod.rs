//! Matching and session coordination: the one place that owns live
//! connection state.
//!
//! Everything that can change who is waiting or who is matched — join,
//! find-partner, explicit disconnect, socket teardown — runs under a single
//! [`tokio::sync::Mutex`], which is what upholds the core invariant: a user
//! is a participant of at most one active chat session at any instant.
//! Identity resolution hits storage before the lock is taken.

pub mod identity;
pub mod matchmaker;
pub mod proto;
pub mod registry;
mod relay;
pub mod session;
pub mod ws;

use tokio::sync::Mutex;
use tracing::info;

use crate::storage::{Storage, User};

pub use matchmaker::MatchOutcome;
pub use registry::ConnHandle;
pub use session::CloseReason;

use registry::Registry;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The connection never completed a join, or its user vanished.
    #[error("user not found")]
    NoIdentity,
    #[error("no active chat session")]
    NoActiveSession,
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

pub struct ChatService {
    storage: Storage,
    registry: Mutex<Registry>,
}

impl ChatService {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Attach a connection: resolve identity, then record the live handle.
    /// A second join on the same token supersedes the earlier socket.
    pub async fn join(
        &self,
        token: &str,
        fingerprint: &str,
        handle: ConnHandle,
    ) -> Result<User, ChatError> {
        let user = identity::resolve(&self.storage, token, fingerprint).await?;

        let mut registry = self.registry.lock().await;
        registry.register(token.to_owned(), handle);
        registry.bind_user(token, user.id);
        info!(user_id = user.id, "user joined");
        Ok(user)
    }

    pub async fn find_partner(&self, token: &str) -> Result<MatchOutcome, ChatError> {
        let mut registry = self.registry.lock().await;
        let user_id = registry.user_id(token).ok_or(ChatError::NoIdentity)?;
        matchmaker::find_partner(&self.storage, &mut registry, user_id).await
    }

    /// Explicit end of the current pairing. The connection stays registered
    /// and the user drops back into the waiting set.
    pub async fn disconnect(&self, token: &str) -> Result<(), ChatError> {
        let mut registry = self.registry.lock().await;
        let user_id = registry.user_id(token).ok_or(ChatError::NoIdentity)?;
        if let Some(active) = self.storage.get_active_chat_session_for_user(user_id).await? {
            session::close(&self.storage, &mut registry, active.id, user_id, CloseReason::Explicit)
                .await?;
        }
        Ok(())
    }

    /// Transport-level teardown. Only acts if `handle` is still the
    /// registered socket for the token; a superseded socket closing late
    /// must not tear down its replacement's state.
    pub async fn socket_closed(&self, token: &str, handle: &ConnHandle) -> Result<(), ChatError> {
        let mut registry = self.registry.lock().await;
        match registry.lookup(token) {
            Some(current) if current.same_channel(handle) => {}
            _ => return Ok(()),
        }

        if let Some(user_id) = registry.user_id(token) {
            if let Some(active) = self.storage.get_active_chat_session_for_user(user_id).await? {
                session::close(
                    &self.storage,
                    &mut registry,
                    active.id,
                    user_id,
                    CloseReason::PeerDisconnect,
                )
                .await?;
            }
        }
        registry.unregister(token);
        info!(token, "connection closed");
        Ok(())
    }

    pub async fn online_count(&self) -> usize {
        self.registry.lock().await.online_count()
    }
}
