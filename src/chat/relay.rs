//! Message relay: persist, then fan out to both ends of the session.

use crate::storage::Message;

use super::proto::{MessageBody, ServerEvent};
use super::{ChatError, ChatService};

impl ChatService {
    /// Persist a text message in the sender's active session and deliver it
    /// to both participants' live sockets. Delivery is at-most-once: a peer
    /// whose socket is closed simply misses it, no queueing or retries.
    pub async fn send_message(&self, token: &str, content: &str) -> Result<Message, ChatError> {
        let sender_id = self
            .registry
            .lock()
            .await
            .user_id(token)
            .ok_or(ChatError::NoIdentity)?;

        let session = self
            .storage
            .get_active_chat_session_for_user(sender_id)
            .await?
            .ok_or(ChatError::NoActiveSession)?;

        let message = self
            .storage
            .create_message(session.id, sender_id, content, "text")
            .await?;

        let event = ServerEvent::Message { message: MessageBody::from(&message) };
        let registry = self.registry.lock().await;
        // echo to the sender so their UI reflects server-confirmed state
        registry.send_to_user(sender_id, event.clone());
        registry.send_to_user(session.peer_of(sender_id), event);

        Ok(message)
    }
}
