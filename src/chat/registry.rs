//! Live-connection bookkeeping: which session tokens have an open socket,
//! and which user each token resolved to.
//!
//! Plain data, no locking of its own. All mutation happens under the
//! [`ChatService`](super::ChatService) mutex, which is what makes the
//! matching transitions atomic.

use std::collections::HashMap;

use tokio::sync::mpsc;

use super::proto::ServerEvent;

/// Outbound half of one socket. Dropped when the writer task ends.
pub type ConnHandle = mpsc::UnboundedSender<ServerEvent>;

#[derive(Default)]
pub struct Registry {
    /// token -> live handle. A re-register on the same token supersedes the
    /// previous handle; the old socket is left to its own close path.
    conns: HashMap<String, ConnHandle>,
    /// token -> resolved user, set once the identity resolver has run.
    users: HashMap<String, i64>,
    /// user -> token reverse index, kept in step with `users`.
    tokens: HashMap<i64, String>,
}

impl Registry {
    pub fn register(&mut self, token: String, handle: ConnHandle) {
        self.conns.insert(token, handle);
    }

    /// Bind a token to its resolved user. A user reconnecting under a new
    /// token steals the binding from their previous one.
    pub fn bind_user(&mut self, token: &str, user_id: i64) {
        self.users.insert(token.to_owned(), user_id);
        if let Some(old_token) = self.tokens.insert(user_id, token.to_owned()) {
            if old_token != token {
                self.users.remove(&old_token);
            }
        }
    }

    pub fn lookup(&self, token: &str) -> Option<&ConnHandle> {
        self.conns.get(token)
    }

    pub fn user_id(&self, token: &str) -> Option<i64> {
        self.users.get(token).copied()
    }

    pub fn find_token_for_user(&self, user_id: i64) -> Option<&str> {
        self.tokens.get(&user_id).map(String::as_str)
    }

    /// Idempotent. Leaves the reverse index alone if the user has already
    /// re-bound to a newer token.
    pub fn unregister(&mut self, token: &str) {
        self.conns.remove(token);
        if let Some(user_id) = self.users.remove(token) {
            if self.find_token_for_user(user_id) == Some(token) {
                self.tokens.remove(&user_id);
            }
        }
    }

    /// Users with a live, identity-bound connection.
    pub fn user_ids(&self) -> Vec<i64> {
        self.tokens.keys().copied().collect()
    }

    pub fn online_count(&self) -> usize {
        self.tokens.len()
    }

    /// Best-effort delivery to a user's current socket, if any.
    pub fn send_to_user(&self, user_id: i64, event: ServerEvent) {
        if let Some(token) = self.tokens.get(&user_id) {
            if let Some(handle) = self.conns.get(token) {
                let _ = handle.send(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn register_bind_and_reverse_lookup() {
        let mut reg = Registry::default();
        let (tx, _rx) = handle();
        reg.register("tok".into(), tx);
        reg.bind_user("tok", 42);

        assert_eq!(reg.user_id("tok"), Some(42));
        assert_eq!(reg.find_token_for_user(42), Some("tok"));
        assert_eq!(reg.user_ids(), vec![42]);
        assert_eq!(reg.online_count(), 1);
    }

    #[test]
    fn newer_registration_supersedes() {
        let mut reg = Registry::default();
        let (old_tx, _old_rx) = handle();
        let (new_tx, mut new_rx) = handle();
        reg.register("tok".into(), old_tx);
        reg.bind_user("tok", 1);
        reg.register("tok".into(), new_tx);

        reg.send_to_user(1, ServerEvent::Searching);
        assert!(matches!(new_rx.try_recv(), Ok(ServerEvent::Searching)));
    }

    #[test]
    fn rebinding_user_to_new_token_drops_old_binding() {
        let mut reg = Registry::default();
        let (tx_a, _rx_a) = handle();
        let (tx_b, mut rx_b) = handle();
        reg.register("old".into(), tx_a);
        reg.bind_user("old", 7);
        reg.register("new".into(), tx_b);
        reg.bind_user("new", 7);

        assert_eq!(reg.find_token_for_user(7), Some("new"));
        assert_eq!(reg.user_id("old"), None);
        assert_eq!(reg.online_count(), 1);

        reg.send_to_user(7, ServerEvent::PartnerDisconnected);
        assert!(matches!(rx_b.try_recv(), Ok(ServerEvent::PartnerDisconnected)));

        // unregistering the stale token must not clobber the new binding
        reg.unregister("old");
        assert_eq!(reg.find_token_for_user(7), Some("new"));
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut reg = Registry::default();
        let (tx, _rx) = handle();
        reg.register("tok".into(), tx);
        reg.bind_user("tok", 5);

        reg.unregister("tok");
        reg.unregister("tok");

        assert_eq!(reg.user_id("tok"), None);
        assert_eq!(reg.find_token_for_user(5), None);
        assert_eq!(reg.online_count(), 0);
    }

    #[test]
    fn send_to_unknown_user_is_a_no_op() {
        let reg = Registry::default();
        reg.send_to_user(99, ServerEvent::Searching);
    }
}
