//! Durable records behind the chat core: users, chat sessions, messages.
//!
//! SQLite via sqlx. IDs are rowid-backed autoincrement integers; timestamps
//! are unix seconds. Rows are treated as immutable once read; updates write
//! a fresh row state and re-fetch.

use std::collections::HashSet;

use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub session_token: String,
    pub device_fingerprint: String,
    pub email: Option<String>,
    pub is_anonymous: bool,
    pub is_premium: bool,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub premium_expires_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatSession {
    pub id: i64,
    pub user1_id: i64,
    pub user2_id: i64,
    pub is_active: bool,
    pub created_at: i64,
    pub ended_at: Option<i64>,
}

impl ChatSession {
    /// The participant slot that isn't `user_id`.
    pub fn peer_of(&self, user_id: i64) -> i64 {
        if self.user1_id == user_id {
            self.user2_id
        } else {
            self.user1_id
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub session_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub message_type: String,
    pub created_at: i64,
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_token TEXT NOT NULL UNIQUE,
        device_fingerprint TEXT NOT NULL,
        email TEXT,
        is_anonymous BOOLEAN NOT NULL DEFAULT 1,
        is_premium BOOLEAN NOT NULL DEFAULT 0,
        stripe_customer_id TEXT,
        stripe_subscription_id TEXT,
        premium_expires_at INTEGER,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS chat_sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user1_id INTEGER NOT NULL,
        user2_id INTEGER NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL,
        ended_at INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id INTEGER NOT NULL,
        sender_id INTEGER NOT NULL,
        content TEXT NOT NULL,
        message_type TEXT NOT NULL DEFAULT 'text',
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_session ON messages (session_id)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_active ON chat_sessions (is_active)",
];

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect(url)
            .await?;
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    /// A private in-memory database, one connection so every query sees it.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    // user operations

    pub async fn get_user(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE id=?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_user_by_session_token(&self, token: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE session_token=?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
    }

    /// Fingerprints are not unique; first match (lowest id) wins.
    pub async fn get_user_by_fingerprint(&self, fingerprint: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE device_fingerprint=? ORDER BY id LIMIT 1")
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE email=? ORDER BY id LIMIT 1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_user_by_stripe_customer(&self, customer_id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM users WHERE stripe_customer_id=? ORDER BY id LIMIT 1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn create_user(&self, session_token: &str, device_fingerprint: &str) -> Result<User, sqlx::Error> {
        let created_at = now();
        let res = sqlx::query(
            "INSERT INTO users (session_token, device_fingerprint, is_anonymous, is_premium, created_at)
             VALUES (?, ?, 1, 0, ?)",
        )
        .bind(session_token)
        .bind(device_fingerprint)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id: res.last_insert_rowid(),
            session_token: session_token.to_owned(),
            device_fingerprint: device_fingerprint.to_owned(),
            email: None,
            is_anonymous: true,
            is_premium: false,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            premium_expires_at: None,
            created_at,
        })
    }

    pub async fn update_user_premium(
        &self,
        id: i64,
        is_premium: bool,
        expires_at: Option<i64>,
    ) -> Result<User, sqlx::Error> {
        sqlx::query("UPDATE users SET is_premium=?, premium_expires_at=? WHERE id=?")
            .bind(is_premium)
            .bind(expires_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.get_user(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update_user_stripe_info(
        &self,
        id: i64,
        customer_id: &str,
        subscription_id: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query("UPDATE users SET stripe_customer_id=?, stripe_subscription_id=? WHERE id=?")
            .bind(customer_id)
            .bind(subscription_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.get_user(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update_user_email(&self, id: i64, email: Option<&str>) -> Result<User, sqlx::Error> {
        sqlx::query("UPDATE users SET email=? WHERE id=?")
            .bind(email)
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.get_user(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    // chat session operations

    pub async fn create_chat_session(&self, user1_id: i64, user2_id: i64) -> Result<ChatSession, sqlx::Error> {
        let created_at = now();
        let res = sqlx::query(
            "INSERT INTO chat_sessions (user1_id, user2_id, is_active, created_at) VALUES (?, ?, 1, ?)",
        )
        .bind(user1_id)
        .bind(user2_id)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(ChatSession {
            id: res.last_insert_rowid(),
            user1_id,
            user2_id,
            is_active: true,
            created_at,
            ended_at: None,
        })
    }

    pub async fn get_chat_session(&self, id: i64) -> Result<Option<ChatSession>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM chat_sessions WHERE id=?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_active_chat_session_for_user(&self, user_id: i64) -> Result<Option<ChatSession>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM chat_sessions WHERE is_active=1 AND (user1_id=? OR user2_id=?) ORDER BY id LIMIT 1",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn count_active_sessions_for_user(&self, user_id: i64) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM chat_sessions WHERE is_active=1 AND (user1_id=? OR user2_id=?)",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn end_chat_session(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE chat_sessions SET is_active=0, ended_at=? WHERE id=? AND is_active=1")
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Every user currently occupying a slot of an active session.
    pub async fn active_participant_ids(&self) -> Result<HashSet<i64>, sqlx::Error> {
        let rows: Vec<(i64, i64)> =
            sqlx::query_as("SELECT user1_id, user2_id FROM chat_sessions WHERE is_active=1")
                .fetch_all(&self.pool)
                .await?;
        let mut ids = HashSet::with_capacity(rows.len() * 2);
        for (a, b) in rows {
            ids.insert(a);
            ids.insert(b);
        }
        Ok(ids)
    }

    // message operations

    pub async fn create_message(
        &self,
        session_id: i64,
        sender_id: i64,
        content: &str,
        message_type: &str,
    ) -> Result<Message, sqlx::Error> {
        let created_at = now();
        let res = sqlx::query(
            "INSERT INTO messages (session_id, sender_id, content, message_type, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(sender_id)
        .bind(content)
        .bind(message_type)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Message {
            id: res.last_insert_rowid(),
            session_id,
            sender_id,
            content: content.to_owned(),
            message_type: message_type.to_owned(),
            created_at,
        })
    }

    pub async fn get_messages_by_session(&self, session_id: i64) -> Result<Vec<Message>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM messages WHERE session_id=? ORDER BY id")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
    }
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn user_roundtrip_and_lookups() {
        let storage = Storage::in_memory().await.unwrap();
        let user = storage.create_user("tok-1", "fp-1").await.unwrap();
        assert!(user.is_anonymous);
        assert!(!user.is_premium);

        let by_token = storage.get_user_by_session_token("tok-1").await.unwrap().unwrap();
        assert_eq!(by_token.id, user.id);
        let by_fp = storage.get_user_by_fingerprint("fp-1").await.unwrap().unwrap();
        assert_eq!(by_fp.id, user.id);
        assert!(storage.get_user_by_session_token("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fingerprint_collision_first_match_wins() {
        let storage = Storage::in_memory().await.unwrap();
        let first = storage.create_user("tok-1", "shared-fp").await.unwrap();
        let _second = storage.create_user("tok-2", "shared-fp").await.unwrap();

        let found = storage.get_user_by_fingerprint("shared-fp").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let storage = Storage::in_memory().await.unwrap();
        let a = storage.create_user("a", "fa").await.unwrap();
        let b = storage.create_user("b", "fb").await.unwrap();

        let session = storage.create_chat_session(a.id, b.id).await.unwrap();
        assert!(session.is_active);
        assert_eq!(session.peer_of(a.id), b.id);
        assert_eq!(session.peer_of(b.id), a.id);

        let active = storage.get_active_chat_session_for_user(b.id).await.unwrap().unwrap();
        assert_eq!(active.id, session.id);

        storage.end_chat_session(session.id).await.unwrap();
        let ended = storage.get_chat_session(session.id).await.unwrap().unwrap();
        assert!(!ended.is_active);
        assert!(ended.ended_at.is_some());
        assert!(storage.get_active_chat_session_for_user(a.id).await.unwrap().is_none());
        assert!(storage.get_active_chat_session_for_user(b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn end_chat_session_is_idempotent() {
        let storage = Storage::in_memory().await.unwrap();
        let a = storage.create_user("a", "fa").await.unwrap();
        let b = storage.create_user("b", "fb").await.unwrap();
        let session = storage.create_chat_session(a.id, b.id).await.unwrap();

        storage.end_chat_session(session.id).await.unwrap();
        let first = storage.get_chat_session(session.id).await.unwrap().unwrap();
        storage.end_chat_session(session.id).await.unwrap();
        let second = storage.get_chat_session(session.id).await.unwrap().unwrap();
        assert_eq!(first.ended_at, second.ended_at);
    }

    #[tokio::test]
    async fn messages_come_back_in_send_order() {
        let storage = Storage::in_memory().await.unwrap();
        let a = storage.create_user("a", "fa").await.unwrap();
        let b = storage.create_user("b", "fb").await.unwrap();
        let session = storage.create_chat_session(a.id, b.id).await.unwrap();

        for text in ["one", "two", "three"] {
            storage.create_message(session.id, a.id, text, "text").await.unwrap();
        }
        let log = storage.get_messages_by_session(session.id).await.unwrap();
        let contents: Vec<&str> = log.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "two", "three"]);
        assert!(log.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn active_participants_cover_both_slots() {
        let storage = Storage::in_memory().await.unwrap();
        let a = storage.create_user("a", "fa").await.unwrap();
        let b = storage.create_user("b", "fb").await.unwrap();
        let c = storage.create_user("c", "fc").await.unwrap();
        let session = storage.create_chat_session(a.id, b.id).await.unwrap();

        let busy = storage.active_participant_ids().await.unwrap();
        assert!(busy.contains(&a.id));
        assert!(busy.contains(&b.id));
        assert!(!busy.contains(&c.id));

        storage.end_chat_session(session.id).await.unwrap();
        assert!(storage.active_participant_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stripe_customer_lookup_after_info_update() {
        let storage = Storage::in_memory().await.unwrap();
        let user = storage.create_user("tok", "fp").await.unwrap();
        assert!(storage.get_user_by_stripe_customer("cus_123").await.unwrap().is_none());

        let updated = storage.update_user_stripe_info(user.id, "cus_123", "sub_456").await.unwrap();
        assert_eq!(updated.stripe_customer_id.as_deref(), Some("cus_123"));
        assert_eq!(updated.stripe_subscription_id.as_deref(), Some("sub_456"));

        let found = storage.get_user_by_stripe_customer("cus_123").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn premium_and_email_updates() {
        let storage = Storage::in_memory().await.unwrap();
        let user = storage.create_user("tok", "fp").await.unwrap();

        let premium = storage.update_user_premium(user.id, true, Some(now() + 3600)).await.unwrap();
        assert!(premium.is_premium);
        assert!(premium.premium_expires_at.is_some());

        let with_email = storage.update_user_email(user.id, Some("a@b.c")).await.unwrap();
        assert_eq!(with_email.email.as_deref(), Some("a@b.c"));
        assert_eq!(storage.get_user_by_email("a@b.c").await.unwrap().unwrap().id, user.id);

        let cleared = storage.update_user_email(user.id, None).await.unwrap();
        assert!(cleared.email.is_none());
    }
}
