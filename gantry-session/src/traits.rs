//! Session value object and store trait definition.

use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// A one-shot flash message plus whether it has been read this cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashEntry {
    pub message: String,
    pub read: bool,
}

/// Session data structure.
///
/// Carries ordinary key-value data plus one-shot flash data. A flash entry
/// set during one request survives into the next (post-redirect-get); once
/// read, it is swept by `clear_flash`, which the kernel calls in its
/// post-response teardown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier
    pub id: String,
    /// Session data as key-value pairs
    pub data: HashMap<String, serde_json::Value>,
    /// One-shot flash data
    pub flash: HashMap<String, FlashEntry>,
    /// Session creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last access timestamp
    pub last_accessed_at: DateTime<Utc>,
    /// Session expiration timestamp
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session with the given ID and TTL.
    pub fn new(id: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            data: HashMap::new(),
            flash: HashMap::new(),
            created_at: now,
            last_accessed_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or_default(),
        }
    }

    /// Check if the session has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Get a value from the session data.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set a value in the session data.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> SessionResult<()> {
        let json_value =
            serde_json::to_value(value).map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.data.insert(key.to_string(), json_value);
        Ok(())
    }

    /// Remove a value from the session data.
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    /// Check if a key exists in the session data.
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Clear all session data. Flash data is left alone.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Set a one-shot flash message.
    pub fn set_flash(&mut self, key: &str, message: impl Into<String>) {
        self.flash.insert(
            key.to_string(),
            FlashEntry {
                message: message.into(),
                read: false,
            },
        );
    }

    /// Read a flash message, marking it as consumed. Consumed entries are
    /// removed by the next `clear_flash` sweep.
    pub fn get_flash(&mut self, key: &str) -> Option<String> {
        self.flash.get_mut(key).map(|entry| {
            entry.read = true;
            entry.message.clone()
        })
    }

    /// Read a flash message without consuming it.
    pub fn peek_flash(&self, key: &str) -> Option<&str> {
        self.flash.get(key).map(|entry| entry.message.as_str())
    }

    /// Take a flash message, removing it from the session immediately.
    pub fn take_flash(&mut self, key: &str) -> Option<String> {
        self.flash.remove(key).map(|entry| entry.message)
    }

    /// Sweep flash entries that have been read. Unread entries survive so a
    /// message set just before a redirect is still there for the next
    /// request. The kernel calls this after the response is sent.
    pub fn clear_flash(&mut self) {
        self.flash.retain(|_, entry| !entry.read);
    }

    /// Whether any flash data is pending.
    pub fn has_flash(&self) -> bool {
        !self.flash.is_empty()
    }

    /// Update the last accessed timestamp.
    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }

    /// Extend the session expiration.
    pub fn extend(&mut self, ttl: Duration) {
        self.expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
    }
}

/// Session store trait for storage backends.
///
/// The framework core only ever talks to this trait; which backend sits
/// behind it (in-memory, or an external key-value store supplied by the
/// application) is a wiring decision made at boot.
///
/// # Examples
///
/// ```ignore
/// use gantry_session::{SessionStore, Session};
///
/// async fn example(store: &impl SessionStore) -> SessionResult<()> {
///     let mut session = store.create(None).await?;
///     session.set("user_id", 123)?;
///     store.save(&session).await?;
///
///     let session = store.get(&session.id).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a new session.
    ///
    /// # Arguments
    ///
    /// * `ttl` - Optional custom TTL (uses the store default if None)
    async fn create(&self, ttl: Option<Duration>) -> SessionResult<Session>;

    /// Get a session by ID.
    ///
    /// Returns `Ok(Some(session))` if found, `Ok(None)` if not found or expired.
    async fn get(&self, session_id: &str) -> SessionResult<Option<Session>>;

    /// Save/update a session.
    async fn save(&self, session: &Session) -> SessionResult<()>;

    /// Delete a session.
    async fn delete(&self, session_id: &str) -> SessionResult<()>;

    /// Check if a session exists and is valid.
    async fn exists(&self, session_id: &str) -> SessionResult<bool>;

    /// Cleanup expired sessions, returning how many were removed.
    async fn cleanup_expired(&self) -> SessionResult<usize>;
}

/// Generate a new unique session ID.
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_data_roundtrip() {
        let mut session = Session::new("s1", Duration::from_secs(60));
        session.set("user_id", 42).unwrap();
        session.set("name", "alice").unwrap();

        assert_eq!(session.get::<i64>("user_id"), Some(42));
        assert_eq!(session.get::<String>("name"), Some("alice".to_string()));
        assert!(session.contains("user_id"));

        session.remove("user_id");
        assert!(!session.contains("user_id"));
    }

    #[test]
    fn test_flash_survives_until_read() {
        let mut session = Session::new("s2", Duration::from_secs(60));
        session.set_flash("notice", "Post created");

        // End of the request that set it: nothing was read, so the sweep
        // keeps the entry for the redirected request.
        session.clear_flash();
        assert!(session.has_flash());

        // Next request reads it; the sweep then removes it.
        assert_eq!(session.get_flash("notice"), Some("Post created".to_string()));
        session.clear_flash();
        assert!(!session.has_flash());
        assert_eq!(session.get_flash("notice"), None);
    }

    #[test]
    fn test_peek_flash_does_not_consume() {
        let mut session = Session::new("s3", Duration::from_secs(60));
        session.set_flash("notice", "hello");

        assert_eq!(session.peek_flash("notice"), Some("hello"));
        session.clear_flash();
        assert!(session.has_flash());

        assert_eq!(session.take_flash("notice"), Some("hello".to_string()));
        assert!(!session.has_flash());
    }

    #[test]
    fn test_clear_flash_leaves_data() {
        let mut session = Session::new("s4", Duration::from_secs(60));
        session.set("user_id", 7).unwrap();
        session.set_flash("notice", "hello");
        session.get_flash("notice");

        session.clear_flash();

        assert!(!session.has_flash());
        assert_eq!(session.get::<i64>("user_id"), Some(7));
    }

    #[test]
    fn test_session_expiry() {
        let session = Session::new("s4", Duration::from_secs(0));
        // Zero TTL expires immediately
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(session.is_expired());

        let session = Session::new("s5", Duration::from_secs(3600));
        assert!(!session.is_expired());
    }
}
