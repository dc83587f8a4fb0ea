//! In-memory session store.
//!
//! Keeps sessions in a process-local map. Suitable for tests, development,
//! and single-process deployments; anything that must survive a restart or
//! span processes needs an external backend implementing [`SessionStore`].

use crate::config::SessionConfig;
use crate::error::SessionResult;
use crate::traits::{Session, SessionStore, generate_session_id};
use async_trait::async_trait;
use gantry_log::{debug, trace};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// In-memory session store backed by a `tokio::sync::RwLock` map.
#[derive(Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    config: SessionConfig,
}

impl MemorySessionStore {
    /// Create a store with default configuration.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Create a store with custom configuration.
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Number of sessions currently held, including expired ones
    /// not yet swept by `cleanup_expired`.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, ttl: Option<Duration>) -> SessionResult<Session> {
        let ttl = ttl
            .unwrap_or(self.config.default_ttl)
            .min(self.config.max_ttl);
        let session = Session::new(generate_session_id(), ttl);

        debug!(target: "gantry::session", "Created session {}", session.id);

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get(&self, session_id: &str) -> SessionResult<Option<Session>> {
        let sessions = self.sessions.read().await;
        match sessions.get(session_id) {
            Some(session) if !session.is_expired() => {
                trace!(target: "gantry::session", "Session {} hit", session_id);
                Ok(Some(session.clone()))
            }
            Some(_) => {
                trace!(target: "gantry::session", "Session {} expired", session_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn save(&self, session: &Session) -> SessionResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> SessionResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        debug!(target: "gantry::session", "Deleted session {}", session_id);
        Ok(())
    }

    async fn exists(&self, session_id: &str) -> SessionResult<bool> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .map(|s| !s.is_expired())
            .unwrap_or(false))
    }

    async fn cleanup_expired(&self) -> SessionResult<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(target: "gantry::session", "Swept {} expired sessions", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemorySessionStore::new();
        let session = store.create(None).await.unwrap();

        let loaded = store.get(&session.id).await.unwrap();
        assert!(loaded.is_some());
        assert_eq!(loaded.unwrap().id, session.id);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = MemorySessionStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_persists_changes() {
        let store = MemorySessionStore::new();
        let mut session = store.create(None).await.unwrap();

        session.set("user_id", 9).unwrap();
        store.save(&session).await.unwrap();

        let loaded = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.get::<i64>("user_id"), Some(9));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemorySessionStore::new();
        let session = store.create(None).await.unwrap();

        store.delete(&session.id).await.unwrap();
        assert!(!store.exists(&session.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_sessions_are_invisible_and_swept() {
        let store = MemorySessionStore::new();
        let session = store.create(Some(Duration::from_secs(0))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(store.get(&session.id).await.unwrap().is_none());
        assert!(!store.exists(&session.id).await.unwrap());

        let removed = store.cleanup_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.is_empty().await);
    }
}
