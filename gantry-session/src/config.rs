//! Session configuration.

use std::time::Duration;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name of the cookie carrying the session ID
    pub cookie_name: String,
    /// Session namespace/prefix
    pub namespace: String,
    /// Default session TTL
    pub default_ttl: Duration,
    /// Maximum session TTL (for security)
    pub max_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "gantry_session".to_string(),
            namespace: "session".to_string(),
            default_ttl: Duration::from_secs(3600),      // 1 hour
            max_ttl: Duration::from_secs(86400 * 7),     // 7 days
        }
    }
}

impl SessionConfig {
    /// Create a configuration with a custom cookie name.
    pub fn with_cookie_name(name: impl Into<String>) -> Self {
        Self {
            cookie_name: name.into(),
            ..Self::default()
        }
    }

    /// Set the default TTL, clamped to `max_ttl`.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl.min(self.max_ttl);
        self
    }
}
