//! Access-token sessions for management clients.
//!
//! A [`Session`] is the bearer token a client presents to Resource Manager.
//! Each [`ManagementClient`](crate::client::ManagementClient) keeps at most
//! one in a [`SessionCache`] and asks its credential for a new one shortly
//! before expiry.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

/// Tokens closer than this to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// A bearer token and its expiry.
///
/// # Security
///
/// The token is never rendered by `Debug` and never logged.
#[derive(Clone)]
pub struct Session {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session expiring `expires_in_secs` seconds from now.
    pub fn new(token: impl Into<String>, expires_in_secs: i64) -> Self {
        Self {
            token: token.into(),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    /// Returns the bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns when the session expires.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Checks whether the token can still be presented.
    pub fn is_valid(&self) -> bool {
        Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS) < self.expires_at
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// In-memory cache holding one session.
#[derive(Debug, Default)]
pub struct SessionCache {
    current: RwLock<Option<Session>>,
}

impl SessionCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached session if it is still valid.
    pub async fn load(&self) -> Option<Session> {
        let current = self.current.read().await;
        current.as_ref().filter(|s| s.is_valid()).cloned()
    }

    /// Replaces the cached session.
    pub async fn save(&self, session: Session) {
        let mut current = self.current.write().await;
        *current = Some(session);
    }

    /// Clears the cached session.
    pub async fn clear(&self) {
        let mut current = self.current.write().await;
        *current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_validity() {
        assert!(Session::new("t", 3600).is_valid());
        assert!(!Session::new("t", 30).is_valid());
        assert!(!Session::new("t", -10).is_valid());
    }

    #[test]
    fn test_debug_hides_token() {
        let session = Session::new("super-secret-token", 3600);
        assert!(!format!("{:?}", session).contains("super-secret-token"));
        assert_eq!(session.token(), "super-secret-token");
    }

    #[tokio::test]
    async fn test_cache_save_load_clear() {
        let cache = SessionCache::new();
        assert!(cache.load().await.is_none());

        cache.save(Session::new("t", 3600)).await;
        assert_eq!(cache.load().await.unwrap().token(), "t");

        cache.save(Session::new("stale", 5)).await;
        assert!(cache.load().await.is_none());

        cache.clear().await;
        assert!(cache.load().await.is_none());
    }
}
