//! Per-session identity: anti-forgery token and correlation id.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::storage::{CSRF_TIMESTAMP_KEY, CSRF_TOKEN_KEY, MemoryStorage, Storage};

/// How long an issued anti-forgery token stays valid.
pub const CSRF_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Session-scoped identity attached to every submission.
pub struct SessionContext {
    storage: Box<dyn Storage>,
    session_id: String,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(Box::new(MemoryStorage::new()))
    }
}

impl SessionContext {
    /// Creates a context backed by session-scoped `storage`.
    #[must_use]
    pub fn new(storage: Box<dyn Storage>) -> Self {
        Self {
            storage,
            session_id: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    /// Opaque identifier for correlating this session's submissions.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the current anti-forgery token, issuing a new one when none
    /// exists or the stored one is older than [`CSRF_TOKEN_TTL`].
    ///
    /// If session storage fails, a fresh unpersisted token is returned.
    pub async fn csrf_token(&self, now: DateTime<Utc>) -> String {
        if let Some(token) = self.stored_token(now).await {
            return token;
        }

        let token = uuid::Uuid::new_v4().simple().to_string();
        let issued = now.to_rfc3339();
        if let Err(e) = self.storage.set(CSRF_TOKEN_KEY, &token).await {
            log::warn!("Could not persist CSRF token: {e}");
        } else if let Err(e) = self.storage.set(CSRF_TIMESTAMP_KEY, &issued).await {
            log::warn!("Could not persist CSRF timestamp: {e}");
        }
        token
    }

    async fn stored_token(&self, now: DateTime<Utc>) -> Option<String> {
        let token = self.storage.get(CSRF_TOKEN_KEY).await.ok()??;
        let issued = self.storage.get(CSRF_TIMESTAMP_KEY).await.ok()??;
        let issued = DateTime::parse_from_rfc3339(&issued).ok()?.with_timezone(&Utc);
        let age = (now - issued).to_std().ok()?;
        (age < CSRF_TOKEN_TTL).then_some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::BrokenStorage;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn token_is_reused_within_ttl() {
        let session = SessionContext::default();
        let first = session.csrf_token(t0()).await;
        let second = session
            .csrf_token(t0() + chrono::Duration::minutes(59))
            .await;
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
    }

    #[tokio::test]
    async fn token_rotates_after_ttl() {
        let session = SessionContext::default();
        let first = session.csrf_token(t0()).await;
        let later = session.csrf_token(t0() + chrono::Duration::hours(1)).await;
        assert_ne!(first, later);
        // The rotated token is now the stored one.
        let again = session
            .csrf_token(t0() + chrono::Duration::minutes(61))
            .await;
        assert_eq!(later, again);
    }

    #[tokio::test]
    async fn token_is_persisted_under_known_keys() {
        let storage = std::sync::Arc::new(MemoryStorage::new());
        let session = SessionContext::new(Box::new(std::sync::Arc::clone(&storage)));
        let token = session.csrf_token(t0()).await;

        assert_eq!(storage.get(CSRF_TOKEN_KEY).await.unwrap(), Some(token));
        assert_eq!(
            storage.get(CSRF_TIMESTAMP_KEY).await.unwrap(),
            Some(t0().to_rfc3339())
        );
    }

    #[tokio::test]
    async fn broken_storage_still_yields_token() {
        let session = SessionContext::new(Box::new(BrokenStorage));
        let a = session.csrf_token(t0()).await;
        assert!(!a.is_empty());
    }

    #[test]
    fn session_ids_are_unique() {
        let a = SessionContext::default();
        let b = SessionContext::default();
        assert_ne!(a.session_id(), b.session_id());
    }
}
