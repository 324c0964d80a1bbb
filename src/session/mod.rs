//! Authenticated identity shared by every flow.
//!
//! [`SessionStore`] is built once by the host and handed to each flow;
//! nothing reaches storage behind its back.

use std::sync::Arc;
use tracing::warn;

use crate::error::StorageResult;
use crate::profile::Background;
use crate::storage::{LocalStorage, MemoryStorage};

/// Storage key holding the bearer token.
pub const TOKEN_KEY: &str = "auth_token";
/// Storage key holding the signed-in email.
pub const EMAIL_KEY: &str = "user_email";
/// Storage key holding the JSON-encoded [`Background`].
pub const PROFILE_KEY: &str = "user_profile";

/// Snapshot of the current identity.
///
/// `token` present means signed in; `profile` may be absent even then.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub email: Option<String>,
    pub profile: Option<Background>,
}

impl Session {
    /// `true` iff a non-empty token is present.
    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// `true` when no field is set.
    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.email.is_none() && self.profile.is_none()
    }
}

/// Read/write access to the persisted session.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn LocalStorage>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }

    /// Store that forgets everything when dropped.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Current session. Unreadable or corrupt entries read as absent.
    pub async fn get(&self) -> Session {
        let token = self.read(TOKEN_KEY).await.filter(|t| !t.is_empty());
        let email = self.read(EMAIL_KEY).await.filter(|e| !e.is_empty());
        let profile = match self.read(PROFILE_KEY).await {
            Some(raw) => match serde_json::from_str::<Background>(&raw) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!(error = %e, "Ignoring corrupt stored profile");
                    None
                }
            },
            None => None,
        };

        Session {
            token,
            email,
            profile,
        }
    }

    /// Record a successful sign-in/sign-up.
    ///
    /// All three keys change together; a `None` profile removes any stale one.
    pub async fn set_authenticated(
        &self,
        token: &str,
        email: &str,
        profile: Option<&Background>,
    ) -> StorageResult<()> {
        let encoded = match profile.map(serde_json::to_string).transpose() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Failed to encode profile, storing session without it");
                None
            }
        };

        match encoded {
            Some(profile) => {
                self.storage
                    .apply(
                        &[(TOKEN_KEY, token), (EMAIL_KEY, email), (PROFILE_KEY, profile.as_str())],
                        &[],
                    )
                    .await
            }
            None => {
                self.storage
                    .apply(&[(TOKEN_KEY, token), (EMAIL_KEY, email)], &[PROFILE_KEY])
                    .await
            }
        }
    }

    /// Replace the stored profile, leaving token and email untouched.
    pub async fn set_profile(&self, profile: &Background) -> StorageResult<()> {
        match serde_json::to_string(profile) {
            Ok(encoded) => self.storage.set(PROFILE_KEY, &encoded).await,
            Err(e) => {
                warn!(error = %e, "Failed to encode profile, keeping the stored one");
                Ok(())
            }
        }
    }

    /// Forget the session entirely.
    pub async fn clear(&self) -> StorageResult<()> {
        self.storage
            .remove_many(&[TOKEN_KEY, EMAIL_KEY, PROFILE_KEY])
            .await
    }

    /// `true` iff a non-empty token is stored.
    pub async fn is_authenticated(&self) -> bool {
        self.read(TOKEN_KEY).await.is_some_and(|t| !t.is_empty())
    }

    /// Stored bearer token, if any.
    pub async fn token(&self) -> Option<String> {
        self.read(TOKEN_KEY).await.filter(|t| !t.is_empty())
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read session entry");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::profile::ExperienceLevel;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_empty_store_reads_empty_session() {
        let store = SessionStore::in_memory();
        assert!(store.get().await.is_empty());
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_set_authenticated_then_get() {
        let store = SessionStore::in_memory();
        let profile = Background::default()
            .with_experience(ExperienceLevel::Advanced)
            .with_languages(["python"]);

        store
            .set_authenticated("tok-1", "reader@example.com", Some(&profile))
            .await
            .unwrap();

        let session = store.get().await;
        assert_eq!(
            session,
            Session {
                token: Some("tok-1".to_string()),
                email: Some("reader@example.com".to_string()),
                profile: Some(profile),
            }
        );
        assert!(store.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_set_authenticated_without_profile_drops_stale_profile() {
        let store = SessionStore::in_memory();
        store
            .set_authenticated("old", "old@example.com", Some(&Background::default()))
            .await
            .unwrap();
        store
            .set_authenticated("new", "new@example.com", None)
            .await
            .unwrap();

        let session = store.get().await;
        assert_eq!(session.token.as_deref(), Some("new"));
        assert_eq!(session.profile, None);
    }

    #[tokio::test]
    async fn test_clear_empties_session() {
        let store = SessionStore::in_memory();
        store
            .set_authenticated("tok", "a@b.c", Some(&Background::default()))
            .await
            .unwrap();

        store.clear().await.unwrap();

        assert_eq!(store.get().await, Session::default());
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_empty_token_is_not_authenticated() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(TOKEN_KEY, "").await.unwrap();
        let store = SessionStore::new(storage);

        assert!(!store.is_authenticated().await);
        assert_eq!(store.get().await.token, None);
    }

    #[tokio::test]
    async fn test_corrupt_profile_reads_as_absent() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set_many(&[(TOKEN_KEY, "tok"), (PROFILE_KEY, "{not json")])
            .await
            .unwrap();
        let store = SessionStore::new(storage);

        let session = store.get().await;
        assert!(session.is_authenticated());
        assert_eq!(session.profile, None);
    }

    struct BrokenStorage;

    #[async_trait]
    impl LocalStorage for BrokenStorage {
        async fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::Query {
                message: "disk gone".to_string(),
            })
        }

        async fn apply(&self, _: &[(&str, &str)], _: &[&str]) -> StorageResult<()> {
            Err(StorageError::Query {
                message: "disk gone".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_read_failures_fail_soft() {
        let store = SessionStore::new(Arc::new(BrokenStorage));
        assert!(store.get().await.is_empty());
        assert!(!store.is_authenticated().await);
        assert!(store.clear().await.is_err());
    }
}
