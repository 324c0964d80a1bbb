//! Integration tests for the session store over SQLite storage
//!
//! Each test opens its own database file in a temporary directory.

use std::sync::Arc;
use tempfile::TempDir;

use book_companion::config::StorageConfig;
use book_companion::profile::{Background, ExperienceLevel, HardwareLevel};
use book_companion::session::{SessionStore, EMAIL_KEY, PROFILE_KEY, TOKEN_KEY};
use book_companion::storage::{LocalStorage, SqliteStorage};

/// Open a SQLite-backed store inside `dir`
async fn open_store(dir: &TempDir) -> (SessionStore, Arc<SqliteStorage>) {
    let config = StorageConfig {
        path: dir.path().join("session.db"),
    };
    let storage = Arc::new(
        SqliteStorage::new(&config)
            .await
            .expect("Failed to open session storage"),
    );
    (SessionStore::new(storage.clone()), storage)
}

fn sample_profile() -> Background {
    Background::default()
        .with_experience(ExperienceLevel::Intermediate)
        .with_hardware(HardwareLevel::Advanced)
        .with_languages(["python", "cpp"])
        .with_interests(["robotics", "AI"])
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_fresh_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open_store(&dir).await;

        let session = store.get().await;
        assert!(session.is_empty());
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_session_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let (store, _) = open_store(&dir).await;
            store
                .set_authenticated("tok-1", "reader@example.com", Some(&sample_profile()))
                .await
                .unwrap();
        }

        let (store, _) = open_store(&dir).await;
        let session = store.get().await;
        assert_eq!(session.token.as_deref(), Some("tok-1"));
        assert_eq!(session.email.as_deref(), Some("reader@example.com"));
        assert_eq!(session.profile, Some(sample_profile()));
        assert!(store.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let dir = TempDir::new().unwrap();
        let (store, storage) = open_store(&dir).await;
        store
            .set_authenticated("tok-1", "reader@example.com", Some(&sample_profile()))
            .await
            .unwrap();

        store.clear().await.unwrap();

        assert!(store.get().await.is_empty());
        for key in [TOKEN_KEY, EMAIL_KEY, PROFILE_KEY] {
            assert_eq!(storage.get(key).await.unwrap(), None, "{} should be gone", key);
        }
    }

    #[tokio::test]
    async fn test_reauthentication_without_profile_drops_stale_profile() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open_store(&dir).await;
        store
            .set_authenticated("tok-1", "first@example.com", Some(&sample_profile()))
            .await
            .unwrap();

        store
            .set_authenticated("tok-2", "second@example.com", None)
            .await
            .unwrap();

        let session = store.get().await;
        assert_eq!(session.email.as_deref(), Some("second@example.com"));
        assert_eq!(session.profile, None);
    }
}

#[cfg(test)]
mod fail_soft_tests {
    use super::*;

    #[tokio::test]
    async fn test_corrupt_profile_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let (store, storage) = open_store(&dir).await;
        store
            .set_authenticated("tok-1", "reader@example.com", None)
            .await
            .unwrap();
        storage.set(PROFILE_KEY, "{not json").await.unwrap();

        let session = store.get().await;
        assert!(session.is_authenticated());
        assert_eq!(session.profile, None);
    }

    #[tokio::test]
    async fn test_empty_token_is_not_authenticated() {
        let dir = TempDir::new().unwrap();
        let (store, storage) = open_store(&dir).await;
        storage.set(TOKEN_KEY, "").await.unwrap();

        assert!(!store.is_authenticated().await);
        assert_eq!(store.get().await.token, None);
    }
}
