//! Durable local storage for client-side state.
//!
//! A small async key/value contract with two implementations:
//! [`SqliteStorage`] for state that must survive restarts and
//! [`MemoryStorage`] for tests and ephemeral hosts.

mod memory;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Key/value storage that outlives a single flow.
///
/// Multi-key writes and removals are applied atomically: a reader never
/// observes some of the keys written and others not.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    /// Read a single entry.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write `entries` and remove `removals` as one unit.
    /// Missing keys are ignored.
    async fn apply(&self, entries: &[(&str, &str)], removals: &[&str]) -> StorageResult<()>;

    /// Write several entries as one unit.
    async fn set_many(&self, entries: &[(&str, &str)]) -> StorageResult<()> {
        self.apply(entries, &[]).await
    }

    /// Remove several entries as one unit.
    async fn remove_many(&self, keys: &[&str]) -> StorageResult<()> {
        self.apply(&[], keys).await
    }

    /// Write a single entry.
    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.set_many(&[(key, value)]).await
    }
}
