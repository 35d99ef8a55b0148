use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::Result;

/// Trait for storing per-session values.
///
/// Sessions are created with a fresh random identifier and live for the
/// lifetime of the store; there is no expiry or deletion. A persistent
/// backing store can be substituted without touching handler logic.
#[async_trait]
pub trait SessionStore<T: Send>: Send + Sync {
    /// Store a value under a newly generated session id and return the id.
    async fn create(&self, value: T) -> Result<String>;

    /// Replace the value stored under an existing session id.
    async fn put(&self, id: &str, value: T) -> Result<()>;

    /// Look up a session by id.
    async fn get(&self, id: &str) -> Result<Option<T>>;
}

/// In-memory implementation of SessionStore.
///
/// Backed by a sharded concurrent map, so independently scheduled handlers
/// can read and write without cross-key coordination. Unbounded and
/// process-lifetime only.
pub struct InMemorySessionStore<T> {
    entries: DashMap<String, T>,
}

impl<T> InMemorySessionStore<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T> Default for InMemorySessionStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> SessionStore<T> for InMemorySessionStore<T> {
    async fn create(&self, value: T) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.entries.insert(id.clone(), value);
        Ok(id)
    }

    async fn put(&self, id: &str, value: T) -> Result<()> {
        self.entries.insert(id.to_string(), value);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.entries.get(id).map(|entry| entry.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_returns_distinct_ids() {
        let store = InMemorySessionStore::new();

        let first = store.create("one".to_string()).await.unwrap();
        let second = store.create("two".to_string()).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.get(&first).await.unwrap(), Some("one".to_string()));
        assert_eq!(store.get(&second).await.unwrap(), Some("two".to_string()));
    }

    #[tokio::test]
    async fn unknown_id_is_none() {
        let store: InMemorySessionStore<String> = InMemorySessionStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_replaces_existing_value() {
        let store = InMemorySessionStore::new();
        let id = store.create(1u32).await.unwrap();

        store.put(&id, 2u32).await.unwrap();

        assert_eq!(store.get(&id).await.unwrap(), Some(2));
    }
}
