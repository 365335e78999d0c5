//! The memory store seam.
//!
//! The markdown-backed store is an external collaborator; the gateway
//! only needs a key/value-plus-search interface, scoped by store name
//! (one store per role).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::GatewayResult;

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryHit {
    /// The store the hit came from.
    pub store: String,
    /// The entry's key.
    pub key: String,
    /// The entry's content.
    pub content: String,
}

/// Key/value + search interface over role-scoped memory stores.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Save content under a key in one store.
    async fn save(&self, store: &str, key: &str, content: &str) -> GatewayResult<()>;

    /// Search the given stores for entries matching the query.
    async fn search(&self, stores: &[String], query: &str) -> GatewayResult<Vec<MemoryHit>>;

    /// List entry keys per store.
    async fn list(&self, stores: &[String]) -> GatewayResult<Vec<MemoryHit>>;

    /// Every store that currently exists.
    async fn store_names(&self) -> Vec<String>;
}

/// In-memory implementation used for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct InMemoryMemoryStore {
    stores: RwLock<HashMap<String, Vec<(String, String)>>>,
}

impl InMemoryMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn save(&self, store: &str, key: &str, content: &str) -> GatewayResult<()> {
        if let Ok(mut stores) = self.stores.write() {
            let entries = stores.entry(store.to_string()).or_default();
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some((_, existing)) => *existing = content.to_string(),
                None => entries.push((key.to_string(), content.to_string())),
            }
        }
        Ok(())
    }

    async fn search(&self, stores: &[String], query: &str) -> GatewayResult<Vec<MemoryHit>> {
        let lowered = query.to_lowercase();
        let Ok(all) = self.stores.read() else {
            return Ok(Vec::new());
        };
        let mut hits = Vec::new();
        for store in stores {
            let Some(entries) = all.get(store) else {
                continue;
            };
            for (key, content) in entries {
                if key.to_lowercase().contains(&lowered)
                    || content.to_lowercase().contains(&lowered)
                {
                    hits.push(MemoryHit {
                        store: store.clone(),
                        key: key.clone(),
                        content: content.clone(),
                    });
                }
            }
        }
        Ok(hits)
    }

    async fn list(&self, stores: &[String]) -> GatewayResult<Vec<MemoryHit>> {
        let Ok(all) = self.stores.read() else {
            return Ok(Vec::new());
        };
        let mut entries = Vec::new();
        for store in stores {
            let Some(items) = all.get(store) else {
                continue;
            };
            for (key, content) in items {
                entries.push(MemoryHit {
                    store: store.clone(),
                    key: key.clone(),
                    content: content.clone(),
                });
            }
        }
        Ok(entries)
    }

    async fn store_names(&self) -> Vec<String> {
        self.stores
            .read()
            .map(|stores| stores.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_search() {
        let store = InMemoryMemoryStore::new();
        store
            .save("developer", "deploy-steps", "run the canary first")
            .await
            .unwrap();
        store
            .save("operator", "oncall", "rotate weekly")
            .await
            .unwrap();

        let hits = store
            .search(&["developer".to_string()], "canary")
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "deploy-steps");

        // Scoped search does not leak other stores.
        let hits = store
            .search(&["developer".to_string()], "rotate")
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = InMemoryMemoryStore::new();
        store.save("dev", "k", "v1").await.unwrap();
        store.save("dev", "k", "v2").await.unwrap();
        let entries = store.list(&["dev".to_string()]).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "v2");
    }

    #[tokio::test]
    async fn test_store_names() {
        let store = InMemoryMemoryStore::new();
        store.save("a", "k", "v").await.unwrap();
        store.save("b", "k", "v").await.unwrap();
        let mut names = store.store_names().await;
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }
}
