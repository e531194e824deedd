//! In-memory store backing tests and single-process development runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{MergeRecord, SymbolRegistration, Topic};
use crate::error::{RegistryError, Result};
use crate::store::{MergeStore, SymbolStore, TopicStore};

#[derive(Default)]
struct Inner {
    topics: HashMap<Uuid, Topic>,
    merges: HashMap<Uuid, MergeRecord>,
    symbols: HashMap<Uuid, SymbolRegistration>,
}

/// Single-writer in-memory store. All mutation happens under one write lock,
/// which is what makes `update_topics` all-or-nothing here.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TopicStore for MemoryStore {
    async fn create_topic(&self, topic: &Topic) -> Result<()> {
        let mut inner = self.inner.write().await;
        let slug_taken = inner
            .topics
            .values()
            .any(|t| t.slug == topic.slug && t.deleted_at.is_none() && t.id != topic.id);
        if slug_taken {
            return Err(RegistryError::ConflictDetected(format!(
                "slug already in use: {}",
                topic.slug
            )));
        }
        inner.topics.insert(topic.id, topic.clone());
        Ok(())
    }

    async fn get_topic(&self, id: Uuid) -> Result<Option<Topic>> {
        Ok(self.inner.read().await.topics.get(&id).cloned())
    }

    async fn get_topics(&self, ids: &[Uuid]) -> Result<Vec<Topic>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.topics.get(id).cloned())
            .collect())
    }

    async fn list_scannable(&self, limit: usize) -> Result<Vec<Topic>> {
        let inner = self.inner.read().await;
        let mut topics: Vec<Topic> = inner
            .topics
            .values()
            .filter(|t| t.is_scannable())
            .cloned()
            .collect();
        topics.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        topics.truncate(limit);
        Ok(topics)
    }

    async fn update_topic(&self, topic: &Topic) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.topics.contains_key(&topic.id) {
            return Err(RegistryError::NotFound(format!("topic {}", topic.id)));
        }
        inner.topics.insert(topic.id, topic.clone());
        Ok(())
    }

    async fn update_topics(&self, topics: &[Topic]) -> Result<()> {
        let mut inner = self.inner.write().await;
        for topic in topics {
            if !inner.topics.contains_key(&topic.id) {
                return Err(RegistryError::NotFound(format!("topic {}", topic.id)));
            }
        }
        for topic in topics {
            inner.topics.insert(topic.id, topic.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl MergeStore for MemoryStore {
    async fn create_merge(&self, record: &MergeRecord) -> Result<()> {
        self.inner
            .write()
            .await
            .merges
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn get_merge(&self, id: Uuid) -> Result<Option<MergeRecord>> {
        Ok(self.inner.read().await.merges.get(&id).cloned())
    }

    async fn update_merge(&self, record: &MergeRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.merges.contains_key(&record.id) {
            return Err(RegistryError::NotFound(format!("merge {}", record.id)));
        }
        inner.merges.insert(record.id, record.clone());
        Ok(())
    }

    async fn merge_history(&self, topic_id: Uuid, limit: usize) -> Result<Vec<MergeRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<MergeRecord> = inner
            .merges
            .values()
            .filter(|r| r.involves(topic_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn find_open_merges(&self, topic_ids: &[Uuid]) -> Result<Vec<MergeRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .merges
            .values()
            .filter(|r| r.status.is_open() && topic_ids.iter().any(|id| r.involves(*id)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SymbolStore for MemoryStore {
    async fn insert_symbol(&self, registration: &SymbolRegistration) -> Result<()> {
        let mut inner = self.inner.write().await;
        let taken = inner
            .symbols
            .values()
            .any(|s| s.symbol == registration.symbol && s.status.is_live());
        if taken {
            return Err(RegistryError::ConflictDetected(format!(
                "symbol already registered: {}",
                registration.symbol
            )));
        }
        inner.symbols.insert(registration.id, registration.clone());
        Ok(())
    }

    async fn get_symbol(&self, symbol: &str) -> Result<Option<SymbolRegistration>> {
        let inner = self.inner.read().await;
        Ok(inner
            .symbols
            .values()
            .find(|s| s.symbol == symbol && s.status.is_live())
            .cloned())
    }

    async fn find_live_collision(
        &self,
        symbol: &str,
        alias: Option<&str>,
    ) -> Result<Option<SymbolRegistration>> {
        let inner = self.inner.read().await;
        Ok(inner
            .symbols
            .values()
            .find(|s| {
                s.status.is_live()
                    && (s.symbol == symbol
                        || alias.is_some() && s.alias.as_deref() == alias
                        || s.alias.as_deref() == Some(symbol))
            })
            .cloned())
    }

    async fn find_by_topic(&self, topic_id: Uuid) -> Result<Option<SymbolRegistration>> {
        let inner = self.inner.read().await;
        Ok(inner
            .symbols
            .values()
            .find(|s| s.topic_id == topic_id && s.status.is_live())
            .cloned())
    }

    async fn update_symbol(&self, registration: &SymbolRegistration) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .symbols
            .get(&registration.id)
            .ok_or_else(|| RegistryError::NotFound(format!("symbol {}", registration.symbol)))?;
        if stored.lifecycle.version != registration.lifecycle.version {
            return Err(RegistryError::TransientStore(format!(
                "version conflict on {}: stored {} vs update {}",
                registration.symbol, stored.lifecycle.version, registration.lifecycle.version
            )));
        }
        let mut updated = registration.clone();
        updated.lifecycle.version += 1;
        inner.symbols.insert(updated.id, updated);
        Ok(())
    }

    async fn update_symbols(&self, registrations: &[SymbolRegistration]) -> Result<()> {
        let mut inner = self.inner.write().await;
        for registration in registrations {
            let stored = inner.symbols.get(&registration.id).ok_or_else(|| {
                RegistryError::NotFound(format!("symbol {}", registration.symbol))
            })?;
            if stored.lifecycle.version != registration.lifecycle.version {
                return Err(RegistryError::TransientStore(format!(
                    "version conflict on {}: stored {} vs update {}",
                    registration.symbol, stored.lifecycle.version, registration.lifecycle.version
                )));
            }
        }
        for registration in registrations {
            let mut updated = registration.clone();
            updated.lifecycle.version += 1;
            inner.symbols.insert(updated.id, updated);
        }
        Ok(())
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<SymbolRegistration>> {
        let inner = self.inner.read().await;
        Ok(inner
            .symbols
            .values()
            .filter(|s| s.status.is_live() && s.is_expired_at(now))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RiskLevel, SymbolRegistration, SymbolRequest, VerificationLevel};

    fn request(topic_id: Uuid) -> SymbolRequest {
        SymbolRequest {
            topic_id,
            region: "ZA".to_string(),
            category: "ENT".to_string(),
            alias: None,
            created_by: "admin".to_string(),
            required_verification: VerificationLevel::None,
            risk_level: RiskLevel::Low,
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected() {
        let store = MemoryStore::new();
        let a = Topic::new("A", "same-slug", "ENT", "ZA");
        let b = Topic::new("B", "same-slug", "ENT", "ZA");

        store.create_topic(&a).await.unwrap();
        let err = store.create_topic(&b).await.unwrap_err();
        assert!(matches!(err, RegistryError::ConflictDetected(_)));
    }

    #[tokio::test]
    async fn test_update_topics_checks_all_before_writing() {
        let store = MemoryStore::new();
        let a = Topic::new("A", "a", "ENT", "ZA");
        store.create_topic(&a).await.unwrap();

        let mut changed = a.clone();
        changed.verified = true;
        let ghost = Topic::new("Ghost", "ghost", "ENT", "ZA");

        let err = store.update_topics(&[changed, ghost]).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
        // first topic untouched
        assert!(!store.get_topic(a.id).await.unwrap().unwrap().verified);
    }

    #[tokio::test]
    async fn test_update_symbols_checks_all_before_writing() {
        let store = MemoryStore::new();
        let mut a = SymbolRegistration::from_request(&request(Uuid::new_v4()), None).unwrap();
        let b = SymbolRegistration::from_request(&request(Uuid::new_v4()), None).unwrap();
        store.insert_symbol(&a).await.unwrap();
        store.insert_symbol(&b).await.unwrap();

        // stale the second registration's version, change the first
        store.update_symbol(&b).await.unwrap();
        a.status = crate::domain::SymbolStatus::Verified;

        let err = store.update_symbols(&[a.clone(), b]).await.unwrap_err();
        assert!(matches!(err, RegistryError::TransientStore(_)));
        // first registration untouched
        let stored = store.get_symbol(&a.symbol).await.unwrap().unwrap();
        assert_eq!(stored.status, crate::domain::SymbolStatus::Draft);
        assert_eq!(stored.lifecycle.version, 1);
    }

    #[tokio::test]
    async fn test_symbol_version_conflict() {
        let store = MemoryStore::new();
        let reg =
            SymbolRegistration::from_request(&request(Uuid::new_v4()), None).unwrap();
        store.insert_symbol(&reg).await.unwrap();

        // first update succeeds and bumps the version
        store.update_symbol(&reg).await.unwrap();
        // a second update from the same stale copy loses the race
        let err = store.update_symbol(&reg).await.unwrap_err();
        assert!(matches!(err, RegistryError::TransientStore(_)));
    }
}
