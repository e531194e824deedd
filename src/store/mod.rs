//! Storage contracts for the registry core
//!
//! The core is stateless logic over these repository traits. `PostgresStore`
//! is the durable, transactional backend; `MemoryStore` backs tests and
//! single-process development runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{MergeRecord, SymbolRegistration, Topic};
use crate::error::Result;

/// Topic persistence contract
#[async_trait]
pub trait TopicStore: Send + Sync {
    async fn create_topic(&self, topic: &Topic) -> Result<()>;

    async fn get_topic(&self, id: Uuid) -> Result<Option<Topic>>;

    /// Fetch a batch of topics by id; missing ids are silently absent
    async fn get_topics(&self, ids: &[Uuid]) -> Result<Vec<Topic>>;

    /// Active, non-deleted, non-deprecated topics, newest first
    async fn list_scannable(&self, limit: usize) -> Result<Vec<Topic>>;

    async fn update_topic(&self, topic: &Topic) -> Result<()>;

    /// All-or-nothing write of several topics. Merge execution and rollback
    /// go through this so a failure leaves every row untouched.
    async fn update_topics(&self, topics: &[Topic]) -> Result<()>;
}

/// Merge control-record persistence contract
#[async_trait]
pub trait MergeStore: Send + Sync {
    async fn create_merge(&self, record: &MergeRecord) -> Result<()>;

    async fn get_merge(&self, id: Uuid) -> Result<Option<MergeRecord>>;

    async fn update_merge(&self, record: &MergeRecord) -> Result<()>;

    /// Records where the topic appears as primary or duplicate, newest first
    async fn merge_history(&self, topic_id: Uuid, limit: usize) -> Result<Vec<MergeRecord>>;

    /// Open (in-progress or rolling-back) records touching any of the topics.
    /// The per-topic merge guard is built on this query.
    async fn find_open_merges(&self, topic_ids: &[Uuid]) -> Result<Vec<MergeRecord>>;
}

/// Symbol registration persistence contract
#[async_trait]
pub trait SymbolStore: Send + Sync {
    /// Insert a new registration. Fails with `ConflictDetected` when a live
    /// registration already claims the symbol string.
    async fn insert_symbol(&self, registration: &SymbolRegistration) -> Result<()>;

    /// Live (non-archived) registration for a symbol string
    async fn get_symbol(&self, symbol: &str) -> Result<Option<SymbolRegistration>>;

    /// Live registration colliding with the given symbol string or alias
    async fn find_live_collision(
        &self,
        symbol: &str,
        alias: Option<&str>,
    ) -> Result<Option<SymbolRegistration>>;

    /// Live registration minted for a topic, if any
    async fn find_by_topic(&self, topic_id: Uuid) -> Result<Option<SymbolRegistration>>;

    /// Optimistic update: fails with `TransientStore` when the stored version
    /// differs from `registration.lifecycle.version`. Bumps the version.
    async fn update_symbol(&self, registration: &SymbolRegistration) -> Result<()>;

    /// All-or-nothing write of several registrations, each under the same
    /// optimistic version guard as `update_symbol`. Conflict resolution goes
    /// through this so a failure leaves every registration untouched.
    async fn update_symbols(&self, registrations: &[SymbolRegistration]) -> Result<()>;

    /// Non-archived registrations whose expiration date has passed
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<SymbolRegistration>>;
}

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
