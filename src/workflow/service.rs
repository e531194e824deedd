//! Merge workflow control plane
//!
//! Creates durable merge control records, enforces the per-topic merge
//! guard, and enqueues the asynchronous mutation jobs. The actual topic
//! rewrites happen in `MergeWorker`; this service returns as soon as the
//! control record is written.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::merge::ReceiptStatus;
use crate::domain::{MergeProposal, MergeReceipt, MergeRecord, MergeStatus};
use crate::error::{RegistryError, Result};
use crate::jobs::{Job, JobKind, JobQueue, MergeJob, RollbackJob};
use crate::store::{MergeStore, TopicStore};

pub struct MergeWorkflow {
    topics: Arc<dyn TopicStore>,
    merges: Arc<dyn MergeStore>,
    queue: Arc<dyn JobQueue>,
}

impl MergeWorkflow {
    pub fn new(
        topics: Arc<dyn TopicStore>,
        merges: Arc<dyn MergeStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            topics,
            merges,
            queue,
        }
    }

    /// Execute a merge proposal: durably record the intent, enqueue the
    /// mutation job, return immediately.
    #[instrument(skip(self, proposal), fields(primary = %proposal.primary_id))]
    pub async fn execute(&self, proposal: &MergeProposal, executor: &str) -> Result<MergeReceipt> {
        if proposal.duplicate_ids.is_empty() {
            return Err(RegistryError::InvalidState(
                "merge proposal has no duplicates".to_string(),
            ));
        }

        // fail fast on missing topics before writing anything
        let mut all_ids = vec![proposal.primary_id];
        all_ids.extend(proposal.duplicate_ids.iter().copied());
        let found = self.topics.get_topics(&all_ids).await?;
        if found.len() != all_ids.len() {
            return Err(RegistryError::NotFound(format!(
                "merge references {} topics, found {}",
                all_ids.len(),
                found.len()
            )));
        }

        // per-topic guard: refuse while any touched topic already has an
        // open merge or rollback in flight
        let open = self.merges.find_open_merges(&all_ids).await?;
        if let Some(conflicting) = open.first() {
            return Err(RegistryError::ConflictDetected(format!(
                "merge {} is already open for one of these topics",
                conflicting.id
            )));
        }

        let record = MergeRecord::from_proposal(proposal, executor);
        self.merges.create_merge(&record).await?;

        let payload = serde_json::to_value(MergeJob {
            merge_id: record.id,
            primary_id: record.primary_id,
            duplicate_ids: record.duplicate_ids.clone(),
            executed_by: executor.to_string(),
        })?;
        self.queue
            .enqueue(Job {
                kind: JobKind::MergeExecute,
                payload,
            })
            .await?;

        info!(
            "Merge {} queued: {} duplicate(s) into {}",
            record.id,
            record.duplicate_ids.len(),
            record.primary_id
        );
        Ok(MergeReceipt {
            merge_id: record.id,
            status: ReceiptStatus::Queued,
        })
    }

    /// Request rollback of a completed merge
    #[instrument(skip(self))]
    pub async fn rollback(&self, merge_id: Uuid, reason: Option<&str>) -> Result<MergeReceipt> {
        let mut record = self
            .merges
            .get_merge(merge_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("merge {merge_id}")))?;

        if record.status != MergeStatus::Completed {
            return Err(RegistryError::InvalidState(format!(
                "merge {} is {}, only COMPLETED merges can be rolled back",
                merge_id, record.status
            )));
        }

        record.status = MergeStatus::RollingBack;
        record.rollback_reason = reason.map(str::to_string);
        self.merges.update_merge(&record).await?;

        let payload = serde_json::to_value(RollbackJob { merge_id })?;
        if let Err(e) = self
            .queue
            .enqueue(Job {
                kind: JobKind::MergeRollback,
                payload,
            })
            .await
        {
            warn!("Rollback job enqueue failed for {}: {}", merge_id, e);
            return Err(e);
        }

        info!("Rollback queued for merge {}", merge_id);
        Ok(MergeReceipt {
            merge_id,
            status: ReceiptStatus::RollbackQueued,
        })
    }

    /// Up to `limit` most-recent merge records touching a topic
    pub async fn merge_history(&self, topic_id: Uuid, limit: usize) -> Result<Vec<MergeRecord>> {
        self.merges.merge_history(topic_id, limit.min(10)).await
    }
}
