//! Job queue contract and in-process implementation
//!
//! Merge execution and rollback are fire-and-forget: the caller gets an
//! acknowledgement once the control record is durable and the multi-record
//! mutation runs on the worker consuming this queue. Delivery is
//! at-least-once; handlers are idempotent against redelivery because they
//! re-check the control record's status before acting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{RegistryError, Result};

/// Kinds of background jobs the merge worker understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    MergeExecute,
    MergeRollback,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::MergeExecute => "merge.execute",
            JobKind::MergeRollback => "merge.rollback",
        }
    }
}

/// A queued unit of work with a JSON payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub kind: JobKind,
    pub payload: serde_json::Value,
}

/// Payload for `merge.execute`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeJob {
    pub merge_id: Uuid,
    pub primary_id: Uuid,
    pub duplicate_ids: Vec<Uuid>,
    pub executed_by: String,
}

/// Payload for `merge.rollback`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackJob {
    pub merge_id: Uuid,
}

/// Queue collaborator contract
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<()>;
}

/// In-process queue over an unbounded tokio channel. Suitable for a single
/// service instance; a multi-writer deployment swaps this for a durable
/// transport behind the same trait.
#[derive(Clone)]
pub struct InProcessQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl InProcessQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl JobQueue for InProcessQueue {
    async fn enqueue(&self, job: Job) -> Result<()> {
        debug!("Enqueuing job {}", job.kind.as_str());
        self.sender
            .send(job)
            .map_err(|e| RegistryError::Queue(format!("queue closed: {e}")))
    }
}
