use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Merge record state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeStatus {
    /// Control record written, async mutation not yet applied
    InProgress,
    /// Duplicates deprecated into the primary
    Completed,
    /// Rollback requested, restore job queued or running
    RollingBack,
    /// Duplicates restored to independent topics
    RolledBack,
    /// Mutation abandoned with no partial state
    Failed,
}

impl MergeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStatus::InProgress => "IN_PROGRESS",
            MergeStatus::Completed => "COMPLETED",
            MergeStatus::RollingBack => "ROLLING_BACK",
            MergeStatus::RolledBack => "ROLLED_BACK",
            MergeStatus::Failed => "FAILED",
        }
    }

    /// Check if this status can transition to another status
    pub fn can_transition_to(&self, target: MergeStatus) -> bool {
        use MergeStatus::*;

        matches!(
            (self, target),
            (InProgress, Completed)
                | (InProgress, Failed)
                | (Completed, RollingBack)
                | (RollingBack, RolledBack)
        )
    }

    /// An open record blocks new merges touching the same topics
    pub fn is_open(&self) -> bool {
        matches!(self, MergeStatus::InProgress | MergeStatus::RollingBack)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MergeStatus::Completed | MergeStatus::RolledBack | MergeStatus::Failed
        )
    }
}

impl std::fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for MergeStatus {
    type Error = String;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value {
            "IN_PROGRESS" => Ok(MergeStatus::InProgress),
            "COMPLETED" => Ok(MergeStatus::Completed),
            "ROLLING_BACK" => Ok(MergeStatus::RollingBack),
            "ROLLED_BACK" => Ok(MergeStatus::RolledBack),
            "FAILED" => Ok(MergeStatus::Failed),
            other => Err(format!("unknown merge status: {other}")),
        }
    }
}

/// A proposed merge emitted by the duplicate detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeProposal {
    pub primary_id: Uuid,
    /// Duplicates sorted descending by similarity score
    pub duplicate_ids: Vec<Uuid>,
    /// Similarity score of each duplicate against the primary group seed
    pub scores: BTreeMap<Uuid, f64>,
    /// Mean of the group similarity scores
    pub confidence: f64,
    pub reason: String,
}

/// Audit/control record for one merge operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRecord {
    pub id: Uuid,
    pub primary_id: Uuid,
    pub duplicate_ids: Vec<Uuid>,
    pub scores: BTreeMap<Uuid, f64>,
    pub confidence: f64,
    pub reason: String,
    pub executed_by: String,
    pub status: MergeStatus,
    pub rollback_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub rolled_back_at: Option<DateTime<Utc>>,
}

impl MergeRecord {
    pub fn from_proposal(proposal: &MergeProposal, executed_by: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            primary_id: proposal.primary_id,
            duplicate_ids: proposal.duplicate_ids.clone(),
            scores: proposal.scores.clone(),
            confidence: proposal.confidence,
            reason: proposal.reason.clone(),
            executed_by: executed_by.to_string(),
            status: MergeStatus::InProgress,
            rollback_reason: None,
            created_at: Utc::now(),
            completed_at: None,
            rolled_back_at: None,
        }
    }

    /// All topic ids touched by this merge
    pub fn touched_topics(&self) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(self.duplicate_ids.len() + 1);
        ids.push(self.primary_id);
        ids.extend(self.duplicate_ids.iter().copied());
        ids
    }

    pub fn involves(&self, topic_id: Uuid) -> bool {
        self.primary_id == topic_id || self.duplicate_ids.contains(&topic_id)
    }
}

/// Acknowledgement returned to the caller once the control record is durable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReceipt {
    pub merge_id: Uuid,
    pub status: ReceiptStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptStatus {
    Queued,
    RollbackQueued,
}
