//! Duplicate detector
//!
//! Pairwise O(n²) scan over a bounded window of scannable topics. Callers
//! keep `scan_limit` small and run this off the request path; the detector
//! itself never mutates anything, it only emits proposals.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{DetectorConfig, SimilarityWeights};
use crate::domain::{MergeProposal, Topic};
use crate::error::{RegistryError, Result};
use crate::similarity::similarity;
use crate::store::TopicStore;

pub struct DuplicateDetector {
    topics: Arc<dyn TopicStore>,
    config: DetectorConfig,
    weights: SimilarityWeights,
}

impl DuplicateDetector {
    pub fn new(
        topics: Arc<dyn TopicStore>,
        config: DetectorConfig,
        weights: SimilarityWeights,
    ) -> Self {
        Self {
            topics,
            config,
            weights,
        }
    }

    /// Scan up to `scan_limit` topics and group near-duplicates into proposals
    pub async fn detect_duplicates(&self, scan_limit: usize) -> Result<Vec<MergeProposal>> {
        let window = self.topics.list_scannable(scan_limit).await?;
        debug!("Scanning {} topics for duplicates", window.len());

        let mut processed: HashSet<Uuid> = HashSet::new();
        let mut proposals = Vec::new();

        for (i, seed) in window.iter().enumerate() {
            if processed.contains(&seed.id) {
                continue;
            }

            let mut candidates: Vec<(&Topic, f64)> = Vec::new();
            for other in window.iter().skip(i + 1) {
                if processed.contains(&other.id) {
                    continue;
                }
                let score = similarity(seed, other, &self.weights);
                if score >= self.config.merge_threshold {
                    candidates.push((other, score));
                }
            }

            if candidates.is_empty() {
                continue;
            }

            candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
            candidates.truncate(self.config.max_merge_candidates);

            // everyone in the group is settled for this pass
            processed.insert(seed.id);
            for (topic, _) in &candidates {
                processed.insert(topic.id);
            }

            let mut members: Vec<&Topic> = vec![seed];
            members.extend(candidates.iter().map(|(topic, _)| *topic));
            let primary = elect_primary(&members);
            let duplicates: Vec<&Topic> = members
                .iter()
                .copied()
                .filter(|topic| topic.id != primary.id)
                .collect();
            proposals.push(self.assemble_proposal(primary, &duplicates));
        }

        info!(
            "Duplicate scan over {} topics produced {} proposals",
            window.len(),
            proposals.len()
        );
        Ok(proposals)
    }

    /// Recompute similarity for an admin-selected candidate list and apply
    /// the same threshold filter. The caller's primary is kept as-is, it is
    /// never re-elected.
    pub async fn propose_merge(
        &self,
        primary_id: Uuid,
        duplicate_ids: &[Uuid],
    ) -> Result<MergeProposal> {
        let primary = self
            .topics
            .get_topic(primary_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("topic {primary_id}")))?;

        let duplicates = self.topics.get_topics(duplicate_ids).await?;
        if duplicates.len() != duplicate_ids.len() {
            let found: HashSet<Uuid> = duplicates.iter().map(|t| t.id).collect();
            let missing: Vec<String> = duplicate_ids
                .iter()
                .filter(|id| !found.contains(id))
                .map(|id| id.to_string())
                .collect();
            return Err(RegistryError::NotFound(format!(
                "duplicate topics missing: {}",
                missing.join(", ")
            )));
        }

        let mut kept: Vec<&Topic> = Vec::new();
        for duplicate in &duplicates {
            let score = similarity(&primary, duplicate, &self.weights);
            if score >= self.config.merge_threshold {
                kept.push(duplicate);
            } else {
                debug!(
                    "Dropping candidate {} below threshold ({:.3} < {:.3})",
                    duplicate.id, score, self.config.merge_threshold
                );
            }
        }

        Ok(self.assemble_proposal(&primary, &kept))
    }

    /// Score each duplicate against the primary and fold the pair scores
    /// into a proposal. Confidence is the mean of the recorded scores.
    fn assemble_proposal(&self, primary: &Topic, duplicates: &[&Topic]) -> MergeProposal {
        let mut scores: BTreeMap<Uuid, f64> = BTreeMap::new();
        let mut duplicate_ids: Vec<Uuid> = Vec::new();
        let mut score_sum = 0.0;

        for duplicate in duplicates {
            let score = similarity(primary, duplicate, &self.weights);
            duplicate_ids.push(duplicate.id);
            scores.insert(duplicate.id, score);
            score_sum += score;
        }

        let confidence = if duplicate_ids.is_empty() {
            0.0
        } else {
            score_sum / duplicate_ids.len() as f64
        };

        let reason = format!(
            "{} topic(s) scored at or above the merge threshold against \"{}\" \
             (mean similarity {:.3})",
            duplicate_ids.len(),
            primary.name,
            confidence
        );

        MergeProposal {
            primary_id: primary.id,
            duplicate_ids,
            scores,
            confidence,
            reason,
        }
    }
}

/// Precedence for scan-discovered groups: verified beats unverified, then
/// higher ingest count, then most recent creation.
fn elect_primary<'a>(group: &[&'a Topic]) -> &'a Topic {
    group
        .iter()
        .copied()
        .max_by(|a, b| {
            a.verified
                .cmp(&b.verified)
                .then(a.ingest_count.cmp(&b.ingest_count))
                .then(a.created_at.cmp(&b.created_at))
        })
        .expect("group is never empty")
}
