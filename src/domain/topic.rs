use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A named entity extracted from topic content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub entity_type: String,
    pub value: String,
    /// Extraction confidence, clamped to [0, 1]
    pub confidence: f64,
}

impl EntityMention {
    pub fn new(entity_type: &str, value: &str, confidence: f64) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            value: value.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Normalized hashtags, keywords and entities describing a topic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalData {
    pub hashtags: BTreeSet<String>,
    pub keywords: BTreeSet<String>,
    #[serde(default)]
    pub entities: Vec<EntityMention>,
}

impl CanonicalData {
    pub fn is_empty(&self) -> bool {
        self.hashtags.is_empty() && self.keywords.is_empty() && self.entities.is_empty()
    }

    /// Fold another topic's canonical data into this one (used by merges).
    /// Entities are deduplicated by (type, value), keeping the higher confidence.
    pub fn absorb(&mut self, other: &CanonicalData) {
        self.hashtags.extend(other.hashtags.iter().cloned());
        self.keywords.extend(other.keywords.iter().cloned());
        for entity in &other.entities {
            match self
                .entities
                .iter_mut()
                .find(|e| e.entity_type == entity.entity_type && e.value == entity.value)
            {
                Some(existing) => {
                    if entity.confidence > existing.confidence {
                        existing.confidence = entity.confidence;
                    }
                }
                None => self.entities.push(entity.clone()),
            }
        }
    }
}

/// A candidate trending entity discovered by ingestion or created by an admin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub name: String,
    /// URL slug, unique among non-deleted topics
    pub slug: String,
    pub category: String,
    pub region: String,
    pub canonical_data: Option<CanonicalData>,
    pub verified: bool,
    pub active: bool,
    /// Set when the topic is deprecated into a merge primary
    pub merged_into: Option<Uuid>,
    /// Soft-delete marker; deleted topics never re-enter duplicate scans
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub ingest_count: i64,
    pub market_count: i64,
    pub snapshot_count: i64,
}

impl Topic {
    pub fn new(name: &str, slug: &str, category: &str, region: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
            category: category.to_string(),
            region: region.to_string(),
            canonical_data: None,
            verified: false,
            active: true,
            merged_into: None,
            deleted_at: None,
            created_at: Utc::now(),
            ingest_count: 0,
            market_count: 0,
            snapshot_count: 0,
        }
    }

    pub fn with_canonical(mut self, canonical: CanonicalData) -> Self {
        self.canonical_data = Some(canonical);
        self
    }

    pub fn with_verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }

    /// Eligible for duplicate scans: active, not deprecated, not soft-deleted
    pub fn is_scannable(&self) -> bool {
        self.active && self.merged_into.is_none() && self.deleted_at.is_none()
    }

    /// Mark this topic as a deprecated duplicate of `primary`
    pub fn deprecate_into(&mut self, primary: Uuid) {
        self.active = false;
        self.merged_into = Some(primary);
    }

    /// Undo a deprecation, restoring the topic to independent and active
    pub fn restore(&mut self) {
        self.active = true;
        self.merged_into = None;
    }
}
