//! Asynchronous merge mutation worker
//!
//! Consumes `merge.execute` and `merge.rollback` jobs and applies the
//! multi-record topic mutations through the transactional store. Handlers
//! re-check the control record's status before acting, so redelivered jobs
//! are no-ops. Any failure transitions the record to FAILED and leaves all
//! topic rows untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::domain::{MergeRecord, MergeStatus, Topic};
use crate::error::{RegistryError, Result};
use crate::jobs::{Job, JobKind, MergeJob, RollbackJob};
use crate::registry::{ConflictResolution, SymbolRegistry};
use crate::store::{MergeStore, SymbolStore, TopicStore};

/// Worker statistics
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub merges_completed: u64,
    pub merges_failed: u64,
    pub rollbacks_completed: u64,
    pub jobs_skipped: u64,
    pub last_error: Option<String>,
}

pub struct MergeWorker {
    topics: Arc<dyn TopicStore>,
    merges: Arc<dyn MergeStore>,
    symbols: Arc<dyn SymbolStore>,
    registry: Arc<SymbolRegistry>,
    max_retries: u32,
    stats: Arc<RwLock<WorkerStats>>,
    running: Arc<AtomicBool>,
}

impl MergeWorker {
    pub fn new(
        topics: Arc<dyn TopicStore>,
        merges: Arc<dyn MergeStore>,
        symbols: Arc<dyn SymbolStore>,
        registry: Arc<SymbolRegistry>,
        max_retries: u32,
    ) -> Self {
        Self {
            topics,
            merges,
            symbols,
            registry,
            max_retries,
            stats: Arc::new(RwLock::new(WorkerStats::default())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn stats(&self) -> WorkerStats {
        self.stats.read().await.clone()
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Consume jobs until the channel closes or `stop` is called
    pub async fn run(&self, mut receiver: mpsc::UnboundedReceiver<Job>) {
        self.running.store(true, Ordering::SeqCst);
        info!("Merge worker started");

        while self.running.load(Ordering::SeqCst) {
            let Some(job) = receiver.recv().await else {
                break;
            };
            self.handle(job).await;
        }

        info!("Merge worker stopped");
    }

    /// Process one job. Public so one-shot admin commands can drain a queue
    /// without spawning the daemon loop.
    pub async fn handle(&self, job: Job) {
        let outcome = match job.kind {
            JobKind::MergeExecute => match serde_json::from_value::<MergeJob>(job.payload) {
                Ok(payload) => self.handle_merge(payload).await,
                Err(e) => Err(RegistryError::Json(e)),
            },
            JobKind::MergeRollback => match serde_json::from_value::<RollbackJob>(job.payload) {
                Ok(payload) => self.handle_rollback(payload).await,
                Err(e) => Err(RegistryError::Json(e)),
            },
        };

        let mut stats = self.stats.write().await;
        stats.jobs_processed += 1;
        if let Err(e) = outcome {
            error!("Job failed: {}", e);
            stats.last_error = Some(e.to_string());
        }
    }

    async fn handle_merge(&self, job: MergeJob) -> Result<()> {
        let Some(record) = self.merges.get_merge(job.merge_id).await? else {
            warn!("Merge job for unknown record {}", job.merge_id);
            return Ok(());
        };
        if record.status != MergeStatus::InProgress {
            debug!(
                "Merge {} already {}, skipping redelivered job",
                record.id, record.status
            );
            self.stats.write().await.jobs_skipped += 1;
            return Ok(());
        }

        match self.apply_merge(&record).await {
            Ok(()) => {
                let mut updated = record.clone();
                updated.status = MergeStatus::Completed;
                updated.completed_at = Some(chrono::Utc::now());
                self.merges.update_merge(&updated).await?;

                let mut stats = self.stats.write().await;
                stats.merges_completed += 1;
                drop(stats);

                info!(
                    "Merge {} completed: {} duplicate(s) deprecated into {}",
                    record.id,
                    record.duplicate_ids.len(),
                    record.primary_id
                );

                // symbol linkage is secondary to topic correctness: log and
                // carry on if it cannot be applied
                if let Err(e) = self.link_symbols(&record).await {
                    warn!("Symbol linkage for merge {} failed: {}", record.id, e);
                }
                Ok(())
            }
            Err(e) => {
                error!("Merge {} mutation failed: {}", record.id, e);
                let mut updated = record.clone();
                updated.status = MergeStatus::Failed;
                self.merges.update_merge(&updated).await?;
                self.stats.write().await.merges_failed += 1;
                Err(e)
            }
        }
    }

    /// Deprecate duplicates into the primary in one all-or-nothing write
    async fn apply_merge(&self, record: &MergeRecord) -> Result<()> {
        let mut primary = self
            .topics
            .get_topic(record.primary_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("topic {}", record.primary_id)))?;
        let duplicates = self.topics.get_topics(&record.duplicate_ids).await?;
        if duplicates.len() != record.duplicate_ids.len() {
            return Err(RegistryError::NotFound(format!(
                "merge {} references missing duplicate topics",
                record.id
            )));
        }

        let mut batch: Vec<Topic> = Vec::with_capacity(duplicates.len() + 1);
        for mut duplicate in duplicates {
            if let Some(canonical) = &duplicate.canonical_data {
                primary
                    .canonical_data
                    .get_or_insert_with(Default::default)
                    .absorb(canonical);
            }
            primary.ingest_count += duplicate.ingest_count;
            primary.market_count += duplicate.market_count;
            primary.snapshot_count += duplicate.snapshot_count;
            duplicate.deprecate_into(primary.id);
            batch.push(duplicate);
        }
        batch.push(primary);

        self.with_retries(&batch).await
    }

    async fn handle_rollback(&self, job: RollbackJob) -> Result<()> {
        let Some(record) = self.merges.get_merge(job.merge_id).await? else {
            warn!("Rollback job for unknown record {}", job.merge_id);
            return Ok(());
        };
        if record.status != MergeStatus::RollingBack {
            debug!(
                "Rollback for {} in status {}, skipping redelivered job",
                record.id, record.status
            );
            self.stats.write().await.jobs_skipped += 1;
            return Ok(());
        }

        if let Err(e) = self.apply_rollback(&record).await {
            // the in-process queue never redelivers; flag the stuck record
            // so an operator can enqueue another rollback job
            warn!(
                "Merge {} remains ROLLING_BACK, restore failed and needs a retry: {}",
                record.id, e
            );
            return Err(e);
        }

        let mut updated = record.clone();
        updated.status = MergeStatus::RolledBack;
        updated.rolled_back_at = Some(chrono::Utc::now());
        self.merges.update_merge(&updated).await?;
        self.stats.write().await.rollbacks_completed += 1;

        info!(
            "Merge {} rolled back, {} topic(s) restored",
            record.id,
            record.duplicate_ids.len()
        );
        Ok(())
    }

    /// Restore the duplicates to independent topics in one write
    async fn apply_rollback(&self, record: &MergeRecord) -> Result<()> {
        let duplicates = self.topics.get_topics(&record.duplicate_ids).await?;
        if duplicates.len() != record.duplicate_ids.len() {
            return Err(RegistryError::NotFound(format!(
                "merge {} references missing duplicate topics",
                record.id
            )));
        }

        let mut batch: Vec<Topic> = Vec::with_capacity(duplicates.len());
        for mut duplicate in duplicates {
            duplicate.restore();
            batch.push(duplicate);
        }
        self.with_retries(&batch).await
    }

    async fn with_retries(&self, batch: &[Topic]) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.topics.update_topics(batch).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Transient store failure, retry {}/{}: {}",
                        attempt, self.max_retries, e
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(50 * attempt as u64))
                        .await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// React to a completed topic merge: deprecate the losing topics'
    /// symbols under the primary's symbol
    async fn link_symbols(&self, record: &MergeRecord) -> Result<()> {
        let Some(primary_symbol) = self.symbols.find_by_topic(record.primary_id).await? else {
            return Ok(());
        };

        let mut conflicts = Vec::new();
        for duplicate_id in &record.duplicate_ids {
            if let Some(registration) = self.symbols.find_by_topic(*duplicate_id).await? {
                conflicts.push(registration.symbol);
            }
        }
        if conflicts.is_empty() {
            return Ok(());
        }

        self.registry
            .resolve_symbol_conflict(
                &primary_symbol.symbol,
                &conflicts,
                ConflictResolution::Merge,
                &record.executed_by,
            )
            .await
    }
}
