pub mod config;
pub mod detector;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod registry;
pub mod similarity;
pub mod store;
pub mod workflow;

pub use config::{AppConfig, DetectorConfig, RegistryConfig, SimilarityWeights, WorkerConfig};
pub use detector::DuplicateDetector;
pub use domain::{
    CanonicalData, EntityMention, MergeProposal, MergeReceipt, MergeRecord, MergeStatus,
    SymbolRegistration, SymbolRequest, SymbolStatus, Topic, VtsSymbol,
};
pub use error::{RegistryError, Result};
pub use jobs::{InProcessQueue, Job, JobKind, JobQueue, MergeJob, RollbackJob};
pub use registry::{
    ConflictResolution, EligibilityData, GovernanceDecision, GovernanceValidator,
    RuleTableValidator, SymbolRegistry, VerificationData,
};
pub use similarity::similarity;
pub use store::{MemoryStore, MergeStore, PostgresStore, SymbolStore, TopicStore};
pub use workflow::{MergeWorker, MergeWorkflow, WorkerStats};
