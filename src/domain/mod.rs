pub mod merge;
pub mod symbol;
pub mod topic;

pub use merge::{MergeProposal, MergeReceipt, MergeRecord, MergeStatus};
pub use symbol::{
    AuditEntry, GovernanceBlock, LifecycleBlock, OwnershipBlock, RiskLevel, SymbolRegistration,
    SymbolRequest, SymbolStatus, VerificationLevel, VtsSymbol,
};
pub use topic::{CanonicalData, EntityMention, Topic};
