pub mod governance;
pub mod service;

pub use governance::{GovernanceDecision, GovernanceValidator, RuleTableValidator};
pub use service::{ConflictResolution, EligibilityData, SymbolRegistry, VerificationData};
