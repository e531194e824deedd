//! Symbol lifecycle registry
//!
//! Stateless service over the symbol store. Every mutating operation
//! appends an audit entry to the registration before writing it, so the
//! audit line and the state transition commit together.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::RegistryConfig;
use crate::domain::{SymbolRegistration, SymbolRequest, SymbolStatus};
use crate::error::{RegistryError, Result};
use crate::registry::governance::GovernanceValidator;
use crate::store::SymbolStore;

/// Evidence attached to a verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationData {
    pub verified_by: String,
    pub method: String,
    #[serde(default)]
    pub evidence: serde_json::Value,
}

/// Supporting data for a market-eligibility grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityData {
    pub requested_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Reconciliation actions for independently minted symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictResolution {
    Merge,
    Split,
    Rename,
    Separate,
}

impl ConflictResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::Merge => "MERGE",
            ConflictResolution::Split => "SPLIT",
            ConflictResolution::Rename => "RENAME",
            ConflictResolution::Separate => "SEPARATE",
        }
    }
}

pub struct SymbolRegistry {
    symbols: Arc<dyn SymbolStore>,
    governance: Arc<dyn GovernanceValidator>,
    config: RegistryConfig,
}

impl SymbolRegistry {
    pub fn new(
        symbols: Arc<dyn SymbolStore>,
        governance: Arc<dyn GovernanceValidator>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            symbols,
            governance,
            config,
        }
    }

    async fn load(&self, symbol: &str) -> Result<SymbolRegistration> {
        self.symbols
            .get_symbol(symbol)
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("symbol {symbol}")))
    }

    /// Mint a new symbol registration for a topic
    #[instrument(skip(self, request), fields(topic = %request.topic_id))]
    pub async fn register_symbol(&self, request: &SymbolRequest) -> Result<SymbolRegistration> {
        let decision = self.governance.evaluate_creation(request).await;
        if !decision.approved {
            return Err(RegistryError::GovernanceDenied(decision.reason()));
        }

        let expiration = Utc::now() + Duration::days(self.config.default_expiration_days);
        let mut registration = SymbolRegistration::from_request(request, Some(expiration))?;

        if let Some(existing) = self
            .symbols
            .find_live_collision(&registration.symbol, registration.alias.as_deref())
            .await?
        {
            return Err(RegistryError::ConflictDetected(format!(
                "symbol or alias collides with {}",
                existing.symbol
            )));
        }

        registration.audit(
            &request.created_by,
            "register",
            serde_json::json!({
                "symbol": registration.symbol,
                "alias": registration.alias,
                "risk_level": request.risk_level,
                "metadata": request.metadata,
            }),
        );
        // unique partial index backs this up against races with the
        // collision check above
        self.symbols.insert_symbol(&registration).await?;

        info!(
            "Registered symbol {} for topic {}",
            registration.symbol, registration.topic_id
        );
        Ok(registration)
    }

    /// Advance a symbol through the verification gate
    #[instrument(skip(self, data))]
    pub async fn verify_symbol(
        &self,
        symbol: &str,
        data: &VerificationData,
    ) -> Result<SymbolRegistration> {
        let mut registration = self.load(symbol).await?;

        if !matches!(
            registration.status,
            SymbolStatus::Draft | SymbolStatus::PendingVerification
        ) {
            return Err(RegistryError::InvalidState(format!(
                "symbol {} is {}, cannot verify",
                symbol, registration.status
            )));
        }

        registration.status = SymbolStatus::Verified;
        registration.lifecycle.verified_at = Some(Utc::now());
        registration.ownership.owner_verified = true;
        registration
            .governance
            .compliance_checks
            .push(format!("verification:{}", data.method));
        registration.audit(
            &data.verified_by,
            "verify",
            serde_json::json!({ "method": data.method, "evidence": data.evidence }),
        );
        self.symbols.update_symbol(&registration).await?;

        info!("Symbol {} verified via {}", symbol, data.method);
        Ok(registration)
    }

    /// Grant market eligibility to a verified symbol
    #[instrument(skip(self, data))]
    pub async fn grant_market_eligibility(
        &self,
        symbol: &str,
        data: &EligibilityData,
    ) -> Result<SymbolRegistration> {
        let mut registration = self.load(symbol).await?;

        // precondition: the verification gate must already be passed
        if registration.status != SymbolStatus::Verified {
            return Err(RegistryError::InvalidState(format!(
                "symbol {} is {}, eligibility requires VERIFIED",
                symbol, registration.status
            )));
        }

        let decision = self
            .governance
            .evaluate_eligibility(&registration, data)
            .await;
        if !decision.approved {
            return Err(RegistryError::GovernanceDenied(decision.reason()));
        }

        registration.status = SymbolStatus::MarketEligible;
        registration.governance.trading_eligible = true;
        registration.lifecycle.market_eligible_at = Some(Utc::now());
        registration.audit(
            &data.requested_by,
            "grant_market_eligibility",
            serde_json::json!({ "notes": data.notes }),
        );
        self.symbols.update_symbol(&registration).await?;

        info!("Symbol {} granted market eligibility", symbol);
        Ok(registration)
    }

    /// Move a market-eligible symbol into active trading
    #[instrument(skip(self))]
    pub async fn activate_symbol(&self, symbol: &str, actor: &str) -> Result<SymbolRegistration> {
        let mut registration = self.load(symbol).await?;

        if registration.status != SymbolStatus::MarketEligible {
            return Err(RegistryError::InvalidState(format!(
                "symbol {} is {}, activation requires MARKET_ELIGIBLE",
                symbol, registration.status
            )));
        }

        registration.status = SymbolStatus::Active;
        registration.audit(actor, "activate", serde_json::Value::Null);
        self.symbols.update_symbol(&registration).await?;
        Ok(registration)
    }

    /// Restrict or suspend a symbol on a governance violation
    #[instrument(skip(self))]
    pub async fn restrict_symbol(
        &self,
        symbol: &str,
        suspend: bool,
        flag: &str,
        actor: &str,
    ) -> Result<SymbolRegistration> {
        let mut registration = self.load(symbol).await?;

        if !registration.status.is_active_ish() {
            return Err(RegistryError::InvalidState(format!(
                "symbol {} is {}, nothing to restrict",
                symbol, registration.status
            )));
        }

        registration.status = if suspend {
            SymbolStatus::Suspended
        } else {
            SymbolStatus::Restricted
        };
        registration.governance.trading_eligible = false;
        registration
            .governance
            .restriction_flags
            .push(flag.to_string());
        registration.audit(
            actor,
            if suspend { "suspend" } else { "restrict" },
            serde_json::json!({ "flag": flag }),
        );
        self.symbols.update_symbol(&registration).await?;

        warn!("Symbol {} {}: {}", symbol, registration.status, flag);
        Ok(registration)
    }

    /// Lift a restriction or suspension. The symbol returns to VERIFIED and
    /// must re-pass the eligibility gate before trading again.
    #[instrument(skip(self))]
    pub async fn reinstate_symbol(&self, symbol: &str, actor: &str) -> Result<SymbolRegistration> {
        let mut registration = self.load(symbol).await?;

        if !matches!(
            registration.status,
            SymbolStatus::Restricted | SymbolStatus::Suspended
        ) {
            return Err(RegistryError::InvalidState(format!(
                "symbol {} is {}, nothing to reinstate",
                symbol, registration.status
            )));
        }

        registration.status = SymbolStatus::Verified;
        registration.governance.restriction_flags.clear();
        registration.lifecycle.reactivation_count += 1;
        registration.audit(actor, "reinstate", serde_json::Value::Null);
        self.symbols.update_symbol(&registration).await?;
        Ok(registration)
    }

    /// Reconcile symbols independently minted for the same real-world event.
    /// Every affected registration is loaded up front and written in one
    /// all-or-nothing batch, so parent/child pointers never diverge.
    #[instrument(skip(self, conflicts), fields(conflicts = conflicts.len()))]
    pub async fn resolve_symbol_conflict(
        &self,
        primary: &str,
        conflicts: &[String],
        resolution: ConflictResolution,
        actor: &str,
    ) -> Result<()> {
        let mut primary_registration = self.load(primary).await?;
        let mut losers = Vec::with_capacity(conflicts.len());
        for conflict in conflicts {
            losers.push(self.load(conflict).await?);
        }

        match resolution {
            ConflictResolution::Merge => {
                for loser in &mut losers {
                    loser.status = SymbolStatus::Deprecated;
                    loser.governance.trading_eligible = false;
                    loser.lifecycle.parent_symbol = Some(primary.to_string());
                    loser.audit(
                        actor,
                        "conflict_merge",
                        serde_json::json!({ "absorbed_by": primary }),
                    );
                    if !primary_registration
                        .lifecycle
                        .child_symbols
                        .contains(&loser.symbol)
                    {
                        primary_registration
                            .lifecycle
                            .child_symbols
                            .push(loser.symbol.clone());
                    }
                }
                primary_registration.audit(
                    actor,
                    "conflict_merge",
                    serde_json::json!({ "absorbed": conflicts }),
                );
            }
            // intended split/rename semantics are still an open product
            // question; record the decision without touching linkage
            ConflictResolution::Split
            | ConflictResolution::Rename
            | ConflictResolution::Separate => {
                for loser in &mut losers {
                    loser.audit(
                        actor,
                        "conflict_noted",
                        serde_json::json!({
                            "resolution": resolution.as_str(),
                            "primary": primary,
                        }),
                    );
                }
                primary_registration.audit(
                    actor,
                    "conflict_noted",
                    serde_json::json!({
                        "resolution": resolution.as_str(),
                        "conflicts": conflicts,
                    }),
                );
            }
        }

        let mut batch = losers;
        batch.push(primary_registration);
        self.symbols.update_symbols(&batch).await?;

        if resolution == ConflictResolution::Merge {
            info!(
                "Symbol conflict resolved: {} absorbed {} symbol(s)",
                primary,
                conflicts.len()
            );
        }
        Ok(())
    }

    /// Sweep past-expiration symbols into ARCHIVED. Returns the number of
    /// symbols archived; already-archived symbols are never revisited.
    #[instrument(skip(self))]
    pub async fn archive_expired_symbols(&self) -> Result<usize> {
        let now = Utc::now();
        let expired = self.symbols.list_expired(now).await?;
        let mut archived = 0usize;

        for mut registration in expired {
            let previous = registration.status;
            registration.status = SymbolStatus::Archived;
            registration.governance.trading_eligible = false;
            registration.lifecycle.archived_at = Some(now);
            registration.audit(
                "system",
                "archive_expired",
                serde_json::json!({ "previous_status": previous.as_str() }),
            );
            match self.symbols.update_symbol(&registration).await {
                Ok(()) => archived += 1,
                // lost a concurrent-update race; the next sweep picks it up
                Err(RegistryError::TransientStore(e)) => {
                    warn!("Archive sweep skipped {}: {}", registration.symbol, e)
                }
                Err(e) => return Err(e),
            }
        }

        if archived > 0 {
            info!("Archived {} expired symbol(s)", archived);
        }
        Ok(archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RiskLevel, VerificationLevel};
    use crate::registry::governance::{GovernanceDecision, RuleTableValidator};
    use crate::store::{MemoryStore, SymbolStore};
    use uuid::Uuid;

    mockall::mock! {
        Validator {}

        #[async_trait::async_trait]
        impl GovernanceValidator for Validator {
            async fn evaluate_creation(&self, request: &SymbolRequest) -> GovernanceDecision;
            async fn evaluate_eligibility(
                &self,
                registration: &SymbolRegistration,
                data: &EligibilityData,
            ) -> GovernanceDecision;
        }
    }

    fn registry(store: &MemoryStore) -> SymbolRegistry {
        SymbolRegistry::new(
            Arc::new(store.clone()),
            Arc::new(RuleTableValidator::default()),
            RegistryConfig::default(),
        )
    }

    fn request(topic_id: Uuid) -> SymbolRequest {
        SymbolRequest {
            topic_id,
            region: "ZA".to_string(),
            category: "ENT".to_string(),
            alias: None,
            created_by: "admin".to_string(),
            required_verification: VerificationLevel::Basic,
            risk_level: RiskLevel::Low,
            metadata: serde_json::Value::Null,
        }
    }

    fn verification() -> VerificationData {
        VerificationData {
            verified_by: "reviewer".to_string(),
            method: "manual".to_string(),
            evidence: serde_json::Value::Null,
        }
    }

    fn eligibility() -> EligibilityData {
        EligibilityData {
            requested_by: "admin".to_string(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_register_twice_conflicts() {
        let store = MemoryStore::new();
        let registry = registry(&store);
        let request = request(Uuid::new_v4());

        registry.register_symbol(&request).await.unwrap();
        let err = registry.register_symbol(&request).await.unwrap_err();
        assert!(matches!(err, RegistryError::ConflictDetected(_)));
    }

    #[tokio::test]
    async fn test_full_lifecycle_draft_to_active() {
        let store = MemoryStore::new();
        let registry = registry(&store);

        let registration = registry.register_symbol(&request(Uuid::new_v4())).await.unwrap();
        assert_eq!(registration.status, SymbolStatus::PendingVerification);

        let verified = registry
            .verify_symbol(&registration.symbol, &verification())
            .await
            .unwrap();
        assert_eq!(verified.status, SymbolStatus::Verified);
        assert!(verified.lifecycle.verified_at.is_some());

        let eligible = registry
            .grant_market_eligibility(&registration.symbol, &eligibility())
            .await
            .unwrap();
        assert_eq!(eligible.status, SymbolStatus::MarketEligible);
        assert!(eligible.governance.trading_eligible);

        let active = registry
            .activate_symbol(&registration.symbol, "admin")
            .await
            .unwrap();
        assert_eq!(active.status, SymbolStatus::Active);

        // one audit line per mutation, in order
        let stored = store.get_symbol(&registration.symbol).await.unwrap().unwrap();
        let actions: Vec<&str> = stored.audit_log.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(
            actions,
            vec!["register", "verify", "grant_market_eligibility", "activate"]
        );
    }

    #[tokio::test]
    async fn test_registration_respects_validator_verdict() {
        let mut validator = MockValidator::new();
        validator
            .expect_evaluate_creation()
            .returning(|_| GovernanceDecision::deny(vec!["region embargoed".to_string()]));

        let registry = SymbolRegistry::new(
            Arc::new(MemoryStore::new()),
            Arc::new(validator),
            RegistryConfig::default(),
        );
        let err = registry.register_symbol(&request(Uuid::new_v4())).await.unwrap_err();
        match err {
            RegistryError::GovernanceDenied(reason) => {
                assert!(reason.contains("region embargoed"))
            }
            other => panic!("expected GovernanceDenied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_eligibility_on_unverified_symbol_fails() {
        let store = MemoryStore::new();
        let registry = registry(&store);
        let registration = registry.register_symbol(&request(Uuid::new_v4())).await.unwrap();

        let err = registry
            .grant_market_eligibility(&registration.symbol, &eligibility())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_governance_denies_restricted_symbol_eligibility() {
        let store = MemoryStore::new();
        let registry = registry(&store);
        let registration = registry.register_symbol(&request(Uuid::new_v4())).await.unwrap();
        registry
            .verify_symbol(&registration.symbol, &verification())
            .await
            .unwrap();

        // plant a restriction flag, then ask for eligibility
        let mut flagged = store.get_symbol(&registration.symbol).await.unwrap().unwrap();
        flagged
            .governance
            .restriction_flags
            .push("pending-review".to_string());
        store.update_symbol(&flagged).await.unwrap();

        let err = registry
            .grant_market_eligibility(&registration.symbol, &eligibility())
            .await
            .unwrap_err();
        match err {
            RegistryError::GovernanceDenied(reason) => {
                assert!(reason.contains("pending-review"))
            }
            other => panic!("expected GovernanceDenied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_restrict_and_reinstate_cycle() {
        let store = MemoryStore::new();
        let registry = registry(&store);
        let registration = registry.register_symbol(&request(Uuid::new_v4())).await.unwrap();
        registry
            .verify_symbol(&registration.symbol, &verification())
            .await
            .unwrap();

        let restricted = registry
            .restrict_symbol(&registration.symbol, false, "manipulation-probe", "ops")
            .await
            .unwrap();
        assert_eq!(restricted.status, SymbolStatus::Restricted);
        assert!(!restricted.governance.trading_eligible);

        let reinstated = registry
            .reinstate_symbol(&registration.symbol, "ops")
            .await
            .unwrap();
        assert_eq!(reinstated.status, SymbolStatus::Verified);
        assert_eq!(reinstated.lifecycle.reactivation_count, 1);
        assert!(reinstated.governance.restriction_flags.is_empty());
    }

    #[tokio::test]
    async fn test_conflict_merge_links_parent_and_children() {
        let store = MemoryStore::new();
        let registry = registry(&store);

        let winner = registry.register_symbol(&request(Uuid::new_v4())).await.unwrap();
        let loser_a = registry.register_symbol(&request(Uuid::new_v4())).await.unwrap();
        let loser_b = registry.register_symbol(&request(Uuid::new_v4())).await.unwrap();

        registry
            .resolve_symbol_conflict(
                &winner.symbol,
                &[loser_a.symbol.clone(), loser_b.symbol.clone()],
                ConflictResolution::Merge,
                "admin",
            )
            .await
            .unwrap();

        let primary = store.get_symbol(&winner.symbol).await.unwrap().unwrap();
        assert_eq!(primary.lifecycle.child_symbols.len(), 2);

        for loser in [&loser_a.symbol, &loser_b.symbol] {
            let registration = store.get_symbol(loser).await.unwrap().unwrap();
            assert_eq!(registration.status, SymbolStatus::Deprecated);
            assert_eq!(
                registration.lifecycle.parent_symbol.as_deref(),
                Some(winner.symbol.as_str())
            );
        }
    }

    #[tokio::test]
    async fn test_conflict_merge_with_unknown_symbol_changes_nothing() {
        let store = MemoryStore::new();
        let registry = registry(&store);
        let winner = registry.register_symbol(&request(Uuid::new_v4())).await.unwrap();
        let loser = registry.register_symbol(&request(Uuid::new_v4())).await.unwrap();

        let err = registry
            .resolve_symbol_conflict(
                &winner.symbol,
                &[loser.symbol.clone(), "V:ZA:ENT:0000DEAD".to_string()],
                ConflictResolution::Merge,
                "admin",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));

        // no half-applied linkage on either side
        let loser_after = store.get_symbol(&loser.symbol).await.unwrap().unwrap();
        assert_eq!(loser_after.status, loser.status);
        assert!(loser_after.lifecycle.parent_symbol.is_none());
        let winner_after = store.get_symbol(&winner.symbol).await.unwrap().unwrap();
        assert!(winner_after.lifecycle.child_symbols.is_empty());
    }

    #[tokio::test]
    async fn test_conflict_split_is_audit_only() {
        let store = MemoryStore::new();
        let registry = registry(&store);
        let a = registry.register_symbol(&request(Uuid::new_v4())).await.unwrap();
        let b = registry.register_symbol(&request(Uuid::new_v4())).await.unwrap();

        registry
            .resolve_symbol_conflict(
                &a.symbol,
                &[b.symbol.clone()],
                ConflictResolution::Split,
                "admin",
            )
            .await
            .unwrap();

        let b_after = store.get_symbol(&b.symbol).await.unwrap().unwrap();
        assert_eq!(b_after.status, b.status);
        assert!(b_after.lifecycle.parent_symbol.is_none());
        assert_eq!(b_after.audit_log.last().unwrap().action, "conflict_noted");
    }

    #[tokio::test]
    async fn test_archive_sweep_is_idempotent() {
        let store = MemoryStore::new();
        let registry = registry(&store);

        let expiring = registry.register_symbol(&request(Uuid::new_v4())).await.unwrap();
        let evergreen = registry.register_symbol(&request(Uuid::new_v4())).await.unwrap();

        // push one symbol past expiry and strip the other's expiration date
        let mut expired = store.get_symbol(&expiring.symbol).await.unwrap().unwrap();
        expired.lifecycle.expiration_date = Some(Utc::now() - Duration::days(1));
        store.update_symbol(&expired).await.unwrap();
        let mut keeper = store.get_symbol(&evergreen.symbol).await.unwrap().unwrap();
        keeper.lifecycle.expiration_date = None;
        store.update_symbol(&keeper).await.unwrap();

        assert_eq!(registry.archive_expired_symbols().await.unwrap(), 1);
        assert_eq!(registry.archive_expired_symbols().await.unwrap(), 0);

        // archived symbol no longer resolves as live
        assert!(store.get_symbol(&expiring.symbol).await.unwrap().is_none());
        let keeper = store.get_symbol(&evergreen.symbol).await.unwrap().unwrap();
        assert_eq!(keeper.status, SymbolStatus::PendingVerification);
    }
}
