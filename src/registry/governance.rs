//! Governance validator seam
//!
//! The registry consults this before minting a symbol and before granting
//! market eligibility. It is a pure decision function from the core's
//! perspective; the default implementation is a static rule table.

use async_trait::async_trait;

use crate::domain::{RiskLevel, SymbolRegistration, SymbolRequest, VerificationLevel};
use crate::registry::service::EligibilityData;

/// Outcome of a governance evaluation
#[derive(Debug, Clone)]
pub struct GovernanceDecision {
    pub approved: bool,
    pub violations: Vec<String>,
}

impl GovernanceDecision {
    pub fn approve() -> Self {
        Self {
            approved: true,
            violations: Vec::new(),
        }
    }

    pub fn deny(violations: Vec<String>) -> Self {
        Self {
            approved: false,
            violations,
        }
    }

    pub fn reason(&self) -> String {
        self.violations.join("; ")
    }
}

#[async_trait]
pub trait GovernanceValidator: Send + Sync {
    /// Gate symbol creation
    async fn evaluate_creation(&self, request: &SymbolRequest) -> GovernanceDecision;

    /// Gate the market-eligibility grant
    async fn evaluate_eligibility(
        &self,
        registration: &SymbolRegistration,
        data: &EligibilityData,
    ) -> GovernanceDecision;
}

/// Static rule table used as the default validator
pub struct RuleTableValidator {
    reserved_prefixes: Vec<String>,
}

impl RuleTableValidator {
    pub fn new(reserved_prefixes: Vec<String>) -> Self {
        Self { reserved_prefixes }
    }
}

impl Default for RuleTableValidator {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl GovernanceValidator for RuleTableValidator {
    async fn evaluate_creation(&self, request: &SymbolRequest) -> GovernanceDecision {
        let mut violations = Vec::new();

        if request.risk_level == RiskLevel::Severe {
            violations.push("severe-risk topics cannot mint symbols".to_string());
        }
        if let Some(alias) = &request.alias {
            if self
                .reserved_prefixes
                .iter()
                .any(|p| alias.to_uppercase().starts_with(&p.to_uppercase()))
            {
                violations.push(format!("alias uses a reserved prefix: {alias}"));
            }
        }
        if request.risk_level >= RiskLevel::High
            && request.required_verification < VerificationLevel::Enhanced
        {
            violations
                .push("high-risk symbols require enhanced verification".to_string());
        }

        if violations.is_empty() {
            GovernanceDecision::approve()
        } else {
            GovernanceDecision::deny(violations)
        }
    }

    async fn evaluate_eligibility(
        &self,
        registration: &SymbolRegistration,
        _data: &EligibilityData,
    ) -> GovernanceDecision {
        let mut violations = Vec::new();

        if registration.governance.risk_level == RiskLevel::Severe {
            violations.push("severe-risk symbols are never market eligible".to_string());
        }
        if registration.governance.risk_level >= RiskLevel::High
            && !registration
                .governance
                .regional_approvals
                .contains(&registration.ownership.region)
        {
            violations.push(format!(
                "high-risk symbol lacks regional approval for {}",
                registration.ownership.region
            ));
        }
        if !registration.governance.restriction_flags.is_empty() {
            violations.push(format!(
                "outstanding restriction flags: {}",
                registration.governance.restriction_flags.join(", ")
            ));
        }

        if violations.is_empty() {
            GovernanceDecision::approve()
        } else {
            GovernanceDecision::deny(violations)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request(risk: RiskLevel, verification: VerificationLevel) -> SymbolRequest {
        SymbolRequest {
            topic_id: Uuid::new_v4(),
            region: "ZA".to_string(),
            category: "ENT".to_string(),
            alias: None,
            created_by: "admin".to_string(),
            required_verification: verification,
            risk_level: risk,
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_low_risk_creation_approved() {
        let validator = RuleTableValidator::default();
        let decision = validator
            .evaluate_creation(&request(RiskLevel::Low, VerificationLevel::None))
            .await;
        assert!(decision.approved);
    }

    #[tokio::test]
    async fn test_severe_risk_creation_denied() {
        let validator = RuleTableValidator::default();
        let decision = validator
            .evaluate_creation(&request(RiskLevel::Severe, VerificationLevel::Enhanced))
            .await;
        assert!(!decision.approved);
        assert!(!decision.reason().is_empty());
    }

    #[tokio::test]
    async fn test_high_risk_needs_enhanced_verification() {
        let validator = RuleTableValidator::default();
        let denied = validator
            .evaluate_creation(&request(RiskLevel::High, VerificationLevel::Basic))
            .await;
        assert!(!denied.approved);

        let approved = validator
            .evaluate_creation(&request(RiskLevel::High, VerificationLevel::Enhanced))
            .await;
        assert!(approved.approved);
    }

    #[tokio::test]
    async fn test_high_risk_eligibility_needs_regional_approval() {
        use crate::domain::SymbolRegistration;

        let validator = RuleTableValidator::default();
        let mut registration = SymbolRegistration::from_request(
            &request(RiskLevel::High, VerificationLevel::Enhanced),
            None,
        )
        .unwrap();
        let data = EligibilityData {
            requested_by: "admin".to_string(),
            notes: None,
        };

        let denied = validator.evaluate_eligibility(&registration, &data).await;
        assert!(!denied.approved);
        assert!(denied.reason().contains("regional approval"));

        registration
            .governance
            .regional_approvals
            .push("ZA".to_string());
        let approved = validator.evaluate_eligibility(&registration, &data).await;
        assert!(approved.approved);
    }

    #[tokio::test]
    async fn test_reserved_alias_prefix_denied() {
        let validator = RuleTableValidator::new(vec!["GOV".to_string()]);
        let mut request = request(RiskLevel::Low, VerificationLevel::None);
        request.alias = Some("gov-election".to_string());

        let decision = validator.evaluate_creation(&request).await;
        assert!(!decision.approved);
    }
}
