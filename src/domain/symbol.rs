use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RegistryError, Result};

/// Fixed grammar tag for tradable trend symbols
pub const SYMBOL_TAG: &str = "V";
/// Length of the topic-id fragment embedded in the symbol string
pub const TOPIC_FRAGMENT_LEN: usize = 8;

/// Parsed form of a `V:<REGION>:<CAT>:<TOPIC8>` symbol string.
///
/// Symbol strings are immutable once minted; this type only formats and
/// validates, it never rewrites an existing registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VtsSymbol {
    pub region: String,
    pub category: String,
    pub topic_fragment: String,
}

impl VtsSymbol {
    /// Mint a symbol for a topic from its region/category codes
    pub fn mint(region: &str, category: &str, topic_id: Uuid) -> Result<Self> {
        let fragment: String = topic_id
            .simple()
            .to_string()
            .chars()
            .take(TOPIC_FRAGMENT_LEN)
            .collect::<String>()
            .to_uppercase();
        let symbol = Self {
            region: region.to_uppercase(),
            category: category.to_uppercase(),
            topic_fragment: fragment,
        };
        symbol.validate()?;
        Ok(symbol)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != 4 || parts[0] != SYMBOL_TAG {
            return Err(RegistryError::InvalidSymbol(format!(
                "expected {SYMBOL_TAG}:<REGION>:<CAT>:<TOPIC{TOPIC_FRAGMENT_LEN}>, got {raw}"
            )));
        }
        let symbol = Self {
            region: parts[1].to_string(),
            category: parts[2].to_string(),
            topic_fragment: parts[3].to_string(),
        };
        symbol.validate()?;
        Ok(symbol)
    }

    fn validate(&self) -> Result<()> {
        let code_ok = |s: &str, min: usize, max: usize| {
            s.len() >= min && s.len() <= max && s.chars().all(|c| c.is_ascii_alphanumeric())
        };
        if !code_ok(&self.region, 2, 2) {
            return Err(RegistryError::InvalidSymbol(format!(
                "region code must be 2 alphanumeric chars: {}",
                self.region
            )));
        }
        if !code_ok(&self.category, 2, 4) {
            return Err(RegistryError::InvalidSymbol(format!(
                "category code must be 2-4 alphanumeric chars: {}",
                self.category
            )));
        }
        if self.topic_fragment.len() != TOPIC_FRAGMENT_LEN
            || !self
                .topic_fragment
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(RegistryError::InvalidSymbol(format!(
                "topic fragment must be {TOPIC_FRAGMENT_LEN} alphanumeric chars: {}",
                self.topic_fragment
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for VtsSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{SYMBOL_TAG}:{}:{}:{}",
            self.region, self.category, self.topic_fragment
        )
    }
}

/// Symbol lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SymbolStatus {
    Draft,
    PendingVerification,
    Verified,
    MarketEligible,
    Active,
    Restricted,
    Suspended,
    Expired,
    Archived,
    Deprecated,
}

impl SymbolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolStatus::Draft => "DRAFT",
            SymbolStatus::PendingVerification => "PENDING_VERIFICATION",
            SymbolStatus::Verified => "VERIFIED",
            SymbolStatus::MarketEligible => "MARKET_ELIGIBLE",
            SymbolStatus::Active => "ACTIVE",
            SymbolStatus::Restricted => "RESTRICTED",
            SymbolStatus::Suspended => "SUSPENDED",
            SymbolStatus::Expired => "EXPIRED",
            SymbolStatus::Archived => "ARCHIVED",
            SymbolStatus::Deprecated => "DEPRECATED",
        }
    }

    /// States from which governance may restrict or suspend a symbol
    pub fn is_active_ish(&self) -> bool {
        matches!(
            self,
            SymbolStatus::Verified | SymbolStatus::MarketEligible | SymbolStatus::Active
        )
    }

    /// A live registration blocks re-registration of the same symbol string
    pub fn is_live(&self) -> bool {
        !matches!(self, SymbolStatus::Archived)
    }
}

impl std::fmt::Display for SymbolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SymbolStatus {
    type Error = String;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value {
            "DRAFT" => Ok(SymbolStatus::Draft),
            "PENDING_VERIFICATION" => Ok(SymbolStatus::PendingVerification),
            "VERIFIED" => Ok(SymbolStatus::Verified),
            "MARKET_ELIGIBLE" => Ok(SymbolStatus::MarketEligible),
            "ACTIVE" => Ok(SymbolStatus::Active),
            "RESTRICTED" => Ok(SymbolStatus::Restricted),
            "SUSPENDED" => Ok(SymbolStatus::Suspended),
            "EXPIRED" => Ok(SymbolStatus::Expired),
            "ARCHIVED" => Ok(SymbolStatus::Archived),
            "DEPRECATED" => Ok(SymbolStatus::Deprecated),
            other => Err(format!("unknown symbol status: {other}")),
        }
    }
}

/// Verification depth required before a symbol may trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationLevel {
    None,
    Basic,
    Enhanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Severe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipBlock {
    pub created_by: String,
    pub region: String,
    pub owner_verified: bool,
    #[serde(default)]
    pub co_stewards: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleBlock {
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub market_eligible_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub reactivation_count: u32,
    /// Optimistic-concurrency version, bumped on every store update
    pub version: i64,
    /// Set only by merge conflict resolution
    pub parent_symbol: Option<String>,
    #[serde(default)]
    pub child_symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceBlock {
    pub trading_eligible: bool,
    pub risk_level: RiskLevel,
    pub required_verification: VerificationLevel,
    #[serde(default)]
    pub regional_approvals: Vec<String>,
    #[serde(default)]
    pub compliance_checks: Vec<String>,
    #[serde(default)]
    pub restriction_flags: Vec<String>,
}

/// One append-only audit log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub detail: serde_json::Value,
}

impl AuditEntry {
    pub fn new(actor: &str, action: &str, detail: serde_json::Value) -> Self {
        Self {
            at: Utc::now(),
            actor: actor.to_string(),
            action: action.to_string(),
            detail,
        }
    }
}

/// Registration request for a new tradable symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRequest {
    pub topic_id: Uuid,
    pub region: String,
    pub category: String,
    pub alias: Option<String>,
    pub created_by: String,
    pub required_verification: VerificationLevel,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Lifecycle record for a tradable symbol minted from a topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRegistration {
    pub id: Uuid,
    pub topic_id: Uuid,
    /// Canonical symbol string, immutable once minted
    pub symbol: String,
    pub alias: Option<String>,
    pub status: SymbolStatus,
    pub ownership: OwnershipBlock,
    pub lifecycle: LifecycleBlock,
    pub governance: GovernanceBlock,
    pub audit_log: Vec<AuditEntry>,
}

impl SymbolRegistration {
    pub fn from_request(request: &SymbolRequest, expiration: Option<DateTime<Utc>>) -> Result<Self> {
        let vts = VtsSymbol::mint(&request.region, &request.category, request.topic_id)?;
        let status = match request.required_verification {
            VerificationLevel::None => SymbolStatus::Draft,
            _ => SymbolStatus::PendingVerification,
        };
        Ok(Self {
            id: Uuid::new_v4(),
            topic_id: request.topic_id,
            symbol: vts.to_string(),
            alias: request.alias.clone(),
            status,
            ownership: OwnershipBlock {
                created_by: request.created_by.clone(),
                region: vts.region.clone(),
                owner_verified: false,
                co_stewards: Vec::new(),
            },
            lifecycle: LifecycleBlock {
                created_at: Utc::now(),
                verified_at: None,
                market_eligible_at: None,
                archived_at: None,
                expiration_date: expiration,
                reactivation_count: 0,
                version: 1,
                parent_symbol: None,
                child_symbols: Vec::new(),
            },
            governance: GovernanceBlock {
                trading_eligible: false,
                risk_level: request.risk_level,
                required_verification: request.required_verification,
                regional_approvals: Vec::new(),
                compliance_checks: Vec::new(),
                restriction_flags: Vec::new(),
            },
            audit_log: Vec::new(),
        })
    }

    /// Append one audit line. The log is append-only; nothing else touches it.
    pub fn audit(&mut self, actor: &str, action: &str, detail: serde_json::Value) {
        self.audit_log.push(AuditEntry::new(actor, action, detail));
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.lifecycle
            .expiration_date
            .map(|exp| exp < now)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_mint_and_parse_roundtrip() {
        let topic_id = Uuid::new_v4();
        let vts = VtsSymbol::mint("za", "ent", topic_id).unwrap();
        let raw = vts.to_string();

        assert!(raw.starts_with("V:ZA:ENT:"));
        assert_eq!(VtsSymbol::parse(&raw).unwrap(), vts);
    }

    #[test]
    fn test_symbol_parse_rejects_bad_grammar() {
        assert!(VtsSymbol::parse("ZA:ENT:ABCDEFGH").is_err());
        assert!(VtsSymbol::parse("V:ZAF:ENT:ABCDEFGH").is_err());
        assert!(VtsSymbol::parse("V:ZA:ENT:SHORT").is_err());
        assert!(VtsSymbol::parse("V:ZA:E!T:ABCDEFGH").is_err());
    }

    #[test]
    fn test_registration_initial_status_follows_verification_level() {
        let mut request = SymbolRequest {
            topic_id: Uuid::new_v4(),
            region: "ZA".to_string(),
            category: "ENT".to_string(),
            alias: None,
            created_by: "admin".to_string(),
            required_verification: VerificationLevel::None,
            risk_level: RiskLevel::Low,
            metadata: serde_json::Value::Null,
        };
        let draft = SymbolRegistration::from_request(&request, None).unwrap();
        assert_eq!(draft.status, SymbolStatus::Draft);

        request.required_verification = VerificationLevel::Basic;
        let pending = SymbolRegistration::from_request(&request, None).unwrap();
        assert_eq!(pending.status, SymbolStatus::PendingVerification);
    }

    #[test]
    fn test_expiry_check() {
        let request = SymbolRequest {
            topic_id: Uuid::new_v4(),
            region: "ZA".to_string(),
            category: "ENT".to_string(),
            alias: None,
            created_by: "admin".to_string(),
            required_verification: VerificationLevel::None,
            risk_level: RiskLevel::Low,
            metadata: serde_json::Value::Null,
        };
        let now = Utc::now();

        let expired =
            SymbolRegistration::from_request(&request, Some(now - chrono::Duration::days(1)))
                .unwrap();
        assert!(expired.is_expired_at(now));

        let unexpired = SymbolRegistration::from_request(&request, None).unwrap();
        assert!(!unexpired.is_expired_at(now));
    }
}
