//! ACP Types - Core governance data model
//!
//! Immutable value types shared by every layer of the control plane.
//! Identity, credential, role, and policy inputs are pre-verified data;
//! nothing in this crate performs I/O or cryptographic validation.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of an identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Active,
    Suspended,
    Revoked,
}

/// Validity status of a credential claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Valid,
    Revoked,
    Expired,
}

/// Action verb attached to a permission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    View,
    Create,
    Update,
    Delete,
    Execute,
}

/// Domain a permission operates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionDomain {
    Identity,
    Assets,
    Configuration,
    Policies,
    System,
}

/// System state at decision time. Policies may condition on a specific
/// state; delegations may constrain the states they cover.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemState {
    Normal,
    ElevatedRisk,
    Crisis,
    Incapacitation,
    Succession,
}

impl SystemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemState::Normal => "NORMAL",
            SystemState::ElevatedRisk => "ELEVATED_RISK",
            SystemState::Crisis => "CRISIS",
            SystemState::Incapacitation => "INCAPACITATION",
            SystemState::Succession => "SUCCESSION",
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemState {
    type Err = UnknownSystemState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(SystemState::Normal),
            "ELEVATED_RISK" => Ok(SystemState::ElevatedRisk),
            "CRISIS" => Ok(SystemState::Crisis),
            "INCAPACITATION" => Ok(SystemState::Incapacitation),
            "SUCCESSION" => Ok(SystemState::Succession),
            other => Err(UnknownSystemState(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown system state: {0}")]
pub struct UnknownSystemState(pub String);

/// Smallest unit of authority: a single allowed action.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Permission {
    pub name: String,
    pub domain: PermissionDomain,
    pub action: PermissionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl PermissionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionAction::View => "view",
            PermissionAction::Create => "create",
            PermissionAction::Update => "update",
            PermissionAction::Delete => "delete",
            PermissionAction::Execute => "execute",
        }
    }
}

impl PermissionDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionDomain::Identity => "identity",
            PermissionDomain::Assets => "assets",
            PermissionDomain::Configuration => "configuration",
            PermissionDomain::Policies => "policies",
            PermissionDomain::System => "system",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.domain.as_str(),
            self.action.as_str(),
            self.name
        )
    }
}

/// A named bundle of responsibilities. Identities are assigned roles;
/// roles carry permissions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_credential_types: BTreeSet<String>,
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            required_credential_types: BTreeSet::new(),
            permissions: BTreeSet::new(),
        }
    }

    pub fn add_permission(&mut self, permission: Permission) {
        self.permissions.insert(permission);
    }

    pub fn has_permission(&self, permission_name: &str) -> bool {
        self.permissions.iter().any(|p| p.name == permission_name)
    }
}

/// A verifiable claim about an identity, issued by some authority.
/// Issuance and signature checking happen upstream; the core only
/// consults status and the validity window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub issuer_id: String,
    pub subject_id: String,
    pub claim_type: String,
    pub claim_value: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    pub status: CredentialStatus,
}

impl Credential {
    /// Validity check based on status and the optional time window.
    pub fn is_currently_valid(&self, at_time: DateTime<Utc>) -> bool {
        if self.status != CredentialStatus::Valid {
            return false;
        }
        if let Some(from) = self.valid_from {
            if at_time < from {
                return false;
            }
        }
        if let Some(until) = self.valid_until {
            if at_time > until {
                return false;
            }
        }
        true
    }
}

/// A person, entity, or system component recognized by the control plane.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    pub status: IdentityStatus,
    #[serde(default)]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub role_names: BTreeSet<String>,
}

impl Identity {
    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }

    pub fn add_credential(&mut self, credential: Credential) {
        self.credentials.push(credential);
    }

    pub fn assign_role(&mut self, role_name: impl Into<String>) {
        self.role_names.insert(role_name.into());
    }

    /// Claim types of every credential that is valid at `at_time`.
    pub fn valid_claim_types(&self, at_time: DateTime<Utc>) -> BTreeSet<String> {
        self.credentials
            .iter()
            .filter(|c| c.is_currently_valid(at_time))
            .map(|c| c.claim_type.clone())
            .collect()
    }

    pub fn has_valid_credential(&self, at_time: DateTime<Utc>) -> bool {
        self.credentials.iter().any(|c| c.is_currently_valid(at_time))
    }
}

fn default_minimum_approvals() -> u32 {
    1
}

/// Condition attached to a policy. `minimum_approvals` above one turns an
/// otherwise-allowed request into REQUIRE_ADDITIONAL_APPROVAL;
/// `requires_delegation` demands an applicable delegation grant before the
/// policy can allow anything.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_system_state: Option<SystemState>,
    #[serde(default = "default_minimum_approvals")]
    pub minimum_approvals: u32,
    #[serde(default)]
    pub requires_delegation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window_seconds: Option<u64>,
}

impl Default for PolicyCondition {
    fn default() -> Self {
        Self {
            required_system_state: None,
            minimum_approvals: 1,
            requires_delegation: false,
            time_window_seconds: None,
        }
    }
}

/// A rule that determines when a permission may be used.
///
/// Policies are immutable inputs to a single resolution call. The engine
/// considers them in caller-supplied order and selects the first match;
/// it never sorts or ranks them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub applicable_role_names: BTreeSet<String>,
    #[serde(default)]
    pub permission_names: BTreeSet<String>,
    #[serde(default)]
    pub condition: PolicyCondition,
}

impl Policy {
    pub fn applies_to_role(&self, role_name: &str) -> bool {
        self.applicable_role_names.contains(role_name)
    }

    pub fn allows_permission(&self, permission_name: &str) -> bool {
        self.permission_names.contains(permission_name)
    }
}

/// Outcome of one authority resolution call.
///
/// `Defer` is reserved for a future asynchronous adjudication path; every
/// current consumer treats it as fail-closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionOutcome {
    Allow,
    Deny,
    RequireAdditionalApproval,
    Defer,
}

impl DecisionOutcome {
    pub fn allows_execution(&self) -> bool {
        matches!(self, DecisionOutcome::Allow)
    }
}

impl fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionOutcome::Allow => "ALLOW",
            DecisionOutcome::Deny => "DENY",
            DecisionOutcome::RequireAdditionalApproval => "REQUIRE_ADDITIONAL_APPROVAL",
            DecisionOutcome::Defer => "DEFER",
        };
        f.write_str(s)
    }
}

/// Immutable record of one governance decision.
///
/// This is also the audit-ledger wire shape: optional fields are omitted
/// when absent so records written before correlation and delegation
/// support remain parseable by the same consumers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub identity_label: String,
    pub requested_permission_name: String,
    pub system_state: SystemState,
    pub decision: DecisionOutcome,
    pub policy_ids: Vec<String>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_identity_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_identity_labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_ids: Option<Vec<String>>,
}

impl Decision {
    /// Stamp a fresh correlation id, returning the updated record.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.decision_correlation_id = Some(correlation_id.into());
        self
    }
}

/// Behavior when a reader encounters a malformed persisted line.
///
/// Decision-path readers default to `SkipAndWarn`: a missing record can
/// only deny authority, never expand it. Integrity verification always
/// surfaces every anomaly regardless of this setting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnParseError {
    #[default]
    SkipAndWarn,
    Abort,
}

/// Convenience alias for roles keyed by name, as passed to the engine.
pub type RolesByName = BTreeMap<String, Role>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn credential(status: CredentialStatus) -> Credential {
        Credential {
            id: "cred-001".to_string(),
            issuer_id: "system".to_string(),
            subject_id: "id-owner-001".to_string(),
            claim_type: "ROLE_ASSERTION".to_string(),
            claim_value: "OWNER".to_string(),
            issued_at: t(0),
            valid_from: None,
            valid_until: None,
            status,
        }
    }

    #[test]
    fn credential_validity_honors_status_and_window() {
        let mut cred = credential(CredentialStatus::Valid);
        assert!(cred.is_currently_valid(t(100)));

        cred.valid_from = Some(t(200));
        assert!(!cred.is_currently_valid(t(100)));
        assert!(cred.is_currently_valid(t(300)));

        cred.valid_until = Some(t(400));
        assert!(!cred.is_currently_valid(t(500)));

        let revoked = credential(CredentialStatus::Revoked);
        assert!(!revoked.is_currently_valid(t(100)));
    }

    #[test]
    fn identity_active_and_claim_types() {
        let mut identity = Identity {
            id: "id-owner-001".to_string(),
            display_name: "Owner".to_string(),
            status: IdentityStatus::Active,
            credentials: vec![],
            role_names: BTreeSet::new(),
        };
        assert!(identity.is_active());
        assert!(!identity.has_valid_credential(t(0)));

        identity.add_credential(credential(CredentialStatus::Valid));
        identity.add_credential(credential(CredentialStatus::Expired));
        assert!(identity.has_valid_credential(t(0)));
        assert_eq!(identity.valid_claim_types(t(0)).len(), 1);

        identity.status = IdentityStatus::Suspended;
        assert!(!identity.is_active());
    }

    #[test]
    fn policy_role_and_permission_helpers() {
        let policy = Policy {
            id: "policy-001".to_string(),
            name: "Emergency Lockdown Policy".to_string(),
            description: String::new(),
            version: Some("1.0.0".to_string()),
            applicable_role_names: ["OWNER".to_string()].into_iter().collect(),
            permission_names: ["AUTHORIZE_EMERGENCY_LOCKDOWN".to_string()]
                .into_iter()
                .collect(),
            condition: PolicyCondition {
                required_system_state: Some(SystemState::Crisis),
                ..PolicyCondition::default()
            },
        };

        assert!(policy.applies_to_role("OWNER"));
        assert!(!policy.applies_to_role("GUARDIAN"));
        assert!(policy.allows_permission("AUTHORIZE_EMERGENCY_LOCKDOWN"));
        assert!(!policy.allows_permission("VIEW_ASSET_SUMMARY"));
    }

    #[test]
    fn decision_serde_skips_absent_optionals() {
        let decision = Decision {
            identity_label: "Owner".to_string(),
            requested_permission_name: "AUTHORIZE_EMERGENCY_LOCKDOWN".to_string(),
            system_state: SystemState::Crisis,
            decision: DecisionOutcome::Allow,
            policy_ids: vec!["policy-001".to_string()],
            reason: "owner authorized in crisis".to_string(),
            timestamp: t(1_700_000_000),
            policy_version_id: None,
            decision_correlation_id: None,
            delegate_identity_label: None,
            principal_identity_labels: None,
            delegation_ids: None,
        };

        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains("\"decision\":\"ALLOW\""));
        assert!(json.contains("\"system_state\":\"CRISIS\""));
        assert!(!json.contains("delegate_identity_label"));
        assert!(!json.contains("decision_correlation_id"));

        let back: Decision = serde_json::from_str(&json).unwrap();
        assert_eq!(back, decision);
    }

    #[test]
    fn system_state_round_trips_as_str() {
        for state in [
            SystemState::Normal,
            SystemState::ElevatedRisk,
            SystemState::Crisis,
            SystemState::Incapacitation,
            SystemState::Succession,
        ] {
            assert_eq!(state.as_str().parse::<SystemState>().unwrap(), state);
        }
        assert!("LOCKDOWN".parse::<SystemState>().is_err());
    }
}
