//! ACP Delegation - Read-only delegation registry and context resolver
//!
//! Loads delegation grants from an append-only JSONL registry and answers
//! one question for the decision and enforcement layers: is this actor
//! exercising authority on behalf of a principal, and under which grants?
//!
//! This crate never executes governed actions, never writes delegation
//! records, and never changes policies or system state.

#![deny(unsafe_code)]

use acp_types::{OnParseError, SystemState};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Scope of a delegation grant. Empty lists are unconstrained: a grant
/// with no `actions` covers every action, and likewise for states.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationScope {
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub system_states: Vec<String>,
}

/// A time-bounded, scope-bounded grant letting a delegate act for a
/// principal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDelegation")]
pub struct Delegation {
    pub delegation_id: String,
    pub principal_identity_label: String,
    pub delegate_identity_label: String,
    pub delegation_scope: DelegationScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    pub policy_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_timestamp: Option<DateTime<Utc>>,
    pub created_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_reason: Option<String>,
}

impl Delegation {
    /// A delegation is active iff it has not been revoked and `now` falls
    /// inside its validity window.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if let Some(revoked_at) = self.revoked_timestamp {
            if revoked_at <= now {
                return false;
            }
        }
        if let Some(from) = self.valid_from {
            if now < from {
                return false;
            }
        }
        if let Some(until) = self.valid_until {
            if now > until {
                return false;
            }
        }
        true
    }

    /// Whether this delegation, in principle, lets the delegate request
    /// `action` in `state` at `now`. Scope lists constrain only when
    /// non-empty.
    pub fn allows(&self, action: &str, state: SystemState, now: DateTime<Utc>) -> bool {
        if !self.is_active(now) {
            return false;
        }
        let scope = &self.delegation_scope;
        if !scope.actions.is_empty() && !scope.actions.iter().any(|a| a == action) {
            return false;
        }
        if !scope.system_states.is_empty()
            && !scope.system_states.iter().any(|s| s == state.as_str())
        {
            return false;
        }
        true
    }
}

/// Wire shape of a registry record. Timestamps are kept as strings at the
/// boundary so one unparseable date degrades to `None` instead of
/// invalidating the whole record.
#[derive(Debug, Default, Deserialize)]
struct RawDelegation {
    #[serde(default)]
    delegation_id: String,
    #[serde(default)]
    principal_identity_label: String,
    #[serde(default)]
    delegate_identity_label: String,
    #[serde(default)]
    delegation_scope: DelegationScope,
    #[serde(default)]
    valid_from: Option<String>,
    #[serde(default)]
    valid_until: Option<String>,
    #[serde(default)]
    policy_ids: Vec<String>,
    #[serde(default)]
    created_timestamp: Option<String>,
    #[serde(default)]
    created_reason: String,
    #[serde(default)]
    revoked_timestamp: Option<String>,
    #[serde(default)]
    revoked_reason: Option<String>,
}

impl From<RawDelegation> for Delegation {
    fn from(raw: RawDelegation) -> Self {
        Self {
            delegation_id: raw.delegation_id,
            principal_identity_label: raw.principal_identity_label,
            delegate_identity_label: raw.delegate_identity_label,
            delegation_scope: raw.delegation_scope,
            valid_from: raw.valid_from.as_deref().and_then(parse_timestamp),
            valid_until: raw.valid_until.as_deref().and_then(parse_timestamp),
            policy_ids: raw.policy_ids,
            created_timestamp: raw.created_timestamp.as_deref().and_then(parse_timestamp),
            created_reason: raw.created_reason,
            revoked_timestamp: raw.revoked_timestamp.as_deref().and_then(parse_timestamp),
            revoked_reason: raw.revoked_reason,
        }
    }
}

/// Tolerant ISO-8601 parse. Accepts `Z` and offset suffixes, plus naive
/// timestamps treated as UTC. Anything else is `None`.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

/// Delegation lookup errors.
#[derive(Debug, Error)]
pub enum DelegationError {
    #[error("failed to read delegation registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed delegation record at line {line}: {message}")]
    Malformed { line: usize, message: String },
}

/// Path-configured, read-only view over the JSONL delegation registry.
///
/// Every lookup re-reads the file: the registry is append-only and small,
/// and re-reading keeps the resolver free of cache invalidation concerns.
#[derive(Clone, Debug)]
pub struct DelegationRegistry {
    path: PathBuf,
    on_parse_error: OnParseError,
}

impl DelegationRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            on_parse_error: OnParseError::SkipAndWarn,
        }
    }

    pub fn with_parse_policy(path: impl Into<PathBuf>, on_parse_error: OnParseError) -> Self {
        Self {
            path: path.into(),
            on_parse_error,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every delegation record. A missing registry file means "no
    /// delegations", not an error.
    pub fn load(&self) -> Result<Vec<Delegation>, DelegationError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path).map_err(|source| DelegationError::Io {
            path: self.path.clone(),
            source,
        })?;

        let mut delegations = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Delegation>(trimmed) {
                Ok(delegation) => delegations.push(delegation),
                Err(err) => match self.on_parse_error {
                    OnParseError::SkipAndWarn => {
                        warn!(
                            path = %self.path.display(),
                            line = idx + 1,
                            error = %err,
                            "skipping malformed delegation record"
                        );
                    }
                    OnParseError::Abort => {
                        return Err(DelegationError::Malformed {
                            line: idx + 1,
                            message: err.to_string(),
                        });
                    }
                },
            }
        }

        Ok(delegations)
    }

    /// Every currently active delegation granted to `delegate_label` whose
    /// scope covers `action` and `state`. No ordering guarantee: callers
    /// must not rely on position for precedence.
    pub fn find_applicable(
        &self,
        delegate_label: &str,
        action: &str,
        state: SystemState,
        now: DateTime<Utc>,
    ) -> Result<Vec<Delegation>, DelegationError> {
        let delegations = self.load()?;
        Ok(delegations
            .into_iter()
            .filter(|d| d.delegate_identity_label == delegate_label)
            .filter(|d| d.allows(action, state, now))
            .collect())
    }

    /// All currently active delegations, regardless of scope.
    pub fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Delegation>, DelegationError> {
        let delegations = self.load()?;
        Ok(delegations.into_iter().filter(|d| d.is_active(now)).collect())
    }
}

/// Resolved delegation context for a single decision evaluation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DelegationContext {
    /// The identity that initiated the request.
    pub identity_label: String,
    /// True if at least one active delegation applies to this identity,
    /// action, and state at the decision time.
    pub is_delegated: bool,
    /// Distinct principals authority is derived from, sorted. Empty when
    /// not delegated.
    pub principal_identity_labels: Vec<String>,
    /// The grants that matched. Attribution only; the decision predicate
    /// never reads past `is_delegated` and the principal set.
    pub applicable_delegations: Vec<Delegation>,
    /// The timestamp delegation validity was evaluated at.
    pub decision_time: DateTime<Utc>,
}

impl DelegationContext {
    /// Context for an actor with no delegation in effect.
    pub fn not_delegated(identity_label: impl Into<String>, decision_time: DateTime<Utc>) -> Self {
        Self {
            identity_label: identity_label.into(),
            is_delegated: false,
            principal_identity_labels: Vec::new(),
            applicable_delegations: Vec::new(),
            decision_time,
        }
    }

    pub fn delegation_ids(&self) -> Vec<String> {
        self.applicable_delegations
            .iter()
            .map(|d| d.delegation_id.clone())
            .collect()
    }
}

/// Resolves delegation context ahead of authority evaluation.
#[derive(Clone, Debug)]
pub struct DelegationResolver {
    registry: DelegationRegistry,
}

impl DelegationResolver {
    pub fn new(registry: DelegationRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DelegationRegistry {
        &self.registry
    }

    /// Resolve delegation context for a decision. Read-only and
    /// side-effect free.
    ///
    /// `decision_timestamp` tolerates absent or unparseable input by
    /// falling back to now: the fallback only changes which grants are
    /// checked for validity, never whether authority is expanded.
    pub fn resolve_context(
        &self,
        identity_label: &str,
        requested_action: &str,
        system_state: SystemState,
        decision_timestamp: Option<&str>,
    ) -> Result<DelegationContext, DelegationError> {
        let decision_time = resolve_decision_time(decision_timestamp);

        let applicable = self.registry.find_applicable(
            identity_label,
            requested_action,
            system_state,
            decision_time,
        )?;

        let mut principals: Vec<String> = applicable
            .iter()
            .filter(|d| !d.principal_identity_label.is_empty())
            .map(|d| d.principal_identity_label.clone())
            .collect();
        principals.sort();
        principals.dedup();

        Ok(DelegationContext {
            identity_label: identity_label.to_string(),
            is_delegated: !applicable.is_empty(),
            principal_identity_labels: principals,
            applicable_delegations: applicable,
            decision_time,
        })
    }
}

fn resolve_decision_time(decision_timestamp: Option<&str>) -> DateTime<Utc> {
    match decision_timestamp {
        None => Utc::now(),
        Some(raw) => match parse_timestamp(raw) {
            Some(parsed) => parsed,
            None => {
                warn!(
                    timestamp = raw,
                    "unparseable decision timestamp, falling back to now"
                );
                Utc::now()
            }
        },
    }
}
