//! Delegation-aware enforcement gate.
//!
//! Maps a decision outcome to an enforcement disposition and, for ALLOW,
//! performs a second, independent delegation check at enforcement time.
//! The duplication with the decision layer is intentional: enforcement
//! must not trust that upstream delegation logic was applied correctly.

use crate::EnforcementError;
use acp_delegation::DelegationRegistry;
use acp_types::{Decision, DecisionOutcome};
use chrono::{DateTime, Utc};
use tracing::debug;

/// What the gate decided to do with an enforcement attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDisposition {
    /// Proceed to the dispatcher.
    Execute { reason: String },
    /// Refuse; no effector is invoked.
    Blocked { reason: String },
    /// Hold pending additional approval; no effector is invoked.
    Paused { reason: String },
}

impl GateDisposition {
    pub fn reason(&self) -> &str {
        match self {
            GateDisposition::Execute { reason }
            | GateDisposition::Blocked { reason }
            | GateDisposition::Paused { reason } => reason,
        }
    }

    pub fn may_execute(&self) -> bool {
        matches!(self, GateDisposition::Execute { .. })
    }
}

/// Enforcement-time authority gate.
///
/// Identities listed as primary authorities execute ALLOW decisions
/// directly; everyone else needs a currently valid, in-scope delegation
/// grant for the decision's (identity, action, state).
pub struct DelegationGate {
    registry: DelegationRegistry,
    primary_authorities: Vec<String>,
}

impl DelegationGate {
    pub fn new(registry: DelegationRegistry, primary_authorities: Vec<String>) -> Self {
        Self {
            registry,
            primary_authorities,
        }
    }

    /// Evaluate a decision at enforcement time.
    ///
    /// A decision without a correlation id is a hard precondition
    /// violation: it is rejected before any effector is touched, because
    /// an uncorrelatable enforcement event cannot be audited.
    pub fn evaluate(
        &self,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Result<GateDisposition, EnforcementError> {
        match decision.decision_correlation_id.as_deref() {
            Some(id) if !id.is_empty() => {}
            _ => return Err(EnforcementError::MissingCorrelationId),
        }

        let disposition = match decision.decision {
            DecisionOutcome::Deny => GateDisposition::Blocked {
                reason: "action blocked by governance decision".to_string(),
            },
            DecisionOutcome::RequireAdditionalApproval => GateDisposition::Paused {
                reason: "action paused pending additional policy-defined approval".to_string(),
            },
            DecisionOutcome::Defer => GateDisposition::Blocked {
                reason: "deferred decisions are fail-closed at enforcement".to_string(),
            },
            DecisionOutcome::Allow => self.evaluate_allow(decision, now)?,
        };

        debug!(
            identity = %decision.identity_label,
            action = %decision.requested_permission_name,
            reason = %disposition.reason(),
            "enforcement gate evaluated"
        );
        Ok(disposition)
    }

    fn evaluate_allow(
        &self,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Result<GateDisposition, EnforcementError> {
        let identity = &decision.identity_label;
        let action = &decision.requested_permission_name;

        if self.primary_authorities.iter().any(|p| p == identity) {
            return Ok(GateDisposition::Execute {
                reason: "action executed under primary authority with explicit governance \
                         authorization"
                    .to_string(),
            });
        }

        let grants =
            self.registry
                .find_applicable(identity, action, decision.system_state, now)?;

        if grants.is_empty() {
            // The upstream decision said ALLOW, but enforcement refuses
            // without standing authority of its own record.
            return Ok(GateDisposition::Blocked {
                reason: format!(
                    "no valid, in-scope delegation grant for identity '{identity}' and action \
                     '{action}'"
                ),
            });
        }

        Ok(GateDisposition::Execute {
            reason: "action executed under valid, in-scope delegation grant with explicit \
                     governance authorization"
                .to_string(),
        })
    }
}
