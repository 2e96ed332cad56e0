//! ACP Authority - Fail-closed authority resolution engine
//!
//! Turns (identity, requested permission, system state, delegation
//! context) into an immutable [`Decision`]. Evaluation is a strict
//! ordered pipeline; the first failing step short-circuits to DENY.
//! Unknown identities, permissions, or states are normal denials with a
//! reason, never errors.
//!
//! Delegation is layered on top of the pipeline, not inside it: a
//! delegation can satisfy a policy's standing requirement to act, but it
//! can never raise permissiveness past what the delegate's own roles and
//! policies grant, and it never removes an approval requirement.

#![deny(unsafe_code)]

use acp_delegation::DelegationContext;
use acp_types::{Decision, DecisionOutcome, Identity, Policy, RolesByName, SystemState};
use std::collections::BTreeSet;
use tracing::debug;

/// The authority resolution engine. Pure computation: no locks, no I/O,
/// safe to run fully in parallel across unrelated requests.
#[derive(Clone, Debug, Default)]
pub struct AuthorityEngine;

impl AuthorityEngine {
    pub fn new() -> Self {
        Self
    }

    /// Resolve one governance decision.
    ///
    /// Policies are considered in caller-supplied order and the first
    /// match wins. This ordering dependency is a documented contract:
    /// re-ranking policies here would change outcomes for ambiguous
    /// configurations.
    pub fn resolve(
        &self,
        identity: &Identity,
        requested_permission: &str,
        system_state: SystemState,
        roles_by_name: &RolesByName,
        policies: &[Policy],
        delegation: &DelegationContext,
    ) -> Decision {
        let at_time = delegation.decision_time;
        let label = identity.display_name.clone();

        // 1. Identity must be active.
        if !identity.is_active() {
            return self.deny(
                &label,
                requested_permission,
                system_state,
                delegation,
                vec![],
                None,
                format!("identity '{label}' is not active"),
            );
        }

        // 2. At least one currently valid credential.
        if !identity.has_valid_credential(at_time) {
            return self.deny(
                &label,
                requested_permission,
                system_state,
                delegation,
                vec![],
                None,
                format!("identity '{label}' holds no currently valid credential"),
            );
        }

        // 3. Keep roles whose credential requirements are satisfied.
        let valid_claims = identity.valid_claim_types(at_time);
        let satisfied_roles: Vec<&str> = identity
            .role_names
            .iter()
            .filter_map(|name| roles_by_name.get(name))
            .filter(|role| role.required_credential_types.is_subset(&valid_claims))
            .map(|role| role.name.as_str())
            .collect();

        if satisfied_roles.is_empty() {
            return self.deny(
                &label,
                requested_permission,
                system_state,
                delegation,
                vec![],
                None,
                "no assigned role has its credential requirements satisfied".to_string(),
            );
        }

        // 4. Keep roles that grant the requested permission.
        let granting_roles: BTreeSet<&str> = satisfied_roles
            .iter()
            .copied()
            .filter(|name| {
                roles_by_name
                    .get(*name)
                    .map(|role| role.has_permission(requested_permission))
                    .unwrap_or(false)
            })
            .collect();

        if granting_roles.is_empty() {
            return self.deny(
                &label,
                requested_permission,
                system_state,
                delegation,
                vec![],
                None,
                format!("no assigned role grants permission '{requested_permission}'"),
            );
        }

        // 5-6. First applicable policy in caller order, state-filtered.
        for policy in policies {
            let applies = granting_roles.iter().any(|r| policy.applies_to_role(r))
                && policy.allows_permission(requested_permission);
            if !applies {
                continue;
            }
            if let Some(required_state) = policy.condition.required_system_state {
                if required_state != system_state {
                    continue;
                }
            }

            // Delegation-conditioned policy with no applicable grant:
            // fail closed, never silently skip the check.
            if policy.condition.requires_delegation && !delegation.is_delegated {
                return self.deny(
                    &label,
                    requested_permission,
                    system_state,
                    delegation,
                    vec![policy.id.clone()],
                    policy.version.clone(),
                    format!(
                        "policy '{}' requires an active delegation for '{label}' and none applies",
                        policy.id
                    ),
                );
            }

            // Delegation never removes an approval requirement.
            if policy.condition.minimum_approvals > 1 {
                return self.finish(
                    &label,
                    requested_permission,
                    system_state,
                    delegation,
                    DecisionOutcome::RequireAdditionalApproval,
                    vec![policy.id.clone()],
                    policy.version.clone(),
                    format!(
                        "policy '{}' requires {} approvals before execution",
                        policy.id, policy.condition.minimum_approvals
                    ),
                );
            }

            return self.finish(
                &label,
                requested_permission,
                system_state,
                delegation,
                DecisionOutcome::Allow,
                vec![policy.id.clone()],
                policy.version.clone(),
                format!(
                    "policy '{}' permits '{requested_permission}' in {system_state} state",
                    policy.id
                ),
            );
        }

        // 7. No policy survived.
        self.deny(
            &label,
            requested_permission,
            system_state,
            delegation,
            vec![],
            None,
            "no matching policy for current state".to_string(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn deny(
        &self,
        identity_label: &str,
        requested_permission: &str,
        system_state: SystemState,
        delegation: &DelegationContext,
        policy_ids: Vec<String>,
        policy_version_id: Option<String>,
        reason: String,
    ) -> Decision {
        self.finish(
            identity_label,
            requested_permission,
            system_state,
            delegation,
            DecisionOutcome::Deny,
            policy_ids,
            policy_version_id,
            reason,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        identity_label: &str,
        requested_permission: &str,
        system_state: SystemState,
        delegation: &DelegationContext,
        outcome: DecisionOutcome,
        policy_ids: Vec<String>,
        policy_version_id: Option<String>,
        reason: String,
    ) -> Decision {
        // Attribution fields exist purely for audit traceability; they
        // never feed back into the decision predicate.
        let (delegate, principals, delegation_ids) = if delegation.is_delegated {
            (
                Some(identity_label.to_string()),
                Some(delegation.principal_identity_labels.clone()),
                Some(delegation.delegation_ids()),
            )
        } else {
            (None, None, None)
        };

        debug!(
            identity = identity_label,
            permission = requested_permission,
            state = %system_state,
            outcome = %outcome,
            "authority decision resolved"
        );

        Decision {
            identity_label: identity_label.to_string(),
            requested_permission_name: requested_permission.to_string(),
            system_state,
            decision: outcome,
            policy_ids,
            reason,
            timestamp: delegation.decision_time,
            policy_version_id,
            decision_correlation_id: None,
            delegate_identity_label: delegate,
            principal_identity_labels: principals,
            delegation_ids,
        }
    }
}
