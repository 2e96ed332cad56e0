//! Static validation of a policy set before it is handed to the engine.
//!
//! Structural problems are errors; advisory gaps (missing version,
//! unreachable policy) are warnings. Validation never mutates or filters
//! the policy list.

use acp_types::Policy;
use std::collections::BTreeSet;

/// Outcome of static policy validation.
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Validate a policy set.
pub fn validate_policies(policies: &[Policy]) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen_ids: BTreeSet<&str> = BTreeSet::new();

    for (idx, policy) in policies.iter().enumerate() {
        let label = if policy.id.is_empty() {
            format!("policy at index {idx}")
        } else {
            format!("policy '{}'", policy.id)
        };

        if policy.id.is_empty() {
            report.error(format!("{label} is missing an id"));
        } else if !seen_ids.insert(policy.id.as_str()) {
            report.error(format!("duplicate policy id: {}", policy.id));
        }

        if policy.version.is_none() {
            report.warning(format!("{label} is missing a version"));
        }

        if policy.permission_names.is_empty() {
            report.error(format!("{label} allows no permissions"));
        }

        if policy.applicable_role_names.is_empty() {
            report.warning(format!(
                "{label} applies to no roles and can never be selected"
            ));
        }

        if policy.condition.minimum_approvals == 0 {
            report.error(format!(
                "{label} has minimum_approvals 0; the floor is 1"
            ));
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use acp_types::PolicyCondition;

    fn policy(id: &str) -> Policy {
        Policy {
            id: id.to_string(),
            name: format!("{id} policy"),
            description: String::new(),
            version: Some("1.0.0".to_string()),
            applicable_role_names: ["ROLE_A".to_string()].into_iter().collect(),
            permission_names: ["AUTHORIZE_EMERGENCY_LOCKDOWN".to_string()]
                .into_iter()
                .collect(),
            condition: PolicyCondition::default(),
        }
    }

    #[test]
    fn clean_policy_set_passes() {
        let report = validate_policies(&[policy("policy-001"), policy("policy-002")]);
        assert!(report.ok());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn duplicate_ids_are_errors() {
        let report = validate_policies(&[policy("policy-001"), policy("policy-001")]);
        assert!(!report.ok());
        assert!(report.errors[0].contains("duplicate"));
    }

    #[test]
    fn missing_id_and_zero_approvals_are_errors() {
        let mut bad = policy("");
        bad.condition.minimum_approvals = 0;
        let report = validate_policies(&[bad]);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn empty_permissions_is_an_error() {
        let mut bad = policy("policy-001");
        bad.permission_names.clear();
        let report = validate_policies(&[bad]);
        assert!(!report.ok());
    }

    #[test]
    fn missing_version_and_empty_roles_are_warnings() {
        let mut soft = policy("policy-001");
        soft.version = None;
        soft.applicable_role_names.clear();
        let report = validate_policies(&[soft]);
        assert!(report.ok());
        assert_eq!(report.warnings.len(), 2);
    }
}
