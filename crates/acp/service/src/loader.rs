//! Policy and scenario configuration loaders.
//!
//! Governance rules and demo scenarios live in JSON documents so they
//! can be audited and changed without touching code. Loaders are
//! boundary-layer: a missing file is an explicit error value here, never
//! a panic, and never tolerated silently the way ledger readers tolerate
//! malformed lines.

use acp_enforcement::EnforcementAction;
use acp_types::{Identity, Policy, Role, SystemState};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

fn read_config(path: &Path) -> Result<String, LoaderError> {
    if !path.exists() {
        return Err(LoaderError::NotFound(path.to_path_buf()));
    }
    fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load governance policies from a JSON document. Accepts either a bare
/// array of policies or an object with a `policies` list.
pub fn load_policies(path: &Path) -> Result<Vec<Policy>, LoaderError> {
    let contents = read_config(path)?;
    let raw: Value = serde_json::from_str(&contents).map_err(|err| LoaderError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    let list = match &raw {
        Value::Array(_) => raw.clone(),
        Value::Object(obj) => obj.get("policies").cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    };

    serde_json::from_value(list).map_err(|err| LoaderError::Parse {
        path: path.to_path_buf(),
        message: format!(
            "expected a list of policy objects or an object with a 'policies' list: {err}"
        ),
    })
}

/// One end-to-end request tuple: who asks for what, under which roles
/// and policies, with optional enforcement actions to run on ALLOW.
#[derive(Clone, Debug, Deserialize)]
pub struct Scenario {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub identity: Identity,
    pub roles: Vec<Role>,
    pub policies: Vec<Policy>,
    pub requested_permission: String,
    pub system_state: SystemState,
    #[serde(default)]
    pub actions: Vec<EnforcementAction>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
struct ScenarioDocument {
    scenarios: Vec<Scenario>,
}

/// Load scenarios keyed by id.
pub fn load_scenarios(path: &Path) -> Result<BTreeMap<String, Scenario>, LoaderError> {
    let contents = read_config(path)?;
    let document: ScenarioDocument =
        serde_json::from_str(&contents).map_err(|err| LoaderError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

    Ok(document
        .scenarios
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const POLICY_DOC: &str = r#"{
        "policies": [
            {
                "id": "policy-001",
                "name": "Emergency Lockdown Policy",
                "version": "1.0.0",
                "applicable_role_names": ["ROLE_A"],
                "permission_names": ["AUTHORIZE_EMERGENCY_LOCKDOWN"],
                "condition": {
                    "required_system_state": "CRISIS",
                    "minimum_approvals": 1
                }
            }
        ]
    }"#;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn loads_policies_from_wrapped_document() {
        let file = write_file(POLICY_DOC);
        let policies = load_policies(file.path()).unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].id, "policy-001");
        assert_eq!(
            policies[0].condition.required_system_state,
            Some(SystemState::Crisis)
        );
    }

    #[test]
    fn loads_policies_from_bare_array() {
        let file = write_file(
            r#"[{"id": "policy-002", "name": "p2", "permission_names": ["X"], "applicable_role_names": []}]"#,
        );
        let policies = load_policies(file.path()).unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].condition.minimum_approvals, 1);
    }

    #[test]
    fn missing_file_is_an_explicit_error() {
        let err = load_policies(Path::new("/nonexistent/policies.json")).unwrap_err();
        assert!(matches!(err, LoaderError::NotFound(_)));
    }

    #[test]
    fn unsupported_shape_is_a_parse_error() {
        let file = write_file(r#""just a string""#);
        let err = load_policies(file.path()).unwrap_err();
        assert!(matches!(err, LoaderError::Parse { .. }));
    }

    #[test]
    fn loads_scenarios_keyed_by_id() {
        let file = write_file(
            r#"{
            "scenarios": [{
                "id": "owner-crisis",
                "description": "owner authorizes lockdown in crisis",
                "identity": {
                    "id": "id-owner-001",
                    "display_name": "Owner",
                    "status": "active",
                    "credentials": [{
                        "id": "cred-001",
                        "issuer_id": "system",
                        "subject_id": "id-owner-001",
                        "claim_type": "ROLE_A",
                        "claim_value": "ROLE_A",
                        "issued_at": "2026-01-01T00:00:00Z",
                        "status": "valid"
                    }],
                    "role_names": ["ROLE_A"]
                },
                "roles": [{
                    "name": "ROLE_A",
                    "required_credential_types": ["ROLE_A"],
                    "permissions": [{
                        "name": "AUTHORIZE_EMERGENCY_LOCKDOWN",
                        "domain": "system",
                        "action": "execute"
                    }]
                }],
                "policies": [{
                    "id": "policy-001",
                    "name": "Emergency Lockdown Policy",
                    "applicable_role_names": ["ROLE_A"],
                    "permission_names": ["AUTHORIZE_EMERGENCY_LOCKDOWN"],
                    "condition": {"required_system_state": "CRISIS"}
                }],
                "requested_permission": "AUTHORIZE_EMERGENCY_LOCKDOWN",
                "system_state": "CRISIS",
                "actions": [{
                    "action_type": "lockdown_state",
                    "target": "system",
                    "parameters": {"operation": "SET"}
                }]
            }]
        }"#,
        );

        let scenarios = load_scenarios(file.path()).unwrap();
        let scenario = scenarios.get("owner-crisis").unwrap();
        assert_eq!(scenario.identity.display_name, "Owner");
        assert_eq!(scenario.system_state, SystemState::Crisis);
        assert_eq!(scenario.actions.len(), 1);
        assert!(!scenario.dry_run);
    }
}
