//! Local, file-backed lockdown state effector.
//!
//! `action_type = "lockdown_state"`. Supported operations, read from
//! `parameters.operation`: `SET`, `CLEAR`, `TOGGLE`. Optional parameters
//! `reason` and `requested_by` are recorded in the state file. Honors
//! dry-run: no file mutation, only a report of what would change.
//!
//! This effector never writes to audit or enforcement ledgers; it only
//! returns structured details for the ledger layer to persist.

use crate::dispatcher::{
    Effector, EffectorError, EffectorResult, EnforcementAction, EnforcementContext,
    EnforcementOutcome,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted lockdown state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LockdownState {
    pub locked: bool,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub requested_by: String,
}

impl LockdownState {
    pub fn unlocked(now: DateTime<Utc>) -> Self {
        Self {
            locked: false,
            updated_at: now,
            reason: String::new(),
            requested_by: String::new(),
        }
    }

    /// Read state from disk. A missing file is the default unlocked
    /// state; an unreadable file recovers to unlocked with the problem
    /// surfaced in `reason` rather than silently ignored.
    pub fn from_file(path: &Path, now: DateTime<Utc>) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return Self::unlocked(now),
        };
        match serde_json::from_str(&contents) {
            Ok(state) => state,
            Err(_) => {
                let mut state = Self::unlocked(now);
                state.reason = "recovered from invalid lockdown state file".to_string();
                state
            }
        }
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), EffectorError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Effector for `action_type = "lockdown_state"`. The state file path is
/// injected explicitly; there is no default location.
pub struct LockdownStateEffector {
    state_path: PathBuf,
}

impl LockdownStateEffector {
    pub const ACTION_TYPE: &'static str = "lockdown_state";

    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }
}

impl Effector for LockdownStateEffector {
    fn action_type(&self) -> &str {
        Self::ACTION_TYPE
    }

    fn execute(
        &self,
        action: &EnforcementAction,
        _context: &EnforcementContext,
        dry_run: bool,
    ) -> Result<EffectorResult, EffectorError> {
        let operation = action
            .parameters
            .get("operation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_uppercase();

        if !matches!(operation.as_str(), "SET" | "CLEAR" | "TOGGLE") {
            return Ok(EffectorResult {
                outcome: EnforcementOutcome::NotApplicable,
                action: action.clone(),
                details: json!({
                    "reason": "unsupported or missing operation",
                    "supported_operations": ["SET", "CLEAR", "TOGGLE"],
                    "provided_operation": if operation.is_empty() { Value::Null } else { json!(operation) },
                }),
            });
        }

        let now = Utc::now();
        let current = LockdownState::from_file(&self.state_path, now);

        let new_locked = match operation.as_str() {
            "SET" => true,
            "CLEAR" => false,
            _ => !current.locked,
        };

        if new_locked == current.locked {
            return Ok(EffectorResult {
                outcome: EnforcementOutcome::Noop,
                action: action.clone(),
                details: json!({
                    "operation": operation,
                    "previous_state": current.to_value(),
                    "new_state": current.to_value(),
                    "dry_run": dry_run,
                    "note": "lockdown state unchanged",
                }),
            });
        }

        let updated = LockdownState {
            locked: new_locked,
            updated_at: now,
            reason: action
                .parameters
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or(&current.reason)
                .to_string(),
            requested_by: action
                .parameters
                .get("requested_by")
                .and_then(Value::as_str)
                .unwrap_or(&current.requested_by)
                .to_string(),
        };

        if !dry_run {
            if let Err(err) = updated.write_to_file(&self.state_path) {
                return Ok(EffectorResult {
                    outcome: EnforcementOutcome::Failed,
                    action: action.clone(),
                    details: json!({
                        "reason": "failed to write updated lockdown state",
                        "operation": operation,
                        "previous_state": current.to_value(),
                        "intended_new_state": updated.to_value(),
                        "error_message": err.to_string(),
                    }),
                });
            }
        }

        Ok(EffectorResult {
            outcome: EnforcementOutcome::Success,
            action: action.clone(),
            details: json!({
                "operation": operation,
                "previous_state": current.to_value(),
                "new_state": updated.to_value(),
                "dry_run": dry_run,
            }),
        })
    }
}
