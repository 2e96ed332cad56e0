//! Read-only replay over verified ledgers: per-entry integrity
//! annotation and correlation of decisions with enforcement events.
//!
//! Nothing here re-evaluates decisions, performs enforcement, or mutates
//! logs.

use crate::chain::compute_entry_hash;
use crate::ledger::load_entries;
use crate::{LedgerError, ENTRY_HASH_FIELD, PREV_HASH_FIELD};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Integrity status of one ledger entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrityStatus {
    /// Entry predates hash chaining; not verifiable, not part of the chain.
    Legacy,
    Ok,
    Failed,
}

impl IntegrityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrityStatus::Legacy => "LEGACY",
            IntegrityStatus::Ok => "OK",
            IntegrityStatus::Failed => "FAILED",
        }
    }
}

/// A ledger entry annotated with its position and integrity result.
#[derive(Clone, Debug, Serialize)]
pub struct AnnotatedEntry {
    pub record: Value,
    pub raw: String,
    pub index: usize,
    pub status: IntegrityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Annotate every entry with its chain status.
///
/// The chain is defined only over hashed entries: legacy entries neither
/// advance nor reset the expected predecessor hash.
pub fn annotate_chain(entries: &[(Value, String)]) -> Vec<AnnotatedEntry> {
    let mut annotated = Vec::with_capacity(entries.len());
    let mut previous_hash: Option<String> = None;

    for (index, (record, raw)) in entries.iter().enumerate() {
        let entry_hash = record
            .get(ENTRY_HASH_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);

        let (status, error) = match entry_hash {
            None => (IntegrityStatus::Legacy, None),
            Some(stored_hash) => {
                let stored_prev = record
                    .get(PREV_HASH_FIELD)
                    .and_then(Value::as_str)
                    .map(str::to_string);

                let result = if stored_prev != previous_hash {
                    (
                        IntegrityStatus::Failed,
                        Some(format!(
                            "prev_hash mismatch: chain broken (expected {previous_hash:?}, got {stored_prev:?})"
                        )),
                    )
                } else {
                    match compute_entry_hash(record) {
                        Ok(expected) if expected == stored_hash => (IntegrityStatus::Ok, None),
                        Ok(expected) => (
                            IntegrityStatus::Failed,
                            Some(format!(
                                "entry_hash mismatch: content altered (expected={expected}, got={stored_hash})"
                            )),
                        ),
                        Err(err) => (IntegrityStatus::Failed, Some(err.to_string())),
                    }
                };

                previous_hash = Some(stored_hash);
                result
            }
        };

        annotated.push(AnnotatedEntry {
            record: record.clone(),
            raw: raw.clone(),
            index,
            status,
            error,
        });
    }

    annotated
}

/// Key used to join decision records with enforcement events.
///
/// The fallback tuple exists because records written before correlation
/// ids must remain joinable, at reduced precision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorrelationKey {
    Id(String),
    Fallback {
        timestamp: String,
        identity: String,
        requested_action: String,
        policy_version_id: Option<String>,
    },
}

fn str_field(record: &Value, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn extract_identity(record: &Value) -> String {
    let identity = str_field(record, "identity_label");
    if identity.is_empty() {
        str_field(record, "identity")
    } else {
        identity
    }
}

fn extract_requested_action(record: &Value) -> String {
    let requested = str_field(record, "requested_permission_name");
    if requested.is_empty() {
        str_field(record, "requested_action")
    } else {
        requested
    }
}

fn fallback_key(record: &Value) -> CorrelationKey {
    CorrelationKey::Fallback {
        timestamp: str_field(record, "timestamp"),
        identity: extract_identity(record),
        requested_action: extract_requested_action(record),
        policy_version_id: record
            .get("policy_version_id")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Correlation key for an audit decision record.
pub fn decision_correlation_key(record: &Value) -> CorrelationKey {
    match record
        .get("decision_correlation_id")
        .and_then(Value::as_str)
    {
        Some(id) if !id.is_empty() => CorrelationKey::Id(id.to_string()),
        _ => fallback_key(record),
    }
}

/// Correlation key for an enforcement log record, read from
/// `payload.decision_reference`.
pub fn enforcement_correlation_key(record: &Value) -> CorrelationKey {
    let decision_ref = record
        .get("payload")
        .and_then(|p| p.get("decision_reference"))
        .cloned()
        .unwrap_or(Value::Null);

    match decision_ref
        .get("decision_correlation_id")
        .and_then(Value::as_str)
    {
        Some(id) if !id.is_empty() => CorrelationKey::Id(id.to_string()),
        _ => fallback_key(&decision_ref),
    }
}

/// Load enforcement entries. Absence of the enforcement log is not an
/// error for correlation, and malformed lines are skipped with a warning:
/// this is a decide-adjacent read path, so fail-open is safe.
pub fn load_enforcement_entries(path: &Path) -> Vec<(Value, String)> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return Vec::new(),
    };

    let mut entries = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(record) => entries.push((record, line.to_string())),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    line = idx + 1,
                    error = %err,
                    "skipping malformed enforcement record"
                );
            }
        }
    }
    entries
}

/// A decision joined with its enforcement events.
#[derive(Clone, Debug, Serialize)]
pub struct CorrelationResult {
    pub decision: AnnotatedEntry,
    pub enforcement_matches: Vec<Value>,
}

/// Correlate the decision at `index` in the audit ledger with matching
/// enforcement-ledger entries.
pub fn correlate(
    audit_path: &Path,
    enforcement_path: &Path,
    index: usize,
) -> Result<CorrelationResult, LedgerError> {
    let entries = load_entries(audit_path)?;
    let annotated = annotate_chain(&entries);

    let decision = annotated
        .into_iter()
        .nth(index)
        .ok_or(LedgerError::IndexOutOfRange {
            index,
            len: entries.len(),
        })?;

    let decision_key = decision_correlation_key(&decision.record);

    let enforcement_matches = load_enforcement_entries(enforcement_path)
        .into_iter()
        .filter(|(record, _)| enforcement_correlation_key(record) == decision_key)
        .map(|(record, _)| record)
        .collect();

    Ok(CorrelationResult {
        decision,
        enforcement_matches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::seal_record;
    use crate::ledger::Ledger;
    use serde_json::json;
    use std::io::Write;

    fn entry(record: Value) -> (Value, String) {
        let raw = record.to_string();
        (record, raw)
    }

    #[test]
    fn legacy_prefix_then_valid_chain() {
        let legacy1 = entry(json!({"decision": "ALLOW", "reason": "old 1"}));
        let legacy2 = entry(json!({"decision": "DENY", "reason": "old 2"}));
        let first = seal_record(json!({"reason": "new 1"}), None).unwrap();
        let second = seal_record(json!({"reason": "new 2"}), Some(first.entry_hash.clone())).unwrap();

        let entries = vec![
            legacy1,
            legacy2,
            entry(first.record),
            entry(second.record),
        ];
        let annotated = annotate_chain(&entries);

        assert_eq!(annotated[0].status, IntegrityStatus::Legacy);
        assert_eq!(annotated[1].status, IntegrityStatus::Legacy);
        assert_eq!(annotated[2].status, IntegrityStatus::Ok);
        assert_eq!(annotated[3].status, IntegrityStatus::Ok);
    }

    #[test]
    fn altered_entry_flags_failed_without_poisoning_neighbors() {
        let first = seal_record(json!({"reason": "one"}), None).unwrap();
        let second = seal_record(json!({"reason": "two"}), Some(first.entry_hash.clone())).unwrap();
        let third = seal_record(json!({"reason": "three"}), Some(second.entry_hash.clone())).unwrap();

        let mut tampered = second.record.clone();
        tampered["reason"] = json!("tw0");

        let entries = vec![entry(first.record), entry(tampered), entry(third.record)];
        let annotated = annotate_chain(&entries);

        assert_eq!(annotated[0].status, IntegrityStatus::Ok);
        assert_eq!(annotated[1].status, IntegrityStatus::Failed);
        assert!(annotated[1].error.as_ref().unwrap().contains("content altered"));
        // The third entry still links to the stored (tampered) hash, so
        // it remains OK; the damage is isolated to the altered line.
        assert_eq!(annotated[2].status, IntegrityStatus::Ok);
    }

    #[test]
    fn correlation_prefers_id_over_fallback() {
        let with_id = json!({
            "decision_correlation_id": "corr-42",
            "timestamp": "2026-01-24T00:00:00Z",
            "identity_label": "Owner",
            "requested_permission_name": "AUTHORIZE_EMERGENCY_LOCKDOWN",
        });
        assert_eq!(
            decision_correlation_key(&with_id),
            CorrelationKey::Id("corr-42".to_string())
        );

        let without_id = json!({
            "timestamp": "2026-01-24T00:00:00Z",
            "identity_label": "Owner",
            "requested_permission_name": "AUTHORIZE_EMERGENCY_LOCKDOWN",
            "policy_version_id": "1.0.0",
        });
        assert_eq!(
            decision_correlation_key(&without_id),
            CorrelationKey::Fallback {
                timestamp: "2026-01-24T00:00:00Z".to_string(),
                identity: "Owner".to_string(),
                requested_action: "AUTHORIZE_EMERGENCY_LOCKDOWN".to_string(),
                policy_version_id: Some("1.0.0".to_string()),
            }
        );
    }

    #[test]
    fn enforcement_key_reads_decision_reference() {
        let event = json!({
            "timestamp": "2026-01-24T00:00:05Z",
            "kind": "enforcement_event",
            "payload": {
                "decision_reference": {"decision_correlation_id": "corr-42"},
                "context": {},
                "dry_run": false,
                "action_results": [],
            },
            "meta": {},
        });
        assert_eq!(
            enforcement_correlation_key(&event),
            CorrelationKey::Id("corr-42".to_string())
        );
    }

    #[test]
    fn correlate_joins_audit_and_enforcement_ledgers() {
        let dir = tempfile::tempdir().unwrap();
        let audit_path = dir.path().join("audit_log.jsonl");
        let enforcement_path = dir.path().join("enforcement_log.jsonl");

        let mut audit = Ledger::new(&audit_path);
        audit
            .append_record(json!({
                "decision": "ALLOW",
                "decision_correlation_id": "corr-1",
                "identity_label": "Owner",
            }))
            .unwrap();
        audit
            .append_record(json!({
                "decision": "ALLOW",
                "decision_correlation_id": "corr-2",
                "identity_label": "Owner",
            }))
            .unwrap();

        let mut enforcement = Ledger::new(&enforcement_path);
        enforcement
            .append_enforcement(
                &json!({
                    "decision_reference": {"decision_correlation_id": "corr-2"},
                    "context": {},
                    "dry_run": false,
                    "action_results": [],
                }),
                json!({}),
            )
            .unwrap();

        let result = correlate(&audit_path, &enforcement_path, 1).unwrap();
        assert_eq!(result.decision.status, IntegrityStatus::Ok);
        assert_eq!(result.enforcement_matches.len(), 1);

        let no_match = correlate(&audit_path, &enforcement_path, 0).unwrap();
        assert!(no_match.enforcement_matches.is_empty());

        let err = correlate(&audit_path, &enforcement_path, 9).unwrap_err();
        assert!(matches!(err, LedgerError::IndexOutOfRange { index: 9, .. }));
    }

    #[test]
    fn missing_enforcement_log_yields_no_matches() {
        let dir = tempfile::tempdir().unwrap();
        let audit_path = dir.path().join("audit_log.jsonl");
        Ledger::new(&audit_path)
            .append_record(json!({"decision_correlation_id": "corr-1"}))
            .unwrap();

        let result = correlate(&audit_path, &dir.path().join("missing.jsonl"), 0).unwrap();
        assert!(result.enforcement_matches.is_empty());
    }

    #[test]
    fn malformed_enforcement_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enforcement_log.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{{broken").unwrap();
        writeln!(file, r#"{{"kind":"enforcement_event","payload":{{}}}}"#).unwrap();

        let entries = load_enforcement_entries(&path);
        assert_eq!(entries.len(), 1);
    }
}
