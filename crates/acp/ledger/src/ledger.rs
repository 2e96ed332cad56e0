//! Append-only JSONL ledger writer and integrity verification.

use crate::chain::{compute_entry_hash, last_entry_hash, seal_record, SealedRecord};
use crate::{LedgerError, ENTRY_HASH_FIELD, PREV_HASH_FIELD};
use acp_types::Decision;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Single-writer handle to one ledger file.
///
/// Each append is a read-modify-append (read the last entry hash, then
/// write one line). Appends take `&mut self` so concurrent unsynchronized
/// writers to one path cannot be constructed without an external lock;
/// one `Ledger` value per path is the intended serialization point.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a governance decision as one hash-chained line. Ownership
    /// of the record's persistence transfers here; the decision itself is
    /// never mutated.
    pub fn append_decision(&mut self, decision: &Decision) -> Result<SealedRecord, LedgerError> {
        let record = serde_json::to_value(decision)?;
        self.append_record(record)
    }

    /// Append an enforcement event in the stable envelope
    /// `{timestamp, kind, payload, meta}`. `payload` is the serialized
    /// dispatch report; `meta` carries caller metadata and may be empty.
    pub fn append_enforcement<P: Serialize>(
        &mut self,
        payload: &P,
        meta: Value,
    ) -> Result<SealedRecord, LedgerError> {
        let record = json!({
            "timestamp": Utc::now(),
            "kind": "enforcement_event",
            "payload": serde_json::to_value(payload)?,
            "meta": meta,
        });
        self.append_record(record)
    }

    /// Append an arbitrary JSON object as one hash-chained line.
    ///
    /// Existing lines are never rewritten or reordered; a corrupt tail
    /// starts a fresh chain (see [`last_entry_hash`]).
    pub fn append_record(&mut self, record: Value) -> Result<SealedRecord, LedgerError> {
        if !record.is_object() {
            return Err(LedgerError::RecordNotObject);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }

        let prev_hash = last_entry_hash(&self.path);
        let sealed = seal_record(record, prev_hash)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| LedgerError::Io {
                path: self.path.clone(),
                source,
            })?;
        writeln!(file, "{}", sealed.to_line()).map_err(|source| LedgerError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!(
            path = %self.path.display(),
            entry_hash = %sealed.entry_hash,
            "ledger entry appended"
        );
        Ok(sealed)
    }
}

/// One line-level verification finding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LineError {
    pub line: usize,
    pub message: String,
}

/// Result of verifying a ledger file top to bottom.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IntegrityReport {
    pub ok: bool,
    pub total_entries: usize,
    pub hashed_entries: usize,
    pub errors: Vec<LineError>,
}

/// Verify hash-chain integrity of a JSONL ledger.
///
/// Every line gets an independent status: a single corrupted or
/// reordered line never aborts verification of the remainder. Entries
/// without `entry_hash` are legacy and chain-exempt. A missing file
/// verifies clean (nothing to contest).
pub fn verify(path: &Path) -> IntegrityReport {
    let mut report = IntegrityReport {
        ok: true,
        ..IntegrityReport::default()
    };

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return report,
        Err(err) => {
            report.ok = false;
            report.errors.push(LineError {
                line: 0,
                message: format!("I/O error: {err}"),
            });
            return report;
        }
    };
    let ends_with_newline = contents.ends_with('\n');
    let line_count = contents.lines().count();

    let mut expected_prev: Option<String> = None;

    for (idx, line) in contents.lines().enumerate() {
        let line_number = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: Value = match serde_json::from_str(trimmed) {
            Ok(record) => record,
            Err(err) => {
                // A truncated final line is an append still in flight,
                // not corruption.
                if line_number == line_count && !ends_with_newline {
                    warn!(
                        path = %path.display(),
                        "ignoring truncated trailing line (not yet committed)"
                    );
                    continue;
                }
                report.total_entries += 1;
                report.ok = false;
                report.errors.push(LineError {
                    line: line_number,
                    message: format!("invalid JSON: {err}"),
                });
                continue;
            }
        };

        report.total_entries += 1;

        let stored_hash = match record.get(ENTRY_HASH_FIELD).and_then(Value::as_str) {
            Some(hash) => hash.to_string(),
            None => continue, // legacy entry, chain-exempt
        };
        report.hashed_entries += 1;

        let stored_prev = record
            .get(PREV_HASH_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);

        if stored_prev != expected_prev {
            report.ok = false;
            report.errors.push(LineError {
                line: line_number,
                message: format!(
                    "prev_hash mismatch: chain broken (expected {expected_prev:?}, found {stored_prev:?})"
                ),
            });
        }

        match compute_entry_hash(&record) {
            Ok(expected_hash) if expected_hash == stored_hash => {}
            Ok(_) => {
                report.ok = false;
                report.errors.push(LineError {
                    line: line_number,
                    message: "entry_hash mismatch (content altered)".to_string(),
                });
            }
            Err(err) => {
                report.ok = false;
                report.errors.push(LineError {
                    line: line_number,
                    message: err.to_string(),
                });
            }
        }

        expected_prev = Some(stored_hash);
    }

    report
}

/// Load all entries of a ledger file as (parsed record, raw line) pairs,
/// preserving the original text.
///
/// Malformed lines are hard errors here: callers that need tolerant
/// reads go through [`verify`] or the enforcement-side loader. The one
/// exception is a truncated final line with no newline, which a reader
/// racing a writer must treat as not yet committed.
pub fn load_entries(path: &Path) -> Result<Vec<(Value, String)>, LedgerError> {
    let contents = fs::read_to_string(path).map_err(|source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ends_with_newline = contents.ends_with('\n');
    let line_count = contents.lines().count();

    let mut entries = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(record) => entries.push((record, line.to_string())),
            Err(err) => {
                if idx + 1 == line_count && !ends_with_newline {
                    warn!(
                        path = %path.display(),
                        "ignoring truncated trailing line (not yet committed)"
                    );
                    continue;
                }
                return Err(LedgerError::Malformed {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    message: err.to_string(),
                });
            }
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use acp_types::{DecisionOutcome, SystemState};
    use chrono::TimeZone;
    use std::io::Write as IoWrite;

    fn decision(n: u32) -> Decision {
        Decision {
            identity_label: "Owner".to_string(),
            requested_permission_name: "AUTHORIZE_EMERGENCY_LOCKDOWN".to_string(),
            system_state: SystemState::Crisis,
            decision: DecisionOutcome::Allow,
            policy_ids: vec!["policy-001".to_string()],
            reason: format!("decision {n}"),
            timestamp: Utc.timestamp_opt(1_700_000_000 + n as i64, 0).unwrap(),
            policy_version_id: Some("1.0.0".to_string()),
            decision_correlation_id: Some(format!("corr-{n}")),
            delegate_identity_label: None,
            principal_identity_labels: None,
            delegation_ids: None,
        }
    }

    fn temp_ledger() -> (tempfile::TempDir, Ledger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("audit_log.jsonl"));
        (dir, ledger)
    }

    #[test]
    fn three_appends_verify_clean_and_chained() {
        let (_dir, mut ledger) = temp_ledger();
        let first = ledger.append_decision(&decision(1)).unwrap();
        let second = ledger.append_decision(&decision(2)).unwrap();
        let third = ledger.append_decision(&decision(3)).unwrap();

        assert_eq!(first.prev_hash, None);
        assert_eq!(second.prev_hash.as_deref(), Some(first.entry_hash.as_str()));
        assert_eq!(third.prev_hash.as_deref(), Some(second.entry_hash.as_str()));

        let report = verify(ledger.path());
        assert!(report.ok, "errors: {:?}", report.errors);
        assert_eq!(report.total_entries, 3);
        assert_eq!(report.hashed_entries, 3);
    }

    #[test]
    fn single_byte_tamper_fails_only_that_line() {
        let (_dir, mut ledger) = temp_ledger();
        for n in 1..=3 {
            ledger.append_decision(&decision(n)).unwrap();
        }

        let contents = fs::read_to_string(ledger.path()).unwrap();
        let tampered: Vec<String> = contents
            .lines()
            .enumerate()
            .map(|(i, line)| {
                if i == 1 {
                    line.replace("decision 2", "decision x")
                } else {
                    line.to_string()
                }
            })
            .collect();
        fs::write(ledger.path(), tampered.join("\n") + "\n").unwrap();

        let report = verify(ledger.path());
        assert!(!report.ok);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].line, 2);
        assert!(report.errors[0].message.contains("content altered"));
    }

    #[test]
    fn reordered_lines_report_chain_break() {
        let (_dir, mut ledger) = temp_ledger();
        for n in 1..=2 {
            ledger.append_decision(&decision(n)).unwrap();
        }

        let contents = fs::read_to_string(ledger.path()).unwrap();
        let mut lines: Vec<&str> = contents.lines().collect();
        lines.swap(0, 1);
        fs::write(ledger.path(), lines.join("\n") + "\n").unwrap();

        let report = verify(ledger.path());
        assert!(!report.ok);
        assert!(report
            .errors
            .iter()
            .any(|e| e.message.contains("chain broken")));
    }

    #[test]
    fn corrupt_tail_starts_fresh_chain_but_stays_detectable() {
        let (_dir, mut ledger) = temp_ledger();
        ledger.append_decision(&decision(1)).unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(ledger.path())
            .unwrap();
        writeln!(file, "{{garbled tail").unwrap();
        drop(file);

        // Appending past the corruption must not block.
        let next = ledger.append_decision(&decision(2)).unwrap();
        assert_eq!(next.prev_hash, None);

        let report = verify(ledger.path());
        assert!(!report.ok);
        assert!(report.errors.iter().any(|e| e.line == 2));
        // The post-corruption entry itself hashes clean but breaks the
        // chain expectation, which is exactly the evidence we want.
        assert_eq!(report.hashed_entries, 2);
    }

    #[test]
    fn legacy_prefix_is_chain_exempt() {
        let (_dir, mut ledger) = temp_ledger();
        {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(ledger.path())
                .unwrap();
            writeln!(file, r#"{{"decision":"ALLOW","reason":"pre-chain 1"}}"#).unwrap();
            writeln!(file, r#"{{"decision":"DENY","reason":"pre-chain 2"}}"#).unwrap();
        }

        ledger.append_decision(&decision(1)).unwrap();
        ledger.append_decision(&decision(2)).unwrap();

        let report = verify(ledger.path());
        assert!(report.ok, "errors: {:?}", report.errors);
        assert_eq!(report.total_entries, 4);
        assert_eq!(report.hashed_entries, 2);
    }

    #[test]
    fn truncated_trailing_line_is_not_corruption() {
        let (_dir, mut ledger) = temp_ledger();
        ledger.append_decision(&decision(1)).unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(ledger.path())
            .unwrap();
        write!(file, "{{\"decision\":\"ALLO").unwrap();
        drop(file);

        let report = verify(ledger.path());
        assert!(report.ok, "errors: {:?}", report.errors);
        assert_eq!(report.total_entries, 1);

        let entries = load_entries(ledger.path()).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn load_entries_rejects_malformed_interior_line() {
        let (_dir, mut ledger) = temp_ledger();
        ledger.append_decision(&decision(1)).unwrap();
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(ledger.path())
                .unwrap();
            writeln!(file, "{{broken").unwrap();
        }
        ledger.append_decision(&decision(2)).unwrap();

        let err = load_entries(ledger.path()).unwrap_err();
        assert!(matches!(err, LedgerError::Malformed { line: 2, .. }));
    }

    #[test]
    fn enforcement_envelope_shape_and_chaining() {
        let (_dir, mut ledger) = temp_ledger();
        let payload = json!({
            "decision_reference": {"decision_correlation_id": "corr-1"},
            "context": {},
            "dry_run": false,
            "action_results": [],
        });
        let sealed = ledger
            .append_enforcement(&payload, json!({"source": "test"}))
            .unwrap();

        assert_eq!(sealed.record["kind"], "enforcement_event");
        assert_eq!(
            sealed.record["payload"]["decision_reference"]["decision_correlation_id"],
            "corr-1"
        );
        assert_eq!(sealed.record["meta"]["source"], "test");

        let report = verify(ledger.path());
        assert!(report.ok);
        assert_eq!(report.hashed_entries, 1);
    }

    #[test]
    fn missing_file_verifies_clean() {
        let report = verify(Path::new("/nonexistent/audit_log.jsonl"));
        assert!(report.ok);
        assert_eq!(report.total_entries, 0);
    }
}
