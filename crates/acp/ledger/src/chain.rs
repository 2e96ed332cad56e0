//! Writer-side hash chaining.
//!
//! `entry_hash = SHA-256(canonical({record fields, prev_hash}))`, where
//! `prev_hash` is the previous entry's `entry_hash` or null for the first
//! entry of a chain.

use crate::canonical::canonical_json;
use crate::{LedgerError, ENTRY_HASH_FIELD, PREV_HASH_FIELD};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::warn;

/// A record with its chain fields attached, ready to be written as one
/// JSON line.
#[derive(Clone, Debug, PartialEq)]
pub struct SealedRecord {
    pub record: Value,
    pub prev_hash: Option<String>,
    pub entry_hash: String,
}

impl SealedRecord {
    /// The canonical single-line form persisted to the ledger file.
    pub fn to_line(&self) -> String {
        canonical_json(&self.record)
    }
}

/// Read the `entry_hash` of the last line of `path`, walking backward
/// byte-by-byte so large ledgers are never loaded whole.
///
/// Returns `None` for an empty, absent, or unparseable tail. A corrupt
/// or legacy tail therefore starts a fresh chain instead of blocking new
/// writes: the break stays detectable on verify, but ingestion never
/// stops. Deliberate availability trade-off.
pub fn last_entry_hash(path: &Path) -> Option<String> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return None,
    };

    let size = file.seek(SeekFrom::End(0)).ok()?;
    if size == 0 {
        return None;
    }

    let mut buf: Vec<u8> = Vec::new();
    let mut pos = size;
    let mut byte = [0u8; 1];
    while pos > 0 {
        pos -= 1;
        file.seek(SeekFrom::Start(pos)).ok()?;
        file.read_exact(&mut byte).ok()?;
        if byte[0] == b'\n' && !buf.is_empty() {
            break;
        }
        buf.push(byte[0]);
    }
    buf.reverse();

    let line = String::from_utf8(buf).ok()?;
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(record) => record
            .get(ENTRY_HASH_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string),
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "unparseable ledger tail, starting a fresh chain"
            );
            None
        }
    }
}

/// Recompute the hash of a stored record over its own fields, excluding
/// `entry_hash` and including `prev_hash` exactly as stored.
pub fn compute_entry_hash(record: &Value) -> Result<String, LedgerError> {
    let obj = record.as_object().ok_or(LedgerError::RecordNotObject)?;
    let mut payload = obj.clone();
    payload.remove(ENTRY_HASH_FIELD);
    Ok(sha256_hex(&canonical_json(&Value::Object(payload))))
}

/// Attach `prev_hash` and `entry_hash` to a record.
pub fn seal_record(record: Value, prev_hash: Option<String>) -> Result<SealedRecord, LedgerError> {
    let mut obj = match record {
        Value::Object(obj) => obj,
        _ => return Err(LedgerError::RecordNotObject),
    };

    obj.insert(
        PREV_HASH_FIELD.to_string(),
        prev_hash
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );

    let entry_hash = sha256_hex(&canonical_json(&Value::Object(obj.clone())));
    obj.insert(
        ENTRY_HASH_FIELD.to_string(),
        Value::String(entry_hash.clone()),
    );

    Ok(SealedRecord {
        record: Value::Object(obj),
        prev_hash,
        entry_hash,
    })
}

fn sha256_hex(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
