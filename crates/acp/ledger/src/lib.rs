//! ACP Ledger - Hash-chained append-only audit and enforcement ledgers
//!
//! Decisions and enforcement events are persisted as JSON Lines, one
//! record per line, each linked to its predecessor by a SHA-256 hash over
//! the record's canonical form. The file is the ledger's sole storage;
//! no in-memory index is authoritative beyond the last line.
//!
//! Writer and verifier share one canonicalization contract
//! ([`canonical::canonical_json`]): sorted keys, compact separators,
//! UTF-8. Changing that transform invalidates every existing hash, so it
//! is treated as versioned and frozen.

#![deny(unsafe_code)]

pub mod canonical;
pub mod chain;
pub mod ledger;
pub mod replay;

pub use canonical::canonical_json;
pub use chain::{compute_entry_hash, last_entry_hash, seal_record, SealedRecord};
pub use ledger::{load_entries, verify, IntegrityReport, Ledger, LineError};
pub use replay::{
    annotate_chain, correlate, decision_correlation_key, enforcement_correlation_key,
    load_enforcement_entries, AnnotatedEntry, CorrelationKey, CorrelationResult, IntegrityStatus,
};

use std::path::PathBuf;
use thiserror::Error;

/// Field carrying the predecessor link in a sealed record.
pub const PREV_HASH_FIELD: &str = "prev_hash";
/// Field carrying the record's own hash.
pub const ENTRY_HASH_FIELD: &str = "entry_hash";

/// Ledger errors. Chain breaks and tampering are NOT errors here; they
/// are findings reported by [`verify`]; the ledger keeps appending past
/// them because a broken chain is evidence, not an operational blocker.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize ledger record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("ledger records must be JSON objects")]
    RecordNotObject,

    #[error("malformed ledger line {line} in {path}: {message}")]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("entry index {index} out of range (0..{len})")]
    IndexOutOfRange { index: usize, len: usize },
}
