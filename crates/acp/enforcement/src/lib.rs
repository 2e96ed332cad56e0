//! ACP Enforcement - Dispatcher, delegation-aware gate, and effectors
//!
//! Turns an ALLOW decision into concrete, auditable side effects without
//! ever expanding authority beyond what was decided. The gate re-checks
//! delegation independently of the decision layer; the dispatcher routes
//! declared actions to registered effectors and classifies outcomes.
//!
//! Separation of concerns: decision != enforcement != logging. Nothing in
//! this crate writes to any ledger; persistence of results belongs to the
//! ledger layer.

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod gate;
pub mod lockdown;

pub use dispatcher::{
    Effector, EffectorError, EffectorResult, EnforcementAction, EnforcementContext,
    EnforcementDispatcher, EnforcementOutcome, EnforcementReport, EnforcementRequest,
};
pub use gate::{DelegationGate, GateDisposition};
pub use lockdown::{LockdownState, LockdownStateEffector};

use acp_delegation::DelegationError;
use thiserror::Error;

/// Enforcement-layer errors. Per-action failures are NOT errors; they
/// become `FAILED` outcomes in the dispatch report; these variants cover
/// precondition violations and wiring mistakes only.
#[derive(Debug, Error)]
pub enum EnforcementError {
    /// Enforcement refuses to run without a decision carrying a
    /// correlation id; rejected before any effector is touched.
    #[error("enforcement requires a decision with a correlation id")]
    MissingCorrelationId,

    #[error("effector action_type must be a non-empty string")]
    InvalidActionType,

    #[error(transparent)]
    Delegation(#[from] DelegationError),
}
