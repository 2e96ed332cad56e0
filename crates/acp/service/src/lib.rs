//! ACP Service - Unified governance facade
//!
//! Wires the decide → attest → enforce → verify pipeline together:
//! delegation context resolution, authority resolution, audit-ledger
//! attestation, gated enforcement, and replay. All paths come in through
//! explicit configuration; there are no package-level defaults.

#![deny(unsafe_code)]

pub mod loader;
pub mod validate;

pub use loader::{load_policies, load_scenarios, LoaderError, Scenario};
pub use validate::{validate_policies, ValidationReport};

use acp_authority::AuthorityEngine;
use acp_delegation::{DelegationError, DelegationRegistry, DelegationResolver};
use acp_enforcement::{
    DelegationGate, EnforcementAction, EnforcementContext, EnforcementDispatcher,
    EnforcementError, EnforcementReport, EnforcementRequest, GateDisposition,
};
use acp_ledger::{
    correlate, load_entries, verify, AnnotatedEntry, CorrelationResult, IntegrityReport, Ledger,
    LedgerError,
};
use acp_types::{Decision, Identity, OnParseError, Policy, RolesByName, SystemState};
use chrono::Utc;
use serde_json::{json, Value};
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// Explicit wiring for one governance service instance.
#[derive(Clone, Debug)]
pub struct GovernanceConfig {
    pub audit_log_path: PathBuf,
    pub enforcement_log_path: PathBuf,
    pub delegation_registry_path: PathBuf,
    /// Identities allowed to execute ALLOW decisions without a
    /// delegation grant at enforcement time.
    pub primary_authorities: Vec<String>,
    pub on_parse_error: OnParseError,
}

impl GovernanceConfig {
    /// Conventional layout under a single data directory.
    pub fn under_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            audit_log_path: data_dir.join("audit_log.jsonl"),
            enforcement_log_path: data_dir.join("enforcement_log.jsonl"),
            delegation_registry_path: data_dir.join("delegations.jsonl"),
            primary_authorities: Vec::new(),
            on_parse_error: OnParseError::SkipAndWarn,
        }
    }

    pub fn with_primary_authorities(mut self, authorities: Vec<String>) -> Self {
        self.primary_authorities = authorities;
        self
    }
}

/// Outcome of one enforcement attempt, as persisted to the enforcement
/// ledger: the gate's disposition plus the dispatch report (empty when
/// the gate refused).
#[derive(Clone, Debug)]
pub struct EnforcementRecord {
    pub disposition: GateDisposition,
    pub report: EnforcementReport,
}

/// The unified governance service.
pub struct GovernanceService {
    engine: AuthorityEngine,
    resolver: DelegationResolver,
    gate: DelegationGate,
    dispatcher: EnforcementDispatcher,
    audit: Ledger,
    enforcement: Ledger,
}

impl GovernanceService {
    pub fn new(config: GovernanceConfig) -> Self {
        Self::with_dispatcher(config, EnforcementDispatcher::new())
    }

    /// Create with a pre-wired dispatcher (effectors registered by the
    /// caller; the service never invents them).
    pub fn with_dispatcher(config: GovernanceConfig, dispatcher: EnforcementDispatcher) -> Self {
        let registry = DelegationRegistry::with_parse_policy(
            &config.delegation_registry_path,
            config.on_parse_error,
        );
        Self {
            engine: AuthorityEngine::new(),
            resolver: DelegationResolver::new(registry.clone()),
            gate: DelegationGate::new(registry, config.primary_authorities),
            dispatcher,
            audit: Ledger::new(config.audit_log_path),
            enforcement: Ledger::new(config.enforcement_log_path),
        }
    }

    pub fn dispatcher_mut(&mut self) -> &mut EnforcementDispatcher {
        &mut self.dispatcher
    }

    /// Resolve one governance decision and append it to the audit
    /// ledger. Every decision leaves the service carrying a fresh
    /// correlation id so enforcement stays joinable.
    pub fn decide(
        &mut self,
        identity: &Identity,
        requested_permission: &str,
        system_state: SystemState,
        roles_by_name: &RolesByName,
        policies: &[Policy],
        decision_timestamp: Option<&str>,
    ) -> Result<Decision, ServiceError> {
        let delegation_ctx = self.resolver.resolve_context(
            &identity.display_name,
            requested_permission,
            system_state,
            decision_timestamp,
        )?;

        let decision = self
            .engine
            .resolve(
                identity,
                requested_permission,
                system_state,
                roles_by_name,
                policies,
                &delegation_ctx,
            )
            .with_correlation_id(uuid::Uuid::new_v4().to_string());

        self.audit.append_decision(&decision)?;
        info!(
            identity = %decision.identity_label,
            permission = %decision.requested_permission_name,
            outcome = %decision.decision,
            "decision recorded"
        );
        Ok(decision)
    }

    /// Enforce a decision: gate it, dispatch the declared actions when
    /// the gate permits, and append the result to the enforcement
    /// ledger. The decision itself is never re-evaluated.
    pub fn enforce(
        &mut self,
        decision: &Decision,
        actions: Vec<EnforcementAction>,
        dry_run: bool,
    ) -> Result<EnforcementRecord, ServiceError> {
        let disposition = self.gate.evaluate(decision, Utc::now())?;

        let decision_reference = serde_json::to_value(decision).map_err(LedgerError::from)?;
        let context = EnforcementContext::new(enforcement_context_for(decision));

        let report = if disposition.may_execute() {
            let request = EnforcementRequest {
                decision_reference,
                context,
                actions,
                dry_run,
            };
            self.dispatcher.dispatch(&request)
        } else {
            // Gate refused: no effector runs, but the attempt itself is
            // still attested.
            EnforcementReport {
                decision_reference,
                context: context.0,
                dry_run,
                action_results: Vec::new(),
            }
        };

        let meta = json!({
            "disposition": disposition_label(&disposition),
            "reason": disposition.reason(),
        });
        self.enforcement.append_enforcement(&report, meta)?;

        Ok(EnforcementRecord {
            disposition,
            report,
        })
    }

    /// Verify the audit ledger's hash chain.
    pub fn verify_audit(&self) -> IntegrityReport {
        verify(self.audit.path())
    }

    /// Verify the enforcement ledger's hash chain.
    pub fn verify_enforcement(&self) -> IntegrityReport {
        verify(self.enforcement.path())
    }

    /// All audit entries annotated with their chain status.
    pub fn annotated_decisions(&self) -> Result<Vec<AnnotatedEntry>, ServiceError> {
        let entries = load_entries(self.audit.path())?;
        Ok(acp_ledger::annotate_chain(&entries))
    }

    /// Join the decision at `index` with its enforcement events.
    pub fn correlate(&self, index: usize) -> Result<CorrelationResult, ServiceError> {
        Ok(correlate(
            self.audit.path(),
            self.enforcement.path(),
            index,
        )?)
    }

    pub fn delegation_registry(&self) -> &DelegationRegistry {
        self.resolver.registry()
    }
}

fn enforcement_context_for(decision: &Decision) -> Value {
    let mut context = json!({
        "decision_outcome": decision.decision,
        "decision_correlation_id": decision.decision_correlation_id,
        "identity_label": decision.identity_label,
        "requested_action": decision.requested_permission_name,
        "system_state": decision.system_state,
    });
    if let Some(delegate) = &decision.delegate_identity_label {
        context["delegate_identity_label"] = json!(delegate);
    }
    if let Some(principals) = &decision.principal_identity_labels {
        context["principal_identity_labels"] = json!(principals);
    }
    if let Some(ids) = &decision.delegation_ids {
        context["delegation_ids"] = json!(ids);
    }
    context
}

fn disposition_label(disposition: &GateDisposition) -> &'static str {
    match disposition {
        GateDisposition::Execute { .. } => "EXECUTED",
        GateDisposition::Blocked { .. } => "BLOCKED",
        GateDisposition::Paused { .. } => "PAUSED",
    }
}

/// Governance service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("delegation error: {0}")]
    Delegation(#[from] DelegationError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("enforcement error: {0}")]
    Enforcement(#[from] EnforcementError),

    #[error("config error: {0}")]
    Loader(#[from] LoaderError),
}
