//! Routing layer between governance decisions and enforcement effectors.
//!
//! The dispatcher does not make decisions, infer policy, log, or talk to
//! external systems. It accepts an explicit request, routes each declared
//! action to a matching effector, and returns a structured result. It
//! never invents actions the caller did not supply.

use crate::EnforcementError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Outcome of an individual enforcement action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnforcementOutcome {
    /// Effector executed and reported success.
    Success,
    /// Effector executed but nothing needed to change.
    Noop,
    /// Action not applicable given the decision or context.
    NotApplicable,
    /// No effector registered for this action_type.
    NotImplemented,
    /// Effector attempted execution and failed.
    Failed,
}

/// Declarative description of a single enforcement effect. The caller
/// constructs these explicitly; the dispatcher never infers them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnforcementAction {
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

fn empty_object() -> Value {
    json!({})
}

impl EnforcementAction {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            target: None,
            parameters: json!({}),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Context for enforcement, derived from the decision and its
/// environment. Deliberately opaque to the dispatcher so the schema can
/// evolve without touching routing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnforcementContext(pub Value);

impl EnforcementContext {
    pub fn new(data: Value) -> Self {
        Self(data)
    }

    pub fn empty() -> Self {
        Self(json!({}))
    }
}

impl Default for EnforcementContext {
    fn default() -> Self {
        Self::empty()
    }
}

/// Result of one effector handling one action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectorResult {
    pub outcome: EnforcementOutcome,
    pub action: EnforcementAction,
    pub details: Value,
}

/// A complete enforcement request for a single decision. Constructed by
/// the caller; consumed, never created, by the dispatcher.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnforcementRequest {
    pub decision_reference: Value,
    pub context: EnforcementContext,
    pub actions: Vec<EnforcementAction>,
    #[serde(default)]
    pub dry_run: bool,
}

/// Aggregate result of dispatching a batch of actions for one decision.
/// This is the `payload` of an enforcement-ledger record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnforcementReport {
    pub decision_reference: Value,
    pub context: Value,
    pub dry_run: bool,
    pub action_results: Vec<EffectorResult>,
}

/// Error an effector may surface. The dispatcher converts it to a
/// `FAILED` result; it never propagates to the dispatch caller.
#[derive(Debug, Error)]
pub enum EffectorError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Message(String),
}

impl EffectorError {
    pub fn message(msg: impl Into<String>) -> Self {
        EffectorError::Message(msg.into())
    }

    fn kind(&self) -> &'static str {
        match self {
            EffectorError::Io(_) => "Io",
            EffectorError::Serialization(_) => "Serialization",
            EffectorError::Message(_) => "Message",
        }
    }
}

/// An external capability performing one concrete enforcement side
/// effect for one `action_type`.
///
/// Implementations must respect `dry_run = true` as "compute the
/// would-be effect, perform no observable mutation", return structured
/// details instead of logging, and enforce their own timeouts before
/// returning; the dispatcher has no cancellation concept.
pub trait Effector: Send + Sync {
    fn action_type(&self) -> &str;

    fn execute(
        &self,
        action: &EnforcementAction,
        context: &EnforcementContext,
        dry_run: bool,
    ) -> Result<EffectorResult, EffectorError>;
}

/// Routes explicit enforcement actions to registered effectors.
#[derive(Default)]
pub struct EnforcementDispatcher {
    effectors: HashMap<String, Box<dyn Effector>>,
}

impl EnforcementDispatcher {
    pub fn new() -> Self {
        Self {
            effectors: HashMap::new(),
        }
    }

    /// Register an effector for its declared action_type, replacing any
    /// previous registration. Explicit wiring keeps tests honest.
    pub fn register_effector(
        &mut self,
        effector: Box<dyn Effector>,
    ) -> Result<(), EnforcementError> {
        let action_type = effector.action_type().to_string();
        if action_type.is_empty() {
            return Err(EnforcementError::InvalidActionType);
        }
        self.effectors.insert(action_type, effector);
        Ok(())
    }

    /// All action_type values with a registered effector, sorted.
    pub fn registered_action_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.effectors.keys().cloned().collect();
        types.sort();
        types
    }

    /// Execute all declared actions. The single entry point for
    /// enforcement at this layer; it never returns an error: effector
    /// failures are classified per action.
    pub fn dispatch(&self, request: &EnforcementRequest) -> EnforcementReport {
        let mut action_results = Vec::with_capacity(request.actions.len());

        for action in &request.actions {
            let result = match self.effectors.get(&action.action_type) {
                None => EffectorResult {
                    outcome: EnforcementOutcome::NotImplemented,
                    action: action.clone(),
                    details: json!({
                        "reason": "no effector registered for action_type",
                        "action_type": action.action_type,
                    }),
                },
                Some(effector) => {
                    match effector.execute(action, &request.context, request.dry_run) {
                        Ok(result) => result,
                        // Effectors must not bring down the dispatcher.
                        Err(err) => EffectorResult {
                            outcome: EnforcementOutcome::Failed,
                            action: action.clone(),
                            details: json!({
                                "reason": "effector returned an error",
                                "action_type": action.action_type,
                                "error_kind": err.kind(),
                                "error_message": err.to_string(),
                            }),
                        },
                    }
                }
            };

            debug!(
                action_type = %action.action_type,
                outcome = ?result.outcome,
                dry_run = request.dry_run,
                "enforcement action dispatched"
            );
            action_results.push(result);
        }

        EnforcementReport {
            decision_reference: request.decision_reference.clone(),
            context: request.context.0.clone(),
            dry_run: request.dry_run,
            action_results,
        }
    }
}
