//! Read-mostly presentation layer over the governance ledgers.
//!
//! Every subcommand except `run-scenario` reads ledger files and never
//! mutates them. `run-scenario` drives the full decide -> attest ->
//! enforce pipeline from a scenario config file.

use acp_delegation::DelegationRegistry;
use acp_ledger::{correlate, load_entries, verify, AnnotatedEntry};
use acp_service::{
    load_scenarios, validate_policies, GovernanceConfig, GovernanceService,
};
use acp_enforcement::{EnforcementDispatcher, LockdownStateEffector};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "acp", about = "Authority Control Plane CLI", version)]
struct Cli {
    /// Path to the audit log.
    #[arg(long, default_value = "data/audit_log.jsonl", global = true)]
    log_path: PathBuf,

    /// Path to the enforcement log.
    #[arg(long, default_value = "data/enforcement_log.jsonl", global = true)]
    enforcement_log_path: PathBuf,

    /// Path to the delegation registry.
    #[arg(long, default_value = "data/delegations.jsonl", global = true)]
    registry_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify hash-chain integrity of a ledger file.
    Verify,
    /// List decisions with basic fields and integrity status.
    List {
        /// Emit JSON instead of a text table.
        #[arg(long)]
        json: bool,
    },
    /// Show a full explanation for one decision by index.
    Explain {
        /// 0-based index as shown by `list`.
        #[arg(long)]
        index: usize,
        #[arg(long)]
        json: bool,
    },
    /// Correlate a decision with enforcement events.
    Correlate {
        #[arg(long)]
        index: usize,
        #[arg(long)]
        json: bool,
    },
    /// List currently active delegations.
    Delegations,
    /// Statically validate a policy config file.
    ValidatePolicies {
        /// Path to the policy config JSON document.
        #[arg(long)]
        config: PathBuf,
    },
    /// Run one scenario end-to-end: decide, attest, enforce.
    RunScenario {
        /// Path to the scenario config JSON document.
        #[arg(long)]
        scenarios: PathBuf,
        /// Scenario id to run.
        #[arg(long)]
        scenario: String,
        /// Identities that may execute ALLOW decisions directly.
        #[arg(long)]
        primary_authority: Vec<String>,
        /// Path to the lockdown state file for the built-in effector.
        #[arg(long, default_value = "data/lockdown_state.json")]
        lockdown_state_path: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Verify => cmd_verify(&cli),
        Command::List { json } => cmd_list(&cli, *json),
        Command::Explain { index, json } => cmd_explain(&cli, *index, *json),
        Command::Correlate { index, json } => cmd_correlate(&cli, *index, *json),
        Command::Delegations => cmd_delegations(&cli),
        Command::ValidatePolicies { config } => cmd_validate_policies(config),
        Command::RunScenario {
            scenarios,
            scenario,
            primary_authority,
            lockdown_state_path,
        } => cmd_run_scenario(
            &cli,
            scenarios,
            scenario,
            primary_authority.clone(),
            lockdown_state_path.clone(),
        ),
    }
}

fn cmd_verify(cli: &Cli) -> Result<()> {
    let report = verify(&cli.log_path);

    println!("Log file: {}", cli.log_path.display());
    println!("Total entries: {}", report.total_entries);
    println!("Hashed entries: {}", report.hashed_entries);

    if report.ok && report.errors.is_empty() {
        println!("Integrity check: OK");
        return Ok(());
    }

    println!("Integrity check: FAILED");
    for err in &report.errors {
        println!("- line {}: {}", err.line, err.message);
    }
    bail!("integrity check failed");
}

fn annotated(cli: &Cli) -> Result<Vec<AnnotatedEntry>> {
    let entries = load_entries(&cli.log_path)
        .with_context(|| format!("loading audit log {}", cli.log_path.display()))?;
    Ok(acp_ledger::annotate_chain(&entries))
}

fn str_field<'a>(record: &'a Value, key: &str) -> &'a str {
    record.get(key).and_then(Value::as_str).unwrap_or("")
}

fn cmd_list(cli: &Cli, json: bool) -> Result<()> {
    let entries = annotated(cli)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No entries found.");
        return Ok(());
    }

    println!(
        "{:>4}  {:7}  {:26}  {:12}  {:30}  {:8}",
        "Idx", "Status", "Timestamp", "Identity", "Requested Action", "Decision"
    );
    for entry in &entries {
        let record = &entry.record;
        println!(
            "{:>4}  {:7}  {:26}  {:12}  {:30}  {:8}",
            entry.index,
            entry.status.as_str(),
            str_field(record, "timestamp"),
            str_field(record, "identity_label"),
            str_field(record, "requested_permission_name"),
            str_field(record, "decision"),
        );
    }
    Ok(())
}

fn cmd_explain(cli: &Cli, index: usize, json: bool) -> Result<()> {
    let entries = annotated(cli)?;
    let entry = entries
        .get(index)
        .with_context(|| format!("index {index} out of range (0..{})", entries.len()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(entry)?);
        return Ok(());
    }

    println!("Decision Index   : {}", entry.index);
    println!("Integrity Status : {}", entry.status.as_str());
    if let Some(error) = &entry.error {
        println!("Integrity Detail : {error}");
    }
    println!("Timestamp        : {}", str_field(&entry.record, "timestamp"));
    println!("Identity         : {}", str_field(&entry.record, "identity_label"));
    println!(
        "Requested Action : {}",
        str_field(&entry.record, "requested_permission_name")
    );
    println!("Decision Outcome : {}", str_field(&entry.record, "decision"));
    println!("Reason           : {}", str_field(&entry.record, "reason"));
    println!("Full record:");
    println!("{}", serde_json::to_string_pretty(&entry.record)?);
    Ok(())
}

fn cmd_correlate(cli: &Cli, index: usize, json: bool) -> Result<()> {
    let result = correlate(&cli.log_path, &cli.enforcement_log_path, index)
        .context("correlating decision with enforcement events")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Decision Index   : {}", result.decision.index);
    println!("Integrity Status : {}", result.decision.status.as_str());
    println!(
        "Decision Outcome : {}",
        str_field(&result.decision.record, "decision")
    );

    if result.enforcement_matches.is_empty() {
        println!("No correlated enforcement events were found.");
        return Ok(());
    }

    println!(
        "Correlated enforcement events: {}",
        result.enforcement_matches.len()
    );
    for (i, event) in result.enforcement_matches.iter().enumerate() {
        println!("Enforcement #{}", i + 1);
        println!("{}", serde_json::to_string_pretty(event)?);
    }
    Ok(())
}

fn cmd_delegations(cli: &Cli) -> Result<()> {
    let registry = DelegationRegistry::new(&cli.registry_path);
    let active = registry
        .list_active(Utc::now())
        .context("loading delegation registry")?;

    if active.is_empty() {
        println!("No active delegations found.");
        return Ok(());
    }

    println!("== Active Delegations ==");
    for delegation in &active {
        println!("Delegation ID : {}", delegation.delegation_id);
        println!("Principal     : {}", delegation.principal_identity_label);
        println!("Delegate      : {}", delegation.delegate_identity_label);
        let actions = &delegation.delegation_scope.actions;
        let states = &delegation.delegation_scope.system_states;
        println!(
            "Actions       : {}",
            if actions.is_empty() { "-".to_string() } else { actions.join(", ") }
        );
        println!(
            "System states : {}",
            if states.is_empty() { "-".to_string() } else { states.join(", ") }
        );
        println!("Created reason: {}", delegation.created_reason);
        println!();
    }
    Ok(())
}

fn cmd_validate_policies(config: &PathBuf) -> Result<()> {
    let policies = acp_service::load_policies(config)?;
    let report = validate_policies(&policies);

    for err in &report.errors {
        println!("[ERROR] {err}");
    }
    for warning in &report.warnings {
        println!("[WARN] {warning}");
    }

    if report.ok() {
        println!("Validation completed: PASS");
        Ok(())
    } else {
        bail!("validation completed: FAIL ({} error(s))", report.errors.len());
    }
}

fn cmd_run_scenario(
    cli: &Cli,
    scenarios_path: &PathBuf,
    scenario_id: &str,
    primary_authorities: Vec<String>,
    lockdown_state_path: PathBuf,
) -> Result<()> {
    let scenarios = load_scenarios(scenarios_path)?;
    let scenario = scenarios
        .get(scenario_id)
        .with_context(|| format!("scenario '{scenario_id}' not found in {}", scenarios_path.display()))?;

    let config = GovernanceConfig {
        audit_log_path: cli.log_path.clone(),
        enforcement_log_path: cli.enforcement_log_path.clone(),
        delegation_registry_path: cli.registry_path.clone(),
        primary_authorities,
        on_parse_error: Default::default(),
    };

    let mut dispatcher = EnforcementDispatcher::new();
    dispatcher
        .register_effector(Box::new(LockdownStateEffector::new(lockdown_state_path)))
        .context("registering lockdown effector")?;
    let mut service = GovernanceService::with_dispatcher(config, dispatcher);

    let roles: BTreeMap<String, acp_types::Role> = scenario
        .roles
        .iter()
        .cloned()
        .map(|r| (r.name.clone(), r))
        .collect();

    let decision = service.decide(
        &scenario.identity,
        &scenario.requested_permission,
        scenario.system_state,
        &roles,
        &scenario.policies,
        None,
    )?;

    println!("Identity   : {}", decision.identity_label);
    println!("Permission : {}", decision.requested_permission_name);
    println!("State      : {}", decision.system_state);
    println!("Decision   : {}", decision.decision);
    println!("Policies   : {}", decision.policy_ids.join(", "));
    println!("Reason     : {}", decision.reason);
    if let Some(principals) = &decision.principal_identity_labels {
        println!("Principals : {}", principals.join(", "));
    }
    if let Some(ids) = &decision.delegation_ids {
        println!("Delegations: {}", ids.join(", "));
    }

    let record = service.enforce(&decision, scenario.actions.clone(), scenario.dry_run)?;
    println!("Enforcement: {}", record.disposition.reason());
    for result in &record.report.action_results {
        println!(
            "  {:?} {} -> {:?}",
            result.outcome,
            result.action.action_type,
            result.details.get("operation").unwrap_or(&Value::Null)
        );
    }

    Ok(())
}
