// src/verify.rs: One verification cycle, candidate source to verdict
//
// Synthesized -> Running -> {CompileFailed | TimedOut | Executed}
// Executed -> {Reverted | Succeeded}
// Succeeded -> Reconciled (+ ComplianceChecked) -> {Profitable | NotProfitable}
//
// Configuration problems abort before anything runs and come back as `Err`.
// Everything the harness reports, failures included, comes back as a report.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::harness::{parser, ExecutionOutcome, HarnessRunner, RunStatus, Synthesizer};
use crate::infra::config::Config;
use crate::infra::errors::VeriteError;
use crate::pricing::oracle::PricingOracle;
use crate::pricing::tokens;
use crate::reconcile::{BalanceChange, ReconciliationReport, Reconciler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Synthesized,
    Running,
    CompileFailed,
    TimedOut,
    Executed,
    Reverted,
    Succeeded,
    Reconciled,
    ComplianceChecked,
    Profitable,
    NotProfitable,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub states: Vec<CycleState>,
    pub outcome: ExecutionOutcome,
    pub reconciliation: Option<ReconciliationReport>,
    /// Machine-readable reason for the terminal state.
    pub reason: String,
    /// Human-readable detail for failed runs.
    pub error: Option<String>,
    pub elapsed_ms: u64,
    pub kept_workspace: Option<PathBuf>,
}

impl CycleReport {
    pub fn terminal_state(&self) -> Option<CycleState> {
        self.states.last().copied()
    }
}

pub struct Verifier {
    config: Arc<Config>,
    synthesizer: Synthesizer,
    runner: HarnessRunner,
    reconciler: Reconciler,
}

impl Verifier {
    pub fn new(config: Arc<Config>, oracle: Arc<PricingOracle>) -> Self {
        Self {
            synthesizer: Synthesizer::new(config.clone()),
            runner: HarnessRunner::new(&config.harness),
            reconciler: Reconciler::new(oracle, config.profitability.clone()),
            config,
        }
    }

    /// Run `candidate` against `target` on a fork and report what it did.
    pub async fn verify(
        &self,
        candidate: &str,
        target: &str,
        chain_id: u64,
        fork_block: u64,
        initial_balances: &BTreeMap<String, u64>,
    ) -> Result<ExecutionOutcome, VeriteError> {
        Ok(self
            .run_cycle(candidate, target, chain_id, fork_block, initial_balances)
            .await?
            .outcome)
    }

    /// Full cycle including reconciliation and compliance. An empty
    /// `initial_balances` means the configured defaults for the chain.
    pub async fn run_cycle(
        &self,
        candidate: &str,
        target: &str,
        chain_id: u64,
        fork_block: u64,
        initial_balances: &BTreeMap<String, u64>,
    ) -> Result<CycleReport, VeriteError> {
        let balances = if initial_balances.is_empty() {
            self.config.initial_balances(chain_id)
        } else {
            initial_balances.clone()
        };

        let project = self
            .synthesizer
            .synthesize(candidate, target, fork_block, chain_id, &balances)?;
        let mut states = vec![CycleState::Synthesized, CycleState::Running];

        let timeout = Duration::from_secs(self.config.harness.timeout_seconds);
        let raw = self.runner.run(&project, timeout).await?;
        let mut outcome = parser::parse(&raw, &project.target);
        let failure = raw.to_error(timeout);

        let report = |states: Vec<CycleState>,
                      outcome: ExecutionOutcome,
                      reconciliation: Option<ReconciliationReport>,
                      reason: &str,
                      error: Option<VeriteError>| CycleReport {
            states,
            outcome,
            reconciliation,
            reason: reason.to_string(),
            error: error.map(|e| e.to_string()),
            elapsed_ms: raw.elapsed.as_millis() as u64,
            kept_workspace: raw.kept_workspace.clone(),
        };

        match (raw.status, failure) {
            (RunStatus::CompileFailure | RunStatus::Timeout, Some(err)) => {
                states.push(if raw.status == RunStatus::Timeout {
                    CycleState::TimedOut
                } else {
                    CycleState::CompileFailed
                });
                let reason = err.reason();
                return Ok(report(states, outcome, None, reason, Some(err)));
            }
            (_, failure) => {
                states.push(CycleState::Executed);
                if !outcome.executed_successfully {
                    states.push(CycleState::Reverted);
                    let err = match failure {
                        Some(e) if outcome.reason.as_deref() == Some(e.reason()) => e,
                        _ => VeriteError::ExecutionRevert {
                            reason: outcome
                                .revert_reason
                                .clone()
                                .unwrap_or_else(|| "reverted without a reason string".into()),
                        },
                    };
                    let reason = err.reason();
                    return Ok(report(states, outcome, None, reason, Some(err)));
                }
            }
        }
        states.push(CycleState::Succeeded);

        let base = self.config.base_currency(chain_id);
        let changes = reconcilable_changes(&outcome, &base, chain_id, &balances);
        let reconciliation = self
            .reconciler
            .reconcile(&changes, &base, chain_id, Some(fork_block))
            .await;
        states.push(CycleState::Reconciled);
        states.push(CycleState::ComplianceChecked);

        outcome.profitable = reconciliation.profitable;
        let (state, reason) = if reconciliation.profitable {
            (CycleState::Profitable, "profitable")
        } else {
            (CycleState::NotProfitable, "not_profitable")
        };
        states.push(state);

        tracing::info!(
            chain_id,
            fork_block,
            reason,
            total_base = reconciliation.total_base,
            compliant = reconciliation.compliance.compliant,
            "Verification cycle finished"
        );
        Ok(report(states, outcome, Some(reconciliation), reason, raw.to_error(timeout)))
    }
}

/// Balance changes to reconcile. Falls back to the base-currency delta when
/// the harness reported no per-asset markers, and adds target-token
/// extraction unless the target is already tracked as a provisioned asset.
fn reconcilable_changes(
    outcome: &ExecutionOutcome,
    base: &str,
    chain_id: u64,
    balances: &BTreeMap<String, u64>,
) -> Vec<BalanceChange> {
    let mut changes = outcome.balance_changes.clone();
    if changes.is_empty() && outcome.base_gained != 0.0 {
        let start = balances
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(base))
            .map_or(0.0, |(_, v)| *v as f64);
        changes.push(BalanceChange::new(base, start, start + outcome.base_gained));
    }
    for (token, amount) in &outcome.tokens_extracted {
        let info = tokens::resolve(chain_id, token);
        let name = if info.is_known() { info.symbol } else { token.clone() };
        let tracked = changes
            .iter()
            .any(|c| c.token.eq_ignore_ascii_case(token) || c.token.eq_ignore_ascii_case(&name));
        if tracked {
            tracing::debug!(token = %name, "Target extraction already covered by asset markers");
            continue;
        }
        changes.push(BalanceChange::new(name, 0.0, *amount));
    }
    changes
}
