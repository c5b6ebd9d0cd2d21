// src/harness/mod.rs: Candidate verification harness
//
// synthesizer -> runner -> parser. The synthesizer produces a Foundry project,
// the runner executes it against a forked chain, and the parser turns the
// marker lines it prints into an ExecutionOutcome.

pub mod checksum;
pub mod cleaner;
pub mod markers;
pub mod parser;
pub mod runner;
pub mod synthesizer;

use serde::Serialize;
use std::collections::BTreeMap;

use crate::reconcile::BalanceChange;

pub use runner::{HarnessRunner, RawOutput, RunStatus};
pub use synthesizer::{HarnessProject, Synthesizer};

/// Everything one harness run measured. Produced once per run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub compiled: bool,
    pub executed_successfully: bool,
    /// Filled in by the verification pipeline after reconciliation.
    pub profitable: bool,
    pub gas_used: u64,
    /// Base-currency units, signed.
    pub base_gained: f64,
    /// Whole-token amounts keyed by token address.
    pub tokens_extracted: BTreeMap<String, f64>,
    pub balance_changes: Vec<BalanceChange>,
    pub storage_changed: bool,
    pub revert_reason: Option<String>,
    pub deployed_address: Option<String>,
    pub harness_version: Option<u32>,
    pub status: RunStatus,
    /// Machine-readable reason when the run did not execute cleanly.
    pub reason: Option<String>,
}

impl ExecutionOutcome {
    /// Outcome for a cycle that never reached the runner.
    pub fn not_run(reason: impl Into<String>) -> Self {
        Self {
            compiled: false,
            executed_successfully: false,
            profitable: false,
            gas_used: 0,
            base_gained: 0.0,
            tokens_extracted: BTreeMap::new(),
            balance_changes: Vec::new(),
            storage_changed: false,
            revert_reason: None,
            deployed_address: None,
            harness_version: None,
            status: RunStatus::ProcessError,
            reason: Some(reason.into()),
        }
    }
}
