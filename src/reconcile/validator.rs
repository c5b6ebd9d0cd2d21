// src/reconcile/validator.rs: Balance invariant and provisioning checks
//
// Two passes over the same balance changes. The invariant pass flags any
// asset whose final balance is below its initial balance or below zero. The
// compliance pass compares final balances against the fixed provisioning
// table and works out the starting balances a replay would need. Violations
// are reported, never corrected.

use serde::Serialize;
use std::collections::BTreeMap;

use super::BalanceChange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Depletion,
    NegativeBalance,
    InsufficientProvisioning,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::Depletion => "depletion",
            ViolationKind::NegativeBalance => "negative_balance",
            ViolationKind::InsufficientProvisioning => "insufficient_provisioning",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvariantViolation {
    pub token: String,
    pub initial: f64,
    #[serde(rename = "final")]
    pub final_balance: f64,
    pub violation_amount: f64,
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ComplianceReport {
    pub compliant: bool,
    pub violations: Vec<InvariantViolation>,
    pub counts: BTreeMap<String, usize>,
    pub suggestions: Vec<String>,
    /// Starting balance each spent asset needs, with headroom.
    pub minimum_balances: BTreeMap<String, f64>,
}

impl ComplianceReport {
    pub fn count(&self, kind: ViolationKind) -> usize {
        self.counts.get(kind.as_str()).copied().unwrap_or(0)
    }
}

/// Minimum whole-token balance each asset must keep, per chain.
pub fn required_provisioning(chain_id: u64, symbol: &str) -> Option<f64> {
    let sym = symbol.to_ascii_uppercase();
    let amount = match (chain_id, sym.as_str()) {
        (1, "ETH" | "WETH") => 100_000.0,
        (1, "USDC" | "USDT" | "DAI") => 10_000_000.0,
        (56, "BNB" | "WBNB") => 100_000.0,
        (56, "USDT" | "BUSD") => 10_000_000.0,
        _ => return None,
    };
    Some(amount)
}

/// Headroom on top of the amount an execution spent.
const MINIMUM_BALANCE_BUFFER: f64 = 1.1;

fn violation(change: &BalanceChange, amount: f64, kind: ViolationKind) -> InvariantViolation {
    InvariantViolation {
        token: change.token.clone(),
        initial: change.initial,
        final_balance: change.final_balance,
        violation_amount: amount,
        kind,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Core balance invariants. `chain_id` is accepted for symmetry with the
    /// compliance pass; the checks themselves are chain independent.
    pub fn validate(&self, changes: &[BalanceChange], _chain_id: u64) -> (bool, Vec<InvariantViolation>) {
        let mut violations = Vec::new();
        for change in changes {
            if change.is_deficit() {
                violations.push(violation(
                    change,
                    change.initial - change.final_balance,
                    ViolationKind::Depletion,
                ));
            }
            if change.final_balance < 0.0 {
                violations.push(violation(
                    change,
                    -change.final_balance,
                    ViolationKind::NegativeBalance,
                ));
            }
        }
        (violations.is_empty(), violations)
    }

    /// Final balances against the provisioning table. Assets without an
    /// entry are not checked.
    pub fn check_provisioning(&self, changes: &[BalanceChange], chain_id: u64) -> Vec<InvariantViolation> {
        changes
            .iter()
            .filter_map(|change| {
                let required = required_provisioning(chain_id, &change.token)?;
                (change.final_balance < required).then(|| {
                    violation(
                        change,
                        required - change.final_balance,
                        ViolationKind::InsufficientProvisioning,
                    )
                })
            })
            .collect()
    }

    /// Smallest starting balance per spent asset that covers what the
    /// execution used, plus a 10% buffer. Assets that were not spent are
    /// absent.
    pub fn minimum_required_balances(&self, changes: &[BalanceChange]) -> BTreeMap<String, f64> {
        changes
            .iter()
            .filter(|c| c.is_deficit())
            .map(|c| (c.token.clone(), -c.net * MINIMUM_BALANCE_BUFFER))
            .collect()
    }

    pub fn compliance_report(&self, changes: &[BalanceChange], chain_id: u64) -> ComplianceReport {
        let (_, mut violations) = self.validate(changes, chain_id);
        violations.extend(self.check_provisioning(changes, chain_id));

        let mut counts = BTreeMap::new();
        for v in &violations {
            *counts.entry(v.kind.as_str().to_string()).or_insert(0) += 1;
        }

        let suggestions = violations.iter().map(suggestion).collect();
        if !violations.is_empty() {
            tracing::info!(
                chain_id,
                violations = violations.len(),
                "Balance compliance check found violations"
            );
        }

        ComplianceReport {
            compliant: violations.is_empty(),
            violations,
            counts,
            suggestions,
            minimum_balances: self.minimum_required_balances(changes),
        }
    }
}

fn suggestion(v: &InvariantViolation) -> String {
    match v.kind {
        ViolationKind::Depletion => format!(
            "Strategy drains {} by {:.6} below its starting balance; profit may be borrowed from the provisioning",
            v.token, v.violation_amount
        ),
        ViolationKind::NegativeBalance => format!(
            "{} ends at a negative balance ({:.6}); check the candidate's accounting",
            v.token, v.final_balance
        ),
        ViolationKind::InsufficientProvisioning => format!(
            "Raise provisioning for {} by at least {:.6} or stop the strategy spending it",
            v.token, v.violation_amount
        ),
    }
}
