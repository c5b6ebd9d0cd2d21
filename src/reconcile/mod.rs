// src/reconcile/mod.rs: Balance changes, profit reconciliation and invariant checks

pub mod reconciler;
pub mod validator;

use serde::{Deserialize, Serialize};

/// Pre/post balance of one asset for one execution, in whole-token units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub token: String,
    pub initial: f64,
    #[serde(rename = "final")]
    pub final_balance: f64,
    pub net: f64,
    pub surplus: bool,
}

impl BalanceChange {
    pub fn new(token: impl Into<String>, initial: f64, final_balance: f64) -> Self {
        Self {
            token: token.into(),
            initial,
            final_balance,
            net: final_balance - initial,
            surplus: final_balance > initial,
        }
    }

    pub fn is_deficit(&self) -> bool {
        self.final_balance < self.initial
    }
}

pub use reconciler::{ReconciliationReport, Reconciler};
pub use validator::{ComplianceReport, InvariantViolation, Validator, ViolationKind};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_fields() {
        let up = BalanceChange::new("USDC", 100.0, 150.0);
        assert_eq!(up.net, 50.0);
        assert!(up.surplus);
        let down = BalanceChange::new("USDC", 100.0, 40.0);
        assert!(!down.surplus);
        assert!(down.is_deficit());
        let flat = BalanceChange::new("DAI", 5.0, 5.0);
        assert!(!flat.surplus && !flat.is_deficit());
    }

    #[test]
    fn test_serializes_final_key() {
        let v = serde_json::to_value(BalanceChange::new("ETH", 1.0, 2.0)).unwrap();
        assert_eq!(v["final"], 2.0);
    }
}
