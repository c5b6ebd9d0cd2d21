// tests/validation_test.rs: Integration test: balance invariants and compliance

use pretty_assertions::assert_eq;

use verite::reconcile::validator::required_provisioning;
use verite::reconcile::{BalanceChange, Validator, ViolationKind};

#[test]
fn test_depletion_on_any_chain() {
    for chain in [1u64, 56, 43114, 10] {
        let (ok, violations) =
            Validator::new().validate(&[BalanceChange::new("X", 100.0, 0.0)], chain);
        assert!(!ok);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Depletion);
        assert_eq!(violations[0].violation_amount, 100.0);
    }
}

#[test]
fn test_negative_balance_reported_with_depletion() {
    let (_, violations) = Validator::new().validate(&[BalanceChange::new("Y", 10.0, -5.0)], 1);
    let negative: Vec<_> = violations
        .iter()
        .filter(|v| v.kind == ViolationKind::NegativeBalance)
        .collect();
    assert_eq!(negative.len(), 1);
    assert_eq!(negative[0].violation_amount, 5.0);
    assert!(violations.iter().any(|v| v.kind == ViolationKind::Depletion));
}

#[test]
fn test_compliance_pass_uses_provisioning_table() {
    let changes = vec![
        BalanceChange::new("BNB", 100_000.0, 100_010.0),
        BalanceChange::new("BUSD", 10_000_000.0, 9_999_000.0),
        BalanceChange::new("CAKE", 0.0, 50.0),
    ];
    let report = Validator::new().compliance_report(&changes, 56);
    assert!(!report.compliant);
    assert_eq!(report.count(ViolationKind::Depletion), 1);
    assert_eq!(report.count(ViolationKind::InsufficientProvisioning), 1);
    let short = report
        .violations
        .iter()
        .find(|v| v.kind == ViolationKind::InsufficientProvisioning)
        .unwrap();
    assert_eq!(short.token, "BUSD");
    assert_eq!(short.violation_amount, 1_000.0);
    assert_eq!(required_provisioning(56, "CAKE"), None);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["violations"][0]["kind"], "depletion");
    assert_eq!(json["counts"]["insufficient_provisioning"], 1);
}
