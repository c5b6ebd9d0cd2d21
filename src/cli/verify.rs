// src/cli/verify.rs: `verite verify`

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::infra::config::Config;
use crate::pricing::oracle::PricingOracle;
use crate::verify::{CycleReport, Verifier};

pub async fn run_verify(
    config: Arc<Config>,
    candidate_path: &Path,
    target: &str,
    chain_id: u64,
    fork_block: u64,
    balances: &[(String, u64)],
    json: bool,
) -> anyhow::Result<()> {
    let candidate = std::fs::read_to_string(candidate_path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", candidate_path.display()))?;
    let initial: BTreeMap<String, u64> = balances.iter().cloned().collect();

    let oracle = Arc::new(PricingOracle::new(&config)?);
    let verifier = Verifier::new(config, oracle);
    let report = verifier
        .run_cycle(&candidate, target, chain_id, fork_block, &initial)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &CycleReport) {
    let o = &report.outcome;
    println!("Result:    {}", report.reason);
    println!(
        "States:    {}",
        report
            .states
            .iter()
            .map(|s| format!("{s:?}"))
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    println!("Compiled:  {}", o.compiled);
    println!("Executed:  {}", o.executed_successfully);
    println!("Gas used:  {}", o.gas_used);
    println!("Gained:    {:.6} (base currency)", o.base_gained);
    if let Some(addr) = &o.deployed_address {
        println!("Deployed:  {addr}");
    }
    if let Some(reason) = &o.revert_reason {
        println!("Revert:    {reason}");
    }
    if let Some(err) = &report.error {
        println!();
        println!("{err}");
    }

    if let Some(r) = &report.reconciliation {
        println!();
        println!("Profit:    {:.6} {}", r.total_base, r.base_currency);
        if let Some(usd) = r.total_usd {
            println!("           ${usd:.2}");
        }
        for c in &r.surplus_conversions {
            let rate = c.rate.map_or("n/a".to_string(), |v| format!("{v:.8}"));
            println!("  + {} {:.6} @ {rate} = {:.6}", c.token, c.amount, c.base_value);
        }
        for d in &r.deficit_resolutions {
            println!("  - {} {:.6} (cost {:.6})", d.token, d.amount, d.acquisition_cost);
        }
        if r.low_confidence {
            println!("  low-confidence pricing: {}", r.low_confidence_tokens().join(", "));
        }
        if !r.compliance.compliant {
            println!();
            println!("Compliance violations:");
            for s in &r.compliance.suggestions {
                println!("  - {s}");
            }
            for (token, min) in &r.compliance.minimum_balances {
                println!("  start with at least {min:.6} {token}");
            }
        }
    }
    if let Some(path) = &report.kept_workspace {
        println!();
        println!("Workspace kept at {}", path.display());
    }
}
