// src/harness/parser.rs: Marker lines to ExecutionOutcome
//
// Only lines whose trimmed text is exactly `KEY: value` for a known key are
// read. Free-form forge output is ignored except for the deployed-address
// fallback.

use std::collections::{BTreeMap, HashMap};

use super::checksum::is_address;
use super::markers::{self, split_marker};
use super::runner::{RawOutput, RunStatus};
use super::ExecutionOutcome;
use crate::pricing::tokens::ZERO_ADDRESS;
use crate::reconcile::BalanceChange;

const DEFAULT_DECIMALS: u32 = 18;

/// Known marker values, keyed by marker name. Later lines win.
fn collect_markers(output: &str) -> HashMap<&str, &str> {
    output.lines().filter_map(split_marker).collect()
}

/// Integer marker value in raw units. Accepts signed values.
fn raw_amount(value: &str) -> Option<f64> {
    value
        .parse::<i128>()
        .map(|v| v as f64)
        .ok()
        .or_else(|| value.parse::<f64>().ok())
}

fn normalize(raw: f64, decimals: u32) -> f64 {
    raw / 10f64.powi(decimals as i32)
}

fn decimals_of(found: &HashMap<&str, &str>, key: &str) -> u32 {
    found
        .get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(DEFAULT_DECIMALS)
}

fn flag(found: &HashMap<&str, &str>, key: &str) -> bool {
    found.get(key).is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Every standalone 0x-prefixed 20-byte hex string in `output`, in order.
fn addresses(output: &str) -> impl Iterator<Item = &str> {
    let bytes = output.as_bytes();
    (0..bytes.len().saturating_sub(41)).filter_map(move |i| {
        let candidate = output.get(i..i + 42)?;
        let before_ok = i == 0 || !bytes[i - 1].is_ascii_alphanumeric();
        let after_ok = !matches!(bytes.get(i + 42), Some(b) if b.is_ascii_hexdigit());
        (before_ok && after_ok && is_address(candidate)).then_some(candidate)
    })
}

fn balance_changes(found: &HashMap<&str, &str>) -> Vec<BalanceChange> {
    let mut symbols: Vec<&str> = found
        .keys()
        .filter_map(|k| k.strip_prefix(markers::ASSET_INITIAL_PREFIX))
        .collect();
    symbols.sort_unstable();

    symbols
        .into_iter()
        .filter_map(|sym| {
            let initial = raw_amount(found.get(markers::asset_initial(sym).as_str())?)?;
            let fin = raw_amount(found.get(markers::asset_final(sym).as_str())?)?;
            let decimals = decimals_of(found, &markers::asset_decimals(sym));
            Some(BalanceChange::new(
                sym,
                normalize(initial, decimals),
                normalize(fin, decimals),
            ))
        })
        .collect()
}

pub fn parse(raw: &RawOutput, target: &str) -> ExecutionOutcome {
    let found = collect_markers(&raw.output);
    let compiled = raw.status != RunStatus::CompileFailure;

    let gas_used = found
        .get(markers::GAS_USED)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let base_gained_wei = match found.get(markers::VALUE_EXTRACTED).and_then(|v| raw_amount(v)) {
        Some(v) => v,
        None => {
            let gained = found.get(markers::ETH_GAINED).and_then(|v| raw_amount(v)).unwrap_or(0.0);
            let from_tokens = found
                .get(markers::ETH_FROM_TOKENS)
                .and_then(|v| raw_amount(v))
                .unwrap_or(0.0);
            gained + from_tokens
        }
    };
    let base_gained = normalize(base_gained_wei, DEFAULT_DECIMALS);

    let mut tokens_extracted = BTreeMap::new();
    if let Some(amount) = found.get(markers::TOKENS_EXTRACTED).and_then(|v| raw_amount(v)) {
        let decimals = decimals_of(&found, markers::TOKEN_DECIMALS);
        if amount > 0.0 {
            tokens_extracted.insert(target.to_string(), normalize(amount, decimals));
        }
    }

    let storage_changed = flag(&found, markers::EXPLOIT_CAUSED_STATE_CHANGES)
        || markers::MONITORED_SLOTS
            .iter()
            .any(|s| flag(&found, &markers::storage_slot_changed(*s)));

    let call_succeeded = flag(&found, markers::EXPLOIT_EXECUTED_SUCCESSFULLY);
    let revert_reason = found
        .get(markers::EXPLOIT_FAILED_REASON)
        .map(|s| s.to_string());

    let deployed_address = found
        .get(markers::EXPLOIT_CONTRACT_ADDRESS)
        .filter(|a| is_address(a))
        .map(|a| a.to_string())
        .or_else(|| {
            addresses(&raw.output)
                .find(|a| !a.eq_ignore_ascii_case(target) && !a.eq_ignore_ascii_case(ZERO_ADDRESS))
                .map(String::from)
        });

    let extracted_anything = base_gained > 0.0 || tokens_extracted.values().any(|v| *v > 0.0);
    let executed_successfully = compiled && (call_succeeded || storage_changed || extracted_anything);

    let reason = match raw.status {
        RunStatus::CompileFailure => Some("compile_failure"),
        RunStatus::Timeout => Some("execution_timeout"),
        RunStatus::ProcessError if found.is_empty() => Some("process_error"),
        _ if !executed_successfully && revert_reason.is_some() => Some("execution_revert"),
        _ => None,
    };

    ExecutionOutcome {
        compiled,
        executed_successfully,
        profitable: false,
        gas_used,
        base_gained,
        tokens_extracted,
        balance_changes: balance_changes(&found),
        storage_changed,
        revert_reason,
        deployed_address,
        harness_version: found
            .get(markers::HARNESS_VERSION)
            .and_then(|v| v.parse().ok()),
        status: raw.status,
        reason: reason.map(String::from),
    }
}
