// src/harness/markers.rs: Line protocol between the generated scaffold and the parser
//
// Every measured quantity is printed as `KEY: value` on its own line. Keys
// are fixed; bump HARNESS_VERSION when any of them changes.

pub const HARNESS_VERSION: &str = "HARNESS_VERSION";
pub const CURRENT_VERSION: u32 = 1;

pub const EXPLOIT_CONTRACT_ADDRESS: &str = "EXPLOIT_CONTRACT_ADDRESS";
pub const TARGET_ADDRESS: &str = "TARGET_ADDRESS";

pub const EXPLOIT_EXECUTED_SUCCESSFULLY: &str = "EXPLOIT_EXECUTED_SUCCESSFULLY";
pub const EXPLOIT_FAILED_REASON: &str = "EXPLOIT_FAILED_REASON";
pub const GAS_USED: &str = "GAS_USED";

/// Signed base-currency delta of the candidate, in wei.
pub const ETH_GAINED: &str = "ETH_GAINED";
/// Non-base surplus valued in base-currency wei by the scaffold.
pub const ETH_FROM_TOKENS: &str = "ETH_FROM_TOKENS";
/// ETH_GAINED + ETH_FROM_TOKENS, computed once in the scaffold.
pub const VALUE_EXTRACTED: &str = "VALUE_EXTRACTED";

pub const INITIAL_TOKEN_BALANCE: &str = "INITIAL_TOKEN_BALANCE";
pub const FINAL_TOKEN_BALANCE: &str = "FINAL_TOKEN_BALANCE";
pub const TOKENS_EXTRACTED: &str = "TOKENS_EXTRACTED";
pub const TOKEN_DECIMALS: &str = "TOKEN_DECIMALS";

pub const EXPLOIT_CAUSED_STATE_CHANGES: &str = "EXPLOIT_CAUSED_STATE_CHANGES";

/// Target storage slots compared before and after the call.
pub const MONITORED_SLOTS: [u32; 4] = [0, 2, 3, 4];

pub const ASSET_INITIAL_PREFIX: &str = "ASSET_INITIAL_";
pub const ASSET_FINAL_PREFIX: &str = "ASSET_FINAL_";
pub const ASSET_DECIMALS_PREFIX: &str = "ASSET_DECIMALS_";

pub fn storage_slot_changed(slot: u32) -> String {
    format!("STORAGE_SLOT_CHANGED_{slot}")
}

pub fn asset_initial(symbol: &str) -> String {
    format!("{ASSET_INITIAL_PREFIX}{}", symbol.to_ascii_uppercase())
}

pub fn asset_final(symbol: &str) -> String {
    format!("{ASSET_FINAL_PREFIX}{}", symbol.to_ascii_uppercase())
}

pub fn asset_decimals(symbol: &str) -> String {
    format!("{ASSET_DECIMALS_PREFIX}{}", symbol.to_ascii_uppercase())
}

/// Split a marker line into (key, value). The key must be the whole text
/// before the first `": "`, after trimming.
pub fn split_marker(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.trim().split_once(": ")?;
    let valid = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');
    valid.then(|| (key, value.trim()))
}
