// src/pricing/blocks.rs: Block number to timestamp estimation
//
// Used when no RPC endpoint can report a block's timestamp. Anchored on a
// known recent block per chain and the chain's average block time.

/// (reference block, its unix timestamp, average block seconds)
fn anchor(chain_id: u64) -> Option<(u64, i64, i64)> {
    match chain_id {
        1 => Some((21_000_000, 1_729_611_000, 12)),
        56 => Some((45_000_000, 1_735_000_000, 3)),
        43114 => Some((55_000_000, 1_735_000_000, 2)),
        _ => None,
    }
}

/// Estimated unix timestamp of `block`, clamped to `[0, now]`.
pub fn estimate_timestamp(chain_id: u64, block: u64, now: i64) -> i64 {
    let Some((ref_block, ref_ts, block_time)) = anchor(chain_id) else {
        return now;
    };
    let delta = block as i64 - ref_block as i64;
    (ref_ts + delta * block_time).clamp(0, now)
}

/// `DD-MM-YYYY` as the CoinGecko history endpoint expects.
pub fn history_date(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .format("%d-%m-%Y")
        .to_string()
}
