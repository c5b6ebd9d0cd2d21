// src/tools/liquidity.rs: Constant-product pool analysis
//
// Works purely on reserves supplied by the caller: liquidity depth, price
// impact of a trade, capital needed to push the price by a target amount,
// and price gaps between pools quoting the same token.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{str_param, Capability, ParamType, Params, ToolParameter, ToolResult};
use crate::infra::errors::VeriteError;

/// Price gap between two pools that counts as an arbitrage candidate.
const ARBITRAGE_GAP: f64 = 0.01;

/// Uniswap V2 style swap fee.
const DEFAULT_FEE: f64 = 0.003;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub address: String,
    pub token0: String,
    pub token1: String,
    /// Whole-token reserves.
    pub reserve0: f64,
    pub reserve1: f64,
    #[serde(default)]
    pub dex: Option<String>,
}

impl Pool {
    /// Geometric mean of reserves.
    pub fn depth(&self) -> f64 {
        (self.reserve0 * self.reserve1).sqrt()
    }

    fn holds(&self, token: &str) -> bool {
        self.token0.eq_ignore_ascii_case(token) || self.token1.eq_ignore_ascii_case(token)
    }

    /// (target reserve, paired reserve) for `token`.
    fn sides(&self, token: &str) -> Option<(f64, f64)> {
        if self.token0.eq_ignore_ascii_case(token) {
            Some((self.reserve0, self.reserve1))
        } else if self.token1.eq_ignore_ascii_case(token) {
            Some((self.reserve1, self.reserve0))
        } else {
            None
        }
    }

    /// Price of `token` in units of the paired token.
    pub fn price_of(&self, token: &str) -> Option<f64> {
        let (target, paired) = self.sides(token)?;
        if target <= 0.0 || paired <= 0.0 {
            return None;
        }
        Some(paired / target)
    }
}

pub fn amount_out(amount_in: f64, reserve_in: f64, reserve_out: f64, fee: f64) -> f64 {
    let effective = amount_in * (1.0 - fee);
    let denom = reserve_in + effective;
    if denom <= 0.0 {
        return 0.0;
    }
    effective * reserve_out / denom
}

/// Fraction by which the execution price falls short of the spot price.
pub fn price_impact(amount_in: f64, reserve_in: f64, reserve_out: f64) -> f64 {
    if amount_in <= 0.0 || reserve_in <= 0.0 || reserve_out <= 0.0 {
        return 0.0;
    }
    let spot = reserve_out / reserve_in;
    let executed = amount_out(amount_in, reserve_in, reserve_out, 0.0) / amount_in;
    1.0 - executed / spot
}

/// Paired-token input needed to move the price of the target by `impact`.
pub fn capital_for_impact(paired_reserve: f64, impact: f64) -> f64 {
    paired_reserve * impact / (1.0 + impact)
}

pub struct LiquidityAnalyzer;

impl LiquidityAnalyzer {
    fn parse_pools(params: &Params) -> Result<Vec<Pool>, VeriteError> {
        let raw = params
            .get("pools")
            .cloned()
            .ok_or_else(|| VeriteError::invalid_param("pools", "missing"))?;
        serde_json::from_value(raw).map_err(|e| VeriteError::invalid_param("pools", e.to_string()))
    }
}

#[async_trait]
impl Capability for LiquidityAnalyzer {
    fn name(&self) -> &str {
        "dex_liquidity_analyzer"
    }

    fn description(&self) -> &str {
        "Analyzes constant-product DEX pools for a token: liquidity depth, price impact of a trade, capital needed for a target price move, and cross-pool arbitrage gaps"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("target_token", ParamType::String, "Token to analyze"),
            ToolParameter::required(
                "pools",
                ParamType::Array,
                "Pools as objects {address, token0, token1, reserve0, reserve1, dex}",
            ),
            ToolParameter::optional(
                "trade_size",
                ParamType::Number,
                "Paired-token amount to simulate swapping into the target",
            ),
            ToolParameter::optional(
                "target_price_impact",
                ParamType::Number,
                "Desired price move as a fraction (0.1 = 10%)",
            )
            .with_default(json!(0.1)),
            ToolParameter::optional(
                "capital_available",
                ParamType::Number,
                "Capital ceiling for manipulation candidates",
            ),
        ]
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, VeriteError> {
        let target = str_param(params, "target_token")?;
        let pools: Vec<Pool> = Self::parse_pools(params)?
            .into_iter()
            .filter(|p| p.holds(target))
            .collect();
        if pools.is_empty() {
            return Ok(ToolResult::failure(
                self.name(),
                format!("No pools quote {target}"),
            ));
        }

        let impact = params
            .get("target_price_impact")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.1);
        let capital = params
            .get("capital_available")
            .and_then(|v| v.as_f64())
            .unwrap_or(f64::INFINITY);
        let trade_size = params.get("trade_size").and_then(|v| v.as_f64());

        let total_depth: f64 = pools.iter().map(Pool::depth).sum();
        let deepest = pools
            .iter()
            .max_by(|a, b| a.depth().total_cmp(&b.depth()));

        let mut manipulation: Vec<_> = pools
            .iter()
            .filter_map(|p| {
                let (_, paired) = p.sides(target)?;
                let required = capital_for_impact(paired, impact);
                (required <= capital).then(|| {
                    json!({
                        "pool": p.address,
                        "dex": p.dex,
                        "required_capital": required,
                        "price_impact": impact,
                    })
                })
            })
            .collect();
        manipulation.sort_by(|a, b| {
            let ra = a["required_capital"].as_f64().unwrap_or(f64::MAX);
            let rb = b["required_capital"].as_f64().unwrap_or(f64::MAX);
            ra.total_cmp(&rb)
        });

        let mut arbitrage = Vec::new();
        for (i, a) in pools.iter().enumerate() {
            for b in &pools[i + 1..] {
                let (Some(pa), Some(pb)) = (a.price_of(target), b.price_of(target)) else {
                    continue;
                };
                let gap = (pa - pb).abs() / pa.min(pb);
                if gap > ARBITRAGE_GAP {
                    let (buy, sell) = if pa < pb { (a, b) } else { (b, a) };
                    arbitrage.push(json!({
                        "buy_pool": buy.address,
                        "sell_pool": sell.address,
                        "price_difference_percent": gap * 100.0,
                    }));
                }
            }
        }

        let trades: Vec<_> = match trade_size {
            Some(size) => pools
                .iter()
                .filter_map(|p| {
                    let (target_reserve, paired) = p.sides(target)?;
                    Some(json!({
                        "pool": p.address,
                        "amount_in": size,
                        "amount_out": amount_out(size, paired, target_reserve, DEFAULT_FEE),
                        "price_impact": price_impact(size, paired, target_reserve),
                    }))
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(ToolResult::ok(
            self.name(),
            json!({
                "target_token": target,
                "total_pools": pools.len(),
                "total_liquidity": total_depth,
                "deepest_pool": deepest.map(|p| json!({
                    "address": p.address,
                    "liquidity": p.depth(),
                    "dex": p.dex,
                })),
                "manipulation_candidates": manipulation,
                "arbitrage_candidates": arbitrage,
                "trade_simulation": trades,
            }),
        ))
    }
}
