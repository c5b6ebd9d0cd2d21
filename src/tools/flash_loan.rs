// src/tools/flash_loan.rs: Flash loan provider selection and cost planning
//
// Given a token and amount, pick the cheapest provider that supports it and
// report the fee, the minimum profit a strategy must clear, and the callback
// the borrowing contract has to implement.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use super::{f64_param, str_param, u64_param, Capability, ParamType, Params, ToolParameter, ToolResult};
use crate::infra::errors::VeriteError;
use crate::pricing::tokens;

/// Gas allowance (in base currency) added on top of the fee.
const GAS_BUFFER_BASE: f64 = 0.001;

#[derive(Debug, Clone, Serialize)]
pub struct FlashLoanProvider {
    pub id: &'static str,
    pub name: &'static str,
    pub address: &'static str,
    pub chain_id: u64,
    /// Fee as a fraction of the borrowed amount.
    pub fee_rate: f64,
    /// Whole-token borrowing ceilings.
    pub max_amount: &'static [(&'static str, f64)],
    pub supported_tokens: &'static [&'static str],
    pub callback: &'static str,
}

impl FlashLoanProvider {
    pub fn supports(&self, symbol: &str) -> bool {
        self.supported_tokens
            .iter()
            .any(|s| s.eq_ignore_ascii_case(symbol))
    }

    pub fn max_for(&self, symbol: &str) -> Option<f64> {
        self.max_amount
            .iter()
            .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
            .map(|(_, m)| *m)
    }

    fn largest_ceiling(&self) -> f64 {
        self.max_amount.iter().map(|(_, m)| *m).fold(0.0, f64::max)
    }
}

const MAINNET_PROVIDERS: &[FlashLoanProvider] = &[
    FlashLoanProvider {
        id: "aave_v3",
        name: "Aave V3",
        address: "0x87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2",
        chain_id: 1,
        fee_rate: 0.0009,
        max_amount: &[
            ("WETH", 1e6),
            ("USDC", 1e9),
            ("USDT", 1e9),
            ("DAI", 1e9),
            ("WBTC", 1e4),
        ],
        supported_tokens: &["WETH", "USDC", "USDT", "DAI", "WBTC", "LINK", "UNI"],
        callback: "executeOperation(address,uint256,uint256,address,bytes)",
    },
    FlashLoanProvider {
        id: "balancer",
        name: "Balancer Vault",
        address: "0xBA12222222228d8Ba445958a75a0704d566BF2C8",
        chain_id: 1,
        fee_rate: 0.0,
        max_amount: &[
            ("WETH", 1e6),
            ("USDC", 1e9),
            ("USDT", 1e9),
            ("DAI", 1e9),
            ("WBTC", 1e4),
        ],
        supported_tokens: &["WETH", "USDC", "USDT", "DAI", "WBTC", "BAL"],
        callback: "receiveFlashLoan(address[],uint256[],uint256[],bytes)",
    },
    FlashLoanProvider {
        id: "dydx",
        name: "dYdX Solo Margin",
        address: "0x1E0447b19BB6EcFdAe1e4AE1694b0C3659614e4e",
        chain_id: 1,
        fee_rate: 0.0,
        max_amount: &[("WETH", 1e5), ("USDC", 1e8), ("DAI", 1e8)],
        supported_tokens: &["WETH", "USDC", "DAI"],
        callback: "callFunction(address,(address,uint256),bytes)",
    },
];

const BSC_PROVIDERS: &[FlashLoanProvider] = &[FlashLoanProvider {
    id: "pancake_v3",
    name: "PancakeSwap V3",
    address: "0x1b81D678ffb9C0263b24A97847620C99d213eB14",
    chain_id: 56,
    fee_rate: 0.0005,
    max_amount: &[("WBNB", 1e5), ("USDT", 1e8), ("BUSD", 1e8)],
    supported_tokens: &["WBNB", "USDT", "BUSD", "CAKE"],
    callback: "pancakeV3FlashCallback(uint256,uint256,bytes)",
}];

pub fn providers(chain_id: u64) -> &'static [FlashLoanProvider] {
    match chain_id {
        1 => MAINNET_PROVIDERS,
        56 => BSC_PROVIDERS,
        _ => &[],
    }
}

/// Cheapest provider that supports `symbol` and can lend `amount`.
/// Ties keep the first listed provider.
pub fn best_provider(chain_id: u64, symbol: &str, amount: f64) -> Option<&'static FlashLoanProvider> {
    providers(chain_id)
        .iter()
        .filter(|p| p.supports(symbol))
        .filter(|p| p.max_for(symbol).map_or(true, |max| amount <= max))
        .fold(None, |best: Option<&FlashLoanProvider>, p| match best {
            Some(b) if b.fee_rate <= p.fee_rate => Some(b),
            _ => Some(p),
        })
}

/// Largest whole-token amount worth borrowing at `expected_profit_rate`.
/// Fee-free providers allow their full ceiling; otherwise a tenth of it,
/// and nothing when the fee eats the expected return.
pub fn max_profitable_amount(provider: &FlashLoanProvider, expected_profit_rate: f64) -> f64 {
    let ceiling = provider.largest_ceiling();
    if provider.fee_rate == 0.0 {
        return ceiling;
    }
    if expected_profit_rate <= provider.fee_rate {
        return 0.0;
    }
    ceiling * 0.1
}

pub struct FlashLoanPlanner;

#[async_trait]
impl Capability for FlashLoanPlanner {
    fn name(&self) -> &str {
        "flash_loan_planner"
    }

    fn description(&self) -> &str {
        "Finds the cheapest flash loan provider (Aave, Balancer, dYdX, PancakeSwap) for a token and amount, and reports fees, the minimum profit needed, and the required callback"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required(
                "target_contract",
                ParamType::String,
                "Address of the contract the borrowed capital is used against",
            ),
            ToolParameter::optional("chain_id", ParamType::Integer, "Chain id (1 or 56)")
                .with_default(json!(1))
                .with_enum([1, 56]),
            ToolParameter::optional(
                "token_needed",
                ParamType::String,
                "Token symbol to borrow (WETH, USDC, WBNB, ...)",
            )
            .with_default(json!("WETH")),
            ToolParameter::optional(
                "amount_needed",
                ParamType::Number,
                "Whole-token amount to borrow (e.g. 100 for 100 WETH)",
            )
            .with_default(json!(1.0)),
            ToolParameter::optional(
                "expected_profit_rate",
                ParamType::Number,
                "Expected return as a fraction of the borrowed amount",
            ),
        ]
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, VeriteError> {
        let target = str_param(params, "target_contract")?;
        let chain_id = u64_param(params, "chain_id")?;
        let symbol = str_param(params, "token_needed")?;
        let amount = f64_param(params, "amount_needed")?;
        if amount <= 0.0 {
            return Err(VeriteError::invalid_param("amount_needed", "must be positive"));
        }

        let Some(provider) = best_provider(chain_id, symbol, amount) else {
            return Ok(ToolResult::failure(
                self.name(),
                format!("No suitable flash loan provider for {amount} {symbol} on chain {chain_id}"),
            ));
        };

        let fee_amount = amount * provider.fee_rate;
        let token_address = tokens::lookup(chain_id, symbol).map(|t| t.address);
        let mut data = json!({
            "target_contract": target,
            "chain_id": chain_id,
            "provider": provider.id,
            "provider_name": provider.name,
            "provider_address": provider.address,
            "token": symbol,
            "token_address": token_address,
            "amount": amount,
            "fee_rate": provider.fee_rate,
            "fee_amount": fee_amount,
            "min_profit_needed": fee_amount,
            "gas_buffer_base": GAS_BUFFER_BASE,
            "callback": provider.callback,
            "alternatives": providers(chain_id)
                .iter()
                .filter(|p| p.id != provider.id && p.supports(symbol))
                .map(|p| p.id)
                .collect::<Vec<_>>(),
        });
        if let Some(rate) = params.get("expected_profit_rate").and_then(|v| v.as_f64()) {
            data["max_profitable_amount"] = json!(max_profitable_amount(provider, rate));
            data["expected_profit"] = json!(amount * rate);
            data["profitable_after_fee"] = json!(amount * rate > fee_amount);
        }

        tracing::debug!(provider = provider.id, symbol, amount, "Selected flash loan provider");
        Ok(ToolResult::ok(self.name(), data))
    }
}
