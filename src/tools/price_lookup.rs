// src/tools/price_lookup.rs: Token price lookup through the pricing oracle

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::{str_param, u64_param, Capability, ParamType, Params, ToolParameter, ToolResult};
use crate::infra::errors::VeriteError;
use crate::pricing::oracle::PricingOracle;

pub struct PriceLookup {
    oracle: Arc<PricingOracle>,
}

impl PriceLookup {
    pub fn new(oracle: Arc<PricingOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl Capability for PriceLookup {
    fn name(&self) -> &str {
        "price_lookup"
    }

    fn description(&self) -> &str {
        "Resolves a token's USD price (optionally at a historical block) through Chainlink, DEX, CoinGecko and a static table, reporting source and confidence"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("token", ParamType::String, "Token symbol or address"),
            ToolParameter::optional("chain_id", ParamType::Integer, "Chain id")
                .with_default(json!(1))
                .with_enum([1, 56, 43114]),
            ToolParameter::optional(
                "block_number",
                ParamType::Integer,
                "Block to price at (latest when omitted)",
            ),
            ToolParameter::optional(
                "amount",
                ParamType::Number,
                "Whole-token amount to value in USD and base currency",
            ),
        ]
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, VeriteError> {
        let token = str_param(params, "token")?;
        let chain_id = u64_param(params, "chain_id")?;
        let block = params.get("block_number").and_then(|v| v.as_u64());

        let resolution = self.oracle.resolve(token, chain_id, block).await;
        let Some(quote) = resolution.quote else {
            return Ok(ToolResult::failure(
                self.name(),
                format!("No price available for {token} on chain {chain_id}"),
            ));
        };

        let mut data = json!({
            "token": token,
            "symbol": quote.symbol,
            "chain_id": chain_id,
            "block_number": block,
            "price_usd": quote.price_usd,
            "source": quote.source,
            "confidence": quote.confidence,
            "cached": resolution.cached,
            "attempts": resolution.attempts,
        });
        if let Some(amount) = params.get("amount").and_then(|v| v.as_f64()) {
            data["amount"] = json!(amount);
            data["usd_value"] = json!(amount * quote.price_usd);
            data["base_value"] = json!(
                self.oracle
                    .convert_to_base_currency(token, amount, chain_id, block)
                    .await
            );
        }
        Ok(ToolResult::ok(self.name(), data))
    }
}
