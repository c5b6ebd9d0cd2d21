// src/pricing/sources/dex.rs: Uniswap V2 style router quotes
//
// Token -> wrapped native -> stablecoin, both legs quoted with
// getAmountsOut at the requested block.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::Arc;

use crate::pricing::abi::{one_token, u256_to_f64, IUniswapV2Router};
use crate::pricing::chain::{call_view, ChainReader};
use crate::pricing::tokens::{self, TokenInfo};
use crate::pricing::{PriceError, PriceSource, SourceKind, SourcePrice};

const DEX_CONFIDENCE: f64 = 0.8;

fn address(s: &str) -> Result<Address, PriceError> {
    s.parse()
        .map_err(|e| PriceError::rejected("dex", format!("invalid address {s} in swap path: {e}")))
}

pub struct DexSource {
    reader: Arc<dyn ChainReader>,
}

impl DexSource {
    pub fn new(reader: Arc<dyn ChainReader>) -> Self {
        Self { reader }
    }

    /// Output of swapping one whole `from` token along `path`, in raw units
    /// of the last hop.
    async fn quote(
        &self,
        chain_id: u64,
        router: &str,
        from: &TokenInfo,
        path: &[&str],
        block: Option<u64>,
    ) -> Result<f64, PriceError> {
        let call = IUniswapV2Router::getAmountsOutCall {
            amountIn: one_token(from.decimals),
            path: path.iter().map(|a| address(a)).collect::<Result<_, _>>()?,
        };
        let amounts = call_view(self.reader.as_ref(), "dex", chain_id, address(router)?, &call, block).await?;
        match amounts.last() {
            Some(v) if *v > U256::ZERO => Ok(u256_to_f64(*v)),
            _ => Err(PriceError::rejected("dex", "no liquidity on path")),
        }
    }
}

#[async_trait]
impl PriceSource for DexSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Dex
    }

    async fn resolve(
        &self,
        token: &TokenInfo,
        chain_id: u64,
        block: Option<u64>,
    ) -> Result<Option<SourcePrice>, PriceError> {
        let (Some(router), Some(wrapped), Some(stable)) = (
            tokens::dex_router(chain_id),
            tokens::wrapped_native(chain_id),
            tokens::quote_stablecoin(chain_id),
        ) else {
            return Ok(None);
        };
        if !self.reader.supports_chain(chain_id) {
            return Ok(None);
        }

        let native_usd = self
            .quote(chain_id, router, &wrapped, &[&wrapped.address, &stable.address], block)
            .await?
            / 10f64.powi(i32::from(stable.decimals));

        if token.native || token.address.eq_ignore_ascii_case(&wrapped.address) {
            return Ok(Some(SourcePrice {
                usd: native_usd,
                confidence: DEX_CONFIDENCE,
            }));
        }
        if token.address.eq_ignore_ascii_case(&stable.address) {
            return Ok(Some(SourcePrice {
                usd: 1.0,
                confidence: DEX_CONFIDENCE,
            }));
        }

        let in_native = self
            .quote(chain_id, router, token, &[&token.address, &wrapped.address], block)
            .await?
            / 10f64.powi(i32::from(wrapped.decimals));

        Ok(Some(SourcePrice {
            usd: in_native * native_usd,
            confidence: DEX_CONFIDENCE,
        }))
    }
}
