// src/pricing/sources/chainlink.rs: Chainlink aggregator feeds

use alloy::primitives::Address;
use async_trait::async_trait;
use std::sync::Arc;

use crate::pricing::abi::{u256_to_f64, IAggregatorV3};
use crate::pricing::chain::{call_view, ChainReader};
use crate::pricing::tokens::TokenInfo;
use crate::pricing::{PriceError, PriceSource, SourceKind, SourcePrice};

/// Aggregators on every supported chain report 8 decimals.
const DEFAULT_FEED_DECIMALS: i32 = 8;

const LATEST_CONFIDENCE: f64 = 0.98;
const HISTORICAL_CONFIDENCE: f64 = 0.95;

pub struct ChainlinkSource {
    reader: Arc<dyn ChainReader>,
}

impl ChainlinkSource {
    pub fn new(reader: Arc<dyn ChainReader>) -> Self {
        Self { reader }
    }

    async fn feed_decimals(&self, chain_id: u64, feed: Address, block: Option<u64>) -> i32 {
        let call = IAggregatorV3::decimalsCall {};
        match call_view(self.reader.as_ref(), "chainlink", chain_id, feed, &call, block).await {
            Ok(decimals) => i32::from(decimals),
            Err(e) => {
                tracing::debug!("decimals() on feed {feed} failed, assuming 8: {e}");
                DEFAULT_FEED_DECIMALS
            }
        }
    }
}

#[async_trait]
impl PriceSource for ChainlinkSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Chainlink
    }

    async fn resolve(
        &self,
        token: &TokenInfo,
        chain_id: u64,
        block: Option<u64>,
    ) -> Result<Option<SourcePrice>, PriceError> {
        let Some(feed) = token.chainlink_feed.as_deref() else {
            return Ok(None);
        };
        if !self.reader.supports_chain(chain_id) {
            return Ok(None);
        }
        let feed: Address = feed
            .parse()
            .map_err(|e| PriceError::rejected("chainlink", format!("bad feed address {feed}: {e}")))?;

        let decimals = self.feed_decimals(chain_id, feed, block).await;
        let round = call_view(
            self.reader.as_ref(),
            "chainlink",
            chain_id,
            feed,
            &IAggregatorV3::latestRoundDataCall {},
            block,
        )
        .await?;

        if round.answer.is_negative() {
            return Err(PriceError::rejected("chainlink", "negative answer"));
        }
        let price = u256_to_f64(round.answer.into_raw()) / 10f64.powi(decimals);
        if price <= 0.0 {
            return Err(PriceError::rejected("chainlink", "zero answer"));
        }

        let confidence = if block.is_some() {
            HISTORICAL_CONFIDENCE
        } else {
            LATEST_CONFIDENCE
        };
        Ok(Some(SourcePrice {
            usd: price,
            confidence,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::tokens;
    use alloy::primitives::{Bytes, I256, U256};
    use alloy::sol_types::{SolCall, SolValue};

    /// Answers `decimals()` with 8 and `latestRoundData()` with `round`.
    struct FeedReader {
        round: Bytes,
    }

    #[async_trait]
    impl ChainReader for FeedReader {
        fn supports_chain(&self, chain_id: u64) -> bool {
            chain_id == 1
        }

        async fn call(
            &self,
            _chain_id: u64,
            _to: Address,
            input: Bytes,
            _block: Option<u64>,
        ) -> Result<Bytes, PriceError> {
            if input.starts_with(&IAggregatorV3::decimalsCall::SELECTOR) {
                return Ok(Bytes::from(U256::from(8u64).abi_encode()));
            }
            Ok(self.round.clone())
        }

        async fn block_timestamp(&self, _: u64, _: u64) -> Result<Option<i64>, PriceError> {
            Ok(None)
        }
    }

    fn round(answer: I256) -> Bytes {
        let one = U256::from(1u64);
        Bytes::from((one, answer, U256::ZERO, U256::ZERO, one).abi_encode_params())
    }

    fn source(round: Bytes) -> ChainlinkSource {
        ChainlinkSource::new(Arc::new(FeedReader { round }))
    }

    #[tokio::test]
    async fn test_scales_answer_by_feed_decimals() {
        let eth = tokens::lookup(1, "ETH").unwrap();
        let s = source(round(I256::try_from(320_000_000_000i64).unwrap()));
        let latest = s.resolve(&eth, 1, None).await.unwrap().unwrap();
        assert_eq!(latest.usd, 3200.0);
        assert_eq!(latest.confidence, 0.98);
        let historical = s.resolve(&eth, 1, Some(18_000_000)).await.unwrap().unwrap();
        assert_eq!(historical.confidence, 0.95);
    }

    #[tokio::test]
    async fn test_inapplicable_without_feed_or_chain() {
        let s = source(round(I256::ONE));
        let unknown = tokens::resolve(1, "0x418C24191aE947A78C99fDc0e45a1f96Afb254BE");
        assert!(s.resolve(&unknown, 1, None).await.unwrap().is_none());
        let bnb = tokens::lookup(56, "BNB").unwrap();
        assert!(s.resolve(&bnb, 56, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_non_positive_answer() {
        let eth = tokens::lookup(1, "ETH").unwrap();
        let err = source(round(I256::MINUS_ONE)).resolve(&eth, 1, None).await.unwrap_err();
        assert!(!err.is_retriable());
        let err = source(round(I256::ZERO)).resolve(&eth, 1, None).await.unwrap_err();
        assert!(!err.is_retriable());
    }

    #[tokio::test]
    async fn test_malformed_round_data_is_rejected() {
        let eth = tokens::lookup(1, "ETH").unwrap();
        for payload in [vec![], vec![0xff; 64], vec![0x01; 159]] {
            let err = source(Bytes::from(payload)).resolve(&eth, 1, None).await.unwrap_err();
            assert!(!err.is_retriable());
        }
    }
}
