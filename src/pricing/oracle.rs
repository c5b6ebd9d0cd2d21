// src/pricing/oracle.rs: Pricing waterfall with caching
//
// Tiers are asked in order. A tier that answers `None` is skipped; one that
// fails with a transient error gets exactly one retry, then the next tier is
// asked. Every attempt is recorded so callers can see why a tier was passed
// over. Exhausting the list yields `None`, never an error.

use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use super::cache::{CacheKey, CacheStats, PriceCache};
use super::chain::{ChainReader, RpcReader};
use super::sources::{ChainlinkSource, CoinGeckoSource, DexSource, FallbackSource};
use super::tokens::{self, TokenInfo};
use super::{unix_now, PriceError, PriceQuote, PriceSource, SourceKind};
use crate::infra::config::Config;
use crate::infra::errors::VeriteError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Resolved { price_usd: f64 },
    Inapplicable,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceAttempt {
    pub source: SourceKind,
    pub retried: bool,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub quote: Option<PriceQuote>,
    /// Empty on a cache hit.
    pub attempts: Vec<SourceAttempt>,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsdValue {
    pub token: String,
    pub amount: f64,
    pub usd: f64,
    pub source: Option<SourceKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceComparison {
    pub token: String,
    pub prices: BTreeMap<String, f64>,
    pub mean: f64,
    pub variance: f64,
    pub max_deviation_percent: f64,
}

pub struct PricingOracle {
    sources: Vec<Arc<dyn PriceSource>>,
    cache: PriceCache,
    retry_delay: Duration,
}

impl PricingOracle {
    /// Full waterfall: Chainlink, DEX, CoinGecko, static table.
    pub fn new(config: &Config) -> Result<Self, VeriteError> {
        let endpoints: HashMap<u64, String> = config
            .chains
            .keys()
            .filter_map(|id| id.parse::<u64>().ok())
            .filter_map(|id| config.rpc_url(id).map(|url| (id, url)))
            .collect();
        let timeout = Duration::from_secs(config.pricing.request_timeout_seconds);
        let reader: Arc<dyn ChainReader> = Arc::new(RpcReader::new(endpoints, timeout));

        let coingecko = CoinGeckoSource::new(
            &config.pricing.coingecko_base_url,
            config.pricing.coingecko_api_key.clone(),
            timeout,
        )?
        .with_reader(reader.clone());

        let sources: Vec<Arc<dyn PriceSource>> = vec![
            Arc::new(ChainlinkSource::new(reader.clone())),
            Arc::new(DexSource::new(reader)),
            Arc::new(coingecko),
            Arc::new(FallbackSource),
        ];
        Ok(Self::with_sources(
            sources,
            Duration::from_secs(config.pricing.cache_ttl_hours * 3600),
            Duration::from_millis(config.pricing.retry_delay_ms),
        ))
    }

    /// Static table only. No network access.
    pub fn offline(config: &Config) -> Self {
        let sources: Vec<Arc<dyn PriceSource>> = vec![Arc::new(FallbackSource)];
        Self::with_sources(
            sources,
            Duration::from_secs(config.pricing.cache_ttl_hours * 3600),
            Duration::ZERO,
        )
    }

    pub fn with_sources(sources: Vec<Arc<dyn PriceSource>>, ttl: Duration, retry_delay: Duration) -> Self {
        Self {
            sources,
            cache: PriceCache::new(ttl),
            retry_delay,
        }
    }

    async fn attempt(
        &self,
        source: &dyn PriceSource,
        token: &TokenInfo,
        chain_id: u64,
        block: Option<u64>,
    ) -> (Result<Option<super::SourcePrice>, PriceError>, bool) {
        match source.resolve(token, chain_id, block).await {
            Err(e) if e.is_retriable() => {
                tracing::debug!(source = %source.kind(), "Retrying after transient error: {e}");
                tokio::time::sleep(self.retry_delay).await;
                (source.resolve(token, chain_id, block).await, true)
            }
            other => (other, false),
        }
    }

    /// Walk the waterfall for `token` (symbol or address).
    pub async fn resolve(&self, token: &str, chain_id: u64, block: Option<u64>) -> Resolution {
        let info = tokens::resolve(chain_id, token);
        let key = CacheKey::new(chain_id, &info.symbol, block);

        if let Some(quote) = self.cache.get(&key).await {
            return Resolution {
                quote: Some(quote),
                attempts: Vec::new(),
                cached: true,
            };
        }

        let mut attempts = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let (result, retried) = self.attempt(source.as_ref(), &info, chain_id, block).await;
            let outcome = match result {
                Ok(Some(p)) if p.usd.is_finite() && p.usd > 0.0 => {
                    let quote = PriceQuote {
                        symbol: info.symbol.clone(),
                        chain_id,
                        price_usd: p.usd,
                        confidence: p.confidence.clamp(0.0, 1.0),
                        source: source.kind(),
                        resolved_at: unix_now(),
                        block,
                    };
                    attempts.push(SourceAttempt {
                        source: source.kind(),
                        retried,
                        outcome: AttemptOutcome::Resolved { price_usd: p.usd },
                    });
                    self.cache.set(key, quote.clone()).await;
                    return Resolution {
                        quote: Some(quote),
                        attempts,
                        cached: false,
                    };
                }
                Ok(Some(p)) => AttemptOutcome::Failed {
                    error: format!("unusable price {}", p.usd),
                },
                Ok(None) => AttemptOutcome::Inapplicable,
                Err(e) => {
                    tracing::warn!(
                        source = %source.kind(),
                        token = %info.symbol,
                        chain_id,
                        "Price source failed, trying next: {e}"
                    );
                    AttemptOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            attempts.push(SourceAttempt {
                source: source.kind(),
                retried,
                outcome,
            });
        }

        tracing::warn!(token = %info.symbol, chain_id, ?block, "No price source could resolve token");
        Resolution {
            quote: None,
            attempts,
            cached: false,
        }
    }

    pub async fn get_price(&self, token: &str, chain_id: u64, block: Option<u64>) -> Option<PriceQuote> {
        self.resolve(token, chain_id, block).await.quote
    }

    /// USD value of `amount` whole tokens; 0 when no price is available.
    pub async fn convert_to_usd(&self, token: &str, amount: f64, chain_id: u64, block: Option<u64>) -> f64 {
        match self.get_price(token, chain_id, block).await {
            Some(q) => amount * q.price_usd,
            None => {
                tracing::warn!(token, chain_id, "Price unavailable, valuing {amount} at 0 USD");
                0.0
            }
        }
    }

    pub async fn base_currency_price(&self, chain_id: u64, block: Option<u64>) -> Option<PriceQuote> {
        self.get_price(tokens::base_currency(chain_id), chain_id, block).await
    }

    /// Base-currency units per whole `token`.
    pub async fn base_currency_rate(&self, token: &str, chain_id: u64, block: Option<u64>) -> Option<f64> {
        let info = tokens::resolve(chain_id, token);
        if tokens::is_base_like(chain_id, &info.symbol) {
            return Some(1.0);
        }
        let (token_price, base_price) = futures::join!(
            self.get_price(token, chain_id, block),
            self.base_currency_price(chain_id, block)
        );
        let (t, b) = (token_price?, base_price?);
        Some(t.price_usd / b.price_usd)
    }

    pub async fn convert_to_base_currency(
        &self,
        token: &str,
        amount: f64,
        chain_id: u64,
        block: Option<u64>,
    ) -> Option<f64> {
        self.base_currency_rate(token, chain_id, block)
            .await
            .map(|rate| amount * rate)
    }

    /// USD prices for several tokens, resolved concurrently. Unresolvable
    /// tokens map to 0.
    pub async fn get_multiple_prices(
        &self,
        tokens: &[String],
        chain_id: u64,
        block: Option<u64>,
    ) -> BTreeMap<String, f64> {
        let quotes = join_all(tokens.iter().map(|t| self.get_price(t, chain_id, block))).await;
        tokens
            .iter()
            .zip(quotes)
            .map(|(t, q)| (t.clone(), q.map_or(0.0, |q| q.price_usd)))
            .collect()
    }

    /// USD values of `(token, amount)` pairs in input order.
    pub async fn convert_many_to_usd(
        &self,
        amounts: &[(String, f64)],
        chain_id: u64,
        block: Option<u64>,
    ) -> Vec<UsdValue> {
        let quotes = join_all(amounts.iter().map(|(t, _)| self.get_price(t, chain_id, block))).await;
        amounts
            .iter()
            .zip(quotes)
            .map(|((token, amount), quote)| {
                if quote.is_none() {
                    tracing::warn!(token = %token, chain_id, "Price unavailable in batch, contributing 0");
                }
                UsdValue {
                    token: token.clone(),
                    amount: *amount,
                    usd: quote.as_ref().map_or(0.0, |q| amount * q.price_usd),
                    source: quote.map(|q| q.source),
                }
            })
            .collect()
    }

    pub async fn clear_cache(&self, chain_id: Option<u64>) -> usize {
        self.cache.clear(chain_id).await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Resolve every registry token for `chain_id`. Returns how many got a price.
    pub async fn warmup(&self, chain_id: u64, block: Option<u64>) -> usize {
        let symbols: Vec<String> = tokens::all(chain_id).into_iter().map(|t| t.symbol).collect();
        let resolved = join_all(symbols.iter().map(|s| self.get_price(s, chain_id, block)))
            .await
            .into_iter()
            .filter(Option::is_some)
            .count();
        tracing::info!(chain_id, resolved, total = symbols.len(), "Price cache warmed");
        resolved
    }

    /// Ask every tier directly (bypassing the cache) for the chain's
    /// reference tokens and report how far the answers spread.
    pub async fn compare_sources(&self, chain_id: u64, block: Option<u64>) -> Vec<SourceComparison> {
        let reference: &[&str] = match chain_id {
            56 => &["BNB", "USDT", "BUSD"],
            _ => &["ETH", "USDC", "USDT"],
        };

        let mut out = Vec::new();
        for symbol in reference {
            let info = &tokens::resolve(chain_id, symbol);
            let answers = join_all(
                self.sources
                    .iter()
                    .map(|s| async move { (s.kind(), s.resolve(info, chain_id, block).await) }),
            )
            .await;

            let prices: BTreeMap<String, f64> = answers
                .into_iter()
                .filter_map(|(kind, r)| match r {
                    Ok(Some(p)) if p.usd.is_finite() && p.usd > 0.0 => {
                        Some((kind.as_str().to_string(), p.usd))
                    }
                    _ => None,
                })
                .collect();
            if prices.is_empty() {
                continue;
            }
            out.push(spread(symbol, prices));
        }
        out
    }
}

fn spread(token: &str, prices: BTreeMap<String, f64>) -> SourceComparison {
    let n = prices.len() as f64;
    let mean = prices.values().sum::<f64>() / n;
    let variance = prices.values().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
    let max_deviation_percent = prices
        .values()
        .map(|p| (p - mean).abs() / mean * 100.0)
        .fold(0.0, f64::max);
    SourceComparison {
        token: token.to_string(),
        prices,
        mean,
        variance,
        max_deviation_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::SourcePrice;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        kind: SourceKind,
        answer: Result<Option<f64>, PriceError>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(kind: SourceKind, answer: Result<Option<f64>, PriceError>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                answer,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PriceSource for Fixed {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn resolve(
            &self,
            _token: &TokenInfo,
            _chain_id: u64,
            _block: Option<u64>,
        ) -> Result<Option<SourcePrice>, PriceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone().map(|o| {
                o.map(|usd| SourcePrice {
                    usd,
                    confidence: 0.5,
                })
            })
        }
    }

    fn oracle(sources: Vec<Arc<dyn PriceSource>>) -> PricingOracle {
        PricingOracle::with_sources(sources, Duration::from_secs(3600), Duration::ZERO)
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once_then_falls_through() {
        let flaky = Fixed::new(SourceKind::Chainlink, Err(PriceError::service("rpc", "503")));
        let dex = Fixed::new(SourceKind::Dex, Ok(Some(10.0)));
        let o = oracle(vec![flaky.clone() as Arc<dyn PriceSource>, dex]);
        let r = o.resolve("UNI", 1, None).await;
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
        assert_eq!(r.quote.unwrap().source, SourceKind::Dex);
        assert!(r.attempts[0].retried);
        assert!(matches!(r.attempts[0].outcome, AttemptOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_rejected_answer_not_retried() {
        let bad = Fixed::new(SourceKind::Chainlink, Err(PriceError::rejected("chainlink", "revert")));
        let o = oracle(vec![bad.clone() as Arc<dyn PriceSource>, Arc::new(FallbackSource)]);
        let q = o.get_price("ETH", 1, None).await.unwrap();
        assert_eq!(bad.calls.load(Ordering::SeqCst), 1);
        assert_eq!(q.source, SourceKind::Fallback);
    }

    #[tokio::test]
    async fn test_non_positive_price_skipped() {
        let zero = Fixed::new(SourceKind::Dex, Ok(Some(0.0)));
        let nan = Fixed::new(SourceKind::CoinGecko, Ok(Some(f64::NAN)));
        let o = oracle(vec![zero as Arc<dyn PriceSource>, nan]);
        let r = o.resolve("ETH", 1, None).await;
        assert!(r.quote.is_none());
        assert_eq!(r.attempts.len(), 2);
    }

    #[tokio::test]
    async fn test_base_currency_conversion() {
        let o = PricingOracle::offline(&Config::default());
        // 3200 USDC at 1 USD / 3200 USD per ETH
        let eth = o.convert_to_base_currency("USDC", 3200.0, 1, None).await.unwrap();
        assert!((eth - 1.0).abs() < 1e-12);
        assert_eq!(o.base_currency_rate("WETH", 1, None).await, Some(1.0));
        assert!(o.convert_to_base_currency("SHIB", 1.0, 1, None).await.is_none());
    }

    #[tokio::test]
    async fn test_batch_zero_for_unknown() {
        let o = PricingOracle::offline(&Config::default());
        let prices = o
            .get_multiple_prices(&["WBTC".to_string(), "SHIB".to_string()], 1, None)
            .await;
        assert_eq!(prices["WBTC"], 65000.0);
        assert_eq!(prices["SHIB"], 0.0);

        let values = o
            .convert_many_to_usd(&[("CAKE".into(), 4.0), ("XYZ".into(), 9.0)], 56, None)
            .await;
        assert_eq!(values[0].usd, 10.0);
        assert_eq!(values[1].usd, 0.0);
        assert!(values[1].source.is_none());
    }

    #[tokio::test]
    async fn test_warmup_fills_cache() {
        let o = PricingOracle::offline(&Config::default());
        let n = o.warmup(56, None).await;
        assert_eq!(n, 5);
        assert_eq!(o.cache_stats().await.entries, 5);
        assert_eq!(o.clear_cache(Some(56)).await, 5);
    }

    #[tokio::test]
    async fn test_compare_sources_spread() {
        let a = Fixed::new(SourceKind::Chainlink, Ok(Some(100.0)));
        let b = Fixed::new(SourceKind::Dex, Ok(Some(110.0)));
        let o = oracle(vec![a as Arc<dyn PriceSource>, b]);
        let cmp = o.compare_sources(1, None).await;
        assert_eq!(cmp.len(), 3);
        assert_eq!(cmp[0].token, "ETH");
        assert!((cmp[0].mean - 105.0).abs() < 1e-9);
        assert!((cmp[0].variance - 25.0).abs() < 1e-9);
        assert!((cmp[0].max_deviation_percent - 5.0 / 105.0 * 100.0).abs() < 1e-9);
    }
}
