// src/pricing/sources/coingecko.rs: CoinGecko simple/price and coins/{id}/history

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::infra::errors::VeriteError;
use crate::pricing::blocks;
use crate::pricing::chain::ChainReader;
use crate::pricing::tokens::TokenInfo;
use crate::pricing::{unix_now, PriceError, PriceSource, SourceKind, SourcePrice};

const LIVE_CONFIDENCE: f64 = 0.95;
/// Historical query at the block's real timestamp.
const HISTORICAL_CONFIDENCE: f64 = 0.9;
/// Historical query at an estimated timestamp.
const ESTIMATED_CONFIDENCE: f64 = 0.8;

pub struct CoinGeckoSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    reader: Option<Arc<dyn ChainReader>>,
}

impl CoinGeckoSource {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, VeriteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VeriteError::Configuration(format!("CoinGecko HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            reader: None,
        })
    }

    /// Use `reader` to look up real block timestamps for historical queries.
    pub fn with_reader(mut self, reader: Arc<dyn ChainReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    async fn get(&self, url: &str) -> Result<Option<Value>, PriceError> {
        let mut req = self.client.get(url);
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-pro-api-key", key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| PriceError::service("coingecko", e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(PriceError::service("coingecko", format!("HTTP {status}")));
        }
        if !status.is_success() {
            tracing::debug!("CoinGecko returned {status} for {url}");
            return Ok(None);
        }
        resp.json()
            .await
            .map(Some)
            .map_err(|e| PriceError::rejected("coingecko", e.to_string()))
    }

    /// Timestamp of `block` and whether it is exact.
    async fn block_time(&self, chain_id: u64, block: u64) -> (i64, bool) {
        if let Some(reader) = self.reader.as_ref().filter(|r| r.supports_chain(chain_id)) {
            match reader.block_timestamp(chain_id, block).await {
                Ok(Some(ts)) => return (ts, true),
                Ok(None) => {}
                Err(e) => tracing::debug!("Block timestamp lookup failed, estimating: {e}"),
            }
        }
        (blocks::estimate_timestamp(chain_id, block, unix_now()), false)
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    fn kind(&self) -> SourceKind {
        SourceKind::CoinGecko
    }

    async fn resolve(
        &self,
        token: &TokenInfo,
        chain_id: u64,
        block: Option<u64>,
    ) -> Result<Option<SourcePrice>, PriceError> {
        let Some(id) = token.coingecko_id.as_deref() else {
            return Ok(None);
        };

        let (price, confidence) = match block {
            None => {
                let url = format!("{}/simple/price?ids={id}&vs_currencies=usd", self.base_url);
                let Some(body) = self.get(&url).await? else {
                    return Ok(None);
                };
                (body[id]["usd"].as_f64(), LIVE_CONFIDENCE)
            }
            Some(b) => {
                let (ts, exact) = self.block_time(chain_id, b).await;
                let url = format!(
                    "{}/coins/{id}/history?date={}&localization=false",
                    self.base_url,
                    blocks::history_date(ts)
                );
                let Some(body) = self.get(&url).await? else {
                    return Ok(None);
                };
                let confidence = if exact {
                    HISTORICAL_CONFIDENCE
                } else {
                    ESTIMATED_CONFIDENCE
                };
                (body["market_data"]["current_price"]["usd"].as_f64(), confidence)
            }
        };

        match price {
            Some(usd) if usd > 0.0 => Ok(Some(SourcePrice { usd, confidence })),
            Some(_) => Err(PriceError::rejected("coingecko", format!("non-positive price for {id}"))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::tokens;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP server answering every request with `status` and `body`.
    async fn serve(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = sock.write_all(resp.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_live_price() {
        let url = serve("200 OK", r#"{"ethereum":{"usd":3210.5}}"#).await;
        let s = CoinGeckoSource::new(&url, None, Duration::from_secs(5)).unwrap();
        let eth = tokens::lookup(1, "ETH").unwrap();
        let p = s.resolve(&eth, 1, None).await.unwrap().unwrap();
        assert_eq!(p.usd, 3210.5);
        assert_eq!(p.confidence, 0.95);
    }

    #[tokio::test]
    async fn test_historical_price_with_estimated_timestamp() {
        let url = serve(
            "200 OK",
            r#"{"id":"dai","market_data":{"current_price":{"usd":0.999}}}"#,
        )
        .await;
        let s = CoinGeckoSource::new(&url, Some("key".into()), Duration::from_secs(5)).unwrap();
        let dai = tokens::lookup(1, "DAI").unwrap();
        let p = s.resolve(&dai, 1, Some(18_000_000)).await.unwrap().unwrap();
        assert_eq!(p.usd, 0.999);
        assert_eq!(p.confidence, 0.8);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retriable() {
        let url = serve("429 Too Many Requests", "{}").await;
        let s = CoinGeckoSource::new(&url, None, Duration::from_secs(5)).unwrap();
        let eth = tokens::lookup(1, "ETH").unwrap();
        let err = s.resolve(&eth, 1, None).await.unwrap_err();
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_not_found_is_inapplicable() {
        let url = serve("404 Not Found", "{}").await;
        let s = CoinGeckoSource::new(&url, None, Duration::from_secs(5)).unwrap();
        let eth = tokens::lookup(1, "ETH").unwrap();
        assert!(s.resolve(&eth, 1, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_without_id_skips_network() {
        let s = CoinGeckoSource::new("http://127.0.0.1:9", None, Duration::from_secs(1)).unwrap();
        let unknown = tokens::resolve(1, "0x418C24191aE947A78C99fDc0e45a1f96Afb254BE");
        assert!(s.resolve(&unknown, 1, None).await.unwrap().is_none());
    }
}
