// src/pricing/mod.rs: Multi-source token pricing
//
// Sources are tried in a fixed order (on-chain feed, DEX quote, price API,
// static table); the first usable answer wins and is cached per
// (chain, symbol, block).

pub mod abi;
pub mod blocks;
pub mod cache;
pub mod chain;
pub mod oracle;
pub mod sources;
pub mod tokens;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infra::errors::VeriteError;
use tokens::TokenInfo;

/// Waterfall tier that produced a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Chainlink,
    Dex,
    CoinGecko,
    Fallback,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Chainlink => "chainlink",
            SourceKind::Dex => "dex",
            SourceKind::CoinGecko => "coingecko",
            SourceKind::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw answer from a single source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourcePrice {
    pub usd: f64,
    pub confidence: f64,
}

/// A resolved USD price with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub chain_id: u64,
    pub price_usd: f64,
    pub confidence: f64,
    pub source: SourceKind,
    /// Unix seconds at resolution time.
    pub resolved_at: i64,
    pub block: Option<u64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriceError {
    /// Unreachable endpoint, non-success status, transport failure.
    #[error("{service} unavailable: {message}")]
    ExternalService { service: String, message: String },

    /// The source answered but the answer is unusable (revert, bad encoding,
    /// non-positive price). Not worth retrying.
    #[error("{service} returned an unusable answer: {message}")]
    Rejected { service: String, message: String },
}

impl PriceError {
    pub fn service(service: &str, message: impl Into<String>) -> Self {
        PriceError::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn rejected(service: &str, message: impl Into<String>) -> Self {
        PriceError::Rejected {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, PriceError::ExternalService { .. })
    }
}

impl From<PriceError> for VeriteError {
    fn from(e: PriceError) -> Self {
        match e {
            PriceError::ExternalService { service, message } => VeriteError::ExternalService {
                service,
                message,
                retriable: true,
            },
            PriceError::Rejected { service, message } => VeriteError::ExternalService {
                service,
                message,
                retriable: false,
            },
        }
    }
}

/// One waterfall tier.
///
/// `Ok(None)` means the source does not cover this token / chain / block and
/// the next tier should be asked. `Err` means it should have answered and
/// could not.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn resolve(
        &self,
        token: &TokenInfo,
        chain_id: u64,
        block: Option<u64>,
    ) -> Result<Option<SourcePrice>, PriceError>;
}

pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_service_errors_retry() {
        assert!(PriceError::service("coingecko", "503").is_retriable());
        assert!(!PriceError::rejected("chainlink", "answer <= 0").is_retriable());
    }

    #[test]
    fn test_into_verite_error() {
        let e: VeriteError = PriceError::service("rpc", "timeout").into();
        assert!(e.is_retriable());
        assert_eq!(e.reason(), "external_service_error");
        let e: VeriteError = PriceError::rejected("rpc", "revert").into();
        assert!(!e.is_retriable());
    }

    #[test]
    fn test_source_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SourceKind::CoinGecko).unwrap(),
            "\"coingecko\""
        );
        assert_eq!(SourceKind::Chainlink.to_string(), "chainlink");
    }
}
