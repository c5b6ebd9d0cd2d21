// src/pricing/cache.rs: In-memory price cache keyed by (chain, symbol, block)
//
// Expired entries are reported as misses and replaced on the next `set`;
// they are never refreshed in place.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::PriceQuote;

/// Default entry lifetime: 24 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub chain_id: u64,
    /// Uppercased so `weth` and `WETH` share an entry.
    pub symbol: String,
    pub block: Option<u64>,
}

impl CacheKey {
    pub fn new(chain_id: u64, symbol: &str, block: Option<u64>) -> Self {
        Self {
            chain_id,
            symbol: symbol.to_ascii_uppercase(),
            block,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.block {
            Some(b) => write!(f, "{}:{}:{}", self.chain_id, self.symbol, b),
            None => write!(f, "{}:{}:latest", self.chain_id, self.symbol),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    quote: PriceQuote,
    cached_at: Instant,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub expired: usize,
    pub hits: u64,
    pub misses: u64,
    pub by_source: BTreeMap<String, usize>,
    pub ttl_seconds: u64,
}

pub struct PriceCache {
    entries: RwLock<HashMap<CacheKey, Entry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<PriceQuote> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(e) if e.cached_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(e.quote.clone())
            }
            Some(_) => {
                tracing::debug!("Price cache entry {key} expired");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set(&self, key: CacheKey, quote: PriceQuote) {
        self.entries.write().await.insert(
            key,
            Entry {
                quote,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop every entry, or only those for `chain_id`. Returns how many went.
    pub async fn clear(&self, chain_id: Option<u64>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        match chain_id {
            Some(id) => entries.retain(|k, _| k.chain_id != id),
            None => entries.clear(),
        }
        before - entries.len()
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let mut by_source = BTreeMap::new();
        let mut expired = 0;
        for e in entries.values() {
            if e.cached_at.elapsed() >= self.ttl {
                expired += 1;
            }
            *by_source
                .entry(e.quote.source.as_str().to_string())
                .or_insert(0) += 1;
        }
        CacheStats {
            entries: entries.len(),
            expired,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            by_source,
            ttl_seconds: self.ttl.as_secs(),
        }
    }
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::SourceKind;

    fn quote(symbol: &str, source: SourceKind) -> PriceQuote {
        PriceQuote {
            symbol: symbol.into(),
            chain_id: 1,
            price_usd: 3200.0,
            confidence: 0.98,
            source,
            resolved_at: 0,
            block: None,
        }
    }

    #[test]
    fn test_key_display_and_case() {
        assert_eq!(CacheKey::new(1, "weth", None).to_string(), "1:WETH:latest");
        assert_eq!(CacheKey::new(56, "BNB", Some(7)).to_string(), "56:BNB:7");
        assert_eq!(CacheKey::new(1, "weth", None), CacheKey::new(1, "WETH", None));
        assert_ne!(CacheKey::new(1, "WETH", None), CacheKey::new(1, "WETH", Some(1)));
    }

    #[tokio::test]
    async fn test_hit_and_miss_counts() {
        let cache = PriceCache::default();
        let key = CacheKey::new(1, "WETH", None);
        assert!(cache.get(&key).await.is_none());
        cache.set(key.clone(), quote("WETH", SourceKind::Chainlink)).await;
        assert_eq!(cache.get(&key).await.unwrap().price_usd, 3200.0);
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
        assert_eq!(stats.by_source["chainlink"], 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = PriceCache::new(Duration::ZERO);
        let key = CacheKey::new(1, "DAI", None);
        cache.set(key.clone(), quote("DAI", SourceKind::Fallback)).await;
        assert!(cache.get(&key).await.is_none());
        let stats = cache.stats().await;
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_clear_by_chain() {
        let cache = PriceCache::default();
        cache.set(CacheKey::new(1, "ETH", None), quote("ETH", SourceKind::Dex)).await;
        cache.set(CacheKey::new(56, "BNB", None), quote("BNB", SourceKind::Dex)).await;
        assert_eq!(cache.clear(Some(56)).await, 1);
        assert_eq!(cache.stats().await.entries, 1);
        assert_eq!(cache.clear(None).await, 1);
        assert_eq!(cache.stats().await.entries, 0);
    }
}
