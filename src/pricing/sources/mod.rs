// src/pricing/sources/mod.rs: Waterfall tiers

pub mod chainlink;
pub mod coingecko;
pub mod dex;
pub mod fallback;

pub use chainlink::ChainlinkSource;
pub use coingecko::CoinGeckoSource;
pub use dex::DexSource;
pub use fallback::FallbackSource;
