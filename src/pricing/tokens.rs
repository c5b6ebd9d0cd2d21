// src/pricing/tokens.rs: Per-chain token registry

use serde::{Deserialize, Serialize};

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
pub const NATIVE_SENTINEL: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub chain_id: u64,
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
    pub coingecko_id: Option<String>,
    pub chainlink_feed: Option<String>,
    pub native: bool,
}

impl TokenInfo {
    /// Placeholder for an address the registry does not know.
    pub fn unknown(chain_id: u64, address: &str) -> Self {
        Self {
            chain_id,
            symbol: address.to_ascii_lowercase(),
            address: address.to_string(),
            decimals: 18,
            coingecko_id: None,
            chainlink_feed: None,
            native: false,
        }
    }

    pub fn is_known(&self) -> bool {
        self.symbol != self.address.to_ascii_lowercase()
    }
}

struct Entry {
    symbol: &'static str,
    address: &'static str,
    decimals: u8,
    coingecko_id: Option<&'static str>,
    feed: Option<&'static str>,
}

const ETH_USD_FEED: &str = "0x5f4eC3Df9cbd43714FE2740f5E3616155c5b8419";
const BNB_USD_FEED: &str = "0x0567F2323251f0Aab15c8dFb1967E4e8A7D42aeE";

const MAINNET: &[Entry] = &[
    Entry {
        symbol: "ETH",
        address: ZERO_ADDRESS,
        decimals: 18,
        coingecko_id: Some("ethereum"),
        feed: Some(ETH_USD_FEED),
    },
    Entry {
        symbol: "WETH",
        address: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
        decimals: 18,
        coingecko_id: Some("ethereum"),
        feed: Some(ETH_USD_FEED),
    },
    Entry {
        symbol: "USDC",
        address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
        decimals: 6,
        coingecko_id: Some("usd-coin"),
        feed: Some("0x8fFfFfd4AfB6115b954Bd326cbe7B4BA576818f6"),
    },
    Entry {
        symbol: "USDT",
        address: "0xdAC17F958D2ee523a2206206994597C13D831ec7",
        decimals: 6,
        coingecko_id: Some("tether"),
        feed: Some("0x3E7d1eAB13ad0104d2750B8863b489D65364e32D"),
    },
    Entry {
        symbol: "DAI",
        address: "0x6B175474E89094C44Da98b954EedeAC495271d0F",
        decimals: 18,
        coingecko_id: Some("dai"),
        feed: Some("0xAed0c38402a5d19df6E4c03F4E2DceD6e29c1ee9"),
    },
    Entry {
        symbol: "WBTC",
        address: "0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599",
        decimals: 8,
        coingecko_id: Some("wrapped-bitcoin"),
        feed: Some("0xF4030086522a5bEEa4988F8cA5B36dbC97BeE88c"),
    },
    Entry {
        symbol: "UNI",
        address: "0x1f9840a85d5aF5bf1D1762F925BDADdC4201F984",
        decimals: 18,
        coingecko_id: Some("uniswap"),
        feed: Some("0x553303d460EE0afB37EdFf9bE42922D8FF63220e"),
    },
    Entry {
        symbol: "COMP",
        address: "0xc00e94Cb662C3520282E6f5717214004A7f26888",
        decimals: 18,
        coingecko_id: Some("compound-governance-token"),
        feed: Some("0xdbd020CAeF83eFd542f4De03e3cF0C28A4428bd5"),
    },
    Entry {
        symbol: "stETH",
        address: "0xae7ab96520DE3A18E5e111B5EaAb095312D7fE84",
        decimals: 18,
        coingecko_id: Some("staked-ether"),
        feed: Some("0xCfE54B5cD566aB89272946F602D76Ea879CAb4a8"),
    },
    Entry {
        symbol: "LINK",
        address: "0x514910771AF9Ca656af840dff83E8264EcF986CA",
        decimals: 18,
        coingecko_id: Some("chainlink"),
        feed: Some("0x2c1d072e956AFFC0D435Cb7AC38EF18d24d9127c"),
    },
];

const BSC: &[Entry] = &[
    Entry {
        symbol: "BNB",
        address: ZERO_ADDRESS,
        decimals: 18,
        coingecko_id: Some("binancecoin"),
        feed: Some(BNB_USD_FEED),
    },
    Entry {
        symbol: "WBNB",
        address: "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c",
        decimals: 18,
        coingecko_id: Some("binancecoin"),
        feed: Some(BNB_USD_FEED),
    },
    Entry {
        symbol: "USDT",
        address: "0x55d398326f99059fF775485246999027B3197955",
        decimals: 18,
        coingecko_id: Some("tether"),
        feed: Some("0xB97Ad0E74fa7d920791E90258A6E2085088b4320"),
    },
    Entry {
        symbol: "BUSD",
        address: "0xe9e7CEA3DedcA5984780Bafc599bD69ADd087D56",
        decimals: 18,
        coingecko_id: Some("binance-usd"),
        feed: Some("0xcBb98864Ef56E9042e7d2efef76141f15731B82f"),
    },
    Entry {
        symbol: "CAKE",
        address: "0x0E09FaBB73Bd3Ade0a17ECC321fD13a19e81cE82",
        decimals: 18,
        coingecko_id: Some("pancakeswap-token"),
        feed: Some("0xB6064eD41d4f67e353768aA239cA86f4F73665a1"),
    },
];

fn entries(chain_id: u64) -> &'static [Entry] {
    match chain_id {
        1 => MAINNET,
        56 => BSC,
        _ => &[],
    }
}

fn to_info(chain_id: u64, e: &Entry) -> TokenInfo {
    TokenInfo {
        chain_id,
        symbol: e.symbol.to_string(),
        address: e.address.to_string(),
        decimals: e.decimals,
        coingecko_id: e.coingecko_id.map(String::from),
        chainlink_feed: e.feed.map(String::from),
        native: e.address == ZERO_ADDRESS,
    }
}

pub fn is_native_address(address: &str) -> bool {
    address.eq_ignore_ascii_case(ZERO_ADDRESS) || address.eq_ignore_ascii_case(NATIVE_SENTINEL)
}

fn looks_like_address(s: &str) -> bool {
    s.len() == 42 && s.starts_with("0x") && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Find a registry token by symbol or address (both case-insensitive).
pub fn lookup(chain_id: u64, token: &str) -> Option<TokenInfo> {
    let token = token.trim();
    let found = if looks_like_address(token) {
        if is_native_address(token) {
            entries(chain_id).iter().find(|e| e.address == ZERO_ADDRESS)
        } else {
            entries(chain_id)
                .iter()
                .find(|e| e.address.eq_ignore_ascii_case(token))
        }
    } else {
        entries(chain_id)
            .iter()
            .find(|e| e.symbol.eq_ignore_ascii_case(token))
    };
    found.map(|e| to_info(chain_id, e))
}

/// Registry token, or a placeholder for unknown addresses / symbols.
pub fn resolve(chain_id: u64, token: &str) -> TokenInfo {
    lookup(chain_id, token).unwrap_or_else(|| TokenInfo::unknown(chain_id, token.trim()))
}

pub fn all(chain_id: u64) -> Vec<TokenInfo> {
    entries(chain_id).iter().map(|e| to_info(chain_id, e)).collect()
}

pub fn base_currency(chain_id: u64) -> &'static str {
    match chain_id {
        56 => "BNB",
        43114 => "AVAX",
        _ => "ETH",
    }
}

/// Wrapped native token, quoted against on DEX routers.
pub fn wrapped_native(chain_id: u64) -> Option<TokenInfo> {
    match chain_id {
        1 => lookup(1, "WETH"),
        56 => lookup(56, "WBNB"),
        _ => None,
    }
}

/// Stablecoin used as the USD leg of DEX quotes.
pub fn quote_stablecoin(chain_id: u64) -> Option<TokenInfo> {
    match chain_id {
        1 => lookup(1, "USDC"),
        56 => lookup(56, "USDT"),
        _ => None,
    }
}

/// Uniswap V2 style router per chain.
pub fn dex_router(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"),
        56 => Some("0x10ED43C718714eb63d5aA57B78B54704E256024E"),
        _ => None,
    }
}

/// Whether `symbol` names the chain's base currency or its wrapped form.
pub fn is_base_like(chain_id: u64, symbol: &str) -> bool {
    let base = base_currency(chain_id);
    symbol.eq_ignore_ascii_case(base)
        || wrapped_native(chain_id).is_some_and(|w| w.symbol.eq_ignore_ascii_case(symbol))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_symbol_and_address() {
        let weth = lookup(1, "weth").unwrap();
        assert_eq!(weth.address, "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
        let by_addr = lookup(1, "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2").unwrap();
        assert_eq!(by_addr.symbol, "WETH");
        assert_eq!(lookup(1, "USDT").unwrap().decimals, 6);
        assert_eq!(lookup(56, "USDT").unwrap().decimals, 18);
    }

    #[test]
    fn test_native_addresses() {
        assert_eq!(lookup(1, ZERO_ADDRESS).unwrap().symbol, "ETH");
        assert_eq!(lookup(56, NATIVE_SENTINEL).unwrap().symbol, "BNB");
        assert!(lookup(1, "ETH").unwrap().native);
        assert!(!lookup(1, "WETH").unwrap().native);
    }

    #[test]
    fn test_unknown_token_placeholder() {
        let addr = "0x418C24191aE947A78C99fDc0e45a1f96Afb254BE";
        let t = resolve(1, addr);
        assert_eq!(t.symbol, addr.to_ascii_lowercase());
        assert_eq!(t.decimals, 18);
        assert!(!t.is_known());
        assert!(resolve(1, "WBTC").is_known());
        assert!(lookup(43114, "AVAX").is_none());
    }

    #[test]
    fn test_chain_helpers() {
        assert_eq!(base_currency(1), "ETH");
        assert_eq!(base_currency(56), "BNB");
        assert_eq!(wrapped_native(56).unwrap().symbol, "WBNB");
        assert_eq!(quote_stablecoin(1).unwrap().decimals, 6);
        assert!(dex_router(43114).is_none());
        assert!(is_base_like(1, "weth"));
        assert!(is_base_like(56, "BNB"));
        assert!(!is_base_like(1, "USDC"));
    }
}
