// src/infra/config.rs: Configuration loading (TOML + environment overlay)
//
// A single `Config` value is built once at startup (file, then env overlay)
// and handed to every component. Nothing reads the environment after that.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::infra::errors::VeriteError;
use crate::infra::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Per-chain settings keyed by decimal chain id (`[chains.1]`).
    #[serde(default = "default_chains")]
    pub chains: BTreeMap<String, ChainConfig>,

    #[serde(default)]
    pub harness: HarnessConfig,

    #[serde(default)]
    pub pricing: PricingConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub profitability: ProfitabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            harness: HarnessConfig::default(),
            pricing: PricingConfig::default(),
            tools: ToolsConfig::default(),
            profitability: ProfitabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub name: String,
    pub rpc_url: Option<String>,
    /// Archive node, preferred for forking at historical blocks.
    pub archive_url: Option<String>,
    #[serde(default)]
    pub base_currency: String,
    #[serde(default)]
    pub wrapped_token: String,
    /// Stablecoin used to quote the wrapped token on DEX routers.
    #[serde(default)]
    pub stablecoin: String,
    #[serde(default)]
    pub block_time_secs: u64,
}

impl ChainConfig {
    fn builtin(name: &str, base: &str, wrapped: &str, stable: &str, block_time: u64) -> Self {
        Self {
            name: name.into(),
            rpc_url: None,
            archive_url: None,
            base_currency: base.into(),
            wrapped_token: wrapped.into(),
            stablecoin: stable.into(),
            block_time_secs: block_time,
        }
    }

    /// Fill empty fields from the builtin entry for the same chain.
    fn fill_from(&mut self, builtin: &ChainConfig) {
        if self.name.is_empty() {
            self.name = builtin.name.clone();
        }
        if self.base_currency.is_empty() {
            self.base_currency = builtin.base_currency.clone();
        }
        if self.wrapped_token.is_empty() {
            self.wrapped_token = builtin.wrapped_token.clone();
        }
        if self.stablecoin.is_empty() {
            self.stablecoin = builtin.stablecoin.clone();
        }
        if self.block_time_secs == 0 {
            self.block_time_secs = builtin.block_time_secs;
        }
    }
}

fn default_chains() -> BTreeMap<String, ChainConfig> {
    let mut chains = BTreeMap::new();
    chains.insert(
        "1".into(),
        ChainConfig::builtin("ethereum", "ETH", "WETH", "USDC", 12),
    );
    chains.insert(
        "56".into(),
        ChainConfig::builtin("bsc", "BNB", "WBNB", "USDT", 3),
    );
    chains.insert(
        "43114".into(),
        ChainConfig::builtin("avalanche", "AVAX", "WAVAX", "USDC", 2),
    );
    chains
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub forge_path: String,
    pub timeout_seconds: u64,
    pub gas_limit: u64,
    /// Debugging aid: move the workspace aside instead of deleting it.
    pub keep_workspace: bool,
    /// Whole-unit provisioning per chain id, per asset symbol.
    pub initial_balances: BTreeMap<String, BTreeMap<String, u64>>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            forge_path: "forge".into(),
            timeout_seconds: 300,
            gas_limit: 30_000_000,
            keep_workspace: false,
            initial_balances: default_initial_balances(),
        }
    }
}

fn default_initial_balances() -> BTreeMap<String, BTreeMap<String, u64>> {
    let eth: BTreeMap<String, u64> = [
        ("ETH", 100_000),
        ("WETH", 100_000),
        ("USDC", 10_000_000),
        ("USDT", 10_000_000),
        ("DAI", 10_000_000),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let bsc: BTreeMap<String, u64> = [
        ("BNB", 100_000),
        ("WBNB", 100_000),
        ("USDT", 10_000_000),
        ("BUSD", 10_000_000),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let mut balances = BTreeMap::new();
    balances.insert("1".to_string(), eth);
    balances.insert("56".to_string(), bsc);
    balances
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub cache_ttl_hours: u64,
    pub coingecko_api_key: Option<String>,
    pub coingecko_base_url: String,
    pub request_timeout_seconds: u64,
    /// Pause before the single retry a tier gets on a transient failure.
    pub retry_delay_ms: u64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            cache_ttl_hours: 24,
            coingecko_api_key: None,
            coingecko_base_url: "https://api.coingecko.com/api/v3".into(),
            request_timeout_seconds: 10,
            retry_delay_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub timeout_seconds: u64,
    pub parallel: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfitabilityConfig {
    pub min_profit_usd: f64,
    /// Used only when no base-currency USD rate can be resolved.
    pub min_profit_base: f64,
    pub subtract_deficits: bool,
}

impl Default for ProfitabilityConfig {
    fn default() -> Self {
        Self {
            min_profit_usd: 1.0,
            min_profit_base: 0.001,
            subtract_deficits: false,
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml(&content)?)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(content)?;
        config.fill_chain_defaults();
        Ok(config)
    }

    fn fill_chain_defaults(&mut self) {
        for (id, builtin) in default_chains() {
            self.chains
                .entry(id)
                .and_modify(|c| c.fill_from(&builtin))
                .or_insert(builtin);
        }
    }

    /// Overlay process environment variables. Call once at startup.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let overrides = [
            ("1", "ETHEREUM_RPC_URL", "ETHEREUM_ARCHIVE_URL"),
            ("56", "BSC_RPC_URL", "BSC_ARCHIVE_URL"),
            ("43114", "AVALANCHE_RPC_URL", "AVALANCHE_ARCHIVE_URL"),
        ];
        for (id, rpc_var, archive_var) in overrides {
            let chain = self.chains.entry(id.to_string()).or_default();
            if let Some(url) = get(rpc_var) {
                chain.rpc_url = Some(url);
            }
            if let Some(url) = get(archive_var) {
                chain.archive_url = Some(url);
            }
        }

        if let Some(key) = get("ALCHEMY_API_KEY") {
            let eth = self.chains.entry("1".into()).or_default();
            if eth.archive_url.is_none() {
                eth.archive_url = Some(format!("https://eth-mainnet.g.alchemy.com/v2/{key}"));
            }
        }

        if let Some(path) = get("FOUNDRY_PATH") {
            self.harness.forge_path = path;
        }
        if let Some(key) = get("COINGECKO_API_KEY") {
            self.pricing.coingecko_api_key = Some(key);
        }

        self.fill_chain_defaults();
    }

    pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.get(&chain_id.to_string())
    }

    /// RPC endpoint to fork from. Archive nodes win over plain RPC.
    pub fn fork_url(&self, chain_id: u64) -> Result<String, VeriteError> {
        let chain = self.chain(chain_id).ok_or_else(|| {
            VeriteError::Configuration(format!("chain {chain_id} is not configured"))
        })?;
        chain
            .archive_url
            .iter()
            .chain(chain.rpc_url.iter())
            .find(|u| !u.trim().is_empty())
            .cloned()
            .ok_or_else(|| {
                VeriteError::Configuration(format!("no RPC URL configured for chain {chain_id}"))
            })
    }

    /// Plain RPC endpoint for state reads (falls back to the archive node).
    pub fn rpc_url(&self, chain_id: u64) -> Option<String> {
        let chain = self.chain(chain_id)?;
        chain
            .rpc_url
            .iter()
            .chain(chain.archive_url.iter())
            .find(|u| !u.trim().is_empty())
            .cloned()
    }

    pub fn base_currency(&self, chain_id: u64) -> String {
        self.chain(chain_id)
            .map(|c| c.base_currency.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "ETH".into())
    }

    pub fn initial_balances(&self, chain_id: u64) -> BTreeMap<String, u64> {
        self.harness
            .initial_balances
            .get(&chain_id.to_string())
            .cloned()
            .unwrap_or_default()
    }
}
