// src/harness/synthesizer.rs: Build a self-contained Foundry project around a candidate
//
// The candidate is cleaned and checksummed, then embedded in a single test
// file together with a scaffold that deploys it, provisions it, calls
// `exploit()` inside try/catch and prints one marker line per measurement.
// The scaffold never re-reverts, so markers are printed on every path.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use super::checksum::{checksum_literals, to_checksum};
use super::cleaner::clean_candidate;
use super::markers::{self, CURRENT_VERSION, MONITORED_SLOTS};
use crate::infra::config::Config;
use crate::infra::errors::VeriteError;
use crate::pricing::sources::fallback::static_rate;
use crate::pricing::tokens;

pub const DEFAULT_CONTRACT_NAME: &str = "ExploitContract";
pub const TEST_FILE: &str = "test/ExploitTest.t.sol";
pub const TEST_NAME: &str = "testExploit";

const WEI: f64 = 1e18;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionedAsset {
    pub symbol: String,
    /// `None` for the chain's native currency.
    pub address: Option<String>,
    /// Whole units.
    pub amount: u64,
    pub decimals: u8,
    /// Base-currency wei per whole token used for VALUE_EXTRACTED.
    pub rate_wei: u128,
}

impl ProvisionedAsset {
    pub fn is_native(&self) -> bool {
        self.address.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HarnessProject {
    pub chain_id: u64,
    pub target: String,
    pub fork_url: String,
    pub fork_block: u64,
    pub contract_name: String,
    pub candidate_source: String,
    pub foundry_toml: String,
    pub test_source: String,
    pub provisioned: Vec<ProvisionedAsset>,
}

impl HarnessProject {
    /// Write `foundry.toml` and the test file into an initialized project.
    pub fn write_to(&self, dir: &Path) -> Result<(), VeriteError> {
        std::fs::write(dir.join("foundry.toml"), &self.foundry_toml)?;
        let test_path = dir.join(TEST_FILE);
        if let Some(parent) = test_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(test_path, &self.test_source)?;
        Ok(())
    }
}

#[derive(Serialize)]
struct FoundryProfile {
    src: &'static str,
    out: &'static str,
    libs: Vec<&'static str>,
    gas_limit: u64,
    optimizer: bool,
    optimizer_runs: u32,
    eth_rpc_url: String,
    fork_block_number: u64,
}

#[derive(Serialize)]
struct FoundryToml {
    profile: BTreeMap<&'static str, FoundryProfile>,
    rpc_endpoints: BTreeMap<String, String>,
}

pub struct Synthesizer {
    config: Arc<Config>,
}

impl Synthesizer {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn synthesize(
        &self,
        candidate: &str,
        target: &str,
        fork_block: u64,
        chain_id: u64,
        initial_balances: &BTreeMap<String, u64>,
    ) -> Result<HarnessProject, VeriteError> {
        let fork_url = self.config.fork_url(chain_id)?;
        url::Url::parse(&fork_url).map_err(|e| {
            VeriteError::Configuration(format!("invalid RPC URL for chain {chain_id}: {e}"))
        })?;
        let target = to_checksum(target)?;

        let checksummed = checksum_literals(candidate, &target)?;
        let cleaned = clean_candidate(&checksummed);
        let contract_name = cleaned
            .contract_name
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTRACT_NAME.to_string());

        let provisioned = self.provisioning(chain_id, initial_balances)?;
        let foundry_toml = self.foundry_toml(chain_id, &fork_url, fork_block)?;
        let test_source = render_test(&cleaned.code, &contract_name, &target, chain_id, &provisioned);

        tracing::debug!(
            chain_id,
            fork_block,
            contract = %contract_name,
            assets = provisioned.len(),
            "Synthesized harness project"
        );

        Ok(HarnessProject {
            chain_id,
            target,
            fork_url,
            fork_block,
            contract_name,
            candidate_source: cleaned.code,
            foundry_toml,
            test_source,
            provisioned,
        })
    }

    fn provisioning(
        &self,
        chain_id: u64,
        balances: &BTreeMap<String, u64>,
    ) -> Result<Vec<ProvisionedAsset>, VeriteError> {
        let base = self.config.base_currency(chain_id);
        let base_usd = static_rate(chain_id, &base);
        let mut assets = Vec::with_capacity(balances.len());

        for (symbol, amount) in balances {
            if symbol.eq_ignore_ascii_case(&base) {
                assets.push(ProvisionedAsset {
                    symbol: base.clone(),
                    address: None,
                    amount: *amount,
                    decimals: 18,
                    rate_wei: WEI as u128,
                });
                continue;
            }
            let Some(info) = tokens::lookup(chain_id, symbol) else {
                tracing::warn!(chain_id, symbol = %symbol, "Unknown provisioning asset, skipping");
                continue;
            };
            let rate_wei = if tokens::is_base_like(chain_id, &info.symbol) {
                WEI as u128
            } else {
                match (static_rate(chain_id, &info.symbol), base_usd) {
                    (Some(token_usd), Some(base_usd)) => (token_usd * WEI / base_usd).round() as u128,
                    _ => 0,
                }
            };
            assets.push(ProvisionedAsset {
                symbol: info.symbol.clone(),
                address: Some(to_checksum(&info.address)?),
                amount: *amount,
                decimals: info.decimals,
                rate_wei,
            });
        }
        Ok(assets)
    }

    fn foundry_toml(&self, chain_id: u64, fork_url: &str, fork_block: u64) -> Result<String, VeriteError> {
        let alias = self
            .config
            .chain(chain_id)
            .map(|c| c.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("chain{chain_id}"));

        let doc = FoundryToml {
            profile: BTreeMap::from([(
                "default",
                FoundryProfile {
                    src: "src",
                    out: "out",
                    libs: vec!["lib"],
                    gas_limit: self.config.harness.gas_limit,
                    optimizer: true,
                    optimizer_runs: 200,
                    eth_rpc_url: fork_url.to_string(),
                    fork_block_number: fork_block,
                },
            )]),
            rpc_endpoints: BTreeMap::from([(alias, fork_url.to_string())]),
        };
        toml::to_string(&doc).map_err(|e| VeriteError::Other(e.into()))
    }
}

fn render_provision(assets: &[ProvisionedAsset]) -> String {
    let mut out = String::new();
    for asset in assets {
        match &asset.address {
            None => {
                let _ = writeln!(
                    out,
                    "        vm.deal(address(exploitContract), {} ether);",
                    asset.amount
                );
            }
            Some(addr) => {
                let _ = writeln!(
                    out,
                    "        deal({addr}, address(exploitContract), {} * 10**{});",
                    asset.amount, asset.decimals
                );
            }
        }
    }
    out
}

/// Statement that loads the candidate's current balance of `asset` into `dest`.
fn balance_into(asset: &ProvisionedAsset, dest: &str) -> String {
    match &asset.address {
        None => format!("        {dest} = candidate.balance;\n"),
        Some(addr) => format!("        (, {dest}) = _balanceOf({addr}, candidate);\n"),
    }
}

// Per-asset snapshots live in storage so no function keeps more than a
// handful of locals on the stack, whatever the number of assets.
fn render_initial(assets: &[ProvisionedAsset]) -> String {
    let mut out = String::new();
    for (i, asset) in assets.iter().enumerate() {
        out.push_str(&balance_into(asset, &format!("initialAssets[{i}]")));
        let _ = writeln!(
            out,
            "        console.log(\"{}:\", initialAssets[{i}]);",
            markers::asset_initial(&asset.symbol)
        );
    }
    out
}

fn render_final(assets: &[ProvisionedAsset]) -> String {
    let mut out = String::new();
    for (i, asset) in assets.iter().enumerate() {
        out.push_str(&balance_into(asset, "current"));
        if !asset.is_native() && asset.rate_wei > 0 {
            let _ = writeln!(
                out,
                "        if (current > initialAssets[{i}]) {{ ethFromTokens += (current - initialAssets[{i}]) * {} / 10**{}; }}",
                asset.rate_wei, asset.decimals
            );
        }
        let _ = writeln!(
            out,
            "        console.log(\"{}:\", current);",
            markers::asset_final(&asset.symbol)
        );
        let _ = writeln!(
            out,
            "        console.log(\"{}:\", uint256({}));",
            markers::asset_decimals(&asset.symbol),
            asset.decimals
        );
    }
    out
}

fn render_slots_before() -> String {
    MONITORED_SLOTS
        .iter()
        .map(|s| format!("        slotsBefore[{s}] = vm.load(TARGET, bytes32(uint256({s})));\n"))
        .collect()
}

fn render_slots_after() -> String {
    let mut out = String::new();
    for s in MONITORED_SLOTS {
        let _ = writeln!(
            out,
            "        changed = vm.load(TARGET, bytes32(uint256({s}))) != slotsBefore[{s}];"
        );
        let _ = writeln!(
            out,
            "        console.log(\"{}:\", changed);",
            markers::storage_slot_changed(s)
        );
        let _ = writeln!(out, "        stateChanged = stateChanged || changed;");
    }
    out
}

const TEMPLATE: &str = r#"// SPDX-License-Identifier: MIT
pragma solidity ^0.8.0;

import "forge-std/Test.sol";

__CANDIDATE__

contract ExploitTest is Test {
    __CONTRACT__ public exploitContract;

    address public constant TARGET = __TARGET__;

    uint256 internal initialNative;
    bool internal targetIsToken;
    uint256 internal initialTokenBalance;
    mapping(uint256 => uint256) internal initialAssets;
    mapping(uint256 => bytes32) internal slotsBefore;

    function setUp() public {
        exploitContract = new __CONTRACT__();
        console.log("__VERSION_KEY__:", uint256(__VERSION__));
        console.log("__CONTRACT_KEY__:", address(exploitContract));
        console.log("__TARGET_KEY__:", TARGET);
        // chain __CHAIN_ID__
__PROVISION__    }

    function _balanceOf(address token, address holder) internal view returns (bool, uint256) {
        (bool ok, bytes memory data) = token.staticcall(abi.encodeWithSignature("balanceOf(address)", holder));
        if (!ok || data.length < 32) {
            return (false, 0);
        }
        return (true, abi.decode(data, (uint256)));
    }

    function testExploit() public {
        _recordInitialState();
        bool callSucceeded = _runExploit();
        console.log("EXPLOIT_EXECUTED_SUCCESSFULLY:", callSucceeded);
        _reportStorageChanges();

        int256 ethGained = int256(address(exploitContract).balance) - int256(initialNative);
        console.log("ETH_GAINED:", ethGained);
        uint256 ethFromTokens = _reportAssets();
        _reportTargetToken();
        console.log("ETH_FROM_TOKENS:", ethFromTokens);
        console.log("VALUE_EXTRACTED:", ethGained + int256(ethFromTokens));
    }

    function _recordInitialState() internal {
        address candidate = address(exploitContract);
        initialNative = candidate.balance;
__INITIAL__        (targetIsToken, initialTokenBalance) = _balanceOf(TARGET, candidate);
        if (targetIsToken) {
            console.log("INITIAL_TOKEN_BALANCE:", initialTokenBalance);
        }
__SLOTS_BEFORE__    }

    function _runExploit() internal returns (bool callSucceeded) {
        uint256 gasBefore = gasleft();
        try exploitContract.exploit() {
            callSucceeded = true;
        } catch Error(string memory reason) {
            console.log("EXPLOIT_FAILED_REASON:", reason);
        } catch (bytes memory) {
            console.log("EXPLOIT_FAILED_REASON:", "low-level revert");
        }
        console.log("GAS_USED:", gasBefore - gasleft());
    }

    function _reportStorageChanges() internal {
        bool stateChanged = false;
        bool changed;
__SLOTS_AFTER__        console.log("EXPLOIT_CAUSED_STATE_CHANGES:", stateChanged);
    }

    function _reportAssets() internal returns (uint256 ethFromTokens) {
        address candidate = address(exploitContract);
        uint256 current;
__FINAL__    }

    function _reportTargetToken() internal {
        if (!targetIsToken) {
            return;
        }
        (, uint256 finalTokenBalance) = _balanceOf(TARGET, address(exploitContract));
        console.log("FINAL_TOKEN_BALANCE:", finalTokenBalance);
        console.log(
            "TOKENS_EXTRACTED:",
            finalTokenBalance > initialTokenBalance ? finalTokenBalance - initialTokenBalance : 0
        );
        (bool decOk, bytes memory decData) = TARGET.staticcall(abi.encodeWithSignature("decimals()"));
        if (decOk && decData.length >= 32) {
            console.log("TOKEN_DECIMALS:", abi.decode(decData, (uint256)));
        }
    }
}
"#;

pub fn render_test(
    candidate: &str,
    contract_name: &str,
    target: &str,
    chain_id: u64,
    assets: &[ProvisionedAsset],
) -> String {
    TEMPLATE
        .replace("__CANDIDATE__", candidate)
        .replace("__CONTRACT__", contract_name)
        .replace("__TARGET__", target)
        .replace("__VERSION_KEY__", markers::HARNESS_VERSION)
        .replace("__VERSION__", &CURRENT_VERSION.to_string())
        .replace("__CONTRACT_KEY__", markers::EXPLOIT_CONTRACT_ADDRESS)
        .replace("__TARGET_KEY__", markers::TARGET_ADDRESS)
        .replace("__CHAIN_ID__", &chain_id.to_string())
        .replace("__PROVISION__", &render_provision(assets))
        .replace("__INITIAL__", &render_initial(assets))
        .replace("__SLOTS_BEFORE__", &render_slots_before())
        .replace("__SLOTS_AFTER__", &render_slots_after())
        .replace("__FINAL__", &render_final(assets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TARGET: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

    fn config_with_rpc() -> Arc<Config> {
        let mut config = Config::default();
        let env: HashMap<&str, &str> = [("ETHEREUM_RPC_URL", "http://localhost:8545")]
            .into_iter()
            .collect();
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));
        Arc::new(config)
    }

    fn candidate() -> &'static str {
        r#"// SPDX-License-Identifier: MIT
pragma solidity ^0.8.0;
interface IVault { function drain() external; }
contract Drainer {
    function exploit() external {
        IVault(0xTARGET_CONTRACT_ADDRESS).drain();
    }
}"#
    }

    #[test]
    fn test_missing_rpc_is_configuration_error() {
        let synth = Synthesizer::new(Arc::new(Config::default()));
        let err = synth
            .synthesize(candidate(), TARGET, 18_000_000, 1, &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, VeriteError::Configuration(_)));
    }

    #[test]
    fn test_project_layout() {
        let config = config_with_rpc();
        let synth = Synthesizer::new(config.clone());
        let project = synth
            .synthesize(candidate(), TARGET, 18_000_000, 1, &config.initial_balances(1))
            .unwrap();

        assert_eq!(project.contract_name, "Drainer");
        assert_eq!(project.target, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert!(project.foundry_toml.contains("fork_block_number = 18000000"));
        assert!(project.foundry_toml.contains("eth_rpc_url = \"http://localhost:8545\""));
        assert!(project.foundry_toml.contains("[profile.default]"));
        let parsed: toml::Value = toml::from_str(&project.foundry_toml).unwrap();
        let profile = &parsed["profile"]["default"];
        assert_eq!(profile["optimizer"].as_bool(), Some(true));
        assert_eq!(profile["optimizer_runs"].as_integer(), Some(200));
        assert_eq!(profile["libs"][0].as_str(), Some("lib"));
        assert_eq!(parsed["rpc_endpoints"].as_table().map(|t| t.len()), Some(1));

        let src = &project.test_source;
        assert_eq!(src.matches("pragma solidity").count(), 1);
        assert!(src.contains("IVault(0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed).drain();"));
        assert!(src.contains("receive() external payable {}"));
        assert!(src.contains("Drainer public exploitContract;"));
        assert!(src.contains("vm.deal(address(exploitContract), 100000 ether);"));
        assert!(src.contains(
            "deal(0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48, address(exploitContract), 10000000 * 10**6);"
        ));
        assert!(src.contains("console.log(\"ASSET_INITIAL_USDC:\", initialAssets["));
        assert!(src.contains("console.log(\"STORAGE_SLOT_CHANGED_4:\", changed);"));
        assert!(src.contains("console.log(\"HARNESS_VERSION:\", uint256(1));"));
        assert!(!src.contains("__"));
    }

    /// Named locals and catch parameters declared in each function body.
    fn locals_per_function(src: &str) -> Vec<(String, usize)> {
        src.split("\n    function ")
            .skip(1)
            .map(|chunk| {
                let (signature, body) = chunk.split_once('\n').unwrap_or((chunk, ""));
                let name = signature.split('(').next().unwrap_or_default().to_string();
                let words: Vec<&str> = body.split_whitespace().collect();
                let count = words
                    .windows(2)
                    .filter(|w| {
                        let ty = w[0].trim_start_matches('(');
                        match ty {
                            "uint256" | "int256" | "bool" | "bytes32" | "address" => {
                                w[1].starts_with(|c: char| c.is_ascii_alphabetic())
                            }
                            "bytes" | "string" => w[1] == "memory",
                            _ => false,
                        }
                    })
                    .count();
                (name, count)
            })
            .collect()
    }

    #[test]
    fn test_scaffold_locals_stay_shallow() {
        let config = config_with_rpc();
        let synth = Synthesizer::new(config.clone());
        let every_token: BTreeMap<String, u64> = tokens::all(1)
            .into_iter()
            .map(|t| (t.symbol, 1_000u64))
            .collect();

        for balances in [config.initial_balances(1), every_token] {
            let project = synth
                .synthesize(candidate(), TARGET, 18_000_000, 1, &balances)
                .unwrap();
            let functions = locals_per_function(&project.test_source);
            assert!(functions.iter().any(|(name, _)| name == "testExploit"));
            assert!(functions.len() >= 6);
            for (name, count) in functions {
                assert!(count <= 6, "{name} declares {count} locals");
            }
            assert!(project.test_source.contains("mapping(uint256 => uint256) internal initialAssets;"));
        }
    }

    #[test]
    fn test_conservative_rates() {
        let config = config_with_rpc();
        let synth = Synthesizer::new(config.clone());
        let project = synth
            .synthesize(candidate(), TARGET, 1, 1, &config.initial_balances(1))
            .unwrap();
        let rate = |sym: &str| {
            project
                .provisioned
                .iter()
                .find(|a| a.symbol == sym)
                .map(|a| a.rate_wei)
                .unwrap()
        };
        assert_eq!(rate("ETH"), 1_000_000_000_000_000_000);
        assert_eq!(rate("WETH"), 1_000_000_000_000_000_000);
        assert_eq!(rate("USDC"), 312_500_000_000_000);
        assert!(project.provisioned.iter().find(|a| a.symbol == "ETH").unwrap().is_native());
    }

    #[test]
    fn test_unknown_asset_skipped_and_default_name() {
        let config = config_with_rpc();
        let synth = Synthesizer::new(config);
        let balances = BTreeMap::from([("SHIB".to_string(), 5u64)]);
        let project = synth
            .synthesize("library Nothing {}", TARGET, 1, 1, &balances)
            .unwrap();
        assert!(project.provisioned.is_empty());
        assert_eq!(project.contract_name, DEFAULT_CONTRACT_NAME);
    }

    #[test]
    fn test_write_to_directory() {
        let config = config_with_rpc();
        let project = Synthesizer::new(config)
            .synthesize(candidate(), TARGET, 1, 1, &BTreeMap::new())
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        project.write_to(dir.path()).unwrap();
        assert!(dir.path().join("foundry.toml").exists());
        let written = std::fs::read_to_string(dir.path().join(TEST_FILE)).unwrap();
        assert_eq!(written, project.test_source);
    }
}
