// src/cli/mod.rs: CLI definition (clap derive)

pub mod price;
pub mod tools;
pub mod verify;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "verite", about = "Fork-based exploit candidate verification", version)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Emit JSON instead of a text summary
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a candidate contract against a forked chain and reconcile the result
    Verify {
        /// Solidity source of the candidate (must define `exploit()`)
        candidate: String,
        /// Address of the contract under test
        #[arg(long)]
        target: String,
        /// Chain id (1, 56, 43114)
        #[arg(long, default_value = "1")]
        chain: u64,
        /// Fork block number
        #[arg(long)]
        block: u64,
        /// Initial balance override, e.g. `--balance ETH=1000` (repeatable)
        #[arg(long = "balance", value_parser = parse_balance)]
        balances: Vec<(String, u64)>,
    },
    /// Resolve a token price through the pricing waterfall
    Price {
        /// Token symbol or address
        token: String,
        #[arg(long, default_value = "1")]
        chain: u64,
        /// Historical block (latest when omitted)
        #[arg(long)]
        block: Option<u64>,
        /// Also convert this many whole tokens to USD and base currency
        #[arg(long)]
        amount: Option<f64>,
        /// Query every source independently for the chain's reference tokens
        #[arg(long)]
        compare: bool,
    },
    /// List tool capability schemas as JSON
    Tools,
    /// Invoke a single tool capability
    Tool {
        /// Capability name
        name: String,
        /// Parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

/// `SYMBOL=AMOUNT` in whole units.
pub fn parse_balance(s: &str) -> Result<(String, u64), String> {
    let (symbol, amount) = s
        .split_once('=')
        .ok_or_else(|| format!("expected SYMBOL=AMOUNT, got '{s}'"))?;
    let amount = amount
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid amount in '{s}': {e}"))?;
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(format!("missing symbol in '{s}'"));
    }
    Ok((symbol.to_ascii_uppercase(), amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_balance() {
        assert_eq!(parse_balance("eth=100"), Ok(("ETH".to_string(), 100)));
        assert_eq!(parse_balance(" USDC = 5 "), Ok(("USDC".to_string(), 5)));
        assert!(parse_balance("ETH").is_err());
        assert!(parse_balance("=5").is_err());
        assert!(parse_balance("ETH=-1").is_err());
    }

    #[test]
    fn test_verify_args() {
        let cli = Cli::try_parse_from([
            "verite",
            "verify",
            "exploit.sol",
            "--target",
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "--block",
            "18000000",
            "--balance",
            "ETH=10",
        ])
        .unwrap();
        match cli.command {
            Commands::Verify {
                chain,
                block,
                balances,
                ..
            } => {
                assert_eq!(chain, 1);
                assert_eq!(block, 18_000_000);
                assert_eq!(balances, vec![("ETH".to_string(), 10)]);
            }
            _ => panic!("expected verify"),
        }
    }
}
