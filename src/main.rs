// src/main.rs: verite entry point

use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use verite::cli::{Cli, Commands};
use verite::infra::config::Config;
use verite::infra::logger;

#[tokio::main]
async fn main() {
    // Respects RUST_LOG / VERITE_LOG
    logger::init_logging("warn");

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => Config::load_from(Path::new(path))?,
        None => Config::load()?,
    };
    config.apply_env();
    let config = Arc::new(config);

    match &cli.command {
        Commands::Verify {
            candidate,
            target,
            chain,
            block,
            balances,
        } => {
            verite::cli::verify::run_verify(
                config.clone(),
                Path::new(candidate),
                target,
                *chain,
                *block,
                balances,
                cli.json,
            )
            .await
        }
        Commands::Price {
            token,
            chain,
            block,
            amount,
            compare,
        } => {
            verite::cli::price::run_price(&config, token, *chain, *block, *amount, *compare, cli.json)
                .await
        }
        Commands::Tools => verite::cli::tools::list_tools(&config),
        Commands::Tool { name, params } => verite::cli::tools::run_tool(&config, name, params).await,
    }
}
