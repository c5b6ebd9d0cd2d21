// src/cli/price.rs: `verite price`

use serde_json::json;

use crate::infra::config::Config;
use crate::pricing::oracle::PricingOracle;
use crate::pricing::tokens;

pub async fn run_price(
    config: &Config,
    token: &str,
    chain_id: u64,
    block: Option<u64>,
    amount: Option<f64>,
    compare: bool,
    json_out: bool,
) -> anyhow::Result<()> {
    let oracle = PricingOracle::new(config)?;

    if compare {
        let comparisons = oracle.compare_sources(chain_id, block).await;
        if json_out {
            println!("{}", serde_json::to_string_pretty(&comparisons)?);
        } else {
            for c in &comparisons {
                println!(
                    "{:<6} mean ${:.4}  max deviation {:.2}%",
                    c.token, c.mean, c.max_deviation_percent
                );
                for (source, price) in &c.prices {
                    println!("    {source:<10} ${price:.4}");
                }
            }
        }
        return Ok(());
    }

    let resolution = oracle.resolve(token, chain_id, block).await;
    let Some(quote) = resolution.quote.clone() else {
        if json_out {
            println!("{}", serde_json::to_string_pretty(&resolution)?);
        }
        anyhow::bail!("no price available for {token} on chain {chain_id}");
    };

    let base_value = match amount {
        Some(a) => oracle.convert_to_base_currency(token, a, chain_id, block).await,
        None => None,
    };

    if json_out {
        let out = json!({
            "quote": quote,
            "attempts": resolution.attempts,
            "amount": amount,
            "usd_value": amount.map(|a| a * quote.price_usd),
            "base_value": base_value,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "{} on chain {}: ${:.6} (source {}, confidence {:.2})",
        quote.symbol, chain_id, quote.price_usd, quote.source, quote.confidence
    );
    for attempt in &resolution.attempts {
        println!("  {:<10} {:?}", attempt.source.as_str(), attempt.outcome);
    }
    if let Some(a) = amount {
        println!("  {a} {} = ${:.2}", quote.symbol, a * quote.price_usd);
        if let Some(b) = base_value {
            println!("  = {b:.6} {}", tokens::base_currency(chain_id));
        }
    }
    Ok(())
}
