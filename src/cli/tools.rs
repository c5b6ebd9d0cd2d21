// src/cli/tools.rs: `verite tools` and `verite tool`

use std::sync::Arc;

use crate::infra::config::Config;
use crate::pricing::oracle::PricingOracle;
use crate::tools::executor::{ToolCall, ToolCallExecutor};
use crate::tools::registry::ToolRegistry;

fn registry(config: &Config) -> anyhow::Result<Arc<ToolRegistry>> {
    let oracle = PricingOracle::new(config)?;
    Ok(Arc::new(ToolRegistry::with_builtins(Arc::new(oracle))))
}

pub fn list_tools(config: &Config) -> anyhow::Result<()> {
    let schemas = registry(config)?.schemas();
    println!("{}", serde_json::to_string_pretty(&schemas)?);
    Ok(())
}

pub async fn run_tool(config: &Config, name: &str, params: &str) -> anyhow::Result<()> {
    let params: serde_json::Value =
        serde_json::from_str(params).map_err(|e| anyhow::anyhow!("--params is not valid JSON: {e}"))?;
    if !params.is_object() {
        anyhow::bail!("--params must be a JSON object");
    }

    let executor = ToolCallExecutor::new(registry(config)?, &config.tools);
    let call = executor.execute(ToolCall::from_json(name, params)).await;
    println!("{}", serde_json::to_string_pretty(&call)?);
    if call.error.is_some() {
        anyhow::bail!("tool {name} ended {}", call.status.as_str());
    }
    Ok(())
}
