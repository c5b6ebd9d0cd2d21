// src/tools/registry.rs: Capability registry

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Capability, ToolSchema};
use crate::pricing::oracle::PricingOracle;

/// Fixed set of capabilities, registered once at startup.
pub struct ToolRegistry {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            capabilities: BTreeMap::new(),
        }
    }

    /// Registry with every builtin capability wired in.
    pub fn with_builtins(oracle: Arc<PricingOracle>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::sanitizer::CodeSanitizer));
        registry.register(Arc::new(super::flash_loan::FlashLoanPlanner));
        registry.register(Arc::new(super::liquidity::LiquidityAnalyzer));
        registry.register(Arc::new(super::price_lookup::PriceLookup::new(oracle)));
        registry
    }

    /// Register a capability. A later registration with the same name wins.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        if self.capabilities.insert(name.clone(), capability).is_some() {
            tracing::warn!(tool = %name, "Replacing previously registered capability");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.capabilities.keys().map(|s| s.as_str()).collect()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.capabilities.values().map(|c| c.schema()).collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
