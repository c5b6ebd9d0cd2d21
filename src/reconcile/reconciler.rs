// src/reconcile/reconciler.rs: Economic performance of one execution
//
// Π = direct base-currency delta + surplus assets converted to base currency.
// Deficits are priced for the report and only reduce Π when the profitability
// policy asks for it. A missing price never aborts reconciliation: the asset
// contributes 0 and is flagged low-confidence.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

use super::validator::{ComplianceReport, Validator};
use super::BalanceChange;
use crate::infra::config::ProfitabilityConfig;
use crate::pricing::oracle::PricingOracle;
use crate::pricing::{tokens, PriceQuote, SourceKind};

/// Quotes below this confidence (the static table) mark an asset as
/// low-confidence.
pub const LOW_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurplusConversion {
    pub token: String,
    /// Whole tokens gained.
    pub amount: f64,
    /// Base-currency units per whole token, when resolvable.
    pub rate: Option<f64>,
    pub base_value: f64,
    pub source: Option<SourceKind>,
    pub low_confidence: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeficitResolution {
    pub token: String,
    /// Whole tokens spent, positive.
    pub amount: f64,
    pub rate: Option<f64>,
    /// Base currency needed to buy back `amount`.
    pub acquisition_cost: f64,
    pub source: Option<SourceKind>,
    pub low_confidence: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdBasis {
    Usd,
    BaseCurrency,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub chain_id: u64,
    pub block: Option<u64>,
    pub base_currency: String,
    pub direct_base_delta: f64,
    pub surplus_conversions: Vec<SurplusConversion>,
    pub deficit_resolutions: Vec<DeficitResolution>,
    pub deficit_cost: f64,
    pub deficits_subtracted: bool,
    /// Π, in base currency.
    pub total_base: f64,
    /// USD per base-currency unit at the same block.
    pub base_usd_rate: Option<f64>,
    pub total_usd: Option<f64>,
    pub profitable: bool,
    pub threshold_basis: ThresholdBasis,
    pub low_confidence: bool,
    pub compliance: ComplianceReport,
}

impl ReconciliationReport {
    /// Tokens whose contribution rests on a weak or missing price.
    pub fn low_confidence_tokens(&self) -> Vec<&str> {
        let surplus = self
            .surplus_conversions
            .iter()
            .filter(|c| c.low_confidence)
            .map(|c| c.token.as_str());
        let deficit = self
            .deficit_resolutions
            .iter()
            .filter(|d| d.low_confidence)
            .map(|d| d.token.as_str());
        surplus.chain(deficit).collect()
    }
}

/// Base-currency rate of one token, with the weaker of the two confidences.
struct Rate {
    rate: Option<f64>,
    source: Option<SourceKind>,
    low_confidence: bool,
}

fn rate_from(token: Option<&PriceQuote>, base: Option<&PriceQuote>) -> Rate {
    match (token, base) {
        (Some(t), Some(b)) => Rate {
            rate: Some(t.price_usd / b.price_usd),
            source: Some(t.source),
            low_confidence: t.confidence.min(b.confidence) < LOW_CONFIDENCE,
        },
        (t, _) => Rate {
            rate: None,
            source: t.map(|q| q.source),
            low_confidence: true,
        },
    }
}

pub struct Reconciler {
    oracle: Arc<PricingOracle>,
    policy: ProfitabilityConfig,
    validator: Validator,
}

impl Reconciler {
    pub fn new(oracle: Arc<PricingOracle>, policy: ProfitabilityConfig) -> Self {
        Self {
            oracle,
            policy,
            validator: Validator::new(),
        }
    }

    /// Canonical profitability predicate: Π > 0 and, when a USD rate is
    /// known, the USD value clears `min_profit_usd`; otherwise Π clears
    /// `min_profit_base`.
    pub fn is_profitable(&self, total_base: f64, total_usd: Option<f64>) -> (bool, ThresholdBasis) {
        match total_usd {
            Some(usd) => (total_base > 0.0 && usd >= self.policy.min_profit_usd, ThresholdBasis::Usd),
            None => (
                total_base > 0.0 && total_base >= self.policy.min_profit_base,
                ThresholdBasis::BaseCurrency,
            ),
        }
    }

    pub async fn reconcile(
        &self,
        changes: &[BalanceChange],
        base_currency: &str,
        chain_id: u64,
        block: Option<u64>,
    ) -> ReconciliationReport {
        let is_base = |token: &str| {
            token.eq_ignore_ascii_case(base_currency) || tokens::is_base_like(chain_id, token)
        };

        let direct_base_delta: f64 = changes
            .iter()
            .filter(|c| is_base(c.token.as_str()))
            .map(|c| c.net)
            .sum();

        let priced: Vec<&BalanceChange> = changes
            .iter()
            .filter(|c| !is_base(c.token.as_str()) && c.net != 0.0)
            .collect();

        let base_quote = self.oracle.get_price(base_currency, chain_id, block).await;
        let quotes = join_all(
            priced
                .iter()
                .map(|c| self.oracle.get_price(&c.token, chain_id, block)),
        )
        .await;

        let mut surplus_conversions = Vec::new();
        let mut deficit_resolutions = Vec::new();
        for (change, quote) in priced.into_iter().zip(quotes) {
            let rate = rate_from(quote.as_ref(), base_quote.as_ref());
            if rate.rate.is_none() {
                tracing::warn!(
                    token = %change.token,
                    chain_id,
                    "No base-currency rate, asset contributes 0"
                );
            }
            let value = change.net.abs() * rate.rate.unwrap_or(0.0);
            if change.surplus {
                surplus_conversions.push(SurplusConversion {
                    token: change.token.clone(),
                    amount: change.net,
                    rate: rate.rate,
                    base_value: value,
                    source: rate.source,
                    low_confidence: rate.low_confidence,
                });
            } else {
                deficit_resolutions.push(DeficitResolution {
                    token: change.token.clone(),
                    amount: -change.net,
                    rate: rate.rate,
                    acquisition_cost: value,
                    source: rate.source,
                    low_confidence: rate.low_confidence,
                });
            }
        }

        let surplus_total: f64 = surplus_conversions.iter().map(|c| c.base_value).sum();
        let deficit_cost: f64 = deficit_resolutions.iter().map(|d| d.acquisition_cost).sum();
        let mut total_base = direct_base_delta + surplus_total;
        if self.policy.subtract_deficits {
            total_base -= deficit_cost;
        }

        let base_usd_rate = base_quote.as_ref().map(|q| q.price_usd);
        let total_usd = base_usd_rate.map(|r| total_base * r);
        let (profitable, threshold_basis) = self.is_profitable(total_base, total_usd);

        let low_confidence = surplus_conversions.iter().any(|c| c.low_confidence)
            || deficit_resolutions.iter().any(|d| d.low_confidence)
            || base_quote.is_none();

        tracing::info!(
            chain_id,
            total_base,
            total_usd = ?total_usd,
            profitable,
            "Reconciled balance changes"
        );

        ReconciliationReport {
            chain_id,
            block,
            base_currency: base_currency.to_string(),
            direct_base_delta,
            surplus_conversions,
            deficit_resolutions,
            deficit_cost,
            deficits_subtracted: self.policy.subtract_deficits,
            total_base,
            base_usd_rate,
            total_usd,
            profitable,
            threshold_basis,
            low_confidence,
            compliance: self.validator.compliance_report(changes, chain_id),
        }
    }
}
