use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::scoring::ScoredInstrument;
use crate::stocks::{Instrument, PriceBook, TARGET_CURRENCY};

/// One selected instrument and the price paid for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioEntry {
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationResult {
    pub entries: Vec<PortfolioEntry>,
    pub remaining_budget: f64,
}

impl AllocationResult {
    pub fn total_cost(&self) -> f64 {
        self.entries.iter().map(|e| e.price).sum()
    }
}

impl fmt::Display for AllocationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Portfolio:")?;
        for entry in &self.entries {
            writeln!(f, "{} - {:.2} {}", entry.name, entry.price, TARGET_CURRENCY)?;
        }
        writeln!(f)?;
        write!(f, "Remaining Budget: {:.2} {}", self.remaining_budget, TARGET_CURRENCY)
    }
}

/// Greedy single-pass allocation over an already ranked list.
///
/// Each instrument whose price fits in the remaining budget is bought once and
/// its price deducted. The walk stops when the budget is used up or the ranking
/// runs out. Instruments without a positive quote in `prices` are skipped rather
/// than treated as free.
pub fn build_portfolio(ranked: &[Instrument], prices: &PriceBook, budget: f64) -> AllocationResult {
    let mut entries = Vec::new();
    let mut remaining_budget = budget;

    if budget.is_nan() || budget <= 0.0 {
        warn!(budget, "non-positive budget, nothing to allocate");
        return AllocationResult { entries, remaining_budget: budget.max(0.0) };
    }

    for instrument in ranked {
        let price = match prices.get(&instrument.figi) {
            Some(&p) if p > 0.0 && p.is_finite() => p,
            Some(&p) => {
                warn!(figi = %instrument.figi, price = p, "unusable quote, skipping");
                continue;
            }
            None => {
                warn!(figi = %instrument.figi, "no quote, skipping");
                continue;
            }
        };

        if price <= remaining_budget {
            entries.push(PortfolioEntry { name: instrument.name.clone(), price });
            remaining_budget -= price;
            debug!(name = %instrument.name, price, remaining_budget, "added to portfolio");
        }

        if remaining_budget <= 0.0 {
            break;
        }
    }

    info!(
        positions = entries.len(),
        spent = budget - remaining_budget,
        remaining_budget,
        "[BUDGET] allocation complete"
    );

    AllocationResult { entries, remaining_budget }
}

/// `build_portfolio` over scorer output.
pub fn build_from_ranking(ranked: &[ScoredInstrument], prices: &PriceBook, budget: f64) -> AllocationResult {
    let ordering: Vec<Instrument> = ranked.iter().map(|s| s.instrument.clone()).collect();
    build_portfolio(&ordering, prices, budget)
}
