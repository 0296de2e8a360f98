//! Investment decision pipeline
//!
//! Two independent branches selected by `InvestmentClass`:
//! - stocks: fetch -> volatility -> rank -> allocate
//! - deposit: fixed-rate growth estimate
//!
//! Nothing is kept between calls.

use std::fmt;
use tracing::info;

use crate::broker::MarketDataApi;
use crate::deposit::{estimate_deposit, DepositEstimate, Horizon};
use crate::error::Result;
use crate::investor::{validate_budget, InvestmentClass, InvestmentRequest};
use crate::portfolio::{build_from_ranking, AllocationResult};
use crate::scoring::InstrumentScorer;
use crate::stocks::{fetch_market_data, FetchSettings, ShareFilter};
use crate::volatility::calculate_volatility;

#[derive(Debug, Clone, PartialEq)]
pub enum Recommendation {
    Stocks(AllocationResult),
    Deposit(DepositEstimate),
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Stocks(a) => fmt::Display::fmt(a, f),
            Recommendation::Deposit(d) => fmt::Display::fmt(d, f),
        }
    }
}

/// Stocks branch. The budget is checked before any request goes out.
pub async fn run_stock_pipeline<A, S>(
    api: &A,
    scorer: &S,
    settings: &FetchSettings,
    budget: f64,
    filter: &ShareFilter,
) -> Result<AllocationResult>
where
    A: MarketDataApi + ?Sized,
    S: InstrumentScorer + ?Sized,
{
    let budget = validate_budget(budget)?;

    let snapshot = fetch_market_data(api, filter, settings).await?;
    let volatility = calculate_volatility(&snapshot.closes);
    let ranked = scorer.rank(&snapshot.instruments, &snapshot.prices, volatility);
    let allocation = build_from_ranking(&ranked, &snapshot.prices, budget);

    info!(
        candidates = ranked.len(),
        positions = allocation.entries.len(),
        spent = allocation.total_cost(),
        remaining_budget = allocation.remaining_budget,
        "stock pipeline finished"
    );
    Ok(allocation)
}

/// Deposit branch. Pure, no I/O.
pub fn run_deposit_pipeline(budget: f64, horizon: Horizon) -> Result<DepositEstimate> {
    let budget = validate_budget(budget)?;
    let estimate = estimate_deposit(budget, horizon);
    info!(
        horizon = horizon.label(),
        growth = estimate.growth,
        profit = estimate.profit,
        "deposit estimate"
    );
    Ok(estimate)
}

/// Dispatch a request to its branch.
pub async fn run<A, S>(
    request: &InvestmentRequest,
    api: &A,
    scorer: &S,
    settings: &FetchSettings,
) -> Result<Recommendation>
where
    A: MarketDataApi + ?Sized,
    S: InstrumentScorer + ?Sized,
{
    match request.class {
        InvestmentClass::Stocks => {
            run_stock_pipeline(api, scorer, settings, request.budget, &request.filter)
                .await
                .map(Recommendation::Stocks)
        }
        InvestmentClass::Deposit => {
            run_deposit_pipeline(request.budget, request.horizon).map(Recommendation::Deposit)
        }
    }
}
