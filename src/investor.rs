use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;

use crate::deposit::Horizon;
use crate::error::{PipelineError, Result};
use crate::stocks::ShareFilter;

/// Amounts offered when the user does not type their own.
pub const SUGGESTED_AMOUNTS: &[f64] = &[5000.0, 10000.0, 20000.0, 50000.0];

// Plain digits or comma/space-separated groups of three, optional decimals and currency.
static MONEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*((?:[0-9]{1,3}(?:[ ,][0-9]{3})+|[0-9]+)(?:\.[0-9]+)?)\s*(?:rub|руб\.?|₽)?\s*$")
        .expect("budget pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvestmentClass {
    #[default]
    Stocks,
    Deposit,
}

impl FromStr for InvestmentClass {
    type Err = PipelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stocks" | "stock" | "shares" => Ok(InvestmentClass::Stocks),
            "deposit" | "bank deposit" | "bank-deposit" => Ok(InvestmentClass::Deposit),
            other => Err(PipelineError::InvalidInput(format!(
                "unknown investment type '{}', expected Stocks or Bank Deposit",
                other
            ))),
        }
    }
}

/// Everything the caller decides before a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct InvestmentRequest {
    pub budget: f64,
    pub class: InvestmentClass,
    pub horizon: Horizon,
    pub filter: ShareFilter,
}

impl InvestmentRequest {
    /// Budget comes from `custom` when it is non-blank, otherwise from `suggested`.
    pub fn new(
        custom: Option<&str>,
        suggested: f64,
        class: InvestmentClass,
        horizon: Horizon,
        filter: ShareFilter,
    ) -> Result<Self> {
        Ok(Self {
            budget: resolve_budget(custom, suggested)?,
            class,
            horizon,
            filter,
        })
    }
}

/// Parse a user-typed amount such as `10000`, `12,500.50` or `7 000 RUB`.
pub fn parse_budget(text: &str) -> Result<f64> {
    let caps = MONEY_RE
        .captures(text)
        .ok_or_else(|| PipelineError::InvalidInput(format!("'{}' is not a valid amount", text.trim())))?;

    let digits: String = caps[1].chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    let amount: f64 = digits
        .parse()
        .map_err(|_| PipelineError::InvalidInput(format!("'{}' is not a valid amount", text.trim())))?;

    validate_budget(amount)
}

pub fn validate_budget(amount: f64) -> Result<f64> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(PipelineError::InvalidInput(format!(
            "investment amount must be a positive number, got {}",
            amount
        )));
    }
    Ok(amount)
}

pub fn resolve_budget(custom: Option<&str>, suggested: f64) -> Result<f64> {
    match custom.map(str::trim).filter(|s| !s.is_empty()) {
        Some(text) => parse_budget(text),
        None => validate_budget(suggested),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_formatted_amounts() {
        assert_eq!(parse_budget("10000").unwrap(), 10000.0);
        assert_eq!(parse_budget(" 12,500.50 ").unwrap(), 12500.5);
        assert_eq!(parse_budget("7 000 RUB").unwrap(), 7000.0);
        assert_eq!(parse_budget("3000₽").unwrap(), 3000.0);
        assert_eq!(parse_budget("2500 руб.").unwrap(), 2500.0);
        assert_eq!(parse_budget("1,234,567.5").unwrap(), 1234567.5);
        assert_eq!(parse_budget("999").unwrap(), 999.0);
    }

    #[test]
    fn rejects_garbage_and_non_positive_amounts() {
        for bad in [
            "", "abc", "-100", "0", "0.00", "12abc", "1.2.3", "$100",
            "12,50", "1,5", "1 2 3", "1,0000", "12,500,00",
        ] {
            assert!(
                matches!(parse_budget(bad), Err(PipelineError::InvalidInput(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn custom_amount_wins_over_suggested() {
        assert_eq!(resolve_budget(Some("750"), 5000.0).unwrap(), 750.0);
        assert_eq!(resolve_budget(Some("   "), 20000.0).unwrap(), 20000.0);
        assert_eq!(resolve_budget(None, SUGGESTED_AMOUNTS[0]).unwrap(), 5000.0);
        assert!(resolve_budget(Some("lots"), 5000.0).is_err());
        assert!(resolve_budget(None, f64::NAN).is_err());
    }

    #[test]
    fn investment_class_parsing() {
        assert_eq!("Stocks".parse::<InvestmentClass>().unwrap(), InvestmentClass::Stocks);
        assert_eq!("Bank Deposit".parse::<InvestmentClass>().unwrap(), InvestmentClass::Deposit);
        assert!("crypto".parse::<InvestmentClass>().is_err());
    }

    #[test]
    fn request_carries_resolved_budget() {
        let req = InvestmentRequest::new(
            None,
            10000.0,
            InvestmentClass::Deposit,
            Horizon::LongTerm,
            ShareFilter::default(),
        )
        .unwrap();
        assert_eq!(req.budget, 10000.0);
        assert_eq!(req.class, InvestmentClass::Deposit);
    }
}
