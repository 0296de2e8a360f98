use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;
use crate::stocks::TARGET_CURRENCY;

/// Investment time-frame class; picks the deposit rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Horizon {
    #[default]
    ShortTerm,
    LongTerm,
}

impl Horizon {
    pub fn rate(self) -> f64 {
        match self {
            Horizon::ShortTerm => 0.03,
            Horizon::LongTerm => 0.06,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Horizon::ShortTerm => "Short-term",
            Horizon::LongTerm => "Long-term",
        }
    }
}

impl FromStr for Horizon {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "short-term" | "short" => Ok(Horizon::ShortTerm),
            "long-term" | "long" => Ok(Horizon::LongTerm),
            other => Err(PipelineError::InvalidInput(format!(
                "unknown horizon '{}', expected Short-term or Long-term",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DepositEstimate {
    pub growth: f64,
    pub profit: f64,
}

impl fmt::Display for DepositEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Expected growth: {:.2} {}", self.growth, TARGET_CURRENCY)?;
        write!(f, "Profit: {:.2} {}", self.profit, TARGET_CURRENCY)
    }
}

pub fn estimate_deposit(amount: f64, horizon: Horizon) -> DepositEstimate {
    let growth = amount * (1.0 + horizon.rate());
    DepositEstimate { growth, profit: growth - amount }
}
