use tracing::{info, warn};

/// Natural-log returns between consecutive closes.
///
/// Non-positive closes have no logarithm; a pair touching one is dropped.
pub fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| w[1].ln() - w[0].ln())
        .collect()
}

/// Population standard deviation (divides by n).
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Standard deviation of log-returns over a pooled close series.
///
/// The series is the concatenation of every instrument's candles, so the
/// figure is one pooled number, not a per-instrument volatility. An empty
/// series yields 0.
pub fn calculate_volatility(closes: &[f64]) -> f64 {
    if closes.is_empty() {
        warn!("no candle data available");
        return 0.0;
    }

    let returns = log_returns(closes);
    let volatility = std_dev(&returns);
    info!(volatility, samples = returns.len(), "pooled volatility");
    volatility
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_series_is_zero() {
        assert_eq!(calculate_volatility(&[]), 0.0);
    }

    #[test]
    fn single_close_is_zero() {
        assert_eq!(calculate_volatility(&[42.0]), 0.0);
    }

    #[test]
    fn constant_series_is_zero() {
        let closes = vec![250.0; 30];
        assert!(calculate_volatility(&closes).abs() < 1e-12);
    }

    #[test]
    fn alternating_series_matches_hand_computation() {
        // ln(110/100) and ln(100/110) alternate: mean 0, std = |ln(1.1)|
        let closes = vec![100.0, 110.0, 100.0, 110.0, 100.0];
        let expected = (1.1f64).ln();
        assert!((calculate_volatility(&closes) - expected).abs() < 1e-12);
    }

    #[test]
    fn scaling_prices_leaves_volatility_unchanged() {
        let closes = vec![10.0, 12.0, 11.0, 13.5, 12.2];
        let scaled: Vec<f64> = closes.iter().map(|c| c * 37.0).collect();
        assert!((calculate_volatility(&closes) - calculate_volatility(&scaled)).abs() < 1e-12);
    }

    #[test]
    fn non_positive_closes_are_ignored() {
        let returns = log_returns(&[100.0, 0.0, 100.0, 110.0]);
        assert_eq!(returns.len(), 1);
        assert!((returns[0] - (1.1f64).ln()).abs() < 1e-12);
    }
}
