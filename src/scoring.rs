//! Instrument ranking
//!
//! Scoring sits behind `InstrumentScorer` so a real merit model can replace the
//! placeholder without touching allocation. The scorer receives prices and the
//! pooled volatility even though `RandomScorer` ignores both.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::stocks::{Instrument, PriceBook};

/// Upper bound (exclusive) of the placeholder score.
const RANDOM_SCORE_MAX: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredInstrument {
    pub instrument: Instrument,
    pub score: f64,
}

pub trait InstrumentScorer: Send + Sync {
    fn score(&self, instrument: &Instrument, prices: &PriceBook, volatility: f64) -> f64;

    /// Instruments ordered by score, highest first. Equal scores keep their input order.
    fn rank(
        &self,
        instruments: &[Instrument],
        prices: &PriceBook,
        volatility: f64,
    ) -> Vec<ScoredInstrument> {
        let mut scored: Vec<ScoredInstrument> = instruments
            .iter()
            .map(|i| ScoredInstrument {
                instrument: i.clone(),
                score: self.score(i, prices, volatility),
            })
            .collect();
        // a NaN score has no place in the ordering
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.retain(|s| !s.score.is_nan());
        scored
    }
}

/// Any `Fn(&Instrument, &PriceBook, f64) -> f64` is a scorer.
impl<F> InstrumentScorer for F
where
    F: Fn(&Instrument, &PriceBook, f64) -> f64 + Send + Sync,
{
    fn score(&self, instrument: &Instrument, prices: &PriceBook, volatility: f64) -> f64 {
        self(instrument, prices, volatility)
    }
}

/// Placeholder: uniformly random score in [0, 10) per instrument per run.
/// Carries no financial meaning.
pub struct RandomScorer {
    rng: Mutex<StdRng>,
}

impl RandomScorer {
    pub fn new() -> Self {
        Self { rng: Mutex::new(StdRng::from_entropy()) }
    }

    /// Reproducible sequence, for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl Default for RandomScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentScorer for RandomScorer {
    fn score(&self, _instrument: &Instrument, _prices: &PriceBook, _volatility: f64) -> f64 {
        self.rng.lock().gen_range(0.0..RANDOM_SCORE_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::mock::instrument;

    fn universe() -> Vec<Instrument> {
        vec![
            instrument("A", "Alpha", "rub", "RU"),
            instrument("B", "Beta", "rub", "RU"),
            instrument("C", "Gamma", "rub", "RU"),
            instrument("D", "Delta", "rub", "RU"),
        ]
    }

    #[test]
    fn random_scores_are_descending_and_in_range() {
        let ranked = RandomScorer::seeded(7).rank(&universe(), &PriceBook::new(), 0.0);
        assert_eq!(ranked.len(), 4);
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert!(ranked.iter().all(|s| (0.0..RANDOM_SCORE_MAX).contains(&s.score)));
    }

    #[test]
    fn same_seed_same_ordering() {
        let a: Vec<String> = RandomScorer::seeded(42)
            .rank(&universe(), &PriceBook::new(), 0.0)
            .into_iter()
            .map(|s| s.instrument.figi)
            .collect();
        let b: Vec<String> = RandomScorer::seeded(42)
            .rank(&universe(), &PriceBook::new(), 0.0)
            .into_iter()
            .map(|s| s.instrument.figi)
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn closure_scorer_sees_prices_and_volatility() {
        let prices: PriceBook = [("A", 30.0), ("B", 10.0), ("C", 20.0), ("D", 40.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        // cheaper is better, scaled by volatility so the argument is exercised
        let cheapest_first = |i: &Instrument, p: &PriceBook, vol: f64| -> f64 {
            -p.get(&i.figi).copied().unwrap_or(f64::MAX) * (1.0 + vol)
        };
        let ranked = cheapest_first.rank(&universe(), &prices, 0.5);
        let order: Vec<&str> = ranked.iter().map(|s| s.instrument.figi.as_str()).collect();
        assert_eq!(order, vec!["B", "C", "A", "D"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let flat = |_: &Instrument, _: &PriceBook, _: f64| 1.0;
        let ranked = flat.rank(&universe(), &PriceBook::new(), 0.0);
        let order: Vec<&str> = ranked.iter().map(|s| s.instrument.figi.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn nan_scores_are_dropped() {
        let nan_for_b = |i: &Instrument, _: &PriceBook, _: f64| if i.figi == "B" { f64::NAN } else { 1.0 };
        let ranked = nan_for_b.rank(&universe(), &PriceBook::new(), 0.0);
        assert_eq!(ranked.len(), 3);
        assert!(ranked.iter().all(|s| s.instrument.figi != "B"));
    }
}
