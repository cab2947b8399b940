//! Backtest accumulators and evaluation statistics.

use crate::error::{EngineError, EngineResult};
use serde::Serialize;
use std::fmt;

/// Hit count over attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub hits: usize,
    pub total: usize,
}

impl Tally {
    pub fn record(&mut self, hit: bool) {
        self.total += 1;
        if hit {
            self.hits += 1;
        }
    }

    /// `None` when nothing was recorded.
    pub fn rate(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.hits as f64 / self.total as f64)
        }
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rate() {
            Some(r) => write!(f, "{}/{} ({:.1}%)", self.hits, self.total, r * 100.0),
            None => write!(f, "0/0 (n/a)"),
        }
    }
}

/// Flat one-unit stakes on recommended bets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BetLedger {
    pub bets: usize,
    pub wins: usize,
    pub staked: f64,
    pub returned: f64,
}

impl BetLedger {
    /// `payout` is decimal odds, stake included.
    pub fn record(&mut self, won: bool, payout: f64) {
        self.bets += 1;
        self.staked += 1.0;
        if won {
            self.wins += 1;
            self.returned += payout;
        }
    }

    pub fn profit_units(&self) -> f64 {
        self.returned - self.staked
    }

    pub fn roi(&self) -> EngineResult<f64> {
        if self.staked <= 0.0 {
            return Err(EngineError::Numeric("ROI with zero stake".to_string()));
        }
        Ok(self.profit_units() / self.staked)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Distribution {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; zero with fewer than two values.
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn distribution(values: &[f64]) -> Option<Distribution> {
    let m = mean(values)?;
    let n = values.len();
    let std = if n < 2 {
        0.0
    } else {
        (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
    };
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(Distribution {
        count: n,
        mean: m,
        std,
        min,
        max,
    })
}

/// ROC-AUC as the Mann-Whitney U statistic with tie-averaged ranks.
///
/// Samples are `(score, label)`. Undefined when only one class is present.
pub fn roc_auc(samples: &[(f64, bool)]) -> Option<f64> {
    let positives = samples.iter().filter(|(_, l)| *l).count();
    let negatives = samples.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut sorted: Vec<(f64, bool)> = samples.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j + 1 < sorted.len() && sorted[j + 1].0 == sorted[i].0 {
            j += 1;
        }
        // Ranks are 1-based; tied block i..=j shares the average.
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        let pos_in_block = sorted[i..=j].iter().filter(|(_, l)| *l).count();
        rank_sum += avg_rank * pos_in_block as f64;
        i = j + 1;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// Mean squared error of probabilities against 0/1 outcomes.
pub fn brier_score(samples: &[(f64, bool)]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples
        .iter()
        .map(|(p, l)| {
            let y = if *l { 1.0 } else { 0.0 };
            (p - y).powi(2)
        })
        .sum();
    Some(sum / samples.len() as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub mean_predicted: Option<f64>,
    pub observed_rate: Option<f64>,
}

/// Equal-width reliability table over [0, 1]. A probability of exactly 1.0
/// lands in the last bin.
pub fn calibration(samples: &[(f64, bool)], bins: usize) -> Vec<CalibrationBin> {
    if bins == 0 {
        return Vec::new();
    }
    let width = 1.0 / bins as f64;
    let mut sums = vec![(0usize, 0.0f64, 0usize); bins];
    for (p, label) in samples {
        let idx = ((p / width).floor() as usize).min(bins - 1);
        let slot = &mut sums[idx];
        slot.0 += 1;
        slot.1 += p;
        if *label {
            slot.2 += 1;
        }
    }
    sums.into_iter()
        .enumerate()
        .map(|(i, (count, p_sum, positives))| CalibrationBin {
            lower: i as f64 * width,
            upper: (i + 1) as f64 * width,
            count,
            mean_predicted: (count > 0).then(|| p_sum / count as f64),
            observed_rate: (count > 0).then(|| positives as f64 / count as f64),
        })
        .collect()
}
