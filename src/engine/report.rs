//! Aggregate backtest report and verdict.

use super::metrics::{CalibrationBin, Distribution, Tally};
use super::odds::break_even_probability;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Accuracy and AUC of a coin flip.
pub const RANDOM_BASELINE: f64 = 0.50;

const EXCELLENT_CUTOFF: f64 = 0.55;
const GOOD_CUTOFF: f64 = 0.52;
const STRONG_BETTING_CUTOFF: f64 = 0.55;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictBand {
    Excellent,
    Good,
    Marginal,
    Poor,
}

impl VerdictBand {
    pub fn classify(score: f64) -> Self {
        if score > EXCELLENT_CUTOFF {
            VerdictBand::Excellent
        } else if score > GOOD_CUTOFF {
            VerdictBand::Good
        } else if score > RANDOM_BASELINE {
            VerdictBand::Marginal
        } else {
            VerdictBand::Poor
        }
    }

    fn describe(self) -> &'static str {
        match self {
            VerdictBand::Excellent => "EXCELLENT - beats the sportsbook",
            VerdictBand::Good => "GOOD - above average with potential profitability",
            VerdictBand::Marginal => "MARGINAL - slightly better than random",
            VerdictBand::Poor => "POOR - at or below random chance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BettingVerdict {
    Strong,
    Promising,
    NeedsImprovement,
    NoBets,
}

impl BettingVerdict {
    pub fn classify(betting_accuracy: Option<f64>) -> Self {
        match betting_accuracy {
            None => BettingVerdict::NoBets,
            Some(a) if a > STRONG_BETTING_CUTOFF => BettingVerdict::Strong,
            Some(a) if a > break_even_probability() => BettingVerdict::Promising,
            Some(_) => BettingVerdict::NeedsImprovement,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            BettingVerdict::Strong => "high-confidence bets show strong performance",
            BettingVerdict::Promising => "selective betting shows promise",
            BettingVerdict::NeedsImprovement => "recommendations need improvement",
            BettingVerdict::NoBets => "no bets recommended",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    pub band: VerdictBand,
    pub betting: BettingVerdict,
    pub beats_random: bool,
    pub beats_break_even: bool,
    pub passed: bool,
}

impl Verdict {
    /// Band on AUC, falling back to accuracy when AUC is undefined.
    pub fn assess(accuracy: Option<f64>, auc: Option<f64>, betting_accuracy: Option<f64>) -> Self {
        let band = auc
            .or(accuracy)
            .map_or(VerdictBand::Poor, VerdictBand::classify);
        let beats_random = accuracy.is_some_and(|a| a > RANDOM_BASELINE)
            && auc.map_or(true, |a| a > RANDOM_BASELINE);
        let beats_break_even = betting_accuracy.is_some_and(|a| a > break_even_probability());
        Self {
            band,
            betting: BettingVerdict::classify(betting_accuracy),
            beats_random,
            beats_break_even,
            passed: beats_random && beats_break_even,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Baselines {
    pub random_accuracy: f64,
    pub random_auc: f64,
    pub break_even: f64,
}

impl Default for Baselines {
    fn default() -> Self {
        Self {
            random_accuracy: RANDOM_BASELINE,
            random_auc: RANDOM_BASELINE,
            break_even: break_even_probability(),
        }
    }
}

/// Predicted vs actual rate of the primary side (home win, over).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateBias {
    pub samples: usize,
    pub actual_rate: f64,
    pub predicted_rate: f64,
    pub bias: f64,
}

impl RateBias {
    pub fn from_tallies(actual: &Tally, predicted: &Tally) -> Option<Self> {
        let actual_rate = actual.rate()?;
        let predicted_rate = predicted.rate()?;
        Some(Self {
            samples: actual.total,
            actual_rate,
            predicted_rate,
            bias: (predicted_rate - actual_rate).abs(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    /// Pairs attempted, including failed ones.
    pub total_attempted: usize,
    /// Pairs that produced a graded prediction.
    pub total_evaluated: usize,
    pub pushes: usize,
    pub total_errors: usize,
    pub errors_by_kind: BTreeMap<String, usize>,
    pub success_rate: Option<f64>,

    pub correct_predictions: usize,
    pub accuracy: Option<f64>,
    pub roc_auc: Option<f64>,
    pub brier_score: Option<f64>,

    pub recommended_bets: usize,
    pub betting_percentage: Option<f64>,
    pub betting_accuracy: Option<f64>,
    pub average_edge: Option<f64>,
    pub average_confidence: Option<f64>,
    pub roi: Option<f64>,
    pub profit_units: f64,

    pub home_field: Option<RateBias>,
    pub over_rate: Option<RateBias>,
    pub confidence: Option<Distribution>,
    pub calibration: Vec<CalibrationBin>,

    pub baselines: Baselines,
    pub verdict: Verdict,
}

fn pct(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |x| format!("{:.1}%", x * 100.0))
}

fn num(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |x| format!("{:.4}", x))
}

impl fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== BACKTEST REPORT ===")?;
        writeln!(f)?;
        writeln!(f, "OVERALL PERFORMANCE:")?;
        writeln!(f, "- Pairs Attempted: {}", self.total_attempted)?;
        writeln!(f, "- Pairs Evaluated: {} ({} pushes)", self.total_evaluated, self.pushes)?;
        writeln!(f, "- Prediction Accuracy: {}", pct(self.accuracy))?;
        writeln!(f, "- Correct Predictions: {}", self.correct_predictions)?;
        writeln!(f, "- ROC AUC Score: {}", num(self.roc_auc))?;
        writeln!(f, "- Brier Score: {}", num(self.brier_score))?;
        writeln!(f)?;
        writeln!(f, "SPORTSBOOK PERFORMANCE:")?;
        writeln!(
            f,
            "- Recommended Bets: {} ({} of evaluated)",
            self.recommended_bets,
            pct(self.betting_percentage)
        )?;
        writeln!(f, "- Betting Accuracy: {}", pct(self.betting_accuracy))?;
        writeln!(f, "- Average Edge: {}", pct(self.average_edge))?;
        writeln!(f, "- Average Confidence: {}", pct(self.average_confidence))?;
        writeln!(f, "- ROI (flat stake): {}", pct(self.roi))?;
        writeln!(f, "- Profit: {:+.2} units", self.profit_units)?;
        if let Some(home) = &self.home_field {
            writeln!(f)?;
            writeln!(f, "HOME FIELD ADVANTAGE ({} games):", home.samples)?;
            writeln!(f, "- Actual Home Win Rate: {:.1}%", home.actual_rate * 100.0)?;
            writeln!(f, "- Predicted Home Win Rate: {:.1}%", home.predicted_rate * 100.0)?;
            writeln!(f, "- Home Bias: {:.1}%", home.bias * 100.0)?;
        }
        if let Some(over) = &self.over_rate {
            writeln!(f)?;
            writeln!(f, "OVER/UNDER BALANCE ({} props):", over.samples)?;
            writeln!(f, "- Actual Over Rate: {:.1}%", over.actual_rate * 100.0)?;
            writeln!(f, "- Predicted Over Rate: {:.1}%", over.predicted_rate * 100.0)?;
            writeln!(f, "- Over Bias: {:.1}%", over.bias * 100.0)?;
        }
        if let Some(c) = &self.confidence {
            writeln!(f)?;
            writeln!(f, "CONFIDENCE ANALYSIS:")?;
            writeln!(f, "- Mean Confidence: {:.1}%", c.mean * 100.0)?;
            writeln!(f, "- Std Confidence: {:.1}%", c.std * 100.0)?;
            writeln!(f, "- Min Confidence: {:.1}%", c.min * 100.0)?;
            writeln!(f, "- Max Confidence: {:.1}%", c.max * 100.0)?;
        }
        let populated: Vec<&CalibrationBin> = self.calibration.iter().filter(|b| b.count > 0).collect();
        if !populated.is_empty() {
            writeln!(f)?;
            writeln!(f, "CALIBRATION:")?;
            for bin in populated {
                writeln!(
                    f,
                    "- [{:.2}, {:.2}) n={:<5} predicted {} actual {}",
                    bin.lower,
                    bin.upper,
                    bin.count,
                    pct(bin.mean_predicted),
                    pct(bin.observed_rate)
                )?;
            }
        }
        writeln!(f)?;
        writeln!(f, "ERROR ANALYSIS:")?;
        writeln!(f, "- Total Errors: {}", self.total_errors)?;
        for (kind, count) in &self.errors_by_kind {
            writeln!(f, "  - {}: {}", kind, count)?;
        }
        writeln!(f, "- Success Rate: {}", pct(self.success_rate))?;
        writeln!(f)?;
        writeln!(f, "PERFORMANCE BENCHMARKS:")?;
        writeln!(f, "- Random Chance Accuracy: {:.1}%", self.baselines.random_accuracy * 100.0)?;
        writeln!(f, "- Random Chance AUC: {:.4}", self.baselines.random_auc)?;
        writeln!(f, "- Sportsbook Break-even: {:.1}%", self.baselines.break_even * 100.0)?;
        writeln!(f)?;
        writeln!(f, "VERDICT: {}", self.verdict.band.describe())?;
        writeln!(f, "BETTING STRATEGY: {}", self.verdict.betting.describe())?;
        write!(f, "RESULT: {}", if self.verdict.passed { "PASS" } else { "FAIL" })
    }
}
