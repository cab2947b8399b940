//! Sportsbook price conversion and de-vigging.

use crate::error::{EngineError, EngineResult};
use crate::types::{Price, Quote};
use serde::Serialize;

/// Overround accepted for a two-way market: strictly above 1, at most 1.5.
const MAX_OVERROUND: f64 = 1.5;

/// Standard two-way juice used for the break-even baseline.
pub const STANDARD_JUICE: f64 = -110.0;

/// Both sides of a market after vig removal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImpliedPair {
    /// Raw implied probabilities (primary, secondary), vig included.
    pub raw: (f64, f64),
    pub overround: f64,
    /// De-vigged probabilities (primary, secondary), summing to 1.
    pub fair: (f64, f64),
}

/// Convert a price to its raw implied probability.
///
/// Positive American odds (e.g. +150): prob = 100 / (odds + 100)
/// Negative American odds (e.g. -150): prob = |odds| / (|odds| + 100)
/// Decimal odds d: prob = 1 / d
///
/// American odds strictly between -100 and +100 are not valid quotes and are
/// rejected as malformed, even where the formula would still land inside
/// (0, 1) (+50 would give 0.667).
pub fn implied_probability(price: Price) -> EngineResult<f64> {
    let prob = match price {
        Price::American(odds) => {
            if !odds.is_finite() || odds.abs() < 100.0 {
                return Err(EngineError::MalformedOdds(format!(
                    "american price {} outside valid range",
                    odds
                )));
            }
            if odds > 0.0 {
                100.0 / (odds + 100.0)
            } else {
                let abs = odds.abs();
                abs / (abs + 100.0)
            }
        }
        Price::Decimal(d) => {
            if !d.is_finite() || d <= 1.0 {
                return Err(EngineError::MalformedOdds(format!(
                    "decimal price {} must be above 1.0",
                    d
                )));
            }
            1.0 / d
        }
    };

    if !(prob > 0.0 && prob < 1.0) {
        return Err(EngineError::MalformedOdds(format!(
            "implied probability {} for {} outside (0, 1)",
            prob, price
        )));
    }
    Ok(prob)
}

/// Devig two-way odds by proportional scaling.
pub fn devig(primary: Price, secondary: Price) -> EngineResult<ImpliedPair> {
    let a = implied_probability(primary)?;
    let b = implied_probability(secondary)?;
    let total = a + b;
    if !(total > 1.0 && total <= MAX_OVERROUND) {
        return Err(EngineError::MalformedOdds(format!(
            "overround {:.4} for {} / {} outside (1.0, {}]",
            total, primary, secondary, MAX_OVERROUND
        )));
    }
    let fair_primary = a / total;
    Ok(ImpliedPair {
        raw: (a, b),
        overround: total,
        fair: (fair_primary, 1.0 - fair_primary),
    })
}

/// Devig a paired quote; single-sided quotes are malformed.
pub fn devig_quote(quote: &Quote) -> EngineResult<ImpliedPair> {
    match (quote.primary, quote.secondary) {
        (Some(p), Some(s)) => devig(p, s),
        _ => Err(EngineError::MalformedOdds(format!(
            "single-sided quote for {} in game {}",
            quote.prop_id(),
            quote.game_id
        ))),
    }
}

/// Decimal payout per unit staked (stake included).
pub fn decimal_payout(price: Price) -> EngineResult<f64> {
    match price {
        Price::American(odds) => {
            if !odds.is_finite() || odds.abs() < 100.0 {
                return Err(EngineError::MalformedOdds(format!(
                    "american price {} outside valid range",
                    odds
                )));
            }
            if odds > 0.0 {
                Ok(1.0 + odds / 100.0)
            } else {
                Ok(1.0 + 100.0 / odds.abs())
            }
        }
        Price::Decimal(d) if d.is_finite() && d > 1.0 => Ok(d),
        Price::Decimal(d) => Err(EngineError::MalformedOdds(format!(
            "decimal price {} must be above 1.0",
            d
        ))),
    }
}

/// Win rate needed to break even at standard juice (~0.5238).
pub fn break_even_probability() -> f64 {
    let abs = STANDARD_JUICE.abs();
    abs / (abs + 100.0)
}
