use super::odds::ImpliedPair;
use crate::config::StrategyConfig;
use crate::error::{EngineError, EngineResult};
use crate::types::{GameId, Price, PropId, Quote, Side};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    BelowThreshold,
    BelowConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum Decision {
    Candidate,
    Skip(SkipReason),
}

/// Result of value evaluation for one side of a market.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueSignal {
    pub edge: f64,
    /// The model probability itself.
    pub confidence: f64,
    pub decision: Decision,
}

/// Evaluate whether one side carries value.
///
/// `p_model`: model probability for this side
/// `p_book`: de-vigged book probability for this side
pub fn evaluate(p_model: f64, p_book: f64, cfg: &StrategyConfig) -> EngineResult<ValueSignal> {
    for (label, p) in [("model", p_model), ("book", p_book)] {
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(EngineError::Numeric(format!("{} probability {} outside [0, 1]", label, p)));
        }
    }

    let edge = p_model - p_book;
    let decision = if edge < cfg.value_threshold {
        Decision::Skip(SkipReason::BelowThreshold)
    } else if p_model < cfg.min_confidence {
        Decision::Skip(SkipReason::BelowConfidence)
    } else {
        Decision::Candidate
    };

    Ok(ValueSignal {
        edge,
        confidence: p_model,
        decision,
    })
}

/// One evaluated side of one quoted market.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideEvaluation {
    pub game_id: GameId,
    pub prop_id: PropId,
    pub side: Side,
    pub line: Option<f64>,
    pub price: Price,
    pub model_probability: f64,
    pub implied_probability: f64,
    pub edge: f64,
    pub decision: Decision,
}

impl SideEvaluation {
    pub fn is_candidate(&self) -> bool {
        self.decision == Decision::Candidate
    }
}

/// Evaluate both sides of a quote given the model probability of the primary side.
pub fn evaluate_sides(
    quote: &Quote,
    pair: &ImpliedPair,
    p_primary: f64,
    cfg: &StrategyConfig,
) -> EngineResult<[SideEvaluation; 2]> {
    let (primary, secondary) = quote.market.sides();
    let build = |side: Side, p_model: f64, p_book: f64| -> EngineResult<SideEvaluation> {
        let price = quote.price(side).ok_or_else(|| EngineError::NoUsableQuote {
            game: quote.game_id.clone(),
            prop: quote.prop_id(),
        })?;
        let signal = evaluate(p_model, p_book, cfg)?;
        Ok(SideEvaluation {
            game_id: quote.game_id.clone(),
            prop_id: quote.prop_id(),
            side,
            line: quote.line,
            price,
            model_probability: p_model,
            implied_probability: p_book,
            edge: signal.edge,
            decision: signal.decision,
        })
    };
    Ok([
        build(primary, p_primary, pair.fair.0)?,
        build(secondary, 1.0 - p_primary, pair.fair.1)?,
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub game_id: GameId,
    pub prop_id: PropId,
    pub side: Side,
    pub line: Option<f64>,
    pub price: Price,
    pub model_probability: f64,
    pub implied_probability: f64,
    pub edge: f64,
    pub confidence: f64,
    /// 1-based rank within the game.
    pub rank: usize,
}

/// Edge desc, then model probability desc, then prop id, then side.
fn rank_order(a: &SideEvaluation, b: &SideEvaluation) -> Ordering {
    b.edge
        .total_cmp(&a.edge)
        .then_with(|| b.model_probability.total_cmp(&a.model_probability))
        .then_with(|| a.prop_id.cmp(&b.prop_id))
        .then_with(|| a.side.cmp(&b.side))
}

/// Rank candidates per game and keep at most `max_bets_per_game` of them.
///
/// Candidates past the cap are dropped outright. Output is ordered by game id,
/// then rank.
pub fn select(evaluations: &[SideEvaluation], cfg: &StrategyConfig) -> Vec<Recommendation> {
    let mut by_game: BTreeMap<&GameId, Vec<&SideEvaluation>> = BTreeMap::new();
    for ev in evaluations.iter().filter(|e| e.is_candidate()) {
        by_game.entry(&ev.game_id).or_default().push(ev);
    }

    let mut out = Vec::new();
    for (game_id, mut candidates) in by_game {
        candidates.sort_by(|a, b| rank_order(a, b));
        if candidates.len() > cfg.max_bets_per_game {
            tracing::debug!(
                game = %game_id,
                candidates = candidates.len(),
                cap = cfg.max_bets_per_game,
                "capping recommendations"
            );
        }
        out.extend(
            candidates
                .into_iter()
                .take(cfg.max_bets_per_game)
                .enumerate()
                .map(|(i, ev)| Recommendation {
                    game_id: ev.game_id.clone(),
                    prop_id: ev.prop_id.clone(),
                    side: ev.side,
                    line: ev.line,
                    price: ev.price,
                    model_probability: ev.model_probability,
                    implied_probability: ev.implied_probability,
                    edge: ev.edge,
                    confidence: ev.model_probability,
                    rank: i + 1,
                }),
        );
    }
    out
}
