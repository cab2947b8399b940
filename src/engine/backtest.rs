//! Historical replay of the recommendation pipeline.
//!
//! Pairs are evaluated in parallel; aggregation is a sequential fold over
//! the results in pair order, so the report does not depend on the worker
//! count. A failing pair is counted and skipped, never fatal.

use super::metrics::{self, BetLedger, Tally};
use super::odds::decimal_payout;
use super::report::{Baselines, BacktestReport, RateBias, Verdict};
use super::value::{select, SideEvaluation};
use crate::config::BacktestConfig;
use crate::error::EngineResult;
use crate::pipeline::{Engine, PairEvaluation};
use crate::repository::{latest_quotes_before, Repository};
use crate::types::{Game, GameId, Market, PropId, Quote};
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Realized result of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `true` when the primary side (home / over) won.
    Decided(bool),
    Push,
}

/// One historical (game, market) pair with its closing quote.
#[derive(Debug, Clone, Copy)]
pub struct BacktestPair<'a> {
    pub game: &'a Game,
    pub quote: &'a Quote,
    pub outcome: Outcome,
}

fn realized_outcome(repo: &dyn Repository, game: &Game, quote: &Quote) -> Option<Outcome> {
    match &quote.market {
        Market::Moneyline => {
            if !game.is_played() {
                return None;
            }
            Some(game.home_won().map_or(Outcome::Push, Outcome::Decided))
        }
        Market::OverUnder { entity_id, stat } => {
            let line = quote.line?;
            let actual = repo.observation_in(entity_id, &game.id)?.stat(stat)?;
            if actual > line {
                Some(Outcome::Decided(true))
            } else if actual < line {
                Some(Outcome::Decided(false))
            } else {
                Some(Outcome::Push)
            }
        }
    }
}

/// Every market of every game with a realized outcome, priced at the last
/// quote captured before the start.
pub fn collect_pairs(repo: &dyn Repository) -> Vec<BacktestPair<'_>> {
    let mut pairs = Vec::new();
    for game in repo.games() {
        for quote in latest_quotes_before(repo.quotes(&game.id), game.start()) {
            match realized_outcome(repo, game, quote) {
                Some(outcome) => pairs.push(BacktestPair { game, quote, outcome }),
                None => tracing::debug!(
                    game = %game.id,
                    prop = %quote.prop_id(),
                    "no realized outcome, pair skipped"
                ),
            }
        }
    }
    pairs
}

/// Keep a seeded random subset, preserving pair order.
fn sample_pairs<'a>(pairs: Vec<BacktestPair<'a>>, size: usize, seed: u64) -> Vec<BacktestPair<'a>> {
    if size == 0 || size >= pairs.len() {
        return pairs;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, pairs.len(), size).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| pairs[i]).collect()
}

#[derive(Default)]
struct Accumulator {
    attempted: usize,
    pushes: usize,
    errors: usize,
    errors_by_kind: BTreeMap<String, usize>,
    correct: Tally,
    /// (primary-side probability, primary side won)
    scored: Vec<(f64, bool)>,
    confidences: Vec<f64>,
    home_actual: Tally,
    home_predicted: Tally,
    over_actual: Tally,
    over_predicted: Tally,
    sides: Vec<SideEvaluation>,
    outcomes: BTreeMap<(GameId, PropId), bool>,
}

impl Accumulator {
    fn record(&mut self, pair: &BacktestPair<'_>, result: EngineResult<PairEvaluation>) {
        self.attempted += 1;
        let eval = match result {
            Ok(eval) => eval,
            Err(e) => {
                tracing::warn!(
                    game = %pair.game.id,
                    prop = %pair.quote.prop_id(),
                    kind = e.kind(),
                    error = %e,
                    "pair failed"
                );
                self.errors += 1;
                *self.errors_by_kind.entry(e.kind().to_string()).or_default() += 1;
                return;
            }
        };

        let primary_won = match pair.outcome {
            Outcome::Decided(won) => won,
            Outcome::Push => {
                self.pushes += 1;
                return;
            }
        };

        let p = eval.prediction.probability;
        let predicted_primary = p >= 0.5;
        self.correct.record(predicted_primary == primary_won);
        self.scored.push((p, primary_won));
        self.confidences.push(p.max(1.0 - p));

        match &eval.market {
            Market::Moneyline => {
                self.home_actual.record(primary_won);
                self.home_predicted.record(predicted_primary);
            }
            Market::OverUnder { .. } => {
                self.over_actual.record(primary_won);
                self.over_predicted.record(predicted_primary);
            }
        }

        self.outcomes
            .insert((eval.game_id.clone(), eval.prop_id.clone()), primary_won);
        self.sides.extend(eval.sides);
    }

    fn finish(self, engine: &Engine, calibration_bins: usize) -> BacktestReport {
        let recs = select(&self.sides, engine.strategy());

        let mut bets = Tally::default();
        let mut ledger = BetLedger::default();
        let mut edges = Vec::with_capacity(recs.len());
        let mut confidences = Vec::with_capacity(recs.len());
        for rec in &recs {
            let Some(&primary_won) = self.outcomes.get(&(rec.game_id.clone(), rec.prop_id.clone()))
            else {
                continue;
            };
            let won = if rec.side.is_primary() { primary_won } else { !primary_won };
            bets.record(won);
            edges.push(rec.edge);
            confidences.push(rec.confidence);
            match decimal_payout(rec.price) {
                Ok(payout) => ledger.record(won, payout),
                Err(e) => tracing::warn!(game = %rec.game_id, prop = %rec.prop_id, error = %e, "ungradable price"),
            }
        }

        let evaluated = self.correct.total;
        let accuracy = self.correct.rate();
        let roc_auc = metrics::roc_auc(&self.scored);
        let betting_accuracy = bets.rate();

        BacktestReport {
            total_attempted: self.attempted,
            total_evaluated: evaluated,
            pushes: self.pushes,
            total_errors: self.errors,
            errors_by_kind: self.errors_by_kind,
            success_rate: (self.attempted > 0)
                .then(|| (self.attempted - self.errors) as f64 / self.attempted as f64),
            correct_predictions: self.correct.hits,
            accuracy,
            roc_auc,
            brier_score: metrics::brier_score(&self.scored),
            recommended_bets: bets.total,
            betting_percentage: (evaluated > 0).then(|| bets.total as f64 / evaluated as f64),
            betting_accuracy,
            average_edge: metrics::mean(&edges),
            average_confidence: metrics::mean(&confidences),
            roi: ledger.roi().ok(),
            profit_units: ledger.profit_units(),
            home_field: RateBias::from_tallies(&self.home_actual, &self.home_predicted),
            over_rate: RateBias::from_tallies(&self.over_actual, &self.over_predicted),
            confidence: metrics::distribution(&self.confidences),
            calibration: metrics::calibration(&self.scored, calibration_bins),
            baselines: Baselines::default(),
            verdict: Verdict::assess(accuracy, roc_auc, betting_accuracy),
        }
    }
}

/// Replay every eligible historical pair and aggregate the report.
pub fn run(engine: &Engine, repo: &dyn Repository, config: &BacktestConfig) -> Result<BacktestReport> {
    let all = collect_pairs(repo);
    let eligible = all.len();
    let pairs = sample_pairs(all, config.sample_size, config.seed);
    tracing::info!(eligible, selected = pairs.len(), workers = config.workers, "backtest starting");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()
        .context("Failed to build backtest worker pool")?;

    let results: Vec<EngineResult<PairEvaluation>> = pool.install(|| {
        pairs
            .par_iter()
            .map(|pair| engine.evaluate_quote(repo, pair.game, pair.quote))
            .collect()
    });

    let mut acc = Accumulator::default();
    for (pair, result) in pairs.iter().zip(results) {
        acc.record(pair, result);
    }
    let report = acc.finish(engine, config.calibration_bins);

    let cache = engine.cache_stats();
    tracing::info!(
        attempted = report.total_attempted,
        evaluated = report.total_evaluated,
        errors = report.total_errors,
        bets = report.recommended_bets,
        cache_hits = cache.hits,
        cache_misses = cache.misses,
        "backtest finished"
    );
    Ok(report)
}
