use crate::config::{Config, StrategyConfig};
use crate::engine::cache::{CacheStats, FeatureCache};
use crate::engine::features::{FeatureBuilder, FeatureRequest, FeatureValue, FeatureVector};
use crate::engine::odds::{devig_quote, ImpliedPair};
use crate::engine::scorer::{predict, PredictionResult, ScorerSet};
use crate::engine::value::{evaluate_sides, select, Recommendation, SideEvaluation};
use crate::error::{EngineError, EngineResult};
use crate::repository::{latest_quotes_before, Repository};
use crate::types::{EntityId, Game, GameId, Market, PropId, Quote};
use chrono::{DateTime, Utc};

/// Context feature: 1.0 when the subject plays at home.
pub const CTX_IS_HOME: &str = "ctx_is_home";
/// Context feature: the posted over/under line.
pub const CTX_LINE: &str = "ctx_line";

/// Whose history a market is priced from in a given game.
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub entity_id: EntityId,
    pub opponent_id: EntityId,
    pub is_home: bool,
}

/// Everything produced for one (game, market) pair.
#[derive(Debug, Clone)]
pub struct PairEvaluation {
    pub game_id: GameId,
    pub prop_id: PropId,
    pub market: Market,
    pub captured_at: DateTime<Utc>,
    pub subject: Subject,
    pub prediction: PredictionResult,
    pub implied: ImpliedPair,
    /// Primary side first.
    pub sides: [SideEvaluation; 2],
}

/// Feature names the engine hands a scorer for a market: the builder's
/// names plus target-game context.
pub fn expected_schema(builder: &FeatureBuilder, market: &Market) -> Vec<String> {
    let mut names = builder.feature_names();
    names.push(CTX_IS_HOME.to_string());
    if matches!(market, Market::OverUnder { .. }) {
        names.push(CTX_LINE.to_string());
    }
    names.sort();
    names
}

/// Feature builder, scorers and value thresholds wired into one data flow:
/// features -> scorer -> de-vigged quote -> value decision.
pub struct Engine {
    features: FeatureBuilder,
    strategy: StrategyConfig,
    scorers: ScorerSet,
    cache: FeatureCache,
}

impl Engine {
    pub fn new(config: &Config, scorers: ScorerSet) -> Self {
        Self {
            features: FeatureBuilder::new(config.features.clone()),
            strategy: config.strategy.clone(),
            scorers,
            cache: FeatureCache::new(),
        }
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    pub fn feature_builder(&self) -> &FeatureBuilder {
        &self.features
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Resolve the entity whose features drive a market in this game.
    ///
    /// A recorded line for this game fixes the side the entity played on,
    /// which matters for games before a trade. Upcoming games fall back to
    /// the entity's current team.
    pub fn subject(&self, repo: &dyn Repository, game: &Game, market: &Market) -> EngineResult<Subject> {
        match market {
            Market::Moneyline => Ok(Subject {
                entity_id: game.home_id.clone(),
                opponent_id: game.away_id.clone(),
                is_home: true,
            }),
            Market::OverUnder { entity_id, .. } => {
                self.features.ensure_known(repo, entity_id)?;
                if let Some(obs) = repo.observation_in(entity_id, &game.id) {
                    if let Some(opponent_home) = game.is_home(&obs.opponent_id) {
                        return Ok(Subject {
                            entity_id: entity_id.clone(),
                            opponent_id: obs.opponent_id.clone(),
                            is_home: !opponent_home,
                        });
                    }
                }
                let team = repo
                    .entity(entity_id)
                    .map(|e| e.affiliation().clone())
                    .unwrap_or_else(|| entity_id.clone());
                let (Some(is_home), Some(opponent)) = (game.is_home(&team), game.opponent_of(&team))
                else {
                    return Err(EngineError::InvalidRecord(format!(
                        "{} (team {}) does not play in game {}",
                        entity_id, team, game.id
                    )));
                };
                Ok(Subject {
                    entity_id: entity_id.clone(),
                    opponent_id: opponent.clone(),
                    is_home,
                })
            }
        }
    }

    /// Feature vector for a quote: cached history features plus game context.
    pub fn features_for(
        &self,
        repo: &dyn Repository,
        game: &Game,
        quote: &Quote,
        subject: &Subject,
    ) -> EngineResult<FeatureVector> {
        let request = FeatureRequest {
            entity_id: subject.entity_id.clone(),
            as_of: game.date,
            opponent_id: Some(subject.opponent_id.clone()),
            season: Some(game.season.clone()),
        };
        let base = self.cache.get_or_build(&self.features, repo, &request)?;

        let home = if subject.is_home { 1.0 } else { 0.0 };
        let fv = base.with_feature(CTX_IS_HOME, FeatureValue::Value(home));
        match &quote.market {
            Market::Moneyline => Ok(fv),
            Market::OverUnder { .. } => {
                let line = quote.line.ok_or_else(|| EngineError::NoUsableQuote {
                    game: game.id.clone(),
                    prop: quote.prop_id(),
                })?;
                Ok(fv.with_feature(CTX_LINE, FeatureValue::Value(line)))
            }
        }
    }

    /// Run one quoted market of one game through every stage.
    pub fn evaluate_quote(
        &self,
        repo: &dyn Repository,
        game: &Game,
        quote: &Quote,
    ) -> EngineResult<PairEvaluation> {
        if quote.game_id != game.id {
            return Err(EngineError::InvalidRecord(format!(
                "quote for game {} evaluated against game {}",
                quote.game_id, game.id
            )));
        }
        let scorer = self.scorers.get(&quote.market.target())?;
        let subject = self.subject(repo, game, &quote.market)?;
        let fv = self.features_for(repo, game, quote, &subject)?;
        let prediction = predict(scorer, &fv)?;
        let implied = devig_quote(quote)?;
        let sides = evaluate_sides(quote, &implied, prediction.probability, &self.strategy)?;

        tracing::debug!(
            game = %game.id,
            prop = %quote.prop_id(),
            p_model = prediction.probability,
            p_book = implied.fair.0,
            missing = fv.missing_count(),
            "pair evaluated"
        );

        Ok(PairEvaluation {
            game_id: game.id.clone(),
            prop_id: quote.prop_id(),
            market: quote.market.clone(),
            captured_at: quote.captured_at,
            subject,
            prediction,
            implied,
            sides,
        })
    }

    /// Ranked recommendations for one upcoming game.
    ///
    /// Uses the latest quote per market captured before the game starts and
    /// no later than `now`. Any failing market fails the whole request.
    pub fn recommend_game(
        &self,
        repo: &dyn Repository,
        game_id: &GameId,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<Recommendation>> {
        let game = repo
            .game(game_id)
            .ok_or_else(|| EngineError::UnknownGame(game_id.clone()))?;

        let visible: Vec<Quote> = repo
            .quotes(game_id)
            .iter()
            .filter(|q| q.captured_at <= now)
            .cloned()
            .collect();
        let quotes = latest_quotes_before(&visible, game.start());
        if quotes.is_empty() {
            tracing::info!(game = %game_id, "no quotes captured before start");
            return Ok(Vec::new());
        }

        let mut evaluations = Vec::with_capacity(quotes.len() * 2);
        for quote in quotes {
            let pair = self.evaluate_quote(repo, game, quote)?;
            evaluations.extend(pair.sides);
        }
        let recs = select(&evaluations, &self.strategy);
        tracing::info!(
            game = %game_id,
            markets = evaluations.len() / 2,
            recommendations = recs.len(),
            "recommendations built"
        );
        Ok(recs)
    }
}
