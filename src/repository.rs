//! Read-only access to historical records.
//!
//! Every stage receives a `&dyn Repository` instead of reaching for shared
//! state. `InMemoryRepository` validates a snapshot once at construction so
//! downstream code can rely on ordering and uniqueness.

use crate::error::{EngineError, EngineResult};
use crate::feed::types::{QuoteRecord, Snapshot};
use crate::types::{Entity, EntityId, Game, GameId, Market, Observation, Price, Quote};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

pub trait Repository: Send + Sync {
    fn entity(&self, id: &EntityId) -> Option<&Entity>;
    /// Observations for an entity sorted by `(date, seq)`.
    fn observations(&self, id: &EntityId) -> &[Observation];
    fn game(&self, id: &GameId) -> Option<&Game>;
    /// All games sorted by `(date, seq, id)`.
    fn games(&self) -> &[Game];
    /// Paired quotes for a game sorted by `(market, captured_at, line)`.
    fn quotes(&self, game: &GameId) -> &[Quote];

    /// The entity's box-score line for one game, if recorded.
    fn observation_in(&self, id: &EntityId, game: &GameId) -> Option<&Observation> {
        self.observations(id).iter().find(|o| o.game_id == *game)
    }

    /// An entity is known if it has a record or any observation.
    fn is_known(&self, id: &EntityId) -> bool {
        self.entity(id).is_some() || !self.observations(id).is_empty()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRepository {
    entities: HashMap<EntityId, Entity>,
    observations: HashMap<EntityId, Vec<Observation>>,
    games: Vec<Game>,
    game_index: HashMap<GameId, usize>,
    quotes: HashMap<GameId, Vec<Quote>>,
}

type QuoteKey = (GameId, Market, DateTime<Utc>, Option<u64>);

impl InMemoryRepository {
    pub fn from_snapshot(snapshot: Snapshot) -> EngineResult<Self> {
        let Snapshot {
            entities,
            mut games,
            observations,
            quotes,
        } = snapshot;

        games.sort_by(|a, b| (a.date, a.seq, &a.id).cmp(&(b.date, b.seq, &b.id)));
        let mut game_index = HashMap::with_capacity(games.len());
        for (i, game) in games.iter().enumerate() {
            if game.home_id == game.away_id {
                return Err(EngineError::InvalidRecord(format!(
                    "game {} has the same home and away entity {}",
                    game.id, game.home_id
                )));
            }
            if game_index.insert(game.id.clone(), i).is_some() {
                return Err(EngineError::InvalidRecord(format!("duplicate game {}", game.id)));
            }
        }

        let entities: HashMap<EntityId, Entity> =
            entities.into_iter().map(|e| (e.id.clone(), e)).collect();

        let mut by_entity: HashMap<EntityId, Vec<Observation>> = HashMap::new();
        let mut seen: HashSet<(EntityId, GameId)> = HashSet::new();
        for mut obs in observations {
            let Some(&gi) = game_index.get(&obs.game_id) else {
                return Err(EngineError::InvalidRecord(format!(
                    "observation for {} references unknown game {}",
                    obs.entity_id, obs.game_id
                )));
            };
            if !seen.insert((obs.entity_id.clone(), obs.game_id.clone())) {
                return Err(EngineError::InvalidRecord(format!(
                    "duplicate observation for {} in game {}",
                    obs.entity_id, obs.game_id
                )));
            }
            check_against_game(&obs, &games[gi])?;
            if obs.season.is_none() {
                obs.season = Some(games[gi].season.clone());
            }
            by_entity.entry(obs.entity_id.clone()).or_default().push(obs);
        }
        for list in by_entity.values_mut() {
            list.sort_by_key(|o| o.sort_key());
        }

        let quotes = pair_quotes(quotes, &game_index)?;

        tracing::debug!(
            entities = entities.len(),
            games = games.len(),
            quoted_games = quotes.len(),
            "repository built"
        );

        Ok(Self {
            entities,
            observations: by_entity,
            games,
            game_index,
            quotes,
        })
    }
}

/// An observation must carry its game's date and season, and name the other
/// side of that game as opponent. The feature cutoff trusts `obs.date`.
fn check_against_game(obs: &Observation, game: &Game) -> EngineResult<()> {
    if obs.date != game.date {
        return Err(EngineError::InvalidRecord(format!(
            "observation for {} in game {} dated {}, game is on {}",
            obs.entity_id, game.id, obs.date, game.date
        )));
    }
    if let Some(season) = &obs.season {
        if *season != game.season {
            return Err(EngineError::InvalidRecord(format!(
                "observation for {} in game {} tagged season {}, game is in {}",
                obs.entity_id, game.id, season, game.season
            )));
        }
    }
    let opponent_ok = match game.opponent_of(&obs.entity_id) {
        // team rows: the opponent is fixed by the home/away slot
        Some(expected) => obs.opponent_id == *expected,
        None => game.is_home(&obs.opponent_id).is_some(),
    };
    if !opponent_ok {
        return Err(EngineError::InvalidRecord(format!(
            "observation for {} in game {} names opponent {}, game is {} vs {}",
            obs.entity_id, game.id, obs.opponent_id, game.home_id, game.away_id
        )));
    }
    Ok(())
}

/// Join per-side quote records sharing (game, market, capture time, line).
fn pair_quotes(
    records: Vec<QuoteRecord>,
    game_index: &HashMap<GameId, usize>,
) -> EngineResult<HashMap<GameId, Vec<Quote>>> {
    let mut grouped: BTreeMap<QuoteKey, Quote> = BTreeMap::new();

    for rec in records {
        if !game_index.contains_key(&rec.game_id) {
            return Err(EngineError::InvalidRecord(format!(
                "quote references unknown game {}",
                rec.game_id
            )));
        }
        if !rec.market.accepts(rec.side) {
            return Err(EngineError::InvalidRecord(format!(
                "side {} is not valid for {} in game {}",
                rec.side,
                rec.market.prop_id(),
                rec.game_id
            )));
        }
        if matches!(rec.market, Market::OverUnder { .. }) && rec.line.is_none() {
            return Err(EngineError::InvalidRecord(format!(
                "over/under quote for {} in game {} has no line",
                rec.market.prop_id(),
                rec.game_id
            )));
        }

        let key = (
            rec.game_id.clone(),
            rec.market.clone(),
            rec.captured_at,
            rec.line.map(f64::to_bits),
        );
        let quote = grouped.entry(key).or_insert_with(|| Quote {
            game_id: rec.game_id.clone(),
            market: rec.market.clone(),
            line: rec.line,
            captured_at: rec.captured_at,
            primary: None,
            secondary: None,
        });

        let price = Price::new(rec.format, rec.price);
        let slot = if rec.side.is_primary() {
            &mut quote.primary
        } else {
            &mut quote.secondary
        };
        if slot.is_some() {
            return Err(EngineError::InvalidRecord(format!(
                "duplicate {} price for {} in game {} at {}",
                rec.side,
                rec.market.prop_id(),
                rec.game_id,
                rec.captured_at
            )));
        }
        *slot = Some(price);
    }

    let mut by_game: HashMap<GameId, Vec<Quote>> = HashMap::new();
    for (_, quote) in grouped {
        by_game.entry(quote.game_id.clone()).or_default().push(quote);
    }
    Ok(by_game)
}

impl Repository for InMemoryRepository {
    fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    fn observations(&self, id: &EntityId) -> &[Observation] {
        self.observations.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn game(&self, id: &GameId) -> Option<&Game> {
        self.game_index.get(id).map(|&i| &self.games[i])
    }

    fn games(&self) -> &[Game] {
        &self.games
    }

    fn quotes(&self, game: &GameId) -> &[Quote] {
        self.quotes.get(game).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Latest quote per market captured strictly before `cutoff`.
///
/// Alternate lines posted at the same capture time resolve to the highest
/// line, independent of input order.
pub fn latest_quotes_before<'a>(quotes: &'a [Quote], cutoff: DateTime<Utc>) -> Vec<&'a Quote> {
    let mut latest: BTreeMap<&Market, &Quote> = BTreeMap::new();
    for quote in quotes.iter().filter(|q| q.captured_at < cutoff) {
        let replace = match latest.get(&quote.market) {
            None => true,
            Some(existing) => quote
                .captured_at
                .cmp(&existing.captured_at)
                .then_with(|| line_order(quote.line, existing.line))
                .is_gt(),
        };
        if replace {
            latest.insert(&quote.market, quote);
        }
    }
    latest.into_values().collect()
}

fn line_order(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}
