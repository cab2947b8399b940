use crate::types::{Entity, Game, Market, Observation, OddsFormat, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Materialized collector output handed to the engine in one piece.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub games: Vec<Game>,
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub quotes: Vec<QuoteRecord>,
}

/// One side of one market as scraped from a sportsbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub game_id: crate::types::GameId,
    #[serde(flatten)]
    pub market: Market,
    pub side: Side,
    pub price: f64,
    #[serde(default)]
    pub format: OddsFormat,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub line: Option<f64>,
}
