//! Typed records shared by every stage: entities, observations, games,
//! markets and paired sportsbook quotes.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub String);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameId {
    fn from(s: &str) -> Self {
        GameId(s.to_string())
    }
}

/// Stable identifier of a prop market within a game (`moneyline`, `<entity>:<stat>`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropId(pub String);

impl fmt::Display for PropId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Team,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub league: String,
    pub kind: EntityKind,
    /// Current team for players. Teams leave this empty.
    #[serde(default)]
    pub team_id: Option<EntityId>,
}

impl Entity {
    /// The team whose home/away slot this entity occupies in a game.
    pub fn affiliation(&self) -> &EntityId {
        self.team_id.as_ref().unwrap_or(&self.id)
    }
}

/// One box-score line for an entity in one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub entity_id: EntityId,
    pub game_id: GameId,
    pub opponent_id: EntityId,
    pub date: NaiveDate,
    /// Monotonic game sequence id; orders games sharing a calendar date.
    #[serde(default)]
    pub seq: u64,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub stats: BTreeMap<String, f64>,
}

impl Observation {
    pub fn stat(&self, name: &str) -> Option<f64> {
        self.stats.get(name).copied().filter(|v| v.is_finite())
    }

    pub fn sort_key(&self) -> (NaiveDate, u64) {
        (self.date, self.seq)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub date: NaiveDate,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    pub home_id: EntityId,
    pub away_id: EntityId,
    #[serde(default)]
    pub home_score: Option<u32>,
    #[serde(default)]
    pub away_score: Option<u32>,
    pub season: String,
    #[serde(default)]
    pub seq: u64,
}

impl Game {
    pub fn is_played(&self) -> bool {
        self.home_score.is_some() && self.away_score.is_some()
    }

    /// Scheduled start. Falls back to midnight UTC of the game date so that
    /// quotes captured on game day without a start time are never trusted.
    pub fn start(&self) -> DateTime<Utc> {
        self.start_time
            .unwrap_or_else(|| self.date.and_time(NaiveTime::default()).and_utc())
    }

    /// `Some(true)` if home won, `Some(false)` if away won, `None` if unplayed or tied.
    pub fn home_won(&self) -> Option<bool> {
        match (self.home_score, self.away_score) {
            (Some(h), Some(a)) if h != a => Some(h > a),
            _ => None,
        }
    }

    pub fn is_home(&self, team: &EntityId) -> Option<bool> {
        if *team == self.home_id {
            Some(true)
        } else if *team == self.away_id {
            Some(false)
        } else {
            None
        }
    }

    pub fn opponent_of(&self, team: &EntityId) -> Option<&EntityId> {
        match self.is_home(team)? {
            true => Some(&self.away_id),
            false => Some(&self.home_id),
        }
    }
}

/// A wagerable two-sided proposition on one game.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "market", rename_all = "snake_case")]
pub enum Market {
    Moneyline,
    OverUnder { entity_id: EntityId, stat: String },
}

impl Market {
    pub fn prop_id(&self) -> PropId {
        match self {
            Market::Moneyline => PropId("moneyline".to_string()),
            Market::OverUnder { entity_id, stat } => PropId(format!("{}:{}", entity_id, stat)),
        }
    }

    /// Scorer target this market is priced against.
    pub fn target(&self) -> String {
        match self {
            Market::Moneyline => "moneyline".to_string(),
            Market::OverUnder { stat, .. } => format!("over_under:{}", stat),
        }
    }

    /// (primary, secondary) sides. The model probability refers to the primary side.
    pub fn sides(&self) -> (Side, Side) {
        match self {
            Market::Moneyline => (Side::Home, Side::Away),
            Market::OverUnder { .. } => (Side::Over, Side::Under),
        }
    }

    pub fn accepts(&self, side: Side) -> bool {
        let (a, b) = self.sides();
        side == a || side == b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Over,
    Under,
    Home,
    Away,
}

impl Side {
    pub fn is_primary(self) -> bool {
        matches!(self, Side::Over | Side::Home)
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Over => "OVER",
            Side::Under => "UNDER",
            Side::Home => "HOME",
            Side::Away => "AWAY",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OddsFormat {
    #[default]
    American,
    Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "value", rename_all = "snake_case")]
pub enum Price {
    American(f64),
    Decimal(f64),
}

impl Price {
    pub fn new(format: OddsFormat, value: f64) -> Self {
        match format {
            OddsFormat::American => Price::American(value),
            OddsFormat::Decimal => Price::Decimal(value),
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Price::American(p) if *p > 0.0 => write!(f, "+{}", p),
            Price::American(p) => write!(f, "{}", p),
            Price::Decimal(d) => write!(f, "{:.2}", d),
        }
    }
}

/// Both sides of one market as posted at one capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub game_id: GameId,
    pub market: Market,
    pub line: Option<f64>,
    pub captured_at: DateTime<Utc>,
    /// Over / home price.
    pub primary: Option<Price>,
    /// Under / away price.
    pub secondary: Option<Price>,
}

impl Quote {
    pub fn prop_id(&self) -> PropId {
        self.market.prop_id()
    }

    pub fn price(&self, side: Side) -> Option<Price> {
        let (primary, secondary) = self.market.sides();
        if side == primary {
            self.primary
        } else if side == secondary {
            self.secondary
        } else {
            None
        }
    }
}
