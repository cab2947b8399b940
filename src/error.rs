use crate::types::{EntityId, GameId, PropId};
use thiserror::Error;

/// Failures raised by the feature, scoring, odds and value stages.
///
/// The backtest counts these per pair and keeps going; live requests
/// return them to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("malformed odds: {0}")]
    MalformedOdds(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(EntityId),

    #[error("unknown game: {0}")]
    UnknownGame(GameId),

    #[error("schema mismatch for {schema}: missing {missing:?}, unexpected {unexpected:?}")]
    SchemaMismatch {
        schema: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("no scorer registered for target {0}")]
    NoScorer(String),

    #[error("no usable quote for {game} / {prop}")]
    NoUsableQuote { game: GameId, prop: PropId },

    #[error("numeric guard: {0}")]
    Numeric(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl EngineError {
    /// Stable label used when tallying errors by category.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::MalformedOdds(_) => "malformed_odds",
            EngineError::UnknownEntity(_) => "unknown_entity",
            EngineError::UnknownGame(_) => "unknown_game",
            EngineError::SchemaMismatch { .. } => "schema_mismatch",
            EngineError::NoScorer(_) => "no_scorer",
            EngineError::NoUsableQuote { .. } => "no_usable_quote",
            EngineError::Numeric(_) => "numeric",
            EngineError::InvalidRecord(_) => "invalid_record",
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
