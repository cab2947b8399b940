// Shared fixtures: a seeded synthetic season plus models matching its schema.
#![allow(dead_code)]

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use prop_value::config::{Config, FeatureConfig, StrategyConfig};
use prop_value::engine::features::FeatureBuilder;
use prop_value::engine::scorer::{FeatureSchema, LinearHead, LogisticScorer, LogisticSpec, ScorerSet};
use prop_value::feed::types::{QuoteRecord, Snapshot};
use prop_value::pipeline::{expected_schema, CTX_IS_HOME, CTX_LINE};
use prop_value::types::{Entity, EntityKind, Game, Market, Observation, OddsFormat, Side};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const TEAMS: [&str; 4] = ["DEN", "LAL", "BOS", "MIA"];

pub fn config() -> Config {
    Config {
        features: FeatureConfig {
            rolling_windows: vec![3, 5],
            season_averages: true,
            opponent_specific: true,
            include_variance: false,
            stats: vec!["points".to_string()],
            max_rest_days: 7,
        },
        strategy: StrategyConfig {
            value_threshold: 0.03,
            min_confidence: 0.52,
            max_bets_per_game: 2,
        },
        ..Default::default()
    }
}

pub fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(offset)
}

fn player(team: &str) -> String {
    format!("{}_star", team.to_lowercase())
}

/// `games` games over consecutive days, one star player per team with a
/// points line on every game plus a moneyline.
pub fn season(seed: u64, games: usize) -> Snapshot {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut snap = Snapshot::default();

    for team in TEAMS {
        snap.entities.push(Entity {
            id: team.into(),
            name: team.to_string(),
            league: "NBA".to_string(),
            kind: EntityKind::Team,
            team_id: None,
        });
        snap.entities.push(Entity {
            id: player(team).as_str().into(),
            name: format!("{} star", team),
            league: "NBA".to_string(),
            kind: EntityKind::Player,
            team_id: Some(team.into()),
        });
    }

    for i in 0..games {
        let date = day(i as i64);
        let home = TEAMS[i % TEAMS.len()];
        let away = TEAMS[(i + 1 + i / TEAMS.len()) % TEAMS.len()];
        let away = if away == home { TEAMS[(i + 2) % TEAMS.len()] } else { away };
        let gid = format!("g{:03}", i);
        let start = Utc.from_utc_datetime(&date.and_hms_opt(19, 0, 0).unwrap());

        let home_score: u32 = rng.gen_range(90..130);
        let mut away_score: u32 = rng.gen_range(90..130);
        if away_score == home_score {
            away_score += 1;
        }
        snap.games.push(Game {
            id: gid.as_str().into(),
            date,
            start_time: Some(start),
            home_id: home.into(),
            away_id: away.into(),
            home_score: Some(home_score),
            away_score: Some(away_score),
            season: "2023-24".to_string(),
            seq: i as u64,
        });

        for (team, opp) in [(home, away), (away, home)] {
            let pid = player(team);
            let points: f64 = rng.gen_range(12..40) as f64;
            snap.observations.push(Observation {
                entity_id: pid.as_str().into(),
                game_id: gid.as_str().into(),
                opponent_id: opp.into(),
                date,
                seq: i as u64,
                season: None,
                stats: BTreeMap::from([("points".to_string(), points)]),
            });

            let market = Market::OverUnder { entity_id: pid.as_str().into(), stat: "points".to_string() };
            let over: f64 = -(rng.gen_range(101..130) as f64);
            let under: f64 = -(rng.gen_range(101..130) as f64);
            let captured_at = start - Duration::hours(rng.gen_range(1..24));
            for (side, price) in [(Side::Over, over), (Side::Under, under)] {
                snap.quotes.push(QuoteRecord {
                    game_id: gid.as_str().into(),
                    market: market.clone(),
                    side,
                    price,
                    format: OddsFormat::American,
                    captured_at,
                    line: Some(24.5),
                });
            }
        }

        let captured_at = start - Duration::hours(3);
        // away underdog price below the favourite's magnitude keeps the overround above 1
        let favourite: i32 = rng.gen_range(105..180);
        let home_price = -(favourite as f64);
        let away_price = rng.gen_range(100..favourite) as f64;
        for (side, price) in [(Side::Home, home_price), (Side::Away, away_price)] {
            snap.quotes.push(QuoteRecord {
                game_id: gid.as_str().into(),
                market: Market::Moneyline,
                side,
                price,
                format: OddsFormat::American,
                captured_at,
                line: None,
            });
        }
    }
    snap
}

/// Points model: leans over when recent form beats the line.
pub fn points_model(config: &Config) -> LogisticScorer {
    let builder = FeatureBuilder::new(config.features.clone());
    let market = Market::OverUnder { entity_id: "x".into(), stat: "points".to_string() };
    LogisticScorer::from_spec(LogisticSpec {
        target: "over_under:points".to_string(),
        schema: FeatureSchema {
            version: "points-v1".to_string(),
            features: expected_schema(&builder, &market),
        },
        intercept: 0.0,
        weights: BTreeMap::from([
            ("points_mean_3".to_string(), 0.08),
            ("points_season_mean".to_string(), 0.04),
            (CTX_LINE.to_string(), -0.12),
        ]),
        missing_values: BTreeMap::from([
            ("points_mean_3".to_string(), 24.5),
            ("points_season_mean".to_string(), 24.5),
        ]),
        point: Some(LinearHead {
            intercept: 0.0,
            weights: BTreeMap::from([("points_mean_3".to_string(), 1.0)]),
        }),
    })
    .unwrap()
}

/// Moneyline model: flat home lean.
pub fn moneyline_model(config: &Config) -> LogisticScorer {
    let builder = FeatureBuilder::new(config.features.clone());
    LogisticScorer::from_spec(LogisticSpec {
        target: "moneyline".to_string(),
        schema: FeatureSchema {
            version: "ml-v1".to_string(),
            features: expected_schema(&builder, &Market::Moneyline),
        },
        intercept: 0.0,
        weights: BTreeMap::from([(CTX_IS_HOME.to_string(), 0.4)]),
        missing_values: BTreeMap::new(),
        point: None,
    })
    .unwrap()
}

pub fn scorers(config: &Config) -> ScorerSet {
    let mut set = ScorerSet::new();
    set.insert(Arc::new(points_model(config)));
    set.insert(Arc::new(moneyline_model(config)));
    set
}
