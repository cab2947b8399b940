// Integration tests for the historical backtest harness

mod common;

#[cfg(test)]
mod tests {
    use super::common;
    use chrono::{Duration, TimeZone, Utc};
    use prop_value::config::BacktestConfig;
    use prop_value::engine::backtest::{collect_pairs, run};
    use prop_value::engine::scorer::ScorerSet;
    use prop_value::feed::types::QuoteRecord;
    use prop_value::repository::InMemoryRepository;
    use prop_value::types::{Entity, EntityKind, Game, Market, Observation, OddsFormat, Side};
    use std::collections::BTreeMap;
    use prop_value::Engine;

    fn run_with(workers: usize, sample_size: usize) -> prop_value::engine::report::BacktestReport {
        let config = common::config();
        let repo = InMemoryRepository::from_snapshot(common::season(11, 40)).unwrap();
        let engine = Engine::new(&config, common::scorers(&config));
        let bt = BacktestConfig {
            workers,
            sample_size,
            ..BacktestConfig::default()
        };
        run(&engine, &repo, &bt).unwrap()
    }

    #[test]
    fn test_every_pair_is_accounted_for() {
        let report = run_with(2, 0);
        // 40 games x (2 player props + 1 moneyline)
        assert_eq!(report.total_attempted, 120);
        assert_eq!(
            report.total_attempted,
            report.total_evaluated + report.pushes + report.total_errors
        );
        assert_eq!(report.total_errors, 0);
        assert!(report.accuracy.is_some());
        assert!(report.roc_auc.is_some());
        assert!(report.home_field.is_some());
        assert!(report.over_rate.is_some());
        assert_eq!(report.calibration.len(), 10);
    }

    #[test]
    fn test_report_is_identical_across_worker_counts() {
        let single = serde_json::to_string(&run_with(1, 0)).unwrap();
        let many = serde_json::to_string(&run_with(4, 0)).unwrap();
        assert_eq!(single, many);
        let again = serde_json::to_string(&run_with(4, 0)).unwrap();
        assert_eq!(many, again);
    }

    #[test]
    fn test_recommended_bets_respect_cap() {
        let report = run_with(0, 0);
        let config = common::config();
        // At most max_bets_per_game per game over 40 games.
        assert!(report.recommended_bets <= 40 * config.strategy.max_bets_per_game);
        assert!(report.recommended_bets > 0, "fixture models should find some value");
        let confidence = report.average_confidence.unwrap();
        assert!(confidence >= config.strategy.min_confidence);
        assert!(report.average_edge.unwrap() >= config.strategy.value_threshold);
        assert!(report.roi.is_some());
    }

    #[test]
    fn test_seeded_sample_is_stable() {
        let a = run_with(2, 25);
        let b = run_with(3, 25);
        assert_eq!(a.total_attempted, 25);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn test_bad_records_are_counted_not_fatal() {
        let config = common::config();
        let mut snap = common::season(5, 12);

        // Zero-vig moneyline on the first game: sum of implied is exactly 1.0.
        for q in snap
            .quotes
            .iter_mut()
            .filter(|q| q.game_id.0 == "g000" && q.market == Market::Moneyline)
        {
            q.price = if q.side == Side::Home { -100.0 } else { 100.0 };
        }

        // A played game against a team with no records at all.
        let date = common::day(20);
        let start = Utc.from_utc_datetime(&date.and_hms_opt(19, 0, 0).unwrap());
        snap.games.push(Game {
            id: "ghost".into(),
            date,
            start_time: Some(start),
            home_id: "NOBODY".into(),
            away_id: "DEN".into(),
            home_score: Some(99),
            away_score: Some(101),
            season: "2023-24".to_string(),
            seq: 99,
        });
        for (side, price) in [(Side::Home, -120.0), (Side::Away, 100.0)] {
            snap.quotes.push(QuoteRecord {
                game_id: "ghost".into(),
                market: Market::Moneyline,
                side,
                price,
                format: OddsFormat::American,
                captured_at: start - Duration::hours(2),
                line: None,
            });
        }

        let repo = InMemoryRepository::from_snapshot(snap).unwrap();
        let engine = Engine::new(&config, common::scorers(&config));
        let report = run(&engine, &repo, &BacktestConfig::default()).unwrap();

        assert_eq!(report.total_attempted, 12 * 3 + 1);
        assert_eq!(report.total_errors, 2);
        assert_eq!(report.errors_by_kind.get("malformed_odds"), Some(&1));
        assert_eq!(report.errors_by_kind.get("unknown_entity"), Some(&1));
        assert_eq!(
            report.total_attempted,
            report.total_evaluated + report.pushes + report.total_errors
        );
        assert!(report.success_rate.unwrap() < 1.0);
    }

    #[test]
    fn test_no_scorer_for_a_target_only_fails_those_pairs() {
        let config = common::config();
        let repo = InMemoryRepository::from_snapshot(common::season(3, 10)).unwrap();
        let mut scorers = ScorerSet::new();
        scorers.insert(std::sync::Arc::new(common::points_model(&config)));
        let engine = Engine::new(&config, scorers);

        let report = run(&engine, &repo, &BacktestConfig::default()).unwrap();
        assert_eq!(report.errors_by_kind.get("no_scorer"), Some(&10));
        assert!(report.home_field.is_none());
        assert!(report.total_evaluated + report.pushes == 20);
    }

    #[test]
    fn test_traded_player_props_are_graded_for_old_team() {
        let config = common::config();
        let mut snap = common::season(21, 12);
        snap.entities.push(Entity {
            id: "journeyman".into(),
            name: "Journeyman".to_string(),
            league: "NBA".to_string(),
            kind: EntityKind::Player,
            // current team only; the first half of the season was on BOS
            team_id: Some("DEN".into()),
        });

        let mut props = 0;
        for (i, game) in snap.games.clone().iter().enumerate() {
            let team = if i < 6 { "BOS" } else { "DEN" };
            let Some(opponent) = game.opponent_of(&team.into()) else {
                continue;
            };
            snap.observations.push(Observation {
                entity_id: "journeyman".into(),
                game_id: game.id.clone(),
                opponent_id: opponent.clone(),
                date: game.date,
                seq: game.seq,
                season: None,
                stats: BTreeMap::from([("points".to_string(), 20.0 + i as f64)]),
            });
            let market = Market::OverUnder { entity_id: "journeyman".into(), stat: "points".to_string() };
            for side in [Side::Over, Side::Under] {
                snap.quotes.push(QuoteRecord {
                    game_id: game.id.clone(),
                    market: market.clone(),
                    side,
                    price: -110.0,
                    format: OddsFormat::American,
                    captured_at: game.start() - Duration::hours(2),
                    line: Some(24.5),
                });
            }
            props += 1;
        }
        assert!(props > 3, "fixture should give both spells some games");

        let repo = InMemoryRepository::from_snapshot(snap).unwrap();
        let engine = Engine::new(&config, common::scorers(&config));
        let report = run(&engine, &repo, &BacktestConfig::default()).unwrap();

        assert_eq!(report.total_attempted, 12 * 3 + props);
        assert_eq!(report.total_errors, 0, "{:?}", report.errors_by_kind);
    }

    #[test]
    fn test_pairs_use_closing_quote_only() {
        let mut snap = common::season(9, 3);
        // A later, after-start quote for g001's moneyline must be ignored.
        let g1_start = Utc.from_utc_datetime(&common::day(1).and_hms_opt(19, 0, 0).unwrap());
        for (side, price) in [(Side::Home, -500.0), (Side::Away, 350.0)] {
            snap.quotes.push(QuoteRecord {
                game_id: "g001".into(),
                market: Market::Moneyline,
                side,
                price,
                format: OddsFormat::American,
                captured_at: g1_start + Duration::minutes(30),
                line: None,
            });
        }
        let repo = InMemoryRepository::from_snapshot(snap).unwrap();
        let pairs = collect_pairs(&repo);
        assert_eq!(pairs.len(), 9);
        assert!(pairs.iter().all(|p| p.quote.captured_at < p.game.start()));
    }
}
