// End-to-end recommendation flow from raw snapshot and model documents

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use prop_value::config::Config;
    use prop_value::engine::scorer::{ModelSpec, ScorerSet};
    use prop_value::feed::json_file::JsonFileSource;
    use prop_value::feed::types::Snapshot;
    use prop_value::feed::SnapshotSource;
    use prop_value::repository::InMemoryRepository;
    use prop_value::types::{GameId, Price, Side};
    use prop_value::{Engine, EngineError};
    use serde_json::{json, Value};

    const CONFIG: &str = r#"
[features]
rolling_windows = [2]
season_averages = false
opponent_specific = false
include_variance = false
stats = ["points"]

[strategy]
value_threshold = 0.05
min_confidence = 0.55
max_bets_per_game = 2
"#;

    const MODEL: &str = r#"{
        "kind": "logistic",
        "target": "over_under:points",
        "schema": {
            "version": "points-2024",
            "features": ["games_played", "points_mean_2", "rest_days", "ctx_is_home", "ctx_line"]
        },
        "intercept": 0.0,
        "weights": { "points_mean_2": 0.2, "ctx_line": -0.2 }
    }"#;

    fn entity(id: &str, kind: &str, team: Option<&str>) -> Value {
        json!({ "id": id, "name": id, "league": "NBA", "kind": kind, "team_id": team })
    }

    fn obs(entity: &str, game: &str, opp: &str, date: &str, points: f64) -> Value {
        json!({
            "entity_id": entity, "game_id": game, "opponent_id": opp,
            "date": date, "stats": { "points": points }
        })
    }

    fn ou(entity: &str, side: &str, price: f64, captured_at: &str) -> Value {
        json!({
            "game_id": "g3", "market": "over_under", "entity_id": entity, "stat": "points",
            "side": side, "price": price, "captured_at": captured_at, "line": 24.5
        })
    }

    /// Two played games, then g3 with points lines on three players:
    /// trailing means 30 (a), 28 (b), 20 (c) against a 24.5 line.
    fn snapshot_json() -> Value {
        let mut quotes = Vec::new();
        for player in ["a", "b", "c"] {
            quotes.push(ou(player, "over", -110.0, "2024-01-05T12:00:00Z"));
            quotes.push(ou(player, "under", -110.0, "2024-01-05T12:00:00Z"));
        }
        json!({
            "entities": [
                entity("DEN", "team", None),
                entity("LAL", "team", None),
                entity("a", "player", Some("DEN")),
                entity("b", "player", Some("DEN")),
                entity("c", "player", Some("LAL")),
            ],
            "games": [
                { "id": "g1", "date": "2024-01-01", "home_id": "DEN", "away_id": "LAL",
                  "home_score": 112, "away_score": 104, "season": "2023-24", "seq": 1 },
                { "id": "g2", "date": "2024-01-03", "home_id": "LAL", "away_id": "DEN",
                  "home_score": 99, "away_score": 101, "season": "2023-24", "seq": 2 },
                { "id": "g3", "date": "2024-01-05", "start_time": "2024-01-05T19:00:00Z",
                  "home_id": "DEN", "away_id": "LAL", "season": "2023-24", "seq": 3 }
            ],
            "observations": [
                obs("a", "g1", "LAL", "2024-01-01", 28.0),
                obs("a", "g2", "LAL", "2024-01-03", 32.0),
                obs("b", "g1", "LAL", "2024-01-01", 26.0),
                obs("b", "g2", "LAL", "2024-01-03", 30.0),
                obs("c", "g1", "DEN", "2024-01-01", 18.0),
                obs("c", "g2", "DEN", "2024-01-03", 22.0)
            ],
            "quotes": quotes
        })
    }

    fn engine() -> Engine {
        let config = Config::parse(CONFIG).unwrap();
        let spec: ModelSpec = serde_json::from_str(MODEL).unwrap();
        let mut scorers = ScorerSet::new();
        scorers.insert(spec.into_scorer().unwrap());
        Engine::new(&config, scorers)
    }

    fn repo(snapshot: Value) -> InMemoryRepository {
        let snap: Snapshot = serde_json::from_value(snapshot).unwrap();
        InMemoryRepository::from_snapshot(snap).unwrap()
    }

    fn noon() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, 12, 30, 0).unwrap()
    }

    fn sigmoid(z: f64) -> f64 {
        1.0 / (1.0 + (-z).exp())
    }

    #[test]
    fn test_recommendations_are_ranked_and_capped() {
        let recs = engine()
            .recommend_game(&repo(snapshot_json()), &GameId::from("g3"), noon())
            .unwrap();

        // b's over also clears the thresholds but falls past the cap of two.
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].prop_id.0, "a:points");
        assert_eq!(recs[0].side, Side::Over);
        assert_eq!(recs[0].rank, 1);
        assert_eq!(recs[1].prop_id.0, "c:points");
        assert_eq!(recs[1].side, Side::Under);
        assert_eq!(recs[1].rank, 2);

        let p_a = sigmoid(0.2 * (30.0 - 24.5));
        assert!((recs[0].model_probability - p_a).abs() < 1e-12);
        assert!((recs[0].implied_probability - 0.5).abs() < 1e-12);
        assert!((recs[0].edge - (p_a - 0.5)).abs() < 1e-12);
        assert_eq!(recs[0].confidence, recs[0].model_probability);
        assert_eq!(recs[0].price, Price::American(-110.0));
        assert_eq!(recs[0].line, Some(24.5));

        let p_c_under = 1.0 - sigmoid(0.2 * (20.0 - 24.5));
        assert!((recs[1].model_probability - p_c_under).abs() < 1e-12);
        assert!(recs.iter().all(|r| r.game_id == GameId::from("g3")));
    }

    #[test]
    fn test_quotes_after_now_are_invisible() {
        let early = Utc.with_ymd_and_hms(2024, 1, 5, 8, 0, 0).unwrap();
        let recs = engine()
            .recommend_game(&repo(snapshot_json()), &GameId::from("g3"), early)
            .unwrap();
        assert!(recs.is_empty());
    }

    #[test]
    fn test_malformed_market_fails_whole_game() {
        let mut snap = snapshot_json();
        // Zero-vig pair on b: rejected by the normalizer.
        for q in snap["quotes"].as_array_mut().unwrap() {
            if q["entity_id"] == "b" {
                q["price"] = if q["side"] == "over" { json!(-100.0) } else { json!(100.0) };
            }
        }
        let err = engine()
            .recommend_game(&repo(snap), &GameId::from("g3"), noon())
            .unwrap_err();
        assert_eq!(err.kind(), "malformed_odds");
    }

    #[test]
    fn test_schema_drift_is_rejected() {
        let config = Config::parse(&CONFIG.replace("rolling_windows = [2]", "rolling_windows = [3]")).unwrap();
        let spec: ModelSpec = serde_json::from_str(MODEL).unwrap();
        let mut scorers = ScorerSet::new();
        scorers.insert(spec.into_scorer().unwrap());
        let engine = Engine::new(&config, scorers);

        let err = engine
            .recommend_game(&repo(snapshot_json()), &GameId::from("g3"), noon())
            .unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_snapshot_file_round_trip_through_source() {
        let path = std::env::temp_dir().join(format!("prop-value-pipeline-{}.json", std::process::id()));
        std::fs::write(&path, serde_json::to_string(&snapshot_json()).unwrap()).unwrap();

        let snap = JsonFileSource::new(&path).load().await.unwrap();
        let _ = std::fs::remove_file(&path);
        let repo = InMemoryRepository::from_snapshot(snap).unwrap();

        let recs = engine().recommend_game(&repo, &GameId::from("g3"), noon()).unwrap();
        assert_eq!(recs.len(), 2);
    }
}
