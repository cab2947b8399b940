use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use prop_value::config::{Config, LoggingConfig};
use prop_value::engine::backtest;
use prop_value::engine::scorer::ScorerSet;
use prop_value::feed::json_file::JsonFileSource;
use prop_value::feed::SnapshotSource;
use prop_value::repository::InMemoryRepository;
use prop_value::types::GameId;
use prop_value::Engine;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
usage:
  prop-value backtest  --snapshot FILE --model FILE [--model FILE ...] [--config FILE] [--out FILE]
  prop-value recommend --snapshot FILE --model FILE [--model FILE ...] --game ID [--now RFC3339] [--config FILE]";

#[derive(Debug, PartialEq)]
enum Command {
    Backtest { out: Option<PathBuf> },
    Recommend { game: GameId, now: Option<DateTime<Utc>> },
}

#[derive(Debug, PartialEq)]
struct Args {
    command: Command,
    snapshot: PathBuf,
    models: Vec<PathBuf>,
    config: PathBuf,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let Some(cmd) = args.next() else {
        bail!("missing command\n{}", USAGE);
    };

    let mut snapshot = None;
    let mut models = Vec::new();
    let mut config = PathBuf::from("config.toml");
    let mut out = None;
    let mut game = None;
    let mut now = None;

    while let Some(flag) = args.next() {
        let Some(value) = args.next() else {
            bail!("flag {} needs a value\n{}", flag, USAGE);
        };
        match flag.as_str() {
            "--snapshot" => snapshot = Some(PathBuf::from(value)),
            "--model" => models.push(PathBuf::from(value)),
            "--config" => config = PathBuf::from(value),
            "--out" => out = Some(PathBuf::from(value)),
            "--game" => game = Some(GameId(value)),
            "--now" => {
                let ts = DateTime::parse_from_rfc3339(&value)
                    .with_context(|| format!("--now is not RFC3339: {}", value))?;
                now = Some(ts.with_timezone(&Utc));
            }
            other => bail!("unknown flag {}\n{}", other, USAGE),
        }
    }

    let Some(snapshot) = snapshot else {
        bail!("--snapshot is required\n{}", USAGE);
    };
    if models.is_empty() {
        bail!("at least one --model is required\n{}", USAGE);
    }

    let command = match cmd.as_str() {
        "backtest" => Command::Backtest { out },
        "recommend" => {
            let Some(game) = game else {
                bail!("recommend needs --game\n{}", USAGE);
            };
            Command::Recommend { game, now }
        }
        other => bail!("unknown command {}\n{}", other, USAGE),
    };

    Ok(Args {
        command,
        snapshot,
        models,
        config,
    })
}

fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    let log_file = std::fs::File::create(&cfg.file)
        .with_context(|| format!("Failed to create log file: {}", cfg.file))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .init();
    Ok(())
}

fn write_json(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    let body = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    std::fs::write(path, body)
        .with_context(|| format!("Failed to write report: {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    let config = Config::load(&args.config)?;
    init_logging(&config.logging)?;

    let source = JsonFileSource::new(&args.snapshot);
    tracing::info!(source = %source.describe(), "loading snapshot");
    let snapshot = source.load().await?;
    let repo = InMemoryRepository::from_snapshot(snapshot)
        .with_context(|| format!("Invalid snapshot: {}", args.snapshot.display()))?;

    let scorers = ScorerSet::load(args.models.as_slice())?;
    let engine = Engine::new(&config, scorers);

    match args.command {
        Command::Backtest { out } => {
            let bt_config = config.backtest.clone();
            let report = tokio::task::spawn_blocking(move || backtest::run(&engine, &repo, &bt_config))
                .await
                .context("Backtest task failed")??;

            println!("{}", report);
            if let Some(path) = out {
                write_json(&path, &report)?;
                println!();
                println!("  JSON report written to {}", path.display());
            }
        }
        Command::Recommend { game, now } => {
            let now = now.unwrap_or_else(Utc::now);
            let recs = engine
                .recommend_game(&repo, &game, now)
                .with_context(|| format!("No recommendations for game {}", game))?;
            if recs.is_empty() {
                eprintln!("  No value found for game {}", game);
            }
            for rec in &recs {
                println!("{}", serde_json::to_string(rec).context("Failed to serialize recommendation")?);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> impl Iterator<Item = String> + '_ {
        s.split_whitespace().map(str::to_string)
    }

    #[test]
    fn test_parse_backtest() {
        let parsed =
            parse_args(args("backtest --snapshot s.json --model a.json --model b.json --out r.json")).unwrap();
        assert_eq!(parsed.models.len(), 2);
        assert_eq!(parsed.config, PathBuf::from("config.toml"));
        assert_eq!(parsed.command, Command::Backtest { out: Some(PathBuf::from("r.json")) });
    }

    #[test]
    fn test_parse_recommend_with_now() {
        let parsed = parse_args(args(
            "recommend --snapshot s.json --model a.json --game g1 --now 2024-01-05T12:00:00Z",
        ))
        .unwrap();
        match parsed.command {
            Command::Recommend { game, now } => {
                assert_eq!(game, GameId::from("g1"));
                assert_eq!(now.unwrap().to_rfc3339(), "2024-01-05T12:00:00+00:00");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_incomplete() {
        assert!(parse_args(args("recommend --snapshot s.json --model a.json")).is_err());
        assert!(parse_args(args("backtest --model a.json")).is_err());
        assert!(parse_args(args("backtest --snapshot s.json")).is_err());
        assert!(parse_args(args("backtest --snapshot")).is_err());
        assert!(parse_args(args("")).is_err());
    }
}
