use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub features: FeatureConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Window configuration for the temporal feature builder.
///
/// Part of every feature cache key, so it must stay hashable.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct FeatureConfig {
    pub rolling_windows: Vec<usize>,
    #[serde(default = "default_true")]
    pub season_averages: bool,
    #[serde(default)]
    pub opponent_specific: bool,
    #[serde(default)]
    pub include_variance: bool,
    pub stats: Vec<String>,
    #[serde(default = "default_max_rest_days")]
    pub max_rest_days: u32,
}

fn default_true() -> bool {
    true
}

fn default_max_rest_days() -> u32 {
    7
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            rolling_windows: vec![3, 5, 10, 20],
            season_averages: true,
            opponent_specific: true,
            include_variance: false,
            stats: vec!["points".to_string(), "rebounds".to_string(), "assists".to_string()],
            max_rest_days: 7,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StrategyConfig {
    /// Minimum edge (model minus de-vigged book probability).
    pub value_threshold: f64,
    /// Minimum model probability for the recommended side.
    pub min_confidence: f64,
    /// Hard cap on recommendations kept per game.
    pub max_bets_per_game: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            value_threshold: 0.05,
            min_confidence: 0.55,
            max_bets_per_game: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BacktestConfig {
    /// Worker threads for pair evaluation; 0 uses the rayon default.
    #[serde(default)]
    pub workers: usize,
    /// Evaluate a seeded sample of this many pairs; 0 evaluates all.
    #[serde(default)]
    pub sample_size: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_calibration_bins")]
    pub calibration_bins: usize,
}

fn default_seed() -> u64 {
    42
}

fn default_calibration_bins() -> usize {
    10
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            sample_size: 0,
            seed: 42,
            calibration_bins: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_file")]
    pub file: String,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_file() -> String {
    "prop-value.log".to_string()
}

fn default_log_filter() -> String {
    "prop_value=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            filter: default_log_filter(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            strategy: StrategyConfig::default(),
            backtest: BacktestConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::parse(&content)?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject option values outside their documented ranges.
    pub fn validate(&self) -> Result<()> {
        let s = &self.strategy;
        if !(s.value_threshold > 0.0 && s.value_threshold < 1.0) {
            anyhow::bail!("strategy.value_threshold must be in (0, 1), got {}", s.value_threshold);
        }
        if !(s.min_confidence > 0.0 && s.min_confidence < 1.0) {
            anyhow::bail!("strategy.min_confidence must be in (0, 1), got {}", s.min_confidence);
        }
        if s.max_bets_per_game < 1 {
            anyhow::bail!("strategy.max_bets_per_game must be at least 1");
        }

        let f = &self.features;
        if f.rolling_windows.is_empty() {
            anyhow::bail!("features.rolling_windows cannot be empty");
        }
        if f.rolling_windows.contains(&0) {
            anyhow::bail!("features.rolling_windows entries must be at least 1");
        }
        if f.stats.is_empty() {
            anyhow::bail!("features.stats cannot be empty");
        }

        if self.backtest.calibration_bins < 1 {
            anyhow::bail!("backtest.calibration_bins must be at least 1");
        }
        Ok(())
    }
}
