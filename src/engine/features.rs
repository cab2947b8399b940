//! Temporal feature extraction
//!
//! Rolling-window, season-to-date and opponent-specific aggregates computed
//! strictly from observations dated before the as-of date. A window without
//! enough history yields `FeatureValue::Missing`, never a zero.

use crate::config::FeatureConfig;
use crate::error::{EngineError, EngineResult};
use crate::repository::Repository;
use crate::types::{EntityId, Observation};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single feature value, or the marker for "no history".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureValue {
    Value(f64),
    Missing,
}

impl FeatureValue {
    pub fn value(self) -> Option<f64> {
        match self {
            FeatureValue::Value(v) => Some(v),
            FeatureValue::Missing => None,
        }
    }

    pub fn is_missing(self) -> bool {
        matches!(self, FeatureValue::Missing)
    }

    fn from_option(v: Option<f64>) -> Self {
        v.map_or(FeatureValue::Missing, FeatureValue::Value)
    }
}

/// What a feature vector is computed for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureRequest {
    pub entity_id: EntityId,
    pub as_of: NaiveDate,
    /// Opponent faced in the target game, for opponent-specific aggregates.
    pub opponent_id: Option<EntityId>,
    /// Season of the target game, for season-to-date aggregates.
    pub season: Option<String>,
}

/// Cache key: the request plus the window configuration it was built with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureKey {
    pub request: FeatureRequest,
    pub config: FeatureConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub entity_id: EntityId,
    pub as_of: NaiveDate,
    pub windows: Vec<usize>,
    values: BTreeMap<String, FeatureValue>,
}

impl FeatureVector {
    pub fn get(&self, name: &str) -> Option<FeatureValue> {
        self.values.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FeatureValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn missing_count(&self) -> usize {
        self.values.values().filter(|v| v.is_missing()).count()
    }

    /// Derive a new vector with one more feature. The original is untouched.
    pub fn with_feature(&self, name: &str, value: FeatureValue) -> FeatureVector {
        let mut next = self.clone();
        next.values.insert(name.to_string(), value);
        next
    }
}

/// Builds feature vectors for one window configuration.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn key_for(&self, request: &FeatureRequest) -> FeatureKey {
        FeatureKey {
            request: request.clone(),
            config: self.config.clone(),
        }
    }

    /// Every feature name this configuration produces, sorted.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = vec!["games_played".to_string(), "rest_days".to_string()];
        for stat in &self.config.stats {
            for w in &self.config.rolling_windows {
                names.push(format!("{}_mean_{}", stat, w));
                if self.config.include_variance {
                    names.push(format!("{}_var_{}", stat, w));
                }
            }
            if self.config.season_averages {
                names.push(format!("{}_season_mean", stat));
            }
            if self.config.opponent_specific {
                for w in &self.config.rolling_windows {
                    names.push(format!("opp_{}_mean_{}", stat, w));
                }
                names.push(format!("opp_{}_mean_all", stat));
            }
        }
        names.sort();
        names.dedup();
        names
    }

    /// Fails with `UnknownEntity` when the repository has no trace of the entity.
    pub fn ensure_known(&self, repo: &dyn Repository, entity: &EntityId) -> EngineResult<()> {
        if repo.is_known(entity) {
            Ok(())
        } else {
            Err(EngineError::UnknownEntity(entity.clone()))
        }
    }

    pub fn build(&self, repo: &dyn Repository, request: &FeatureRequest) -> EngineResult<FeatureVector> {
        self.ensure_known(repo, &request.entity_id)?;
        Ok(self.compute(repo, request))
    }

    /// Compute for an entity already known to the repository.
    pub(crate) fn compute(&self, repo: &dyn Repository, request: &FeatureRequest) -> FeatureVector {
        let all = repo.observations(&request.entity_id);
        let cutoff = all.partition_point(|o| o.date < request.as_of);
        let prior = &all[..cutoff];

        let mut values = BTreeMap::new();
        values.insert("games_played".to_string(), FeatureValue::Value(prior.len() as f64));
        let rest = prior.last().map(|last| {
            let days = (request.as_of - last.date).num_days().max(0) as f64;
            days.min(self.config.max_rest_days as f64)
        });
        values.insert("rest_days".to_string(), FeatureValue::from_option(rest));

        let season_obs: Vec<&Observation> = match &request.season {
            Some(season) => prior
                .iter()
                .filter(|o| o.season.as_deref() == Some(season.as_str()))
                .collect(),
            None => Vec::new(),
        };
        let opp_obs: Vec<&Observation> = match &request.opponent_id {
            Some(opp) => prior.iter().filter(|o| o.opponent_id == *opp).collect(),
            None => Vec::new(),
        };

        for stat in &self.config.stats {
            let series = stat_series(prior.iter(), stat);
            for &w in &self.config.rolling_windows {
                let window = trailing(&series, w);
                values.insert(
                    format!("{}_mean_{}", stat, w),
                    FeatureValue::from_option(window.and_then(mean)),
                );
                if self.config.include_variance {
                    values.insert(
                        format!("{}_var_{}", stat, w),
                        FeatureValue::from_option(window.and_then(variance)),
                    );
                }
            }

            if self.config.season_averages {
                let season_series = stat_series(season_obs.iter().copied(), stat);
                values.insert(
                    format!("{}_season_mean", stat),
                    FeatureValue::from_option(mean(&season_series)),
                );
            }

            if self.config.opponent_specific {
                let opp_series = stat_series(opp_obs.iter().copied(), stat);
                for &w in &self.config.rolling_windows {
                    values.insert(
                        format!("opp_{}_mean_{}", stat, w),
                        FeatureValue::from_option(trailing(&opp_series, w).and_then(mean)),
                    );
                }
                values.insert(
                    format!("opp_{}_mean_all", stat),
                    FeatureValue::from_option(mean(&opp_series)),
                );
            }
        }

        let fv = FeatureVector {
            entity_id: request.entity_id.clone(),
            as_of: request.as_of,
            windows: self.config.rolling_windows.clone(),
            values,
        };
        if fv.missing_count() > 0 {
            tracing::debug!(
                entity = %request.entity_id,
                as_of = %request.as_of,
                history = prior.len(),
                missing = fv.missing_count(),
                "insufficient history for some features"
            );
        }
        fv
    }
}

/// Values of one stat in chronological order, skipping observations without it.
fn stat_series<'a>(obs: impl Iterator<Item = &'a Observation>, stat: &str) -> Vec<f64> {
    obs.filter_map(|o| o.stat(stat)).collect()
}

/// The most recent `w` values, or `None` when fewer exist.
fn trailing(series: &[f64], w: usize) -> Option<&[f64]> {
    if w == 0 || series.len() < w {
        None
    } else {
        Some(&series[series.len() - w..])
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance.
fn variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some(values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64)
}
