//! Prediction adapter.
//!
//! A trained model is consumed only through the `Scorer` trait. `predict`
//! checks the feature vector against the scorer's schema and hands it a
//! row in schema order, missing markers included.

use super::features::{FeatureValue, FeatureVector};
use crate::error::{EngineError, EngineResult};
use crate::types::EntityId;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

/// Versioned, ordered list of the features a scorer was trained on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: String,
    pub features: Vec<String>,
}

impl FeatureSchema {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f == name)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for f in &self.features {
            if !seen.insert(f.as_str()) {
                bail!("schema {} lists feature {} twice", self.version, f);
            }
        }
        Ok(())
    }
}

pub trait Scorer: Send + Sync {
    fn schema(&self) -> &FeatureSchema;
    /// Target this scorer predicts, e.g. `moneyline` or `over_under:points`.
    fn target(&self) -> &str;
    fn name(&self) -> &str;
    /// Probability of the primary side (home / over) for one row in schema order.
    fn score(&self, row: &[FeatureValue]) -> f64;
    fn point_estimate(&self, _row: &[FeatureValue]) -> Option<f64> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub entity_id: EntityId,
    pub as_of: NaiveDate,
    pub windows: Vec<usize>,
    pub schema_version: String,
    pub probability: f64,
    pub point_estimate: Option<f64>,
}

/// Score a feature vector, refusing any vector whose names differ from the schema.
pub fn predict(scorer: &dyn Scorer, fv: &FeatureVector) -> EngineResult<PredictionResult> {
    let schema = scorer.schema();
    let expected: BTreeSet<&str> = schema.features.iter().map(String::as_str).collect();
    let actual: BTreeSet<&str> = fv.names().collect();
    if expected != actual {
        return Err(EngineError::SchemaMismatch {
            schema: schema.version.clone(),
            missing: expected.difference(&actual).map(|s| s.to_string()).collect(),
            unexpected: actual.difference(&expected).map(|s| s.to_string()).collect(),
        });
    }

    let row: Vec<FeatureValue> = schema
        .features
        .iter()
        .map(|name| fv.get(name).unwrap_or(FeatureValue::Missing))
        .collect();

    let probability = scorer.score(&row);
    if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
        return Err(EngineError::Numeric(format!(
            "{} returned probability {} for {}",
            scorer.name(),
            probability,
            fv.entity_id
        )));
    }
    let point_estimate = match scorer.point_estimate(&row) {
        Some(p) if !p.is_finite() => {
            return Err(EngineError::Numeric(format!(
                "{} returned point estimate {} for {}",
                scorer.name(),
                p,
                fv.entity_id
            )))
        }
        other => other,
    };

    Ok(PredictionResult {
        entity_id: fv.entity_id.clone(),
        as_of: fv.as_of,
        windows: fv.windows.clone(),
        schema_version: schema.version.clone(),
        probability,
        point_estimate,
    })
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

// -- Model files --

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    Logistic(LogisticSpec),
    Stumps(StumpSpec),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogisticSpec {
    pub target: String,
    pub schema: FeatureSchema,
    pub intercept: f64,
    pub weights: BTreeMap<String, f64>,
    /// Imputed value per feature when the row carries a missing marker.
    /// Features without an entry contribute nothing when missing.
    #[serde(default)]
    pub missing_values: BTreeMap<String, f64>,
    #[serde(default)]
    pub point: Option<LinearHead>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinearHead {
    pub intercept: f64,
    pub weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StumpSpec {
    pub target: String,
    pub schema: FeatureSchema,
    /// Log-odds prior.
    #[serde(default)]
    pub base_score: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    pub stumps: Vec<StumpNode>,
}

fn default_learning_rate() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct StumpNode {
    pub feature: String,
    pub threshold: f64,
    pub left: f64,
    pub right: f64,
    /// Direction taken when the feature is missing.
    #[serde(default = "default_true")]
    pub missing_left: bool,
}

fn default_true() -> bool {
    true
}

/// Align a name-keyed weight map with the schema order.
fn align(schema: &FeatureSchema, weights: &BTreeMap<String, f64>, what: &str) -> Result<Vec<f64>> {
    let mut aligned = vec![0.0; schema.features.len()];
    for (name, w) in weights {
        let Some(i) = schema.index_of(name) else {
            bail!("{} references feature {} outside schema {}", what, name, schema.version);
        };
        if !w.is_finite() {
            bail!("{} weight for {} is not finite", what, name);
        }
        aligned[i] = *w;
    }
    Ok(aligned)
}

impl ModelSpec {
    pub fn into_scorer(self) -> Result<Arc<dyn Scorer>> {
        match self {
            ModelSpec::Logistic(spec) => Ok(Arc::new(LogisticScorer::from_spec(spec)?)),
            ModelSpec::Stumps(spec) => Ok(Arc::new(StumpEnsemble::from_spec(spec)?)),
        }
    }
}

pub fn load_scorer(path: &Path) -> Result<Arc<dyn Scorer>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read model file: {}", path.display()))?;
    let spec: ModelSpec = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse model file: {}", path.display()))?;
    spec.into_scorer()
        .with_context(|| format!("Invalid model: {}", path.display()))
}

// -- Logistic regression --

pub struct LogisticScorer {
    target: String,
    schema: FeatureSchema,
    intercept: f64,
    weights: Vec<f64>,
    impute: Vec<Option<f64>>,
    point: Option<(f64, Vec<f64>)>,
}

impl LogisticScorer {
    pub fn from_spec(spec: LogisticSpec) -> Result<Self> {
        spec.schema.validate()?;
        let weights = align(&spec.schema, &spec.weights, "logistic")?;
        let mut impute = vec![None; spec.schema.features.len()];
        for (name, v) in &spec.missing_values {
            let Some(i) = spec.schema.index_of(name) else {
                bail!("imputation for {} outside schema {}", name, spec.schema.version);
            };
            impute[i] = Some(*v);
        }
        let point = match &spec.point {
            Some(head) => Some((head.intercept, align(&spec.schema, &head.weights, "point head")?)),
            None => None,
        };
        Ok(Self {
            target: spec.target,
            schema: spec.schema,
            intercept: spec.intercept,
            weights,
            impute,
            point,
        })
    }

    fn linear(&self, intercept: f64, weights: &[f64], row: &[FeatureValue]) -> f64 {
        row.iter()
            .zip(weights)
            .zip(&self.impute)
            .fold(intercept, |acc, ((v, w), imp)| match v.value().or(*imp) {
                Some(x) => acc + w * x,
                None => acc,
            })
    }
}

impl Scorer for LogisticScorer {
    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn name(&self) -> &str {
        "logistic"
    }

    fn score(&self, row: &[FeatureValue]) -> f64 {
        sigmoid(self.linear(self.intercept, &self.weights, row))
    }

    fn point_estimate(&self, row: &[FeatureValue]) -> Option<f64> {
        self.point
            .as_ref()
            .map(|(intercept, weights)| self.linear(*intercept, weights, row))
    }
}

// -- Boosted stumps --

struct Stump {
    feature: usize,
    threshold: f64,
    left: f64,
    right: f64,
    missing_left: bool,
}

pub struct StumpEnsemble {
    target: String,
    schema: FeatureSchema,
    base_score: f64,
    learning_rate: f64,
    stumps: Vec<Stump>,
}

impl StumpEnsemble {
    pub fn from_spec(spec: StumpSpec) -> Result<Self> {
        spec.schema.validate()?;
        let mut stumps = Vec::with_capacity(spec.stumps.len());
        for node in &spec.stumps {
            let Some(feature) = spec.schema.index_of(&node.feature) else {
                bail!("stump splits on {} outside schema {}", node.feature, spec.schema.version);
            };
            stumps.push(Stump {
                feature,
                threshold: node.threshold,
                left: node.left,
                right: node.right,
                missing_left: node.missing_left,
            });
        }
        Ok(Self {
            target: spec.target,
            schema: spec.schema,
            base_score: spec.base_score,
            learning_rate: spec.learning_rate,
            stumps,
        })
    }
}

impl Scorer for StumpEnsemble {
    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn name(&self) -> &str {
        "stumps"
    }

    fn score(&self, row: &[FeatureValue]) -> f64 {
        let margin = self.stumps.iter().fold(self.base_score, |acc, s| {
            let go_left = match row.get(s.feature).and_then(|v| v.value()) {
                Some(x) => x < s.threshold,
                None => s.missing_left,
            };
            acc + self.learning_rate * if go_left { s.left } else { s.right }
        });
        sigmoid(margin)
    }
}

/// Scorers indexed by target.
#[derive(Default, Clone)]
pub struct ScorerSet {
    scorers: BTreeMap<String, Arc<dyn Scorer>>,
}

impl ScorerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(paths: &[impl AsRef<Path>]) -> Result<Self> {
        let mut set = Self::new();
        for path in paths {
            let scorer = load_scorer(path.as_ref())?;
            tracing::info!(
                path = %path.as_ref().display(),
                model_target = scorer.target(),
                kind = scorer.name(),
                schema = %scorer.schema().version,
                features = scorer.schema().features.len(),
                "model loaded"
            );
            set.insert(scorer);
        }
        if set.is_empty() {
            bail!("no model files given");
        }
        tracing::info!(targets = %set.targets().collect::<Vec<_>>().join(","), "scorers ready");
        Ok(set)
    }

    pub fn insert(&mut self, scorer: Arc<dyn Scorer>) {
        if let Some(prev) = self.scorers.insert(scorer.target().to_string(), scorer) {
            tracing::warn!(model_target = prev.target(), "scorer replaced");
        }
    }

    pub fn get(&self, target: &str) -> EngineResult<&dyn Scorer> {
        self.scorers
            .get(target)
            .map(|s| s.as_ref())
            .ok_or_else(|| EngineError::NoScorer(target.to_string()))
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.scorers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.scorers.is_empty()
    }
}
