//! Predictive model collaborator.

use crate::errors::ResolveError;
use crate::features::{feature_index, FeatureRow};
use crate::models::Prediction;
use serde::Deserialize;
use std::path::Path;

/// A trained loan-approval classifier.
///
/// Implementations are loaded once and shared read-only across requests.
pub trait LoanModel: Send + Sync {
    /// Raw model score before the link function.
    fn margin(&self, row: &FeatureRow) -> Result<f64, ResolveError>;

    /// Class label and positive-class probability.
    fn predict(&self, row: &FeatureRow) -> Result<Prediction, ResolveError>;
}

/// Serialized form of [`LogisticModel`].
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticArtifact {
    pub features: Vec<String>,
    pub weights: Vec<f64>,
    pub intercept: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    0.5
}

/// Logistic regression over a subset of the derived features.
#[derive(Debug, Clone)]
pub struct LogisticModel {
    indices: Vec<usize>,
    weights: Vec<f64>,
    intercept: f64,
    threshold: f64,
}

impl LogisticModel {
    pub fn from_artifact(artifact: LogisticArtifact) -> anyhow::Result<Self> {
        if artifact.features.len() != artifact.weights.len() {
            anyhow::bail!(
                "model artifact lists {} features but {} weights",
                artifact.features.len(),
                artifact.weights.len()
            );
        }
        if artifact.features.is_empty() {
            anyhow::bail!("model artifact has no features");
        }
        if !(0.0..=1.0).contains(&artifact.threshold) {
            anyhow::bail!("model threshold must be within [0, 1]");
        }

        let indices = artifact
            .features
            .iter()
            .map(|name| {
                feature_index(name)
                    .ok_or_else(|| anyhow::anyhow!("model artifact uses unknown feature '{}'", name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            indices,
            weights: artifact.weights,
            intercept: artifact.intercept,
            threshold: artifact.threshold,
        })
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let artifact: LogisticArtifact = serde_json::from_str(json)?;
        Self::from_artifact(artifact)
    }

    /// Loads the artifact from disk.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read model artifact {}: {}", path.display(), e))?;
        let model = Self::from_json_str(&json)?;
        tracing::info!(
            "Loaded logistic model from {} ({} features)",
            path.display(),
            model.weights.len()
        );
        Ok(model)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl LoanModel for LogisticModel {
    fn margin(&self, row: &FeatureRow) -> Result<f64, ResolveError> {
        let values = row.values();
        let score = self
            .indices
            .iter()
            .zip(&self.weights)
            .map(|(&idx, &weight)| weight * values[idx])
            .sum::<f64>()
            + self.intercept;
        if !score.is_finite() {
            return Err(ResolveError::Model("model score is not finite".to_string()));
        }
        Ok(score)
    }

    fn predict(&self, row: &FeatureRow) -> Result<Prediction, ResolveError> {
        let probability = sigmoid(self.margin(row)?);
        Ok(Prediction {
            label: u8::from(probability >= self.threshold),
            probability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::derive;
    use crate::models::FarmerRecord;

    const ARTIFACT: &str = r#"{
        "features": ["ndvi", "agronomic_score"],
        "weights": [2.0, 1.0],
        "intercept": -1.0
    }"#;

    fn row() -> FeatureRow {
        let record = FarmerRecord {
            phone_number: 1,
            raw_phone_number: "911".to_string(),
            credit_limit: None,
            loan_approval: 0,
            attributes: [
                ("NDVI", "0.5"),
                ("Rainfall_mm", "0"),
                ("Soil_pH", "6.5"),
                ("Distance_to_Market_km", "100"),
                ("Land_Size_acres", "0"),
                ("Crop_Type", "Maize"),
            ]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
            defects: Vec::new(),
        };
        derive(&record).unwrap()
    }

    #[test]
    fn test_margin_is_linear() {
        let model = LogisticModel::from_json_str(ARTIFACT).unwrap();
        let row = row();
        // agronomic = 1.0 * (0.5 * 0.3 + 0.3 * 1.0 + 0.2 * 0.0) = 0.45
        let expected = 2.0 * 0.5 + 0.45 - 1.0;
        assert!((model.margin(&row).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_predict_thresholds_probability() {
        let model = LogisticModel::from_json_str(ARTIFACT).unwrap();
        let prediction = model.predict(&row()).unwrap();
        assert!(prediction.probability > 0.5);
        assert_eq!(prediction.label, 1);

        let strict = LogisticModel::from_json_str(
            r#"{"features": ["ndvi"], "weights": [0.0], "intercept": 0.0, "threshold": 0.9}"#,
        )
        .unwrap();
        let prediction = strict.predict(&row()).unwrap();
        assert!((prediction.probability - 0.5).abs() < 1e-12);
        assert_eq!(prediction.label, 0);
    }

    #[test]
    fn test_artifact_validation() {
        assert!(LogisticModel::from_json_str(
            r#"{"features": ["ndvi"], "weights": [1.0, 2.0], "intercept": 0.0}"#
        )
        .is_err());
        assert!(LogisticModel::from_json_str(
            r#"{"features": ["shoe_size"], "weights": [1.0], "intercept": 0.0}"#
        )
        .is_err());
        assert!(LogisticModel::from_json_str(
            r#"{"features": [], "weights": [], "intercept": 0.0}"#
        )
        .is_err());
        assert!(LogisticModel::from_json_str("not json").is_err());
    }

    #[test]
    fn test_shipped_artifact_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/models/loan_model.json");
        let model = LogisticModel::load(path).unwrap();
        assert_eq!(model.indices.len(), 6);
        assert_eq!(model.indices.len(), model.weights.len());
        let prediction = model.predict(&row()).unwrap();
        assert!(prediction.probability > 0.0 && prediction.probability < 1.0);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(LogisticModel::load("/nonexistent/model.json").is_err());
    }
}
