//! Pre-trained linear popularity model.
//!
//! The model file is JSON exported by the training pipeline: a standard
//! scaler (`mean`, `scale`) followed by a linear regression (`coefficients`,
//! `intercept`), both over the five features in [`FEATURE_RANGES`] order.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audio::features::{feature_names, round_to, FeatureVector, FEATURE_RANGES};
use crate::error::ModelError;

const FEATURE_COUNT: usize = FEATURE_RANGES.len();
const SCORE_MIN: f64 = 0.0;
const SCORE_MAX: f64 = 100.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PopularityModel {
    pub features: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Held-out metrics recorded at training time (R², MAE, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<serde_json::Value>,
}

impl PopularityModel {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&content)?;
        model.validate()?;
        log::info!("Loaded popularity model from {}", path.display());
        Ok(model)
    }

    fn validate(&self) -> Result<(), ModelError> {
        let expected = feature_names();
        if self.features != expected {
            return Err(ModelError::FeatureMismatch {
                expected,
                found: self.features.clone(),
            });
        }
        for (field, values) in [
            ("mean", &self.mean),
            ("scale", &self.scale),
            ("coefficients", &self.coefficients),
        ] {
            if values.len() != FEATURE_COUNT {
                return Err(ModelError::Dimension {
                    field,
                    len: values.len(),
                    expected: FEATURE_COUNT,
                });
            }
        }
        Ok(())
    }

    /// Popularity in [0, 100], rounded to 0.1.
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        let values = features.to_array();
        let raw = values
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                // A zero-variance feature was left unscaled at training time.
                let scale = if self.scale[i] == 0.0 { 1.0 } else { self.scale[i] };
                self.coefficients[i] * (x - self.mean[i]) / scale
            })
            .sum::<f64>()
            + self.intercept;

        round_to(raw.clamp(SCORE_MIN, SCORE_MAX), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> PopularityModel {
        PopularityModel {
            features: feature_names(),
            mean: vec![3.5, 120.0, 0.6, 0.6, -8.0],
            scale: vec![1.0, 20.0, 0.2, 0.2, 4.0],
            coefficients: vec![-1.0, 2.0, 8.0, 6.0, 3.0],
            intercept: 50.0,
            evaluation: None,
        }
    }

    fn average() -> FeatureVector {
        FeatureVector::from_array([3.5, 120.0, 0.6, 0.6, -8.0])
    }

    #[test]
    fn mean_features_score_the_intercept() {
        assert_eq!(model().predict(&average()), 50.0);
    }

    #[test]
    fn standardizes_before_weighting() {
        let mut f = average();
        f.energy = 0.8; // one standard deviation up
        assert_eq!(model().predict(&f), 58.0);
    }

    #[test]
    fn score_is_clipped() {
        let mut m = model();
        m.intercept = 150.0;
        assert_eq!(m.predict(&average()), 100.0);
        m.intercept = -20.0;
        assert_eq!(m.predict(&average()), 0.0);
    }

    #[test]
    fn zero_scale_is_treated_as_one() {
        let mut m = model();
        m.scale[0] = 0.0;
        let mut f = average();
        f.duration_min = 4.5;
        assert_eq!(m.predict(&f), 49.0);
    }

    #[test]
    fn rejects_wrong_feature_order() {
        let mut m = model();
        m.features.swap(0, 1);
        assert!(matches!(m.validate(), Err(ModelError::FeatureMismatch { .. })));
    }

    #[test]
    fn rejects_short_vectors() {
        let mut m = model();
        m.coefficients.pop();
        assert!(matches!(
            m.validate(),
            Err(ModelError::Dimension { field: "coefficients", len: 4, expected: 5 })
        ));
    }

    #[test]
    fn loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut json = serde_json::to_value(model()).unwrap();
        json["evaluation"] = serde_json::json!({ "r2": 0.41 });
        std::fs::write(&path, json.to_string()).unwrap();

        let loaded = PopularityModel::load(&path).unwrap();
        assert_eq!(loaded.predict(&average()), 50.0);
        assert_eq!(loaded.evaluation.unwrap()["r2"], 0.41);
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(PopularityModel::load(&path), Err(ModelError::Parse(_))));
    }
}
