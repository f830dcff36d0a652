use std::path::Path;

use serde::Serialize;

use crate::audio::analysis::extract_features;
use crate::audio::decode::{is_supported_extension, SUPPORTED_EXTENSIONS};
use crate::audio::features::FeatureVector;
use crate::config::AnalysisConfig;
use crate::error::FeatureError;
use crate::model::PopularityModel;

/// Everything a request needs that is fixed for the life of the process.
/// Shared by reference; never mutated after construction.
#[derive(Debug)]
pub struct Engine {
    pub analysis: AnalysisConfig,
    pub model: Option<PopularityModel>,
}

/// Who is to blame for a failed analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Bad, empty or unsupported input file.
    Input,
    /// Anything else.
    Internal,
}

#[derive(Clone, Debug, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&FeatureError> for Failure {
    fn from(err: &FeatureError) -> Self {
        Self {
            kind: if err.is_input_error() {
                FailureKind::Input
            } else {
                FailureKind::Internal
            },
            message: err.to_string(),
        }
    }
}

/// Per-file result of [`Engine::analyze`].
#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
}

impl Report {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl Engine {
    pub fn new(analysis: AnalysisConfig, model: Option<PopularityModel>) -> Self {
        Self { analysis, model }
    }

    /// Analyze one file, scoring it when a model is loaded. Failures are
    /// captured in the report rather than returned.
    pub fn analyze(&self, path: &Path) -> Report {
        let file = path.display().to_string();

        if !is_supported_extension(path) {
            return Report {
                file,
                features: None,
                popularity: None,
                error: Some(Failure {
                    kind: FailureKind::Input,
                    message: format!(
                        "unsupported file type, expected one of: {}",
                        SUPPORTED_EXTENSIONS.join(", ")
                    ),
                }),
            };
        }

        match extract_features(path, &self.analysis) {
            Ok(features) => Report {
                file,
                popularity: self.score(&features),
                features: Some(features),
                error: None,
            },
            Err(err) => {
                log::warn!("{}: {}", file, err);
                Report {
                    file,
                    features: None,
                    popularity: None,
                    error: Some(Failure::from(&err)),
                }
            }
        }
    }

    pub fn score(&self, features: &FeatureVector) -> Option<f64> {
        self.model.as_ref().map(|m| m.predict(features))
    }
}
