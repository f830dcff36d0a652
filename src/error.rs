use thiserror::Error;

/// Failures surfaced to callers of the feature pipeline.
///
/// Only loader-level problems end up here. Everything after a successful
/// decode always produces a value.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("failed to open audio file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode audio: {0}")]
    Decode(String),

    #[error("decoded audio contains no samples")]
    EmptySignal,
}

impl FeatureError {
    /// True when the failure is the caller's input (bad or empty file)
    /// rather than an internal fault.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            FeatureError::Io(_) | FeatureError::Decode(_) | FeatureError::EmptySignal
        )
    }
}

impl From<symphonia::core::errors::Error> for FeatureError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        FeatureError::Decode(err.to_string())
    }
}

/// Why a single tempo method could not produce an estimate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TempoError {
    #[error("onset envelope too short: {frames} frames")]
    TooShort { frames: usize },

    #[error("onset envelope carries no energy")]
    Silent,

    #[error("beat tracker found only {beats} beats")]
    TooFewBeats { beats: usize },

    #[error("no tempo peak inside {min_bpm:.0}-{max_bpm:.0} BPM")]
    NoPeak { min_bpm: f64, max_bpm: f64 },

    #[error("non-finite tempo estimate")]
    NonFinite,
}

/// Problems loading or applying a popularity model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse model file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("model expects features {found:?}, this build produces {expected:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("model field `{field}` has {len} entries, expected {expected}")]
    Dimension {
        field: &'static str,
        len: usize,
        expected: usize,
    },
}
