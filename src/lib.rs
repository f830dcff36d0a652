//! Audio descriptor extraction for popularity regression.
//!
//! Decodes up to a minute of a track and reduces it to five features:
//! duration, tempo, energy, danceability and loudness. Tempo comes from three
//! independent estimators reconciled with octave-aware scoring.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;

pub use audio::analysis::{extract_features, features_from_waveform};
pub use audio::features::{FeatureVector, Waveform};
pub use engine::{Engine, Report};
pub use error::{FeatureError, ModelError, TempoError};
