use serde::{Deserialize, Serialize};

use crate::error::FeatureError;

/// Analysis sample rate. Every waveform is resampled to this before analysis.
pub const ANALYSIS_SAMPLE_RATE: u32 = 22050;
/// Upper bound on decoded audio per track, whatever the configuration asks for.
pub const MAX_ANALYSIS_SECS: f64 = 60.0;
/// Samples between consecutive analysis frames.
pub const HOP_LENGTH: usize = 512;
/// Samples per analysis frame (STFT size and RMS window).
pub const FRAME_LENGTH: usize = 2048;

/// Mono analysis signal plus the duration of the whole track.
#[derive(Clone, Debug)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
    /// Full-track duration in seconds, independent of how much was decoded.
    full_duration: f64,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32, full_duration: f64) -> Result<Self, FeatureError> {
        if samples.is_empty() {
            return Err(FeatureError::EmptySignal);
        }
        Ok(Self {
            samples,
            sample_rate,
            full_duration,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn full_duration(&self) -> f64 {
        self.full_duration
    }

    /// Length of the analyzed window in seconds.
    pub fn window_duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// The five descriptors handed to the popularity model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub duration_min: f64,
    pub tempo_bpm: f64,
    pub energy: f64,
    pub danceability: f64,
    pub loudness_db: f64,
}

/// Closed range and UI hints for one feature.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct FeatureRange {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default: f64,
}

impl FeatureRange {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

pub const DURATION_RANGE: FeatureRange = FeatureRange { name: "duration_min", min: 1.5, max: 8.0, step: 0.1, default: 3.5 };
pub const TEMPO_RANGE: FeatureRange = FeatureRange { name: "tempo_bpm", min: 60.0, max: 200.0, step: 1.0, default: 120.0 };
pub const ENERGY_RANGE: FeatureRange = FeatureRange { name: "energy", min: 0.0, max: 1.0, step: 0.01, default: 0.6 };
pub const DANCEABILITY_RANGE: FeatureRange = FeatureRange { name: "danceability", min: 0.0, max: 1.0, step: 0.01, default: 0.6 };
pub const LOUDNESS_RANGE: FeatureRange = FeatureRange { name: "loudness_db", min: -30.0, max: 0.0, step: 0.5, default: -8.0 };

/// Feature order shared with the training pipeline and the model file.
pub const FEATURE_RANGES: [FeatureRange; 5] = [
    DURATION_RANGE,
    TEMPO_RANGE,
    ENERGY_RANGE,
    DANCEABILITY_RANGE,
    LOUDNESS_RANGE,
];

impl FeatureVector {
    /// Values in model order (see [`FEATURE_RANGES`]).
    pub fn to_array(&self) -> [f64; 5] {
        [
            self.duration_min,
            self.tempo_bpm,
            self.energy,
            self.danceability,
            self.loudness_db,
        ]
    }

    pub fn from_array(values: [f64; 5]) -> Self {
        Self {
            duration_min: values[0],
            tempo_bpm: values[1],
            energy: values[2],
            danceability: values[3],
            loudness_db: values[4],
        }
    }

    /// Clamp every field into its range. Used for hand-entered features.
    pub fn clamped(&self) -> Self {
        let mut values = self.to_array();
        for (value, range) in values.iter_mut().zip(FEATURE_RANGES.iter()) {
            *value = range.clamp(*value);
        }
        Self::from_array(values)
    }

    /// True when every field is finite and inside its range.
    pub fn in_range(&self) -> bool {
        self.to_array()
            .iter()
            .zip(FEATURE_RANGES.iter())
            .all(|(v, r)| r.contains(*v))
    }
}

pub fn feature_names() -> Vec<String> {
    FEATURE_RANGES.iter().map(|r| r.name.to_string()).collect()
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_samples_are_rejected() {
        let err = Waveform::new(Vec::new(), ANALYSIS_SAMPLE_RATE, 10.0).unwrap_err();
        assert!(matches!(err, FeatureError::EmptySignal));
    }

    #[test]
    fn window_duration_uses_samples_not_metadata() {
        let wave = Waveform::new(vec![0.0; 22050 * 2], ANALYSIS_SAMPLE_RATE, 300.0).unwrap();
        assert!((wave.window_duration() - 2.0).abs() < 1e-9);
        assert_eq!(wave.full_duration(), 300.0);
    }

    #[test]
    fn clamped_pulls_values_into_range() {
        let raw = FeatureVector {
            duration_min: 12.0,
            tempo_bpm: 30.0,
            energy: 1.4,
            danceability: -0.2,
            loudness_db: 3.0,
        };
        let clamped = raw.clamped();
        assert!(!raw.in_range());
        assert!(clamped.in_range());
        assert_eq!(clamped.duration_min, 8.0);
        assert_eq!(clamped.tempo_bpm, 60.0);
        assert_eq!(clamped.energy, 1.0);
        assert_eq!(clamped.danceability, 0.0);
        assert_eq!(clamped.loudness_db, 0.0);
    }

    #[test]
    fn serializes_with_training_field_names() {
        let fv = FeatureVector::from_array([3.5, 120.0, 0.6, 0.6, -8.0]);
        let json = serde_json::to_value(fv).unwrap();
        for name in feature_names() {
            assert!(json.get(&name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn round_to_places() {
        assert_eq!(round_to(129.19, 1), 129.2);
        assert_eq!(round_to(0.12345, 3), 0.123);
        assert_eq!(round_to(-12.34, 1), -12.3);
    }
}
