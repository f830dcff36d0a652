use super::features::{
    round_to, DANCEABILITY_RANGE, DURATION_RANGE, ENERGY_RANGE, HOP_LENGTH, LOUDNESS_RANGE,
};
use super::spectral::{autocorrelate, percentile};

/// Mean frame RMS that maps to full energy.
const ENERGY_REFERENCE_RMS: f64 = 0.35;
/// Onsets per second that saturate the onset factor.
const MAX_ONSET_RATE: f64 = 5.0;
/// Upper bound (exclusive) of the lag window searched for beat regularity.
const REGULARITY_MAX_LAG: usize = 150;
const LOUDNESS_PERCENTILE: f64 = 90.0;
const EPSILON: f64 = 1e-10;

const REGULARITY_WEIGHT: f64 = 0.35;
const ONSET_WEIGHT: f64 = 0.25;
const ENERGY_WEIGHT: f64 = 0.20;
const TEMPO_WEIGHT: f64 = 0.20;

/// Square-root compressed mean RMS, in [0, 1] to 3 decimals.
pub fn energy(rms: &[f32]) -> f64 {
    let mean = mean_rms(rms);
    let energy = (mean / ENERGY_REFERENCE_RMS).min(1.0).max(0.0).sqrt();
    round_to(ENERGY_RANGE.clamp(energy), 3)
}

/// Peak normalized autocorrelation of the onset envelope over beat-scale
/// lags. 0.5 when the envelope is too short to say.
pub fn regularity(envelope: &[f32], sample_rate: u32) -> f64 {
    let max_size = sample_rate as usize / HOP_LENGTH;
    let ac = autocorrelate(envelope, max_size);
    if ac.len() < 2 {
        return 0.5;
    }

    let zero_lag = ac[0] as f64 + EPSILON;
    let upper = ac.len().min(REGULARITY_MAX_LAG);
    let peak = ac[1..upper]
        .iter()
        .map(|&v| v as f64 / zero_lag)
        .fold(f64::NEG_INFINITY, f64::max);

    peak.min(1.0)
}

/// Onset events per second of track, scaled so 5/s is 1.0.
pub fn onset_factor(onset_count: usize, full_duration_secs: f64) -> f64 {
    let rate = onset_count as f64 / full_duration_secs.max(1.0);
    (rate / MAX_ONSET_RATE).min(1.0)
}

/// Preference for mid-tempo dance music.
pub fn tempo_factor(tempo_bpm: f64) -> f64 {
    if tempo_bpm < 85.0 || tempo_bpm > 150.0 {
        0.7
    } else if (95.0..=135.0).contains(&tempo_bpm) {
        1.0
    } else {
        0.85
    }
}

/// Weighted blend of regularity, onset rate, energy and tempo.
pub fn danceability(regularity: f64, onset_factor: f64, energy: f64, tempo_bpm: f64) -> f64 {
    let value = REGULARITY_WEIGHT * regularity
        + ONSET_WEIGHT * onset_factor
        + ENERGY_WEIGHT * energy
        + TEMPO_WEIGHT * tempo_factor(tempo_bpm);
    round_to(DANCEABILITY_RANGE.clamp(value), 3)
}

/// 90th percentile frame RMS in dB, in [-30, 0] to 1 decimal.
pub fn loudness_db(rms: &[f32]) -> f64 {
    if mean_rms(rms) == 0.0 {
        return LOUDNESS_RANGE.min;
    }
    let level = percentile(rms, LOUDNESS_PERCENTILE) as f64;
    let db = 20.0 * (level + EPSILON).log10();
    round_to(LOUDNESS_RANGE.clamp(db), 1)
}

/// Track length in minutes, in [1.5, 8] to 2 decimals.
pub fn duration_min(full_duration_secs: f64) -> f64 {
    DURATION_RANGE.clamp(round_to(full_duration_secs / 60.0, 2))
}

fn mean_rms(rms: &[f32]) -> f64 {
    if rms.is_empty() {
        return 0.0;
    }
    rms.iter().map(|&v| v as f64).sum::<f64>() / rms.len() as f64
}
