//! Robust tempo estimation.
//!
//! Three structurally different estimators run on the same onset envelope:
//! a dynamic-programming beat tracker, a tempogram peak weighted by a 120 BPM
//! prior, and an unweighted tempogram peak limited to 60-220 BPM. Their
//! results, with octave variants, are scored in [`candidates`] and the best
//! one becomes the track tempo.

pub mod beats;
pub mod candidates;
pub mod tempogram;

use crate::audio::features::HOP_LENGTH;
use crate::error::TempoError;
use candidates::TempoCandidate;
use tempogram::lag_to_bpm;

/// Envelopes shorter than this (about 1.5 s) are not analyzed.
pub const MIN_ENVELOPE_FRAMES: usize = 64;
/// Used when even the beat tracker cannot produce a tempo.
pub const DEFAULT_TEMPO: f64 = 120.0;
/// Centre of the log-normal tempo prior.
pub const PRIOR_BPM: f64 = 120.0;
/// Width of the prior in octaves.
const PRIOR_STD_OCTAVES: f64 = 1.0;
/// The prior-biased estimator ignores lags faster than this.
const PRIOR_MAX_BPM: f64 = 320.0;
/// Search window of the unweighted autocorrelation estimator.
const AUTOCORR_MIN_BPM: f64 = 60.0;
const AUTOCORR_MAX_BPM: f64 = 220.0;

/// Outcome of each raw method before fallback.
#[derive(Clone, Debug, PartialEq)]
pub struct RawEstimates {
    pub beat_track: Result<f64, TempoError>,
    pub prior: Result<f64, TempoError>,
    pub autocorrelation: Result<f64, TempoError>,
}

impl RawEstimates {
    /// Run all three methods on an onset envelope.
    pub fn compute(envelope: &[f32], sample_rate: u32) -> Self {
        let tempogram = tempogram::global_tempogram(envelope);

        let prior = tempogram
            .as_deref()
            .map_err(Clone::clone)
            .and_then(|tg| prior_estimate(tg, sample_rate));
        let autocorrelation = tempogram
            .as_deref()
            .map_err(Clone::clone)
            .and_then(|tg| autocorrelation_estimate(tg, sample_rate));

        let seed = prior.as_ref().copied().unwrap_or(PRIOR_BPM);
        let beat_track = beat_track_estimate(envelope, sample_rate, seed);

        Self {
            beat_track,
            prior,
            autocorrelation,
        }
    }

    /// Replace failed estimates: the beat tracker falls back to 120 BPM, the
    /// other two fall back to the beat tracker.
    pub fn resolve(&self) -> [f64; 3] {
        let beat = match &self.beat_track {
            Ok(bpm) => *bpm,
            Err(e) => {
                log::warn!("Beat tracker failed ({}), assuming {} BPM", e, DEFAULT_TEMPO);
                DEFAULT_TEMPO
            }
        };
        let fallback = |name: &str, result: &Result<f64, TempoError>| match result {
            Ok(bpm) => *bpm,
            Err(e) => {
                log::warn!("{} estimate failed ({}), using beat tracker", name, e);
                beat
            }
        };

        [
            beat,
            fallback("Prior-weighted", &self.prior),
            fallback("Autocorrelation", &self.autocorrelation),
        ]
    }
}

/// Resolved tempo plus the evidence behind it.
#[derive(Clone, Debug)]
pub struct TempoEstimate {
    pub bpm: f64,
    pub raw: RawEstimates,
    pub candidates: Vec<TempoCandidate>,
}

/// Resolve one canonical tempo from an onset envelope.
pub fn estimate_tempo(envelope: &[f32], sample_rate: u32) -> TempoEstimate {
    let raw = RawEstimates::compute(envelope, sample_rate);
    let resolved = raw.resolve();
    let scored = candidates::score_candidates(&resolved);
    let bpm = candidates::select(&scored).unwrap_or(DEFAULT_TEMPO);

    log::debug!(
        "Raw tempi: beat={:.1} prior={:.1} autocorr={:.1} -> {:.1} BPM",
        resolved[0],
        resolved[1],
        resolved[2],
        bpm
    );
    for c in &scored {
        log::trace!("  candidate {:.1} BPM score {}", c.bpm, c.score);
    }

    TempoEstimate {
        bpm,
        raw,
        candidates: scored,
    }
}

/// Tempo from the median beat interval of the DP beat tracker.
pub fn beat_track_estimate(envelope: &[f32], sample_rate: u32, seed_bpm: f64) -> Result<f64, TempoError> {
    let frame_rate = frame_rate(sample_rate);
    let beats = beats::track_beats(envelope, frame_rate, seed_bpm)?;
    beats::tempo_from_beats(&beats, frame_rate)
}

/// Tempogram peak after weighting by a log-normal prior around 120 BPM.
pub fn prior_estimate(tempogram: &[f32], sample_rate: u32) -> Result<f64, TempoError> {
    let mut best: Option<(f64, f64)> = None;

    for (lag, &strength) in tempogram.iter().enumerate().skip(1) {
        let bpm = lag_to_bpm(lag, sample_rate);
        if bpm >= PRIOR_MAX_BPM {
            continue;
        }
        let octaves = (bpm.log2() - PRIOR_BPM.log2()) / PRIOR_STD_OCTAVES;
        let weighted = (1e6 * strength.max(0.0) as f64).ln_1p() - 0.5 * octaves * octaves;
        if best.map_or(true, |(_, w)| weighted > w) {
            best = Some((bpm, weighted));
        }
    }

    best.map(|(bpm, _)| bpm)
        .filter(|bpm| bpm.is_finite())
        .ok_or(TempoError::NoPeak {
            min_bpm: 0.0,
            max_bpm: PRIOR_MAX_BPM,
        })
}

/// Strongest tempogram lag between 60 and 220 BPM.
pub fn autocorrelation_estimate(tempogram: &[f32], sample_rate: u32) -> Result<f64, TempoError> {
    let mut best: Option<(f64, f32)> = None;

    for (lag, &strength) in tempogram.iter().enumerate().skip(1) {
        let bpm = lag_to_bpm(lag, sample_rate);
        if !(AUTOCORR_MIN_BPM..=AUTOCORR_MAX_BPM).contains(&bpm) {
            continue;
        }
        if best.map_or(true, |(_, s)| strength > s) {
            best = Some((bpm, strength));
        }
    }

    best.map(|(bpm, _)| bpm).ok_or(TempoError::NoPeak {
        min_bpm: AUTOCORR_MIN_BPM,
        max_bpm: AUTOCORR_MAX_BPM,
    })
}

fn frame_rate(sample_rate: u32) -> f64 {
    sample_rate as f64 / HOP_LENGTH as f64
}
