//! Autocorrelation tempogram of the onset envelope.
//!
//! Each frame gets the Hann-windowed local autocorrelation of the envelope
//! around it, normalized to a peak of 1. Averaging the columns over time gives
//! one periodicity strength per lag.

use super::MIN_ENVELOPE_FRAMES;
use crate::audio::features::HOP_LENGTH;
use crate::audio::spectral::{hann_window, Autocorrelator};
use crate::error::TempoError;

/// Frames in each local autocorrelation window (about 8.9 s at 22050 Hz).
pub const WIN_LENGTH: usize = 384;

/// Tempo in BPM corresponding to a lag of `lag` frames. Lag 0 is infinite.
pub fn lag_to_bpm(lag: usize, sample_rate: u32) -> f64 {
    if lag == 0 {
        return f64::INFINITY;
    }
    60.0 * sample_rate as f64 / (HOP_LENGTH as f64 * lag as f64)
}

/// Time-averaged tempogram, one value per lag in `0..WIN_LENGTH`.
pub fn global_tempogram(envelope: &[f32]) -> Result<Vec<f32>, TempoError> {
    if envelope.len() < MIN_ENVELOPE_FRAMES {
        return Err(TempoError::TooShort {
            frames: envelope.len(),
        });
    }
    if envelope.iter().all(|&v| v <= 0.0) {
        return Err(TempoError::Silent);
    }

    let padded = ramp_pad(envelope, WIN_LENGTH / 2);
    let window = hann_window(WIN_LENGTH);
    let mut autocorr = Autocorrelator::new(WIN_LENGTH);

    let mut sum = vec![0.0f64; WIN_LENGTH];
    let mut frame = vec![0.0f32; WIN_LENGTH];

    for t in 0..envelope.len() {
        for (k, slot) in frame.iter_mut().enumerate() {
            *slot = padded[t + k] * window[k];
        }
        let column = autocorr.compute(&frame, WIN_LENGTH);
        let peak = column.iter().map(|v| v.abs()).fold(0.0f32, f32::max);
        if peak > 1e-10 {
            for (acc, v) in sum.iter_mut().zip(column.iter()) {
                *acc += (*v / peak) as f64;
            }
        }
    }

    let frames = envelope.len() as f64;
    let mean: Vec<f32> = sum.iter().map(|&s| (s / frames) as f32).collect();

    if mean.iter().any(|v| !v.is_finite()) {
        return Err(TempoError::NonFinite);
    }
    Ok(mean)
}

/// Pad with linear ramps that fall to zero at both outer edges.
fn ramp_pad(envelope: &[f32], pad: usize) -> Vec<f32> {
    let first = envelope[0];
    let last = envelope[envelope.len() - 1];

    let mut padded = Vec::with_capacity(envelope.len() + 2 * pad + 1);
    padded.extend((0..pad).map(|k| first * k as f32 / pad as f32));
    padded.extend_from_slice(envelope);
    padded.extend((1..=pad).map(|k| last * (pad - k) as f32 / pad as f32));
    padded
}
