//! Onset strength envelope and onset event picking.
//!
//! The envelope is the half-wave rectified frame-to-frame increase of the
//! log-power spectrum, averaged over frequency bins. Events are peaks of the
//! normalized envelope that stand above their local mean.

use super::features::HOP_LENGTH;
use super::spectral::power_spectrogram_db;

/// Dynamic range kept in the log spectrogram.
const TOP_DB: f32 = 80.0;

/// Peak picking windows in seconds, converted to frames at the analysis rate.
const PRE_MAX_SECS: f32 = 0.03;
const POST_MAX_SECS: f32 = 0.0;
const PRE_AVG_SECS: f32 = 0.10;
const POST_AVG_SECS: f32 = 0.10;
const WAIT_SECS: f32 = 0.03;
/// Minimum height above the local mean for a peak to count.
const DELTA: f32 = 0.07;

/// Onset strength per analysis frame. Always non-negative.
pub fn onset_envelope(samples: &[f32]) -> Vec<f32> {
    let spec = power_spectrogram_db(samples, TOP_DB);
    let mut envelope = vec![0.0f32; spec.len()];

    for t in 1..spec.len() {
        let (prev, cur) = (&spec[t - 1], &spec[t]);
        let flux: f32 = cur
            .iter()
            .zip(prev.iter())
            .map(|(c, p)| (c - p).max(0.0))
            .sum();
        envelope[t] = flux / cur.len() as f32;
    }

    envelope
}

/// Window sizes (in frames) for [`pick_peaks`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakPicking {
    pub pre_max: usize,
    pub post_max: usize,
    pub pre_avg: usize,
    pub post_avg: usize,
    pub wait: usize,
    pub delta: f32,
}

impl PeakPicking {
    pub fn for_rate(sample_rate: u32) -> Self {
        let frames = |secs: f32| (secs * sample_rate as f32 / HOP_LENGTH as f32).floor() as usize;
        Self {
            pre_max: frames(PRE_MAX_SECS),
            post_max: frames(POST_MAX_SECS) + 1,
            pre_avg: frames(PRE_AVG_SECS),
            post_avg: frames(POST_AVG_SECS) + 1,
            wait: frames(WAIT_SECS),
            delta: DELTA,
        }
    }
}

/// Frame indices of onset events in `envelope`.
pub fn detect_onsets(envelope: &[f32], sample_rate: u32) -> Vec<usize> {
    let min = envelope.iter().copied().fold(f32::INFINITY, f32::min);
    let max = envelope.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return Vec::new();
    }

    let normalized: Vec<f32> = envelope.iter().map(|&v| (v - min) / range).collect();
    pick_peaks(&normalized, &PeakPicking::for_rate(sample_rate))
}

/// A frame is a peak when it is the maximum of
/// `[n - pre_max, n + post_max)`, is at least `delta` above the mean of
/// `[n - pre_avg, n + post_avg)`, and comes more than `wait` frames after the
/// previous peak.
pub fn pick_peaks(x: &[f32], params: &PeakPicking) -> Vec<usize> {
    let n = x.len();
    let mut peaks = Vec::new();
    let mut last: Option<usize> = None;

    for i in 0..n {
        let max_lo = i.saturating_sub(params.pre_max);
        let max_hi = (i + params.post_max).min(n);
        let local_max = x[max_lo..max_hi].iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if x[i] < local_max {
            continue;
        }

        let avg_lo = i.saturating_sub(params.pre_avg);
        let avg_hi = (i + params.post_avg).min(n);
        let local_mean = x[avg_lo..avg_hi].iter().sum::<f32>() / (avg_hi - avg_lo) as f32;
        if x[i] < local_mean + params.delta {
            continue;
        }

        if let Some(prev) = last {
            if i <= prev + params.wait {
                continue;
            }
        }

        peaks.push(i);
        last = Some(i);
    }

    peaks
}
