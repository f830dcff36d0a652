//! Dynamic-programming beat tracker.
//!
//! Ellis, D. P. W. (2007). Beat Tracking by Dynamic Programming.
//! *Journal of New Music Research*, 36(1), 51-60.
//!
//! Given a seed period, every frame picks the best predecessor roughly one
//! period earlier, trading accumulated onset strength against a log-squared
//! penalty on deviation from the period. The best path ending near the end of
//! the envelope is the beat sequence.

use super::MIN_ENVELOPE_FRAMES;
use crate::error::TempoError;

/// Weight of the period-deviation penalty. Higher values give stricter tempo.
pub const TIGHTNESS: f64 = 100.0;

/// Beat positions (frame indices, ascending) tracked through `envelope`.
pub fn track_beats(envelope: &[f32], frame_rate: f64, seed_bpm: f64) -> Result<Vec<usize>, TempoError> {
    if !seed_bpm.is_finite() || seed_bpm <= 0.0 {
        return Err(TempoError::NonFinite);
    }
    let period = frame_rate * 60.0 / seed_bpm;
    let n = envelope.len();
    if n < MIN_ENVELOPE_FRAMES || (n as f64) < 2.0 * period {
        return Err(TempoError::TooShort { frames: n });
    }

    let local = local_score(envelope, period)?;

    let max_back = (2.0 * period).round() as usize;
    let min_back = ((period / 2.0).round() as usize).max(1);

    let mut cumulative = vec![0.0f64; n];
    let mut backlink: Vec<Option<usize>> = vec![None; n];

    for t in 0..n {
        let mut best: Option<(usize, f64)> = None;
        if t >= min_back {
            let lo = t.saturating_sub(max_back);
            for prev in lo..=(t - min_back) {
                let gap = (t - prev) as f64;
                let penalty = -TIGHTNESS * (gap / period).ln().powi(2);
                let candidate = cumulative[prev] + penalty;
                if best.map_or(true, |(_, s)| candidate > s) {
                    best = Some((prev, candidate));
                }
            }
        }

        match best {
            Some((prev, score)) => {
                cumulative[t] = local[t] + score;
                backlink[t] = Some(prev);
            }
            None => cumulative[t] = local[t],
        }
    }

    let mut beats = Vec::new();
    let mut cursor = Some(last_beat(&cumulative));
    while let Some(t) = cursor {
        beats.push(t);
        cursor = backlink[t];
    }
    beats.reverse();
    trim_weak_edges(&mut beats, &local);

    if beats.len() < 3 {
        return Err(TempoError::TooFewBeats { beats: beats.len() });
    }
    Ok(beats)
}

/// Tempo implied by the median inter-beat interval.
pub fn tempo_from_beats(beats: &[usize], frame_rate: f64) -> Result<f64, TempoError> {
    let mut intervals: Vec<usize> = beats.windows(2).map(|w| w[1] - w[0]).collect();
    if intervals.is_empty() {
        return Err(TempoError::TooFewBeats { beats: beats.len() });
    }
    intervals.sort_unstable();

    let mid = intervals.len() / 2;
    let median = if intervals.len() % 2 == 0 {
        (intervals[mid - 1] + intervals[mid]) as f64 / 2.0
    } else {
        intervals[mid] as f64
    };

    let bpm = 60.0 * frame_rate / median;
    if bpm.is_finite() && bpm > 0.0 {
        Ok(bpm)
    } else {
        Err(TempoError::NonFinite)
    }
}

/// Onset envelope scaled to unit deviation and smoothed with a Gaussian about
/// one period wide.
fn local_score(envelope: &[f32], period: f64) -> Result<Vec<f64>, TempoError> {
    let n = envelope.len() as f64;
    let mean = envelope.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = envelope.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
    let std = variance.sqrt();
    if !std.is_finite() || std <= 1e-12 {
        return Err(TempoError::Silent);
    }

    let half = period.round() as isize;
    let kernel: Vec<f64> = (-half..=half)
        .map(|k| (-0.5 * (k as f64 * 32.0 / period).powi(2)).exp())
        .collect();

    let len = envelope.len() as isize;
    let score = (0..len)
        .map(|t| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(j, w)| {
                    let idx = t + j as isize - half;
                    (idx >= 0 && idx < len).then(|| w * envelope[idx as usize] as f64 / std)
                })
                .sum()
        })
        .collect();
    Ok(score)
}

/// Drop leading and trailing beats whose local score is under half the RMS
/// local score of all beats. The path always reaches the envelope edges, even
/// where nothing is playing.
fn trim_weak_edges(beats: &mut Vec<usize>, local: &[f64]) {
    if beats.is_empty() {
        return;
    }
    let rms = (beats.iter().map(|&b| local[b].powi(2)).sum::<f64>() / beats.len() as f64).sqrt();
    let threshold = 0.5 * rms;

    while beats.last().is_some_and(|&b| local[b] < threshold) {
        beats.pop();
    }
    let lead = beats.iter().take_while(|&&b| local[b] < threshold).count();
    beats.drain(..lead);
}

/// Final frame that is a local maximum of the cumulative score and exceeds
/// half the median of all such maxima.
fn last_beat(cumulative: &[f64]) -> usize {
    let n = cumulative.len();
    let is_peak = |t: usize| {
        let left = t == 0 || cumulative[t] > cumulative[t - 1];
        let right = t + 1 == n || cumulative[t] >= cumulative[t + 1];
        left && right
    };

    let mut peaks: Vec<f64> = (0..n).filter(|&t| is_peak(t)).map(|t| cumulative[t]).collect();
    if peaks.is_empty() {
        return n - 1;
    }
    peaks.sort_by(|a, b| a.total_cmp(b));
    let threshold = 0.5 * peaks[peaks.len() / 2];

    (0..n)
        .rev()
        .find(|&t| is_peak(t) && cumulative[t] >= threshold)
        .unwrap_or(n - 1)
}
