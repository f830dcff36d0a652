use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::features::{FRAME_LENGTH, HOP_LENGTH};

/// Number of centred analysis frames for `len` samples.
pub fn frame_count(len: usize) -> usize {
    1 + len / HOP_LENGTH
}

/// Copy frame `index` into `out`, centred on `index * HOP_LENGTH` with zero
/// padding past either end of the signal.
fn centered_frame(samples: &[f32], index: usize, out: &mut [f32]) {
    let start = (index * HOP_LENGTH) as isize - (out.len() / 2) as isize;
    for (k, slot) in out.iter_mut().enumerate() {
        let pos = start + k as isize;
        *slot = if pos >= 0 && (pos as usize) < samples.len() {
            samples[pos as usize]
        } else {
            0.0
        };
    }
}

/// Root-mean-square amplitude per frame.
pub fn frame_rms(samples: &[f32]) -> Vec<f32> {
    let mut frame = vec![0.0f32; FRAME_LENGTH];
    (0..frame_count(samples.len()))
        .map(|i| {
            centered_frame(samples, i, &mut frame);
            let power = frame.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / FRAME_LENGTH as f64;
            power.sqrt() as f32
        })
        .collect()
}

/// Power spectrogram in decibels, one row per frame, clamped to `top_db`
/// below the loudest bin.
pub fn power_spectrogram_db(samples: &[f32], top_db: f32) -> Vec<Vec<f32>> {
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FRAME_LENGTH);
    let hann = hann_window(FRAME_LENGTH);
    let bins = FRAME_LENGTH / 2 + 1;

    let mut frame = vec![0.0f32; FRAME_LENGTH];
    let mut buffer = vec![Complex::new(0.0f32, 0.0); FRAME_LENGTH];
    let mut rows = Vec::with_capacity(frame_count(samples.len()));
    let mut peak_db = f32::NEG_INFINITY;

    for i in 0..frame_count(samples.len()) {
        centered_frame(samples, i, &mut frame);
        for (slot, (&s, &w)) in buffer.iter_mut().zip(frame.iter().zip(hann.iter())) {
            *slot = Complex::new(s * w, 0.0);
        }
        fft.process(&mut buffer);

        let row: Vec<f32> = buffer[..bins]
            .iter()
            .map(|c| 10.0 * c.norm_sqr().max(1e-10).log10())
            .collect();
        peak_db = row.iter().copied().fold(peak_db, f32::max);
        rows.push(row);
    }

    let floor = peak_db - top_db;
    for row in rows.iter_mut() {
        for v in row.iter_mut() {
            *v = v.max(floor);
        }
    }

    rows
}

/// FFT autocorrelation for signals up to a fixed length. Reuses its plans and
/// scratch buffer across calls.
pub struct Autocorrelator {
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    max_len: usize,
}

impl Autocorrelator {
    pub fn new(max_len: usize) -> Self {
        let size = (2 * max_len.max(1)).next_power_of_two();
        let mut planner = FftPlanner::<f32>::new();
        Self {
            fft: planner.plan_fft_forward(size),
            ifft: planner.plan_fft_inverse(size),
            buffer: vec![Complex::new(0.0, 0.0); size],
            max_len,
        }
    }

    /// Linear (non-circular) autocorrelation of `signal`, lags `0..max_lag`.
    pub fn compute(&mut self, signal: &[f32], max_lag: usize) -> Vec<f32> {
        let len = signal.len().min(self.max_len);
        let size = self.buffer.len();

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            *slot = if i < len {
                Complex::new(signal[i], 0.0)
            } else {
                Complex::new(0.0, 0.0)
            };
        }

        self.fft.process(&mut self.buffer);
        for c in self.buffer.iter_mut() {
            *c = Complex::new(c.norm_sqr(), 0.0);
        }
        self.ifft.process(&mut self.buffer);

        let norm = 1.0 / size as f32;
        self.buffer[..max_lag.min(len)]
            .iter()
            .map(|c| c.re * norm)
            .collect()
    }
}

pub fn autocorrelate(signal: &[f32], max_lag: usize) -> Vec<f32> {
    Autocorrelator::new(signal.len()).compute(signal, max_lag)
}

pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

/// Linear-interpolated percentile (`q` in 0..=100).
pub fn percentile(values: &[f32], q: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = (rank - lo as f64) as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_matches_centred_framing() {
        assert_eq!(frame_count(0), 1);
        assert_eq!(frame_count(511), 1);
        assert_eq!(frame_count(512), 2);
        assert_eq!(frame_count(22050), 44);
    }

    #[test]
    fn rms_of_constant_signal() {
        let samples = vec![0.5f32; 22050];
        let rms = frame_rms(&samples);
        // Interior frames see only the constant; edge frames are half padding.
        let mid = rms[rms.len() / 2];
        assert!((mid - 0.5).abs() < 1e-4, "mid rms {mid}");
        assert!(rms[0] < mid);
    }

    #[test]
    fn autocorrelation_matches_direct_sum() {
        let signal: Vec<f32> = (0..64).map(|i| ((i * 7) % 5) as f32 - 2.0).collect();
        let fast = autocorrelate(&signal, 10);
        for lag in 0..10 {
            let direct: f32 = (0..signal.len() - lag).map(|i| signal[i] * signal[i + lag]).sum();
            assert!((fast[lag] - direct).abs() < 1e-2, "lag {lag}: {} vs {direct}", fast[lag]);
        }
    }

    #[test]
    fn autocorrelation_peaks_at_period() {
        let signal: Vec<f32> = (0..400).map(|i| if i % 20 == 0 { 1.0 } else { 0.0 }).collect();
        let ac = autocorrelate(&signal, 50);
        let best = (1..50).max_by(|&a, &b| ac[a].total_cmp(&ac[b])).unwrap();
        assert_eq!(best, 20);
    }

    #[test]
    fn percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 5.0);
        assert!((percentile(&values, 90.0) - 4.6).abs() < 1e-6);
    }

    #[test]
    fn spectrogram_respects_top_db() {
        let samples: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.3).sin()).collect();
        let rows = power_spectrogram_db(&samples, 80.0);
        let max = rows.iter().flatten().copied().fold(f32::NEG_INFINITY, f32::max);
        let min = rows.iter().flatten().copied().fold(f32::INFINITY, f32::min);
        assert!(max - min <= 80.0 + 1e-3);
        assert_eq!(rows[0].len(), FRAME_LENGTH / 2 + 1);
    }
}
