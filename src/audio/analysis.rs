use std::path::Path;

use super::decode;
use super::descriptors;
use super::features::{FeatureVector, Waveform};
use super::onset::{detect_onsets, onset_envelope};
use super::spectral::frame_rms;
use super::tempo::estimate_tempo;
use crate::config::AnalysisConfig;
use crate::error::FeatureError;

/// Decode `path` and compute its feature vector.
///
/// Only loading can fail. Once a waveform exists every descriptor falls back
/// or clips instead of erroring.
pub fn extract_features(path: &Path, config: &AnalysisConfig) -> Result<FeatureVector, FeatureError> {
    let waveform = decode::load(path, config)?;
    Ok(features_from_waveform(&waveform))
}

pub fn features_from_waveform(waveform: &Waveform) -> FeatureVector {
    let samples = waveform.samples();
    let sr = waveform.sample_rate();

    log::debug!("Onset envelope and frame RMS...");
    let envelope = onset_envelope(samples);
    let rms = frame_rms(samples);

    log::debug!("Tempo estimation ({} frames)...", envelope.len());
    let tempo = estimate_tempo(&envelope, sr);

    let energy = descriptors::energy(&rms);
    let regularity = descriptors::regularity(&envelope, sr);
    let onsets = detect_onsets(&envelope, sr);
    let onset_factor = descriptors::onset_factor(onsets.len(), waveform.full_duration());
    let danceability = descriptors::danceability(regularity, onset_factor, energy, tempo.bpm);

    let features = FeatureVector {
        duration_min: descriptors::duration_min(waveform.full_duration()),
        tempo_bpm: tempo.bpm,
        energy,
        danceability,
        loudness_db: descriptors::loudness_db(&rms),
    };

    log::info!(
        "Features: duration={:.2}min tempo={:.1}bpm energy={:.3} dance={:.3} loudness={:.1}dB \
         (regularity={:.3}, onsets={})",
        features.duration_min,
        features.tempo_bpm,
        features.energy,
        features.danceability,
        features.loudness_db,
        regularity,
        onsets.len()
    );

    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::ANALYSIS_SAMPLE_RATE;

    const SR: u32 = ANALYSIS_SAMPLE_RATE;

    fn wave(samples: Vec<f32>, full_duration: f64) -> Waveform {
        Waveform::new(samples, SR, full_duration).unwrap()
    }

    /// Kick-like pulses over a quiet noise bed.
    fn drum_loop(bpm: f64, secs: f64, level: f32) -> Vec<f32> {
        let sr = SR as f64;
        let len = (secs * sr) as usize;
        let period = 60.0 / bpm * sr;
        let mut seed: u32 = 0x1234_5678;
        (0..len)
            .map(|i| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let noise = (seed >> 8) as f32 / (1u32 << 24) as f32 - 0.5;
                let since_beat = (i as f64 % period) / sr;
                let kick = (2.0 * std::f64::consts::PI * 60.0 * since_beat).sin() * (-since_beat * 30.0).exp();
                level * (kick as f32 + 0.05 * noise)
            })
            .collect()
    }

    #[test]
    fn features_stay_in_range() {
        let cases = [
            wave(drum_loop(128.0, 10.0, 0.8), 200.0),
            wave(drum_loop(70.0, 6.0, 0.05), 30.0),
            wave(drum_loop(175.0, 8.0, 1.0), 900.0),
            wave(vec![1.0; SR as usize * 3], 3.0),
        ];
        for w in &cases {
            let f = features_from_waveform(w);
            assert!(f.in_range(), "out of range: {f:?}");
        }
    }

    #[test]
    fn repeated_runs_are_identical() {
        let w = wave(drum_loop(110.0, 8.0, 0.5), 180.0);
        assert_eq!(features_from_waveform(&w), features_from_waveform(&w));
    }

    #[test]
    fn zero_signal_hits_loudness_floor() {
        let f = features_from_waveform(&wave(vec![0.0; SR as usize * 5], 5.0));
        assert_eq!(f.loudness_db, -30.0);
        assert_eq!(f.energy, 0.0);
        assert!(f.in_range());
    }

    #[test]
    fn near_silence_is_quiet_and_short() {
        let samples: Vec<f32> = (0..SR as usize * 4)
            .map(|i| 1e-4 * (i as f32 * 0.05).sin())
            .collect();
        let f = features_from_waveform(&wave(samples, 4.0));
        assert!(f.energy <= 0.05, "energy {}", f.energy);
        assert!(f.loudness_db <= -25.0, "loudness {}", f.loudness_db);
        assert_eq!(f.duration_min, 1.5);
    }

    #[test]
    fn duration_comes_from_full_track() {
        let f = features_from_waveform(&wave(drum_loop(120.0, 5.0, 0.5), 300.0));
        assert_eq!(f.duration_min, 5.0);
    }

    #[test]
    fn louder_mix_has_more_energy() {
        let quiet = features_from_waveform(&wave(drum_loop(120.0, 6.0, 0.05), 200.0));
        let loud = features_from_waveform(&wave(drum_loop(120.0, 6.0, 0.9), 200.0));
        assert!(loud.energy > quiet.energy);
        assert!(loud.loudness_db > quiet.loudness_db);
    }
}
