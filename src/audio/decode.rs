use std::fs::File;
use std::path::Path;

use serde::Serialize;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;

use super::features::{Waveform, ANALYSIS_SAMPLE_RATE, MAX_ANALYSIS_SECS};
use crate::config::AnalysisConfig;
use crate::error::FeatureError;

/// Container extensions the bundled decoders handle.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a", "aac"];

pub fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Decode the analysis window of `path` and attach the full-track duration.
/// The window never exceeds [`MAX_ANALYSIS_SECS`].
pub fn load(path: &Path, config: &AnalysisConfig) -> Result<Waveform, FeatureError> {
    let full_duration = probe_duration(path)?;
    let window_secs = config.max_duration_secs.min(MAX_ANALYSIS_SECS);
    let samples = load_window(path, window_secs, ANALYSIS_SAMPLE_RATE)?;

    log::info!(
        "Loaded {}: {:.1}s track, analyzing {:.1}s at {}Hz",
        path.display(),
        full_duration,
        samples.len() as f64 / ANALYSIS_SAMPLE_RATE as f64,
        ANALYSIS_SAMPLE_RATE
    );

    Waveform::new(samples, ANALYSIS_SAMPLE_RATE, full_duration)
}

/// Full-track duration in seconds.
///
/// Reads the frame count from the container header when present. Otherwise
/// walks the packet stream summing packet durations, which never touches the
/// codec.
pub fn probe_duration(path: &Path) -> Result<f64, FeatureError> {
    let mut format = open_format(path)?;
    let (track_id, params) = select_track(format.as_ref())?;

    if let (Some(n_frames), Some(rate)) = (params.n_frames, params.sample_rate) {
        return Ok(n_frames as f64 / rate as f64);
    }

    let time_base = params
        .time_base
        .or_else(|| params.sample_rate.map(|rate| TimeBase::new(1, rate)))
        .ok_or_else(|| FeatureError::Decode("track carries no timing information".into()))?;

    if let Some(n_frames) = params.n_frames {
        return Ok(seconds(time_base, n_frames));
    }

    log::debug!("No frame count in {}, scanning packets", path.display());
    let mut total: u64 = 0;
    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() == track_id {
                    total += packet.dur();
                }
            }
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(seconds(time_base, total))
}

/// Decode at most `max_secs` of audio, downmix to mono and resample to
/// `target_rate`. Decoding stops as soon as the window is filled.
pub fn load_window(path: &Path, max_secs: f64, target_rate: u32) -> Result<Vec<f32>, FeatureError> {
    let mut format = open_format(path)?;
    let (track_id, params) = select_track(format.as_ref())?;

    let source_rate = params
        .sample_rate
        .ok_or_else(|| FeatureError::Decode("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

    let max_frames = (max_secs.max(0.0) * source_rate as f64).ceil() as usize;
    let mut mono: Vec<f32> = Vec::new();

    while mono.len() < max_frames {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("Skipping corrupt packet: {}", msg);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        downmix_into(sample_buf.samples(), channels, &mut mono);
    }

    mono.truncate(max_frames);

    if mono.is_empty() {
        return Err(FeatureError::EmptySignal);
    }

    if source_rate == target_rate {
        Ok(mono)
    } else {
        resample(&mono, source_rate, target_rate)
    }
}

/// Basic facts about a file, for display. Never fails: unreadable files
/// report zeros.
#[derive(Clone, Debug, Serialize)]
pub struct AudioInfo {
    pub file_name: String,
    pub file_size_mb: f64,
    pub duration_sec: f64,
    pub sample_rate: u32,
}

pub fn audio_info(path: &Path) -> AudioInfo {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let probed = std::fs::metadata(path)
        .map_err(FeatureError::from)
        .and_then(|meta| probe_duration(path).map(|duration| (meta.len(), duration)));

    match probed {
        Ok((size, duration)) => AudioInfo {
            file_name,
            file_size_mb: super::features::round_to(size as f64 / (1024.0 * 1024.0), 2),
            duration_sec: super::features::round_to(duration, 1),
            sample_rate: ANALYSIS_SAMPLE_RATE,
        },
        Err(err) => {
            log::warn!("Could not probe {}: {}", path.display(), err);
            AudioInfo {
                file_name,
                file_size_mb: 0.0,
                duration_sec: 0.0,
                sample_rate: ANALYSIS_SAMPLE_RATE,
            }
        }
    }
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>, FeatureError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    Ok(probed.format)
}

fn select_track(format: &dyn FormatReader) -> Result<(u32, CodecParameters), FeatureError> {
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| FeatureError::Decode("no audio tracks found".into()))?;
    Ok((track.id, track.codec_params.clone()))
}

fn seconds(time_base: TimeBase, ts: u64) -> f64 {
    let time = time_base.calc_time(ts);
    time.seconds as f64 + time.frac
}

fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
    } else {
        for frame in interleaved.chunks(channels) {
            out.push(frame.iter().sum::<f32>() / channels as f32);
        }
    }
}

fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, FeatureError> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| FeatureError::Decode(format!("failed to create resampler: {}", e)))?;

    let input = vec![samples.to_vec()];
    let output = resampler
        .process(&input, None)
        .map_err(|e| FeatureError::Decode(format!("resampling failed: {}", e)))?;

    log::debug!("Resampled {}Hz -> {}Hz ({} samples)", from_rate, to_rate, samples.len());
    Ok(output.into_iter().next().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_wav(dir: &Path, name: &str, rate: u32, channels: u16, frames: usize, value: impl Fn(usize, u16) -> f32) -> PathBuf {
        let path = dir.join(name);
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..frames {
            for ch in 0..channels {
                let v = value(i, ch).clamp(-1.0, 1.0);
                writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    fn sine(rate: u32) -> impl Fn(usize, u16) -> f32 {
        move |i, _| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin()
    }

    #[test]
    fn probes_duration_from_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "two_seconds.wav", 44100, 1, 88200, sine(44100));
        let duration = probe_duration(&path).unwrap();
        assert!((duration - 2.0).abs() < 1e-3, "duration {duration}");
    }

    #[test]
    fn resamples_to_analysis_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "resample.wav", 44100, 1, 88200, sine(44100));
        let samples = load_window(&path, 60.0, ANALYSIS_SAMPLE_RATE).unwrap();
        let expected = 44100.0;
        let err = (samples.len() as f64 - expected).abs() / expected;
        assert!(err < 0.01, "got {} samples", samples.len());
    }

    #[test]
    fn window_is_capped_but_duration_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let rate = 8000;
        let path = write_wav(dir.path(), "long.wav", rate, 1, rate as usize * 70, sine(rate));
        let config = AnalysisConfig { max_duration_secs: 60.0 };

        let wave = load(&path, &config).unwrap();
        assert!((wave.full_duration() - 70.0).abs() < 1e-3);
        assert!(wave.window_duration() <= 60.5, "window {}", wave.window_duration());
        assert!(wave.window_duration() >= 59.0, "window {}", wave.window_duration());
        assert_eq!(wave.sample_rate(), ANALYSIS_SAMPLE_RATE);
    }

    #[test]
    fn configured_window_cannot_exceed_cap() {
        let dir = tempfile::tempdir().unwrap();
        let rate = ANALYSIS_SAMPLE_RATE;
        let path = write_wav(dir.path(), "ninety.wav", rate, 1, rate as usize * 90, sine(rate));
        let config = AnalysisConfig { max_duration_secs: 90.0 };

        let wave = load(&path, &config).unwrap();
        assert!((wave.full_duration() - 90.0).abs() < 1e-3);
        assert!(wave.window_duration() <= 60.5, "window {}", wave.window_duration());
    }

    #[test]
    fn stereo_is_averaged_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "stereo.wav", ANALYSIS_SAMPLE_RATE, 2, 1000, |_, ch| {
            if ch == 0 { 0.5 } else { 0.25 }
        });
        let samples = load_window(&path, 60.0, ANALYSIS_SAMPLE_RATE).unwrap();
        assert_eq!(samples.len(), 1000);
        for s in samples {
            assert!((s - 0.375).abs() < 1e-3, "sample {s}");
        }
    }

    #[test]
    fn empty_file_is_empty_signal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "empty.wav", ANALYSIS_SAMPLE_RATE, 1, 0, |_, _| 0.0);
        let err = load_window(&path, 60.0, ANALYSIS_SAMPLE_RATE).unwrap_err();
        assert!(matches!(err, FeatureError::EmptySignal), "got {err:?}");
    }

    #[test]
    fn garbage_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not a riff header, just bytes").unwrap();
        let err = probe_duration(&path).unwrap_err();
        assert!(matches!(err, FeatureError::Decode(_)), "got {err:?}");
        assert!(err.is_input_error());
    }

    #[test]
    fn missing_file_is_input_error() {
        let err = probe_duration(Path::new("/nonexistent/track.mp3")).unwrap_err();
        assert!(matches!(err, FeatureError::Io(_)));
        assert!(err.is_input_error());
    }

    #[test]
    fn info_falls_back_to_zeros() {
        let info = audio_info(Path::new("/nonexistent/track.mp3"));
        assert_eq!(info.file_name, "track.mp3");
        assert_eq!(info.duration_sec, 0.0);
        assert_eq!(info.file_size_mb, 0.0);
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(is_supported_extension(Path::new("song.MP3")));
        assert!(is_supported_extension(Path::new("song.flac")));
        assert!(!is_supported_extension(Path::new("song.wma")));
        assert!(!is_supported_extension(Path::new("song")));
    }
}
