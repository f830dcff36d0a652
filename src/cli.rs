use clap::{Parser, Subcommand};
use std::path::PathBuf;

use metrica::audio::features::MAX_ANALYSIS_SECS;

#[derive(Parser, Debug)]
#[command(name = "metrica", about = "Audio feature extraction for popularity prediction")]
pub struct Cli {
    /// Config file (default: ./metrica.toml, then ~/.config/metrica/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Popularity model JSON
    #[arg(long, global = true)]
    pub model: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract features from one or more audio files
    Analyze {
        /// Input audio files (MP3, WAV, OGG, FLAC, M4A, AAC)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Seconds of audio decoded per file (at most 60)
        #[arg(long, default_value_t = MAX_ANALYSIS_SECS)]
        max_duration: f64,

        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON (default comes from [output] pretty)
        #[arg(long, conflicts_with = "compact")]
        pretty: bool,

        /// Single-line JSON
        #[arg(long)]
        compact: bool,
    },

    /// Show basic file information without analyzing
    Info {
        file: PathBuf,
    },

    /// Score a hand-entered feature vector (values are clamped to their ranges)
    Predict {
        #[arg(long, default_value_t = 3.5)]
        duration_min: f64,

        #[arg(long, default_value_t = 120.0)]
        tempo_bpm: f64,

        #[arg(long, default_value_t = 0.6)]
        energy: f64,

        #[arg(long, default_value_t = 0.6)]
        danceability: f64,

        #[arg(long, default_value_t = -8.0, allow_hyphen_values = true)]
        loudness_db: f64,
    },

    /// List features, their ranges and the supported formats
    ModelInfo,
}

/// Explicit flags win over the configured output style.
pub fn pretty_output(pretty: bool, compact: bool, configured: bool) -> bool {
    if compact {
        false
    } else {
        pretty || configured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_analyze_with_globals() {
        let cli = Cli::parse_from([
            "metrica", "analyze", "a.mp3", "b.wav", "--model", "m.json", "--max-duration", "30",
        ]);
        assert_eq!(cli.model, Some(PathBuf::from("m.json")));
        match cli.command {
            Command::Analyze { files, max_duration, pretty, .. } => {
                assert_eq!(files.len(), 2);
                assert_eq!(max_duration, 30.0);
                assert!(!pretty);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn compact_flag_overrides_pretty_config() {
        let cli = Cli::parse_from(["metrica", "analyze", "a.mp3", "--compact"]);
        match cli.command {
            Command::Analyze { pretty, compact, .. } => {
                assert!(compact);
                assert!(!pretty_output(pretty, compact, true));
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(pretty_output(false, false, true));
        assert!(!pretty_output(false, false, false));
        assert!(pretty_output(true, false, false));
    }

    #[test]
    fn pretty_and_compact_conflict() {
        assert!(Cli::try_parse_from(["metrica", "analyze", "a.mp3", "--pretty", "--compact"]).is_err());
    }

    #[test]
    fn analyze_requires_files() {
        assert!(Cli::try_parse_from(["metrica", "analyze"]).is_err());
    }

    #[test]
    fn predict_accepts_negative_loudness() {
        let cli = Cli::parse_from(["metrica", "predict", "--loudness-db", "-12.5", "--energy", "0.9"]);
        match cli.command {
            Command::Predict { loudness_db, energy, tempo_bpm, .. } => {
                assert_eq!(loudness_db, -12.5);
                assert_eq!(energy, 0.9);
                assert_eq!(tempo_bpm, 120.0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
