mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

use cli::{pretty_output, Cli, Command};
use metrica::audio::decode::{audio_info, SUPPORTED_EXTENSIONS};
use metrica::audio::features::{
    FeatureRange, FeatureVector, ANALYSIS_SAMPLE_RATE, FEATURE_RANGES, MAX_ANALYSIS_SECS,
};
use metrica::config::{self, AnalysisConfig, Config};
use metrica::model::PopularityModel;
use metrica::{Engine, Report};

#[derive(Serialize)]
struct PredictOutput {
    features: FeatureVector,
    popularity: f64,
}

#[derive(Serialize)]
struct ModelInfoOutput<'a> {
    features: Vec<&'static str>,
    ranges: &'a [FeatureRange],
    supported_formats: &'a [&'a str],
    analysis_sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    evaluation: Option<&'a serde_json::Value>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let cfg = match config::discover_config(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            Err(err) => {
                log::warn!("{:#}", err);
                Config::default()
            }
        },
        None => Config::default(),
    };

    let model_path = cli.model.clone().or_else(|| cfg.model.path.clone());

    match cli.command {
        Command::Analyze { files, max_duration, output, pretty, compact } => {
            // Config values apply only when the CLI is at its default
            let max_duration_secs = if max_duration == MAX_ANALYSIS_SECS {
                cfg.analysis.max_duration_secs
            } else {
                max_duration
            };
            if !max_duration_secs.is_finite() || max_duration_secs <= 0.0 {
                anyhow::bail!("max duration must be positive, got {}", max_duration_secs);
            }
            if max_duration_secs > MAX_ANALYSIS_SECS {
                log::warn!(
                    "max duration {}s exceeds the {}s analysis window, capping",
                    max_duration_secs,
                    MAX_ANALYSIS_SECS
                );
            }
            let pretty = pretty_output(pretty, compact, cfg.output.pretty);

            let model = model_path.as_deref().map(load_model).transpose()?;
            let engine = Engine::new(AnalysisConfig { max_duration_secs }, model);
            let reports = analyze_files(&engine, &files);

            let failed = reports.iter().filter(|r| !r.is_ok()).count();
            log::info!("Analyzed {} file(s), {} failed", reports.len(), failed);
            write_json(&reports, pretty, output.as_deref())?;
        }
        Command::Info { file } => {
            write_json(&audio_info(&file), cfg.output.pretty, None)?;
        }
        Command::Predict { duration_min, tempo_bpm, energy, danceability, loudness_db } => {
            let path = model_path.context("predict needs a model: pass --model or set [model] path")?;
            let model = load_model(&path)?;
            let features = manual_features(FeatureVector {
                duration_min,
                tempo_bpm,
                energy,
                danceability,
                loudness_db,
            })?;
            let popularity = model.predict(&features);
            write_json(&PredictOutput { features, popularity }, cfg.output.pretty, None)?;
        }
        Command::ModelInfo => {
            let model = model_path.as_deref().map(load_model).transpose()?;
            let info = ModelInfoOutput {
                features: FEATURE_RANGES.iter().map(|r| r.name).collect(),
                ranges: &FEATURE_RANGES,
                supported_formats: SUPPORTED_EXTENSIONS,
                analysis_sample_rate: ANALYSIS_SAMPLE_RATE,
                evaluation: model.as_ref().and_then(|m| m.evaluation.as_ref()),
            };
            write_json(&info, cfg.output.pretty, None)?;
        }
    }

    Ok(())
}

/// Hand-entered features, clamped into range. NaN and infinities are refused.
fn manual_features(raw: FeatureVector) -> Result<FeatureVector> {
    for (value, range) in raw.to_array().iter().zip(FEATURE_RANGES.iter()) {
        anyhow::ensure!(value.is_finite(), "{} must be a finite number, got {}", range.name, value);
    }
    Ok(raw.clamped())
}

fn load_model(path: &Path) -> Result<PopularityModel> {
    PopularityModel::load(path).with_context(|| format!("Failed to load model: {}", path.display()))
}

fn analyze_files(engine: &Engine, files: &[PathBuf]) -> Vec<Report> {
    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files ({eta} remaining)")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    let reports: Vec<Report> = files
        .par_iter()
        .map(|path| {
            let report = engine.analyze(path);
            pb.inc(1);
            report
        })
        .collect();

    pb.finish_with_message("Analysis complete");
    reports
}

fn write_json<T: Serialize + ?Sized>(value: &T, pretty: bool, output: Option<&Path>) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    match output {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Done! Output: {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
