//! Command-line arguments and run settings
//!
//! Command-line values override the TOML configuration, which overrides the
//! compiled defaults. Everything here is validated before any collection is
//! opened.

use crate::document::LabeledSource;
use crate::error::{Error, Result};
use crate::pipeline::{default_worker_count, EngineConfig};
use crate::types::{Label, MeasureType};
use clap::Parser;
use knnc_common::config::{load_or_default, ConfigSource, TomlConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for knnc-classify
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "knnc-classify")]
#[command(about = "k-nearest-neighbour image classifier with late fusion")]
#[command(version)]
pub struct Args {
    /// Reference collection with per-document labels (repeatable)
    #[arg(short = 'c', long = "classifier-index")]
    pub classifier_index: Vec<PathBuf>,

    /// Reference collection of positive examples (repeatable)
    #[arg(short = 'p', long = "pos-classifier-index")]
    pub positive_index: Vec<PathBuf>,

    /// Reference collection of negative examples (repeatable)
    #[arg(short = 'n', long = "neg-classifier-index")]
    pub negative_index: Vec<PathBuf>,

    /// Input collection with per-document labels (repeatable)
    #[arg(short = 'i', long = "input")]
    pub input: Vec<PathBuf>,

    /// Input collection of positive items (repeatable)
    #[arg(short = 'P', long = "input-positive")]
    pub input_positive: Vec<PathBuf>,

    /// Input collection of negative items (repeatable)
    #[arg(short = 'N', long = "input-negative")]
    pub input_negative: Vec<PathBuf>,

    /// Per-frame descriptors of a video (JSON lines)
    #[arg(short = 'v', long = "input-video")]
    pub input_video: Option<PathBuf>,

    /// Feature to classify with (repeatable)
    #[arg(short = 'f', long = "feature")]
    pub features: Vec<String>,

    /// classCount, weightedByRank, weightedByDistance or weightedByAverageDistance
    #[arg(short = 'm', long = "measure")]
    pub measure: Option<String>,

    /// Suppress progress output
    #[arg(short = 's', long = "silent")]
    pub silent: bool,

    /// Configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for exported reports
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Number of worker threads
    #[arg(long)]
    pub workers: Option<usize>,
}

/// What a run classifies
#[derive(Debug, Clone, PartialEq)]
pub enum RunInput {
    /// Static input collections
    Dataset(Vec<LabeledSource>),
    /// A video given as per-frame descriptors
    Video(PathBuf),
}

/// Fully resolved, validated settings of one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub references: Vec<LabeledSource>,
    pub input: RunInput,
    pub features: Vec<String>,
    pub engine: EngineConfig,
    pub silent: bool,
    pub output_dir: PathBuf,
}

fn labeled(paths: &[PathBuf], label: Label) -> impl Iterator<Item = LabeledSource> + '_ {
    paths.iter().map(move |path| LabeledSource::new(path, label))
}

/// Read the configuration file named by `--config`, `KNNC_CONFIG` or the platform default
pub fn load_config(args: &Args) -> Result<(TomlConfig, ConfigSource)> {
    Ok(load_or_default(args.config.as_deref())?)
}

impl RunSettings {
    pub fn resolve(args: &Args, config: &TomlConfig) -> Result<Self> {
        let references: Vec<LabeledSource> = labeled(&args.classifier_index, Label::Unknown)
            .chain(labeled(&args.positive_index, Label::Positive))
            .chain(labeled(&args.negative_index, Label::Negative))
            .collect();
        if references.is_empty() {
            return Err(Error::Config(
                "no reference collection given (-c, -p or -n)".to_string(),
            ));
        }

        let inputs: Vec<LabeledSource> = labeled(&args.input, Label::Unknown)
            .chain(labeled(&args.input_positive, Label::Positive))
            .chain(labeled(&args.input_negative, Label::Negative))
            .collect();
        let input = match (&args.input_video, inputs.is_empty()) {
            (Some(video), true) => RunInput::Video(video.clone()),
            (None, false) => RunInput::Dataset(inputs),
            (Some(_), false) => {
                return Err(Error::Config(
                    "give either input collections or a video, not both".to_string(),
                ))
            }
            (None, true) => {
                return Err(Error::Config(
                    "no input given (-i, -P, -N or -v)".to_string(),
                ))
            }
        };

        let features = if args.features.is_empty() {
            config.classifier.features.clone()
        } else {
            args.features.clone()
        };
        if features.is_empty() {
            return Err(Error::Config("no features selected (-f)".to_string()));
        }

        let measure = match args.measure.as_deref().or(config.classifier.measure.as_deref()) {
            Some(name) => name.parse::<MeasureType>()?,
            None => MeasureType::default(),
        };

        let engine = EngineConfig {
            measure,
            max_hits: config.classifier.max_hits,
            workers: args
                .workers
                .or(config.classifier.workers)
                .unwrap_or_else(default_worker_count),
            completion_timeout: Duration::from_secs(config.classifier.completion_timeout_secs),
            shutdown_grace: Duration::from_secs(config.classifier.shutdown_grace_secs),
        };
        engine.validate()?;

        let output_dir = args
            .output_dir
            .clone()
            .or_else(|| config.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            references,
            input,
            features,
            engine,
            silent: args.silent,
            output_dir,
        })
    }
}
