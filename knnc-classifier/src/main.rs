//! knnc-classify - Main entry point
//!
//! Classifies a dataset of input collections (printing metrics and writing an
//! HTML gallery) or the frames of a video (writing a JSON frame report)
//! against labeled reference collections.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use knnc_classifier::classification::ClassificationList;
use knnc_classifier::document::{JsonlStore, LabeledCollection};
use knnc_classifier::export::{write_gallery, VideoReport};
use knnc_classifier::frames::JsonlFrameSource;
use knnc_classifier::metrics::ClassificationMetrics;
use knnc_classifier::progress::{ProgressReporter, SilentProgress};
use knnc_classifier::reference::ReferenceIndexSet;
use knnc_classifier::registry::FeatureRegistry;
use knnc_classifier::settings::{load_config, Args, RunInput, RunSettings};
use knnc_classifier::{ClassificationEngine, RunControl, RunResult};
use knnc_common::config::LoggingConfig;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Progress percentages on stderr
struct ConsoleProgress;

impl ProgressReporter for ConsoleProgress {
    fn report(&self, percent: u32) {
        eprintln!("{:>3}%", percent);
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("knnc_classifier=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, config_source) = load_config(&args).context("Failed to load configuration")?;
    init_tracing(&config.logging);
    config_source.log();

    let started = Instant::now();
    let settings = RunSettings::resolve(&args, &config).context("Invalid arguments")?;

    let registry = FeatureRegistry::with_defaults();
    let providers = registry
        .resolve(&settings.features)
        .context("Invalid feature selection")?;
    let references = ReferenceIndexSet::open(&JsonlStore, &settings.references)
        .context("Failed to open reference collections")?;
    let engine = Arc::new(ClassificationEngine::new(
        references,
        providers,
        settings.engine.clone(),
    )?);

    let progress: Arc<dyn ProgressReporter> = if settings.silent {
        Arc::new(SilentProgress)
    } else {
        Arc::new(ConsoleProgress)
    };
    let control = RunControl::new();

    let job = match &settings.input {
        RunInput::Dataset(sources) => {
            let inputs = LabeledCollection::open_all(&JsonlStore, sources)
                .context("Failed to open input collections")?;
            let engine = Arc::clone(&engine);
            let control = control.clone();
            tokio::task::spawn_blocking(move || engine.classify_dataset(inputs, progress, &control))
        }
        RunInput::Video(path) => {
            let source = JsonlFrameSource::open(path).context("Failed to open video frames")?;
            let engine = Arc::clone(&engine);
            let control = control.clone();
            tokio::task::spawn_blocking(move || {
                engine.classify_stream(Box::new(source), progress, &control)
            })
        }
    };

    let list = match wait_for_run(job, &control).await? {
        Ok(list) => list,
        Err(failure) => {
            print_records(&failure.partial);
            return Err(failure.into());
        }
    };

    print_records(&list);
    match &settings.input {
        RunInput::Dataset(_) => {
            let metrics = ClassificationMetrics::evaluate(&list.snapshot());
            print!("{}", metrics.table());
            write_gallery(&list, &settings.output_dir).context("Failed to write gallery")?;
        }
        RunInput::Video(path) => {
            VideoReport::from_list(&list, path)
                .and_then(|report| report.write_to(&settings.output_dir))
                .context("Failed to write video report")?;
        }
    }

    info!("duration: {:.1} seconds", started.elapsed().as_secs_f64());
    Ok(())
}

/// Wait for the classification task, cancelling it on Ctrl+C
async fn wait_for_run(mut job: JoinHandle<RunResult>, control: &RunControl) -> Result<RunResult> {
    tokio::select! {
        joined = &mut job => return joined.context("Classification task failed"),
        signalled = signal::ctrl_c() => match signalled {
            Ok(()) => {
                warn!("Received Ctrl+C, stopping classification");
                control.cancel();
            }
            Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
        },
    }
    job.await.context("Classification task failed")
}

fn print_records(list: &ClassificationList) {
    for record in list.snapshot() {
        println!("{}", record);
    }
}
