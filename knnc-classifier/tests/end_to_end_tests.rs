//! End-to-end tests over JSON-lines collections on disk
//!
//! Mirrors what the binary does: resolve settings, open collections through the
//! store, run the engine, evaluate metrics and write the reports.

use clap::Parser;
use knnc_classifier::document::{Document, JsonlStore, LabeledCollection};
use knnc_classifier::export::{write_gallery, VideoReport};
use knnc_classifier::frames::JsonlFrameSource;
use knnc_classifier::fusion::LATE_FUSION;
use knnc_classifier::metrics::ClassificationMetrics;
use knnc_classifier::progress::SilentProgress;
use knnc_classifier::reference::ReferenceIndexSet;
use knnc_classifier::registry::FeatureRegistry;
use knnc_classifier::settings::{Args, RunInput, RunSettings};
use knnc_classifier::{ClassificationEngine, Error, Label, RunControl};
use knnc_common::config::TomlConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn document(identifier: &str, cedd: [f32; 3], jcd: [f32; 2]) -> Document {
    Document::new(identifier)
        .with_descriptor("CEDD", cedd.to_vec())
        .with_descriptor("JCD", jcd.to_vec())
}

fn write_jsonl(path: &Path, documents: &[Document]) {
    let lines: Vec<String> = documents
        .iter()
        .map(|d| serde_json::to_string(d).unwrap())
        .collect();
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

/// Reference and input collections for a two-feature dataset run
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();

        let positives: Vec<Document> = (0..6)
            .map(|i| document(&format!("/refs/pos/ref{}.jpg", i), [1.0, 0.1 * i as f32, 0.0], [1.0, 0.0]))
            .collect();
        let negatives: Vec<Document> = (0..6)
            .map(|i| document(&format!("/refs/neg/ref{}.jpg", i), [0.0, 0.1 * i as f32, 1.0], [0.0, 1.0]))
            .collect();
        write_jsonl(&dir.path().join("pos.jsonl"), &positives);
        write_jsonl(&dir.path().join("neg.jsonl"), &negatives);

        // Mixed input: ground truth comes from the file-name convention
        let inputs = vec![
            document("/data/p_001.jpg", [0.9, 0.2, 0.0], [0.9, 0.1]),
            document("/data/p_002.jpg", [1.0, 0.3, 0.1], [1.0, 0.0]),
            document("/data/n_001.jpg", [0.1, 0.2, 0.9], [0.1, 0.9]),
            document("/data/n_002.jpg", [0.0, 0.4, 1.0], [0.0, 1.0]),
            // Looks positive: a false positive for every feature
            document("/data/n_003.jpg", [1.0, 0.1, 0.0], [1.0, 0.0]),
        ];
        write_jsonl(&dir.path().join("input.jsonl"), &inputs);

        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn arg(&self, name: &str) -> String {
        self.path(name).display().to_string()
    }
}

fn build_engine(settings: &RunSettings) -> Arc<ClassificationEngine> {
    let providers = FeatureRegistry::with_defaults()
        .resolve(&settings.features)
        .unwrap();
    let references = ReferenceIndexSet::open(&JsonlStore, &settings.references).unwrap();
    Arc::new(ClassificationEngine::new(references, providers, settings.engine.clone()).unwrap())
}

#[test]
fn test_dataset_run_metrics_and_gallery() {
    let fixture = Fixture::new();
    let out = fixture.path("out");
    let argv = vec![
        "knnc-classify".to_string(),
        "-p".to_string(),
        fixture.arg("pos.jsonl"),
        "-n".to_string(),
        fixture.arg("neg.jsonl"),
        "-i".to_string(),
        fixture.arg("input.jsonl"),
        "-f".to_string(),
        "CEDD".to_string(),
        "-f".to_string(),
        "JCD".to_string(),
        "-m".to_string(),
        "weightedByDistance".to_string(),
        "--workers".to_string(),
        "3".to_string(),
        "--output-dir".to_string(),
        out.display().to_string(),
    ];
    let args = Args::try_parse_from(argv).unwrap();
    let mut config = TomlConfig::default();
    config.classifier.max_hits = 5;
    let settings = RunSettings::resolve(&args, &config).unwrap();

    let engine = build_engine(&settings);
    let RunInput::Dataset(sources) = &settings.input else {
        panic!("expected a dataset run");
    };
    let inputs = LabeledCollection::open_all(&JsonlStore, sources).unwrap();
    let list = engine
        .classify_dataset(inputs, Arc::new(SilentProgress), &RunControl::new())
        .unwrap();
    assert_eq!(list.len(), 5);

    let metrics = ClassificationMetrics::evaluate(&list.snapshot());
    for feature in ["CEDD", "JCD", LATE_FUSION] {
        let counters = metrics.get(feature).unwrap();
        assert_eq!(counters.true_positives, 2, "{}", feature);
        assert_eq!(counters.true_negatives, 2, "{}", feature);
        assert_eq!(counters.false_positives, 1, "{}", feature);
        assert_eq!(counters.false_negatives, 0, "{}", feature);
    }

    let table = metrics.table().to_string();
    assert!(table.contains("LateFusion"));
    assert!(table.contains("0.800000"));

    let gallery = write_gallery(&list, &settings.output_dir).unwrap();
    assert!(gallery.starts_with(&out));
    let html = fs::read_to_string(&gallery).unwrap();
    assert_eq!(html.matches("<td>").count(), 5);
    assert_eq!(html.matches("border:medium solid red").count(), 3);
}

#[test]
fn test_video_run_writes_frame_report() {
    let fixture = Fixture::new();
    let frames = vec![
        document("ignored", [1.0, 0.0, 0.0], [1.0, 0.0]),
        document("ignored", [0.0, 0.0, 1.0], [0.0, 1.0]),
        document("ignored", [0.9, 0.1, 0.0], [0.9, 0.0]),
        document("ignored", [0.0, 0.2, 0.9], [0.1, 0.9]),
    ];
    let video = fixture.path("clip.jsonl");
    write_jsonl(&video, &frames);

    let argv = vec![
        "knnc-classify".to_string(),
        "-p".to_string(),
        fixture.arg("pos.jsonl"),
        "-n".to_string(),
        fixture.arg("neg.jsonl"),
        "-v".to_string(),
        video.display().to_string(),
        "-f".to_string(),
        "CEDD".to_string(),
        "--workers".to_string(),
        "2".to_string(),
    ];
    let args = Args::try_parse_from(argv).unwrap();
    let mut config = TomlConfig::default();
    config.classifier.max_hits = 5;
    let settings = RunSettings::resolve(&args, &config).unwrap();
    let engine = build_engine(&settings);

    let source = JsonlFrameSource::open(&video).unwrap();
    let list = engine
        .classify_stream(Box::new(source), Arc::new(SilentProgress), &RunControl::new())
        .unwrap();

    let report = VideoReport::from_list(&list, &video).unwrap();
    assert_eq!(report.positive_frames, vec![0, 2]);
    assert_eq!(report.negative_frames, vec![1, 3]);

    let out = fixture.path("reports");
    let written = report.write_to(&out).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&written).unwrap()).unwrap();
    assert_eq!(value["positiveFrames"], serde_json::json!([0, 2]));
    assert_eq!(value["negativeFrames"], serde_json::json!([1, 3]));
    assert_eq!(
        value["videoName"],
        fs::canonicalize(&video).unwrap().display().to_string()
    );
    let name = written.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("results-") && name.ends_with(".json"));
}

#[test]
fn test_unknown_feature_rejected_before_opening_collections() {
    let registry = FeatureRegistry::with_defaults();
    let result = registry.resolve(&["CEDD".to_string(), "Colour".to_string()]);
    assert!(matches!(result, Err(Error::UnknownFeature(name)) if name == "Colour"));
}

#[test]
fn test_missing_reference_collection_is_reported() {
    let fixture = Fixture::new();
    let sources = vec![knnc_classifier::document::LabeledSource::new(
        fixture.path("missing.jsonl"),
        Label::Positive,
    )];
    let result = ReferenceIndexSet::open(&JsonlStore, &sources);
    assert!(matches!(result, Err(Error::CollectionOpen { path, .. }) if path.ends_with("missing.jsonl")));
}
