//! Report export
//!
//! Video runs produce a JSON frame report, dataset runs an HTML thumbnail
//! gallery. Both land in the output directory as `results-<unix seconds>.<ext>`.

use crate::classification::{ClassificationList, ClassificationRecord};
use crate::error::{Error, Result};
use crate::types::Label;
use knnc_common::time::unix_seconds;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Gallery cells per table row
const GALLERY_COLUMNS: usize = 3;

/// Thumbnail border colour for a composite label
fn border_colour(label: Label) -> &'static str {
    match label {
        Label::Positive => "red",
        _ => "green",
    }
}

/// `results-<unix seconds>.<extension>`
pub fn report_file_name(extension: &str) -> String {
    format!("results-{}.{}", unix_seconds(), extension)
}

/// Absolute form of `path`, resolving symlinks when the file exists
pub fn absolute_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    })
}

// ============================================================================
// Video report
// ============================================================================

/// Frame positions per composite label for one video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoReport {
    pub negative_frames: Vec<u64>,
    pub positive_frames: Vec<u64>,
    pub video_name: String,
}

impl VideoReport {
    /// Split frames by composite label, in frame order
    pub fn from_list(list: &ClassificationList, video: &Path) -> Result<Self> {
        let mut report = Self {
            negative_frames: Vec::new(),
            positive_frames: Vec::new(),
            video_name: absolute_path(video).display().to_string(),
        };

        for record in list.sorted_by_frame()? {
            // sorted_by_frame has already rejected non-numeric identifiers
            let frame = record.frame_index().unwrap_or_default();
            match record.composite() {
                Label::Positive => report.positive_frames.push(frame),
                _ => report.negative_frames.push(frame),
            }
        }
        Ok(report)
    }

    /// Pretty JSON with four-space indentation
    pub fn to_json(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer)?;
        String::from_utf8(buffer).map_err(|e| Error::Export(e.to_string()))
    }

    /// Write the report into `dir`, returning the file path
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = write_report(dir, "json", &self.to_json()?)?;
        info!(
            "Wrote video report {} ({} positive, {} negative frames)",
            path.display(),
            self.positive_frames.len(),
            self.negative_frames.len()
        );
        Ok(path)
    }
}

// ============================================================================
// HTML gallery
// ============================================================================

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Thumbnail table, three cells per row, bordered by composite label
///
/// Records are listed by identifier.
pub fn render_gallery(records: &[ClassificationRecord]) -> String {
    let mut ordered: Vec<&ClassificationRecord> = records.iter().collect();
    ordered.sort_by(|a, b| a.identifier().cmp(b.identifier()));

    let mut html = String::from("<html>\n<body>\n<table>\n");
    for row in ordered.chunks(GALLERY_COLUMNS) {
        html.push_str("<tr>\n");
        for record in row {
            let src = escape_html(record.identifier());
            let _ = writeln!(
                html,
                "<td><a href=\"{src}\"><img src=\"{src}\" title=\"{title}\" \
                 style=\"max-width:220px;border:medium solid {colour};\"/></a></td>",
                src = src,
                title = escape_html(&record.to_string()),
                colour = border_colour(record.composite()),
            );
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n</body>\n</html>\n");
    html
}

/// Render the gallery for `list` into `dir`, returning the file path
pub fn write_gallery(list: &ClassificationList, dir: &Path) -> Result<PathBuf> {
    let records = list.snapshot();
    let path = write_report(dir, "html", &render_gallery(&records))?;
    info!("Wrote gallery {} ({} images)", path.display(), records.len());
    Ok(path)
}

fn write_report(dir: &Path, extension: &str, contents: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(report_file_name(extension));
    fs::write(&path, contents)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(identifier: &str, composite: Label) -> ClassificationRecord {
        let mut record = ClassificationRecord::new(identifier, Label::Unknown);
        record.set_composite(composite);
        record
    }

    #[test]
    fn test_report_file_name() {
        let name = report_file_name("json");
        assert!(name.starts_with("results-"));
        assert!(name.ends_with(".json"));
        let seconds = &name["results-".len()..name.len() - ".json".len()];
        assert!(seconds.parse::<u64>().is_ok());
    }

    #[test]
    fn test_video_report_sorts_and_splits_frames() {
        let list: ClassificationList = vec![
            record("3", Label::Positive),
            record("0", Label::Negative),
            record("10", Label::Positive),
            record("1", Label::Negative),
        ]
        .into();

        let report = VideoReport::from_list(&list, Path::new("/videos/clip.mp4")).unwrap();
        assert_eq!(report.positive_frames, vec![3, 10]);
        assert_eq!(report.negative_frames, vec![0, 1]);
        assert!(report.video_name.ends_with("clip.mp4"));
        assert!(Path::new(&report.video_name).is_absolute());
    }

    #[test]
    fn test_video_report_json_keys() {
        let report = VideoReport {
            negative_frames: vec![0],
            positive_frames: vec![1, 2],
            video_name: "/videos/clip.mp4".to_string(),
        };
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["negativeFrames"], serde_json::json!([0]));
        assert_eq!(value["positiveFrames"], serde_json::json!([1, 2]));
        assert_eq!(value["videoName"], "/videos/clip.mp4");
        assert!(json.contains("\n    \"negativeFrames\""));
    }

    #[test]
    fn test_gallery_rows_and_colours() {
        let records = vec![
            record("/img/p1.jpg", Label::Positive),
            record("/img/n1.jpg", Label::Negative),
            record("/img/n2.jpg", Label::Negative),
            record("/img/p2.jpg", Label::Positive),
        ];
        let html = render_gallery(&records);

        assert_eq!(html.matches("<tr>").count(), 2);
        assert_eq!(html.matches("<td>").count(), 4);
        assert_eq!(html.matches("border:medium solid red").count(), 2);
        assert_eq!(html.matches("border:medium solid green").count(), 2);
        assert!(html.contains("<a href=\"/img/p1.jpg\">"));
    }

    #[test]
    fn test_gallery_escapes_paths() {
        let html = render_gallery(&[record("/img/p\"<x>.jpg", Label::Positive)]);
        assert!(html.contains("/img/p&quot;&lt;x&gt;.jpg"));
        assert!(!html.contains("p\"<x>"));
    }
}
