//! Frame sources for video classification
//!
//! A frame source yields descriptor documents in stream order. It is read by
//! exactly one producer thread, which assigns frame positions; identifiers
//! carried by the source are not used.

use crate::document::Document;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// Sequential source of frame documents
pub trait FrameSource: Send {
    /// Total number of frames, when the container reports one
    fn frame_count_hint(&self) -> Option<usize> {
        None
    }

    /// Next frame, or `None` at end of stream
    fn next_frame(&mut self) -> Result<Option<Document>>;
}

/// Frames held in memory
#[derive(Debug, Default)]
pub struct MemoryFrameSource {
    frames: VecDeque<Document>,
    total: usize,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<Document>) -> Self {
        Self {
            total: frames.len(),
            frames: frames.into(),
        }
    }
}

impl FrameSource for MemoryFrameSource {
    fn frame_count_hint(&self) -> Option<usize> {
        Some(self.total)
    }

    fn next_frame(&mut self) -> Result<Option<Document>> {
        Ok(self.frames.pop_front())
    }
}

/// Pre-extracted frame descriptors, one JSON document per line
pub struct JsonlFrameSource {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    total: usize,
}

impl JsonlFrameSource {
    /// Open `path`; the frame count is taken from a first pass over the file
    pub fn open(path: &Path) -> Result<Self> {
        let open_error = |e: std::io::Error| Error::CollectionOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let mut total = 0;
        for line in BufReader::new(File::open(path).map_err(open_error)?).lines() {
            if !line.map_err(open_error)?.trim().is_empty() {
                total += 1;
            }
        }

        let lines = BufReader::new(File::open(path).map_err(open_error)?).lines();
        Ok(Self {
            path: path.to_path_buf(),
            lines,
            line_no: 0,
            total,
        })
    }
}

impl FrameSource for JsonlFrameSource {
    fn frame_count_hint(&self) -> Option<usize> {
        Some(self.total)
    }

    fn next_frame(&mut self) -> Result<Option<Document>> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line.map_err(|e| {
                Error::Stream(format!("{}:{}: {}", self.path.display(), self.line_no, e))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let frame = Document::from_json_line(&line).map_err(|e| {
                Error::Stream(format!("{}:{}: {}", self.path.display(), self.line_no, e))
            })?;
            return Ok(Some(frame));
        }
        Ok(None)
    }
}
