//! Documents and collections
//!
//! A document is an indexed image: an identifier (usually its path), an
//! optional stored label and one descriptor vector per extracted feature.
//! Collections are opened once and then read concurrently without locking.

use crate::error::{Error, Result};
use crate::types::Label;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Indexed image document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Image path, or frame position for video frames
    pub identifier: String,

    /// Label stored with the document, if the index recorded one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,

    /// Descriptor vectors keyed by feature name
    #[serde(default)]
    pub descriptors: BTreeMap<String, Vec<f32>>,
}

impl Document {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            label: None,
            descriptors: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_descriptor(mut self, feature: impl Into<String>, values: Vec<f32>) -> Self {
        self.descriptors.insert(feature.into(), values);
        self
    }

    pub fn descriptor(&self, feature: &str) -> Option<&[f32]> {
        self.descriptors.get(feature).map(Vec::as_slice)
    }

    /// Parse one JSON-lines record
    pub fn from_json_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Random-access, read-only document collection
pub trait Collection: Send + Sync {
    /// Display name (usually the path it was opened from)
    fn name(&self) -> &str;

    fn count(&self) -> usize;

    fn document_at(&self, index: usize) -> Result<Arc<Document>>;
}

/// Opens collections by path
pub trait CollectionStore: Send + Sync {
    fn open(&self, path: &Path) -> Result<Arc<dyn Collection>>;
}

/// A collection path tagged with the label of everything in it
///
/// `Label::Unknown` marks a mixed collection whose labels are read per document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledSource {
    pub path: PathBuf,
    pub label: Label,
}

impl LabeledSource {
    pub fn new(path: impl Into<PathBuf>, label: Label) -> Self {
        Self {
            path: path.into(),
            label,
        }
    }
}

/// An opened collection with its label tag
#[derive(Clone)]
pub struct LabeledCollection {
    pub collection: Arc<dyn Collection>,
    pub label: Label,
}

impl LabeledCollection {
    pub fn new(collection: Arc<dyn Collection>, label: Label) -> Self {
        Self { collection, label }
    }

    /// Open every source through `store`, failing on the first that cannot be opened
    pub fn open_all(store: &dyn CollectionStore, sources: &[LabeledSource]) -> Result<Vec<Self>> {
        sources
            .iter()
            .map(|source| {
                let collection = store.open(&source.path)?;
                debug!(
                    "Opened {} ({} documents, label {})",
                    collection.name(),
                    collection.count(),
                    source.label
                );
                Ok(Self::new(collection, source.label))
            })
            .collect()
    }
}

/// Collection held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryCollection {
    name: String,
    documents: Vec<Arc<Document>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            name: name.into(),
            documents: documents.into_iter().map(Arc::new).collect(),
        }
    }
}

impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self) -> usize {
        self.documents.len()
    }

    fn document_at(&self, index: usize) -> Result<Arc<Document>> {
        self.documents.get(index).cloned().ok_or_else(|| {
            Error::Document(format!(
                "{}: index {} out of range ({} documents)",
                self.name,
                index,
                self.documents.len()
            ))
        })
    }
}

/// Store reading JSON-lines files, one [`Document`] per non-empty line
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlStore;

impl CollectionStore for JsonlStore {
    fn open(&self, path: &Path) -> Result<Arc<dyn Collection>> {
        let open_error = |reason: String| Error::CollectionOpen {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| open_error(e.to_string()))?;
        let mut documents = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| open_error(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let document = Document::from_json_line(&line)
                .map_err(|e| open_error(format!("line {}: {}", line_no + 1, e)))?;
            documents.push(document);
        }

        Ok(Arc::new(MemoryCollection::new(
            path.display().to_string(),
            documents,
        )))
    }
}
