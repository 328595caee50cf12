//! Conversion outputs: engine artifacts and the downloadable result set.

use crate::error::ConvertError;
use crate::resource::{ObjectHandle, ResourceTracker};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What an engine produces: a named payload, not yet attached to a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Suggested download name.
    pub name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, mime: &'static str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime,
            bytes,
        }
    }

    /// Write the payload into `dir` under its suggested name.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf, ConvertError> {
        write_atomic(dir, &self.name, &self.bytes)
    }
}

/// Uses atomic write (temp file + rename) to prevent partial files.
fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, ConvertError> {
    let path = dir.join(name);
    let write_err = |source| ConvertError::OutputWriteFailed {
        path: path.clone(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(write_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.persist(&path).map_err(|e| write_err(e.error))?;

    debug!("Saved {} ({} bytes)", path.display(), bytes.len());
    Ok(path)
}

/// One produced artifact plus the object handle used to preview/download it.
#[derive(Debug)]
pub struct ConversionResult {
    pub name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
    handle: ObjectHandle,
}

impl ConversionResult {
    pub(crate) fn attach(artifact: Artifact, tracker: &ResourceTracker) -> Self {
        Self {
            name: artifact.name,
            mime: artifact.mime,
            bytes: artifact.bytes,
            handle: tracker.acquire(),
        }
    }

    /// Payload length in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Payload length in kilobytes, rounded to one decimal.
    pub fn size_kb(&self) -> f64 {
        (self.bytes.len() as f64 / 1024.0 * 10.0).round() / 10.0
    }

    pub fn handle(&self) -> &ObjectHandle {
        &self.handle
    }

    /// Inline preview as a `data:` URI.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    /// Serializable description without the payload.
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            name: self.name.clone(),
            mime: self.mime.to_string(),
            size: self.size(),
            url: self.handle.url(),
        }
    }

    /// Write the payload into `dir` under the suggested name.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf, ConvertError> {
        write_atomic(dir, &self.name, &self.bytes)
    }

    /// Drop the result, releasing its handle explicitly.
    pub fn release(self) {
        self.handle.release();
    }
}

/// Payload-free view of a result, for printing and JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    pub name: String,
    pub mime: String,
    pub size: usize,
    pub url: String,
}

/// The current set of results. Replaced atomically on every new conversion.
#[derive(Debug, Default)]
pub struct ResultSet {
    results: Vec<ConversionResult>,
}

impl ResultSet {
    /// Release every handle of the current set, then install `next`.
    pub fn replace(&mut self, next: Vec<ConversionResult>) {
        self.clear();
        self.results = next;
    }

    /// Release every handle and empty the set.
    pub fn clear(&mut self) {
        for result in self.results.drain(..) {
            result.release();
        }
    }

    pub fn as_slice(&self) -> &[ConversionResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// "Download all": write every result into `dir`.
    pub fn save_all(&self, dir: &Path) -> Result<Vec<PathBuf>, ConvertError> {
        self.results.iter().map(|r| r.save_to(dir)).collect()
    }
}
