//! Conversion requests and their input files.

use crate::config::PageRange;
use crate::error::{ConvertError, ValidationError};
use crate::registry::{self, formats_for, Category, Operation};
use futures::future::try_join_all;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A selected input: its display name and contents.
#[derive(Clone, PartialEq, Eq)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a file from disk; the name is the path's final component.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ConvertError::InputReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!("Read input {} ({} bytes)", name, bytes.len());
        Ok(Self { name, bytes })
    }

    /// Read several files concurrently, keeping selection order.
    pub async fn from_paths(paths: &[PathBuf]) -> Result<Vec<Self>, ConvertError> {
        try_join_all(paths.iter().map(|p| InputFile::from_path(p))).await
    }

    /// Lowercase extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        registry::extension_of(&self.name)
    }

    /// File name without its extension.
    pub fn base_name(&self) -> &str {
        registry::base_name(&self.name)
    }
}

impl fmt::Debug for InputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputFile")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Operation-specific parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationParams {
    /// Page range for split. Defaults to the whole document.
    pub page_range: Option<PageRange>,
}

/// Everything the dispatcher needs to run one conversion.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub category: Category,
    pub operation: Operation,
    pub inputs: Vec<InputFile>,
    pub params: OperationParams,
}

impl ConversionRequest {
    pub fn new(category: Category, operation: Operation, inputs: Vec<InputFile>) -> Self {
        Self {
            category,
            operation,
            inputs,
            params: OperationParams::default(),
        }
    }

    pub fn with_page_range(mut self, range: PageRange) -> Self {
        self.params.page_range = Some(range);
        self
    }

    /// Check preconditions. Runs before any engine is invoked.
    ///
    /// Order matters: an empty selection is always `no-file`, even for merge.
    pub fn validate(&self) -> Result<(), ConvertError> {
        if self.inputs.is_empty() {
            return Err(ValidationError::NoFile.into());
        }

        let required = self.operation.min_inputs();
        if self.inputs.len() < required {
            return Err(ValidationError::InsufficientFiles {
                operation: self.operation.to_string(),
                required,
                found: self.inputs.len(),
            }
            .into());
        }

        let spec = formats_for(self.category);
        if !spec.supports(&self.operation) {
            return Err(ConvertError::UnsupportedOperation {
                category: self.category.to_string(),
                operation: self.operation.to_string(),
            });
        }

        if !spec.multi_file && self.inputs.len() > 1 {
            return Err(ValidationError::TooManyFiles {
                category: self.category.to_string(),
                found: self.inputs.len(),
            }
            .into());
        }

        Ok(())
    }

    /// Input names joined for history and log lines.
    pub fn input_summary(&self) -> String {
        self.inputs
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The first input. Callers must have validated the request.
    pub(crate) fn primary(&self) -> Result<&InputFile, ConvertError> {
        self.inputs
            .first()
            .ok_or(ConvertError::Validation(ValidationError::NoFile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> InputFile {
        InputFile::new(name, vec![1, 2, 3])
    }

    #[test]
    fn empty_selection_is_no_file() {
        let req = ConversionRequest::new(Category::Pdf, Operation::Merge, vec![]);
        assert!(matches!(
            req.validate(),
            Err(ConvertError::Validation(ValidationError::NoFile))
        ));
    }

    #[test]
    fn merge_needs_two_files() {
        let req = ConversionRequest::new(Category::Pdf, Operation::Merge, vec![file("a.pdf")]);
        assert!(matches!(
            req.validate(),
            Err(ConvertError::Validation(ValidationError::InsufficientFiles {
                required: 2,
                found: 1,
                ..
            }))
        ));
        let req = ConversionRequest::new(
            Category::Pdf,
            Operation::Merge,
            vec![file("a.pdf"), file("b.pdf")],
        );
        assert!(req.validate().is_ok());
    }

    #[test]
    fn single_file_categories_reject_several_inputs() {
        let req = ConversionRequest::new(
            Category::Image,
            Operation::from_extension("png"),
            vec![file("a.png"), file("b.png")],
        );
        assert!(matches!(
            req.validate(),
            Err(ConvertError::Validation(ValidationError::TooManyFiles { found: 2, .. }))
        ));
    }

    #[test]
    fn operation_must_be_offered() {
        let req = ConversionRequest::new(Category::Audio, Operation::Split, vec![file("a.mp3")]);
        assert!(matches!(
            req.validate(),
            Err(ConvertError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn summary_and_names() {
        let req = ConversionRequest::new(
            Category::Pdf,
            Operation::Merge,
            vec![file("a.pdf"), file("b.pdf")],
        );
        assert_eq!(req.input_summary(), "a.pdf, b.pdf");
        assert_eq!(file("Report.Final.PDF").extension().as_deref(), Some("pdf"));
        assert_eq!(file("Report.Final.PDF").base_name(), "Report.Final");
    }

    #[tokio::test]
    async fn from_paths_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "first").unwrap();
        std::fs::write(&b, "second").unwrap();
        let files = InputFile::from_paths(&[b.clone(), a.clone()]).await.unwrap();
        assert_eq!(files[0].name, "b.txt");
        assert_eq!(files[1].bytes, b"first");

        let missing = InputFile::from_path(dir.path().join("nope.txt")).await;
        assert!(matches!(missing, Err(ConvertError::InputReadFailed { .. })));
    }
}
