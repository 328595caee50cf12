//! Format registry: which inputs each category accepts and which outputs it offers.
//!
//! Pure data. The first entry of every output list is the default operation
//! selected when the user switches to that category.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Top-level kind of conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Image,
    Pdf,
    Document,
    Audio,
}

impl Category {
    /// Every category, in menu order.
    pub const ALL: [Category; 4] = [
        Category::Image,
        Category::Pdf,
        Category::Document,
        Category::Audio,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Image => "image",
            Category::Pdf => "pdf",
            Category::Document => "document",
            Category::Audio => "audio",
        }
    }

    /// The operation selected when switching to this category.
    pub fn default_operation(self) -> Operation {
        // Every table row has at least one output.
        Operation::from_extension(formats_for(self).outputs[0])
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "image" | "img" => Ok(Category::Image),
            "pdf" => Ok(Category::Pdf),
            "document" | "doc" | "text" => Ok(Category::Document),
            "audio" => Ok(Category::Audio),
            other => Err(format!(
                "unknown category '{other}' (expected image, pdf, document or audio)"
            )),
        }
    }
}

/// The chosen output: a page operation or a target format extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Operation {
    /// Concatenate several PDFs.
    Merge,
    /// Extract a contiguous page range from one PDF.
    Split,
    /// Re-encode / reformat to this extension (lowercase, no dot).
    Format(String),
}

impl Operation {
    /// Parse an operation name or an extension; leading dots and case are ignored.
    pub fn from_extension(s: &str) -> Self {
        let s = s.trim().trim_start_matches('.').to_lowercase();
        match s.as_str() {
            "merge" => Operation::Merge,
            "split" => Operation::Split,
            _ => Operation::Format(s),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Operation::Merge => "merge",
            Operation::Split => "split",
            Operation::Format(ext) => ext,
        }
    }

    /// Minimum number of input files this operation needs.
    pub fn min_inputs(&self) -> usize {
        match self {
            Operation::Merge => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().trim_start_matches('.').is_empty() {
            return Err("operation must not be empty".into());
        }
        Ok(Operation::from_extension(s))
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        op.as_str().to_string()
    }
}

impl From<String> for Operation {
    fn from(s: String) -> Self {
        Operation::from_extension(&s)
    }
}

/// Registry row for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    /// File-picker filter, as shown to the user.
    pub accept: &'static str,
    /// Extensions matching `accept`, lowercase.
    pub extensions: &'static [&'static str],
    /// Output operations in menu order; the first is the default.
    pub outputs: &'static [&'static str],
    /// Whether several input files may be selected.
    pub multi_file: bool,
    pub description: &'static str,
}

impl FormatSpec {
    /// Whether `op` appears in this category's output list.
    pub fn supports(&self, op: &Operation) -> bool {
        self.outputs.iter().any(|o| *o == op.as_str())
    }

    /// Whether the file name's extension matches the accept filter.
    pub fn accepts(&self, file_name: &str) -> bool {
        extension_of(file_name)
            .map(|ext| self.extensions.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// The names from `names` the accept filter turns away, in input order.
    pub fn rejected<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        names.into_iter().filter(|n| !self.accepts(n)).collect()
    }

    /// The operations as parsed values, in menu order.
    pub fn operations(&self) -> Vec<Operation> {
        self.outputs
            .iter()
            .map(|o| Operation::from_extension(o))
            .collect()
    }
}

static IMAGE: FormatSpec = FormatSpec {
    accept: "image/*",
    extensions: &["png", "jpg", "jpeg", "webp", "gif", "bmp"],
    outputs: &["png", "jpg", "webp", "bmp", "pdf"],
    multi_file: false,
    description: "Re-encode raster images or wrap them in a single-page PDF",
};

static PDF: FormatSpec = FormatSpec {
    accept: "application/pdf",
    extensions: &["pdf"],
    outputs: &["merge", "split"],
    multi_file: true,
    description: "Merge several PDFs or extract a page range",
};

static DOCUMENT: FormatSpec = FormatSpec {
    accept: ".txt,.md,.csv,.json,.html",
    extensions: &["txt", "md", "csv", "json", "html", "htm"],
    outputs: &["html", "txt", "json", "csv"],
    multi_file: false,
    description: "Markdown-like text to HTML or plain text, CSV <-> JSON",
};

static AUDIO: FormatSpec = FormatSpec {
    accept: "audio/*",
    extensions: &["mp3", "wav", "ogg", "m4a", "flac"],
    outputs: &["mp3", "wav", "ogg"],
    multi_file: false,
    description: "Rename audio containers (no client-side transcoding)",
};

/// Look up the registry row for `category`.
pub fn formats_for(category: Category) -> &'static FormatSpec {
    match category {
        Category::Image => &IMAGE,
        Category::Pdf => &PDF,
        Category::Document => &DOCUMENT,
        Category::Audio => &AUDIO,
    }
}

/// MIME type for an output extension.
pub fn mime_for(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "pdf" => "application/pdf",
        "html" | "htm" => "text/html",
        "txt" | "md" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

/// Lowercase extension of a file name, without the dot.
pub fn extension_of(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// File name without its last extension (`"a.b.png"` → `"a.b"`).
pub fn base_name(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}
