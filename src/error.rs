//! Error types for the retroconverter library.
//!
//! Failures fall into three families, matching where they are raised:
//!
//! * [`ValidationError`]: the request itself is unusable (no file, too few
//!   files for a merge). Raised before any engine runs; the conversion never
//!   starts.
//!
//! * [`ConvertError::Decode`] / [`ConvertError::Library`]: an engine failed
//!   mid-flight (source could not be decoded, destination could not be
//!   encoded, the PDF library rejected a document).
//!
//! * Controller errors ([`ConvertError::Busy`], cancelled or superseded
//!   attempts, storage and I/O failures).
//!
//! Missing client-side capabilities (audio transcoding) are deliberately not
//! represented here: they degrade to passthrough and surface as a warning
//! line in the activity log.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the conversion pipeline.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The request failed a precondition; no engine was invoked.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A conversion is already in flight. Starts are rejected, not queued.
    #[error("A conversion is already in progress; wait for it to finish")]
    Busy,

    /// The conversion was dropped before it produced a result.
    #[error("Conversion cancelled before it finished")]
    Cancelled,

    /// A reset or category change replaced the conversion while it ran; its
    /// results were discarded.
    #[error("Conversion superseded by a reset or category change; results discarded")]
    Superseded,

    /// The operation is not offered for the category.
    #[error("Operation '{operation}' is not available for {category} files")]
    UnsupportedOperation { category: String, operation: String },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The source could not be decoded, or the destination encoded.
    #[error("{kind}: {detail}")]
    Decode { kind: DecodeErrorKind, detail: String },

    /// An external library (PDF) threw.
    #[error("{library} library error: {detail}")]
    Library {
        library: &'static str,
        detail: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read an input file.
    #[error("Failed to read input file '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write a converted artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The history store could not be written.
    #[error("History store error: {0}")]
    Storage(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, unroutable request).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    pub(crate) fn decode(detail: impl fmt::Display) -> Self {
        ConvertError::Decode {
            kind: DecodeErrorKind::DecodeFailed,
            detail: detail.to_string(),
        }
    }

    pub(crate) fn encode(detail: impl fmt::Display) -> Self {
        ConvertError::Decode {
            kind: DecodeErrorKind::EncodeFailed,
            detail: detail.to_string(),
        }
    }

    pub(crate) fn parse(detail: impl fmt::Display) -> Self {
        ConvertError::Decode {
            kind: DecodeErrorKind::ParseFailed,
            detail: detail.to_string(),
        }
    }

    pub(crate) fn pdf(detail: impl fmt::Display) -> Self {
        ConvertError::Library {
            library: "PDF",
            detail: detail.to_string(),
        }
    }

    /// Taxonomy name used as the error-line prefix in the activity log.
    pub fn family(&self) -> &'static str {
        match self {
            ConvertError::Validation(_) => "ValidationError",
            ConvertError::Decode { .. } => "DecodeError",
            ConvertError::Library { .. } => "LibraryError",
            ConvertError::Busy => "BusyError",
            ConvertError::Cancelled | ConvertError::Superseded => "CancelledError",
            ConvertError::UnsupportedOperation { .. } => "ValidationError",
            ConvertError::InputReadFailed { .. }
            | ConvertError::OutputWriteFailed { .. }
            | ConvertError::Storage(_) => "IoError",
            ConvertError::InvalidConfig(_) => "ConfigError",
            ConvertError::Internal(_) => "InternalError",
        }
    }
}

/// Request preconditions checked by the dispatcher before routing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No input file was selected.
    #[error("no-file: select a file before converting")]
    NoFile,

    /// The operation needs more inputs than were selected (merge needs two).
    #[error("insufficient-files: {operation} needs at least {required} files, got {found}")]
    InsufficientFiles {
        operation: String,
        required: usize,
        found: usize,
    },

    /// Several files were given to a single-file category.
    #[error("too-many-files: {category} accepts a single file, got {found}")]
    TooManyFiles { category: String, found: usize },
}

/// Sub-kind of [`ConvertError::Decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// The source bytes are not a decodable image/document.
    DecodeFailed,
    /// The encoder produced no payload.
    EncodeFailed,
    /// Structured text (JSON) could not be parsed.
    ParseFailed,
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecodeErrorKind::DecodeFailed => "decode-failed",
            DecodeErrorKind::EncodeFailed => "encode-failed",
            DecodeErrorKind::ParseFailed => "parse-failed",
        })
    }
}
