//! # retroconverter
//!
//! Local file conversion: pick files, pick a target, get a downloadable
//! artifact. Nothing leaves the machine.
//!
//! ## Categories
//!
//! | Category   | Inputs            | Operations                         |
//! |------------|-------------------|------------------------------------|
//! | `image`    | one raster image  | `png`, `jpg`, `webp`, `bmp`, `pdf` |
//! | `pdf`      | one or more PDFs  | `merge` (2+ files), `split`        |
//! | `document` | one text file     | `html`, `txt`, `json`, `csv`       |
//! | `audio`    | one audio file    | `mp3`, `wav`, `ogg` (renamed only) |
//!
//! Images can also be opened in an [`ImageEditor`] for brightness, contrast,
//! saturation, quarter-turn rotation, flips and resizing, then exported as PNG.
//!
//! ## Lifecycle
//!
//! ```text
//! select category/operation/files
//!  │
//!  ├─ validate     no-file / insufficient-files: Error, engine never runs
//!  ├─ Running 10%  log cleared, previous results released
//!  ├─ 50%          engine running (spawn_blocking)
//!  ├─ 90%          artifact encoded
//!  └─ Success      results installed, one history record per result
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use retroconverter::{Category, ConversionConfig, Converter, InputFile, Operation};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let converter = Converter::new(ConversionConfig::default());
//!     converter.select_category(Category::Pdf);
//!     converter.select_operation(Operation::Merge)?;
//!     converter.select_files(InputFile::from_paths(&["a.pdf".into(), "b.pdf".into()]).await?);
//!
//!     for result in converter.convert().await? {
//!         println!("{} ({} bytes)", result.name, result.size);
//!     }
//!     converter.save_results(std::path::Path::new("out"))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `retroconv` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod request;
pub mod resource;
pub mod state;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, PageRange};
pub use convert::Converter;
pub use dispatch::Dispatcher;
pub use error::{ConvertError, DecodeErrorKind, ValidationError};
pub use history::{FileStore, HistoryLedger, HistoryRecord, KeyValueStore, MemoryStore};
pub use output::{Artifact, ConversionResult, ResultSummary};
pub use pipeline::editor::{EditorState, ImageEditor, Rotation};
pub use progress::{
    CollectingSink, ConversionProgressCallback, NoopProgressCallback, ProgressCallback,
    ProgressSink,
};
pub use registry::{formats_for, Category, FormatSpec, Operation};
pub use request::{ConversionRequest, InputFile};
pub use state::{AttemptId, ConversionStatus, LogEntry, LogLevel, Session};
