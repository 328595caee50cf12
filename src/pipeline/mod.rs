//! Conversion engines, one per category.
//!
//! Engines are synchronous and free of session state: each takes input bytes
//! and returns an [`Artifact`](crate::output::Artifact). The dispatcher runs
//! them under `spawn_blocking` and owns progress reporting.
//!
//! ```text
//! image    ──▶ decode ─▶ surface ─▶ encode          (image::reencode)
//! image    ──▶ prepare ─▶ single-page PDF           (pdf::PdfLibrary::image_to_pdf)
//! pdf      ──▶ load ─▶ copy pages ─▶ save           (pdf::PdfLibrary::{merge, split})
//! document ──▶ line/tabular transform               (text::transform)
//! audio    ──▶ rename                               (audio::passthrough)
//! ```
//!
//! [`editor`] is the interactive counterpart of [`image`]: it keeps the decoded
//! bitmap open and re-renders on every adjustment.

pub mod audio;
pub mod editor;
pub mod image;
pub mod pdf;
pub mod text;
