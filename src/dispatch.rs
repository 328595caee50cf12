//! Routes a validated request to its engine and reports coarse progress.
//!
//! ```text
//! validate ─▶ route ─▶ [pace] 50% ─▶ engine (spawn_blocking) ─▶ [pace] 90%
//! ```
//!
//! Engines are CPU-bound and synchronous, so they run on the blocking pool.
//! A panic inside an engine surfaces as [`ConvertError::Internal`] instead of
//! unwinding into the caller.

use crate::config::{ConversionConfig, PageRange};
use crate::error::ConvertError;
use crate::output::Artifact;
use crate::pipeline::pdf::{PdfLibrary, PdfLibraryLoader};
use crate::pipeline::{audio, image, text};
use crate::progress::{checkpoint, ProgressSink};
use crate::registry::{Category, Operation};
use crate::request::ConversionRequest;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Which engine handles a request.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Reencode(String),
    ImageToPdf,
    Merge,
    Split(PageRange),
    Text(String),
    Audio(String),
}

impl Route {
    fn for_request(request: &ConversionRequest) -> Result<Self, ConvertError> {
        let route = match (request.category, &request.operation) {
            (Category::Image, Operation::Format(ext)) if ext == "pdf" => Route::ImageToPdf,
            (Category::Image, Operation::Format(ext)) => Route::Reencode(ext.clone()),
            (Category::Pdf, Operation::Merge) => Route::Merge,
            // No range means the whole document.
            (Category::Pdf, Operation::Split) => Route::Split(request.params.page_range.unwrap_or_default()),
            (Category::Document, Operation::Format(ext)) => Route::Text(ext.clone()),
            (Category::Audio, Operation::Format(ext)) => Route::Audio(ext.clone()),
            (category, operation) => {
                return Err(ConvertError::Internal(format!(
                    "no engine for {category} → {operation}"
                )))
            }
        };
        Ok(route)
    }

    fn needs_pdf(&self) -> bool {
        matches!(self, Route::ImageToPdf | Route::Merge | Route::Split(_))
    }

    fn engine_name(&self) -> &'static str {
        match self {
            Route::Reencode(_) => "image encoder",
            Route::ImageToPdf | Route::Merge | Route::Split(_) => "PDF library",
            Route::Text(_) => "text transform",
            Route::Audio(_) => "audio passthrough",
        }
    }
}

/// Runs one conversion at a time on behalf of the controller.
#[derive(Debug)]
pub struct Dispatcher {
    pdf: PdfLibraryLoader,
    jpeg_quality: u8,
    pacing: Duration,
}

impl Dispatcher {
    pub fn new(config: &ConversionConfig) -> Self {
        Self {
            pdf: PdfLibraryLoader::new(),
            jpeg_quality: config.jpeg_quality,
            pacing: config.pacing(),
        }
    }

    /// The lazily loaded PDF library shared by every PDF operation.
    pub fn pdf_loader(&self) -> &PdfLibraryLoader {
        &self.pdf
    }

    async fn pace(&self) {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }

    /// Validate `request`, run its engine and return the produced artifacts.
    pub async fn dispatch(
        &self,
        request: ConversionRequest,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<Artifact>, ConvertError> {
        request.validate()?;
        let route = Route::for_request(&request)?;
        debug!("Routing {} → {} via {:?}", request.category, request.operation, route);

        let pdf = if route.needs_pdf() {
            if !self.pdf.is_loaded() {
                sink.checkpoint(None, "Loading PDF library");
            }
            Some(self.pdf.ensure_loaded())
        } else {
            None
        };

        if let Route::Audio(ext) = &route {
            sink.warning(&format!("{} (output: .{ext})", audio::TRANSCODE_WARNING));
        }

        self.pace().await;
        sink.checkpoint(
            Some(checkpoint::MID_STAGE),
            &format!(
                "Processing {} with the {}",
                request.input_summary(),
                route.engine_name()
            ),
        );

        let quality = self.jpeg_quality;
        let artifacts = tokio::task::spawn_blocking(move || run_engine(route, &request, pdf, quality))
            .await
            .map_err(|e| ConvertError::Internal(format!("Conversion task panicked: {}", e)))??;

        self.pace().await;
        for artifact in &artifacts {
            sink.checkpoint(
                Some(checkpoint::NEAR_COMPLETE),
                &format!(
                    "Created {} ({:.1} KB)",
                    artifact.name,
                    artifact.bytes.len() as f64 / 1024.0
                ),
            );
        }
        info!("Dispatch produced {} artifact(s)", artifacts.len());
        Ok(artifacts)
    }
}

fn pdf_library(pdf: Option<Arc<PdfLibrary>>) -> Result<Arc<PdfLibrary>, ConvertError> {
    pdf.ok_or_else(|| ConvertError::Internal("PDF library was not loaded".to_string()))
}

fn run_engine(
    route: Route,
    request: &ConversionRequest,
    pdf: Option<Arc<PdfLibrary>>,
    jpeg_quality: u8,
) -> Result<Vec<Artifact>, ConvertError> {
    let artifact = match route {
        Route::Reencode(ext) => image::reencode(request.primary()?, &ext, jpeg_quality)?,
        Route::ImageToPdf => {
            let input = request.primary()?;
            let prepared = image::prepare_pdf_image(input)?;
            pdf_library(pdf)?.image_to_pdf(&prepared, input.base_name())?
        }
        Route::Merge => pdf_library(pdf)?.merge(&request.inputs)?,
        Route::Split(range) => pdf_library(pdf)?.split(request.primary()?, range)?,
        Route::Text(ext) => text::transform(request.primary()?, &ext)?,
        Route::Audio(ext) => audio::passthrough(request.primary()?, &ext),
    };
    Ok(vec![artifact])
}
