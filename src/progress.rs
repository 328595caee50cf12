//! Progress reporting for conversion attempts.
//!
//! Two seams live here:
//!
//! * [`ProgressSink`]: what the dispatcher and engines write checkpoints and
//!   warnings into. The controller's sink records them in the session's
//!   activity log; tests can use a plain collector.
//! * [`ConversionProgressCallback`]: what a host application (the CLI progress
//!   bar, a GUI) implements to observe a conversion from the outside.
//!
//! # Example
//!
//! ```rust
//! use retroconverter::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicU8, Ordering}};
//!
//! struct LastPercent(AtomicU8);
//!
//! impl ConversionProgressCallback for LastPercent {
//!     fn on_progress(&self, percent: u8, _message: &str) {
//!         self.0.store(percent, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(LastPercent(AtomicU8::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::state::LogEntry;
use std::sync::{Arc, Mutex};

/// Coarse progress milestones. Progress is not a byte-accurate measure.
pub mod checkpoint {
    /// Selection acknowledged, request accepted.
    pub const STARTED: u8 = 10;
    /// Inputs decoded / loaded.
    pub const MID_STAGE: u8 = 50;
    /// Output encoded, packaging the result.
    pub const NEAR_COMPLETE: u8 = 90;
    pub const COMPLETE: u8 = 100;
}

/// Receiver for dispatcher checkpoints.
///
/// `Sync` so a sink can be shared with engine code across `.await` points.
pub trait ProgressSink: Sync {
    /// An informational line, optionally moving progress to `percent`.
    fn checkpoint(&self, percent: Option<u8>, message: &str);

    /// A warning line (capability gaps, skipped inputs).
    fn warning(&self, message: &str);
}

/// Sink that keeps lines in memory. Useful for calling the dispatcher directly.
#[derive(Debug, Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<String>>,
    last_percent: Mutex<Option<u8>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default()
    }

    pub fn last_percent(&self) -> Option<u8> {
        self.last_percent.lock().ok().and_then(|p| *p)
    }
}

impl ProgressSink for CollectingSink {
    fn checkpoint(&self, percent: Option<u8>, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(message.to_string());
        }
        if let (Some(p), Ok(mut last)) = (percent, self.last_percent.lock()) {
            *last = Some(p);
        }
    }

    fn warning(&self, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(format!("WARN: {message}"));
        }
    }
}

/// Called by the controller as a conversion moves through its lifecycle.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once the request passed validation and the session is `Running`.
    ///
    /// # Arguments
    /// * `category`  : category name, e.g. `"image"`
    /// * `operation` : operation or target extension, e.g. `"jpg"`, `"merge"`
    /// * `file_count`: number of input files
    fn on_conversion_start(&self, category: &str, operation: &str, file_count: usize) {
        let _ = (category, operation, file_count);
    }

    /// Called at each checkpoint that moves progress.
    fn on_progress(&self, percent: u8, message: &str) {
        let _ = (percent, message);
    }

    /// Called for every line appended to the activity log.
    fn on_log(&self, entry: &LogEntry) {
        let _ = entry;
    }

    /// Called when the conversion reached `Success`.
    fn on_conversion_complete(&self, result_count: usize) {
        let _ = result_count;
    }

    /// Called when the conversion reached `Error`.
    fn on_conversion_error(&self, message: &str) {
        let _ = message;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::convert::Converter;
    use crate::registry::{Category, Operation};
    use crate::request::InputFile;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingCallback {
        events: Mutex<Vec<String>>,
    }

    impl RecordingCallback {
        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn percents(&self) -> Vec<u8> {
            self.events()
                .iter()
                .filter_map(|e| e.strip_prefix("progress:"))
                .map(|p| p.parse().unwrap())
                .collect()
        }
    }

    impl ConversionProgressCallback for RecordingCallback {
        fn on_conversion_start(&self, category: &str, operation: &str, file_count: usize) {
            self.push(format!("start:{category}:{operation}:{file_count}"));
        }

        fn on_progress(&self, percent: u8, _message: &str) {
            self.push(format!("progress:{percent}"));
        }

        fn on_conversion_complete(&self, result_count: usize) {
            self.push(format!("complete:{result_count}"));
        }

        fn on_conversion_error(&self, _message: &str) {
            self.push("error".into());
        }
    }

    fn converter_with(cb: Arc<RecordingCallback>) -> Converter {
        let config = ConversionConfig::builder()
            .progress_callback(cb)
            .build()
            .unwrap();
        let converter = Converter::new(config);
        converter.select_category(Category::Document);
        converter
    }

    #[tokio::test]
    async fn converter_reports_start_progress_then_complete() {
        let cb = Arc::new(RecordingCallback::default());
        let converter = converter_with(cb.clone());
        converter.select_files(vec![InputFile::new("notes.md", b"# Notes".to_vec())]);
        converter.convert().await.unwrap();

        let events = cb.events();
        assert_eq!(events.first().map(String::as_str), Some("start:document:html:1"));
        assert_eq!(events.last().map(String::as_str), Some("complete:1"));
        assert!(!events.iter().any(|e| e == "error"));

        let percents = cb.percents();
        assert_eq!(percents.first(), Some(&checkpoint::STARTED));
        assert_eq!(percents.last(), Some(&checkpoint::COMPLETE));
        assert!(percents.contains(&checkpoint::MID_STAGE));
        assert!(percents.contains(&checkpoint::NEAR_COMPLETE));
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    }

    #[tokio::test]
    async fn converter_reports_error_last_on_engine_failure() {
        let cb = Arc::new(RecordingCallback::default());
        let converter = converter_with(cb.clone());
        converter.select_operation(Operation::from_extension("csv")).unwrap();
        converter.select_files(vec![InputFile::new("bad.json", b"{".to_vec())]);
        converter.convert().await.unwrap_err();

        let events = cb.events();
        assert!(events[0].starts_with("start:"));
        assert_eq!(events.last().map(String::as_str), Some("error"));
        assert!(!events.iter().any(|e| e.starts_with("complete")));
    }

    #[test]
    fn collecting_sink_tracks_lines_and_percent() {
        let sink = CollectingSink::new();
        sink.checkpoint(Some(checkpoint::STARTED), "Starting");
        sink.checkpoint(None, "Loaded a.pdf");
        sink.warning("no transcoder");
        assert_eq!(sink.lines().len(), 3);
        assert_eq!(sink.last_percent(), Some(10));
        assert!(sink.lines()[2].starts_with("WARN"));
    }
}
