//! The conversion controller.
//!
//! [`Converter`] owns the [`Session`], the dispatcher, the history ledger and
//! the object-handle tracker. All methods take `&self`, so a host can share
//! one converter between its UI and a running conversion. Only one conversion
//! runs at a time: a second [`Converter::convert`] while one is in flight is
//! rejected with [`ConvertError::Busy`] and leaves the running one untouched.
//!
//! ```text
//! convert()
//!   ├─ busy guard            (cleared on every exit path)
//!   ├─ session.start_conversion   → Running 10%  | Error (validation)
//!   ├─ dispatcher.dispatch        → checkpoints into the session log
//!   ├─ session.conversion_succeeded / conversion_failed
//!   └─ history.record        (one entry per result, failures only logged)
//! ```
//!
//! A reset or category change during the run supersedes it: the late results
//! are released without being shown or recorded. Dropping the `convert()`
//! future moves a still-running session to `Error`, so the next start is
//! accepted.

use crate::config::{ConversionConfig, PageRange};
use crate::dispatch::Dispatcher;
use crate::error::{ConvertError, ValidationError};
use crate::history::{HistoryLedger, NewHistoryEntry};
use crate::output::{ConversionResult, ResultSummary};
use crate::pipeline::editor::ImageEditor;
use crate::progress::{checkpoint, ProgressCallback, ProgressSink};
use crate::registry::{Category, Operation};
use crate::request::InputFile;
use crate::resource::ResourceTracker;
use crate::state::{AttemptId, ConversionStatus, LogEntry, Session};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Cleared on drop, so a failed or panicking conversion never leaves the
/// converter stuck in the busy state.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Marks the attempt abandoned if the conversion future is dropped before it
/// reaches a terminal transition.
struct AttemptGuard<'a> {
    session: &'a Mutex<Session>,
    attempt: AttemptId,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.conversion_abandoned(self.attempt).is_some() {
            warn!("Conversion dropped before completion");
        }
    }
}

/// Forwards dispatcher checkpoints into the session and the host callback.
struct SessionSink<'a> {
    session: &'a Mutex<Session>,
    callback: Option<&'a ProgressCallback>,
}

impl SessionSink<'_> {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressSink for SessionSink<'_> {
    fn checkpoint(&self, percent: Option<u8>, message: &str) {
        let (entry, progress) = {
            let mut session = self.lock();
            let entry = session.conversion_progressed(percent, message);
            (entry, session.status().progress())
        };
        if let (Some(cb), Some(entry)) = (self.callback, entry) {
            cb.on_log(&entry);
            if percent.is_some() {
                cb.on_progress(progress, message);
            }
        }
    }

    fn warning(&self, message: &str) {
        let entry = self.lock().conversion_warned(message);
        if let (Some(cb), Some(entry)) = (self.callback, entry) {
            cb.on_log(&entry);
        }
    }
}

/// Drives conversions for one user session.
pub struct Converter {
    config: ConversionConfig,
    session: Mutex<Session>,
    busy: AtomicBool,
    dispatcher: Dispatcher,
    history: HistoryLedger,
    tracker: ResourceTracker,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .field("busy", &self.is_busy())
            .field("history", &self.history)
            .field("live_handles", &self.tracker.live())
            .finish()
    }
}

impl Converter {
    /// A converter whose history lives in memory only.
    pub fn new(config: ConversionConfig) -> Self {
        let history = HistoryLedger::in_memory(config.history_key.clone(), config.history_capacity);
        Self::with_history(config, history)
    }

    pub fn with_history(config: ConversionConfig, history: HistoryLedger) -> Self {
        Self {
            session: Mutex::new(Session::new(config.log_capacity)),
            busy: AtomicBool::new(false),
            dispatcher: Dispatcher::new(&config),
            history,
            tracker: ResourceTracker::new(),
            config,
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callback(&self) -> Option<&ProgressCallback> {
        self.config.progress_callback.as_ref()
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn history(&self) -> &HistoryLedger {
        &self.history
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Object handles currently held by results.
    pub fn live_handles(&self) -> usize {
        self.tracker.live()
    }

    // ── Selection ────────────────────────────────────────────────────────

    pub fn select_category(&self, category: Category) {
        self.session().select_category(category);
    }

    pub fn select_operation(&self, operation: Operation) -> Result<(), ConvertError> {
        self.session().select_operation(operation)
    }

    pub fn select_files(&self, files: Vec<InputFile>) {
        self.session().select_files(files);
    }

    pub fn set_page_range(&self, range: Option<PageRange>) {
        self.session().set_page_range(range);
    }

    /// Back to idle, keeping the selection.
    pub fn reset(&self) {
        self.session().reset();
    }

    // ── Observation ──────────────────────────────────────────────────────

    pub fn status(&self) -> ConversionStatus {
        self.session().status().clone()
    }

    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.session().log().iter().cloned().collect()
    }

    /// Run `f` against the current session under its lock.
    pub fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        f(&self.session())
    }

    /// Run `f` against the current results without copying their payloads.
    pub fn with_results<R>(&self, f: impl FnOnce(&[ConversionResult]) -> R) -> R {
        f(self.session().results().as_slice())
    }

    pub fn result_summaries(&self) -> Vec<ResultSummary> {
        self.with_results(|results| results.iter().map(ConversionResult::summary).collect())
    }

    /// "Download all": write every current result into `dir`.
    pub fn save_results(&self, dir: &Path) -> Result<Vec<PathBuf>, ConvertError> {
        self.session().results().save_all(dir)
    }

    /// Open the selected image in the editor.
    pub fn open_editor(&self) -> Result<ImageEditor, ConvertError> {
        let session = self.session();
        if session.category() != Category::Image {
            return Err(ConvertError::UnsupportedOperation {
                category: session.category().to_string(),
                operation: "edit".to_string(),
            });
        }
        let file = session
            .files()
            .first()
            .ok_or(ConvertError::Validation(ValidationError::NoFile))?;
        ImageEditor::open(file)
    }

    // ── Conversion ───────────────────────────────────────────────────────

    /// Convert the current selection.
    ///
    /// Returns summaries of the new results. Every outcome is also reflected
    /// in the session: status, activity log and result set.
    pub async fn convert(&self) -> Result<Vec<ResultSummary>, ConvertError> {
        let _busy = BusyGuard::acquire(&self.busy).ok_or(ConvertError::Busy)?;
        let callback = self.callback();

        let started = self.session().start_conversion();
        let (attempt, request, entry) = match started {
            Ok(started) => started,
            Err(e) => {
                if let Some(cb) = callback {
                    let last = self.session().log().iter().last().cloned();
                    if let Some(entry) = last {
                        cb.on_log(&entry);
                    }
                    cb.on_conversion_error(&e.to_string());
                }
                return Err(e);
            }
        };

        let _attempt = AttemptGuard {
            session: &self.session,
            attempt,
        };
        let category = request.category;
        let operation = request.operation.to_string();
        let inputs = request.input_summary();
        info!("Converting {inputs} ({category} → {operation})");
        if let Some(cb) = callback {
            cb.on_conversion_start(category.as_str(), &operation, request.inputs.len());
            cb.on_log(&entry);
            cb.on_progress(checkpoint::STARTED, &entry.message);
        }

        let sink = SessionSink {
            session: &self.session,
            callback,
        };
        let outcome = self.dispatcher.dispatch(request, &sink).await;

        match outcome {
            Ok(artifacts) => {
                let results: Vec<ConversionResult> = artifacts
                    .into_iter()
                    .map(|a| ConversionResult::attach(a, &self.tracker))
                    .collect();
                let summaries: Vec<ResultSummary> =
                    results.iter().map(ConversionResult::summary).collect();
                let history: Vec<NewHistoryEntry> = results
                    .iter()
                    .map(|r| NewHistoryEntry {
                        category,
                        inputs: inputs.clone(),
                        output: r.name.clone(),
                        size_kb: r.size_kb(),
                        operation: operation.clone(),
                    })
                    .collect();

                let finished = self.session().conversion_succeeded(attempt, results);
                let Some(entry) = finished else {
                    info!("Discarding results of a superseded conversion");
                    if let Some(cb) = callback {
                        cb.on_conversion_error(&ConvertError::Superseded.to_string());
                    }
                    return Err(ConvertError::Superseded);
                };
                if let Some(cb) = callback {
                    cb.on_log(&entry);
                    cb.on_progress(checkpoint::COMPLETE, &entry.message);
                    cb.on_conversion_complete(summaries.len());
                }

                for record in history {
                    if let Err(e) = self.history.record(record) {
                        warn!("Could not record history: {}", e);
                    }
                }
                info!("Conversion succeeded with {} result(s)", summaries.len());
                Ok(summaries)
            }
            Err(e) => {
                let entry = self.session().conversion_failed(attempt, &e);
                warn!("Conversion failed: {}", e);
                if let Some(cb) = callback {
                    if let Some(entry) = &entry {
                        cb.on_log(entry);
                    }
                    cb.on_conversion_error(&e.to_string());
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::KeyValueStore;
    use crate::pipeline::pdf::tests::fixture_pdf;
    use crate::progress::ConversionProgressCallback;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn pdf(name: &str, pages: u32) -> InputFile {
        InputFile::new(name, fixture_pdf(pages, 0, false))
    }

    #[derive(Default)]
    struct Counting {
        logs: AtomicUsize,
        errors: AtomicUsize,
        completes: AtomicUsize,
    }

    impl ConversionProgressCallback for Counting {
        fn on_log(&self, _entry: &LogEntry) {
            self.logs.fetch_add(1, Ordering::SeqCst);
        }
        fn on_conversion_complete(&self, _n: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
        fn on_conversion_error(&self, _m: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn merge_success_updates_session_and_history() {
        let cb = Arc::new(Counting::default());
        let config = ConversionConfig::builder()
            .progress_callback(cb.clone())
            .build()
            .unwrap();
        let converter = Converter::new(config);
        converter.select_category(Category::Pdf);
        converter.select_operation(Operation::Merge).unwrap();
        converter.select_files(vec![pdf("a.pdf", 2), pdf("b.pdf", 1)]);

        let out = converter.convert().await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "merged.pdf");
        assert_eq!(converter.status(), ConversionStatus::Success);
        assert_eq!(converter.live_handles(), 1);
        assert!(!converter.is_busy());

        let history = converter.history().load();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].inputs, "a.pdf, b.pdf");
        assert_eq!(history[0].operation, "merge");

        assert_eq!(cb.completes.load(Ordering::SeqCst), 1);
        assert!(cb.logs.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn validation_failure_is_reported_once() {
        let cb = Arc::new(Counting::default());
        let config = ConversionConfig::builder()
            .progress_callback(cb.clone())
            .build()
            .unwrap();
        let converter = Converter::new(config);
        let err = converter.convert().await.unwrap_err();
        assert_eq!(err.family(), "ValidationError");
        assert!(matches!(converter.status(), ConversionStatus::Error { .. }));
        assert_eq!(converter.log_entries().len(), 1);
        assert_eq!(cb.errors.load(Ordering::SeqCst), 1);
        assert!(!converter.is_busy());
    }

    #[tokio::test]
    async fn engine_failure_clears_busy_and_keeps_history() {
        let converter = Converter::new(ConversionConfig::default());
        converter.select_category(Category::Document);
        converter.select_operation(Operation::from_extension("csv")).unwrap();
        converter.select_files(vec![InputFile::new("bad.json", b"{oops".to_vec())]);

        let err = converter.convert().await.unwrap_err();
        assert!(err.to_string().starts_with("parse-failed"));
        assert!(!converter.is_busy());
        assert!(converter.history().load().is_empty());
        let last = converter.log_entries().pop().unwrap();
        assert!(last.to_string().contains("ERROR: DecodeError"));
    }

    #[tokio::test]
    async fn new_results_release_old_handles() {
        let converter = Converter::new(ConversionConfig::default());
        converter.select_category(Category::Document);
        converter.select_operation(Operation::from_extension("html")).unwrap();
        converter.select_files(vec![InputFile::new("n.md", b"# hi".to_vec())]);
        converter.convert().await.unwrap();
        converter.convert().await.unwrap();
        assert_eq!(converter.live_handles(), 1);
        converter.select_category(Category::Audio);
        assert_eq!(converter.live_handles(), 0);
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, ConvertError> {
            Ok(None)
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), ConvertError> {
            Err(ConvertError::Storage("quota exceeded".into()))
        }
    }

    #[tokio::test]
    async fn history_write_failure_does_not_fail_the_conversion() {
        let history = HistoryLedger::new(Arc::new(FailingStore), "retro-history", 50);
        let converter = Converter::with_history(ConversionConfig::default(), history);
        converter.select_category(Category::Audio);
        converter.select_files(vec![InputFile::new("a.wav", vec![1, 2])]);
        assert!(converter.convert().await.is_ok());
        assert_eq!(converter.status(), ConversionStatus::Success);
    }

    fn paced_document_converter(pacing_ms: u64) -> Converter {
        let config = ConversionConfig::builder().pacing_ms(pacing_ms).build().unwrap();
        let converter = Converter::new(config);
        converter.select_category(Category::Document);
        converter.select_files(vec![InputFile::new("a.md", b"# a".to_vec())]);
        converter
    }

    #[tokio::test]
    async fn dropped_conversion_does_not_leave_the_session_running() {
        let converter = paced_document_converter(200);
        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(20), converter.convert()).await;
        assert!(timed_out.is_err());

        assert!(!converter.is_busy());
        assert!(matches!(converter.status(), ConversionStatus::Error { .. }));
        let last = converter.log_entries().pop().unwrap();
        assert!(last.message.starts_with("CancelledError"), "{last}");

        let out = converter.convert().await.unwrap();
        assert_eq!(out[0].name, "a.html");
        assert_eq!(converter.status(), ConversionStatus::Success);
    }

    #[tokio::test]
    async fn category_change_mid_flight_discards_results() {
        let converter = paced_document_converter(60);
        let (outcome, ()) = tokio::join!(converter.convert(), async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            converter.select_category(Category::Audio);
        });

        assert!(matches!(outcome, Err(ConvertError::Superseded)));
        assert_eq!(converter.status(), ConversionStatus::Idle);
        converter.with_session(|s| {
            assert_eq!(s.category(), Category::Audio);
            assert!(s.results().is_empty());
            assert!(s.log().is_empty());
        });
        assert_eq!(converter.live_handles(), 0);
        assert!(converter.history().load().is_empty());
        assert!(!converter.is_busy());
    }

    #[tokio::test]
    async fn reset_mid_flight_discards_results() {
        let converter = paced_document_converter(60);
        let (outcome, ()) = tokio::join!(converter.convert(), async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            converter.reset();
        });

        assert!(matches!(outcome, Err(ConvertError::Superseded)));
        assert_eq!(converter.status(), ConversionStatus::Idle);
        assert_eq!(converter.live_handles(), 0);
        assert!(converter.history().load().is_empty());
        // The selection survives a reset, so the next run goes through.
        assert!(converter.convert().await.is_ok());
    }

    #[test]
    fn default_history_uses_the_configured_key() {
        let config = ConversionConfig::builder()
            .history_key("my-ledger")
            .history_capacity(7)
            .build()
            .unwrap();
        let converter = Converter::new(config);
        assert_eq!(converter.history().key(), "my-ledger");
        assert_eq!(converter.history().capacity(), 7);
    }

    #[test]
    fn busy_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let first = BusyGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(BusyGuard::acquire(&flag).is_none());
        drop(first);
        assert!(BusyGuard::acquire(&flag).is_some());
    }

    #[test]
    fn editor_needs_an_image_selection() {
        let converter = Converter::new(ConversionConfig::default());
        assert!(matches!(
            converter.open_editor(),
            Err(ConvertError::Validation(ValidationError::NoFile))
        ));
        converter.select_category(Category::Pdf);
        assert!(matches!(
            converter.open_editor(),
            Err(ConvertError::UnsupportedOperation { .. })
        ));
    }
}
