//! Session state: selection, lifecycle status, activity log and results.
//!
//! A [`Session`] is an explicit state object. Every user action is a method
//! that performs one transition; none of them touch the file system, the clock
//! aside, or any engine. The controller in [`crate::convert`] drives it.
//!
//! ```text
//!            start_conversion          conversion_succeeded
//!   Idle ───────────────────▶ Running ─────────────────────▶ Success
//!    ▲                          │  conversion_failed / conversion_abandoned
//!    │            reset         └─────────────────────────▶ Error
//!    └──────────────────────── (any state)
//! ```
//!
//! Each start is tagged with an [`AttemptId`]. A reset or category change
//! while running supersedes the attempt: its terminal transition becomes a
//! no-op and any results it brings are released unseen.

use crate::config::PageRange;
use crate::error::ConvertError;
use crate::output::{ConversionResult, ResultSet};
use crate::progress::checkpoint;
use crate::registry::{formats_for, Category, Operation};
use crate::request::{ConversionRequest, InputFile};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

// ── Activity log ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One timestamped line of the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub time: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.level {
            LogLevel::Info => "",
            LogLevel::Warning => "⚠ ",
            LogLevel::Error => "✖ ERROR: ",
        };
        write!(f, "[{}] {}{}", self.time.format("%H:%M:%S"), prefix, self.message)
    }
}

/// Append-only log that silently drops its oldest lines beyond `capacity`.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line stamped with the current local time; returns a copy of it.
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry {
            time: Local::now(),
            level,
            message: message.into(),
        };
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        entry
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────────

/// Lifecycle of the current conversion attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ConversionStatus {
    #[default]
    Idle,
    Running { progress: u8 },
    Success,
    Error { message: String },
}

impl ConversionStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ConversionStatus::Running { .. })
    }

    pub fn progress(&self) -> u8 {
        match self {
            ConversionStatus::Running { progress } => *progress,
            ConversionStatus::Success => checkpoint::COMPLETE,
            ConversionStatus::Idle | ConversionStatus::Error { .. } => 0,
        }
    }
}

/// Identifies one `start_conversion` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptId(u64);

/// The whole converter UI state, owned by one controller.
#[derive(Debug)]
pub struct Session {
    category: Category,
    operation: Operation,
    files: Vec<InputFile>,
    page_range: Option<PageRange>,
    status: ConversionStatus,
    log: ActivityLog,
    results: ResultSet,
    attempts: u64,
    active: Option<AttemptId>,
}

impl Session {
    pub fn new(log_capacity: usize) -> Self {
        let category = Category::default();
        Self {
            category,
            operation: category.default_operation(),
            files: Vec::new(),
            page_range: None,
            status: ConversionStatus::Idle,
            log: ActivityLog::new(log_capacity),
            results: ResultSet::default(),
            attempts: 0,
            active: None,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn files(&self) -> &[InputFile] {
        &self.files
    }

    pub fn page_range(&self) -> Option<PageRange> {
        self.page_range
    }

    pub fn status(&self) -> &ConversionStatus {
        &self.status
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    /// The running attempt, if any.
    pub fn active_attempt(&self) -> Option<AttemptId> {
        self.active
    }

    /// Take ownership of the terminal transition for `attempt`.
    fn finish(&mut self, attempt: AttemptId) -> bool {
        if self.active == Some(attempt) && self.status.is_running() {
            self.active = None;
            true
        } else {
            false
        }
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// Switch category: default operation, empty selection, no results, empty log.
    pub fn select_category(&mut self, category: Category) {
        self.category = category;
        self.operation = category.default_operation();
        self.files.clear();
        self.page_range = None;
        self.results.clear();
        self.log.clear();
        self.status = ConversionStatus::Idle;
        self.active = None;
    }

    /// Choose an output operation offered by the current category.
    pub fn select_operation(&mut self, operation: Operation) -> Result<(), ConvertError> {
        if !formats_for(self.category).supports(&operation) {
            return Err(ConvertError::UnsupportedOperation {
                category: self.category.to_string(),
                operation: operation.to_string(),
            });
        }
        self.operation = operation;
        Ok(())
    }

    /// Replace the selection. Single-file categories keep only the first file,
    /// as their picker would.
    pub fn select_files(&mut self, mut files: Vec<InputFile>) {
        if !formats_for(self.category).multi_file {
            files.truncate(1);
        }
        self.files = files;
    }

    pub fn set_page_range(&mut self, range: Option<PageRange>) {
        self.page_range = range;
    }

    /// Validate the selection and enter `Running`.
    ///
    /// On a validation failure the session records the message as `Error`
    /// with a single log line and the conversion never starts. A session that
    /// is already running rejects the start with [`ConvertError::Busy`] and is
    /// left untouched.
    pub fn start_conversion(
        &mut self,
    ) -> Result<(AttemptId, ConversionRequest, LogEntry), ConvertError> {
        if self.status.is_running() {
            return Err(ConvertError::Busy);
        }

        let mut request =
            ConversionRequest::new(self.category, self.operation.clone(), self.files.clone());
        if let Some(range) = self.page_range {
            request = request.with_page_range(range);
        }

        if let Err(e) = request.validate() {
            self.results.clear();
            self.log.clear();
            self.log.push(LogLevel::Error, format!("{}: {}", e.family(), e));
            self.status = ConversionStatus::Error {
                message: e.to_string(),
            };
            return Err(e);
        }

        self.results.clear();
        self.log.clear();
        self.status = ConversionStatus::Running {
            progress: checkpoint::STARTED,
        };
        self.attempts += 1;
        let attempt = AttemptId(self.attempts);
        self.active = Some(attempt);
        let entry = self.log.push(
            LogLevel::Info,
            format!(
                "Selected {} ({} file{}) → {}",
                request.input_summary(),
                request.inputs.len(),
                if request.inputs.len() == 1 { "" } else { "s" },
                request.operation
            ),
        );
        Ok((attempt, request, entry))
    }

    /// Record a checkpoint. Progress never moves backwards; ignored unless running.
    pub fn conversion_progressed(&mut self, percent: Option<u8>, message: &str) -> Option<LogEntry> {
        let ConversionStatus::Running { progress } = &mut self.status else {
            return None;
        };
        if let Some(p) = percent {
            *progress = (*progress).max(p.min(checkpoint::COMPLETE));
        }
        Some(self.log.push(LogLevel::Info, message))
    }

    /// Append a warning line while running.
    pub fn conversion_warned(&mut self, message: &str) -> Option<LogEntry> {
        if !self.status.is_running() {
            return None;
        }
        Some(self.log.push(LogLevel::Warning, message))
    }

    /// Install the new result set (releasing the previous one) and enter `Success`.
    ///
    /// Returns `None` and releases `results` when `attempt` is no longer the
    /// running one.
    pub fn conversion_succeeded(
        &mut self,
        attempt: AttemptId,
        results: Vec<ConversionResult>,
    ) -> Option<LogEntry> {
        if !self.finish(attempt) {
            results.into_iter().for_each(ConversionResult::release);
            return None;
        }
        let count = results.len();
        self.results.replace(results);
        self.status = ConversionStatus::Success;
        Some(self.log.push(
            LogLevel::Info,
            format!(
                "Conversion complete: {count} result{}",
                if count == 1 { "" } else { "s" }
            ),
        ))
    }

    /// Enter `Error` with a distinct log line; progress drops to 0.
    pub fn conversion_failed(&mut self, attempt: AttemptId, error: &ConvertError) -> Option<LogEntry> {
        if !self.finish(attempt) {
            return None;
        }
        self.status = ConversionStatus::Error {
            message: error.to_string(),
        };
        Some(
            self.log
                .push(LogLevel::Error, format!("{}: {}", error.family(), error)),
        )
    }

    /// The attempt stopped without reaching a result (its future was dropped).
    pub fn conversion_abandoned(&mut self, attempt: AttemptId) -> Option<LogEntry> {
        self.conversion_failed(attempt, &ConvertError::Cancelled)
    }

    /// Back to `Idle`: clears log, results and progress. Keeps the selection.
    pub fn reset(&mut self) {
        self.results.clear();
        self.log.clear();
        self.status = ConversionStatus::Idle;
        self.active = None;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(80)
    }
}
