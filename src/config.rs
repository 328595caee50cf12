//! Configuration types for the conversion pipeline.
//!
//! All tunable behaviour is controlled through [`ConversionConfig`], built via
//! [`ConversionConfigBuilder`]. The defaults reproduce the interactive
//! converter: an 80-line activity log, a 50-entry history ledger and JPEG
//! quality 92.

use crate::error::ConvertError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

/// Storage key under which the history ledger is persisted.
pub const DEFAULT_HISTORY_KEY: &str = "retro-history";

/// Configuration for a conversion session.
///
/// # Example
/// ```rust
/// use retroconverter::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .jpeg_quality(85)
///     .pacing_ms(100)
///     .build()
///     .unwrap();
/// assert_eq!(config.log_capacity, 80);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Maximum lines kept in the activity log. Default: 80.
    ///
    /// Older lines are dropped silently once the log is full.
    pub log_capacity: usize,

    /// Maximum records kept in the history ledger. Default: 50.
    pub history_capacity: usize,

    /// Key of the persisted ledger entry. Default: `retro-history`.
    pub history_key: String,

    /// Artificial delay awaited between progress checkpoints, in milliseconds.
    /// Default: 0.
    ///
    /// The CLI sets a small value so the progress bar is readable; tests leave
    /// it at zero.
    pub pacing_ms: u64,

    /// JPEG encoder quality, 1–100. Default: 92.
    pub jpeg_quality: u8,

    /// Receives progress, log and completion events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            log_capacity: 80,
            history_capacity: 50,
            history_key: DEFAULT_HISTORY_KEY.to_string(),
            pacing_ms: 0,
            jpeg_quality: 92,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("log_capacity", &self.log_capacity)
            .field("history_capacity", &self.history_capacity)
            .field("history_key", &self.history_key)
            .field("pacing_ms", &self.pacing_ms)
            .field("jpeg_quality", &self.jpeg_quality)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn log_capacity(mut self, n: usize) -> Self {
        self.config.log_capacity = n;
        self
    }

    pub fn history_capacity(mut self, n: usize) -> Self {
        self.config.history_capacity = n;
        self
    }

    pub fn history_key(mut self, key: impl Into<String>) -> Self {
        self.config.history_key = key.into();
        self
    }

    pub fn pacing_ms(mut self, ms: u64) -> Self {
        self.config.pacing_ms = ms;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if c.log_capacity == 0 {
            return Err(ConvertError::InvalidConfig(
                "Log capacity must be ≥ 1".into(),
            ));
        }
        if c.history_capacity == 0 {
            return Err(ConvertError::InvalidConfig(
                "History capacity must be ≥ 1".into(),
            ));
        }
        if c.history_key.trim().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "History key must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Page ranges ──────────────────────────────────────────────────────────

/// A 1-based inclusive page range for split. `to = None` means "to the last page".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageRange {
    pub from: u32,
    pub to: Option<u32>,
}

impl PageRange {
    pub fn new(from: u32, to: Option<u32>) -> Self {
        Self { from, to }
    }

    /// Clamp against a document of `total` pages.
    ///
    /// `from` is raised to at least 1 and `to` lowered to at most `total`.
    /// Returns `None` when the clamped range is empty or inverted; that is a
    /// zero-page result, not an error.
    pub fn clamp(&self, total: u32) -> Option<RangeInclusive<u32>> {
        let from = self.from.max(1);
        let to = self.to.unwrap_or(total).min(total);
        if to < from {
            None
        } else {
            Some(from..=to)
        }
    }

    /// Number of pages the clamped range selects.
    pub fn page_count(&self, total: u32) -> u32 {
        self.clamp(total).map(|r| r.end() - r.start() + 1).unwrap_or(0)
    }

    /// The 1-based page numbers the clamped range selects, in order.
    pub fn page_numbers(&self, total: u32) -> Vec<u32> {
        self.clamp(total).map(|r| r.collect()).unwrap_or_default()
    }

    /// The clamped bounds `(from, to)` as they appear in the output name,
    /// even when the range is inverted.
    pub fn clamped_bounds(&self, total: u32) -> (u32, u32) {
        (self.from.max(1), self.to.unwrap_or(total).min(total))
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to {
            Some(to) => write!(f, "{}-{}", self.from, to),
            None => write!(f, "{}-end", self.from),
        }
    }
}

impl FromStr for PageRange {
    type Err = String;

    /// Accepts `all`, `N`, `A-B`, `A-` and `A-end`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "all" {
            return Ok(PageRange::new(1, None));
        }

        let parse = |v: &str, what: &str| -> Result<u32, String> {
            v.trim()
                .parse::<u32>()
                .map_err(|_| format!("Invalid {what} page '{}'", v.trim()))
        };

        if let Some((from, to)) = s.split_once('-') {
            let from = parse(from, "start")?;
            let to = match to.trim() {
                "" | "end" => None,
                v => Some(parse(v, "end")?),
            };
            return Ok(PageRange::new(from, to));
        }

        let page = parse(&s, "single")?;
        Ok(PageRange::new(page, Some(page)))
    }
}
