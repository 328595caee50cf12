//! CLI binary for retroconverter.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! [`Converter`] session and prints results.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use retroconverter::{
    formats_for, Category, ConversionConfig, ConversionProgressCallback, Converter, FileStore,
    HistoryLedger, ImageEditor, InputFile, LogEntry, LogLevel, Operation, PageRange,
    ProgressCallback, Rotation,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a percentage bar plus the activity log printed
/// above it as lines arrive.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, category: &str, operation: &str, file_count: usize) {
        self.bar.set_prefix("Converting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "{category} → {operation} ({file_count} file{})",
                if file_count == 1 { "" } else { "s" }
            ))
        ));
    }

    fn on_progress(&self, percent: u8, message: &str) {
        self.bar.set_position(percent as u64);
        self.bar.set_message(message.to_string());
    }

    fn on_log(&self, entry: &LogEntry) {
        let line = entry.to_string();
        let line = match entry.level {
            LogLevel::Info => dim(&line),
            LogLevel::Warning => yellow(&line),
            LogLevel::Error => red(&line),
        };
        self.bar.println(format!("  {line}"));
    }

    fn on_conversion_complete(&self, result_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} result{} ready",
            green("✔"),
            bold(&result_count.to_string()),
            if result_count == 1 { "" } else { "s" }
        );
    }

    fn on_conversion_error(&self, message: &str) {
        self.bar.abandon();
        eprintln!("{} {}", red("✘"), red(message));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # List categories and their operations
  retroconv formats

  # Re-encode an image
  retroconv convert image photo.png --to jpg -o out/

  # Place an image on a PDF page
  retroconv convert image scan.jpg --to pdf

  # Merge PDFs in the given order
  retroconv convert pdf a.pdf b.pdf c.pdf --to merge

  # Extract pages 3 to 7
  retroconv convert pdf report.pdf --to split --pages 3-7

  # Markdown-like text to HTML, CSV to JSON
  retroconv convert document notes.md --to html
  retroconv convert document table.csv --to json

  # Edit an image: brighter, rotated a quarter turn, mirrored
  retroconv edit photo.jpg --brightness 130 --rotate 90 --flip-h -o out/

  # Show or clear the conversion history
  retroconv history
  retroconv history --clear

PAGE RANGES (--pages):
  all     every page
  5       a single page
  3-7     pages 3 to 7 (clamped to the document)
  4-      page 4 to the end

ENVIRONMENT VARIABLES:
  RETROCONV_OUTPUT_DIR    Default output directory
  RETROCONV_HISTORY_DIR   Where the history ledger is stored
  RETROCONV_PACING_MS     Delay between progress checkpoints
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Convert images, PDFs, documents and audio files locally.
#[derive(Parser, Debug)]
#[command(
    name = "retroconv",
    version,
    about = "Convert images, PDFs, documents and audio files locally",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RETROCONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "RETROCONV_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "RETROCONV_NO_PROGRESS")]
    no_progress: bool,

    /// Directory holding the history ledger.
    #[arg(long, global = true, env = "RETROCONV_HISTORY_DIR")]
    history_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List categories, accepted inputs and operations.
    Formats,

    /// Convert one or more files.
    Convert {
        /// image, pdf, document or audio.
        category: Category,

        /// Input files, in order.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Target format or operation (jpg, pdf, merge, split, html, ...).
        /// Defaults to the category's first operation.
        #[arg(short = 't', long = "to")]
        operation: Option<Operation>,

        /// Page range for split: all, 5, 3-7, 4-.
        #[arg(long)]
        pages: Option<PageRange>,

        /// Output directory.
        #[arg(short, long, env = "RETROCONV_OUTPUT_DIR", default_value = ".")]
        output: PathBuf,

        /// JPEG quality (1-100).
        #[arg(long, default_value_t = 92,
              value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: u8,

        /// Delay between progress checkpoints, in milliseconds.
        #[arg(long, env = "RETROCONV_PACING_MS", default_value_t = 150)]
        pacing_ms: u64,

        /// Print result summaries as JSON.
        #[arg(long)]
        json: bool,

        /// Do not record this conversion in the history ledger.
        #[arg(long)]
        no_history: bool,
    },

    /// Adjust an image and export it as PNG.
    Edit {
        /// Image to edit.
        input: PathBuf,

        /// Brightness percent (0-200, 100 = unchanged).
        #[arg(long, default_value_t = 100)]
        brightness: u16,

        /// Contrast percent (0-200, 100 = unchanged).
        #[arg(long, default_value_t = 100)]
        contrast: u16,

        /// Saturation percent (0-200, 100 = unchanged).
        #[arg(long, default_value_t = 100)]
        saturation: u16,

        /// Clockwise rotation in degrees, a multiple of 90.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        rotate: i32,

        /// Mirror left-right.
        #[arg(long)]
        flip_h: bool,

        /// Mirror top-bottom.
        #[arg(long)]
        flip_v: bool,

        /// Output width in pixels, before rotation.
        #[arg(long)]
        width: Option<u32>,

        /// Output height in pixels, before rotation.
        #[arg(long)]
        height: Option<u32>,

        /// Output directory.
        #[arg(short, long, env = "RETROCONV_OUTPUT_DIR", default_value = ".")]
        output: PathBuf,
    },

    /// Show the conversion history, newest first.
    History {
        /// Remove every record.
        #[arg(long)]
        clear: bool,

        /// Print records as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs would interleave with the progress bar, which already
    // shows the activity log.
    let json_output = matches!(
        cli.command,
        Command::Convert { json: true, .. } | Command::History { json: true, .. }
    );
    let show_progress = !cli.quiet && !cli.no_progress && !json_output;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let history_dir = cli
        .history_dir
        .clone()
        .or_else(|| dirs::data_dir().map(|d| d.join("retroconverter")))
        .context("No data directory available; pass --history-dir")?;
    let history_store = Arc::new(FileStore::new(history_dir));

    match cli.command {
        Command::Formats => print_formats(),

        Command::History { clear, json } => {
            let ledger = HistoryLedger::new(
                history_store,
                retroconverter::config::DEFAULT_HISTORY_KEY,
                ConversionConfig::default().history_capacity,
            );
            if clear {
                ledger.clear().context("Failed to clear history")?;
                if !cli.quiet {
                    eprintln!("{} history cleared", green("✔"));
                }
                return Ok(());
            }

            let records = ledger.load();
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&records).context("Failed to serialise history")?
                );
            } else if records.is_empty() {
                println!("{}", dim("No conversions yet."));
            } else {
                for r in &records {
                    println!(
                        "{}  {:<8} {:<6} {} → {}  {}",
                        dim(&r.time),
                        r.category,
                        r.operation,
                        r.inputs,
                        bold(&r.output),
                        dim(&format!("{:.1} KB", r.size_kb)),
                    );
                }
            }
        }

        Command::Convert {
            category,
            inputs,
            operation,
            pages,
            output,
            quality,
            pacing_ms,
            json,
            no_history,
        } => {
            let progress_cb: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
            } else {
                None
            };

            let mut builder = ConversionConfig::builder()
                .jpeg_quality(quality)
                .pacing_ms(pacing_ms);
            if let Some(cb) = progress_cb {
                builder = builder.progress_callback(cb);
            }
            let config = builder.build().context("Invalid configuration")?;

            let converter = if no_history {
                Converter::new(config)
            } else {
                let ledger = HistoryLedger::new(
                    history_store,
                    config.history_key.clone(),
                    config.history_capacity,
                );
                Converter::with_history(config, ledger)
            };

            check_accepted(category, &inputs)?;
            let files = InputFile::from_paths(&inputs)
                .await
                .context("Failed to read input files")?;
            if !formats_for(category).multi_file && files.len() > 1 {
                bail!(
                    "{category} accepts a single file, got {}; run one conversion per file",
                    files.len()
                );
            }

            converter.select_category(category);
            if let Some(op) = operation {
                converter
                    .select_operation(op)
                    .with_context(|| format!("Operations for {category}: {}", operation_list(category)))?;
            }
            converter.select_files(files);
            converter.set_page_range(pages);

            let summaries = converter.convert().await.context("Conversion failed")?;
            let saved = converter
                .save_results(&output)
                .with_context(|| format!("Failed to write results to {}", output.display()))?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&summaries).context("Failed to serialise results")?
                );
            } else if !cli.quiet {
                for (summary, path) in summaries.iter().zip(&saved) {
                    eprintln!(
                        "   {}  {}  {}",
                        bold(&path.display().to_string()),
                        dim(summary.mime.as_str()),
                        dim(&format!("{} bytes", summary.size)),
                    );
                }
            }
        }

        Command::Edit {
            input,
            brightness,
            contrast,
            saturation,
            rotate,
            flip_h,
            flip_v,
            width,
            height,
            output,
        } => {
            let Some(rotation) = Rotation::from_degrees(rotate) else {
                bail!("--rotate must be a multiple of 90 (got {rotate})");
            };
            check_accepted(Category::Image, std::slice::from_ref(&input))?;
            let file = InputFile::from_path(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;

            let mut editor = ImageEditor::open(&file).context("Failed to open image")?;
            editor.adjust(|s| {
                s.set_brightness(brightness);
                s.set_contrast(contrast);
                s.set_saturation(saturation);
                s.set_rotation(rotation);
                if flip_h {
                    s.toggle_flip_horizontal();
                }
                if flip_v {
                    s.toggle_flip_vertical();
                }
                s.set_size(width, height);
            });

            let artifact = editor.export().context("Failed to export image")?;
            let path = artifact
                .save_to(&output)
                .with_context(|| format!("Failed to write to {}", output.display()))?;
            if !cli.quiet {
                let (w, h) = editor.canvas_dimensions();
                eprintln!(
                    "{}  {}  {}",
                    green("✔"),
                    bold(&path.display().to_string()),
                    dim(&format!("{w}x{h}")),
                );
            }
        }
    }

    Ok(())
}

/// Refuse inputs the category's file filter would not have offered.
fn check_accepted(category: Category, inputs: &[PathBuf]) -> Result<()> {
    let spec = formats_for(category);
    let names: Vec<String> = inputs
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect();
    let rejected = spec.rejected(names.iter().map(String::as_str));
    if !rejected.is_empty() {
        bail!(
            "{category} accepts {} files; not accepted: {}",
            spec.extensions.join(", "),
            rejected.join(", ")
        );
    }
    Ok(())
}

fn operation_list(category: Category) -> String {
    formats_for(category)
        .operations()
        .iter()
        .map(|op| op.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_formats() {
    for category in Category::ALL {
        let spec = formats_for(category);
        println!(
            "{}  {}",
            bold(&format!("{:<9}", category)),
            dim(spec.description)
        );
        println!("   inputs:     {}", spec.extensions.join(", "));
        println!("   operations: {}", operation_list(category));
        if spec.multi_file {
            println!("   {}", cyan("accepts several files"));
        }
    }
}
