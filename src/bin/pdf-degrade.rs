//! CLI binary for pdf-degrade.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `DegradationParameters`, shows progress and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::{self, BoxFuture, FutureExt};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_degrade::{
    degrade, DegradationParameters, HistoryEntry, HistoryLedger, JsonlLedger, PipelineOptions,
    ProgressCallback, ProgressEvent, ProgressSink, RateLimitedReporter, ReporterError,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress sink using indicatif ────────────────────────────────────────

/// Terminal progress sink: a spinner until the first page lands, then a bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Degrading");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  {msg}  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
    }
}

impl ProgressSink for CliProgress {
    fn on_progress(&self, event: ProgressEvent) -> BoxFuture<'_, Result<(), ReporterError>> {
        if self.bar.length() != Some(event.total_pages as u64) {
            self.activate_bar(event.total_pages);
        }
        self.bar.set_position(event.current_page as u64);
        self.bar.set_message(format!("{:>3}%", event.percent_complete));
        if event.is_final() {
            self.bar.finish_and_clear();
        }
        future::ready(Ok(())).boxed()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Default look (light blur, mild noise, JPEG q50 at 150 DPI)
  pdf-degrade report.pdf

  # Heavy photocopy: crooked, noisy, blocky
  pdf-degrade --blur 3 --skew -4 --noise 25 --quality 20 report.pdf -o bad.pdf

  # Reproducible output
  pdf-degrade --seed 42 report.pdf

  # Load parameters from a settings file and keep a processing history
  pdf-degrade --settings look.json --history ~/.pdf-degrade/history.jsonl report.pdf

  # Show history totals
  pdf-degrade --stats --history ~/.pdf-degrade/history.jsonl

PARAMETER RANGES (out-of-range values are clamped):
  --blur     0–20     Gaussian blur strength, 0 = off
  --skew     -45–45   rotation in degrees, positive = counter-clockwise
  --noise    0–50     noise standard deviation, 0 = off
  --quality  10–100   JPEG quality
  --dpi      72–300   rasterisation resolution

SETTINGS FILE (JSON, all fields optional):
  { "blur": 2, "skew": -3, "noise": 10, "quality": 40, "dpi": 120 }

ENVIRONMENT VARIABLES:
  PDF_DEGRADE_BLUR / _SKEW / _NOISE / _QUALITY / _DPI   parameter defaults
  PDFIUM_LIB_PATH   Path to an existing libpdfium
  RUST_LOG          Override log filter (e.g. pdf_degrade=debug)
"#;

/// Degrade PDF documents into low-fidelity scanned copies.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-degrade",
    version,
    about = "Degrade PDF documents into low-fidelity scanned copies",
    long_about = "Rasterise every page of a PDF, apply blur, skew and noise, re-encode it as a \
low-quality JPEG and reassemble a new PDF. Pages are processed one at a time, so memory use \
does not grow with document length.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Source PDF file.
    #[arg(required_unless_present = "stats")]
    input: Option<PathBuf>,

    /// Output path. Default: `<prefix><name>` next to the input.
    #[arg(short, long, env = "PDF_DEGRADE_OUTPUT")]
    output: Option<PathBuf>,

    /// Gaussian blur strength (0–20).
    #[arg(long, env = "PDF_DEGRADE_BLUR")]
    blur: Option<i64>,

    /// Rotation in degrees (-45–45).
    #[arg(long, env = "PDF_DEGRADE_SKEW", allow_negative_numbers = true)]
    skew: Option<i64>,

    /// Noise standard deviation (0–50).
    #[arg(long, env = "PDF_DEGRADE_NOISE")]
    noise: Option<i64>,

    /// JPEG quality (10–100).
    #[arg(long, env = "PDF_DEGRADE_QUALITY")]
    quality: Option<i64>,

    /// Rasterisation DPI (72–300).
    #[arg(long, env = "PDF_DEGRADE_DPI")]
    dpi: Option<i64>,

    /// JSON settings file; explicit flags override its values.
    #[arg(long, env = "PDF_DEGRADE_SETTINGS")]
    settings: Option<PathBuf>,

    /// Prefix for the default output file name.
    #[arg(long, env = "PDF_DEGRADE_PREFIX", default_value = "corrupted_")]
    prefix: String,

    /// Seed the noise generator for byte-identical reruns.
    #[arg(long, env = "PDF_DEGRADE_SEED")]
    seed: Option<u64>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF_DEGRADE_PASSWORD")]
    password: Option<String>,

    /// Refuse inputs larger than this many megabytes.
    #[arg(long, env = "PDF_DEGRADE_MAX_SIZE_MB", default_value_t = 50)]
    max_size_mb: u64,

    /// Append a record of each successful run to this JSON-lines file.
    #[arg(long, env = "PDF_DEGRADE_HISTORY")]
    history: Option<PathBuf>,

    /// Print totals from the history file and exit.
    #[arg(long, requires = "history")]
    stats: bool,

    /// Print a JSON summary instead of the human-readable one.
    #[arg(long, env = "PDF_DEGRADE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF_DEGRADE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF_DEGRADE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF_DEGRADE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.stats;
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

    // ── Stats mode ───────────────────────────────────────────────────────
    if cli.stats {
        let ledger = JsonlLedger::new(cli.history.clone().context("--stats needs --history")?);
        print_stats(&ledger, cli.json)?;
        return Ok(ExitCode::SUCCESS);
    }

    let input = cli.input.clone().context("No input file given")?;
    let original_size = check_input(&input, cli.max_size_mb)?;
    let params = build_params(&cli)?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&input, &cli.prefix));

    let options = PipelineOptions {
        noise_seed: cli.seed,
        password: cli.password.clone(),
    };

    let progress: Option<ProgressCallback> = if show_progress {
        Some(Arc::new(RateLimitedReporter::with_default_interval(
            CliProgress::new(),
        )))
    } else {
        None
    };

    let report = match degrade(&input, &output, &params, &options, progress).await {
        Ok(report) => report,
        Err(e) => {
            debug!("Degradation error: {:?}", e);
            eprintln!(
                "{} {}",
                red("✘"),
                bold("Processing failed. Check that the file is an intact, readable PDF.")
            );
            if !cli.quiet {
                eprintln!("   {}", dim(&e.to_string()));
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    if let Some(ref history) = cli.history {
        let entry = HistoryEntry::now(
            file_name(&input),
            file_name(&output),
            original_size,
            report.output_bytes,
            report.page_count,
            params,
        );
        JsonlLedger::new(history)
            .record(&entry)
            .with_context(|| format!("Failed to record history in {:?}", history))?;
    }

    if cli.json {
        let summary = serde_json::json!({
            "input": input,
            "output": output,
            "original_bytes": original_size,
            "report": report,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        let change = match report.reduction_percent(original_size) {
            Some(p) if p >= 0.0 => format!("{p:.1}% smaller"),
            Some(p) => format!("{:.1}% larger", -p),
            None => "n/a".to_string(),
        };
        eprintln!(
            "{}  {} pages  {}ms  →  {}",
            green("✔"),
            report.page_count,
            report.duration_ms,
            bold(&output.display().to_string()),
        );
        eprintln!(
            "   {} → {}  ({})",
            dim(&format_mb(original_size)),
            dim(&format_mb(report.output_bytes)),
            change,
        );
        eprintln!(
            "   blur {}  skew {}°  noise {}  quality {}  dpi {}",
            params.blur_amount,
            params.skew_degrees,
            params.noise_std_dev,
            params.quality,
            params.dpi,
        );
    }

    Ok(ExitCode::SUCCESS)
}

/// Merge settings file and flags into clamped parameters.
fn build_params(cli: &Cli) -> Result<DegradationParameters> {
    let base = match cli.settings {
        Some(ref path) => DegradationParameters::from_json_file(path)
            .with_context(|| format!("Failed to load settings from {:?}", path))?,
        None => DegradationParameters::default(),
    };

    DegradationParameters::builder()
        .blur(cli.blur.unwrap_or(base.blur_amount as i64))
        .skew(cli.skew.unwrap_or(base.skew_degrees as i64))
        .noise(cli.noise.unwrap_or(base.noise_std_dev as i64))
        .quality(cli.quality.unwrap_or(base.quality as i64))
        .dpi(cli.dpi.unwrap_or(base.dpi as i64))
        .build()
        .context("Invalid configuration")
}

/// Check the input is a regular file within the size limit. Returns its size.
fn check_input(path: &Path, max_size_mb: u64) -> Result<u64> {
    let meta = std::fs::metadata(path).with_context(|| format!("Cannot read {:?}", path))?;
    if !meta.is_file() {
        anyhow::bail!("{:?} is not a file", path);
    }
    let limit = max_size_mb.saturating_mul(1024 * 1024);
    if meta.len() > limit {
        anyhow::bail!(
            "{:?} is {} which exceeds the {} MB limit (see --max-size-mb)",
            path,
            format_mb(meta.len()),
            max_size_mb
        );
    }
    Ok(meta.len())
}

fn default_output(input: &Path, prefix: &str) -> PathBuf {
    let name = format!("{prefix}{}", file_name(input));
    match input.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string())
}

fn format_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

fn print_stats(ledger: &JsonlLedger, json: bool) -> Result<()> {
    let stats = ledger
        .stats(None)
        .with_context(|| format!("Failed to read history from {:?}", ledger.path()))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
        return Ok(());
    }

    println!("Files processed:  {}", stats.total_files);
    println!("Pages processed:  {}", stats.total_pages);
    println!("Average output:   {}", format_mb(stats.avg_output_size as u64));
    match stats.last_processed {
        Some(ts) => println!("Last processed:   {} (unix time)", ts),
        None => println!("Last processed:   never"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_output(Path::new("/data/in/report.pdf"), "corrupted_"),
            PathBuf::from("/data/in/corrupted_report.pdf")
        );
        assert_eq!(
            default_output(Path::new("report.pdf"), "bad-"),
            PathBuf::from("bad-report.pdf")
        );
    }

    #[test]
    fn flags_override_settings_and_clamp() {
        let cli = Cli::parse_from(["pdf-degrade", "in.pdf", "--skew", "-90", "--quality", "40"]);
        let params = build_params(&cli).unwrap();
        assert_eq!(params.skew_degrees, -45);
        assert_eq!(params.quality, 40);
        assert_eq!(params.blur_amount, 1);
        assert_eq!(params.dpi, 150);
    }

    #[test]
    fn oversized_input_is_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut tmp, &vec![0u8; 2 * 1024 * 1024]).unwrap();
        assert!(check_input(tmp.path(), 1).is_err());
        assert_eq!(check_input(tmp.path(), 50).unwrap(), 2 * 1024 * 1024);
    }
}
