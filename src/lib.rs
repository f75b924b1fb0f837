//! # pdf-degrade
//!
//! Turn a clean, vector PDF into a convincing "scanned photocopy": every page
//! is rasterised, blurred, tilted, sprinkled with sensor noise and re-encoded
//! as a low-quality JPEG inside a new PDF.
//!
//! ## Why this crate?
//!
//! Document-processing systems (OCR, layout analysis, VLM extraction) are
//! usually tested on pristine born-digital PDFs and then meet crooked, noisy
//! scans in production. This crate produces realistic degraded copies of any
//! PDF with a handful of knobs, one page at a time, so that memory stays flat
//! regardless of document length.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      check the file exists and starts with %PDF
//!  ├─ 2. Render     rasterise page i at the requested DPI (pdfium worker)
//!  ├─ 3. Transform  blur → skew → noise (each skipped at 0)
//!  ├─ 4. Encode     JPEG at the requested quality
//!  ├─ 5. Assemble   one full-bleed image per page (lopdf)
//!  ├─ 6. Report     progress event, then yield to the scheduler
//!  └─ 7. Finalize   prune, renumber, compress, atomic write
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_degrade::{run_pipeline, DegradationParameters};
//!
//! #[tokio::main]
//! async fn main() {
//!     let params = DegradationParameters::builder()
//!         .blur(2)
//!         .skew(3)
//!         .noise(12)
//!         .quality(40)
//!         .build()
//!         .unwrap();
//!     let result = run_pipeline("clean.pdf", "scanned.pdf", params, None).await;
//!     assert!(result.success);
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-degrade` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-degrade = { version = "0.1", default-features = false }
//! ```
//!
//! ## pdfium
//!
//! Rendering needs a pdfium shared library at runtime. Set `PDFIUM_LIB_PATH`,
//! drop the library into the working directory, or install it system-wide.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod degrade;
pub mod error;
pub mod history;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    DegradationParameters, DegradationParametersBuilder, PipelineOptions, BLUR_RANGE, DPI_RANGE,
    NOISE_RANGE, QUALITY_RANGE, SKEW_RANGE,
};
pub use degrade::{degrade, degrade_bytes, degrade_with, run_pipeline, run_pipeline_sync, PipelineState};
pub use error::{DegradeError, ErrorKind, HistoryError, ReporterError};
pub use history::{HistoryEntry, HistoryLedger, HistoryStats, JsonlLedger};
pub use output::{DegradeOutput, DegradeReport, PipelineResult};
pub use pipeline::render::{bind_pdfium, PdfiumRasterizer, RasterPage, Rasterizer, SourceDocument};
pub use progress::{
    NoopProgress, ProgressCallback, ProgressEvent, ProgressSink, RateLimitedReporter, RateLimiter,
    DEFAULT_MIN_INTERVAL,
};
