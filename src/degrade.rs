//! Pipeline orchestration: the page loop and its public entry points.
//!
//! ## Why one page at a time?
//!
//! A page at 300 DPI is roughly 25 MB of RGB pixels. Holding a whole document
//! in memory is not an option for long documents, so the orchestrator runs
//! a strict per-page cycle (render → transform → encode → insert → report →
//! yield) and only asks for the next page once the previous raster has been
//! dropped. The encoded JPEG is the only thing kept per page, moved into the
//! output document.
//!
//! ## Why yield after every page?
//!
//! The run shares its tokio runtime with whatever else the caller is doing
//! (typically a chat bot serving other users). A cooperative
//! `yield_now()` after each page keeps one long document from starving
//! them, even when every offloaded task completes immediately.
//!
//! ## States
//!
//! ```text
//! Idle ─▶ Opened ─▶ Processing(0) ─▶ … ─▶ Processing(n-1) ─▶ Finalizing ─▶ Done
//!   └──────────┴──────────────┴────────────────┴──────────────────┴──▶ Failed
//! ```

use crate::config::{DegradationParameters, PipelineOptions};
use crate::error::DegradeError;
use crate::output::{DegradeOutput, DegradeReport, PipelineResult};
use crate::pipeline::assemble::OutputDocument;
use crate::pipeline::encode::encode_page;
use crate::pipeline::render::{PdfiumRasterizer, RasterWorker, Rasterizer};
use crate::pipeline::{input, transform};
use crate::progress::{NoopProgress, ProgressCallback, ProgressEvent, ProgressSink};
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Where a run currently is. Traced at `debug` level on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Opened,
    /// Working on page `i` (0-based).
    Processing(usize),
    Finalizing,
    Done,
    Failed,
}

fn enter(state: &mut PipelineState, next: PipelineState) {
    debug!("Pipeline state {:?} → {:?}", state, next);
    *state = next;
}

fn settle<T>(state: &mut PipelineState, result: Result<T, DegradeError>) -> Result<T, DegradeError> {
    match &result {
        Ok(_) => enter(state, PipelineState::Done),
        Err(e) => {
            error!("Degradation failed in state {:?}: {}", state, e);
            *state = PipelineState::Failed;
        }
    }
    result
}

/// Degrade the PDF at `source` into a new PDF at `output`.
///
/// The simple entry point: every failure collapses to
/// `PipelineResult { success: false, page_count: 0 }` (details are logged).
/// `output` is only written if the run succeeds.
///
/// # Example
/// ```rust,no_run
/// use pdf_degrade::{run_pipeline, DegradationParameters};
///
/// # #[tokio::main]
/// # async fn main() {
/// let result = run_pipeline("in.pdf", "corrupted_in.pdf", DegradationParameters::default(), None).await;
/// if result.success {
///     println!("{} pages degraded", result.page_count);
/// }
/// # }
/// ```
pub async fn run_pipeline(
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
    params: DegradationParameters,
    on_progress: Option<ProgressCallback>,
) -> PipelineResult {
    let result = degrade(
        source,
        output,
        &params,
        &PipelineOptions::default(),
        on_progress,
    )
    .await;
    PipelineResult::from(&result)
}

/// Synchronous wrapper around [`run_pipeline`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_pipeline_sync(
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
    params: DegradationParameters,
    on_progress: Option<ProgressCallback>,
) -> PipelineResult {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(run_pipeline(source, output, params, on_progress)),
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            PipelineResult::failed()
        }
    }
}

/// Degrade a PDF file, returning a detailed report or the precise error.
///
/// The source is checked for the `%PDF` magic before pdfium is touched.
pub async fn degrade(
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
    params: &DegradationParameters,
    options: &PipelineOptions,
    on_progress: Option<ProgressCallback>,
) -> Result<DegradeReport, DegradeError> {
    let source = source.as_ref();
    info!("Starting degradation: {}", source.display());

    if let Err(e) = input::validate_source(source) {
        error!("Degradation failed in state {:?}: {}", PipelineState::Idle, e);
        return Err(e);
    }

    let rasterizer = PdfiumRasterizer::new(source).with_password(options.password.clone());
    degrade_with(rasterizer, output, params, options, on_progress).await
}

/// Degrade the document opened by `rasterizer` into a new PDF at `output`.
///
/// This is [`degrade`] without the source-file checks, for callers that bring
/// their own [`Rasterizer`].
pub async fn degrade_with<R: Rasterizer>(
    rasterizer: R,
    output: impl AsRef<Path>,
    params: &DegradationParameters,
    options: &PipelineOptions,
    on_progress: Option<ProgressCallback>,
) -> Result<DegradeReport, DegradeError> {
    let output = output.as_ref().to_path_buf();
    let start = Instant::now();
    let sink = on_progress.unwrap_or_else(|| Arc::new(NoopProgress));
    let mut state = PipelineState::Idle;

    let result = match process_pages(rasterizer, params, options, sink.as_ref(), &mut state).await
    {
        Ok(document) => {
            enter(&mut state, PipelineState::Finalizing);
            let page_count = document.page_count();
            let path = output.clone();
            tokio::task::spawn_blocking(move || document.finish(&path))
                .await
                .map_err(|e| DegradeError::Internal(format!("finalize task failed: {e}")))
                .and_then(|written| written)
                .map(|output_bytes| DegradeReport {
                    page_count,
                    output_bytes,
                    duration_ms: start.elapsed().as_millis() as u64,
                    params: *params,
                })
        }
        Err(e) => Err(e),
    };

    let report = settle(&mut state, result)?;
    info!(
        "Degraded {} pages in {} ms → {} ({} bytes)",
        report.page_count,
        report.duration_ms,
        output.display(),
        report.output_bytes
    );
    Ok(report)
}

/// Degrade PDF bytes in memory.
///
/// Internally the library writes `bytes` to a managed [`tempfile`] so pdfium
/// can open it, and cleans it up automatically on return or panic.
pub async fn degrade_bytes(
    bytes: &[u8],
    params: &DegradationParameters,
    options: &PipelineOptions,
) -> Result<DegradeOutput, DegradeError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| DegradeError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| DegradeError::Internal(format!("tempfile write: {e}")))?;
    tmp.flush()
        .map_err(|e| DegradeError::Internal(format!("tempfile write: {e}")))?;
    input::validate_source(tmp.path())?;

    let start = Instant::now();
    let rasterizer =
        PdfiumRasterizer::new(tmp.path()).with_password(options.password.clone());
    let mut state = PipelineState::Idle;

    let result = match process_pages(rasterizer, params, options, &NoopProgress, &mut state).await
    {
        Ok(document) => {
            enter(&mut state, PipelineState::Finalizing);
            let page_count = document.page_count();
            tokio::task::spawn_blocking(move || document.into_bytes())
                .await
                .map_err(|e| DegradeError::Internal(format!("finalize task failed: {e}")))
                .and_then(|pdf| pdf)
                .map(|pdf| DegradeOutput {
                    report: DegradeReport {
                        page_count,
                        output_bytes: pdf.len() as u64,
                        duration_ms: start.elapsed().as_millis() as u64,
                        params: *params,
                    },
                    pdf,
                })
        }
        Err(e) => Err(e),
    };

    // `tmp` is dropped (and the file deleted) here
    settle(&mut state, result)
}

// ── Page loop ────────────────────────────────────────────────────────────

async fn process_pages<R: Rasterizer>(
    rasterizer: R,
    params: &DegradationParameters,
    options: &PipelineOptions,
    sink: &dyn ProgressSink,
    state: &mut PipelineState,
) -> Result<OutputDocument, DegradeError> {
    let source = rasterizer.source_path();
    let dpi = params.dpi.max(1) as u32;

    // The worker owns the open document; dropping it on any early return
    // closes the source.
    let worker = RasterWorker::open(rasterizer, dpi).await?;
    enter(state, PipelineState::Opened);

    let total = worker.page_count();
    if total == 0 {
        return Err(DegradeError::DocumentCorrupt {
            path: source,
            detail: "document has no pages".into(),
        });
    }
    info!("Source has {} pages; degrading at {} DPI", total, dpi);

    let mut output = OutputDocument::new();
    let mut rng = match options.noise_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    for index in 0..total {
        enter(state, PipelineState::Processing(index));
        let page_number = index + 1;

        let raster = worker.render(index).await?;

        // Transform + encode are CPU-bound: keep them off the async executor.
        let page_seed: u64 = rng.gen();
        let page_params = *params;
        let quality = params.jpeg_quality();
        let encoded = tokio::task::spawn_blocking(move || {
            let mut page_rng = StdRng::seed_from_u64(page_seed);
            let degraded = transform::transform(&page_params, raster, &mut page_rng);
            encode_page(&degraded, quality, page_number)
        })
        .await
        .map_err(|e| DegradeError::Internal(format!("page {page_number} task failed: {e}")))??;

        output.append_page(encoded)?;

        notify(sink, ProgressEvent::new(page_number, total)).await;
        tokio::task::yield_now().await;
    }

    worker.close().await;
    Ok(output)
}

/// Deliver `event` to `sink`, discarding any error or panic.
async fn notify(sink: &dyn ProgressSink, event: ProgressEvent) {
    let delivery = match std::panic::catch_unwind(AssertUnwindSafe(|| sink.on_progress(event))) {
        Ok(fut) => fut,
        Err(_) => {
            warn!("Progress sink panicked on page {}", event.current_page);
            return;
        }
    };

    match AssertUnwindSafe(delivery).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Ignoring progress failure on page {}: {}", event.current_page, e),
        Err(_) => warn!("Progress sink panicked on page {}", event.current_page),
    }
}
