//! Error types for the pdf-degrade library.
//!
//! Three error types for three audiences:
//!
//! * [`DegradeError`]: **Fatal**: the run cannot finish (source is not a
//!   PDF, a page failed to render, the JPEG encoder or output writer failed).
//!   Returned as `Err(DegradeError)` from [`crate::degrade()`] and collapsed
//!   to `PipelineResult { success: false, .. }` by [`crate::run_pipeline`].
//!
//! * [`ReporterError`]: raised by a progress sink. Never fatal: the
//!   orchestrator logs it and carries on with the next page.
//!
//! * [`HistoryError`]: raised by the history ledger, which callers write to
//!   after a successful run. The pipeline itself never touches it.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-degrade pipeline.
#[derive(Debug, Error)]
pub enum DegradeError {
    // ── Source errors ─────────────────────────────────────────────────────
    /// Source file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    SourceNotFound { path: PathBuf },

    /// The file exists and was read, but does not start with `%PDF`.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: Vec<u8> },

    /// pdfium could not open the document (corrupt xref, bad password, …).
    #[error("PDF '{path}' is corrupt: {detail}")]
    DocumentCorrupt { path: PathBuf, detail: String },

    /// pdfium returned an error for a specific page (1-indexed).
    #[error("Rasterisation failed for page {page}: {detail}")]
    PageRenderFailed { page: usize, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// JPEG encoding or insertion into the output document failed.
    #[error("Encoding failed for page {page}: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// The finalised output document could not be written.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Environment errors ────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library in the working directory."
    )]
    PdfiumBindingFailed(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error (worker thread gone, task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`DegradeError`].
///
/// The caller of [`crate::run_pipeline`] only ever sees success or failure;
/// this is for logs and for callers of [`crate::degrade()`] that want to
/// word their failure notice differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The source could not be opened or one of its pages could not be rendered.
    DocumentCorrupt,
    /// The lossy encoder, page insertion or output serialisation failed.
    EncodeFailure,
    /// Neither the input nor the output: missing pdfium, bad config, panics.
    Environment,
}

impl DegradeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DegradeError::SourceNotFound { .. }
            | DegradeError::NotAPdf { .. }
            | DegradeError::DocumentCorrupt { .. }
            | DegradeError::PageRenderFailed { .. } => ErrorKind::DocumentCorrupt,
            DegradeError::EncodeFailed { .. } | DegradeError::OutputWriteFailed { .. } => {
                ErrorKind::EncodeFailure
            }
            DegradeError::PdfiumBindingFailed(_)
            | DegradeError::InvalidConfig(_)
            | DegradeError::Internal(_) => ErrorKind::Environment,
        }
    }
}

/// Failure inside a progress sink. Always swallowed by the pipeline.
#[derive(Debug, Clone, Error)]
#[error("progress sink failed: {0}")]
pub struct ReporterError(pub String);

impl ReporterError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors from the processing-history ledger.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History ledger I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed history entry on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialise history entry: {0}")]
    Serialize(#[from] serde_json::Error),
}
