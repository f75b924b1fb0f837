//! PDF rasterisation: render one page at a time to an RGB buffer via pdfium.
//!
//! ## Why a dedicated worker?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is not safe
//! to drive from async contexts, and a `PdfDocument` borrows the `Pdfium`
//! bindings it was loaded from, so the pair cannot be parked in a struct and
//! carried across `.await` points. [`RasterWorker`] therefore opens the
//! document inside `tokio::task::spawn_blocking` and keeps it there for the
//! whole run, serving one render request at a time over a channel. The
//! orchestrator asks for page *i*, awaits the buffer, and only asks for page
//! *i + 1* after it has finished with page *i*, so at most one raster is ever
//! in flight.
//!
//! Dropping the worker closes the request channel; the blocking thread then
//! leaves its loop and the pdfium document is closed, on success and failure
//! alike.
//!
//! ## Why DPI, not pixels?
//!
//! The output must look like a scan of the original at a chosen resolution,
//! so every page is scaled by the same factor `dpi / 72` regardless of its
//! physical size. Output page boxes are then sized to the raster pixels.

use crate::error::DegradeError;
use image::RgbImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// An in-memory RGB pixel buffer for exactly one source page.
pub type RasterPage = RgbImage;

/// An opened source document that can render its pages.
pub trait SourceDocument {
    fn page_count(&self) -> usize;

    /// Render page `index` (0-based) at `dpi`, preserving full colour.
    ///
    /// The result measures the page's native size in points times `dpi / 72`.
    fn render_page(&self, index: usize, dpi: u32) -> Result<RasterPage, DegradeError>;
}

/// Opens a source document for the duration of one scoped session.
///
/// `with_document` runs on a blocking thread. It opens the document, hands it
/// to `session` (which renders every page the orchestrator asks for) and
/// closes it when `session` returns.
pub trait Rasterizer: Send + 'static {
    /// Where the document comes from, for error messages.
    fn source_path(&self) -> PathBuf {
        PathBuf::from("<memory>")
    }

    fn with_document(
        self,
        session: &mut dyn FnMut(&dyn SourceDocument),
    ) -> Result<(), DegradeError>;
}

// ── pdfium backend ───────────────────────────────────────────────────────

/// Bind to a pdfium library.
///
/// Resolution order (first match wins):
/// 1. `PDFIUM_LIB_PATH`: explicit path to the shared library.
/// 2. The platform library name in the working directory.
/// 3. The system library search path.
pub fn bind_pdfium() -> Result<Pdfium, DegradeError> {
    if let Ok(env_path) = std::env::var("PDFIUM_LIB_PATH") {
        let p = PathBuf::from(env_path);
        if p.exists() {
            return bind_pdfium_from_path(&p);
        }
        debug!("PDFIUM_LIB_PATH '{}' not found; trying defaults", p.display());
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| DegradeError::PdfiumBindingFailed(e.to_string()))
}

/// Bind to a pdfium library at an explicit `path`.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, DegradeError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| DegradeError::PdfiumBindingFailed(format!("{}: {e}", path.display())))
}

/// Rasterizer backed by pdfium, reading a PDF from the filesystem.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    path: PathBuf,
    password: Option<String>,
}

impl PdfiumRasterizer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            password: None,
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn source_path(&self) -> PathBuf {
        self.path.clone()
    }

    fn with_document(
        self,
        session: &mut dyn FnMut(&dyn SourceDocument),
    ) -> Result<(), DegradeError> {
        let pdfium = bind_pdfium()?;

        let document = pdfium
            .load_pdf_from_file(&self.path, self.password.as_deref())
            .map_err(|e| DegradeError::DocumentCorrupt {
                path: self.path.clone(),
                detail: format!("{:?}", e),
            })?;

        info!("PDF loaded: {} pages", document.pages().len());
        session(&PdfiumDocument { document });
        Ok(())
    }
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
}

impl SourceDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn render_page(&self, index: usize, dpi: u32) -> Result<RasterPage, DegradeError> {
        let page = self
            .document
            .pages()
            .get(index as u16)
            .map_err(|e| DegradeError::PageRenderFailed {
                page: index + 1,
                detail: format!("{:?}", e),
            })?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);

        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| DegradeError::PageRenderFailed {
                    page: index + 1,
                    detail: format!("{:?}", e),
                })?;

        let image = bitmap.as_image().to_rgb8();
        debug!(
            "Rendered page {} → {}x{} px",
            index + 1,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

// ── Render worker ────────────────────────────────────────────────────────

struct RenderRequest {
    index: usize,
    reply: oneshot::Sender<Result<RasterPage, DegradeError>>,
}

/// Async handle to a document held open on a blocking thread.
pub struct RasterWorker {
    requests: mpsc::Sender<RenderRequest>,
    page_count: usize,
    handle: tokio::task::JoinHandle<()>,
}

impl RasterWorker {
    /// Open the document on a blocking thread and wait until it is ready.
    pub async fn open<R: Rasterizer>(rasterizer: R, dpi: u32) -> Result<Self, DegradeError> {
        let (req_tx, mut req_rx) = mpsc::channel::<RenderRequest>(1);
        let (open_tx, open_rx) = oneshot::channel::<Result<usize, DegradeError>>();

        let handle = tokio::task::spawn_blocking(move || {
            let mut open_tx = Some(open_tx);
            let outcome = rasterizer.with_document(&mut |doc: &dyn SourceDocument| {
                if let Some(tx) = open_tx.take() {
                    let _ = tx.send(Ok(doc.page_count()));
                }
                while let Some(req) = req_rx.blocking_recv() {
                    let _ = req.reply.send(doc.render_page(req.index, dpi));
                }
            });
            if let (Err(e), Some(tx)) = (outcome, open_tx.take()) {
                let _ = tx.send(Err(e));
            }
        });

        let page_count = open_rx.await.map_err(|_| {
            DegradeError::Internal("render worker exited before opening the document".into())
        })??;

        Ok(Self {
            requests: req_tx,
            page_count,
            handle,
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Render page `index` (0-based) on the worker thread.
    pub async fn render(&self, index: usize) -> Result<RasterPage, DegradeError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(RenderRequest { index, reply })
            .await
            .map_err(|_| DegradeError::Internal("render worker stopped".into()))?;
        response.await.map_err(|_| DegradeError::PageRenderFailed {
            page: index + 1,
            detail: "render worker dropped the request".into(),
        })?
    }

    /// Close the document and wait for the worker thread to finish.
    pub async fn close(self) {
        let Self {
            requests, handle, ..
        } = self;
        drop(requests);
        if let Err(e) = handle.await {
            debug!("Render worker ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Solid {
        pages: usize,
        closed: Arc<AtomicBool>,
    }

    struct SolidDoc {
        pages: usize,
    }

    impl SourceDocument for SolidDoc {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn render_page(&self, index: usize, dpi: u32) -> Result<RasterPage, DegradeError> {
            if index >= self.pages {
                return Err(DegradeError::PageRenderFailed {
                    page: index + 1,
                    detail: "out of range".into(),
                });
            }
            // A 72×36 pt page.
            let scale = dpi / 72;
            Ok(RgbImage::from_pixel(72 * scale, 36 * scale, Rgb([index as u8, 0, 0])))
        }
    }

    impl Rasterizer for Solid {
        fn with_document(
            self,
            session: &mut dyn FnMut(&dyn SourceDocument),
        ) -> Result<(), DegradeError> {
            session(&SolidDoc { pages: self.pages });
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Unopenable;

    impl Rasterizer for Unopenable {
        fn with_document(
            self,
            _session: &mut dyn FnMut(&dyn SourceDocument),
        ) -> Result<(), DegradeError> {
            Err(DegradeError::DocumentCorrupt {
                path: PathBuf::from("broken.pdf"),
                detail: "xref table missing".into(),
            })
        }
    }

    #[tokio::test]
    async fn worker_renders_pages_at_requested_dpi() {
        let closed = Arc::new(AtomicBool::new(false));
        let worker = RasterWorker::open(
            Solid {
                pages: 2,
                closed: Arc::clone(&closed),
            },
            144,
        )
        .await
        .unwrap();
        assert_eq!(worker.page_count(), 2);

        let page = worker.render(1).await.unwrap();
        assert_eq!(page.dimensions(), (144, 72));
        assert_eq!(page.get_pixel(0, 0), &Rgb([1, 0, 0]));

        worker.close().await;
        assert!(closed.load(Ordering::SeqCst), "document must be closed");
    }

    #[tokio::test]
    async fn worker_propagates_page_errors() {
        let worker = RasterWorker::open(
            Solid {
                pages: 1,
                closed: Arc::new(AtomicBool::new(false)),
            },
            72,
        )
        .await
        .unwrap();
        let err = worker.render(5).await.unwrap_err();
        assert!(matches!(err, DegradeError::PageRenderFailed { page: 6, .. }));
        worker.close().await;
    }

    #[tokio::test]
    async fn open_failure_is_reported() {
        let err = RasterWorker::open(Unopenable, 150).await.err().unwrap();
        assert!(matches!(err, DegradeError::DocumentCorrupt { .. }));
    }

    #[tokio::test]
    async fn dropping_the_worker_closes_the_document() {
        let closed = Arc::new(AtomicBool::new(false));
        let worker = RasterWorker::open(
            Solid {
                pages: 3,
                closed: Arc::clone(&closed),
            },
            72,
        )
        .await
        .unwrap();
        drop(worker);

        for _ in 0..200 {
            if closed.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("document was not closed after the worker was dropped");
    }
}
