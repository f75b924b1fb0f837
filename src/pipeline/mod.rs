//! Pipeline stages for PDF degradation.
//!
//! Each submodule implements exactly one step. Keeping stages separate makes
//! each independently testable and lets the orchestrator in
//! [`crate::degrade`] drive them with a synthetic source in tests.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ transform ──▶ encode ──▶ assemble
//! (%PDF)    (pdfium)   (blur/skew/   (JPEG)     (lopdf, atomic
//!                       noise)                   write)
//! ```
//!
//! 1. [`input`]: check the source exists and starts with `%PDF`
//! 2. [`render`]: rasterise one page at a time on a dedicated blocking
//!    thread, because pdfium is not async-safe
//! 3. [`transform`]: blur, then skew, then noise; each stage is skipped at 0
//! 4. [`encode`]: lossy JPEG at the requested quality
//! 5. [`assemble`]: one full-bleed image per output page, then cleanup,
//!    compression and an atomic write

pub mod assemble;
pub mod encode;
pub mod input;
pub mod render;
pub mod transform;
