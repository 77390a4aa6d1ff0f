//! Rasterisation: turn selected pages into PNG payloads for the vision path.
//!
//! ## Why spawn_blocking?
//!
//! pdfium uses thread-local state internally and is not safe to call from
//! async contexts. `tokio::task::spawn_blocking` moves the work onto the
//! blocking pool so Tokio worker threads never stall during rendering.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Page sizes vary wildly: an A0 poster at 150 DPI would produce a
//! 12,000 × 17,000 px image. `max_rendered_pixels` caps the longest edge
//! regardless of physical size, keeping memory bounded.

use crate::error::DocIntelError;
use crate::pipeline::pdf::PdfReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// A page payload the chunker can pack.
pub trait PagePayload {
    /// 1-based page number within the document.
    fn page_number(&self) -> usize;
    /// Bytes this page contributes to a request.
    fn byte_len(&self) -> usize;
}

/// One rasterised page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub page_number: usize,
    /// PNG-encoded page.
    pub encoded_bytes: Vec<u8>,
}

impl PagePayload for PageImage {
    fn page_number(&self) -> usize {
        self.page_number
    }

    fn byte_len(&self) -> usize {
        self.encoded_bytes.len()
    }
}

/// Rasterise `page_numbers` (1-based) at `dpi`.
///
/// Pages out of range are skipped by the reader, so the result may be
/// shorter than the request.
pub async fn rasterize_pages(
    reader: Arc<dyn PdfReader>,
    pdf_path: &Path,
    page_numbers: Vec<usize>,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<PageImage>, DocIntelError> {
    let path: PathBuf = pdf_path.to_path_buf();
    let requested = page_numbers.len();

    let images = tokio::task::spawn_blocking(move || {
        reader.rasterize(&path, &page_numbers, dpi, max_pixels)
    })
    .await
    .map_err(|e| DocIntelError::Internal(format!("Render task panicked: {}", e)))??;

    let total_bytes: usize = images.iter().map(PagePayload::byte_len).sum();
    info!(
        "Rasterised {}/{} pages at {} DPI ({} bytes PNG)",
        images.len(),
        requested,
        dpi,
        total_bytes
    );
    Ok(images)
}
