//! Extraction backends: turn one chunk of pages into text and structure.
//!
//! Two implementations exist:
//!
//! * [`LocalTextBackend`] reads the PDF's own text layer and the tables
//!   detected from it. No network, no cost.
//! * [`VisionBackend`] sends rasterised pages to a vision model.
//!
//! Both are plain values constructed by the caller and passed around as
//! `Arc<dyn ExtractionBackend<Page = …>>`. The page payload is an associated
//! type so each backend receives exactly what it needs.

pub mod local;
pub mod vision;

pub use local::{LocalTextBackend, PageText};
pub use vision::VisionBackend;

use crate::error::ExtractionBackendError;
use crate::output::ChunkOutput;
use crate::pipeline::chunk::Chunk;
use crate::pipeline::render::PagePayload;
use crate::pipeline::strategy::ProcessingStrategy;
use async_trait::async_trait;

/// Extracts content from a chunk of pages.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Page payload this backend consumes.
    type Page: PagePayload + Send + Sync + 'static;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Extract one chunk.
    ///
    /// `page_offset` is the 0-based index of the chunk's first page in the
    /// document; structured pages in the output must carry global 1-based
    /// page numbers.
    async fn process(
        &self,
        chunk: &Chunk<Self::Page>,
        strategy: &ProcessingStrategy,
        page_offset: usize,
    ) -> Result<ChunkOutput, ExtractionBackendError>;
}
