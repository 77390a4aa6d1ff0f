//! Document processing entry points.
//!
//! [`DocumentPipeline`] wires the stages together:
//!
//! ```text
//! validate ──▶ scan+classify ──▶ cache? ──▶ strategy ──┬─▶ local text ─────────────┐
//!                                  │ hit              └─▶ rasterise ─▶ chunk ─▶ vision ─┤ (Err → local fallback)
//!                                  ▼                                                 ▼
//!                               payload ◀── cache put ◀── fill tables ◀──────────── merge
//! ```
//!
//! Fatal errors ([`DocIntelError`]) only come from input validation and the
//! PDF scan. Everything after that degrades instead of failing: a vision
//! failure re-runs the document through the local backend, a failed chunk
//! leaves a hole recorded in `chunk_failures`. Either way `fallback_used`
//! is set and the result is not cached.

use crate::cache::{self, ResultCache};
use crate::config::ProcessingConfig;
use crate::error::{DocIntelError, ExtractionBackendError};
use crate::output::{DocumentPayload, MergedResult, ProcessingMethod};
use crate::pipeline::backend::{ExtractionBackend, LocalTextBackend, PageText, VisionBackend};
use crate::pipeline::chunk::{compute_page_offsets, create_chunks};
use crate::pipeline::classify::{self, ClassificationResult};
use crate::pipeline::financial::{FinancialTable, TableCategory};
use crate::pipeline::input;
use crate::pipeline::merge::merge;
use crate::pipeline::pdf::{DocumentScan, PdfReader, PdfiumReader};
use crate::pipeline::processor::{ParallelChunkProcessor, ProcessorOptions};
use crate::pipeline::render::{self, PageImage};
use crate::pipeline::strategy::{get_strategy, ProcessingStrategy};
use crate::progress::{emit, ProgressEvent, Stage};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Shared handle to a vision-capable backend.
pub type VisionBackendRef = Arc<dyn ExtractionBackend<Page = PageImage>>;

/// A configured pipeline. Cheap to reuse across documents.
pub struct DocumentPipeline {
    reader: Arc<dyn PdfReader>,
    local: Arc<LocalTextBackend>,
    vision: Result<VisionBackendRef, ExtractionBackendError>,
    cache: Option<ResultCache>,
    config: ProcessingConfig,
}

impl std::fmt::Debug for DocumentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentPipeline")
            .field("vision", &self.vision.as_ref().map(|_| "<backend>"))
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DocumentPipeline {
    /// Production wiring: pdfium reader, vision providers resolved from
    /// `config`, filesystem cache when `use_cache` is set.
    ///
    /// A vision provider that cannot be resolved is not an error here:
    /// documents that need it fall back to local extraction.
    pub fn new(config: ProcessingConfig) -> Self {
        let vision = VisionBackend::from_config(&config).map(|b| Arc::new(b) as VisionBackendRef);
        if let Err(ref e) = vision {
            debug!("Vision backend not available: {}", e);
        }
        let cache = config.use_cache.then(|| ResultCache::from_config(&config));
        Self {
            reader: Arc::new(PdfiumReader::new()),
            local: Arc::new(LocalTextBackend::new()),
            vision,
            cache,
            config,
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn PdfReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_vision(mut self, backend: VisionBackendRef) -> Self {
        self.vision = Ok(backend);
        self
    }

    pub fn with_cache(mut self, cache: Option<ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    fn processor(&self) -> ParallelChunkProcessor {
        ParallelChunkProcessor::new(ProcessorOptions::from_config(&self.config))
    }

    /// Classify a document without extracting it.
    pub async fn classify(&self, path: impl AsRef<Path>) -> Result<ClassificationResult, DocIntelError> {
        let pdf_path = input::resolve_local(path.as_ref())?;
        classify::classify(Arc::clone(&self.reader), &pdf_path, self.config.max_pages).await
    }

    /// Process one document end to end.
    ///
    /// # Errors
    /// Only fatal errors: missing or unreadable file, not a PDF, pdfium
    /// unavailable. Extraction failures are reported inside the payload.
    pub async fn process_document(&self, path: impl AsRef<Path>) -> Result<DocumentPayload, DocIntelError> {
        let start = Instant::now();
        let progress = self.config.progress_callback.as_ref();
        info!("Processing document: {}", path.as_ref().display());

        // ── Step 1: Validate input ───────────────────────────────────────
        let pdf_path = input::resolve_local(path.as_ref())?;

        // ── Step 2: Scan and classify ────────────────────────────────────
        let scan = classify::scan_document(Arc::clone(&self.reader), &pdf_path, self.config.max_pages).await?;
        let classification = classify::classify_scan(&scan);
        info!(
            "Classified as {} (confidence {:.2}, {}/{} pages scanned)",
            classification.doc_type,
            classification.confidence,
            classification.pages_analysed,
            classification.total_pages
        );
        emit(
            progress,
            ProgressEvent::new(Stage::Classify, format!("classified as {}", classification.doc_type))
                .with_data(serde_json::to_value(&classification).unwrap_or_default()),
        );

        // ── Step 3: Cache lookup ─────────────────────────────────────────
        let cache_key = match &self.cache {
            Some(_) => match cache::hash_file(&pdf_path).await {
                Ok(hash) => Some(ResultCache::key_for(&hash, &self.config)),
                Err(e) => {
                    warn!("Cannot hash input for caching: {}", e);
                    None
                }
            },
            None => None,
        };
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(hit) = cache.get(key).await {
                info!("Cache hit for {}", pdf_path.display());
                emit(progress, ProgressEvent::new(Stage::Cache, "cache hit"));
                emit(progress, ProgressEvent::new(Stage::Complete, "done (cached)"));
                return Ok(DocumentPayload::project(&hit, &pdf_path, self.config.output_mode));
            }
            emit(progress, ProgressEvent::new(Stage::Cache, "cache miss"));
        }

        // ── Step 4: Route ────────────────────────────────────────────────
        let strategy = get_strategy(classification.doc_type);
        debug!("Strategy: {:?}", strategy);

        // ── Step 5: Extract ──────────────────────────────────────────────
        let mut merged = if strategy.use_extraction {
            match self.extract_with_vision(&pdf_path, scan.pages.len(), &strategy).await {
                Ok(merged) => merged,
                Err(e) => {
                    warn!("Vision extraction failed, using local text instead: {}", e);
                    let mut merged = self.extract_local(&scan).await;
                    merged.processing_method = ProcessingMethod::LocalFallback;
                    merged.fallback_used = true;
                    merged.fallback_reason = Some(e.to_string());
                    merged
                }
            }
        } else {
            self.extract_local(&scan).await
        };

        // ── Step 6: Complete the result ──────────────────────────────────
        if self.config.extract_financial_tables {
            for category in TableCategory::ALL {
                merged
                    .financial_tables
                    .entry(category)
                    .or_insert_with(|| FinancialTable::missing(category));
            }
            let found = merged.financial_tables.values().filter(|t| t.found).count();
            emit(
                progress,
                ProgressEvent::new(Stage::Tables, format!("{found}/4 financial tables found")),
            );
        }
        merged.doc_type = Some(classification.doc_type);
        merged.total_pages = classification.total_pages;
        merged.pages_read = scan.pages.len();
        merged.cache_hit = false;
        merged.cached_at = None;
        merged.processing_time_seconds = start.elapsed().as_secs_f64();

        // ── Step 7: Cache write ──────────────────────────────────────────
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if merged.fallback_used {
                debug!("Not caching degraded result");
            } else if let Err(e) = cache.put(key, &merged).await {
                warn!("Failed to write cache entry: {}", e);
            }
        }

        info!(
            "Processed {} in {:.2}s via {:?} ({} chars, fallback={})",
            pdf_path.display(),
            merged.processing_time_seconds,
            merged.processing_method,
            merged.content.chars().count(),
            merged.fallback_used
        );
        emit(progress, ProgressEvent::new(Stage::Complete, "done"));

        Ok(DocumentPayload::project(&merged, &pdf_path, self.config.output_mode))
    }

    async fn extract_local(&self, scan: &DocumentScan) -> MergedResult {
        let pages: Vec<PageText> = scan.pages.iter().map(PageText::from).collect();
        let chunks = create_chunks(pages, &ProcessingStrategy::DIRECT);
        let offsets = compute_page_offsets(&chunks);

        let results = self
            .processor()
            .process(Arc::clone(&self.local), chunks, ProcessingStrategy::DIRECT)
            .await;
        let mut merged = merge(results, &offsets);
        merged.processing_method = ProcessingMethod::DirectExtraction;
        merged
    }

    async fn extract_with_vision(
        &self,
        pdf_path: &Path,
        pages_read: usize,
        strategy: &ProcessingStrategy,
    ) -> Result<MergedResult, ExtractionBackendError> {
        let vision = Arc::clone(self.vision.as_ref().map_err(Clone::clone)?);
        let progress = self.config.progress_callback.as_ref();

        emit(
            progress,
            ProgressEvent::new(Stage::Rasterise, format!("rendering {pages_read} pages at {} DPI", strategy.dpi)),
        );
        let images = render::rasterize_pages(
            Arc::clone(&self.reader),
            pdf_path,
            (1..=pages_read).collect(),
            strategy.dpi,
            self.config.max_rendered_pixels,
        )
        .await
        .map_err(|e| ExtractionBackendError::Rasterisation { detail: e.to_string() })?;
        if images.is_empty() {
            return Err(ExtractionBackendError::Rasterisation {
                detail: "no pages were rendered".to_string(),
            });
        }

        let chunks = create_chunks(images, strategy);
        let offsets = compute_page_offsets(&chunks);
        let total = chunks.len();
        emit(
            progress,
            ProgressEvent::new(Stage::Extract, format!("{total} chunks queued"))
                .with_data(serde_json::json!({ "total": total, "page_offsets": offsets })),
        );

        let results = self.processor().process(vision, chunks, *strategy).await;
        let failed = results.iter().filter(|r| !r.is_ok()).count();
        if failed == total {
            let first_error = results
                .iter()
                .find_map(|r| r.error.as_ref())
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(ExtractionBackendError::AllChunksFailed { total, first_error });
        }

        emit(progress, ProgressEvent::new(Stage::Merge, format!("merging {total} chunks")));
        let mut merged = merge(results, &offsets);
        merged.processing_method = ProcessingMethod::VisionExtraction;
        if failed > 0 {
            merged.fallback_used = true;
            merged.fallback_reason = Some(format!("{failed}/{total} chunks failed"));
        }
        Ok(merged)
    }
}

/// Process a PDF with production wiring.
///
/// # Example
/// ```rust,no_run
/// use edgequake_docintel::{process_document, ProcessingConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let payload = process_document("report.pdf", &ProcessingConfig::default()).await?;
/// println!("{}", serde_json::to_string_pretty(&payload)?);
/// # Ok(())
/// # }
/// ```
pub async fn process_document(
    path: impl AsRef<Path>,
    config: &ProcessingConfig,
) -> Result<DocumentPayload, DocIntelError> {
    DocumentPipeline::new(config.clone()).process_document(path).await
}

/// Synchronous wrapper around [`process_document`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_document_sync(
    path: impl AsRef<Path>,
    config: &ProcessingConfig,
) -> Result<DocumentPayload, DocIntelError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocIntelError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_document(path, config))
}

/// Classify a PDF without extracting it. Does not need an LLM provider.
pub async fn classify_document(path: impl AsRef<Path>) -> Result<ClassificationResult, DocIntelError> {
    let pdf_path = input::resolve_local(path.as_ref())?;
    let max_pages = ProcessingConfig::default().max_pages;
    classify::classify(Arc::new(PdfiumReader::new()), &pdf_path, max_pages).await
}
