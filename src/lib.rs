//! # edgequake-docintel
//!
//! Document intelligence for PDFs: classify a document, pick the cheapest
//! processing strategy that works for it, extract its content (locally or
//! through a vision model, chunked and in parallel), and pull canonical
//! financial statements out of the result.
//!
//! ## Why classify first?
//!
//! Most business PDFs carry a usable text layer. Sending those to a vision
//! model costs money and adds latency for no gain. Scanned registries, pitch
//! decks and mixed reports do need a model, and each kind wants a different
//! DPI, prompt and model tier. Classification costs one pdfium pass over the
//! first pages and decides all of that up front.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Classify  per-page text / image / table signals → DocType
//!  ├─ 2. Cache     sha256(file + settings) → stored result?
//!  ├─ 3. Route     DocType → ProcessingStrategy (static table)
//!  ├─ 4. Extract   local text layer, or rasterise → chunk → vision model
//!  │               on a bounded worker pool
//!  ├─ 5. Merge     page-ordered document, failed chunks recorded
//!  ├─ 6. Tables    income statement / balance sheet / cash flow / cap table,
//!  │               Korean compound numerals parsed (5억2천만 → 520000000)
//!  └─ 7. Output    JSON payload projected by OutputMode
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docintel::{process_document, OutputMode, ProcessingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Vision provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ProcessingConfig::builder()
//!         .output_mode(OutputMode::TablesOnly)
//!         .build()?;
//!     let payload = process_document("audit_report.pdf", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&payload.financial_tables)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docintel` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docintel = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::{CacheEntry, CacheError, ResultCache};
pub use config::{OutputMode, ProcessingConfig, ProcessingConfigBuilder};
pub use error::{ChunkError, DocIntelError, ExtractionBackendError, NumeralParseError};
pub use output::{
    ChunkFailure, ChunkResult, CompanyInfo, DocumentPayload, FinancialTables, MergedResult,
    PageElement, ProcessingMethod, StructuredPage,
};
pub use pipeline::backend::{ExtractionBackend, LocalTextBackend, PageText, VisionBackend};
pub use pipeline::classify::{ClassificationResult, DocType};
pub use pipeline::financial::{FinancialExtraction, FinancialTable, FinancialTableExtractor, RawTable, TableCategory};
pub use pipeline::numeral::parse_numeric;
pub use pipeline::pdf::{PdfReader, PdfiumReader};
pub use pipeline::strategy::{get_strategy, ModelTier, ProcessingStrategy, STRATEGY_VERSION};
pub use process::{classify_document, process_document, process_document_sync, DocumentPipeline, VisionBackendRef};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, ProgressEvent, Stage};
