//! Result types: per-chunk results, the merged document, and the payload
//! handed back to callers.

use crate::config::OutputMode;
use crate::error::ChunkError;
use crate::pipeline::classify::DocType;
use crate::pipeline::financial::{FinancialTable, TableCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Financial statements keyed by category.
pub type FinancialTables = BTreeMap<TableCategory, FinancialTable>;

/// Company facts keyed by field name (`company_name`, `representative`, …).
pub type CompanyInfo = BTreeMap<String, String>;

/// One structural element of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageElement {
    Heading { level: u8, text: String },
    Text { text: String },
    Table { rows: Vec<Vec<String>> },
}

/// Elements of one page, labelled with its global 1-based page number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredPage {
    pub page_num: usize,
    pub elements: Vec<PageElement>,
}

impl StructuredPage {
    /// Table rows on this page, in element order.
    pub fn tables(&self) -> impl Iterator<Item = &Vec<Vec<String>>> {
        self.elements.iter().filter_map(|e| match e {
            PageElement::Table { rows } => Some(rows),
            _ => None,
        })
    }
}

/// What a backend produces for one chunk, before the processor labels it.
#[derive(Debug, Clone, Default)]
pub struct ChunkOutput {
    pub content: String,
    pub structured_pages: Vec<StructuredPage>,
    pub company_info: CompanyInfo,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Result of extracting one chunk.
///
/// `error` is set when extraction failed; content fields are then empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunk_index: usize,
    pub page_count: usize,
    pub content: String,
    pub structured_pages: Vec<StructuredPage>,
    pub financial_tables: FinancialTables,
    pub company_info: CompanyInfo,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
    pub error: Option<ChunkError>,
}

impl ChunkResult {
    pub fn from_output(chunk_index: usize, page_count: usize, output: ChunkOutput) -> Self {
        Self {
            chunk_index,
            page_count,
            content: output.content,
            structured_pages: output.structured_pages,
            financial_tables: FinancialTables::new(),
            company_info: output.company_info,
            input_tokens: output.input_tokens,
            output_tokens: output.output_tokens,
            duration_ms: 0,
            error: None,
        }
    }

    pub fn failed(chunk_index: usize, page_count: usize, error: ChunkError) -> Self {
        Self {
            chunk_index,
            page_count,
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A chunk that contributed nothing to the merged document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    /// First global page number (1-based) the chunk covered.
    pub first_page: usize,
    /// Last global page number (1-based, inclusive) the chunk covered.
    pub last_page: usize,
    pub error: ChunkError,
}

/// How the content of a document was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMethod {
    /// Local text/table extraction chosen by the strategy.
    #[default]
    DirectExtraction,
    /// Vision model over rasterised pages.
    VisionExtraction,
    /// Vision was chosen but failed; local extraction used instead.
    LocalFallback,
}

/// The merged, page-ordered result of one document.
///
/// This is the value stored in the cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergedResult {
    pub content: String,
    /// Sorted by `page_num`, no duplicates.
    pub pages: Vec<StructuredPage>,
    pub financial_tables: FinancialTables,
    pub company_info: CompanyInfo,
    pub doc_type: Option<DocType>,
    pub processing_method: ProcessingMethod,
    pub processing_time_seconds: f64,
    pub total_pages: usize,
    pub pages_read: usize,
    pub cache_hit: bool,
    pub cached_at: Option<DateTime<Utc>>,
    pub fallback_used: bool,
    pub fallback_reason: Option<String>,
    pub chunk_failures: Vec<ChunkFailure>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// JSON payload returned to the surrounding agent/worker system.
///
/// Fields absent in the chosen [`OutputMode`] are omitted from the JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPayload {
    pub success: bool,
    pub file_path: String,
    pub total_pages: usize,
    pub pages_read: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub char_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Vec<StructuredPage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial_tables: Option<FinancialTables>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_info: Option<CompanyInfo>,
    pub doc_type: Option<DocType>,
    pub processing_method: ProcessingMethod,
    pub processing_time_seconds: f64,
    pub cache_hit: bool,
    pub cached_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunk_failures: Vec<ChunkFailure>,
}

impl DocumentPayload {
    /// Project a merged result into the shape requested by `mode`.
    pub fn project(result: &MergedResult, file_path: &Path, mode: OutputMode) -> Self {
        let with_text = matches!(mode, OutputMode::TextOnly | OutputMode::Structured);
        let with_structure = mode == OutputMode::Structured;
        let with_tables = matches!(mode, OutputMode::Structured | OutputMode::TablesOnly);

        Self {
            success: true,
            file_path: file_path.display().to_string(),
            total_pages: result.total_pages,
            pages_read: result.pages_read,
            content: with_text.then(|| result.content.clone()),
            char_count: result.content.chars().count(),
            structured_content: with_structure.then(|| result.pages.clone()),
            financial_tables: with_tables.then(|| result.financial_tables.clone()),
            company_info: with_structure.then(|| result.company_info.clone()),
            doc_type: result.doc_type,
            processing_method: result.processing_method,
            processing_time_seconds: result.processing_time_seconds,
            cache_hit: result.cache_hit,
            cached_at: result.cached_at,
            fallback_used: result.fallback_used,
            fallback_reason: result.fallback_reason.clone(),
            chunk_failures: result.chunk_failures.clone(),
        }
    }
}
