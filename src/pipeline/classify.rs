//! Document classification: assign one [`DocType`] from cheap page signals.
//!
//! The decision tree runs in fixed priority order, so the same signals always
//! give the same type. [`classify_scan`] is the pure part; [`classify`] adds
//! the blocking pdfium scan.

use crate::error::DocIntelError;
use crate::pipeline::encode::base64_mb;
use crate::pipeline::pdf::{DocumentScan, PdfReader};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Document type. Drives the processing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    PureText,
    TextWithTables,
    MixedRich,
    ImageHeavy,
    FullyScanned,
    SimpleForm,
    SmallTable,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::PureText => "pure_text",
            DocType::TextWithTables => "text_with_tables",
            DocType::MixedRich => "mixed_rich",
            DocType::ImageHeavy => "image_heavy",
            DocType::FullyScanned => "fully_scanned",
            DocType::SimpleForm => "simple_form",
            DocType::SmallTable => "small_table",
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification outcome with the signals it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub doc_type: DocType,
    pub total_pages: usize,
    pub total_size_bytes: u64,
    /// Non-whitespace characters across scanned pages.
    pub text_chars: usize,
    pub image_count: usize,
    pub table_count: usize,
    /// Fraction of scanned pages that look like page images.
    pub scanned_page_ratio: f64,
    pub avg_images_per_page: f64,
    pub estimated_base64_mb: f64,
    pub confidence: f64,
    /// Pages actually inspected (at most `max_pages`).
    pub pages_analysed: usize,
}

/// Classify a document from its scan.
pub fn classify_scan(scan: &DocumentScan) -> ClassificationResult {
    let pages_analysed = scan.pages.len();
    let text_chars: usize = scan.pages.iter().map(|p| p.text_chars()).sum();
    let image_count: usize = scan.pages.iter().map(|p| p.image_count).sum();
    let table_count: usize = scan.pages.iter().map(|p| p.tables.len()).sum();
    let scanned_pages = scan.pages.iter().filter(|p| p.is_scanned()).count();

    let scanned_page_ratio = if pages_analysed == 0 {
        0.0
    } else {
        scanned_pages as f64 / pages_analysed as f64
    };
    let avg_images_per_page = image_count as f64 / pages_analysed.max(1) as f64;
    let total_pages = scan.total_pages;

    let (doc_type, confidence) = if text_chars == 0 {
        (DocType::FullyScanned, 1.0)
    } else if scanned_page_ratio > 0.8 {
        (DocType::FullyScanned, 0.9)
    } else if image_count == 0 {
        if table_count > 0 {
            (DocType::TextWithTables, 0.95)
        } else {
            (DocType::PureText, 0.95)
        }
    } else if total_pages <= 4 && table_count <= 2 {
        (DocType::SimpleForm, 0.85)
    } else if total_pages == 1 && table_count == 1 {
        (DocType::SmallTable, 0.9)
    } else if table_count > 0
        && total_pages <= 10
        && scanned_page_ratio < 0.2
        && avg_images_per_page <= 10.0
    {
        (DocType::TextWithTables, 0.85)
    } else if avg_images_per_page > 50.0 {
        (DocType::ImageHeavy, 0.85)
    } else {
        (DocType::MixedRich, 0.7)
    };

    ClassificationResult {
        doc_type,
        total_pages,
        total_size_bytes: scan.file_size_bytes,
        text_chars,
        image_count,
        table_count,
        scanned_page_ratio,
        avg_images_per_page,
        estimated_base64_mb: base64_mb(scan.file_size_bytes),
        confidence,
        pages_analysed,
    }
}

/// Scan up to `max_pages` pages on the blocking pool.
pub async fn scan_document(
    reader: Arc<dyn PdfReader>,
    pdf_path: &Path,
    max_pages: usize,
) -> Result<DocumentScan, DocIntelError> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || reader.scan(&path, max_pages))
        .await
        .map_err(|e| DocIntelError::Internal(format!("Scan task panicked: {}", e)))?
}

/// Scan and classify a document.
pub async fn classify(
    reader: Arc<dyn PdfReader>,
    pdf_path: &Path,
    max_pages: usize,
) -> Result<ClassificationResult, DocIntelError> {
    let scan = scan_document(reader, pdf_path, max_pages).await?;
    let result = classify_scan(&scan);
    info!(
        "Classified {} as {} (confidence {:.2}, {} pages, {} tables, {} images)",
        pdf_path.display(),
        result.doc_type,
        result.confidence,
        result.total_pages,
        result.table_count,
        result.image_count
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::financial::RawTable;
    use crate::pipeline::pdf::PageScan;

    fn page(n: usize, text: &str, images: usize, tables: usize) -> PageScan {
        PageScan {
            page_number: n,
            text: text.to_string(),
            image_count: images,
            tables: (0..tables)
                .map(|_| RawTable::new(n, vec![vec!["a".into(), "1".into()]; 2]))
                .collect(),
        }
    }

    fn scan(pages: Vec<PageScan>) -> DocumentScan {
        DocumentScan {
            total_pages: pages.len(),
            file_size_bytes: 1024,
            pages,
        }
    }

    const BODY: &str = "This paragraph has comfortably more than fifty visible characters in it.";

    #[test]
    fn no_text_is_fully_scanned() {
        let r = classify_scan(&scan(vec![page(1, "", 1, 0), page(2, "  ", 0, 0)]));
        assert_eq!(r.doc_type, DocType::FullyScanned);
        assert_eq!(r.confidence, 1.0);
    }

    #[test]
    fn mostly_scanned_pages() {
        let mut pages: Vec<_> = (1..=9).map(|n| page(n, "p", 1, 0)).collect();
        pages.push(page(10, BODY, 0, 0));
        let r = classify_scan(&scan(pages));
        assert_eq!(r.doc_type, DocType::FullyScanned);
        assert_eq!(r.confidence, 0.9);
        assert!((r.scanned_page_ratio - 0.9).abs() < 1e-9);
    }

    #[test]
    fn text_only_documents() {
        let r = classify_scan(&scan(vec![page(1, BODY, 0, 0)]));
        assert_eq!((r.doc_type, r.confidence), (DocType::PureText, 0.95));

        let r = classify_scan(&scan(vec![page(1, BODY, 0, 1)]));
        assert_eq!((r.doc_type, r.confidence), (DocType::TextWithTables, 0.95));
    }

    #[test]
    fn short_document_with_images_is_simple_form() {
        let r = classify_scan(&scan(vec![page(1, BODY, 1, 1), page(2, BODY, 0, 1)]));
        assert_eq!(r.doc_type, DocType::SimpleForm);
    }

    #[test]
    fn small_table_is_shadowed_by_simple_form() {
        // 1 page with 1 table always satisfies the simple-form rule first.
        let r = classify_scan(&scan(vec![page(1, BODY, 1, 1)]));
        assert_eq!(r.doc_type, DocType::SimpleForm);
    }

    #[test]
    fn tabular_report_with_few_images() {
        let pages: Vec<_> = (1..=8).map(|n| page(n, BODY, 1, 1)).collect();
        let r = classify_scan(&scan(pages));
        assert_eq!((r.doc_type, r.confidence), (DocType::TextWithTables, 0.85));
    }

    #[test]
    fn image_heavy_deck() {
        let pages: Vec<_> = (1..=12).map(|n| page(n, BODY, 60, 0)).collect();
        let r = classify_scan(&scan(pages));
        assert_eq!(r.doc_type, DocType::ImageHeavy);
        assert_eq!(r.avg_images_per_page, 60.0);
    }

    #[test]
    fn default_is_mixed_rich() {
        let pages: Vec<_> = (1..=12).map(|n| page(n, BODY, 2, 1)).collect();
        let r = classify_scan(&scan(pages));
        assert_eq!((r.doc_type, r.confidence), (DocType::MixedRich, 0.7));
    }

    #[test]
    fn total_pages_comes_from_document_not_scan() {
        let mut s = scan((1..=3).map(|n| page(n, BODY, 1, 0)).collect());
        s.total_pages = 40;
        let r = classify_scan(&s);
        assert_eq!(r.pages_analysed, 3);
        assert_eq!(r.total_pages, 40);
        assert_eq!(r.doc_type, DocType::MixedRich);
    }

    #[test]
    fn empty_document() {
        let r = classify_scan(&DocumentScan::default());
        assert_eq!(r.doc_type, DocType::FullyScanned);
        assert_eq!(r.scanned_page_ratio, 0.0);
        assert_eq!(r.avg_images_per_page, 0.0);
    }

    #[test]
    fn doc_type_ids() {
        assert_eq!(DocType::TextWithTables.as_str(), "text_with_tables");
        assert_eq!(
            serde_json::to_string(&DocType::FullyScanned).unwrap(),
            "\"fully_scanned\""
        );
    }
}
