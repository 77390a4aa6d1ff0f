//! PDF access: per-page signals for classification and page rasterisation.
//!
//! Everything that touches pdfium sits behind the [`PdfReader`] trait so the
//! rest of the pipeline can run against an in-memory reader in tests.
//! [`PdfiumReader`] is the production implementation.
//!
//! ## Why blocking methods?
//!
//! pdfium uses thread-local state and is not safe to call from async
//! contexts. Reader methods are synchronous and the pipeline always invokes
//! them through `tokio::task::spawn_blocking`.
//!
//! ## Table detection
//!
//! pdfium exposes text segments with bounding boxes but has no notion of a
//! table. [`detect_tables`] rebuilds lines from segment baselines, splits a
//! line into cells wherever the horizontal gap exceeds [`CELL_GAP_PT`], and
//! reports every run of two or more consecutive multi-cell lines as a table.

use crate::error::DocIntelError;
use crate::pipeline::encode::encode_png;
use crate::pipeline::financial::RawTable;
use crate::pipeline::render::PageImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Pages with an image and fewer non-whitespace characters than this are
/// counted as scanned.
pub const SCANNED_TEXT_THRESHOLD: usize = 50;

/// Maximum baseline difference (points) for two segments to share a line.
pub const LINE_TOLERANCE_PT: f32 = 3.0;

/// Minimum horizontal gap (points) that separates two table cells.
pub const CELL_GAP_PT: f32 = 12.0;

/// Signals collected from one page.
#[derive(Debug, Clone, Default)]
pub struct PageScan {
    /// 1-based page number.
    pub page_number: usize,
    pub text: String,
    pub image_count: usize,
    pub tables: Vec<RawTable>,
}

impl PageScan {
    pub fn text_chars(&self) -> usize {
        self.text.chars().filter(|c| !c.is_whitespace()).count()
    }

    pub fn is_scanned(&self) -> bool {
        self.image_count > 0 && self.text_chars() < SCANNED_TEXT_THRESHOLD
    }
}

/// Signals collected from the first `max_pages` pages of a document.
#[derive(Debug, Clone, Default)]
pub struct DocumentScan {
    /// Page count of the whole document, including pages not scanned.
    pub total_pages: usize,
    pub file_size_bytes: u64,
    pub pages: Vec<PageScan>,
}

/// Read access to a PDF.
pub trait PdfReader: Send + Sync {
    /// Collect text, image and table signals for up to `max_pages` pages.
    fn scan(&self, path: &Path, max_pages: usize) -> Result<DocumentScan, DocIntelError>;

    /// Render the given 1-based pages to PNG at `dpi`, longest edge capped
    /// at `max_pixels`.
    fn rasterize(
        &self,
        path: &Path,
        page_numbers: &[usize],
        dpi: u32,
        max_pixels: u32,
    ) -> Result<Vec<PageImage>, DocIntelError>;
}

/// [`PdfReader`] backed by the pdfium library.
///
/// Binds to `$PDFIUM_LIB_PATH` when set, otherwise to a library next to the
/// executable's working directory, otherwise to the system library.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumReader;

impl PdfiumReader {
    pub fn new() -> Self {
        Self
    }

    fn bind() -> Result<Pdfium, DocIntelError> {
        let bindings = match std::env::var("PDFIUM_LIB_PATH") {
            Ok(dir) if !dir.is_empty() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
            }
            _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| DocIntelError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

fn open_error(path: &Path, e: PdfiumError) -> DocIntelError {
    DocIntelError::InvalidDocument {
        path: path.to_path_buf(),
        detail: format!("{:?}", e),
    }
}

impl PdfReader for PdfiumReader {
    fn scan(&self, path: &Path, max_pages: usize) -> Result<DocumentScan, DocIntelError> {
        let pdfium = Self::bind()?;
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| open_error(path, e))?;

        let file_size_bytes = std::fs::metadata(path)
            .map(|m| m.len())
            .unwrap_or_default();

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        let limit = total_pages.min(max_pages);
        info!("PDF loaded: {} pages, scanning {}", total_pages, limit);

        let mut scans = Vec::with_capacity(limit);
        for idx in 0..limit {
            let page_number = idx + 1;
            let page = pages.get(idx as u16).map_err(|e| open_error(path, e))?;

            let (text, runs) = match page.text() {
                Ok(text) => {
                    let runs: Vec<TextRun> = text
                        .segments()
                        .iter()
                        .map(|segment| {
                            let bounds = segment.bounds();
                            TextRun {
                                left: bounds.left().value,
                                right: bounds.right().value,
                                bottom: bounds.bottom().value,
                                text: segment.text(),
                            }
                        })
                        .collect();
                    (text.all(), runs)
                }
                Err(e) => {
                    warn!("Page {}: text layer unreadable: {:?}", page_number, e);
                    (String::new(), Vec::new())
                }
            };

            let image_count = page
                .objects()
                .iter()
                .filter(|object| object.object_type() == PdfPageObjectType::Image)
                .count();

            let tables = detect_tables(page_number, &runs);
            debug!(
                "Page {}: {} chars, {} images, {} tables",
                page_number,
                text.len(),
                image_count,
                tables.len()
            );

            scans.push(PageScan {
                page_number,
                text,
                image_count,
                tables,
            });
        }

        Ok(DocumentScan {
            total_pages,
            file_size_bytes,
            pages: scans,
        })
    }

    fn rasterize(
        &self,
        path: &Path,
        page_numbers: &[usize],
        dpi: u32,
        max_pixels: u32,
    ) -> Result<Vec<PageImage>, DocIntelError> {
        let pdfium = Self::bind()?;
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| open_error(path, e))?;
        let pages = document.pages();
        let total_pages = pages.len() as usize;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(dpi as f32 / 72.0)
            .set_maximum_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let mut images = Vec::with_capacity(page_numbers.len());
        for &page_number in page_numbers {
            if page_number == 0 || page_number > total_pages {
                warn!(
                    "Skipping page {} (out of range, total={})",
                    page_number, total_pages
                );
                continue;
            }

            let page = pages
                .get((page_number - 1) as u16)
                .map_err(|e| open_error(path, e))?;
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| open_error(path, e))?;
            let image = bitmap.as_image();
            let encoded_bytes = encode_png(&image).map_err(|e| DocIntelError::InvalidDocument {
                path: path.to_path_buf(),
                detail: format!("page {page_number}: PNG encoding failed: {e}"),
            })?;
            debug!(
                "Rendered page {} → {}x{} px, {} bytes",
                page_number,
                image.width(),
                image.height(),
                encoded_bytes.len()
            );

            images.push(PageImage {
                page_number,
                encoded_bytes,
            });
        }

        Ok(images)
    }
}

// ── Table detection ──────────────────────────────────────────────────────

/// A positioned run of text on a page, in PDF points (origin bottom-left).
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub text: String,
}

/// Rebuild table-like regions from positioned text runs.
pub fn detect_tables(page: usize, runs: &[TextRun]) -> Vec<RawTable> {
    let mut tables = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    for line in group_lines(runs) {
        let cells = split_cells(&line);
        if cells.len() >= 2 {
            current.push(cells);
        } else {
            flush_table(page, &mut current, &mut tables);
        }
    }
    flush_table(page, &mut current, &mut tables);
    tables
}

fn flush_table(page: usize, rows: &mut Vec<Vec<String>>, tables: &mut Vec<RawTable>) {
    if rows.len() >= 2 {
        tables.push(RawTable::new(page, std::mem::take(rows)));
    } else {
        rows.clear();
    }
}

/// Group runs into lines, top of the page first, each line sorted left to right.
fn group_lines(runs: &[TextRun]) -> Vec<Vec<&TextRun>> {
    let mut sorted: Vec<&TextRun> = runs.iter().filter(|r| !r.text.trim().is_empty()).collect();
    sorted.sort_by(|a, b| b.bottom.total_cmp(&a.bottom).then(a.left.total_cmp(&b.left)));

    let mut lines: Vec<Vec<&TextRun>> = Vec::new();
    for run in sorted {
        match lines.last_mut() {
            Some(line) if (line[0].bottom - run.bottom).abs() <= LINE_TOLERANCE_PT => line.push(run),
            _ => lines.push(vec![run]),
        }
    }
    for line in &mut lines {
        line.sort_by(|a, b| a.left.total_cmp(&b.left));
    }
    lines
}

fn split_cells(line: &[&TextRun]) -> Vec<String> {
    let mut cells: Vec<String> = Vec::new();
    let mut prev_right: Option<f32> = None;

    for run in line {
        let text = run.text.trim();
        match prev_right {
            Some(right) if run.left - right <= CELL_GAP_PT => {
                if let Some(cell) = cells.last_mut() {
                    if run.left - right > 1.0 {
                        cell.push(' ');
                    }
                    cell.push_str(text);
                }
            }
            _ => cells.push(text.to_string()),
        }
        prev_right = Some(prev_right.map_or(run.right, |r| r.max(run.right)));
    }
    cells
}
