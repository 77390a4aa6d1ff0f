//! Local extraction from the PDF text layer.

use super::ExtractionBackend;
use crate::error::ExtractionBackendError;
use crate::output::{ChunkOutput, PageElement, StructuredPage};
use crate::pipeline::chunk::Chunk;
use crate::pipeline::financial::RawTable;
use crate::pipeline::pdf::PageScan;
use crate::pipeline::render::PagePayload;
use crate::pipeline::strategy::ProcessingStrategy;
use crate::pipeline::structure::{extract_company_info, page_marker, render_table};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Text and detected tables of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page_number: usize,
    pub text: String,
    pub tables: Vec<RawTable>,
}

impl PagePayload for PageText {
    fn page_number(&self) -> usize {
        self.page_number
    }

    fn byte_len(&self) -> usize {
        self.text.len()
    }
}

impl From<&PageScan> for PageText {
    fn from(scan: &PageScan) -> Self {
        Self {
            page_number: scan.page_number,
            text: scan.text.clone(),
            tables: scan.tables.clone(),
        }
    }
}

/// Backend that never leaves the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTextBackend;

impl LocalTextBackend {
    pub fn new() -> Self {
        Self
    }
}

static RE_PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

fn page_elements(page: &PageText) -> Vec<PageElement> {
    let text = page.text.replace("\r\n", "\n").replace('\r', "\n");
    let mut elements: Vec<PageElement> = RE_PARAGRAPH_BREAK
        .split(&text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| PageElement::Text {
            text: p.to_string(),
        })
        .collect();
    elements.extend(page.tables.iter().map(|t| PageElement::Table {
        rows: t.rows.clone(),
    }));
    elements
}

fn page_markdown(page: &PageText) -> String {
    let mut parts = vec![page_marker(page.page_number)];
    let text = page.text.trim();
    if !text.is_empty() {
        parts.push(text.replace("\r\n", "\n"));
    }
    parts.extend(page.tables.iter().map(|t| render_table(&t.rows)));
    parts.join("\n\n")
}

#[async_trait]
impl ExtractionBackend for LocalTextBackend {
    type Page = PageText;

    fn name(&self) -> &'static str {
        "local"
    }

    async fn process(
        &self,
        chunk: &Chunk<PageText>,
        _strategy: &ProcessingStrategy,
        page_offset: usize,
    ) -> Result<ChunkOutput, ExtractionBackendError> {
        let structured_pages: Vec<StructuredPage> = chunk
            .pages
            .iter()
            .map(|page| StructuredPage {
                page_num: page.page_number,
                elements: page_elements(page),
            })
            .collect();

        let content = chunk
            .pages
            .iter()
            .map(page_markdown)
            .collect::<Vec<_>>()
            .join("\n\n");

        let company_info = extract_company_info(&content);
        debug!(
            "Local extraction: {} pages from offset {}, {} chars",
            chunk.len(),
            page_offset,
            content.len()
        );

        Ok(ChunkOutput {
            content,
            structured_pages,
            company_info,
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classify::DocType;
    use crate::pipeline::strategy::get_strategy;

    fn chunk() -> Chunk<PageText> {
        Chunk {
            page_offset: 0,
            pages: vec![
                PageText {
                    page_number: 1,
                    text: "상호: 테스트 주식회사\r\n\r\n손익계산서".into(),
                    tables: vec![RawTable::new(
                        1,
                        vec![
                            vec!["과목".into(), "2023".into()],
                            vec!["매출액".into(), "1,000".into()],
                        ],
                    )],
                },
                PageText {
                    page_number: 2,
                    text: "   ".into(),
                    tables: vec![],
                },
            ],
        }
    }

    #[tokio::test]
    async fn emits_text_and_table_elements() {
        let out = LocalTextBackend::new()
            .process(&chunk(), &get_strategy(DocType::TextWithTables), 0)
            .await
            .unwrap();

        assert_eq!(out.structured_pages.len(), 2);
        let first = &out.structured_pages[0];
        assert_eq!(first.page_num, 1);
        assert_eq!(first.elements.len(), 3);
        assert_eq!(first.tables().count(), 1);
        assert!(out.structured_pages[1].elements.is_empty());

        assert!(out.content.starts_with("<!-- page 1 -->"));
        assert!(out.content.contains("| 매출액 | 1,000 |"));
        assert!(out.content.contains("<!-- page 2 -->"));
        assert_eq!(out.company_info["company_name"], "테스트 주식회사");
        assert_eq!(out.input_tokens, 0);
    }
}
