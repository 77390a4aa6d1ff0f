//! Chunking: split a page sequence into bounded batches for extraction calls.
//!
//! A chunk never holds more than `chunk_pages` pages, and never more than
//! `max_chunk_mb` of payload unless it holds exactly one page. A page larger
//! than the byte budget is sent alone rather than dropped.

use crate::pipeline::render::PagePayload;
use crate::pipeline::strategy::ProcessingStrategy;

/// A contiguous run of pages.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<P> {
    /// 0-based index of the first page within the full page sequence.
    pub page_offset: usize,
    pub pages: Vec<P>,
}

impl<P: PagePayload> Chunk<P> {
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.pages.iter().map(PagePayload::byte_len).sum()
    }

    /// Page numbers carried by this chunk, in order.
    pub fn page_numbers(&self) -> Vec<usize> {
        self.pages.iter().map(PagePayload::page_number).collect()
    }
}

/// Partition `pages` into chunks according to `strategy`.
///
/// Without extraction the whole sequence is one chunk (none for an empty
/// sequence). Otherwise pages are packed greedily in order.
pub fn create_chunks<P: PagePayload>(pages: Vec<P>, strategy: &ProcessingStrategy) -> Vec<Chunk<P>> {
    if pages.is_empty() {
        return Vec::new();
    }
    if !strategy.use_extraction {
        return vec![Chunk {
            page_offset: 0,
            pages,
        }];
    }

    let max_pages = strategy.chunk_pages.max(1);
    let max_bytes = strategy.max_chunk_bytes();

    let mut chunks = Vec::new();
    let mut current: Vec<P> = Vec::new();
    let mut current_bytes = 0usize;
    let mut offset = 0usize;

    for page in pages {
        let size = page.byte_len();
        let full = current.len() >= max_pages || current_bytes + size > max_bytes;
        if !current.is_empty() && full {
            let len = current.len();
            chunks.push(Chunk {
                page_offset: offset,
                pages: std::mem::take(&mut current),
            });
            offset += len;
            current_bytes = 0;
        }
        current_bytes += size;
        current.push(page);
    }
    if !current.is_empty() {
        chunks.push(Chunk {
            page_offset: offset,
            pages: current,
        });
    }
    chunks
}

/// Offset of each chunk's first page: prefix sums of chunk lengths.
pub fn compute_page_offsets<P>(chunks: &[Chunk<P>]) -> Vec<usize> {
    chunks
        .iter()
        .scan(0usize, |acc, chunk| {
            let offset = *acc;
            *acc += chunk.pages.len();
            Some(offset)
        })
        .collect()
}
