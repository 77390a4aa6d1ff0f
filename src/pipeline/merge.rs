//! Merging per-chunk results into one page-ordered document.

use crate::output::{ChunkFailure, ChunkResult, MergedResult};
use tracing::{debug, warn};

/// Merge chunk results, in whatever order they completed.
///
/// `page_offsets[i]` is the 0-based index of chunk `i`'s first page. Failed
/// chunks contribute no content and are listed in
/// [`MergedResult::chunk_failures`] with the page range they covered.
pub fn merge(mut results: Vec<ChunkResult>, page_offsets: &[usize]) -> MergedResult {
    results.sort_by_key(|r| r.chunk_index);
    let single = results.len() == 1;

    let mut merged = MergedResult::default();
    let mut contents: Vec<String> = Vec::with_capacity(results.len());

    for result in results {
        merged.input_tokens += result.input_tokens;
        merged.output_tokens += result.output_tokens;

        if let Some(error) = result.error {
            let offset = page_offsets.get(result.chunk_index).copied().unwrap_or_default();
            warn!("Chunk {} contributes nothing: {}", result.chunk_index, error);
            merged.chunk_failures.push(ChunkFailure {
                chunk_index: result.chunk_index,
                first_page: offset + 1,
                last_page: offset + result.page_count,
                error,
            });
            continue;
        }

        if !result.content.is_empty() {
            contents.push(result.content);
        }
        merged.pages.extend(result.structured_pages);
        for (category, table) in result.financial_tables {
            merged.financial_tables.entry(category).or_insert(table);
        }
        for (field, value) in result.company_info {
            if !value.trim().is_empty() {
                merged.company_info.entry(field).or_insert(value);
            }
        }
    }

    merged.content = contents.join("\n\n");
    if !single {
        merged.pages.sort_by_key(|p| p.page_num);
        merged.pages.dedup_by_key(|p| p.page_num);
    }
    debug!(
        "Merged {} pages, {} financial tables, {} failed chunks",
        merged.pages.len(),
        merged.financial_tables.len(),
        merged.chunk_failures.len()
    );
    merged
}
