//! Property tests for the pure pipeline stages: classification, chunking,
//! merging, worker-pool ordering and Korean numeral parsing.

use async_trait::async_trait;
use edgequake_docintel::output::ChunkOutput;
use edgequake_docintel::pipeline::chunk::{compute_page_offsets, create_chunks, Chunk};
use edgequake_docintel::pipeline::classify::classify_scan;
use edgequake_docintel::pipeline::merge::merge;
use edgequake_docintel::pipeline::pdf::{DocumentScan, PageScan};
use edgequake_docintel::pipeline::processor::{ParallelChunkProcessor, ProcessorOptions};
use edgequake_docintel::pipeline::render::PageImage;
use edgequake_docintel::{
    get_strategy, parse_numeric, ChunkError, ChunkResult, DocType, ExtractionBackend,
    ExtractionBackendError, PageElement, ProcessingStrategy, RawTable, StructuredPage,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

const ALL_TYPES: [DocType; 7] = [
    DocType::PureText,
    DocType::TextWithTables,
    DocType::MixedRich,
    DocType::ImageHeavy,
    DocType::FullyScanned,
    DocType::SimpleForm,
    DocType::SmallTable,
];

// ── Generators ───────────────────────────────────────────────────────────────

/// (non-whitespace chars, images, tables) for one page.
fn page_signals() -> impl Strategy<Value = (usize, usize, usize)> {
    (0usize..200, 0usize..80, 0usize..3)
}

fn scan_from(signals: &[(usize, usize, usize)], extra_pages: usize) -> DocumentScan {
    let pages = signals
        .iter()
        .enumerate()
        .map(|(i, &(chars, images, tables))| PageScan {
            page_number: i + 1,
            text: "가".repeat(chars),
            image_count: images,
            tables: (0..tables)
                .map(|_| RawTable::new(i + 1, vec![vec!["a".into(), "b".into()]; 2]))
                .collect(),
        })
        .collect();
    DocumentScan {
        total_pages: signals.len() + extra_pages,
        file_size_bytes: 4096,
        pages,
    }
}

fn images(sizes: &[usize]) -> Vec<PageImage> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| PageImage {
            page_number: i + 1,
            encoded_bytes: vec![0u8; size],
        })
        .collect()
}

/// One result per chunk; chunks flagged in `failed` carry an error.
fn chunk_results(page_counts: &[usize], failed: &[bool]) -> (Vec<ChunkResult>, Vec<usize>) {
    let mut offsets = Vec::with_capacity(page_counts.len());
    let mut results = Vec::with_capacity(page_counts.len());
    let mut offset = 0;
    for (index, &count) in page_counts.iter().enumerate() {
        offsets.push(offset);
        if failed[index] {
            results.push(ChunkResult::failed(
                index,
                count,
                ChunkError::Timeout { chunk: index, secs: 1 },
            ));
        } else {
            let pages = (offset + 1..=offset + count)
                .map(|n| StructuredPage {
                    page_num: n,
                    elements: vec![PageElement::Text {
                        text: format!("page {n}"),
                    }],
                })
                .collect();
            results.push(ChunkResult::from_output(
                index,
                count,
                ChunkOutput {
                    content: format!("chunk {index}"),
                    structured_pages: pages,
                    input_tokens: count as u64,
                    ..Default::default()
                },
            ));
        }
        offset += count;
    }
    (results, offsets)
}

/// Answers instantly with the chunk's page numbers.
struct EchoBackend;

#[async_trait]
impl ExtractionBackend for EchoBackend {
    type Page = PageImage;

    fn name(&self) -> &'static str {
        "echo"
    }

    async fn process(
        &self,
        chunk: &Chunk<PageImage>,
        _strategy: &ProcessingStrategy,
        page_offset: usize,
    ) -> Result<ChunkOutput, ExtractionBackendError> {
        tokio::task::yield_now().await;
        Ok(ChunkOutput {
            content: format!("offset {page_offset}: {:?}", chunk.page_numbers()),
            ..Default::default()
        })
    }
}

// ── Properties ───────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn classification_is_deterministic(
        signals in prop::collection::vec(page_signals(), 0..12),
        extra in 0usize..20,
    ) {
        let scan = scan_from(&signals, extra);
        let a = classify_scan(&scan);
        let b = classify_scan(&scan);
        prop_assert_eq!(&a, &b);
        prop_assert!(a.confidence > 0.0 && a.confidence <= 1.0);
        prop_assert_eq!(a.pages_analysed, signals.len());
        prop_assert!((0.0..=1.0).contains(&a.scanned_page_ratio));
    }

    #[test]
    fn no_text_means_fully_scanned(
        images in prop::collection::vec(0usize..10, 0..12),
    ) {
        let signals: Vec<_> = images.iter().map(|&i| (0, i, 0)).collect();
        let result = classify_scan(&scan_from(&signals, 0));
        prop_assert_eq!(result.doc_type, DocType::FullyScanned);
        prop_assert_eq!(result.text_chars, 0);
    }

    #[test]
    fn text_without_images_stays_local(
        signals in prop::collection::vec((1usize..200, Just(0usize), 0usize..3), 1..12),
    ) {
        let result = classify_scan(&scan_from(&signals, 0));
        prop_assert!(matches!(result.doc_type, DocType::PureText | DocType::TextWithTables));
        prop_assert!(!get_strategy(result.doc_type).use_extraction);
    }

    #[test]
    fn chunks_partition_pages_within_limits(
        sizes in prop::collection::vec(1usize..4_000_000, 0..40),
        type_index in 0usize..7,
    ) {
        let strategy = get_strategy(ALL_TYPES[type_index]);
        let pages = images(&sizes);
        let chunks = create_chunks(pages, &strategy);

        let flattened: Vec<usize> = chunks.iter().flat_map(|c| c.page_numbers()).collect();
        prop_assert_eq!(flattened, (1..=sizes.len()).collect::<Vec<_>>());
        prop_assert!(chunks.iter().all(|c| !c.is_empty()));

        if strategy.use_extraction {
            for chunk in &chunks {
                prop_assert!(chunk.len() <= strategy.chunk_pages);
                // A single oversized page may exceed the byte budget on its own.
                prop_assert!(chunk.len() == 1 || chunk.byte_len() <= strategy.max_chunk_bytes());
            }
        } else {
            prop_assert!(chunks.len() <= 1);
        }
    }

    #[test]
    fn offsets_are_prefix_sums(
        sizes in prop::collection::vec(1usize..3_000_000, 1..40),
    ) {
        let chunks = create_chunks(images(&sizes), &get_strategy(DocType::MixedRich));
        let offsets = compute_page_offsets(&chunks);
        prop_assert_eq!(offsets.len(), chunks.len());
        prop_assert_eq!(offsets[0], 0);
        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(offsets[i], chunk.page_offset);
            prop_assert_eq!(chunk.pages[0].page_number, offsets[i] + 1);
        }
    }

    #[test]
    fn merge_ignores_completion_order(
        (page_counts, failed, order) in prop::collection::vec((1usize..6, any::<bool>()), 1..10)
            .prop_flat_map(|spec| {
                let n = spec.len();
                let counts: Vec<usize> = spec.iter().map(|s| s.0).collect();
                let failed: Vec<bool> = spec.iter().map(|s| s.1).collect();
                (Just(counts), Just(failed), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
            }),
    ) {
        let (ordered, offsets) = chunk_results(&page_counts, &failed);
        let shuffled: Vec<ChunkResult> = order.iter().map(|&i| ordered[i].clone()).collect();

        let a = merge(ordered, &offsets);
        let b = merge(shuffled, &offsets);

        prop_assert_eq!(&a.content, &b.content);
        prop_assert_eq!(&a.chunk_failures, &b.chunk_failures);
        prop_assert_eq!(a.input_tokens, b.input_tokens);
        let pages_a: Vec<usize> = a.pages.iter().map(|p| p.page_num).collect();
        let pages_b: Vec<usize> = b.pages.iter().map(|p| p.page_num).collect();
        prop_assert_eq!(&pages_a, &pages_b);
        prop_assert!(pages_a.windows(2).all(|w| w[0] < w[1]));

        let failed_pages: usize = a.chunk_failures.iter().map(|f| f.last_page + 1 - f.first_page).sum();
        prop_assert_eq!(pages_a.len() + failed_pages, page_counts.iter().sum::<usize>());
    }

    #[test]
    fn processor_returns_one_result_per_chunk_in_order(
        sizes in prop::collection::vec(1usize..2048, 0..30),
        concurrency in 1usize..8,
    ) {
        let strategy = get_strategy(DocType::SimpleForm);
        let chunks = create_chunks(images(&sizes), &strategy);
        let expected = chunks.len();
        let processor = ParallelChunkProcessor::new(ProcessorOptions {
            concurrency,
            chunk_timeout: Duration::from_secs(5),
            extract_financial_tables: false,
            progress: None,
        });

        let results = tokio_test::block_on(processor.process(Arc::new(EchoBackend), chunks, strategy));

        prop_assert_eq!(results.len(), expected);
        for (i, result) in results.iter().enumerate() {
            prop_assert_eq!(result.chunk_index, i);
            prop_assert!(result.is_ok());
        }
    }

    #[test]
    fn grouped_integers_parse(n in 0u64..1_000_000_000_000) {
        let digits = n.to_string();
        let mut grouped = String::new();
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        prop_assert_eq!(parse_numeric(&grouped), Some(n as f64));
        prop_assert_eq!(parse_numeric(&format!("({grouped})")), Some(-(n as f64)));
    }

    #[test]
    fn korean_compounds_parse(eok in 1u64..10_000, man in 1u64..10_000) {
        let cell = format!("{eok}억{man}만");
        prop_assert_eq!(parse_numeric(&cell), Some((eok * 100_000_000 + man * 10_000) as f64));
    }
}
