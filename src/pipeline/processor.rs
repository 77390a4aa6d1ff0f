//! Parallel chunk processing on a bounded worker pool.
//!
//! ## Shape
//!
//! ```text
//!             ┌──────────┐
//!  jobs ─────▶│ worker 1 │──┐
//!  (mpsc,     ├──────────┤  │  results
//!   shared)  ▶│ worker 2 │──┼──────────▶ drain loop ──▶ Vec<ChunkResult>
//!             ├──────────┤  │             (progress)     (chunk order)
//!            ▶│ worker N │──┘
//!             └──────────┘
//! ```
//!
//! Every chunk is queued up front; `min(concurrency, chunks)` workers pull
//! from the shared job receiver until it is empty. Each call runs under its
//! own deadline. A failing, slow or lost chunk becomes a [`ChunkError`] in
//! its slot; the batch itself never fails.

use crate::config::ProcessingConfig;
use crate::error::ChunkError;
use crate::output::{ChunkResult, FinancialTables, StructuredPage};
use crate::pipeline::backend::ExtractionBackend;
use crate::pipeline::chunk::Chunk;
use crate::pipeline::financial::{FinancialTableExtractor, RawTable};
use crate::pipeline::strategy::ProcessingStrategy;
use crate::progress::{emit, ProgressCallback, ProgressEvent, Stage};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Settings for one batch.
#[derive(Clone)]
pub struct ProcessorOptions {
    pub concurrency: usize,
    pub chunk_timeout: Duration,
    pub extract_financial_tables: bool,
    pub progress: Option<ProgressCallback>,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            chunk_timeout: Duration::from_secs(300),
            extract_financial_tables: true,
            progress: None,
        }
    }
}

impl ProcessorOptions {
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            chunk_timeout: config.chunk_timeout(),
            extract_financial_tables: config.extract_financial_tables,
            progress: config.progress_callback.clone(),
        }
    }
}

/// Runs an [`ExtractionBackend`] over many chunks concurrently.
#[derive(Clone, Default)]
pub struct ParallelChunkProcessor {
    options: ProcessorOptions,
}

impl ParallelChunkProcessor {
    pub fn new(options: ProcessorOptions) -> Self {
        Self { options }
    }

    /// Process every chunk and return one result per chunk, in chunk order.
    pub async fn process<B>(
        &self,
        backend: Arc<B>,
        chunks: Vec<Chunk<B::Page>>,
        strategy: ProcessingStrategy,
    ) -> Vec<ChunkResult>
    where
        B: ExtractionBackend + ?Sized + 'static,
    {
        let total = chunks.len();
        if total == 0 {
            return Vec::new();
        }
        let page_counts: Vec<usize> = chunks.iter().map(|c| c.pages.len()).collect();
        let workers = self.options.concurrency.max(1).min(total);
        info!(
            "Processing {} chunks with {} workers ({} backend)",
            total,
            workers,
            backend.name()
        );

        let (job_tx, job_rx) = mpsc::unbounded_channel::<(usize, Chunk<B::Page>)>();
        for job in chunks.into_iter().enumerate() {
            // The receiver is alive until the workers below are done.
            let _ = job_tx.send(job);
        }
        drop(job_tx);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<ChunkResult>();

        let mut set = JoinSet::new();
        for worker in 0..workers {
            let jobs = Arc::clone(&job_rx);
            let results = result_tx.clone();
            let backend = Arc::clone(&backend);
            let deadline = self.options.chunk_timeout;
            let extract_tables = self.options.extract_financial_tables;

            set.spawn(async move {
                loop {
                    let next = jobs.lock().await.recv().await;
                    let Some((index, chunk)) = next else { break };
                    let result =
                        run_chunk(&*backend, index, &chunk, &strategy, deadline, extract_tables).await;
                    if results.send(result).is_err() {
                        break;
                    }
                }
                debug!("Chunk worker {} finished", worker);
            });
        }
        drop(result_tx);

        let mut slots: Vec<Option<ChunkResult>> = vec![None; total];
        let mut completed = 0usize;
        while let Some(result) = result_rx.recv().await {
            completed += 1;
            emit(
                self.options.progress.as_ref(),
                ProgressEvent::new(Stage::Extract, format!("chunk {}/{} done", completed, total))
                    .with_data(serde_json::json!({
                        "chunk_index": result.chunk_index,
                        "completed": completed,
                        "total": total,
                        "ok": result.is_ok(),
                        "duration_ms": result.duration_ms,
                    })),
            );
            let index = result.chunk_index;
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(result);
            }
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!("Chunk worker stopped abnormally: {}", e);
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    warn!("Chunk {} never reported a result", index);
                    ChunkResult::failed(index, page_counts[index], ChunkError::WorkerLost { chunk: index })
                })
            })
            .collect()
    }
}

async fn run_chunk<B>(
    backend: &B,
    index: usize,
    chunk: &Chunk<B::Page>,
    strategy: &ProcessingStrategy,
    deadline: Duration,
    extract_tables: bool,
) -> ChunkResult
where
    B: ExtractionBackend + ?Sized,
{
    let started = Instant::now();
    let page_count = chunk.pages.len();

    let outcome = tokio::time::timeout(deadline, backend.process(chunk, strategy, chunk.page_offset)).await;
    let mut result = match outcome {
        Ok(Ok(output)) => {
            let mut result = ChunkResult::from_output(index, page_count, output);
            if extract_tables {
                result.financial_tables = financial_tables(&result.structured_pages);
            }
            result
        }
        Ok(Err(e)) => {
            warn!("Chunk {} failed: {}", index, e);
            ChunkResult::failed(
                index,
                page_count,
                ChunkError::Backend {
                    chunk: index,
                    detail: e.to_string(),
                },
            )
        }
        Err(_) => {
            warn!("Chunk {} timed out after {:?}", index, deadline);
            ChunkResult::failed(
                index,
                page_count,
                ChunkError::Timeout {
                    chunk: index,
                    secs: deadline.as_secs(),
                },
            )
        }
    };

    result.duration_ms = started.elapsed().as_millis() as u64;
    debug!("Chunk {} took {} ms", index, result.duration_ms);
    result
}

/// Run the financial-table extractor over the table elements of `pages`.
pub fn financial_tables(pages: &[StructuredPage]) -> FinancialTables {
    let tables: Vec<RawTable> = pages
        .iter()
        .flat_map(|page| page.tables().map(|rows| RawTable::new(page.page_num, rows.clone())))
        .collect();
    if tables.is_empty() {
        return FinancialTables::new();
    }
    FinancialTableExtractor::new().extract(&tables).found()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionBackendError;
    use crate::output::{ChunkOutput, PageElement};
    use crate::pipeline::classify::DocType;
    use crate::pipeline::financial::TableCategory;
    use crate::pipeline::render::PageImage;
    use crate::pipeline::strategy::get_strategy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails chunks whose first page is in `fail_pages`, sleeps on `slow_pages`.
    struct ScriptedBackend {
        fail_pages: Vec<usize>,
        slow_pages: Vec<usize>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(fail_pages: Vec<usize>, slow_pages: Vec<usize>) -> Self {
            Self {
                fail_pages,
                slow_pages,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ExtractionBackend for ScriptedBackend {
        type Page = PageImage;

        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn process(
            &self,
            chunk: &Chunk<PageImage>,
            _strategy: &ProcessingStrategy,
            page_offset: usize,
        ) -> Result<ChunkOutput, ExtractionBackendError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let first = page_offset + 1;
            let delay = if self.slow_pages.contains(&first) { 200 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_pages.contains(&first) {
                return Err(ExtractionBackendError::Api {
                    message: "503".into(),
                });
            }
            Ok(ChunkOutput {
                content: format!("pages from {first}"),
                structured_pages: chunk
                    .pages
                    .iter()
                    .map(|p| StructuredPage {
                        page_num: p.page_number,
                        elements: vec![PageElement::Table {
                            rows: vec![
                                vec!["과목".into(), "2023".into()],
                                vec!["매출액".into(), "1,000".into()],
                                vec!["당기순이익".into(), "100".into()],
                            ],
                        }],
                    })
                    .collect(),
                ..Default::default()
            })
        }
    }

    fn chunks(n: usize, per_chunk: usize) -> Vec<Chunk<PageImage>> {
        (0..n)
            .map(|i| Chunk {
                page_offset: i * per_chunk,
                pages: (0..per_chunk)
                    .map(|j| PageImage {
                        page_number: i * per_chunk + j + 1,
                        encoded_bytes: vec![0; 8],
                    })
                    .collect(),
            })
            .collect()
    }

    fn processor(concurrency: usize, timeout_ms: u64) -> ParallelChunkProcessor {
        ParallelChunkProcessor::new(ProcessorOptions {
            concurrency,
            chunk_timeout: Duration::from_millis(timeout_ms),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn results_come_back_in_chunk_order() {
        let backend = Arc::new(ScriptedBackend::new(vec![], vec![1]));
        let results = processor(3, 5_000)
            .process(backend, chunks(5, 2), get_strategy(DocType::MixedRich))
            .await;

        let order: Vec<_> = results.iter().map(|r| r.chunk_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert!(results.iter().all(ChunkResult::is_ok));
        assert_eq!(results[2].content, "pages from 5");
        assert_eq!(results[2].structured_pages[0].page_num, 5);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let backend = Arc::new(ScriptedBackend::new(vec![], vec![]));
        processor(2, 5_000)
            .process(Arc::clone(&backend), chunks(6, 1), get_strategy(DocType::MixedRich))
            .await;
        assert!(backend.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn failures_and_timeouts_stay_in_their_slot() {
        let backend = Arc::new(ScriptedBackend::new(vec![3], vec![5]));
        let results = processor(3, 100)
            .process(backend, chunks(3, 2), get_strategy(DocType::MixedRich))
            .await;

        assert!(results[0].is_ok());
        assert!(matches!(
            results[1].error,
            Some(ChunkError::Backend { chunk: 1, .. })
        ));
        assert!(matches!(
            results[2].error,
            Some(ChunkError::Timeout { chunk: 2, .. })
        ));
        assert_eq!(results[2].page_count, 2);
        assert!(results[1].content.is_empty());
    }

    #[tokio::test]
    async fn financial_tables_are_extracted_per_chunk() {
        let backend = Arc::new(ScriptedBackend::new(vec![], vec![]));
        let results = processor(1, 5_000)
            .process(backend, chunks(1, 1), get_strategy(DocType::SimpleForm))
            .await;
        let income = &results[0].financial_tables[&TableCategory::IncomeStatement];
        assert!(income.found);
        assert_eq!(income.metrics["매출액"], vec![Some(1000.0)]);
    }

    #[tokio::test]
    async fn progress_event_per_chunk() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let cb: ProgressCallback = Arc::new(move |e: &ProgressEvent| {
            if e.stage == Stage::Extract {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        let processor = ParallelChunkProcessor::new(ProcessorOptions {
            progress: Some(cb),
            ..Default::default()
        });
        let backend = Arc::new(ScriptedBackend::new(vec![1], vec![]));
        processor
            .process(backend, chunks(4, 1), get_strategy(DocType::MixedRich))
            .await;
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn empty_batch() {
        let backend = Arc::new(ScriptedBackend::new(vec![], vec![]));
        let results = ParallelChunkProcessor::default()
            .process(backend, Vec::new(), get_strategy(DocType::MixedRich))
            .await;
        assert!(results.is_empty());
    }
}
