//! Vision-model extraction: rasterised pages in, structured markdown out.
//!
//! This module is intentionally thin on prompt text: all prompt engineering
//! lives in [`crate::prompts`], so it can change without touching the retry
//! or error-handling logic here.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Each attempt gets its own deadline (`api_timeout_secs`)
//! and failed attempts back off exponentially (`retry_backoff_ms * 2^n`):
//! with 500 ms base and 3 retries the wait sequence is 500 ms → 1 s → 2 s.
//!
//! ## Page labels
//!
//! A chunk holds several page images. The user turn tells the model the
//! global page numbers of the attached images and the system prompt asks for
//! a `<!-- page N -->` marker per page; [`build_output`] splits on those
//! markers, so every structured page carries its global number even when the
//! model numbers pages from 1.

use super::ExtractionBackend;
use crate::config::ProcessingConfig;
use crate::error::ExtractionBackendError;
use crate::output::{ChunkOutput, StructuredPage};
use crate::pipeline::chunk::Chunk;
use crate::pipeline::encode::to_image_data;
use crate::pipeline::render::PageImage;
use crate::pipeline::strategy::{ModelTier, ProcessingStrategy};
use crate::pipeline::structure::{extract_company_info, normalize_markdown, parse_elements, split_page_markers};
use crate::prompts::{page_labels_instruction, system_prompt};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Backend that sends page images to a vision-capable LLM.
///
/// Holds one provider per [`ModelTier`]; cheap strategies go to the cheap
/// model, everything else to the standard one.
#[derive(Clone)]
pub struct VisionBackend {
    cheap: Arc<dyn LLMProvider>,
    standard: Arc<dyn LLMProvider>,
    temperature: f32,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout: Duration,
}

impl std::fmt::Debug for VisionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionBackend")
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout", &self.api_timeout)
            .finish_non_exhaustive()
    }
}

impl VisionBackend {
    /// Backend with explicit providers per tier and default call settings.
    pub fn new(cheap: Arc<dyn LLMProvider>, standard: Arc<dyn LLMProvider>) -> Self {
        Self {
            cheap,
            standard,
            temperature: 0.1,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout: Duration::from_secs(60),
        }
    }

    /// Use one provider for both tiers.
    pub fn with_provider(provider: Arc<dyn LLMProvider>) -> Self {
        Self::new(Arc::clone(&provider), provider)
    }

    /// Copy temperature, retry and timeout settings from `config`.
    pub fn with_settings(mut self, config: &ProcessingConfig) -> Self {
        self.temperature = config.temperature;
        self.max_retries = config.max_retries;
        self.retry_backoff_ms = config.retry_backoff_ms;
        self.api_timeout = Duration::from_secs(config.api_timeout_secs);
        self
    }

    /// Resolve providers from the config, from most-specific to
    /// least-specific:
    ///
    /// 1. `config.provider`: used for both tiers as-is.
    /// 2. `config.provider_name`: that provider with `cheap_model` and
    ///    `standard_model`.
    /// 3. `$EDGEQUAKE_LLM_PROVIDER`: same, with the named provider.
    /// 4. `$OPENAI_API_KEY` present: OpenAI.
    /// 5. `ProviderFactory::from_env()` auto-detection (single model).
    pub fn from_config(config: &ProcessingConfig) -> Result<Self, ExtractionBackendError> {
        if let Some(ref provider) = config.provider {
            return Ok(Self::with_provider(Arc::clone(provider)).with_settings(config));
        }

        let named = config.provider_name.clone().or_else(|| {
            std::env::var("EDGEQUAKE_LLM_PROVIDER")
                .ok()
                .filter(|p| !p.is_empty())
        });
        let named = named.or_else(|| {
            std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(|_| "openai".to_string())
        });

        if let Some(name) = named {
            let cheap = create_provider(&name, &config.cheap_model)?;
            let standard = create_provider(&name, &config.standard_model)?;
            info!(
                "Vision providers: {} ({} / {})",
                name, config.cheap_model, config.standard_model
            );
            return Ok(Self::new(cheap, standard).with_settings(config));
        }

        let (llm, _embedding) =
            ProviderFactory::from_env().map_err(|e| ExtractionBackendError::Unavailable {
                reason: format!(
                    "no LLM provider could be auto-detected from environment \
                     (set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider): {e}"
                ),
            })?;
        Ok(Self::with_provider(llm).with_settings(config))
    }

    fn provider_for(&self, tier: ModelTier) -> &Arc<dyn LLMProvider> {
        match tier {
            ModelTier::Cheap => &self.cheap,
            ModelTier::None | ModelTier::Standard => &self.standard,
        }
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ExtractionBackendError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| ExtractionBackendError::Unavailable {
        reason: format!("provider '{name}' with model '{model}': {e}"),
    })
}

/// Turn raw model output for a chunk into a [`ChunkOutput`].
///
/// Output without any content is a malformed response.
pub(crate) fn build_output(
    raw: &str,
    first_page: usize,
    page_count: usize,
) -> Result<ChunkOutput, ExtractionBackendError> {
    let content = normalize_markdown(raw);
    if content.is_empty() {
        return Err(ExtractionBackendError::MalformedResponse {
            detail: format!(
                "empty response for pages {}-{}",
                first_page,
                first_page + page_count.saturating_sub(1)
            ),
        });
    }

    let structured_pages = split_page_markers(&content, first_page, page_count)
        .into_iter()
        .map(|(page_num, markdown)| StructuredPage {
            page_num,
            elements: parse_elements(&markdown),
        })
        .collect();
    let company_info = extract_company_info(&content);

    Ok(ChunkOutput {
        content: content.trim_end().to_string(),
        structured_pages,
        company_info,
        input_tokens: 0,
        output_tokens: 0,
    })
}

#[async_trait]
impl ExtractionBackend for VisionBackend {
    type Page = PageImage;

    fn name(&self) -> &'static str {
        "vision"
    }

    async fn process(
        &self,
        chunk: &Chunk<PageImage>,
        strategy: &ProcessingStrategy,
        page_offset: usize,
    ) -> Result<ChunkOutput, ExtractionBackendError> {
        let system = system_prompt(strategy.prompt_type).ok_or_else(|| {
            ExtractionBackendError::Unavailable {
                reason: format!("prompt '{}' has no vision template", strategy.prompt_type.as_str()),
            }
        })?;
        let provider = self.provider_for(strategy.model_tier);
        let first_page = page_offset + 1;
        let page_count = chunk.len();

        let images = chunk
            .pages
            .iter()
            .map(|page| to_image_data(&page.encoded_bytes))
            .collect();
        let messages = vec![
            ChatMessage::system(system),
            ChatMessage::user_with_images(page_labels_instruction(first_page, page_count), images),
        ];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(strategy.max_tokens as usize),
            ..Default::default()
        };

        let start = Instant::now();
        let mut last_err: Option<ExtractionBackendError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Pages {}+{}: retry {}/{} after {}ms",
                    first_page, page_count, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(self.api_timeout, provider.chat(&messages, Some(&options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "Pages {}+{}: {} input tokens, {} output tokens, {:?}",
                        first_page,
                        page_count,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    let mut output = build_output(&response.content, first_page, page_count)?;
                    output.input_tokens = response.prompt_tokens as u64;
                    output.output_tokens = response.completion_tokens as u64;
                    return Ok(output);
                }
                Ok(Err(e)) => {
                    warn!("Pages {}+{}: attempt {} failed: {}", first_page, page_count, attempt + 1, e);
                    last_err = Some(ExtractionBackendError::Api {
                        message: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        "Pages {}+{}: attempt {} timed out after {:?}",
                        first_page,
                        page_count,
                        attempt + 1,
                        self.api_timeout
                    );
                    last_err = Some(ExtractionBackendError::Timeout {
                        secs: self.api_timeout.as_secs(),
                    });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ExtractionBackendError::Api {
            message: "no attempt was made".to_string(),
        }))
    }
}
