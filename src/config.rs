//! Configuration types for document processing.
//!
//! All pipeline behaviour is controlled through [`ProcessingConfig`], built
//! via its [`ProcessingConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share a config across tasks and to fingerprint the fields
//! that change output for the result cache.

use crate::error::DocIntelError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for processing one document.
///
/// Built via [`ProcessingConfig::builder()`] or using
/// [`ProcessingConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_docintel::{OutputMode, ProcessingConfig};
///
/// let config = ProcessingConfig::builder()
///     .max_pages(20)
///     .output_mode(OutputMode::TablesOnly)
///     .concurrency(3)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ProcessingConfig {
    /// Maximum number of pages scanned and extracted. Default: 50.
    ///
    /// Pages beyond this limit are counted in `total_pages` but never read.
    pub max_pages: usize,

    /// Shape of the returned payload. Default: [`OutputMode::Structured`].
    ///
    /// Only the projection changes; extraction is identical in every mode.
    pub output_mode: OutputMode,

    /// Classify extracted tables into canonical financial statements. Default: true.
    pub extract_financial_tables: bool,

    /// Number of chunk extraction calls in flight at once. Default: 3.
    ///
    /// This bounds concurrency against the external vision API, not CPU use.
    pub concurrency: usize,

    /// Deadline for one chunk, retries included, in seconds. Default: 300.
    pub chunk_timeout_secs: u64,

    /// Deadline for a single vision API attempt in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Maximum retry attempts on a transient vision API failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Sampling temperature for the vision model. Default: 0.1.
    pub temperature: f32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// Caps memory for oversized pages regardless of the strategy DPI.
    pub max_rendered_pixels: u32,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider, used for both model tiers.
    /// Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Model used for the cheap tier. Default: "gpt-4.1-nano".
    pub cheap_model: String,

    /// Model used for the standard tier. Default: "gpt-4.1-mini".
    pub standard_model: String,

    /// Read and write the result cache. Default: true.
    pub use_cache: bool,

    /// Cache root directory. If None, `<platform cache dir>/edgequake-docintel`.
    pub cache_dir: Option<PathBuf>,

    /// Maximum age of a cache entry in seconds. Default: 7 days.
    pub cache_ttl_secs: u64,

    /// Opaque tenant/user identifier namespacing the cache. Default: "default".
    pub tenant_id: String,

    /// Receives stage and chunk notifications. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            output_mode: OutputMode::default(),
            extract_financial_tables: true,
            concurrency: 3,
            chunk_timeout_secs: 300,
            api_timeout_secs: 60,
            max_retries: 3,
            retry_backoff_ms: 500,
            temperature: 0.1,
            max_rendered_pixels: 2000,
            provider_name: None,
            provider: None,
            cheap_model: "gpt-4.1-nano".to_string(),
            standard_model: "gpt-4.1-mini".to_string(),
            use_cache: true,
            cache_dir: None,
            cache_ttl_secs: 7 * 24 * 60 * 60,
            tenant_id: "default".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("max_pages", &self.max_pages)
            .field("output_mode", &self.output_mode)
            .field("extract_financial_tables", &self.extract_financial_tables)
            .field("concurrency", &self.concurrency)
            .field("chunk_timeout_secs", &self.chunk_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("cheap_model", &self.cheap_model)
            .field("standard_model", &self.standard_model)
            .field("use_cache", &self.use_cache)
            .field("cache_dir", &self.cache_dir)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("tenant_id", &self.tenant_id)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Resolve the cache root, falling back to the platform cache directory
    /// and finally to the system temp directory.
    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("edgequake-docintel")
        })
    }
}

/// Builder for [`ProcessingConfig`].
#[derive(Debug)]
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl ProcessingConfigBuilder {
    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n.max(1);
        self
    }

    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.config.output_mode = mode;
        self
    }

    pub fn extract_financial_tables(mut self, v: bool) -> Self {
        self.config.extract_financial_tables = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn chunk_timeout_secs(mut self, secs: u64) -> Self {
        self.config.chunk_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn cheap_model(mut self, model: impl Into<String>) -> Self {
        self.config.cheap_model = model.into();
        self
    }

    pub fn standard_model(mut self, model: impl Into<String>) -> Self {
        self.config.standard_model = model.into();
        self
    }

    pub fn use_cache(mut self, v: bool) -> Self {
        self.config.use_cache = v;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.cache_ttl_secs = secs;
        self
    }

    pub fn tenant_id(mut self, tenant: impl Into<String>) -> Self {
        self.config.tenant_id = tenant.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessingConfig, DocIntelError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(DocIntelError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.chunk_timeout_secs == 0 || c.api_timeout_secs == 0 {
            return Err(DocIntelError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        // The tenant id becomes a directory name under the cache root.
        if c.tenant_id.is_empty()
            || c.tenant_id == "."
            || c.tenant_id == ".."
            || c.tenant_id.contains(['/', '\\'])
        {
            return Err(DocIntelError::InvalidConfig(format!(
                "tenant_id must be a single path component, got {:?}",
                c.tenant_id
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Shape of the payload returned by `process_document`.
///
/// | Mode | content | structured_content | financial_tables |
/// |------|---------|--------------------|------------------|
/// | `text_only` | yes | no | no |
/// | `structured` | yes | yes | yes |
/// | `tables_only` | no | no | yes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    TextOnly,
    #[default]
    Structured,
    TablesOnly,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::TextOnly => "text_only",
            OutputMode::Structured => "structured",
            OutputMode::TablesOnly => "tables_only",
        }
    }
}
