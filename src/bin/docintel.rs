//! CLI binary for edgequake-docintel.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ProcessingConfig` and prints the JSON payload.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docintel::{
    DocumentPipeline, OutputMode, PipelineProgressCallback, ProcessingConfig, ProgressCallback,
    ProgressEvent, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback. Starts as a spinner and turns into a chunk
/// counter once the extraction stage announces how many chunks it queued.
/// Chunk events arrive in completion order, not chunk order.
struct CliProgressCallback {
    bar: ProgressBar,
    failed_chunks: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failed_chunks: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: u64) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn on_chunk_done(&self, data: &serde_json::Value) {
        let index = data["chunk_index"].as_u64().unwrap_or(0);
        let ms = data["duration_ms"].as_u64().unwrap_or(0);
        let ok = data["ok"].as_bool().unwrap_or(true);
        if ok {
            self.bar.println(format!(
                "  {} Chunk {:>3}  {}",
                green("✓"),
                index,
                dim(&format!("{:.1}s", ms as f64 / 1000.0)),
            ));
        } else {
            self.failed_chunks.fetch_add(1, Ordering::SeqCst);
            self.bar.println(format!(
                "  {} Chunk {:>3}  {}",
                red("✗"),
                index,
                dim(&format!("{:.1}s", ms as f64 / 1000.0)),
            ));
        }
        self.bar.inc(1);
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_event(&self, event: &ProgressEvent) {
        match (event.stage, event.data.as_ref()) {
            (Stage::Classify, _) => {
                self.bar.println(format!("{} {}", cyan("◆"), bold(&event.message)));
                self.bar.set_prefix("Routing");
            }
            // The "queued" event carries the total; per-chunk events carry the index.
            (Stage::Extract, Some(data)) if data.get("chunk_index").is_some() => {
                self.on_chunk_done(data)
            }
            (Stage::Extract, Some(data)) => {
                self.activate_bar(data["total"].as_u64().unwrap_or(0));
            }
            (Stage::Complete, _) => {
                self.bar.finish_and_clear();
                let failed = self.failed_chunks.load(Ordering::SeqCst);
                if failed == 0 {
                    eprintln!("{} {}", green("✔"), event.message);
                } else {
                    eprintln!("{} {} ({} chunks failed)", cyan("⚠"), event.message, red(&failed.to_string()));
                }
            }
            (stage, _) => {
                self.bar.set_prefix(capitalise(stage.as_str()));
                self.bar.set_message(event.message.clone());
            }
        }
    }
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Classify, extract and print the structured payload
  docintel audit_report.pdf

  # Financial statements only, written to a file
  docintel --output-mode tables-only audit_report.pdf -o tables.json

  # Just the classification (no API key needed)
  docintel --classify-only registry_scan.pdf

  # Force a provider and skip the cache
  docintel --provider anthropic --no-cache deck.pdf

DOCUMENT TYPES & STRATEGIES:
  Type              Extraction   Model tier   DPI
  ────────────────  ───────────  ───────────  ───
  pure_text         local        -            -
  text_with_tables  local        -            -
  small_table       local        -            -
  simple_form       vision       cheap        100
  mixed_rich        vision       standard     150
  image_heavy       vision       standard     120
  fully_scanned     vision       standard     200

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter (overrides --verbose / --quiet)
"#;

/// Classify PDFs and extract their content and financial statements.
#[derive(Parser, Debug)]
#[command(
    name = "docintel",
    version,
    about = "Classify PDFs and extract their content and financial statements",
    long_about = "Classify a PDF by its text, image and table signals, extract it with the \
cheapest strategy that fits (local text layer or a vision model over rendered pages), and \
pull income statements, balance sheets, cash flow statements and cap tables out of the result.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    input: PathBuf,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "DOCINTEL_OUTPUT")]
    output: Option<PathBuf>,

    /// Maximum pages scanned and extracted.
    #[arg(long, env = "DOCINTEL_MAX_PAGES", default_value_t = 50)]
    max_pages: usize,

    /// Payload shape.
    #[arg(long, env = "DOCINTEL_OUTPUT_MODE", value_enum, default_value = "structured")]
    output_mode: OutputModeArg,

    /// Skip financial table classification.
    #[arg(long, env = "DOCINTEL_NO_FINANCIAL_TABLES")]
    no_financial_tables: bool,

    /// Number of chunk extractions in flight.
    #[arg(short, long, env = "DOCINTEL_CONCURRENCY", default_value_t = 3)]
    concurrency: usize,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "DOCINTEL_PROVIDER")]
    provider: Option<String>,

    /// Model for forms and other cheap-tier documents.
    #[arg(long, env = "DOCINTEL_CHEAP_MODEL")]
    cheap_model: Option<String>,

    /// Model for scanned, image-heavy and mixed documents.
    #[arg(long, env = "DOCINTEL_STANDARD_MODEL")]
    standard_model: Option<String>,

    /// Per-chunk deadline in seconds, retries included.
    #[arg(long, env = "DOCINTEL_CHUNK_TIMEOUT", default_value_t = 300)]
    chunk_timeout: u64,

    /// Cache root directory.
    #[arg(long, env = "DOCINTEL_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Tenant namespace inside the cache.
    #[arg(long, env = "DOCINTEL_TENANT", default_value = "default")]
    tenant: String,

    /// Neither read nor write the result cache.
    #[arg(long, env = "DOCINTEL_NO_CACHE")]
    no_cache: bool,

    /// Print the classification only, no extraction.
    #[arg(long)]
    classify_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCINTEL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCINTEL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCINTEL_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OutputModeArg {
    TextOnly,
    Structured,
    TablesOnly,
}

impl From<OutputModeArg> for OutputMode {
    fn from(v: OutputModeArg) -> Self {
        match v {
            OutputModeArg::TextOnly => OutputMode::TextOnly,
            OutputModeArg::Structured => OutputMode::Structured,
            OutputModeArg::TablesOnly => OutputMode::TablesOnly,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Only errors while the progress bar owns the terminal.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.classify_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let pipeline = DocumentPipeline::new(config);

    // ── Classify-only mode ───────────────────────────────────────────────
    let json = if cli.classify_only {
        let classification = pipeline
            .classify(&cli.input)
            .await
            .context("Failed to classify PDF")?;
        serde_json::to_string_pretty(&classification).context("Failed to serialise classification")?
    } else {
        let payload = pipeline
            .process_document(&cli.input)
            .await
            .context("Processing failed")?;

        if !cli.quiet {
            eprintln!(
                "   {}  {}  {}/{} pages  {:.2}s{}",
                payload.doc_type.map(|t| t.to_string()).unwrap_or_default(),
                dim(&format!("{:?}", payload.processing_method)),
                payload.pages_read,
                payload.total_pages,
                payload.processing_time_seconds,
                if payload.cache_hit { dim("  (cached)") } else { String::new() },
            );
        }
        serde_json::to_string_pretty(&payload).context("Failed to serialise payload")?
    };

    // ── Write output ─────────────────────────────────────────────────────
    match cli.output {
        Some(ref path) => {
            write_atomic(path, json.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !cli.quiet {
                eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .context("Failed to write to stdout")?;
            handle.write_all(b"\n").ok();
        }
    }

    Ok(())
}

/// Map CLI args to `ProcessingConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ProcessingConfig> {
    let mut builder = ProcessingConfig::builder()
        .max_pages(cli.max_pages)
        .output_mode(cli.output_mode.clone().into())
        .extract_financial_tables(!cli.no_financial_tables)
        .concurrency(cli.concurrency)
        .chunk_timeout_secs(cli.chunk_timeout)
        .use_cache(!cli.no_cache)
        .tenant_id(cli.tenant.clone());

    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p.clone());
    }
    if let Some(ref m) = cli.cheap_model {
        builder = builder.cheap_model(m.clone());
    }
    if let Some(ref m) = cli.standard_model {
        builder = builder.standard_model(m.clone());
    }
    if let Some(ref dir) = cli.cache_dir {
        builder = builder.cache_dir(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Write via a sibling temp file and rename, so readers never see a partial file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}
