//! Error types for the edgequake-docintel library.
//!
//! Failures fall into three tiers:
//!
//! * [`DocIntelError`] is **fatal**: the document cannot be processed at all
//!   (missing file, not a PDF, pdfium unavailable). Returned as
//!   `Err(DocIntelError)` from the top-level `process_document*` functions.
//!
//! * [`ExtractionBackendError`] is **recoverable per document**: the vision
//!   path could not produce a usable result (provider missing, rasterisation
//!   failed, every chunk failed). The pipeline answers it by re-running the
//!   document through the local text backend and flagging `fallback_used`.
//!
//! * [`ChunkError`] is **recoverable per chunk**: one chunk failed or timed
//!   out mid-batch. Stored inside [`crate::output::ChunkResult`]; the merge
//!   treats the chunk as empty and records the failure.
//!
//! Cache and numeral-parsing errors never leave their modules: a corrupt
//! cache entry is a miss and an unparseable cell is `None`.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-docintel library.
#[derive(Debug, Error)]
pub enum DocIntelError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    NotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but pdfium cannot open it (or it is not a PDF at all).
    #[error("Invalid PDF document '{path}': {detail}")]
    InvalidDocument { path: PathBuf, detail: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/dir-containing-libpdfium or install pdfium\n\
system-wide so the dynamic loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, runtime construction).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The vision path failed for the whole document.
///
/// Never surfaced to the caller: [`crate::process`] converts it into a local
/// fallback and records the message as `fallback_reason`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractionBackendError {
    /// No vision provider could be constructed (missing API key etc.).
    #[error("vision backend unavailable: {reason}")]
    Unavailable { reason: String },

    /// The provider rejected the request or the network call failed.
    #[error("vision API error: {message}")]
    Api { message: String },

    /// The call exceeded its deadline.
    #[error("vision API call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider answered with something that carries no content.
    #[error("malformed vision response: {detail}")]
    MalformedResponse { detail: String },

    /// Pages could not be rasterised for the vision path.
    #[error("rasterisation failed: {detail}")]
    Rasterisation { detail: String },

    /// Every chunk of the batch failed; there is nothing to merge.
    #[error("all {total} chunks failed; first error: {first_error}")]
    AllChunksFailed { total: usize, first_error: String },
}

/// A non-fatal error for a single chunk.
///
/// Stored in [`crate::output::ChunkResult::error`]. The batch continues.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkError {
    /// The backend returned an error for this chunk.
    #[error("chunk {chunk}: backend failed: {detail}")]
    Backend { chunk: usize, detail: String },

    /// The chunk exceeded its deadline.
    #[error("chunk {chunk}: timed out after {secs}s")]
    Timeout { chunk: usize, secs: u64 },

    /// The worker processing this chunk died before reporting.
    #[error("chunk {chunk}: worker stopped before reporting a result")]
    WorkerLost { chunk: usize },
}

impl ChunkError {
    /// Index of the chunk this error belongs to.
    pub fn chunk(&self) -> usize {
        match self {
            ChunkError::Backend { chunk, .. }
            | ChunkError::Timeout { chunk, .. }
            | ChunkError::WorkerLost { chunk } => *chunk,
        }
    }
}

/// A numeric cell could not be parsed.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("cannot parse '{input}' as a number: {reason}")]
pub struct NumeralParseError {
    pub input: String,
    pub reason: String,
}
