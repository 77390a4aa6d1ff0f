//! Pipeline stages for document intelligence.
//!
//! Each submodule implements one step. Keeping stages separate makes each
//! independently testable and lets the orchestration in [`crate::process`]
//! swap implementations (a fake PDF reader, a scripted backend) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ pdf ──▶ classify ──▶ strategy ──▶ render ──▶ chunk ──▶ processor ──▶ merge
//! (path)   (scan)   (DocType)    (table)     (PNG)      (bins)    (backend ×N)   (pages)
//!                                                                     │
//!                                                              financial + numeral
//! ```
//!
//! 1. [`input`]: validate the path and the `%PDF` header
//! 2. [`pdf`]: pdfium access behind the [`pdf::PdfReader`] trait;
//!    per-page text, image counts and geometric table detection
//! 3. [`classify`]: fixed-priority decision tree over the scan signals
//! 4. [`strategy`]: static `DocType` → `ProcessingStrategy` table
//! 5. [`render`] / [`encode`]: rasterise pages on the blocking pool, PNG
//!    and base64 for the model request
//! 6. [`chunk`]: greedy packing under page and byte limits
//! 7. [`backend`]: local text or vision-model extraction of one chunk
//! 8. [`processor`]: bounded worker pool with per-chunk deadlines
//! 9. [`merge`]: chunk results back into one page-ordered document
//! 10. [`financial`] / [`numeral`]: statement tables and Korean numerals
//!
//! [`structure`] holds the markdown helpers both backends share.

pub mod backend;
pub mod chunk;
pub mod classify;
pub mod encode;
pub mod financial;
pub mod input;
pub mod merge;
pub mod numeral;
pub mod pdf;
pub mod processor;
pub mod render;
pub mod strategy;
pub mod structure;
