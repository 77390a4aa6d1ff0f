//! Input validation: check that a local path is a readable PDF.
//!
//! We validate the PDF magic bytes (`%PDF`) before anything else so callers
//! get a meaningful error rather than a pdfium failure deep in a blocking
//! task.

use crate::error::DocIntelError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolve a local file path, validating existence and PDF magic bytes.
pub fn resolve_local(path: &Path) -> Result<PathBuf, DocIntelError> {
    let path = path.to_path_buf();

    if !path.is_file() {
        return Err(DocIntelError::NotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(DocIntelError::PermissionDenied { path });
        }
        Err(_) => return Err(DocIntelError::NotFound { path }),
    };

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
        return Err(DocIntelError::InvalidDocument {
            path,
            detail: format!("missing %PDF header (found {:?})", String::from_utf8_lossy(&magic)),
        });
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}
