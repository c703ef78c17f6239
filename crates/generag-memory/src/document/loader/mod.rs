mod pdf;
mod text;

use std::path::Path;

pub use pdf::PdfLoader;
pub use text::TextLoader;

use super::{DocumentError, DocumentLoader};

/// Pick a loader from the file extension (case-insensitive).
///
/// # Errors
///
/// Returns [`DocumentError::UnsupportedFormat`] for extensions no loader handles.
pub fn loader_for(path: &Path, max_file_size: u64) -> Result<Box<dyn DocumentLoader>, DocumentError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let pdf = PdfLoader { max_file_size };
    if pdf.supported_extensions().contains(&ext.as_str()) {
        return Ok(Box::new(pdf));
    }
    let text = TextLoader { max_file_size };
    if text.supported_extensions().contains(&ext.as_str()) {
        return Ok(Box::new(text));
    }
    Err(DocumentError::UnsupportedFormat(if ext.is_empty() {
        path.display().to_string()
    } else {
        format!(".{ext}")
    }))
}

/// Canonicalize `path` and reject it when larger than `max_size`.
pub(super) async fn checked_path(
    path: &Path,
    max_size: u64,
) -> Result<std::path::PathBuf, DocumentError> {
    let path = tokio::fs::canonicalize(path).await?;
    let meta = tokio::fs::metadata(&path).await?;
    if meta.len() > max_size {
        return Err(DocumentError::FileTooLarge {
            size: meta.len(),
            limit: max_size,
        });
    }
    Ok(path)
}
