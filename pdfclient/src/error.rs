//! Error types for pdfclient

use thiserror::Error;

/// Result type for pdfclient operations
pub type Result<T> = std::result::Result<T, PdfError>;

/// Error types for operations on an open document.
///
/// Load-time outcomes are not errors; they are returned as
/// [`LoadResult`](crate::LoadResult) variants. Per-operation failures on
/// pages and widgets are boolean or empty-result signals, so this enum
/// stays small.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Page index out of bounds
    #[error("Page index {index} out of bounds (document has {count} pages)")]
    PageIndexOutOfBounds { index: usize, count: usize },

    /// Failed to load page
    #[error("Failed to load page {index}")]
    PageLoadFailed { index: usize },

    /// Failed to save document
    #[error("Failed to save document: {reason}")]
    SaveFailed { reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
