//! Error types for the docblocks library.
//!
//! Three distinct error types reflect three distinct blast radii:
//!
//! * [`DocBlocksError`] — **Fatal**: the conversion cannot proceed at all
//!   (unreadable input, oversized upload, provider not configured). Returned
//!   as `Err(DocBlocksError)` from the top-level entry points.
//!
//! * [`PageError`] — **Non-fatal**: a single page failed (segmentation error,
//!   zero blocks after every retry) but other pages are fine. Document-level
//!   processing logs these and skips the page rather than aborting.
//!
//! * [`BlockFailure`] — **Block-local**: one region's extraction produced a
//!   malformed response or the API call died. Stored inside the block's
//!   [`crate::output::BlockText::Failed`] state; the block is still emitted
//!   and the failure never crosses the page boundary.
//!
//! The separation makes partial completion an explicit, inspectable state:
//! a document result can carry nine good pages and one `PageError`, and a
//! page result can carry a failed table next to twelve extracted paragraphs.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docblocks library.
///
/// Page-level failures use [`PageError`] and block-level failures use
/// [`BlockFailure`]; neither is propagated here.
#[derive(Debug, Error)]
pub enum DocBlocksError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Upload exceeds the size cap. Rejected before any model is invoked.
    #[error("File too large: {size_mb:.1} MB (max {limit_mb} MB)")]
    FileTooLarge { size_mb: f64, limit_mb: u64 },

    /// File extension is not in the allow-list.
    #[error("File type '{extension}' not allowed. Only jpg, jpeg, png, gif are supported.")]
    UnsupportedImageType { extension: String },

    /// The bytes could not be decoded as a raster image.
    #[error("Failed to decode image: {detail}")]
    ImageDecode { detail: String },

    // ── PDF errors (batch conversion) ─────────────────────────────────────
    /// The PDF could not be opened or parsed.
    #[error("Failed to open PDF '{path}': {detail}")]
    PdfOpenFailed { path: PathBuf, detail: String },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// The page-selection expression could not be parsed.
    #[error("Invalid page selection '{0}': expected e.g. '2', '1,2,3', ',8' or '3,'")]
    InvalidPageSelection(String),

    // ── VLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every selected page failed after all retries; output would be empty.
    #[error("All {total} pages failed after {attempts} attempts each.\nFirst error: {first_error}")]
    AllPagesFailed {
        total: usize,
        attempts: u32,
        first_error: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Document-level processing collects these in
/// [`crate::output::DocumentResult::failed`] and continues with the
/// remaining pages.
//
// NOTE: the `source` field here is a *page identifier*, not an error source.
// `thiserror`'s `#[derive(Error)]` unconditionally treats any field literally
// named `source` as the `std::error::Error::source()` value (there is no
// opt-out attribute), which requires that field to implement `Error` — a
// `String` does not. To keep the public field name, the serde wire format, and
// the exact display strings unchanged, `Display`/`Error` are implemented by
// hand below instead of derived.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The layout segmenter failed for this page.
    Segmentation { source: String, detail: String },

    /// The page image could not be decoded.
    Decode { source: String, detail: String },

    /// The page produced zero blocks on every attempt.
    Empty { source: String, attempts: u32 },

    /// Whole-page VLM object discovery failed.
    Discovery { source: String, detail: String },
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageError::Segmentation { source, detail } => {
                write!(f, "Page '{source}': segmentation failed: {detail}")
            }
            PageError::Decode { source, detail } => {
                write!(f, "Page '{source}': decode failed: {detail}")
            }
            PageError::Empty { source, attempts } => {
                write!(f, "Page '{source}': no blocks after {attempts} attempts")
            }
            PageError::Discovery { source, detail } => {
                write!(f, "Page '{source}': object discovery failed: {detail}")
            }
        }
    }
}

impl std::error::Error for PageError {}

impl PageError {
    /// The source identifier of the page this error belongs to.
    pub fn source_id(&self) -> &str {
        match self {
            PageError::Segmentation { source, .. }
            | PageError::Decode { source, .. }
            | PageError::Empty { source, .. }
            | PageError::Discovery { source, .. } => source,
        }
    }
}

/// A block-local extraction failure.
///
/// Recorded against the one block that failed; the page result still
/// contains the block (with absent text) and every sibling block.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum BlockFailure {
    /// The VLM response was not the required `{"markdown": ...}` envelope.
    #[error("malformed extraction response: {detail}")]
    Malformed { detail: String },

    /// The VLM call itself failed (transport, HTTP, provider error).
    #[error("extraction call failed: {detail}")]
    Api { detail: String },
}

/// Errors surfaced by a [`crate::segment::Segmenter`] implementation.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// The segmentation request could not be sent or timed out.
    #[error("segmentation request failed: {0}")]
    Transport(String),

    /// The segmentation service answered with a non-success HTTP status.
    #[error("segmentation service returned HTTP {status}")]
    Status { status: u16 },

    /// The service responded but the payload was not understood.
    #[error("malformed segmentation response: {0}")]
    Malformed(String),
}
