//! Result types shared across the pipeline.
//!
//! The core representation for geometry is the two-corner box
//! `[x1, y1, x2, y2]` in the source image's native pixel space. Producers
//! that historically spoke `[x, y, width, height]` convert at their own
//! boundary via [`BBox::from_xywh`]; nothing inside the pipeline ever sees
//! the other convention.
//!
//! Per-block extraction state is explicit ([`BlockText`]) rather than an
//! empty-string-means-something convention: `Skipped` (the router decided
//! not to extract), `Extracted` (text present), `Failed` (isolated
//! extraction failure, reason attached). Wire serialisation collapses all
//! non-extracted states to `null`.

use crate::error::{BlockFailure, PageError};
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// ── Geometry ─────────────────────────────────────────────────────────────

/// An axis-aligned bounding box in integer pixel coordinates, two-corner
/// convention: `(x1, y1)` top-left inclusive, `(x2, y2)` bottom-right
/// exclusive.
///
/// Serialises as the flat array `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Convert from the legacy `[x, y, width, height]` convention.
    pub fn from_xywh(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self {
            x1: x,
            y1: y,
            x2: x + w,
            y2: y + h,
        }
    }

    pub fn width(&self) -> u32 {
        (self.x2 - self.x1).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y2 - self.y1).max(0) as u32
    }
}

impl From<[i32; 4]> for BBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [i32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

// ── Pipeline entities ────────────────────────────────────────────────────

/// A raw layout detection as produced by the segmentation model.
///
/// The bbox is in the page image's native pixel space; any model-internal
/// coordinate space has already been rescaled away by the producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Element type label, e.g. `"text"`, `"table"`, `"picture"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub bbox: BBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// A detection whose geometry has been clamped to the image bounds and
/// whose crop has been padded for the extraction model.
///
/// The crop is owned by the pipeline invocation that produced it and is
/// never shared across requests.
#[derive(Debug, Clone)]
pub struct NormalizedRegion {
    pub detection: Detection,
    /// The clamped bbox (the padded crop keeps the original content at its
    /// top-left corner, so this box still addresses it in page space).
    pub bbox: BBox,
    /// The cropped-and-padded raster handed to the extraction model.
    pub crop: DynamicImage,
}

/// Per-block extraction state.
///
/// `Skipped` and `Failed` are distinct on purpose: a picture was never
/// supposed to have text, while a failed table had text we could not get.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BlockText {
    /// The router selected this block and extraction produced text.
    Extracted(String),
    /// The router decided not to extract (graphics, bbox-only mode), or the
    /// model returned an empty response.
    Skipped,
    /// Extraction was attempted and failed; the block survives regardless.
    Failed(BlockFailure),
}

impl BlockText {
    /// The extracted text, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            BlockText::Extracted(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, BlockText::Failed(_))
    }
}

/// One typed content block of a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: String,
    /// Clamped two-corner bbox in the page's native pixel space.
    pub bbox: BBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub text: BlockText,
}

/// The ordered block list for a single page image.
///
/// Block order equals the segmentation model's detection order; nothing
/// re-sorts it (heading promotion in the assembler is a rendering rule, not
/// a reorder rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// Source identifier, e.g. the page image's file name. Used for page
    /// ordering and tie-breaking in multi-page documents.
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub blocks: Vec<Block>,
}

/// The ordered page list for a multi-page document.
///
/// Pages are ordered by the page number extracted from their source
/// identifier (see [`extract_page_number`]); unnumbered pages sort last,
/// alphabetically. Failed pages are recorded, not silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    pub pages: Vec<PageResult>,
    pub failed: Vec<PageError>,
}

impl DocumentResult {
    /// Order `pages` by extracted page number, ties broken alphabetically
    /// by source identifier; unnumbered pages after all numbered ones.
    pub fn sort_pages(&mut self) {
        self.pages.sort_by(|a, b| {
            page_order_key(&a.source).cmp(&page_order_key(&b.source))
        });
    }
}

// ── Wire types (single-image boundary) ───────────────────────────────────

/// One object of the `{objects: [...]}` boundary payload.
///
/// `text` is always present on the wire: a string for extracted blocks,
/// `null` for skipped and failed ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub bbox: BBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub text: Option<String>,
}

/// The full extraction payload of the single-image boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectsResponse {
    pub objects: Vec<ObjectBlock>,
}

impl From<&PageResult> for ObjectsResponse {
    fn from(page: &PageResult) -> Self {
        ObjectsResponse {
            objects: page
                .blocks
                .iter()
                .map(|b| ObjectBlock {
                    kind: b.kind.clone(),
                    bbox: b.bbox,
                    confidence: b.confidence,
                    text: b.text.as_text().map(str::to_owned),
                })
                .collect(),
        }
    }
}

/// The geometry-only payload of the sibling boundary: no text field at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionsResponse {
    pub detections: Vec<Detection>,
}

impl From<&PageResult> for DetectionsResponse {
    fn from(page: &PageResult) -> Self {
        DetectionsResponse {
            detections: page
                .blocks
                .iter()
                .map(|b| Detection {
                    kind: b.kind.clone(),
                    bbox: b.bbox,
                    confidence: b.confidence,
                })
                .collect(),
        }
    }
}

// ── Page ordering ────────────────────────────────────────────────────────

static RE_PAGE_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_page_(\d+)").unwrap());
static RE_PAGE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"page(\d+)").unwrap());
static RE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").unwrap());

/// Extract a page number from a source identifier.
///
/// Patterns are tried in priority order: `_page_<N>`, then `page<N>`, then
/// the first run of digits anywhere in the identifier. `None` means the
/// identifier carries no page number at all.
pub fn extract_page_number(name: &str) -> Option<u64> {
    for re in [&*RE_PAGE_UNDERSCORE, &*RE_PAGE_WORD, &*RE_DIGITS] {
        if let Some(caps) = re.captures(name) {
            if let Ok(n) = caps[1].parse::<u64>() {
                return Some(n);
            }
        }
    }
    None
}

/// Sort key implementing the document page order: numbered pages first in
/// numeric order (ties alphabetical), unnumbered pages after, alphabetical
/// among themselves.
pub fn page_order_key(name: &str) -> (u8, u64, String) {
    match extract_page_number(name) {
        Some(n) => (0, n, name.to_string()),
        None => (1, 0, name.to_string()),
    }
}
