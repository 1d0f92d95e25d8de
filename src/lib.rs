//! # docblocks
//!
//! Convert document page images into typed layout blocks — headings,
//! paragraphs, tables, pictures — with pixel-accurate bounding boxes and,
//! for textual blocks, extracted text rendered as Markdown by a Vision
//! Language Model.
//!
//! ## Why this crate?
//!
//! Whole-page OCR flattens a document into a stream of words and loses the
//! thing downstream consumers actually need: *which* words belong to
//! *which* element, and *where* that element sits on the page. docblocks
//! keeps layout geometry and textual content together: a layout model
//! proposes regions, each region is cropped and transcribed independently,
//! and a single hallucinating region can never take down the rest of the
//! page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! page image
//!  │
//!  ├─ 1. Input      path / bytes / decoded image, validated once
//!  ├─ 2. Segment    layout model → (type, bbox, confidence) detections
//!  ├─ 3. Normalize  clamp boxes to bounds, pad crops to 28-px tiles
//!  ├─ 4. Route      textual types → extraction; graphics → geometry only
//!  ├─ 5. Extract    per-block VLM calls, strict JSON envelope, isolated failures
//!  ├─ 6. Assemble   ordered blocks → markdown + table/picture crops
//!  ├─ 7. Retry      page-level retry around the whole attempt
//!  └─ 8. Merge      pages → one document, deduplicated media directory
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docblocks::{HttpSegmenter, PageInput, Pipeline, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let segmenter = Arc::new(HttpSegmenter::new("http://localhost:8000/predict")?);
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let pipeline = Pipeline::with_vlm(segmenter, PipelineConfig::default())?;
//!
//!     let page = pipeline
//!         .process_page("scan_page_1.png", PageInput::Path("scan_page_1.png".into()), false)
//!         .await?;
//!     for block in &page.blocks {
//!         println!("{:>14}  {:?}  {:?}", block.kind, block.bbox, block.text.as_text());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docblocks` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docblocks = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod segment;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PageSelection, PipelineConfig, PipelineConfigBuilder};
pub use convert::{resolve_provider, Pipeline};
pub use error::{BlockFailure, DocBlocksError, PageError, SegmentError};
pub use merge::{find_markdown_files, merge_directory, merge_files};
pub use output::{
    extract_page_number, BBox, Block, BlockText, Detection, DetectionsResponse, DocumentResult,
    NormalizedRegion, ObjectBlock, ObjectsResponse, PageResult,
};
pub use pipeline::assemble::{assemble_page, render_document, render_markdown, PageArtifacts};
pub use pipeline::extract::{NoopExtractor, PageObject, RegionExtractor, VlmExtractor};
pub use pipeline::input::PageInput;
pub use segment::{GatedSegmenter, HttpSegmenter, NullSegmenter, Segmenter};
