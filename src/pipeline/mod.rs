//! Pipeline stages for page-image extraction.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different segmenter backend) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ segment ──▶ normalize ──▶ route ──▶ extract ──▶ assemble
//! (image)   (layout)    (clamp+pad)   (type?)   (VLM)       (md+crops)
//!                                                   ▲
//!                                        retry ─────┘ (page-level)
//! ```
//!
//! The segmentation stage itself lives in [`crate::segment`] — it is a
//! seam around an external model, not a transformation step.
//!
//! 1. [`input`]     — resolve the tagged page input to one decoded image,
//!    validating size and extension before any model runs
//! 2. [`normalize`] — clamp detection geometry to the image bounds and pad
//!    crops to the extraction model's tile multiple
//! 3. [`route`]     — decide per element type whether text extraction runs
//! 4. [`encode`]    — PNG-encode and base64-wrap crops for the multimodal
//!    API request body
//! 5. [`extract`]   — drive the VLM call per block; the only stage with
//!    network I/O, and the one that isolates per-block failures
//! 6. [`assemble`]  — render a page's blocks to markdown and cut side-car
//!    crops for table/picture blocks
//! 7. [`retry`]     — page-level retry with fixed, non-blocking backoff
//! 8. [`render`]    — rasterise PDF pages for the batch command; runs in
//!    `spawn_blocking` because pdfium is not async-safe

pub mod assemble;
pub mod encode;
pub mod extract;
pub mod input;
pub mod normalize;
pub mod render;
pub mod retry;
pub mod route;
