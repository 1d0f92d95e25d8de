//! PDF rasterisation for the batch command: selected pages → `DynamicImage`.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto a dedicated
//! blocking-pool thread, preventing the Tokio worker threads from stalling
//! during CPU-heavy rendering.
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary wildly: an A0 poster rasterised naively can produce a
//! 12,000 × 17,000 px image. Capping the longest edge keeps memory bounded
//! and keeps the layout model's input in the resolution range it was
//! trained on.

use crate::error::DocBlocksError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Number of pages in the PDF.
pub async fn pdf_page_count(pdf_path: &Path) -> Result<usize, DocBlocksError> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let pdfium = Pdfium::default();
        let document = pdfium
            .load_pdf_from_file(&path, None)
            .map_err(|e| DocBlocksError::PdfOpenFailed {
                path: path.clone(),
                detail: format!("{e:?}"),
            })?;
        Ok(document.pages().len() as usize)
    })
    .await
    .map_err(|e| DocBlocksError::Internal(format!("Page-count task panicked: {e}")))?
}

/// Rasterise selected pages of a PDF into images.
///
/// # Returns
/// A vector of `(page_index_0based, DynamicImage)` tuples, in the order of
/// `page_indices`.
pub async fn render_pdf_pages(
    pdf_path: &Path,
    page_indices: &[usize],
    max_pixels: u32,
) -> Result<Vec<(usize, DynamicImage)>, DocBlocksError> {
    let path = pdf_path.to_path_buf();
    let indices = page_indices.to_vec();

    tokio::task::spawn_blocking(move || render_pages_blocking(&path, &indices, max_pixels))
        .await
        .map_err(|e| DocBlocksError::Internal(format!("Render task panicked: {e}")))?
}

/// Blocking implementation of page rendering.
fn render_pages_blocking(
    pdf_path: &Path,
    page_indices: &[usize],
    max_pixels: u32,
) -> Result<Vec<(usize, DynamicImage)>, DocBlocksError> {
    let pdfium = Pdfium::default();

    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| DocBlocksError::PdfOpenFailed {
                path: pdf_path.to_path_buf(),
                detail: format!("{e:?}"),
            })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(page_indices.len());

    for &idx in page_indices {
        if idx >= total_pages {
            warn!(
                "Skipping page {} (out of range, total={})",
                idx + 1,
                total_pages
            );
            continue;
        }

        let page = pages
            .get(idx as u16)
            .map_err(|e| DocBlocksError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            DocBlocksError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        results.push((idx, image));
    }

    Ok(results)
}
