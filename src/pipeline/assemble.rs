//! Page assembly: ordered blocks → markdown plus side-car crops.
//!
//! Markdown rendering walks blocks in page order. Heading promotion
//! (title-typed blocks become `## `) is a rendering rule only — it never
//! reorders blocks. Blocks with absent text contribute nothing.
//!
//! Crops are cut for table-like and image-like blocks from the *original,
//! un-padded* page image at the clamped bbox, whether or not extraction
//! succeeded — a table whose transcription failed still ships its pixels.

use crate::output::PageResult;
use image::DynamicImage;

/// Block types rendered as a markdown heading.
const HEADING_TYPES: [&str; 2] = ["title", "heading"];

/// Block types that get a side-car crop.
const MEDIA_TYPES: [&str; 3] = ["table", "picture", "image"];

/// The assembled artifacts of one page.
#[derive(Debug)]
pub struct PageArtifacts {
    pub markdown: String,
    /// `(label, crop)` pairs, labelled `{type}_{position+1}` by the
    /// block's position in the page order.
    pub crops: Vec<(String, DynamicImage)>,
}

fn is_heading(kind: &str) -> bool {
    HEADING_TYPES.iter().any(|t| t.eq_ignore_ascii_case(kind))
}

fn is_media(kind: &str) -> bool {
    MEDIA_TYPES.iter().any(|t| t.eq_ignore_ascii_case(kind))
}

/// Render a page's blocks to markdown.
///
/// Paragraphs are joined with a blank line; no trailing separator after
/// the last block.
pub fn render_markdown(page: &PageResult) -> String {
    let mut parts: Vec<String> = Vec::new();
    for block in &page.blocks {
        let Some(text) = block.text.as_text() else {
            continue;
        };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if is_heading(&block.kind) {
            parts.push(format!("## {text}"));
        } else {
            parts.push(text.to_string());
        }
    }
    parts.join("\n\n")
}

/// Cut crops for every table/picture block of the page.
///
/// `image` must be the original page raster the blocks were detected on;
/// the clamped bboxes address it directly.
pub fn collect_crops(page: &PageResult, image: &DynamicImage) -> Vec<(String, DynamicImage)> {
    page.blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| is_media(&b.kind))
        .map(|(idx, b)| {
            let crop = image.crop_imm(
                b.bbox.x1 as u32,
                b.bbox.y1 as u32,
                b.bbox.width(),
                b.bbox.height(),
            );
            (format!("{}_{}", b.kind.to_lowercase(), idx + 1), crop)
        })
        .collect()
}

/// Assemble one page: markdown plus crops.
pub fn assemble_page(page: &PageResult, image: &DynamicImage) -> PageArtifacts {
    PageArtifacts {
        markdown: render_markdown(page),
        crops: collect_crops(page, image),
    }
}

/// Concatenate page markdowns in the given order, blank-line separated.
///
/// Pages whose markdown is empty contribute nothing (no stray separator).
pub fn render_document(pages: &[PageResult]) -> String {
    pages
        .iter()
        .map(render_markdown)
        .filter(|md| !md.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BlockFailure;
    use crate::output::{BBox, Block, BlockText};
    use image::{Rgba, RgbaImage};

    fn block(kind: &str, bbox: BBox, text: BlockText) -> Block {
        Block {
            kind: kind.into(),
            bbox,
            confidence: Some(0.9),
            text,
        }
    }

    fn page(blocks: Vec<Block>) -> PageResult {
        PageResult {
            source: "test_page_1.png".into(),
            width: 400,
            height: 500,
            blocks,
        }
    }

    #[test]
    fn title_renders_as_heading_paragraphs_join_with_blank_line() {
        let p = page(vec![
            block(
                "title",
                BBox::new(10, 10, 200, 40),
                BlockText::Extracted("Report".into()),
            ),
            block(
                "text",
                BBox::new(10, 50, 200, 90),
                BlockText::Extracted("First paragraph.".into()),
            ),
            block(
                "Text",
                BBox::new(10, 100, 200, 140),
                BlockText::Extracted("  Second paragraph.  ".into()),
            ),
        ]);
        assert_eq!(
            render_markdown(&p),
            "## Report\n\nFirst paragraph.\n\nSecond paragraph."
        );
    }

    #[test]
    fn absent_text_contributes_nothing() {
        let p = page(vec![
            block("picture", BBox::new(0, 0, 50, 50), BlockText::Skipped),
            block(
                "table",
                BBox::new(0, 60, 50, 110),
                BlockText::Failed(BlockFailure::Api {
                    detail: "timeout".into(),
                }),
            ),
            block(
                "text",
                BBox::new(0, 120, 50, 170),
                BlockText::Extracted("only me".into()),
            ),
        ]);
        assert_eq!(render_markdown(&p), "only me");
    }

    #[test]
    fn no_trailing_separator() {
        let p = page(vec![block(
            "text",
            BBox::new(0, 0, 10, 10),
            BlockText::Extracted("last".into()),
        )]);
        assert_eq!(render_markdown(&p), "last");
    }

    #[test]
    fn crops_cut_for_media_blocks_even_when_extraction_failed() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            400,
            500,
            Rgba([7, 7, 7, 255]),
        ));
        let p = page(vec![
            block(
                "title",
                BBox::new(10, 10, 200, 40),
                BlockText::Extracted("T".into()),
            ),
            block(
                "table",
                BBox::new(10, 50, 110, 150),
                BlockText::Failed(BlockFailure::Malformed {
                    detail: "bad".into(),
                }),
            ),
            block("Picture", BBox::new(10, 200, 310, 400), BlockText::Skipped),
        ]);
        let crops = collect_crops(&p, &img);
        assert_eq!(crops.len(), 2);
        assert_eq!(crops[0].0, "table_2");
        assert_eq!((crops[0].1.width(), crops[0].1.height()), (100, 100));
        assert_eq!(crops[1].0, "picture_3");
        assert_eq!((crops[1].1.width(), crops[1].1.height()), (300, 200));
    }

    #[test]
    fn crop_labels_use_page_position_not_media_index() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(100, 100, Rgba([0; 4])));
        let p = page(vec![
            block("text", BBox::new(0, 0, 10, 10), BlockText::Skipped),
            block("picture", BBox::new(0, 20, 40, 60), BlockText::Skipped),
        ]);
        let crops = collect_crops(&p, &img);
        assert_eq!(crops[0].0, "picture_2");
    }

    #[test]
    fn document_join_skips_empty_pages() {
        let full = page(vec![block(
            "text",
            BBox::new(0, 0, 10, 10),
            BlockText::Extracted("a".into()),
        )]);
        let empty = page(vec![block(
            "picture",
            BBox::new(0, 0, 10, 10),
            BlockText::Skipped,
        )]);
        let full2 = page(vec![block(
            "text",
            BBox::new(0, 0, 10, 10),
            BlockText::Extracted("b".into()),
        )]);
        assert_eq!(render_document(&[full, empty, full2]), "a\n\nb");
    }
}
