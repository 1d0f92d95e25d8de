//! Region normalisation: clamp detection geometry and pad crops.
//!
//! Layout models occasionally emit boxes that poke a few pixels past the
//! image edge; clamping restores the `0 ≤ x1 < x2 ≤ width` invariant before
//! anything downstream trusts the geometry. The crop handed to the
//! extraction model is then padded — right and bottom only, content anchored
//! top-left — so both dimensions are multiples of the model's 28-pixel tile
//! size, with a 28-pixel floor. Padding never rescales content: a blurry
//! resized glyph costs transcription accuracy, a white margin costs nothing.

use crate::output::{BBox, Detection, NormalizedRegion};
use image::{imageops, DynamicImage, Rgb, RgbImage};

/// Tile size of the downstream extraction model. Crop dimensions must be
/// multiples of this, and at least this.
pub const TILE_MULTIPLE: u32 = 28;

/// Fill colour for the padded margin.
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Clamp a detection box to the image bounds.
///
/// `x1`/`y1` clamp to `[0, dim-1]`, `x2`/`y2` to `[0, dim]`. Degenerate or
/// inverted input boxes are a caller error; for any valid detection the
/// clamped box still satisfies `x1 < x2` and `y1 < y2`.
pub fn clamp_bbox(bbox: BBox, width: u32, height: u32) -> BBox {
    let w = width as i32;
    let h = height as i32;
    BBox {
        x1: bbox.x1.clamp(0, w - 1),
        y1: bbox.y1.clamp(0, h - 1),
        x2: bbox.x2.clamp(0, w),
        y2: bbox.y2.clamp(0, h),
    }
}

/// Round `n` up to the next multiple of [`TILE_MULTIPLE`], floor 28.
fn padded_dimension(n: u32) -> u32 {
    (n.div_ceil(TILE_MULTIPLE) * TILE_MULTIPLE).max(TILE_MULTIPLE)
}

/// Pad an image on the right/bottom with white so both dimensions are
/// multiples of 28 (and at least 28). Returns the input unchanged — no
/// copy — when it already satisfies the constraint.
pub fn pad_to_tile_multiple(img: DynamicImage) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    let (new_width, new_height) = (padded_dimension(width), padded_dimension(height));

    if (width, height) == (new_width, new_height) {
        return img;
    }

    let mut canvas = RgbImage::from_pixel(new_width, new_height, BACKGROUND);
    imageops::replace(&mut canvas, &img.to_rgb8(), 0, 0);
    DynamicImage::ImageRgb8(canvas)
}

/// Normalise one detection against its page image: clamp the box, crop the
/// page, pad the crop for the extraction model.
pub fn normalize(detection: Detection, page: &DynamicImage) -> NormalizedRegion {
    let bbox = clamp_bbox(detection.bbox, page.width(), page.height());
    let crop = page.crop_imm(bbox.x1 as u32, bbox.y1 as u32, bbox.width(), bbox.height());
    let crop = pad_to_tile_multiple(crop);
    NormalizedRegion {
        detection,
        bbox,
        crop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn page(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([10, 20, 30, 255]),
        ))
    }

    fn det(bbox: BBox) -> Detection {
        Detection {
            kind: "text".into(),
            bbox,
            confidence: Some(0.9),
        }
    }

    #[test]
    fn clamp_keeps_in_bounds_box_unchanged() {
        let b = clamp_bbox(BBox::new(10, 10, 200, 40), 600, 800);
        assert_eq!(b, BBox::new(10, 10, 200, 40));
    }

    #[test]
    fn clamp_restores_invariant_for_overshooting_boxes() {
        let cases = [
            BBox::new(-5, -5, 50, 50),
            BBox::new(550, 10, 700, 40),
            BBox::new(0, 780, 100, 900),
            BBox::new(-20, -20, 800, 900),
        ];
        for raw in cases {
            let b = clamp_bbox(raw, 600, 800);
            assert!(b.x1 >= 0 && b.x1 < b.x2 && b.x2 <= 600, "x failed for {raw:?}: {b:?}");
            assert!(b.y1 >= 0 && b.y1 < b.y2 && b.y2 <= 800, "y failed for {raw:?}: {b:?}");
        }
    }

    #[test]
    fn padded_dimension_rounds_up_with_floor() {
        assert_eq!(padded_dimension(1), 28);
        assert_eq!(padded_dimension(27), 28);
        assert_eq!(padded_dimension(28), 28);
        assert_eq!(padded_dimension(29), 56);
        assert_eq!(padded_dimension(280), 280);
    }

    #[test]
    fn pad_is_noop_when_already_aligned() {
        let img = page(56, 28);
        let padded = pad_to_tile_multiple(img);
        assert_eq!((padded.width(), padded.height()), (56, 28));
        // content untouched, not repainted white
        assert_eq!(padded.to_rgb8().get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn pad_anchors_content_top_left_and_fills_white() {
        let img = page(30, 40);
        let padded = pad_to_tile_multiple(img);
        assert_eq!((padded.width(), padded.height()), (56, 56));
        let rgb = padded.to_rgb8();
        // original content at the top-left corner
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([10, 20, 30]));
        assert_eq!(rgb.get_pixel(29, 39), &Rgb([10, 20, 30]));
        // padding on the right and bottom
        assert_eq!(rgb.get_pixel(30, 0), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(0, 40), &Rgb([255, 255, 255]));
    }

    #[test]
    fn tiny_crop_gets_the_28_floor() {
        let img = page(5, 3);
        let padded = pad_to_tile_multiple(img);
        assert_eq!((padded.width(), padded.height()), (28, 28));
    }

    #[test]
    fn normalize_clamps_crops_and_pads() {
        let img = page(100, 100);
        let region = normalize(det(BBox::new(90, 90, 150, 150)), &img);
        assert_eq!(region.bbox, BBox::new(90, 90, 100, 100));
        // 10×10 crop padded up to 28×28
        assert_eq!((region.crop.width(), region.crop.height()), (28, 28));
        assert_eq!(region.detection.kind, "text");
    }

    #[test]
    fn normalize_crop_dimensions_satisfy_tile_constraint() {
        let img = page(640, 480);
        for bbox in [
            BBox::new(0, 0, 640, 480),
            BBox::new(13, 7, 121, 93),
            BBox::new(-4, 2, 31, 29),
        ] {
            let region = normalize(det(bbox), &img);
            assert_eq!(region.crop.width() % TILE_MULTIPLE, 0);
            assert_eq!(region.crop.height() % TILE_MULTIPLE, 0);
            assert!(region.crop.width() >= TILE_MULTIPLE);
            assert!(region.crop.height() >= TILE_MULTIPLE);
        }
    }
}
