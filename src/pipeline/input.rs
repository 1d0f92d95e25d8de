//! Page input resolution: one tagged type, decoded exactly once.
//!
//! Callers hand the pipeline a [`PageInput`] — a path, raw bytes, or an
//! already-decoded image — and the entry point resolves it to a single
//! `DynamicImage`. Nothing downstream ever branches on input shape again.
//!
//! Validation (size cap, extension allow-list) happens here, before any
//! model is invoked: rejecting a 200 MB upload after segmentation already
//! ran would waste the most expensive part of the request.

use crate::error::DocBlocksError;
use image::DynamicImage;
use std::path::PathBuf;
use tracing::debug;

/// Maximum accepted input size.
pub const MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;

/// File extensions accepted for path inputs, lower-case.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// A page image input, resolved to a decoded raster at the pipeline entry.
#[derive(Debug)]
pub enum PageInput {
    /// Read and decode from a file on disk.
    Path(PathBuf),
    /// Decode from an in-memory encoded image (upload body).
    Bytes(Vec<u8>),
    /// Already decoded; used as-is.
    Image(DynamicImage),
}

impl PageInput {
    /// Resolve to a decoded image, enforcing the upload limits.
    ///
    /// Size and extension checks run before any decoding; a decoded-image
    /// input bypasses both (the caller already owns the pixels).
    pub fn decode(self) -> Result<DynamicImage, DocBlocksError> {
        match self {
            PageInput::Path(path) => {
                if !path.exists() {
                    return Err(DocBlocksError::FileNotFound { path });
                }
                let extension = path
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
                    return Err(DocBlocksError::UnsupportedImageType { extension });
                }
                let size = std::fs::metadata(&path)
                    .map_err(|e| DocBlocksError::ImageDecode {
                        detail: format!("{}: {e}", path.display()),
                    })?
                    .len();
                check_size(size)?;
                debug!("Decoding page image: {}", path.display());
                image::open(&path).map_err(|e| DocBlocksError::ImageDecode {
                    detail: format!("{}: {e}", path.display()),
                })
            }
            PageInput::Bytes(bytes) => {
                check_size(bytes.len() as u64)?;
                image::load_from_memory(&bytes)
                    .map_err(|e| DocBlocksError::ImageDecode { detail: e.to_string() })
            }
            PageInput::Image(img) => Ok(img),
        }
    }
}

impl From<PathBuf> for PageInput {
    fn from(p: PathBuf) -> Self {
        PageInput::Path(p)
    }
}

impl From<Vec<u8>> for PageInput {
    fn from(b: Vec<u8>) -> Self {
        PageInput::Bytes(b)
    }
}

impl From<DynamicImage> for PageInput {
    fn from(img: DynamicImage) -> Self {
        PageInput::Image(img)
    }
}

fn check_size(size: u64) -> Result<(), DocBlocksError> {
    if size > MAX_UPLOAD_BYTES {
        return Err(DocBlocksError::FileTooLarge {
            size_mb: size as f64 / (1024.0 * 1024.0),
            limit_mb: MAX_UPLOAD_BYTES / (1024 * 1024),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn bytes_input_decodes() {
        let img = PageInput::Bytes(png_bytes()).decode().unwrap();
        assert_eq!((img.width(), img.height()), (4, 4));
    }

    #[test]
    fn oversized_bytes_rejected_before_decode() {
        let huge = vec![0u8; (MAX_UPLOAD_BYTES + 1) as usize];
        match PageInput::Bytes(huge).decode() {
            Err(DocBlocksError::FileTooLarge { limit_mb, .. }) => assert_eq!(limit_mb, 25),
            other => panic!("expected FileTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn disallowed_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.bmp");
        std::fs::write(&path, b"not an image").unwrap();
        match PageInput::Path(path).decode() {
            Err(DocBlocksError::UnsupportedImageType { extension }) => {
                assert_eq!(extension, "bmp")
            }
            other => panic!("expected UnsupportedImageType, got {other:?}"),
        }
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.PNG");
        std::fs::write(&path, png_bytes()).unwrap();
        let img = PageInput::Path(path).decode().unwrap();
        assert_eq!((img.width(), img.height()), (4, 4));
    }

    #[test]
    fn missing_file_reported() {
        let res = PageInput::Path(PathBuf::from("/no/such/page.png")).decode();
        assert!(matches!(res, Err(DocBlocksError::FileNotFound { .. })));
    }

    #[test]
    fn decoded_image_passes_through() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])));
        let out = PageInput::Image(img).decode().unwrap();
        assert_eq!((out.width(), out.height()), (2, 2));
    }
}
