//! Layout segmentation: the black box that turns a page image into raw
//! detections.
//!
//! The model itself — weights, runtime, caching — is someone else's
//! problem. This module owns only the seam: the [`Segmenter`] trait every
//! pipeline consumes, a [`GatedSegmenter`] decorator that serialises calls
//! to models that are not safe for concurrent inference, and an
//! [`HttpSegmenter`] client for layout models served over HTTP.
//!
//! There is deliberately no process-wide model singleton: the segmenter is
//! an explicit handle constructed once at startup and passed into every
//! [`crate::convert::Pipeline`], so tests can substitute a stub and two
//! pipelines can hold two differently-configured models.

use crate::error::SegmentError;
use crate::output::{BBox, Detection};
use crate::pipeline::encode;
use async_trait::async_trait;
use image::DynamicImage;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// The layout-model seam.
///
/// Implementations return detections whose bboxes are already in the page
/// image's native pixel space — any model-internal coordinate space must
/// be rescaled away before crossing this boundary.
#[async_trait]
pub trait Segmenter: Send + Sync {
    async fn detect(&self, page: &DynamicImage) -> Result<Vec<Detection>, SegmentError>;
}

/// Concurrency gate around a segmenter that is not safe for parallel use.
///
/// Sized to the model's true concurrency limit — 1 for a typical
/// locally-loaded model, higher for a service that batches internally.
/// In-flight pages queue on the semaphore; everything else about them
/// (extraction, assembly) continues to overlap freely.
pub struct GatedSegmenter {
    inner: Arc<dyn Segmenter>,
    gate: Semaphore,
}

impl GatedSegmenter {
    pub fn new(inner: Arc<dyn Segmenter>, permits: usize) -> Self {
        Self {
            inner,
            gate: Semaphore::new(permits.max(1)),
        }
    }
}

#[async_trait]
impl Segmenter for GatedSegmenter {
    async fn detect(&self, page: &DynamicImage) -> Result<Vec<Detection>, SegmentError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| SegmentError::Transport(format!("segmenter gate closed: {e}")))?;
        self.inner.detect(page).await
    }
}

/// A segmenter that never detects anything.
///
/// For pipelines that run in whole-page VLM mode and never call the
/// segmentation stage.
pub struct NullSegmenter;

#[async_trait]
impl Segmenter for NullSegmenter {
    async fn detect(&self, _page: &DynamicImage) -> Result<Vec<Detection>, SegmentError> {
        Ok(Vec::new())
    }
}

// ── HTTP-served layout model ─────────────────────────────────────────────

/// Wire shape of one detection as served by a layout-model service.
#[derive(Debug, Deserialize)]
struct WireDetection {
    #[serde(rename = "type")]
    kind: String,
    bbox: [i32; 4],
    confidence: Option<f32>,
}

/// Wire shape of the service response.
///
/// `width`/`height`, when present, name the coordinate space the service
/// detected in (e.g. a fixed inference resolution); boxes are rescaled to
/// the page's native pixels before they leave this module.
#[derive(Debug, Deserialize)]
struct SegmentationPayload {
    detections: Vec<WireDetection>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Client for a layout-segmentation model served over HTTP.
///
/// Posts the page as a PNG multipart upload and parses
/// `{"detections": [{"type", "bbox": [x1,y1,x2,y2], "confidence"}]}`.
pub struct HttpSegmenter {
    client: reqwest::Client,
    url: String,
}

impl HttpSegmenter {
    /// Create a client for the given endpoint URL.
    pub fn new(url: impl Into<String>) -> Result<Self, SegmentError> {
        let client = reqwest::Client::builder()
            // Layout inference on a large page can take a while on CPU.
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| SegmentError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Segmenter for HttpSegmenter {
    async fn detect(&self, page: &DynamicImage) -> Result<Vec<Detection>, SegmentError> {
        let png = encode::png_bytes(page)
            .map_err(|e| SegmentError::Transport(format!("PNG encoding failed: {e}")))?;

        let part = reqwest::multipart::Part::bytes(png)
            .file_name("page.png")
            .mime_str("image/png")
            .map_err(|e| SegmentError::Transport(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SegmentError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SegmentError::Status {
                status: response.status().as_u16(),
            });
        }

        let payload: SegmentationPayload = response
            .json()
            .await
            .map_err(|e| SegmentError::Malformed(e.to_string()))?;

        debug!(
            "Segmenter returned {} detections for {}x{} page",
            payload.detections.len(),
            page.width(),
            page.height()
        );

        Ok(into_native_pixels(payload, page.width(), page.height()))
    }
}

/// Map a service payload onto detections in the page's native pixel
/// space, rescaling from the service's coordinate space when it differs.
fn into_native_pixels(
    payload: SegmentationPayload,
    page_width: u32,
    page_height: u32,
) -> Vec<Detection> {
    let sx = match payload.width {
        Some(w) if w != 0 && w != page_width => page_width as f64 / w as f64,
        _ => 1.0,
    };
    let sy = match payload.height {
        Some(h) if h != 0 && h != page_height => page_height as f64 / h as f64,
        _ => 1.0,
    };

    payload
        .detections
        .into_iter()
        .map(|d| Detection {
            kind: d.kind,
            bbox: BBox::new(
                (d.bbox[0] as f64 * sx).round() as i32,
                (d.bbox[1] as f64 * sy).round() as i32,
                (d.bbox[2] as f64 * sx).round() as i32,
                (d.bbox[3] as f64 * sy).round() as i32,
            ),
            confidence: d.confidence,
        })
        .collect()
}
