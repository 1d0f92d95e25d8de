//! Pipeline orchestration: page and document extraction entry points.
//!
//! [`Pipeline`] is the explicit resource object the rest of the crate
//! revolves around: it holds the segmenter and extractor handles,
//! constructed once at process start and shared by reference across every
//! in-flight page. There is no lazily-initialised global model anywhere.
//!
//! ## Concurrency model
//!
//! Pages of one document are independent and run through
//! `buffer_unordered(page_concurrency)`. Within a page, per-block
//! extraction calls run through `buffered(block_concurrency)` — buffered,
//! not unordered, because the block list must keep the segmenter's
//! detection order regardless of which VLM call finishes first. The
//! extractor's own semaphore caps total outbound pressure, and the
//! segmenter gate (see [`crate::segment::GatedSegmenter`]) serialises
//! layout inference when the model demands it.

use crate::config::PipelineConfig;
use crate::error::{DocBlocksError, PageError};
use crate::output::{
    Block, BlockText, DetectionsResponse, DocumentResult, ObjectsResponse, PageResult,
};
use crate::pipeline::extract::{RegionExtractor, VlmExtractor};
use crate::pipeline::input::PageInput;
use crate::pipeline::{normalize, route};
use crate::segment::{GatedSegmenter, Segmenter};
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The extraction pipeline: segmenter + extractor + configuration.
///
/// Cheap to share: hold it in an `Arc` and hand clones of the reference to
/// whatever drives pages through it. All methods take `&self` and are safe
/// to call concurrently.
pub struct Pipeline {
    segmenter: Arc<dyn Segmenter>,
    extractor: Arc<dyn RegionExtractor>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Build a pipeline from explicit parts.
    ///
    /// The segmenter is used as given — wrap it in
    /// [`GatedSegmenter`] yourself if it needs a concurrency gate.
    pub fn new(
        segmenter: Arc<dyn Segmenter>,
        extractor: Arc<dyn RegionExtractor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            segmenter,
            extractor,
            config,
        }
    }

    /// Build a pipeline with a VLM-backed extractor resolved from the
    /// config, and the segmenter behind a gate sized by
    /// `config.segmenter_permits`.
    pub fn with_vlm(
        segmenter: Arc<dyn Segmenter>,
        config: PipelineConfig,
    ) -> Result<Self, DocBlocksError> {
        let provider = resolve_provider(&config)?;
        let extractor = Arc::new(VlmExtractor::new(
            provider,
            config.temperature,
            config.max_tokens,
            config.max_inflight_extractions,
        ));
        let gated = Arc::new(GatedSegmenter::new(segmenter, config.segmenter_permits));
        Ok(Self::new(gated, extractor, config))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one page through segment → normalize → route → extract.
    ///
    /// Single attempt, no retries. Block order equals detection order.
    /// Block-level extraction failures are recorded on their blocks and
    /// never fail the page; only segmentation errors do.
    pub async fn process_image(
        &self,
        source: &str,
        image: &DynamicImage,
        bbox_only: bool,
    ) -> Result<PageResult, PageError> {
        let detections =
            self.segmenter
                .detect(image)
                .await
                .map_err(|e| PageError::Segmentation {
                    source: source.to_string(),
                    detail: e.to_string(),
                })?;
        debug!("Page '{}': {} detections", source, detections.len());

        let blocks: Vec<Block> = stream::iter(detections.into_iter().map(|detection| {
            let extractor = Arc::clone(&self.extractor);
            async move {
                let region = normalize::normalize(detection, image);
                let text = if route::should_extract(&region.detection.kind, bbox_only) {
                    match extractor.region_markdown(&region.crop).await {
                        Ok(Some(text)) => BlockText::Extracted(text),
                        Ok(None) => BlockText::Skipped,
                        Err(failure) => {
                            warn!(
                                "Page '{}': block '{}' extraction failed: {}",
                                source, region.detection.kind, failure
                            );
                            BlockText::Failed(failure)
                        }
                    }
                } else {
                    BlockText::Skipped
                };
                Block {
                    kind: region.detection.kind,
                    bbox: region.bbox,
                    confidence: region.detection.confidence,
                    text,
                }
            }
        }))
        .buffered(self.config.block_concurrency)
        .collect()
        .await;

        Ok(PageResult {
            source: source.to_string(),
            width: image.width(),
            height: image.height(),
            blocks,
        })
    }

    /// [`Self::process_image`] wrapped in the page-level retry controller.
    pub async fn process_image_with_retries(
        &self,
        source: &str,
        image: &DynamicImage,
        bbox_only: bool,
    ) -> Result<PageResult, PageError> {
        crate::pipeline::retry::with_retries(
            source,
            || self.process_image(source, image, bbox_only),
            self.config.max_attempts,
            Duration::from_millis(self.config.retry_backoff_ms),
        )
        .await
    }

    /// Resolve a tagged input and run the page (single attempt).
    pub async fn process_page(
        &self,
        source: &str,
        input: PageInput,
        bbox_only: bool,
    ) -> Result<PageResult, PageError> {
        let image = input.decode().map_err(|e| PageError::Decode {
            source: source.to_string(),
            detail: e.to_string(),
        })?;
        self.process_image(source, &image, bbox_only).await
    }

    /// Whole-page VLM mode: the extraction model discovers elements and
    /// transcribes them in one call, with no separate segmenter.
    ///
    /// Boxes come back in the model's answer space and are clamped to the
    /// image bounds like any other detection.
    pub async fn process_page_vlm_only(
        &self,
        source: &str,
        input: PageInput,
    ) -> Result<PageResult, PageError> {
        let image = input.decode().map_err(|e| PageError::Decode {
            source: source.to_string(),
            detail: e.to_string(),
        })?;

        let objects =
            self.extractor
                .page_objects(&image)
                .await
                .map_err(|e| PageError::Discovery {
                    source: source.to_string(),
                    detail: e.to_string(),
                })?;
        debug!("Page '{}': {} discovered objects", source, objects.len());

        let blocks = objects
            .into_iter()
            .map(|obj| {
                let detection = obj.to_detection();
                let bbox =
                    normalize::clamp_bbox(detection.bbox, image.width(), image.height());
                let text = match obj.text {
                    Some(t) if !t.trim().is_empty() => BlockText::Extracted(t),
                    _ => BlockText::Skipped,
                };
                Block {
                    kind: detection.kind,
                    bbox,
                    confidence: detection.confidence,
                    text,
                }
            })
            .collect();

        Ok(PageResult {
            source: source.to_string(),
            width: image.width(),
            height: image.height(),
            blocks,
        })
    }

    /// Process a multi-page document: every page with retries, failures
    /// skipped, final order by extracted page number.
    ///
    /// Never fails as a whole — callers inspect
    /// [`DocumentResult::failed`] to decide their own tolerance.
    pub async fn process_document(
        &self,
        pages: Vec<(String, PageInput)>,
        bbox_only: bool,
    ) -> DocumentResult {
        let total = pages.len();
        info!("Processing document: {} pages", total);

        let results: Vec<Result<PageResult, PageError>> =
            stream::iter(pages.into_iter().map(|(source, input)| async move {
                let image = input.decode().map_err(|e| PageError::Decode {
                    source: source.clone(),
                    detail: e.to_string(),
                })?;
                self.process_image_with_retries(&source, &image, bbox_only)
                    .await
            }))
            .buffer_unordered(self.config.page_concurrency)
            .collect()
            .await;

        let mut document = DocumentResult {
            pages: Vec::with_capacity(total),
            failed: Vec::new(),
        };
        for result in results {
            match result {
                Ok(page) => document.pages.push(page),
                Err(e) => {
                    warn!("Skipping page '{}': {}", e.source_id(), e);
                    document.failed.push(e);
                }
            }
        }
        document.sort_pages();

        info!(
            "Document complete: {}/{} pages",
            document.pages.len(),
            total
        );
        document
    }

    /// The single-image boundary payload: full extraction.
    pub async fn objects_response(
        &self,
        source: &str,
        input: PageInput,
        bbox_only: bool,
    ) -> Result<ObjectsResponse, PageError> {
        let page = self.process_page(source, input, bbox_only).await?;
        Ok(ObjectsResponse::from(&page))
    }

    /// The sibling boundary payload: geometry only, extraction never runs.
    pub async fn detections_response(
        &self,
        source: &str,
        input: PageInput,
    ) -> Result<DetectionsResponse, PageError> {
        let page = self.process_page(source, input, true).await?;
        Ok(DetectionsResponse::from(&page))
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// The four-level fallback chain lets library users and CLI users each set
/// exactly as much or as little as they need:
///
/// 1. **Pre-built provider** (`config.provider`) — the caller constructed
///    and configured the provider entirely; used as-is. Useful in tests or
///    when the caller needs custom middleware.
///
/// 2. **Named provider + model** (`config.provider_name`) — reads the
///    corresponding API key (`OPENAI_API_KEY`, etc.) from the environment.
///
/// 3. **Environment pair** (`DOCBLOCKS_LLM_PROVIDER` + `DOCBLOCKS_MODEL`)
///    — a provider-and-model choice made at the execution-environment
///    level (Makefile, shell script, CI), honoured even when multiple API
///    keys are present.
///
/// 4. **Full auto-detection** (`ProviderFactory::from_env`) — the factory
///    scans all known API key variables and picks the first available
///    provider, with an explicit preference for OpenAI when its key is
///    set.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, DocBlocksError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("DOCBLOCKS_LLM_PROVIDER"),
        std::env::var("DOCBLOCKS_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    // Prefer OpenAI explicitly when an OpenAI API key is present, so users
    // with multiple provider keys get a deterministic default.
    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DocBlocksError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, DocBlocksError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocBlocksError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
