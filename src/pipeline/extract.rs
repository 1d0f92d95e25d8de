//! VLM extraction: per-region markdown and whole-page object discovery.
//!
//! This module converts image crops into VLM API calls and parses the
//! strict JSON envelopes the prompts demand. It is intentionally thin —
//! all prompt engineering lives in [`crate::prompts`] so it can be changed
//! without touching parsing or failure isolation here.
//!
//! ## Failure isolation
//!
//! Every failure a region can produce stays attached to that region:
//! an empty response becomes absent text, a malformed envelope or a dead
//! connection becomes a [`BlockFailure`] recorded on the one block. A
//! single hallucinating region must not invalidate an entire page's
//! otherwise-good extraction, so nothing here ever returns a page-level
//! error.

use crate::error::BlockFailure;
use crate::output::{BBox, Detection};
use crate::pipeline::encode;
use crate::prompts::{PAGE_OBJECTS_PROMPT, REGION_MARKDOWN_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use image::DynamicImage;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// The extraction seam: one pre-detected crop to markdown, or one whole
/// page to discovered objects.
///
/// Implementations must be safe for concurrent use — the pipeline
/// dispatches many in-flight calls across pages and blocks.
#[async_trait]
pub trait RegionExtractor: Send + Sync {
    /// Extract a single pre-detected crop as markdown.
    ///
    /// `Ok(None)` means the model produced an empty response — absent
    /// text, not an error. `Err` is a block-local failure the caller
    /// records on the block.
    async fn region_markdown(&self, crop: &DynamicImage) -> Result<Option<String>, BlockFailure>;

    /// Whole-page mode: the model both discovers elements and extracts
    /// their text.
    async fn page_objects(&self, page: &DynamicImage) -> Result<Vec<PageObject>, BlockFailure>;
}

/// One element of the structured-objects payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PageObject {
    pub label: String,
    /// Two-corner box `[x1, y1, x2, y2]` in image pixels.
    pub bbox_2d: [i32; 4],
    pub text: Option<String>,
    pub confidence: Option<f32>,
}

impl PageObject {
    /// View this object as a raw detection.
    pub fn to_detection(&self) -> Detection {
        Detection {
            kind: self.label.clone(),
            bbox: BBox::from(self.bbox_2d),
            confidence: self.confidence,
        }
    }
}

// ── Envelope parsing ─────────────────────────────────────────────────────

#[derive(Deserialize)]
struct MarkdownEnvelope {
    markdown: String,
}

#[derive(Deserialize)]
struct ObjectsEnvelope {
    objects: Vec<PageObject>,
}

/// Strip a single enclosing fenced code block, if present.
///
/// Exact anchored matching on the trimmed string: the fence must open the
/// response (optionally with an info string on the first line) and close
/// it. Anything else — inner fences, an unterminated fence — passes
/// through unmodified.
pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return raw;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return raw;
    };
    match inner.split_once('\n') {
        Some((info, body)) if !info.contains('`') => body.strip_suffix('\n').unwrap_or(body),
        _ => raw,
    }
}

/// Parse a raw region-markdown response into its text, if any.
///
/// Empty/whitespace-only responses are absent text, not failures.
pub(crate) fn parse_markdown_envelope(raw: &str) -> Result<Option<String>, BlockFailure> {
    if raw.trim().is_empty() {
        warn!("Extraction returned an empty response; treating text as absent");
        return Ok(None);
    }
    let cleaned = strip_code_fence(raw);
    let envelope: MarkdownEnvelope =
        serde_json::from_str(cleaned).map_err(|e| BlockFailure::Malformed {
            detail: e.to_string(),
        })?;
    Ok(Some(envelope.markdown))
}

/// Parse a raw structured-objects response.
pub(crate) fn parse_objects_envelope(raw: &str) -> Result<Vec<PageObject>, BlockFailure> {
    if raw.trim().is_empty() {
        warn!("Object discovery returned an empty response");
        return Ok(Vec::new());
    }
    let cleaned = strip_code_fence(raw);
    let envelope: ObjectsEnvelope =
        serde_json::from_str(cleaned).map_err(|e| BlockFailure::Malformed {
            detail: e.to_string(),
        })?;
    Ok(envelope.objects)
}

// ── Production extractor ─────────────────────────────────────────────────

/// VLM-backed extractor over an [`LLMProvider`].
///
/// A crate-wide semaphore caps in-flight requests across all pages: the
/// page × block concurrency product can exceed what the provider's rate
/// limits tolerate, and this gate is where outbound pressure is actually
/// bounded.
pub struct VlmExtractor {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    gate: Arc<Semaphore>,
}

impl VlmExtractor {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        temperature: f32,
        max_tokens: usize,
        max_inflight: usize,
    ) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
            gate: Arc::new(Semaphore::new(max_inflight.max(1))),
        }
    }

    /// Send one image with the given instruction and return the raw
    /// response text.
    async fn chat(&self, prompt: &str, image: &DynamicImage) -> Result<String, BlockFailure> {
        let image_data: ImageData =
            encode::encode_region(image).map_err(|e| BlockFailure::Api {
                detail: format!("image encoding failed: {e}"),
            })?;

        let messages = vec![
            ChatMessage::system(prompt),
            // VLM APIs require at least one user turn; the image carries
            // all the actual content.
            ChatMessage::user_with_images("", vec![image_data]),
        ];

        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let _permit = self.gate.acquire().await.map_err(|e| BlockFailure::Api {
            detail: format!("extraction gate closed: {e}"),
        })?;

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| BlockFailure::Api {
                detail: e.to_string(),
            })?;

        debug!(
            "Extraction call: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

#[async_trait]
impl RegionExtractor for VlmExtractor {
    async fn region_markdown(&self, crop: &DynamicImage) -> Result<Option<String>, BlockFailure> {
        let raw = self.chat(REGION_MARKDOWN_PROMPT, crop).await?;
        parse_markdown_envelope(&raw)
    }

    async fn page_objects(&self, page: &DynamicImage) -> Result<Vec<PageObject>, BlockFailure> {
        let raw = self.chat(PAGE_OBJECTS_PROMPT, page).await?;
        parse_objects_envelope(&raw)
    }
}

/// Extractor for geometry-only pipelines.
///
/// Never called when the router skips every block (bbox-only mode), but
/// the pipeline still needs an extractor handle; this one answers with
/// absent text if it is ever reached.
pub struct NoopExtractor;

#[async_trait]
impl RegionExtractor for NoopExtractor {
    async fn region_markdown(&self, _crop: &DynamicImage) -> Result<Option<String>, BlockFailure> {
        Ok(None)
    }

    async fn page_objects(&self, _page: &DynamicImage) -> Result<Vec<PageObject>, BlockFailure> {
        Ok(Vec::new())
    }
}
