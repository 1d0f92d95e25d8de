//! Configuration types for the extraction pipeline.
//!
//! All behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across in-flight pages, log them, and diff two
//! runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::DocBlocksError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for page and document extraction.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use docblocks::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .page_concurrency(4)
///     .block_concurrency(8)
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Number of pages processed concurrently. Default: 4.
    ///
    /// Page pipelines are independent of each other; the bound exists to
    /// respect downstream model rate limits, not correctness.
    pub page_concurrency: usize,

    /// Number of concurrent per-block extraction calls within one page.
    /// Default: 8.
    ///
    /// Each block operates on its own crop and writes only to its own slot,
    /// so block calls are freely concurrent. Order of the resulting block
    /// list is preserved regardless of completion order.
    pub block_concurrency: usize,

    /// Global cap on in-flight VLM requests across all pages. Default: 16.
    ///
    /// `page_concurrency * block_concurrency` can exceed what the provider
    /// tolerates; this semaphore is the single knob that actually limits
    /// outbound pressure.
    pub max_inflight_extractions: usize,

    /// Page-level attempts before a page is declared failed. Default: 3.
    ///
    /// An attempt fails on a segmentation error or when it yields zero
    /// blocks; an all-empty page is retried, not silently accepted.
    pub max_attempts: u32,

    /// Fixed delay between page attempts, in milliseconds. Default: 2000.
    ///
    /// Applied after every failed attempt except the last. The sleep is
    /// async and blocks only the retrying page's task, never siblings.
    pub retry_backoff_ms: u64,

    /// LLM model identifier, e.g. "gpt-4.1-nano", "claude-sonnet-4-20250514".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, auto-detects from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for extraction calls. Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to what is on the page —
    /// exactly what you want for transcription.
    pub temperature: f32,

    /// Maximum tokens the VLM may generate per block. Default: 2048.
    ///
    /// A region crop is much smaller than a full page, but dense tables can
    /// still exceed 1 000 output tokens; setting this too low truncates the
    /// markdown mid-cell.
    pub max_tokens: usize,

    /// Permits on the segmenter gate. Default: 1.
    ///
    /// A locally-loaded layout model is usually not safe for concurrent
    /// inference; 1 serialises all calls. Raise it when the segmenter is a
    /// service that handles parallel requests itself.
    pub segmenter_permits: usize,

    /// Page selection for multi-page documents. Default: all pages.
    pub pages: PageSelection,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_concurrency: 4,
            block_concurrency: 8,
            max_inflight_extractions: 16,
            max_attempts: 3,
            retry_backoff_ms: 2000,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 2048,
            segmenter_permits: 1,
            pages: PageSelection::default(),
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("page_concurrency", &self.page_concurrency)
            .field("block_concurrency", &self.block_concurrency)
            .field("max_inflight_extractions", &self.max_inflight_extractions)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("segmenter_permits", &self.segmenter_permits)
            .field("pages", &self.pages)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn page_concurrency(mut self, n: usize) -> Self {
        self.config.page_concurrency = n.max(1);
        self
    }

    pub fn block_concurrency(mut self, n: usize) -> Self {
        self.config.block_concurrency = n.max(1);
        self
    }

    pub fn max_inflight_extractions(mut self, n: usize) -> Self {
        self.config.max_inflight_extractions = n.max(1);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn segmenter_permits(mut self, n: usize) -> Self {
        self.config.segmenter_permits = n.max(1);
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DocBlocksError> {
        let c = &self.config;
        if c.page_concurrency == 0 || c.block_concurrency == 0 {
            return Err(DocBlocksError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_attempts == 0 {
            return Err(DocBlocksError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// Specifies which pages of a multi-page document to process.
///
/// The textual grammar (see [`PageSelection::parse`]) mirrors what the
/// batch command accepts: `2` (single page), `1,2,3` (set), `,8`
/// (pages 1..=8), `3,` (page 3 to the end), `all`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Process all pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
    /// Everything from this page to the end (1-indexed, inclusive).
    From(usize),
    /// Everything from page 1 up to this page (1-indexed, inclusive).
    UpTo(usize),
}

impl PageSelection {
    /// Parse a page-selection expression.
    ///
    /// Accepted forms: `all`, `5`, `1,3,5`, `,8` (open start), `3,`
    /// (open end).
    pub fn parse(s: &str) -> Result<Self, DocBlocksError> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(PageSelection::All);
        }

        let invalid = || DocBlocksError::InvalidPageSelection(s.to_string());

        if let Some(rest) = s.strip_prefix(',') {
            let end: usize = rest.trim().parse().map_err(|_| invalid())?;
            if end < 1 {
                return Err(invalid());
            }
            return Ok(PageSelection::UpTo(end));
        }
        if let Some(rest) = s.strip_suffix(',') {
            let start: usize = rest.trim().parse().map_err(|_| invalid())?;
            if start < 1 {
                return Err(invalid());
            }
            return Ok(PageSelection::From(start));
        }
        if s.contains(',') {
            let pages = s
                .split(',')
                .map(|p| p.trim().parse::<usize>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| invalid())?;
            if pages.iter().any(|&p| p < 1) {
                return Err(invalid());
            }
            return Ok(PageSelection::Set(pages));
        }

        let page: usize = s.parse().map_err(|_| invalid())?;
        if page < 1 {
            return Err(invalid());
        }
        Ok(PageSelection::Single(page))
    }

    /// Expand the selection into a sorted, deduplicated list of 0-indexed
    /// page numbers, clipped to `total_pages`.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
            PageSelection::From(start) => {
                let s = (*start).max(1) - 1;
                (s..total_pages).collect()
            }
            PageSelection::UpTo(end) => {
                let e = (*end).min(total_pages);
                (0..e).collect()
            }
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_concurrency() {
        let config = PipelineConfig::builder()
            .page_concurrency(0)
            .block_concurrency(0)
            .build()
            .unwrap();
        assert_eq!(config.page_concurrency, 1);
        assert_eq!(config.block_concurrency, 1);
    }

    #[test]
    fn parse_single_page() {
        let sel = PageSelection::parse("2").unwrap();
        assert_eq!(sel.to_indices(5), vec![1]);
    }

    #[test]
    fn parse_comma_list() {
        let sel = PageSelection::parse("1,3,5").unwrap();
        assert_eq!(sel.to_indices(5), vec![0, 2, 4]);
    }

    #[test]
    fn parse_open_start_means_one_through_n() {
        let sel = PageSelection::parse(",8").unwrap();
        assert_eq!(sel.to_indices(10), vec![0, 1, 2, 3, 4, 5, 6, 7]);
        // clipped when the document is shorter
        assert_eq!(sel.to_indices(3), vec![0, 1, 2]);
    }

    #[test]
    fn parse_open_end_means_n_through_last() {
        let sel = PageSelection::parse("3,").unwrap();
        assert_eq!(sel.to_indices(5), vec![2, 3, 4]);
    }

    #[test]
    fn parse_all_and_empty() {
        assert_eq!(PageSelection::parse("all").unwrap().to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::parse("").unwrap().to_indices(2), vec![0, 1]);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(PageSelection::parse("abc").is_err());
        assert!(PageSelection::parse("1,x").is_err());
        assert!(PageSelection::parse("0").is_err());
    }

    #[test]
    fn set_deduplicates_and_sorts() {
        let sel = PageSelection::Set(vec![3, 1, 3]);
        assert_eq!(sel.to_indices(5), vec![0, 2]);
    }

    #[test]
    fn out_of_range_selection_is_empty() {
        assert_eq!(PageSelection::Single(100).to_indices(4), Vec::<usize>::new());
    }
}
