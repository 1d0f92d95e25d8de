//! Page-level retry controller.
//!
//! Wraps one page's whole pipeline attempt. A page "succeeds" only when it
//! yields at least one block: a segmenter that answers with an empty
//! detection list is treated as a transient glitch and retried, not
//! silently accepted as an empty page.
//!
//! The backoff is a fixed delay between attempts (none after the last) and
//! sleeps asynchronously, so a retrying page never stalls its sibling
//! pages' tasks.

use crate::error::PageError;
use crate::output::PageResult;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Run `attempt` up to `max_attempts` times, sleeping `backoff` between
/// failed attempts.
///
/// Returns the first successful (non-empty) page result, or the last
/// error after exhaustion. An `Ok` result with zero blocks counts as a
/// failure and is reported as [`PageError::Empty`].
pub async fn with_retries<F, Fut>(
    source: &str,
    mut attempt: F,
    max_attempts: u32,
    backoff: Duration,
) -> Result<PageResult, PageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PageResult, PageError>>,
{
    let mut last_err = PageError::Empty {
        source: source.to_string(),
        attempts: 0,
    };

    for n in 1..=max_attempts {
        match attempt().await {
            Ok(page) if !page.blocks.is_empty() => {
                if n > 1 {
                    debug!("Page '{}': succeeded on attempt {}/{}", source, n, max_attempts);
                }
                return Ok(page);
            }
            Ok(_) => {
                warn!(
                    "Page '{}': empty result (attempt {}/{})",
                    source, n, max_attempts
                );
                last_err = PageError::Empty {
                    source: source.to_string(),
                    attempts: n,
                };
            }
            Err(e) => {
                warn!("Page '{}': attempt {}/{} failed: {}", source, n, max_attempts, e);
                last_err = e;
            }
        }
        if n < max_attempts {
            sleep(backoff).await;
        }
    }

    // Report the full attempt budget on emptiness, not the attempt index.
    if let PageError::Empty { source, .. } = last_err {
        last_err = PageError::Empty {
            source,
            attempts: max_attempts,
        };
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{BBox, Block, BlockText};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn empty_page() -> PageResult {
        PageResult {
            source: "p.png".into(),
            width: 10,
            height: 10,
            blocks: vec![],
        }
    }

    fn one_block_page() -> PageResult {
        PageResult {
            source: "p.png".into(),
            width: 10,
            height: 10,
            blocks: vec![Block {
                kind: "text".into(),
                bbox: BBox::new(0, 0, 5, 5),
                confidence: None,
                text: BlockText::Skipped,
            }],
        }
    }

    #[tokio::test]
    async fn succeeds_on_last_attempt_with_exact_call_count() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);
        let result = with_retries(
            "p.png",
            move || {
                let n = calls_in.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Ok(empty_page())
                    } else {
                        Ok(one_block_page())
                    }
                }
            },
            3,
            Duration::ZERO,
        )
        .await;

        assert_eq!(result.unwrap().blocks.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn first_success_stops_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);
        let result = with_retries(
            "p.png",
            move || {
                calls_in.fetch_add(1, Ordering::SeqCst);
                async { Ok(one_block_page()) }
            },
            3,
            Duration::ZERO,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_on_empty_pages_reports_full_budget() {
        let result = with_retries(
            "doc_page_4.png",
            || async { Ok(empty_page()) },
            3,
            Duration::ZERO,
        )
        .await;

        match result {
            Err(PageError::Empty { source, attempts }) => {
                assert_eq!(source, "doc_page_4.png");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected Empty, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhaustion_surfaces_the_last_error() {
        let result = with_retries(
            "p.png",
            || async {
                Err(PageError::Segmentation {
                    source: "p.png".into(),
                    detail: "connection refused".into(),
                })
            },
            2,
            Duration::ZERO,
        )
        .await;

        match result {
            Err(PageError::Segmentation { detail, .. }) => {
                assert_eq!(detail, "connection refused")
            }
            other => panic!("expected Segmentation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_then_success_recovers() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);
        let result = with_retries(
            "p.png",
            move || {
                let n = calls_in.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n == 1 {
                        Err(PageError::Segmentation {
                            source: "p.png".into(),
                            detail: "blip".into(),
                        })
                    } else {
                        Ok(one_block_page())
                    }
                }
            },
            3,
            Duration::ZERO,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
