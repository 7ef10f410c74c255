//! Resilient page loading over a readiness ladder.
//!
//! Tries each readiness condition in order, each under its own timeout. A
//! failed final attempt is not an error: the result carries `ok = false`
//! and whatever partial HTML the page holds, so extraction still runs.

use crate::renderer::RenderContext;
use fuzzscout::{NavigationResult, Readiness};
use std::time::Duration;
use tracing::{debug, warn};

/// Navigation knobs. Defaults follow the interactive pipeline.
#[derive(Debug, Clone)]
pub struct NavigatorOptions {
    /// Per-attempt budget.
    pub timeout: Duration,
    /// Readiness conditions, tried in order.
    pub ladder: Vec<Readiness>,
    /// Resource classes aborted before navigation.
    pub block_resource_types: Vec<String>,
    /// Settle time after a successful attempt.
    pub grace: Duration,
    /// Pause between a failed attempt and the next condition.
    pub backoff: Duration,
}

impl Default for NavigatorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(30_000),
            ladder: Readiness::default_ladder(),
            block_resource_types: fuzzscout::scope::default_blocked_resource_types(),
            grace: Duration::from_millis(800),
            backoff: Duration::from_millis(300),
        }
    }
}

/// Load `url` in `ctx`, falling back through `options.ladder`.
pub async fn navigate(
    ctx: &mut dyn RenderContext,
    url: &str,
    options: &NavigatorOptions,
) -> NavigationResult {
    if let Err(e) = ctx.block_resources(&options.block_resource_types).await {
        warn!(url, "resource blocking unavailable: {e:#}");
    }

    let ladder = if options.ladder.is_empty() {
        Readiness::default_ladder()
    } else {
        options.ladder.clone()
    };

    let mut last_error = String::new();
    for (i, readiness) in ladder.iter().enumerate() {
        let attempt = tokio::time::timeout(options.timeout, ctx.navigate(url, *readiness)).await;
        match attempt {
            Ok(Ok(())) => {
                debug!(url, %readiness, "navigation ready");
                tokio::time::sleep(options.grace).await;
                return NavigationResult {
                    ok: true,
                    method: readiness.to_string(),
                    last_error: None,
                    content: None,
                };
            }
            Ok(Err(e)) => last_error = format!("{readiness}: {e:#}"),
            Err(_) => {
                last_error = format!(
                    "{readiness}: timed out after {}ms",
                    options.timeout.as_millis()
                )
            }
        }

        if i + 1 < ladder.len() {
            debug!(url, error = %last_error, "readiness attempt failed, falling back");
            tokio::time::sleep(options.backoff).await;
        }
    }

    warn!(url, error = %last_error, "all readiness conditions failed");
    let content = match ctx.get_html().await {
        Ok(html) => Some(html),
        Err(e) => {
            debug!("no partial content: {e:#}");
            None
        }
    };
    let method = ladder
        .last()
        .map(ToString::to_string)
        .unwrap_or_default();

    NavigationResult {
        ok: false,
        method,
        last_error: Some(last_error),
        content,
    }
}
