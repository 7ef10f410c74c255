//! One discovery session: scope check, navigation, observation, extraction.
//!
//! The session owns its network log outright. Driver events arrive on a
//! channel and are folded into the log by this task alone; nothing else
//! writes to it.

use crate::navigator::{self, NavigatorOptions};
use crate::renderer::{NetworkEvent, RenderContext, Renderer};
use fuzzscout::report::{build_report, SessionCapture};
use fuzzscout::scope::{canonical_block_list, same_host, validate_target};
use fuzzscout::{
    extract_page, DiscoveryReport, DiscoveryRequest, NetworkObservation, ResponseObservation,
    ScoutError,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use url::Url;

/// Discovery failures. Degraded navigation is not one of them.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The target was rejected before any browser work.
    #[error(transparent)]
    Rejected(#[from] ScoutError),

    /// The browser engine could not open a session.
    #[error("browser session failed: {0:#}")]
    Browser(anyhow::Error),

    /// A shutdown signal arrived before the session finished.
    #[error("interrupted during discovery")]
    Interrupted,
}

/// Timing knobs that are not part of the request.
#[derive(Debug, Clone)]
pub struct SessionTimings {
    pub grace: Duration,
    pub backoff: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        let nav = NavigatorOptions::default();
        Self {
            grace: nav.grace,
            backoff: nav.backoff,
        }
    }
}

/// Single-owner accumulator for driver network events.
#[derive(Debug)]
pub struct NetworkLog {
    page: Url,
    same_host_only: bool,
    blocked: Vec<String>,
    requests: Vec<NetworkObservation>,
    responses: Vec<ResponseObservation>,
}

impl NetworkLog {
    pub fn new(page: Url, same_host_only: bool, blocked: Vec<String>) -> Self {
        Self {
            page,
            same_host_only,
            blocked,
            requests: Vec::new(),
            responses: Vec::new(),
        }
    }

    /// Fragment-stripped URL if it passes the host policy.
    fn admit(&self, raw: &str) -> Option<String> {
        let mut url = Url::parse(raw).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        if self.same_host_only && !same_host(&url, &self.page) {
            return None;
        }
        url.set_fragment(None);
        Some(url.to_string())
    }

    pub fn record(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Request {
                url,
                method,
                has_post_data,
                resource_type,
            } => {
                if self.blocked.contains(&resource_type) {
                    return;
                }
                if let Some(url) = self.admit(&url) {
                    self.requests.push(NetworkObservation {
                        url,
                        method: method.to_uppercase(),
                        has_post_data,
                        resource_type,
                    });
                }
            }
            NetworkEvent::Response { url, status } => {
                if let Some(url) = self.admit(&url) {
                    self.responses.push(ResponseObservation { url, status });
                }
            }
        }
    }

    /// Fold every event already delivered on `rx`.
    pub fn drain(&mut self, rx: &mut mpsc::UnboundedReceiver<NetworkEvent>) {
        while let Ok(event) = rx.try_recv() {
            self.record(event);
        }
    }

    pub fn into_parts(self) -> (Vec<NetworkObservation>, Vec<ResponseObservation>) {
        (self.requests, self.responses)
    }
}

/// Run one discovery request against a fresh, isolated browser context.
pub async fn discover(
    renderer: &dyn Renderer,
    request: &DiscoveryRequest,
    timings: &SessionTimings,
) -> Result<DiscoveryReport, DiscoveryError> {
    let target = validate_target(&request.url, request.allow_non_local)?;
    let max_endpoints = request.clamped_max_endpoints();
    let options = NavigatorOptions {
        timeout: Duration::from_millis(request.timeout_ms.max(1)),
        block_resource_types: canonical_block_list(&request.block_resource_types),
        grace: timings.grace,
        backoff: timings.backoff,
        ..NavigatorOptions::default()
    };

    info!(url = %target, max_endpoints, "starting discovery");
    let mut ctx = renderer
        .new_context()
        .await
        .map_err(DiscoveryError::Browser)?;

    let report = run_session(ctx.as_mut(), &target, request, &options, max_endpoints).await;

    if let Err(e) = ctx.close().await {
        warn!("closing browser context failed: {e:#}");
    }
    Ok(report)
}

async fn run_session(
    ctx: &mut dyn RenderContext,
    target: &Url,
    request: &DiscoveryRequest,
    options: &NavigatorOptions,
    max_endpoints: usize,
) -> DiscoveryReport {
    let mut events = match ctx.observe_network().await {
        Ok(rx) => Some(rx),
        Err(e) => {
            warn!("network observation unavailable: {e:#}");
            None
        }
    };

    let navigation = navigator::navigate(ctx, target.as_str(), options).await;

    let html = match (&navigation.content, navigation.ok) {
        (Some(partial), false) => partial.clone(),
        _ => ctx.get_html().await.unwrap_or_else(|e| {
            warn!("page HTML unavailable: {e:#}");
            String::new()
        }),
    };
    let navigated_to = ctx
        .get_url()
        .await
        .ok()
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
        .unwrap_or_else(|| target.to_string());
    let page_url = Url::parse(&navigated_to).unwrap_or_else(|_| target.clone());

    let mut log = NetworkLog::new(
        page_url,
        request.same_host_only,
        options.block_resource_types.clone(),
    );
    if let Some(rx) = events.as_mut() {
        log.drain(rx);
    }
    let (network, responses) = log.into_parts();

    let page = extract_page(&html, &navigated_to);
    build_report(
        SessionCapture {
            url: request.url.clone(),
            navigated_to,
            navigation,
            page,
            network,
            responses,
        },
        max_endpoints,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(same_host_only: bool) -> NetworkLog {
        NetworkLog::new(
            Url::parse("http://localhost:8080/login").unwrap(),
            same_host_only,
            vec!["image".to_string()],
        )
    }

    fn request(url: &str, kind: &str) -> NetworkEvent {
        NetworkEvent::Request {
            url: url.to_string(),
            method: "get".to_string(),
            has_post_data: false,
            resource_type: kind.to_string(),
        }
    }

    #[test]
    fn test_same_host_filter() {
        let mut strict = log(true);
        strict.record(request("http://localhost:8080/api/items#x", "xhr"));
        strict.record(request("http://cdn.example.com/lib.js", "script"));
        strict.record(request("http://localhost:9090/other", "xhr"));
        let (requests, _) = strict.into_parts();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "http://localhost:8080/api/items");
        assert_eq!(requests[0].method, "GET");

        let mut relaxed = log(false);
        relaxed.record(request("http://cdn.example.com/lib.js", "script"));
        assert_eq!(relaxed.into_parts().0.len(), 1);
    }

    #[test]
    fn test_blocked_types_and_responses() {
        let mut l = log(true);
        l.record(request("http://localhost:8080/logo.png", "image"));
        l.record(request("data:text/plain,hi", "other"));
        l.record(NetworkEvent::Response {
            url: "http://localhost:8080/login".to_string(),
            status: 200,
        });
        let (requests, responses) = l.into_parts();
        assert!(requests.is_empty());
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, 200);
    }
}
