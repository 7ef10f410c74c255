//! Chromium-based renderer using chromiumoxide.
//!
//! Each context is a separate CDP browser context, so cookies, cache and
//! storage never leak between discovery sessions sharing one browser.

use super::{NetworkEvent, RenderContext, Renderer};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    self, ErrorReason, EventRequestWillBeSent, EventResponseReceived, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::Page;
use fuzzscout::Readiness;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Quiet window that counts as "network idle".
const NETWORK_QUIET: Duration = Duration::from_millis(500);

/// Interval between `document.readyState` polls.
const READY_POLL: Duration = Duration::from_millis(100);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("FUZZSCOUT_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Map a CDP resource type onto the canonical lowercase class names used in
/// block lists and network observations.
pub fn resource_class(kind: &ResourceType) -> &'static str {
    match kind {
        ResourceType::Document => "document",
        ResourceType::Stylesheet => "stylesheet",
        ResourceType::Image => "image",
        ResourceType::Media => "media",
        ResourceType::Font => "font",
        ResourceType::Script => "script",
        ResourceType::Xhr => "xhr",
        ResourceType::Fetch => "fetch",
        ResourceType::WebSocket => "websocket",
        ResourceType::Manifest => "manifest",
        _ => "other",
    }
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance, headless unless `headless` is false.
    pub async fn new(headless: bool) -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Set FUZZSCOUT_CHROMIUM_PATH or install Chrome.")?;

        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);
        builder = if headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler: {e}");
                }
            }
        });

        tracing::info!(headless, "Chromium renderer initialized");
        Ok(Self {
            browser: Arc::new(browser),
            handler,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let context_id = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .context("failed to create browser context")?
            .result
            .browser_context_id;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(anyhow::Error::msg)?;
        let page = self
            .browser
            .new_page(target)
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            browser: Arc::clone(&self.browser),
            context_id,
            activity: Arc::new(Activity::new()),
            tasks: Vec::new(),
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.handler.abort();
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// Time of the most recent network event, for idle detection.
struct Activity {
    epoch: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_ms.store(now, Ordering::Relaxed);
    }

    fn quiet_for(&self) -> Duration {
        let now = self.epoch.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_ms.load(Ordering::Relaxed)))
    }
}

/// A single page inside its own browser context.
pub struct ChromiumContext {
    page: Page,
    browser: Arc<Browser>,
    context_id: BrowserContextId,
    activity: Arc<Activity>,
    tasks: Vec<JoinHandle<()>>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumContext {
    async fn ready_state(&self) -> Result<String> {
        self.page
            .evaluate("document.readyState")
            .await
            .context("readyState probe failed")?
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert readyState: {e:?}"))
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn block_resources(&mut self, types: &[String]) -> Result<()> {
        if types.is_empty() {
            return Ok(());
        }

        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .context("failed to listen for paused requests")?;
        self.page
            .execute(fetch::EnableParams::default())
            .await
            .context("failed to enable request interception")?;

        let page = self.page.clone();
        let blocked = types.to_vec();
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let class = resource_class(&event.resource_type);
                let outcome = if blocked.iter().any(|b| b == class) {
                    page.execute(FailRequestParams::new(
                        event.request_id.clone(),
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
                } else {
                    page.execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ())
                };
                if let Err(e) = outcome {
                    tracing::debug!(url = %event.request.url, "interception reply failed: {e}");
                }
            }
        }));
        Ok(())
    }

    async fn observe_network(&mut self) -> Result<mpsc::UnboundedReceiver<NetworkEvent>> {
        let mut requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("failed to listen for requests")?;
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to listen for responses")?;
        self.page
            .execute(network::EnableParams::default())
            .await
            .context("failed to enable network domain")?;

        let (tx, rx) = mpsc::unbounded_channel();

        let activity = Arc::clone(&self.activity);
        let request_tx = tx.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                activity.touch();
                let observed = NetworkEvent::Request {
                    url: event.request.url.clone(),
                    method: event.request.method.clone(),
                    has_post_data: event.request.has_post_data.unwrap_or(false),
                    resource_type: event
                        .r#type
                        .as_ref()
                        .map_or("other", resource_class)
                        .to_string(),
                };
                if request_tx.send(observed).is_err() {
                    break;
                }
            }
        }));

        let activity = Arc::clone(&self.activity);
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                activity.touch();
                let observed = NetworkEvent::Response {
                    url: event.response.url.clone(),
                    status: u16::try_from(event.response.status).unwrap_or(0),
                };
                if tx.send(observed).is_err() {
                    break;
                }
            }
        }));

        Ok(rx)
    }

    async fn navigate(&mut self, url: &str, readiness: Readiness) -> Result<()> {
        self.activity.touch();
        let response = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .context("navigation command failed")?;
        if let Some(err) = response.result.error_text.as_deref().filter(|e| !e.is_empty()) {
            bail!("navigation failed: {err}");
        }

        loop {
            let state = self.ready_state().await.unwrap_or_default();
            let reached = match readiness {
                Readiness::DomContentLoaded => state == "interactive" || state == "complete",
                Readiness::Load => state == "complete",
                Readiness::NetworkIdle => {
                    state == "complete" && self.activity.quiet_for() >= NETWORK_QUIET
                }
            };
            if reached {
                return Ok(());
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn get_html(&self) -> Result<String> {
        let html = self
            .execute_js("document.documentElement ? document.documentElement.outerHTML : ''")
            .await
            .context("failed to get HTML")?;
        Ok(html.as_str().unwrap_or_default().to_string())
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromiumContext {
            page,
            browser,
            context_id,
            tasks,
            active_count,
            ..
        } = *self;

        for task in tasks {
            task.abort();
        }
        active_count.fetch_sub(1, Ordering::Relaxed);
        if let Err(e) = page.close().await {
            tracing::debug!("page close failed: {e}");
        }
        browser
            .execute(DisposeBrowserContextParams::new(context_id))
            .await
            .context("failed to dispose browser context")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_class_names() {
        assert_eq!(resource_class(&ResourceType::Stylesheet), "stylesheet");
        assert_eq!(resource_class(&ResourceType::Xhr), "xhr");
        assert_eq!(resource_class(&ResourceType::Ping), "other");
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_context_roundtrip() {
        let renderer = ChromiumRenderer::new(true)
            .await
            .expect("failed to create renderer");
        let mut ctx = renderer
            .new_context()
            .await
            .expect("failed to create context");

        let _events = ctx.observe_network().await.expect("observe failed");
        ctx.navigate(
            "data:text/html,<form method=post><input name=q></form>",
            Readiness::Load,
        )
        .await
        .expect("navigation failed");

        let html = ctx.get_html().await.expect("get_html failed");
        assert!(html.contains("name=\"q\""));

        ctx.close().await.expect("close failed");
        assert_eq!(renderer.active_contexts(), 0);
        renderer.shutdown().await.expect("shutdown failed");
    }
}
