//! Browser driver abstraction.
//!
//! Defines the `Renderer` and `RenderContext` traits that the discovery
//! session drives. The only production engine is Chromium via chromiumoxide;
//! tests supply scripted in-memory contexts.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use fuzzscout::Readiness;
use tokio::sync::mpsc;

/// A network event observed while a page loads.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Request {
        url: String,
        method: String,
        has_post_data: bool,
        /// Canonical lowercase resource class (`document`, `xhr`, `image`, ...).
        resource_type: String,
    },
    Response {
        url: String,
        status: u16,
    },
}

/// A browser engine that can create isolated rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new isolated browser context with one blank page.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently open contexts.
    fn active_contexts(&self) -> usize;
}

/// One isolated browser context driving a single page.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Abort subsequent requests whose resource class is in `types`.
    async fn block_resources(&mut self, types: &[String]) -> Result<()>;
    /// Start observing requests and responses. Events are delivered until the
    /// context closes.
    async fn observe_network(&mut self) -> Result<mpsc::UnboundedReceiver<NetworkEvent>>;
    /// Load `url` and wait until `readiness` holds. Callers bound the wait.
    async fn navigate(&mut self, url: &str, readiness: Readiness) -> Result<()>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the current page HTML, however far loading got.
    async fn get_html(&self) -> Result<String>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Close this context and release its browser resources.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A renderer used when Chromium is unavailable.
///
/// Every context request fails, so discovery reports a browser error while the
/// rest of the service (health, execution, triage) keeps working.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("browser not available"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}
