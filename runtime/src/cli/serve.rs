//! `fuzzscout serve`: the REST API backed by one shared browser engine.

use crate::cli::output::{self, Styled};
use crate::config;
use crate::discovery::SessionTimings;
use crate::pipeline::Orchestrator;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::{NoopRenderer, Renderer};
use crate::rest::{self, AppState};
use crate::signals;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(port: u16, headed: bool, config_path: Option<&Path>) -> Result<()> {
    let s = Styled::new();
    let config = config::resolve_config(config_path)?;
    info!("starting Fuzzscout v{}", env!("CARGO_PKG_VERSION"));

    let renderer: Arc<dyn Renderer> = match ChromiumRenderer::new(!headed).await {
        Ok(renderer) => {
            info!("Chromium renderer initialized");
            Arc::new(renderer)
        }
        Err(e) => {
            warn!("Failed to initialize Chromium: {e:#}");
            warn!("Running without a browser; /crawl requests will fail");
            Arc::new(NoopRenderer)
        }
    };

    let state = Arc::new(AppState {
        renderer: Arc::clone(&renderer),
        orchestrator: Orchestrator::new(config, signals::cancel_on_signal()),
        timings: SessionTimings::default(),
    });

    if !output::is_quiet() {
        eprintln!(
            "  {} Fuzzscout v{} listening on http://127.0.0.1:{port}",
            s.ok_sym(),
            env!("CARGO_PKG_VERSION")
        );
    }

    let result = rest::start(port, state).await;

    if let Err(e) = renderer.shutdown().await {
        warn!("browser shutdown failed: {e:#}");
    }
    if !output::is_quiet() {
        eprintln!("  {} Fuzzscout stopped.", s.ok_sym());
    }
    result
}
