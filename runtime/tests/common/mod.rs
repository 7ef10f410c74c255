//! Scripted browser engine for integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use fuzzscout::Readiness;
use fuzzscout_runtime::discovery::SessionTimings;
use fuzzscout_runtime::renderer::{NetworkEvent, RenderContext, Renderer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// What every context of a [`ScriptedRenderer`] serves.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    pub html: String,
    /// URL reported after navigation; defaults to the navigated URL.
    pub final_url: Option<String>,
    /// Emitted on the first navigation attempt.
    pub events: Vec<NetworkEvent>,
    /// Readiness conditions that fail.
    pub failing: Vec<Readiness>,
}

impl ScriptedPage {
    pub fn html(html: &str) -> Self {
        Self {
            html: html.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Default)]
pub struct Counters {
    pub created: AtomicUsize,
    pub active: AtomicUsize,
    pub attempts: Mutex<Vec<Readiness>>,
    pub blocked: Mutex<Vec<String>>,
}

pub struct ScriptedRenderer {
    page: ScriptedPage,
    pub counters: Arc<Counters>,
}

impl ScriptedRenderer {
    pub fn new(page: ScriptedPage) -> Self {
        Self {
            page,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn contexts_created(&self) -> usize {
        self.counters.created.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> Vec<Readiness> {
        self.counters.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        self.counters.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedContext {
            page: self.page.clone(),
            counters: Arc::clone(&self.counters),
            events: None,
            url: None,
            emitted: false,
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }
}

struct ScriptedContext {
    page: ScriptedPage,
    counters: Arc<Counters>,
    events: Option<mpsc::UnboundedSender<NetworkEvent>>,
    url: Option<String>,
    emitted: bool,
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn block_resources(&mut self, types: &[String]) -> Result<()> {
        self.counters.blocked.lock().unwrap().extend_from_slice(types);
        Ok(())
    }

    async fn observe_network(&mut self) -> Result<mpsc::UnboundedReceiver<NetworkEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        Ok(rx)
    }

    async fn navigate(&mut self, url: &str, readiness: Readiness) -> Result<()> {
        self.counters.attempts.lock().unwrap().push(readiness);
        self.url = Some(self.page.final_url.clone().unwrap_or_else(|| url.to_string()));
        if !self.emitted {
            self.emitted = true;
            if let Some(tx) = &self.events {
                for event in &self.page.events {
                    let _ = tx.send(event.clone());
                }
            }
        }
        if self.page.failing.contains(&readiness) {
            return Err(anyhow!("net::ERR_TIMED_OUT waiting for {readiness}"));
        }
        Ok(())
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn get_html(&self) -> Result<String> {
        Ok(self.page.html.clone())
    }

    async fn get_url(&self) -> Result<String> {
        Ok(self.url.clone().unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// No settle or backoff delays.
pub fn fast_timings() -> SessionTimings {
    SessionTimings {
        grace: Duration::ZERO,
        backoff: Duration::ZERO,
    }
}

pub const LOGIN_HTML: &str = r#"
<html><body>
  <form action="/login" method="POST">
    <input type="text" name="user" required>
    <input type="password" name="pass">
    <button type="submit">Sign in</button>
  </form>
</body></html>
"#;

pub fn request(url: &str) -> NetworkEvent {
    NetworkEvent::Request {
        url: url.to_string(),
        method: "GET".to_string(),
        has_post_data: false,
        resource_type: "document".to_string(),
    }
}

pub fn response(url: &str, status: u16) -> NetworkEvent {
    NetworkEvent::Response {
        url: url.to_string(),
        status,
    }
}
