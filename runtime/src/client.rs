//! Minimal client for submitting one JSON request to a Fuzzscout server.

use anyhow::{Context, Result};
use fuzzscout::{ScoutError, ScoutResult};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Connection settings for one submission.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub url: String,
    pub timeout: Duration,
    pub proxy: Option<String>,
    pub token: Option<String>,
}

impl SubmitOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(60),
            proxy: None,
            token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitResponse {
    pub status: u16,
    pub reason: String,
    pub body: ResponseBody,
}

impl SubmitResponse {
    /// `HTTP <status> <reason>` followed by the body.
    pub fn render(&self, pretty: bool) -> String {
        let body = match &self.body {
            ResponseBody::Json(v) if pretty => {
                serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
            }
            ResponseBody::Json(v) => v.to_string(),
            ResponseBody::Text(t) => t.clone(),
        };
        format!("HTTP {} {}\n{body}", self.status, self.reason)
    }

    /// Save the body: indented JSON when it parsed, raw text otherwise.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match &self.body {
            ResponseBody::Json(v) => serde_json::to_string_pretty(v)?,
            ResponseBody::Text(t) => t.clone(),
        };
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Request body from a file or an inline string. Exactly one must be given.
pub fn load_body(input: Option<&Path>, data: Option<&str>) -> ScoutResult<Value> {
    match (input, data) {
        (Some(path), None) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                ScoutError::InvalidInput(format!("cannot read {}: {e}", path.display()))
            })?;
            serde_json::from_str(&text).map_err(|e| {
                ScoutError::InvalidInput(format!("{} is not valid JSON: {e}", path.display()))
            })
        }
        (None, Some(inline)) => serde_json::from_str(inline)
            .map_err(|e| ScoutError::InvalidInput(format!("invalid inline JSON (--data): {e}"))),
        _ => Err(ScoutError::InvalidInput(
            "exactly one of --input or --data is required".to_string(),
        )),
    }
}

/// POST `body` as JSON and classify the reply.
pub async fn submit(options: &SubmitOptions, body: &Value) -> Result<SubmitResponse> {
    let mut builder = reqwest::Client::builder().timeout(options.timeout);
    if let Some(proxy) = &options.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy).context("invalid proxy URL")?);
    }
    let client = builder.build().context("failed to build HTTP client")?;

    let mut request = client.post(&options.url).json(body);
    if let Some(token) = &options.token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("request to {} failed", options.url))?;
    let status = response.status();
    let is_json = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    let text = response.text().await.context("failed to read response body")?;

    let trimmed = text.trim_start();
    let body = if is_json || trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str(&text)
            .map(ResponseBody::Json)
            .unwrap_or(ResponseBody::Text(text))
    } else {
        ResponseBody::Text(text)
    };

    Ok(SubmitResponse {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("").to_string(),
        body,
    })
}
