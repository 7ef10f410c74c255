// Copyright 2026 Fuzzscout Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST API for Fuzzscout.
//!
//! `GET /health` reports liveness. `POST /crawl` runs one discovery request
//! in its own browser context and, when asked, the rest of the pipeline.
//! The safety gate comes only from the request body and defaults closed.

use crate::discovery::{self, DiscoveryError, SessionTimings};
use crate::harness::SafetyGate;
use crate::pipeline::{Orchestrator, PipelineOutcome};
use crate::renderer::Renderer;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fuzzscout::{DiscoveryReport, DiscoveryRequest, ScoutError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared server state: one browser engine, one orchestrator.
pub struct AppState {
    pub renderer: Arc<dyn Renderer>,
    pub orchestrator: Orchestrator,
    pub timings: SessionTimings,
}

/// `POST /crawl` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRequest {
    #[serde(flatten)]
    pub discovery: DiscoveryRequest,
    #[serde(default)]
    pub run_pipeline: bool,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default)]
    pub allow_execution: bool,
}

fn default_dry_run() -> bool {
    true
}

impl CrawlRequest {
    pub fn gate(&self) -> SafetyGate {
        SafetyGate {
            dry_run: self.dry_run,
            allow_execution: self.allow_execution,
        }
    }
}

/// `POST /crawl` response: the discovery result, plus the pipeline when run.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlResponse {
    #[serde(flatten)]
    pub report: DiscoveryReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineOutcome>,
}

/// Error body: `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": { "code": self.code, "message": self.message }
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::Rejected(e) => {
                let status = match e {
                    ScoutError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    ScoutError::PolicyViolation(_) => StatusCode::FORBIDDEN,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                ApiError {
                    status,
                    code: e.code(),
                    message: e.to_string(),
                }
            }
            DiscoveryError::Browser(e) => ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "E_BROWSER",
                message: format!("{e:#}"),
            },
            DiscoveryError::Interrupted => ApiError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "E_INTERRUPTED",
                message: "server is shutting down".to_string(),
            },
        }
    }
}

/// Build the axum Router with all REST endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/crawl", post(crawl))
        .layer(cors)
        .with_state(state)
}

/// Serve on an already-bound listener until a shutdown signal arrives.
pub async fn serve(listener: tokio::net::TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(crate::signals::shutdown_signal())
        .await?;
    Ok(())
}

/// Start the REST API server on `127.0.0.1:<port>`.
pub async fn start(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("REST API listening on http://{addr}");
    serve(listener, state).await
}

// ── Handlers ────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn crawl(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CrawlRequest>, JsonRejection>,
) -> Result<Json<CrawlResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError {
        status: StatusCode::BAD_REQUEST,
        code: "E_INVALID_INPUT",
        message: e.body_text(),
    })?;

    if !request.run_pipeline {
        let report =
            discovery::discover(state.renderer.as_ref(), &request.discovery, &state.timings).await?;
        return Ok(Json(CrawlResponse {
            report,
            pipeline: None,
        }));
    }

    let run = state
        .orchestrator
        .run(
            state.renderer.as_ref(),
            &request.discovery,
            request.gate(),
            &state.timings,
        )
        .await?;
    Ok(Json(CrawlResponse {
        report: run.report,
        pipeline: Some(run.outcome),
    }))
}
