//! Core data types for discovered inputs, endpoints, and discovery requests.

use serde::{Deserialize, Serialize};

/// Sentinel control type that is retained even without a name.
pub const HIDDEN_TYPE: &str = "hidden";

/// Type assigned to parameters parsed from query strings.
pub const DEFAULT_PARAM_TYPE: &str = "string";

/// Note attached to endpoints that came from inline script hints.
pub const INLINE_HINT_NOTE: &str = "inline_hint";

/// Lower bound for `maxEndpoints`.
pub const MIN_ENDPOINTS: usize = 50;

/// Upper bound for `maxEndpoints`.
pub const MAX_ENDPOINTS: usize = 1000;

/// A single input accepted by a form or endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Field name. `None` only for unnamed hidden controls.
    pub name: Option<String>,
    /// Effective control type, or a predicted data type after classification.
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default)]
    pub required: bool,
    /// Ordered option values, set only for enumerated selectors.
    #[serde(default)]
    pub options: Option<Vec<String>>,
    /// Classifier confidence, present only in classified artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Parameter {
    /// A parameter taken from a query string key.
    pub fn query(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            param_type: DEFAULT_PARAM_TYPE.to_string(),
            required: false,
            options: None,
            confidence: None,
        }
    }

    /// Parameters without a name survive only as hidden controls.
    pub fn is_retained(&self) -> bool {
        match &self.name {
            Some(name) if !name.is_empty() => true,
            _ => self.param_type == HIDDEN_TYPE,
        }
    }
}

/// A `<form>` element with at least one retained parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    /// Absolute action URL.
    pub action: String,
    /// Upper-cased HTTP method.
    pub method: String,
    pub params: Vec<Parameter>,
}

/// A request observed on the wire during a page load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkObservation {
    /// Absolute URL with the fragment stripped.
    pub url: String,
    pub method: String,
    pub has_post_data: bool,
    /// Lower-case resource class (`document`, `xhr`, `fetch`, `script`, ...).
    pub resource_type: String,
}

/// A response observed on the wire, used for status annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseObservation {
    pub url: String,
    pub status: u16,
}

/// Canonical testable surface: one per `(method, normalized URL)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub method: String,
    pub url: String,
    pub params: Vec<Parameter>,
    #[serde(default)]
    pub has_post_data: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Page-load completion criterion, tried in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    /// No network activity for a short quiet window.
    NetworkIdle,
    /// The `load` event fired.
    Load,
    /// The DOM finished parsing.
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
}

impl Readiness {
    /// Default ladder: fully idle, then basic load, then DOM ready.
    pub fn default_ladder() -> Vec<Readiness> {
        vec![
            Readiness::NetworkIdle,
            Readiness::Load,
            Readiness::DomContentLoaded,
        ]
    }
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NetworkIdle => write!(f, "networkidle"),
            Self::Load => write!(f, "load"),
            Self::DomContentLoaded => write!(f, "domcontentloaded"),
        }
    }
}

/// Terminal result of the navigation fallback ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationResult {
    pub ok: bool,
    /// Readiness condition that succeeded (or the last one attempted).
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Partial page content captured after every condition failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Inbound discovery request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest {
    pub url: String,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub allow_non_local: bool,
    #[serde(default = "default_max_endpoints")]
    pub max_endpoints: usize,
    #[serde(default = "crate::scope::default_blocked_resource_types")]
    pub block_resource_types: Vec<String>,
    /// Drop network observations whose host differs from the target's.
    #[serde(default = "default_same_host_only")]
    pub same_host_only: bool,
}

fn default_headless() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_endpoints() -> usize {
    300
}

fn default_same_host_only() -> bool {
    true
}

impl DiscoveryRequest {
    /// A request for `url` with every other field at its default.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headless: default_headless(),
            timeout_ms: default_timeout_ms(),
            allow_non_local: false,
            max_endpoints: default_max_endpoints(),
            block_resource_types: crate::scope::default_blocked_resource_types(),
            same_host_only: default_same_host_only(),
        }
    }

    /// `maxEndpoints` clamped into `[MIN_ENDPOINTS, MAX_ENDPOINTS]`.
    pub fn clamped_max_endpoints(&self) -> usize {
        clamp_max_endpoints(self.max_endpoints)
    }
}

/// Clamp a caller-supplied endpoint bound into the permitted range.
pub fn clamp_max_endpoints(requested: usize) -> usize {
    requested.clamp(MIN_ENDPOINTS, MAX_ENDPOINTS)
}

/// Summary counters for a discovery run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryCounts {
    pub forms: usize,
    pub links: usize,
    pub network_requests: usize,
}

/// The discovery artifact; identical in shape to the discovery response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    /// The requested target.
    pub url: String,
    /// Where the browser ended up after redirects.
    pub navigated_to: String,
    pub navigation: NavigationResult,
    pub counts: DiscoveryCounts,
    pub forms: Vec<Form>,
    pub endpoints: Vec<Endpoint>,
}
