//! Discovery artifact assembly and stage-handoff file I/O.

use crate::error::{ScoutError, ScoutResult};
use crate::extract::PageExtract;
use crate::normalize::{self, EndpointSources};
use crate::types::{
    DiscoveryCounts, DiscoveryReport, NavigationResult, NetworkObservation, ResponseObservation,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Everything one page session produced, ready to be folded into a report.
#[derive(Debug, Clone)]
pub struct SessionCapture {
    /// The requested target.
    pub url: String,
    /// Final page URL after redirects.
    pub navigated_to: String,
    pub navigation: NavigationResult,
    pub page: PageExtract,
    pub network: Vec<NetworkObservation>,
    pub responses: Vec<ResponseObservation>,
}

/// Assemble the discovery artifact from one session's capture.
pub fn build_report(capture: SessionCapture, max_endpoints: usize) -> DiscoveryReport {
    let endpoints = normalize::normalize(
        EndpointSources {
            forms: &capture.page.forms,
            links: &capture.page.links,
            network: &capture.network,
            hints: &capture.page.hints,
            responses: &capture.responses,
        },
        &capture.navigated_to,
        max_endpoints,
    );

    let counts = DiscoveryCounts {
        forms: capture.page.forms.len(),
        links: capture.page.links.len(),
        network_requests: capture.network.len(),
    };

    tracing::info!(
        url = %capture.url,
        forms = counts.forms,
        links = counts.links,
        network = counts.network_requests,
        endpoints = endpoints.len(),
        navigation_ok = capture.navigation.ok,
        "discovery report built"
    );

    DiscoveryReport {
        url: capture.url,
        navigated_to: capture.navigated_to,
        navigation: capture.navigation,
        counts,
        forms: capture.page.forms,
        endpoints,
    }
}

/// Write a JSON artifact, replacing any previous file atomically.
pub fn write_json_artifact<T: Serialize>(path: &Path, value: &T) -> ScoutResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a JSON artifact into `T`.
pub fn read_json_artifact<T: DeserializeOwned>(path: &Path) -> ScoutResult<T> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        ScoutError::Artifact(format!("cannot read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&data)
        .map_err(|e| ScoutError::Artifact(format!("{} is not a valid artifact: {e}", path.display())))
}

/// Read a discovery (or classified) artifact.
pub fn read_report(path: &Path) -> ScoutResult<DiscoveryReport> {
    read_json_artifact(path)
}
