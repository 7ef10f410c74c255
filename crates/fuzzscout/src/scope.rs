//! Target scope checks and resource-class filtering.
//!
//! The loopback check runs before any browser session exists, so a rejected
//! target never causes network traffic.

use crate::error::{ScoutError, ScoutResult};
use url::{Host, Url};

/// Resource classes aborted at the driver level unless the caller overrides.
pub fn default_blocked_resource_types() -> Vec<String> {
    ["image", "stylesheet", "font", "media"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Parse and scope-check a discovery target.
///
/// Returns `InvalidInput` for unparseable or non-HTTP URLs and
/// `PolicyViolation` for non-loopback hosts unless `allow_non_local` is set.
pub fn validate_target(raw: &str, allow_non_local: bool) -> ScoutResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ScoutError::InvalidInput("target url is empty".to_string()));
    }
    let url = Url::parse(trimmed)
        .map_err(|e| ScoutError::InvalidInput(format!("cannot parse {trimmed:?}: {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ScoutError::InvalidInput(format!(
            "unsupported scheme {:?}; only http and https are crawled",
            url.scheme()
        )));
    }
    if url.host().is_none() {
        return Err(ScoutError::InvalidInput(format!("{trimmed:?} has no host")));
    }

    if !allow_non_local && !is_loopback(&url) {
        return Err(ScoutError::PolicyViolation(format!(
            "target host {:?} is not a loopback address; set allowNonLocal to crawl it",
            url.host_str().unwrap_or_default()
        )));
    }

    Ok(url)
}

/// Whether the URL's host is a loopback name or address.
pub fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(addr)) => addr.is_loopback(),
        Some(Host::Ipv6(addr)) => addr.is_loopback(),
        None => false,
    }
}

/// Whether two URLs share host and effective port.
pub fn same_host(a: &Url, b: &Url) -> bool {
    a.host_str().map(str::to_ascii_lowercase) == b.host_str().map(str::to_ascii_lowercase)
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Canonical lower-case name for a resource class, accepting common aliases.
pub fn canonical_resource_type(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    match lower.as_str() {
        "style" | "css" | "stylesheets" => "stylesheet".to_string(),
        "img" | "images" => "image".to_string(),
        "fonts" => "font".to_string(),
        "video" | "audio" => "media".to_string(),
        _ => lower,
    }
}

/// Canonicalize and deduplicate a caller-supplied block list.
pub fn canonical_block_list(types: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for t in types {
        let c = canonical_resource_type(t);
        if !c.is_empty() && !out.contains(&c) {
            out.push(c);
        }
    }
    out
}
