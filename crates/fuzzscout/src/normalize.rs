//! Endpoint normalization and deduplication.
//!
//! Forms, links, network observations, and script hints are folded into one
//! [`EndpointSet`] keyed on [`EndpointKey`]. Insertion order is the only
//! priority: forms first, then links, then network calls, then hints. Merging
//! two endpoints with the same key is a set union of parameters by name plus a
//! logical OR of the post-body flag, so the result does not depend on the order
//! in which colliding sources arrive.
//!
//! Status annotation matches endpoints to observed responses by URL prefix.
//! Distinct endpoints sharing a path prefix can pick up each other's status;
//! this is a known limitation and is kept as-is.

use crate::extract::ScriptHints;
use crate::types::{
    Endpoint, Form, NetworkObservation, Parameter, ResponseObservation, INLINE_HINT_NOTE,
};
use std::collections::HashMap;
use url::Url;

/// Link schemes that never name a fetchable endpoint.
const NON_FETCHABLE_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "blob:"];

/// Identity of an endpoint: upper-cased method plus normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    pub method: String,
    pub url: String,
}

impl EndpointKey {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.trim().to_uppercase(),
            url: normalize_url(url),
        }
    }
}

impl std::fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Resolve a possibly relative reference against `base`.
///
/// An empty reference resolves to `base`. Anything that fails to resolve is
/// returned unchanged so candidate endpoints are never silently lost.
pub fn resolve_url(base: &str, reference: &str) -> String {
    let reference = reference.trim();
    if reference.is_empty() {
        return base.to_string();
    }
    if let Ok(absolute) = Url::parse(reference) {
        return absolute.to_string();
    }
    match Url::parse(base).and_then(|b| b.join(reference)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => reference.to_string(),
    }
}

/// Strip the fragment and collapse a non-root trailing slash.
///
/// Idempotent. Unparseable input is returned unmodified.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    url.set_fragment(None);
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        url.set_path(if trimmed.is_empty() { "/" } else { trimmed });
    }
    url.to_string()
}

/// One parameter per distinct query-string key, in first-seen order.
pub fn query_params(url: &str) -> Vec<Parameter> {
    let Ok(parsed) = Url::parse(url) else {
        return Vec::new();
    };
    let mut params: Vec<Parameter> = Vec::new();
    for (key, _) in parsed.query_pairs() {
        if key.is_empty() || params.iter().any(|p| p.name.as_deref() == Some(&*key)) {
            continue;
        }
        params.push(Parameter::query(key.into_owned()));
    }
    params
}

/// Merge `other` into `into`; both must share an [`EndpointKey`].
///
/// Parameters are unioned by name with the first occurrence's metadata kept,
/// `has_post_data` is OR-ed, and the first present status and note win.
pub fn merge_endpoint(into: &mut Endpoint, other: Endpoint) {
    for param in other.params {
        if !into.params.iter().any(|p| p.name == param.name) {
            into.params.push(param);
        }
    }
    into.has_post_data |= other.has_post_data;
    if into.status.is_none() {
        into.status = other.status;
    }
    if into.note.is_none() {
        into.note = other.note;
    }
}

/// First-seen-ordered accumulator of endpoints keyed by identity.
#[derive(Debug, Default)]
pub struct EndpointSet {
    index: HashMap<EndpointKey, usize>,
    endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an endpoint, normalizing its URL and merging on key collision.
    pub fn insert(&mut self, mut endpoint: Endpoint) {
        let key = EndpointKey::new(&endpoint.method, &endpoint.url);
        endpoint.method = key.method.clone();
        endpoint.url = key.url.clone();
        dedup_params(&mut endpoint.params);

        match self.index.get(&key) {
            Some(&i) => merge_endpoint(&mut self.endpoints[i], endpoint),
            None => {
                self.index.insert(key, self.endpoints.len());
                self.endpoints.push(endpoint);
            }
        }
    }

    pub fn add_form(&mut self, form: &Form, page_url: &str) {
        self.insert(Endpoint {
            method: form.method.clone(),
            url: resolve_url(page_url, &form.action),
            params: form.params.clone(),
            has_post_data: form.method.eq_ignore_ascii_case("POST"),
            status: None,
            note: None,
        });
    }

    pub fn add_link(&mut self, href: &str, page_url: &str) {
        let lower = href.trim().to_ascii_lowercase();
        if NON_FETCHABLE_SCHEMES.iter().any(|s| lower.starts_with(s)) {
            return;
        }
        let url = resolve_url(page_url, href);
        self.insert(Endpoint {
            method: "GET".to_string(),
            params: query_params(&url),
            url,
            has_post_data: false,
            status: None,
            note: None,
        });
    }

    pub fn add_observation(&mut self, obs: &NetworkObservation) {
        self.insert(Endpoint {
            method: obs.method.clone(),
            url: obs.url.clone(),
            params: query_params(&obs.url),
            has_post_data: obs.has_post_data,
            status: None,
            note: None,
        });
    }

    pub fn add_hint(&mut self, path: &str, page_url: &str) {
        self.insert(Endpoint {
            method: "GET".to_string(),
            url: resolve_url(page_url, path),
            params: Vec::new(),
            has_post_data: false,
            status: None,
            note: Some(INLINE_HINT_NOTE.to_string()),
        });
    }

    /// Attach the most recent response status whose URL has the endpoint's
    /// URL as a prefix.
    pub fn annotate_status(&mut self, responses: &[ResponseObservation]) {
        let normalized: Vec<(String, u16)> = responses
            .iter()
            .map(|r| (normalize_url(&r.url), r.status))
            .collect();
        for endpoint in &mut self.endpoints {
            if let Some((_, status)) = normalized
                .iter()
                .rev()
                .find(|(url, _)| url.starts_with(&endpoint.url))
            {
                endpoint.status = Some(*status);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Endpoints in first-seen order, truncated to `max`.
    pub fn into_truncated(mut self, max: usize) -> Vec<Endpoint> {
        self.endpoints.truncate(max);
        self.endpoints
    }
}

fn dedup_params(params: &mut Vec<Parameter>) {
    let mut seen: Vec<Option<String>> = Vec::with_capacity(params.len());
    params.retain(|p| {
        if seen.contains(&p.name) {
            false
        } else {
            seen.push(p.name.clone());
            true
        }
    });
}

/// Every raw source the normalizer consumes for one page.
#[derive(Debug, Clone, Copy)]
pub struct EndpointSources<'a> {
    pub forms: &'a [Form],
    pub links: &'a [String],
    pub network: &'a [NetworkObservation],
    pub hints: &'a ScriptHints,
    pub responses: &'a [ResponseObservation],
}

/// Fold all sources into a deduplicated, status-annotated, truncated list.
pub fn normalize(sources: EndpointSources<'_>, page_url: &str, max_endpoints: usize) -> Vec<Endpoint> {
    let mut set = EndpointSet::new();
    for form in sources.forms {
        set.add_form(form, page_url);
    }
    for link in sources.links {
        set.add_link(link, page_url);
    }
    for obs in sources.network {
        set.add_observation(obs);
    }
    for hint in &sources.hints.paths {
        set.add_hint(hint, page_url);
    }
    set.annotate_status(sources.responses);

    tracing::debug!(
        endpoints = set.len(),
        max_endpoints,
        "normalized endpoint set"
    );
    set.into_truncated(max_endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(endpoint: &Endpoint) -> Vec<&str> {
        endpoint
            .params
            .iter()
            .filter_map(|p| p.name.as_deref())
            .collect()
    }

    fn endpoint(method: &str, url: &str, params: &[&str], post: bool) -> Endpoint {
        Endpoint {
            method: method.to_string(),
            url: url.to_string(),
            params: params.iter().map(|n| Parameter::query(*n)).collect(),
            has_post_data: post,
            status: None,
            note: None,
        }
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("http://localhost/items/#frag"),
            "http://localhost/items"
        );
        assert_eq!(normalize_url("http://localhost/"), "http://localhost/");
        assert_eq!(normalize_url("http://localhost"), "http://localhost/");
        assert_eq!(
            normalize_url("http://localhost/a//?x=1#y"),
            "http://localhost/a?x=1"
        );
        assert_eq!(normalize_url("not a url/"), "not a url/");
    }

    #[test]
    fn test_normalize_url_idempotent() {
        for raw in [
            "http://localhost:8080/items?id=3&sort=asc#top",
            "http://localhost/a/b/",
            "http://localhost///",
            "https://example.com/api/v1/users/?page=2",
            "http://[::1]:9000/x/#",
            "not a url/",
        ] {
            let once = normalize_url(raw);
            assert_eq!(normalize_url(&once), once, "not idempotent for {raw}");
        }
    }

    #[test]
    fn test_link_query_params() {
        let mut set = EndpointSet::new();
        set.add_link("/items?id=3&sort=asc", "http://localhost:8080/");
        let endpoints = set.into_truncated(50);

        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].method, "GET");
        assert_eq!(endpoints[0].url, "http://localhost:8080/items?id=3&sort=asc");
        assert_eq!(names(&endpoints[0]), vec!["id", "sort"]);
        assert_eq!(endpoints[0].params[0].param_type, "string");
        assert!(!endpoints[0].params[0].required);
    }

    #[test]
    fn test_non_fetchable_links_skipped() {
        let mut set = EndpointSet::new();
        set.add_link("javascript:void(0)", "http://localhost/");
        set.add_link("mailto:ops@localhost", "http://localhost/");
        assert!(set.is_empty());
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = endpoint("post", "http://localhost/api/", &["a", "b"], false);
        let b = endpoint("POST", "http://localhost/api#x", &["b", "c"], true);

        let mut ab = EndpointSet::new();
        ab.insert(a.clone());
        ab.insert(b.clone());
        let ab = ab.into_truncated(50);

        let mut ba = EndpointSet::new();
        ba.insert(b);
        ba.insert(a);
        let ba = ba.into_truncated(50);

        assert_eq!(ab.len(), 1);
        assert_eq!(ba.len(), 1);
        let mut left: Vec<&str> = names(&ab[0]);
        let mut right: Vec<&str> = names(&ba[0]);
        left.sort();
        right.sort();
        assert_eq!(left, vec!["a", "b", "c"]);
        assert_eq!(left, right);
        assert!(ab[0].has_post_data && ba[0].has_post_data);
        assert_eq!(ab[0].url, "http://localhost/api");
    }

    #[test]
    fn test_first_metadata_wins() {
        let mut first = endpoint("GET", "http://localhost/s", &["q"], false);
        first.params[0].required = true;
        let second = endpoint("GET", "http://localhost/s", &["q"], false);

        let mut set = EndpointSet::new();
        set.insert(first);
        set.insert(second);
        let out = set.into_truncated(50);
        assert!(out[0].params[0].required);
    }

    #[test]
    fn test_methods_are_distinct_keys() {
        let mut set = EndpointSet::new();
        set.insert(endpoint("GET", "http://localhost/x", &[], false));
        set.insert(endpoint("POST", "http://localhost/x", &[], true));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_truncation_preserves_order() {
        let mut set = EndpointSet::new();
        for i in 0..120 {
            set.insert(endpoint("GET", &format!("http://localhost/p{i}"), &[], false));
        }
        let out = set.into_truncated(50);
        assert_eq!(out.len(), 50);
        assert_eq!(out[0].url, "http://localhost/p0");
        assert_eq!(out[49].url, "http://localhost/p49");
    }

    #[test]
    fn test_source_precedence() {
        let forms = vec![Form {
            action: "http://localhost/search".to_string(),
            method: "GET".to_string(),
            params: vec![Parameter {
                name: Some("q".into()),
                param_type: "search".into(),
                required: true,
                options: None,
                confidence: None,
            }],
        }];
        let links = vec!["/search?q=shoes&page=2".to_string(), "/about".to_string()];
        let network = vec![NetworkObservation {
            url: "http://localhost/api/cart".to_string(),
            method: "POST".to_string(),
            has_post_data: true,
            resource_type: "xhr".to_string(),
        }];
        let hints = ScriptHints {
            paths: vec!["/api/v1/users".to_string()],
            uses_async_fetch: true,
        };

        let out = normalize(
            EndpointSources {
                forms: &forms,
                links: &links,
                network: &network,
                hints: &hints,
                responses: &[],
            },
            "http://localhost/",
            50,
        );

        let urls: Vec<&str> = out.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "http://localhost/search",
                "http://localhost/search?q=shoes&page=2",
                "http://localhost/about",
                "http://localhost/api/cart",
                "http://localhost/api/v1/users",
            ]
        );
        assert_eq!(out[0].params[0].param_type, "search");
        assert!(out[3].has_post_data);
        assert_eq!(out[4].note.as_deref(), Some(INLINE_HINT_NOTE));
        assert!(out[4].params.is_empty());
    }

    #[test]
    fn test_status_prefix_annotation() {
        let mut set = EndpointSet::new();
        set.insert(endpoint("GET", "http://localhost/api/items", &[], false));
        set.insert(endpoint("GET", "http://localhost/other", &[], false));
        set.annotate_status(&[
            ResponseObservation {
                url: "http://localhost/api/items?page=1".to_string(),
                status: 200,
            },
            ResponseObservation {
                url: "http://localhost/api/items?page=2".to_string(),
                status: 500,
            },
        ]);
        let out = set.into_truncated(50);
        assert_eq!(out[0].status, Some(500));
        assert_eq!(out[1].status, None);
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("http://localhost/a/b", "c?x=1"),
            "http://localhost/a/c?x=1"
        );
        assert_eq!(resolve_url("http://localhost/a", ""), "http://localhost/a");
        assert_eq!(
            resolve_url("http://localhost/", "https://other.test/z"),
            "https://other.test/z"
        );
        assert_eq!(resolve_url("not-a-base", "rel/path"), "rel/path");
    }
}
