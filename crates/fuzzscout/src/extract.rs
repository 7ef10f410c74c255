//! Extracts forms, links, and inline-script hints from rendered page HTML.
//!
//! Form parsing walks every `<form>`, classifies each contained control by
//! effective type, and keeps forms that yield at least one parameter. Links
//! are collected verbatim; resolution happens in the normalizer. Script hints
//! are best-effort signals, never authoritative endpoints.
//!
//! Everything here is synchronous and owns its output, so callers can run it
//! between awaits without holding parsed DOM state across suspension points.

use crate::types::{Form, Parameter};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

/// Characters of inline script text scanned for hints.
pub const SCRIPT_SCAN_BUDGET: usize = 100_000;

/// Maximum number of path hints kept per page.
const MAX_HINTS: usize = 50;

/// Control types that only trigger submission and carry no data.
const ACTION_ONLY_TYPES: &[&str] = &["submit", "button", "reset", "image"];

/// Textual markers of asynchronous fetch idioms.
const FETCH_IDIOMS: &[&str] = &["fetch(", "XMLHttpRequest", "axios", "$.ajax", "$.get(", "$.post("];

/// Everything pulled out of one loaded page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageExtract {
    pub forms: Vec<Form>,
    /// Raw `href` values in document order.
    pub links: Vec<String>,
    pub hints: ScriptHints,
}

/// Best-effort signals from inline scripts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptHints {
    /// Path-like string literals containing `api`, deduplicated in order.
    pub paths: Vec<String>,
    /// Whether common async-fetch idioms appear in the scanned text.
    pub uses_async_fetch: bool,
}

struct Selectors {
    form: Selector,
    control: Selector,
    option: Selector,
    anchor: Selector,
    inline_script: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        form: Selector::parse("form").expect("form selector is valid"),
        control: Selector::parse("input, select, textarea").expect("control selector is valid"),
        option: Selector::parse("option").expect("option selector is valid"),
        anchor: Selector::parse("a[href]").expect("anchor selector is valid"),
        inline_script: Selector::parse("script:not([src])").expect("script selector is valid"),
    })
}

fn api_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"["'`]((?:https?://[^"'`\s<>]+)?/[^"'`\s<>]*(?i:api)[^"'`\s<>]*)["'`]"#)
            .expect("api path regex is valid")
    })
}

/// Extract forms, links, and hints from `html` loaded at `page_url`.
pub fn extract_page(html: &str, page_url: &str) -> PageExtract {
    let document = Html::parse_document(html);
    PageExtract {
        forms: extract_forms(&document, page_url),
        links: extract_links(&document),
        hints: extract_hints(&document),
    }
}

/// Parse every `<form>` into a [`Form`], dropping forms with no parameters.
pub fn extract_forms(document: &Html, page_url: &str) -> Vec<Form> {
    let sel = selectors();
    let mut forms = Vec::new();

    for form in document.select(&sel.form) {
        let action = crate::normalize::resolve_url(page_url, form.value().attr("action").unwrap_or(""));
        let method = form
            .value()
            .attr("method")
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("GET")
            .to_uppercase();

        let params: Vec<Parameter> = form
            .select(&sel.control)
            .filter_map(|control| parameter_from_control(&control, &sel.option))
            .collect();

        if params.is_empty() {
            continue;
        }
        forms.push(Form {
            action,
            method,
            params,
        });
    }

    forms
}

/// Classify one control; `None` for action-only or anonymous non-hidden controls.
fn parameter_from_control(control: &ElementRef<'_>, option_sel: &Selector) -> Option<Parameter> {
    let el = control.value();
    let tag = el.name().to_ascii_lowercase();
    let param_type = match tag.as_str() {
        "input" => el
            .attr("type")
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "text".to_string()),
        other => other.to_string(),
    };

    if ACTION_ONLY_TYPES.contains(&param_type.as_str()) {
        return None;
    }

    let name = el
        .attr("name")
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from);

    let options = if tag == "select" {
        Some(
            control
                .select(option_sel)
                .map(|opt| {
                    opt.value()
                        .attr("value")
                        .map(String::from)
                        .unwrap_or_else(|| element_text(&opt))
                })
                .collect(),
        )
    } else {
        None
    };

    let param = Parameter {
        name,
        param_type,
        required: el.attr("required").is_some(),
        options,
        confidence: None,
    };
    param.is_retained().then_some(param)
}

/// Collect every anchor `href`, unresolved.
pub fn extract_links(document: &Html) -> Vec<String> {
    document
        .select(&selectors().anchor)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .collect()
}

/// Scan inline scripts, bounded by [`SCRIPT_SCAN_BUDGET`].
pub fn extract_hints(document: &Html) -> ScriptHints {
    let mut text = String::new();
    for script in document.select(&selectors().inline_script) {
        let remaining = SCRIPT_SCAN_BUDGET.saturating_sub(text.len());
        if remaining == 0 {
            break;
        }
        let body: String = script.text().collect();
        text.push_str(truncate_at_char_boundary(&body, remaining));
        text.push('\n');
    }
    scan_script_text(&text)
}

/// Hint scan over already-collected script text.
pub fn scan_script_text(text: &str) -> ScriptHints {
    let text = truncate_at_char_boundary(text, SCRIPT_SCAN_BUDGET);
    let mut paths: Vec<String> = Vec::new();
    for caps in api_path_regex().captures_iter(text) {
        let path = caps.get(1).map_or("", |m| m.as_str());
        if !path.is_empty() && !paths.iter().any(|p| p == path) {
            paths.push(path.to_string());
            if paths.len() >= MAX_HINTS {
                break;
            }
        }
    }

    ScriptHints {
        paths,
        uses_async_fetch: FETCH_IDIOMS.iter().any(|idiom| text.contains(idiom)),
    }
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Visible text of an element, trimmed and whitespace-collapsed.
fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
