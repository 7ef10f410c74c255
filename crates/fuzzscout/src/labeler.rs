//! Heuristic parameter type labeler.
//!
//! A built-in stand-in for the statistical classifier stage. It reads a
//! discovery artifact and writes the classified artifact: the same schema
//! with each parameter's `type` replaced by a predicted data type and a
//! `confidence` annotation.

use crate::error::ScoutResult;
use crate::report::{read_report, write_json_artifact};
use crate::types::{DiscoveryReport, Parameter};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Confidence when the control type or option list decides the label.
const CONTROL_EVIDENCE: f64 = 1.0;

/// Confidence when only the parameter name decides the label.
const NAME_EVIDENCE: f64 = 0.6;

/// Confidence for the fallback label.
const NO_EVIDENCE: f64 = 0.3;

struct NamePatterns {
    int: Regex,
    boolean: Regex,
    email: Regex,
    date: Regex,
}

fn patterns() -> &'static NamePatterns {
    static PATTERNS: OnceLock<NamePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| NamePatterns {
        int: Regex::new(r"(?i)(^id$|id$|_id$|count|num|size|page|limit)").expect("int regex is valid"),
        boolean: Regex::new(r"(?i)(^(is|has|enable|flag)|_flag$)").expect("bool regex is valid"),
        email: Regex::new(r"(?i)e-?mail").expect("email regex is valid"),
        date: Regex::new(r"(?i)(date|dob|birthday)").expect("date regex is valid"),
    })
}

/// Predict a data type for one parameter, with a confidence in `[0, 1]`.
pub fn label(param: &Parameter) -> (String, f64) {
    if param.options.as_ref().is_some_and(|o| !o.is_empty()) {
        return ("enum".to_string(), CONTROL_EVIDENCE);
    }

    let control = param.param_type.to_ascii_lowercase();
    match control.as_str() {
        "email" => return ("email".to_string(), CONTROL_EVIDENCE),
        "number" | "range" => return ("int".to_string(), CONTROL_EVIDENCE),
        "checkbox" => return ("bool".to_string(), CONTROL_EVIDENCE),
        "date" | "datetime-local" | "month" | "week" => {
            return ("date".to_string(), CONTROL_EVIDENCE)
        }
        "hidden" | "password" | "file" => return (control.clone(), CONTROL_EVIDENCE),
        _ => {}
    }

    let name = param.name.as_deref().unwrap_or("");
    let p = patterns();
    if !name.is_empty() {
        if p.email.is_match(name) {
            return ("email".to_string(), NAME_EVIDENCE);
        }
        if p.boolean.is_match(name) {
            return ("bool".to_string(), NAME_EVIDENCE);
        }
        if p.date.is_match(name) {
            return ("date".to_string(), NAME_EVIDENCE);
        }
        if p.int.is_match(name) {
            return ("int".to_string(), NAME_EVIDENCE);
        }
    }

    ("string".to_string(), NO_EVIDENCE)
}

fn label_in_place(param: &mut Parameter) {
    let (predicted, confidence) = label(param);
    param.param_type = predicted;
    param.confidence = Some(confidence);
}

/// Label every form and endpoint parameter of a report.
pub fn classify_report(mut report: DiscoveryReport) -> DiscoveryReport {
    for form in &mut report.forms {
        form.params.iter_mut().for_each(label_in_place);
    }
    for endpoint in &mut report.endpoints {
        endpoint.params.iter_mut().for_each(label_in_place);
    }
    report
}

/// Batch entry point: read a discovery artifact, write the classified one.
pub fn classify_file(input: &Path, output: &Path) -> ScoutResult<usize> {
    let report = classify_report(read_report(input)?);
    let labelled = report.forms.iter().map(|f| f.params.len()).sum::<usize>()
        + report.endpoints.iter().map(|e| e.params.len()).sum::<usize>();
    write_json_artifact(output, &report)?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        labelled,
        "classified parameters"
    );
    Ok(labelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiscoveryCounts, Endpoint, Form, NavigationResult};

    fn param(name: &str, control: &str) -> Parameter {
        Parameter {
            name: Some(name.to_string()),
            param_type: control.to_string(),
            required: false,
            options: None,
            confidence: None,
        }
    }

    #[test]
    fn test_control_evidence() {
        assert_eq!(label(&param("contact", "email")), ("email".into(), 1.0));
        assert_eq!(label(&param("qty", "number")), ("int".into(), 1.0));
        assert_eq!(label(&param("remember", "checkbox")), ("bool".into(), 1.0));
        assert_eq!(label(&param("csrf", "hidden")), ("hidden".into(), 1.0));

        let mut select = param("sort", "select");
        select.options = Some(vec!["asc".into(), "desc".into()]);
        assert_eq!(label(&select), ("enum".into(), 1.0));
    }

    #[test]
    fn test_name_evidence() {
        assert_eq!(label(&param("user_id", "text")).0, "int");
        assert_eq!(label(&param("page", "string")).0, "int");
        assert_eq!(label(&param("is_admin", "text")).0, "bool");
        assert_eq!(label(&param("userEmail", "text")).0, "email");
        assert_eq!(label(&param("dob", "text")).0, "date");
        assert_eq!(label(&param("q", "search")), ("string".into(), 0.3));
    }

    #[test]
    fn test_classify_file_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.json");
        let output = dir.path().join("out.json");

        let report = DiscoveryReport {
            url: "http://localhost/".into(),
            navigated_to: "http://localhost/".into(),
            navigation: NavigationResult {
                ok: true,
                method: "load".into(),
                last_error: None,
                content: None,
            },
            counts: DiscoveryCounts {
                forms: 1,
                links: 0,
                network_requests: 0,
            },
            forms: vec![Form {
                action: "http://localhost/login".into(),
                method: "POST".into(),
                params: vec![param("user", "text"), param("pass", "password")],
            }],
            endpoints: vec![Endpoint {
                method: "GET".into(),
                url: "http://localhost/items?id=3".into(),
                params: vec![param("id", "string")],
                has_post_data: false,
                status: None,
                note: None,
            }],
        };
        write_json_artifact(&input, &report).unwrap();

        let labelled = classify_file(&input, &output).unwrap();
        assert_eq!(labelled, 3);

        let classified = read_report(&output).unwrap();
        assert_eq!(classified.endpoints[0].params[0].param_type, "int");
        assert_eq!(classified.endpoints[0].params[0].confidence, Some(0.6));
        assert_eq!(classified.forms[0].params[1].param_type, "password");
        assert_eq!(classified.counts, report.counts);
    }
}
