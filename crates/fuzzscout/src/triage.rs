//! Local triage of execution output.
//!
//! Walks a `responses_*` directory produced by the execution harness and
//! flags tasks whose captured response looks interesting: a known error or
//! injection marker in the body, or the payload reflected back verbatim.

use crate::error::{ScoutError, ScoutResult};
use crate::report::write_json_artifact;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Prefix of execution output directories.
pub const RESPONSES_DIR_PREFIX: &str = "responses_";

/// File written into the scanned directory.
pub const TRIAGE_FILE: &str = "triage.json";

/// Markers that make a response worth a closer look. Matched case-insensitively.
pub const TRIAGE_KEYWORDS: &[&str] = &[
    "500 Internal Server Error",
    "SQL syntax",
    "ORA-",
    "exception",
    "root:x:0",
    "<script>",
    "onerror=",
    "could not resolve host",
];

/// Triage verdict for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageEntry {
    pub task: usize,
    pub output_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    pub flagged: bool,
    /// Keywords found, in [`TRIAGE_KEYWORDS`] order.
    pub matched_keywords: Vec<String>,
    pub payload_reflected: bool,
}

/// The `triage.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageReport {
    pub directory: String,
    pub scanned: usize,
    pub flagged: usize,
    pub entries: Vec<TriageEntry>,
}

struct Patterns {
    status: Regex,
    payload: Regex,
    url: Regex,
    meta_name: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        status: Regex::new(r"HTTP/\d(?:\.\d)?\s+(\d{3})").expect("status regex is valid"),
        payload: Regex::new(r#"-d\s+['"](.*?)['"]"#).expect("payload regex is valid"),
        url: Regex::new(r#"https?://[^\s"']+"#).expect("url regex is valid"),
        meta_name: Regex::new(r"^response(\d+)\.meta$").expect("meta name regex is valid"),
    })
}

/// HTTP status from the first line of a captured response.
pub fn status_from_output(output: &str) -> Option<u16> {
    let first = output.lines().next()?.trim();
    patterns()
        .status
        .captures(first)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Payload (`-d '…'`) and target URL from a command or metadata text.
pub fn payload_and_url(text: &str) -> (Option<String>, Option<String>) {
    let p = patterns();
    let payload = p
        .payload
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());
    let url = p.url.find(text).map(|m| m.as_str().to_string());
    (payload, url)
}

/// Keywords present in `text`, ignoring case.
pub fn matched_keywords(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TRIAGE_KEYWORDS
        .iter()
        .filter(|k| lower.contains(&k.to_lowercase()))
        .map(|k| k.to_string())
        .collect()
}

/// Judge one task from its metadata, stdout and stderr text.
pub fn triage_task(task: usize, output_file: &str, meta: &str, output: &str, errors: &str) -> TriageEntry {
    let (payload, url) = payload_and_url(meta);
    let mut keywords = matched_keywords(output);
    for k in matched_keywords(errors) {
        if !keywords.contains(&k) {
            keywords.push(k);
        }
    }
    let reflected = payload.as_deref().is_some_and(|p| output.contains(p));

    TriageEntry {
        task,
        output_file: output_file.to_string(),
        status: status_from_output(output),
        url,
        payload,
        flagged: !keywords.is_empty() || reflected,
        matched_keywords: keywords,
        payload_reflected: reflected,
    }
}

/// Most recently modified `responses_*` directory under `root`.
pub fn latest_responses_dir(root: &Path) -> ScoutResult<Option<PathBuf>> {
    if !root.is_dir() {
        return Ok(None);
    }
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(RESPONSES_DIR_PREFIX) || !entry.path().is_dir() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, entry.path()));
        }
    }
    Ok(newest.map(|(_, p)| p))
}

fn read_lossy(path: &Path) -> String {
    std::fs::read(path)
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default()
}

/// Scan `dir`, write `triage.json` into it, and return the report.
pub fn triage_dir(dir: &Path) -> ScoutResult<TriageReport> {
    if !dir.is_dir() {
        return Err(ScoutError::InvalidInput(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut tasks: Vec<usize> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name();
        if let Some(n) = patterns()
            .meta_name
            .captures(&name.to_string_lossy())
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
        {
            tasks.push(n);
        }
    }
    tasks.sort_unstable();

    let mut entries = Vec::new();
    for n in tasks {
        let output_name = format!("response{n}.html");
        let output_path = dir.join(&output_name);
        if !output_path.exists() {
            continue;
        }
        let entry = triage_task(
            n,
            &output_name,
            &read_lossy(&dir.join(format!("response{n}.meta"))),
            &read_lossy(&output_path),
            &read_lossy(&dir.join(format!("response{n}.err"))),
        );
        if entry.flagged {
            tracing::info!(task = n, status = ?entry.status, keywords = ?entry.matched_keywords, "flagged response");
        }
        entries.push(entry);
    }

    let report = TriageReport {
        directory: dir.display().to_string(),
        scanned: entries.len(),
        flagged: entries.iter().filter(|e| e.flagged).count(),
        entries,
    };
    write_json_artifact(&dir.join(TRIAGE_FILE), &report)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_first_line_only() {
        assert_eq!(status_from_output("HTTP/1.1 500 Internal Server Error\r\n"), Some(500));
        assert_eq!(status_from_output("HTTP/2 302\nlocation: /"), Some(302));
        assert_eq!(status_from_output("<html>\nHTTP/1.1 200 OK"), None);
        assert_eq!(status_from_output(""), None);
    }

    #[test]
    fn test_payload_and_url() {
        let meta = "command: curl -sS -i -X POST -d 'q=<script>alert(1)</script>' http://localhost:8080/search\n";
        let (payload, url) = payload_and_url(meta);
        assert_eq!(payload.as_deref(), Some("q=<script>alert(1)</script>"));
        assert_eq!(url.as_deref(), Some("http://localhost:8080/search"));

        assert_eq!(payload_and_url("command: echo hi"), (None, None));
    }

    #[test]
    fn test_flags_keywords_and_reflection() {
        let meta = "command: curl -d 'name=zz9' http://localhost/x";
        let clean = triage_task(1, "response1.html", meta, "HTTP/1.1 200 OK\n\nhello", "");
        assert!(!clean.flagged);

        let reflected = triage_task(2, "response2.html", meta, "HTTP/1.1 200 OK\n\nname=zz9", "");
        assert!(reflected.flagged);
        assert!(reflected.payload_reflected);

        let error = triage_task(3, "response3.html", meta, "You have an error in your sql SYNTAX", "");
        assert_eq!(error.matched_keywords, vec!["SQL syntax".to_string()]);

        let dns = triage_task(4, "response4.html", meta, "", "curl: (6) Could not resolve host: nope");
        assert!(dns.flagged);
    }

    #[test]
    fn test_triage_dir_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        std::fs::write(d.join("response1.meta"), "command: curl http://localhost/a\ntask: 1\n").unwrap();
        std::fs::write(d.join("response1.html"), "HTTP/1.1 200 OK\n\nfine").unwrap();
        std::fs::write(d.join("response2.meta"), "command: curl http://localhost/b\ntask: 2\n").unwrap();
        std::fs::write(d.join("response2.html"), "HTTP/1.1 500 Internal Server Error\n").unwrap();
        std::fs::write(d.join("response10.meta"), "command: curl http://localhost/c\n").unwrap();

        let report = triage_dir(d).unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.flagged, 1);
        assert_eq!(report.entries[1].status, Some(500));
        assert!(d.join(TRIAGE_FILE).exists());
    }

    #[test]
    fn test_latest_responses_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(latest_responses_dir(dir.path()).unwrap(), None);

        std::fs::create_dir(dir.path().join("responses_20260101_000000")).unwrap();
        std::fs::create_dir(dir.path().join("other")).unwrap();
        let found = latest_responses_dir(dir.path()).unwrap().unwrap();
        assert!(found.ends_with("responses_20260101_000000"));
    }
}
