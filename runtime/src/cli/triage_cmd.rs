//! `fuzzscout triage`: flag interesting responses in an output directory.

use crate::cli::output::{self, Styled};
use crate::config;
use anyhow::{bail, Result};
use fuzzscout::triage;
use std::path::{Path, PathBuf};

pub async fn run(dir: Option<PathBuf>, config_path: Option<&Path>) -> Result<()> {
    let dir = match dir {
        Some(d) => d,
        None => {
            let root = config::resolve_config(config_path)?.output_root();
            match triage::latest_responses_dir(&root)? {
                Some(d) => d,
                None => bail!("no responses_* directory under {}", root.display()),
            }
        }
    };

    let report = triage::triage_dir(&dir)?;
    if output::is_json() {
        output::print_json(&report);
        return Ok(());
    }
    if output::is_quiet() {
        return Ok(());
    }

    let s = Styled::new();
    println!(
        "  Triaged {} responses in {}: {} flagged",
        report.scanned,
        dir.display(),
        report.flagged
    );
    for entry in report.entries.iter().filter(|e| e.flagged) {
        let status = entry
            .status
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} task {} [{status}] {}",
            s.warn_sym(),
            entry.task,
            entry.url.as_deref().unwrap_or("")
        );
        if !entry.matched_keywords.is_empty() {
            println!("      keywords: {}", entry.matched_keywords.join(", "));
        }
        if entry.payload_reflected {
            println!("      payload reflected");
        }
    }
    println!("  Written {}", dir.join(triage::TRIAGE_FILE).display());
    Ok(())
}
