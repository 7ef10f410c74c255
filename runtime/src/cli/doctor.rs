//! Environment readiness check.

use crate::cli::output::{self, Styled};
use crate::config::{self, StageCommand};
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DoctorReport {
    os: &'static str,
    arch: &'static str,
    chromium: Option<PathBuf>,
    classifier: Option<PathBuf>,
    generator: Option<PathBuf>,
    work_dir: PathBuf,
    work_dir_writable: bool,
    ready: bool,
}

/// Check Chromium, the stage tools and the work directory.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = config::resolve_config(config_path)?;

    let chromium = find_chromium();
    let classifier = resolve_program(&config.classifier);
    let generator = resolve_program(&config.generator);
    let work_dir_writable = probe_writable(&config.work_dir);
    // The classifier has a fallback; the others do not.
    let ready = chromium.is_some() && generator.is_some() && work_dir_writable;

    let report = DoctorReport {
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        chromium,
        classifier,
        generator,
        work_dir: config.work_dir.clone(),
        work_dir_writable,
        ready,
    };

    if output::is_json() {
        output::print_json(&report);
        return Ok(());
    }

    let s = Styled::new();
    println!("Fuzzscout Doctor");
    println!("================");
    println!();
    println!("OS:   {}", report.os);
    println!("Arch: {}", report.arch);
    println!();

    match &report.chromium {
        Some(path) => println!("{} Chromium found: {}", s.ok_sym(), path.display()),
        None => println!(
            "{} Chromium NOT found. Install Chrome or set FUZZSCOUT_CHROMIUM_PATH.",
            s.err_sym()
        ),
    }
    match &report.classifier {
        Some(path) => println!("{} Classifier: {}", s.ok_sym(), path.display()),
        None => println!(
            "{} Classifier `{}` not found; runs will fall back to untyped templates",
            s.warn_sym(),
            config.classifier.program
        ),
    }
    match &report.generator {
        Some(path) => println!("{} Payload generator: {}", s.ok_sym(), path.display()),
        None => println!(
            "{} Payload generator `{}` not found",
            s.err_sym(),
            config.generator.program
        ),
    }
    if report.work_dir_writable {
        println!(
            "{} Work directory {} is writable",
            s.ok_sym(),
            report.work_dir.display()
        );
    } else {
        println!(
            "{} Work directory {} is not writable",
            s.err_sym(),
            report.work_dir.display()
        );
    }

    println!();
    if report.ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}

/// Locate a stage program by explicit path or on `PATH`.
fn resolve_program(cmd: &StageCommand) -> Option<PathBuf> {
    let path = Path::new(&cmd.program);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }
    which::which(&cmd.program).ok()
}

fn probe_writable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".fuzzscout-doctor");
    let ok = std::fs::write(&probe, b"ok").is_ok();
    let _ = std::fs::remove_file(&probe);
    ok
}
