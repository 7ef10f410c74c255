//! `fuzzscout discover`: one discovery session, report to stdout or a file.

use crate::cli::output::{self, Styled};
use crate::cli::DiscoverArgs;
use crate::discovery::{self, SessionTimings};
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use anyhow::Result;
use fuzzscout::{validate_target, write_json_artifact, DiscoveryReport};
use std::path::Path;

pub async fn run(args: &DiscoverArgs, out: Option<&Path>) -> Result<()> {
    let request = args.to_request();
    // Reject before a browser is ever launched.
    validate_target(&request.url, request.allow_non_local)?;

    let renderer = ChromiumRenderer::new(request.headless).await?;
    let result = discovery::discover(&renderer, &request, &SessionTimings::default()).await;
    if let Err(e) = renderer.shutdown().await {
        tracing::warn!("browser shutdown failed: {e:#}");
    }
    let report = result?;

    if let Some(path) = out {
        write_json_artifact(path, &report)?;
    }

    if output::is_json() {
        output::print_json(&report);
    } else if !output::is_quiet() {
        print_report(&report);
        if let Some(path) = out {
            println!("  Report written to {}", path.display());
        }
    }
    Ok(())
}

pub(crate) fn print_report(report: &DiscoveryReport) {
    let s = Styled::new();
    let sym = if report.navigation.ok {
        s.ok_sym()
    } else {
        s.warn_sym()
    };
    println!(
        "  {sym} {} (navigated to {}, waited for {})",
        s.bold(&report.url),
        report.navigated_to,
        report.navigation.method
    );
    if let Some(err) = &report.navigation.last_error {
        println!("      navigation degraded: {err}");
    }
    println!(
        "      {} forms, {} links, {} network requests, {} endpoints",
        report.counts.forms,
        report.counts.links,
        report.counts.network_requests,
        report.endpoints.len()
    );
    for ep in &report.endpoints {
        let names: Vec<&str> = ep.params.iter().filter_map(|p| p.name.as_deref()).collect();
        let status = ep.status.map(|c| format!(" [{c}]")).unwrap_or_default();
        println!(
            "      {:<6} {}{status}  {}",
            ep.method,
            ep.url,
            names.join(", ")
        );
    }
}
