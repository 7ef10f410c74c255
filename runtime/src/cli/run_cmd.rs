//! `fuzzscout run`: the full staged pipeline against one target.

use crate::cli::output::{self, Styled};
use crate::cli::{DiscoverArgs, GateArgs, Interrupted};
use crate::config;
use crate::discovery::SessionTimings;
use crate::pipeline::{Orchestrator, PipelineState, StageStatus};
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use crate::signals;
use anyhow::{bail, Result};
use fuzzscout::validate_target;
use std::path::Path;

pub async fn run(args: &DiscoverArgs, gate: GateArgs, config_path: Option<&Path>) -> Result<()> {
    let config = config::resolve_config(config_path)?;
    let request = args.to_request();
    validate_target(&request.url, request.allow_non_local)?;

    let gate = gate.gate();
    if !gate.permits_execution() {
        tracing::info!("dry run: generated commands will not be executed");
    }

    let renderer = ChromiumRenderer::new(request.headless).await?;
    let orchestrator = Orchestrator::new(config, signals::cancel_on_signal());
    let result = orchestrator
        .run(&renderer, &request, gate, &SessionTimings::default())
        .await;
    if let Err(e) = renderer.shutdown().await {
        tracing::warn!("browser shutdown failed: {e:#}");
    }
    let run = result?;
    let outcome = &run.outcome;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "report": run.report,
            "pipeline": outcome,
        }));
    } else if !output::is_quiet() {
        let s = Styled::new();
        super::discover_cmd::print_report(&run.report);
        println!();
        println!("  Run {}", s.bold(&outcome.run_id));
        for stage in &outcome.stages {
            let sym = match stage.status {
                StageStatus::Ok => s.ok_sym(),
                StageStatus::Fallback => s.warn_sym(),
                StageStatus::Failed => s.err_sym(),
            };
            let detail = stage.detail.as_deref().unwrap_or("");
            println!(
                "  {sym} {:<18} {:>6} ms  {detail}",
                stage.stage.as_str(),
                stage.duration_ms
            );
        }
        if let Some(exec) = &outcome.execution {
            println!(
                "  Execution ({}) output in {}",
                exec.mode,
                exec.output_dir.display()
            );
        }
    }

    match outcome.state {
        PipelineState::Done => Ok(()),
        PipelineState::Interrupted(_) => Err(Interrupted.into()),
        PipelineState::Failed(stage) => match &outcome.error {
            Some(err) => bail!("pipeline failed at {stage}: {err}"),
            None => bail!("pipeline failed at {stage}"),
        },
        PipelineState::Running(stage) => bail!("pipeline stopped while running {stage}"),
    }
}
