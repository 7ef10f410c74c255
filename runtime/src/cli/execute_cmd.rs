//! `fuzzscout execute`: run a command list through the gated harness.

use crate::cli::output;
use crate::cli::{GateArgs, Interrupted};
use crate::config;
use crate::harness;
use crate::signals;
use anyhow::Result;
use std::path::{Path, PathBuf};

pub struct ExecuteOptions {
    pub command_list: PathBuf,
    pub gate: GateArgs,
    pub output_root: Option<PathBuf>,
    pub tail_preview: bool,
    pub task_timeout: Option<u64>,
}

pub async fn run(opts: ExecuteOptions, config_path: Option<&Path>) -> Result<()> {
    let config = config::resolve_config(config_path)?;
    let mut harness_cfg = config.harness.clone();
    if opts.tail_preview {
        harness_cfg.tail_preview = true;
    }
    if opts.task_timeout.is_some() {
        harness_cfg.task_timeout_secs = opts.task_timeout;
    }
    if output::is_quiet() || output::is_json() {
        harness_cfg.show_progress = false;
    }
    let output_root = opts.output_root.unwrap_or_else(|| config.output_root());

    let gate = opts.gate.gate();
    if !gate.permits_execution() {
        tracing::info!("dry run: pass --no-dry-run and --allow-execution to execute");
    }

    let summary = harness::run(
        &opts.command_list,
        gate,
        &harness_cfg,
        &output_root,
        signals::cancel_on_signal(),
    )
    .await?;

    if output::is_json() {
        output::print_json(&summary);
    } else if !output::is_quiet() {
        print!("{}", harness::render_summary(&summary, harness_cfg.tail_lines));
    }

    if summary.interrupted {
        return Err(Interrupted.into());
    }
    Ok(())
}
