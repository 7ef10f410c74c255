//! Pipeline orchestrator: discovery, classification, payload generation, execution.
//!
//! Stages run strictly in sequence and hand off through files in a directory
//! private to the run, so concurrent runs never see each other's artifacts. Each external tool runs as a parameterized process under the
//! stage timeout. Failure handling differs per stage:
//!
//! - classification failure copies the discovery artifact forward;
//! - generation failure ends the run with an error, discovery is still returned;
//! - execution failure is recorded and the discovery result is still returned.

use crate::config::{PipelineConfig, StageCommand};
use crate::discovery::{self, DiscoveryError, SessionTimings};
use crate::harness::{self, ExecutionSummary, SafetyGate};
use crate::ledger::Ledger;
use crate::renderer::Renderer;
use crate::signals;
use fuzzscout::report::{read_report, write_json_artifact};
use fuzzscout::{DiscoveryReport, DiscoveryRequest};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{info, warn};

/// Bytes of a failing tool's stderr kept in the error.
const STDERR_TAIL: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discover,
    ClassifyTypes,
    GeneratePayloads,
    Execute,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discover => "discover",
            Stage::ClassifyTypes => "classify_types",
            Stage::GeneratePayloads => "generate_payloads",
            Stage::Execute => "execute",
        }
    }

    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Discover => Some(Stage::ClassifyTypes),
            Stage::ClassifyTypes => Some(Stage::GeneratePayloads),
            Stage::GeneratePayloads => Some(Stage::Execute),
            Stage::Execute => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the run is, or how it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "stage", rename_all = "snake_case")]
pub enum PipelineState {
    Running(Stage),
    Done,
    Failed(Stage),
    /// A shutdown signal stopped the run before or during this stage.
    Interrupted(Stage),
}

impl PipelineState {
    /// State after `stage` completes (possibly via fallback).
    fn advance(stage: Stage) -> Self {
        stage.next().map_or(PipelineState::Done, PipelineState::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ok,
    Fallback,
    Failed,
}

/// Outcome of one stage, as reported to callers and the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Stage-handoff artifact paths of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub discovery: PathBuf,
    pub classified: PathBuf,
    pub payloads: PathBuf,
}

/// Everything the pipeline adds on top of the discovery result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub run_id: String,
    pub state: PipelineState,
    pub stages: Vec<StageRecord>,
    /// Set when the run aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub artifacts: ArtifactPaths,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionSummary>,
}

/// A completed pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub report: DiscoveryReport,
    pub outcome: PipelineOutcome,
}

/// Why an external stage tool did not produce its artifact.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code:?}: {stderr_tail}")]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("{program} produced no usable artifact at {path:?}: {reason}")]
    MissingOutput {
        program: String,
        path: PathBuf,
        reason: String,
    },

    #[error("stage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Run one external stage tool. Returns once `output` exists.
pub async fn run_stage(
    command: &StageCommand,
    input: &Path,
    output: &Path,
    templates: &Path,
    timeout: Duration,
) -> Result<(), StageError> {
    let args = command.render_args(input, output, templates);
    let capture = !command.writes_output();

    if output.exists() {
        std::fs::remove_file(output)?;
    }

    let child = Command::new(&command.program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(if capture { Stdio::piped() } else { Stdio::null() })
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| StageError::Spawn {
            program: command.program.clone(),
            source,
        })?;

    let finished = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(StageError::Timeout {
                program: command.program.clone(),
                secs: timeout.as_secs(),
            })
        }
    };

    if !finished.status.success() {
        let stderr = String::from_utf8_lossy(&finished.stderr);
        let start = stderr.len().saturating_sub(STDERR_TAIL);
        let start = (start..stderr.len())
            .find(|i| stderr.is_char_boundary(*i))
            .unwrap_or(stderr.len());
        return Err(StageError::NonZeroExit {
            program: command.program.clone(),
            code: finished.status.code(),
            stderr_tail: stderr[start..].trim().to_string(),
        });
    }

    if capture {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output, &finished.stdout)?;
    }

    if !output.exists() {
        return Err(StageError::MissingOutput {
            program: command.program.clone(),
            path: output.to_path_buf(),
            reason: "file not created".to_string(),
        });
    }
    Ok(())
}

/// Sequences the stages of one or more runs.
pub struct Orchestrator {
    config: PipelineConfig,
    cancel: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, cancel: watch::Receiver<bool>) -> Self {
        Self { config, cancel }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Discover `request`, then run the remaining stages on the result.
    ///
    /// Only the pre-flight rejections, a browser that cannot open a session
    /// and a shutdown signal during discovery surface as `Err`; stage
    /// failures and later interruptions live in the outcome.
    pub async fn run(
        &self,
        renderer: &dyn Renderer,
        request: &DiscoveryRequest,
        gate: SafetyGate,
        timings: &SessionTimings,
    ) -> Result<PipelineRun, DiscoveryError> {
        let started = Instant::now();
        let report = self
            .until_cancelled(discovery::discover(renderer, request, timings))
            .await
            .ok_or(DiscoveryError::Interrupted)??;
        let outcome = self.continue_from(&report, gate, elapsed_ms(started)).await;
        Ok(PipelineRun { report, outcome })
    }

    /// Write the discovery artifact and run every later stage.
    pub async fn continue_from(
        &self,
        report: &DiscoveryReport,
        gate: SafetyGate,
        discover_ms: u64,
    ) -> PipelineOutcome {
        let cfg = &self.config;
        let mut run = RunTracker::new(&cfg.work_dir);
        let dir = cfg.run_dir(&run.run_id);
        let artifacts = ArtifactPaths {
            discovery: dir.join(&cfg.artifacts.discovery),
            classified: dir.join(&cfg.artifacts.classified),
            payloads: dir.join(&cfg.artifacts.payloads),
            dir,
        };

        // Discover
        if let Err(e) = write_json_artifact(&artifacts.discovery, report) {
            run.record(Stage::Discover, StageStatus::Failed, discover_ms, Some(e.to_string()));
            return run.abort(Stage::Discover, e.to_string(), artifacts);
        }
        run.record(Stage::Discover, StageStatus::Ok, discover_ms, None);

        let timeout = Duration::from_secs(cfg.stage_timeout_secs.max(1));

        // ClassifyTypes
        if self.is_cancelled() {
            return run.interrupt(Stage::ClassifyTypes, artifacts);
        }
        let started = Instant::now();
        let Some(classified) = self
            .until_cancelled(run_stage(
                &cfg.classifier,
                &artifacts.discovery,
                &artifacts.classified,
                &cfg.template_library,
                timeout,
            ))
            .await
        else {
            run.record(Stage::ClassifyTypes, StageStatus::Failed, elapsed_ms(started), Some("interrupted".into()));
            return run.interrupt(Stage::ClassifyTypes, artifacts);
        };
        let classified = classified.and_then(|()| {
            read_report(&artifacts.classified)
                .map(|_| ())
                .map_err(|e| StageError::MissingOutput {
                    program: cfg.classifier.program.clone(),
                    path: artifacts.classified.clone(),
                    reason: e.to_string(),
                })
        });
        match classified {
            Ok(()) => run.record(Stage::ClassifyTypes, StageStatus::Ok, elapsed_ms(started), None),
            Err(e) => {
                warn!("classifier failed, passing discovery artifact through: {e}");
                if let Err(copy) = std::fs::copy(&artifacts.discovery, &artifacts.classified) {
                    let msg = format!("classifier failed ({e}) and fallback copy failed: {copy}");
                    run.record(Stage::ClassifyTypes, StageStatus::Failed, elapsed_ms(started), Some(msg.clone()));
                    return run.abort(Stage::ClassifyTypes, msg, artifacts);
                }
                run.record(
                    Stage::ClassifyTypes,
                    StageStatus::Fallback,
                    elapsed_ms(started),
                    Some(e.to_string()),
                );
            }
        }

        // GeneratePayloads
        if self.is_cancelled() {
            return run.interrupt(Stage::GeneratePayloads, artifacts);
        }
        let started = Instant::now();
        let Some(generated) = self
            .until_cancelled(run_stage(
                &cfg.generator,
                &artifacts.classified,
                &artifacts.payloads,
                &cfg.template_library,
                timeout,
            ))
            .await
        else {
            run.record(Stage::GeneratePayloads, StageStatus::Failed, elapsed_ms(started), Some("interrupted".into()));
            return run.interrupt(Stage::GeneratePayloads, artifacts);
        };
        if let Err(e) = generated {
            warn!("payload generation failed, aborting pipeline: {e}");
            run.record(
                Stage::GeneratePayloads,
                StageStatus::Failed,
                elapsed_ms(started),
                Some(e.to_string()),
            );
            return run.abort(Stage::GeneratePayloads, e.to_string(), artifacts);
        }
        run.record(Stage::GeneratePayloads, StageStatus::Ok, elapsed_ms(started), None);

        // Execute. The harness watches the flag itself once tasks are live.
        if self.is_cancelled() {
            return run.interrupt(Stage::Execute, artifacts);
        }
        let started = Instant::now();
        let execution = harness::run(
            &artifacts.payloads,
            gate,
            &cfg.harness,
            &cfg.output_root(),
            self.cancel.clone(),
        )
        .await;
        match execution {
            Ok(summary) => {
                let detail = format!(
                    "{} tasks, mode {}{}",
                    summary.tasks.len(),
                    summary.mode,
                    if summary.interrupted { ", interrupted" } else { "" }
                );
                run.record(Stage::Execute, StageStatus::Ok, elapsed_ms(started), Some(detail));
                if summary.interrupted {
                    run.state = PipelineState::Interrupted(Stage::Execute);
                }
                run.finish(artifacts, Some(summary))
            }
            Err(e) => {
                warn!("execution failed, returning discovery result: {e:#}");
                run.record(
                    Stage::Execute,
                    StageStatus::Failed,
                    elapsed_ms(started),
                    Some(format!("{e:#}")),
                );
                run.state = PipelineState::Failed(Stage::Execute);
                run.into_outcome(artifacts, None, None)
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Drive `work` unless the cancel flag flips first. A flag that is already
    /// set wins before `work` is polled, so nothing gets spawned.
    async fn until_cancelled<F: Future>(&self, work: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = signals::cancelled(self.cancel.clone()) => None,
            out = work => Some(out),
        }
    }
}

/// Per-run bookkeeping: state machine, stage records and ledger.
struct RunTracker {
    run_id: String,
    state: PipelineState,
    stages: Vec<StageRecord>,
    ledger: Option<Ledger>,
}

impl RunTracker {
    fn new(work_dir: &Path) -> Self {
        let ledger = match Ledger::in_work_dir(work_dir) {
            Ok(l) => Some(l),
            Err(e) => {
                warn!("pipeline ledger unavailable: {e:#}");
                None
            }
        };
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(run_id, "pipeline run started");
        Self {
            run_id,
            state: PipelineState::Running(Stage::Discover),
            stages: Vec::new(),
            ledger,
        }
    }

    fn record(&mut self, stage: Stage, status: StageStatus, duration_ms: u64, detail: Option<String>) {
        info!(run_id = %self.run_id, %stage, ?status, duration_ms, "stage finished");
        if let Some(ledger) = self.ledger.as_mut() {
            let status_name = match status {
                StageStatus::Ok => "ok",
                StageStatus::Fallback => "fallback",
                StageStatus::Failed => "failed",
            };
            if let Err(e) = ledger.record(&self.run_id, stage.as_str(), status_name, duration_ms, detail.as_deref()) {
                warn!("ledger write failed: {e:#}");
            }
        }
        if status != StageStatus::Failed {
            self.state = PipelineState::advance(stage);
        }
        self.stages.push(StageRecord {
            stage,
            status,
            duration_ms,
            detail,
        });
    }

    fn abort(mut self, stage: Stage, error: String, artifacts: ArtifactPaths) -> PipelineOutcome {
        self.state = PipelineState::Failed(stage);
        self.into_outcome(artifacts, Some(error), None)
    }

    fn interrupt(mut self, stage: Stage, artifacts: ArtifactPaths) -> PipelineOutcome {
        warn!(run_id = %self.run_id, %stage, "pipeline interrupted");
        self.state = PipelineState::Interrupted(stage);
        self.into_outcome(artifacts, Some(format!("interrupted at {stage}")), None)
    }

    fn finish(self, artifacts: ArtifactPaths, execution: Option<ExecutionSummary>) -> PipelineOutcome {
        self.into_outcome(artifacts, None, execution)
    }

    fn into_outcome(
        self,
        artifacts: ArtifactPaths,
        error: Option<String>,
        execution: Option<ExecutionSummary>,
    ) -> PipelineOutcome {
        PipelineOutcome {
            run_id: self.run_id,
            state: self.state,
            stages: self.stages,
            error,
            artifacts,
            execution,
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
