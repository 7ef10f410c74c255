//! Pipeline configuration loading and resolution.
//!
//! Resolution order: explicit path, `FUZZSCOUT_CONFIG`, `./.fuzzscout/pipeline.json`,
//! `~/.fuzzscout/pipeline.json`, then built-in defaults. The safety gate is
//! deliberately absent from every config surface.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An external stage tool invocation.
///
/// Arguments may contain `{input}`, `{output}` and `{templates}`; each is
/// substituted inside its own argument and never passes through a shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl StageCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Whether the tool writes its artifact itself (an `{output}` argument).
    pub fn writes_output(&self) -> bool {
        self.args.iter().any(|a| a.contains("{output}"))
    }

    /// Argument vector with placeholders substituted.
    pub fn render_args(&self, input: &Path, output: &Path, templates: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|a| {
                a.replace("{input}", &input.display().to_string())
                    .replace("{output}", &output.display().to_string())
                    .replace("{templates}", &templates.display().to_string())
            })
            .collect()
    }
}

/// Stage-handoff file names inside the work directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArtifactNames {
    pub discovery: String,
    pub classified: String,
    pub payloads: String,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            discovery: "param_templates.json".to_string(),
            classified: "param_templates_with_predicted_types.json".to_string(),
            payloads: "payloads.txt".to_string(),
        }
    }
}

/// Execution harness settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarnessConfig {
    /// Parent of the timestamped output directories. Defaults to the work dir.
    pub output_root: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub show_progress: bool,
    pub tail_preview: bool,
    pub tail_lines: usize,
    /// Per-task wall clock limit. Unset means tasks run to completion, which
    /// keeps raw responses intact but lets a hung request stall the run.
    pub task_timeout_secs: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            output_root: None,
            poll_interval_ms: 1000,
            show_progress: true,
            tail_preview: false,
            tail_lines: 10,
            task_timeout_secs: None,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub work_dir: PathBuf,
    pub classifier: StageCommand,
    pub generator: StageCommand,
    pub template_library: PathBuf,
    pub stage_timeout_secs: u64,
    pub artifacts: ArtifactNames,
    pub harness: HarnessConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("fuzzscout-work"),
            classifier: default_classifier(),
            generator: StageCommand::new("payload-gen", &["{templates}", "{input}"]),
            template_library: PathBuf::from("payload_library.json"),
            stage_timeout_secs: 120,
            artifacts: ArtifactNames::default(),
            harness: HarnessConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Where execution output directories are created.
    pub fn output_root(&self) -> PathBuf {
        self.harness
            .output_root
            .clone()
            .unwrap_or_else(|| self.work_dir.clone())
    }

    /// Private stage-handoff directory of one run.
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.work_dir.join("runs").join(run_id)
    }
}

/// The built-in heuristic labeler, invoked through this binary.
fn default_classifier() -> StageCommand {
    let program = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "fuzzscout".to_string());
    StageCommand::new(program, &["classify", "{input}", "{output}"])
}

/// Load a config file.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("invalid config {}", path.display()))
}

/// Resolve the pipeline configuration.
pub fn resolve_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    if let Ok(env_path) = std::env::var("FUZZSCOUT_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return load_config(&path);
        }
        tracing::warn!(path = %path.display(), "FUZZSCOUT_CONFIG points at a missing file");
    }

    let cwd_config = PathBuf::from(".fuzzscout/pipeline.json");
    if cwd_config.exists() {
        return load_config(&cwd_config);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".fuzzscout/pipeline.json");
        if home_config.exists() {
            return load_config(&home_config);
        }
    }

    Ok(PipelineConfig::default())
}
