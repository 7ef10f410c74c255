//! Execution harness: concurrent, gated replay of generated commands.
//!
//! Every retained line of a command list becomes one task. Tasks only run
//! when the [`SafetyGate`] permits it; otherwise each gets placeholder
//! artifacts and no process is started. When tasks do run, a single
//! supervisor loop owns the table of live children: it polls liveness,
//! reacts to cancellation, and collects every exit status exactly once.

use crate::config::HarnessConfig;
use anyhow::{Context, Result};
use chrono::{Local, Utc};
use fuzzscout::commands::{read_command_list, split_command, CommandLine};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Time a signalled task gets to exit before it is killed outright.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Command text width in the summary table.
const COMMAND_WIDTH: usize = 60;

/// Both flags must agree before anything executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyGate {
    pub dry_run: bool,
    pub allow_execution: bool,
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self {
            dry_run: true,
            allow_execution: false,
        }
    }
}

impl SafetyGate {
    /// True only for `dry_run == false` and `allow_execution == true`.
    pub fn permits_execution(&self) -> bool {
        !self.dry_run && self.allow_execution
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// One command's lifecycle and artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: usize,
    pub command: String,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub stdout_file: String,
    pub stderr_file: String,
    pub meta_file: String,
    pub exit_code: Option<i32>,
}

impl TaskRecord {
    fn pending(line: &CommandLine) -> Self {
        Self {
            id: line.id,
            command: line.text.clone(),
            state: TaskState::Pending,
            pid: None,
            stdout_file: format!("response{}.html", line.id),
            stderr_file: format!("response{}.err", line.id),
            meta_file: format!("response{}.meta", line.id),
            exit_code: None,
        }
    }

    fn finish(&mut self, status: ExitStatus) {
        self.exit_code = status.code();
        self.state = if status.success() {
            TaskState::Succeeded
        } else {
            TaskState::Failed
        };
    }
}

/// Result of one harness run; also written as `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub output_dir: PathBuf,
    /// `execute` or `dry-run`.
    pub mode: String,
    pub interrupted: bool,
    pub tasks: Vec<TaskRecord>,
}

impl ExecutionSummary {
    pub fn count(&self, state: TaskState) -> usize {
        self.tasks.iter().filter(|t| t.state == state).count()
    }
}

struct LiveTask {
    index: usize,
    child: Child,
    started: Instant,
    signalled_at: Option<Instant>,
    killed: bool,
}

/// Run every command in `command_list` under `gate`.
pub async fn run(
    command_list: &Path,
    gate: SafetyGate,
    config: &HarnessConfig,
    output_root: &Path,
    mut cancel: watch::Receiver<bool>,
) -> Result<ExecutionSummary> {
    let commands = read_command_list(command_list)?;
    let output_dir = create_output_dir(output_root)?;
    let execute = gate.permits_execution();

    let mut tasks: Vec<TaskRecord> = commands.iter().map(TaskRecord::pending).collect();
    for task in &tasks {
        write_meta(&output_dir, task, !execute)?;
    }

    info!(
        tasks = tasks.len(),
        dir = %output_dir.display(),
        mode = if execute { "execute" } else { "dry-run" },
        "execution harness started"
    );

    let interrupted = if execute {
        supervise(&mut tasks, &output_dir, config, &mut cancel).await?
    } else {
        for task in &tasks {
            std::fs::write(
                output_dir.join(&task.stdout_file),
                format!("[dry-run] not executed: {}\n", task.command),
            )?;
            std::fs::write(output_dir.join(&task.stderr_file), "")?;
        }
        false
    };

    let summary = ExecutionSummary {
        output_dir,
        mode: if execute { "execute" } else { "dry-run" }.to_string(),
        interrupted,
        tasks,
    };
    write_summary(&summary, config.tail_lines)?;

    info!(
        succeeded = summary.count(TaskState::Succeeded),
        failed = summary.count(TaskState::Failed),
        interrupted,
        "execution harness finished"
    );
    Ok(summary)
}

/// Create `responses_<YYYYmmdd_HHMMSS>` under `root`, suffixed if taken.
pub fn create_output_dir(root: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root)
        .with_context(|| format!("failed to create output root {}", root.display()))?;
    let base = format!(
        "{}{}",
        fuzzscout::triage::RESPONSES_DIR_PREFIX,
        Local::now().format("%Y%m%d_%H%M%S")
    );

    let mut candidate = root.join(&base);
    let mut n = 1;
    loop {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                candidate = root.join(format!("{base}_{n}"));
                n += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to create {}", candidate.display()))
            }
        }
    }
}

fn write_meta(dir: &Path, task: &TaskRecord, dry_run: bool) -> Result<()> {
    let mut meta = format!(
        "command: {}\ntimestamp: {}\ntask: {}\n",
        task.command,
        Utc::now().to_rfc3339(),
        task.id
    );
    if dry_run {
        meta.push_str("mode: dry-run\n");
    }
    std::fs::write(dir.join(&task.meta_file), meta)?;
    Ok(())
}

fn spawn_task(task: &TaskRecord, dir: &Path) -> Result<Child> {
    let argv = split_command(&task.command)?;
    let stdout = File::create(dir.join(&task.stdout_file))?;
    let stderr = File::create(dir.join(&task.stderr_file))?;

    Command::new(&argv[0])
        .args(&argv[1..])
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .spawn()
        .with_context(|| format!("failed to spawn {}", argv[0]))
}

/// Ask a live task to stop. Graceful first; the supervisor escalates later.
async fn terminate(task: &mut LiveTask) {
    if task.signalled_at.is_some() {
        return;
    }
    task.signalled_at = Some(Instant::now());

    #[cfg(unix)]
    {
        if let Some(pid) = task.child.id() {
            let sent = Command::new("kill")
                .args(["-TERM", &pid.to_string()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if matches!(sent, Ok(s) if s.success()) {
                return;
            }
        }
    }

    if let Err(e) = task.child.start_kill() {
        warn!("failed to stop task: {e}");
    }
}

fn progress_bar(total: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.cyan} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb
}

/// Spawn every task, then poll until none is alive. Returns whether the run
/// was interrupted.
async fn supervise(
    tasks: &mut [TaskRecord],
    dir: &Path,
    config: &HarnessConfig,
    cancel: &mut watch::Receiver<bool>,
) -> Result<bool> {
    if *cancel.borrow() {
        warn!("cancelled before any task started");
        for task in tasks.iter_mut() {
            task.state = TaskState::Failed;
            std::fs::write(dir.join(&task.stdout_file), "")?;
            std::fs::write(dir.join(&task.stderr_file), "interrupted before start\n")?;
        }
        return Ok(true);
    }

    let mut live: Vec<LiveTask> = Vec::new();
    for (index, task) in tasks.iter_mut().enumerate() {
        match spawn_task(task, dir) {
            Ok(child) => {
                task.pid = child.id();
                task.state = TaskState::Running;
                live.push(LiveTask {
                    index,
                    child,
                    started: Instant::now(),
                    signalled_at: None,
                    killed: false,
                });
            }
            Err(e) => {
                warn!(task = task.id, "task not started: {e:#}");
                task.state = TaskState::Failed;
                std::fs::write(dir.join(&task.stdout_file), "")?;
                std::fs::write(dir.join(&task.stderr_file), format!("{e:#}\n"))?;
            }
        }
    }

    let total = tasks.len();
    let pb = progress_bar(total as u64, config.show_progress);
    pb.inc((total - live.len()) as u64);

    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms.max(10)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let task_timeout = config.task_timeout_secs.map(Duration::from_secs);
    let mut interrupted = false;
    let mut cancel_open = true;

    while !live.is_empty() {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = cancel.changed(), if cancel_open && !interrupted => {
                if changed.is_err() {
                    cancel_open = false;
                }
                if *cancel.borrow() {
                    warn!(live = live.len(), "interrupted, terminating live tasks");
                    interrupted = true;
                    for task in live.iter_mut() {
                        terminate(task).await;
                    }
                }
            }
        }

        let mut i = 0;
        while i < live.len() {
            match live[i].child.try_wait() {
                Ok(Some(status)) => {
                    let done = live.swap_remove(i);
                    tasks[done.index].finish(status);
                    pb.inc(1);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    let done = live.swap_remove(i);
                    warn!(task = tasks[done.index].id, "lost track of task: {e}");
                    tasks[done.index].state = TaskState::Failed;
                    pb.inc(1);
                    continue;
                }
            }

            let task = &mut live[i];
            if let Some(limit) = task_timeout {
                if task.signalled_at.is_none() && task.started.elapsed() >= limit {
                    warn!(task = tasks[task.index].id, "task exceeded {}s, stopping it", limit.as_secs());
                    terminate(task).await;
                }
            }
            if let Some(at) = task.signalled_at {
                if !task.killed && at.elapsed() >= KILL_GRACE {
                    if let Err(e) = task.child.start_kill() {
                        warn!("failed to kill task: {e}");
                    }
                    task.killed = true;
                }
            }
            i += 1;
        }

        pb.set_message(format!("{} running / {total} total", live.len()));
        if config.tail_preview && !pb.is_hidden() {
            for task in &live {
                let record = &tasks[task.index];
                let tail = tail_lines(&dir.join(&record.stdout_file), config.tail_lines);
                if !tail.is_empty() {
                    pb.println(format!("  [task {}] {}", record.id, tail.join("\n    ")));
                }
            }
        }
    }

    pb.finish_with_message(if interrupted { "interrupted" } else { "done" });
    Ok(interrupted)
}

/// Last `n` lines of a text file, lossily decoded. Missing files yield nothing.
pub fn tail_lines(path: &Path, n: usize) -> Vec<String> {
    let Ok(bytes) = std::fs::read(path) else {
        return Vec::new();
    };
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..]
        .iter()
        .map(|l| l.to_string())
        .collect()
}

fn truncate_command(command: &str) -> String {
    if command.chars().count() <= COMMAND_WIDTH {
        return command.to_string();
    }
    let head: String = command.chars().take(COMMAND_WIDTH - 3).collect();
    format!("{head}...")
}

/// The summary table followed by each task's output tails.
pub fn render_summary(summary: &ExecutionSummary, tail: usize) -> String {
    let mut out = format!(
        "{:<6} {:<6} {:<18} {:<18} {}\n",
        "TASK", "EXIT", "OUTPUT", "ERROR", "COMMAND"
    );
    for task in &summary.tasks {
        let exit = task
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<6} {:<6} {:<18} {:<18} {}\n",
            task.id,
            exit,
            task.stdout_file,
            task.stderr_file,
            truncate_command(&task.command)
        ));
    }

    if tail > 0 {
        for task in &summary.tasks {
            for (label, file) in [("stdout", &task.stdout_file), ("stderr", &task.stderr_file)] {
                let lines = tail_lines(&summary.output_dir.join(file), tail);
                if lines.is_empty() {
                    continue;
                }
                out.push_str(&format!("\n--- task {} {label} (last {tail} lines) ---\n", task.id));
                for line in lines {
                    out.push_str(&line);
                    out.push('\n');
                }
            }
        }
    }
    out
}

fn write_summary(summary: &ExecutionSummary, tail: usize) -> Result<()> {
    std::fs::write(
        summary.output_dir.join("summary.txt"),
        render_summary(summary, tail),
    )?;
    std::fs::write(
        summary.output_dir.join("summary.json"),
        serde_json::to_string_pretty(summary)?,
    )?;
    Ok(())
}
