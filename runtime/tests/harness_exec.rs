//! Execution harness against real child processes.

#![cfg(unix)]

use fuzzscout::triage;
use fuzzscout_runtime::config::HarnessConfig;
use fuzzscout_runtime::harness::{self, ExecutionSummary, SafetyGate, TaskState};
use fuzzscout_runtime::signals::never_cancelled;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;

const OPEN: SafetyGate = SafetyGate {
    dry_run: false,
    allow_execution: true,
};

fn quiet_config() -> HarnessConfig {
    HarnessConfig {
        poll_interval_ms: 20,
        show_progress: false,
        ..HarnessConfig::default()
    }
}

fn write_list(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("payloads.txt");
    std::fs::write(&path, body).unwrap();
    path
}

async fn run_open(list: &Path, root: &Path, config: &HarnessConfig) -> ExecutionSummary {
    harness::run(list, OPEN, config, root, never_cancelled())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_two_commands_comment_and_blank() {
    let dir = tempfile::tempdir().unwrap();
    let list = write_list(dir.path(), "echo alpha\n# skipped\n\necho beta\n");

    let summary = run_open(&list, dir.path(), &quiet_config()).await;

    assert_eq!(summary.mode, "execute");
    assert!(!summary.interrupted);
    assert_eq!(summary.tasks.len(), 2);
    for (task, word) in summary.tasks.iter().zip(["alpha", "beta"]) {
        assert_eq!(task.state, TaskState::Succeeded);
        assert_eq!(task.exit_code, Some(0));
        let out = std::fs::read_to_string(summary.output_dir.join(&task.stdout_file)).unwrap();
        assert_eq!(out.trim(), word);
        assert!(!out.contains("[dry-run]"));
        let meta = std::fs::read_to_string(summary.output_dir.join(&task.meta_file)).unwrap();
        assert!(meta.contains(&format!("command: echo {word}")));
        assert!(!meta.contains("mode: dry-run"));
    }
    assert_eq!(summary.tasks[1].stdout_file, "response2.html");

    let summary_txt = std::fs::read_to_string(summary.output_dir.join("summary.txt")).unwrap();
    assert!(summary_txt.contains("echo alpha"));
    let dir_name = summary.output_dir.file_name().unwrap().to_string_lossy().to_string();
    assert!(dir_name.starts_with(triage::RESPONSES_DIR_PREFIX));
}

#[tokio::test]
async fn test_closed_gate_never_spawns() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let list = write_list(dir.path(), &format!("touch {}\n", marker.display()));

    for gate in [
        SafetyGate::default(),
        SafetyGate {
            dry_run: true,
            allow_execution: true,
        },
        SafetyGate {
            dry_run: false,
            allow_execution: false,
        },
    ] {
        let summary = harness::run(&list, gate, &quiet_config(), dir.path(), never_cancelled())
            .await
            .unwrap();
        assert_eq!(summary.mode, "dry-run");
        assert_eq!(summary.tasks.len(), 1);
    }
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_failures_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let list = write_list(
        dir.path(),
        "echo 'unbalanced\nsh -c 'exit 4'\n/nonexistent/fuzzscout-bin\necho ok\n",
    );

    let summary = run_open(&list, dir.path(), &quiet_config()).await;

    let states: Vec<TaskState> = summary.tasks.iter().map(|t| t.state).collect();
    assert_eq!(
        states,
        vec![
            TaskState::Failed,
            TaskState::Failed,
            TaskState::Failed,
            TaskState::Succeeded
        ]
    );
    assert_eq!(summary.tasks[1].exit_code, Some(4));
    let err = std::fs::read_to_string(summary.output_dir.join("response1.err")).unwrap();
    assert!(err.contains("quote"), "{err}");
}

#[tokio::test]
async fn test_shell_metacharacters_are_not_interpreted() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("injected");
    let list = write_list(
        dir.path(),
        &format!("echo \"a; touch {}\"\n", marker.display()),
    );

    let summary = run_open(&list, dir.path(), &quiet_config()).await;

    assert_eq!(summary.tasks[0].state, TaskState::Succeeded);
    assert!(!marker.exists());
    let out = std::fs::read_to_string(summary.output_dir.join("response1.html")).unwrap();
    assert!(out.starts_with("a; touch"));
}

#[tokio::test]
async fn test_cancellation_terminates_live_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let list = write_list(dir.path(), "sleep 30\nsleep 30\n");
    let (tx, rx) = watch::channel(false);
    let config = quiet_config();
    let root = dir.path().to_path_buf();

    let handle = tokio::spawn(async move { harness::run(&list, OPEN, &config, &root, rx).await });
    tokio::time::sleep(Duration::from_millis(300)).await;
    tx.send(true).unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("harness must stop promptly")
        .unwrap()
        .unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.count(TaskState::Failed), 2);
    assert_eq!(summary.count(TaskState::Running), 0);
    assert!(summary.output_dir.join("summary.json").exists());
}

#[tokio::test]
async fn test_already_cancelled_starts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let list = write_list(dir.path(), &format!("touch {}\n", marker.display()));
    let (tx, rx) = watch::channel(true);

    let summary = harness::run(&list, OPEN, &quiet_config(), dir.path(), rx)
        .await
        .unwrap();
    drop(tx);

    assert!(summary.interrupted);
    assert_eq!(summary.count(TaskState::Failed), 1);
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_task_timeout_stops_hung_task() {
    let dir = tempfile::tempdir().unwrap();
    let list = write_list(dir.path(), "sleep 30\necho fast\n");
    let config = HarnessConfig {
        task_timeout_secs: Some(1),
        ..quiet_config()
    };

    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        run_open(&list, dir.path(), &config),
    )
    .await
    .expect("timeout must stop the hung task");

    assert!(!summary.interrupted);
    assert_eq!(summary.tasks[0].state, TaskState::Failed);
    assert_eq!(summary.tasks[1].state, TaskState::Succeeded);
}

#[tokio::test]
async fn test_triage_over_harness_output() {
    let dir = tempfile::tempdir().unwrap();
    let list = write_list(
        dir.path(),
        "printf 'HTTP/1.1 500 Internal Server Error\\n\\nSQL syntax error near <script>'\necho fine\n",
    );

    let summary = run_open(&list, dir.path(), &quiet_config()).await;
    assert_eq!(summary.count(TaskState::Succeeded), 2);

    let latest = triage::latest_responses_dir(dir.path()).unwrap().unwrap();
    assert_eq!(latest, summary.output_dir);
    let report = triage::triage_dir(&latest).unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.flagged, 1);
    let flagged = report.entries.iter().find(|e| e.flagged).unwrap();
    assert_eq!(flagged.task, 1);
    assert_eq!(flagged.status, Some(500));
    assert!(latest.join(triage::TRIAGE_FILE).exists());
}
