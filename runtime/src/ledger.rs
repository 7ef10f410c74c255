//! Pipeline ledger: append-only JSONL record of stage transitions.
//!
//! Lives at `<workDir>/pipeline.jsonl`. When the file reaches
//! `MAX_LEDGER_SIZE` it rotates to `.1`, `.2`, ... keeping `MAX_GENERATIONS`.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Ledger file name inside the work directory.
pub const LEDGER_FILE: &str = "pipeline.jsonl";

/// Size at which the ledger rotates (10 MB).
const MAX_LEDGER_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated generations kept besides the live file.
const MAX_GENERATIONS: u32 = 3;

/// One stage transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: String,
    pub run_id: String,
    pub stage: String,
    pub status: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Append-only JSONL ledger with size-based rotation.
pub struct Ledger {
    file: File,
    path: PathBuf,
    current_size: u64,
    max_size: u64,
}

impl Ledger {
    /// Open or create the ledger at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open pipeline ledger: {}", path.display()))?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            current_size,
            max_size: MAX_LEDGER_SIZE,
        })
    }

    /// Open `<work_dir>/pipeline.jsonl`.
    pub fn in_work_dir(work_dir: &Path) -> Result<Self> {
        Self::open(&work_dir.join(LEDGER_FILE))
    }

    #[cfg(test)]
    fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn append(&mut self, entry: &LedgerEntry) -> Result<()> {
        if self.current_size >= self.max_size {
            self.rotate()?;
        }

        let json = serde_json::to_string(entry)?;
        writeln!(self.file, "{json}")?;
        self.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// Record a stage transition stamped with the current time.
    pub fn record(
        &mut self,
        run_id: &str,
        stage: &str,
        status: &str,
        duration_ms: u64,
        detail: Option<&str>,
    ) -> Result<()> {
        self.append(&LedgerEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            status: status.to_string(),
            duration_ms,
            detail: detail.map(String::from),
        })
    }

    /// `pipeline.jsonl` becomes `.1`, `.1` becomes `.2`, the oldest is dropped.
    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;

        let oldest = generation_path(&self.path, MAX_GENERATIONS);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        for i in (1..MAX_GENERATIONS).rev() {
            let from = generation_path(&self.path, i);
            if from.exists() {
                std::fs::rename(&from, generation_path(&self.path, i + 1))?;
            }
        }
        std::fs::rename(&self.path, generation_path(&self.path, 1))?;

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("failed to reopen pipeline ledger after rotation")?;
        self.current_size = 0;
        Ok(())
    }
}

/// Read every entry of a ledger file, skipping malformed lines.
pub fn read_entries(path: &Path) -> Result<Vec<LedgerEntry>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read ledger {}", path.display()))?;
    Ok(data
        .lines()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}

fn generation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(LEDGER_FILE)
    );
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::in_work_dir(dir.path()).unwrap();
        ledger.record("r1", "discover", "ok", 12, None).unwrap();
        ledger
            .record("r1", "classify_types", "fallback", 3, Some("exit 1"))
            .unwrap();

        let entries = read_entries(&dir.path().join(LEDGER_FILE)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].stage, "classify_types");
        assert_eq!(entries[1].detail.as_deref(), Some("exit 1"));
    }

    #[test]
    fn test_rotation_keeps_bounded_generations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEDGER_FILE);
        let mut ledger = Ledger::open(&path).unwrap().with_max_size(1);

        for i in 0..6 {
            ledger.record("r", &format!("s{i}"), "ok", 0, None).unwrap();
        }

        assert!(path.exists());
        assert!(generation_path(&path, 1).exists());
        assert!(generation_path(&path, MAX_GENERATIONS).exists());
        assert!(!generation_path(&path, MAX_GENERATIONS + 1).exists());

        let live = read_entries(&path).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].stage, "s5");
    }
}
