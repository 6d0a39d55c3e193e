//! Progress Store: one JSON checkpoint file per task, durable across restarts.
//!
//! Mirrors the write-temp + rename discipline used for the download's temp
//! file itself (see `storage`), applied here to the checkpoint document so a
//! crash mid-write never leaves a half-written `.progress` file behind.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::proxy::ProxyRecord;
use crate::segmenter::Segment;

/// Suffix appended to the final artifact name for the checkpoint file.
pub const PROGRESS_SUFFIX: &str = ".progress";

/// Lifecycle status of a task, persisted as part of its checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Initialized,
    Downloading,
    Paused,
    Completed,
    Error,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Canceled)
    }
}

/// Durable snapshot of a task's progress, as described in the data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub url: String,
    pub total_size: u64,
    pub downloaded_size: u64,
    pub segments: Vec<Segment>,
    pub status: TaskStatus,
    pub destination_directory: PathBuf,
    pub filename: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub proxy_list_snapshot: Vec<ProxyRecord>,
    pub worker_count: usize,
    pub single_stream_latched: bool,
    pub total_active_time_secs: u64,
}

impl CheckpointRecord {
    /// Path of the checkpoint file for a given final artifact path.
    pub fn path_for(final_path: &Path) -> PathBuf {
        let mut o = final_path.as_os_str().to_owned();
        o.push(PROGRESS_SUFFIX);
        PathBuf::from(o)
    }

    /// Loads and parses a checkpoint file. A checkpoint that fails to parse
    /// is treated as absent by the caller (discard-and-restart, not repair);
    /// this function surfaces the parse error so the caller can decide.
    pub fn load(progress_path: &Path) -> Result<Self> {
        let data = fs::read_to_string(progress_path)
            .with_context(|| format!("reading checkpoint {}", progress_path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("parsing checkpoint {}", progress_path.display()))
    }

    /// Writes the checkpoint via write-temp + rename, so a crash mid-write
    /// never corrupts the previous, still-valid checkpoint.
    pub fn save(&self, progress_path: &Path) -> Result<()> {
        let data = serde_json::to_string(self).context("serializing checkpoint")?;
        let tmp_path = progress_path.with_extension("progress.tmp");
        if let Some(parent) = progress_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&tmp_path, data)
            .with_context(|| format!("writing checkpoint temp file {}", tmp_path.display()))?;
        fs::rename(&tmp_path, progress_path).with_context(|| {
            format!(
                "renaming checkpoint {} into place at {}",
                tmp_path.display(),
                progress_path.display()
            )
        })?;
        Ok(())
    }

    /// Recomputes `downloaded_size` from segment positions (sum of
    /// `current - start`), clamped to `total_size`. Used during Prepare to
    /// reconcile a loaded checkpoint before trusting it.
    pub fn reconcile_downloaded_size(&mut self) {
        if self.segments.is_empty() {
            return;
        }
        let sum: u64 = self.segments.iter().map(Segment::downloaded).sum();
        self.downloaded_size = sum.min(self.total_size);
    }
}

/// Scans `directory` for `*.progress` files and returns the parsed
/// checkpoints that loaded successfully, keyed by their checkpoint path.
/// Unparseable files are skipped (they are discarded lazily, the next time
/// their owning task is prepared) rather than failing the whole scan.
pub fn scan_unfinished(directory: &Path) -> Result<HashMap<PathBuf, CheckpointRecord>> {
    let mut found = HashMap::new();
    if !directory.is_dir() {
        return Ok(found);
    }

    for entry in fs::read_dir(directory)
        .with_context(|| format!("scanning {} for unfinished tasks", directory.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("progress") {
            continue;
        }
        if let Ok(record) = CheckpointRecord::load(&path) {
            found.insert(path, record);
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> CheckpointRecord {
        CheckpointRecord {
            url: "https://example.com/file.iso".to_string(),
            total_size: 1000,
            downloaded_size: 0,
            segments: vec![
                Segment {
                    index: 0,
                    start: 0,
                    end_inclusive: 499,
                    current: 200,
                    completed: false,
                },
                Segment {
                    index: 1,
                    start: 500,
                    end_inclusive: 999,
                    current: 999,
                    completed: false,
                },
            ],
            status: TaskStatus::Paused,
            destination_directory: PathBuf::from("/tmp"),
            filename: "file.iso".to_string(),
            etag: Some("e1".to_string()),
            last_modified: None,
            proxy_list_snapshot: vec![],
            worker_count: 4,
            single_stream_latched: false,
            total_active_time_secs: 30,
        }
    }

    #[test]
    fn path_for_appends_progress_suffix() {
        let p = CheckpointRecord::path_for(Path::new("/tmp/file.iso"));
        assert_eq!(p.to_string_lossy(), "/tmp/file.iso.progress");
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let progress_path = dir.path().join("file.iso.progress");
        let record = sample_record();
        record.save(&progress_path).unwrap();

        let loaded = CheckpointRecord::load(&progress_path).unwrap();
        assert_eq!(loaded.url, record.url);
        assert_eq!(loaded.segments.len(), 2);
        assert_eq!(loaded.status, TaskStatus::Paused);
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let progress_path = dir.path().join("file.iso.progress");
        sample_record().save(&progress_path).unwrap();
        assert!(progress_path.exists());
        assert!(!dir.path().join("file.iso.progress.tmp").exists());
    }

    #[test]
    fn reconcile_downloaded_size_sums_segment_progress() {
        let mut record = sample_record();
        record.reconcile_downloaded_size();
        assert_eq!(record.downloaded_size, 200 + 499);
    }

    #[test]
    fn reconcile_clamps_to_total_size() {
        let mut record = sample_record();
        record.total_size = 300;
        record.reconcile_downloaded_size();
        assert_eq!(record.downloaded_size, 300);
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result = CheckpointRecord::load(&dir.path().join("nope.progress"));
        assert!(result.is_err());
    }

    #[test]
    fn load_corrupt_file_errors_rather_than_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.iso.progress");
        fs::write(&path, b"not json").unwrap();
        assert!(CheckpointRecord::load(&path).is_err());
    }

    #[test]
    fn scan_unfinished_finds_and_skips_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        sample_record()
            .save(&dir.path().join("good.iso.progress"))
            .unwrap();
        fs::write(dir.path().join("bad.iso.progress"), b"not json").unwrap();
        fs::write(dir.path().join("unrelated.txt"), b"ignore me").unwrap();

        let found = scan_unfinished(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
    }
}
