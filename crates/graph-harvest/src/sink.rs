//! Result sink: append-only JSONL audit log of harvests and actions.
//!
//! - One JSON object per line, `{action_type, username, status, details, created_at}`
//! - Rotation when the file exceeds `max_size` (default 100MB)
//! - Rotated files named `.1`, `.2`, etc. (max 5 rotations)

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::types::{BatchReport, HarvestReport};

/// Default size before rotation (100 MB).
const MAX_LOG_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum number of rotated files to keep.
const MAX_ROTATIONS: u32 = 5;

pub const ACTION_UNFOLLOW: &str = "unfollow";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";

/// One audit line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action_type: String,
    pub username: String,
    pub status: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Where harvest and batch results go once a job is done.
pub trait ResultSink: Send {
    fn record_harvest(&mut self, report: &HarvestReport) -> Result<()>;
    fn record_batch(&mut self, report: &BatchReport) -> Result<()>;
}

/// Append-only JSONL sink with size-based rotation.
pub struct JsonlAuditSink {
    file: File,
    path: PathBuf,
    /// Approximate current size (may drift slightly; re-checked on open).
    current_size: u64,
    max_size: u64,
}

impl JsonlAuditSink {
    /// Open or create the log at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open audit log: {}", path.display()))?;

        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            current_size,
            max_size: MAX_LOG_SIZE,
        })
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, record: &AuditRecord) -> Result<()> {
        if self.current_size >= self.max_size {
            self.rotate()?;
        }

        let json = serde_json::to_string(record)?;
        writeln!(self.file, "{json}")
            .with_context(|| format!("failed to write audit log: {}", self.path.display()))?;
        self.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// Successful unfollows recorded on `date` (UTC), across rotated files.
    pub fn successful_unfollows_on(&self, date: NaiveDate) -> Result<u32> {
        let mut count = 0;
        for path in self.all_files() {
            count += count_successes(&path, date)?;
        }
        Ok(count)
    }

    /// Successful unfollows recorded today (UTC).
    pub fn successful_unfollows_today(&self) -> Result<u32> {
        self.successful_unfollows_on(Utc::now().date_naive())
    }

    /// Most recent `limit` records, newest first, optionally by action type.
    pub fn recent(&self, limit: usize, action_type: Option<&str>) -> Result<Vec<AuditRecord>> {
        let mut records = Vec::new();
        for path in self.all_files().into_iter().rev() {
            records.extend(read_records(&path)?);
        }
        Ok(records
            .into_iter()
            .rev()
            .filter(|r| action_type.map_or(true, |t| r.action_type == t))
            .take(limit)
            .collect())
    }

    fn all_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.path.clone()];
        for i in 1..=MAX_ROTATIONS {
            let p = rotation_path(&self.path, i);
            if p.exists() {
                files.push(p);
            }
        }
        files
    }

    /// Rotate: audit.jsonl → audit.jsonl.1, .1 → .2, etc.
    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;

        let oldest = rotation_path(&self.path, MAX_ROTATIONS);
        if oldest.exists() {
            let _ = std::fs::remove_file(&oldest);
        }
        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            let to = rotation_path(&self.path, i + 1);
            if from.exists() {
                let _ = std::fs::rename(&from, &to);
            }
        }
        let _ = std::fs::rename(&self.path, rotation_path(&self.path, 1));

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| "failed to reopen audit log after rotation")?;
        self.current_size = 0;
        tracing::debug!("rotated audit log {}", self.path.display());

        Ok(())
    }
}

impl ResultSink for JsonlAuditSink {
    fn record_harvest(&mut self, report: &HarvestReport) -> Result<()> {
        let status = if report.cancelled() { "cancelled" } else { STATUS_SUCCESS };
        self.append(&AuditRecord {
            action_type: format!("harvest_{}", report.relation),
            username: report.subject.clone(),
            status: status.to_string(),
            details: json!({
                "job_id": report.job_id,
                "count": report.count,
                "strategy": report.strategy,
                "terminal": report.terminal,
            }),
            created_at: Utc::now(),
        })
    }

    fn record_batch(&mut self, report: &BatchReport) -> Result<()> {
        for outcome in &report.outcomes {
            let status = if outcome.succeeded { STATUS_SUCCESS } else { STATUS_FAILED };
            self.append(&AuditRecord {
                action_type: ACTION_UNFOLLOW.to_string(),
                username: outcome.handle.clone(),
                status: status.to_string(),
                details: json!({
                    "job_id": report.job_id,
                    "path": outcome.path,
                    "error": outcome.error_reason,
                }),
                created_at: outcome.timestamp,
            })?;
        }
        Ok(())
    }
}

fn read_records(path: &Path) -> Result<Vec<AuditRecord>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        match serde_json::from_str::<AuditRecord>(&line) {
            Ok(r) => records.push(r),
            Err(e) if !line.trim().is_empty() => {
                tracing::debug!("skipping malformed audit line in {}: {e}", path.display());
            }
            Err(_) => {}
        }
    }
    Ok(records)
}

fn count_successes(path: &Path, date: NaiveDate) -> Result<u32> {
    Ok(read_records(path)?
        .iter()
        .filter(|r| {
            r.action_type == ACTION_UNFOLLOW
                && r.status == STATUS_SUCCESS
                && r.created_at.date_naive() == date
        })
        .count() as u32)
}

/// Build path for a rotated file: `audit.jsonl.1`, `audit.jsonl.2`, etc.
fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audit.jsonl")
    );
    base.with_file_name(name)
}
