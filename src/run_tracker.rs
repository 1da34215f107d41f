use crate::error::RunStatusError;
use crate::models::ScanCombination;
use crate::orchestrator::RunSummary;
use crate::progress::{ProgressReporter, ProgressUpdate};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

pub const STATUS_FILE: &str = "run_status.json";
pub const LOG_FILE: &str = "run.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProgress {
    pub total_scans: usize,
    pub completed_scans: usize,
    pub failed_scans: usize,
    pub total_listings: usize,
}

/// Contents of `run_status.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: RunProgress,
    pub error: Option<String>,
}

impl RunState {
    fn new() -> Self {
        Self {
            status: RunStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: RunProgress::default(),
            error: None,
        }
    }
}

/// Lifecycle of one run folder: `run_status.json` plus an appended `run.log`.
///
/// Reopening a folder keeps its creation time, so a resumed run reads as one run.
pub struct RunTracker {
    dir: PathBuf,
    state: Mutex<RunState>,
}

impl RunTracker {
    pub fn open(dir: &Path) -> Result<Self, RunStatusError> {
        fs::create_dir_all(dir).map_err(|source| RunStatusError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(STATUS_FILE);
        let state = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| RunStatusError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| RunStatusError::Serde {
                path: path.clone(),
                source,
            })?
        } else {
            RunState::new()
        };

        let tracker = Self {
            dir: dir.to_path_buf(),
            state: Mutex::new(state.clone()),
        };
        tracker.write_state(&state)?;
        Ok(tracker)
    }

    pub fn status_path(&self) -> PathBuf {
        self.dir.join(STATUS_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    pub fn state(&self) -> RunState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn start(&self, total_scans: usize, already_completed: usize) {
        self.update(|state| {
            state.status = RunStatus::Running;
            state.started_at = Some(Utc::now());
            state.completed_at = None;
            state.error = None;
            state.progress.total_scans = total_scans;
            state.progress.completed_scans = already_completed;
            state.progress.failed_scans = 0;
        });
        self.log(&format!(
            "Run started: {} scans, {} already completed",
            total_scans, already_completed
        ));
    }

    pub fn complete(&self, total_listings: usize) {
        self.update(|state| {
            state.status = RunStatus::Completed;
            state.completed_at = Some(Utc::now());
            state.progress.total_listings = total_listings;
        });
        self.log(&format!("Run completed: {} listings", total_listings));
    }

    pub fn fail(&self, error: &str) {
        self.update(|state| {
            state.status = RunStatus::Failed;
            state.completed_at = Some(Utc::now());
            state.error = Some(error.to_string());
        });
        self.log(&format!("Run failed: {}", error));
    }

    pub fn cancel(&self, pending: usize) {
        self.update(|state| {
            state.status = RunStatus::Cancelled;
            state.completed_at = Some(Utc::now());
        });
        self.log(&format!("Run stopped with {} scans pending", pending));
    }

    /// Append a timestamped line to `run.log`.
    pub fn log(&self, message: &str) {
        let line = format!("[{}] {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = appended {
            warn!("Failed to append to {}: {}", self.log_path().display(), e);
        }
    }

    fn update(&self, change: impl FnOnce(&mut RunState)) {
        let snapshot = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            change(&mut state);
            state.clone()
        };
        if let Err(e) = self.write_state(&snapshot) {
            warn!("Failed to write run status: {}", e);
        }
    }

    fn write_state(&self, state: &RunState) -> Result<(), RunStatusError> {
        let path = self.status_path();
        let tmp = self.dir.join(format!("{}.tmp", STATUS_FILE));
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| RunStatusError::Io { path, source }
        };
        {
            let file = File::create(&tmp).map_err(io_err(&tmp))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, state).map_err(|source| RunStatusError::Serde {
                path: tmp.clone(),
                source,
            })?;
            writer.flush().map_err(io_err(&tmp))?;
        }
        fs::rename(&tmp, &path).map_err(io_err(&path))
    }
}

impl ProgressReporter for RunTracker {
    fn on_run_start(&self, total: usize, already_completed: usize) {
        self.start(total, already_completed);
    }

    fn on_task_complete(&self, update: &ProgressUpdate) {
        self.update(|state| {
            state.progress.completed_scans = update.completed.saturating_sub(state.progress.failed_scans);
        });
    }

    fn on_task_failed(&self, municipality: &str, combination: &ScanCombination, reason: &str) {
        self.update(|state| state.progress.failed_scans += 1);
        self.log(&format!("Scan {} {} failed: {}", municipality, combination, reason));
    }

    fn on_checkpoint(&self, completed: usize, records: usize) {
        self.log(&format!("Checkpoint: {} scans, {} records", completed, records));
    }

    fn on_run_complete(&self, summary: &RunSummary) {
        self.update(|state| {
            state.progress.completed_scans = summary.skipped + summary.succeeded;
            state.progress.failed_scans = summary.failed;
            state.progress.total_listings = summary.dataset_records;
        });
        if summary.pending > 0 {
            self.cancel(summary.pending);
        } else if summary.attempted > 0 && summary.succeeded == 0 {
            self.fail(&format!("all {} scans failed", summary.attempted));
        } else {
            self.complete(summary.dataset_records);
        }
    }
}
