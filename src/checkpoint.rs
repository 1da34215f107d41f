use crate::error::CheckpointError;
use crate::models::ListingRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CHECKPOINT_VERSION: u32 = 1;
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Persisted progress of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub version: u32,
    /// Measurement timestamp of the run; reused on resume.
    pub measured_at: DateTime<Utc>,
    /// Keys of completed scan tasks.
    pub completed: BTreeSet<String>,
    pub records: Vec<ListingRecord>,
    pub last_updated: DateTime<Utc>,
}

impl RunCheckpoint {
    pub fn new(measured_at: DateTime<Utc>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            measured_at,
            completed: BTreeSet::new(),
            records: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// Every completed key must belong to the planned task set.
    pub fn check_against_plan(&self, planned: &HashSet<String>) -> Result<(), CheckpointError> {
        let unknown = self.completed.iter().filter(|k| !planned.contains(*k)).count();
        if unknown > 0 {
            return Err(CheckpointError::PlanMismatch(unknown));
        }
        Ok(())
    }
}

/// Reads and atomically writes a checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<dir>/checkpoint.json`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CHECKPOINT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// `Ok(None)` when no checkpoint exists yet.
    pub fn load(&self) -> Result<Option<RunCheckpoint>, CheckpointError> {
        if !self.path.exists() {
            debug!("No checkpoint at {}", self.path.display());
            return Ok(None);
        }
        let file = File::open(&self.path).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })?;
        let checkpoint: RunCheckpoint =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| CheckpointError::Serde {
                path: self.path.clone(),
                source,
            })?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Version {
                found: checkpoint.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        info!(
            "Loaded checkpoint {}: {} completed scans, {} records",
            self.path.display(),
            checkpoint.completed.len(),
            checkpoint.records.len()
        );
        Ok(Some(checkpoint))
    }

    /// Write to a temporary file next to the target, then rename over it, so a
    /// crash never leaves a half-written checkpoint behind.
    pub fn save(&self, checkpoint: &RunCheckpoint) -> Result<(), CheckpointError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| CheckpointError::Io { path, source }
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let tmp = self.tmp_path();
        {
            let file = File::create(&tmp).map_err(io_err(&tmp))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, checkpoint).map_err(|source| CheckpointError::Serde {
                path: tmp.clone(),
                source,
            })?;
            writer.flush().map_err(io_err(&tmp))?;
            writer.get_ref().sync_all().map_err(io_err(&tmp))?;
        }
        fs::rename(&tmp, &self.path).map_err(io_err(&self.path))?;

        debug!(
            "Checkpoint saved to {}: {} completed scans, {} records",
            self.path.display(),
            checkpoint.completed.len(),
            checkpoint.records.len()
        );
        Ok(())
    }
}
