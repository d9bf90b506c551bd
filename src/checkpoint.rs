//! Checkpoint store: one JSON file per workflow thread.
//!
//! ## On-disk format
//!
//! `<work_dir>/checkpoints/<thread_id>.json`, where `thread_id` is a UUID v7:
//!
//! ```json
//! { "updated_at": "2025-01-01T12:00:00+00:00", "thread_id": "...",
//!   "phase": "review", "state": { ... }, "dispatches": 1, "revisions": [] }
//! ```
//!
//! The file is rewritten after every workflow transition.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::workflow::Workflow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// RFC 3339 time of the last save.
    pub updated_at: String,
    #[serde(flatten)]
    pub workflow: Workflow,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn open(dir: &Path) -> Result<Self, AppError> {
        fs::create_dir_all(dir)
            .map_err(|e| AppError::Checkpoint(format!("cannot create {}: {e}", dir.display())))?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the current snapshot of `workflow`; returns the file path.
    pub fn save(&self, workflow: &Workflow) -> Result<PathBuf, AppError> {
        let path = self.path_for(workflow.thread_id())?;
        let record = Checkpoint { updated_at: Utc::now().to_rfc3339(), workflow: workflow.clone() };
        let data = serde_json::to_string_pretty(&record)
            .map_err(|e| AppError::Checkpoint(format!("serialise checkpoint: {e}")))?;
        fs::write(&path, data)
            .map_err(|e| AppError::Checkpoint(format!("cannot write {}: {e}", path.display())))?;
        debug!(thread_id = %workflow.thread_id(), phase = ?workflow.phase(), "checkpoint saved");
        Ok(path)
    }

    pub fn load(&self, thread_id: &str) -> Result<Checkpoint, AppError> {
        let path = self.path_for(thread_id)?;
        let data = fs::read_to_string(&path)
            .map_err(|e| AppError::Checkpoint(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&data)
            .map_err(|e| AppError::Checkpoint(format!("malformed {}: {e}", path.display())))
    }

    /// Thread ids with a saved checkpoint, oldest first.
    pub fn list(&self) -> Result<Vec<String>, AppError> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| AppError::Checkpoint(format!("cannot list {}: {e}", self.dir.display())))?;
        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let id = name.strip_suffix(".json")?;
                Uuid::parse_str(id).ok().map(|_| id.to_string())
            })
            .collect();
        // v7 ids sort by creation time.
        ids.sort();
        Ok(ids)
    }

    fn path_for(&self, thread_id: &str) -> Result<PathBuf, AppError> {
        let id = Uuid::parse_str(thread_id)
            .map_err(|e| AppError::Checkpoint(format!("invalid thread id {thread_id:?}: {e}")))?;
        Ok(self.dir.join(format!("{id}.json")))
    }
}
