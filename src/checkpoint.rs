//! Checkpoint persistence for workflow runs.
//!
//! A checkpoint is the full `WorkflowState` snapshot, keyed by workflow id
//! and serialized as a self-describing JSON document. The engine writes one
//! after every phase boundary; resuming a suspended run loads the newest
//! snapshot for the key and re-enters the driver loop.
//!
//! Two stores are provided: `MemoryStore` for tests and embedding, and
//! `FileStore` keeping one pretty-printed document per id under a state
//! directory. Both support concurrent use across independent workflow
//! instances; keys never interfere.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::errors::CheckpointError;
use crate::state::WorkflowState;

/// Keyed persistence of workflow snapshots.
pub trait CheckpointStore: Send + Sync {
    /// Persist a snapshot under its workflow id, replacing any prior one.
    fn save(&self, state: &WorkflowState) -> Result<(), CheckpointError>;

    /// Load the newest snapshot for a workflow id.
    fn load(&self, workflow_id: &str) -> Result<Option<WorkflowState>, CheckpointError>;

    /// List all workflow ids with a stored snapshot.
    fn list(&self) -> Result<Vec<String>, CheckpointError>;

    /// Discard the snapshot for a workflow id, if any.
    fn remove(&self, workflow_id: &str) -> Result<(), CheckpointError>;
}

/// In-memory store backed by a map behind a read-write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, WorkflowState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryStore {
    fn save(&self, state: &WorkflowState) -> Result<(), CheckpointError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(state.workflow_id.clone(), state.clone());
        Ok(())
    }

    fn load(&self, workflow_id: &str) -> Result<Option<WorkflowState>, CheckpointError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(workflow_id).cloned())
    }

    fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = entries.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn remove(&self, workflow_id: &str) -> Result<(), CheckpointError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(workflow_id);
        Ok(())
    }
}

/// File-backed store: `<state_dir>/<workflow_id>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    state_dir: PathBuf,
}

impl FileStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn snapshot_path(&self, workflow_id: &str) -> PathBuf {
        self.state_dir.join(format!("{workflow_id}.json"))
    }

    fn io_error(path: &Path, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl CheckpointStore for FileStore {
    fn save(&self, state: &WorkflowState) -> Result<(), CheckpointError> {
        std::fs::create_dir_all(&self.state_dir)
            .map_err(|e| Self::io_error(&self.state_dir, e))?;

        let json =
            serde_json::to_string_pretty(state).map_err(|source| CheckpointError::Serialize {
                workflow_id: state.workflow_id.clone(),
                source,
            })?;

        let path = self.snapshot_path(&state.workflow_id);
        std::fs::write(&path, json).map_err(|e| Self::io_error(&path, e))?;
        tracing::debug!(workflow_id = %state.workflow_id, phase = %state.current_phase, "checkpoint saved");
        Ok(())
    }

    fn load(&self, workflow_id: &str) -> Result<Option<WorkflowState>, CheckpointError> {
        let path = self.snapshot_path(workflow_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| Self::io_error(&path, e))?;
        let state = serde_json::from_str(&content)
            .map_err(|source| CheckpointError::Deserialize { path, source })?;
        Ok(Some(state))
    }

    fn list(&self) -> Result<Vec<String>, CheckpointError> {
        if !self.state_dir.exists() {
            return Ok(Vec::new());
        }
        let entries =
            std::fs::read_dir(&self.state_dir).map_err(|e| Self::io_error(&self.state_dir, e))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Self::io_error(&self.state_dir, e))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn remove(&self, workflow_id: &str) -> Result<(), CheckpointError> {
        let path = self.snapshot_path(workflow_id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| Self::io_error(&path, e))?;
        }
        Ok(())
    }
}
