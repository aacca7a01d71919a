//! Task repository
//!
//! Owns the in-memory consolidated index: a mapping from document path to
//! its current task list, plus a secondary id map for point lookups. All
//! mutation goes through the methods here and swaps state under a single
//! write lock, so readers never observe a half-applied update. Writers are
//! already serialized by the orchestrator; the lock enforces the invariant
//! rather than providing scheduling.
//!
//! Every mutation diffs against the previous state and only notifies when
//! something actually changed, unless the caller forces emission.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::domain::{TaskId, TaskRecord};
use crate::error::IndexError;
use crate::events::{EventBus, IndexEvent};
use crate::storage::{ConsolidatedPayload, Storage};

/// Options for batch updates
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Persist the consolidated snapshot after applying
    pub persist: bool,
    /// Notify even for documents whose task lists are unchanged
    pub force_emit: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            persist: true,
            force_emit: false,
        }
    }
}

#[derive(Default)]
struct IndexState {
    by_path: HashMap<PathBuf, Vec<TaskRecord>>,
    by_id: HashMap<TaskId, TaskRecord>,
}

impl IndexState {
    /// Replace one document's task list; returns whether anything changed
    fn replace(&mut self, path: &Path, tasks: Vec<TaskRecord>) -> bool {
        match self.by_path.get(path) {
            // An empty list and an absent entry are the same observable state
            None if tasks.is_empty() => return false,
            Some(previous) if *previous == tasks => return false,
            _ => {}
        }

        if let Some(old) = self.by_path.remove(path) {
            for task in &old {
                self.by_id.remove(&task.id);
            }
        }
        for task in &tasks {
            self.by_id.insert(task.id.clone(), task.clone());
        }
        if tasks.is_empty() {
            self.by_path.remove(path);
        } else {
            self.by_path.insert(path.to_path_buf(), tasks);
        }
        true
    }

    fn remove(&mut self, path: &Path) -> bool {
        match self.by_path.remove(path) {
            Some(old) => {
                for task in &old {
                    self.by_id.remove(&task.id);
                }
                true
            }
            None => false,
        }
    }
}

/// The consolidated index owner
pub struct Repository {
    state: RwLock<IndexState>,
    bus: Arc<EventBus>,
    storage: Arc<Storage>,
}

impl Repository {
    pub fn new(bus: Arc<EventBus>, storage: Arc<Storage>) -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            bus,
            storage,
        }
    }

    /// Populate the index from a consolidated snapshot, without notifying
    ///
    /// Used at warm start before any subscriber is interested in diffs.
    pub fn load_snapshot(&self, payload: ConsolidatedPayload) {
        let mut state = self.state.write().expect("index lock poisoned");
        for (path, tasks) in payload.files {
            state.replace(&path, tasks);
        }
    }

    /// Atomically replace one document's task list
    ///
    /// Emits a change notification carrying `origin_seq` unless the new
    /// list is identical to the old one.
    pub fn update_file(&self, path: &Path, tasks: Vec<TaskRecord>, origin_seq: Option<u64>) {
        self.update_file_opts(path, tasks, origin_seq, false);
    }

    /// `update_file` with forced emission, for callers whose downstream
    /// consumers must react even when the bytes happen to coincide
    pub fn update_file_forced(&self, path: &Path, tasks: Vec<TaskRecord>, origin_seq: Option<u64>) {
        self.update_file_opts(path, tasks, origin_seq, true);
    }

    fn update_file_opts(&self, path: &Path, tasks: Vec<TaskRecord>, origin_seq: Option<u64>, force_emit: bool) {
        let changed = {
            let mut state = self.state.write().expect("index lock poisoned");
            state.replace(path, tasks)
        };

        if changed || force_emit {
            self.persist_consolidated();
            self.notify(vec![path.to_path_buf()], origin_seq);
        }
    }

    /// Apply many document updates as one logical update
    ///
    /// All documents become visible together; a single notification lists
    /// every changed path.
    pub fn update_batch(
        &self,
        updates: HashMap<PathBuf, Vec<TaskRecord>>,
        origin_seq: Option<u64>,
        opts: BatchOptions,
    ) {
        let mut changed_paths = Vec::new();
        {
            let mut state = self.state.write().expect("index lock poisoned");
            for (path, tasks) in updates {
                let changed = state.replace(&path, tasks);
                if changed || opts.force_emit {
                    changed_paths.push(path);
                }
            }
        }

        if changed_paths.is_empty() {
            return;
        }
        changed_paths.sort();

        if opts.persist {
            self.persist_consolidated();
        }
        self.notify(changed_paths, origin_seq);
    }

    /// Remove a document and its tasks from the index
    pub fn remove_file(&self, path: &Path, origin_seq: Option<u64>) {
        let removed = {
            let mut state = self.state.write().expect("index lock poisoned");
            state.remove(path)
        };

        if removed {
            self.persist_consolidated();
            self.notify(vec![path.to_path_buf()], origin_seq);
        } else {
            debug!(path = %path.display(), "remove_file for unindexed document, no-op");
        }
    }

    /// Remove a single task by id, leaving the rest of its document intact
    pub fn remove_task_by_id(&self, id: &TaskId) -> Result<(), IndexError> {
        let path = {
            let mut state = self.state.write().expect("index lock poisoned");
            let Some(task) = state.by_id.remove(id) else {
                return Err(IndexError::UnknownTask(id.clone()));
            };
            let path = task.path.clone();
            if let Some(tasks) = state.by_path.get_mut(&path) {
                tasks.retain(|t| t.id != *id);
                if tasks.is_empty() {
                    state.by_path.remove(&path);
                }
            }
            path
        };

        self.persist_consolidated();
        self.notify(vec![path], None);
        Ok(())
    }

    /// Point-update one task in place, bypassing a full re-parse
    ///
    /// Used by interactive edits; the next re-parse of the document
    /// supersedes this state from the source of truth.
    pub fn update_single_task(&self, task: TaskRecord) -> Result<(), IndexError> {
        let path = task.path.clone();
        {
            let mut state = self.state.write().expect("index lock poisoned");
            if !state.by_id.contains_key(&task.id) {
                return Err(IndexError::UnknownTask(task.id.clone()));
            }
            if let Some(tasks) = state.by_path.get_mut(&path) {
                if let Some(slot) = tasks.iter_mut().find(|t| t.id == task.id) {
                    *slot = task.clone();
                }
            }
            state.by_id.insert(task.id.clone(), task);
        }

        self.persist_consolidated();
        self.notify(vec![path], None);
        Ok(())
    }

    // === Read-only snapshots ===

    /// Every indexed task
    pub fn all_tasks(&self) -> Vec<TaskRecord> {
        let state = self.state.read().expect("index lock poisoned");
        let mut tasks: Vec<TaskRecord> = state.by_path.values().flatten().cloned().collect();
        tasks.sort_by(|a, b| (&a.path, a.position.line()).cmp(&(&b.path, b.position.line())));
        tasks
    }

    /// Tasks of one document, in document order
    pub fn tasks_for_path(&self, path: &Path) -> Vec<TaskRecord> {
        let state = self.state.read().expect("index lock poisoned");
        state.by_path.get(path).cloned().unwrap_or_default()
    }

    /// Point lookup by task id
    pub fn task_by_id(&self, id: &TaskId) -> Option<TaskRecord> {
        let state = self.state.read().expect("index lock poisoned");
        state.by_id.get(id).cloned()
    }

    /// Paths of all indexed documents
    pub fn indexed_paths(&self) -> Vec<PathBuf> {
        let state = self.state.read().expect("index lock poisoned");
        state.by_path.keys().cloned().collect()
    }

    /// Total number of indexed tasks
    pub fn task_count(&self) -> usize {
        let state = self.state.read().expect("index lock poisoned");
        state.by_id.len()
    }

    /// Snapshot the whole index for persistence
    pub fn snapshot(&self) -> ConsolidatedPayload {
        let state = self.state.read().expect("index lock poisoned");
        let mut files: Vec<(PathBuf, Vec<TaskRecord>)> =
            state.by_path.iter().map(|(p, t)| (p.clone(), t.clone())).collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));
        ConsolidatedPayload { files }
    }

    fn persist_consolidated(&self) {
        self.storage.store_consolidated(&self.snapshot());
    }

    fn notify(&self, changed_paths: Vec<PathBuf>, origin_seq: Option<u64>) {
        self.bus.emit(IndexEvent::IndexChanged {
            changed_paths,
            origin_seq: origin_seq.unwrap_or(0),
        });
    }
}
