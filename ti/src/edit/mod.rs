//! Write API
//!
//! Task mutations are targeted document edits: the task line is rendered
//! back to markdown and spliced into its file, then a change event goes
//! through the same incremental pipeline as watcher-driven updates. One
//! code path means programmatic writes and file edits cannot diverge.
//!
//! For snappy consumers, updates also apply an immediate point update to
//! the repository; the debounced re-parse supersedes it from the source
//! of truth.

use std::fs;
use std::path::Path;

use eyre::{Context, Result};
use tracing::debug;

use crate::config::ParserConfig;
use crate::domain::{TaskMeta, TaskPosition, TaskRecord, TaskStatus};
use crate::events::{ChangeEvent, ChangeReason};
use crate::orchestrator::Indexer;
use crate::parser::render_line;

/// Fields for a task that does not exist yet
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub text: String,
    pub status: TaskStatus,
    pub meta: TaskMeta,
}

impl TaskDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: TaskStatus::Open,
            meta: TaskMeta::default(),
        }
    }
}

/// Task mutations as document edits
pub struct TaskEditor {
    indexer: Indexer,
    parser_config: ParserConfig,
}

impl TaskEditor {
    pub fn new(indexer: Indexer, parser_config: ParserConfig) -> Self {
        Self { indexer, parser_config }
    }

    /// Append a new task to a document, creating the document if needed
    pub async fn create_task(&self, path: &Path, draft: TaskDraft) -> Result<()> {
        let mut template = TaskRecord::new(
            String::new(),
            path,
            TaskPosition::Line { line: 0, occurrence: 0 },
        );
        template.text = draft.text;
        template.status = draft.status;
        template.meta = draft.meta;
        let line = render_line(&template, &self.parser_config);

        let existed = path.exists();
        let mut content = if existed {
            fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?
        } else {
            String::new()
        };
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&line);
        content.push('\n');
        fs::write(path, content).context(format!("Failed to write {}", path.display()))?;

        debug!(path = %path.display(), "Created task");
        let reason = if existed { ChangeReason::Modify } else { ChangeReason::Create };
        self.indexer.notify_change(ChangeEvent::new(path, reason)).await
    }

    /// Rewrite an existing task's line with its current record state
    ///
    /// The caller passes the record with mutated fields but the original
    /// `raw` line, which is how the line is located when positions have
    /// shifted since the last parse.
    pub async fn update_task(&self, task: &TaskRecord) -> Result<()> {
        let line = render_line(task, &self.parser_config);
        self.splice(task, Some(line)).await?;

        // Immediate point update; the re-parse supersedes it
        let _ = self.indexer.repository().update_single_task(task.clone());
        Ok(())
    }

    /// Remove a task's line from its document
    pub async fn delete_task(&self, task: &TaskRecord) -> Result<()> {
        self.splice(task, None).await?;
        let _ = self.indexer.repository().remove_task_by_id(&task.id);
        Ok(())
    }

    async fn splice(&self, task: &TaskRecord, replacement: Option<String>) -> Result<()> {
        let TaskPosition::Line { line, .. } = &task.position else {
            return Err(eyre::eyre!("Editing node-graph documents is not supported"));
        };

        let content = fs::read_to_string(&task.path).context(format!("Failed to read {}", task.path.display()))?;
        let mut lines: Vec<&str> = content.lines().collect();

        // Prefer the recorded position; fall back to locating by content,
        // since line numbers shift under concurrent edits
        let index = if lines.get(*line).copied() == Some(task.raw.as_str()) {
            *line
        } else {
            lines
                .iter()
                .position(|l| *l == task.raw)
                .ok_or_else(|| eyre::eyre!("Task line not found in {}", task.path.display()))?
        };

        match &replacement {
            Some(new_line) => lines[index] = new_line,
            None => {
                lines.remove(index);
            }
        }

        let mut updated = lines.join("\n");
        updated.push('\n');
        fs::write(&task.path, updated).context(format!("Failed to write {}", task.path.display()))?;

        debug!(path = %task.path.display(), line = index, replaced = replacement.is_some(), "Spliced task line");
        self.indexer
            .notify_change(ChangeEvent::new(task.path.clone(), ChangeReason::Modify))
            .await
    }
}
