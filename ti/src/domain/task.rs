//! Task record types
//!
//! A TaskRecord is a single actionable item extracted from a document. Records
//! are produced by the parser, enriched by the augmentor, and published
//! through the repository. Parsing is deterministic, so a record carries no
//! wall-clock state of its own.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stable identifier of a task, derived from document path and content
pub type TaskId = String;

/// Document-header metadata (frontmatter), as a flat string map
pub type HeaderMeta = BTreeMap<String, String>;

/// Completion state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet started
    #[default]
    Open,
    /// Being worked on
    InProgress,
    /// Successfully completed
    Done,
    /// Abandoned
    Cancelled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Done => write!(f, "done"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Whether a record represents one line of a document or the whole document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Inline,
    Document,
}

/// Where in its document a task was found
///
/// The occurrence counter disambiguates identical lines; line numbers are
/// informational only and never participate in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPosition {
    /// A line in a plain-text document
    Line { line: usize, occurrence: usize },
    /// A text node in a node-graph document
    Node { node_id: String, line: usize, occurrence: usize },
}

impl TaskPosition {
    pub fn line(&self) -> usize {
        match self {
            Self::Line { line, .. } | Self::Node { line, .. } => *line,
        }
    }
}

/// Urgency of the task itself (distinct from parse scheduling priority)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Lowest,
    Low,
    Medium,
    High,
    Highest,
}

/// Date fields a task can carry, addressable by queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateField {
    Due,
    Start,
    Scheduled,
    Completed,
    Cancelled,
}

impl std::str::FromStr for DateField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "due" => Ok(Self::Due),
            "start" => Ok(Self::Start),
            "scheduled" => Ok(Self::Scheduled),
            "completed" | "done" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown date field: {}", s)),
        }
    }
}

/// Metadata bag attached to a task
///
/// Fields set by the task's own text are "explicit"; the augmentor only ever
/// fills fields that are unset here, and arbitrary inherited values land in
/// `inherited` rather than overwriting anything.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskMeta {
    pub due: Option<NaiveDate>,
    pub start: Option<NaiveDate>,
    pub scheduled: Option<NaiveDate>,
    pub completed: Option<NaiveDate>,
    pub cancelled: Option<NaiveDate>,
    pub priority: Option<TaskPriority>,
    pub tags: Vec<String>,
    pub project: Option<String>,
    pub context: Option<String>,
    /// Recurrence rule, verbatim (e.g. "every week")
    pub recurrence: Option<String>,
    /// Ids of tasks that must complete first
    pub depends_on: Vec<TaskId>,
    /// Explicit id alias written in the document
    pub alias: Option<String>,
    /// Arbitrary fields inherited from header or project metadata
    pub inherited: BTreeMap<String, String>,
}

/// A single actionable item extracted from a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Stable content-derived identifier
    pub id: TaskId,

    /// Owning document path
    pub path: PathBuf,

    /// Position within the document
    pub position: TaskPosition,

    /// Inline line or whole-document task
    pub kind: TaskKind,

    /// Completion state
    pub status: TaskStatus,

    /// Description with markers and metadata tokens stripped
    pub text: String,

    /// Verbatim source line
    pub raw: String,

    /// Indentation depth (number of nesting levels)
    pub indent: usize,

    /// Parent task id, for nested tasks
    pub parent: Option<TaskId>,

    /// Child task ids
    pub children: Vec<TaskId>,

    /// Metadata bag
    pub meta: TaskMeta,
}

impl TaskRecord {
    /// Create a record with the given identity and defaults elsewhere
    pub fn new(id: TaskId, path: impl Into<PathBuf>, position: TaskPosition) -> Self {
        Self {
            id,
            path: path.into(),
            position,
            kind: TaskKind::Inline,
            status: TaskStatus::Open,
            text: String::new(),
            raw: String::new(),
            indent: 0,
            parent: None,
            children: Vec::new(),
            meta: TaskMeta::default(),
        }
    }

    /// Whether the task is in a terminal state
    pub fn is_closed(&self) -> bool {
        matches!(self.status, TaskStatus::Done | TaskStatus::Cancelled)
    }

    /// Read one of the task's date fields
    pub fn date(&self, field: DateField) -> Option<NaiveDate> {
        match field {
            DateField::Due => self.meta.due,
            DateField::Start => self.meta.start,
            DateField::Scheduled => self.meta.scheduled,
            DateField::Completed => self.meta.completed,
            DateField::Cancelled => self.meta.cancelled,
        }
    }
}
