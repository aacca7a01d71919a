//! Configuration types and loading

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::TaskStatus;

/// Main taskindex configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Corpus location and scanning
    pub corpus: CorpusConfig,

    /// Parser options
    pub parser: ParserConfig,

    /// Metadata inheritance options
    pub augment: AugmentConfig,

    /// Project resolution rules
    pub project: ProjectConfig,

    /// File-inclusion filter rules
    pub filter: FilterConfig,

    /// Worker pool options
    pub workers: WorkerConfig,

    /// Cache and incremental-update tuning
    pub cache: CacheConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Invalid filter or project rules are rejected here, before they can
    /// reach the indexing core.
    pub fn validate(&self) -> Result<()> {
        for rule in &self.filter.rules {
            glob::Pattern::new(&rule.pattern)
                .map_err(|e| eyre::eyre!("Invalid filter pattern '{}': {}", rule.pattern, e))?;
        }

        for mapping in &self.project.path_mappings {
            if mapping.prefix.is_empty() {
                return Err(eyre::eyre!("Project path mapping with empty prefix"));
            }
            if mapping.project.is_empty() {
                return Err(eyre::eyre!(
                    "Project path mapping for '{}' with empty project name",
                    mapping.prefix
                ));
            }
        }

        for (chars, _) in &self.parser.status_chars {
            if chars.chars().count() != 1 {
                return Err(eyre::eyre!("Status mapping key '{}' must be a single character", chars));
            }
        }

        if self.workers.max_workers == 0 {
            return Err(eyre::eyre!("workers.max-workers must be at least 1"));
        }
        if self.workers.parallel_threshold == 0 {
            return Err(eyre::eyre!("workers.parallel-threshold must be at least 1"));
        }

        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .taskindex.yml
        let local_config = PathBuf::from(".taskindex.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/taskindex/taskindex.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("taskindex").join("taskindex.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Resolve the cache directory, defaulting next to the corpus root
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(|| self.corpus.root.join(".taskindex"))
    }
}

/// Corpus location and scanning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorpusConfig {
    /// Root directory of the document corpus
    pub root: PathBuf,

    /// File extensions recognized as documents
    pub extensions: Vec<String>,

    /// Polling source interval in seconds
    #[serde(rename = "poll-interval-secs")]
    pub poll_interval_secs: u64,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            extensions: vec!["md".to_string(), "canvas".to_string()],
            poll_interval_secs: 2,
        }
    }
}

/// Parser options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParserConfig {
    /// Checkbox character to status mapping (keys are single characters)
    #[serde(rename = "status-chars")]
    pub status_chars: BTreeMap<String, TaskStatus>,

    /// Inline metadata marker configuration
    pub markers: MarkerConfig,

    /// Custom date format patterns, tried in order before ISO (%Y-%m-%d)
    #[serde(rename = "date-formats")]
    pub date_formats: Vec<String>,

    /// Tasks under these headings are ignored
    #[serde(rename = "heading-excludes")]
    pub heading_excludes: Vec<String>,

    /// If non-empty, only tasks under these headings are kept
    #[serde(rename = "heading-includes")]
    pub heading_includes: Vec<String>,

    /// Maximum lines processed per document
    #[serde(rename = "max-iterations")]
    pub max_iterations: usize,

    /// Maximum nesting depth
    #[serde(rename = "max-depth")]
    pub max_depth: usize,

    /// Maximum length of a single metadata token or tag
    #[serde(rename = "max-token-len")]
    pub max_token_len: usize,

    /// Header field marking a whole document as a task
    #[serde(rename = "file-task-field")]
    pub file_task_field: String,

    /// Header tags marking a whole document as a task
    #[serde(rename = "file-task-tags")]
    pub file_task_tags: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        let mut status_chars = BTreeMap::new();
        status_chars.insert(" ".to_string(), TaskStatus::Open);
        status_chars.insert("x".to_string(), TaskStatus::Done);
        status_chars.insert("X".to_string(), TaskStatus::Done);
        status_chars.insert("/".to_string(), TaskStatus::InProgress);
        status_chars.insert("-".to_string(), TaskStatus::Cancelled);

        Self {
            status_chars,
            markers: MarkerConfig::default(),
            date_formats: Vec::new(),
            heading_excludes: Vec::new(),
            heading_includes: Vec::new(),
            max_iterations: 10_000,
            max_depth: 16,
            max_token_len: 256,
            file_task_field: "task".to_string(),
            file_task_tags: vec!["task".to_string()],
        }
    }
}

impl ParserConfig {
    /// Map a checkbox character to its status, if configured
    pub fn status_for(&self, c: char) -> Option<TaskStatus> {
        self.status_chars.get(&c.to_string()).copied()
    }

    /// The character rendered for a status (first configured mapping wins)
    pub fn char_for(&self, status: TaskStatus) -> char {
        self.status_chars
            .iter()
            .find(|(_, s)| **s == status)
            .and_then(|(c, _)| c.chars().next())
            .unwrap_or(' ')
    }
}

/// Inline metadata marker configuration
///
/// Each marker introduces a trailing annotated token; the same field names
/// are also recognized in bracketed `[key:: value]` pairs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarkerConfig {
    pub due: String,
    pub start: String,
    pub scheduled: String,
    pub completed: String,
    pub cancelled: String,
    pub recurrence: String,
    pub id: String,
    pub depends: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            due: "📅".to_string(),
            start: "🛫".to_string(),
            scheduled: "⏳".to_string(),
            completed: "✅".to_string(),
            cancelled: "❌".to_string(),
            recurrence: "🔁".to_string(),
            id: "🆔".to_string(),
            depends: "⛔".to_string(),
        }
    }
}

/// Metadata inheritance options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AugmentConfig {
    /// Whether header-metadata inheritance also applies to nested tasks
    /// (false: top-level tasks only)
    #[serde(rename = "inherit-to-children")]
    pub inherit_to_children: bool,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            inherit_to_children: false,
        }
    }
}

/// Project resolution rules
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Explicit per-document overrides (path -> project)
    pub overrides: BTreeMap<String, String>,

    /// Path-prefix to project mapping table, checked in order
    #[serde(rename = "path-mappings")]
    pub path_mappings: Vec<PathMapping>,

    /// Header metadata field naming the project
    #[serde(rename = "header-field")]
    pub header_field: String,

    /// Marker document name searched for in ancestor directories
    #[serde(rename = "marker-file")]
    pub marker_file: String,

    /// Fallback naming strategy
    #[serde(rename = "default-strategy")]
    pub default_strategy: NamingStrategy,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            overrides: BTreeMap::new(),
            path_mappings: Vec::new(),
            header_field: "project".to_string(),
            marker_file: "project.md".to_string(),
            default_strategy: NamingStrategy::ParentDir,
        }
    }
}

/// One path-prefix to project mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathMapping {
    pub prefix: String,
    pub project: String,
}

/// How to derive a project name when no rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NamingStrategy {
    /// Name of the document's parent directory
    #[default]
    ParentDir,
    /// Document filename without extension
    FileStem,
}

/// File-inclusion filter rules
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct FilterConfig {
    pub mode: FilterMode,
    pub rules: Vec<FilterRule>,
}

/// Filter interpretation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Rules name the excluded paths; everything else is included
    #[default]
    Blacklist,
    /// Rules name the included paths; everything else is excluded
    Whitelist,
}

/// One filter rule with its scope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterRule {
    /// Glob pattern matched against the document path
    pub pattern: String,

    /// Which recognition scope the rule applies to
    pub scope: FilterScope,
}

/// Recognition scope a filter rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FilterScope {
    /// Per-line tasks inside documents
    #[default]
    Inline,
    /// Whole-document tasks
    FileTask,
}

/// Worker pool options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Whether parallel parsing is enabled
    pub enabled: bool,

    /// Batch size at which parallel dispatch kicks in
    #[serde(rename = "parallel-threshold")]
    pub parallel_threshold: usize,

    /// Maximum parallel parse workers
    #[serde(rename = "max-workers")]
    pub max_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            parallel_threshold: 5,
            max_workers: 4,
        }
    }
}

/// Cache and incremental-update tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory; defaults to `<corpus-root>/.taskindex`
    pub dir: Option<PathBuf>,

    /// Entry time-to-live in days; 0 disables age-based expiry
    #[serde(rename = "ttl-days")]
    pub ttl_days: u32,

    /// Per-path debounce window in milliseconds
    #[serde(rename = "debounce-ms")]
    pub debounce_ms: u64,

    /// Debounce window before a filter-change restore pass
    #[serde(rename = "restore-debounce-ms")]
    pub restore_debounce_ms: u64,

    /// Documents restored per batch
    #[serde(rename = "restore-batch-size")]
    pub restore_batch_size: usize,

    /// Pause between restore batches in milliseconds
    #[serde(rename = "restore-pause-ms")]
    pub restore_pause_ms: u64,

    /// Documents per batch during full scans
    #[serde(rename = "scan-batch-size")]
    pub scan_batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            ttl_days: 0,
            debounce_ms: 300,
            restore_debounce_ms: 500,
            restore_batch_size: 10,
            restore_pause_ms: 50,
            scan_batch_size: 50,
        }
    }
}
