//! Project resolution
//!
//! Maps a document path to its inherited project identity and any enhanced
//! metadata contributed by marker documents. Resolution order:
//! explicit override, path-prefix mapping, document-header field,
//! nearest-ancestor marker document, then the default naming strategy.
//! Results are cached per path; the cache must be cleared whenever any of
//! the rule tables change.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{NamingStrategy, ProjectConfig};
use crate::domain::HeaderMeta;
use crate::parser::extract_frontmatter;

/// Resolved project identity plus enhanced metadata
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResolvedProject {
    pub name: String,
    /// Extra fields from marker documents, inherited into tasks
    pub enhanced: BTreeMap<String, String>,
}

impl ResolvedProject {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enhanced: BTreeMap::new(),
        }
    }
}

/// Per-path project resolver with an explicit-invalidate cache
pub struct ProjectResolver {
    config: ProjectConfig,
    corpus_root: PathBuf,
    cache: HashMap<PathBuf, ResolvedProject>,
}

impl ProjectResolver {
    pub fn new(config: ProjectConfig, corpus_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            corpus_root: corpus_root.into(),
            cache: HashMap::new(),
        }
    }

    /// Resolve the project for a document
    ///
    /// The document's header is passed in because header-field resolution
    /// sits between the mapping table and the marker-file fallback.
    pub fn resolve(&mut self, path: &Path, header: &HeaderMeta) -> ResolvedProject {
        if let Some(cached) = self.cache.get(path) {
            return cached.clone();
        }

        let resolved = self.resolve_uncached(path, header);
        debug!(path = %path.display(), project = %resolved.name, "Resolved project");
        self.cache.insert(path.to_path_buf(), resolved.clone());
        resolved
    }

    /// Drop all cached resolutions
    ///
    /// Must be called whenever overrides, mappings, or marker configuration
    /// change; resolution is otherwise assumed stable for a path.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Replace the rule tables and invalidate the cache
    pub fn set_config(&mut self, config: ProjectConfig) {
        self.config = config;
        self.clear_cache();
    }

    fn resolve_uncached(&self, path: &Path, header: &HeaderMeta) -> ResolvedProject {
        let relative = self.relative_key(path);

        // 1. Explicit per-document override
        if let Some(name) = self.config.overrides.get(&relative) {
            return ResolvedProject::named(name.clone());
        }

        // 2. Path-prefix mapping table, first match wins
        for mapping in &self.config.path_mappings {
            if relative.starts_with(&mapping.prefix) {
                return ResolvedProject::named(mapping.project.clone());
            }
        }

        // 3. Document-header field
        if let Some(name) = header.get(&self.config.header_field) {
            if !name.is_empty() {
                return ResolvedProject::named(name.clone());
            }
        }

        // 4. Nearest-ancestor marker document
        if let Some(resolved) = self.resolve_from_marker(path) {
            return resolved;
        }

        // 5. Default naming strategy
        let name = match self.config.default_strategy {
            NamingStrategy::ParentDir => path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string()),
            NamingStrategy::FileStem => path.file_stem().map(|n| n.to_string_lossy().to_string()),
        }
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Unsorted".to_string());

        ResolvedProject::named(name)
    }

    fn resolve_from_marker(&self, path: &Path) -> Option<ResolvedProject> {
        let mut dir = path.parent()?;
        loop {
            let marker = dir.join(&self.config.marker_file);
            if marker.is_file() {
                let content = fs::read_to_string(&marker).ok()?;
                let (marker_header, _) = extract_frontmatter(&content);
                let name = marker_header
                    .get(&self.config.header_field)
                    .or_else(|| marker_header.get("name"))
                    .cloned()
                    .or_else(|| dir.file_name().map(|n| n.to_string_lossy().to_string()))?;
                return Some(ResolvedProject {
                    name,
                    enhanced: marker_header,
                });
            }

            if dir == self.corpus_root || dir.parent().is_none() {
                return None;
            }
            dir = dir.parent()?;
        }
    }

    fn relative_key(&self, path: &Path) -> String {
        path.strip_prefix(&self.corpus_root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}
