//! Inclusion filter evaluation
//!
//! Filter rules are glob patterns over corpus-relative paths, each scoped
//! to inline or whole-document task recognition. The two scopes are
//! evaluated independently: a document can be inline-excluded while its
//! document task stays included, and vice versa.

use std::path::{Path, PathBuf};

use crate::config::{FilterConfig, FilterMode, FilterScope};
use crate::error::IndexError;

/// Compiled filter rules for fast per-path checks
pub struct FilterEngine {
    mode: FilterMode,
    rules: Vec<(glob::Pattern, FilterScope)>,
    corpus_root: PathBuf,
}

impl FilterEngine {
    pub fn new(config: &FilterConfig, corpus_root: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let rules = config
            .rules
            .iter()
            .map(|rule| {
                glob::Pattern::new(&rule.pattern)
                    .map(|p| (p, rule.scope))
                    .map_err(|e| IndexError::Config(format!("invalid filter pattern '{}': {}", rule.pattern, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            mode: config.mode,
            rules,
            corpus_root: corpus_root.into(),
        })
    }

    /// Whether tasks of the given scope are included for this path
    ///
    /// In whitelist mode a scope with no rules at all stays fully included
    /// rather than excluding the whole corpus.
    pub fn includes(&self, path: &Path, scope: FilterScope) -> bool {
        let relative = path.strip_prefix(&self.corpus_root).unwrap_or(path);
        let scoped: Vec<&glob::Pattern> = self
            .rules
            .iter()
            .filter(|(_, s)| *s == scope)
            .map(|(p, _)| p)
            .collect();

        let matched = scoped.iter().any(|p| p.matches_path(relative));
        match self.mode {
            FilterMode::Blacklist => !matched,
            FilterMode::Whitelist => scoped.is_empty() || matched,
        }
    }

    /// Whether both scopes are excluded, i.e. the path needs no parsing
    pub fn fully_excluded(&self, path: &Path) -> bool {
        !self.includes(path, FilterScope::Inline) && !self.includes(path, FilterScope::FileTask)
    }
}
