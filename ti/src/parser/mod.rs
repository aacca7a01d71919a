//! Document parsing
//!
//! The parser is a pure function from document content to task records:
//! no I/O, no clock, no shared state. Determinism is what makes the
//! fingerprint-based cache tiers sound.

mod canvas;
mod markdown;
mod tokens;

use std::collections::HashMap;
use std::path::Path;

use crate::config::ParserConfig;
use crate::domain::{HeaderMeta, TaskRecord};
use crate::error::IndexError;

pub use markdown::{extract_frontmatter, file_task, render_line};
pub use tokens::parse_date;

/// Kind of document, decided by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Markdown,
    Canvas,
}

impl DocumentKind {
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("canvas") => Self::Canvas,
            _ => Self::Markdown,
        }
    }
}

/// Task parser for one configuration snapshot
///
/// Cheap to clone; worker threads each take their own copy.
#[derive(Debug, Clone)]
pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse a document into its ordered task records
    ///
    /// The header argument keeps the contract explicit: records come out
    /// raw, header inheritance happens later in the augmentor.
    pub fn parse(&self, content: &str, path: &Path, _header: &HeaderMeta) -> Result<Vec<TaskRecord>, IndexError> {
        match DocumentKind::of(path) {
            DocumentKind::Markdown => {
                let skip = markdown::extract_frontmatter(content).1;
                let body: String = content
                    .lines()
                    .skip(skip)
                    .map(|l| format!("{l}\n"))
                    .collect();

                let mut occurrences = HashMap::new();
                let mut iterations = 0;
                Ok(markdown::parse_body(
                    &body,
                    skip,
                    path,
                    &self.config,
                    &mut occurrences,
                    &mut iterations,
                    None,
                ))
            }
            DocumentKind::Canvas => canvas::parse_canvas(content, path, &self.config),
        }
    }

    /// Extract header metadata and parse in one step
    pub fn parse_document(&self, content: &str, path: &Path) -> Result<(HeaderMeta, Vec<TaskRecord>), IndexError> {
        let header = match DocumentKind::of(path) {
            DocumentKind::Markdown => markdown::extract_frontmatter(content).0,
            DocumentKind::Canvas => HeaderMeta::new(),
        };
        let tasks = self.parse(content, path, &header)?;
        Ok((header, tasks))
    }
}
