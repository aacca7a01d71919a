//! Task ID derivation
//!
//! Ids use the format: `{12-char-hex}-{slug}` where the hex portion hashes
//! the owning document path, the normalized task text, and the occurrence
//! index among identical texts within the document. Line numbers are
//! deliberately excluded so that ids survive edits that shift lines.

use std::hash::{Hash, Hasher};
use std::path::Path;

use super::task::TaskId;

const SLUG_MAX: usize = 32;

/// Derive the stable id for a task
///
/// `occurrence` counts prior tasks in the same document with identical
/// normalized text, so duplicated lines get distinct ids in document order.
pub fn task_id(path: &Path, text: &str, occurrence: usize) -> TaskId {
    let normalized = normalize(text);

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    path.to_string_lossy().hash(&mut hasher);
    normalized.hash(&mut hasher);
    occurrence.hash(&mut hasher);
    let digest = hasher.finish();

    let slug = slugify(&normalized);
    if slug.is_empty() {
        format!("{:012x}", digest & 0xffff_ffff_ffff)
    } else {
        format!("{:012x}-{}", digest & 0xffff_ffff_ffff, slug)
    }
}

/// Collapse whitespace so formatting-only edits keep the id stable
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Slugify task text for the readable portion of an id
pub fn slugify(text: &str) -> String {
    let slug = text
        .to_lowercase()
        .chars()
        // Strip apostrophes entirely, replace other non-alphanumeric with hyphens
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.len() <= SLUG_MAX {
        return slug;
    }

    // Truncate at a word boundary
    match slug[..SLUG_MAX].rfind('-') {
        Some(cut) => slug[..cut].to_string(),
        None => slug[..SLUG_MAX].to_string(),
    }
}
