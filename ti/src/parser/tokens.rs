//! Inline metadata token extraction
//!
//! Tasks carry metadata in two syntaxes, both recognized on the same line:
//! trailing annotated tokens (`Buy milk 📅 2024-01-15 ⏫`) and bracketed
//! key-value pairs (`Buy milk [due:: 2024-01-15]`). Extraction strips the
//! recognized tokens out of the description and fills a TaskMeta.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::config::ParserConfig;
use crate::domain::{TaskMeta, TaskPriority};

static BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([A-Za-z][A-Za-z0-9_-]*)::\s*([^\]]*)\]").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#([\w/-]+)").unwrap());
static CONTEXT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@([\w/-]+)").unwrap());

/// Priority marker characters, strongest first
const PRIORITY_MARKERS: [(&str, TaskPriority); 5] = [
    ("🔺", TaskPriority::Highest),
    ("⏫", TaskPriority::High),
    ("🔼", TaskPriority::Medium),
    ("🔽", TaskPriority::Low),
    ("⏬", TaskPriority::Lowest),
];

/// A metadata field addressed by a marker or bracket key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Due,
    Start,
    Scheduled,
    Completed,
    Cancelled,
    Recurrence,
    Id,
    Depends,
    Priority,
    Project,
    Context,
}

/// Result of metadata extraction: the cleaned description plus the bag
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub text: String,
    pub meta: TaskMeta,
}

/// Parse a date value, trying configured custom formats before ISO
///
/// A value segment can carry trailing text (the slice runs to the next
/// marker), so when the whole segment fails, the first token is tried too.
pub fn parse_date(value: &str, config: &ParserConfig) -> Option<NaiveDate> {
    let value = value.trim();
    if let Some(date) = parse_date_exact(value, config) {
        return Some(date);
    }
    value
        .split_whitespace()
        .next()
        .and_then(|token| parse_date_exact(token, config))
}

fn parse_date_exact(value: &str, config: &ParserConfig) -> Option<NaiveDate> {
    for format in &config.date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Extract all inline metadata from the text following a checkbox marker
pub fn extract(rest: &str, config: &ParserConfig) -> Extracted {
    let mut meta = TaskMeta::default();

    // Bracketed pairs first; they can appear anywhere in the line
    let mut text = String::with_capacity(rest.len());
    let mut last = 0;
    for caps in BRACKET_RE.captures_iter(rest) {
        let whole = caps.get(0).unwrap();
        let key = caps.get(1).unwrap().as_str();
        let value = caps.get(2).unwrap().as_str();

        if let Some(field) = bracket_field(key) {
            apply(&mut meta, field, value, config);
            text.push_str(&rest[last..whole.start()]);
            last = whole.end();
        }
    }
    text.push_str(&rest[last..]);

    // Trailing annotated tokens: locate every marker, then slice values
    // between consecutive marker positions
    let mut markers: Vec<(usize, usize, Field, Option<TaskPriority>)> = Vec::new();
    for (marker, field) in [
        (config.markers.due.as_str(), Field::Due),
        (config.markers.start.as_str(), Field::Start),
        (config.markers.scheduled.as_str(), Field::Scheduled),
        (config.markers.completed.as_str(), Field::Completed),
        (config.markers.cancelled.as_str(), Field::Cancelled),
        (config.markers.recurrence.as_str(), Field::Recurrence),
        (config.markers.id.as_str(), Field::Id),
        (config.markers.depends.as_str(), Field::Depends),
    ] {
        if marker.is_empty() {
            continue;
        }
        for (pos, m) in text.match_indices(marker) {
            markers.push((pos, m.len(), field, None));
        }
    }
    for (marker, priority) in PRIORITY_MARKERS {
        for (pos, m) in text.match_indices(marker) {
            markers.push((pos, m.len(), Field::Priority, Some(priority)));
        }
    }
    markers.sort_by_key(|(pos, ..)| *pos);

    let description_end = markers.first().map(|(pos, ..)| *pos).unwrap_or(text.len());
    for (i, (pos, len, field, priority)) in markers.iter().enumerate() {
        let value_end = markers.get(i + 1).map(|(next, ..)| *next).unwrap_or(text.len());
        let value = text[pos + len..value_end].trim();
        match priority {
            Some(p) => meta.priority = Some(*p),
            None => apply(&mut meta, *field, value, config),
        }
    }
    let mut description = text[..description_end].to_string();

    // Tags and contexts live in the description proper
    for caps in TAG_RE.captures_iter(&description) {
        let tag = caps.get(1).unwrap().as_str();
        if tag.len() <= config.max_token_len {
            meta.tags.push(tag.to_string());
        }
    }
    if let Some(caps) = CONTEXT_RE.captures(&description) {
        let context = caps.get(1).unwrap().as_str();
        if context.len() <= config.max_token_len {
            meta.context = Some(context.to_string());
        }
    }
    description = TAG_RE.replace_all(&description, "").to_string();
    description = CONTEXT_RE.replace_all(&description, "").to_string();

    Extracted {
        text: collapse_whitespace(&description),
        meta,
    }
}

fn bracket_field(key: &str) -> Option<Field> {
    match key.to_lowercase().as_str() {
        "due" => Some(Field::Due),
        "start" => Some(Field::Start),
        "scheduled" => Some(Field::Scheduled),
        "completed" | "completion" | "done" => Some(Field::Completed),
        "cancelled" => Some(Field::Cancelled),
        "repeat" | "recurrence" => Some(Field::Recurrence),
        "id" => Some(Field::Id),
        "depends" | "dependson" => Some(Field::Depends),
        "priority" => Some(Field::Priority),
        "project" => Some(Field::Project),
        "context" => Some(Field::Context),
        _ => None,
    }
}

fn apply(meta: &mut TaskMeta, field: Field, value: &str, config: &ParserConfig) {
    // Value-length ceiling: an overlong value is dropped, not truncated
    if value.len() > config.max_token_len {
        return;
    }

    match field {
        Field::Due => meta.due = parse_date(value, config).or(meta.due),
        Field::Start => meta.start = parse_date(value, config).or(meta.start),
        Field::Scheduled => meta.scheduled = parse_date(value, config).or(meta.scheduled),
        Field::Completed => meta.completed = parse_date(value, config).or(meta.completed),
        Field::Cancelled => meta.cancelled = parse_date(value, config).or(meta.cancelled),
        Field::Recurrence => {
            if !value.is_empty() {
                meta.recurrence = Some(value.to_string());
            }
        }
        Field::Id => {
            if !value.is_empty() {
                meta.alias = Some(value.to_string());
            }
        }
        Field::Depends => {
            meta.depends_on
                .extend(value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from));
        }
        Field::Priority => {
            meta.priority = match value.to_lowercase().as_str() {
                "highest" => Some(TaskPriority::Highest),
                "high" => Some(TaskPriority::High),
                "medium" | "normal" => Some(TaskPriority::Medium),
                "low" => Some(TaskPriority::Low),
                "lowest" => Some(TaskPriority::Lowest),
                _ => meta.priority,
            };
        }
        Field::Project => {
            if !value.is_empty() {
                meta.project = Some(value.to_string());
            }
        }
        Field::Context => {
            if !value.is_empty() {
                meta.context = Some(value.to_string());
            }
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ParserConfig {
        ParserConfig::default()
    }

    #[test]
    fn test_emoji_due_date() {
        let out = extract("Buy milk 📅 2024-01-15", &config());
        assert_eq!(out.text, "Buy milk");
        assert_eq!(out.meta.due, NaiveDate::from_ymd_opt(2024, 1, 15));
    }

    #[test]
    fn test_bracket_due_date() {
        let out = extract("Buy milk [due:: 2024-01-15]", &config());
        assert_eq!(out.text, "Buy milk");
        assert_eq!(out.meta.due, NaiveDate::from_ymd_opt(2024, 1, 15));
    }

    #[test]
    fn test_multiple_emoji_tokens() {
        let out = extract("Ship release 🛫 2024-02-01 📅 2024-02-10 ⏫", &config());
        assert_eq!(out.text, "Ship release");
        assert_eq!(out.meta.start, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(out.meta.due, NaiveDate::from_ymd_opt(2024, 2, 10));
        assert_eq!(out.meta.priority, Some(TaskPriority::High));
    }

    #[test]
    fn test_recurrence_value_runs_to_next_marker() {
        let out = extract("Water plants 🔁 every week 📅 2024-03-01", &config());
        assert_eq!(out.meta.recurrence.as_deref(), Some("every week"));
        assert_eq!(out.meta.due, NaiveDate::from_ymd_opt(2024, 3, 1));
    }

    #[test]
    fn test_tags_and_context() {
        let out = extract("Call plumber #home #urgent @phone", &config());
        assert_eq!(out.text, "Call plumber");
        assert_eq!(out.meta.tags, vec!["home", "urgent"]);
        assert_eq!(out.meta.context.as_deref(), Some("phone"));
    }

    #[test]
    fn test_depends_list() {
        let out = extract("Deploy ⛔ abc123, def456", &config());
        assert_eq!(out.meta.depends_on, vec!["abc123", "def456"]);
    }

    #[test]
    fn test_id_alias() {
        let out = extract("Review PR 🆔 review-pr-1", &config());
        assert_eq!(out.meta.alias.as_deref(), Some("review-pr-1"));
    }

    #[test]
    fn test_bracket_priority_by_name() {
        let out = extract("Fix bug [priority:: high]", &config());
        assert_eq!(out.meta.priority, Some(TaskPriority::High));
    }

    #[test]
    fn test_custom_date_format() {
        let mut config = config();
        config.date_formats = vec!["%d/%m/%Y".to_string()];
        let out = extract("Pay rent 📅 15/01/2024", &config);
        assert_eq!(out.meta.due, NaiveDate::from_ymd_opt(2024, 1, 15));
    }

    #[test]
    fn test_invalid_date_ignored() {
        let out = extract("Buy milk 📅 someday", &config());
        assert!(out.meta.due.is_none());
    }

    #[test]
    fn test_overlong_value_dropped() {
        let line = "Task 🔁 a very long recurrence description";
        let out = extract(line, &config());
        assert_eq!(out.meta.recurrence.as_deref(), Some("a very long recurrence description"));

        let mut capped = config();
        capped.max_token_len = 8;
        let out = extract(line, &capped);
        assert!(out.meta.recurrence.is_none());
    }

    #[test]
    fn test_unknown_bracket_key_left_in_text() {
        let out = extract("Task [custom:: value]", &config());
        assert_eq!(out.text, "Task [custom:: value]");
    }

    #[test]
    fn test_plain_text_untouched() {
        let out = extract("Just a task", &config());
        assert_eq!(out.text, "Just a task");
        assert_eq!(out.meta, TaskMeta::default());
    }
}
