//! Markdown task parsing
//!
//! Recognizes checkbox list items, nested child tasks via indentation,
//! heading-scoped include/exclude rules, and YAML frontmatter headers.
//! Parsing is pure: identical input always yields identical records.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::config::ParserConfig;
use crate::domain::{HeaderMeta, TaskKind, TaskPosition, TaskPriority, TaskRecord, TaskStatus, task_id};

use super::tokens;

static TASK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<indent>[ \t]*)[-*+]\s+\[(?P<status>.)\]\s+(?P<rest>.*)$").unwrap());
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?P<level>#{1,6})\s+(?P<text>.*)$").unwrap());

/// Split YAML frontmatter off a document
///
/// Returns the flattened header map and the number of leading lines the
/// frontmatter block occupies (0 when there is none). Malformed YAML is
/// treated as no header.
pub fn extract_frontmatter(content: &str) -> (HeaderMeta, usize) {
    let mut lines = content.lines();
    if lines.next() != Some("---") {
        return (HeaderMeta::new(), 0);
    }

    let mut yaml_lines = Vec::new();
    let mut consumed = 1;
    for line in lines {
        consumed += 1;
        if line == "---" {
            let yaml = yaml_lines.join("\n");
            return match serde_yaml::from_str::<serde_yaml::Value>(&yaml) {
                Ok(value) => (flatten_header(&value), consumed),
                Err(e) => {
                    warn!(error = %e, "Malformed frontmatter, ignoring header");
                    (HeaderMeta::new(), consumed)
                }
            };
        }
        yaml_lines.push(line);
    }

    // Unterminated frontmatter block: not a header at all
    (HeaderMeta::new(), 0)
}

fn flatten_header(value: &serde_yaml::Value) -> HeaderMeta {
    let mut header = HeaderMeta::new();
    let Some(mapping) = value.as_mapping() else {
        return header;
    };

    for (key, value) in mapping {
        let Some(key) = key.as_str() else { continue };
        if let Some(rendered) = scalar_to_string(value) {
            header.insert(key.to_string(), rendered);
        }
    }
    header
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Sequence(items) => Some(
            items
                .iter()
                .filter_map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        _ => None,
    }
}

/// Parse the task lines of a document body
///
/// `line_offset` keeps positions absolute when frontmatter was stripped;
/// `occurrences` and `iterations` are shared across the blocks of one
/// document so ids and ceilings behave identically for plain-text and
/// node-graph documents.
pub fn parse_body(
    body: &str,
    line_offset: usize,
    path: &Path,
    config: &ParserConfig,
    occurrences: &mut HashMap<String, usize>,
    iterations: &mut usize,
    node_id: Option<&str>,
) -> Vec<TaskRecord> {
    let mut tasks: Vec<TaskRecord> = Vec::new();
    // (indent width, index into tasks) for the current nesting chain
    let mut parents: Vec<(usize, usize)> = Vec::new();
    let mut headings: Vec<(usize, String)> = Vec::new();

    for (i, line) in body.lines().enumerate() {
        *iterations += 1;
        if *iterations > config.max_iterations {
            warn!(path = %path.display(), limit = config.max_iterations, "Parse iteration ceiling hit, returning partial results");
            break;
        }

        if let Some(caps) = HEADING_RE.captures(line) {
            let level = caps.name("level").unwrap().as_str().len();
            let text = caps.name("text").unwrap().as_str().trim().to_string();
            while headings.last().is_some_and(|(l, _)| *l >= level) {
                headings.pop();
            }
            headings.push((level, text));
            parents.clear();
            continue;
        }

        let Some(caps) = TASK_RE.captures(line) else {
            // A flush-left non-task line ends the current nesting chain
            if !line.trim().is_empty() && !line.starts_with([' ', '\t']) {
                parents.clear();
            }
            continue;
        };

        if !heading_allowed(&headings, config) {
            continue;
        }

        let indent = caps.name("indent").unwrap().as_str().chars().count();
        let status_char = caps.name("status").unwrap().as_str().chars().next().unwrap_or(' ');
        let rest = caps.name("rest").unwrap().as_str();

        while parents.last().is_some_and(|(width, _)| *width >= indent) {
            parents.pop();
        }
        if parents.len() >= config.max_depth {
            warn!(path = %path.display(), limit = config.max_depth, "Nesting depth ceiling hit, returning partial results");
            break;
        }

        let extracted = tokens::extract(rest, config);
        let occurrence = {
            let count = occurrences.entry(extracted.text.clone()).or_insert(0);
            let occurrence = *count;
            *count += 1;
            occurrence
        };

        let line_number = line_offset + i;
        let position = match node_id {
            Some(node_id) => TaskPosition::Node {
                node_id: node_id.to_string(),
                line: line_number,
                occurrence,
            },
            None => TaskPosition::Line {
                line: line_number,
                occurrence,
            },
        };

        let mut record = TaskRecord::new(task_id(path, &extracted.text, occurrence), path, position);
        record.status = config.status_for(status_char).unwrap_or(TaskStatus::Open);
        record.text = extracted.text;
        record.raw = line.to_string();
        record.indent = indent;
        record.meta = extracted.meta;

        if let Some(&(_, parent_idx)) = parents.last() {
            record.parent = Some(tasks[parent_idx].id.clone());
            let child_id = record.id.clone();
            tasks[parent_idx].children.push(child_id);
        }

        parents.push((indent, tasks.len()));
        tasks.push(record);
    }

    tasks
}

fn heading_allowed(headings: &[(usize, String)], config: &ParserConfig) -> bool {
    if headings
        .iter()
        .any(|(_, h)| config.heading_excludes.iter().any(|e| h.eq_ignore_ascii_case(e)))
    {
        return false;
    }
    if !config.heading_includes.is_empty() {
        return headings
            .iter()
            .any(|(_, h)| config.heading_includes.iter().any(|e| h.eq_ignore_ascii_case(e)));
    }
    true
}

/// Recognize a whole document as a single task from its header
pub fn file_task(path: &Path, header: &HeaderMeta, config: &ParserConfig) -> Option<TaskRecord> {
    let field_marked = header
        .get(&config.file_task_field)
        .is_some_and(|v| matches!(v.to_lowercase().as_str(), "true" | "yes" | "1"));
    let tag_marked = header.get("tags").is_some_and(|tags| {
        tags.split(',')
            .map(|t| t.trim().trim_start_matches('#'))
            .any(|t| config.file_task_tags.iter().any(|m| t.eq_ignore_ascii_case(m)))
    });
    if !field_marked && !tag_marked {
        return None;
    }

    let text = header
        .get("title")
        .cloned()
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().to_string()))
        .unwrap_or_default();

    let mut record = TaskRecord::new(
        task_id(path, &text, 0),
        path,
        TaskPosition::Line { line: 0, occurrence: 0 },
    );
    record.kind = TaskKind::Document;
    record.text = text.clone();
    record.raw = text;
    record.status = header
        .get("status")
        .map(|s| match s.to_lowercase().as_str() {
            "done" | "complete" | "completed" => TaskStatus::Done,
            "cancelled" => TaskStatus::Cancelled,
            "in_progress" | "in-progress" => TaskStatus::InProgress,
            _ => TaskStatus::Open,
        })
        .unwrap_or(TaskStatus::Open);
    record.meta.due = header.get("due").and_then(|v| tokens::parse_date(v, config));
    record.meta.start = header.get("start").and_then(|v| tokens::parse_date(v, config));
    record.meta.scheduled = header.get("scheduled").and_then(|v| tokens::parse_date(v, config));

    Some(record)
}

/// Render a task record back into its markdown source line
///
/// Used by the write API to splice edited tasks into documents; the output
/// re-parses to an equal record.
pub fn render_line(task: &TaskRecord, config: &ParserConfig) -> String {
    let mut line = String::new();
    line.push_str(&" ".repeat(task.indent));
    line.push_str("- [");
    line.push(config.char_for(task.status));
    line.push_str("] ");
    line.push_str(&task.text);

    for tag in &task.meta.tags {
        line.push_str(&format!(" #{tag}"));
    }
    if let Some(context) = &task.meta.context {
        line.push_str(&format!(" @{context}"));
    }
    if let Some(priority) = task.meta.priority {
        line.push(' ');
        line.push_str(priority_marker(priority));
    }
    if let Some(recurrence) = &task.meta.recurrence {
        line.push_str(&format!(" {} {}", config.markers.recurrence, recurrence));
    }
    if let Some(alias) = &task.meta.alias {
        line.push_str(&format!(" {} {}", config.markers.id, alias));
    }
    if !task.meta.depends_on.is_empty() {
        line.push_str(&format!(" {} {}", config.markers.depends, task.meta.depends_on.join(", ")));
    }
    if let Some(date) = task.meta.start {
        line.push_str(&format!(" {} {}", config.markers.start, date.format("%Y-%m-%d")));
    }
    if let Some(date) = task.meta.scheduled {
        line.push_str(&format!(" {} {}", config.markers.scheduled, date.format("%Y-%m-%d")));
    }
    if let Some(date) = task.meta.due {
        line.push_str(&format!(" {} {}", config.markers.due, date.format("%Y-%m-%d")));
    }
    if let Some(date) = task.meta.completed {
        line.push_str(&format!(" {} {}", config.markers.completed, date.format("%Y-%m-%d")));
    }
    if let Some(date) = task.meta.cancelled {
        line.push_str(&format!(" {} {}", config.markers.cancelled, date.format("%Y-%m-%d")));
    }

    line
}

fn priority_marker(priority: TaskPriority) -> &'static str {
    match priority {
        TaskPriority::Highest => "🔺",
        TaskPriority::High => "⏫",
        TaskPriority::Medium => "🔼",
        TaskPriority::Low => "🔽",
        TaskPriority::Lowest => "⏬",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(content: &str) -> Vec<TaskRecord> {
        let config = ParserConfig::default();
        let path = PathBuf::from("notes/todo.md");
        let mut occurrences = HashMap::new();
        let mut iterations = 0;
        parse_body(content, 0, &path, &config, &mut occurrences, &mut iterations, None)
    }

    #[test]
    fn test_basic_task() {
        let tasks = parse("- [ ] Buy milk 📅 2024-01-15\n");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Open);
        assert_eq!(tasks[0].text, "Buy milk");
        assert_eq!(
            tasks[0].meta.due,
            chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
        );
    }

    #[test]
    fn test_status_characters() {
        let tasks = parse("- [x] Done\n- [/] Doing\n- [-] Dropped\n- [?] Weird\n");
        assert_eq!(tasks[0].status, TaskStatus::Done);
        assert_eq!(tasks[1].status, TaskStatus::InProgress);
        assert_eq!(tasks[2].status, TaskStatus::Cancelled);
        assert_eq!(tasks[3].status, TaskStatus::Open);
    }

    #[test]
    fn test_nested_tasks() {
        let tasks = parse("- [ ] Parent\n    - [ ] Child\n        - [ ] Grandchild\n- [ ] Sibling\n");
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[1].parent, Some(tasks[0].id.clone()));
        assert_eq!(tasks[2].parent, Some(tasks[1].id.clone()));
        assert!(tasks[3].parent.is_none());
        assert_eq!(tasks[0].children, vec![tasks[1].id.clone()]);
    }

    #[test]
    fn test_ids_stable_across_line_shift() {
        let before = parse("- [ ] Buy milk\n");
        let after = parse("Some new intro line\n\n- [ ] Buy milk\n");
        assert_eq!(before[0].id, after[0].id);
        assert_ne!(before[0].position, after[0].position);
    }

    #[test]
    fn test_duplicate_lines_get_distinct_ids() {
        let tasks = parse("- [ ] Buy milk\n- [ ] Buy milk\n");
        assert_eq!(tasks.len(), 2);
        assert_ne!(tasks[0].id, tasks[1].id);
    }

    #[test]
    fn test_heading_exclude() {
        let mut config = ParserConfig::default();
        config.heading_excludes = vec!["Archive".to_string()];
        let content = "# Active\n- [ ] Keep\n# Archive\n- [ ] Skip\n";
        let mut occurrences = HashMap::new();
        let mut iterations = 0;
        let tasks = parse_body(
            content,
            0,
            &PathBuf::from("a.md"),
            &config,
            &mut occurrences,
            &mut iterations,
            None,
        );
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].text, "Keep");
    }

    #[test]
    fn test_heading_include_exclusive() {
        let mut config = ParserConfig::default();
        config.heading_includes = vec!["Tasks".to_string()];
        let content = "- [ ] Loose\n# Tasks\n- [ ] Kept\n# Notes\n- [ ] Skipped\n";
        let mut occurrences = HashMap::new();
        let mut iterations = 0;
        let tasks = parse_body(
            content,
            0,
            &PathBuf::from("a.md"),
            &config,
            &mut occurrences,
            &mut iterations,
            None,
        );
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].text, "Kept");
    }

    #[test]
    fn test_iteration_ceiling_returns_partial() {
        let mut config = ParserConfig::default();
        config.max_iterations = 2;
        let content = "- [ ] One\n- [ ] Two\n- [ ] Three\n";
        let mut occurrences = HashMap::new();
        let mut iterations = 0;
        let tasks = parse_body(
            content,
            0,
            &PathBuf::from("a.md"),
            &config,
            &mut occurrences,
            &mut iterations,
            None,
        );
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn test_depth_ceiling_returns_partial() {
        let mut config = ParserConfig::default();
        config.max_depth = 2;
        let content = "- [ ] A\n  - [ ] B\n    - [ ] C\n";
        let mut occurrences = HashMap::new();
        let mut iterations = 0;
        let tasks = parse_body(
            content,
            0,
            &PathBuf::from("a.md"),
            &config,
            &mut occurrences,
            &mut iterations,
            None,
        );
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn test_frontmatter_extraction() {
        let content = "---\nproject: Alpha\ntags:\n  - task\n  - home\ncount: 3\n---\n- [ ] Task\n";
        let (header, consumed) = extract_frontmatter(content);
        assert_eq!(consumed, 7);
        assert_eq!(header.get("project").map(String::as_str), Some("Alpha"));
        assert_eq!(header.get("tags").map(String::as_str), Some("task, home"));
        assert_eq!(header.get("count").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_no_frontmatter() {
        let (header, consumed) = extract_frontmatter("- [ ] Task\n");
        assert!(header.is_empty());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn test_malformed_frontmatter_ignored() {
        let content = "---\n: [ not yaml\n---\n- [ ] Task\n";
        let (header, consumed) = extract_frontmatter(content);
        assert!(header.is_empty());
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_file_task_from_header_field() {
        let config = ParserConfig::default();
        let mut header = HeaderMeta::new();
        header.insert("task".to_string(), "true".to_string());
        header.insert("title".to_string(), "Ship the release".to_string());
        header.insert("due".to_string(), "2024-06-01".to_string());

        let record = file_task(&PathBuf::from("notes/release.md"), &header, &config).unwrap();
        assert_eq!(record.kind, TaskKind::Document);
        assert_eq!(record.text, "Ship the release");
        assert_eq!(record.meta.due, chrono::NaiveDate::from_ymd_opt(2024, 6, 1));
    }

    #[test]
    fn test_file_task_from_tag() {
        let config = ParserConfig::default();
        let mut header = HeaderMeta::new();
        header.insert("tags".to_string(), "#task, notes".to_string());

        let record = file_task(&PathBuf::from("notes/release.md"), &header, &config).unwrap();
        assert_eq!(record.kind, TaskKind::Document);
        assert_eq!(record.text, "release");
    }

    #[test]
    fn test_not_a_file_task() {
        let config = ParserConfig::default();
        let header = HeaderMeta::new();
        assert!(file_task(&PathBuf::from("notes/a.md"), &header, &config).is_none());
    }

    #[test]
    fn test_render_line_roundtrip() {
        let config = ParserConfig::default();
        let tasks = parse("- [x] Ship it #release ⏫ 🛫 2024-02-01 📅 2024-02-10\n");
        let rendered = render_line(&tasks[0], &config);
        let reparsed = parse(&format!("{rendered}\n"));
        assert_eq!(reparsed[0].text, tasks[0].text);
        assert_eq!(reparsed[0].status, tasks[0].status);
        assert_eq!(reparsed[0].meta, tasks[0].meta);
    }
}
