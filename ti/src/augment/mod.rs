//! Metadata inheritance
//!
//! Merges raw task records with document-header metadata and resolved
//! project data. A task's own explicit field always wins; inheritance only
//! fills fields the task did not set, and arbitrary extra fields land in
//! the `inherited` map without touching anything explicit.

use crate::domain::{HeaderMeta, TaskRecord};
use crate::project::ResolvedProject;

/// Header keys that are structural rather than inheritable
const RESERVED_HEADER_KEYS: [&str; 8] = [
    "title", "task", "status", "project", "tags", "due", "start", "scheduled",
];

/// Everything the merge needs for one document
pub struct AugmentContext<'a> {
    pub raw: Vec<TaskRecord>,
    pub header: &'a HeaderMeta,
    pub project: &'a ResolvedProject,
    /// Whether header-metadata inheritance also reaches nested tasks.
    /// Honored per call - the flag can change between calls.
    pub inherit_to_children: bool,
}

/// Merge inherited metadata into raw task records
pub fn merge(ctx: AugmentContext<'_>) -> Vec<TaskRecord> {
    let AugmentContext {
        raw,
        header,
        project,
        inherit_to_children,
    } = ctx;

    raw.into_iter()
        .map(|mut task| {
            // Project identity is per-document and reaches every task
            if task.meta.project.is_none() && !project.name.is_empty() {
                task.meta.project = Some(project.name.clone());
            }

            let header_eligible = inherit_to_children || task.parent.is_none();
            if header_eligible {
                inherit_header(&mut task, header);
            }

            // Enhanced project metadata fills after header values
            for (key, value) in &project.enhanced {
                if RESERVED_HEADER_KEYS.contains(&key.as_str()) {
                    continue;
                }
                task.meta
                    .inherited
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }

            task
        })
        .collect()
}

fn inherit_header(task: &mut TaskRecord, header: &HeaderMeta) {
    if task.meta.context.is_none() {
        if let Some(context) = header.get("context") {
            if !context.is_empty() {
                task.meta.context = Some(context.clone());
            }
        }
    }

    if let Some(tags) = header.get("tags") {
        for tag in tags.split(',') {
            let tag = tag.trim().trim_start_matches('#');
            if !tag.is_empty() && !task.meta.tags.iter().any(|t| t == tag) {
                task.meta.tags.push(tag.to_string());
            }
        }
    }

    for (key, value) in header {
        if RESERVED_HEADER_KEYS.contains(&key.as_str()) || key == "context" {
            continue;
        }
        task.meta
            .inherited
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskPosition, task_id};
    use std::path::PathBuf;

    fn task(text: &str, parent: Option<&str>) -> TaskRecord {
        let path = PathBuf::from("a.md");
        let mut record = TaskRecord::new(
            task_id(&path, text, 0),
            &path,
            TaskPosition::Line { line: 0, occurrence: 0 },
        );
        record.text = text.to_string();
        record.parent = parent.map(String::from);
        record
    }

    #[test]
    fn test_project_fills_unset() {
        let project = ResolvedProject::named("Alpha");
        let merged = merge(AugmentContext {
            raw: vec![task("One", None)],
            header: &HeaderMeta::new(),
            project: &project,
            inherit_to_children: false,
        });
        assert_eq!(merged[0].meta.project.as_deref(), Some("Alpha"));
    }

    #[test]
    fn test_explicit_project_wins() {
        let project = ResolvedProject::named("Alpha");
        let mut explicit = task("One", None);
        explicit.meta.project = Some("Beta".to_string());

        let merged = merge(AugmentContext {
            raw: vec![explicit],
            header: &HeaderMeta::new(),
            project: &project,
            inherit_to_children: false,
        });
        assert_eq!(merged[0].meta.project.as_deref(), Some("Beta"));
    }

    #[test]
    fn test_header_inheritance_top_level_only() {
        let mut header = HeaderMeta::new();
        header.insert("context".to_string(), "office".to_string());
        let project = ResolvedProject::named("Alpha");

        let merged = merge(AugmentContext {
            raw: vec![task("Parent", None), task("Child", Some("parent-id"))],
            header: &header,
            project: &project,
            inherit_to_children: false,
        });
        assert_eq!(merged[0].meta.context.as_deref(), Some("office"));
        assert!(merged[1].meta.context.is_none());
        // Project still reaches the child
        assert_eq!(merged[1].meta.project.as_deref(), Some("Alpha"));
    }

    #[test]
    fn test_header_inheritance_to_children() {
        let mut header = HeaderMeta::new();
        header.insert("context".to_string(), "office".to_string());
        let project = ResolvedProject::named("Alpha");

        let merged = merge(AugmentContext {
            raw: vec![task("Child", Some("parent-id"))],
            header: &header,
            project: &project,
            inherit_to_children: true,
        });
        assert_eq!(merged[0].meta.context.as_deref(), Some("office"));
    }

    #[test]
    fn test_header_tags_merge_without_duplicates() {
        let mut header = HeaderMeta::new();
        header.insert("tags".to_string(), "home, urgent".to_string());
        let project = ResolvedProject::named("Alpha");

        let mut tagged = task("One", None);
        tagged.meta.tags.push("home".to_string());

        let merged = merge(AugmentContext {
            raw: vec![tagged],
            header: &header,
            project: &project,
            inherit_to_children: false,
        });
        assert_eq!(merged[0].meta.tags, vec!["home", "urgent"]);
    }

    #[test]
    fn test_arbitrary_header_fields_inherited() {
        let mut header = HeaderMeta::new();
        header.insert("area".to_string(), "health".to_string());
        let project = ResolvedProject::named("Alpha");

        let merged = merge(AugmentContext {
            raw: vec![task("One", None)],
            header: &header,
            project: &project,
            inherit_to_children: false,
        });
        assert_eq!(merged[0].meta.inherited.get("area").map(String::as_str), Some("health"));
    }

    #[test]
    fn test_enhanced_project_metadata_fills_after_header() {
        let mut header = HeaderMeta::new();
        header.insert("owner".to_string(), "from-header".to_string());

        let mut project = ResolvedProject::named("Alpha");
        project.enhanced.insert("owner".to_string(), "from-project".to_string());
        project.enhanced.insert("budget".to_string(), "large".to_string());

        let merged = merge(AugmentContext {
            raw: vec![task("One", None)],
            header: &header,
            project: &project,
            inherit_to_children: false,
        });
        assert_eq!(
            merged[0].meta.inherited.get("owner").map(String::as_str),
            Some("from-header")
        );
        assert_eq!(
            merged[0].meta.inherited.get("budget").map(String::as_str),
            Some("large")
        );
    }

    #[test]
    fn test_augmentation_preserves_raw_fields() {
        let project = ResolvedProject::named("Alpha");
        let mut original = task("One", None);
        original.raw = "- [ ] One".to_string();
        original.meta.tags.push("keep".to_string());

        let merged = merge(AugmentContext {
            raw: vec![original.clone()],
            header: &HeaderMeta::new(),
            project: &project,
            inherit_to_children: false,
        });
        assert_eq!(merged[0].raw, original.raw);
        assert_eq!(merged[0].text, original.text);
        assert!(merged[0].meta.tags.contains(&"keep".to_string()));
    }
}
