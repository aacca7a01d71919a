//! Read-only query surface
//!
//! Every query returns a snapshot of the current index; none blocks on
//! pending writes. UI and protocol layers consume the index exclusively
//! through this service.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::{DateField, TaskId, TaskRecord};
use crate::repository::Repository;

/// Snapshot queries over the consolidated index
#[derive(Clone)]
pub struct QueryService {
    repository: Arc<Repository>,
}

impl QueryService {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    /// Every indexed task, ordered by path then position
    pub fn all_tasks(&self) -> Vec<TaskRecord> {
        self.repository.all_tasks()
    }

    /// Tasks belonging to the given project
    pub fn tasks_by_project(&self, project: &str) -> Vec<TaskRecord> {
        self.repository
            .all_tasks()
            .into_iter()
            .filter(|t| t.meta.project.as_deref() == Some(project))
            .collect()
    }

    /// Tasks whose chosen date field lies within `[from, to]`
    pub fn tasks_by_date_range(&self, from: NaiveDate, to: NaiveDate, field: DateField) -> Vec<TaskRecord> {
        self.repository
            .all_tasks()
            .into_iter()
            .filter(|t| t.date(field).is_some_and(|d| d >= from && d <= to))
            .collect()
    }

    /// Point lookup by task id
    pub fn task_by_id(&self, id: &TaskId) -> Option<TaskRecord> {
        self.repository.task_by_id(id)
    }

    /// All project and context names currently present in the index
    pub fn projects_and_contexts(&self) -> (Vec<String>, Vec<String>) {
        let mut projects = BTreeSet::new();
        let mut contexts = BTreeSet::new();
        for task in self.repository.all_tasks() {
            if let Some(project) = &task.meta.project {
                projects.insert(project.clone());
            }
            if let Some(context) = &task.meta.context {
                contexts.insert(context.clone());
            }
        }
        (projects.into_iter().collect(), contexts.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskPosition, task_id};
    use crate::events::EventBus;
    use crate::storage::Storage;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn service() -> (TempDir, Arc<Repository>, QueryService) {
        let dir = TempDir::new().unwrap();
        let bus = Arc::new(EventBus::default());
        let storage = Arc::new(Storage::open(dir.path().join("cache"), 0).unwrap());
        let repository = Arc::new(Repository::new(bus, storage));
        let queries = QueryService::new(repository.clone());
        (dir, repository, queries)
    }

    fn task(path: &str, text: &str, project: Option<&str>, due: Option<NaiveDate>) -> TaskRecord {
        let path = PathBuf::from(path);
        let mut record = TaskRecord::new(
            task_id(&path, text, 0),
            &path,
            TaskPosition::Line { line: 0, occurrence: 0 },
        );
        record.text = text.to_string();
        record.meta.project = project.map(String::from);
        record.meta.due = due;
        record
    }

    #[test]
    fn test_tasks_by_project() {
        let (_dir, repo, queries) = service();
        repo.update_file(
            &PathBuf::from("a.md"),
            vec![
                task("a.md", "One", Some("Alpha"), None),
                task("a.md", "Two", Some("Beta"), None),
            ],
            None,
        );

        let alpha = queries.tasks_by_project("Alpha");
        assert_eq!(alpha.len(), 1);
        assert_eq!(alpha[0].text, "One");
        assert!(queries.tasks_by_project("Gamma").is_empty());
    }

    #[test]
    fn test_tasks_by_date_range_inclusive() {
        let (_dir, repo, queries) = service();
        let date = |d: u32| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        repo.update_file(
            &PathBuf::from("a.md"),
            vec![
                task("a.md", "Early", None, Some(date(5))),
                task("a.md", "Mid", None, Some(date(15))),
                task("a.md", "Late", None, Some(date(25))),
                task("a.md", "Undated", None, None),
            ],
            None,
        );

        let hits = queries.tasks_by_date_range(date(5), date(15), DateField::Due);
        let texts: Vec<&str> = hits.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["Early", "Mid"]);
    }

    #[test]
    fn test_projects_and_contexts() {
        let (_dir, repo, queries) = service();
        let mut with_context = task("a.md", "One", Some("Alpha"), None);
        with_context.meta.context = Some("office".to_string());
        repo.update_file(
            &PathBuf::from("a.md"),
            vec![with_context, task("a.md", "Two", Some("Beta"), None)],
            None,
        );

        let (projects, contexts) = queries.projects_and_contexts();
        assert_eq!(projects, vec!["Alpha", "Beta"]);
        assert_eq!(contexts, vec!["office"]);
    }

    #[test]
    fn test_task_by_id() {
        let (_dir, repo, queries) = service();
        let record = task("a.md", "One", None, None);
        repo.update_file(&PathBuf::from("a.md"), vec![record.clone()], None);

        assert_eq!(queries.task_by_id(&record.id).unwrap().text, "One");
        assert!(queries.task_by_id(&"missing".to_string()).is_none());
    }
}
