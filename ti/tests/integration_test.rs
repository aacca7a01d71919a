//! End-to-end tests for the change-event → parse → augment → repository
//! pipeline, including filter prune/restore and batch publication.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::sleep;

use taskindex::config::{Config, FilterConfig, FilterMode, FilterRule, FilterScope, PathMapping};
use taskindex::domain::{TaskKind, TaskStatus};
use taskindex::edit::{TaskDraft, TaskEditor};
use taskindex::events::{ChangeEvent, ChangeReason, IndexEvent};
use taskindex::orchestrator::Indexer;
use taskindex::query::QueryService;
use taskindex::storage::{Storage, SuppressedScope};

/// Config tuned for fast tests: short debounce and restore windows
fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.corpus.root = root.to_path_buf();
    config.cache.debounce_ms = 40;
    config.cache.restore_debounce_ms = 30;
    config.cache.restore_pause_ms = 1;
    config
}

fn write_doc(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Debounce window + processing margin
async fn wait_for_processing() {
    sleep(Duration::from_millis(200)).await;
}

async fn started(config: Config) -> (Indexer, QueryService) {
    let indexer = Indexer::spawn(config).unwrap();
    indexer.initialize().await.unwrap();
    let queries = QueryService::new(indexer.repository());
    (indexer, queries)
}

#[tokio::test]
async fn test_initial_scan_indexes_corpus() {
    let dir = tempfile::TempDir::new().unwrap();
    write_doc(dir.path(), "a.md", "- [ ] Buy milk 📅 2024-01-15\n");
    write_doc(dir.path(), "sub/b.md", "- [x] Done thing\n- [ ] Open thing\n");

    let (indexer, queries) = started(test_config(dir.path())).await;

    let tasks = queries.all_tasks();
    assert_eq!(tasks.len(), 3);

    let milk = tasks.iter().find(|t| t.text == "Buy milk").unwrap();
    assert_eq!(milk.status, TaskStatus::Open);
    assert_eq!(milk.meta.due, chrono::NaiveDate::from_ymd_opt(2024, 1, 15));

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reparse_keeps_task_id_stable() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write_doc(dir.path(), "a.md", "- [ ] Buy milk 📅 2024-01-15\n");

    let (indexer, queries) = started(test_config(dir.path())).await;
    let before = queries.all_tasks();
    assert_eq!(before.len(), 1);

    // Prepend an unrelated line: positions shift, content identity stays
    write_doc(dir.path(), "a.md", "Intro line\n\n- [ ] Buy milk 📅 2024-01-15\n");
    indexer
        .notify_change(ChangeEvent::new(path, ChangeReason::Modify))
        .await
        .unwrap();
    wait_for_processing().await;

    let after = queries.all_tasks();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, before[0].id);
    assert_ne!(after[0].position, before[0].position);

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_path_mapping_inherits_project() {
    let dir = tempfile::TempDir::new().unwrap();
    write_doc(dir.path(), "Projects/Alpha/a.md", "- [ ] Buy milk\n");

    let mut config = test_config(dir.path());
    config.project.path_mappings.push(PathMapping {
        prefix: "Projects/Alpha/".to_string(),
        project: "Alpha".to_string(),
    });

    let (indexer, queries) = started(config).await;
    let tasks = queries.tasks_by_project("Alpha");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "Buy milk");

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_filter_prune_then_restore_converges() {
    let dir = tempfile::TempDir::new().unwrap();
    write_doc(dir.path(), "Projects/Alpha/a.md", "- [ ] Buy milk\n");
    write_doc(dir.path(), "Other/b.md", "- [ ] Keep me\n");

    let config = test_config(dir.path());
    let cache_dir = config.cache_dir();
    let (indexer, queries) = started(config).await;
    let before = queries.all_tasks();
    assert_eq!(before.len(), 2);

    // Exclude Projects/Alpha for inline tasks
    let exclusion = FilterConfig {
        mode: FilterMode::Blacklist,
        rules: vec![FilterRule {
            pattern: "Projects/Alpha/**".to_string(),
            scope: FilterScope::Inline,
        }],
    };
    indexer.set_filter(exclusion).await.unwrap();
    wait_for_processing().await;

    let pruned = queries.all_tasks();
    assert_eq!(pruned.len(), 1);
    assert_eq!(pruned[0].text, "Keep me");

    // The pruned path is remembered in the persisted suppressed set
    let storage = Storage::open(&cache_dir, 0).unwrap();
    let suppressed = storage.load_suppressed(SuppressedScope::Inline);
    assert_eq!(suppressed.len(), 1);
    assert!(suppressed.iter().next().unwrap().ends_with("Projects/Alpha/a.md"));
    drop(storage);

    // Revert to include-all; the debounced restore brings the tasks back
    indexer.set_filter(FilterConfig::default()).await.unwrap();
    sleep(Duration::from_millis(400)).await;

    let restored = queries.all_tasks();
    assert_eq!(restored.len(), 2);
    let milk = restored.iter().find(|t| t.text == "Buy milk").unwrap();
    assert_eq!(milk.id, before.iter().find(|t| t.text == "Buy milk").unwrap().id);

    let storage = Storage::open(&cache_dir, 0).unwrap();
    assert!(storage.load_suppressed(SuppressedScope::Inline).is_empty());

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_batch_of_modified_documents_single_notification() {
    let dir = tempfile::TempDir::new().unwrap();
    for i in 0..20 {
        write_doc(dir.path(), &format!("doc{i:02}.md"), &format!("- [ ] Task {i}\n"));
    }

    let (indexer, queries) = started(test_config(dir.path())).await;
    assert_eq!(queries.all_tasks().len(), 20);

    let mut rx = indexer.subscribe();

    // Modify all 20 and deliver the change events together
    for i in 0..20 {
        let path = write_doc(
            dir.path(),
            &format!("doc{i:02}.md"),
            &format!("- [ ] Task {i} edited\n"),
        );
        indexer
            .notify_change(ChangeEvent::new(path, ChangeReason::Modify))
            .await
            .unwrap();
    }
    wait_for_processing().await;

    match rx.try_recv().unwrap() {
        IndexEvent::IndexChanged { changed_paths, origin_seq } => {
            assert_eq!(changed_paths.len(), 20);
            assert!(origin_seq > 0);
        }
        other => panic!("Wrong event: {other:?}"),
    }
    // One notification for the whole batch
    assert!(rx.try_recv().is_err());
    assert!(queries.all_tasks().iter().all(|t| t.text.ends_with("edited")));

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bad_document_does_not_abort_batch() {
    let dir = tempfile::TempDir::new().unwrap();
    let (indexer, queries) = started(test_config(dir.path())).await;

    for i in 0..6 {
        let path = write_doc(dir.path(), &format!("doc{i}.md"), "- [ ] Fine\n");
        indexer
            .notify_change(ChangeEvent::new(path, ChangeReason::Create))
            .await
            .unwrap();
    }
    let broken = write_doc(dir.path(), "broken.canvas", "this is not canvas JSON");
    indexer
        .notify_change(ChangeEvent::new(broken, ChangeReason::Create))
        .await
        .unwrap();
    wait_for_processing().await;

    // The healthy documents all made it in; the bad one is simply absent
    assert_eq!(queries.all_tasks().len(), 6);

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_delete_removes_tasks() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write_doc(dir.path(), "a.md", "- [ ] Going away\n");

    let (indexer, queries) = started(test_config(dir.path())).await;
    assert_eq!(queries.all_tasks().len(), 1);

    fs::remove_file(&path).unwrap();
    indexer
        .notify_change(ChangeEvent::new(path, ChangeReason::Delete))
        .await
        .unwrap();
    wait_for_processing().await;

    assert!(queries.all_tasks().is_empty());

    // A delete for an unknown path is a no-op, not an error
    indexer
        .notify_change(ChangeEvent::new(dir.path().join("never-existed.md"), ChangeReason::Delete))
        .await
        .unwrap();
    wait_for_processing().await;

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rename_moves_tasks() {
    let dir = tempfile::TempDir::new().unwrap();
    let old = write_doc(dir.path(), "old.md", "- [ ] Travels\n");

    let (indexer, queries) = started(test_config(dir.path())).await;
    assert_eq!(queries.all_tasks().len(), 1);

    let new = dir.path().join("new.md");
    fs::rename(&old, &new).unwrap();
    indexer
        .notify_change(ChangeEvent::new(new.clone(), ChangeReason::Rename { from: old }))
        .await
        .unwrap();
    wait_for_processing().await;

    let tasks = queries.all_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].path, new);

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_no_notification_for_unchanged_content() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write_doc(dir.path(), "a.md", "- [ ] Stable\n");

    let (indexer, _queries) = started(test_config(dir.path())).await;
    let mut rx = indexer.subscribe();

    // Touch the file without changing its meaning
    indexer
        .notify_change(ChangeEvent::new(path, ChangeReason::Modify))
        .await
        .unwrap();
    wait_for_processing().await;

    assert!(rx.try_recv().is_err());

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_external_point_write_converges_without_loop() {
    let dir = tempfile::TempDir::new().unwrap();
    write_doc(dir.path(), "a.md", "- [ ] Converge\n");

    let (indexer, queries) = started(test_config(dir.path())).await;
    let mut task = queries.all_tasks().pop().unwrap();

    // A point write bypassing re-parse (origin seq 0): the orchestrator
    // re-verifies against the file, which still says Open
    task.status = TaskStatus::Done;
    indexer.repository().update_single_task(task.clone()).unwrap();
    sleep(Duration::from_millis(400)).await;

    let settled = queries.task_by_id(&task.id).unwrap();
    assert_eq!(settled.status, TaskStatus::Open);

    // And the system is quiet afterwards: no notification storm
    let mut rx = indexer.subscribe();
    sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err());

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_warm_start_from_consolidated_snapshot() {
    let dir = tempfile::TempDir::new().unwrap();
    write_doc(dir.path(), "a.md", "- [ ] Persisted\n");

    let config = test_config(dir.path());
    let (indexer, queries) = started(config.clone()).await;
    assert_eq!(queries.all_tasks().len(), 1);
    indexer.shutdown().await.unwrap();

    // Second process start trusts the persisted snapshot
    let (indexer, queries) = started(config).await;
    let tasks = queries.all_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "Persisted");

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_file_task_recognition_and_scope_filter() {
    let dir = tempfile::TempDir::new().unwrap();
    write_doc(
        dir.path(),
        "release.md",
        "---\ntask: true\ntitle: Ship the release\ndue: 2024-06-01\n---\n- [ ] Inline step\n",
    );

    let (indexer, queries) = started(test_config(dir.path())).await;
    let tasks = queries.all_tasks();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().any(|t| t.kind == TaskKind::Document && t.text == "Ship the release"));

    // Excluding only the file-task scope keeps the inline task
    let exclusion = FilterConfig {
        mode: FilterMode::Blacklist,
        rules: vec![FilterRule {
            pattern: "**".to_string(),
            scope: FilterScope::FileTask,
        }],
    };
    indexer.set_filter(exclusion).await.unwrap();
    wait_for_processing().await;

    let tasks = queries.all_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].kind, TaskKind::Inline);

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_editor_roundtrip() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("inbox.md");

    let config = test_config(dir.path());
    let parser_config = config.parser.clone();
    let (indexer, queries) = started(config).await;
    let editor = TaskEditor::new(indexer.clone(), parser_config);

    // Create
    editor
        .create_task(&path, TaskDraft::new("Call plumber"))
        .await
        .unwrap();
    wait_for_processing().await;
    let tasks = queries.all_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "Call plumber");

    // Update: completing the task rewrites its line in the file
    let mut task = tasks.into_iter().next().unwrap();
    task.status = TaskStatus::Done;
    editor.update_task(&task).await.unwrap();
    wait_for_processing().await;
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("- [x] Call plumber"));
    assert!(queries.all_tasks().iter().all(|t| t.status == TaskStatus::Done));

    // Delete
    let task = queries.all_tasks().into_iter().next().unwrap();
    editor.delete_task(&task).await.unwrap();
    wait_for_processing().await;
    assert!(queries.all_tasks().is_empty());
    assert!(!fs::read_to_string(&path).unwrap().contains("Call plumber"));

    indexer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_settings_change_clears_tiers_and_rebuilds() {
    let dir = tempfile::TempDir::new().unwrap();
    write_doc(dir.path(), "a.md", "# Archive\n- [ ] Old chore\n# Current\n- [ ] New chore\n");

    let config = test_config(dir.path());
    let (indexer, queries) = started(config.clone()).await;
    assert_eq!(queries.all_tasks().len(), 2);

    // Excluding the Archive heading is a parser-affecting change
    let mut updated = config;
    updated.parser.heading_excludes = vec!["Archive".to_string()];
    indexer.apply_settings(updated).await.unwrap();
    wait_for_processing().await;

    let tasks = queries.all_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "New chore");

    indexer.shutdown().await.unwrap();
}
