//! Orchestrator actor implementation

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tiercache::{fingerprint, now_ms};

use crate::augment::{self, AugmentContext};
use crate::config::{Config, FilterConfig, FilterScope};
use crate::domain::{HeaderMeta, Priority, TaskKind, TaskRecord};
use crate::error::IndexError;
use crate::events::{ChangeEvent, ChangeReason, EventBus, IndexEvent, SeqAllocator};
use crate::parser::{self, DocumentKind, Parser};
use crate::project::ProjectResolver;
use crate::repository::{BatchOptions, Repository};
use crate::storage::{AugmentedPayload, ProjectPayload, RawPayload, Storage, SuppressedScope};
use crate::workers::{ParseJob, WorkerOrchestrator};

use super::debounce::Debouncer;
use super::filter::FilterEngine;
use super::Command;

/// How many of our own origin sequences we remember for echo detection
const ISSUED_SEQ_CAP: usize = 256;

/// A document's current on-disk state
struct DocSource {
    content: String,
    fingerprint: u64,
    mtime_ms: i64,
}

/// The coordinating actor; owns every mutable pipeline piece
pub(crate) struct Orchestrator {
    config: Config,
    storage: Arc<Storage>,
    repository: Arc<Repository>,
    bus: Arc<EventBus>,
    seq: SeqAllocator,
    self_tx: mpsc::Sender<Command>,
    workers: WorkerOrchestrator,
    resolver: ProjectResolver,
    filter: FilterEngine,
    debouncer: Debouncer<PathBuf, ChangeReason>,
    ready: Vec<(PathBuf, ChangeReason)>,
    flush_scheduled: bool,
    restore_generation: u64,
    suppressed_inline: BTreeSet<PathBuf>,
    suppressed_file: BTreeSet<PathBuf>,
    issued_seqs: BTreeSet<u64>,
}

impl Orchestrator {
    pub(crate) fn new(
        config: Config,
        storage: Arc<Storage>,
        repository: Arc<Repository>,
        bus: Arc<EventBus>,
        self_tx: mpsc::Sender<Command>,
    ) -> Result<Self> {
        let parser = Parser::new(config.parser.clone());
        let workers = WorkerOrchestrator::new(parser, &config.workers);
        let resolver = ProjectResolver::new(config.project.clone(), &config.corpus.root);
        let filter = FilterEngine::new(&config.filter, &config.corpus.root)?;
        let debouncer = Debouncer::new(Duration::from_millis(config.cache.debounce_ms));

        Ok(Self {
            config,
            storage,
            repository,
            bus,
            seq: SeqAllocator::new(),
            self_tx,
            workers,
            resolver,
            filter,
            debouncer,
            ready: Vec::new(),
            flush_scheduled: false,
            restore_generation: 0,
            suppressed_inline: BTreeSet::new(),
            suppressed_file: BTreeSet::new(),
            issued_seqs: BTreeSet::new(),
        })
    }

    /// Run the actor until shutdown
    pub(crate) async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!("Orchestrator started");

        while let Some(command) = rx.recv().await {
            match command {
                Command::Initialize { reply } => {
                    self.initialize().await;
                    let _ = reply.send(());
                }
                Command::Change(event) => self.handle_change(event),
                Command::DebounceFired { path, generation } => {
                    if let Some(reason) = self.debouncer.fire(&path, generation) {
                        self.ready.push((path, reason));
                        self.schedule_flush();
                    }
                }
                Command::FlushReady => self.flush_ready().await,
                Command::FilterChanged(filter) => self.handle_filter_changed(filter),
                Command::RestoreFired { generation } => self.handle_restore_fired(generation).await,
                Command::SettingsChanged(config) => self.handle_settings_changed(*config).await,
                Command::Rebuild { reply } => {
                    self.rebuild().await;
                    let _ = reply.send(());
                }
                Command::Notification(event) => self.handle_notification(event),
                Command::Shutdown { reply } => {
                    self.persist_suppressed();
                    self.storage.store_consolidated(&self.repository.snapshot());
                    let _ = reply.send(());
                    break;
                }
            }
        }

        info!("Orchestrator stopped");
    }

    // === Lifecycle ===

    async fn initialize(&mut self) {
        self.suppressed_inline = self.storage.load_suppressed(SuppressedScope::Inline);
        self.suppressed_file = self.storage.load_suppressed(SuppressedScope::FileTask);

        let warm = self.storage.load_consolidated().filter(|p| !p.files.is_empty());
        match warm {
            Some(payload) => {
                info!(files = payload.files.len(), "Warm start from consolidated snapshot");
                self.repository.load_snapshot(payload);
            }
            None => {
                info!("Cold start, scanning corpus");
                self.full_scan(Priority::Low).await;
            }
        }

        self.bus.emit(IndexEvent::CacheReady {
            initial: true,
            timestamp_ms: now_ms(),
        });
    }

    async fn rebuild(&mut self) {
        info!("Rebuilding index");
        self.full_scan(Priority::Normal).await;
        self.bus.emit(IndexEvent::CacheReady {
            initial: false,
            timestamp_ms: now_ms(),
        });
    }

    async fn full_scan(&mut self, priority: Priority) {
        let paths = self.scan_corpus();
        let known: HashSet<PathBuf> = paths.iter().cloned().collect();

        // Documents that disappeared since the last run
        for indexed in self.repository.indexed_paths() {
            if !known.contains(&indexed) {
                self.remove_document(&indexed);
            }
        }

        let batch_size = self.config.cache.scan_batch_size.max(1);
        for batch in paths.chunks(batch_size) {
            self.index_batch(batch.to_vec(), priority).await;
        }

        self.storage.store_consolidated(&self.repository.snapshot());
    }

    fn scan_corpus(&self) -> Vec<PathBuf> {
        let extensions = &self.config.corpus.extensions;
        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(&self.config.corpus.root)
            .into_iter()
            .filter_entry(|e| {
                // Dot-directories hold caches and host metadata, never corpus
                // (the root itself is always entered, whatever its name)
                e.depth() == 0 || !(e.file_type().is_dir() && e.file_name().to_string_lossy().starts_with('.'))
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| extensions.iter().any(|x| x == e))
            })
            .collect();
        paths.sort();
        paths
    }

    // === Incremental updates ===

    fn handle_change(&mut self, event: ChangeEvent) {
        debug!(path = %event.path.display(), reason = ?event.reason, "Change event");
        let generation = self.debouncer.trigger(event.path.clone(), event.reason);
        let window = self.debouncer.window();
        let tx = self.self_tx.clone();
        let path = event.path;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx.send(Command::DebounceFired { path, generation }).await;
        });
    }

    /// Queue a flush a short gather window after the first debounce fire,
    /// so changes that land together get processed as one batch. Events
    /// arriving in the same debounce window fire within it, so half the
    /// window is enough to collect them all.
    fn schedule_flush(&mut self) {
        if self.flush_scheduled {
            return;
        }
        self.flush_scheduled = true;
        let gather = self.debouncer.window() / 2;
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(gather).await;
            let _ = tx.send(Command::FlushReady).await;
        });
    }

    async fn flush_ready(&mut self) {
        self.flush_scheduled = false;
        if self.ready.is_empty() {
            return;
        }

        // Last event per path wins
        let mut latest: HashMap<PathBuf, ChangeReason> = HashMap::new();
        for (path, reason) in std::mem::take(&mut self.ready) {
            latest.insert(path, reason);
        }

        let mut to_index = Vec::new();
        for (path, reason) in latest {
            match reason {
                ChangeReason::Delete => self.remove_document(&path),
                ChangeReason::Rename { from } => {
                    self.remove_document(&from);
                    to_index.push(path);
                }
                _ => to_index.push(path),
            }
        }
        to_index.sort();

        if !to_index.is_empty() {
            self.index_batch(to_index, Priority::High).await;
        }
    }

    async fn index_batch(&mut self, paths: Vec<PathBuf>, priority: Priority) {
        let mut updates: HashMap<PathBuf, Vec<TaskRecord>> = HashMap::new();
        let mut sources: HashMap<PathBuf, DocSource> = HashMap::new();
        let mut headers: HashMap<PathBuf, HeaderMeta> = HashMap::new();
        let mut raw_ready: Vec<(PathBuf, Vec<TaskRecord>)> = Vec::new();
        let mut jobs: Vec<ParseJob> = Vec::new();

        for path in paths {
            let Some(source) = read_document(&path) else {
                self.remove_document(&path);
                continue;
            };
            if self.filter.fully_excluded(&path) {
                continue;
            }

            // Augmented tier short-circuit
            if let Some(entry) = self.storage.load_augmented(&path) {
                if self.storage.is_valid(&entry, source.fingerprint, source.mtime_ms) {
                    let published = self.scope_filter(&path, entry.payload.tasks);
                    updates.insert(path, published);
                    continue;
                }
            }

            // Raw tier
            if let Some(entry) = self.storage.load_raw(&path) {
                if self.storage.is_valid(&entry, source.fingerprint, source.mtime_ms) {
                    headers.insert(path.clone(), entry.payload.header);
                    raw_ready.push((path.clone(), entry.payload.tasks));
                    sources.insert(path, source);
                    continue;
                }
            }

            let header = header_of(&path, &source.content);
            jobs.push(ParseJob {
                path: path.clone(),
                content: source.content.clone(),
                header: header.clone(),
            });
            headers.insert(path.clone(), header);
            sources.insert(path, source);
        }

        // Parse misses, in parallel when the batch warrants it
        let results = self.workers.parse_many(jobs, priority).await;
        for (path, result) in results {
            match result {
                Ok(tasks) => {
                    let source = &sources[&path];
                    let header = headers.get(&path).cloned().unwrap_or_default();
                    self.storage.store_raw(
                        &path,
                        &RawPayload {
                            tasks: tasks.clone(),
                            header,
                            snapshot: source.content.clone(),
                        },
                        source.fingerprint,
                        source.mtime_ms,
                    );
                    raw_ready.push((path, tasks));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Parse failed, skipping document this cycle");
                }
            }
        }

        // Augment everything that made it through the raw stage
        for (path, raw_tasks) in raw_ready {
            let source = &sources[&path];
            let header = headers.get(&path).cloned().unwrap_or_default();
            let full = self.augment_and_store(&path, source, &header, raw_tasks);
            let published = self.scope_filter(&path, full);
            updates.insert(path, published);
        }

        if !updates.is_empty() {
            let seq = self.issue_seq();
            self.repository.update_batch(
                updates,
                Some(seq),
                BatchOptions {
                    persist: true,
                    force_emit: false,
                },
            );
        }
    }

    /// Single-document pipeline with the cache preference order:
    /// augmented tier, raw tier plus re-augment, full re-parse
    async fn build_records(&mut self, path: &Path, source: &DocSource) -> Result<Vec<TaskRecord>, IndexError> {
        if let Some(entry) = self.storage.load_augmented(path) {
            if self.storage.is_valid(&entry, source.fingerprint, source.mtime_ms) {
                return Ok(entry.payload.tasks);
            }
        }

        let (header, raw_tasks) = {
            let cached = self.storage.load_raw(path).filter(|entry| {
                self.storage.is_valid(entry, source.fingerprint, source.mtime_ms)
            });
            match cached {
                Some(entry) => (entry.payload.header, entry.payload.tasks),
                None => {
                    let header = header_of(path, &source.content);
                    let job = ParseJob {
                        path: path.to_path_buf(),
                        content: source.content.clone(),
                        header: header.clone(),
                    };
                    let tasks = self.workers.parse_one(job, Priority::High).await?;
                    self.storage.store_raw(
                        path,
                        &RawPayload {
                            tasks: tasks.clone(),
                            header: header.clone(),
                            snapshot: source.content.clone(),
                        },
                        source.fingerprint,
                        source.mtime_ms,
                    );
                    (header, tasks)
                }
            }
        };

        Ok(self.augment_and_store(path, source, &header, raw_tasks))
    }

    /// Resolve, merge, recognize the file task, persist the downstream tiers
    fn augment_and_store(
        &mut self,
        path: &Path,
        source: &DocSource,
        header: &HeaderMeta,
        raw_tasks: Vec<TaskRecord>,
    ) -> Vec<TaskRecord> {
        let project = self.resolver.resolve(path, header);
        self.storage.store_project(
            path,
            &ProjectPayload {
                project: project.clone(),
            },
            source.fingerprint,
            source.mtime_ms,
        );

        let mut full = raw_tasks;
        if let Some(file_task) = parser::file_task(path, header, self.workers.parser().config()) {
            full.push(file_task);
        }

        let augmented = augment::merge(AugmentContext {
            raw: full,
            header,
            project: &project,
            inherit_to_children: self.config.augment.inherit_to_children,
        });

        self.storage.store_augmented(
            path,
            &AugmentedPayload {
                tasks: augmented.clone(),
            },
            source.fingerprint,
            source.mtime_ms,
        );

        augmented
    }

    /// Drop records whose recognition scope the filter currently excludes
    fn scope_filter(&self, path: &Path, tasks: Vec<TaskRecord>) -> Vec<TaskRecord> {
        let inline = self.filter.includes(path, FilterScope::Inline);
        let file = self.filter.includes(path, FilterScope::FileTask);
        tasks
            .into_iter()
            .filter(|t| match t.kind {
                TaskKind::Inline => inline,
                TaskKind::Document => file,
            })
            .collect()
    }

    fn remove_document(&mut self, path: &Path) {
        let seq = self.issue_seq();
        self.repository.remove_file(path, Some(seq));
        self.storage.remove_document(path);

        let mut dirty = self.suppressed_inline.remove(path);
        dirty |= self.suppressed_file.remove(path);
        if dirty {
            self.persist_suppressed();
        }
    }

    // === Filter prune/restore ===

    fn handle_filter_changed(&mut self, filter: FilterConfig) {
        let engine = match FilterEngine::new(&filter, &self.config.corpus.root) {
            Ok(engine) => engine,
            Err(e) => {
                warn!(error = %e, "Rejected invalid filter rules");
                return;
            }
        };
        info!(rules = filter.rules.len(), mode = ?filter.mode, "Filter rules changed");
        self.config.filter = filter;
        self.filter = engine;

        self.prune();
        self.schedule_restore();
    }

    /// Immediately drop now-excluded records, remembering their paths
    fn prune(&mut self) {
        for path in self.repository.indexed_paths() {
            let tasks = self.repository.tasks_for_path(&path);
            let inline_ok = self.filter.includes(&path, FilterScope::Inline);
            let file_ok = self.filter.includes(&path, FilterScope::FileTask);
            let had_inline = tasks.iter().any(|t| t.kind == TaskKind::Inline);
            let had_file = tasks.iter().any(|t| t.kind == TaskKind::Document);

            if (inline_ok || !had_inline) && (file_ok || !had_file) {
                continue;
            }

            if !inline_ok && had_inline {
                self.suppressed_inline.insert(path.clone());
            }
            if !file_ok && had_file {
                self.suppressed_file.insert(path.clone());
            }

            let kept = self.scope_filter(&path, tasks);
            // Forced: consumers must react even if bytes happen to coincide
            let seq = self.issue_seq();
            self.repository.update_file_forced(&path, kept, Some(seq));
        }

        self.persist_suppressed();
    }

    fn schedule_restore(&mut self) {
        self.restore_generation += 1;
        let generation = self.restore_generation;
        let delay = Duration::from_millis(self.config.cache.restore_debounce_ms);
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Command::RestoreFired { generation }).await;
        });
    }

    /// Debounced restoration of suppressed paths the rules now allow,
    /// in small batches with an inter-batch pause
    async fn handle_restore_fired(&mut self, generation: u64) {
        if generation != self.restore_generation {
            // Superseded by a newer filter change
            return;
        }

        let mut candidates: BTreeSet<PathBuf> = BTreeSet::new();
        candidates.extend(
            self.suppressed_inline
                .iter()
                .filter(|p| self.filter.includes(p, FilterScope::Inline))
                .cloned(),
        );
        candidates.extend(
            self.suppressed_file
                .iter()
                .filter(|p| self.filter.includes(p, FilterScope::FileTask))
                .cloned(),
        );
        if candidates.is_empty() {
            return;
        }
        info!(count = candidates.len(), "Restoring filtered documents");

        let candidates: Vec<PathBuf> = candidates.into_iter().collect();
        let batch_size = self.config.cache.restore_batch_size.max(1);
        let pause = Duration::from_millis(self.config.cache.restore_pause_ms);

        for batch in candidates.chunks(batch_size) {
            for path in batch {
                self.restore_path(path).await;
            }
            self.persist_suppressed();
            tokio::time::sleep(pause).await;
        }
    }

    async fn restore_path(&mut self, path: &Path) {
        let Some(source) = read_document(path) else {
            // Vanished while suppressed: nothing left to restore
            self.suppressed_inline.remove(path);
            self.suppressed_file.remove(path);
            return;
        };

        // build_records embodies the restore preference order
        match self.build_records(path, &source).await {
            Ok(records) => {
                let published = self.scope_filter(path, records);
                let seq = self.issue_seq();
                self.repository.update_file(path, published, Some(seq));

                if self.filter.includes(path, FilterScope::Inline) {
                    self.suppressed_inline.remove(path);
                }
                if self.filter.includes(path, FilterScope::FileTask) {
                    self.suppressed_file.remove(path);
                }
            }
            Err(e) => {
                // Stays suppressed; the next restore pass retries
                warn!(path = %path.display(), error = %e, "Restore failed");
            }
        }
    }

    fn persist_suppressed(&self) {
        self.storage.save_suppressed(SuppressedScope::Inline, &self.suppressed_inline);
        self.storage.save_suppressed(SuppressedScope::FileTask, &self.suppressed_file);
    }

    // === Settings ===

    async fn handle_settings_changed(&mut self, new: Config) {
        if let Err(e) = new.validate() {
            warn!(error = %e, "Rejected invalid settings snapshot");
            return;
        }

        let old = std::mem::replace(&mut self.config, new);
        let new = &self.config;
        let mut rebuild = false;

        if new.parser != old.parser {
            info!("Parser settings changed, clearing raw and augmented tiers");
            self.storage.clear_raw();
            self.storage.clear_augmented();
            self.workers.set_parser(Parser::new(new.parser.clone()));
            rebuild = true;
        }

        if new.project != old.project || new.augment != old.augment {
            info!("Project/augment settings changed, clearing augmented and project tiers");
            self.storage.clear_augmented();
            self.storage.clear_project();
            self.resolver.set_config(new.project.clone());
            rebuild = true;
        }

        if new.workers != old.workers {
            self.workers = WorkerOrchestrator::new(Parser::new(new.parser.clone()), &new.workers);
        }

        if new.corpus != old.corpus {
            self.resolver = ProjectResolver::new(new.project.clone(), &new.corpus.root);
            rebuild = true;
        }

        if new.cache.debounce_ms != old.cache.debounce_ms {
            self.debouncer = Debouncer::new(Duration::from_millis(new.cache.debounce_ms));
        }

        let filter_changed = new.filter != old.filter;
        let filter = new.filter.clone();

        if rebuild {
            // Recompile the filter before rescanning so the rebuild
            // publishes with the new rules
            if let Ok(engine) = FilterEngine::new(&filter, &self.config.corpus.root) {
                self.filter = engine;
            }
            self.rebuild().await;
        } else if filter_changed {
            self.handle_filter_changed(filter);
        }
    }

    // === Echo suppression ===

    fn handle_notification(&mut self, event: IndexEvent) {
        let IndexEvent::IndexChanged { changed_paths, origin_seq } = event else {
            return;
        };

        if origin_seq != 0 && self.issued_seqs.remove(&origin_seq) {
            debug!(origin_seq, "Discarded own echo");
            return;
        }

        // An external point write (interactive edit bypassing re-parse):
        // schedule a debounced re-verify so index and documents converge.
        // Convergence is guaranteed because an identical re-parse result
        // produces no further notification.
        debug!(origin_seq, paths = changed_paths.len(), "External index change, re-verifying");
        for path in changed_paths {
            self.handle_change(ChangeEvent::new(path, ChangeReason::Modify));
        }
    }

    fn issue_seq(&mut self) -> u64 {
        let seq = self.seq.next();
        self.issued_seqs.insert(seq);
        while self.issued_seqs.len() > ISSUED_SEQ_CAP {
            self.issued_seqs.pop_first();
        }
        seq
    }
}

/// Read a document's content and provenance off disk
fn read_document(path: &Path) -> Option<DocSource> {
    let content = fs::read_to_string(path).ok()?;
    let mtime_ms = fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    Some(DocSource {
        fingerprint: fingerprint(content.as_bytes()),
        content,
        mtime_ms,
    })
}

/// Header metadata for a document, by kind
fn header_of(path: &Path, content: &str) -> HeaderMeta {
    match DocumentKind::of(path) {
        DocumentKind::Markdown => parser::extract_frontmatter(content).0,
        DocumentKind::Canvas => HeaderMeta::new(),
    }
}
