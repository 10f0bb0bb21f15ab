//! The typechecker: owner of the committed `GlobalState` and the index
//! caches, executor of the fast and slow paths.
//!
//! Every operation runs on a single dedicated thread (see
//! [`TypecheckerCoordinator`]); the message loop talks to it exclusively
//! through submitted closures. A slow path works on a deep copy of the
//! state and either swaps it in at commit or discards it when a preempting
//! edit cancelled it, leaving the previously committed state untouched.

use std::thread::JoinHandle;

use beryl_ast::ParsedFile;
use beryl_core::files::{FileRef, FileType};
use beryl_core::{File, GlobalState, Query, QueryResponse};
use beryl_pipeline::FileHash;
use crossbeam_channel::Sender;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

use crate::client::{Client, RunStatus, TypecheckRunInfo};
use crate::preemption::PreemptionManager;
use crate::updates::FileUpdates;

/// The serial executor state. Lives on the typechecker thread.
pub struct Typechecker {
    gs: GlobalState,
    /// A pristine builtins-only snapshot sharing `gs`'s epoch state; every
    /// slow path deep-copies it so the symbol table rebuilds from scratch.
    initial_gs: GlobalState,
    /// Trees indexed against the base state, never mutated after creation.
    indexed: Vec<Option<ParsedFile>>,
    /// Trees against the post-resolve state, used to serve queries.
    indexed_final_gs: FxHashMap<u32, ParsedFile>,
    /// Per-file hashes driving fast-path selection.
    file_hashes: Vec<FileHash>,
    client: Client,
    preemption: Arc<PreemptionManager>,
    initialized: bool,
}

enum Decision {
    Fast {
        entries: Vec<FastEntry>,
        changed: Vec<u64>,
    },
    Slow,
}

struct FastEntry {
    fref: FileRef,
    file: File,
    parsed: ParsedFile,
    hash: FileHash,
}

impl Typechecker {
    /// A typechecker usable without the dedicated thread, for embedding
    /// and tests. Production service code goes through
    /// [`TypecheckerCoordinator::spawn`] instead.
    pub fn single_threaded(client: Client) -> (Typechecker, Arc<PreemptionManager>) {
        let gs = GlobalState::new();
        let preemption = Arc::new(PreemptionManager::new(Arc::clone(&gs.epochs)));
        let typechecker = Typechecker::new(gs, client, Arc::clone(&preemption));
        (typechecker, preemption)
    }

    fn new(gs: GlobalState, client: Client, preemption: Arc<PreemptionManager>) -> Typechecker {
        let initial_gs = gs.deep_copy();
        Typechecker {
            gs,
            initial_gs,
            indexed: Vec::new(),
            indexed_final_gs: FxHashMap::default(),
            file_hashes: Vec::new(),
            client,
            preemption,
            initialized: false,
        }
    }

    /// The committed state.
    pub fn state(&self) -> &GlobalState {
        &self.gs
    }

    /// The tree of `fref` against the base state, if indexed.
    pub fn get_indexed(&self, fref: FileRef) -> Option<&ParsedFile> {
        self.indexed.get(fref.index() as usize)?.as_ref()
    }

    /// The resolved tree of `fref`, as used for queries.
    pub fn get_resolved(&self, fref: FileRef) -> Option<&ParsedFile> {
        self.indexed_final_gs
            .get(&fref.index())
            .or_else(|| self.get_indexed(fref))
    }

    /// Hands the underlying state out; the typechecker is unusable
    /// afterwards.
    pub fn destroy(self) -> GlobalState {
        self.gs
    }

    /// Runs the initial slow path. Never cancellable; must be called
    /// exactly once, before any other operation.
    pub fn initialize(&mut self, updates: FileUpdates) {
        assert!(!self.initialized, "initialize must run exactly once");
        let committed = self.run_slow_path(updates, /* cancellable */ false);
        assert!(committed, "the initial slow path cannot be cancelled");
        self.initialized = true;
    }

    /// Typechecks an update batch. Returns whether it was committed
    /// (`true`) or cancelled by preempting work (`false`).
    pub fn typecheck(&mut self, updates: FileUpdates) -> bool {
        assert!(self.initialized, "typecheck before initialize");
        match self.decide(&updates) {
            Decision::Fast { entries, changed } => {
                self.run_fast_path(updates.epoch, entries, changed);
                true
            }
            Decision::Slow => {
                // The decision phase may have queued hash-run diagnostics;
                // the slow path re-derives them on its own copy.
                let _ = self.gs.errors.drain();
                self.run_slow_path(updates, /* cancellable */ true)
            }
        }
    }

    /// Re-runs inference over an explicit file set to refresh diagnostics.
    pub fn retypecheck(&mut self, files: &[FileRef]) {
        assert!(self.initialized, "retypecheck before initialize");
        let _ = self.gs.errors.drain();
        let trees: Vec<&ParsedFile> = files
            .iter()
            .filter_map(|fref| self.get_resolved(*fref))
            .collect();
        let _ = beryl_pipeline::run_typecheck(&self.gs, &trees, false);
        self.publish_for(files);
    }

    /// Runs a read-only query over `files`, returning its matches. The
    /// query attaches to the state for the duration of the run only.
    pub fn query(&mut self, query: Query, files: &[FileRef]) -> Vec<QueryResponse> {
        assert!(self.initialized, "query before initialize");
        let _ = self.gs.errors.drain();
        self.gs.lsp_query = query;
        let trees: Vec<&ParsedFile> = files
            .iter()
            .filter_map(|fref| self.get_resolved(*fref))
            .collect();
        let _ = beryl_pipeline::run_typecheck(&self.gs, &trees, false);
        // Restore on every exit; queries must not mutate persistent state.
        self.gs.lsp_query = Query::None;
        let (_diags, responses) = self.gs.errors.drain();
        responses
    }

    // === Path selection ==================================================

    /// Hashes the new contents of each edited file and compares against
    /// the stored hashes.
    fn decide(&mut self, updates: &FileUpdates) -> Decision {
        let mut entries = Vec::with_capacity(updates.edits.len());
        let mut changed = Vec::new();
        for edit in &updates.edits {
            // New files grow the file table: slow path.
            let Some(fref) = self.gs.find_file_by_path(&edit.path) else {
                log::debug!("slow path: new file {}", edit.path);
                return Decision::Slow;
            };
            let file = File::new(edit.path.clone(), edit.contents.clone(), FileType::Normal);
            let parsed = {
                let mut unfrozen = self.gs.unfreeze_name_table();
                beryl_pipeline::index_source(&mut unfrozen, fref, &file)
            };
            let hash = beryl_pipeline::hash_file(&self.gs, &parsed.tree);
            let old_hash = &self.file_hashes[fref.index() as usize];
            match old_hash.fast_path_changes(&hash) {
                Some(mut edits_changed) => {
                    changed.append(&mut edits_changed);
                    entries.push(FastEntry {
                        fref,
                        file,
                        parsed,
                        hash,
                    });
                }
                None => {
                    log::debug!("slow path: definitions changed in {}", edit.path);
                    return Decision::Slow;
                }
            }
        }
        changed.sort_unstable();
        changed.dedup();
        Decision::Fast { entries, changed }
    }

    // === Fast path =======================================================

    /// Retypechecks the edited files plus every file whose sends intersect
    /// the changed methods, against the unchanged symbol table.
    fn run_fast_path(&mut self, epoch: u32, entries: Vec<FastEntry>, changed: Vec<u64>) {
        let edited: Vec<FileRef> = entries.iter().map(|entry| entry.fref).collect();
        log::debug!("fast path for {edited:?}, {} changed methods", changed.len());
        self.client.notify_run_info(TypecheckRunInfo {
            status: RunStatus::Started,
            epoch,
            fast_path: true,
            files: self.paths_of(&edited),
        });

        let mut fresh = Vec::new();
        for entry in entries {
            self.gs.replace_file(entry.fref, entry.file);
            self.file_hashes[entry.fref.index() as usize] = entry.hash;
            let base_copy = copy_parsed(&entry.parsed);
            self.set_indexed(entry.fref, base_copy);
            fresh.push(entry.parsed);
        }

        // Re-resolve the edited trees against the unchanged symbol table.
        let resolved = beryl_pipeline::incremental_resolve(&mut self.gs, fresh, false)
            .expect("the fast path is not cancellable");
        for file in resolved {
            self.indexed_final_gs.insert(file.file.index(), file);
        }

        // The affected set: edited files plus dependents by send usage.
        let mut affected: FxHashSet<FileRef> = edited.iter().copied().collect();
        if !changed.is_empty() {
            for fref in self.gs.file_refs() {
                if self.file_hashes[fref.index() as usize].uses_any(&changed) {
                    affected.insert(fref);
                }
            }
        }
        let mut affected: Vec<FileRef> = affected.into_iter().collect();
        affected.sort_unstable();

        let trees: Vec<&ParsedFile> = affected
            .iter()
            .filter_map(|fref| self.get_resolved(*fref))
            .collect();
        let _ = beryl_pipeline::run_typecheck(&self.gs, &trees, false);

        let committed = self.gs.epochs.try_commit_epoch(epoch, false);
        debug_assert!(committed);
        self.publish_for(&affected);
        self.client.notify_run_info(TypecheckRunInfo {
            status: RunStatus::Ended,
            epoch,
            fast_path: true,
            files: self.paths_of(&affected),
        });
    }

    // === Slow path =======================================================

    /// Rebuilds the symbol table from scratch on a state copy. Returns
    /// whether the copy was committed.
    fn run_slow_path(&mut self, updates: FileUpdates, cancellable: bool) -> bool {
        let epoch = updates.epoch;
        self.preemption.set_slow_path_running(cancellable);
        self.client.show_operation("Typechecking in the background", false);
        self.client.notify_run_info(TypecheckRunInfo {
            status: RunStatus::Started,
            epoch,
            fast_path: false,
            files: updates.edits.iter().map(|e| e.path.to_string()).collect(),
        });

        let outcome = self.slow_path_inner(updates, cancellable);
        let committed = outcome.is_some();

        self.preemption.set_slow_path_running(false);
        // Tasks queued after the final checkpoint would otherwise starve.
        while let Some(task) = self.preemption.take_task() {
            task(self);
        }
        self.client.show_operation("Typechecking in the background", true);
        self.client.notify_run_info(TypecheckRunInfo {
            status: if committed {
                RunStatus::Ended
            } else {
                RunStatus::Cancelled
            },
            epoch,
            fast_path: false,
            files: outcome.unwrap_or_default(),
        });
        committed
    }

    /// The phases of the slow path, with preemption checkpoints between
    /// them and between per-file indexing units. Returns the covered paths
    /// on commit, `None` on cancellation.
    fn slow_path_inner(
        &mut self,
        updates: FileUpdates,
        cancellable: bool,
    ) -> Option<Vec<String>> {
        // Rebuild from the pristine snapshot: re-entering definitions into
        // the committed symbol table would see every class and method as a
        // redefinition. The copy shares the epoch state, so cancellation
        // requested against the committed state reaches it.
        let mut new_gs = self.initial_gs.deep_copy();
        {
            let mut unfrozen = new_gs.unfreeze_file_table();
            for fref in self.gs.file_refs() {
                let file = self.gs.file(fref);
                unfrozen.enter_file(file.path.clone(), file.source.clone(), file.file_type);
            }
            for edit in &updates.edits {
                unfrozen.enter_file(edit.path.clone(), edit.contents.clone(), FileType::Normal);
            }
        }
        let all: Vec<FileRef> = new_gs.file_refs().collect();

        // Index every file from scratch, yielding between per-file units.
        let mut trees = Vec::with_capacity(all.len());
        {
            let mut unfrozen = new_gs.unfreeze_for_indexing();
            for &fref in &all {
                if self.service_checkpoint(cancellable).is_err() {
                    drop(unfrozen);
                    return self.abort_slow_path();
                }
                trees.push(beryl_pipeline::index_one(&mut unfrozen, fref));
            }
        }
        if self.service_checkpoint(cancellable).is_err() {
            return self.abort_slow_path();
        }

        let hashes: Vec<FileHash> = trees
            .iter()
            .map(|parsed| beryl_pipeline::hash_file(&new_gs, &parsed.tree))
            .collect();
        let base_trees: Vec<Option<ParsedFile>> =
            trees.iter().map(|parsed| Some(copy_parsed(parsed))).collect();

        if self.service_checkpoint(cancellable).is_err() {
            return self.abort_slow_path();
        }
        let resolved = match beryl_pipeline::name_and_resolve(&mut new_gs, trees, cancellable) {
            Ok(resolved) => resolved,
            Err(_) => return self.abort_slow_path(),
        };
        if self.service_checkpoint(cancellable).is_err() {
            return self.abort_slow_path();
        }

        let refs: Vec<&ParsedFile> = resolved.iter().collect();
        if beryl_pipeline::run_typecheck(&new_gs, &refs, cancellable).is_err() {
            return self.abort_slow_path();
        }

        if !new_gs.epochs.try_commit_epoch(updates.epoch, cancellable) {
            return self.abort_slow_path();
        }

        // Commit: swap the copy in and refresh every cache.
        self.gs = new_gs;
        self.indexed = base_trees;
        self.file_hashes = hashes;
        self.indexed_final_gs = resolved
            .into_iter()
            .map(|file| (file.file.index(), file))
            .collect();
        self.publish_for(&all);
        Some(self.paths_of(&all))
    }

    /// Discards the in-flight copy's side effects on cancellation. The
    /// committed state is untouched, so the post-state equals the
    /// pre-state.
    fn abort_slow_path(&mut self) -> Option<Vec<String>> {
        self.gs.epochs.consume_cancellation();
        let _ = self.gs.errors.drain();
        log::info!("slow path cancelled; keeping epoch {}", self.gs.epochs.current());
        None
    }

    /// Runs queued preempting tasks against the committed state, then
    /// reports whether a cancellation is pending.
    fn service_checkpoint(&mut self, cancellable: bool) -> Result<(), ()> {
        while let Some(task) = self.preemption.take_task() {
            log::debug!("servicing a preempting task at a checkpoint");
            task(self);
        }
        if cancellable && self.gs.epochs.cancellation_requested() {
            return Err(());
        }
        Ok(())
    }

    // === Publishing ======================================================

    /// Publishes the queued diagnostics, grouped per file, for exactly the
    /// given set; files without diagnostics get an explicit empty publish
    /// so stale squiggles clear.
    fn publish_for(&mut self, files: &[FileRef]) {
        let (diags, _responses) = self.gs.errors.drain();
        let mut by_file: FxHashMap<FileRef, Vec<beryl_core::Diagnostic>> = FxHashMap::default();
        for diag in diags {
            if diag.loc.exists() {
                by_file.entry(diag.loc.file).or_default().push(diag);
            }
        }
        for &fref in files {
            let file_diags = by_file.remove(&fref).unwrap_or_default();
            self.client.publish_diagnostics(&self.gs, fref, &file_diags);
        }
        // Diagnostics outside the typechecked set indicate a pass charged
        // an error to the wrong file; surface them rather than dropping.
        for (fref, file_diags) in by_file {
            log::warn!("diagnostics for {fref:?} outside the typechecked set");
            self.client.publish_diagnostics(&self.gs, fref, &file_diags);
        }
    }

    fn paths_of(&self, files: &[FileRef]) -> Vec<String> {
        files
            .iter()
            .map(|fref| self.gs.file(*fref).path.to_string())
            .collect()
    }

    fn set_indexed(&mut self, fref: FileRef, parsed: ParsedFile) {
        let index = fref.index() as usize;
        if self.indexed.len() <= index {
            self.indexed.resize_with(index + 1, || None);
        }
        self.indexed[index] = Some(parsed);
    }
}

fn copy_parsed(parsed: &ParsedFile) -> ParsedFile {
    ParsedFile {
        tree: parsed.tree.deep_copy(),
        file: parsed.file,
        silenced: parsed.silenced,
    }
}

/// Owns the dedicated typechecker thread and the channel feeding it.
pub struct TypecheckerCoordinator {
    tx: Option<Sender<Task>>,
    preemption: Arc<PreemptionManager>,
    handle: Option<JoinHandle<()>>,
}

type Task = Box<dyn FnOnce(&mut Typechecker) + Send>;

impl TypecheckerCoordinator {
    /// Spawns the typechecker thread.
    pub fn spawn(client: Client) -> TypecheckerCoordinator {
        let gs = GlobalState::new();
        let preemption = Arc::new(PreemptionManager::new(Arc::clone(&gs.epochs)));
        let (tx, rx) = crossbeam_channel::unbounded::<Task>();
        let thread_preemption = Arc::clone(&preemption);
        let handle = std::thread::Builder::new()
            .name("typechecker".to_string())
            .spawn(move || {
                let mut typechecker = Typechecker::new(gs, client, thread_preemption);
                for task in rx {
                    task(&mut typechecker);
                }
            })
            .expect("failed to spawn the typechecker thread");
        TypecheckerCoordinator {
            tx: Some(tx),
            preemption,
            handle: Some(handle),
        }
    }

    /// Enqueues a task for in-order execution.
    pub fn submit(&self, task: impl FnOnce(&mut Typechecker) + Send + 'static) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Box::new(task));
        }
    }

    /// Runs a task ahead of queued work by preempting an in-flight slow
    /// path; falls back to the ordinary queue when nothing is running.
    pub fn submit_preemptible(&self, task: impl FnOnce(&mut Typechecker) + Send + 'static) {
        match self.preemption.try_preempt(Box::new(task)) {
            Ok(()) => {}
            Err(task) => self.submit(task),
        }
    }

    /// The shared preemption manager.
    pub fn preemption(&self) -> &Arc<PreemptionManager> {
        &self.preemption
    }

    /// Drains the queue and joins the thread.
    pub fn shutdown(&mut self) {
        // Any task still parked in the preemption queue would be lost;
        // push it through the main queue first.
        for task in self.preemption.drain_into_queue() {
            self.submit(task);
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
