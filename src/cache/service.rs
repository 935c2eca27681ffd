//! The graph cache service: serves immutable graph snapshots and owns the
//! rebuild policy.
//!
//! Reads go memory → persisted entry → builder. Every rebuild goes through
//! the single-flight registry, runs on a worker thread bounded by the build
//! timeout, is persisted, and is then swapped into memory under a write
//! lock. A failed rebuild touches nothing.
//!
//! Each graph type carries an invalidation generation. A rebuild records
//! the generation it started under; if `invalidate` ran meanwhile, the
//! result is installed STALE so the next read rebuilds again.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::flight::{Landed, SingleFlight};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, GraphBuilder, GraphType};
use crate::storage::{CacheEntry, EntryStatus, GraphCacheRepository};

pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(30);

/// The in-memory view of one cache entry.
#[derive(Clone)]
struct Slot {
    graph: Arc<Graph>,
    status: EntryStatus,
    created_at: DateTime<Utc>,
}

/// Snapshot of a cache entry's state, for the API layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    pub graph_type: GraphType,
    /// A VALID entry is available to serve.
    pub cached: bool,
    pub status: Option<EntryStatus>,
    pub created_at: Option<DateTime<Utc>>,
    pub graph_id: Option<String>,
    pub node_count: usize,
    pub edge_count: usize,
    pub fingerprint: Option<String>,
}

impl CacheStatus {
    fn empty(graph_type: GraphType) -> Self {
        Self {
            graph_type,
            cached: false,
            status: None,
            created_at: None,
            graph_id: None,
            node_count: 0,
            edge_count: 0,
            fingerprint: None,
        }
    }

    fn describe(graph_type: GraphType, graph: &Graph, status: EntryStatus, created_at: DateTime<Utc>) -> Self {
        Self {
            graph_type,
            cached: status == EntryStatus::Valid,
            status: Some(status),
            created_at: Some(created_at),
            graph_id: Some(graph.id().to_string()),
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            fingerprint: Some(graph.fingerprint().to_string()),
        }
    }
}

pub struct GraphCacheService {
    builders: HashMap<GraphType, Arc<dyn GraphBuilder>>,
    repository: GraphCacheRepository,
    snapshots: RwLock<HashMap<GraphType, Slot>>,
    /// Bumped by `invalidate`; only touched while `snapshots` is held.
    generations: Mutex<HashMap<GraphType, u64>>,
    flights: SingleFlight,
    workers: BuildWorkers,
    build_timeout: Duration,
}

impl GraphCacheService {
    pub fn new(repository: GraphCacheRepository) -> Self {
        Self {
            builders: HashMap::new(),
            repository,
            snapshots: RwLock::new(HashMap::new()),
            generations: Mutex::new(HashMap::new()),
            flights: SingleFlight::new(),
            workers: BuildWorkers::default(),
            build_timeout: DEFAULT_BUILD_TIMEOUT,
        }
    }

    /// Register the builder for its graph type, replacing any previous one.
    pub fn with_builder(mut self, builder: Arc<dyn GraphBuilder>) -> Self {
        self.builders.insert(builder.graph_type(), builder);
        self
    }

    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    pub fn graph_types(&self) -> Vec<GraphType> {
        let mut types: Vec<GraphType> = self.builders.keys().copied().collect();
        types.sort();
        types
    }

    // ─── Public Operations ──────────────────────────────────────

    /// Return the VALID graph for `graph_type`, rebuilding if there is none.
    pub fn get_or_rebuild(&self, graph_type: GraphType) -> Result<Arc<Graph>> {
        if let Some(graph) = self.valid_snapshot(graph_type) {
            debug!(graph_type = %graph_type, "cache hit");
            return Ok(graph);
        }

        let landed = self.flights.run(graph_type, || {
            // Another leader may have finished between our check and here.
            if let Some(graph) = self.valid_snapshot(graph_type) {
                return Ok(Landed::served(graph));
            }

            let generation = self.generation(graph_type);
            let mut corrupt_reason = None;
            if !self.has_slot(graph_type) {
                match self.restore_persisted(graph_type, generation) {
                    Restore::Restored(graph) => return Ok(Landed::served(graph)),
                    Restore::Corrupt(reason) => corrupt_reason = Some(reason),
                    Restore::Missing => {}
                }
            }

            self.build_and_install(graph_type, generation)
                .map(Landed::built)
                .map_err(|build_err| match corrupt_reason {
                    Some(reason) => GraphError::CacheCorrupt {
                        key: graph_type.cache_key().to_string(),
                        reason: format!("{reason}; rebuild failed: {build_err}"),
                    },
                    None => build_err,
                })
        })?;
        Ok(landed.graph)
    }

    /// Rebuild unconditionally and swap the result in.
    ///
    /// Callers arriving while a rebuild of the same type is in flight share
    /// that rebuild's outcome. A flight that only served or restored a
    /// snapshot does not count; the rebuild then runs after it.
    pub fn force_rebuild(&self, graph_type: GraphType) -> Result<Arc<Graph>> {
        info!(graph_type = %graph_type, "forced rebuild requested");
        loop {
            let landed = self.flights.run(graph_type, || {
                let generation = self.generation(graph_type);
                self.build_and_install(graph_type, generation).map(Landed::built)
            })?;
            if landed.built {
                return Ok(landed.graph);
            }
            debug!(graph_type = %graph_type, "joined a flight that did not build, rebuilding");
        }
    }

    /// Build every registered graph type that has no VALID snapshot,
    /// restoring persisted entries where possible. Failures are reported
    /// per type and do not stop the others.
    pub fn build_all(&self) -> Vec<(GraphType, Result<Arc<Graph>>)> {
        self.graph_types()
            .into_iter()
            .map(|graph_type| (graph_type, self.get_or_rebuild(graph_type)))
            .collect()
    }

    /// Mark the entry STALE. The next `get_or_rebuild` rebuilds it.
    /// Returns whether there was an entry or an in-flight build to
    /// invalidate. A build in flight is installed STALE when it lands.
    pub fn invalidate(&self, graph_type: GraphType) -> Result<bool> {
        let in_memory = {
            let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
            *self
                .generations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(graph_type)
                .or_insert(0) += 1;
            match snapshots.get_mut(&graph_type) {
                Some(slot) => {
                    slot.status = EntryStatus::Stale;
                    true
                }
                None => false,
            }
        };
        let persisted = self.repository.set_status(graph_type, EntryStatus::Stale)?;
        let invalidated = in_memory || persisted || self.flights.in_flight(graph_type);
        info!(graph_type = %graph_type, invalidated, "cache invalidated");
        Ok(invalidated)
    }

    pub fn status(&self, graph_type: GraphType) -> Result<CacheStatus> {
        if let Some(slot) = self.slot(graph_type) {
            return Ok(CacheStatus::describe(graph_type, &slot.graph, slot.status, slot.created_at));
        }

        match self.repository.load(graph_type) {
            Ok(Some(entry)) => Ok(match entry.decode_graph() {
                Ok(graph) => CacheStatus::describe(graph_type, &graph, entry.status, entry.created_at),
                Err(_) => CacheStatus {
                    status: Some(EntryStatus::Corrupt),
                    created_at: Some(entry.created_at),
                    ..CacheStatus::empty(graph_type)
                },
            }),
            Ok(None) => Ok(CacheStatus::empty(graph_type)),
            Err(GraphError::CacheCorrupt { .. }) => Ok(CacheStatus {
                status: Some(EntryStatus::Corrupt),
                ..CacheStatus::empty(graph_type)
            }),
            Err(e) => Err(e),
        }
    }

    /// Status of every graph type with a registered builder.
    pub fn status_all(&self) -> Result<Vec<CacheStatus>> {
        self.graph_types()
            .into_iter()
            .map(|graph_type| self.status(graph_type))
            .collect()
    }

    /// Load every persisted VALID entry into memory. Returns how many were
    /// restored. Entries that fail to decode are marked CORRUPT.
    pub fn warm_up(&self) -> usize {
        self.graph_types()
            .into_iter()
            .filter(|&graph_type| !self.has_slot(graph_type))
            .filter(|&graph_type| {
                let generation = self.generation(graph_type);
                matches!(self.restore_persisted(graph_type, generation), Restore::Restored(_))
            })
            .count()
    }

    // ─── Internal Helpers ───────────────────────────────────────

    fn slot(&self, graph_type: GraphType) -> Option<Slot> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&graph_type)
            .cloned()
    }

    fn has_slot(&self, graph_type: GraphType) -> bool {
        self.slot(graph_type).is_some()
    }

    fn valid_snapshot(&self, graph_type: GraphType) -> Option<Arc<Graph>> {
        self.slot(graph_type)
            .filter(|slot| slot.status == EntryStatus::Valid)
            .map(|slot| slot.graph)
    }

    fn generation(&self, graph_type: GraphType) -> u64 {
        self.generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&graph_type)
            .copied()
            .unwrap_or(0)
    }

    /// Swap a new snapshot in. Readers see the old slot or the new one.
    /// The slot is VALID unless an invalidation happened after `generation`
    /// was read; the installed status is returned.
    fn install(&self, graph: Arc<Graph>, created_at: DateTime<Utc>, generation: u64) -> EntryStatus {
        let graph_type = graph.graph_type();
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        let status = if self.generation(graph_type) == generation {
            EntryStatus::Valid
        } else {
            EntryStatus::Stale
        };
        snapshots.insert(
            graph_type,
            Slot {
                graph,
                status,
                created_at,
            },
        );
        status
    }

    fn restore_persisted(&self, graph_type: GraphType, generation: u64) -> Restore {
        let entry = match self.repository.load(graph_type) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Restore::Missing,
            Err(GraphError::CacheCorrupt { reason, .. }) => {
                warn!(graph_type = %graph_type, %reason, "persisted cache entry corrupt, rebuilding");
                if let Err(e) = self.repository.remove(graph_type) {
                    warn!(graph_type = %graph_type, error = %e, "failed to drop corrupt entry");
                }
                return Restore::Corrupt(reason);
            }
            Err(e) => {
                warn!(graph_type = %graph_type, error = %e, "failed to read persisted cache");
                return Restore::Missing;
            }
        };

        if entry.status != EntryStatus::Valid {
            debug!(graph_type = %graph_type, status = %entry.status, "persisted entry not servable");
            return Restore::Missing;
        }

        match entry.decode_graph() {
            Ok(graph) => {
                let graph = Arc::new(graph);
                let status = self.install(Arc::clone(&graph), entry.created_at, generation);
                info!(
                    graph_type = %graph_type,
                    %status,
                    nodes = graph.node_count(),
                    edges = graph.edge_count(),
                    "graph restored from persisted cache"
                );
                Restore::Restored(graph)
            }
            Err(e) => {
                warn!(graph_type = %graph_type, error = %e, "persisted graph corrupt, rebuilding");
                if let Err(e) = self.repository.set_status(graph_type, EntryStatus::Corrupt) {
                    warn!(graph_type = %graph_type, error = %e, "failed to mark entry corrupt");
                }
                Restore::Corrupt(e.to_string())
            }
        }
    }

    fn build_and_install(&self, graph_type: GraphType, generation: u64) -> Result<Arc<Graph>> {
        let builder = self
            .builders
            .get(&graph_type)
            .cloned()
            .ok_or(GraphError::NoBuilder(graph_type))?;

        let started = Instant::now();
        let graph = Arc::new(self.workers.run(builder, graph_type, self.build_timeout)?);

        let created_at = match CacheEntry::from_graph(&graph) {
            Ok(entry) => {
                let created_at = entry.created_at;
                if let Err(e) = self.repository.save(&entry) {
                    warn!(graph_type = %graph_type, error = %e, "failed to persist graph, serving from memory");
                }
                created_at
            }
            Err(e) => {
                warn!(graph_type = %graph_type, error = %e, "failed to encode graph, serving from memory");
                Utc::now()
            }
        };
        let status = self.install(Arc::clone(&graph), created_at, generation);
        if status == EntryStatus::Stale {
            // The save above may have overwritten the invalidation.
            if let Err(e) = self.repository.set_status(graph_type, EntryStatus::Stale) {
                warn!(graph_type = %graph_type, error = %e, "failed to persist invalidation");
            }
        }

        info!(
            graph_type = %graph_type,
            %status,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "graph rebuilt"
        );
        Ok(graph)
    }
}

enum Restore {
    Restored(Arc<Graph>),
    Corrupt(String),
    Missing,
}

/// Build worker threads, at most one running per graph type.
#[derive(Default)]
struct BuildWorkers {
    running: Arc<Mutex<HashSet<GraphType>>>,
}

/// Clears a worker's entry in `BuildWorkers::running`, also on panic.
struct WorkerSlot {
    running: Arc<Mutex<HashSet<GraphType>>>,
    graph_type: GraphType,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.graph_type);
    }
}

impl BuildWorkers {
    /// Run a build on a worker thread, giving up after `timeout`.
    ///
    /// A timed-out worker is left to finish on its own and its result is
    /// dropped. Until it does, further builds of that type fail with
    /// `BuildTimeout` instead of starting a second worker.
    fn run(&self, builder: Arc<dyn GraphBuilder>, graph_type: GraphType, timeout: Duration) -> Result<Graph> {
        let timed_out = GraphError::BuildTimeout {
            graph_type,
            timeout_ms: timeout.as_millis() as u64,
        };

        let claimed = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(graph_type);
        if !claimed {
            warn!(graph_type = %graph_type, "previous build still running, not starting another");
            return Err(timed_out);
        }
        let slot = WorkerSlot {
            running: Arc::clone(&self.running),
            graph_type,
        };

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name(format!("kgraph-build-{graph_type}"))
            .spawn(move || {
                let result = {
                    let _slot = slot;
                    builder.build()
                };
                let _ = tx.send(result);
            })
            .map_err(|e| GraphError::build_failed(graph_type, format!("failed to spawn build: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(graph_type = %graph_type, timeout_ms = timeout.as_millis() as u64, "build timed out");
                Err(timed_out)
            }
            Err(RecvTimeoutError::Disconnected) => Err(GraphError::build_failed(graph_type, "builder panicked")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::fixtures::triangle_plus_isolated;
    use crate::graph::{GraphDraft, GraphNode, NodeType};
    use crate::storage::{CachePersistenceStore, FileCacheStore, MemoryCacheStore};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Barrier;

    /// Counts invocations; can be told to fail or to stall.
    struct ScriptedBuilder {
        graph_type: GraphType,
        calls: AtomicUsize,
        fail: AtomicBool,
        delay: Duration,
    }

    impl ScriptedBuilder {
        fn new(graph_type: GraphType) -> Arc<Self> {
            Self::slow(graph_type, Duration::ZERO)
        }

        fn slow(graph_type: GraphType, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                graph_type,
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl GraphBuilder for ScriptedBuilder {
        fn graph_type(&self) -> GraphType {
            self.graph_type
        }

        fn build(&self) -> Result<Graph> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if self.fail.load(Ordering::SeqCst) {
                return Err(GraphError::build_failed(self.graph_type, "source unreachable"));
            }
            let mut draft = GraphDraft::new(self.graph_type);
            draft.add_node(GraphNode::new("A", "A", NodeType::Table));
            draft.add_node(GraphNode::new("B", "B", NodeType::Table));
            draft.commit("fixed-input".to_string())
        }
    }

    fn service_with(store: Arc<dyn CachePersistenceStore>, builder: Arc<ScriptedBuilder>) -> GraphCacheService {
        GraphCacheService::new(GraphCacheRepository::new(store)).with_builder(builder)
    }

    fn memory_service(builder: Arc<ScriptedBuilder>) -> GraphCacheService {
        service_with(Arc::new(MemoryCacheStore::new()), builder)
    }

    /// Store whose reads stall, to hold a restore open.
    struct SlowStore {
        inner: Arc<dyn CachePersistenceStore>,
        delay: Duration,
    }

    impl CachePersistenceStore for SlowStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            thread::sleep(self.delay);
            self.inner.get(key)
        }

        fn put(&self, key: &str, value: &[u8]) -> Result<()> {
            self.inner.put(key, value)
        }

        fn delete(&self, key: &str) -> Result<bool> {
            self.inner.delete(key)
        }
    }

    #[test]
    fn test_get_or_rebuild_is_idempotent_while_valid() {
        let builder = ScriptedBuilder::new(GraphType::Schema);
        let service = memory_service(builder.clone());

        let first = service.get_or_rebuild(GraphType::Schema).unwrap();
        let second = service.get_or_rebuild(GraphType::Schema).unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(builder.calls(), 1);
    }

    #[test]
    fn test_force_rebuild_produces_new_fingerprint() {
        let builder = ScriptedBuilder::new(GraphType::Schema);
        let service = memory_service(builder.clone());

        let first = service.get_or_rebuild(GraphType::Schema).unwrap();
        let forced = service.force_rebuild(GraphType::Schema).unwrap();
        assert_ne!(first.fingerprint(), forced.fingerprint());
        assert_ne!(first.id(), forced.id());
        assert!(forced.metadata().built_at >= first.metadata().built_at);
        assert_eq!(first.metadata().source_hash, forced.metadata().source_hash);
        assert_eq!(builder.calls(), 2);

        // The forced graph is what gets served afterwards.
        assert_eq!(service.get_or_rebuild(GraphType::Schema).unwrap().id(), forced.id());
    }

    #[test]
    fn test_concurrent_cold_reads_build_once() {
        let builder = ScriptedBuilder::slow(GraphType::Data, Duration::from_millis(150));
        let service = Arc::new(memory_service(builder.clone()));
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    service.get_or_rebuild(GraphType::Data).unwrap().id().to_string()
                })
            })
            .collect();

        let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(builder.calls(), 1);
        assert!(ids.iter().all(|id| id == &ids[0]));
    }

    #[test]
    fn test_failed_force_rebuild_keeps_prior_entry() {
        let builder = ScriptedBuilder::new(GraphType::Schema);
        let service = memory_service(builder.clone());
        let original = service.get_or_rebuild(GraphType::Schema).unwrap();

        builder.fail.store(true, Ordering::SeqCst);
        let err = service.force_rebuild(GraphType::Schema).unwrap_err();
        assert!(matches!(err, GraphError::BuildFailed { .. }));

        let served = service.get_or_rebuild(GraphType::Schema).unwrap();
        assert_eq!(served.id(), original.id());
        assert!(service.status(GraphType::Schema).unwrap().cached);
    }

    #[test]
    fn test_invalidate_triggers_rebuild() {
        let builder = ScriptedBuilder::new(GraphType::Schema);
        let service = memory_service(builder.clone());

        assert!(!service.invalidate(GraphType::Schema).unwrap());
        let first = service.get_or_rebuild(GraphType::Schema).unwrap();
        assert!(service.invalidate(GraphType::Schema).unwrap());

        let status = service.status(GraphType::Schema).unwrap();
        assert!(!status.cached);
        assert_eq!(status.status, Some(EntryStatus::Stale));

        let rebuilt = service.get_or_rebuild(GraphType::Schema).unwrap();
        assert_ne!(first.id(), rebuilt.id());
        assert_eq!(builder.calls(), 2);
    }

    #[test]
    fn test_stale_entry_is_not_served_when_rebuild_fails() {
        let builder = ScriptedBuilder::new(GraphType::Schema);
        let service = memory_service(builder.clone());
        service.get_or_rebuild(GraphType::Schema).unwrap();
        service.invalidate(GraphType::Schema).unwrap();

        builder.fail.store(true, Ordering::SeqCst);
        assert!(service.get_or_rebuild(GraphType::Schema).is_err());
    }

    #[test]
    fn test_persisted_entry_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn CachePersistenceStore> = Arc::new(FileCacheStore::new(dir.path()));

        let builder = ScriptedBuilder::new(GraphType::Schema);
        let first = service_with(store.clone(), builder.clone())
            .get_or_rebuild(GraphType::Schema)
            .unwrap();

        let restarted_builder = ScriptedBuilder::new(GraphType::Schema);
        let restarted = service_with(store, restarted_builder.clone());
        assert_eq!(restarted.warm_up(), 1);
        let served = restarted.get_or_rebuild(GraphType::Schema).unwrap();
        assert_eq!(served.id(), first.id());
        assert_eq!(served.fingerprint(), first.fingerprint());
        assert_eq!(restarted_builder.calls(), 0);
    }

    #[test]
    fn test_invalidation_is_persisted() {
        let store: Arc<dyn CachePersistenceStore> = Arc::new(MemoryCacheStore::new());
        let service = service_with(store.clone(), ScriptedBuilder::new(GraphType::Schema));
        service.get_or_rebuild(GraphType::Schema).unwrap();
        service.invalidate(GraphType::Schema).unwrap();

        let builder = ScriptedBuilder::new(GraphType::Schema);
        let restarted = service_with(store, builder.clone());
        assert_eq!(restarted.warm_up(), 0);
        restarted.get_or_rebuild(GraphType::Schema).unwrap();
        assert_eq!(builder.calls(), 1);
    }

    #[test]
    fn test_corrupt_persisted_entry_self_heals() {
        let store = Arc::new(MemoryCacheStore::new());
        store.put("schema", b"\x00\x01garbage").unwrap();

        let builder = ScriptedBuilder::new(GraphType::Schema);
        let service = service_with(store.clone(), builder.clone());
        let graph = service.get_or_rebuild(GraphType::Schema).unwrap();
        assert_eq!(builder.calls(), 1);

        let repo = GraphCacheRepository::new(store);
        let entry = repo.load(GraphType::Schema).unwrap().unwrap();
        assert_eq!(entry.status, EntryStatus::Valid);
        assert_eq!(entry.source_fingerprint, graph.metadata().source_hash);
    }

    #[test]
    fn test_corrupt_payload_surfaces_only_if_rebuild_fails() {
        let store = Arc::new(MemoryCacheStore::new());
        let repo = GraphCacheRepository::new(store.clone());
        let mut entry = CacheEntry::from_graph(&triangle_plus_isolated()).unwrap();
        entry.payload = vec![0xff; 8];
        repo.save(&entry).unwrap();

        let builder = ScriptedBuilder::new(GraphType::Schema);
        builder.fail.store(true, Ordering::SeqCst);
        let service = service_with(store, builder.clone());
        let err = service.get_or_rebuild(GraphType::Schema).unwrap_err();
        assert!(matches!(err, GraphError::CacheCorrupt { .. }), "got {err:?}");
        assert_eq!(
            service.status(GraphType::Schema).unwrap().status,
            Some(EntryStatus::Corrupt)
        );
    }

    #[test]
    fn test_build_timeout() {
        let builder = ScriptedBuilder::slow(GraphType::Data, Duration::from_millis(500));
        let service = memory_service(builder).with_build_timeout(Duration::from_millis(50));
        let err = service.get_or_rebuild(GraphType::Data).unwrap_err();
        assert_eq!(
            err,
            GraphError::BuildTimeout {
                graph_type: GraphType::Data,
                timeout_ms: 50
            }
        );
        assert!(!service.status(GraphType::Data).unwrap().cached);
    }

    #[test]
    fn test_unregistered_type_is_no_builder() {
        let service = memory_service(ScriptedBuilder::new(GraphType::Schema));
        assert_eq!(
            service.get_or_rebuild(GraphType::Data).unwrap_err(),
            GraphError::NoBuilder(GraphType::Data)
        );
    }

    #[test]
    fn test_status_reports_counts() {
        let service = memory_service(ScriptedBuilder::new(GraphType::Schema));
        assert_eq!(service.status(GraphType::Schema).unwrap(), CacheStatus::empty(GraphType::Schema));

        let graph = service.get_or_rebuild(GraphType::Schema).unwrap();
        let status = service.status(GraphType::Schema).unwrap();
        assert!(status.cached);
        assert_eq!(status.node_count, 2);
        assert_eq!(status.edge_count, 0);
        assert_eq!(status.fingerprint.as_deref(), Some(graph.fingerprint()));
        assert_eq!(service.status_all().unwrap().len(), 1);
    }

    #[test]
    fn test_force_rebuild_during_restore_still_builds() {
        let inner: Arc<dyn CachePersistenceStore> = Arc::new(MemoryCacheStore::new());
        let persisted = service_with(inner.clone(), ScriptedBuilder::new(GraphType::Schema))
            .get_or_rebuild(GraphType::Schema)
            .unwrap();

        let builder = ScriptedBuilder::new(GraphType::Schema);
        let store = Arc::new(SlowStore {
            inner,
            delay: Duration::from_millis(300),
        });
        let service = Arc::new(service_with(store, builder.clone()));

        let reader = {
            let service = Arc::clone(&service);
            thread::spawn(move || service.get_or_rebuild(GraphType::Schema))
        };
        thread::sleep(Duration::from_millis(50));
        let forced = service.force_rebuild(GraphType::Schema).unwrap();
        reader.join().unwrap().unwrap();

        assert_ne!(forced.fingerprint(), persisted.fingerprint());
        assert_ne!(forced.id(), persisted.id());
        assert_eq!(builder.calls(), 1);
        assert_eq!(service.get_or_rebuild(GraphType::Schema).unwrap().id(), forced.id());
    }

    #[test]
    fn test_timed_out_worker_blocks_second_build() {
        let builder = ScriptedBuilder::slow(GraphType::Data, Duration::from_millis(400));
        let service = memory_service(builder.clone()).with_build_timeout(Duration::from_millis(50));

        for _ in 0..2 {
            let err = service.get_or_rebuild(GraphType::Data).unwrap_err();
            assert!(matches!(err, GraphError::BuildTimeout { .. }), "got {err:?}");
        }
        assert_eq!(builder.calls(), 1);

        // Once the abandoned worker finishes, builds start again.
        thread::sleep(Duration::from_millis(500));
        assert!(service.get_or_rebuild(GraphType::Data).is_err());
        assert_eq!(builder.calls(), 2);
    }

    #[test]
    fn test_invalidate_during_build_marks_result_stale() {
        let store: Arc<dyn CachePersistenceStore> = Arc::new(MemoryCacheStore::new());
        let builder = ScriptedBuilder::slow(GraphType::Schema, Duration::from_millis(300));
        let service = Arc::new(service_with(store.clone(), builder.clone()));

        let reader = {
            let service = Arc::clone(&service);
            thread::spawn(move || service.get_or_rebuild(GraphType::Schema))
        };
        thread::sleep(Duration::from_millis(100));
        assert!(service.invalidate(GraphType::Schema).unwrap());
        reader.join().unwrap().unwrap();

        let status = service.status(GraphType::Schema).unwrap();
        assert!(!status.cached);
        assert_eq!(status.status, Some(EntryStatus::Stale));
        let persisted = GraphCacheRepository::new(store).load(GraphType::Schema).unwrap().unwrap();
        assert_eq!(persisted.status, EntryStatus::Stale);

        service.get_or_rebuild(GraphType::Schema).unwrap();
        assert_eq!(builder.calls(), 2);
        assert!(service.status(GraphType::Schema).unwrap().cached);
    }

    #[test]
    fn test_readers_see_old_or_new_snapshot_during_force_rebuild() {
        let builder = ScriptedBuilder::slow(GraphType::Data, Duration::from_millis(100));
        let service = Arc::new(memory_service(builder.clone()));
        let original = service.get_or_rebuild(GraphType::Data).unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    let mut seen = HashSet::new();
                    loop {
                        let done = stop.load(Ordering::SeqCst);
                        seen.insert(service.get_or_rebuild(GraphType::Data).unwrap().id().to_string());
                        if done {
                            return seen;
                        }
                        thread::sleep(Duration::from_millis(5));
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        let forced = service.force_rebuild(GraphType::Data).unwrap();
        stop.store(true, Ordering::SeqCst);

        let seen: HashSet<String> = readers.into_iter().flat_map(|h| h.join().unwrap()).collect();
        assert!(seen.iter().all(|id| id == original.id() || id == forced.id()), "{seen:?}");
        assert!(seen.contains(original.id()));
        assert!(seen.contains(forced.id()));
        assert_ne!(forced.fingerprint(), original.fingerprint());
        assert_eq!(builder.calls(), 2);
    }

    #[test]
    fn test_build_all_builds_every_registered_type() {
        let schema = ScriptedBuilder::new(GraphType::Schema);
        let data = ScriptedBuilder::new(GraphType::Data);
        let service = memory_service(schema.clone()).with_builder(data.clone());
        data.fail.store(true, Ordering::SeqCst);

        let results = service.build_all();
        assert_eq!(results.len(), 2);
        for (graph_type, result) in &results {
            match graph_type {
                GraphType::Schema => assert!(result.is_ok()),
                GraphType::Data => assert!(matches!(result, Err(GraphError::BuildFailed { .. }))),
            }
        }
        assert_eq!((schema.calls(), data.calls()), (1, 1));
        assert!(service.status(GraphType::Schema).unwrap().cached);

        data.fail.store(false, Ordering::SeqCst);
        assert!(service.build_all().iter().all(|(_, result)| result.is_ok()));
        assert_eq!((schema.calls(), data.calls()), (1, 2));
    }
}
