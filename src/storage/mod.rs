//! Durable persistence of cache entries.
//!
//! A [`CachePersistenceStore`] is a plain byte-oriented key-value store.
//! [`GraphCacheRepository`] layers the entry format on top: one bincode
//! encoded [`CacheEntry`] per graph type, whose payload is itself the
//! bincode encoded [`Graph`].

pub mod file;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{GraphError, Result};
use crate::graph::{Graph, GraphType};

pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;

/// Durable key-value storage that survives process restarts.
pub trait CachePersistenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the value under `key` in one step; readers never see a
    /// partially written value.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Returns whether a value was present.
    fn delete(&self, key: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Valid,
    /// Invalidated; the next read rebuilds.
    Stale,
    /// Failed to decode; the next read rebuilds.
    Corrupt,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryStatus::Valid => write!(f, "valid"),
            EntryStatus::Stale => write!(f, "stale"),
            EntryStatus::Corrupt => write!(f, "corrupt"),
        }
    }
}

/// A persisted graph plus its cache bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: GraphType,
    /// bincode encoded [`Graph`].
    pub payload: Vec<u8>,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
    /// The builder-input hash the payload was built from
    /// (`GraphMetadata::source_hash`).
    pub source_fingerprint: String,
}

impl CacheEntry {
    /// Encode a freshly built graph as a VALID entry.
    pub fn from_graph(graph: &Graph) -> Result<Self> {
        let payload = bincode::serialize(graph)
            .map_err(|e| GraphError::Storage(format!("failed to encode graph: {e}")))?;
        Ok(Self {
            key: graph.graph_type(),
            payload,
            status: EntryStatus::Valid,
            created_at: Utc::now(),
            source_fingerprint: graph.metadata().source_hash.clone(),
        })
    }

    /// Whether this entry was built from inputs hashing to `source_hash`.
    /// Answered from the envelope alone; the payload is not decoded.
    pub fn built_from(&self, source_hash: &str) -> bool {
        self.source_fingerprint == source_hash
    }

    /// Decode the payload, re-checking graph invariants.
    pub fn decode_graph(&self) -> Result<Graph> {
        let corrupt = |reason: String| GraphError::CacheCorrupt {
            key: self.key.cache_key().to_string(),
            reason,
        };
        let graph: Graph = bincode::deserialize(&self.payload).map_err(|e| corrupt(e.to_string()))?;
        graph.validate().map_err(corrupt)?;
        if graph.graph_type() != self.key {
            return Err(corrupt(format!(
                "payload holds a {} graph",
                graph.graph_type()
            )));
        }
        if !self.built_from(&graph.metadata().source_hash) {
            return Err(corrupt("payload source hash does not match entry".to_string()));
        }
        Ok(graph)
    }
}

/// Reads and writes [`CacheEntry`] values through a persistence store.
#[derive(Clone)]
pub struct GraphCacheRepository {
    store: Arc<dyn CachePersistenceStore>,
}

impl GraphCacheRepository {
    pub fn new(store: Arc<dyn CachePersistenceStore>) -> Self {
        Self { store }
    }

    /// Load the entry for `graph_type`. An undecodable envelope is
    /// reported as `CacheCorrupt`.
    pub fn load(&self, graph_type: GraphType) -> Result<Option<CacheEntry>> {
        let key = graph_type.cache_key();
        let Some(bytes) = self.store.get(key)? else {
            return Ok(None);
        };
        let entry: CacheEntry = bincode::deserialize(&bytes).map_err(|e| GraphError::CacheCorrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        if entry.key != graph_type {
            return Err(GraphError::CacheCorrupt {
                key: key.to_string(),
                reason: format!("entry is keyed as {}", entry.key),
            });
        }
        debug!(graph_type = %graph_type, status = %entry.status, "cache entry loaded");
        Ok(Some(entry))
    }

    pub fn save(&self, entry: &CacheEntry) -> Result<()> {
        let bytes = bincode::serialize(entry)
            .map_err(|e| GraphError::Storage(format!("failed to encode cache entry: {e}")))?;
        self.store.put(entry.key.cache_key(), &bytes)
    }

    /// Rewrite the status of a persisted entry. Returns whether an entry
    /// was present. An undecodable entry is dropped instead.
    pub fn set_status(&self, graph_type: GraphType, status: EntryStatus) -> Result<bool> {
        match self.load(graph_type) {
            Ok(Some(mut entry)) => {
                entry.status = status;
                self.save(&entry)?;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(GraphError::CacheCorrupt { reason, .. }) => {
                warn!(graph_type = %graph_type, %reason, "dropping undecodable cache entry");
                self.store.delete(graph_type.cache_key())
            }
            Err(e) => Err(e),
        }
    }

    pub fn remove(&self, graph_type: GraphType) -> Result<bool> {
        self.store.delete(graph_type.cache_key())
    }
}
