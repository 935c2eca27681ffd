//! # kgraph
//!
//! Knowledge-graph cache and query engine.
//!
//! kgraph builds two graphs (schema and data) from external metadata
//! sources, caches them as immutable snapshots that survive restarts, and
//! runs graph algorithms over them through interchangeable engines.
//!
//! ## Key Features
//!
//! - **Single-flight rebuilds**: concurrent readers of a cold or stale
//!   graph share one build
//! - **Persistent**: snapshots are stored with their fingerprint and
//!   reloaded on start, self-healing corrupt entries
//! - **Pluggable engines**: in-process algorithms over petgraph, or a
//!   native graph backend over HTTP with optional fallback
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kgraph::{
//!     FileCacheStore, GraphCacheRepository, GraphCacheService, GraphQueryService,
//!     EmbeddedQueryEngine, GraphType, JsonFixtureSource, SchemaGraphBuilder,
//! };
//! use std::sync::Arc;
//!
//! let source = Arc::new(JsonFixtureSource::open("fixture.json"));
//! let store = Arc::new(FileCacheStore::new(".kgraph/cache"));
//! let cache = GraphCacheService::new(GraphCacheRepository::new(store))
//!     .with_builder(Arc::new(SchemaGraphBuilder::new(source)));
//!
//! let queries = GraphQueryService::new(Arc::new(cache), Arc::new(EmbeddedQueryEngine::new()));
//! let top = queries.page_rank(GraphType::Schema, 10, 0.85)?;
//! # Ok::<(), kgraph::GraphError>(())
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod query;
pub mod sources;
pub mod storage;

pub use error::{GraphError, Result};

// Graph model and builders
pub use graph::{
    DataGraphBuilder, EdgeType, Graph, GraphBuilder, GraphEdge, GraphMetadata, GraphNode,
    GraphType, NodeType, PropertyValue, SchemaGraphBuilder,
};

// Cache and persistence
pub use cache::{CacheStatus, GraphCacheService};
pub use storage::{
    CacheEntry, CachePersistenceStore, EntryStatus, FileCacheStore, GraphCacheRepository,
    MemoryCacheStore,
};

// Queries
pub use query::{
    CentralityMetric, CommunityAlgorithm, EmbeddedQueryEngine, GraphQueryEngine,
    GraphQueryService, GraphStatistics, NativeQueryEngine, NullQueryEngine, RankedNode,
};

pub use config::KgraphConfig;
pub use sources::{JsonFixtureSource, StructuralMetadataSource, TabularDataSource};
