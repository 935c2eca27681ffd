//! Query service: the uniform entry point for graph algorithms.
//!
//! Resolves the snapshot through the cache, validates parameters, and
//! dispatches to the engine chosen at construction.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{
    CentralityMetric, Communities, CommunityAlgorithm, Component, Cycle, EmbeddedQueryEngine,
    GraphQueryEngine, GraphStatistics, HttpGraphBackend, NativeQueryEngine, NullQueryEngine,
    RankedNode,
};
use crate::cache::GraphCacheService;
use crate::config::{EngineSelection, KgraphConfig};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, GraphType};

pub const DEFAULT_DAMPING: f64 = 0.85;

pub struct GraphQueryService {
    cache: Arc<GraphCacheService>,
    engine: Arc<dyn GraphQueryEngine>,
    fallback: Option<Arc<dyn GraphQueryEngine>>,
}

impl GraphQueryService {
    pub fn new(cache: Arc<GraphCacheService>, engine: Arc<dyn GraphQueryEngine>) -> Self {
        Self {
            cache,
            engine,
            fallback: None,
        }
    }

    /// Engine retried when the primary reports `BackendUnavailable`.
    pub fn with_fallback(mut self, engine: Arc<dyn GraphQueryEngine>) -> Self {
        self.fallback = Some(engine);
        self
    }

    /// Pick the engine named by `[query] engine`. The embedded fallback is
    /// attached only for the native engine and only when enabled.
    pub fn from_config(cache: Arc<GraphCacheService>, config: &KgraphConfig) -> Result<Self> {
        let max_cycles = config.query.max_cycles;
        let embedded = Arc::new(EmbeddedQueryEngine::new().with_max_cycles(max_cycles));

        let service = match config.query.engine {
            EngineSelection::Embedded => Self::new(cache, embedded),
            EngineSelection::Null => Self::new(cache, Arc::new(NullQueryEngine)),
            EngineSelection::Native => {
                let backend = HttpGraphBackend::new(
                    &config.native.base_url,
                    Duration::from_secs(config.native.timeout_secs),
                )?;
                let native = NativeQueryEngine::new(Arc::new(backend), config.native.workspace_id.clone())
                    .with_max_cycles(max_cycles);
                let service = Self::new(cache, Arc::new(native));
                if config.query.fallback_to_embedded {
                    service.with_fallback(embedded)
                } else {
                    service
                }
            }
        };

        info!(
            engine = service.engine_name(),
            fallback = service.fallback.as_ref().map(|e| e.name()).unwrap_or("none"),
            "query engine selected"
        );
        Ok(service)
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn cache(&self) -> &Arc<GraphCacheService> {
        &self.cache
    }

    pub fn page_rank(&self, graph_type: GraphType, top_k: usize, damping: f64) -> Result<Vec<RankedNode>> {
        if !(damping > 0.0 && damping < 1.0) {
            return Err(GraphError::invalid_parameter(
                "damping",
                format!("must lie strictly between 0 and 1, got {damping}"),
            ));
        }
        self.dispatch(graph_type, "page_rank", |engine, graph| {
            engine.page_rank(graph, top_k, damping)
        })
    }

    pub fn centrality(
        &self,
        graph_type: GraphType,
        metric: CentralityMetric,
        top_k: usize,
    ) -> Result<Vec<RankedNode>> {
        self.dispatch(graph_type, "centrality", |engine, graph| {
            engine.centrality(graph, metric, top_k)
        })
    }

    pub fn detect_communities(&self, graph_type: GraphType, algorithm: CommunityAlgorithm) -> Result<Communities> {
        self.dispatch(graph_type, "detect_communities", |engine, graph| {
            engine.detect_communities(graph, algorithm)
        })
    }

    pub fn find_cycles(&self, graph_type: GraphType) -> Result<Vec<Cycle>> {
        self.dispatch(graph_type, "find_cycles", |engine, graph| engine.find_cycles(graph))
    }

    pub fn connected_components(&self, graph_type: GraphType) -> Result<Vec<Component>> {
        self.dispatch(graph_type, "connected_components", |engine, graph| {
            engine.connected_components(graph)
        })
    }

    pub fn statistics(&self, graph_type: GraphType) -> Result<GraphStatistics> {
        self.dispatch(graph_type, "statistics", |engine, graph| engine.statistics(graph))
    }

    fn dispatch<T>(
        &self,
        graph_type: GraphType,
        operation: &'static str,
        run: impl Fn(&dyn GraphQueryEngine, &Graph) -> Result<T>,
    ) -> Result<T> {
        let snapshot = self.cache.get_or_rebuild(graph_type)?;
        let graph: &Graph = &snapshot;
        match (run(self.engine.as_ref(), graph), &self.fallback) {
            (Err(GraphError::BackendUnavailable(reason)), Some(fallback)) => {
                warn!(
                    operation,
                    graph_type = %graph_type,
                    fallback = fallback.name(),
                    %reason,
                    "native backend unavailable, falling back"
                );
                run(fallback.as_ref(), graph)
            }
            (result, _) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::fixtures::triangle_plus_isolated;
    use crate::graph::GraphBuilder;
    use crate::query::native::mock::MockBackend;
    use crate::query::{BackendResponse, ScoreRow};
    use crate::storage::{GraphCacheRepository, MemoryCacheStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TriangleBuilder {
        calls: AtomicUsize,
    }

    impl GraphBuilder for TriangleBuilder {
        fn graph_type(&self) -> GraphType {
            GraphType::Schema
        }

        fn build(&self) -> Result<Graph> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(triangle_plus_isolated())
        }
    }

    fn cache() -> (Arc<GraphCacheService>, Arc<TriangleBuilder>) {
        let builder = Arc::new(TriangleBuilder {
            calls: AtomicUsize::new(0),
        });
        let cache = GraphCacheService::new(GraphCacheRepository::new(Arc::new(MemoryCacheStore::new())))
            .with_builder(builder.clone());
        (Arc::new(cache), builder)
    }

    fn embedded_service() -> (GraphQueryService, Arc<TriangleBuilder>) {
        let (cache, builder) = cache();
        (GraphQueryService::new(cache, Arc::new(EmbeddedQueryEngine::new())), builder)
    }

    #[test]
    fn test_operations_over_cached_snapshot() {
        let (service, builder) = embedded_service();
        let cycles = service.find_cycles(GraphType::Schema).unwrap();
        assert_eq!(cycles, vec![vec!["A", "B", "C"]]);
        assert_eq!(service.connected_components(GraphType::Schema).unwrap().len(), 2);
        assert_eq!(service.page_rank(GraphType::Schema, 2, DEFAULT_DAMPING).unwrap().len(), 2);
        assert_eq!(service.statistics(GraphType::Schema).unwrap().engine_name, "embedded");
        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_damping_validated_before_build() {
        let (service, builder) = embedded_service();
        for damping in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            let err = service.page_rank(GraphType::Schema, 3, damping).unwrap_err();
            assert!(
                matches!(err, GraphError::InvalidQueryParameter { ref name, .. } if name == "damping"),
                "{damping}"
            );
        }
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_builder_surfaces() {
        let cache = Arc::new(GraphCacheService::new(GraphCacheRepository::new(Arc::new(
            MemoryCacheStore::new(),
        ))));
        let service = GraphQueryService::new(cache, Arc::new(EmbeddedQueryEngine::new()));
        let err = service.find_cycles(GraphType::Data).unwrap_err();
        assert_eq!(err, GraphError::NoBuilder(GraphType::Data));
    }

    #[test]
    fn test_unavailable_native_falls_back_when_enabled() {
        let (cache, _) = cache();
        let backend = MockBackend::unavailable();
        let service = GraphQueryService::new(cache, Arc::new(NativeQueryEngine::new(backend.clone(), "ws")))
            .with_fallback(Arc::new(EmbeddedQueryEngine::new()));
        let components = service.connected_components(GraphType::Schema).unwrap();
        assert_eq!(components.len(), 2);
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn test_unavailable_native_fails_fast_without_fallback() {
        let (cache, _) = cache();
        let service = GraphQueryService::new(
            cache,
            Arc::new(NativeQueryEngine::new(MockBackend::unavailable(), "ws")),
        );
        let err = service.find_cycles(GraphType::Schema).unwrap_err();
        assert!(matches!(err, GraphError::BackendUnavailable(_)));
    }

    #[test]
    fn test_invalid_response_does_not_fall_back() {
        let (cache, _) = cache();
        let backend = MockBackend::returning(Ok(BackendResponse::Scores(vec![ScoreRow {
            node_id: "A".into(),
            score: 1.0,
        }])));
        let service = GraphQueryService::new(cache, Arc::new(NativeQueryEngine::new(backend, "ws")))
            .with_fallback(Arc::new(EmbeddedQueryEngine::new()));
        let err = service.find_cycles(GraphType::Schema).unwrap_err();
        assert!(matches!(err, GraphError::InvalidBackendResponse(_)));
    }

    #[test]
    fn test_engine_selection_from_config() {
        let (cache, _) = cache();
        let pick = |raw: &str| {
            let config = KgraphConfig::from_toml_str(raw).unwrap();
            GraphQueryService::from_config(cache.clone(), &config).unwrap()
        };

        assert_eq!(pick("").engine_name(), "embedded");
        assert_eq!(pick("[query]\nengine = \"null\"").engine_name(), "null");

        let native = pick("[query]\nengine = \"native\"\nfallback_to_embedded = true");
        assert_eq!(native.engine_name(), "native");
        assert_eq!(native.fallback.as_ref().map(|e| e.name()), Some("embedded"));
        assert!(pick("[query]\nengine = \"native\"").fallback.is_none());
    }

    #[test]
    fn test_null_engine_is_neutral() {
        let (cache, _) = cache();
        let service = GraphQueryService::new(cache, Arc::new(NullQueryEngine));
        assert!(service.find_cycles(GraphType::Schema).unwrap().is_empty());
        assert_eq!(service.statistics(GraphType::Schema).unwrap().node_count, 4);
    }
}
