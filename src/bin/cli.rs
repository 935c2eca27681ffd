//! kgraph CLI - knowledge-graph cache and queries.
//!
//! Usage:
//!   kgraph build [schema|data]           # Build (or load) cached graphs
//!   kgraph rebuild <graph>               # Force a fresh build
//!   kgraph status                        # Cache state per graph
//!   kgraph invalidate <graph>            # Mark a graph stale
//!   kgraph pagerank <graph> --top-k 10   # PageRank ranking
//!   kgraph centrality <graph> <metric>   # betweenness|degree|closeness
//!   kgraph communities <graph>           # louvain|labelPropagation
//!   kgraph cycles <graph>                # Directed cycles
//!   kgraph components <graph>            # Weakly connected components
//!   kgraph stats <graph>                 # Graph statistics
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use kgraph::query::DEFAULT_DAMPING;
use kgraph::{
    CentralityMetric, CommunityAlgorithm, DataGraphBuilder, FileCacheStore, GraphCacheRepository,
    GraphCacheService, GraphQueryService, GraphType, JsonFixtureSource, KgraphConfig,
    SchemaGraphBuilder,
};

#[derive(Parser)]
#[command(name = "kgraph")]
#[command(about = "kgraph - knowledge-graph cache and query engine", long_about = None)]
struct Cli {
    /// Config file (missing file means defaults)
    #[arg(short, long, default_value = "kgraph.toml")]
    config: PathBuf,

    /// JSON fixture holding entities, relationships, tables and rows
    #[arg(short, long, default_value = "fixture.json")]
    fixture: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve every graph (or one) from cache, building what is missing
    Build {
        /// schema or data; all graphs when omitted
        graph: Option<GraphType>,
    },

    /// Rebuild a graph regardless of cache state
    Rebuild { graph: GraphType },

    /// Show cache state for every graph
    Status,

    /// Mark a cached graph stale so the next read rebuilds it
    Invalidate { graph: GraphType },

    /// Rank nodes by PageRank
    Pagerank {
        graph: GraphType,

        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,

        #[arg(short, long, default_value_t = DEFAULT_DAMPING)]
        damping: f64,
    },

    /// Rank nodes by a centrality metric
    Centrality {
        graph: GraphType,

        /// betweenness, degree or closeness
        metric: CentralityMetric,

        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,
    },

    /// Partition nodes into communities
    Communities {
        graph: GraphType,

        /// louvain or labelPropagation
        #[arg(short, long, default_value = "louvain")]
        algorithm: CommunityAlgorithm,
    },

    /// List directed cycles
    Cycles { graph: GraphType },

    /// List weakly connected components
    Components { graph: GraphType },

    /// Show graph statistics
    Stats { graph: GraphType },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = KgraphConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let source = Arc::new(JsonFixtureSource::open(&cli.fixture));
    let store = Arc::new(FileCacheStore::new(&config.cache.dir));
    let cache = GraphCacheService::new(GraphCacheRepository::new(store))
        .with_builder(Arc::new(SchemaGraphBuilder::new(source.clone())))
        .with_builder(Arc::new(
            DataGraphBuilder::new(source).with_row_limit(config.data.row_limit),
        ))
        .with_build_timeout(config.cache.build_timeout());
    let cache = Arc::new(cache);

    info!(
        cache_dir = %config.cache.dir.display(),
        fixture = %cli.fixture.display(),
        "kgraph starting"
    );

    match cli.command {
        Commands::Build { graph: Some(graph_type) } => {
            cache.get_or_rebuild(graph_type)?;
            print_json(&cache.status(graph_type)?)
        }
        Commands::Build { graph: None } => {
            let restored = cache.warm_up();
            info!(restored, "warm-up finished");

            let mut failed = Vec::new();
            for (graph_type, result) in cache.build_all() {
                if let Err(e) = result {
                    error!(graph_type = %graph_type, error = %e, "build failed");
                    failed.push(format!("{graph_type}: {e}"));
                }
            }
            print_json(&cache.status_all()?)?;
            if !failed.is_empty() {
                bail!("failed to build {}", failed.join("; "));
            }
            Ok(())
        }
        Commands::Rebuild { graph } => {
            cache.force_rebuild(graph)?;
            print_json(&cache.status(graph)?)
        }
        Commands::Status => print_json(&cache.status_all()?),
        Commands::Invalidate { graph } => {
            let invalidated = cache.invalidate(graph)?;
            print_json(&serde_json::json!({
                "graph_type": graph,
                "invalidated": invalidated,
            }))
        }
        command => {
            let queries = GraphQueryService::from_config(cache, &config)?;
            run_query(&queries, command)
        }
    }
}

fn run_query(queries: &GraphQueryService, command: Commands) -> Result<()> {
    match command {
        Commands::Pagerank {
            graph,
            top_k,
            damping,
        } => print_json(&queries.page_rank(graph, top_k, damping)?),
        Commands::Centrality {
            graph,
            metric,
            top_k,
        } => print_json(&queries.centrality(graph, metric, top_k)?),
        Commands::Communities { graph, algorithm } => {
            print_json(&queries.detect_communities(graph, algorithm)?)
        }
        Commands::Cycles { graph } => print_json(&queries.find_cycles(graph)?),
        Commands::Components { graph } => print_json(&queries.connected_components(graph)?),
        Commands::Stats { graph } => print_json(&queries.statistics(graph)?),
        Commands::Build { .. }
        | Commands::Rebuild { .. }
        | Commands::Status
        | Commands::Invalidate { .. } => Ok(()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
