mod cache;
mod config;
mod metrics;
mod models;
mod registry;
mod routes;
mod runner;

use anyhow::{Context, Result};
use crawl::CrawlerClient;
use extract::{Analyzer, GeminiClient};
use graph::{GraphStore, MemoryGraphStore, Neo4jGraphStore};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::cache::ResponseCache;
use crate::config::{GraphBackendKind, ServiceConfig};
use crate::metrics::Metrics;
use crate::registry::RunRegistry;
use crate::routes::{router, AppState};
use crate::runner::{GraphBackend, PipelineRunner};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = ServiceConfig::from_env().context("Invalid service configuration")?;

    let crawler = Arc::new(CrawlerClient::new(config.crawler.clone()));
    let analyzer = Arc::new(Analyzer::new(GeminiClient::new(config.gemini.clone())));

    // Runs against Neo4j open their own connection; this one serves the graph routes
    let (backend, graph): (GraphBackend, Arc<dyn GraphStore>) = match config.graph_backend {
        GraphBackendKind::Neo4j => {
            let store = Neo4jGraphStore::connect(&config.neo4j)
                .await
                .context("Failed to connect to Neo4j")?;
            store
                .init_schema()
                .await
                .context("Failed to initialize Neo4j schema")?;
            let graph: Arc<dyn GraphStore> = Arc::new(store);
            (GraphBackend::Neo4j(config.neo4j.clone()), graph)
        }
        GraphBackendKind::Memory => {
            let store = Arc::new(MemoryGraphStore::new(config.neo4j.write_mode));
            let graph: Arc<dyn GraphStore> = store.clone();
            (GraphBackend::Memory(store), graph)
        }
    };

    let runner = PipelineRunner::new(crawler, analyzer, backend, config.orchestrator.clone());

    let state = Arc::new(AppState {
        runner: Arc::new(runner),
        graph,
        cache: ResponseCache::new(&config.cache),
        registry: RunRegistry::new(config.registry_max_entries),
        metrics: Metrics::new(),
        filter: config.filter.build(),
        backend: config.graph_backend,
        gemini_configured: !config.gemini.api_key.is_empty(),
        crawler_configured: !config.crawler.api_key.is_empty(),
    });

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %config.bind_addr,
        backend = ?config.graph_backend,
        write_mode = ?config.neo4j.write_mode,
        "Server listening"
    );

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// `RUST_LOG` picks the filter (default `info`); `LOG_FORMAT=json` switches
/// to JSON lines.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}
