use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use crawl::{SearchOptions, ValidationError};
use extract::prompt::{DEFAULT_REASONING_DEPTH, MAX_REASONING_DEPTH};
use extract::NegativityFilter;
use graph::{GraphSnapshot, GraphStore, GraphStoreError};
use orchestrator::RunState;
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use uuid::Uuid;

use crate::cache::{CacheStats, ResponseCache};
use crate::config::GraphBackendKind;
use crate::metrics::{Metrics, MetricsSnapshot, TimedOperation};
use crate::models::{
    DeepAnalysis, DeepResearchRequest, DeepResearchResponse, HealthResponse, NeighborhoodQuery,
    ReasoningRequest, ReasoningResponse, ResearchRequest, ResearchResponse, StatusResponse,
};
use crate::registry::RunRegistry;
use crate::runner::{ResearchRunner, RunError, TransitionFn};

pub const DEFAULT_NEIGHBORHOOD_DEPTH: u32 = 2;

pub struct AppState {
    pub runner: Arc<dyn ResearchRunner>,
    /// Long-lived handle for the graph read routes
    pub graph: Arc<dyn GraphStore>,
    pub cache: ResponseCache<ResearchResponse>,
    pub registry: RunRegistry,
    pub metrics: Arc<Metrics>,
    pub filter: NegativityFilter,
    pub backend: GraphBackendKind,
    pub gemini_configured: bool,
    pub crawler_configured: bool,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/cache/stats", get(cache_stats))
        .route("/research", post(research))
        .route("/research/deep", post(deep_research))
        .route("/research/cot", post(reason_research))
        .route("/research/:id/status", get(research_status))
        .route("/research/:id/results", get(research_results))
        .route("/graph", get(full_graph))
        .route("/graph/:entity_id", get(neighborhood))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Client errors carry their message; server errors only a generic one,
/// the details go to the log. A failed research run also reports its id so
/// its final status stays retrievable.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(&'static str),
    RunFailed { id: String, message: &'static str },
}

impl ApiError {
    fn for_run(self, id: String) -> Self {
        match self {
            ApiError::Internal(message) => ApiError::RunFailed { id, message },
            other => other,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            ApiError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message }))
            }
            ApiError::RunFailed { id, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": message, "id": id }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<GraphStoreError> for ApiError {
    fn from(e: GraphStoreError) -> Self {
        match e {
            GraphStoreError::InvalidParameter(message) => ApiError::BadRequest(message),
            other => {
                error!(error = %other, "Graph store request failed");
                ApiError::Internal("An error occurred while reading the graph")
            }
        }
    }
}

fn run_error(e: RunError, message: &'static str) -> ApiError {
    match e {
        RunError::Research(e) if e.is_validation() => ApiError::BadRequest(e.cause.to_string()),
        other => {
            error!(error = %other, "{message}");
            ApiError::Internal(message)
        }
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let graph = match state.graph.ping().await {
        Ok(()) => "ok".to_string(),
        Err(e) => format!("error: {e}"),
    };

    Json(HealthResponse {
        graph,
        backend: state.backend,
        gemini_configured: state.gemini_configured,
        crawler_configured: state.crawler_configured,
    })
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.cache.stats())
}

async fn research(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResearchRequest>,
) -> Result<Json<ResearchResponse>, ApiError> {
    let timer = TimedOperation::start();
    let task = request.into_task();
    if let Err(e) = task.validate() {
        state.metrics.record_request(false);
        return Err(e.into());
    }

    if let Some(mut cached) = state.cache.get(&task.query) {
        info!(id = %cached.id, query = %task.query, "Serving cached research");
        state.metrics.record_cache_hit();
        state.metrics.record_request(true);
        cached.cached = true;
        return Ok(Json(cached));
    }

    let id = Uuid::new_v4().to_string();
    let query = task.query.clone();
    let registry = state.registry.clone();
    let run_id = id.clone();
    let on_transition: TransitionFn =
        Box::new(move |s: RunState| registry.set_status(&run_id, s));

    let mut outcome = match state.runner.research(task, on_transition).await {
        Ok(outcome) => outcome,
        Err(e) => {
            state.metrics.record_request(false);
            return Err(run_error(e, "An error occurred during research").for_run(id));
        }
    };
    outcome.insights = state.filter.filter(&outcome.insights);

    state.metrics.record_research(timer.elapsed(), &outcome.stats);
    state.metrics.record_request(true);

    let response = ResearchResponse {
        id: id.clone(),
        query: query.clone(),
        cached: false,
        result: outcome,
    };
    state.registry.store_result(&id, response.clone());
    state.cache.set(&query, response.clone());

    Ok(Json(response))
}

async fn deep_research(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeepResearchRequest>,
) -> Result<Json<DeepResearchResponse>, ApiError> {
    let timer = TimedOperation::start();
    if request.query.trim().is_empty() {
        state.metrics.record_request(false);
        return Err(ValidationError::EmptyQuery.into());
    }
    if request.max_pages == Some(0) {
        state.metrics.record_request(false);
        return Err(ValidationError::ZeroMaxPages.into());
    }

    let options = SearchOptions {
        domains: None,
        language: request.language,
        max_results: request.max_pages,
    };

    let deep = match state.runner.deep_research(&request.query, &options).await {
        Ok(deep) => deep,
        Err(e) => {
            state.metrics.record_request(false);
            return Err(run_error(e, "An error occurred during deep research"));
        }
    };

    state.metrics.record_deep_research(timer.elapsed(), deep.results.len());
    state.metrics.record_request(true);

    let insights = state.filter.filter(&deep.analysis.keywords);
    Ok(Json(DeepResearchResponse {
        results: deep.results,
        analysis: DeepAnalysis {
            summary: deep.analysis.summary,
            sentiment: deep.analysis.sentiment,
            keywords: deep.analysis.keywords,
            insights,
            questions: deep.questions,
        },
    }))
}

/// Staged hypothesis verification over crawler search results. The model's
/// reasoning is returned as free text.
async fn reason_research(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReasoningRequest>,
) -> Result<Json<ReasoningResponse>, ApiError> {
    let timer = TimedOperation::start();
    if request.query.trim().is_empty() {
        state.metrics.record_request(false);
        return Err(ValidationError::EmptyQuery.into());
    }
    if request.max_pages == Some(0) {
        state.metrics.record_request(false);
        return Err(ValidationError::ZeroMaxPages.into());
    }
    let depth = request.depth.unwrap_or(DEFAULT_REASONING_DEPTH);
    if !(1..=MAX_REASONING_DEPTH).contains(&depth) {
        state.metrics.record_request(false);
        return Err(ApiError::BadRequest(format!(
            "depth must be between 1 and {MAX_REASONING_DEPTH}, got {depth}"
        )));
    }

    let options = SearchOptions {
        domains: None,
        language: request.language,
        max_results: request.max_pages,
    };
    let hypothesis = request.hypothesis.filter(|h| !h.trim().is_empty());

    let reasoning = match state
        .runner
        .reason(&request.query, &options, hypothesis.as_deref(), depth)
        .await
    {
        Ok(reasoning) => reasoning,
        Err(e) => {
            state.metrics.record_request(false);
            return Err(run_error(e, "An error occurred during chain-of-thought research"));
        }
    };

    state.metrics.record_deep_research(timer.elapsed(), reasoning.results.len());
    state.metrics.record_request(true);

    Ok(Json(ReasoningResponse {
        query: request.query,
        hypothesis,
        depth,
        results: reasoning.results,
        reasoning: reasoning.text,
    }))
}

async fn research_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<StatusResponse> {
    let status = state
        .registry
        .status(&id)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|| "not_found".to_string());

    Json(StatusResponse { id, status })
}

async fn research_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ResearchResponse>, ApiError> {
    state
        .registry
        .result(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no results for research {id}")))
}

async fn full_graph(State(state): State<Arc<AppState>>) -> Result<Json<GraphSnapshot>, ApiError> {
    Ok(Json(state.graph.read_all().await?))
}

async fn neighborhood(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Query(params): Query<NeighborhoodQuery>,
) -> Result<Json<GraphSnapshot>, ApiError> {
    let depth = params.depth.unwrap_or(DEFAULT_NEIGHBORHOOD_DEPTH);
    Ok(Json(state.graph.read_neighborhood(&entity_id, depth).await?))
}
