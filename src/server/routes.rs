//! HTTP route handlers for the retrieval API.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::retrieval::context::expander::ExpansionStats;
use crate::retrieval::context::format::{ContextStats, SourceInfo};
use crate::retrieval::core::errors::RetrievalError;
use crate::retrieval::fusion::metrics::FusionMetrics;
use crate::retrieval::fusion::rrf::FusedResult;

use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/search", get(search))
        .route("/api/context", get(context))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.pipeline.health();
    Json(serde_json::json!({
        "status": "ok",
        "service": "canon-fusion",
        "version": env!("CARGO_PKG_VERSION"),
        "aliases": health.aliases,
        "synonym_terms": health.synonyms.term_count
    }))
}

/// Query string of the retrieval endpoints.
#[derive(Debug, Deserialize)]
pub struct QueryParams {
    /// The question.
    #[serde(default)]
    pub q: String,
}

/// Fused search response.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    /// The question, trimmed.
    pub query: String,
    /// `ok`, or `no_matches` when nothing was found.
    pub status: &'static str,
    /// Ranked results.
    pub results: Vec<FusedResult>,
    /// Fusion metrics.
    pub metrics: FusionMetrics,
}

/// Prepared context response.
#[derive(Debug, Serialize)]
pub struct ContextResponse {
    /// The question, trimmed.
    pub query: String,
    /// `ok`, or `no_matches` when nothing was found.
    pub status: &'static str,
    /// Rendered context.
    pub context: String,
    /// Context statistics.
    pub stats: ContextStats,
    /// Cited volumes.
    pub sources: Vec<SourceInfo>,
    /// Expansion statistics, when expansion ran.
    pub expansion: Option<ExpansionStats>,
    /// Fusion metrics.
    pub metrics: FusionMetrics,
}

const fn match_status(metrics: &FusionMetrics) -> &'static str {
    if metrics.fusion.output_count == 0 {
        "no_matches"
    } else {
        "ok"
    }
}

fn require_query(params: &QueryParams) -> Result<String, (StatusCode, String)> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query must not be empty".to_string()));
    }
    Ok(query.to_string())
}

fn unavailable(err: &RetrievalError) -> (StatusCode, String) {
    tracing::warn!(error = %err, "retrieval failed");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "search temporarily unavailable".to_string(),
    )
}

/// Handle fused search requests.
async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let query = require_query(&params)?;
    let outcome = state
        .pipeline
        .search(&query)
        .await
        .map_err(|err| unavailable(&err))?;

    Ok(Json(SearchResponse {
        status: match_status(&outcome.metrics),
        query,
        results: outcome.results,
        metrics: outcome.metrics,
    }))
}

/// Handle context preparation requests.
async fn context(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<ContextResponse>, (StatusCode, String)> {
    let query = require_query(&params)?;
    let prepared = state
        .pipeline
        .prepare_context(&query)
        .await
        .map_err(|err| unavailable(&err))?;

    Ok(Json(ContextResponse {
        status: match_status(&prepared.metrics),
        query,
        context: prepared.context.text,
        stats: prepared.context.stats,
        sources: prepared.context.sources,
        expansion: prepared.expansion,
        metrics: prepared.metrics,
    }))
}
