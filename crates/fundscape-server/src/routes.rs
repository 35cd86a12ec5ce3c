//! Router and handlers
//!
//! Every handler validates its parameters first, then takes one table
//! snapshot and runs a view over it. Table reads happen on the blocking pool.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use fundscape_core::BreadthCaps;
use fundscape_query::{
    FieldSummary, FunderSummary, ResearchFilter, ResearchRow, SubfieldSummary, required_id,
    required_str,
};
use fundscape_store::{Table, TableStore, TopicEntry};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::error::{ApiError, StatusError};

/// Application state shared across handlers.
#[derive(Debug)]
pub struct AppState {
    pub store: TableStore,
    pub caps: BreadthCaps,
}

impl AppState {
    pub fn new(store: TableStore) -> Self {
        Self {
            store,
            caps: BreadthCaps::default(),
        }
    }
}

/// `{"count": n, "data": [...]}`
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub count: usize,
    pub data: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self {
            count: data.len(),
            data,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/api/health", get(handle_health))
        .route("/api/fields", get(handle_fields))
        .route("/api/subfields", get(handle_subfields))
        .route("/api/funders", get(handle_funders))
        .route("/api/topics", get(handle_topics))
        .route("/api/research_data", get(handle_research_data))
        .route("/api/reload", post(handle_reload))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Current snapshot, reading the table on a cache miss.
async fn snapshot(state: &Arc<AppState>) -> Result<Arc<Table>, ApiError> {
    if let Some(table) = state.store.cached() {
        return Ok(table);
    }
    let state = Arc::clone(state);
    let table = tokio::task::spawn_blocking(move || state.store.load())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(table)
}

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    version: &'static str,
    endpoints: BTreeMap<&'static str, &'static str>,
}

/// GET /
async fn handle_root() -> Json<RootResponse> {
    let endpoints = BTreeMap::from([
        ("/api/health", "Check API health and data status"),
        ("/api/fields", "All target fields with works and funder totals"),
        (
            "/api/subfields?field_id=<id>",
            "Top subfields of a field, by funder count",
        ),
        ("/api/funders?subfield_id=<id>", "Top funders of a subfield"),
        (
            "/api/topics?funder_id=<id>&subfield_id=<id>",
            "Top topics for a funder within a subfield",
        ),
        (
            "/api/research_data?field_id=<id>&subfield_id=<id>&funder_id=<id>&topic_id=<id>",
            "Filtered research data for visualization",
        ),
        ("/api/reload", "Reload data from the table file (POST)"),
    ]);
    Json(RootResponse {
        name: "Research Funding Landscape API",
        version: env!("CARGO_PKG_VERSION"),
        endpoints,
    })
}

#[derive(Serialize)]
struct RecordCounts {
    total: usize,
    fields: usize,
    subfields: usize,
    funders: usize,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    data_loaded: bool,
    last_updated: Option<String>,
    country: Option<String>,
    year_range: Option<String>,
    records: RecordCounts,
    malformed_topic_rows: usize,
    anomalies: usize,
    source: String,
    /// When this snapshot was read into memory (RFC 3339)
    loaded_at: String,
}

/// GET /api/health
async fn handle_health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, StatusError> {
    let table = snapshot(&state).await?;
    let stats = table.stats();
    Ok(Json(HealthResponse {
        status: "healthy",
        data_loaded: true,
        last_updated: stats.fetch_date,
        country: stats.country_code,
        year_range: stats.year_range,
        records: RecordCounts {
            total: stats.total,
            fields: stats.fields,
            subfields: stats.subfields,
            funders: stats.funders,
        },
        malformed_topic_rows: stats.malformed_topic_rows,
        anomalies: stats.anomalies,
        source: table.source().display().to_string(),
        loaded_at: table.loaded_at().to_rfc3339(),
    }))
}

/// GET /api/fields
async fn handle_fields(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListResponse<FieldSummary>>, ApiError> {
    let table = snapshot(&state).await?;
    Ok(Json(fundscape_query::fields(table.records()).into()))
}

#[derive(Debug, Deserialize)]
struct SubfieldsParams {
    field_id: Option<String>,
}

/// GET /api/subfields?field_id=
async fn handle_subfields(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SubfieldsParams>,
) -> Result<Json<ListResponse<SubfieldSummary>>, ApiError> {
    let field_id = required_id("field_id", params.field_id.as_deref())?;
    let table = snapshot(&state).await?;
    let data = fundscape_query::subfields(table.records(), field_id, state.caps.subfields);
    Ok(Json(data.into()))
}

#[derive(Debug, Deserialize)]
struct FundersParams {
    subfield_id: Option<String>,
}

/// GET /api/funders?subfield_id=
async fn handle_funders(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FundersParams>,
) -> Result<Json<ListResponse<FunderSummary>>, ApiError> {
    let subfield_id = required_id("subfield_id", params.subfield_id.as_deref())?;
    let table = snapshot(&state).await?;
    let data = fundscape_query::funders(table.records(), subfield_id, state.caps.funders);
    Ok(Json(data.into()))
}

#[derive(Debug, Deserialize)]
struct TopicsParams {
    funder_id: Option<String>,
    subfield_id: Option<String>,
}

/// GET /api/topics?funder_id=&subfield_id=
async fn handle_topics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TopicsParams>,
) -> Result<Json<ListResponse<TopicEntry>>, ApiError> {
    let funder_id = required_str("funder_id", params.funder_id.as_deref())?;
    let subfield_id = required_id("subfield_id", params.subfield_id.as_deref())?;
    let table = snapshot(&state).await?;
    let data =
        fundscape_query::topics(table.records(), funder_id, subfield_id, state.caps.topics);
    Ok(Json(data.into()))
}

#[derive(Debug, Deserialize)]
struct ResearchParams {
    field_id: Option<String>,
    subfield_id: Option<String>,
    funder_id: Option<String>,
    topic_id: Option<String>,
}

/// GET /api/research_data
async fn handle_research_data(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResearchParams>,
) -> Result<Json<ListResponse<ResearchRow>>, ApiError> {
    let filter = ResearchFilter::from_params(
        params.field_id.as_deref(),
        params.subfield_id.as_deref(),
        params.funder_id.as_deref(),
        params.topic_id.as_deref(),
    )?;
    let table = snapshot(&state).await?;
    Ok(Json(
        fundscape_query::research_data(table.records(), &filter).into(),
    ))
}

#[derive(Serialize)]
struct ReloadResponse {
    status: &'static str,
    message: &'static str,
    records: usize,
}

/// POST /api/reload
async fn handle_reload(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReloadResponse>, StatusError> {
    let store_state = Arc::clone(&state);
    let table = tokio::task::spawn_blocking(move || store_state.store.invalidate_and_reload())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    log::info!(
        "reload: {} records from {}",
        table.len(),
        state.store.path().display()
    );
    Ok(Json(ReloadResponse {
        status: "success",
        message: "Data reloaded successfully",
        records: table.len(),
    }))
}
