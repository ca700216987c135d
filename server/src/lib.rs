use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use jobs_annotator::{concepts_or_empty, Annotation, Annotator, WikifierClient, WikifierConfig};
use jobs_core::persist::{load_meta, DataPaths, PendingPostings};
use jobs_core::relevance::rank;
use jobs_core::stats::TimeSeriesEntry;
use jobs_core::{AnalyticsContext, JobQuery, Posting, PostingId, SledStore, StatEntry, StoreMode, TopN, UpdateReport};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod cache;
pub mod format;

use cache::ResponseCache;
use format::{render, render_list, View};

/// Skills kept per day in truncated stats lists.
const SKILLS_PER_DAY: usize = 10;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub admin_token: Option<String>,
    /// Comma-separated origins; any origin when unset or empty.
    pub cors_allow_origin: Option<String>,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { admin_token: None, cors_allow_origin: None, cache_ttl: Duration::from_secs(3600), cache_capacity: 10_000 }
    }
}

impl ServerConfig {
    /// Reads `ADMIN_TOKEN`, `CORS_ALLOW_ORIGIN` and `CACHE_TTL_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            admin_token: std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            cors_allow_origin: std::env::var("CORS_ALLOW_ORIGIN").ok(),
            cache_ttl: std::env::var("CACHE_TTL_SECS").ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(defaults.cache_ttl),
            ..defaults
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<AnalyticsContext<SledStore>>,
    pub annotator: Arc<dyn Annotator>,
    pub cache: ResponseCache,
    pub admin_token: Option<String>,
}

/// Opens the store and pending file, connects the annotation client from the
/// environment and builds the router.
pub fn build_app(db: &str, pending: &str) -> Result<Router> {
    let store = SledStore::open(db, StoreMode::ReadOnly)?;
    let pending = PendingPostings::open(pending)?;
    let ctx = AnalyticsContext::new(store, pending, OffsetDateTime::now_utc())?;
    tracing::info!(db, postings = ctx.store_len(), pending = ctx.pending_len(), "analytics context ready");
    if let Some(meta) = std::path::Path::new(db).parent().and_then(|root| load_meta(&DataPaths::new(root)).ok()) {
        tracing::info!(created_at = %meta.created_at, indexed = meta.num_postings, "store built by indexer");
    }
    let annotator = WikifierClient::new(WikifierConfig::from_env())?;
    Ok(build_app_with(Arc::new(ctx), Arc::new(annotator), ServerConfig::from_env()))
}

pub fn build_app_with(ctx: Arc<AnalyticsContext<SledStore>>, annotator: Arc<dyn Annotator>, config: ServerConfig) -> Router {
    let cors = cors_layer(config.cors_allow_origin.as_deref());
    let state = AppState { ctx, annotator, cache: ResponseCache::new(config.cache_ttl, config.cache_capacity), admin_token: config.admin_token };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/stats/count", get(stats_count))
        .route("/api/v1/stats/lists", get(stats_lists))
        .route("/api/v1/stats/lists/skills", get(stats_skills))
        .route("/api/v1/stats/lists/:length", get(stats_lists_truncated))
        .route("/api/v1/jobs", get(jobs_full).post(post_jobs))
        .route("/api/v1/jobs/locations", get(jobs_locations))
        .route("/api/v1/jobs/skills", get(jobs_skills))
        .route("/api/v1/jobs/locations_and_skills", get(jobs_locations_and_skills))
        .route("/api/v1/jobs/:id", get(job_by_id))
        .route("/api/v1/jobs/:id/:view", get(job_view_by_id))
        .route("/api/v1/database/update", post(database_update))
        .route("/api/v1/wikify", get(wikify))
        .route("/api/v1/render_jobs", post(render_jobs))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(allow_origin: Option<&str>) -> CorsLayer {
    let origins: Vec<_> = allow_origin
        .unwrap_or("")
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    if origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self { Self { status, message: message.into() } }
}

impl From<jobs_core::Error> for ApiError {
    fn from(err: jobs_core::Error) -> Self {
        let status = match &err {
            jobs_core::Error::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            jobs_core::Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => {
                tracing::error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!(error = %err, "background task failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "background task failed")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response { (self.status, Json(serde_json::json!({ "error": self.message }))).into_response() }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// --- Statistics ---

#[derive(Serialize)]
pub struct StatsLists {
    pub skills: TopN<StatEntry>,
    pub locations: TopN<StatEntry>,
    pub countries: TopN<StatEntry>,
    pub time_series: TopN<TimeSeriesEntry>,
}

async fn stats_count(State(state): State<AppState>) -> Json<jobs_core::stats::Counts> { Json(state.ctx.stats().counts()) }

async fn stats_lists(State(state): State<AppState>) -> Json<StatsLists> { Json(stats_lists_of(&state, None, usize::MAX)) }

async fn stats_skills(State(state): State<AppState>) -> Json<TopN<StatEntry>> { Json(state.ctx.stats().skills(None)) }

async fn stats_lists_truncated(State(state): State<AppState>, Path(length): Path<usize>) -> Json<StatsLists> {
    Json(stats_lists_of(&state, Some(length), SKILLS_PER_DAY))
}

fn stats_lists_of(state: &AppState, length: Option<usize>, skills_per_day: usize) -> StatsLists {
    let stats = state.ctx.stats();
    StatsLists {
        skills: stats.skills(length),
        locations: stats.locations(length),
        countries: stats.countries(length),
        time_series: stats.recent_time_series(length.unwrap_or(usize::MAX), skills_per_day),
    }
}

// --- Job queries ---

#[derive(Debug, Default, Deserialize)]
pub struct JobsParams {
    pub skills: Option<String>,
    pub locations: Option<String>,
    pub countries: Option<String>,
}

async fn jobs_full(State(state): State<AppState>, Query(params): Query<JobsParams>) -> ApiResult<Value> {
    jobs_in_view(&state, &params, View::Full, "jobs")
}

async fn jobs_locations(State(state): State<AppState>, Query(params): Query<JobsParams>) -> ApiResult<Value> {
    jobs_in_view(&state, &params, View::Location, "jobs/locations")
}

async fn jobs_skills(State(state): State<AppState>, Query(params): Query<JobsParams>) -> ApiResult<Value> {
    jobs_in_view(&state, &params, View::Skills, "jobs/skills")
}

async fn jobs_locations_and_skills(State(state): State<AppState>, Query(params): Query<JobsParams>) -> ApiResult<Value> {
    jobs_in_view(&state, &params, View::LocationsAndSkills, "jobs/locations_and_skills")
}

fn jobs_in_view(state: &AppState, params: &JobsParams, view: View, route: &str) -> ApiResult<Value> {
    let query = JobQuery::from_lists(params.skills.as_deref(), params.locations.as_deref(), params.countries.as_deref())?;
    let key = query.cache_key(route)?;
    if let Some(hit) = state.cache.get(&key) {
        return Ok(Json(hit));
    }
    let postings = state.ctx.query(&query)?;
    let answer = serde_json::to_value(render_list(&postings, view)).map_err(jobs_core::Error::from)?;
    state.cache.insert(key, answer.clone());
    Ok(Json(answer))
}

async fn job_by_id(State(state): State<AppState>, Path(id): Path<PostingId>) -> ApiResult<format::JobView> {
    Ok(Json(render(&state.ctx.posting(id)?, View::Full)))
}

async fn job_view_by_id(State(state): State<AppState>, Path((id, view)): Path<(PostingId, String)>) -> ApiResult<format::JobView> {
    let view = View::parse(&view).ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, format!("unknown view '{view}'")))?;
    Ok(Json(render(&state.ctx.posting(id)?, view)))
}

#[derive(Debug, Serialize)]
pub struct StoredPending {
    pub stored: usize,
    pub pending: usize,
}

async fn post_jobs(State(state): State<AppState>, Json(postings): Json<Vec<Posting>>) -> ApiResult<StoredPending> {
    let stored = state.ctx.store_pending(postings)?;
    Ok(Json(StoredPending { stored, pending: state.ctx.pending_len() }))
}

// --- Admin ---

async fn database_update(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<UpdateReport> {
    authorize(&state, &headers)?;
    let ctx = state.ctx.clone();
    let report = tokio::task::spawn_blocking(move || ctx.update_database(OffsetDateTime::now_utc())).await??;
    state.cache.clear();
    Ok(Json(report))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> std::result::Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError::new(StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set")),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError::new(StatusCode::UNAUTHORIZED, "invalid admin token"))
    }
}

// --- Annotation ---

#[derive(Debug, Deserialize)]
pub struct WikifyParams {
    pub text: String,
    #[serde(default = "default_lang")]
    pub lang: String,
}
fn default_lang() -> String { "en".into() }

#[derive(Debug, Serialize)]
pub struct WikifyResponse {
    pub count: usize,
    pub annotations: Vec<Annotation>,
}

async fn wikify(State(state): State<AppState>, Query(params): Query<WikifyParams>) -> Json<WikifyResponse> {
    let annotations = match state.annotator.annotate(&params.text, &params.lang).await {
        Ok(a) => a,
        Err(err) => {
            tracing::warn!(error = %err, "wikify failed");
            Vec::new()
        }
    };
    Json(WikifyResponse { count: annotations.len(), annotations })
}

#[derive(Debug, Deserialize)]
pub struct RenderJobsRequest {
    pub lecture_id: Value,
    pub video_id: Value,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Lecture categories, newline or `>` separated.
    #[serde(default)]
    pub categories: String,
}

#[derive(Debug, Serialize)]
pub struct RankedJob {
    pub id: PostingId,
    pub weight: f64,
    pub normalized: f64,
}

#[derive(Debug, Serialize)]
pub struct RenderJobsResponse {
    pub key: String,
    pub categories: Vec<format::CategoryMatch>,
    pub concepts: Vec<String>,
    pub count: usize,
    pub relevance: Vec<RankedJob>,
    pub jobs: format::Listing<format::JobView>,
}

/// Relevant postings for a lecture: annotate its text, score the recognised
/// concepts against the feature space, answer with the ranked postings.
async fn render_jobs(State(state): State<AppState>, Json(req): Json<RenderJobsRequest>) -> ApiResult<Value> {
    let key = format!("{}-{}", id_part(&req.lecture_id), id_part(&req.video_id));
    if let Some(hit) = state.cache.get(&key) {
        return Ok(Json(hit));
    }

    let categories = format::match_categories(&req.categories, state.ctx.stats().skill_bucket());
    let text = format!("{} {}", req.title, req.text);
    let annotated = concepts_or_empty(state.annotator.as_ref(), &text, &req.lang).await;

    let space = state.ctx.feature_space();
    let handle = space.current();
    let concepts: Vec<String> = annotated.into_iter().filter(|c| handle.vocabulary().contains(c)).collect();
    let scored = match space.score_with(&handle, &concepts) {
        Ok(scored) => scored,
        // reset between lookup and scoring
        Err(_) => state.ctx.relevant_jobs(&concepts),
    };

    let mut ranked = scored.relevance.clone();
    rank(&mut ranked);
    let relevance: Vec<RankedJob> = ranked
        .iter()
        .map(|r| RankedJob { id: r.id, weight: r.weight, normalized: jobs_core::relevance::normalize(r.weight, scored.query_concepts).unwrap_or(0.0) })
        .collect();
    let ids: Vec<PostingId> = relevance.iter().map(|r| r.id).collect();
    let jobs = render_list(&state.ctx.postings(&ids)?, View::Full);

    let response = RenderJobsResponse { key: key.clone(), categories, concepts, count: relevance.len(), relevance, jobs };
    tracing::info!(key = %response.key, concepts = response.concepts.len(), relevant = response.count, "rendered jobs");
    let answer = serde_json::to_value(&response).map_err(jobs_core::Error::from)?;
    state.cache.insert(key, answer.clone());
    Ok(Json(answer))
}

fn id_part(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
