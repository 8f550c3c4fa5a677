use axum::http::header;
use axum::{
    extract::{DefaultBodyLimit, Path as UrlPath, Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;

use crate::catalog::memory::InMemoryProfileStore;
use crate::catalog::store::{SearchQuery, UpsertAction, UpsertOutcome};
use crate::cli::ServeArgs;
use crate::config::{AppConfig, ServerConfig};
use crate::core::marker::MarkerMap;
use crate::core::panel::PanelSize;
use crate::core::profile::{Profile, ProfilePatch, ProfileSubmission};
use crate::core::types::{ErrorKind, KitId};
use crate::ingest::bulk::{BulkOptions, IngestError};
use crate::matching::engine::MatchOptions;
use crate::report::export::{write_json, write_text, write_tsv};
use crate::service::{ServiceError, YstrService};

/// Largest page a single search or match request may ask for
pub const MAX_PAGE_SIZE: usize = 1000;

/// Shared application state
pub struct AppState {
    pub service: YstrService,
    /// Persisted after writes and on shutdown
    pub store: Arc<InMemoryProfileStore>,
    pub config: AppConfig,
}

/// Enhanced error response
#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub error_type: String,
    pub details: Option<String>,
}

/// Create a safe error response that prevents information disclosure
/// while logging detailed errors server-side for debugging
pub fn create_safe_error_response(
    error_type: &str,
    user_message: &str,
    internal_error: Option<&str>,
) -> ErrorResponse {
    if let Some(internal_msg) = internal_error {
        tracing::error!("Internal error ({}): {}", error_type, internal_msg);
    }

    ErrorResponse {
        error: user_message.to_string(),
        error_type: error_type.to_string(),
        details: None,
    }
}

/// HTTP status for each error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput | ErrorKind::InvalidSchema => StatusCode::BAD_REQUEST,
        ErrorKind::NoValidSamples => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::StoreUnavailable | ErrorKind::MatchingFailed | ErrorKind::CacheUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ErrorKind::ChunkUpsertFailed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Service error rendered as a JSON error response
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        let internal = self.0.to_string();

        let body = if status.is_client_error() {
            create_safe_error_response(kind.as_str(), &internal, None)
        } else {
            let message = match &self.0 {
                ServiceError::Ingest(IngestError::ChunkUpsertFailed {
                    chunk_index,
                    inserted_so_far,
                    ..
                }) => format!(
                    "Import stopped at chunk {chunk_index}; {inserted_so_far} profiles were written"
                ),
                _ => "Profile store unavailable, try again later".to_string(),
            };
            create_safe_error_response(kind.as_str(), &message, Some(&internal))
        };
        (status, Json(body)).into_response()
    }
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(create_safe_error_response(
            ErrorKind::InvalidInput.as_str(),
            message,
            None,
        )),
    )
        .into_response()
}

/// Run the web server
///
/// # Errors
///
/// Returns an error if the tokio runtime cannot be created, the database
/// cannot be opened, or the server fails to start.
pub fn run(args: ServeArgs, db: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let session = crate::cli::Session::open(db, config)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let state = Arc::new(AppState {
            service: session.service,
            store: session.store,
            config: session.config,
        });
        run_server(state, args).await
    })
}

/// API routes without the protective middleware stack
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/matches", post(matches_handler))
        .route("/api/profiles", get(search_handler))
        .route("/api/profiles/bulk", post(bulk_handler))
        .route(
            "/api/profiles/{kit}",
            get(get_profile_handler)
                .put(put_profile_handler)
                .patch(patch_profile_handler)
                .delete(delete_profile_handler),
        )
        .route("/api/export/{kit}", get(export_handler))
        .with_state(state)
}

/// Create the application router with all routes and middleware configured.
///
/// # Errors
///
/// Returns an error if the rate limiter configuration is rejected.
pub fn create_router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let server = state.config.server.clone();

    let governor_conf = GovernorConfigBuilder::default()
        .per_second(10)
        .burst_size(50)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?;

    let app = api_routes(state).layer(
        ServiceBuilder::new()
            // Security headers for browser protection
            .layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static("x-content-type-options"),
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static("x-frame-options"),
                HeaderValue::from_static("DENY"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static("strict-transport-security"),
                HeaderValue::from_static("max-age=31536000; includeSubDomains"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static("referrer-policy"),
                HeaderValue::from_static("strict-origin-when-cross-origin"),
            ))
            // IP-based rate limiting
            .layer(GovernorLayer {
                config: Arc::new(governor_conf),
            })
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(server.request_timeout_seconds),
            ))
            .layer(ConcurrencyLimitLayer::new(server.concurrency_limit))
            .layer(DefaultBodyLimit::max(server.body_limit_bytes)),
    );

    Ok(app)
}

async fn run_server(state: Arc<AppState>, args: ServeArgs) -> anyhow::Result<()> {
    let ServerConfig { address, port, .. } = state.config.server.clone();
    let addr = format!(
        "{}:{}",
        args.address.unwrap_or(address),
        args.port.unwrap_or(port)
    );
    let app = create_router(state.clone())?;

    tracing::info!(
        profiles = state.store.len(),
        cache = %state.service.cache().state(),
        "Starting ystr-matcher web server at http://{addr}"
    );
    println!("Starting ystr-matcher web server at http://{addr}");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped, saving profile database");
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || store.save()).await??;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Write the snapshot off the request path; failures are logged only
async fn persist(state: &AppState) {
    let store = state.store.clone();
    match tokio::task::spawn_blocking(move || store.save()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Failed to save profile database"),
        Err(e) => tracing::error!(error = %e, "Snapshot task failed"),
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let report = state.service.health().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let stats = state.service.statistics().await?;
    Ok(Json(stats).into_response())
}

/// Body of `POST /api/matches`
#[derive(Deserialize)]
pub struct MatchRequest {
    pub markers: MarkerMap,
    #[serde(flatten)]
    pub options: MatchOptions,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_page_size")]
    pub limit: usize,
}

fn default_page_size() -> usize {
    100
}

async fn matches_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MatchRequest>,
) -> Result<Response, ApiError> {
    if request.limit == 0 || request.limit > MAX_PAGE_SIZE {
        return Ok(bad_request(&format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    let page = state
        .service
        .find_matches_page(
            &request.markers,
            &request.options,
            request.offset,
            request.limit,
        )
        .await?;
    Ok(Json(page).into_response())
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub haplogroup: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    let defaults = SearchQuery::default();
    let query = SearchQuery {
        term: params.q.filter(|q| !q.trim().is_empty()),
        haplogroup: params.haplogroup.filter(|h| !h.trim().is_empty()),
        limit: params.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
        offset: params.offset.unwrap_or(0),
    };
    let hits = state.service.search(&query).await?;
    Ok(Json(hits).into_response())
}

async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(kit): UrlPath<String>,
) -> Result<Response, ApiError> {
    let profile = state.service.get_profile(&KitId::new(kit.trim())).await?;
    Ok(Json(profile).into_response())
}

/// Body of `PUT /api/profiles/{kit}`
#[derive(Deserialize)]
pub struct ProfileBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub haplogroup: String,
    pub markers: MarkerMap,
}

fn outcome_response(outcome: UpsertOutcome) -> Response {
    let status = match outcome.action {
        UpsertAction::Created => StatusCode::CREATED,
        UpsertAction::Updated => StatusCode::OK,
    };
    (status, Json(outcome)).into_response()
}

async fn put_profile_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(kit): UrlPath<String>,
    Json(body): Json<ProfileBody>,
) -> Result<Response, ApiError> {
    let profile = Profile::new(kit, body.markers)
        .with_name(body.name)
        .with_country(body.country)
        .with_haplogroup(body.haplogroup);
    let outcome = state.service.upsert_profile(profile).await?;
    persist(&state).await;
    Ok(outcome_response(outcome))
}

async fn patch_profile_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(kit): UrlPath<String>,
    Json(patch): Json<ProfilePatch>,
) -> Result<Response, ApiError> {
    let outcome = state
        .service
        .update_profile(&KitId::new(kit.trim()), patch)
        .await?;
    persist(&state).await;
    Ok(outcome_response(outcome))
}

async fn delete_profile_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(kit): UrlPath<String>,
) -> Result<Response, ApiError> {
    let removed = state.service.delete_profile(&KitId::new(kit.trim())).await?;
    persist(&state).await;
    Ok(Json(removed).into_response())
}

/// Body of `POST /api/profiles/bulk`.
///
/// `replaceExisting` is read at the top level or inside `options`; the top
/// level wins when both are present.
#[derive(Deserialize)]
pub struct BulkRequest {
    pub samples: Vec<ProfileSubmission>,
    #[serde(default, alias = "replaceExisting")]
    pub replace_existing: Option<bool>,
    #[serde(default)]
    pub options: Option<BulkOptions>,
}

impl BulkRequest {
    pub fn bulk_options(&self) -> BulkOptions {
        let mut options = self.options.unwrap_or_default();
        if let Some(replace) = self.replace_existing {
            options.replace_existing = replace;
        }
        options
    }
}

async fn bulk_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BulkRequest>,
) -> Result<Response, ApiError> {
    let options = request.bulk_options();
    let result = state
        .service
        .bulk_upsert(request.samples, &options)
        .await;
    // Committed chunks stay committed on failure
    persist(&state).await;
    Ok(Json(result?).into_response())
}

#[derive(Deserialize, Default, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Tsv,
    Text,
}

#[derive(Deserialize)]
pub struct ExportParams {
    pub panel: Option<u32>,
    pub top: Option<usize>,
    pub max_distance: Option<u32>,
    #[serde(default)]
    pub format: ReportFormat,
}

async fn export_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(kit): UrlPath<String>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let mut options = state.config.export_options();
    if let Some(count) = params.panel {
        match PanelSize::try_from(count) {
            Ok(panel) => options.panel = Some(panel),
            Err(e) => return Ok(bad_request(&e.to_string())),
        }
    }
    if let Some(top) = params.top {
        options.top_matches = top;
    }
    if let Some(max_distance) = params.max_distance {
        options.max_distance = max_distance;
    }

    let report = state.service.export(&KitId::new(kit), &options).await?;

    let mut body = Vec::new();
    let (content_type, written) = match params.format {
        ReportFormat::Json => ("application/json", write_json(&report, &mut body)),
        ReportFormat::Tsv => (
            "text/tab-separated-values; charset=utf-8",
            write_tsv(&report, &mut body),
        ),
        ReportFormat::Text => ("text/plain; charset=utf-8", write_text(&report, &mut body)),
    };
    if let Err(e) = written {
        let error = create_safe_error_response(
            "internal",
            "Failed to render report",
            Some(&e.to_string()),
        );
        return Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response());
    }

    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}
