//! redline-api - HTTP API server for the redline review engine

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use redline_core::{
    defaults, file_safety, Decision, FolderStore, RecommendationStore, SuggestionEngine,
};
use redline_inference::{OllamaBackend, RewriteEngine};
use redline_store::{compute_content_hash, Store};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
///
/// UUIDv7 embeds a Unix timestamp, so IDs sort chronologically — useful for
/// log correlation and debugging production incidents.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Global rate limiter type (direct quota, no keyed bucketing).
type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    store: Store,
    engine: Arc<dyn SuggestionEngine>,
    /// API key required on write methods (None disables auth, development mode).
    api_key: Option<String>,
    /// Global rate limiter (None if rate limiting is disabled).
    rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

/// Parse CORS origins from environment.
///
/// `ALLOWED_ORIGINS` - comma-separated list of allowed origins. Origin
/// whitelisting is strict: an unlisted origin gets no CORS headers.
fn parse_allowed_origins() -> Vec<HeaderValue> {
    let origins_str = std::env::var("ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string());

    if origins_str.trim().is_empty() {
        return vec![
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://localhost:5173"),
        ];
    }

    origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "redline_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "redline_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("redline-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(non_blocking);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            } else {
                layer = layer.with_ansi(false); // no ANSI in files
            }
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    // Get configuration from environment
    let data_dir =
        std::env::var("REDLINE_DATA_DIR").unwrap_or_else(|_| defaults::DATA_DIR.to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| defaults::SERVER_PORT.to_string())
        .parse()
        .unwrap_or(defaults::SERVER_PORT);

    // Rate limiting configuration
    // RATE_LIMIT_REQUESTS: requests per period (default: 100)
    // RATE_LIMIT_PERIOD_SECS: period in seconds (default: 60)
    let rate_limit_requests: u32 = std::env::var("RATE_LIMIT_REQUESTS")
        .unwrap_or_else(|_| defaults::RATE_LIMIT_REQUESTS.to_string())
        .parse()
        .unwrap_or(defaults::RATE_LIMIT_REQUESTS);
    let rate_limit_period_secs: u64 = std::env::var("RATE_LIMIT_PERIOD_SECS")
        .unwrap_or_else(|_| defaults::RATE_LIMIT_PERIOD_SECS.to_string())
        .parse()
        .unwrap_or(defaults::RATE_LIMIT_PERIOD_SECS);
    let rate_limit_enabled: bool = std::env::var("RATE_LIMIT_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    info!(
        "Rate limiting: {} ({} requests per {} seconds)",
        if rate_limit_enabled {
            "enabled"
        } else {
            "disabled"
        },
        rate_limit_requests,
        rate_limit_period_secs
    );

    // Initialize storage and verify it round-trips
    let store = Store::new(&data_dir);
    store
        .validate()
        .await
        .map_err(|e| anyhow::anyhow!("Storage validation failed: {}", e))?;
    info!("Storage initialized at {}", data_dir);

    // Initialize the suggestion engine over the Ollama backend
    let backend = OllamaBackend::from_env();
    info!(
        "Inference backend initialized: {}",
        redline_core::GenerationBackend::model_name(&backend)
    );
    let engine: Arc<dyn SuggestionEngine> = Arc::new(RewriteEngine::new(backend));

    // API key auth (write methods only); unset disables auth for development
    let api_key = std::env::var("REDLINE_API_KEY").ok().filter(|k| !k.is_empty());
    info!(
        "API key auth: {}",
        if api_key.is_some() {
            "enabled"
        } else {
            "disabled (development mode)"
        }
    );

    // Create rate limiter if enabled
    let rate_limiter = if rate_limit_enabled {
        let quota = Quota::with_period(std::time::Duration::from_secs(rate_limit_period_secs))
            .expect("Rate limit period must be non-zero")
            .allow_burst(NonZeroU32::new(rate_limit_requests).expect("Rate limit must be non-zero"));
        Some(Arc::new(RateLimiter::direct(quota)))
    } else {
        None
    };

    let state = AppState {
        store,
        engine,
        api_key,
        rate_limiter,
    };

    let app = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router with all routes and middleware.
fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/storage/folders",
            post(create_folder)
                .get(list_folders)
                .delete(delete_folder),
        )
        .route("/storage/files", get(list_files).delete(delete_file))
        .route("/storage/upload", post(upload_files))
        .route("/storage/download", get(download_file))
        .route("/storage/recommendations", get(get_trail))
        .route("/storage/recommendations/decision", post(post_decision))
        .route("/chat", post(chat))
        .route("/apply-changes", post(apply_changes))
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer({
            let allowed_origins = parse_allowed_origins();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(allowed_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::HeaderName::from_static("x-api-key"),
                ])
                .allow_credentials(true)
                .max_age(std::time::Duration::from_secs(defaults::CORS_MAX_AGE_SECS))
        })
        .layer(DefaultBodyLimit::max(defaults::MAX_BODY_SIZE_BYTES))
        .layer(RequestBodyLimitLayer::new(defaults::MAX_BODY_SIZE_BYTES))
        .with_state(state)
}

// =============================================================================
// AUTH MIDDLEWARE
// =============================================================================

/// Require `X-API-Key` on write methods when `REDLINE_API_KEY` is configured.
/// Reads stay open; with no key configured everything is open.
async fn api_key_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, ApiError> {
    if let Some(expected) = &state.api_key {
        let method = request.method();
        let is_write = method == Method::POST
            || method == Method::PUT
            || method == Method::PATCH
            || method == Method::DELETE;
        if is_write {
            let provided = request
                .headers()
                .get("x-api-key")
                .and_then(|v| v.to_str().ok());
            if provided != Some(expected.as_str()) {
                tracing::warn!(path = %request.uri().path(), "Rejected write without valid API key");
                return Err(ApiError::Unauthorized(
                    "Invalid or missing API key".to_string(),
                ));
            }
        }
    }
    Ok(next.run(request).await)
}

// =============================================================================
// RATE LIMITING MIDDLEWARE
// =============================================================================

async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    // If rate limiting is disabled, pass through
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            tracing::warn!("Rate limit exceeded");
            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "rate_limit_exceeded",
                    "error_description": "Too many requests. Please wait before retrying."
                })),
            ));
        }
    }
    Ok(next.run(request).await)
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// FOLDER HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
struct CreateFolderRequest {
    name: String,
}

async fn create_folder(
    State(state): State<AppState>,
    Json(req): Json<CreateFolderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.folders().create_folder(&req.name).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "message": format!("Folder '{}' created", req.name) })),
    ))
}

async fn list_folders(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let folders = state.store.folders().list_folders().await?;
    Ok(Json(serde_json::json!({ "folders": folders })))
}

#[derive(Debug, Deserialize)]
struct DeleteFolderRequest {
    folder: String,
}

async fn delete_folder(
    State(state): State<AppState>,
    Json(req): Json<DeleteFolderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.folders().delete_folder(&req.folder).await?;
    Ok(Json(
        serde_json::json!({ "message": format!("Folder '{}' deleted", req.folder) }),
    ))
}

// =============================================================================
// FILE HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
struct FilesQuery {
    folder: String,
}

async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<FilesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let files = state.store.folders().list_files(&query.folder).await?;
    Ok(Json(serde_json::json!({ "files": files })))
}

#[derive(Debug, Deserialize)]
struct DeleteFileRequest {
    folder: String,
    file: String,
}

async fn delete_file(
    State(state): State<AppState>,
    Json(req): Json<DeleteFileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store
        .folders()
        .delete_file(&req.folder, &req.file)
        .await?;
    Ok(Json(
        serde_json::json!({ "message": format!("File '{}' deleted", req.file) }),
    ))
}

/// Upload documents and run the review pipeline on each.
///
/// Pipeline per file: safety screen → store bytes → decode text → extract
/// recommendations → record a new pending version. Extraction failure fails
/// the request with an upstream error, but the stored bytes remain so the
/// caller can retry.
async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut folder: Option<String> = None;
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("folder") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid folder field: {}", e)))?;
                folder = Some(value);
            }
            Some("files") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("File field missing a filename".into()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid file field: {}", e)))?;
                files.push((filename, data.to_vec()));
            }
            _ => {}
        }
    }

    let folder = folder.ok_or_else(|| ApiError::BadRequest("Missing 'folder' field".into()))?;
    if files.is_empty() {
        return Err(ApiError::BadRequest("No files in upload".into()));
    }

    let folders = state.store.folders();
    let trail = state.store.recommendations();

    for (filename, data) in &files {
        let verdict = file_safety::validate_file(filename, data, defaults::MAX_UPLOAD_SIZE_BYTES);
        if !verdict.allowed {
            return Err(ApiError::BadRequest(
                verdict
                    .block_reason
                    .unwrap_or_else(|| "File rejected".to_string()),
            ));
        }

        folders.put_file(&folder, filename, data).await?;

        let content = String::from_utf8_lossy(data).into_owned();
        let points = state.engine.extract(filename, &content).await?;
        let version = trail
            .create_version(&folder, filename, points, &compute_content_hash(data))
            .await?;

        info!(
            folder = %folder,
            document = %filename,
            version = version.version,
            result_count = version.recommendations.len(),
            "Upload processed"
        );
    }

    Ok(Json(serde_json::json!({
        "message": format!("Uploaded {} file(s) to '{}'", files.len(), folder)
    })))
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    folder: String,
    file: String,
}

async fn download_file(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let data = state
        .store
        .folders()
        .get_file(&query.folder, &query.file)
        .await?;
    let content_type = file_safety::detect_content_type(&query.file, &data);

    Ok(Json(serde_json::json!({
        "data": base64::engine::general_purpose::STANDARD.encode(&data),
        "contentType": content_type,
        "filename": query.file,
    })))
}

// =============================================================================
// RECOMMENDATION HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
struct TrailQuery {
    folder: String,
    document: Option<String>,
}

async fn get_trail(
    State(state): State<AppState>,
    Query(query): Query<TrailQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state
        .store
        .recommendations()
        .trail(&query.folder, query.document.as_deref())
        .await?;
    Ok(Json(serde_json::json!({ "trail": entries })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecisionRequest {
    folder: String,
    document: String,
    version: i32,
    #[serde(default)]
    accept_ids: Vec<Uuid>,
    #[serde(default)]
    reject_ids: Vec<Uuid>,
}

async fn post_decision(
    State(state): State<AppState>,
    Json(req): Json<DecisionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let decision = Decision {
        accept_ids: req.accept_ids,
        reject_ids: req.reject_ids,
    };

    let overlap = decision.overlapping_ids();
    if !overlap.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Ids present in both acceptIds and rejectIds: {}",
            overlap
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    state
        .store
        .recommendations()
        .decide(&req.folder, &req.document, req.version, &decision)
        .await?;
    Ok(Json(serde_json::json!({})))
}

// =============================================================================
// CHAT / REGENERATION HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChatRequest {
    folder: String,
    document: String,
    message: String,
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let data = state
        .store
        .folders()
        .get_file(&req.folder, &req.document)
        .await?;
    let content = String::from_utf8_lossy(&data).into_owned();

    // Context is the latest version's recommendation points, if any exist.
    let points: Vec<String> = state
        .store
        .recommendations()
        .trail(&req.folder, Some(&req.document))
        .await?
        .first()
        .map(|v| v.recommendations.iter().map(|r| r.point.clone()).collect())
        .unwrap_or_default();

    let reply = state
        .engine
        .chat(&req.document, &content, &points, &req.message)
        .await?;
    Ok(Json(reply))
}

/// One recommendation to apply: either a plain point string or a full trail
/// item as clients read it from `/storage/recommendations`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApplyRecommendation {
    Point(String),
    Item { point: String },
}

impl ApplyRecommendation {
    fn into_point(self) -> String {
        match self {
            Self::Point(point) | Self::Item { point } => point,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApplyRequest {
    folder: String,
    document: String,
    recommendations: Vec<ApplyRecommendation>,
}

async fn apply_changes(
    State(state): State<AppState>,
    Json(req): Json<ApplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let data = state
        .store
        .folders()
        .get_file(&req.folder, &req.document)
        .await?;
    let content = String::from_utf8_lossy(&data).into_owned();

    let points: Vec<String> = req
        .recommendations
        .into_iter()
        .map(ApplyRecommendation::into_point)
        .collect();
    let outcome = state
        .engine
        .rewrite(&req.document, &content, &points)
        .await?;

    Ok(Json(serde_json::json!({
        "modifiedContent": outcome.modified_content,
        "newFileName": outcome.suggested_file_name,
    })))
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
enum ApiError {
    Internal(redline_core::Error),
    Unauthorized(String),
    NotFound(String),
    BadRequest(String),
    Upstream(String),
}

impl From<redline_core::Error> for ApiError {
    fn from(err: redline_core::Error) -> Self {
        use redline_core::Error;
        match &err {
            Error::NotFound(_)
            | Error::FolderNotFound(_)
            | Error::DocumentNotFound(_)
            | Error::VersionNotFound { .. } => ApiError::NotFound(err.to_string()),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            Error::Inference(_) | Error::Request(_) => ApiError::Upstream(err.to_string()),
            Error::Unauthorized(msg) => ApiError::Unauthorized(msg.clone()),
            _ => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use redline_inference::MockGenerationBackend;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "test-boundary";

    fn test_state(dir: &TempDir, backend: MockGenerationBackend, api_key: Option<&str>) -> AppState {
        AppState {
            store: Store::new(dir.path()),
            engine: Arc::new(RewriteEngine::new(backend)),
            api_key: api_key.map(String::from),
            rate_limiter: None,
        }
    }

    fn test_router(dir: &TempDir, backend: MockGenerationBackend) -> Router {
        build_router(test_state(dir, backend, None))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn upload_request(folder: &str, filename: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\ncontent-disposition: form-data; name=\"folder\"\r\n\r\n{folder}\r\n\
             --{b}\r\ncontent-disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\n\
             content-type: text/plain\r\n\r\n{content}\r\n--{b}--\r\n",
            b = BOUNDARY,
        );
        Request::builder()
            .method("POST")
            .uri("/storage/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_returns_healthy() {
        let dir = TempDir::new().unwrap();
        let app = test_router(&dir, MockGenerationBackend::new());

        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn folder_lifecycle() {
        let dir = TempDir::new().unwrap();
        let app = test_router(&dir, MockGenerationBackend::new());

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/storage/folders",
                serde_json::json!({"name": "acme"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(get_request("/storage/folders"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["folders"], serde_json::json!(["acme"]));

        let response = app
            .clone()
            .oneshot(json_request(
                "DELETE",
                "/storage/folders",
                serde_json::json!({"folder": "acme"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_request("/storage/folders")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["folders"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn invalid_folder_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let app = test_router(&dir, MockGenerationBackend::new());

        let response = app
            .oneshot(json_request(
                "POST",
                "/storage/folders",
                serde_json::json!({"name": "../escape"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("path separators"));
    }

    #[tokio::test]
    async fn upload_creates_trail_and_decision_applies() {
        let dir = TempDir::new().unwrap();
        let backend = MockGenerationBackend::new()
            .with_fixed_response(r#"["Add a title", "Fix the dates"]"#);
        let app = test_router(&dir, backend);

        app.clone()
            .oneshot(json_request(
                "POST",
                "/storage/folders",
                serde_json::json!({"name": "acme"}),
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(upload_request("acme", "spec.txt", "Payment due in 30 days."))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(get_request("/storage/recommendations?folder=acme&document=spec.txt"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let trail = json["trail"].as_array().unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0]["documentName"], "spec.txt");
        assert_eq!(trail[0]["version"], 1);
        let recs = trail[0]["recommendations"].as_array().unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0]["status"], "pending");

        // Accept the first, reject the second.
        let accept_id = recs[0]["id"].as_str().unwrap();
        let reject_id = recs[1]["id"].as_str().unwrap();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/storage/recommendations/decision",
                serde_json::json!({
                    "folder": "acme",
                    "document": "spec.txt",
                    "version": 1,
                    "acceptIds": [accept_id],
                    "rejectIds": [reject_id],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(get_request("/storage/recommendations?folder=acme"))
            .await
            .unwrap();
        let json = body_json(response).await;
        let recs = &json["trail"][0]["recommendations"];
        assert_eq!(recs[0]["status"], "accepted");
        assert_eq!(recs[1]["status"], "rejected");
    }

    #[tokio::test]
    async fn decision_with_overlapping_ids_is_rejected() {
        let dir = TempDir::new().unwrap();
        let app = test_router(&dir, MockGenerationBackend::new());

        let id = Uuid::now_v7().to_string();
        let response = app
            .oneshot(json_request(
                "POST",
                "/storage/recommendations/decision",
                serde_json::json!({
                    "folder": "acme",
                    "document": "spec.txt",
                    "version": 1,
                    "acceptIds": [id],
                    "rejectIds": [id],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("both"));
    }

    #[tokio::test]
    async fn trail_for_missing_folder_is_404() {
        let dir = TempDir::new().unwrap();
        let app = test_router(&dir, MockGenerationBackend::new());

        let response = app
            .oneshot(get_request("/storage/recommendations?folder=ghost"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn decision_on_missing_version_is_404() {
        let dir = TempDir::new().unwrap();
        let app = test_router(&dir, MockGenerationBackend::new());

        app.clone()
            .oneshot(json_request(
                "POST",
                "/storage/folders",
                serde_json::json!({"name": "acme"}),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(json_request(
                "POST",
                "/storage/recommendations/decision",
                serde_json::json!({
                    "folder": "acme",
                    "document": "spec.txt",
                    "version": 3,
                    "acceptIds": [Uuid::now_v7().to_string()],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_blocks_executables() {
        let dir = TempDir::new().unwrap();
        let app = test_router(&dir, MockGenerationBackend::new());

        app.clone()
            .oneshot(json_request(
                "POST",
                "/storage/folders",
                serde_json::json!({"name": "acme"}),
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(upload_request("acme", "setup.exe", "not really a binary"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // The blocked file was never stored.
        let response = app
            .oneshot(get_request("/storage/files?folder=acme"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["files"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn download_returns_base64_payload() {
        let dir = TempDir::new().unwrap();
        let backend = MockGenerationBackend::new().with_fixed_response(r#"["a"]"#);
        let app = test_router(&dir, backend);

        app.clone()
            .oneshot(json_request(
                "POST",
                "/storage/folders",
                serde_json::json!({"name": "acme"}),
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(upload_request("acme", "spec.txt", "hello"))
            .await
            .unwrap();

        let response = app
            .oneshot(get_request("/storage/download?folder=acme&file=spec.txt"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["filename"], "spec.txt");
        assert_eq!(json["contentType"], "text/plain");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(json["data"].as_str().unwrap())
            .unwrap();
        assert_eq!(decoded, b"hello");
    }

    #[tokio::test]
    async fn api_key_guards_writes_only() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, MockGenerationBackend::new(), Some("secret"));
        let app = build_router(state);

        // Write without key is rejected.
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/storage/folders",
                serde_json::json!({"name": "acme"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Wrong key is rejected.
        let mut request = json_request(
            "POST",
            "/storage/folders",
            serde_json::json!({"name": "acme"}),
        );
        request
            .headers_mut()
            .insert("x-api-key", HeaderValue::from_static("wrong"));
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Correct key passes.
        let mut request = json_request(
            "POST",
            "/storage/folders",
            serde_json::json!({"name": "acme"}),
        );
        request
            .headers_mut()
            .insert("x-api-key", HeaderValue::from_static("secret"));
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        // Reads stay open.
        let response = app.oneshot(get_request("/storage/folders")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_answers_and_never_mutates_trail() {
        let dir = TempDir::new().unwrap();
        let backend = MockGenerationBackend::new()
            .with_response_mapping("Review the following document", r#"["Add a title"]"#)
            .with_fixed_response("It means net 30.");
        let app = test_router(&dir, backend);

        app.clone()
            .oneshot(json_request(
                "POST",
                "/storage/folders",
                serde_json::json!({"name": "acme"}),
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(upload_request("acme", "spec.txt", "Payment due."))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/chat",
                serde_json::json!({
                    "folder": "acme",
                    "document": "spec.txt",
                    "message": "what does clause 3 mean?",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["reply"], "It means net 30.");
        assert!(json.get("applied").is_none());

        // The stored trail is unchanged.
        let response = app
            .oneshot(get_request("/storage/recommendations?folder=acme"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["trail"][0]["recommendations"][0]["status"], "pending");
    }

    #[tokio::test]
    async fn chat_apply_reports_count() {
        let dir = TempDir::new().unwrap();
        let backend = MockGenerationBackend::new()
            .with_response_mapping("Review the following document", r#"["Add a title"]"#)
            .with_fixed_response("rewritten document");
        let app = test_router(&dir, backend);

        app.clone()
            .oneshot(json_request(
                "POST",
                "/storage/folders",
                serde_json::json!({"name": "acme"}),
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(upload_request("acme", "spec.txt", "Payment due."))
            .await
            .unwrap();

        let response = app
            .oneshot(json_request(
                "POST",
                "/chat",
                serde_json::json!({
                    "folder": "acme",
                    "document": "spec.txt",
                    "message": "please apply the recommendations",
                }),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["reply"], "rewritten document");
        assert_eq!(json["applied"], 1);
    }

    #[tokio::test]
    async fn apply_changes_returns_rewrite() {
        let dir = TempDir::new().unwrap();
        let backend = MockGenerationBackend::new().with_fixed_response("rewritten document");
        let app = test_router(&dir, backend);

        app.clone()
            .oneshot(json_request(
                "POST",
                "/storage/folders",
                serde_json::json!({"name": "acme"}),
            ))
            .await
            .unwrap();

        // Store the document directly; apply-changes only needs the bytes.
        let state = test_state(&dir, MockGenerationBackend::new(), None);
        state
            .store
            .folders()
            .put_file("acme", "spec.txt", b"Payment due.")
            .await
            .unwrap();

        let response = app
            .oneshot(json_request(
                "POST",
                "/apply-changes",
                serde_json::json!({
                    "folder": "acme",
                    "document": "spec.txt",
                    "recommendations": ["Add a title", "Fix the dates"],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["modifiedContent"], "rewritten document");
        assert_eq!(json["newFileName"], "spec_revised.txt");
    }

    #[tokio::test]
    async fn apply_changes_accepts_forwarded_trail_items() {
        let dir = TempDir::new().unwrap();
        let backend = MockGenerationBackend::new()
            .with_response_mapping("Review the following document", r#"["Add a title"]"#)
            .with_fixed_response("rewritten document");
        let app = test_router(&dir, backend);

        app.clone()
            .oneshot(json_request(
                "POST",
                "/storage/folders",
                serde_json::json!({"name": "acme"}),
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(upload_request("acme", "spec.txt", "Payment due."))
            .await
            .unwrap();

        // Forward the trail's recommendation objects as-is, the way a client
        // that just rendered them would.
        let response = app
            .clone()
            .oneshot(get_request("/storage/recommendations?folder=acme&document=spec.txt"))
            .await
            .unwrap();
        let trail = body_json(response).await;
        let items = trail["trail"][0]["recommendations"].clone();
        assert!(items[0].get("id").is_some());

        let response = app
            .oneshot(json_request(
                "POST",
                "/apply-changes",
                serde_json::json!({
                    "folder": "acme",
                    "document": "spec.txt",
                    "recommendations": items,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["modifiedContent"], "rewritten document");
        assert_eq!(json["newFileName"], "spec_revised.txt");
    }

    #[tokio::test]
    async fn apply_changes_missing_document_is_404() {
        let dir = TempDir::new().unwrap();
        let app = test_router(&dir, MockGenerationBackend::new());

        app.clone()
            .oneshot(json_request(
                "POST",
                "/storage/folders",
                serde_json::json!({"name": "acme"}),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(json_request(
                "POST",
                "/apply-changes",
                serde_json::json!({
                    "folder": "acme",
                    "document": "ghost.txt",
                    "recommendations": [],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
