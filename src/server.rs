//! HTTP surface: the API router and the static source-image router.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method};
use axum::response::Json;
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::WonderlandError;
use crate::orchestrator::{GenerateRequest, Orchestrator};
use crate::response::{CancelResponse, GenerateResponse, HealthResponse, RunningTasksResponse};
use crate::storage::OUTPUT_URL_PREFIX;
use crate::tasks::TaskRegistry;

pub const SERVICE_NAME: &str = "GOSIM Wonderland AI Service";

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    registry: Arc<TaskRegistry>,
    health: Arc<HealthFlags>,
}

#[derive(Debug, Clone)]
pub struct HealthFlags {
    pub dashscope_configured: bool,
    pub gemini_configured: bool,
    pub vidu_configured: bool,
    pub prompt_rewrite: bool,
}

impl HealthFlags {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dashscope_configured: config.dashscope.is_some(),
            gemini_configured: config.gemini.is_some(),
            vidu_configured: config.vidu.is_some(),
            prompt_rewrite: config.prompt_rewrite && config.gemini.is_some(),
        }
    }
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, health: HealthFlags) -> Self {
        Self {
            registry: Arc::clone(orchestrator.registry()),
            orchestrator,
            health: Arc::new(health),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let registry = Arc::new(TaskRegistry::new());
        let orchestrator = Arc::new(Orchestrator::from_config(config, registry));
        Self::new(orchestrator, HealthFlags::from_config(config))
    }
}

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600))
}

/// API router. Generated images in `output_dir` are served under `/ai-photos`.
pub fn build_router(
    state: AppState,
    output_dir: impl Into<PathBuf>,
    cors_origins: &[String],
) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/generate-image/", post(generate_image))
        .route("/running-tasks", get(running_tasks))
        .route("/cancel-task/:task_id", post(cancel_task))
        .nest_service(OUTPUT_URL_PREFIX, ServeDir::new(output_dir.into()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
}

/// Router for the static port: re-hosted source images vendors fetch from.
pub fn build_static_router(original_dir: impl Into<PathBuf>, port: u16) -> Router {
    Router::new()
        .route(
            "/",
            get(move || async move {
                Json(serde_json::json!({
                    "message": "AI Static Server",
                    "status": "running",
                    "port": port,
                }))
            }),
        )
        .nest_service("/original-images", ServeDir::new(original_dir.into()))
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({"message": SERVICE_NAME, "status": "running"}))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let flags = &state.health;
    Json(HealthResponse {
        status: "healthy",
        mock_mode: state.orchestrator.mock_mode(),
        dashscope_configured: flags.dashscope_configured,
        gemini_configured: flags.gemini_configured,
        vidu_configured: flags.vidu_configured,
        prompt_rewrite: flags.prompt_rewrite,
    })
}

async fn generate_image(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, WonderlandError> {
    // Body rejections get the same `{detail}` shape as other errors.
    let Json(request) = body.map_err(|e| WonderlandError::InvalidBody(e.body_text()))?;
    tracing::info!(
        model = request.model_name.as_deref().unwrap_or("default"),
        "generate-image request"
    );
    let output = state.orchestrator.generate(request).await?;
    Ok(Json(output.into()))
}

async fn running_tasks(State(state): State<AppState>) -> Json<RunningTasksResponse> {
    let tasks = state.registry.list();
    Json(RunningTasksResponse {
        count: tasks.len(),
        tasks,
    })
}

async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<CancelResponse>, WonderlandError> {
    state.registry.cancel(&task_id)?;
    Ok(Json(CancelResponse {
        status: "cancelled",
        task_id,
    }))
}
