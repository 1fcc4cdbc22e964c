use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::WonderlandError;
use crate::orchestrator::GenerationOutput;

/// nginx's "client closed request"; used for cancelled tasks.
pub const STATUS_CANCELLED: u16 = 499;

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub status: &'static str,
    pub image_paths: Vec<String>,
    pub task_id: String,
}

impl From<GenerationOutput> for GenerateResponse {
    fn from(output: GenerationOutput) -> Self {
        Self {
            status: "success",
            image_paths: output.image_paths,
            task_id: output.task_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunningTasksResponse {
    pub tasks: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub status: &'static str,
    pub task_id: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub mock_mode: bool,
    pub dashscope_configured: bool,
    pub gemini_configured: bool,
    pub vidu_configured: bool,
    pub prompt_rewrite: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

pub fn status_for(err: &WonderlandError) -> StatusCode {
    match err {
        WonderlandError::MissingField(_) | WonderlandError::InvalidBody(_) => {
            StatusCode::BAD_REQUEST
        }
        WonderlandError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        WonderlandError::Cancelled(_) => {
            StatusCode::from_u16(STATUS_CANCELLED).unwrap_or(StatusCode::BAD_REQUEST)
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for WonderlandError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        (
            status,
            Json(ErrorBody {
                detail: self.user_message(),
            }),
        )
            .into_response()
    }
}
