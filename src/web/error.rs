use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::warn;

use crate::analytics::ReportError;
use crate::pipeline::PipelineError;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub enum AppError {
    /// Selector value outside the configured enumerations
    BadRequest(String),
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Pipeline(PipelineError::Report(e)) => match e {
                ReportError::Unavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_UNAVAILABLE")
                }
                ReportError::Api { .. } => (StatusCode::BAD_GATEWAY, "UPSTREAM_REJECTED"),
                ReportError::Credentials(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CREDENTIALS"),
                ReportError::Decode(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_MALFORMED"),
            },
            AppError::Pipeline(PipelineError::Normalize(_)) => {
                (StatusCode::BAD_GATEWAY, "UPSTREAM_MALFORMED")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match self {
            AppError::BadRequest(msg) => msg,
            AppError::Pipeline(e) => {
                warn!("Report pipeline failed: {}", e);
                e.to_string()
            }
        };
        (status, Json(ApiError { code, message })).into_response()
    }
}
