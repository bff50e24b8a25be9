use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::export_engine::ExportError;
use crate::services::property_client::ClientError;
use crate::services::template_registry::TemplateError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Not found")]
    NotFound,

    #[error("Rendering error: {0}")]
    Render(#[from] RenderError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Property API error: {0}")]
    Upstream(#[from] ClientError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TemplateError> for ApiError {
    fn from(e: TemplateError) -> Self {
        match e {
            TemplateError::NotFound(id) => ApiError::TemplateNotFound(id),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("SVG parse error: {0}")]
    SvgParse(String),

    #[error("Scene template error: {0}")]
    Scene(#[from] tera::Error),

    #[error("Unsupported dimensions: {width}x{height}")]
    UnsupportedDimensions { width: u32, height: u32 },

    #[error("Failed to allocate pixmap")]
    PixmapAllocation,

    #[error("PNG encode error: {0}")]
    PngEncode(String),

    #[error("JPEG encode error: {0}")]
    JpegEncode(String),

    #[error("Encoder produced no output")]
    EmptyOutput,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::TemplateNotFound(_) | ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Upstream(ClientError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Upstream(ClientError::NotOwner) => StatusCode::FORBIDDEN,
            ApiError::Upstream(ClientError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            ApiError::Upstream(ClientError::InvalidId(_)) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Export(ExportError::Busy) => StatusCode::CONFLICT,
            ApiError::Render(_) | ApiError::Export(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "status": status.as_u16(),
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
