use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::ErrorResponse;
use crate::error::ApiError;
use crate::models::{ExportFormat, PropertyMarketingData};
use crate::services::MarketingService;

/// Render request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct RenderRequest {
    /// Template id from `/api/templates`
    pub template_id: String,
    /// Listing data to bind into the template
    pub property: PropertyMarketingData,
    /// Output format (defaults to the configured one)
    #[serde(default)]
    pub format: Option<ExportFormat>,
    /// Rotates the listing photos so that image N becomes the primary one
    #[serde(default)]
    pub image_offset: Option<usize>,
}

/// Render a marketing image at full resolution
///
/// Returns the encoded image as an attachment named
/// `<brand>_<title>_<style>_<timestamp>.<ext>`.
#[utoipa::path(
    post,
    path = "/api/render",
    request_body = RenderRequest,
    responses(
        (status = 200, description = "Rendered image", content_type = "image/jpeg"),
        (status = 404, description = "Unknown template", body = ErrorResponse),
        (status = 500, description = "Capture failed", body = ErrorResponse),
    ),
    tag = "Render"
)]
pub async fn handle_render(
    State(service): State<Arc<MarketingService>>,
    Json(request): Json<RenderRequest>,
) -> Result<Response, ApiError> {
    let image = service
        .render_bytes(
            &request.template_id,
            &request.property,
            request.format,
            request.image_offset.unwrap_or(0),
        )
        .await?;

    tracing::info!(
        template = %request.template_id,
        filename = %image.filename,
        bytes = image.bytes.len(),
        "Rendered image"
    );

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(image.format.mime_type()),
            ),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&image.filename)?,
            ),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        image.bytes,
    )
        .into_response())
}

/// Render the scaled-down SVG preview
#[utoipa::path(
    post,
    path = "/api/preview",
    request_body = RenderRequest,
    responses(
        (status = 200, description = "SVG preview", content_type = "image/svg+xml"),
        (status = 404, description = "Unknown template", body = ErrorResponse),
    ),
    tag = "Render"
)]
pub async fn handle_preview(
    State(service): State<Arc<MarketingService>>,
    Json(request): Json<RenderRequest>,
) -> Result<Response, ApiError> {
    let svg = service
        .preview_svg(
            &request.template_id,
            &request.property,
            request.image_offset.unwrap_or(0),
        )
        .await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/svg+xml")],
        svg,
    )
        .into_response())
}

/// `attachment` with an ASCII fallback name plus the RFC 5987 form
fn content_disposition(filename: &str) -> Result<HeaderValue, ApiError> {
    let ascii: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    let encoded = utf8_percent_encode(filename, NON_ALPHANUMERIC);
    HeaderValue::from_str(&format!(
        "attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}"
    ))
    .map_err(|e| ApiError::Internal(format!("Invalid filename header: {e}")))
}
