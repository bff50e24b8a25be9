use axum::{
    extract::{Path, State},
    response::Json,
};
use std::sync::Arc;

use super::ErrorResponse;
use crate::error::ApiError;
use crate::models::MarketingTemplate;
use crate::services::{MarketingService, TemplateSummary};

/// List the available marketing styles in picker order
#[utoipa::path(
    get,
    path = "/api/templates",
    responses(
        (status = 200, description = "Available styles", body = Vec<TemplateSummary>),
    ),
    tag = "Templates"
)]
pub async fn handle_list_templates(
    State(service): State<Arc<MarketingService>>,
) -> Json<Vec<TemplateSummary>> {
    Json(service.registry().list_styles())
}

/// Full definition of one template
#[utoipa::path(
    get,
    path = "/api/templates/{id}",
    params(
        ("id" = String, Path, description = "Template id, e.g. 'modern-card'"),
    ),
    responses(
        (status = 200, description = "Template definition", body = MarketingTemplate),
        (status = 404, description = "Unknown template", body = ErrorResponse),
    ),
    tag = "Templates"
)]
pub async fn handle_get_template(
    State(service): State<Arc<MarketingService>>,
    Path(id): Path<String>,
) -> Result<Json<MarketingTemplate>, ApiError> {
    let template = service.registry().get_template(&id)?;
    Ok(Json(template.clone()))
}
