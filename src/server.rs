//! HTTP server setup and configuration.
//!
//! This module provides the router and application state used by both
//! the production server and integration tests.

use axum::{
    extract::{Path, State},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::{self, RenderRequest};
use crate::assets::AssetLoader;
use crate::error::ApiError;
use crate::models::{AppConfig, MarketingTemplate};
use crate::services::{MarketingService, TemplateRegistry, TemplateSummary};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MarketingService>,
}

/// Create application state from an asset loader.
pub fn create_app_state(asset_loader: Arc<AssetLoader>) -> anyhow::Result<AppState> {
    let config = AppConfig::load_from_assets(&asset_loader);
    let registry = TemplateRegistry::load(&asset_loader)
        .map_err(|e| anyhow::anyhow!("Failed to load templates: {e}"))?;
    let service = Arc::new(MarketingService::new(config, registry, &asset_loader));

    Ok(AppState { service })
}

/// Build the API router with all endpoints and middleware.
///
/// This is the core router used by both production and tests.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/templates", get(list_templates))
        .route("/api/templates/:id", get(get_template))
        .route("/api/render", post(render))
        .route("/api/preview", post(preview))
        // Health check
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

// Wrapper handlers to extract the service for the underlying API handlers

async fn list_templates(State(state): State<AppState>) -> Json<Vec<TemplateSummary>> {
    api::handle_list_templates(State(state.service)).await
}

async fn get_template(
    State(state): State<AppState>,
    path: Path<String>,
) -> Result<Json<MarketingTemplate>, ApiError> {
    api::handle_get_template(State(state.service), path).await
}

async fn render(
    State(state): State<AppState>,
    body: Json<RenderRequest>,
) -> Result<Response, ApiError> {
    api::handle_render(State(state.service), body).await
}

async fn preview(
    State(state): State<AppState>,
    body: Json<RenderRequest>,
) -> Result<Response, ApiError> {
    api::handle_preview(State(state.service), body).await
}
