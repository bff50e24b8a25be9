//! Test application factory for integration tests.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use marketkit::assets::AssetLoader;
use marketkit::models::AppConfig;
use marketkit::rendering::rasterize::{FontGate, SvgRasterizer};
use marketkit::server::{build_router, create_app_state, AppState};
use marketkit::services::{MarketingService, TemplateRegistry};

/// Test application with router and direct access to the service
pub struct TestApp {
    router: axum::Router,
    pub service: Arc<MarketingService>,
}

impl TestApp {
    /// Create a new test application using embedded assets
    pub fn new() -> Self {
        let asset_loader = Arc::new(AssetLoader::new(None, None, None));
        let state = create_app_state(asset_loader).expect("Failed to create app state");
        Self::from_state(state)
    }

    /// Embedded templates and the given config, with fonts loaded up front
    pub fn with_config(config: AppConfig) -> Self {
        let registry = TemplateRegistry::builtin().expect("Failed to load templates");
        let fonts = FontGate::loaded(SvgRasterizer::with_fonts(Vec::new()));
        let service = Arc::new(MarketingService::with_fonts(config, registry, fonts));
        Self::from_state(AppState { service })
    }

    fn from_state(state: AppState) -> Self {
        let service = state.service.clone();
        let router = build_router(state);
        Self { router, service }
    }

    /// Make a GET request to the given path
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    /// Make a POST request with JSON body
    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> TestResponse {
        let request = Request::post(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.request(request).await
    }

    /// Send a request to the router
    async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Test response with convenience methods
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    /// Parse body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse JSON response")
    }

    /// Get body as string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_jpeg(&self) -> bool {
        self.body.starts_with(&[0xFF, 0xD8, 0xFF])
    }

    pub fn is_png(&self) -> bool {
        self.body.len() >= 8 && &self.body[0..8] == b"\x89PNG\r\n\x1a\n"
    }
}
