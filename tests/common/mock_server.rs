//! Mock HTTP server standing in for the image host and the property API.

use std::time::Duration;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Wrapper around wiremock MockServer with convenience methods
pub struct MockHttpServer {
    pub server: MockServer,
}

impl MockHttpServer {
    /// Start a new mock HTTP server
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Self { server }
    }

    /// Get the base URL of the mock server
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Get URL for a specific path
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    /// Serve a PNG at `endpoint`
    pub async fn mock_png(&self, endpoint: &str, bytes: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(bytes)
                    .insert_header("content-type", "image/png"),
            )
            .mount(&self.server)
            .await;
    }

    /// Serve a PNG after a delay
    pub async fn mock_slow_png(&self, endpoint: &str, bytes: Vec<u8>, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(bytes)
                    .insert_header("content-type", "image/png")
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Respond to GET `endpoint` with an empty body and the given status
    pub async fn mock_status(&self, endpoint: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Serve JSON at `endpoint` only to requests carrying `token`
    pub async fn mock_authed_json(&self, endpoint: &str, token: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Paths of every request received so far, with their query strings
    pub async fn requested_urls(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|r| match r.url.query() {
                Some(q) => format!("{}?{}", r.url.path(), q),
                None => r.url.path().to_string(),
            })
            .collect()
    }
}
