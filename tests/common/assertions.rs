//! Assertion helpers for tests.

use axum::http::StatusCode;
use pretty_assertions::assert_eq;

use super::app::TestResponse;

/// Assert response has expected status code
pub fn assert_status(response: &TestResponse, expected: StatusCode) {
    assert_eq!(
        response.status, expected,
        "Expected status {}, got {}. Body: {}",
        expected,
        response.status,
        response.text()
    );
}

/// Assert response is OK (200)
pub fn assert_ok(response: &TestResponse) {
    assert_status(response, StatusCode::OK);
}

/// Assert an error body of the shape `{status, error}`
pub fn assert_error_body(response: &TestResponse, expected: StatusCode) {
    assert_status(response, expected);
    let json: serde_json::Value = response.json();
    assert_eq!(json["status"].as_u64(), Some(expected.as_u16() as u64));
    assert!(
        json["error"].as_str().is_some_and(|e| !e.is_empty()),
        "Missing error message: {json}"
    );
}

/// Assert the response is a JPEG attachment and return its filename
pub fn assert_jpeg_attachment(response: &TestResponse) -> String {
    assert_ok(response);
    assert!(
        response.is_jpeg(),
        "Expected JPEG, got {} bytes starting with {:?}",
        response.body.len(),
        &response.body[..4.min(response.body.len())]
    );
    assert_eq!(response.header("content-type"), Some("image/jpeg"));

    let disposition = response
        .header("content-disposition")
        .expect("Missing Content-Disposition");
    assert!(disposition.starts_with("attachment; filename=\""), "{disposition}");
    disposition
        .trim_start_matches("attachment; filename=\"")
        .split('"')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Width and height of an encoded image
pub fn image_dimensions(bytes: &[u8]) -> (u32, u32) {
    let image = image::load_from_memory(bytes).expect("Failed to decode image");
    (image.width(), image.height())
}
