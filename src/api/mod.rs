pub mod render;
pub mod templates;

use serde::Serialize;
use utoipa::ToSchema;

pub use render::{handle_preview, handle_render, RenderRequest};
pub use render::{__path_handle_preview, __path_handle_render};
pub use templates::{handle_get_template, handle_list_templates};
pub use templates::{__path_handle_get_template, __path_handle_list_templates};

/// Error body returned by every endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Status code
    pub status: u16,
    /// Error message
    pub error: String,
}
