pub mod canvas;
pub mod price;
pub mod rasterize;
pub mod substitute;

pub use canvas::{BindOptions, CanvasRenderer, Element, RenderTarget, RootTransform};
pub use price::format_price;
pub use rasterize::{encode, SvgRasterizer, PIXEL_RATIO};
pub use substitute::{substitute, substitute_str, TextTemplate, TokenError};
