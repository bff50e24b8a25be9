pub mod config;
pub mod export;
pub mod property;
pub mod template;

pub use config::{AppConfig, ExportConfig, MissingImagePolicy, PreloadConfig, PropertyApiConfig};
pub use export::{ExportFormat, ExportOutcome, ExportState, ExportedImage, OutputAction};
pub use property::PropertyMarketingData;
pub use template::{
    CanvasSpec, CircleObject, ElementRole, ImageObject, MarketingTemplate, OriginX, OriginY,
    RectObject, Shadow, TemplateObject, TemplateStyle, TextAlign, TextObject, ValidationError,
};
