pub mod export_engine;
pub mod image_preloader;
pub mod marketing;
pub mod output;
pub mod preferences;
pub mod property_client;
pub mod session;
pub mod template_registry;

pub use export_engine::{ExportEngine, ExportError, ExportSettings};
pub use image_preloader::{ImagePreloader, ImageStore, PreloadOutcome, PreloadReport};
pub use marketing::MarketingService;
pub use output::{CommandShare, Downloader, NoShare, ShareError, ShareTarget, TimestampClock};
pub use preferences::{PreferenceStore, TemplatePreference};
pub use property_client::{ClientError, PropertyClient};
pub use session::Session;
pub use template_registry::{TemplateError, TemplateRegistry, TemplateSummary};
