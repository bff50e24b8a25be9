use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::assets::AssetLoader;
use crate::error::ApiError;
use crate::models::{
    AppConfig, ExportFormat, ExportedImage, MarketingTemplate, PropertyMarketingData,
};
use crate::rendering::canvas::{CanvasRenderer, RenderTarget};
use crate::rendering::rasterize::FontGate;
use crate::services::export_engine::{ExportEngine, ExportError, ExportSettings};
use crate::services::image_preloader::{ImagePreloader, ImageStore};
use crate::services::output::{CommandShare, Downloader, NoShare, ShareTarget, TimestampClock};
use crate::services::preferences::PreferenceStore;
use crate::services::template_registry::TemplateRegistry;

/// Shared pieces of the marketing pipeline.
///
/// One instance lives for the whole process; it hands out export engines
/// (one per interactive session) and renders one-shot images for the HTTP
/// API and the CLI.
pub struct MarketingService {
    config: AppConfig,
    registry: Arc<TemplateRegistry>,
    renderer: CanvasRenderer,
    preloader: ImagePreloader,
    fonts: Arc<FontGate>,
    preferences: PreferenceStore,
    clock: Arc<TimestampClock>,
}

impl MarketingService {
    pub fn new(config: AppConfig, registry: TemplateRegistry, loader: &AssetLoader) -> Self {
        let fonts = FontGate::new(loader.clone(), config.export.background_fallback.clone());
        Self::with_fonts(config, registry, fonts)
    }

    /// Build with an explicit font gate (tests use an already loaded one)
    pub fn with_fonts(config: AppConfig, registry: TemplateRegistry, fonts: FontGate) -> Self {
        let preferences = match config.preferences_file {
            Some(ref path) => PreferenceStore::new(path),
            None => PreferenceStore::disabled(),
        };
        Self {
            renderer: CanvasRenderer::new(config.brand.clone()),
            preloader: ImagePreloader::new(config.preload.clone(), ImageStore::new()),
            fonts: Arc::new(fonts),
            registry: Arc::new(registry),
            preferences,
            clock: Arc::new(TimestampClock::new()),
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn image_store(&self) -> &ImageStore {
        self.preloader.store()
    }

    /// Start loading fonts in the background so the first capture is quick
    pub fn warm_up(self: &Arc<Self>) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = service.fonts.ready().await {
                tracing::warn!(error = %e, "Font warm-up failed");
            }
        });
    }

    /// Share target configured by `export.share_command`
    pub fn share_target(&self) -> Arc<dyn ShareTarget> {
        match self
            .config
            .export
            .share_command
            .as_deref()
            .and_then(CommandShare::parse)
        {
            Some(share) => Arc::new(share),
            None => Arc::new(NoShare),
        }
    }

    /// A new export engine writing into `output_dir` (the configured one by default)
    pub fn engine(&self, output_dir: Option<PathBuf>) -> ExportEngine {
        self.engine_with(
            ExportSettings::from_config(&self.config),
            self.preloader.clone(),
            output_dir,
        )
    }

    fn engine_with(
        &self,
        settings: ExportSettings,
        preloader: ImagePreloader,
        output_dir: Option<PathBuf>,
    ) -> ExportEngine {
        let output_dir = output_dir.unwrap_or_else(|| self.config.export.output_dir.clone());
        ExportEngine::new(
            self.renderer.clone(),
            preloader,
            self.fonts.clone(),
            Downloader::new(output_dir),
            settings,
        )
        .with_share(self.share_target())
        .with_clock(self.clock.clone())
    }

    /// Template to preselect for a property: the remembered one if it still
    /// exists, else the first in the catalog
    pub fn initial_template(&self, property_id: &str) -> Option<&MarketingTemplate> {
        let remembered = self.preferences.load(property_id);
        self.registry
            .resolve(remembered.as_ref().map(|p| p.template_id.as_str()))
    }

    pub fn remember_template(&self, property_id: &str, template_id: &str) {
        self.preferences.save(property_id, template_id);
    }

    /// Preloader with its own store, dropped with the request.
    ///
    /// One-shot renders fetch caller-supplied URLs and must not grow the
    /// shared store.
    fn request_preloader(&self) -> ImagePreloader {
        ImagePreloader::new(self.config.preload.clone(), ImageStore::new())
    }

    pub fn bind(
        &self,
        template_id: &str,
        data: &PropertyMarketingData,
        image_offset: usize,
    ) -> Result<RenderTarget, ApiError> {
        let template = self.registry.get_template(template_id)?;
        let options = ExportSettings::from_config(&self.config)
            .bind
            .with_image_offset(image_offset);
        Ok(self.renderer.bind(template, data, &options))
    }

    /// Scaled-down SVG preview with the listing's photos inlined
    pub async fn preview_svg(
        &self,
        template_id: &str,
        data: &PropertyMarketingData,
        image_offset: usize,
    ) -> Result<String, ApiError> {
        let target = self.bind(template_id, data, image_offset)?;
        let preloader = self.request_preloader();
        preloader.preload(&target.image_urls()).await;
        Ok(target.preview_svg(self.config.preview_size, preloader.store())?)
    }

    /// Render a full-size image without writing it anywhere
    pub async fn render_bytes(
        &self,
        template_id: &str,
        data: &PropertyMarketingData,
        format: Option<ExportFormat>,
        image_offset: usize,
    ) -> Result<ExportedImage, ApiError> {
        let template = self.registry.get_template(template_id)?;

        let mut settings = ExportSettings::from_config(&self.config);
        settings.format = format.unwrap_or(settings.format);
        // Nothing is on screen here, there is nothing to settle
        settings.settle_delay = Duration::ZERO;

        let engine = self.engine_with(settings, self.request_preloader(), None);
        engine.select_at(template, data, image_offset);

        engine
            .capture_image()
            .await?
            .ok_or_else(|| ApiError::Export(ExportError::CaptureFailed("capture discarded".to_string())))
    }
}
