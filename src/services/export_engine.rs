//! Turns the selected template and listing into a downloadable or shareable image.
//!
//! The engine is a small state machine:
//!
//! ```text
//! Idle → Preloading → Ready → Generating → (Idle | Error)
//! ```
//!
//! Photos are preloaded before the first capture. A capture waits for fonts
//! and a short settle delay, clears the preview scale on the live render
//! target, rasterizes on the blocking pool and hands the image to the
//! downloader or share target. Selecting another template while a capture
//! runs queues the selection; the capture in flight is then discarded.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

use crate::models::{
    AppConfig, ExportFormat, ExportOutcome, ExportState, ExportedImage, MarketingTemplate,
    OutputAction, PropertyMarketingData,
};
use crate::rendering::canvas::{BindOptions, CanvasRenderer, RenderTarget};
use crate::rendering::rasterize::{encode, FontGate, PIXEL_RATIO};
use crate::rendering::substitute::substitute_str;
use crate::services::image_preloader::{ImagePreloader, PreloadReport};
use crate::services::output::{
    output_filename, Downloader, NoShare, ShareError, ShareTarget, TimestampClock,
};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("An export is already in progress")]
    Busy,

    #[error("Could not create the image: {0}")]
    CaptureFailed(String),

    #[error("Could not save the image: {0}")]
    Save(#[from] std::io::Error),

    #[error("Share failed, please download instead: {0}")]
    ShareFailed(String),
}

/// Export knobs taken from the configuration
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub format: ExportFormat,
    pub jpeg_quality: u8,
    pub settle_delay: Duration,
    pub preview_size: u32,
    pub caption_template: String,
    pub bind: BindOptions,
}

impl ExportSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            format: config.export.format,
            jpeg_quality: config.export.jpeg_quality,
            settle_delay: config.export.settle_delay(),
            preview_size: config.preview_size,
            caption_template: config.caption_template.clone(),
            bind: BindOptions::from_config(config),
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Debug, Clone)]
struct Selection {
    template: MarketingTemplate,
    data: PropertyMarketingData,
    image_offset: usize,
}

struct Inner {
    state: ExportState,
    selection: Option<Selection>,
    /// Live target, carrying the preview scale
    target: Option<RenderTarget>,
    /// Selection made while generating, applied once the capture settles
    pending: Option<Selection>,
    /// Bumped on every selection change
    epoch: u64,
    preloaded_epoch: Option<u64>,
    last_error: Option<String>,
}

pub struct ExportEngine {
    inner: Mutex<Inner>,
    renderer: CanvasRenderer,
    preloader: ImagePreloader,
    fonts: Arc<FontGate>,
    downloader: Downloader,
    staging: Downloader,
    share: Arc<dyn ShareTarget>,
    clock: Arc<TimestampClock>,
    settings: ExportSettings,
}

impl ExportEngine {
    pub fn new(
        renderer: CanvasRenderer,
        preloader: ImagePreloader,
        fonts: Arc<FontGate>,
        downloader: Downloader,
        settings: ExportSettings,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ExportState::Idle,
                selection: None,
                target: None,
                pending: None,
                epoch: 0,
                preloaded_epoch: None,
                last_error: None,
            }),
            renderer,
            preloader,
            fonts,
            downloader,
            staging: Downloader::new(std::env::temp_dir().join("marketkit-share")),
            share: Arc::new(NoShare),
            clock: Arc::new(TimestampClock::new()),
            settings,
        }
    }

    pub fn with_share(mut self, share: Arc<dyn ShareTarget>) -> Self {
        self.share = share;
        self
    }

    /// Share a clock between engines so filenames stay unique across them
    pub fn with_clock(mut self, clock: Arc<TimestampClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Directory images are written to before being handed to the share target
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging = Downloader::new(dir);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ExportState {
        self.lock().state
    }

    pub fn is_generating(&self) -> bool {
        self.state() == ExportState::Generating
    }

    /// Template switching, image swapping and export buttons are disabled
    /// while a capture runs
    pub fn controls_enabled(&self) -> bool {
        !self.is_generating()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn dismiss_error(&self) {
        let mut inner = self.lock();
        if inner.state == ExportState::Error {
            inner.state = ExportState::Idle;
            inner.last_error = None;
        }
    }

    /// The live render target, preview scale included
    pub fn target(&self) -> Option<RenderTarget> {
        self.lock().target.clone()
    }

    /// Id of the selected template, queued selections included
    pub fn selected_template(&self) -> Option<String> {
        let inner = self.lock();
        inner
            .pending
            .as_ref()
            .or(inner.selection.as_ref())
            .map(|s| s.template.id.clone())
    }

    /// Select what to render. Queued while a capture is in flight.
    pub fn select(&self, template: &MarketingTemplate, data: &PropertyMarketingData) {
        self.select_at(template, data, 0);
    }

    /// Select with the photo at `image_offset` as the primary one
    pub fn select_at(
        &self,
        template: &MarketingTemplate,
        data: &PropertyMarketingData,
        image_offset: usize,
    ) {
        let selection = Selection {
            template: template.clone(),
            data: data.clone(),
            image_offset,
        };
        let mut inner = self.lock();
        self.change_selection(&mut inner, selection);
    }

    /// Make the next photo the primary one
    pub fn swap_image(&self) {
        let mut inner = self.lock();
        let Some(current) = inner.pending.clone().or_else(|| inner.selection.clone()) else {
            return;
        };
        let photos = current.data.images.len();
        if photos <= 1 {
            return;
        }
        let selection = Selection {
            image_offset: (current.image_offset + 1) % photos,
            ..current
        };
        self.change_selection(&mut inner, selection);
    }

    fn change_selection(&self, inner: &mut Inner, selection: Selection) {
        inner.epoch += 1;
        if inner.state == ExportState::Generating {
            tracing::debug!(
                template = %selection.template.id,
                "Capture in flight, queueing selection"
            );
            inner.pending = Some(selection);
        } else {
            self.apply_selection(inner, selection);
            if inner.state != ExportState::Error {
                inner.state = ExportState::Idle;
            }
        }
    }

    fn apply_selection(&self, inner: &mut Inner, selection: Selection) {
        let options = self
            .settings
            .bind
            .clone()
            .with_image_offset(selection.image_offset);
        let target = self
            .renderer
            .bind(&selection.template, &selection.data, &options)
            .with_preview(self.settings.preview_size);
        tracing::debug!(template = %selection.template.id, "Selected template");
        inner.target = Some(target);
        inner.selection = Some(selection);
    }

    fn apply_pending(&self, inner: &mut Inner) {
        if let Some(selection) = inner.pending.take() {
            self.apply_selection(inner, selection);
        }
    }

    fn fail(&self, inner: &mut Inner, error: ExportError) -> ExportError {
        tracing::error!(error = %error, "Export failed");
        inner.state = ExportState::Error;
        inner.last_error = Some(error.to_string());
        error
    }

    /// SVG of the live target as previewed
    pub fn preview_svg(&self) -> Result<Option<String>, ExportError> {
        let target = self.target();
        target
            .map(|t| t.to_svg(self.preloader.store()))
            .transpose()
            .map_err(|e| ExportError::CaptureFailed(e.to_string()))
    }

    /// Fetch the photos the selected target uses
    pub async fn preload(&self) -> Result<PreloadReport, ExportError> {
        let (urls, epoch) = {
            let mut inner = self.lock();
            if inner.state == ExportState::Generating {
                return Err(ExportError::Busy);
            }
            let Some(target) = inner.target.as_ref() else {
                return Ok(PreloadReport::default());
            };
            let urls = target.image_urls();
            inner.state = ExportState::Preloading;
            (urls, inner.epoch)
        };

        let report = self.preloader.preload(&urls).await;

        let mut inner = self.lock();
        if inner.epoch == epoch {
            inner.preloaded_epoch = Some(epoch);
            if inner.state == ExportState::Preloading {
                inner.state = ExportState::Ready;
            }
        }
        Ok(report)
    }

    /// Capture the selected target and download or share it
    pub async fn export(&self, action: OutputAction) -> Result<ExportOutcome, ExportError> {
        tracing::info!(?action, "Export requested");
        let Some((selection, image)) = self.generate().await? else {
            return Ok(ExportOutcome::Discarded);
        };

        let delivered = self.deliver(action, &selection, image).await;

        let mut inner = self.lock();
        self.apply_pending(&mut inner);
        match delivered {
            Ok(outcome) => {
                inner.state = ExportState::Idle;
                inner.last_error = None;
                Ok(outcome)
            }
            Err(e) => Err(self.fail(&mut inner, e)),
        }
    }

    /// Capture the selected target without delivering it.
    ///
    /// `None` when the selection changed during the capture.
    pub async fn capture_image(&self) -> Result<Option<ExportedImage>, ExportError> {
        let Some((_, image)) = self.generate().await? else {
            return Ok(None);
        };
        let mut inner = self.lock();
        self.apply_pending(&mut inner);
        inner.state = ExportState::Idle;
        inner.last_error = None;
        Ok(Some(image))
    }

    /// Preload until the photos match the current selection, then capture.
    /// Leaves the engine in `Generating` on success.
    async fn generate(&self) -> Result<Option<(Selection, ExportedImage)>, ExportError> {
        let (selection, epoch) = loop {
            {
                let mut inner = self.lock();
                if inner.state == ExportState::Generating {
                    return Err(ExportError::Busy);
                }
                let selection = match inner.selection.clone() {
                    Some(selection) if inner.target.is_some() => selection,
                    _ => {
                        let error = ExportError::CaptureFailed("nothing to capture".to_string());
                        return Err(self.fail(&mut inner, error));
                    }
                };
                // Generating is only entered from Ready, with the photos of
                // this very selection fetched
                if inner.state == ExportState::Ready && inner.preloaded_epoch == Some(inner.epoch) {
                    inner.state = ExportState::Generating;
                    break (selection, inner.epoch);
                }
            }
            self.preload().await?;
        };

        tracing::info!(template = %selection.template.id, "Generating image");
        let captured = self.capture(&selection).await;

        let mut inner = self.lock();
        if inner.epoch != epoch {
            tracing::info!(
                template = %selection.template.id,
                "Selection changed during capture, discarding image"
            );
            self.apply_pending(&mut inner);
            inner.state = ExportState::Idle;
            return Ok(None);
        }
        match captured {
            Ok(image) => Ok(Some((selection, image))),
            Err(e) => Err(self.fail(&mut inner, e)),
        }
    }

    async fn capture(&self, selection: &Selection) -> Result<ExportedImage, ExportError> {
        let capture_failed = |e: crate::error::RenderError| ExportError::CaptureFailed(e.to_string());

        // Stabilize: fonts loaded, then let the scene settle
        let rasterizer = self.fonts.ready().await.map_err(capture_failed)?;
        if !self.settings.settle_delay.is_zero() {
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        let (svg, width, height, background) = {
            let mut inner = self.lock();
            let target = inner
                .target
                .as_mut()
                .ok_or_else(|| ExportError::CaptureFailed("nothing to capture".to_string()))?;
            let neutral = target.neutralize();
            let svg = neutral
                .to_svg(self.preloader.store())
                .map_err(capture_failed)?;
            (svg, neutral.width, neutral.height, neutral.background.clone())
        };

        let format = self.settings.format;
        let quality = self.settings.jpeg_quality;
        let bytes = tokio::task::spawn_blocking(move || {
            let pixmap = rasterizer.rasterize(&svg, width, height, &background)?;
            encode(&pixmap, format, quality)
        })
        .await
        .map_err(|e| ExportError::CaptureFailed(format!("capture task failed: {e}")))?
        .map_err(capture_failed)?;

        let filename = output_filename(
            self.renderer.brand(),
            &selection.data.title,
            &selection.template.id,
            self.clock.next(),
            format,
        );

        Ok(ExportedImage {
            bytes,
            format,
            width: width * PIXEL_RATIO,
            height: height * PIXEL_RATIO,
            filename,
        })
    }

    async fn deliver(
        &self,
        action: OutputAction,
        selection: &Selection,
        image: ExportedImage,
    ) -> Result<ExportOutcome, ExportError> {
        match action {
            OutputAction::Download => Ok(ExportOutcome::Downloaded(
                self.downloader.save(&image).await?,
            )),
            OutputAction::Share if !self.share.is_available() => {
                tracing::info!("No share sheet, downloading instead");
                let path = self.downloader.save(&image).await?;
                Ok(ExportOutcome::FellBackToDownload(path))
            }
            OutputAction::Share => {
                let caption = substitute_str(
                    &self.settings.caption_template,
                    &selection.data.substitution_map(self.renderer.brand()),
                );
                let staged = self.staging.save(&image).await?;
                let shared = self.share.share(&staged, &image, &caption).await;
                if let Err(e) = tokio::fs::remove_file(&staged).await {
                    tracing::warn!(path = %staged.display(), error = %e, "Could not remove staged image");
                }
                match shared {
                    Ok(()) => Ok(ExportOutcome::Shared),
                    Err(ShareError::Cancelled) => {
                        tracing::info!("Share dismissed");
                        Ok(ExportOutcome::ShareCancelled)
                    }
                    Err(ShareError::Unsupported) => {
                        tracing::info!("Sharing unsupported, downloading instead");
                        let path = self.downloader.save(&image).await?;
                        Ok(ExportOutcome::FellBackToDownload(path))
                    }
                    Err(ShareError::Failed(reason)) => Err(ExportError::ShareFailed(reason)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PreloadConfig;
    use crate::rendering::rasterize::SvgRasterizer;
    use crate::services::image_preloader::ImageStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::path::Path;
    use tempfile::TempDir;

    /// Answers each share with the next scripted result and records whether
    /// the staged file was there
    #[derive(Default)]
    struct ScriptedShare {
        results: Mutex<VecDeque<Result<(), ShareError>>>,
        staged: Mutex<Vec<(PathBuf, bool)>>,
    }

    impl ScriptedShare {
        fn new(results: Vec<Result<(), ShareError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                ..Default::default()
            })
        }

        fn staged(&self) -> Vec<(PathBuf, bool)> {
            self.staged.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ShareTarget for ScriptedShare {
        async fn share(
            &self,
            path: &Path,
            _image: &ExportedImage,
            _caption: &str,
        ) -> Result<(), ShareError> {
            self.staged
                .lock()
                .unwrap()
                .push((path.to_path_buf(), path.exists()));
            self.results.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .map(|entries| entries.filter_map(Result::ok).filter(|e| e.path().is_file()).count())
            .unwrap_or(0)
    }

    fn template(id: &str) -> MarketingTemplate {
        let yaml = format!(
            r##"id: {id}
name: Test
canvas: {{ width: 40, height: 40, background_color: "#2D5F3F" }}
objects:
  - {{ type: image, left: 0, top: 0, width: 40, height: 20 }}
  - {{ type: rect, left: 0, top: 20, width: 40, height: 20, fill: "#ffffff" }}
"##
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn listing() -> PropertyMarketingData {
        PropertyMarketingData {
            title: "Sunny 2BHK".to_string(),
            price: Some(4_500_000.0),
            ..Default::default()
        }
    }

    fn engine(dir: &TempDir, settle: Duration) -> ExportEngine {
        let settings = ExportSettings {
            settle_delay: settle,
            ..Default::default()
        };
        ExportEngine::new(
            CanvasRenderer::new("ACME"),
            ImagePreloader::new(PreloadConfig::default(), ImageStore::new()),
            Arc::new(FontGate::loaded(SvgRasterizer::with_fonts(Vec::new()))),
            Downloader::new(dir.path()),
            settings,
        )
        .with_staging_dir(dir.path().join("staging"))
    }

    #[tokio::test]
    async fn test_export_without_target_fails_gracefully() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Duration::ZERO);

        let result = engine.export(OutputAction::Download).await;
        assert!(matches!(result, Err(ExportError::CaptureFailed(_))));
        assert_eq!(engine.state(), ExportState::Error);
        assert!(engine.last_error().unwrap().contains("nothing to capture"));

        engine.dismiss_error();
        assert_eq!(engine.state(), ExportState::Idle);
        assert!(engine.last_error().is_none());
    }

    #[tokio::test]
    async fn test_download_flow() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Duration::ZERO);
        engine.select(&template("professional"), &listing());
        assert_eq!(engine.state(), ExportState::Idle);

        let outcome = engine.export(OutputAction::Download).await.unwrap();
        let ExportOutcome::Downloaded(path) = outcome else {
            panic!("expected a download, got {outcome:?}");
        };
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("ACME_Sunny_2BHK_professional_"));
        assert!(name.ends_with(".jpg"));

        let decoded = image::load_from_memory(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (80, 80));
        assert_eq!(engine.state(), ExportState::Idle);

        // Preview scale survives the capture
        assert!(engine.target().unwrap().root_transform.is_some());
    }

    #[tokio::test]
    async fn test_preload_transitions_to_ready() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Duration::ZERO);
        engine.select(&template("professional"), &listing());

        let report = engine.preload().await.unwrap();
        assert!(report.outcomes.is_empty());
        assert_eq!(engine.state(), ExportState::Ready);

        engine.select(&template("modern-card"), &listing());
        assert_eq!(engine.state(), ExportState::Idle);
    }

    #[tokio::test]
    async fn test_selection_during_capture_is_queued_and_capture_discarded() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(engine(&dir, Duration::from_millis(300)));
        engine.select(&template("professional"), &listing());

        let running = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.export(OutputAction::Download).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(engine.is_generating());
        assert!(!engine.controls_enabled());
        assert!(matches!(
            engine.export(OutputAction::Download).await,
            Err(ExportError::Busy)
        ));

        engine.select(&template("luxury-dark"), &listing());
        // Target stays put until the capture settles
        assert_eq!(engine.target().unwrap().template_id, "professional");
        assert_eq!(engine.selected_template().as_deref(), Some("luxury-dark"));

        let outcome = running.await.unwrap().unwrap();
        assert_eq!(outcome, ExportOutcome::Discarded);
        assert_eq!(engine.target().unwrap().template_id, "luxury-dark");
        assert!(engine.controls_enabled());
        let written = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().is_file())
            .count();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn test_capture_image_returns_bytes() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Duration::ZERO);
        engine.select(&template("split-screen"), &listing());

        let image = engine.capture_image().await.unwrap().unwrap();
        assert_eq!((image.width, image.height), (80, 80));
        assert_eq!(&image.bytes[..2], &[0xFF, 0xD8]);
        assert!(image.filename.contains("_split-screen_"));
        assert_eq!(engine.state(), ExportState::Idle);
    }

    #[tokio::test]
    async fn test_share_unsupported_falls_back_to_download() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Duration::ZERO);
        engine.select(&template("bold-banner"), &listing());

        let outcome = engine.export(OutputAction::Share).await.unwrap();
        match outcome {
            ExportOutcome::FellBackToDownload(path) => assert!(path.starts_with(dir.path())),
            other => panic!("expected fallback, got {other:?}"),
        }
        // No share sheet, so nothing is staged
        assert!(!dir.path().join("staging").exists());
    }

    #[tokio::test]
    async fn test_share_removes_staged_file() {
        let dir = TempDir::new().unwrap();
        let share = ScriptedShare::new(vec![Ok(())]);
        let engine = engine(&dir, Duration::ZERO).with_share(share.clone());
        engine.select(&template("bold-banner"), &listing());

        let outcome = engine.export(OutputAction::Share).await.unwrap();
        assert_eq!(outcome, ExportOutcome::Shared);

        let staged = share.staged();
        assert_eq!(staged.len(), 1);
        let (path, existed) = &staged[0];
        assert!(existed);
        assert!(!path.exists());
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_share_cancel_is_silent() {
        let dir = TempDir::new().unwrap();
        let share = ScriptedShare::new(vec![Err(ShareError::Cancelled)]);
        let engine = engine(&dir, Duration::ZERO).with_share(share.clone());
        engine.select(&template("bold-banner"), &listing());

        let outcome = engine.export(OutputAction::Share).await.unwrap();
        assert_eq!(outcome, ExportOutcome::ShareCancelled);
        assert_eq!(engine.state(), ExportState::Idle);
        assert!(engine.last_error().is_none());
        assert_eq!(files_in(dir.path()), 0);
        assert_eq!(files_in(&dir.path().join("staging")), 0);
    }

    #[tokio::test]
    async fn test_share_failure_sets_error_until_next_success() {
        let dir = TempDir::new().unwrap();
        let share = ScriptedShare::new(vec![Err(ShareError::Failed("sheet crashed".into()))]);
        let engine = engine(&dir, Duration::ZERO).with_share(share.clone());
        engine.select(&template("bold-banner"), &listing());

        let result = engine.export(OutputAction::Share).await;
        assert!(matches!(result, Err(ExportError::ShareFailed(_))));
        assert_eq!(engine.state(), ExportState::Error);
        let banner = engine.last_error().unwrap();
        assert!(banner.starts_with("Share failed, please download instead"), "{banner}");
        assert_eq!(files_in(&dir.path().join("staging")), 0);

        // Retrying goes back through a preload before capturing
        let outcome = engine.export(OutputAction::Download).await.unwrap();
        assert!(matches!(outcome, ExportOutcome::Downloaded(_)));
        assert_eq!(engine.state(), ExportState::Idle);
        assert!(engine.last_error().is_none());
    }

    #[tokio::test]
    async fn test_swap_image_rotates_primary() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, Duration::ZERO);
        let mut data = listing();
        data.images = vec!["https://img.test/a.jpg".into(), "https://img.test/b.jpg".into()];
        engine.select(&template("professional"), &data);
        assert_eq!(engine.target().unwrap().image_urls(), vec!["https://img.test/a.jpg"]);

        engine.swap_image();
        assert_eq!(engine.target().unwrap().image_urls(), vec!["https://img.test/b.jpg"]);
        engine.swap_image();
        assert_eq!(engine.target().unwrap().image_urls(), vec!["https://img.test/a.jpg"]);
    }
}
