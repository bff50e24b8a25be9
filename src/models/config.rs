use crate::assets::AssetLoader;
use crate::models::ExportFormat;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from config.yaml
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Brand name used in watermarks, logos and output filenames
    #[serde(default = "default_brand")]
    pub brand: String,

    /// Caption attached when sharing; supports the template placeholders
    #[serde(default = "default_caption")]
    pub caption_template: String,

    #[serde(default)]
    pub property_api: PropertyApiConfig,

    /// Edge length of the scaled-down preview
    #[serde(default = "default_preview_size")]
    pub preview_size: u32,

    #[serde(default)]
    pub preload: PreloadConfig,

    #[serde(default)]
    pub export: ExportConfig,

    /// Where the last-used template per property is remembered
    #[serde(default)]
    pub preferences_file: Option<PathBuf>,
}

fn default_brand() -> String {
    "SAUDAPAKKA".to_string()
}

fn default_caption() -> String {
    "Check out this property: {{title}} - {{price}}".to_string()
}

fn default_preview_size() -> u32 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct PropertyApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_api_timeout() -> u64 {
    15
}

impl Default for PropertyApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_api_timeout(),
        }
    }
}

/// Image preloading limits
#[derive(Debug, Deserialize, Clone)]
pub struct PreloadConfig {
    /// Only the first N images referenced by a template are fetched
    #[serde(default = "default_max_images")]
    pub max_images: usize,
    /// Per-image timeout
    #[serde(default = "default_image_timeout")]
    pub timeout_ms: u64,
    /// Upper bound for the whole preload join
    #[serde(default = "default_deadline")]
    pub deadline_ms: u64,
    /// Append a cache-busting query parameter to remote image URLs
    #[serde(default = "default_true")]
    pub cache_bust: bool,
}

fn default_max_images() -> usize {
    3
}

fn default_image_timeout() -> u64 {
    10_000
}

fn default_deadline() -> u64 {
    15_000
}

fn default_true() -> bool {
    true
}

impl PreloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            max_images: default_max_images(),
            timeout_ms: default_image_timeout(),
            deadline_ms: default_deadline(),
            cache_bust: true,
        }
    }
}

/// What to draw in an image slot the listing has no photo for
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MissingImagePolicy {
    /// Reuse the primary photo
    #[default]
    RepeatPrimary,
    /// Draw a neutral placeholder block
    Blank,
    /// Leave the slot out entirely
    Hide,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default = "default_quality")]
    pub jpeg_quality: u8,
    /// Delay after fonts are ready and before capture
    #[serde(default = "default_settle")]
    pub settle_delay_ms: u64,
    /// Opaque fill used when the template background is unusable
    #[serde(default = "default_background_fallback")]
    pub background_fallback: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub missing_image: MissingImagePolicy,
    /// External command that presents a share sheet
    #[serde(default)]
    pub share_command: Option<String>,
}

fn default_quality() -> u8 {
    90
}

fn default_settle() -> u64 {
    600
}

fn default_background_fallback() -> String {
    "#ffffff".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl ExportConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::default(),
            jpeg_quality: default_quality(),
            settle_delay_ms: default_settle(),
            background_fallback: default_background_fallback(),
            output_dir: default_output_dir(),
            missing_image: MissingImagePolicy::default(),
            share_command: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from AssetLoader (embedded or external)
    pub fn load_from_assets(loader: &AssetLoader) -> Self {
        match loader.read_config_string() {
            Ok(content) => match serde_yaml::from_str(&content) {
                Ok(config) => {
                    let config: Self = config;
                    tracing::info!(
                        brand = %config.brand,
                        api = %config.property_api.base_url,
                        format = ?config.export.format,
                        "Loaded configuration"
                    );
                    config
                }
                Err(e) => {
                    tracing::warn!(%e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(%e, "Failed to read config, using defaults");
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            brand: default_brand(),
            caption_template: default_caption(),
            property_api: PropertyApiConfig::default(),
            preview_size: default_preview_size(),
            preload: PreloadConfig::default(),
            export: ExportConfig::default(),
            preferences_file: None,
        }
    }
}
