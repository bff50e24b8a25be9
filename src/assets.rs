//! Asset loading with embedded fallbacks
//!
//! Templates and the default config are compiled into the binary. Each can be
//! overridden on disk:
//!
//! - If an env var is NOT set: use embedded assets only (no filesystem access)
//! - If an env var IS set and path is empty/missing: seed with embedded assets, then use filesystem
//! - If an env var IS set and path has files: use filesystem with embedded fallback
//!
//! Fonts are never embedded; they come from `FONTS_DIR` and the system font set.

use rust_embed::RustEmbed;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Embedded marketing templates (one YAML document per template)
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.yaml"]
struct EmbeddedTemplates;

/// Embedded default config
#[derive(RustEmbed)]
#[folder = "."]
#[include = "config.yaml"]
struct EmbeddedConfig;

/// Asset category for selective operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetCategory {
    Templates,
    Config,
}

/// Report of seeding operations
#[derive(Debug, Default)]
pub struct SeedReport {
    pub templates_seeded: Vec<String>,
    pub config_seeded: bool,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        self.templates_seeded.is_empty() && !self.config_seeded
    }
}

/// Report of init (extraction) operations
#[derive(Debug, Default)]
pub struct InitReport {
    pub written: Vec<String>,
    pub skipped: Vec<String>,
}

/// Asset loader with merge behavior and optional filesystem override
#[derive(Debug, Clone)]
pub struct AssetLoader {
    /// External templates directory (from TEMPLATES_DIR env var)
    templates_dir: Option<PathBuf>,
    /// External fonts directory (from FONTS_DIR env var)
    fonts_dir: Option<PathBuf>,
    /// External config file path (from CONFIG_FILE env var)
    config_file: Option<PathBuf>,
}

impl AssetLoader {
    /// Create a new asset loader
    ///
    /// Paths should be `Some` only if the corresponding env var was set.
    /// If `None`, embedded assets are used exclusively.
    pub fn new(
        templates_dir: Option<PathBuf>,
        fonts_dir: Option<PathBuf>,
        config_file: Option<PathBuf>,
    ) -> Self {
        Self {
            templates_dir,
            fonts_dir,
            config_file,
        }
    }

    /// Create a loader from the `TEMPLATES_DIR`, `FONTS_DIR` and `CONFIG_FILE` env vars
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("TEMPLATES_DIR").ok().map(PathBuf::from),
            std::env::var("FONTS_DIR").ok().map(PathBuf::from),
            std::env::var("CONFIG_FILE").ok().map(PathBuf::from),
        )
    }

    /// Read a template document by file name
    ///
    /// If an external path is configured, tries filesystem first, then falls back to embedded.
    pub fn read_template(&self, name: &str) -> io::Result<Cow<'static, [u8]>> {
        if let Some(ref dir) = self.templates_dir {
            let full_path = dir.join(name);
            if full_path.exists() {
                tracing::trace!(path = %full_path.display(), "Loading template from filesystem");
                return Ok(Cow::Owned(fs::read(&full_path)?));
            }
        }

        EmbeddedTemplates::get(name)
            .map(|f| {
                tracing::trace!(template = %name, "Loading template from embedded assets");
                f.data
            })
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Template not found: {name}"),
                )
            })
    }

    /// Read a template document as a UTF-8 string
    pub fn read_template_string(&self, name: &str) -> io::Result<String> {
        let bytes = self.read_template(name)?;
        String::from_utf8(bytes.into_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// List all available template files (merged view of embedded + external)
    pub fn list_templates(&self) -> Vec<String> {
        let mut files: HashSet<String> =
            EmbeddedTemplates::iter().map(|s| s.to_string()).collect();

        if let Some(ref dir) = self.templates_dir {
            if let Ok(entries) = fs::read_dir(dir) {
                for entry in entries.flatten() {
                    if let Some(name) = entry.file_name().to_str() {
                        if name.ends_with(".yaml") || name.ends_with(".yml") {
                            files.insert(name.to_string());
                        }
                    }
                }
            }
        }

        let mut result: Vec<_> = files.into_iter().collect();
        result.sort();
        result
    }

    /// Get all font data from the fonts directory (for loading into fontdb)
    pub fn get_fonts(&self) -> Vec<(String, Cow<'static, [u8]>)> {
        let mut fonts = Vec::new();

        if let Some(ref dir) = self.fonts_dir {
            if let Ok(entries) = fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if let Some(ext) = path.extension() {
                        if matches!(ext.to_str(), Some("ttf" | "otf" | "ttc")) {
                            if let Ok(data) = fs::read(&path) {
                                let name = entry.file_name().to_string_lossy().to_string();
                                tracing::trace!(font = %name, "Loading font from filesystem");
                                fonts.push((name, Cow::Owned(data)));
                            }
                        }
                    }
                }
            }
        }

        fonts
    }

    /// Read the config file
    ///
    /// If an external path is configured and exists, uses that.
    /// Otherwise falls back to embedded config.
    pub fn read_config(&self) -> io::Result<Cow<'static, [u8]>> {
        if let Some(ref path) = self.config_file {
            if path.exists() {
                tracing::trace!(path = %path.display(), "Loading config from filesystem");
                return Ok(Cow::Owned(fs::read(path)?));
            }
        }

        EmbeddedConfig::get("config.yaml")
            .map(|f| {
                tracing::trace!("Loading config from embedded assets");
                f.data
            })
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "Embedded config.yaml not found")
            })
    }

    /// Read config as a UTF-8 string
    pub fn read_config_string(&self) -> io::Result<String> {
        let bytes = self.read_config()?;
        String::from_utf8(bytes.into_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Check if a directory exists and is empty (ignoring .gitkeep)
    fn is_empty_dir(path: &Path) -> bool {
        if !path.exists() || !path.is_dir() {
            return false;
        }
        path.read_dir()
            .map(|mut entries| {
                entries.all(|e| {
                    e.map(|entry| entry.file_name() == ".gitkeep")
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    /// Seed empty/missing directories with embedded assets
    ///
    /// Only operates on paths that were configured (env var was set).
    pub fn seed_if_configured(&self) -> io::Result<SeedReport> {
        let mut report = SeedReport::default();

        if let Some(ref dir) = self.templates_dir {
            if !dir.exists() || Self::is_empty_dir(dir) {
                fs::create_dir_all(dir)?;
                for file in EmbeddedTemplates::iter() {
                    if let Some(data) = EmbeddedTemplates::get(&file) {
                        fs::write(dir.join(file.as_ref()), &*data.data)?;
                        report.templates_seeded.push(file.to_string());
                    }
                }
                if !report.templates_seeded.is_empty() {
                    tracing::info!(
                        dir = %dir.display(),
                        count = report.templates_seeded.len(),
                        "Seeded templates directory with embedded assets"
                    );
                }
            }
        }

        if let Some(ref path) = self.config_file {
            if !path.exists() {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                if let Some(data) = EmbeddedConfig::get("config.yaml") {
                    fs::write(path, &*data.data)?;
                    report.config_seeded = true;
                    tracing::info!(path = %path.display(), "Seeded config file with embedded default");
                }
            }
        }

        Ok(report)
    }

    /// Extract embedded assets to filesystem (init command)
    pub fn init(&self, categories: &[AssetCategory], force: bool) -> io::Result<InitReport> {
        let mut report = InitReport::default();

        for category in categories {
            match category {
                AssetCategory::Templates => {
                    let dir = self
                        .templates_dir
                        .clone()
                        .unwrap_or_else(|| PathBuf::from("./templates"));
                    fs::create_dir_all(&dir)?;

                    for file in EmbeddedTemplates::iter() {
                        let path = dir.join(file.as_ref());
                        if !force && path.exists() {
                            report.skipped.push(path.display().to_string());
                            continue;
                        }
                        if let Some(data) = EmbeddedTemplates::get(&file) {
                            fs::write(&path, &*data.data)?;
                            report.written.push(path.display().to_string());
                        }
                    }
                }
                AssetCategory::Config => {
                    let path = self
                        .config_file
                        .clone()
                        .unwrap_or_else(|| PathBuf::from("./config.yaml"));

                    if !force && path.exists() {
                        report.skipped.push(path.display().to_string());
                        continue;
                    }
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    if let Some(data) = EmbeddedConfig::get("config.yaml") {
                        fs::write(&path, &*data.data)?;
                        report.written.push(path.display().to_string());
                    }
                }
            }
        }

        Ok(report)
    }

    /// List embedded assets by category (for display)
    pub fn list_embedded(category: AssetCategory) -> Vec<String> {
        match category {
            AssetCategory::Templates => EmbeddedTemplates::iter().map(|s| s.to_string()).collect(),
            AssetCategory::Config => vec!["config.yaml".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_embedded_templates_listed() {
        let templates = AssetLoader::list_embedded(AssetCategory::Templates);
        assert!(templates.contains(&"professional.yaml".to_string()));
        assert!(templates.contains(&"luxury-dark.yaml".to_string()));
    }

    #[test]
    fn test_external_template_overrides_embedded() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("professional.yaml"), "id: overridden").unwrap();

        let loader = AssetLoader::new(Some(dir.path().to_path_buf()), None, None);
        let content = loader.read_template_string("professional.yaml").unwrap();
        assert_eq!(content, "id: overridden");

        // Embedded fallback for files not on disk
        let other = loader.read_template_string("bold-banner.yaml").unwrap();
        assert!(other.contains("bold-banner"));
    }

    #[test]
    fn test_missing_template() {
        let loader = AssetLoader::new(None, None, None);
        let err = loader.read_template("nope.yaml").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_seed_empty_templates_dir() {
        let dir = TempDir::new().unwrap();
        let templates_dir = dir.path().join("templates");

        let loader = AssetLoader::new(Some(templates_dir.clone()), None, None);
        let report = loader.seed_if_configured().unwrap();

        assert!(!report.is_empty());
        assert!(templates_dir.join("modern-card.yaml").exists());
    }

    #[test]
    fn test_init_skips_existing_without_force() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("config.yaml");
        std::fs::write(&config, "brand: ACME").unwrap();

        let loader = AssetLoader::new(None, None, Some(config.clone()));
        let report = loader.init(&[AssetCategory::Config], false).unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(std::fs::read_to_string(&config).unwrap(), "brand: ACME");

        let report = loader.init(&[AssetCategory::Config], true).unwrap();
        assert_eq!(report.written.len(), 1);
    }
}
