use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// Raster format of an exported image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Jpeg,
    Png,
}

impl ExportFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }
}

/// Export engine lifecycle.
///
/// `Idle → Preloading → Ready → Generating → (Idle | Error)`. `Generating`
/// is only entered from `Ready`; `Error` is cleared by dismissing it or by a
/// successful retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportState {
    Idle,
    Preloading,
    Ready,
    Generating,
    Error,
}

/// A captured image ready for download or sharing
#[derive(Debug, Clone)]
pub struct ExportedImage {
    pub bytes: Vec<u8>,
    pub format: ExportFormat,
    /// Pixel size after applying the export pixel ratio
    pub width: u32,
    pub height: u32,
    pub filename: String,
}

/// What to do with a captured image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputAction {
    Download,
    Share,
}

/// Result of a completed export action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Downloaded(PathBuf),
    Shared,
    /// The user dismissed the share sheet; nothing happened
    ShareCancelled,
    /// Sharing is not available here, the image was saved instead
    FellBackToDownload(PathBuf),
    /// The selection changed while capturing; the stale image was dropped
    Discarded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_format_parsing() {
        assert_eq!(ExportFormat::from_str("JPG"), Some(ExportFormat::Jpeg));
        assert_eq!(ExportFormat::from_str("png"), Some(ExportFormat::Png));
        assert_eq!(ExportFormat::from_str("gif"), None);
        assert_eq!(ExportFormat::Jpeg.extension(), "jpg");
        assert_eq!(ExportFormat::Png.mime_type(), "image/png");
    }
}
