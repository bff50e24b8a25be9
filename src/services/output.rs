//! Where captured images go: a file in the output directory, or a share target.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

use crate::models::{ExportFormat, ExportedImage};

const MAX_PART_LEN: usize = 40;

/// `<brand>_<title>_<style>_<timestamp>.<ext>`, every part sanitized so the
/// name stays inside the output directory
pub fn output_filename(
    brand: &str,
    title: &str,
    style: &str,
    timestamp: i64,
    format: ExportFormat,
) -> String {
    format!(
        "{}_{}_{}_{}.{}",
        sanitize_part(brand, "brand"),
        sanitize_title(title),
        sanitize_part(style, "style"),
        timestamp,
        format.extension()
    )
}

/// Runs of `[A-Za-z0-9-]` joined by `_`, at most 40 characters
pub fn sanitize_title(title: &str) -> String {
    sanitize_part(title, "property")
}

fn sanitize_part(part: &str, fallback: &str) -> String {
    let joined = part
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .filter(|run| !run.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    let truncated: String = joined.chars().take(MAX_PART_LEN).collect();
    let truncated = truncated.trim_end_matches('_');
    if truncated.is_empty() {
        fallback.to_string()
    } else {
        truncated.to_string()
    }
}

/// Millisecond timestamps that never repeat within a process
#[derive(Debug, Default)]
pub struct TimestampClock {
    last: AtomicI64,
}

impl TimestampClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, candidate, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Saves captured images into a directory
#[derive(Debug, Clone)]
pub struct Downloader {
    output_dir: PathBuf,
}

impl Downloader {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn save(&self, image: &ExportedImage) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(&image.filename);
        tokio::fs::write(&path, &image.bytes).await?;
        tracing::info!(path = %path.display(), bytes = image.bytes.len(), "Saved image");
        Ok(path)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShareError {
    #[error("share dismissed")]
    Cancelled,

    #[error("sharing is not supported here")]
    Unsupported,

    #[error("share failed: {0}")]
    Failed(String),
}

/// A native share sheet or an equivalent.
///
/// `path` is the image already written to disk; targets that only take bytes
/// can use `image` instead.
#[async_trait]
pub trait ShareTarget: Send + Sync {
    /// `false` when there is no share sheet at all; nothing is staged then
    fn is_available(&self) -> bool {
        true
    }

    async fn share(
        &self,
        path: &Path,
        image: &ExportedImage,
        caption: &str,
    ) -> Result<(), ShareError>;
}

/// No share sheet available
pub struct NoShare;

#[async_trait]
impl ShareTarget for NoShare {
    fn is_available(&self) -> bool {
        false
    }

    async fn share(&self, _: &Path, _: &ExportedImage, _: &str) -> Result<(), ShareError> {
        Err(ShareError::Unsupported)
    }
}

/// Shares by running an external program with the file path and caption.
///
/// A program that can't be found means sharing is unsupported. Exit code 130
/// (the user interrupted it) counts as a dismissed share sheet.
pub struct CommandShare {
    program: String,
    args: Vec<String>,
}

impl CommandShare {
    /// Parse a whitespace separated command line
    pub fn parse(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl ShareTarget for CommandShare {
    async fn share(
        &self,
        path: &Path,
        _image: &ExportedImage,
        caption: &str,
    ) -> Result<(), ShareError> {
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .arg(caption)
            .status()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ShareError::Unsupported,
                _ => ShareError::Failed(e.to_string()),
            })?;

        match status.code() {
            Some(0) => Ok(()),
            Some(130) => Err(ShareError::Cancelled),
            Some(code) => Err(ShareError::Failed(format!(
                "{} exited with {code}",
                self.program
            ))),
            None => Err(ShareError::Cancelled),
        }
    }
}
