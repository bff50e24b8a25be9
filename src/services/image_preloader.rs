//! Listing photo preloading.
//!
//! Photos are fetched before a capture so the rasterizer never waits on the
//! network. Fetches fan out concurrently; each is bounded by its own timeout
//! and the whole join by an overall deadline. A failed photo becomes a gap in
//! the capture, it is never retried.

use base64::Engine;
use futures_util::future::join_all;
use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;

use crate::models::PreloadConfig;

#[derive(Debug, Error)]
pub enum PreloadError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {0}")]
    Status(u16),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("preload deadline exceeded")]
    Deadline,

    #[error("malformed data URL")]
    InvalidDataUrl,

    #[error("unsupported URL: {0}")]
    UnsupportedUrl(String),

    #[error("not a supported image")]
    NotAnImage,
}

/// A photo held in memory for inlining
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub bytes: Arc<Vec<u8>>,
    pub mime: String,
    pub etag: String,
}

/// Preloaded photos keyed by their original URL.
///
/// Cheap to clone; all clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    images: Arc<RwLock<HashMap<String, StoredImage>>>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a photo and return its etag
    pub fn insert(&self, url: &str, bytes: Vec<u8>, mime: &str) -> String {
        let etag = compute_etag(&bytes);
        let image = StoredImage {
            bytes: Arc::new(bytes),
            mime: mime.to_string(),
            etag: etag.clone(),
        };
        self.images
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), image);
        etag
    }

    pub fn get(&self, url: &str) -> Option<StoredImage> {
        self.images
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.images
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.images
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `data:` URI for inlining the photo into SVG
    pub fn data_uri(&self, url: &str) -> Option<String> {
        self.get(url).map(|img| {
            format!(
                "data:{};base64,{}",
                img.mime,
                base64::engine::general_purpose::STANDARD.encode(img.bytes.as_slice())
            )
        })
    }
}

fn compute_etag(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..8])
}

/// How a single photo settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadOutcome {
    Loaded { url: String, etag: String },
    Failed { url: String, reason: String },
}

impl PreloadOutcome {
    pub fn url(&self) -> &str {
        match self {
            Self::Loaded { url, .. } | Self::Failed { url, .. } => url,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }
}

/// Result of a preload pass, one outcome per requested photo
#[derive(Debug, Clone, Default)]
pub struct PreloadReport {
    pub outcomes: Vec<PreloadOutcome>,
    /// The overall deadline cut the join short
    pub deadline_hit: bool,
}

impl PreloadReport {
    pub fn loaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_loaded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.loaded()
    }
}

/// Fetches listing photos into an [`ImageStore`]
#[derive(Clone)]
pub struct ImagePreloader {
    client: reqwest::Client,
    config: PreloadConfig,
    store: ImageStore,
}

impl ImagePreloader {
    pub fn new(config: PreloadConfig, store: ImageStore) -> Self {
        Self::with_client(reqwest::Client::new(), config, store)
    }

    pub fn with_client(client: reqwest::Client, config: PreloadConfig, store: ImageStore) -> Self {
        Self {
            client,
            config,
            store,
        }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// Fetch the first `max_images` of `urls`.
    ///
    /// Returns once every fetch settled or the deadline passed, whichever
    /// comes first. Photos already in the store are not fetched again.
    pub async fn preload(&self, urls: &[String]) -> PreloadReport {
        let urls: Vec<&String> = urls.iter().take(self.config.max_images).collect();
        if urls.is_empty() {
            return PreloadReport::default();
        }

        let per_item = self.config.timeout();
        let fetches = urls.iter().map(|url| async move {
            if let Some(img) = self.store.get(url) {
                return PreloadOutcome::Loaded {
                    url: url.to_string(),
                    etag: img.etag,
                };
            }
            let result = match tokio::time::timeout(per_item, self.fetch(url)).await {
                Ok(result) => result,
                Err(_) => Err(PreloadError::Timeout(per_item)),
            };
            match result {
                Ok((bytes, mime)) => {
                    let etag = self.store.insert(url, bytes, &mime);
                    tracing::debug!(url = %url, %etag, mime, "Preloaded image");
                    PreloadOutcome::Loaded {
                        url: url.to_string(),
                        etag,
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Image preload failed");
                    PreloadOutcome::Failed {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                }
            }
        });

        let report = match tokio::time::timeout(self.config.deadline(), join_all(fetches)).await {
            Ok(outcomes) => PreloadReport {
                outcomes,
                deadline_hit: false,
            },
            Err(_) => {
                tracing::warn!(
                    deadline_ms = self.config.deadline_ms,
                    "Image preload deadline exceeded, continuing with what loaded"
                );
                let outcomes = urls
                    .iter()
                    .map(|url| match self.store.get(url) {
                        Some(img) => PreloadOutcome::Loaded {
                            url: url.to_string(),
                            etag: img.etag,
                        },
                        None => PreloadOutcome::Failed {
                            url: url.to_string(),
                            reason: PreloadError::Deadline.to_string(),
                        },
                    })
                    .collect();
                PreloadReport {
                    outcomes,
                    deadline_hit: true,
                }
            }
        };

        tracing::info!(
            loaded = report.loaded(),
            failed = report.failed(),
            "Image preload settled"
        );
        report
    }

    async fn fetch(&self, url: &str) -> Result<(Vec<u8>, String), PreloadError> {
        if url.starts_with("data:") {
            return decode_data_url(url);
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(PreloadError::UnsupportedUrl(url.to_string()));
        }

        let request_url = if self.config.cache_bust {
            cache_busted(url)?
        } else {
            url.to_string()
        };

        let response = self.client.get(&request_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PreloadError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?.to_vec();
        let mime = sniff_mime(&bytes).ok_or(PreloadError::NotAnImage)?;
        Ok((bytes, mime.to_string()))
    }
}

/// Append `_cb=<millis>` so intermediaries can't serve a stale photo
pub fn cache_busted(url: &str) -> Result<String, PreloadError> {
    let mut parsed =
        reqwest::Url::parse(url).map_err(|_| PreloadError::UnsupportedUrl(url.to_string()))?;
    parsed
        .query_pairs_mut()
        .append_pair("_cb", &chrono::Utc::now().timestamp_millis().to_string());
    Ok(parsed.to_string())
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        image::ImageFormat::Png => Some("image/png"),
        image::ImageFormat::Jpeg => Some("image/jpeg"),
        image::ImageFormat::Gif => Some("image/gif"),
        image::ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

fn decode_data_url(url: &str) -> Result<(Vec<u8>, String), PreloadError> {
    let rest = url.strip_prefix("data:").ok_or(PreloadError::InvalidDataUrl)?;
    let (meta, payload) = rest.split_once(',').ok_or(PreloadError::InvalidDataUrl)?;

    let bytes = if meta.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|_| PreloadError::InvalidDataUrl)?
    } else {
        percent_decode_str(payload).collect()
    };
    let mime = sniff_mime(&bytes).ok_or(PreloadError::NotAnImage)?;
    Ok((bytes, mime.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_1X1: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0xF8,
        0xCF, 0xC0, 0xF0, 0x1F, 0x00, 0x05, 0x00, 0x01, 0xFF, 0x89, 0x99, 0x3D, 0x1D, 0x00, 0x00,
        0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    #[test]
    fn test_store_data_uri() {
        let store = ImageStore::new();
        assert!(store.data_uri("x").is_none());

        let etag = store.insert("x", vec![0xFF, 0xD8, 0xFF], "image/jpeg");
        assert_eq!(etag.len(), 16);
        assert_eq!(store.data_uri("x").unwrap(), "data:image/jpeg;base64,/9j/");

        let shared = store.clone();
        assert!(shared.contains("x"));
        assert_eq!(shared.len(), 1);
    }

    #[test]
    fn test_decode_data_url() {
        let url = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(PNG_1X1)
        );
        let (bytes, mime) = decode_data_url(&url).unwrap();
        assert_eq!(bytes, PNG_1X1);
        assert_eq!(mime, "image/png");

        assert!(matches!(
            decode_data_url("data:text/plain,hello"),
            Err(PreloadError::NotAnImage)
        ));
        assert!(matches!(
            decode_data_url("data:image/png;base64"),
            Err(PreloadError::InvalidDataUrl)
        ));
    }

    #[test]
    fn test_cache_busted_appends_param() {
        let url = cache_busted("https://cdn.test/a.jpg?w=800").unwrap();
        assert!(url.starts_with("https://cdn.test/a.jpg?w=800&_cb="));
        assert!(cache_busted("not a url").is_err());
    }

    #[tokio::test]
    async fn test_preload_bounds_and_skips_bad_urls() {
        let store = ImageStore::new();
        let config = PreloadConfig {
            max_images: 2,
            ..Default::default()
        };
        let preloader = ImagePreloader::new(config, store.clone());
        let data_url = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(PNG_1X1)
        );

        let report = preloader
            .preload(&[
                data_url.clone(),
                "/media/relative.jpg".to_string(),
                "data:image/png;base64,AAAA".to_string(),
            ])
            .await;

        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes[0].is_loaded());
        assert_eq!(report.outcomes[1].url(), "/media/relative.jpg");
        assert!(!report.outcomes[1].is_loaded());
        assert!(!report.deadline_hit);
        assert!(store.contains(&data_url));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_preload_empty() {
        let preloader = ImagePreloader::new(PreloadConfig::default(), ImageStore::new());
        let report = preloader.preload(&[]).await;
        assert!(report.outcomes.is_empty());
        assert_eq!(report.failed(), 0);
    }
}
