//! Upload image preparation
//!
//! Photos are downscaled so the long edge fits `max_edge` and re-encoded as
//! JPEG before upload. Any failure is reported as `None`; callers fall back to
//! the raw bytes.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Re-encoded photo and where it was written
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub bytes: Vec<u8>,
    pub prepared_ref: String,
}

#[async_trait]
pub trait ImagePreparer: Send + Sync {
    /// Downscale and re-encode; `None` when the source cannot be decoded
    async fn prepare(&self, photo_ref: &str) -> Option<PreparedImage>;

    /// Original bytes; `None` when the source cannot be read
    async fn read_raw(&self, photo_ref: &str) -> Option<Vec<u8>>;

    /// Drop a prepared copy nothing will reference
    async fn discard(&self, prepared_ref: &str);
}

/// Local filesystem path behind a photo reference (plain path or `file://` URI)
pub fn resolve_path(photo_ref: &str) -> PathBuf {
    PathBuf::from(photo_ref.strip_prefix("file://").unwrap_or(photo_ref))
}

/// Target size with the long edge bounded by `max_edge`; never upscales
pub fn scaled_dimensions(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let long_edge = width.max(height);
    if long_edge <= max_edge {
        return (width, height);
    }
    let scale = max_edge as f64 / long_edge as f64;
    (
        ((width as f64 * scale) as u32).max(1),
        ((height as f64 * scale) as u32).max(1),
    )
}

fn encode_jpeg(img: &DynamicImage, max_edge: u32, quality: u8) -> image::ImageResult<Vec<u8>> {
    let (width, height) = scaled_dimensions(img.width(), img.height(), max_edge);
    let rgb = if (width, height) == (img.width(), img.height()) {
        img.to_rgb8()
    } else {
        img.resize_exact(width, height, FilterType::Triangle).to_rgb8()
    };

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(&rgb)?;
    Ok(bytes)
}

/// `image`-crate preparer writing into a cache folder
pub struct JpegImagePreparer {
    cache_dir: PathBuf,
    max_edge: u32,
    quality: u8,
    sequence: AtomicU64,
}

impl JpegImagePreparer {
    pub fn new(cache_dir: impl Into<PathBuf>, max_edge: u32, quality: u8) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_edge,
            quality,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn next_target(&self) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.cache_dir.join(format!("compressed_{}_{}.jpg", millis, n))
    }
}

#[async_trait]
impl ImagePreparer for JpegImagePreparer {
    async fn prepare(&self, photo_ref: &str) -> Option<PreparedImage> {
        let source = resolve_path(photo_ref);
        let target = self.next_target();
        let written = target.clone();
        let (max_edge, quality) = (self.max_edge, self.quality);

        let result = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, String> {
            let img = image::open(&source).map_err(|e| e.to_string())?;
            let bytes = encode_jpeg(&img, max_edge, quality).map_err(|e| e.to_string())?;
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
            std::fs::write(&target, &bytes).map_err(|e| e.to_string())?;
            Ok(bytes)
        })
        .await;

        match result {
            Ok(Ok(bytes)) => {
                debug!(photo_ref, kb = bytes.len() / 1024, "Compressed image");
                Some(PreparedImage {
                    bytes,
                    prepared_ref: written.display().to_string(),
                })
            }
            Ok(Err(e)) => {
                debug!(photo_ref, error = %e, "Image preparation failed");
                None
            }
            Err(e) => {
                warn!(photo_ref, error = %e, "Image preparation task failed");
                None
            }
        }
    }

    async fn read_raw(&self, photo_ref: &str) -> Option<Vec<u8>> {
        tokio::fs::read(resolve_path(photo_ref)).await.ok()
    }

    async fn discard(&self, prepared_ref: &str) {
        let path = resolve_path(prepared_ref);
        // Only files this preparer wrote
        if !path.starts_with(&self.cache_dir) {
            warn!(prepared_ref, "Refusing to discard file outside the image cache");
            return;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(prepared_ref, "Discarded prepared image"),
            Err(e) => debug!(prepared_ref, error = %e, "Prepared image already gone"),
        }
    }
}
