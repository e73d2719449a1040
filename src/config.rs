use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ThumbnailError;

/// Configuration for the thumbnail cache.
///
/// Every field has a default, so a config file only needs the keys it
/// wants to change. Use [`ThumbnailConfig::builder()`] when constructing
/// one in code.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThumbnailConfig {
    /// Root directory holding the original wallpaper images.
    pub images_dir: PathBuf,

    /// Root directory for generated thumbnails.
    pub cache_dir: PathBuf,

    /// Edge length of the square thumbnails, in pixels.
    pub size: u32,

    /// JPEG quality (1-100).
    pub quality: u8,

    /// Number of generation workers allowed to run at once.
    pub concurrency: usize,

    /// Log warm-up progress every N completed thumbnails.
    pub progress_interval: usize,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            images_dir: default_images_dir(),
            cache_dir: default_cache_dir(),
            size: 200,
            quality: 80,
            concurrency: 1,
            progress_interval: 10,
        }
    }
}

impl ThumbnailConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> ThumbnailConfigBuilder {
        ThumbnailConfigBuilder::default()
    }

    /// Read a JSON config file. Missing keys fall back to their defaults.
    pub fn load(path: &Path) -> Result<Self, ThumbnailError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ThumbnailError::io(path, e))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ThumbnailError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()
    }

    /// Clamp out-of-range values and reject ones that cannot work.
    pub fn validate(mut self) -> Result<Self, ThumbnailError> {
        if self.size == 0 {
            return Err(ThumbnailError::Config("size must be greater than 0".into()));
        }
        self.quality = self.quality.clamp(1, 100);
        self.concurrency = self.concurrency.max(1);
        self.progress_interval = self.progress_interval.max(1);
        Ok(self)
    }
}

/// Default image root: ~/Pictures/Wallpapers, or the home directory when
/// no picture directory is known.
fn default_images_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Wallpapers")
}

/// Default cache root.
/// - Linux: ~/.local/share/wallpaper-thumbs/thumbnails
/// - macOS: ~/Library/Application Support/wallpaper-thumbs/thumbnails
/// - Windows: %APPDATA%\wallpaper-thumbs\thumbnails
fn default_cache_dir() -> PathBuf {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    path.push("wallpaper-thumbs");
    path.push("thumbnails");
    path
}

/// Builder for [`ThumbnailConfig`].
#[derive(Default)]
pub struct ThumbnailConfigBuilder {
    config: ThumbnailConfig,
}

impl ThumbnailConfigBuilder {
    /// Set the directory containing the original images.
    pub fn with_images_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.images_dir = path.into();
        self
    }

    /// Set the directory thumbnails are written to.
    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = path.into();
        self
    }

    /// Set the thumbnail edge length in pixels.
    pub fn with_size(mut self, size: u32) -> Self {
        self.config.size = size;
        self
    }

    /// Set the JPEG quality.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.config.quality = quality;
        self
    }

    /// Set how many thumbnails may be generated at the same time.
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.config.concurrency = workers;
        self
    }

    /// Set how often warm-up progress is logged.
    pub fn with_progress_interval(mut self, every: usize) -> Self {
        self.config.progress_interval = every;
        self
    }

    /// Build the final [`ThumbnailConfig`].
    pub fn build(self) -> ThumbnailConfig {
        self.config
    }
}
