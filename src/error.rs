use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced by the thumbnail cache.
///
/// Underlying I/O and image errors are held behind an `Arc` so a single
/// failed generation can be handed to every caller waiting on it.
#[derive(Error, Debug, Clone)]
pub enum ThumbnailError {
    #[error("Invalid image name: {0:?}")]
    InvalidName(String),

    #[error("Source image not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Could not create directory {}: {source}", path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("Image processing failed for {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: Arc<image::ImageError>,
    },

    #[error("JPEG encoding failed for {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: Arc<jpeg_encoder::EncodingError>,
    },

    #[error("Thumbnail worker stopped before finishing the request")]
    WorkerGone,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ThumbnailError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ThumbnailError::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn dir(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ThumbnailError::DirectoryCreation {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn encode(path: impl Into<PathBuf>, source: jpeg_encoder::EncodingError) -> Self {
        ThumbnailError::Encode {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Map an image error, folding "file not found" into `SourceNotFound`.
    pub(crate) fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        let path = path.into();
        match source {
            image::ImageError::IoError(err) if err.kind() == io::ErrorKind::NotFound => {
                ThumbnailError::SourceNotFound(path)
            }
            other => ThumbnailError::Image {
                path,
                source: Arc::new(other),
            },
        }
    }

    /// True when the failure means the source image does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ThumbnailError::SourceNotFound(_))
    }
}
