//! Thumbnail engine for the live wallpaper app
//!
//! This crate handles:
//! - Mapping wallpaper image names to cached JPEG thumbnails
//! - Regenerating thumbnails when the source image changes
//! - Sharing one generation between concurrent requests for the same image
//! - Background warm-up of the whole image library
//! - Cache maintenance (clear, prune orphans)

pub mod config;
pub mod error;
pub mod paths;
pub mod scan;
pub mod service;
pub mod thumbnail;

pub use config::{ThumbnailConfig, ThumbnailConfigBuilder};
pub use error::ThumbnailError;
pub use service::{QueueStatus, ThumbnailService, WarmupReport};
pub use thumbnail::{JpegThumbnailer, ThumbnailGenerator};
