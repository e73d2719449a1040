use image::imageops::FilterType;
use jpeg_encoder::{ColorType, Encoder};
use std::ffi::OsStr;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::ThumbnailConfig;
use crate::error::ThumbnailError;

/// Suffix of thumbnails still being written
pub const PARTIAL_SUFFIX: &str = "part";

/// Produces one thumbnail file from one source image.
///
/// Called from the blocking thread pool, so implementations are free to do
/// synchronous CPU and disk work. The target's parent directory already
/// exists when this is called.
pub trait ThumbnailGenerator: Send + Sync + 'static {
    fn generate(&self, source: &Path, target: &Path) -> Result<(), ThumbnailError>;
}

/// Default generator: square "cover" crop encoded as progressive JPEG.
#[derive(Debug, Clone, Copy)]
pub struct JpegThumbnailer {
    size: u16,
    quality: u8,
}

impl JpegThumbnailer {
    pub fn new(size: u32, quality: u8) -> Self {
        Self {
            size: size.clamp(1, u16::MAX as u32) as u16,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn from_config(config: &ThumbnailConfig) -> Self {
        Self::new(config.size, config.quality)
    }
}

impl ThumbnailGenerator for JpegThumbnailer {
    fn generate(&self, source: &Path, target: &Path) -> Result<(), ThumbnailError> {
        let img = image::open(source).map_err(|e| ThumbnailError::image(source, e))?;

        // Crop to fill, centered, so every thumbnail has the same dimensions
        let size = u32::from(self.size);
        let thumbnail = img
            .resize_to_fill(size, size, FilterType::Lanczos3)
            .to_rgb8();

        // Write to a uniquely named sibling and rename, so a half-written
        // file is never picked up as a fresh cache entry and two jobs
        // sharing a target never write the same file. Dropped on failure.
        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        let prefix = format!(
            ".{}.",
            target.file_name().unwrap_or(OsStr::new("thumb")).to_string_lossy()
        );
        let mut partial = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&format!(".{}", PARTIAL_SUFFIX))
            .tempfile_in(parent)
            .map_err(|e| ThumbnailError::io(parent, e))?;
        let partial_path = partial.path().to_path_buf();

        {
            let mut writer = BufWriter::new(partial.as_file_mut());
            let mut encoder = Encoder::new(&mut writer, self.quality);
            encoder.set_progressive(true);
            encoder
                .encode(
                    thumbnail.as_raw(),
                    thumbnail.width() as u16,
                    thumbnail.height() as u16,
                    ColorType::Rgb,
                )
                .map_err(|e| ThumbnailError::encode(target, e))?;
            writer
                .flush()
                .map_err(|e| ThumbnailError::io(&partial_path, e))?;
        }

        partial
            .persist(target)
            .map_err(|e| ThumbnailError::io(target, e.error))?;
        Ok(())
    }
}

/// True for a thumbnail that was never finished, e.g. after a crash.
pub fn is_partial(path: &Path) -> bool {
    path.extension() == Some(OsStr::new(PARTIAL_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs;

    fn leftovers(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| is_partial(&e.as_ref().unwrap().path()))
            .count()
    }

    #[test]
    fn test_cover_crop_is_square() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("wide.png");
        let target = dir.path().join("wide.jpg");
        RgbImage::from_pixel(400, 100, Rgb([200, 30, 30])).save(&source).unwrap();

        JpegThumbnailer::new(64, 80).generate(&source, &target).unwrap();

        let thumb = image::open(&target).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (64, 64));
        assert_eq!(leftovers(dir.path()), 0);
    }

    #[test]
    fn test_output_is_progressive_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.png");
        let target = dir.path().join("a.jpg");
        RgbImage::from_fn(300, 200, |x, y| Rgb([x as u8, y as u8, 90]))
            .save(&source)
            .unwrap();

        JpegThumbnailer::new(200, 80).generate(&source, &target).unwrap();

        let bytes = fs::read(&target).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        // SOF2 marks a progressive DCT frame
        assert!(bytes.windows(2).any(|w| w == [0xFF, 0xC2]));
    }

    #[test]
    fn test_jobs_sharing_a_target_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("pic.png");
        let bmp = dir.path().join("pic.bmp");
        let target = dir.path().join("pic.jpg");
        RgbImage::from_pixel(120, 80, Rgb([10, 200, 10])).save(&png).unwrap();
        RgbImage::from_pixel(120, 80, Rgb([10, 10, 200])).save(&bmp).unwrap();

        let thumbnailer = JpegThumbnailer::new(64, 80);
        for _ in 0..10 {
            std::thread::scope(|scope| {
                let a = scope.spawn(|| thumbnailer.generate(&png, &target));
                let b = scope.spawn(|| thumbnailer.generate(&bmp, &target));
                assert!(a.join().unwrap().is_ok());
                assert!(b.join().unwrap().is_ok());
            });
        }
        assert!(target.exists());
        assert_eq!(leftovers(dir.path()), 0);
    }

    #[test]
    fn test_corrupt_source_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.png");
        let target = dir.path().join("broken.jpg");
        fs::write(&source, b"definitely not a png").unwrap();

        let result = JpegThumbnailer::new(64, 80).generate(&source, &target);
        assert!(matches!(result, Err(ThumbnailError::Image { .. })));
        assert!(!target.exists());
        assert_eq!(leftovers(dir.path()), 0);
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let result = JpegThumbnailer::new(64, 80)
            .generate(&dir.path().join("gone.png"), &dir.path().join("gone.jpg"));
        assert!(result.unwrap_err().is_not_found());
    }
}
