//! Name canonicalisation, source/cache path mapping and freshness checks
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use crate::error::ThumbnailError;

/// Thumbnails are always stored as JPEG, whatever the source format.
pub const THUMBNAIL_EXTENSION: &str = "jpg";

/// Turn a caller-supplied image name into a clean relative path.
///
/// `.` segments are dropped and `..` segments pop the previous one. A name
/// that climbs above the root, carries a drive prefix, or ends up empty is
/// rejected. Leading separators are ignored, so `/foo/a.png` and `foo/a.png`
/// name the same image.
pub fn normalize_name(name: &str) -> Result<PathBuf, ThumbnailError> {
    let invalid = || ThumbnailError::InvalidName(name.to_string());
    let unified = name.replace('\\', "/");

    let mut clean = PathBuf::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    return Err(invalid());
                }
            }
            Component::Prefix(_) => return Err(invalid()),
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(invalid());
    }
    Ok(clean)
}

/// Where the original image for `relative` lives.
pub fn source_path(images_root: &Path, relative: &Path) -> PathBuf {
    images_root.join(relative)
}

/// Where the thumbnail for `relative` lives: same subdirectories, same base
/// name, `.jpg` extension.
pub fn thumbnail_path(cache_root: &Path, relative: &Path) -> PathBuf {
    cache_root.join(relative).with_extension(THUMBNAIL_EXTENSION)
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

/// A cached thumbnail is fresh when it is not older than its source.
/// Any stat failure counts as stale.
pub async fn is_fresh(source: &Path, thumbnail: &Path) -> bool {
    match (modified(thumbnail).await, modified(source).await) {
        (Some(thumb), Some(src)) => thumb >= src,
        _ => false,
    }
}
