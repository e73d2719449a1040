//! Discovery of wallpaper images under the image root
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Image formats the thumbnailer can decode
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff",
];

/// True if the path has one of the supported image extensions
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Walk `root` recursively and return the relative names of every image,
/// using `/` as separator, sorted.
///
/// Unreadable entries are skipped; a missing root yields an empty list.
pub fn scan_images(root: &Path) -> Vec<String> {
    debug!(root = %root.display(), "Scanning image directory");

    let mut names = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%err, "Skipping unreadable entry");
                continue;
            }
        };

        // Only process files (not directories)
        if !entry.file_type().is_file() || !is_supported_image(entry.path()) {
            continue;
        }

        if let Ok(relative) = entry.path().strip_prefix(root) {
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            names.push(name);
        }
    }

    names.sort();
    debug!(count = names.len(), "Image scan complete");
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_extension_filter() {
        assert!(is_supported_image(Path::new("a/b/Sunset.JPG")));
        assert!(is_supported_image(Path::new("x.webp")));
        assert!(!is_supported_image(Path::new("notes.txt")));
        assert!(!is_supported_image(Path::new("README")));
    }

    #[test]
    fn test_scan_finds_nested_images() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nature/lakes")).unwrap();
        fs::write(dir.path().join("city.png"), b"x").unwrap();
        fs::write(dir.path().join("nature/lakes/blue.jpg"), b"x").unwrap();
        fs::write(dir.path().join("nature/readme.txt"), b"x").unwrap();

        let names = scan_images(dir.path());
        assert_eq!(names, vec!["city.png", "nature/lakes/blue.jpg"]);
    }

    #[test]
    fn test_scan_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_images(&dir.path().join("nope")).is_empty());
    }
}
