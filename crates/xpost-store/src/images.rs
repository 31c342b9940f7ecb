use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use xpost_core::{SavedImage, ValidationError};

use crate::error::Result;

/// Extensions accepted as post attachments (lower-case, without the dot).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Lower-cased extension of `filename`, if any.
fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_supported_image(filename: &str) -> bool {
    extension_of(filename).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Local directory where attachments wait until their post is published.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    max_bytes: u64,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Reject an attachment by name and declared size before downloading it.
    pub fn check(&self, filename: &str, size: u64) -> std::result::Result<(), ValidationError> {
        if !is_supported_image(filename) {
            return Err(ValidationError::UnsupportedFileType {
                filename: filename.to_string(),
            });
        }
        if size > self.max_bytes {
            return Err(ValidationError::FileTooLarge {
                filename: filename.to_string(),
                size,
                max: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Write `bytes` under a fresh unique name that keeps the original extension.
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<SavedImage> {
        let size = bytes.len() as u64;
        self.check(original_name, size)?;
        self.ensure_dir().await?;

        let ext = extension_of(original_name).unwrap_or_default();
        let path = self.dir.join(format!("{}.{ext}", Uuid::new_v4()));
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), original_name, size, "image saved");

        Ok(SavedImage {
            file_path: path.to_string_lossy().into_owned(),
            original_filename: original_name.to_string(),
            file_size: size,
        })
    }
}

/// Best-effort removal of local attachment files. Returns how many were deleted.
///
/// Already-missing files are ignored; other errors are logged and skipped.
pub async fn cleanup_images(paths: &[String]) -> usize {
    let mut removed = 0;
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path, "image already gone");
            }
            Err(e) => warn!(path, error = %e, "failed to delete image"),
        }
    }
    if removed > 0 {
        info!(removed, "cleaned up local images");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(is_supported_image("cat.PNG"));
        assert!(is_supported_image("a.b.jpeg"));
        assert!(is_supported_image("x.webp"));
        assert!(!is_supported_image("notes.txt"));
        assert!(!is_supported_image("noext"));
    }

    #[test]
    fn check_enforces_size_limit() {
        let store = ImageStore::new("/unused", 100);
        assert!(store.check("ok.png", 100).is_ok());
        assert_eq!(
            store.check("big.png", 101),
            Err(ValidationError::FileTooLarge {
                filename: "big.png".into(),
                size: 101,
                max: 100
            })
        );
        assert!(matches!(
            store.check("doc.pdf", 1),
            Err(ValidationError::UnsupportedFileType { .. })
        ));
    }

    #[tokio::test]
    async fn save_writes_unique_files_with_original_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("images"), 1024);

        let a = store.save("photo.JPG", b"aaa").await.unwrap();
        let b = store.save("photo.JPG", b"bbbb").await.unwrap();

        assert_ne!(a.file_path, b.file_path);
        assert!(a.file_path.ends_with(".jpg"));
        assert_eq!(a.original_filename, "photo.JPG");
        assert_eq!(b.file_size, 4);
        assert_eq!(std::fs::read(&a.file_path).unwrap(), b"aaa");
    }

    #[tokio::test]
    async fn save_rejects_invalid_input_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), 2);
        let err = store.save("x.png", b"too big").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::FileTooLarge { .. })
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn cleanup_ignores_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.png");
        std::fs::write(&present, b"x").unwrap();
        let paths = vec![
            present.to_string_lossy().into_owned(),
            dir.path().join("gone.png").to_string_lossy().into_owned(),
        ];
        assert_eq!(cleanup_images(&paths).await, 1);
        assert!(!present.exists());
        assert_eq!(cleanup_images(&paths).await, 0);
    }
}
