//! Image attachments on `/post`: validation, download, and local storage.

use serenity::model::channel::Attachment;
use tracing::{debug, warn};

use xpost_core::{SavedImage, ValidationError};
use xpost_store::{cleanup_images, ImageStore};

use crate::error::DiscordError;

/// Reject the whole set, given as `(filename, size)` pairs, before
/// downloading anything.
pub fn check_attachments<S: AsRef<str>>(
    images: &ImageStore,
    files: &[(S, u64)],
    max: usize,
) -> Result<(), ValidationError> {
    if files.len() > max {
        return Err(ValidationError::TooManyAttachments {
            count: files.len(),
            max,
        });
    }
    for (name, size) in files {
        images.check(name.as_ref(), *size)?;
    }
    Ok(())
}

pub fn describe(attachments: &[&Attachment]) -> Vec<(String, u64)> {
    attachments
        .iter()
        .map(|a| (a.filename.clone(), u64::from(a.size)))
        .collect()
}

/// Download and save every attachment. On any failure the files already
/// written are removed and the error is returned.
pub async fn save_attachments(
    images: &ImageStore,
    attachments: &[&Attachment],
) -> Result<Vec<SavedImage>, DiscordError> {
    let mut saved: Vec<SavedImage> = Vec::with_capacity(attachments.len());
    for att in attachments {
        match save_one(images, att).await {
            Ok(img) => saved.push(img),
            Err(e) => {
                warn!(filename = %att.filename, error = %e, "attachment rejected");
                let paths: Vec<String> = saved.into_iter().map(|s| s.file_path).collect();
                cleanup_images(&paths).await;
                return Err(e);
            }
        }
    }
    Ok(saved)
}

async fn save_one(images: &ImageStore, att: &Attachment) -> Result<SavedImage, DiscordError> {
    let bytes = download_bytes(&att.url).await?;
    debug!(filename = %att.filename, size = bytes.len(), "attachment downloaded");
    Ok(images.save(&att.filename, &bytes).await?)
}

async fn download_bytes(url: &str) -> Result<Vec<u8>, reqwest::Error> {
    let resp = reqwest::get(url).await?.error_for_status()?;
    resp.bytes().await.map(|b| b.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_before_download() {
        let images = ImageStore::new("/unused", 1000);
        assert!(check_attachments(&images, &[("a.png", 10), ("b.webp", 1000)], 4).is_ok());
        assert!(matches!(
            check_attachments(&images, &[("a.png", 10), ("b.txt", 10)], 4),
            Err(ValidationError::UnsupportedFileType { .. })
        ));
        assert!(matches!(
            check_attachments(&images, &[("a.png", 1001)], 4),
            Err(ValidationError::FileTooLarge { .. })
        ));
        let five = [("1.png", 1); 5];
        assert_eq!(
            check_attachments(&images, &five, 4),
            Err(ValidationError::TooManyAttachments { count: 5, max: 4 })
        );
    }
}
