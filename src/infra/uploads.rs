//! Filesystem storage for post images served under `/media/`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use slug::slugify;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::info;
use uuid::Uuid;

use crate::application::forms::ImageUpload;
use crate::application::posts::{ImageStore, ImageStoreError};

/// Directory under the upload root that holds post images.
pub const POST_IMAGE_PREFIX: &str = "posts";
/// Width of the `posts.image` column.
pub const MAX_STORED_PATH_CHARS: usize = 255;
const MAX_EXTENSION_CHARS: usize = 10;

#[derive(Debug, Error)]
pub enum UploadStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded file is empty")]
    EmptyPayload,
}

#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub stored_path: String,
    pub checksum: String,
    pub size_bytes: u64,
}

#[derive(Debug)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Writes `data` under a dated directory and returns its path relative to the root.
    pub async fn store(
        &self,
        original_name: &str,
        data: Bytes,
    ) -> Result<StoredUpload, UploadStorageError> {
        if data.is_empty() {
            return Err(UploadStorageError::EmptyPayload);
        }

        let stored_path = build_stored_path(original_name);
        let absolute = self.resolve(&stored_path)?;

        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&absolute).await?;
        if let Err(err) = file.write_all(&data).await {
            drop(file);
            let _ = fs::remove_file(&absolute).await;
            return Err(err.into());
        }
        file.flush().await?;

        Ok(StoredUpload {
            stored_path,
            checksum: hex::encode(Sha256::digest(&data)),
            size_bytes: data.len() as u64,
        })
    }

    pub async fn read(&self, stored_path: &str) -> Result<Bytes, UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    pub async fn remove(&self, stored_path: &str) -> Result<(), UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        fs::remove_file(absolute).await?;
        Ok(())
    }

    fn resolve(&self, stored_path: &str) -> Result<PathBuf, UploadStorageError> {
        let relative = Path::new(stored_path);
        if stored_path.is_empty()
            || relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(UploadStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ImageStore for UploadStorage {
    async fn save_image(&self, upload: &ImageUpload) -> Result<String, ImageStoreError> {
        let stored = self
            .store(&upload.filename, upload.bytes.clone())
            .await
            .map_err(|err| ImageStoreError::new(err.to_string()))?;

        info!(
            target = "blogroll::uploads",
            path = %stored.stored_path,
            size_bytes = stored.size_bytes,
            checksum = %stored.checksum,
            "post image stored"
        );
        Ok(stored.stored_path)
    }

    async fn discard_image(&self, stored_path: &str) -> Result<(), ImageStoreError> {
        self.remove(stored_path)
            .await
            .map_err(|err| ImageStoreError::new(err.to_string()))?;
        info!(
            target = "blogroll::uploads",
            path = %stored_path,
            "post image discarded"
        );
        Ok(())
    }
}

fn build_stored_path(original_name: &str) -> String {
    let (year, month, day) = time::OffsetDateTime::now_utc().to_calendar_date();
    let identifier = Uuid::new_v4().simple();
    let prefix = format!(
        "{POST_IMAGE_PREFIX}/{year}/{:02}/{day:02}/{identifier}-",
        month as u8
    );
    let filename = sanitize_filename(
        original_name,
        MAX_STORED_PATH_CHARS.saturating_sub(prefix.len()),
    );
    format!("{prefix}{filename}")
}

/// Slugified file name of at most `max_chars` ASCII characters.
fn sanitize_filename(original: &str, max_chars: usize) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("image");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "image".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| {
            !value.is_empty()
                && value.len() <= MAX_EXTENSION_CHARS
                && value.chars().all(|c| c.is_ascii_alphanumeric())
        });

    let suffix = extension.map(|ext| format!(".{ext}")).unwrap_or_default();
    base.truncate(max_chars.saturating_sub(suffix.len()).max(1));
    let base = base.trim_end_matches('-');
    let base = if base.is_empty() { "image" } else { base };
    format!("{base}{suffix}")
}
