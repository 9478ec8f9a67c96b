//! Media storage for report photos, profile pictures and short videos.
//!
//! Handlers only see the [`MediaStore`] trait; the server wires in
//! [`LocalMediaStore`], which writes under a directory that the router
//! serves at `/media`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::StoredMedia;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    fn folder(self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Video => "videos",
        }
    }

    /// Whether an uploaded part looks like this kind of media.
    pub fn accepts(self, content_type: Option<&str>, file_name: &str) -> bool {
        let prefix = match self {
            MediaKind::Image => "image/",
            MediaKind::Video => "video/",
        };
        if let Some(content_type) = content_type {
            if content_type.starts_with(prefix) {
                return true;
            }
        }

        let allowed: &[&str] = match self {
            MediaKind::Image => &["jpg", "jpeg", "png", "gif", "webp", "heic"],
            MediaKind::Video => &["mp4", "mov", "webm", "mkv", "3gp"],
        };
        extension(file_name).is_some_and(|ext| allowed.contains(&ext.as_str()))
    }
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, kind: MediaKind, file_name: &str, bytes: Vec<u8>) -> Result<StoredMedia>;

    async fn destroy(&self, kind: MediaKind, public_id: &str) -> Result<()>;
}

/// Stores files on local disk as `<root>/<images|videos>/<uuid>.<ext>`.
pub struct LocalMediaStore {
    root: PathBuf,
    public_base: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, kind: MediaKind, public_id: &str) -> Result<PathBuf> {
        let file = public_id
            .strip_prefix(kind.folder())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|file| {
                !file.is_empty()
                    && file
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
                    && !file.contains("..")
            })
            .ok_or_else(|| ApiError::validation("Invalid media id"))?;

        Ok(self.root.join(kind.folder()).join(file))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn upload(&self, kind: MediaKind, file_name: &str, bytes: Vec<u8>) -> Result<StoredMedia> {
        let name = match extension(file_name) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        let public_id = format!("{}/{}", kind.folder(), name);
        let path = self.root.join(kind.folder()).join(&name);

        let write = async {
            tokio::fs::create_dir_all(self.root.join(kind.folder())).await?;
            tokio::fs::write(&path, &bytes).await?;
            Ok::<(), std::io::Error>(())
        };
        write.await.map_err(|e| {
            warn!(error = %e, path = %path.display(), "media upload failed");
            ApiError::upstream("Media couldn't be uploaded")
        })?;

        debug!(public_id, size = bytes.len(), "stored media");
        Ok(StoredMedia {
            url: format!("{}/media/{}", self.public_base, public_id),
            public_id,
        })
    }

    async fn destroy(&self, kind: MediaKind, public_id: &str) -> Result<()> {
        let path = self.resolve(kind, public_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(public_id, "media already gone");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, public_id, "media delete failed");
                Err(ApiError::upstream("Media couldn't be deleted"))
            }
        }
    }
}

fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn content_type_or_extension_decides_kind() {
        assert!(MediaKind::Image.accepts(Some("image/png"), "blob"));
        assert!(MediaKind::Image.accepts(None, "pothole.JPG"));
        assert!(!MediaKind::Image.accepts(Some("text/plain"), "notes.txt"));
        assert!(MediaKind::Video.accepts(Some("application/octet-stream"), "clip.mp4"));
        assert!(!MediaKind::Video.accepts(Some("image/png"), "still.png"));
    }

    #[tokio::test]
    async fn upload_then_destroy() {
        let temp_dir = std::env::temp_dir().join(format!("civic_media_{}", Uuid::new_v4()));
        let store = LocalMediaStore::new(&temp_dir, "http://localhost:11111/");

        let media = store
            .upload(MediaKind::Image, "pothole.jpg", b"jpeg bytes".to_vec())
            .await
            .expect("upload");
        assert!(media.public_id.starts_with("images/"));
        assert!(media.public_id.ends_with(".jpg"));
        assert_eq!(media.url, format!("http://localhost:11111/media/{}", media.public_id));

        let path = temp_dir.join(&media.public_id);
        assert_eq!(fs::read(&path).unwrap(), b"jpeg bytes");

        store.destroy(MediaKind::Image, &media.public_id).await.unwrap();
        assert!(!path.exists());
        // Second delete is a no-op.
        store.destroy(MediaKind::Image, &media.public_id).await.unwrap();

        let _ = fs::remove_dir_all(temp_dir);
    }

    #[tokio::test]
    async fn destroy_rejects_paths_outside_the_store() {
        let store = LocalMediaStore::new(std::env::temp_dir().join("civic_media_unused"), "http://x");
        for bad in ["images/../secret", "videos/a.mp4", "images/", "/etc/passwd"] {
            let err = store.destroy(MediaKind::Image, bad).await.unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)), "{bad}");
        }
    }
}
