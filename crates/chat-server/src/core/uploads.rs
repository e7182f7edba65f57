//! Upload storage
//!
//! Avatars and shared files are plain files under the public directories,
//! served back by the static routes. Every check runs before the first byte
//! is written.

use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::config::ChatServerConfig;
use crate::core::error::{Result, StoreError, ValidationError};

pub const AVATAR_ROUTE: &str = "/avatars";
pub const UPLOAD_ROUTE: &str = "/uploads";

pub fn avatar_url(file_name: &str) -> String {
    format!("{AVATAR_ROUTE}/{file_name}")
}

pub fn upload_url(file_name: &str) -> String {
    format!("{UPLOAD_ROUTE}/{file_name}")
}

/// Avatar storage name, derived only from the identity so re-uploads overwrite.
pub fn avatar_file_name(identity: &str) -> String {
    format!("{identity}.jpg")
}

/// Lower-cased media type without parameters (`text/plain; charset=utf-8` -> `text/plain`).
fn essence(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

/// Extension of the client-supplied name, if it is safe to reuse.
fn preserved_extension(original_name: &str) -> Option<String> {
    let ext = Path::new(original_name).extension()?.to_str()?;
    (!ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| ext.to_ascii_lowercase())
}

pub struct UploadStore {
    avatar_dir: PathBuf,
    upload_dir: PathBuf,
    max_avatar_bytes: usize,
    max_file_bytes: usize,
    allowed_file_types: Vec<String>,
}

impl UploadStore {
    pub fn new(config: &ChatServerConfig) -> Self {
        Self {
            avatar_dir: config.avatar_dir.clone(),
            upload_dir: config.upload_dir.clone(),
            max_avatar_bytes: config.max_avatar_bytes,
            max_file_bytes: config.max_file_bytes,
            allowed_file_types: config.allowed_file_types.iter().map(|t| essence(t)).collect(),
        }
    }

    pub fn max_avatar_bytes(&self) -> usize {
        self.max_avatar_bytes
    }

    pub fn max_file_bytes(&self) -> usize {
        self.max_file_bytes
    }

    pub fn check_avatar_type(&self, mime: Option<&str>) -> std::result::Result<(), ValidationError> {
        let mime = mime.map(essence).unwrap_or_default();
        if mime.starts_with("image/") {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedMediaType(mime))
        }
    }

    pub fn check_file_type(&self, mime: Option<&str>) -> std::result::Result<(), ValidationError> {
        let mime = mime.map(essence).unwrap_or_default();
        if self.allowed_file_types.iter().any(|t| *t == mime) {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedMediaType(mime))
        }
    }

    /// Store an avatar for `identity`, replacing any previous one. Returns the file name.
    pub async fn store_avatar(&self, identity: &str, data: &[u8], mime: Option<&str>) -> Result<String> {
        self.check_avatar_type(mime)?;
        check_size(data.len(), self.max_avatar_bytes)?;

        let file_name = avatar_file_name(identity);
        if file_name.contains(['/', '\\']) || file_name.starts_with('.') {
            return Err(ValidationError::Malformed("unusable avatar name".into()).into());
        }

        write_atomic(&self.avatar_dir, &file_name, data).await?;
        info!("[Uploads] Stored avatar {} ({} bytes)", file_name, data.len());
        Ok(file_name)
    }

    /// Store a shared file under a fresh collision-resistant name. Returns that name.
    pub async fn store_file(&self, original_name: &str, data: &[u8], mime: Option<&str>) -> Result<String> {
        self.check_file_type(mime)?;
        check_size(data.len(), self.max_file_bytes)?;

        let id = Uuid::new_v4();
        let file_name = match preserved_extension(original_name) {
            Some(ext) => format!("{id}.{ext}"),
            None => id.to_string(),
        };

        write_atomic(&self.upload_dir, &file_name, data).await?;
        info!(
            "[Uploads] Stored file {} as {} ({} bytes)",
            original_name,
            file_name,
            data.len()
        );
        Ok(file_name)
    }

    /// Best-effort removal of a stored file that never made it into history.
    pub async fn discard_file(&self, file_name: &str) {
        if let Err(e) = tokio::fs::remove_file(self.upload_dir.join(file_name)).await {
            warn!("[Uploads] Could not remove {}: {}", file_name, e);
        }
    }
}

pub fn check_size(size: usize, max: usize) -> std::result::Result<(), ValidationError> {
    if size > max {
        Err(ValidationError::TooLarge { size, max })
    } else {
        Ok(())
    }
}

async fn write_atomic(dir: &Path, file_name: &str, data: &[u8]) -> std::result::Result<(), StoreError> {
    let path = dir.join(file_name);
    let temp_path = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    tokio::fs::write(&temp_path, data).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> UploadStore {
        let config = ChatServerConfig::with_base_dir(dir.path());
        config.ensure_dirs().await.unwrap();
        UploadStore::new(&config)
    }

    #[test]
    fn test_preserved_extension() {
        assert_eq!(preserved_extension("report.PDF").as_deref(), Some("pdf"));
        assert_eq!(preserved_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(preserved_extension("noext"), None);
        assert_eq!(preserved_extension("weird.ex/t"), None);
    }

    #[tokio::test]
    async fn test_avatar_overwrites_by_identity() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let first = store.store_avatar("alice", b"one", Some("image/png")).await.unwrap();
        let second = store.store_avatar("alice", b"two", Some("image/jpeg")).await.unwrap();
        assert_eq!(first, "alice.jpg");
        assert_eq!(first, second);

        let on_disk = std::fs::read(dir.path().join("public/avatars/alice.jpg")).unwrap();
        assert_eq!(on_disk, b"two");
    }

    #[tokio::test]
    async fn test_avatar_rejects_non_images_and_oversize() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        assert!(matches!(
            store.store_avatar("alice", b"x", Some("text/plain")).await,
            Err(Error::Validation(ValidationError::UnsupportedMediaType(_)))
        ));

        let big = vec![0u8; store.max_avatar_bytes() + 1];
        assert!(matches!(
            store.store_avatar("alice", &big, Some("image/png")).await,
            Err(Error::Validation(ValidationError::TooLarge { .. }))
        ));
        assert!(!dir.path().join("public/avatars/alice.jpg").exists());
    }

    #[tokio::test]
    async fn test_file_names_are_unique_and_keep_extension() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let a = store.store_file("notes.txt", b"a", Some("text/plain; charset=utf-8")).await.unwrap();
        let b = store.store_file("notes.txt", b"b", Some("text/plain")).await.unwrap();
        assert_ne!(a, b);
        assert!(a.ends_with(".txt"));
        assert!(dir.path().join("public/uploads").join(&a).exists());
    }

    #[tokio::test]
    async fn test_discard_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let name = store.store_file("a.txt", b"a", Some("text/plain")).await.unwrap();
        store.discard_file(&name).await;
        assert!(!dir.path().join("public/uploads").join(&name).exists());
    }

    #[tokio::test]
    async fn test_file_type_allow_list() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        assert!(store.check_file_type(Some("application/pdf")).is_ok());
        assert!(store.check_file_type(Some("application/x-msdownload")).is_err());
        assert!(store.check_file_type(None).is_err());
    }
}
