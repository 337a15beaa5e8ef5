pub mod media;

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::AppError;

pub use self::media::MediaKind;

/// URL prefix under which blobs are served.
pub const MEDIA_PREFIX: &str = "/media/";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidKey(key) => AppError::BadRequest(format!("Invalid media path: {}", key)),
            StorageError::Io(e) => AppError::Storage(e),
        }
    }
}

/// A relative, slash-separated blob path such as `posts/<uid>/<file>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobKey(String);

impl BlobKey {
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let valid = !raw.is_empty()
            && raw.split('/').all(|segment| {
                !segment.is_empty()
                    && segment != "."
                    && segment != ".."
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            });
        if valid {
            Ok(BlobKey(raw.to_string()))
        } else {
            Err(StorageError::InvalidKey(raw.to_string()))
        }
    }

    /// Key for a post attachment. `index` keeps files uploaded in the same
    /// millisecond apart.
    pub fn for_post_media(uid: &str, millis: i64, index: usize, file_name: &str) -> Result<Self, StorageError> {
        Self::parse(&format!(
            "posts/{}/{}-{}-{}",
            uid,
            millis,
            index,
            sanitize_file_name(file_name)
        ))
    }

    pub fn for_avatar(uid: &str, kind: MediaKind) -> Result<Self, StorageError> {
        Self::parse(&format!(
            "profile_pictures/{}/profile_{}.{}",
            uid,
            uid,
            kind.extension()
        ))
    }

    /// Recover the key from a public media URL, ignoring any query string.
    pub fn from_url(url: &str) -> Result<Self, StorageError> {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let key = path
            .strip_prefix(MEDIA_PREFIX)
            .ok_or_else(|| StorageError::InvalidKey(url.to_string()))?;
        Self::parse(key)
    }

    pub fn url(&self) -> String {
        format!("{}{}", MEDIA_PREFIX, self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce a client-supplied file name to characters that are safe in a key.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Object storage for uploaded media.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store (or overwrite) a blob.
    async fn put(&self, key: &BlobKey, data: Bytes) -> Result<(), StorageError>;

    async fn get(&self, key: &BlobKey) -> Result<Option<Bytes>, StorageError>;

    /// Remove a blob. Returns false when it did not exist.
    async fn delete(&self, key: &BlobKey) -> Result<bool, StorageError>;
}

/// Blobs as plain files below a root directory.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn open(root: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&root)?;
        tracing::info!("Media directory: {}", root.display());
        Ok(Self { root })
    }

    fn path_for(&self, key: &BlobKey) -> PathBuf {
        self.root.join(key.as_str())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &BlobKey, data: Bytes) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        tracing::debug!(key = %key, bytes = data.len(), "Stored blob");
        Ok(())
    }

    async fn get(&self, key: &BlobKey) -> Result<Option<Bytes>, StorageError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &BlobKey) -> Result<bool, StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(key = %key, "Blob already gone");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Delete every blob referenced by `urls`. URLs that do not point into the
/// store are skipped.
pub async fn delete_urls(store: &dyn BlobStore, urls: &[String]) -> Result<(), StorageError> {
    for url in urls {
        match BlobKey::from_url(url) {
            Ok(key) => {
                store.delete(&key).await?;
            }
            Err(_) => tracing::warn!(url = %url, "Skipping media outside the blob store"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_rejects_traversal_and_absolute_paths() {
        assert!(BlobKey::parse("../etc/passwd").is_err());
        assert!(BlobKey::parse("/etc/passwd").is_err());
        assert!(BlobKey::parse("posts//x.png").is_err());
        assert!(BlobKey::parse("posts/./x.png").is_err());
        assert!(BlobKey::parse("").is_err());
        assert!(BlobKey::parse("posts/u1/1-0-cat.png").is_ok());
    }

    #[test]
    fn key_roundtrips_through_url() {
        let key = BlobKey::for_post_media("u1", 1700000000000, 2, "my cat.png").unwrap();
        assert_eq!(key.as_str(), "posts/u1/1700000000000-2-my_cat.png");
        assert_eq!(key.url(), "/media/posts/u1/1700000000000-2-my_cat.png");
        assert_eq!(BlobKey::from_url(&key.url()).unwrap(), key);
    }

    #[test]
    fn from_url_ignores_cache_busting_query() {
        let key = BlobKey::from_url("/media/profile_pictures/u1/profile_u1.png?v=42").unwrap();
        assert_eq!(key.as_str(), "profile_pictures/u1/profile_u1.png");
    }

    #[test]
    fn from_url_rejects_foreign_urls() {
        assert!(BlobKey::from_url("https://cdn.example.com/a.png").is_err());
    }

    #[test]
    fn avatar_key_uses_format_extension() {
        let key = BlobKey::for_avatar("u9", MediaKind::Gif).unwrap();
        assert_eq!(key.as_str(), "profile_pictures/u9/profile_u9.gif");
    }

    #[test]
    fn sanitize_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_file_name("C:\\Users\\me\\photo (1).JPG"), "photo__1_.JPG");
        assert_eq!(sanitize_file_name("../../.hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[tokio::test]
    async fn local_store_put_get_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::open(tmp.path().join("media")).unwrap();
        let key = BlobKey::parse("posts/u1/a.png").unwrap();

        store.put(&key, Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(Bytes::from_static(b"abc")));

        assert!(store.delete(&key).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert!(!store.delete(&key).await.unwrap());
    }

    #[tokio::test]
    async fn delete_urls_skips_foreign_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::open(tmp.path().to_path_buf()).unwrap();
        let key = BlobKey::parse("posts/u1/b.gif").unwrap();
        store.put(&key, Bytes::from_static(b"GIF89a")).await.unwrap();

        let urls = vec![
            key.url(),
            "https://elsewhere.example/x.png".to_string(),
            "/media/posts/u1/missing.png".to_string(),
        ];
        delete_urls(&store, &urls).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
    }
}
