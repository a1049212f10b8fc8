use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use tokio::fs;
use tracing::{info, warn};

/// Content-addressed ciphertext store. Keys are opaque to the server's data
/// model; the backend's durability and retry behavior are its own concern.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Coarse content-class folder for a storage key.
pub fn folder_for(content_type: &str) -> &'static str {
    let content_type = content_type.trim();
    if content_type.starts_with("image/") {
        "photos/"
    } else if content_type.starts_with("video/") {
        "videos/"
    } else {
        "documents/"
    }
}

/// Filesystem-backed blob store. Each object lives at `{root}/{key}` with the
/// content-class folder as the first path segment.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        info!("Blob storage directory: {}", root.display());
        Ok(Self { root })
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<()> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        info!("Stored blob {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let bytes = fs::read(self.object_path(key)).await?;
        Ok(bytes)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.object_path(key)).await {
            Ok(()) => {
                info!("Deleted blob {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Blob {} already gone", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
