use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use super::{BlobStore, BlobStoreError};

/// Filesystem blob store for development and testing.
pub struct LocalBlobStore {
    base_path: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    /// `base_url` prefixes every returned URL. When absent, a `file://` URL of
    /// the (absolute) base path is used.
    pub fn new<P: AsRef<Path>>(
        base_path: P,
        base_url: Option<&str>,
    ) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;

        let base_url = match base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let absolute = base_path.canonicalize()?;
                format!("file://{}", absolute.display())
            }
        };

        Ok(Self {
            base_path,
            base_url,
        })
    }

    fn object_path(&self, object_name: &str) -> Result<PathBuf, BlobStoreError> {
        if object_name.is_empty()
            || object_name == "."
            || object_name == ".."
            || object_name.contains('/')
            || object_name.contains('\\')
        {
            return Err(BlobStoreError::InvalidName(object_name.to_string()));
        }
        Ok(self.base_path.join(object_name))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, object_name: &str, data: Bytes) -> Result<String, BlobStoreError> {
        let path = self.object_path(object_name)?;
        tokio::fs::write(&path, &data).await?;
        Ok(format!("{}/{}", self.base_url, object_name))
    }

    async fn get(&self, object_name: &str) -> Result<Bytes, BlobStoreError> {
        let path = self.object_path(object_name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobStoreError::NotFound(object_name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
