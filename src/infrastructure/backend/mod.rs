//! Backend adapter (spec §4.2, component C2): a uniform read/write/list
//! surface over a registered storage mount, local disk or S3-compatible
//! object storage, built on [`object_store`] the same way the
//! [`crate::timestore`] partition writer and the filestore mutation layer
//! both need it.

use crate::config::StorageConfig;
use crate::error::{CoreError, CoreResult};
use bytes::Bytes;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{aws::AmazonS3Builder, ObjectStore};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// One registered storage endpoint (spec glossary: `BackendMount`).
#[derive(Clone)]
pub struct Backend {
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
}

/// Stat result for a single object.
#[derive(Debug, Clone)]
pub struct ObjectStat {
    pub size: u64,
    pub checksum: String,
}

/// One entry returned by [`Backend::list`].
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub path: String,
    pub size: u64,
}

impl Backend {
    /// Build a backend from a process-wide storage config (used for the
    /// default mount; additional mounts are built the same way from their
    /// persisted `backend_mounts` row).
    pub fn from_config(config: &StorageConfig) -> CoreResult<Self> {
        match config {
            StorageConfig::Local { root } => Self::local(root),
            StorageConfig::S3 {
                bucket,
                endpoint,
                region,
                access_key_id,
                secret_access_key,
                force_path_style,
            } => Self::s3(bucket, endpoint.as_deref(), region.as_deref(), access_key_id.as_deref(), secret_access_key.as_deref(), *force_path_style),
        }
    }

    pub fn local(root: &str) -> CoreResult<Self> {
        std::fs::create_dir_all(root)?;
        let store = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| CoreError::BackendUnavailable(format!("local root {root}: {e}")))?;
        Ok(Self { store: Arc::new(store), prefix: None })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn s3(
        bucket: &str,
        endpoint: Option<&str>,
        region: Option<&str>,
        access_key_id: Option<&str>,
        secret_access_key: Option<&str>,
        force_path_style: bool,
    ) -> CoreResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_virtual_hosted_style_request(!force_path_style);
        if let Some(endpoint) = endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        if let Some(key) = access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        let store = builder
            .build()
            .map_err(|e| CoreError::BackendUnavailable(format!("s3 bucket {bucket}: {e}")))?;
        Ok(Self { store: Arc::new(store), prefix: None })
    }

    fn object_path(&self, relative: &str) -> ObjectPath {
        match &self.prefix {
            Some(prefix) => ObjectPath::from(format!("{prefix}/{relative}")),
            None => ObjectPath::from(relative),
        }
    }

    pub async fn stat(&self, path: &str) -> CoreResult<ObjectStat> {
        let meta = self.store.head(&self.object_path(path)).await?;
        let bytes = self.store.get(&self.object_path(path)).await?.bytes().await?;
        Ok(ObjectStat { size: meta.size as u64, checksum: checksum_of(&bytes) })
    }

    pub async fn read(&self, path: &str) -> CoreResult<Bytes> {
        Ok(self.store.get(&self.object_path(path)).await?.bytes().await?)
    }

    /// Write `bytes` at `path`, returning its size and `sha256:hex` content
    /// checksum (spec §3's node `checksum` field).
    pub async fn write(&self, path: &str, bytes: Bytes) -> CoreResult<ObjectStat> {
        let checksum = checksum_of(&bytes);
        let size = bytes.len() as u64;
        self.store.put(&self.object_path(path), bytes.into()).await?;
        Ok(ObjectStat { size, checksum })
    }

    pub async fn delete(&self, path: &str) -> CoreResult<()> {
        self.store.delete(&self.object_path(path)).await?;
        Ok(())
    }

    pub async fn r#move(&self, from: &str, to: &str) -> CoreResult<()> {
        self.store.rename(&self.object_path(from), &self.object_path(to)).await?;
        Ok(())
    }

    pub async fn copy(&self, from: &str, to: &str) -> CoreResult<()> {
        self.store.copy(&self.object_path(from), &self.object_path(to)).await?;
        Ok(())
    }

    pub async fn list(&self, prefix: &str) -> CoreResult<Vec<ListEntry>> {
        use futures::StreamExt;
        let prefix_path = self.object_path(prefix);
        let mut stream = self.store.list(Some(&prefix_path));
        let mut entries = Vec::new();
        while let Some(meta) = stream.next().await {
            let meta = meta?;
            entries.push(ListEntry { path: meta.location.to_string(), size: meta.size as u64 });
        }
        Ok(entries)
    }

    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix;
        self
    }
}

/// Lazily builds and caches a [`Backend`] per registered `backend_mounts`
/// row (spec glossary: every mount is a driver + root/bucket + optional
/// prefix). S3 credentials are process-wide (spec §6 `S3_ACCESS_KEY_ID` /
/// `S3_SECRET_ACCESS_KEY`); everything else is per-mount.
pub struct BackendRegistry {
    config: StorageConfig,
    cache: parking_lot::Mutex<std::collections::HashMap<i64, Backend>>,
}

impl BackendRegistry {
    pub fn new(config: StorageConfig) -> Self {
        Self { config, cache: parking_lot::Mutex::new(std::collections::HashMap::new()) }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn resolve(
        &self,
        mount_id: i64,
        driver: &str,
        root_or_bucket: &str,
        prefix: Option<&str>,
        endpoint: Option<&str>,
        region: Option<&str>,
        force_path_style: bool,
    ) -> CoreResult<Backend> {
        if let Some(existing) = self.cache.lock().get(&mount_id) {
            return Ok(existing.clone());
        }
        let backend = match driver {
            "s3" => {
                let (access_key_id, secret_access_key) = match &self.config {
                    StorageConfig::S3 { access_key_id, secret_access_key, .. } => {
                        (access_key_id.as_deref(), secret_access_key.as_deref())
                    }
                    StorageConfig::Local { .. } => (None, None),
                };
                Backend::s3(root_or_bucket, endpoint, region, access_key_id, secret_access_key, force_path_style)?
            }
            _ => Backend::local(root_or_bucket)?,
        }
        .with_prefix(prefix.map(str::to_string));
        self.cache.lock().insert(mount_id, backend.clone());
        Ok(backend)
    }
}

fn checksum_of(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("sha256:{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_roundtrip_computes_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Backend::local(dir.path().to_str().unwrap()).unwrap();
        let stat = backend.write("a/b.txt", Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(stat.size, 5);
        assert!(stat.checksum.starts_with("sha256:"));
        let read = backend.read("a/b.txt").await.unwrap();
        assert_eq!(&read[..], b"hello");
    }

    #[tokio::test]
    async fn move_then_read_at_new_path() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Backend::local(dir.path().to_str().unwrap()).unwrap();
        backend.write("old.txt", Bytes::from_static(b"data")).await.unwrap();
        backend.r#move("old.txt", "new.txt").await.unwrap();
        assert!(backend.read("old.txt").await.is_err());
        assert_eq!(&backend.read("new.txt").await.unwrap()[..], b"data");
    }
}
