// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content-addressed blob sink on the local filesystem.
//!
//! Blobs live at `{root}/{hash[0..2]}/{hash}` where `hash` is the lowercase
//! hex SHA-256 of the bytes. A file only appears at its final path once it
//! has been fully written and fsynced.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use telesave_core::{BlobRef, TelesaveError};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

const TEMP_SUFFIX: &str = ".tmp";

/// Filesystem blob store with a per-hash exclusive section.
pub struct BlobSink {
    root: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl BlobSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lowercase hex SHA-256 of `bytes`.
    pub fn content_hash(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Path of a blob relative to the root.
    pub fn storage_path(content_hash: &str) -> String {
        let prefix = content_hash.get(..2).unwrap_or(content_hash);
        format!("{prefix}/{content_hash}")
    }

    pub fn absolute_path(&self, storage_path: &str) -> PathBuf {
        self.root.join(storage_path)
    }

    /// Hold the exclusive section for `content_hash`.
    ///
    /// Callers that check the index and then write must hold this guard
    /// across both steps.
    pub async fn lock(&self, content_hash: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(content_hash.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop the lock entry for `content_hash` when nobody else holds it.
    pub fn release(&self, content_hash: &str) {
        self.locks
            .remove_if(content_hash, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    /// Write `bytes` under their hash and return the blob reference.
    ///
    /// The caller must hold [`lock`](Self::lock) for the hash. A blob file
    /// that already exists with the right size is kept as is.
    pub async fn store(
        &self,
        content_hash: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<BlobRef, TelesaveError> {
        let storage_path = Self::storage_path(content_hash);
        let target = self.absolute_path(&storage_path);
        let blob = BlobRef {
            content_hash: content_hash.to_string(),
            mime_type: mime_type.to_string(),
            size: bytes.len() as u64,
            storage_path,
        };

        if let Ok(meta) = tokio::fs::metadata(&target).await
            && meta.len() == blob.size
        {
            debug!(hash = content_hash, "blob already on disk");
            return Ok(blob);
        }

        let dir = target
            .parent()
            .ok_or_else(|| TelesaveError::Internal(format!("blob path {target:?} has no parent")))?
            .to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(TelesaveError::storage)?;

        let temp = dir.join(format!(".{content_hash}.{}{TEMP_SUFFIX}", uuid::Uuid::new_v4()));
        if let Err(e) = write_synced(&temp, bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }
        tokio::fs::rename(&temp, &target)
            .await
            .map_err(TelesaveError::storage)?;
        sync_dir(&dir).await?;

        debug!(hash = content_hash, size = blob.size, "blob written");
        Ok(blob)
    }

    /// Blob files under the root that no indexed storage path references.
    ///
    /// Read-only: nothing is deleted.
    pub async fn scan_unreferenced(
        &self,
        referenced: &HashSet<String>,
    ) -> Result<Vec<PathBuf>, TelesaveError> {
        let mut unreferenced = Vec::new();
        let mut shards = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(unreferenced),
            Err(e) => return Err(TelesaveError::storage(e)),
        };
        while let Some(shard) = shards.next_entry().await.map_err(TelesaveError::storage)? {
            if !shard.file_type().await.map_err(TelesaveError::storage)?.is_dir() {
                continue;
            }
            let shard_name = shard.file_name().to_string_lossy().into_owned();
            let mut files = tokio::fs::read_dir(shard.path())
                .await
                .map_err(TelesaveError::storage)?;
            while let Some(file) = files.next_entry().await.map_err(TelesaveError::storage)? {
                let name = file.file_name().to_string_lossy().into_owned();
                if name.ends_with(TEMP_SUFFIX) {
                    continue;
                }
                if !referenced.contains(&format!("{shard_name}/{name}")) {
                    unreferenced.push(file.path());
                }
            }
        }
        unreferenced.sort();
        Ok(unreferenced)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), TelesaveError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(TelesaveError::storage)?;
    file.write_all(bytes).await.map_err(TelesaveError::storage)?;
    file.sync_all().await.map_err(TelesaveError::storage)?;
    Ok(())
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<(), TelesaveError> {
    tokio::fs::File::open(dir)
        .await
        .map_err(TelesaveError::storage)?
        .sync_all()
        .await
        .map_err(TelesaveError::storage)
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<(), TelesaveError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hash_and_path_layout() {
        let hash = BlobSink::content_hash(b"hello");
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(BlobSink::storage_path(&hash), format!("2c/{hash}"));
    }

    #[tokio::test]
    async fn store_writes_complete_file_without_temp_leftovers() {
        let dir = tempdir().unwrap();
        let sink = BlobSink::new(dir.path());
        let hash = BlobSink::content_hash(b"photo bytes");

        let guard = sink.lock(&hash).await;
        let blob = sink.store(&hash, b"photo bytes", "image/jpeg").await.unwrap();
        drop(guard);
        sink.release(&hash);

        let on_disk = std::fs::read(sink.absolute_path(&blob.storage_path)).unwrap();
        assert_eq!(on_disk, b"photo bytes");
        assert_eq!(blob.size, 11);

        let shard = sink.absolute_path(&blob.storage_path);
        let entries: Vec<_> = std::fs::read_dir(shard.parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1, "temp file must be renamed away");
    }

    #[tokio::test]
    async fn concurrent_stores_of_same_hash_leave_one_file() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(BlobSink::new(dir.path()));
        let bytes = vec![7u8; 4096];
        let hash = BlobSink::content_hash(&bytes);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sink = sink.clone();
            let bytes = bytes.clone();
            let hash = hash.clone();
            handles.push(tokio::spawn(async move {
                let _guard = sink.lock(&hash).await;
                sink.store(&hash, &bytes, "application/octet-stream")
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let referenced = HashSet::new();
        let files = sink.scan_unreferenced(&referenced).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(std::fs::read(&files[0]).unwrap(), bytes);
    }

    #[tokio::test]
    async fn scan_reports_only_unreferenced() {
        let dir = tempdir().unwrap();
        let sink = BlobSink::new(dir.path());
        let kept = BlobSink::content_hash(b"kept");
        let stray = BlobSink::content_hash(b"stray");
        sink.store(&kept, b"kept", "text/plain").await.unwrap();
        sink.store(&stray, b"stray", "text/plain").await.unwrap();

        let referenced = HashSet::from([BlobSink::storage_path(&kept)]);
        let files = sink.scan_unreferenced(&referenced).await.unwrap();
        assert_eq!(files, vec![sink.absolute_path(&BlobSink::storage_path(&stray))]);
    }

    #[tokio::test]
    async fn scan_of_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let sink = BlobSink::new(dir.path().join("never-created"));
        assert!(sink.scan_unreferenced(&HashSet::new()).await.unwrap().is_empty());
    }
}
