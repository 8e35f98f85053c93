#![forbid(unsafe_code)]

//! Filesystem-backed storage adapter.
//!
//! Binary blobs are plain files under the root directory. Manifests are
//! replaced atomically (temp + rename) so an HTTP origin serving the
//! directory never observes a half-written playlist.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace};

use crate::{Storage, StorageError, StorageResult};

/// Storage adapter writing into a single directory.
#[derive(Debug)]
pub struct FsStorage {
    root: PathBuf,
    root_ready: bool,
}

impl FsStorage {
    /// Create an adapter rooted at `root`. The directory is created lazily
    /// on the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            root_ready: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn ensure_root(&mut self) -> StorageResult<()> {
        if !self.root_ready {
            tokio::fs::create_dir_all(&self.root).await?;
            self.root_ready = true;
        }
        Ok(())
    }

    /// Resolve `name` under the root, rejecting names that would escape it.
    fn blob_path(&self, name: &str) -> StorageResult<PathBuf> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(StorageError::Failed(format!("invalid blob name: {name:?}")));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn store_init(&mut self, name: &str, data: Bytes) -> StorageResult<()> {
        self.ensure_root().await?;
        let path = self.blob_path(name)?;
        tokio::fs::write(&path, &data).await?;
        debug!(name, bytes = data.len(), "init blob stored");
        Ok(())
    }

    async fn store_segment(&mut self, name: &str, data: Bytes) -> StorageResult<()> {
        self.ensure_root().await?;
        let path = self.blob_path(name)?;
        tokio::fs::write(&path, &data).await?;
        trace!(name, bytes = data.len(), "segment blob stored");
        Ok(())
    }

    async fn store_manifests(&mut self, manifests: &[(String, String)]) -> StorageResult<()> {
        self.ensure_root().await?;
        for (name, content) in manifests {
            let path = self.blob_path(name)?;
            let tmp_path = tmp_path_for(&path);

            // `rename` provides atomic whole-document replacement but not
            // fsync durability.
            tokio::fs::write(&tmp_path, content.as_bytes()).await?;
            tokio::fs::rename(&tmp_path, &path).await?;
            trace!(name, bytes = content.len(), "manifest replaced");
        }
        debug!(count = manifests.len(), "manifests stored");
        Ok(())
    }

    async fn remove_segments(&mut self, names: &[String]) -> StorageResult<()> {
        for name in names {
            let path = self.blob_path(name)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => trace!(name = name.as_str(), "segment blob removed"),
                // Best-effort: already gone is fine.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::Io(e)),
            }
        }
        Ok(())
    }
}

fn tmp_path_for(final_path: &Path) -> PathBuf {
    // Deterministic temp name; writers are serialized by the sink, so no
    // two writes race on the same manifest.
    let mut p = final_path.to_path_buf();

    let mut file_name = p
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "tmp".to_string());

    file_name.push_str(".tmp");
    p.set_file_name(file_name);
    p
}
