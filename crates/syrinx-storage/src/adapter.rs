#![forbid(unsafe_code)]

use async_trait::async_trait;
use bytes::Bytes;

use crate::StorageResult;

/// Contract for persisting a sink's output.
///
/// # Contract (normative)
/// - Blob names form a single flat namespace shared by every track of a
///   presentation; name uniqueness is the caller's responsibility.
/// - `store_*` operations write or overwrite whole objects.
/// - `store_manifests` is all-or-nothing at the logical level; an
///   implementation may achieve it per document (e.g. temp + rename).
/// - `remove_segments` is best-effort; a missing blob is not an error.
/// - An error must not poison the adapter: subsequent calls with fresh
///   inputs are accepted.
#[async_trait]
pub trait Storage {
    /// Write or overwrite a named initialization blob.
    async fn store_init(&mut self, name: &str, data: Bytes) -> StorageResult<()>;

    /// Write or overwrite a named media segment blob.
    async fn store_segment(&mut self, name: &str, data: Bytes) -> StorageResult<()>;

    /// Write or overwrite each named manifest document.
    async fn store_manifests(&mut self, manifests: &[(String, String)]) -> StorageResult<()>;

    /// Remove the named segment blobs.
    async fn remove_segments(&mut self, names: &[String]) -> StorageResult<()>;
}
