//! Scoped temporary blobs.
//!
//! Encoded image bytes are registered as a blob for as long as something is
//! reading them. A [`BlobHandle`] revokes its registration when dropped, so
//! temporary blobs are released on every exit path, including errors and
//! cancelled futures.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct BlobEntry {
    size: usize,
}

/// Tracks live blobs.
#[derive(Debug, Clone, Default)]
pub struct BlobRegistry {
    live: Arc<Mutex<HashMap<Uuid, BlobEntry>>>,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` and return the owning handle.
    pub fn create(&self, bytes: Bytes, content_type: Option<&str>) -> BlobHandle {
        let id = Uuid::new_v4();
        self.live
            .lock()
            .insert(id, BlobEntry { size: bytes.len() });
        trace!(blob = %id, size = bytes.len(), "Created blob");

        BlobHandle {
            id,
            bytes,
            content_type: content_type.map(str::to_string),
            live: Arc::clone(&self.live),
        }
    }

    /// Number of blobs not yet released.
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Total bytes held by unreleased blobs.
    pub fn live_bytes(&self) -> usize {
        self.live.lock().values().map(|e| e.size).sum()
    }

    pub fn is_live(&self, url: &str) -> bool {
        parse_blob_url(url)
            .map(|id| self.live.lock().contains_key(&id))
            .unwrap_or(false)
    }
}

/// Owning handle to a registered blob. Dropping it revokes the blob.
pub struct BlobHandle {
    id: Uuid,
    bytes: Bytes,
    content_type: Option<String>,
    live: Arc<Mutex<HashMap<Uuid, BlobEntry>>>,
}

impl std::fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobHandle")
            .field("url", &self.url())
            .field("size", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl BlobHandle {
    /// Object URL for this blob.
    pub fn url(&self) -> String {
        format!("blob:overmark/{}", self.id)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

impl Drop for BlobHandle {
    fn drop(&mut self) {
        self.live.lock().remove(&self.id);
        trace!(blob = %self.id, "Revoked blob");
    }
}

fn parse_blob_url(url: &str) -> Option<Uuid> {
    url.strip_prefix("blob:overmark/")
        .and_then(|id| Uuid::parse_str(id).ok())
}
