// ── Deployment blobs ──
//
// Firmware images and domain exports travel as opaque bytes. The only
// thing we read out of them is a handful of plain-text marker tags near
// the start, which identify what the image is for.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::ModelType;

/// How much of a blob is scanned for marker tags.
pub const DEFAULT_SCAN_LIMIT: usize = 64 * 1024;

/// Marker values found in a blob header. Missing tags stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub product_id: Option<String>,
    pub firmware_rev: Option<String>,
    pub build_date: Option<String>,
    pub model_type: Option<ModelType>,
}

impl BlobMetadata {
    pub fn is_empty(&self) -> bool {
        self.product_id.is_none()
            && self.firmware_rev.is_none()
            && self.build_date.is_none()
            && self.model_type.is_none()
    }
}

/// Scan the first [`DEFAULT_SCAN_LIMIT`] bytes of `blob`.
pub fn scan_metadata(blob: &[u8]) -> BlobMetadata {
    scan_metadata_within(blob, DEFAULT_SCAN_LIMIT)
}

/// Scan the first `limit` bytes of `blob` for marker tags.
///
/// Never fails: binary noise, truncated tags and absent tags all just
/// leave the corresponding field empty.
pub fn scan_metadata_within(blob: &[u8], limit: usize) -> BlobMetadata {
    let header = String::from_utf8_lossy(&blob[..blob.len().min(limit)]);
    BlobMetadata {
        product_id: tag_value(&header, "product-id"),
        firmware_rev: tag_value(&header, "firmware-rev"),
        build_date: tag_value(&header, "build-date"),
        model_type: tag_value(&header, "model-type").map(|m| ModelType::new(&m)),
    }
}

fn tag_value(header: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = header.find(&open)? + open.len();
    let len = header[start..].find(&close)?;
    let value = header[start..start + len].trim();
    (!value.is_empty()).then(|| value.to_owned())
}

// ── Repository ───────────────────────────────────────────────────────

/// Identifier of a stored blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobId(Uuid);

impl BlobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BlobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A blob with the metadata extracted when it was stored.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub id: BlobId,
    pub name: String,
    pub data: Bytes,
    pub metadata: BlobMetadata,
    pub stored_at: DateTime<Utc>,
}

/// Persistence for deployment blobs.
#[async_trait]
pub trait BlobRepository: Send + Sync {
    /// Store `data`, scanning its header. Returns the new id.
    async fn store(&self, name: &str, data: Bytes) -> Result<BlobId, CoreError>;

    async fn retrieve(&self, id: BlobId) -> Result<Arc<StoredBlob>, CoreError>;

    async fn delete(&self, id: BlobId) -> Result<(), CoreError>;

    /// Every stored blob without its payload.
    async fn list(&self) -> Result<Vec<(BlobId, String, BlobMetadata)>, CoreError>;
}

/// Process-local repository. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryBlobRepository {
    blobs: DashMap<BlobId, Arc<StoredBlob>>,
}

impl MemoryBlobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(id: BlobId) -> CoreError {
    CoreError::NotFound {
        what: "Blob".into(),
        name: id.to_string(),
    }
}

#[async_trait]
impl BlobRepository for MemoryBlobRepository {
    async fn store(&self, name: &str, data: Bytes) -> Result<BlobId, CoreError> {
        let id = BlobId::new();
        let metadata = scan_metadata(&data);
        self.blobs.insert(
            id,
            Arc::new(StoredBlob {
                id,
                name: name.to_owned(),
                data,
                metadata,
                stored_at: Utc::now(),
            }),
        );
        Ok(id)
    }

    async fn retrieve(&self, id: BlobId) -> Result<Arc<StoredBlob>, CoreError> {
        self.blobs
            .get(&id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| missing(id))
    }

    async fn delete(&self, id: BlobId) -> Result<(), CoreError> {
        self.blobs.remove(&id).map(|_| ()).ok_or_else(|| missing(id))
    }

    async fn list(&self) -> Result<Vec<(BlobId, String, BlobMetadata)>, CoreError> {
        let mut rows: Vec<_> = self
            .blobs
            .iter()
            .map(|r| {
                let blob = r.value();
                (blob.stored_at, blob.id, blob.name.clone(), blob.metadata.clone())
            })
            .collect();
        rows.sort_by_key(|(at, ..)| *at);
        Ok(rows
            .into_iter()
            .map(|(_, id, name, metadata)| (id, name, metadata))
            .collect())
    }
}
