//! Vector store contract
//!
//! The core never talks to a vector database directly; it goes through the
//! [`VectorStore`] trait. The store is a shared collaborator: handles are
//! cloned freely and the implementation is assumed internally concurrent.
//!
//! Payloads are modeled as a tagged record with well-known fields plus a
//! catch-all `extra` map, so typed consumers (the trajectory analyzer, the
//! pipeline) read named fields while unknown annotations survive round-trips.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embeddings::EmbeddingError;
use crate::memory::DocType;
use crate::optimize::CoalescerError;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Errors surfaced by the storage and search paths.
///
/// These paths are strict: errors propagate to the caller. Tolerant
/// degradation happens downstream, in the pipeline and trajectory layers.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Vector store unreachable or returned a protocol error
    #[error("vector store unavailable: {0}")]
    Unavailable(String),
    /// Embedding the query or document failed
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    /// A coalesced batch failed as a whole
    #[error("batch operation failed: {0}")]
    Batch(String),
    /// Record rejected before it reached the store
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl From<CoalescerError> for StoreError {
    fn from(err: CoalescerError) -> Self {
        StoreError::Batch(err.to_string())
    }
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// COLLECTIONS AND PAYLOADS
// ============================================================================

/// Logical bucket in the vector store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// Per-user memories and facts
    #[default]
    User,
    /// Facts shared across all users
    Global,
}

/// Typed record payload with a forward-compatible catch-all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecordPayload {
    /// When the underlying event happened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Owning user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Document type tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<DocType>,
    /// Exponentially-smoothed emotional intensity in `[0, 1]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotional_intensity_ema: Option<f64>,
    /// Raw emotional intensity in `[0, 1]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotional_intensity: Option<f64>,
    /// Short emotion tag ("joy", "frustration", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion_type: Option<String>,
    /// Which subsystem produced the record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Annotations without a dedicated field
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RecordPayload {
    /// Build a payload from a free-form metadata map, promoting the
    /// well-known emotional keys into their typed fields.
    pub fn from_metadata(
        user_id: Option<&str>,
        doc_type: DocType,
        timestamp: DateTime<Utc>,
        metadata: &BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let mut payload = Self {
            timestamp: Some(timestamp),
            user_id: user_id.map(str::to_string),
            doc_type: Some(doc_type),
            ..Self::default()
        };

        for (key, value) in metadata {
            match key.as_str() {
                "emotional_intensity_ema" => payload.emotional_intensity_ema = value.as_f64(),
                "emotional_intensity" => payload.emotional_intensity = value.as_f64(),
                "emotion_type" => {
                    payload.emotion_type = value.as_str().map(str::to_string);
                }
                "source" => payload.source = value.as_str().map(str::to_string),
                _ => {
                    payload.extra.insert(key.clone(), value.clone());
                }
            }
        }

        payload
    }
}

// ============================================================================
// RECORDS, HITS, FILTERS
// ============================================================================

/// A record to upsert into the vector store.
///
/// Upsert is idempotent by `id`; records are transferred by value and the
/// caller no longer owns them after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Content-addressed identifier
    pub id: String,
    /// Which bucket the record lives in
    pub collection: Collection,
    /// The searchable document text
    pub content: String,
    /// Typed annotations
    pub payload: RecordPayload,
    /// Fixed-dimension embedding
    pub vector: Vec<f32>,
}

/// One search result.
///
/// Distance is non-negative; smaller is more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryHit {
    /// The matched document text
    pub content: String,
    /// The record's annotations
    pub payload: RecordPayload,
    /// Query-to-record distance (smaller = closer)
    pub distance: f32,
    /// Which bucket the record came from
    pub collection: Collection,
}

impl MemoryHit {
    /// Similarity on a `[0, 1]`-ish scale, `1 - distance`
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Payload filter for search and scroll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    /// Restrict to records owned by this user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Restrict to these document types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_types: Option<Vec<DocType>>,
}

impl SearchFilter {
    /// Filter scoped to a single user
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            doc_types: None,
        }
    }

    /// Whether a payload satisfies this filter. Store implementations may
    /// push filtering down; this is the reference semantics.
    pub fn matches(&self, payload: &RecordPayload) -> bool {
        if let Some(user_id) = &self.user_id {
            if payload.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(doc_types) = &self.doc_types {
            match payload.doc_type {
                Some(doc_type) if doc_types.contains(&doc_type) => {}
                _ => return false,
            }
        }
        true
    }
}

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// The external vector database contract.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite a record; idempotent by id. Returns the id.
    async fn upsert(&self, record: MemoryRecord) -> Result<String>;

    /// Nearest-neighbor search with an optional payload filter.
    async fn search(
        &self,
        collection: Collection,
        query_vector: Vec<f32>,
        filter: Option<SearchFilter>,
        limit: usize,
    ) -> Result<Vec<MemoryHit>>;

    /// Enumerate records matching a filter, without vector scoring.
    async fn scroll(
        &self,
        collection: Collection,
        filter: SearchFilter,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>>;
}

// ============================================================================
// TESTS
// ============================================================================
