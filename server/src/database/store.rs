//! Document store abstraction
//!
//! Every backend keeps schemaless JSON documents in named collections.
//! Documents come back in insertion order and carry a store-managed
//! `version` that starts at 1 and grows by one on every merge.

use super::query::Query;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// A stored record as a JSON object
pub type Document = Map<String, Value>;

/// Field holding the document identifier
pub const ID_FIELD: &str = "id";

/// Field holding the store-managed version
pub const VERSION_FIELD: &str = "version";

/// Failure classes the resilience layer is allowed to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientCode {
    Unavailable,
    DeadlineExceeded,
    Cancelled,
    Aborted,
}

impl TransientCode {
    pub fn as_str(self) -> &'static str {
        match self {
            TransientCode::Unavailable => "unavailable",
            TransientCode::DeadlineExceeded => "deadline-exceeded",
            TransientCode::Cancelled => "cancelled",
            TransientCode::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for TransientCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("transient store failure ({code}): {message}")]
    Transient {
        code: TransientCode,
        message: String,
    },

    #[error("version conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("document encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn transient(code: TransientCode, message: impl Into<String>) -> Self {
        StoreError::Transient {
            code,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }

    pub fn transient_code(&self) -> Option<TransientCode> {
        match self {
            StoreError::Transient { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let code = match &err {
            sqlx::Error::PoolTimedOut => Some(TransientCode::DeadlineExceeded),
            sqlx::Error::PoolClosed => Some(TransientCode::Cancelled),
            sqlx::Error::Io(_) => Some(TransientCode::Unavailable),
            // SQLITE_BUSY, SQLITE_LOCKED and their extended variants
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("5") | Some("6") | Some("261") | Some("262") | Some("517") => {
                    Some(TransientCode::Aborted)
                }
                _ => None,
            },
            _ => None,
        };

        match code {
            Some(code) => StoreError::transient(code, err.to_string()),
            None => StoreError::Backend(err.to_string()),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage backend for JSON documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store a new document under `id`, stamping version 1.
    async fn insert(&self, collection: &str, id: &str, doc: Document) -> StoreResult<Document>;

    /// Look up a document; absence is `Ok(None)`.
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Shallow-merge `patch` into an existing document as one atomic step.
    ///
    /// Returns `Ok(None)` when the document does not exist; nothing is
    /// created in that case. With `expected_version` set the merge only
    /// applies if the stored version matches.
    async fn merge(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
        expected_version: Option<u64>,
    ) -> StoreResult<Option<Document>>;

    /// All documents of a collection in insertion order
    async fn list(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// Documents matching a query
    async fn query(&self, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
        Ok(query.apply(self.list(collection).await?))
    }
}

/// Version recorded on a document, 0 when missing
pub fn document_version(doc: &Document) -> u64 {
    doc.get(VERSION_FIELD).and_then(Value::as_u64).unwrap_or(0)
}

/// Prepare a document for its first write
pub fn stamp_new(mut doc: Document, id: &str) -> Document {
    doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    doc.insert(VERSION_FIELD.to_string(), Value::from(1u64));
    doc
}

/// Apply a shallow merge in place, bumping the version.
///
/// `id` and `version` are owned by the store and ignored in the patch.
pub fn apply_merge(
    existing: &mut Document,
    patch: Document,
    expected_version: Option<u64>,
) -> StoreResult<()> {
    let current = document_version(existing);
    if let Some(expected) = expected_version {
        if expected != current {
            return Err(StoreError::Conflict {
                expected,
                actual: current,
            });
        }
    }

    for (key, value) in patch {
        if key == ID_FIELD || key == VERSION_FIELD {
            continue;
        }
        existing.insert(key, value);
    }
    existing.insert(VERSION_FIELD.to_string(), Value::from(current + 1));

    Ok(())
}
