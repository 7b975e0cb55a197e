//! Whole-document persistence backends.
//!
//! Every backend implements [`DocumentStore`]: read the complete document,
//! or replace it. There is no partial update and no concurrency token, so
//! two sessions writing the same store resolve as last-write-wins.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::document::Document;

pub mod auth;
pub mod drive;
pub mod local;

pub use auth::{AccessToken, JwtTokenSource, ServiceAccount, TokenCache, TokenSource};
pub use drive::{DriveApi, DriveStore, HttpDriveApi};
pub use local::LocalStore;

/// Failures reported by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file does not exist yet.
    #[error("No document at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Content was read but is not a valid document.
    #[error("Malformed document: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode document: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },

    #[error("Authentication failed: {reason}")]
    Auth { reason: String },

    /// The cached remote file id no longer resolves.
    #[error("Remote file not found: {file_id}")]
    FileNotFound { file_id: String },

    #[error("Remote request failed with status {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Remote transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl StoreError {
    /// Whether the content was reachable but unparseable.
    pub fn is_malformed(&self) -> bool {
        matches!(self, StoreError::Malformed { .. })
    }

    /// Whether the backing file simply does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Read-whole / write-whole contract shared by all backends.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self) -> Result<Document, StoreError>;

    async fn save(&self, document: &Document) -> Result<(), StoreError>;

    /// Short description used in log lines.
    fn describe(&self) -> String;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<S> {
    async fn load(&self) -> Result<Document, StoreError> {
        (**self).load().await
    }

    async fn save(&self, document: &Document) -> Result<(), StoreError> {
        (**self).save(document).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Encode a document the way every backend writes it.
pub(crate) fn encode(document: &Document) -> Result<String, StoreError> {
    serde_json::to_string_pretty(document).map_err(|source| StoreError::Encode { source })
}

/// Decode stored content. Blank content reads as an empty document.
pub(crate) fn decode(content: &str) -> Result<Document, StoreError> {
    if content.trim().is_empty() {
        return Ok(Document::new());
    }
    serde_json::from_str(content).map_err(|source| StoreError::Malformed { source })
}
