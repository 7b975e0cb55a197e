use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{DocumentStore, StoreError, decode, encode};
use crate::document::Document;

/// Document kept as a pretty-printed JSON file on local disk.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a crash mid-write leaves the previous version intact.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LocalStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File content exactly as stored, without parsing.
    pub async fn read_raw(&self) -> Result<String, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                path: self.path.clone(),
            }),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

fn write_atomically(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn load(&self) -> Result<Document, StoreError> {
        let content = self.read_raw().await?;
        decode(&content)
    }

    async fn save(&self, document: &Document) -> Result<(), StoreError> {
        let content = encode(document)?;
        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || write_atomically(&path, content.as_bytes()))
            .await
            .unwrap_or_else(|join| Err(std::io::Error::other(join)));

        result.map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        log::debug!("Wrote document to {}", self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("local file {}", self.path.display())
    }
}
