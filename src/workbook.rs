//! Session state that keeps the in-memory document in step with a store.

use thiserror::Error;

use crate::document::{CellValue, Document, ModelError, Row, Tab};
use crate::store::{DocumentStore, StoreError};

/// Failures seen by a workbook session.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to load document from {store}: {source}")]
    LoadFailed {
        store: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to save document to {store}: {source}")]
    SaveFailed {
        store: String,
        #[source]
        source: StoreError,
    },

    /// The session opened on a failed load, so its document is not the
    /// stored one and must not replace it.
    #[error("Refusing to save to {store}: the stored document could not be loaded ({reason}); reload first")]
    LoadPending { store: String, reason: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl SyncError {
    /// Underlying store failure, if this is one.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            SyncError::LoadFailed { source, .. } | SyncError::SaveFailed { source, .. } => {
                Some(source)
            }
            SyncError::LoadPending { .. } | SyncError::Model(_) => None,
        }
    }
}

/// When the workbook writes to its store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkbookOptions {
    /// Persist after every structural change (rows, columns, tabs) instead of
    /// only on an explicit [`Workbook::persist`]. Cell edits always wait for
    /// an explicit save.
    pub autosave_on_mutation: bool,
}

/// Load the whole document from `store`.
pub async fn load_document<S: DocumentStore + ?Sized>(store: &S) -> Result<Document, SyncError> {
    store
        .load()
        .await
        .map_err(|source| SyncError::LoadFailed {
            store: store.describe(),
            source,
        })
}

/// Replace the stored document with `document`.
pub async fn persist_document<S: DocumentStore + ?Sized>(
    store: &S,
    document: &Document,
) -> Result<(), SyncError> {
    store
        .save(document)
        .await
        .map_err(|source| SyncError::SaveFailed {
            store: store.describe(),
            source,
        })
}

/// One editing session over a store.
///
/// Every mutation that fails with a [`ModelError`] leaves the document as it
/// was. With autosave on, a mutation whose save fails returns
/// [`SyncError::SaveFailed`] but stays applied in memory; the workbook is
/// then reported as unsaved.
///
/// A session opened on a failed load refuses to save (explicitly or through
/// autosave) until [`Workbook::reload`] succeeds. A store that does not exist
/// yet is not a failed load.
pub struct Workbook<S> {
    store: S,
    document: Document,
    active_tab: usize,
    saved: bool,
    load_failure: Option<String>,
    options: WorkbookOptions,
}

impl<S: DocumentStore> Workbook<S> {
    /// Start a session from the store's current content.
    ///
    /// A load failure does not prevent opening: the session starts from an
    /// empty document and the failure is handed back for the caller to report.
    pub async fn open(store: S, options: WorkbookOptions) -> (Self, Option<SyncError>) {
        let (document, error) = match load_document(&store).await {
            Ok(document) => (document, None),
            Err(e) => (Document::new(), Some(e)),
        };
        let load_failure = error
            .as_ref()
            .and_then(SyncError::store_error)
            .filter(|e| !e.is_not_found())
            .map(ToString::to_string);
        let workbook = Workbook {
            store,
            document,
            active_tab: 0,
            saved: error.is_none(),
            load_failure,
            options,
        };
        (workbook, error)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> WorkbookOptions {
        self.options
    }

    /// Whether the in-memory document matches what was last loaded or saved.
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn active_tab(&self) -> usize {
        self.active_tab
    }

    pub fn active_tab_name(&self) -> Option<&str> {
        self.document.tab_names().nth(self.active_tab)
    }

    /// Why the stored document could not be loaded, while saving is blocked.
    pub fn load_failure(&self) -> Option<&str> {
        self.load_failure.as_deref()
    }

    /// Select a tab by position. Returns `false` when out of range.
    pub fn set_active_tab(&mut self, index: usize) -> bool {
        if index < self.document.len() {
            self.active_tab = index;
            true
        } else {
            false
        }
    }

    /// Write the current document to the store.
    pub async fn persist(&mut self) -> Result<(), SyncError> {
        if let Some(reason) = &self.load_failure {
            return Err(SyncError::LoadPending {
                store: self.store.describe(),
                reason: reason.clone(),
            });
        }
        persist_document(&self.store, &self.document).await?;
        self.saved = true;
        log::info!("Saved {} tab(s) to {}", self.document.len(), self.store.describe());
        Ok(())
    }

    /// Throw away in-memory state and read the store again.
    ///
    /// On failure the current document is kept.
    pub async fn reload(&mut self) -> Result<(), SyncError> {
        self.document = load_document(&self.store).await?;
        self.saved = true;
        self.load_failure = None;
        if self.active_tab >= self.document.len() {
            self.active_tab = 0;
        }
        Ok(())
    }

    async fn mutated(&mut self) -> Result<(), SyncError> {
        self.saved = false;
        if self.options.autosave_on_mutation {
            self.persist().await?;
        }
        Ok(())
    }

    pub async fn add_row(&mut self, tab: &str) -> Result<usize, SyncError> {
        let index = self.document.add_row(tab)?;
        self.mutated().await?;
        Ok(index)
    }

    pub async fn delete_row(&mut self, tab: &str, index: usize) -> Result<Option<Row>, SyncError> {
        let removed = self.document.delete_row(tab, index)?;
        if removed.is_some() {
            self.mutated().await?;
        }
        Ok(removed)
    }

    pub async fn add_column(&mut self, tab: &str, name: &str) -> Result<(), SyncError> {
        self.document.add_column(tab, name)?;
        self.mutated().await
    }

    pub async fn delete_column(&mut self, tab: &str, name: &str) -> Result<bool, SyncError> {
        let removed = self.document.delete_column(tab, name)?;
        if removed {
            self.mutated().await?;
        }
        Ok(removed)
    }

    pub async fn add_tab(&mut self, name: &str) -> Result<(), SyncError> {
        self.document.add_tab(name)?;
        self.mutated().await
    }

    /// Remove a tab; the selection goes back to the first tab.
    pub async fn delete_tab(&mut self, name: &str) -> Result<Tab, SyncError> {
        let removed = self.document.delete_tab(name)?;
        self.active_tab = 0;
        self.mutated().await?;
        Ok(removed)
    }

    /// Edit one cell. Never autosaved.
    pub fn update_cell(
        &mut self,
        tab: &str,
        index: usize,
        field: &str,
        value: CellValue,
    ) -> Result<bool, SyncError> {
        let changed = self.document.update_cell(tab, index, field, value)?;
        if changed {
            self.saved = false;
        }
        Ok(changed)
    }
}
