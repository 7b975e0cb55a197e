/*!
# Tabsheet

A small spreadsheet-like web application: a set of named tabs, each holding a
table of rows and columns, backed by one JSON document.

## Architecture

### Document Model
- **document**: `Document` (tab name to `Tab`), rows as string-keyed maps of
  numbers or strings, explicit per-tab column lists, column totals.

### Persistence Layer
- **store**: the `DocumentStore` contract (load the whole document, save the
  whole document) and its two backends:
  - `LocalStore` - pretty-printed JSON file, written via temp file + rename
  - `DriveStore` - a single `app.json` in Google Drive, reached with a
    service account; caches its access token and file id for the process

### Session Layer
- **workbook**: `Workbook` keeps the in-memory document, the selected tab
  and the saved flag, and persists on request or after every structural
  change when autosave is on.

### Web Layer (feature `web`)
- **app**: axum router, the `/api/driveData` and `/api/saveData` endpoints
  and the workbook editing API
- **config**: flags and environment (`.env` supported)

## Persisted format

```json
{
  "projects": [
    { "id": 1, "name": "Alpha", "status": "" }
  ]
}
```

Top-level keys are tab names in display order. A tab whose column list
cannot be read off its first row (for example one whose rows were all
deleted) is written as `{"columns": [...], "rows": [...]}` instead.
*/

pub mod config;
pub mod document;
pub mod store;
pub mod workbook;

#[cfg(feature = "web")]
pub mod app;

pub use document::{CellValue, ColumnTotal, Document, ModelError, Row, Tab, display_label};
pub use store::{DocumentStore, DriveStore, LocalStore, StoreError};
pub use workbook::{SyncError, Workbook, WorkbookOptions, load_document, persist_document};
