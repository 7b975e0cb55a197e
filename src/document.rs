//! In-memory table document model.
//!
//! A [`Document`] maps tab names to [`Tab`]s. Each tab keeps an explicit,
//! ordered column list next to its rows so that emptying a tab does not lose
//! its shape. The persisted format stays compatible with the plain
//! `{"tab": [ {row}, ... ]}` layout: columns are rebuilt from the first row
//! when they are not written out.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Column holding the positional row identifier.
pub const ID_COLUMN: &str = "id";

/// Columns a freshly created tab starts with.
pub const DEFAULT_TAB_COLUMNS: [&str; 2] = [ID_COLUMN, "name"];

/// A single record: column name to cell value, in column order.
pub type Row = IndexMap<String, CellValue>;

/// Errors raised by model operations.
///
/// Every operation that returns an error leaves the document unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Unknown tab: {tab}")]
    UnknownTab { tab: String },

    #[error("Unknown column {column} in tab {tab}")]
    UnknownColumn { tab: String, column: String },

    #[error("Tab already exists: {tab}")]
    DuplicateTab { tab: String },

    #[error("{what} name cannot be empty")]
    EmptyName { what: &'static str },
}

/// Value stored in a cell. Only JSON numbers and strings are accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(serde_json::Number),
    Text(String),
}

impl CellValue {
    pub fn empty() -> Self {
        CellValue::Text(String::new())
    }

    /// Numeric reading of the cell, if it has one.
    ///
    /// Strings are trimmed before parsing and an empty string reads as zero.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => n.as_f64(),
            CellValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Some(0.0);
                }
                trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
            }
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<u64> for CellValue {
    fn from(value: u64) -> Self {
        CellValue::Number(value.into())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

/// A named table: ordered columns plus rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tab {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Tab {
    /// Create an empty tab with the given columns. Duplicate names are dropped.
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tab = Tab::default();
        for column in columns {
            let column = column.into();
            if !tab.columns.contains(&column) {
                tab.columns.push(column);
            }
        }
        tab
    }

    /// Build a tab from rows alone, deriving the columns from the first row.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        Tab { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    // The legacy layout can only express a tab whose columns are exactly the
    // keys of its first row.
    fn is_legacy_shape(&self) -> bool {
        match self.rows.first() {
            Some(first) => first.keys().eq(self.columns.iter()),
            None => self.columns.is_empty(),
        }
    }
}

#[derive(Serialize)]
struct ExplicitTabRef<'a> {
    columns: &'a [String],
    rows: &'a [Row],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TabRepr {
    Legacy(Vec<Row>),
    Explicit { columns: Vec<String>, rows: Vec<Row> },
}

impl Serialize for Tab {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_legacy_shape() {
            self.rows.serialize(serializer)
        } else {
            ExplicitTabRef {
                columns: &self.columns,
                rows: &self.rows,
            }
            .serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Tab {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match TabRepr::deserialize(deserializer)? {
            TabRepr::Legacy(rows) => Tab::from_rows(rows),
            TabRepr::Explicit { columns, rows } => {
                let mut tab = Tab::with_columns(columns);
                tab.rows = rows;
                tab
            }
        })
    }
}

/// Per-column sum shown above a table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnTotal {
    pub column: String,
    pub total: f64,
}

/// The whole dataset: tab name to tab, in display order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    tabs: IndexMap<String, Tab>,
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn tab_names(&self) -> impl Iterator<Item = &str> {
        self.tabs.keys().map(String::as_str)
    }

    pub fn tab(&self, name: &str) -> Option<&Tab> {
        self.tabs.get(name)
    }

    pub fn columns(&self, tab: &str) -> Result<&[String], ModelError> {
        self.get(tab).map(Tab::columns)
    }

    pub fn rows(&self, tab: &str) -> Result<&[Row], ModelError> {
        self.get(tab).map(Tab::rows)
    }

    fn get(&self, tab: &str) -> Result<&Tab, ModelError> {
        self.tabs.get(tab).ok_or_else(|| ModelError::UnknownTab {
            tab: tab.to_string(),
        })
    }

    fn get_mut(&mut self, tab: &str) -> Result<&mut Tab, ModelError> {
        self.tabs.get_mut(tab).ok_or_else(|| ModelError::UnknownTab {
            tab: tab.to_string(),
        })
    }

    /// Append a blank row and return its index.
    ///
    /// The `id` cell, when the tab has that column, gets `row count + 1`. Ids
    /// are never renumbered, so they can repeat after deletions.
    pub fn add_row(&mut self, tab: &str) -> Result<usize, ModelError> {
        let tab = self.get_mut(tab)?;
        let next_id = tab.rows.len() as u64 + 1;
        let row: Row = tab
            .columns
            .iter()
            .map(|column| {
                let value = if column == ID_COLUMN {
                    CellValue::from(next_id)
                } else {
                    CellValue::empty()
                };
                (column.clone(), value)
            })
            .collect();
        tab.rows.push(row);
        Ok(tab.rows.len() - 1)
    }

    /// Add a column with an empty value in every row.
    ///
    /// Adding a column that already exists blanks it in every row instead of
    /// failing.
    pub fn add_column(&mut self, tab: &str, name: &str) -> Result<(), ModelError> {
        if name.trim().is_empty() {
            return Err(ModelError::EmptyName { what: "Column" });
        }
        let tab = self.get_mut(tab)?;
        if !tab.has_column(name) {
            tab.columns.push(name.to_string());
        }
        for row in &mut tab.rows {
            row.insert(name.to_string(), CellValue::empty());
        }
        Ok(())
    }

    /// Remove the row at `index`. Returns `None` when the index is out of range.
    pub fn delete_row(&mut self, tab: &str, index: usize) -> Result<Option<Row>, ModelError> {
        let tab = self.get_mut(tab)?;
        if index >= tab.rows.len() {
            return Ok(None);
        }
        Ok(Some(tab.rows.remove(index)))
    }

    /// Remove a column from the column list and from every row.
    /// Returns whether anything was removed.
    pub fn delete_column(&mut self, tab: &str, name: &str) -> Result<bool, ModelError> {
        let tab = self.get_mut(tab)?;
        let before = tab.columns.len();
        tab.columns.retain(|c| c != name);
        let mut removed = tab.columns.len() != before;
        for row in &mut tab.rows {
            removed |= row.shift_remove(name).is_some();
        }
        Ok(removed)
    }

    /// Create a tab with the default columns and one seed row.
    pub fn add_tab(&mut self, name: &str) -> Result<(), ModelError> {
        if name.trim().is_empty() {
            return Err(ModelError::EmptyName { what: "Tab" });
        }
        if self.tabs.contains_key(name) {
            return Err(ModelError::DuplicateTab {
                tab: name.to_string(),
            });
        }
        let mut tab = Tab::with_columns(DEFAULT_TAB_COLUMNS);
        let mut seed = Row::new();
        seed.insert(ID_COLUMN.to_string(), CellValue::from(1u64));
        seed.insert("name".to_string(), CellValue::empty());
        tab.rows.push(seed);
        self.tabs.insert(name.to_string(), tab);
        Ok(())
    }

    /// Remove a tab and its rows, keeping the order of the remaining tabs.
    pub fn delete_tab(&mut self, name: &str) -> Result<Tab, ModelError> {
        self.tabs
            .shift_remove(name)
            .ok_or_else(|| ModelError::UnknownTab {
                tab: name.to_string(),
            })
    }

    /// Set one cell. Returns `false` when `index` is out of range.
    ///
    /// Only columns of the tab can be written; a row that is missing the
    /// field (rows are not forced to share keys) gets it appended.
    pub fn update_cell(
        &mut self,
        tab: &str,
        index: usize,
        field: &str,
        value: CellValue,
    ) -> Result<bool, ModelError> {
        let tab_name = tab;
        let tab = self.get_mut(tab)?;
        if !tab.has_column(field) {
            return Err(ModelError::UnknownColumn {
                tab: tab_name.to_string(),
                column: field.to_string(),
            });
        }
        match tab.rows.get_mut(index) {
            Some(row) => {
                row.insert(field.to_string(), value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Sum of every numeric cell per column, skipping the `id` column.
    /// Cells that do not read as numbers count as zero.
    pub fn column_totals(&self, tab: &str) -> Result<Vec<ColumnTotal>, ModelError> {
        let tab = self.get(tab)?;
        Ok(tab
            .columns
            .iter()
            .filter(|column| column.as_str() != ID_COLUMN)
            .map(|column| ColumnTotal {
                column: column.clone(),
                total: tab
                    .rows
                    .iter()
                    .filter_map(|row| row.get(column))
                    .filter_map(CellValue::as_number)
                    .sum(),
            })
            .collect())
    }
}

/// Human readable header for a tab or column key: `project_name` -> `Project Name`.
pub fn display_label(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
