use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ColumnId, RowId};

/// Value stored in one cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

/// Edge a column is pinned to while scrolling horizontally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixedEdge {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: ColumnId,
    pub title: String,
    /// Display position. Rewritten to the column's index on normalization.
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, rename = "fixed", skip_serializing_if = "Option::is_none")]
    pub fixed_edge: Option<FixedEdge>,
}

impl Column {
    pub fn new(id: impl Into<ColumnId>, title: impl Into<String>) -> Self {
        Self { id: id.into(), title: title.into(), order: 0, width: None, fixed_edge: None }
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    pub fn fixed(mut self, edge: FixedEdge) -> Self {
        self.fixed_edge = Some(edge);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    #[serde(default)]
    pub cells: BTreeMap<ColumnId, CellValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl Row {
    pub fn new(id: impl Into<RowId>) -> Self {
        Self { id: id.into(), cells: BTreeMap::new(), height: None }
    }

    pub fn with_cell(mut self, column: impl Into<ColumnId>, value: impl Into<CellValue>) -> Self {
        self.cells.insert(column.into(), value.into());
        self
    }

    pub fn cell(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }
}

/// One editable table: the unit that is loaded and saved as a whole.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub row_heights: BTreeMap<RowId, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        let mut doc = Self { columns, rows, row_heights: BTreeMap::new(), updated_at: None };
        doc.normalize();
        doc
    }

    pub fn column(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id.as_str() == id)
    }

    pub fn row(&self, id: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.id.as_str() == id)
    }

    pub fn cell(&self, row: &str, column: &str) -> Option<&CellValue> {
        self.row(row).and_then(|r| r.cell(column))
    }

    pub fn column_index(&self, id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.id.as_str() == id)
    }

    pub fn row_index(&self, id: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.id.as_str() == id)
    }

    /// Restore the document invariants after ingestion or a bulk replace.
    ///
    /// - every column has a non-empty, unique id and `order` equals its index
    /// - every row has a non-empty, unique id
    /// - cell keys reference existing columns
    /// - `row_heights` keys reference existing rows, and inline row heights
    ///   agree with the map
    pub fn normalize(&mut self) {
        self.normalize_columns();
        self.normalize_rows();
    }

    fn normalize_columns(&mut self) {
        // Stable: columns sharing an `order` keep their incoming position.
        self.columns.sort_by_key(|c| c.order);

        let mut seen: HashSet<String> = HashSet::with_capacity(self.columns.len());
        for (idx, col) in self.columns.iter_mut().enumerate() {
            if col.id.as_str().trim().is_empty() {
                col.id = match slugify(&col.title) {
                    Some(slug) => ColumnId::new(slug),
                    None => ColumnId::generate(),
                };
            }
            if seen.contains(col.id.as_str()) {
                col.id = unique_with_suffix(col.id.as_str(), &seen).into();
            }
            seen.insert(col.id.as_str().to_string());
            col.order = idx as u32;
        }
    }

    fn normalize_rows(&mut self) {
        let columns: HashSet<&str> = self.columns.iter().map(|c| c.id.as_str()).collect();
        let mut seen: HashSet<RowId> = HashSet::with_capacity(self.rows.len());

        for row in self.rows.iter_mut() {
            if row.id.as_str().trim().is_empty() || seen.contains(&row.id) {
                row.id = RowId::generate();
            }
            seen.insert(row.id.clone());
            row.cells.retain(|key, _| columns.contains(key.as_str()));

            match (self.row_heights.get(&row.id), row.height) {
                (Some(h), _) => row.height = Some(*h),
                (None, Some(h)) => {
                    self.row_heights.insert(row.id.clone(), h);
                }
                (None, None) => {}
            }
        }

        self.row_heights.retain(|id, _| seen.contains(id));
    }
}

/// Lowercase ascii slug used to derive a column id from its title.
fn slugify(title: &str) -> Option<String> {
    let mut out = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('_');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() { None } else { Some(out) }
}

fn unique_with_suffix(base: &str, taken: &HashSet<String>) -> String {
    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| ColumnId::generate().to_string())
}
