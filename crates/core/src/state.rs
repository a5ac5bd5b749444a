// Mutation surface over one document.
//
// Every operation is synchronous and total: invalid targets (unknown ids,
// deleting below the configured floor) are no-ops that report `false`.
// `revision` advances only on effective changes, which is what the sync
// engine keys its "edited since" checks on.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{CellValue, Column, Document, Row};
use crate::ids::{ColumnId, RowId};

/// Floor protection: some tables must always keep a minimum shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TableLimits {
    pub min_rows: usize,
    pub min_columns: usize,
}

impl TableLimits {
    pub const fn new(min_rows: usize, min_columns: usize) -> Self {
        Self { min_rows, min_columns }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentState {
    doc: Document,
    limits: TableLimits,
    revision: u64,
}

impl DocumentState {
    pub fn new(mut doc: Document, limits: TableLimits) -> Self {
        doc.normalize();
        Self { doc, limits, revision: 0 }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn limits(&self) -> TableLimits {
        self.limits
    }

    /// Monotonic count of effective changes since construction.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Record when the server last stored this document. Not an edit, so
    /// the revision stays put.
    pub fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.doc.updated_at = Some(at);
    }

    fn commit(&mut self, changed: bool) -> bool {
        if changed {
            self.revision += 1;
        }
        changed
    }

    // ── Bulk setters ────────────────────────────────────────────────

    /// Replace the whole document (hydration from the remote copy).
    pub fn replace(&mut self, mut doc: Document) -> bool {
        doc.normalize();
        let changed = doc != self.doc;
        self.doc = doc;
        self.commit(changed)
    }

    pub fn set_columns(&mut self, columns: Vec<Column>) -> bool {
        let mut next = self.doc.clone();
        next.columns = columns;
        next.normalize();
        let changed = next != self.doc;
        self.doc = next;
        self.commit(changed)
    }

    pub fn set_rows(&mut self, rows: Vec<Row>) -> bool {
        let mut next = self.doc.clone();
        next.rows = rows;
        next.normalize();
        let changed = next != self.doc;
        self.doc = next;
        self.commit(changed)
    }

    pub fn set_row_heights(&mut self, heights: BTreeMap<RowId, f64>) -> bool {
        let mut next = self.doc.clone();
        next.row_heights = heights
            .into_iter()
            .filter(|(_, h)| h.is_finite() && *h > 0.0)
            .collect();
        for row in next.rows.iter_mut() {
            row.height = None;
        }
        next.normalize();
        let changed = next != self.doc;
        self.doc = next;
        self.commit(changed)
    }

    // ── Rows ────────────────────────────────────────────────────────

    /// Insert an empty row after `after` (or at the end) and return its id.
    pub fn add_row(&mut self, after: Option<&RowId>) -> RowId {
        let id = loop {
            let candidate = RowId::generate();
            if self.doc.row(candidate.as_str()).is_none() {
                break candidate;
            }
        };
        let at = after
            .and_then(|a| self.doc.row_index(a.as_str()))
            .map(|i| i + 1)
            .unwrap_or(self.doc.rows.len());
        self.doc.rows.insert(at, Row::new(id.clone()));
        self.commit(true);
        id
    }

    pub fn delete_row(&mut self, id: &RowId) -> bool {
        if self.doc.rows.len() <= self.limits.min_rows {
            return false;
        }
        let Some(idx) = self.doc.row_index(id.as_str()) else {
            return false;
        };
        self.doc.rows.remove(idx);
        self.doc.row_heights.remove(id);
        self.commit(true)
    }

    pub fn resize_row(&mut self, id: &RowId, height: f64) -> bool {
        if !height.is_finite() || height <= 0.0 {
            return false;
        }
        let Some(idx) = self.doc.row_index(id.as_str()) else {
            return false;
        };
        if self.doc.row_heights.get(id) == Some(&height) {
            return false;
        }
        self.doc.row_heights.insert(id.clone(), height);
        self.doc.rows[idx].height = Some(height);
        self.commit(true)
    }

    // ── Columns ─────────────────────────────────────────────────────

    /// Insert a column after `after` (or at the end) and return its id.
    pub fn add_column(&mut self, title: impl Into<String>, after: Option<&ColumnId>) -> ColumnId {
        let id = loop {
            let candidate = ColumnId::generate();
            if self.doc.column(candidate.as_str()).is_none() {
                break candidate;
            }
        };
        let at = after
            .and_then(|a| self.doc.column_index(a.as_str()))
            .map(|i| i + 1)
            .unwrap_or(self.doc.columns.len());
        self.doc.columns.insert(at, Column::new(id.clone(), title));
        self.reindex_columns();
        self.commit(true);
        id
    }

    /// Remove a column together with every cell stored under it.
    pub fn delete_column(&mut self, id: &ColumnId) -> bool {
        if self.doc.columns.len() <= self.limits.min_columns {
            return false;
        }
        let Some(idx) = self.doc.column_index(id.as_str()) else {
            return false;
        };
        self.doc.columns.remove(idx);
        for row in self.doc.rows.iter_mut() {
            row.cells.remove(id);
        }
        self.reindex_columns();
        self.commit(true)
    }

    pub fn rename_column(&mut self, id: &ColumnId, title: impl Into<String>) -> bool {
        let title = title.into();
        let Some(idx) = self.doc.column_index(id.as_str()) else {
            return false;
        };
        if self.doc.columns[idx].title == title {
            return false;
        }
        self.doc.columns[idx].title = title;
        self.commit(true)
    }

    pub fn resize_column(&mut self, id: &ColumnId, width: f64) -> bool {
        if !width.is_finite() || width <= 0.0 {
            return false;
        }
        let Some(idx) = self.doc.column_index(id.as_str()) else {
            return false;
        };
        if self.doc.columns[idx].width == Some(width) {
            return false;
        }
        self.doc.columns[idx].width = Some(width);
        self.commit(true)
    }

    /// Move a column to display position `to` (clamped to the last slot).
    pub fn move_column(&mut self, id: &ColumnId, to: usize) -> bool {
        let Some(from) = self.doc.column_index(id.as_str()) else {
            return false;
        };
        let to = to.min(self.doc.columns.len() - 1);
        if from == to {
            return false;
        }
        let col = self.doc.columns.remove(from);
        self.doc.columns.insert(to, col);
        self.reindex_columns();
        self.commit(true)
    }

    fn reindex_columns(&mut self) {
        for (i, col) in self.doc.columns.iter_mut().enumerate() {
            col.order = i as u32;
        }
    }

    // ── Cells ───────────────────────────────────────────────────────

    pub fn edit_cell(&mut self, row: &RowId, column: &ColumnId, value: impl Into<CellValue>) -> bool {
        let value = value.into();
        if self.doc.column_index(column.as_str()).is_none() {
            return false;
        }
        let Some(idx) = self.doc.row_index(row.as_str()) else {
            return false;
        };
        let cells = &mut self.doc.rows[idx].cells;
        if cells.get(column) == Some(&value) {
            return false;
        }
        cells.insert(column.clone(), value);
        self.commit(true)
    }

    pub fn clear_cell(&mut self, row: &RowId, column: &ColumnId) -> bool {
        let Some(idx) = self.doc.row_index(row.as_str()) else {
            return false;
        };
        let removed = self.doc.rows[idx].cells.remove(column).is_some();
        self.commit(removed)
    }
}
