// Wire decoding for persisted documents.
//
// Older payloads name the column key `key` or `dataIndex`, the header
// `name`, and store row cells flattened next to the row id. The Raw* types
// accept every shape seen in stored data; conversion into `Document` fills
// whatever is missing and then normalizes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::document::{CellValue, Column, Document, FixedEdge, Row};
use crate::ids::{ColumnId, RowId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawColumn {
    /// Ids and headers may be numbers on year columns (`"title": 2023`).
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub data_index: Option<Value>,
    #[serde(default)]
    pub key: Option<Value>,
    #[serde(default)]
    pub title: Option<Value>,
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub order: Option<Value>,
    #[serde(default)]
    pub width: Option<Value>,
    /// `"left"`, `"right"`, or `true` (meaning left).
    #[serde(default, alias = "fixedEdge")]
    pub fixed: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRow {
    /// String or number; numeric ids come from older exports.
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub key: Option<Value>,
    #[serde(default, deserialize_with = "object_or_none")]
    pub cells: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub height: Option<Value>,
    /// Legacy rows keep their cells next to the id.
    #[serde(flatten)]
    pub rest: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDocument {
    #[serde(default, deserialize_with = "list_or_empty")]
    pub columns: Vec<RawColumn>,
    #[serde(default, deserialize_with = "list_or_empty")]
    pub rows: Vec<RawRow>,
    #[serde(default, deserialize_with = "object_or_empty")]
    pub row_heights: BTreeMap<String, Value>,
    #[serde(default, deserialize_with = "timestamp_or_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RawColumn {
    fn into_column(self, position: usize) -> Column {
        let id = [&self.id, &self.data_index, &self.key]
            .into_iter()
            .find_map(|v| v.as_ref().and_then(id_from_json))
            .unwrap_or_default();
        let title = [&self.title, &self.name]
            .into_iter()
            .find_map(|v| v.as_ref().and_then(text_from_json))
            .unwrap_or_else(|| id.clone());
        Column {
            id: ColumnId::new(id),
            title,
            order: self.order.as_ref().and_then(order_from_json).unwrap_or(position as u32),
            width: self.width.as_ref().and_then(size_from_json),
            fixed_edge: self.fixed.as_ref().and_then(parse_fixed),
        }
    }
}

impl RawRow {
    fn into_row(self) -> Row {
        let id = self
            .id
            .as_ref()
            .and_then(id_from_json)
            .or_else(|| self.key.as_ref().and_then(id_from_json))
            .unwrap_or_default();
        let mut cells: BTreeMap<ColumnId, CellValue> = BTreeMap::new();
        for (k, v) in self.rest {
            cells.insert(ColumnId::new(k), cell_from_json(v));
        }
        // Nested cells win over flattened ones with the same key.
        for (k, v) in self.cells.unwrap_or_default() {
            cells.insert(ColumnId::new(k), cell_from_json(v));
        }
        Row { id: RowId::new(id), cells, height: self.height.as_ref().and_then(size_from_json) }
    }
}

impl From<RawDocument> for Document {
    fn from(raw: RawDocument) -> Self {
        let columns = raw
            .columns
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.into_column(i))
            .collect();
        let rows = raw.rows.into_iter().map(RawRow::into_row).collect();
        let row_heights = raw
            .row_heights
            .into_iter()
            .filter_map(|(k, h)| size_from_json(&h).map(|h| (RowId::new(k), h)))
            .collect();

        let mut doc = Document { columns, rows, row_heights, updated_at: raw.updated_at };
        doc.normalize();
        doc
    }
}

impl Document {
    /// Decode and normalize a persisted payload of any supported shape.
    ///
    /// Only a payload that is not an object at all is an error; bad field
    /// values are dropped and filled in by normalization.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        let raw: RawDocument = serde_json::from_value(value)?;
        Ok(raw.into())
    }
}

// ── Lenient field decoding ──────────────────────────────────────────

fn list_or_empty<'de, D, T>(de: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let items = match Value::deserialize(de)? {
        Value::Array(items) => items,
        _ => return Ok(Vec::new()),
    };
    // Entries that are not objects (nulls, stray strings) are skipped.
    Ok(items.into_iter().filter_map(|v| serde_json::from_value(v).ok()).collect())
}

fn object_or_empty<'de, D>(de: D) -> Result<BTreeMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(object_or_none(de)?.unwrap_or_default())
}

fn object_or_none<'de, D>(de: D) -> Result<Option<BTreeMap<String, Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::Object(map) => Ok(Some(map.into_iter().collect())),
        _ => Ok(None),
    }
}

fn timestamp_or_none<'de, D>(de: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(serde_json::from_value(Value::deserialize(de)?).ok())
}

fn parse_fixed(value: &Value) -> Option<FixedEdge> {
    match value {
        Value::String(s) if s.eq_ignore_ascii_case("left") => Some(FixedEdge::Left),
        Value::String(s) if s.eq_ignore_ascii_case("right") => Some(FixedEdge::Right),
        Value::Bool(true) => Some(FixedEdge::Left),
        _ => None,
    }
}

fn id_from_json(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_from_json(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn number_from_json(value: &Value) -> Option<f64> {
    let n: f64 = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Fractional orders round; negative ones fall back to position.
fn order_from_json(value: &Value) -> Option<u32> {
    number_from_json(value)
        .filter(|n| *n >= 0.0 && *n <= f64::from(u32::MAX))
        .map(|n| n.round() as u32)
}

/// Widths and heights must be positive.
fn size_from_json(value: &Value) -> Option<f64> {
    number_from_json(value).filter(|n| *n > 0.0)
}

fn cell_from_json(value: Value) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Bool(b) => CellValue::Bool(b),
        Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Null),
        Value::String(s) => CellValue::Text(s),
        other => CellValue::Text(other.to_string()),
    }
}
