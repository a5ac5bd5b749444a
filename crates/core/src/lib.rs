//! Editable table documents.
//!
//! A [`Document`] is the in-memory state of one editable table: ordered
//! columns, ordered rows keyed by a stable id, and a sparse row-height map.
//! [`DocumentState`] is the mutation surface over it. Every mutation is a
//! synchronous, total state transition that reports whether anything changed.
//!
//! Persisted payloads arrive in several historical shapes. They are decoded
//! through the `Raw*` wire types and normalized on ingestion, so the rest of
//! the system only ever sees fully-populated records.

mod document;
mod ids;
mod scope;
mod state;
mod wire;

pub use document::{CellValue, Column, Document, FixedEdge, Row};
pub use ids::{ColumnId, RowId};
pub use scope::Scope;
pub use state::{DocumentState, TableLimits};
pub use wire::{RawColumn, RawDocument, RawRow};
