use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one editable document: a table type plus an optional owner
/// sub-scope (for example a department).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub table_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl Scope {
    pub fn new(table_type: impl Into<String>) -> Self {
        Self { table_type: table_type.into(), owner_id: None }
    }

    pub fn with_owner(table_type: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self { table_type: table_type.into(), owner_id: Some(owner_id.into()) }
    }

    /// Query parameters addressing this scope on the remote store.
    /// `ownerId` is omitted when there is no sub-scope.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("tableType", self.table_type.clone())];
        if let Some(ref owner) = self.owner_id {
            pairs.push(("ownerId", owner.clone()));
        }
        pairs
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner_id {
            Some(owner) => write!(f, "{}/{}", self.table_type, owner),
            None => f.write_str(&self.table_type),
        }
    }
}
