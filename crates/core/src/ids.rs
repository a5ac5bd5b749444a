// Row and column identifiers.
//
// Ids are minted on the client so a freshly added row can be edited before
// the document has ever been persisted. They are timestamp-derived with a
// process-wide sequence suffix, so two ids minted in the same millisecond
// still differ.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

fn mint(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}_{}_{}", prefix, millis, seq)
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Mint a fresh, timestamp-derived id.
            pub fn generate() -> Self {
                Self(mint($prefix))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Stable identifier of a column within one document.
    ColumnId,
    "col"
);

string_id!(
    /// Stable identifier of a row within one document.
    RowId,
    "row"
);
