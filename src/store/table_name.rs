use crate::core::{DbError, Result};
use serde::{Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;

/// Name of a table as reported by the schema catalog.
///
/// Only the crate can construct one, and only from a catalog enumeration,
/// so request data can never become a read target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName(String);

impl TableName {
    /// Validates a raw catalog entry.
    ///
    /// Empty, blank, or control-character names mean the catalog itself is
    /// broken and are reported as [`DbError::CorruptCatalog`].
    pub(crate) fn from_catalog(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(DbError::CorruptCatalog(
                "catalog returned an empty table name".into(),
            ));
        }
        if raw.chars().any(char::is_control) {
            return Err(DbError::CorruptCatalog(format!(
                "catalog returned a table name with control characters: {:?}",
                raw
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TableName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for TableName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
