use super::RowSet;
use crate::store::TableName;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

/// Every table of one schema, keyed by name.
///
/// Built once per snapshot call and handed out only after every table
/// read has settled.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SnapshotResult {
    tables: HashMap<TableName, RowSet>,
}

impl SnapshotResult {
    pub fn new(tables: HashMap<TableName, RowSet>) -> Self {
        Self { tables }
    }

    pub fn get(&self, table: &str) -> Option<&RowSet> {
        self.tables.get(table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(TableName::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TableName, &RowSet)> {
        self.tables.iter()
    }

    pub fn into_inner(self) -> HashMap<TableName, RowSet> {
        self.tables
    }
}

impl IntoIterator for SnapshotResult {
    type Item = (TableName, RowSet);
    type IntoIter = std::collections::hash_map::IntoIter<TableName, RowSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.tables.into_iter()
    }
}

/// Serializes as `{"table": [rows...]}` with tables in sorted order.
impl Serialize for SnapshotResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tables.len()))?;
        for name in self.table_names() {
            map.serialize_entry(name, &self.tables[name])?;
        }
        map.end()
    }
}
