use super::Table;
use crate::core::{DbError, Result, Schema};
use im::OrdMap;

/// Committed tables of one schema.
///
/// Copy-on-write: cloning shares structure, so every transaction starts
/// from a clone and the store publishes a new catalog on commit.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: OrdMap<String, Table>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&mut self, name: &str, schema: Schema) -> Result<()> {
        if self.tables.contains_key(name) {
            return Err(DbError::TableExists(name.to_string()));
        }
        self.tables.insert(name.to_string(), Table::new(name, schema));
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    /// Replaces a table with a newer state of itself.
    pub fn publish(&mut self, mut table: Table) {
        table.bump_version();
        self.tables.insert(table.name().to_string(), table);
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Table names in sorted order.
    pub fn list_tables(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }
}
