use crate::core::{DbError, Result, Row, Schema, Value};
use crate::result::RowSet;
use im::Vector;

/// A typed table. Cloning is cheap: rows live in a persistent vector, so a
/// transaction can take a private copy and publish it on commit.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    schema: Schema,
    rows: Vector<Row>,
    version: u64,
}

/// Column equality test used by UPDATE and DELETE filters.
#[derive(Debug, Clone)]
pub struct Condition {
    pub column: usize,
    pub value: Value,
}

impl Condition {
    fn matches(&self, row: &Row) -> bool {
        // NULL never compares equal
        row.get(self.column)
            .is_some_and(|cell| !cell.is_null() && *cell == self.value)
    }
}

impl Table {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            rows: Vector::new(),
            version: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Bumped every time a new state of this table is published.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.schema
            .find_column_index(column)
            .ok_or_else(|| DbError::ColumnNotFound(column.to_string(), self.name.clone()))
    }

    pub fn to_row_set(&self) -> RowSet {
        RowSet::new(self.schema.column_names(), self.rows.iter().cloned().collect())
    }

    /// Appends rows. Either every row is inserted or none is.
    pub fn insert(&mut self, rows: Vec<Row>) -> Result<u64> {
        let mut staged = self.rows.clone();
        for row in rows.iter() {
            self.schema.validate_row(row)?;
            self.check_unique(&staged, row, None)?;
            staged.push_back(row.clone());
        }
        self.rows = staged;
        Ok(rows.len() as u64)
    }

    /// Rewrites every row matching all `conditions`. Either every matching
    /// row is updated or none is.
    pub fn update(&mut self, assignments: &[(usize, Value)], conditions: &[Condition]) -> Result<u64> {
        let mut staged = self.rows.clone();
        let mut affected = 0u64;

        for idx in 0..staged.len() {
            if !conditions.iter().all(|c| c.matches(&staged[idx])) {
                continue;
            }
            let mut new_row = staged[idx].clone();
            for (column, value) in assignments {
                new_row[*column] = value.clone();
            }
            self.schema.validate_row(&new_row)?;
            self.check_unique(&staged, &new_row, Some(idx))?;
            staged.set(idx, new_row);
            affected += 1;
        }

        self.rows = staged;
        Ok(affected)
    }

    pub fn delete(&mut self, conditions: &[Condition]) -> u64 {
        let before = self.rows.len();
        self.rows.retain(|row| !conditions.iter().all(|c| c.matches(row)));
        (before - self.rows.len()) as u64
    }

    fn check_unique(&self, rows: &Vector<Row>, row: &Row, ignore: Option<usize>) -> Result<()> {
        for (col_idx, column) in self.schema.columns().iter().enumerate() {
            if !column.unique || row[col_idx].is_null() {
                continue;
            }
            let clash = rows
                .iter()
                .enumerate()
                .any(|(idx, existing)| Some(idx) != ignore && existing[col_idx] == row[col_idx]);
            if clash {
                return Err(DbError::ConstraintViolation(format!(
                    "Unique constraint violation: Column '{}' already contains value {}",
                    column.name, row[col_idx]
                )));
            }
        }
        Ok(())
    }
}
