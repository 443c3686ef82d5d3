// ============================================================================
// Parameterized write statements
// ============================================================================
//
// Parses INSERT / UPDATE / DELETE text with sqlparser (MySQL dialect, `?`
// placeholders) and binds positional parameters. Parameters are only ever
// values; table and column names come from the statement text itself.
//
// ============================================================================

use super::table::{Condition, Table};
use crate::core::{DbError, Result, Row, Value};
use sqlparser::ast as sql_ast;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Literal(Value),
    Param(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        rows: Vec<Vec<Value>>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Value)>,
        filter: Vec<(String, Value)>,
    },
    Delete {
        table: String,
        filter: Vec<(String, Value)>,
    },
}

impl Mutation {
    /// Parses `sql` and binds `params` in placeholder order.
    pub fn compile(sql: &str, params: &[Value]) -> Result<Self> {
        let mut statements = Parser::parse_sql(&MySqlDialect {}, sql)?;
        if statements.len() != 1 {
            return Err(DbError::InvalidInput(format!(
                "expected exactly one statement, got {}",
                statements.len()
            )));
        }

        let mut binder = Binder::new(params);
        let mutation = match statements.remove(0) {
            sql_ast::Statement::Insert(insert) => binder.insert(insert)?,
            sql_ast::Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => binder.update(table, assignments, selection)?,
            sql_ast::Statement::Delete(delete) => binder.delete(delete)?,
            other => {
                return Err(DbError::InvalidInput(format!(
                    "only INSERT, UPDATE and DELETE are accepted, got: {}",
                    other
                )));
            }
        };
        binder.finish()?;
        Ok(mutation)
    }

    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => {
                table
            }
        }
    }

    /// Applies the mutation to `table` and returns the affected row count.
    pub fn apply(&self, table: &mut Table) -> Result<u64> {
        match self {
            Self::Insert { columns, rows, .. } => {
                let rows = rows
                    .iter()
                    .map(|values| shape_row(table, columns.as_deref(), values))
                    .collect::<Result<Vec<Row>>>()?;
                table.insert(rows)
            }
            Self::Update {
                assignments,
                filter,
                ..
            } => {
                let assignments = assignments
                    .iter()
                    .map(|(column, value)| Ok((table.column_index(column)?, value.clone())))
                    .collect::<Result<Vec<_>>>()?;
                let conditions = conditions(table, filter)?;
                table.update(&assignments, &conditions)
            }
            Self::Delete { filter, .. } => {
                let conditions = conditions(table, filter)?;
                Ok(table.delete(&conditions))
            }
        }
    }
}

fn shape_row(table: &Table, columns: Option<&[String]>, values: &[Value]) -> Result<Row> {
    let Some(columns) = columns else {
        return Ok(values.to_vec());
    };
    if columns.len() != values.len() {
        return Err(DbError::InvalidInput(format!(
            "{} columns but {} values",
            columns.len(),
            values.len()
        )));
    }

    let mut row = vec![Value::Null; table.schema().column_count()];
    for (column, value) in columns.iter().zip(values) {
        row[table.column_index(column)?] = value.clone();
    }
    Ok(row)
}

fn conditions(table: &Table, filter: &[(String, Value)]) -> Result<Vec<Condition>> {
    filter
        .iter()
        .map(|(column, value)| {
            Ok(Condition {
                column: table.column_index(column)?,
                value: value.clone(),
            })
        })
        .collect()
}

/// Hands out parameters in placeholder order and checks they were all used.
struct Binder<'a> {
    params: &'a [Value],
    next: usize,
    used: usize,
}

impl<'a> Binder<'a> {
    fn new(params: &'a [Value]) -> Self {
        Self {
            params,
            next: 0,
            used: 0,
        }
    }

    fn finish(&self) -> Result<()> {
        if self.used != self.params.len() {
            return Err(DbError::InvalidInput(format!(
                "statement uses {} parameters but {} were supplied",
                self.used,
                self.params.len()
            )));
        }
        Ok(())
    }

    fn resolve(&mut self, operand: Operand) -> Result<Value> {
        match operand {
            Operand::Literal(value) => Ok(value),
            Operand::Param(idx) => {
                self.used = self.used.max(idx + 1);
                self.params.get(idx).cloned().ok_or_else(|| {
                    DbError::InvalidInput(format!("missing value for parameter {}", idx + 1))
                })
            }
        }
    }

    fn operand(&mut self, expr: sql_ast::Expr) -> Result<Operand> {
        match expr {
            sql_ast::Expr::Value(val) => self.value(val.value),
            sql_ast::Expr::Nested(inner) => self.operand(*inner),
            sql_ast::Expr::UnaryOp {
                op: sql_ast::UnaryOperator::Minus,
                expr,
            } => match self.operand(*expr)? {
                Operand::Literal(Value::Integer(i)) => Ok(Operand::Literal(Value::Integer(-i))),
                Operand::Literal(Value::Float(f)) => Ok(Operand::Literal(Value::Float(-f))),
                _ => Err(DbError::InvalidInput(
                    "unary minus only applies to numeric literals".into(),
                )),
            },
            other => Err(DbError::InvalidInput(format!(
                "unsupported value expression: {}",
                other
            ))),
        }
    }

    fn value(&mut self, val: sql_ast::Value) -> Result<Operand> {
        match val {
            sql_ast::Value::Placeholder(p) => {
                let idx = if p == "?" {
                    let idx = self.next;
                    self.next += 1;
                    idx
                } else {
                    p.trim_start_matches(['$', ':', '?'])
                        .parse::<usize>()
                        .ok()
                        .and_then(|n| n.checked_sub(1))
                        .ok_or_else(|| {
                            DbError::InvalidInput(format!("unsupported placeholder '{}'", p))
                        })?
                };
                Ok(Operand::Param(idx))
            }
            sql_ast::Value::Number(n, _) => {
                if let Ok(i) = n.parse::<i64>() {
                    Ok(Operand::Literal(Value::Integer(i)))
                } else if let Ok(f) = n.parse::<f64>() {
                    Ok(Operand::Literal(Value::Float(f)))
                } else {
                    Err(DbError::TypeMismatch(format!("Invalid number: {}", n)))
                }
            }
            sql_ast::Value::SingleQuotedString(s) | sql_ast::Value::DoubleQuotedString(s) => {
                Ok(Operand::Literal(Value::Text(s)))
            }
            sql_ast::Value::Boolean(b) => Ok(Operand::Literal(Value::Boolean(b))),
            sql_ast::Value::Null => Ok(Operand::Literal(Value::Null)),
            other => Err(DbError::InvalidInput(format!("unsupported value: {}", other))),
        }
    }

    fn bind(&mut self, expr: sql_ast::Expr) -> Result<Value> {
        let operand = self.operand(expr)?;
        self.resolve(operand)
    }

    /// Flattens `a = x AND b = y ...` into column/value pairs.
    fn filter(&mut self, expr: sql_ast::Expr, out: &mut Vec<(String, Value)>) -> Result<()> {
        match expr {
            sql_ast::Expr::Nested(inner) => self.filter(*inner, out),
            sql_ast::Expr::BinaryOp {
                left,
                op: sql_ast::BinaryOperator::And,
                right,
            } => {
                self.filter(*left, out)?;
                self.filter(*right, out)
            }
            sql_ast::Expr::BinaryOp {
                left,
                op: sql_ast::BinaryOperator::Eq,
                right,
            } => {
                let column = column_of(*left)?;
                let value = self.bind(*right)?;
                out.push((column, value));
                Ok(())
            }
            other => Err(DbError::InvalidInput(format!(
                "WHERE supports only `column = value` joined by AND, got: {}",
                other
            ))),
        }
    }

    fn selection(&mut self, selection: Option<sql_ast::Expr>) -> Result<Vec<(String, Value)>> {
        let mut filter = Vec::new();
        if let Some(expr) = selection {
            self.filter(expr, &mut filter)?;
        }
        Ok(filter)
    }

    fn insert(&mut self, insert: sql_ast::Insert) -> Result<Mutation> {
        let table = unquote(&insert.table.to_string());
        let columns = if insert.columns.is_empty() {
            None
        } else {
            Some(insert.columns.into_iter().map(|id| id.value).collect())
        };

        let Some(source) = insert.source else {
            return Err(DbError::InvalidInput("INSERT requires a VALUES clause".into()));
        };
        let sql_ast::SetExpr::Values(values) = *source.body else {
            return Err(DbError::InvalidInput("Only VALUES clause supported".into()));
        };

        let rows = values
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|expr| self.bind(expr))
                    .collect::<Result<Vec<Value>>>()
            })
            .collect::<Result<Vec<Vec<Value>>>>()?;

        Ok(Mutation::Insert {
            table,
            columns,
            rows,
        })
    }

    fn update(
        &mut self,
        table: sql_ast::TableWithJoins,
        assignments: Vec<sql_ast::Assignment>,
        selection: Option<sql_ast::Expr>,
    ) -> Result<Mutation> {
        let table = table_of(&table)?;

        let assignments = assignments
            .into_iter()
            .map(|assign| {
                let column = match assign.target {
                    sql_ast::AssignmentTarget::ColumnName(name) => object_name(&name)?,
                    _ => {
                        return Err(DbError::InvalidInput(
                            "Only simple column names supported in UPDATE".into(),
                        ));
                    }
                };
                Ok((column, self.bind(assign.value)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let filter = self.selection(selection)?;
        Ok(Mutation::Update {
            table,
            assignments,
            filter,
        })
    }

    fn delete(&mut self, delete: sql_ast::Delete) -> Result<Mutation> {
        let tables = match &delete.from {
            sql_ast::FromTable::WithFromKeyword(tables) => tables,
            sql_ast::FromTable::WithoutKeyword(tables) => tables,
        };
        let table = match tables.as_slice() {
            [only] => table_of(only)?,
            _ => {
                return Err(DbError::InvalidInput(
                    "DELETE must name exactly one table".into(),
                ));
            }
        };

        let filter = self.selection(delete.selection)?;
        Ok(Mutation::Delete { table, filter })
    }
}

fn table_of(table: &sql_ast::TableWithJoins) -> Result<String> {
    if !table.joins.is_empty() {
        return Err(DbError::InvalidInput("joins are not supported in writes".into()));
    }
    match &table.relation {
        sql_ast::TableFactor::Table { name, .. } => object_name(name),
        _ => Err(DbError::InvalidInput(
            "Complex table references not supported".into(),
        )),
    }
}

fn object_name(name: &sql_ast::ObjectName) -> Result<String> {
    name.0
        .last()
        .map(|part| unquote(&part.to_string()))
        .ok_or_else(|| DbError::ParseError("Invalid object name".into()))
}

fn column_of(expr: sql_ast::Expr) -> Result<String> {
    match expr {
        sql_ast::Expr::Identifier(ident) => Ok(ident.value),
        sql_ast::Expr::CompoundIdentifier(idents) => idents
            .into_iter()
            .last()
            .map(|ident| ident.value)
            .ok_or_else(|| DbError::ParseError("Invalid column reference".into())),
        other => Err(DbError::InvalidInput(format!(
            "expected a column name, got: {}",
            other
        ))),
    }
}

fn unquote(ident: &str) -> String {
    let last = ident.rsplit('.').next().unwrap_or(ident);
    last.trim_matches(|c| c == '`' || c == '"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_update_binds_in_order() {
        let mutation = Mutation::compile(
            "UPDATE students SET name = ?, age = ? WHERE id = ?",
            &[Value::from("Ada"), Value::Integer(36), Value::Integer(7)],
        )
        .unwrap();

        assert_eq!(
            mutation,
            Mutation::Update {
                table: "students".into(),
                assignments: vec![
                    ("name".into(), Value::from("Ada")),
                    ("age".into(), Value::Integer(36)),
                ],
                filter: vec![("id".into(), Value::Integer(7))],
            }
        );
    }

    #[test]
    fn test_compile_multi_row_insert() {
        let mutation = Mutation::compile(
            "INSERT INTO jobs (title, company) VALUES (?, ?), (?, 'Acme')",
            &[Value::from("Backend"), Value::from("Initech"), Value::from("Ops")],
        )
        .unwrap();

        let Mutation::Insert { table, columns, rows } = mutation else {
            panic!("expected insert");
        };
        assert_eq!(table, "jobs");
        assert_eq!(columns, Some(vec!["title".to_string(), "company".to_string()]));
        assert_eq!(rows[1], vec![Value::from("Ops"), Value::from("Acme")]);
    }

    #[test]
    fn test_compile_delete_with_conjunction() {
        let mutation = Mutation::compile(
            "DELETE FROM interviews WHERE id = ? AND company = 'Acme'",
            &[Value::Integer(3)],
        )
        .unwrap();

        assert_eq!(mutation.table(), "interviews");
        let Mutation::Delete { filter, .. } = mutation else {
            panic!("expected delete");
        };
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_parameter_count_must_match() {
        let too_few = Mutation::compile("DELETE FROM jobs WHERE id = ?", &[]);
        assert!(matches!(too_few, Err(DbError::InvalidInput(_))));

        let too_many = Mutation::compile(
            "DELETE FROM jobs WHERE id = ?",
            &[Value::Integer(1), Value::Integer(2)],
        );
        assert!(matches!(too_many, Err(DbError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_reads_and_garbage() {
        assert!(matches!(
            Mutation::compile("SELECT * FROM jobs", &[]),
            Err(DbError::InvalidInput(_))
        ));
        assert!(matches!(
            Mutation::compile("UPDATE SET WHERE", &[]),
            Err(DbError::ParseError(_))
        ));
    }

    #[test]
    fn test_parameters_are_values_not_sql() {
        let mutation = Mutation::compile(
            "UPDATE students SET name = ? WHERE id = ?",
            &[Value::from("x'; DROP TABLE students; --"), Value::Integer(1)],
        )
        .unwrap();

        let Mutation::Update { assignments, .. } = mutation else {
            panic!("expected update");
        };
        assert_eq!(assignments[0].1, Value::from("x'; DROP TABLE students; --"));
    }
}
