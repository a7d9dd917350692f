//! Where metadata comes from.
//!
//! A [`SchemaSource`] answers discovery requests for the cache. The
//! [`DriverSchemaSource`] runs the dialect's introspection queries through
//! a blocking driver; the [`StaticSchemaSource`] serves descriptors that
//! were built in memory or loaded ahead of time by
//! [`load_schema_snapshot`] over an async connection.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{
    ColumnMetadata, IndexColumn, IndexMetadata, ParameterDirection, ParameterMetadata,
    StoredProcedureMetadata, TableFunctionMetadata, TableOrViewMetadata,
};
use crate::builder::{Parameter, ParameterOrigin};
use crate::dialect::Dialect;
use crate::error::{ObjectKind, Result};
use crate::execution::{AsyncConnection, Command, Connection, Driver, Row, RowSet};
use crate::name::ObjectName;
use crate::value::SqlValue;

/// Introspection SQL for one dialect.
///
/// `objects` takes no parameters. Every other query takes the schema (NULL
/// for the connection's default) followed by the object name. An empty
/// string means the dialect cannot answer that question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntrospectionQueries {
    /// `(schema_name, object_name, object_type)` for every object.
    pub objects: &'static str,
    /// `(schema_name, object_name, is_table)` for one table or view.
    pub table: &'static str,
    /// `(column_name, type_name, is_nullable, is_identity, is_computed,
    /// is_primary_key, max_length, precision, scale)` in ordinal order.
    pub columns: &'static str,
    /// `(index_name, is_unique, is_primary_key, column_name, is_descending)`
    /// in index order.
    pub indexes: &'static str,
    /// `(schema_name, object_name, object_type)` for one routine.
    pub routine: &'static str,
    /// `(parameter_name, type_name, parameter_mode)` in ordinal order.
    pub parameters: &'static str,
    /// Result columns of a table function, shaped like `columns`.
    pub function_columns: &'static str,
}

/// An object listed by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObject {
    /// Object name.
    pub name: ObjectName,
    /// What the object is.
    pub kind: ObjectKind,
}

/// Answers metadata requests for the cache.
pub trait SchemaSource: Send + Sync {
    /// Every table, view, procedure and function.
    fn list_objects(&self) -> Result<Vec<SchemaObject>>;

    /// A table or view, or `None` when it does not exist.
    fn load_table_or_view(&self, name: &ObjectName) -> Result<Option<TableOrViewMetadata>>;

    /// The indexes of a table.
    fn load_indexes(&self, table: &ObjectName) -> Result<Vec<IndexMetadata>>;

    /// A stored procedure, or `None` when it does not exist.
    fn load_stored_procedure(&self, name: &ObjectName) -> Result<Option<StoredProcedureMetadata>>;

    /// A table-valued function, or `None` when it does not exist.
    fn load_table_function(&self, name: &ObjectName) -> Result<Option<TableFunctionMetadata>>;
}

fn text(value: Option<&SqlValue>) -> Option<String> {
    match value? {
        SqlValue::Null => None,
        SqlValue::Text(s) => Some(s.clone()),
        other => Some(other.to_sql_inline()),
    }
}

fn flag(value: Option<&SqlValue>) -> bool {
    value.and_then(SqlValue::as_bool).unwrap_or(false)
}

fn number(value: Option<&SqlValue>) -> Option<i32> {
    value
        .and_then(SqlValue::as_i64)
        .and_then(|n| i32::try_from(n).ok())
}

fn object_kind(kind: &str) -> Option<ObjectKind> {
    match kind.trim().to_ascii_uppercase().as_str() {
        "TABLE" | "BASE TABLE" => Some(ObjectKind::Table),
        "VIEW" => Some(ObjectKind::View),
        "PROCEDURE" => Some(ObjectKind::StoredProcedure),
        "FUNCTION" => Some(ObjectKind::TableFunction),
        _ => None,
    }
}

fn object_name(row: &Row<'_>) -> Option<ObjectName> {
    let name = text(row.value(1))?;
    Some(ObjectName::new(text(row.value(0)).as_deref(), &name))
}

fn parse_objects(rows: &RowSet) -> Vec<SchemaObject> {
    rows.rows()
        .filter_map(|row| {
            let kind = object_kind(&text(row.value(2))?)?;
            Some(SchemaObject {
                name: object_name(&row)?,
                kind,
            })
        })
        .collect()
}

/// The resolved name and `is_table` flag of a table query.
fn parse_table(rows: &RowSet) -> Option<(ObjectName, bool)> {
    let row = rows.first()?;
    Some((object_name(&row)?, flag(row.value(2))))
}

fn parse_columns(dialect: Dialect, rows: &RowSet) -> Vec<ColumnMetadata> {
    rows.rows()
        .filter_map(|row| {
            let name = text(row.value(0))?;
            let type_name = text(row.value(1)).unwrap_or_default();
            let mut column = ColumnMetadata::new(dialect, name, type_name);
            column.is_nullable = flag(row.value(2));
            column.is_identity = flag(row.value(3));
            column.is_computed = flag(row.value(4));
            column.is_primary_key = flag(row.value(5));
            column.max_length = number(row.value(6));
            column.precision = number(row.value(7));
            column.scale = number(row.value(8));
            Some(column)
        })
        .collect()
}

fn parse_indexes(table: &ObjectName, rows: &RowSet) -> Vec<IndexMetadata> {
    let mut indexes: Vec<IndexMetadata> = Vec::new();
    for row in rows.rows() {
        let (Some(name), Some(column)) = (text(row.value(0)), text(row.value(3))) else {
            continue;
        };
        let column = IndexColumn {
            name: column,
            is_descending: flag(row.value(4)),
        };
        match indexes.iter_mut().find(|i| i.name == name) {
            Some(index) => index.columns.push(column),
            None => indexes.push(IndexMetadata {
                table: table.clone(),
                name,
                is_unique: flag(row.value(1)),
                is_primary_key: flag(row.value(2)),
                columns: vec![column],
            }),
        }
    }
    indexes
}

fn parse_parameters(dialect: Dialect, rows: &RowSet) -> Vec<ParameterMetadata> {
    rows.rows()
        .filter_map(|row| {
            let name = text(row.value(0))?;
            let type_name = text(row.value(1)).unwrap_or_default();
            let direction = text(row.value(2))
                .map_or(ParameterDirection::In, |mode| ParameterDirection::parse(&mode));
            Some(ParameterMetadata::new(dialect, name, type_name).with_direction(direction))
        })
        .collect()
}

/// Parameters every per-object query takes.
fn name_parameters(name: &ObjectName) -> Vec<Parameter> {
    vec![
        Parameter::new(
            "@Schema",
            name.schema().map(str::to_string),
            ParameterOrigin::Filter,
        ),
        Parameter::new("@Name", name.name(), ParameterOrigin::Filter),
    ]
}

/// Runs introspection queries through a blocking driver.
///
/// Every request opens its own connection.
pub struct DriverSchemaSource<D: Driver> {
    driver: Arc<D>,
    dialect: Dialect,
}

impl<D: Driver> DriverSchemaSource<D> {
    /// Creates a source for `dialect`.
    pub const fn new(driver: Arc<D>, dialect: Dialect) -> Self {
        Self { driver, dialect }
    }

    fn queries(&self) -> Result<&'static IntrospectionQueries> {
        self.dialect
            .introspection()
            .ok_or_else(|| self.dialect.unsupported("schema introspection"))
    }

    fn query(&self, sql: &str, parameters: &[Parameter]) -> Result<RowSet> {
        debug!(dialect = %self.dialect, sql, "running introspection query");
        let mut connection = self.driver.open_connection()?;
        connection.execute_reader(&Command::new(sql, parameters))
    }

    fn routine_parameters(&self, name: &ObjectName) -> Result<Vec<ParameterMetadata>> {
        let queries = self.queries()?;
        let rows = self.query(queries.parameters, &name_parameters(name))?;
        Ok(parse_parameters(self.dialect, &rows))
    }

    fn routine(&self, name: &ObjectName, kind: ObjectKind) -> Result<Option<ObjectName>> {
        let queries = self.queries()?;
        if queries.routine.is_empty() {
            return Err(self.dialect.unsupported(kind.to_string()));
        }
        let rows = self.query(queries.routine, &name_parameters(name))?;
        Ok(parse_objects(&rows)
            .into_iter()
            .find(|o| o.kind == kind)
            .map(|o| o.name))
    }
}

impl<D: Driver> fmt::Debug for DriverSchemaSource<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverSchemaSource")
            .field("dialect", &self.dialect)
            .finish_non_exhaustive()
    }
}

impl<D: Driver> SchemaSource for DriverSchemaSource<D> {
    fn list_objects(&self) -> Result<Vec<SchemaObject>> {
        let queries = self.queries()?;
        Ok(parse_objects(&self.query(queries.objects, &[])?))
    }

    fn load_table_or_view(&self, name: &ObjectName) -> Result<Option<TableOrViewMetadata>> {
        let queries = self.queries()?;
        let Some((resolved, is_table)) =
            parse_table(&self.query(queries.table, &name_parameters(name))?)
        else {
            return Ok(None);
        };
        let rows = self.query(queries.columns, &name_parameters(&resolved))?;
        let columns = parse_columns(self.dialect, &rows);
        Ok(Some(TableOrViewMetadata::new(
            self.dialect,
            resolved,
            is_table,
            columns,
        )))
    }

    fn load_indexes(&self, table: &ObjectName) -> Result<Vec<IndexMetadata>> {
        let queries = self.queries()?;
        let rows = self.query(queries.indexes, &name_parameters(table))?;
        Ok(parse_indexes(table, &rows))
    }

    fn load_stored_procedure(&self, name: &ObjectName) -> Result<Option<StoredProcedureMetadata>> {
        let Some(resolved) = self.routine(name, ObjectKind::StoredProcedure)? else {
            return Ok(None);
        };
        let parameters = self.routine_parameters(&resolved)?;
        Ok(Some(StoredProcedureMetadata::new(
            self.dialect,
            resolved,
            parameters,
        )))
    }

    fn load_table_function(&self, name: &ObjectName) -> Result<Option<TableFunctionMetadata>> {
        let queries = self.queries()?;
        if queries.function_columns.is_empty() {
            return Err(self.dialect.unsupported("table functions"));
        }
        let Some(resolved) = self.routine(name, ObjectKind::TableFunction)? else {
            return Ok(None);
        };
        let parameters = self
            .routine_parameters(&resolved)?
            .into_iter()
            .filter(|p| p.direction != ParameterDirection::Out)
            .collect();
        let rows = self.query(queries.function_columns, &name_parameters(&resolved))?;
        let columns = parse_columns(self.dialect, &rows);
        Ok(Some(TableFunctionMetadata::new(
            self.dialect,
            resolved,
            parameters,
            columns,
        )))
    }
}

/// Descriptors held in memory.
///
/// Lookups match the schema exactly first, then fall back to a match where
/// either side has no schema.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaSource {
    tables: Vec<TableOrViewMetadata>,
    indexes: Vec<IndexMetadata>,
    procedures: Vec<StoredProcedureMetadata>,
    functions: Vec<TableFunctionMetadata>,
}

fn lookup<'a, T>(
    items: &'a [T],
    name: &ObjectName,
    name_of: impl Fn(&T) -> &ObjectName,
) -> Option<&'a T> {
    items.iter().find(|item| name_of(item) == name).or_else(|| {
        items.iter().find(|item| {
            let candidate = name_of(item);
            (candidate.schema().is_none() || name.schema().is_none())
                && candidate.name().eq_ignore_ascii_case(name.name())
        })
    })
}

impl StaticSchemaSource {
    /// An empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table or view.
    #[must_use]
    pub fn with_table(mut self, table: TableOrViewMetadata) -> Self {
        self.tables.push(table);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn with_index(mut self, index: IndexMetadata) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a stored procedure.
    #[must_use]
    pub fn with_procedure(mut self, procedure: StoredProcedureMetadata) -> Self {
        self.procedures.push(procedure);
        self
    }

    /// Adds a table-valued function.
    #[must_use]
    pub fn with_function(mut self, function: TableFunctionMetadata) -> Self {
        self.functions.push(function);
        self
    }

    /// Number of tables and views.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

impl SchemaSource for StaticSchemaSource {
    fn list_objects(&self) -> Result<Vec<SchemaObject>> {
        let tables = self.tables.iter().map(|t| SchemaObject {
            name: t.name().clone(),
            kind: if t.is_table() {
                ObjectKind::Table
            } else {
                ObjectKind::View
            },
        });
        let procedures = self.procedures.iter().map(|p| SchemaObject {
            name: p.name.clone(),
            kind: ObjectKind::StoredProcedure,
        });
        let functions = self.functions.iter().map(|f| SchemaObject {
            name: f.name.clone(),
            kind: ObjectKind::TableFunction,
        });
        Ok(tables.chain(procedures).chain(functions).collect())
    }

    fn load_table_or_view(&self, name: &ObjectName) -> Result<Option<TableOrViewMetadata>> {
        Ok(lookup(&self.tables, name, TableOrViewMetadata::name).cloned())
    }

    fn load_indexes(&self, table: &ObjectName) -> Result<Vec<IndexMetadata>> {
        let Some(resolved) = lookup(&self.tables, table, TableOrViewMetadata::name) else {
            return Ok(Vec::new());
        };
        Ok(self
            .indexes
            .iter()
            .filter(|i| &i.table == resolved.name())
            .cloned()
            .collect())
    }

    fn load_stored_procedure(&self, name: &ObjectName) -> Result<Option<StoredProcedureMetadata>> {
        Ok(lookup(&self.procedures, name, |p| &p.name).cloned())
    }

    fn load_table_function(&self, name: &ObjectName) -> Result<Option<TableFunctionMetadata>> {
        Ok(lookup(&self.functions, name, |f| &f.name).cloned())
    }
}

/// Loads every table, view and index over an async connection.
///
/// Stored procedures and functions are not part of the snapshot; for
/// dialects that have them, use a [`DriverSchemaSource`].
pub async fn load_schema_snapshot<C: AsyncConnection + ?Sized>(
    connection: &mut C,
    dialect: Dialect,
) -> Result<StaticSchemaSource> {
    let queries = dialect
        .introspection()
        .ok_or_else(|| dialect.unsupported("schema introspection"))?;
    let objects = parse_objects(
        &connection
            .execute_reader(&Command::new(queries.objects, &[]))
            .await?,
    );

    let mut snapshot = StaticSchemaSource::new();
    for object in objects {
        if !matches!(object.kind, ObjectKind::Table | ObjectKind::View) {
            continue;
        }
        let parameters = name_parameters(&object.name);
        let columns = connection
            .execute_reader(&Command::new(queries.columns, &parameters))
            .await?;
        let indexes = connection
            .execute_reader(&Command::new(queries.indexes, &parameters))
            .await?;
        for index in parse_indexes(&object.name, &indexes) {
            snapshot = snapshot.with_index(index);
        }
        snapshot = snapshot.with_table(TableOrViewMetadata::new(
            dialect,
            object.name,
            object.kind == ObjectKind::Table,
            parse_columns(dialect, &columns),
        ));
    }
    debug!(dialect = %dialect, tables = snapshot.table_count(), "loaded schema snapshot");
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    fn row_set(columns: &[&str], rows: Vec<Vec<SqlValue>>) -> RowSet {
        RowSet::new(columns.iter().map(|c| (*c).to_string()).collect(), rows)
    }

    #[test]
    fn test_parse_columns() {
        let rows = row_set(
            &[
                "column_name",
                "type_name",
                "is_nullable",
                "is_identity",
                "is_computed",
                "is_primary_key",
                "max_length",
                "precision",
                "scale",
            ],
            vec![
                vec![
                    t("Id"),
                    t("int"),
                    SqlValue::Int(0),
                    SqlValue::Int(1),
                    SqlValue::Int(0),
                    SqlValue::Int(1),
                    SqlValue::Int(4),
                    SqlValue::Int(10),
                    SqlValue::Int(0),
                ],
                vec![
                    t("Name"),
                    t("nvarchar"),
                    SqlValue::Bool(true),
                    SqlValue::Bool(false),
                    SqlValue::Bool(false),
                    SqlValue::Bool(false),
                    SqlValue::Int(100),
                    SqlValue::Null,
                    SqlValue::Null,
                ],
            ],
        );
        let columns = parse_columns(Dialect::SqlServer, &rows);
        assert_eq!(columns.len(), 2);
        assert!(columns[0].is_identity && columns[0].is_primary_key);
        assert!(!columns[0].is_nullable);
        assert_eq!(columns[1].max_length, Some(100));
        assert_eq!(columns[1].precision, None);
    }

    #[test]
    fn test_parse_indexes_groups_columns() {
        let table = ObjectName::new(Some("dbo"), "Order");
        let yes = SqlValue::Bool(true);
        let no = SqlValue::Bool(false);
        let rows = row_set(
            &["index_name", "is_unique", "is_primary_key", "column_name", "is_descending"],
            vec![
                vec![t("PK_Order"), yes.clone(), yes.clone(), t("Id"), no.clone()],
                vec![t("IX_Date"), no.clone(), no.clone(), t("CustomerId"), no.clone()],
                vec![t("IX_Date"), no.clone(), no, t("OrderDate"), yes],
            ],
        );
        let indexes = parse_indexes(&table, &rows);
        assert_eq!(indexes.len(), 2);
        assert!(indexes[0].is_primary_key);
        assert_eq!(indexes[1].columns.len(), 2);
        assert!(indexes[1].columns[1].is_descending);
    }

    #[test]
    fn test_static_lookup_falls_back_on_schema() {
        let source = StaticSchemaSource::new().with_table(TableOrViewMetadata::new(
            Dialect::SqlServer,
            ObjectName::new(Some("dbo"), "Customer"),
            true,
            Vec::new(),
        ));
        let exact = source
            .load_table_or_view(&ObjectName::new(Some("DBO"), "customer"))
            .unwrap();
        assert!(exact.is_some());
        let unqualified = source
            .load_table_or_view(&ObjectName::new(None, "Customer"))
            .unwrap();
        assert!(unqualified.is_some());
        let other_schema = source
            .load_table_or_view(&ObjectName::new(Some("sales"), "Customer"))
            .unwrap();
        assert!(other_schema.is_none());
    }

    #[test]
    fn test_object_kinds() {
        let rows = row_set(
            &["schema_name", "object_name", "object_type"],
            vec![
                vec![SqlValue::Null, t("Customer"), t("TABLE")],
                vec![SqlValue::Null, t("Active"), t("VIEW")],
                vec![SqlValue::Null, t("odd"), t("SEQUENCE")],
            ],
        );
        let objects = parse_objects(&rows);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].kind, ObjectKind::View);
    }
}
