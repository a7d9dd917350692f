//! Schema metadata: immutable descriptors of tables, views, columns,
//! indexes, stored procedures and table functions.
//!
//! Descriptors are produced by a [`SchemaSource`] and owned by the
//! [`MetadataCache`]; command builders only ever borrow them.

mod cache;
mod source;

pub use cache::MetadataCache;
pub use source::{
    load_schema_snapshot, DriverSchemaSource, IntrospectionQueries, SchemaObject, SchemaSource,
    StaticSchemaSource,
};

use crate::dialect::Dialect;
use crate::name::ObjectName;

/// Database type vocabulary shared by all dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    /// Boolean or bit.
    Boolean,
    /// 8-bit integer.
    TinyInt,
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    BigInt,
    /// Exact numeric.
    Decimal,
    /// Currency.
    Money,
    /// Single precision float.
    Real,
    /// Double precision float.
    Double,
    /// Fixed-length character data.
    Char,
    /// Variable-length character data.
    VarChar,
    /// Fixed-length Unicode character data.
    NChar,
    /// Variable-length Unicode character data.
    NVarChar,
    /// Unbounded text.
    Text,
    /// Fixed-length binary data.
    Binary,
    /// Variable-length binary data.
    VarBinary,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time.
    DateTime,
    /// Date and time with offset.
    DateTimeOffset,
    /// UUID.
    Guid,
    /// XML document.
    Xml,
    /// JSON document.
    Json,
}

/// Rust-side value category a column maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `bool`
    Bool,
    /// `i64` and narrower integers.
    Integer,
    /// `f64`
    Float,
    /// Exact decimal carried as text.
    Decimal,
    /// `String`
    Text,
    /// `Vec<u8>`
    Bytes,
    /// `chrono::NaiveDate`
    Date,
    /// `chrono::NaiveTime`
    Time,
    /// `chrono::NaiveDateTime`
    Timestamp,
    /// `chrono::DateTime<FixedOffset>`
    TimestampWithOffset,
    /// UUID carried as text.
    Uuid,
}

/// Column descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    /// Raw database identifier.
    pub sql_name: String,
    /// `sql_name` quoted for the dialect.
    pub quoted_sql_name: String,
    /// Identifier-safe property name derived from `sql_name`.
    pub clr_name: String,
    /// Type name as reported by the database.
    pub type_name: String,
    /// Mapped database type; `None` when the type name is unknown.
    pub db_type: Option<DbType>,
    /// Rust-side value category; `None` when the type name is unknown.
    pub value_kind: Option<ValueKind>,
    /// Column accepts NULL.
    pub is_nullable: bool,
    /// Part of the primary key.
    pub is_primary_key: bool,
    /// Value generated by the database on insert.
    pub is_identity: bool,
    /// Value computed by the database.
    pub is_computed: bool,
    /// Maximum length for character and binary types.
    pub max_length: Option<i32>,
    /// Numeric precision.
    pub precision: Option<i32>,
    /// Numeric scale.
    pub scale: Option<i32>,
}

impl ColumnMetadata {
    /// Creates a nullable, non-key column of the given type.
    pub fn new(dialect: Dialect, sql_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let sql_name = sql_name.into();
        let type_name = type_name.into();
        let db_type = dialect.sql_type_name_to_db_type(&type_name);
        Self {
            quoted_sql_name: dialect.quote_identifier(&sql_name),
            clr_name: clr_name(&sql_name),
            sql_name,
            type_name,
            db_type,
            value_kind: db_type.map(Dialect::to_value_kind),
            is_nullable: true,
            is_primary_key: false,
            is_identity: false,
            is_computed: false,
            max_length: None,
            precision: None,
            scale: None,
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    /// Marks the column as part of the primary key (implies NOT NULL).
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }

    /// Marks the column as database-generated on insert.
    #[must_use]
    pub const fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }

    /// Marks the column as computed.
    #[must_use]
    pub const fn computed(mut self) -> Self {
        self.is_computed = true;
        self
    }

    /// Sets the maximum length.
    #[must_use]
    pub const fn max_length(mut self, len: i32) -> Self {
        self.max_length = Some(len);
        self
    }

    /// Sets numeric precision and scale.
    #[must_use]
    pub const fn precision(mut self, precision: i32, scale: i32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// True when the column matches `name` by SQL name or property name.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        let name = name.trim_start_matches(['@', ':', '$']);
        self.sql_name.eq_ignore_ascii_case(name) || self.clr_name.eq_ignore_ascii_case(name)
    }

    /// The column can receive a value on insert or update.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        !self.is_identity && !self.is_computed
    }
}

/// Derives an identifier-safe name from a raw column name.
///
/// Characters other than ASCII letters, digits and `_` are dropped and the
/// result is prefixed with `_` when it would not start with a letter or `_`.
#[must_use]
pub fn clr_name(sql_name: &str) -> String {
    let cleaned: String = sql_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    match cleaned.chars().next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => cleaned,
        _ => format!("_{cleaned}"),
    }
}

/// Table or view descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOrViewMetadata {
    name: ObjectName,
    quoted_name: String,
    is_table: bool,
    columns: Vec<ColumnMetadata>,
}

impl TableOrViewMetadata {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(dialect: Dialect, name: ObjectName, is_table: bool, columns: Vec<ColumnMetadata>) -> Self {
        Self {
            quoted_name: dialect.quote_object_name(&name),
            name,
            is_table,
            columns,
        }
    }

    /// The normalized name.
    #[must_use]
    pub const fn name(&self) -> &ObjectName {
        &self.name
    }

    /// The name quoted for the dialect.
    #[must_use]
    pub fn quoted_name(&self) -> &str {
        &self.quoted_name
    }

    /// True for base tables, false for views.
    #[must_use]
    pub const fn is_table(&self) -> bool {
        self.is_table
    }

    /// Columns in ordinal order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    /// Finds a column by SQL name or property name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.matches(name))
    }

    /// Primary key columns in ordinal order.
    pub fn primary_keys(&self) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.iter().filter(|c| c.is_primary_key)
    }

    /// The identity column, if any.
    #[must_use]
    pub fn identity_column(&self) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.is_identity)
    }
}

/// A column taking part in an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    /// Column name.
    pub name: String,
    /// Sorted descending.
    pub is_descending: bool,
}

/// Index descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    /// Table the index belongs to.
    pub table: ObjectName,
    /// Index name.
    pub name: String,
    /// Enforces uniqueness.
    pub is_unique: bool,
    /// Backs the primary key.
    pub is_primary_key: bool,
    /// Key columns in index order.
    pub columns: Vec<IndexColumn>,
}

/// Direction of a routine parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParameterDirection {
    /// Input only.
    #[default]
    In,
    /// Output only.
    Out,
    /// Input and output.
    InOut,
}

impl ParameterDirection {
    /// Parses the mode reported by introspection (`IN`, `OUT`, `INOUT`).
    #[must_use]
    pub fn parse(mode: &str) -> Self {
        match mode.trim().to_ascii_uppercase().as_str() {
            "OUT" => Self::Out,
            "INOUT" | "IN OUT" => Self::InOut,
            _ => Self::In,
        }
    }
}

/// Stored procedure or function parameter descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterMetadata {
    /// Name as declared, including any prefix such as `@`.
    pub sql_name: String,
    /// Identifier-safe name used for argument matching.
    pub clr_name: String,
    /// Type name as reported by the database.
    pub type_name: String,
    /// Mapped database type.
    pub db_type: Option<DbType>,
    /// Direction.
    pub direction: ParameterDirection,
}

impl ParameterMetadata {
    /// Creates an input parameter.
    pub fn new(dialect: Dialect, sql_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let sql_name = sql_name.into();
        let type_name = type_name.into();
        Self {
            clr_name: clr_name(sql_name.trim_start_matches('@')),
            db_type: dialect.sql_type_name_to_db_type(&type_name),
            sql_name,
            type_name,
            direction: ParameterDirection::In,
        }
    }

    /// Sets the direction.
    #[must_use]
    pub const fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    /// True when the parameter matches `name` by declared or property name.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        let bare = name.trim_start_matches(['@', ':', '$']);
        self.sql_name.trim_start_matches('@').eq_ignore_ascii_case(bare)
            || self.clr_name.eq_ignore_ascii_case(bare)
    }
}

/// Stored procedure descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProcedureMetadata {
    /// The normalized name.
    pub name: ObjectName,
    /// The name quoted for the dialect.
    pub quoted_name: String,
    /// Parameters in ordinal order.
    pub parameters: Vec<ParameterMetadata>,
}

impl StoredProcedureMetadata {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(dialect: Dialect, name: ObjectName, parameters: Vec<ParameterMetadata>) -> Self {
        Self {
            quoted_name: dialect.quote_object_name(&name),
            name,
            parameters,
        }
    }
}

/// Table-valued function descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFunctionMetadata {
    /// The normalized name.
    pub name: ObjectName,
    /// The name quoted for the dialect.
    pub quoted_name: String,
    /// Parameters in ordinal order.
    pub parameters: Vec<ParameterMetadata>,
    /// Result columns.
    pub columns: Vec<ColumnMetadata>,
}

impl TableFunctionMetadata {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(
        dialect: Dialect,
        name: ObjectName,
        parameters: Vec<ParameterMetadata>,
        columns: Vec<ColumnMetadata>,
    ) -> Self {
        Self {
            quoted_name: dialect.quote_object_name(&name),
            name,
            parameters,
            columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clr_name() {
        assert_eq!(clr_name("FirstName"), "FirstName");
        assert_eq!(clr_name("First Name"), "FirstName");
        assert_eq!(clr_name("2ndAddress"), "_2ndAddress");
        assert_eq!(clr_name("Order-Total$"), "OrderTotal");
        assert_eq!(clr_name("_id"), "_id");
        assert_eq!(clr_name("%"), "_");
    }

    #[test]
    fn test_column_builder() {
        let col = ColumnMetadata::new(Dialect::SqlServer, "Customer Id", "int")
            .primary_key()
            .identity();
        assert_eq!(col.quoted_sql_name, "[Customer Id]");
        assert_eq!(col.clr_name, "CustomerId");
        assert_eq!(col.db_type, Some(DbType::Int));
        assert_eq!(col.value_kind, Some(ValueKind::Integer));
        assert!(!col.is_nullable);
        assert!(!col.is_writable());
        assert!(col.matches("customer id"));
        assert!(col.matches("@CUSTOMERID"));
    }

    #[test]
    fn test_unknown_type_is_untyped() {
        let col = ColumnMetadata::new(Dialect::PostgreSql, "shape", "geometry");
        assert_eq!(col.db_type, None);
        assert_eq!(col.value_kind, None);
    }

    #[test]
    fn test_table_lookup() {
        let table = TableOrViewMetadata::new(
            Dialect::Sqlite,
            ObjectName::new(None, "Customer"),
            true,
            vec![
                ColumnMetadata::new(Dialect::Sqlite, "Id", "INTEGER").primary_key(),
                ColumnMetadata::new(Dialect::Sqlite, "Name", "TEXT"),
            ],
        );
        assert_eq!(table.quoted_name(), "\"Customer\"");
        assert_eq!(table.primary_keys().count(), 1);
        assert!(table.column("NAME").is_some());
        assert!(table.column("Missing").is_none());
    }

    #[test]
    fn test_parameter_direction() {
        assert_eq!(ParameterDirection::parse("in"), ParameterDirection::In);
        assert_eq!(ParameterDirection::parse("INOUT"), ParameterDirection::InOut);
        assert_eq!(ParameterDirection::parse("OUT"), ParameterDirection::Out);
        let p = ParameterMetadata::new(Dialect::SqlServer, "@CustomerId", "int");
        assert!(p.matches("customerid"));
        assert_eq!(p.clr_name, "CustomerId");
    }
}
