//! SQL dialect support.
//!
//! Every supported engine is a variant of [`Dialect`]. Capability queries
//! (quoting, placeholders, paging, upsert strategy, type mapping) are pure
//! functions of the variant; statement assembly matches on the variant and
//! calls into the dialect's module.

mod access;
mod follow_up;
mod mysql;
mod postgres;
mod returning;
mod sql_server;
mod sqlite;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::builder::{Fragment, LimitOption, Parameter, SqlBuilder};
use crate::command::{Returning, SelectPlan, WritePlan};
use crate::error::{Result, WeaveError};
use crate::metadata::{
    DbType, IntrospectionQueries, StoredProcedureMetadata, TableFunctionMetadata, ValueKind,
};
use crate::name::ObjectName;
use crate::token::{ExecutionMode, ExecutionToken, TokenChain};

/// A database engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Microsoft SQL Server (T-SQL).
    SqlServer,
    /// PostgreSQL.
    #[serde(rename = "postgresql", alias = "postgres")]
    PostgreSql,
    /// MySQL and MariaDB.
    #[serde(rename = "mysql", alias = "mariadb")]
    MySql,
    /// SQLite.
    Sqlite,
    /// Microsoft Access (Jet/ACE).
    Access,
}

/// How parameters appear in command text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// The parameter name, e.g. `@Name`.
    Named,
    /// `$1`, `$2`, ... in emission order.
    Numbered,
    /// `?` in emission order.
    Positional,
}

/// How an upsert is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStrategy {
    /// `MERGE` statement.
    Merge,
    /// `INSERT ... ON CONFLICT DO UPDATE`.
    OnConflict,
    /// `INSERT ... ON DUPLICATE KEY UPDATE`.
    OnDuplicateKey,
    /// Update by key, then insert when nothing was updated.
    UpdateThenInsert,
}

impl Dialect {
    /// All dialects.
    pub const ALL: [Self; 5] = [
        Self::SqlServer,
        Self::PostgreSql,
        Self::MySql,
        Self::Sqlite,
        Self::Access,
    ];

    /// Returns the name of the dialect.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SqlServer => "SQL Server",
            Self::PostgreSql => "PostgreSQL",
            Self::MySql => "MySQL",
            Self::Sqlite => "SQLite",
            Self::Access => "Access",
        }
    }

    /// Quotes an identifier, escaping the closing quote by doubling it.
    #[must_use]
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Self::SqlServer | Self::Access => format!("[{}]", name.replace(']', "]]")),
            Self::MySql => format!("`{}`", name.replace('`', "``")),
            Self::PostgreSql | Self::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Quotes a column name.
    #[must_use]
    pub fn quote_column_name(self, name: &str) -> String {
        self.quote_identifier(name)
    }

    /// Quotes a possibly schema-qualified object name.
    ///
    /// Access has no schemas, so only the object part is emitted there.
    #[must_use]
    pub fn quote_object_name(self, name: &ObjectName) -> String {
        match (self, name.schema()) {
            (Self::Access, _) | (_, None) => self.quote_identifier(name.name()),
            (_, Some(schema)) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(name.name())
            ),
        }
    }

    /// Schema used for unqualified names.
    #[must_use]
    pub const fn default_schema(self) -> Option<&'static str> {
        match self {
            Self::SqlServer => Some("dbo"),
            Self::PostgreSql => Some("public"),
            Self::MySql | Self::Sqlite | Self::Access => None,
        }
    }

    /// Returns the parameter placeholder style.
    #[must_use]
    pub const fn placeholder_style(self) -> PlaceholderStyle {
        match self {
            Self::SqlServer => PlaceholderStyle::Named,
            Self::PostgreSql => PlaceholderStyle::Numbered,
            Self::MySql | Self::Sqlite | Self::Access => PlaceholderStyle::Positional,
        }
    }

    /// Returns how upserts are expressed.
    #[must_use]
    pub const fn upsert_strategy(self) -> UpsertStrategy {
        match self {
            Self::SqlServer => UpsertStrategy::Merge,
            Self::PostgreSql | Self::Sqlite => UpsertStrategy::OnConflict,
            Self::MySql => UpsertStrategy::OnDuplicateKey,
            Self::Access => UpsertStrategy::UpdateThenInsert,
        }
    }

    /// Returns whether the dialect supports the limit option.
    #[must_use]
    pub const fn supports_limit(self, option: LimitOption) -> bool {
        use LimitOption as L;
        match self {
            Self::SqlServer => true,
            Self::PostgreSql => matches!(
                option,
                L::None | L::Rows | L::RowsWithTies | L::RandomSamplePercentage
            ),
            Self::MySql | Self::Sqlite => {
                matches!(option, L::None | L::Rows | L::RandomSampleRows)
            }
            Self::Access => matches!(option, L::None | L::Rows | L::Percentage),
        }
    }

    /// Returns whether the limit option needs an ORDER BY.
    #[must_use]
    pub const fn requires_sorting(self, option: LimitOption) -> bool {
        option.has_ties()
    }

    /// Returns whether skipping rows needs an ORDER BY.
    #[must_use]
    pub const fn ordered_pagination(self) -> bool {
        matches!(self, Self::SqlServer | Self::PostgreSql)
    }

    /// Returns whether rows can be skipped at all.
    #[must_use]
    pub const fn supports_skip(self) -> bool {
        !matches!(self, Self::Access)
    }

    /// Returns whether random samples accept a repeatability seed.
    #[must_use]
    pub const fn supports_seed(self) -> bool {
        matches!(self, Self::SqlServer | Self::PostgreSql | Self::MySql)
    }

    /// Returns whether `COUNT(DISTINCT col)` is available.
    #[must_use]
    pub const fn supports_count_distinct(self) -> bool {
        !matches!(self, Self::Access)
    }

    /// Returns whether stored procedures can be called.
    #[must_use]
    pub const fn supports_stored_procedures(self) -> bool {
        !matches!(self, Self::Sqlite)
    }

    /// Returns whether table-valued functions can be queried.
    #[must_use]
    pub const fn supports_table_functions(self) -> bool {
        matches!(self, Self::SqlServer | Self::PostgreSql)
    }

    /// Maps a database type name to the shared type vocabulary.
    ///
    /// Length, precision and `unsigned` decorations are ignored. Unknown
    /// names map to `None`.
    #[must_use]
    pub fn sql_type_name_to_db_type(self, type_name: &str) -> Option<DbType> {
        let lowered = type_name.to_ascii_lowercase();
        let base = lowered
            .split('(')
            .next()
            .unwrap_or_default()
            .replace("unsigned", "");
        let base = base.trim();
        match self {
            Self::SqlServer => sql_server::db_type(base),
            Self::PostgreSql => postgres::db_type(base),
            Self::MySql => mysql::db_type(base),
            Self::Sqlite => sqlite::db_type(base),
            Self::Access => access::db_type(base),
        }
    }

    /// Maps a database type to the Rust-side value category.
    #[must_use]
    pub const fn to_value_kind(db_type: DbType) -> ValueKind {
        match db_type {
            DbType::Boolean => ValueKind::Bool,
            DbType::TinyInt | DbType::SmallInt | DbType::Int | DbType::BigInt => {
                ValueKind::Integer
            }
            DbType::Decimal | DbType::Money => ValueKind::Decimal,
            DbType::Real | DbType::Double => ValueKind::Float,
            DbType::Char
            | DbType::VarChar
            | DbType::NChar
            | DbType::NVarChar
            | DbType::Text
            | DbType::Xml
            | DbType::Json => ValueKind::Text,
            DbType::Binary | DbType::VarBinary => ValueKind::Bytes,
            DbType::Date => ValueKind::Date,
            DbType::Time => ValueKind::Time,
            DbType::DateTime => ValueKind::Timestamp,
            DbType::DateTimeOffset => ValueKind::TimestampWithOffset,
            DbType::Guid => ValueKind::Uuid,
        }
    }

    /// Schema introspection queries, or `None` when the engine cannot be
    /// introspected through SQL.
    #[must_use]
    pub const fn introspection(self) -> Option<&'static IntrospectionQueries> {
        match self {
            Self::SqlServer => Some(&sql_server::INTROSPECTION),
            Self::PostgreSql => Some(&postgres::INTROSPECTION),
            Self::MySql => Some(&mysql::INTROSPECTION),
            Self::Sqlite => Some(&sqlite::INTROSPECTION),
            Self::Access => None,
        }
    }

    pub(crate) fn unsupported(self, feature: impl Into<String>) -> WeaveError {
        WeaveError::unsupported(self.name(), feature)
    }

    pub(crate) fn build_select(self, plan: SelectPlan) -> Result<Fragment> {
        match self {
            Self::SqlServer => Ok(sql_server::select(plan)),
            Self::PostgreSql => Ok(postgres::select(plan)),
            Self::MySql => Ok(mysql::select(plan)),
            Self::Sqlite => Ok(sqlite::select(plan)),
            Self::Access => access::select(plan),
        }
    }

    pub(crate) fn build_insert(self, plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
        let chain = match self {
            Self::SqlServer => sql_server::insert(plan),
            Self::PostgreSql => returning::insert(plan, postgres::identity_override(plan)),
            Self::Sqlite => returning::insert(plan, ""),
            Self::MySql => mysql::insert(plan),
            Self::Access => access::insert(plan),
        }?;
        Ok(count_only(plan, chain))
    }

    pub(crate) fn build_update(self, plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
        let chain = match self {
            Self::SqlServer => sql_server::update(plan),
            Self::PostgreSql | Self::Sqlite => returning::update(plan),
            Self::MySql | Self::Access => follow_up::update(plan),
        }?;
        Ok(count_only(plan, chain))
    }

    pub(crate) fn build_delete(self, plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
        let chain = match self {
            Self::SqlServer => sql_server::delete(plan),
            Self::PostgreSql | Self::Sqlite => returning::delete(plan),
            Self::MySql | Self::Access => follow_up::delete(plan),
        }?;
        Ok(count_only(plan, chain))
    }

    pub(crate) fn build_upsert(self, plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
        let chain = match self.upsert_strategy() {
            UpsertStrategy::Merge => sql_server::upsert(plan),
            UpsertStrategy::OnConflict => returning::upsert(plan),
            UpsertStrategy::OnDuplicateKey => mysql::upsert(plan),
            UpsertStrategy::UpdateThenInsert => access::upsert(plan),
        }?;
        Ok(count_only(plan, chain))
    }

    pub(crate) fn build_procedure_call(
        self,
        procedure: &StoredProcedureMetadata,
        parameters: Vec<Parameter>,
    ) -> Result<ExecutionToken> {
        match self {
            Self::SqlServer | Self::Access => Ok(ExecutionToken::new(
                "ProcedureCall",
                procedure.quoted_name.clone(),
                parameters,
            )
            .stored_procedure()),
            Self::PostgreSql | Self::MySql => {
                let mut sql = Fragment::text(format!("CALL {}(", procedure.quoted_name));
                sql.append(Fragment::join(parameters.into_iter().map(Fragment::param), ", "));
                sql.push_str(");");
                sql.into_token(self, "ProcedureCall")
            }
            Self::Sqlite => Err(self.unsupported("stored procedures")),
        }
    }

    pub(crate) fn build_function_source(
        self,
        function: &TableFunctionMetadata,
        parameters: Vec<Parameter>,
    ) -> Result<Fragment> {
        if !self.supports_table_functions() {
            return Err(self.unsupported("table functions"));
        }
        let mut source = Fragment::text(format!("{}(", function.quoted_name));
        source.append(Fragment::join(parameters.into_iter().map(Fragment::param), ", "));
        source.push_str(")");
        Ok(source)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Appends ` WHERE predicate` when there is one.
fn push_where(sql: &mut Fragment, predicate: Option<Fragment>) {
    if let Some(predicate) = predicate {
        sql.push_str(" WHERE ");
        sql.append(predicate);
    }
}

/// `SELECT <read columns> FROM <table> [WHERE predicate];`
fn select_statement(builder: &SqlBuilder<'_>, predicate: Option<Fragment>) -> Fragment {
    let mut sql = Fragment::text(format!(
        "SELECT {} FROM {}",
        builder.build_select_clause(None),
        builder.quoted_name()
    ));
    push_where(&mut sql, predicate);
    sql.push_str(";");
    sql
}

/// `INSERT INTO <table> (<columns>)<infix> VALUES (<values>)` without a
/// terminator.
/// A write that reads nothing back hands its row count to the
/// materializer instead of a scalar or an empty reader.
fn count_only(plan: &WritePlan<'_, '_>, chain: TokenChain) -> TokenChain {
    if plan.returning != Returning::None {
        return chain;
    }
    TokenChain::new(
        chain
            .into_iter()
            .map(|token| match token.execution_mode {
                ExecutionMode::Materializer => token.with_mode(ExecutionMode::NonQuery),
                _ => token,
            })
            .collect(),
    )
}

fn insert_statement(builder: &SqlBuilder<'_>, infix: &str) -> Result<Fragment> {
    let (columns, values) = builder.build_insert_clause()?;
    let mut sql = Fragment::text(format!(
        "INSERT INTO {} ({columns}){infix} VALUES (",
        builder.quoted_name()
    ));
    sql.append(values);
    sql.push_str(")");
    Ok(sql)
}

/// `UPDATE <table> SET <assignments><infix> [WHERE predicate]` without a
/// terminator.
fn update_statement(
    builder: &SqlBuilder<'_>,
    predicate: Option<Fragment>,
    infix: &str,
) -> Result<Fragment> {
    let mut sql = Fragment::text(format!("UPDATE {} SET ", builder.quoted_name()));
    sql.append(builder.build_anonymous_set_clause()?);
    sql.push_str(infix);
    push_where(&mut sql, predicate);
    Ok(sql)
}

/// `DELETE FROM <table><infix> [WHERE predicate]` without a terminator.
fn delete_statement(builder: &SqlBuilder<'_>, predicate: Option<Fragment>, infix: &str) -> Fragment {
    let mut sql = Fragment::text(format!("DELETE FROM {}{infix}", builder.quoted_name()));
    push_where(&mut sql, predicate);
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_escaping() {
        assert_eq!(Dialect::SqlServer.quote_identifier("a]b"), "[a]]b]");
        assert_eq!(Dialect::MySql.quote_identifier("a`b"), "`a``b`");
        assert_eq!(Dialect::PostgreSql.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::Access.quote_identifier("Order Lines"), "[Order Lines]");
    }

    #[test]
    fn test_quote_object_name_round_trip() {
        let name = ObjectName::new(Some("sales"), "Order]Lines`\"x");
        for dialect in Dialect::ALL {
            let quoted = dialect.quote_object_name(&name);
            let parsed = ObjectName::parse(&quoted).unwrap();
            assert_eq!(parsed.name(), name.name(), "{dialect}");
            if dialect != Dialect::Access {
                assert_eq!(parsed, name, "{dialect}");
            }
        }
    }

    #[test]
    fn test_type_mapping() {
        assert_eq!(
            Dialect::SqlServer.sql_type_name_to_db_type("nvarchar(50)"),
            Some(DbType::NVarChar)
        );
        assert_eq!(
            Dialect::MySql.sql_type_name_to_db_type("INT UNSIGNED"),
            Some(DbType::Int)
        );
        assert_eq!(
            Dialect::PostgreSql.sql_type_name_to_db_type("timestamptz"),
            Some(DbType::DateTimeOffset)
        );
        assert_eq!(
            Dialect::Sqlite.sql_type_name_to_db_type("INTEGER"),
            Some(DbType::BigInt)
        );
        assert_eq!(Dialect::Access.sql_type_name_to_db_type("counter"), Some(DbType::Int));
        for dialect in Dialect::ALL {
            assert_eq!(dialect.sql_type_name_to_db_type("no_such_type"), None);
        }
    }

    #[test]
    fn test_limit_capabilities() {
        assert!(Dialect::SqlServer.supports_limit(LimitOption::PercentageWithTies));
        assert!(!Dialect::PostgreSql.supports_limit(LimitOption::Percentage));
        assert!(Dialect::PostgreSql.supports_limit(LimitOption::RowsWithTies));
        assert!(!Dialect::MySql.supports_limit(LimitOption::RowsWithTies));
        assert!(Dialect::Sqlite.supports_limit(LimitOption::RandomSampleRows));
        assert!(!Dialect::Access.supports_limit(LimitOption::RandomSampleRows));
        assert!(Dialect::SqlServer.requires_sorting(LimitOption::RowsWithTies));
        assert!(!Dialect::SqlServer.requires_sorting(LimitOption::Rows));
    }

    #[test]
    fn test_serde_names() {
        let dialect: Dialect = serde_json::from_str("\"sql_server\"").unwrap();
        assert_eq!(dialect, Dialect::SqlServer);
        let dialect: Dialect = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(dialect, Dialect::PostgreSql);
    }
}
