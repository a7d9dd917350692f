//! The SQL builder engine.
//!
//! A [`SqlBuilder`] is created per prepare call from a table's column
//! metadata. Passes over an argument value, a desired-column list and
//! options assign each column its roles, and the `build_*` methods emit the
//! parameterized fragments command builders assemble into statements.
//!
//! ```
//! use sqlweave_core::builder::SqlBuilder;
//! use sqlweave_core::metadata::ColumnMetadata;
//! use sqlweave_core::{ArgumentValue, Dialect};
//!
//! let columns = vec![
//!     ColumnMetadata::new(Dialect::SqlServer, "Id", "int").primary_key().identity(),
//!     ColumnMetadata::new(Dialect::SqlServer, "Name", "nvarchar"),
//! ];
//! let mut builder = SqlBuilder::new("[dbo].[Customer]", &columns, Dialect::SqlServer, false);
//! let argument: ArgumentValue = [("Id", 1), ("Name", 2)].into_iter().collect();
//! builder.apply_argument_value(&argument, false).unwrap();
//!
//! let (sql, params) = builder
//!     .build_anonymous_set_clause()
//!     .unwrap()
//!     .render(Dialect::SqlServer)
//!     .unwrap();
//! assert_eq!(sql, "[Name] = @Name");
//! assert_eq!(params.len(), 1);
//! ```

mod entry;
mod fragment;
mod options;

pub use entry::SqlBuilderEntry;
pub use fragment::{Fragment, Parameter, ParameterOrigin};
pub use options::{
    DeleteOptions, DesiredColumns, FilterOptions, InsertOptions, LimitOption, Limits,
    SortExpression, UpdateOptions, UpsertOptions,
};

use tracing::debug;

use crate::dialect::Dialect;
use crate::error::{Result, WeaveError};
use crate::metadata::{ColumnMetadata, TableOrViewMetadata};
use crate::record::ArgumentValue;
use crate::value::SqlValue;

/// Per-invocation builder computing column roles, parameters and fragments.
#[derive(Debug, Clone)]
pub struct SqlBuilder<'a> {
    quoted_name: String,
    dialect: Dialect,
    strict: bool,
    identity_insert: bool,
    key_inserts: bool,
    key_updates: bool,
    entries: Vec<SqlBuilderEntry<'a>>,
}

impl<'a> SqlBuilder<'a> {
    /// Creates a builder over `columns`.
    pub fn new(
        quoted_name: impl Into<String>,
        columns: &'a [ColumnMetadata],
        dialect: Dialect,
        strict: bool,
    ) -> Self {
        Self {
            quoted_name: quoted_name.into(),
            dialect,
            strict,
            identity_insert: false,
            key_inserts: false,
            key_updates: false,
            entries: columns.iter().map(SqlBuilderEntry::new).collect(),
        }
    }

    /// Creates a builder over a table or view.
    #[must_use]
    pub fn for_table(table: &'a TableOrViewMetadata, dialect: Dialect, strict: bool) -> Self {
        Self::new(table.quoted_name(), table.columns(), dialect, strict)
    }

    /// The quoted table name.
    #[must_use]
    pub fn quoted_name(&self) -> &str {
        &self.quoted_name
    }

    /// The target dialect.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Whether unmatched names are errors.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// One entry per column, in ordinal order.
    #[must_use]
    pub fn entries(&self) -> &[SqlBuilderEntry<'a>] {
        &self.entries
    }

    /// Binds an argument value to columns.
    ///
    /// Properties match columns by SQL name or property name, ignoring
    /// case. An unmatched property is skipped, or is a mapping error in
    /// strict mode. With `use_key_attribute` the argument's key-marked
    /// properties replace the primary key.
    pub fn apply_argument_value(
        &mut self,
        argument: &ArgumentValue,
        use_key_attribute: bool,
    ) -> Result<()> {
        let properties = argument.properties();
        if use_key_attribute {
            if !properties.iter().any(|p| p.is_key) {
                return Err(WeaveError::Mapping(format!(
                    "key attributes were requested for {} but the argument marks no key properties",
                    self.quoted_name
                )));
            }
            for entry in &mut self.entries {
                entry.is_key = false;
            }
        }

        for property in &properties {
            let Some(entry) = self
                .entries
                .iter_mut()
                .find(|e| e.column.matches(&property.name))
            else {
                if self.strict {
                    return Err(WeaveError::Mapping(format!(
                        "property '{}' does not match any column of {}",
                        property.name, self.quoted_name
                    )));
                }
                debug!(property = %property.name, table = %self.quoted_name, "ignoring unmatched property");
                continue;
            };
            entry.assign(property.value.clone(), ParameterOrigin::Argument);
            if use_key_attribute {
                entry.is_key = property.is_key;
            }
        }

        self.refresh_roles();
        Ok(())
    }

    /// Allows identity columns with a supplied value to be inserted.
    pub fn enable_identity_insert(&mut self) {
        self.identity_insert = true;
        self.refresh_roles();
    }

    /// Makes every key column with a supplied value insertable, identity
    /// keys included.
    pub fn insert_key_values(&mut self) {
        self.key_inserts = true;
        self.refresh_roles();
    }

    /// Allows key columns with a supplied value to be updated.
    pub fn allow_key_updates(&mut self) {
        self.key_updates = true;
        self.refresh_roles();
    }

    /// Designates `keys` as the key columns, replacing the primary key.
    pub fn override_keys(&mut self, keys: &[&str]) -> Result<()> {
        if keys.is_empty() {
            return Err(WeaveError::InvalidOperation(
                "at least one key column is required".into(),
            ));
        }
        for key in keys {
            if !self.entries.iter().any(|e| e.column.matches(key)) {
                return Err(WeaveError::Mapping(format!(
                    "key column '{key}' does not exist on {}",
                    self.quoted_name
                )));
            }
        }
        for entry in &mut self.entries {
            entry.is_key = keys.iter().any(|k| entry.column.matches(k));
        }
        self.refresh_roles();
        Ok(())
    }

    /// Replaces the update set with exactly `values`.
    ///
    /// Key values already bound from the argument are kept for the WHERE
    /// clause. Call this after every other pass.
    pub fn apply_update_values(
        &mut self,
        values: Vec<(String, SqlValue)>,
        origin: ParameterOrigin,
    ) -> Result<()> {
        for entry in &mut self.entries {
            entry.update = false;
        }
        for (name, value) in values {
            let entry = self
                .entries
                .iter_mut()
                .find(|e| e.column.matches(&name))
                .ok_or_else(|| {
                    WeaveError::Mapping(format!(
                        "column '{name}' does not exist on {}",
                        self.quoted_name
                    ))
                })?;
            entry.assign(value, origin);
            entry.update = true;
        }
        Ok(())
    }

    /// Binds a rule-supplied value, replacing any argument value for the
    /// same column. Returns false when the table has no such column.
    pub(crate) fn apply_audit_value(&mut self, column: &str, value: SqlValue) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.column.matches(column)) else {
            return false;
        };
        entry.assign(value, ParameterOrigin::Audit);
        self.refresh_roles();
        true
    }

    /// Clears the insert or update role of one column.
    pub(crate) fn restrict_roles(&mut self, column: &str, insert: bool, update: bool) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.column.matches(column)) {
            entry.insert &= insert;
            entry.update &= update;
        }
    }

    fn refresh_roles(&mut self) {
        for entry in &mut self.entries {
            let column = entry.column;
            entry.insert = entry.use_parameter
                && (column.is_writable()
                    || (self.identity_insert && column.is_identity)
                    || (self.key_inserts && entry.is_key && !column.is_computed));
            entry.update = entry.use_parameter
                && column.is_writable()
                && (!entry.is_key || self.key_updates);
        }
    }

    /// Marks the columns to read back.
    ///
    /// A requested column missing from the table is skipped, or is a
    /// mapping error in strict mode. A non-empty request matching nothing
    /// is always a mapping error.
    pub fn apply_desired_columns(&mut self, desired: &DesiredColumns) -> Result<()> {
        match desired {
            DesiredColumns::None => Ok(()),
            DesiredColumns::All => {
                for entry in &mut self.entries {
                    entry.read = true;
                }
                Ok(())
            }
            DesiredColumns::Named(names) if names.is_empty() => Ok(()),
            DesiredColumns::Named(names) => {
                let mut matched = 0;
                for name in names {
                    match self.entries.iter_mut().find(|e| e.column.matches(name)) {
                        Some(entry) => {
                            entry.read = true;
                            matched += 1;
                        }
                        None if self.strict => {
                            return Err(WeaveError::Mapping(format!(
                                "desired column '{name}' does not exist on {}",
                                self.quoted_name
                            )));
                        }
                        None => {
                            debug!(column = %name, table = %self.quoted_name, "ignoring unknown desired column");
                        }
                    }
                }
                if matched == 0 {
                    return Err(WeaveError::Mapping(format!(
                        "none of the desired columns [{}] exist on {}",
                        names.join(", "),
                        self.quoted_name
                    )));
                }
                Ok(())
            }
        }
    }

    /// Builds a conjunctive predicate from a filter object.
    ///
    /// Each property becomes `column = @Name` or `column IS NULL`. A filter
    /// that produces no predicate is a mapping error.
    pub fn apply_anonymous_filter_value(
        &self,
        filter: &ArgumentValue,
        options: FilterOptions,
    ) -> Result<Fragment> {
        let mut predicates = Vec::new();
        for property in filter.properties() {
            let Some(entry) = self.entries.iter().find(|e| e.column.matches(&property.name))
            else {
                if self.strict {
                    return Err(WeaveError::Mapping(format!(
                        "filter property '{}' does not match any column of {}",
                        property.name, self.quoted_name
                    )));
                }
                debug!(property = %property.name, table = %self.quoted_name, "ignoring unmatched filter property");
                continue;
            };
            let column = entry.column;
            if property.value.is_null() {
                if options.ignore_null_properties {
                    continue;
                }
                predicates.push(Fragment::text(format!("{} IS NULL", column.quoted_sql_name)));
            } else {
                let mut predicate = Fragment::text(format!("{} = ", column.quoted_sql_name));
                predicate.push_param(
                    Parameter::new(
                        format!("@{}", column.clr_name),
                        property.value,
                        ParameterOrigin::Filter,
                    )
                    .with_db_type(column.db_type),
                );
                predicates.push(predicate);
            }
        }
        if predicates.is_empty() {
            return Err(WeaveError::Mapping(format!(
                "the filter produced no predicate for {}",
                self.quoted_name
            )));
        }
        Ok(Fragment::join(predicates, " AND "))
    }

    /// Parameters for every bound argument value.
    #[must_use]
    pub fn get_parameters(&self) -> Vec<Parameter> {
        self.entries
            .iter()
            .filter(|e| e.use_parameter)
            .map(SqlBuilderEntry::parameter)
            .collect()
    }

    /// True when at least one column is read back.
    #[must_use]
    pub fn has_read_columns(&self) -> bool {
        self.entries.iter().any(|e| e.read)
    }

    /// Key columns in ordinal order.
    pub fn key_columns(&self) -> impl Iterator<Item = &'a ColumnMetadata> + '_ {
        self.entries.iter().filter(|e| e.is_key).map(|e| e.column)
    }

    /// True when every key column has a bound value.
    #[must_use]
    pub fn has_key_values(&self) -> bool {
        let mut keys = self.entries.iter().filter(|e| e.is_key).peekable();
        keys.peek().is_some() && keys.all(|e| e.use_parameter)
    }

    /// The read columns, each prefixed with `prefix` (e.g. `Inserted.`).
    #[must_use]
    pub fn build_select_clause(&self, prefix: Option<&str>) -> String {
        let prefix = prefix.unwrap_or_default();
        self.entries
            .iter()
            .filter(|e| e.read)
            .map(|e| format!("{prefix}{}", e.column.quoted_sql_name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `col = @Name, ...` for every update column.
    pub fn build_anonymous_set_clause(&self) -> Result<Fragment> {
        let assignments: Vec<Fragment> = self
            .entries
            .iter()
            .filter(|e| e.update)
            .map(|e| {
                let mut f = Fragment::text(format!("{} = ", e.column.quoted_sql_name));
                f.push_param(e.parameter());
                f
            })
            .collect();
        if assignments.is_empty() {
            return Err(WeaveError::Mapping(format!(
                "the argument has no updatable columns for {}",
                self.quoted_name
            )));
        }
        Ok(Fragment::join(assignments, ", "))
    }

    /// Key predicate `key = @Key AND ...` using values from the argument.
    pub fn build_anonymous_where_clause(&self) -> Result<Fragment> {
        let keys: Vec<&SqlBuilderEntry<'a>> = self.entries.iter().filter(|e| e.is_key).collect();
        if keys.is_empty() {
            return Err(WeaveError::Mapping(format!(
                "{} has no primary key; override the keys or mark key properties",
                self.quoted_name
            )));
        }
        let mut predicates = Vec::with_capacity(keys.len());
        for entry in keys {
            if !entry.use_parameter {
                return Err(WeaveError::Mapping(format!(
                    "the argument has no value for key column {} of {}",
                    entry.column.sql_name, self.quoted_name
                )));
            }
            let mut predicate = Fragment::text(format!("{} = ", entry.column.quoted_sql_name));
            predicate.push_param(entry.parameter());
            predicates.push(predicate);
        }
        Ok(Fragment::join(predicates, " AND "))
    }

    /// Key-list predicate: `key = @Param0` for one key, otherwise
    /// `key IN (@Param0, @Param1, ...)`.
    pub fn build_key_list_clause(&self, keys: &[SqlValue]) -> Result<Fragment> {
        let key_columns: Vec<&ColumnMetadata> = self.key_columns().collect();
        let column = match key_columns.as_slice() {
            [column] => *column,
            [] => {
                return Err(WeaveError::Mapping(format!(
                    "{} has no primary key",
                    self.quoted_name
                )))
            }
            _ => {
                return Err(WeaveError::Mapping(format!(
                    "{} has a composite key; key lists need a single key column",
                    self.quoted_name
                )))
            }
        };
        let param = |i: usize, value: &SqlValue| {
            Parameter::new(format!("@Param{i}"), value.clone(), ParameterOrigin::Key)
                .with_db_type(column.db_type)
        };
        match keys {
            [] => Err(WeaveError::InvalidOperation(
                "at least one key value is required".into(),
            )),
            [key] => {
                let mut f = Fragment::text(format!("{} = ", column.quoted_sql_name));
                f.push_param(param(0, key));
                Ok(f)
            }
            _ => {
                let mut f = Fragment::text(format!("{} IN (", column.quoted_sql_name));
                f.append(Fragment::join(
                    keys.iter()
                        .enumerate()
                        .map(|(i, key)| Fragment::param(param(i, key))),
                    ", ",
                ));
                f.push_str(")");
                Ok(f)
            }
        }
    }

    /// Insert column list and matching value fragment.
    pub fn build_insert_clause(&self) -> Result<(String, Fragment)> {
        let inserted: Vec<&SqlBuilderEntry<'a>> =
            self.entries.iter().filter(|e| e.insert).collect();
        if inserted.is_empty() {
            return Err(WeaveError::Mapping(format!(
                "the argument has no insertable columns for {}",
                self.quoted_name
            )));
        }
        let columns = inserted
            .iter()
            .map(|e| e.column.quoted_sql_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let values = Fragment::join(inserted.iter().map(|e| Fragment::param(e.parameter())), ", ");
        Ok((columns, values))
    }

    /// `ORDER BY ...` for the sort expressions, or an empty string.
    ///
    /// Unknown columns are always a mapping error.
    pub fn build_order_by_clause(&self, sorting: &[SortExpression]) -> Result<String> {
        if sorting.is_empty() {
            return Ok(String::new());
        }
        let mut terms = Vec::with_capacity(sorting.len());
        for sort in sorting {
            let entry = self
                .entries
                .iter()
                .find(|e| e.column.matches(&sort.column))
                .ok_or_else(|| {
                    WeaveError::Mapping(format!(
                        "sort column '{}' does not exist on {}",
                        sort.column, self.quoted_name
                    ))
                })?;
            terms.push(if sort.descending {
                format!("{} DESC", entry.column.quoted_sql_name)
            } else {
                entry.column.quoted_sql_name.clone()
            });
        }
        Ok(format!("ORDER BY {}", terms.join(", ")))
    }

    /// `ORDER BY` over the key columns, if there are any.
    #[must_use]
    pub fn build_key_order_by_clause(&self) -> Option<String> {
        let keys: Vec<&str> = self
            .key_columns()
            .map(|c| c.quoted_sql_name.as_str())
            .collect();
        if keys.is_empty() {
            None
        } else {
            Some(format!("ORDER BY {}", keys.join(", ")))
        }
    }
}
