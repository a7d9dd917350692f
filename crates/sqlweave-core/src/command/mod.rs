//! Command builders.
//!
//! Each operation is a small builder created from a [`CommandContext`]:
//! the context resolves the target's metadata up front, the builder
//! collects arguments and options, and [`CommandBuilder::prepare`] turns
//! the whole request into a [`TokenChain`] without touching the database.
//!
//! Preparing follows the same pipeline for every operation: validate the
//! request, run the [`SqlBuilder`] passes, assemble the dialect's SQL and
//! attach the row-count policy.

mod delete;
mod insert;
mod routine;
mod sql;
mod table;
mod update;
mod upsert;

pub use delete::{DeleteCommand, DeleteWithFilterCommand};
pub use insert::InsertCommand;
pub use routine::ProcedureCommand;
pub use sql::SqlCommand;
pub use table::{Aggregate, TableQuery};
pub use update::{UpdateCommand, UpdateSetCommand};
pub use upsert::UpsertCommand;

use std::sync::Arc;

use tracing::debug;

use crate::audit::AuditRules;
use crate::builder::{
    DeleteOptions, DesiredColumns, FilterOptions, Fragment, InsertOptions, Limits, Parameter,
    ParameterOrigin, SqlBuilder, UpdateOptions, UpsertOptions,
};
use crate::dialect::Dialect;
use crate::error::Result;
use crate::metadata::{MetadataCache, TableOrViewMetadata};
use crate::record::{ArgumentValue, Record};
use crate::settings::DataSourceSettings;
use crate::token::{RowCountCheck, TokenChain};
use crate::value::ToSqlValue;

/// Something that prepares a token chain.
pub trait CommandBuilder {
    /// Builds the chain for the columns the materializer wants back.
    fn prepare(&self, desired: &DesiredColumns) -> Result<TokenChain>;
}

/// Everything a command builder needs: metadata, audit rules and settings.
#[derive(Debug, Clone)]
pub struct CommandContext {
    cache: Arc<MetadataCache>,
    rules: Arc<AuditRules>,
    settings: Arc<DataSourceSettings>,
}

impl CommandContext {
    /// Creates a context.
    #[must_use]
    pub const fn new(
        cache: Arc<MetadataCache>,
        rules: Arc<AuditRules>,
        settings: Arc<DataSourceSettings>,
    ) -> Self {
        Self {
            cache,
            rules,
            settings,
        }
    }

    /// The target dialect.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.cache.dialect()
    }

    /// The metadata cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// The audit rules.
    #[must_use]
    pub fn rules(&self) -> &AuditRules {
        &self.rules
    }

    /// The settings.
    #[must_use]
    pub fn settings(&self) -> &DataSourceSettings {
        &self.settings
    }

    /// Whether strict mode is on.
    #[must_use]
    pub fn strict(&self) -> bool {
        self.settings.strict_mode
    }

    /// Queries a table or view.
    pub fn from(&self, table: &str) -> Result<TableQuery> {
        let table = self.cache.get_table_or_view(table)?;
        Ok(TableQuery::table(self.clone(), table))
    }

    /// Queries the table a record type maps to.
    pub fn from_record<R: Record>(&self) -> Result<TableQuery> {
        let table = self.cache.get_table_or_view_for::<R>()?;
        Ok(TableQuery::table(self.clone(), table))
    }

    /// Fetches one row by its primary key.
    pub fn get_by_key(&self, table: &str, key: impl ToSqlValue) -> Result<TableQuery> {
        Ok(self.from(table)?.with_keys(vec![key.to_sql_value()]))
    }

    /// Fetches rows by a list of primary key values.
    pub fn get_by_keys<K: ToSqlValue>(
        &self,
        table: &str,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<TableQuery> {
        Ok(self
            .from(table)?
            .with_keys(keys.into_iter().map(ToSqlValue::to_sql_value).collect()))
    }

    /// Inserts a row.
    pub fn insert(
        &self,
        table: &str,
        argument: impl Into<ArgumentValue>,
        options: InsertOptions,
    ) -> Result<InsertCommand> {
        let table = self.cache.get_table_or_view(table)?;
        Ok(InsertCommand::new(self.clone(), table, argument.into(), options))
    }

    /// Updates a row identified by the argument's key values.
    pub fn update(
        &self,
        table: &str,
        argument: impl Into<ArgumentValue>,
        options: UpdateOptions,
    ) -> Result<UpdateCommand> {
        let table = self.cache.get_table_or_view(table)?;
        Ok(UpdateCommand::new(self.clone(), table, argument.into(), options))
    }

    /// Updates every row matching a filter with the argument's values.
    pub fn update_set(
        &self,
        table: &str,
        argument: impl Into<ArgumentValue>,
    ) -> Result<UpdateSetCommand> {
        let table = self.cache.get_table_or_view(table)?;
        Ok(UpdateSetCommand::new(self.clone(), table, argument.into()))
    }

    /// Deletes a row identified by the argument's key values.
    pub fn delete(
        &self,
        table: &str,
        argument: impl Into<ArgumentValue>,
        options: DeleteOptions,
    ) -> Result<DeleteCommand> {
        let table = self.cache.get_table_or_view(table)?;
        Ok(DeleteCommand::new(self.clone(), table, argument.into(), options))
    }

    /// Deletes one row by its primary key value.
    pub fn delete_by_key(&self, table: &str, key: impl ToSqlValue) -> Result<DeleteCommand> {
        let table = self.cache.get_table_or_view(table)?;
        Ok(DeleteCommand::by_keys(
            self.clone(),
            table,
            vec![key.to_sql_value()],
        ))
    }

    /// Deletes rows by a list of primary key values.
    pub fn delete_by_keys<K: ToSqlValue>(
        &self,
        table: &str,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<DeleteCommand> {
        let table = self.cache.get_table_or_view(table)?;
        Ok(DeleteCommand::by_keys(
            self.clone(),
            table,
            keys.into_iter().map(ToSqlValue::to_sql_value).collect(),
        ))
    }

    /// Deletes every row matching a filter.
    pub fn delete_with_filter(&self, table: &str) -> Result<DeleteWithFilterCommand> {
        let table = self.cache.get_table_or_view(table)?;
        Ok(DeleteWithFilterCommand::new(self.clone(), table))
    }

    /// Inserts a row, or updates it when its key already exists.
    pub fn upsert(
        &self,
        table: &str,
        argument: impl Into<ArgumentValue>,
        options: UpsertOptions,
    ) -> Result<UpsertCommand> {
        let table = self.cache.get_table_or_view(table)?;
        Ok(UpsertCommand::new(self.clone(), table, argument.into(), options))
    }

    /// Runs caller-written SQL.
    pub fn sql(&self, text: impl Into<String>, argument: impl Into<ArgumentValue>) -> SqlCommand {
        SqlCommand::new(self.dialect(), text.into(), argument.into())
    }

    /// Calls a stored procedure.
    pub fn procedure(
        &self,
        name: &str,
        argument: impl Into<ArgumentValue>,
    ) -> Result<ProcedureCommand> {
        let procedure = self.cache.get_stored_procedure(name)?;
        Ok(ProcedureCommand::new(
            self.dialect(),
            procedure,
            argument.into(),
            self.strict(),
        ))
    }

    /// Queries a table-valued function.
    pub fn table_function(
        &self,
        name: &str,
        argument: impl Into<ArgumentValue>,
    ) -> Result<TableQuery> {
        let function = self.cache.get_table_function(name)?;
        Ok(TableQuery::function(self.clone(), function, argument.into()))
    }

    pub(crate) fn builder<'a>(&self, table: &'a TableOrViewMetadata) -> SqlBuilder<'a> {
        SqlBuilder::for_table(table, self.dialect(), self.strict())
    }
}

/// What a write returns to the materializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Returning {
    /// Nothing; only the affected-row count.
    None,
    /// Rows as they are after the write.
    New,
    /// Rows as they were before the write.
    Old,
}

/// A fully validated SELECT handed to the dialect for assembly.
#[derive(Debug, Clone)]
pub(crate) struct SelectPlan {
    /// Comma-separated select list.
    pub select_list: String,
    /// Table name or function call.
    pub source: Fragment,
    pub predicate: Option<Fragment>,
    /// `ORDER BY ...` or empty.
    pub order_by: String,
    pub limits: Limits,
}

impl SelectPlan {
    pub(crate) fn skip_parameter(&self) -> Option<Parameter> {
        self.limits
            .skip
            .filter(|n| *n > 0)
            .map(|n| Parameter::new("@offset_row_count", n, ParameterOrigin::Paging))
    }

    pub(crate) fn take_parameter(&self) -> Option<Parameter> {
        self.limits
            .take
            .map(|n| Parameter::new("@fetch_row_count", n, ParameterOrigin::Paging))
    }
}

/// A write handed to the dialect for assembly.
#[derive(Debug)]
pub(crate) struct WritePlan<'b, 'a> {
    pub builder: &'b SqlBuilder<'a>,
    /// Operation name for the write link.
    pub operation: &'static str,
    /// Row predicate for updates and deletes.
    pub predicate: Option<Fragment>,
    /// The predicate identifies rows by key.
    pub by_key: bool,
    pub returning: Returning,
    pub row_count_check: RowCountCheck,
    pub identity_insert: bool,
}

impl WritePlan<'_, '_> {
    pub(crate) fn dialect(&self) -> Dialect {
        self.builder.dialect()
    }
}

/// Row selection shared by queries and filtered writes: a filter object or
/// a caller-written where clause.
#[derive(Debug, Clone, Default)]
pub(crate) struct Criteria {
    filter: Option<(ArgumentValue, FilterOptions)>,
    where_clause: Option<(String, ArgumentValue)>,
}

impl Criteria {
    /// Replaces the criteria with a filter object.
    pub(crate) fn set_filter(&mut self, filter: ArgumentValue, options: FilterOptions) {
        self.filter = Some((filter, options));
        self.where_clause = None;
    }

    pub(crate) fn set_filter_options(&mut self, options: FilterOptions) {
        if let Some((_, current)) = &mut self.filter {
            *current = options;
        }
    }

    /// Replaces the criteria with a where clause.
    pub(crate) fn set_where_clause(&mut self, text: String, argument: ArgumentValue) {
        self.where_clause = Some((text, argument));
        self.filter = None;
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.filter.is_none() && self.where_clause.is_none()
    }

    /// The predicate, if any. Where-clause text is parenthesized.
    pub(crate) fn predicate(&self, builder: &SqlBuilder<'_>) -> Result<Option<Fragment>> {
        if let Some((text, argument)) = &self.where_clause {
            let mut predicate = Fragment::text("(");
            predicate.append(Fragment::raw(text.clone(), sql::raw_parameters(argument)));
            predicate.push_str(")");
            return Ok(Some(predicate));
        }
        match &self.filter {
            Some((filter, options)) => builder
                .apply_anonymous_filter_value(filter, *options)
                .map(Some),
            None => Ok(None),
        }
    }
}

/// Joins predicates with `AND`.
pub(crate) fn conjunction(predicates: impl IntoIterator<Item = Fragment>) -> Option<Fragment> {
    let predicates: Vec<Fragment> = predicates.into_iter().collect();
    if predicates.is_empty() {
        None
    } else {
        Some(Fragment::join(predicates, " AND "))
    }
}

/// Row-count policy for key-based writes.
pub(crate) const fn key_row_check(ignore_rows_affected: bool) -> RowCountCheck {
    if ignore_rows_affected {
        RowCountCheck::Ignore
    } else {
        RowCountCheck::ExactlyOne
    }
}

/// Select list for reads: the desired columns, or every column when the
/// caller asked for none.
pub(crate) fn read_columns(builder: &mut SqlBuilder<'_>, desired: &DesiredColumns) -> Result<()> {
    if desired.is_none() {
        builder.apply_desired_columns(&DesiredColumns::All)
    } else {
        builder.apply_desired_columns(desired)
    }
}

/// Maps the returning mode of a write from the desired columns.
pub(crate) fn returning_for(
    builder: &mut SqlBuilder<'_>,
    desired: &DesiredColumns,
    when_desired: Returning,
) -> Result<Returning> {
    if desired.is_none() {
        return Ok(Returning::None);
    }
    builder.apply_desired_columns(desired)?;
    Ok(when_desired)
}

pub(crate) fn log_prepared(operation: &str, table: &str, chain: &TokenChain) {
    debug!(operation, table, links = chain.len(), "prepared command");
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::metadata::{ColumnMetadata, StaticSchemaSource};
    use crate::name::ObjectName;

    /// `Customer(Id identity key, Name, IsDeleted)` in the dialect's
    /// default schema.
    pub(crate) fn customer(dialect: Dialect) -> TableOrViewMetadata {
        TableOrViewMetadata::new(
            dialect,
            ObjectName::new(dialect.default_schema(), "Customer"),
            true,
            vec![
                ColumnMetadata::new(dialect, "Id", "int").primary_key().identity(),
                ColumnMetadata::new(dialect, "Name", "varchar"),
                ColumnMetadata::new(dialect, "IsDeleted", "bit"),
            ],
        )
    }

    pub(crate) fn context_with(dialect: Dialect, strict: bool, rules: AuditRules) -> CommandContext {
        let source = StaticSchemaSource::new().with_table(customer(dialect));
        CommandContext::new(
            Arc::new(MetadataCache::new(dialect, source)),
            Arc::new(rules),
            Arc::new(DataSourceSettings::default().strict(strict)),
        )
    }

    pub(crate) fn context(dialect: Dialect) -> CommandContext {
        context_with(dialect, false, AuditRules::default())
    }
}
