//! Deletes, rewritten into updates on tables with a soft-delete rule.

use std::sync::Arc;

use tracing::debug;

use super::{
    key_row_check, log_prepared, returning_for, CommandBuilder, CommandContext, Criteria,
    Returning, WritePlan,
};
use crate::builder::{DeleteOptions, DesiredColumns, FilterOptions, Fragment, ParameterOrigin, SqlBuilder};
use crate::error::{Result, WeaveError};
use crate::metadata::TableOrViewMetadata;
use crate::record::ArgumentValue;
use crate::token::{RowCountCheck, TokenChain};
use crate::value::SqlValue;

/// Builds the delete, or the soft-delete update when a rule applies.
fn build(
    context: &CommandContext,
    table: &TableOrViewMetadata,
    mut builder: SqlBuilder<'_>,
    desired: &DesiredColumns,
    predicate: Option<Fragment>,
    by_key: bool,
    row_count_check: RowCountCheck,
) -> Result<TokenChain> {
    let dialect = context.dialect();
    let soft_delete = context.rules().soft_delete_values(table);
    if soft_delete.is_some() {
        debug!(table = %table.name(), "rewriting delete as soft delete");
    }
    if let Some(values) = soft_delete.clone() {
        builder.apply_update_values(values, ParameterOrigin::Audit)?;
    }
    let returning = returning_for(&mut builder, desired, Returning::Old)?;

    let mut plan = WritePlan {
        builder: &builder,
        operation: "Delete",
        predicate,
        by_key,
        returning,
        row_count_check,
        identity_insert: false,
    };
    let chain = if soft_delete.is_some() {
        plan.operation = "SoftDelete";
        if plan.row_count_check == RowCountCheck::ExactlyOne {
            plan.row_count_check = RowCountCheck::AtMostOne;
        }
        dialect.build_update(&plan)?
    } else {
        dialect.build_delete(&plan)?
    };
    log_prepared(plan.operation, table.quoted_name(), &chain);
    Ok(chain)
}

#[derive(Debug, Clone)]
enum Target {
    Argument(ArgumentValue, DeleteOptions),
    Keys(Vec<SqlValue>),
}

/// Deletes rows identified by key: the argument's key values, or a list
/// of primary key values.
#[derive(Debug, Clone)]
pub struct DeleteCommand {
    context: CommandContext,
    table: Arc<TableOrViewMetadata>,
    target: Target,
}

impl DeleteCommand {
    pub(crate) const fn new(
        context: CommandContext,
        table: Arc<TableOrViewMetadata>,
        argument: ArgumentValue,
        options: DeleteOptions,
    ) -> Self {
        Self {
            context,
            table,
            target: Target::Argument(argument, options),
        }
    }

    pub(crate) const fn by_keys(
        context: CommandContext,
        table: Arc<TableOrViewMetadata>,
        keys: Vec<SqlValue>,
    ) -> Self {
        Self {
            context,
            table,
            target: Target::Keys(keys),
        }
    }
}

impl CommandBuilder for DeleteCommand {
    fn prepare(&self, desired: &DesiredColumns) -> Result<TokenChain> {
        let mut builder = self.context.builder(&self.table);
        let (predicate, check) = match &self.target {
            Target::Argument(argument, options) => {
                builder.apply_argument_value(argument, options.use_key_attribute)?;
                (
                    builder.build_anonymous_where_clause()?,
                    key_row_check(options.ignore_rows_affected),
                )
            }
            Target::Keys(keys) => {
                let check = if keys.len() == 1 {
                    RowCountCheck::ExactlyOne
                } else {
                    RowCountCheck::Ignore
                };
                (builder.build_key_list_clause(keys)?, check)
            }
        };
        build(
            &self.context,
            &self.table,
            builder,
            desired,
            Some(predicate),
            true,
            check,
        )
    }
}

/// Deletes every row matching a filter.
///
/// A filter or where clause is required unless
/// [`DeleteWithFilterCommand::all_rows`] is called.
#[derive(Debug, Clone)]
pub struct DeleteWithFilterCommand {
    context: CommandContext,
    table: Arc<TableOrViewMetadata>,
    criteria: Criteria,
    all_rows: bool,
}

impl DeleteWithFilterCommand {
    pub(crate) fn new(context: CommandContext, table: Arc<TableOrViewMetadata>) -> Self {
        Self {
            context,
            table,
            criteria: Criteria::default(),
            all_rows: false,
        }
    }

    /// Selects rows by a filter object.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<ArgumentValue>) -> Self {
        self.criteria.set_filter(filter.into(), FilterOptions::default());
        self
    }

    /// Options for the filter object.
    #[must_use]
    pub fn with_filter_options(mut self, options: FilterOptions) -> Self {
        self.criteria.set_filter_options(options);
        self
    }

    /// Selects rows by caller-written SQL.
    #[must_use]
    pub fn where_clause(
        mut self,
        text: impl Into<String>,
        argument: impl Into<ArgumentValue>,
    ) -> Self {
        self.criteria.set_where_clause(text.into(), argument.into());
        self
    }

    /// Allows deleting every row of the table.
    #[must_use]
    pub const fn all_rows(mut self) -> Self {
        self.all_rows = true;
        self
    }
}

impl CommandBuilder for DeleteWithFilterCommand {
    fn prepare(&self, desired: &DesiredColumns) -> Result<TokenChain> {
        if self.criteria.is_empty() && !self.all_rows {
            return Err(WeaveError::InvalidOperation(format!(
                "deleting from {} without a filter requires all_rows",
                self.table.quoted_name()
            )));
        }
        let builder = self.context.builder(&self.table);
        let predicate = self.criteria.predicate(&builder)?;
        build(
            &self.context,
            &self.table,
            builder,
            desired,
            predicate,
            false,
            RowCountCheck::Ignore,
        )
    }
}
