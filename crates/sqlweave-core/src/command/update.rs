use std::sync::Arc;

use super::{
    key_row_check, log_prepared, returning_for, CommandBuilder, CommandContext, Criteria,
    Returning, WritePlan,
};
use crate::builder::{DesiredColumns, FilterOptions, SqlBuilder, UpdateOptions};
use crate::error::{Result, WeaveError};
use crate::metadata::TableOrViewMetadata;
use crate::record::ArgumentValue;
use crate::token::{RowCountCheck, TokenChain};

fn require_updates(builder: &SqlBuilder<'_>) -> Result<()> {
    if builder.entries().iter().any(|e| e.update) {
        Ok(())
    } else {
        Err(WeaveError::Mapping(format!(
            "the argument has no updatable columns for {}",
            builder.quoted_name()
        )))
    }
}

/// Updates the row identified by the argument's key values.
#[derive(Debug, Clone)]
pub struct UpdateCommand {
    context: CommandContext,
    table: Arc<TableOrViewMetadata>,
    argument: ArgumentValue,
    options: UpdateOptions,
}

impl UpdateCommand {
    pub(crate) const fn new(
        context: CommandContext,
        table: Arc<TableOrViewMetadata>,
        argument: ArgumentValue,
        options: UpdateOptions,
    ) -> Self {
        Self {
            context,
            table,
            argument,
            options,
        }
    }
}

impl CommandBuilder for UpdateCommand {
    fn prepare(&self, desired: &DesiredColumns) -> Result<TokenChain> {
        let mut builder = self.context.builder(&self.table);
        builder.apply_argument_value(&self.argument, self.options.use_key_attribute)?;
        require_updates(&builder)?;
        let predicate = builder.build_anonymous_where_clause()?;
        self.context.rules().apply_update(&mut builder);
        let when_desired = if self.options.return_old_values {
            Returning::Old
        } else {
            Returning::New
        };
        let returning = returning_for(&mut builder, desired, when_desired)?;

        let plan = WritePlan {
            builder: &builder,
            operation: "Update",
            predicate: Some(predicate),
            by_key: true,
            returning,
            row_count_check: key_row_check(self.options.ignore_rows_affected),
            identity_insert: false,
        };
        let chain = self.context.dialect().build_update(&plan)?;
        log_prepared("Update", self.table.quoted_name(), &chain);
        Ok(chain)
    }
}

/// Updates every row matching a filter with the argument's values.
///
/// A filter or where clause is required unless
/// [`UpdateSetCommand::all_rows`] is called.
#[derive(Debug, Clone)]
pub struct UpdateSetCommand {
    context: CommandContext,
    table: Arc<TableOrViewMetadata>,
    argument: ArgumentValue,
    criteria: Criteria,
    all_rows: bool,
    return_old_values: bool,
}

impl UpdateSetCommand {
    pub(crate) fn new(
        context: CommandContext,
        table: Arc<TableOrViewMetadata>,
        argument: ArgumentValue,
    ) -> Self {
        Self {
            context,
            table,
            argument,
            criteria: Criteria::default(),
            all_rows: false,
            return_old_values: false,
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

    /// Allows updating every row of the table.
    #[must_use]
    pub const fn all_rows(mut self) -> Self {
        self.all_rows = true;
        self
    }

    /// Returns rows as they were before the update.
    #[must_use]
    pub const fn return_old_values(mut self) -> Self {
        self.return_old_values = true;
        self
    }
}

impl CommandBuilder for UpdateSetCommand {
    fn prepare(&self, desired: &DesiredColumns) -> Result<TokenChain> {
        if self.criteria.is_empty() && !self.all_rows {
            return Err(WeaveError::InvalidOperation(format!(
                "updating {} without a filter requires all_rows",
                self.table.quoted_name()
            )));
        }
        let mut builder = self.context.builder(&self.table);
        builder.apply_argument_value(&self.argument, false)?;
        require_updates(&builder)?;
        self.context.rules().apply_update(&mut builder);
        let predicate = self.criteria.predicate(&builder)?;
        let when_desired = if self.return_old_values {
            Returning::Old
        } else {
            Returning::New
        };
        let returning = returning_for(&mut builder, desired, when_desired)?;

        let plan = WritePlan {
            builder: &builder,
            operation: "UpdateSet",
            predicate,
            by_key: false,
            returning,
            row_count_check: RowCountCheck::Ignore,
            identity_insert: false,
        };
        let chain = self.context.dialect().build_update(&plan)?;
        log_prepared("UpdateSet", self.table.quoted_name(), &chain);
        Ok(chain)
    }
}
