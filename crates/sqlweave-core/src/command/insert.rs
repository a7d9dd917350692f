use std::sync::Arc;

use super::{log_prepared, returning_for, CommandBuilder, CommandContext, Returning, WritePlan};
use crate::builder::{DesiredColumns, InsertOptions};
use crate::error::Result;
use crate::metadata::TableOrViewMetadata;
use crate::record::ArgumentValue;
use crate::token::{RowCountCheck, TokenChain};

/// Inserts one row built from an argument value.
///
/// Argument properties without a matching column are ignored outside strict
/// mode, so a record with extra fields can be inserted as it is.
#[derive(Debug, Clone)]
pub struct InsertCommand {
    context: CommandContext,
    table: Arc<TableOrViewMetadata>,
    argument: ArgumentValue,
    options: InsertOptions,
}

impl InsertCommand {
    pub(crate) const fn new(
        context: CommandContext,
        table: Arc<TableOrViewMetadata>,
        argument: ArgumentValue,
        options: InsertOptions,
    ) -> Self {
        Self {
            context,
            table,
            argument,
            options,
        }
    }
}

impl CommandBuilder for InsertCommand {
    fn prepare(&self, desired: &DesiredColumns) -> Result<TokenChain> {
        let mut builder = self.context.builder(&self.table);
        builder.apply_argument_value(&self.argument, false)?;
        if self.options.identity_insert {
            builder.enable_identity_insert();
        }
        self.context.rules().apply_insert(&mut builder);
        let returning = returning_for(&mut builder, desired, Returning::New)?;

        let plan = WritePlan {
            builder: &builder,
            operation: "Insert",
            predicate: None,
            by_key: false,
            returning,
            row_count_check: RowCountCheck::ExactlyOne,
            identity_insert: self.options.identity_insert,
        };
        let chain = self.context.dialect().build_insert(&plan)?;
        log_prepared("Insert", self.table.quoted_name(), &chain);
        Ok(chain)
    }
}
