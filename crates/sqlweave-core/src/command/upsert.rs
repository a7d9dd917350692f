use std::sync::Arc;

use super::{log_prepared, returning_for, CommandBuilder, CommandContext, Returning, WritePlan};
use crate::builder::{DesiredColumns, UpsertOptions};
use crate::dialect::UpsertStrategy;
use crate::error::{Result, WeaveError};
use crate::metadata::TableOrViewMetadata;
use crate::record::ArgumentValue;
use crate::token::{RowCountCheck, TokenChain};

/// Inserts a row, or updates it when a row with the same key exists.
///
/// The argument must supply every key column.
#[derive(Debug, Clone)]
pub struct UpsertCommand {
    context: CommandContext,
    table: Arc<TableOrViewMetadata>,
    argument: ArgumentValue,
    options: UpsertOptions,
}

impl UpsertCommand {
    pub(crate) const fn new(
        context: CommandContext,
        table: Arc<TableOrViewMetadata>,
        argument: ArgumentValue,
        options: UpsertOptions,
    ) -> Self {
        Self {
            context,
            table,
            argument,
            options,
        }
    }
}

impl CommandBuilder for UpsertCommand {
    fn prepare(&self, desired: &DesiredColumns) -> Result<TokenChain> {
        let mut builder = self.context.builder(&self.table);
        builder.apply_argument_value(&self.argument, self.options.use_key_attribute)?;
        if self.options.identity_insert {
            builder.enable_identity_insert();
        }
        // Single-statement upserts conflict on the key; it must be inserted.
        let conflict_on_key = matches!(
            self.context.dialect().upsert_strategy(),
            UpsertStrategy::OnConflict | UpsertStrategy::OnDuplicateKey
        );
        if conflict_on_key {
            builder.insert_key_values();
        }
        if !builder.has_key_values() {
            return Err(WeaveError::Mapping(format!(
                "upserting into {} needs a value for every key column",
                self.table.quoted_name()
            )));
        }
        if !builder.entries().iter().any(|e| e.insert) {
            return Err(WeaveError::Mapping(format!(
                "the argument has no insertable columns for {}",
                self.table.quoted_name()
            )));
        }
        self.context.rules().apply_upsert(&mut builder);
        let returning = returning_for(&mut builder, desired, Returning::New)?;

        let plan = WritePlan {
            builder: &builder,
            operation: "Upsert",
            predicate: None,
            by_key: true,
            returning,
            row_count_check: RowCountCheck::Ignore,
            identity_insert: self.options.identity_insert || conflict_on_key,
        };
        let chain = self.context.dialect().build_upsert(&plan)?;
        log_prepared("Upsert", self.table.quoted_name(), &chain);
        Ok(chain)
    }
}
