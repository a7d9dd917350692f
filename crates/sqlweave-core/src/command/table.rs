//! Queries over tables, views and table-valued functions.

use std::sync::Arc;

use super::routine::bind_routine_parameters;
use super::{
    conjunction, log_prepared, read_columns, CommandBuilder, CommandContext, Criteria, SelectPlan,
};
use crate::builder::{
    DesiredColumns, FilterOptions, Fragment, LimitOption, Limits, SortExpression, SqlBuilder,
};
use crate::dialect::Dialect;
use crate::error::{Result, WeaveError};
use crate::metadata::{ColumnMetadata, TableFunctionMetadata, TableOrViewMetadata};
use crate::record::ArgumentValue;
use crate::token::TokenChain;
use crate::value::SqlValue;

/// An aggregate computed instead of returning rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate {
    /// `COUNT(*)`
    Count,
    /// `COUNT(DISTINCT column)`
    CountDistinct(String),
}

#[derive(Debug, Clone)]
enum Source {
    Table(Arc<TableOrViewMetadata>),
    Function {
        function: Arc<TableFunctionMetadata>,
        argument: ArgumentValue,
    },
}

/// A SELECT against one table, view or table function.
///
/// Rows can be narrowed by a filter object, a where clause or a list of
/// key values, then sorted, paged or sampled, or reduced to a count.
#[derive(Debug, Clone)]
pub struct TableQuery {
    context: CommandContext,
    source: Source,
    criteria: Criteria,
    keys: Option<Vec<SqlValue>>,
    sorting: Vec<SortExpression>,
    limits: Limits,
    aggregate: Option<Aggregate>,
    include_deleted: bool,
}

impl TableQuery {
    fn with_source(context: CommandContext, source: Source) -> Self {
        Self {
            context,
            source,
            criteria: Criteria::default(),
            keys: None,
            sorting: Vec::new(),
            limits: Limits::default(),
            aggregate: None,
            include_deleted: false,
        }
    }

    pub(crate) fn table(context: CommandContext, table: Arc<TableOrViewMetadata>) -> Self {
        Self::with_source(context, Source::Table(table))
    }

    pub(crate) fn function(
        context: CommandContext,
        function: Arc<TableFunctionMetadata>,
        argument: ArgumentValue,
    ) -> Self {
        Self::with_source(context, Source::Function { function, argument })
    }

    /// Restricts rows to the given primary key values.
    #[must_use]
    pub fn with_keys(mut self, keys: Vec<SqlValue>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Filters rows by a filter object: every property becomes an
    /// equality or `IS NULL` test. Replaces any where clause.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<ArgumentValue>) -> Self {
        self.criteria.set_filter(filter.into(), FilterOptions::default());
        self
    }

    /// Options for the filter object set by [`TableQuery::with_filter`].
    #[must_use]
    pub fn with_filter_options(mut self, options: FilterOptions) -> Self {
        self.criteria.set_filter_options(options);
        self
    }

    /// Filters rows by caller-written SQL. Replaces any filter object.
    #[must_use]
    pub fn where_clause(
        mut self,
        text: impl Into<String>,
        argument: impl Into<ArgumentValue>,
    ) -> Self {
        self.criteria.set_where_clause(text.into(), argument.into());
        self
    }

    /// Sorts the rows.
    #[must_use]
    pub fn with_sorting(mut self, sorting: impl IntoIterator<Item = SortExpression>) -> Self {
        self.sorting.extend(sorting);
        self
    }

    /// Pages or samples the rows.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Counts rows instead of returning them.
    #[must_use]
    pub fn count(mut self) -> Self {
        self.aggregate = Some(Aggregate::Count);
        self
    }

    /// Counts distinct values of a column.
    #[must_use]
    pub fn count_distinct(mut self, column: impl Into<String>) -> Self {
        self.aggregate = Some(Aggregate::CountDistinct(column.into()));
        self
    }

    /// Includes rows hidden by a soft-delete rule.
    #[must_use]
    pub const fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    fn columns(&self) -> &[ColumnMetadata] {
        match &self.source {
            Source::Table(table) => table.columns(),
            Source::Function { function, .. } => &function.columns,
        }
    }

    fn quoted_name(&self) -> &str {
        match &self.source {
            Source::Table(table) => table.quoted_name(),
            Source::Function { function, .. } => &function.quoted_name,
        }
    }

    fn source_fragment(&self) -> Result<Fragment> {
        match &self.source {
            Source::Table(table) => Ok(Fragment::text(table.quoted_name())),
            Source::Function { function, argument } => {
                let parameters = bind_routine_parameters(
                    &function.quoted_name,
                    &function.parameters,
                    argument,
                    self.context.strict(),
                )?;
                self.context
                    .dialect()
                    .build_function_source(function, parameters)
            }
        }
    }

    fn predicate(&self, builder: &SqlBuilder<'_>) -> Result<Option<Fragment>> {
        let mut predicates = Vec::new();
        if let Some(predicate) = self.criteria.predicate(builder)? {
            predicates.push(predicate);
        }
        if let Some(keys) = &self.keys {
            predicates.push(builder.build_key_list_clause(keys)?);
        }
        if let Source::Table(table) = &self.source {
            if !self.include_deleted {
                predicates.extend(self.context.rules().read_filter(table));
            }
        }
        Ok(conjunction(predicates))
    }

    /// Checks the limits against the dialect and resolves the ORDER BY.
    fn order_by(&self, builder: &SqlBuilder<'_>) -> Result<String> {
        let dialect = self.context.dialect();
        let limits = self.limits;
        let option = limits.effective_option();
        let sorted = !self.sorting.is_empty();

        if matches!(limits.take, Some(n) if n <= 0) {
            return Err(WeaveError::InvalidOperation(
                "take must be greater than zero".into(),
            ));
        }
        if matches!(limits.skip, Some(n) if n < 0) {
            return Err(WeaveError::InvalidOperation(
                "skip cannot be negative".into(),
            ));
        }
        if !dialect.supports_limit(option) {
            return Err(dialect.unsupported(option.to_string()));
        }
        if !matches!(option, LimitOption::None | LimitOption::Rows) && limits.take.is_none() {
            return Err(WeaveError::InvalidOperation(format!(
                "a {option} needs a take value"
            )));
        }
        if limits.has_skip() {
            if !dialect.supports_skip() {
                return Err(dialect.unsupported("skipping rows"));
            }
            let pageable = option == LimitOption::Rows
                || (option == LimitOption::RowsWithTies && dialect == Dialect::PostgreSql);
            if !pageable {
                return Err(dialect.unsupported(format!("skipping rows with a {option}")));
            }
            if dialect.ordered_pagination() && !sorted {
                return Err(WeaveError::InvalidOperation(
                    "cannot skip without sort".into(),
                ));
            }
        }
        if limits.seed.is_some() {
            if !option.is_random_sample() {
                return Err(WeaveError::InvalidOperation(
                    "a seed can only be used with a random sample".into(),
                ));
            }
            if !dialect.supports_seed() {
                return Err(dialect.unsupported("random sample seeds"));
            }
        }
        if option.is_random_sample() && sorted {
            return Err(WeaveError::InvalidOperation(
                "random samples cannot be sorted".into(),
            ));
        }

        let order_by = builder.build_order_by_clause(&self.sorting)?;
        if !sorted && dialect.requires_sorting(option) {
            if self.context.strict() {
                return Err(WeaveError::InvalidOperation(format!(
                    "a {option} requires sorting"
                )));
            }
            return builder.build_key_order_by_clause().ok_or_else(|| {
                WeaveError::InvalidOperation(format!(
                    "a {option} requires sorting and {} has no primary key to sort by",
                    builder.quoted_name()
                ))
            });
        }
        Ok(order_by)
    }

    fn aggregate_list(&self, aggregate: &Aggregate, builder: &SqlBuilder<'_>) -> Result<String> {
        let dialect = self.context.dialect();
        if self.limits != Limits::default() {
            return Err(WeaveError::InvalidOperation(
                "aggregates cannot be combined with limits".into(),
            ));
        }
        match aggregate {
            Aggregate::Count => Ok("COUNT(*)".into()),
            Aggregate::CountDistinct(column) => {
                if !dialect.supports_count_distinct() {
                    return Err(dialect.unsupported("COUNT(DISTINCT)"));
                }
                let column = builder
                    .entries()
                    .iter()
                    .find(|e| e.column.matches(column))
                    .ok_or_else(|| {
                        WeaveError::Mapping(format!(
                            "column '{column}' does not exist on {}",
                            builder.quoted_name()
                        ))
                    })?;
                Ok(format!("COUNT(DISTINCT {})", column.column.quoted_sql_name))
            }
        }
    }
}

impl CommandBuilder for TableQuery {
    fn prepare(&self, desired: &DesiredColumns) -> Result<TokenChain> {
        let dialect = self.context.dialect();
        let mut builder = SqlBuilder::new(
            self.quoted_name(),
            self.columns(),
            dialect,
            self.context.strict(),
        );

        let (operation, select_list, order_by, limits) = match &self.aggregate {
            Some(aggregate) => (
                "Count",
                self.aggregate_list(aggregate, &builder)?,
                String::new(),
                Limits::default(),
            ),
            None => {
                read_columns(&mut builder, desired)?;
                if !builder.has_read_columns() {
                    return Err(WeaveError::Mapping(format!(
                        "{} has no columns to read",
                        self.quoted_name()
                    )));
                }
                (
                    "Select",
                    builder.build_select_clause(None),
                    self.order_by(&builder)?,
                    self.limits,
                )
            }
        };

        let plan = SelectPlan {
            select_list,
            source: self.source_fragment()?,
            predicate: self.predicate(&builder)?,
            order_by,
            limits,
        };
        let chain = TokenChain::single(dialect.build_select(plan)?.into_token(dialect, operation)?);
        log_prepared(operation, self.quoted_name(), &chain);
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{context, context_with};
    use super::*;
    use crate::audit::AuditRules;
    use crate::record::Property;

    fn sql(query: &TableQuery) -> String {
        query.prepare(&DesiredColumns::None).unwrap().tokens()[0]
            .command_text
            .clone()
    }

    fn error(query: &TableQuery) -> WeaveError {
        query.prepare(&DesiredColumns::None).unwrap_err()
    }

    #[test]
    fn test_get_by_key() {
        let context = context(Dialect::SqlServer);
        assert_eq!(
            sql(&context.get_by_key("Customer", 5).unwrap()),
            "SELECT [Id], [Name], [IsDeleted] FROM [dbo].[Customer] WHERE [Id] = @Param0;"
        );
        assert_eq!(
            sql(&context.get_by_keys("Customer", [1, 2, 3]).unwrap()),
            "SELECT [Id], [Name], [IsDeleted] FROM [dbo].[Customer] WHERE [Id] IN (@Param0, @Param1, @Param2);"
        );
    }

    #[test]
    fn test_filter_object() {
        let filter = vec![Property::new("Id", 5), Property::new("Name", SqlValue::Null)];
        let query = context(Dialect::PostgreSql)
            .from("Customer")
            .unwrap()
            .with_filter(filter);
        let chain = query
            .prepare(&DesiredColumns::named(["Name"]))
            .unwrap();
        let token = &chain.tokens()[0];
        assert_eq!(
            token.command_text,
            r#"SELECT "Name" FROM "public"."Customer" WHERE "Id" = $1 AND "Name" IS NULL;"#
        );
        assert_eq!(token.parameters.len(), 1);

        let query = query.with_filter_options(FilterOptions::default().ignore_null_properties());
        assert_eq!(
            sql(&query),
            r#"SELECT "Id", "Name", "IsDeleted" FROM "public"."Customer" WHERE "Id" = $1;"#
        );
    }

    #[test]
    fn test_where_clause_precedes_soft_delete_filter() {
        let rules = AuditRules::new().with_soft_delete("IsDeleted", true);
        let context = context_with(Dialect::SqlServer, false, rules);
        let query = context
            .from("Customer")
            .unwrap()
            .where_clause("[Name] LIKE @Pattern", vec![Property::new("Pattern", "A%")]);
        assert_eq!(
            sql(&query),
            "SELECT [Id], [Name], [IsDeleted] FROM [dbo].[Customer] WHERE ([Name] LIKE @Pattern) \
             AND ([IsDeleted] <> @audit_IsDeleted OR [IsDeleted] IS NULL);"
        );
        assert_eq!(
            sql(&query.include_deleted()),
            "SELECT [Id], [Name], [IsDeleted] FROM [dbo].[Customer] WHERE ([Name] LIKE @Pattern);"
        );
    }

    #[test]
    fn test_paging() {
        let query = context(Dialect::Sqlite)
            .from("Customer")
            .unwrap()
            .with_limits(Limits::rows(10).skip(20));
        assert_eq!(
            sql(&query),
            r#"SELECT "Id", "Name", "IsDeleted" FROM "Customer" LIMIT ? OFFSET ?;"#
        );

        let query = context(Dialect::SqlServer)
            .from("Customer")
            .unwrap()
            .with_sorting([SortExpression::desc("name")])
            .with_limits(Limits::rows(10).skip(20));
        assert_eq!(
            sql(&query),
            "SELECT [Id], [Name], [IsDeleted] FROM [dbo].[Customer] ORDER BY [Name] DESC \
             OFFSET @offset_row_count ROWS FETCH NEXT @fetch_row_count ROWS ONLY;"
        );
    }

    #[test]
    fn test_invalid_limits() {
        let from = |dialect| context(dialect).from("Customer").unwrap();

        let err = error(&from(Dialect::SqlServer).with_limits(Limits::rows(10).skip(5)));
        assert!(matches!(err, WeaveError::InvalidOperation(ref m) if m.contains("without sort")));

        let err = error(&from(Dialect::Access).with_limits(Limits::rows(10).skip(5)));
        assert!(matches!(err, WeaveError::Unsupported { .. }));

        let err = error(&from(Dialect::Sqlite).with_limits(Limits::rows(0)));
        assert!(matches!(err, WeaveError::InvalidOperation(_)));

        let err = error(&from(Dialect::MySql).with_limits(Limits::new(LimitOption::RowsWithTies, 3)));
        assert!(matches!(err, WeaveError::Unsupported { .. }));

        let err = error(&from(Dialect::Sqlite).with_limits(Limits::rows(3).seed(1)));
        assert!(matches!(err, WeaveError::InvalidOperation(_)));

        let err = error(
            &from(Dialect::SqlServer)
                .with_sorting([SortExpression::asc("Id")])
                .with_limits(Limits::new(LimitOption::RandomSampleRows, 3)),
        );
        assert!(matches!(err, WeaveError::InvalidOperation(_)));
    }

    #[test]
    fn test_ties_fall_back_to_key_order() {
        let limits = Limits::new(LimitOption::RowsWithTies, 3);
        let query = context(Dialect::SqlServer)
            .from("Customer")
            .unwrap()
            .with_limits(limits);
        assert_eq!(
            sql(&query),
            "SELECT TOP (@fetch_row_count) WITH TIES [Id], [Name], [IsDeleted] FROM [dbo].[Customer] ORDER BY [Id];"
        );

        let strict = context_with(Dialect::SqlServer, true, AuditRules::default());
        let err = error(&strict.from("Customer").unwrap().with_limits(limits));
        assert!(matches!(err, WeaveError::InvalidOperation(_)));
    }

    #[test]
    fn test_counts() {
        let mysql = context(Dialect::MySql);
        let query = mysql.from("Customer").unwrap().count();
        let chain = query.prepare(&DesiredColumns::All).unwrap();
        assert_eq!(chain.tokens()[0].command_text, "SELECT COUNT(*) FROM `Customer`;");
        assert_eq!(chain.tokens()[0].operation_name, "Count");

        assert_eq!(
            sql(&mysql.from("Customer").unwrap().count_distinct("name")),
            "SELECT COUNT(DISTINCT `Name`) FROM `Customer`;"
        );
        let err = error(&mysql.from("Customer").unwrap().count_distinct("Missing"));
        assert!(matches!(err, WeaveError::Mapping(_)));

        let err = error(
            &mysql
                .from("Customer")
                .unwrap()
                .count()
                .with_limits(Limits::rows(1)),
        );
        assert!(matches!(err, WeaveError::InvalidOperation(_)));

        let access = context(Dialect::Access);
        let err = error(&access.from("Customer").unwrap().count_distinct("Name"));
        assert!(matches!(err, WeaveError::Unsupported { .. }));
    }
}
