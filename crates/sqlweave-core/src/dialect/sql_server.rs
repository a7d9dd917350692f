//! SQL Server (T-SQL) statements.

use super::{delete_statement, insert_statement, push_where, update_statement};
use crate::builder::{Fragment, LimitOption, SqlBuilder};
use crate::command::{Returning, SelectPlan, WritePlan};
use crate::error::Result;
use crate::metadata::{DbType, IntrospectionQueries};
use crate::token::{ExecutionToken, TokenChain};

pub(super) fn db_type(base: &str) -> Option<DbType> {
    Some(match base {
        "bit" => DbType::Boolean,
        "tinyint" => DbType::TinyInt,
        "smallint" => DbType::SmallInt,
        "int" => DbType::Int,
        "bigint" => DbType::BigInt,
        "decimal" | "numeric" => DbType::Decimal,
        "money" | "smallmoney" => DbType::Money,
        "real" => DbType::Real,
        "float" => DbType::Double,
        "char" => DbType::Char,
        "varchar" => DbType::VarChar,
        "nchar" => DbType::NChar,
        "nvarchar" | "sysname" => DbType::NVarChar,
        "text" | "ntext" => DbType::Text,
        "binary" | "timestamp" | "rowversion" => DbType::Binary,
        "varbinary" | "image" => DbType::VarBinary,
        "date" => DbType::Date,
        "time" => DbType::Time,
        "datetime" | "datetime2" | "smalldatetime" => DbType::DateTime,
        "datetimeoffset" => DbType::DateTimeOffset,
        "uniqueidentifier" => DbType::Guid,
        "xml" => DbType::Xml,
        _ => return None,
    })
}

const COLUMNS: &str = concat!(
    "SELECT c.name AS column_name, t.name AS type_name, c.is_nullable, c.is_identity, ",
    "c.is_computed, CAST(CASE WHEN EXISTS (SELECT 1 FROM sys.index_columns ic ",
    "INNER JOIN sys.indexes i ON i.object_id = ic.object_id AND i.index_id = ic.index_id ",
    "WHERE i.is_primary_key = 1 AND ic.object_id = c.object_id AND ic.column_id = c.column_id) ",
    "THEN 1 ELSE 0 END AS bit) AS is_primary_key, CAST(c.max_length AS int) AS max_length, ",
    "CAST(c.precision AS int) AS precision, CAST(c.scale AS int) AS scale ",
    "FROM sys.columns c INNER JOIN sys.types t ON t.user_type_id = c.user_type_id ",
    "WHERE c.object_id = OBJECT_ID(QUOTENAME(COALESCE(@Schema, SCHEMA_NAME())) + '.' + QUOTENAME(@Name)) ",
    "ORDER BY c.column_id;"
);

pub(super) static INTROSPECTION: IntrospectionQueries = IntrospectionQueries {
    objects: concat!(
        "SELECT s.name AS schema_name, o.name AS object_name, ",
        "CASE o.type WHEN 'U' THEN 'TABLE' WHEN 'V' THEN 'VIEW' WHEN 'P' THEN 'PROCEDURE' ",
        "ELSE 'FUNCTION' END AS object_type ",
        "FROM sys.objects o INNER JOIN sys.schemas s ON s.schema_id = o.schema_id ",
        "WHERE o.type IN ('U', 'V', 'P', 'IF', 'TF') AND o.is_ms_shipped = 0 ",
        "ORDER BY s.name, o.name;"
    ),
    table: concat!(
        "SELECT s.name AS schema_name, o.name AS object_name, ",
        "CAST(CASE WHEN o.type = 'U' THEN 1 ELSE 0 END AS bit) AS is_table ",
        "FROM sys.objects o INNER JOIN sys.schemas s ON s.schema_id = o.schema_id ",
        "WHERE o.type IN ('U', 'V') AND s.name = COALESCE(@Schema, SCHEMA_NAME()) ",
        "AND o.name = @Name;"
    ),
    columns: COLUMNS,
    indexes: concat!(
        "SELECT i.name AS index_name, i.is_unique, i.is_primary_key, c.name AS column_name, ",
        "ic.is_descending_key AS is_descending ",
        "FROM sys.indexes i ",
        "INNER JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id ",
        "INNER JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id ",
        "WHERE i.object_id = OBJECT_ID(QUOTENAME(COALESCE(@Schema, SCHEMA_NAME())) + '.' + QUOTENAME(@Name)) ",
        "AND ic.is_included_column = 0 AND i.name IS NOT NULL ",
        "ORDER BY i.index_id, ic.key_ordinal;"
    ),
    routine: concat!(
        "SELECT s.name AS schema_name, o.name AS object_name, ",
        "CASE o.type WHEN 'P' THEN 'PROCEDURE' ELSE 'FUNCTION' END AS object_type ",
        "FROM sys.objects o INNER JOIN sys.schemas s ON s.schema_id = o.schema_id ",
        "WHERE o.type IN ('P', 'IF', 'TF') AND s.name = COALESCE(@Schema, SCHEMA_NAME()) ",
        "AND o.name = @Name;"
    ),
    parameters: concat!(
        "SELECT p.name AS parameter_name, t.name AS type_name, ",
        "CASE WHEN p.is_output = 1 THEN 'INOUT' ELSE 'IN' END AS parameter_mode ",
        "FROM sys.parameters p INNER JOIN sys.types t ON t.user_type_id = p.user_type_id ",
        "WHERE p.object_id = OBJECT_ID(QUOTENAME(COALESCE(@Schema, SCHEMA_NAME())) + '.' + QUOTENAME(@Name)) ",
        "AND p.parameter_id > 0 ORDER BY p.parameter_id;"
    ),
    function_columns: COLUMNS,
};

pub(super) fn select(plan: SelectPlan) -> Fragment {
    let option = plan.limits.effective_option();
    let skip = plan.skip_parameter();
    let take = plan.take_parameter();
    let mut sql = Fragment::text("SELECT ");

    let top = match option {
        LimitOption::Rows if skip.is_none() => Some(""),
        LimitOption::Percentage => Some(" PERCENT"),
        LimitOption::RowsWithTies => Some(" WITH TIES"),
        LimitOption::PercentageWithTies => Some(" PERCENT WITH TIES"),
        _ => None,
    };
    if let (Some(suffix), Some(take)) = (top, take.clone()) {
        sql.push_str("TOP (");
        sql.push_param(take);
        sql.push_str(")");
        sql.push_str(suffix);
        sql.push_str(" ");
    }

    sql.push_str(&plan.select_list);
    sql.push_str(" FROM ");
    sql.append(plan.source);

    if option.is_random_sample() {
        let unit = if option.is_percentage() { "PERCENT" } else { "ROWS" };
        sql.push_str(&format!(
            " TABLESAMPLE SYSTEM ({} {unit})",
            plan.limits.take.unwrap_or_default()
        ));
        if let Some(seed) = plan.limits.seed {
            sql.push_str(&format!(" REPEATABLE ({seed})"));
        }
    }

    push_where(&mut sql, plan.predicate);
    if !plan.order_by.is_empty() {
        sql.push_str(" ");
        sql.push_str(&plan.order_by);
    }

    if option == LimitOption::Rows {
        if let Some(skip) = skip {
            sql.push_str(" OFFSET ");
            sql.push_param(skip);
            sql.push_str(" ROWS");
            if let Some(take) = take {
                sql.push_str(" FETCH NEXT ");
                sql.push_param(take);
                sql.push_str(" ROWS ONLY");
            }
        }
    }
    sql.push_str(";");
    sql
}

fn output_clause(builder: &SqlBuilder<'_>, returning: Returning, new_prefix: &str) -> String {
    match returning {
        Returning::None => String::new(),
        Returning::New => format!(" OUTPUT {}", builder.build_select_clause(Some(new_prefix))),
        Returning::Old => format!(" OUTPUT {}", builder.build_select_clause(Some("Deleted."))),
    }
}

/// Wraps `statement` in `SET IDENTITY_INSERT` when an identity value is written.
fn with_identity_insert(plan: &WritePlan<'_, '_>, statement: Fragment) -> Fragment {
    let writes_identity = plan
        .builder
        .entries()
        .iter()
        .any(|e| e.insert && e.column.is_identity);
    if !(plan.identity_insert && writes_identity) {
        return statement;
    }
    let name = plan.builder.quoted_name();
    let mut sql = Fragment::text(format!("SET IDENTITY_INSERT {name} ON;\n"));
    sql.append(statement);
    sql.push_str(&format!("\nSET IDENTITY_INSERT {name} OFF;"));
    sql
}

fn write_token(plan: &WritePlan<'_, '_>, sql: Fragment) -> Result<TokenChain> {
    let token: ExecutionToken = sql
        .into_token(plan.dialect(), plan.operation)?
        .with_row_count_check(plan.row_count_check);
    Ok(TokenChain::single(token))
}

pub(super) fn insert(plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
    let output = output_clause(plan.builder, plan.returning, "Inserted.");
    let mut sql = insert_statement(plan.builder, &output)?;
    sql.push_str(";");
    write_token(plan, with_identity_insert(plan, sql))
}

pub(super) fn update(plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
    let output = output_clause(plan.builder, plan.returning, "Inserted.");
    let mut sql = update_statement(plan.builder, plan.predicate.clone(), &output)?;
    sql.push_str(";");
    write_token(plan, sql)
}

pub(super) fn delete(plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
    let output = output_clause(plan.builder, plan.returning, "Deleted.");
    let mut sql = delete_statement(plan.builder, plan.predicate.clone(), &output);
    sql.push_str(";");
    write_token(plan, sql)
}

/// `MERGE` keyed on the builder's key columns.
pub(super) fn upsert(plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
    let builder = plan.builder;
    let bound: Vec<_> = builder.entries().iter().filter(|e| e.use_parameter).collect();
    let source_columns = bound
        .iter()
        .map(|e| e.column.quoted_sql_name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let on = builder
        .key_columns()
        .map(|c| format!("target.{0} = source.{0}", c.quoted_sql_name))
        .collect::<Vec<_>>()
        .join(" AND ");
    let updates = builder
        .entries()
        .iter()
        .filter(|e| e.update)
        .map(|e| format!("target.{0} = source.{0}", e.column.quoted_sql_name))
        .collect::<Vec<_>>();
    let inserted: Vec<&str> = builder
        .entries()
        .iter()
        .filter(|e| e.insert)
        .map(|e| e.column.quoted_sql_name.as_str())
        .collect();

    let mut sql = Fragment::text(format!(
        "MERGE INTO {} WITH (HOLDLOCK) AS target USING (VALUES (",
        builder.quoted_name()
    ));
    sql.append(Fragment::join(
        bound.iter().map(|e| Fragment::param(e.parameter())),
        ", ",
    ));
    sql.push_str(&format!(") AS source ({source_columns}) ON {on}"));
    if !updates.is_empty() {
        sql.push_str(&format!(
            " WHEN MATCHED THEN UPDATE SET {}",
            updates.join(", ")
        ));
    }
    sql.push_str(&format!(
        " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
        inserted.join(", "),
        inserted
            .iter()
            .map(|c| format!("source.{c}"))
            .collect::<Vec<_>>()
            .join(", ")
    ));
    sql.push_str(&output_clause(builder, plan.returning, "Inserted."));
    sql.push_str(";");
    write_token(plan, with_identity_insert(plan, sql))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Limits, Parameter, ParameterOrigin};
    use crate::dialect::Dialect;

    fn plan(limits: Limits, order_by: &str) -> SelectPlan {
        SelectPlan {
            select_list: "[Id], [Name]".into(),
            source: Fragment::text("[dbo].[Customer]"),
            predicate: None,
            order_by: order_by.into(),
            limits,
        }
    }

    fn render(plan: SelectPlan) -> String {
        select(plan).render(Dialect::SqlServer).unwrap().0
    }

    #[test]
    fn test_top_and_offset() {
        assert_eq!(
            render(plan(Limits::rows(10), "")),
            "SELECT TOP (@fetch_row_count) [Id], [Name] FROM [dbo].[Customer];"
        );
        assert_eq!(
            render(plan(Limits::rows(10).skip(20), "ORDER BY [Id]")),
            "SELECT [Id], [Name] FROM [dbo].[Customer] ORDER BY [Id] \
             OFFSET @offset_row_count ROWS FETCH NEXT @fetch_row_count ROWS ONLY;"
        );
    }

    #[test]
    fn test_percentage_and_ties() {
        assert_eq!(
            render(plan(Limits::new(LimitOption::PercentageWithTies, 5), "ORDER BY [Name]")),
            "SELECT TOP (@fetch_row_count) PERCENT WITH TIES [Id], [Name] FROM [dbo].[Customer] ORDER BY [Name];"
        );
    }

    #[test]
    fn test_tablesample() {
        let mut p = plan(Limits::new(LimitOption::RandomSampleRows, 100).seed(42), "");
        let mut predicate = Fragment::text("[Name] = ");
        predicate.push_param(Parameter::new("@Name", "x", ParameterOrigin::Filter));
        p.predicate = Some(predicate);
        let (sql, params) = select(p).render(Dialect::SqlServer).unwrap();
        assert_eq!(
            sql,
            "SELECT [Id], [Name] FROM [dbo].[Customer] TABLESAMPLE SYSTEM (100 ROWS) REPEATABLE (42) WHERE [Name] = @Name;"
        );
        assert_eq!(params.len(), 1);
    }
}
