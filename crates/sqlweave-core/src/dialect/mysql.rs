//! MySQL and MariaDB statements.

use super::{insert_statement, push_where, select_statement};
use crate::builder::{Fragment, LimitOption, SqlBuilder};
use crate::command::{Returning, SelectPlan, WritePlan};
use crate::error::{Result, WeaveError};
use crate::metadata::{DbType, IntrospectionQueries};
use crate::token::{ExecutionMode, TokenChain};

pub(super) fn db_type(base: &str) -> Option<DbType> {
    Some(match base {
        "bit" | "bool" | "boolean" => DbType::Boolean,
        "tinyint" => DbType::TinyInt,
        "smallint" | "year" => DbType::SmallInt,
        "mediumint" | "int" | "integer" => DbType::Int,
        "bigint" => DbType::BigInt,
        "decimal" | "numeric" | "dec" | "fixed" => DbType::Decimal,
        "float" => DbType::Real,
        "double" | "double precision" | "real" => DbType::Double,
        "char" => DbType::Char,
        "varchar" | "enum" | "set" => DbType::VarChar,
        "tinytext" | "text" | "mediumtext" | "longtext" => DbType::Text,
        "binary" => DbType::Binary,
        "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => DbType::VarBinary,
        "date" => DbType::Date,
        "time" => DbType::Time,
        "datetime" | "timestamp" => DbType::DateTime,
        "json" => DbType::Json,
        _ => return None,
    })
}

pub(super) static INTROSPECTION: IntrospectionQueries = IntrospectionQueries {
    objects: concat!(
        "SELECT TABLE_SCHEMA AS schema_name, TABLE_NAME AS object_name, ",
        "CASE TABLE_TYPE WHEN 'VIEW' THEN 'VIEW' ELSE 'TABLE' END AS object_type ",
        "FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = DATABASE() ",
        "UNION ALL ",
        "SELECT ROUTINE_SCHEMA, ROUTINE_NAME, 'PROCEDURE' ",
        "FROM INFORMATION_SCHEMA.ROUTINES ",
        "WHERE ROUTINE_SCHEMA = DATABASE() AND ROUTINE_TYPE = 'PROCEDURE'"
    ),
    table: concat!(
        "SELECT TABLE_SCHEMA AS schema_name, TABLE_NAME AS object_name, ",
        "TABLE_TYPE = 'BASE TABLE' AS is_table ",
        "FROM INFORMATION_SCHEMA.TABLES ",
        "WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?"
    ),
    columns: concat!(
        "SELECT COLUMN_NAME AS column_name, COLUMN_TYPE AS type_name, ",
        "IS_NULLABLE = 'YES' AS is_nullable, EXTRA LIKE '%auto_increment%' AS is_identity, ",
        "EXTRA LIKE '%GENERATED%' AS is_computed, COLUMN_KEY = 'PRI' AS is_primary_key, ",
        "CHARACTER_MAXIMUM_LENGTH AS max_length, NUMERIC_PRECISION AS `precision`, ",
        "NUMERIC_SCALE AS scale ",
        "FROM INFORMATION_SCHEMA.COLUMNS ",
        "WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ? ",
        "ORDER BY ORDINAL_POSITION"
    ),
    indexes: concat!(
        "SELECT INDEX_NAME AS index_name, NON_UNIQUE = 0 AS is_unique, ",
        "INDEX_NAME = 'PRIMARY' AS is_primary_key, COLUMN_NAME AS column_name, ",
        "COLLATION = 'D' AS is_descending ",
        "FROM INFORMATION_SCHEMA.STATISTICS ",
        "WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ? ",
        "ORDER BY INDEX_NAME, SEQ_IN_INDEX"
    ),
    routine: concat!(
        "SELECT ROUTINE_SCHEMA AS schema_name, ROUTINE_NAME AS object_name, ",
        "'PROCEDURE' AS object_type ",
        "FROM INFORMATION_SCHEMA.ROUTINES ",
        "WHERE ROUTINE_SCHEMA = COALESCE(?, DATABASE()) AND ROUTINE_NAME = ? ",
        "AND ROUTINE_TYPE = 'PROCEDURE'"
    ),
    parameters: concat!(
        "SELECT PARAMETER_NAME AS parameter_name, DTD_IDENTIFIER AS type_name, ",
        "PARAMETER_MODE AS parameter_mode ",
        "FROM INFORMATION_SCHEMA.PARAMETERS ",
        "WHERE SPECIFIC_SCHEMA = COALESCE(?, DATABASE()) AND SPECIFIC_NAME = ? ",
        "AND ORDINAL_POSITION > 0 ORDER BY ORDINAL_POSITION"
    ),
    function_columns: "",
};

pub(super) fn select(plan: SelectPlan) -> Fragment {
    let option = plan.limits.effective_option();
    let skip = plan.skip_parameter();
    let take = plan.take_parameter();

    let mut sql = Fragment::text(format!("SELECT {} FROM ", plan.select_list));
    sql.append(plan.source);
    push_where(&mut sql, plan.predicate);

    if option == LimitOption::RandomSampleRows {
        match plan.limits.seed {
            Some(seed) => sql.push_str(&format!(" ORDER BY RAND({seed})")),
            None => sql.push_str(" ORDER BY RAND()"),
        }
    } else if !plan.order_by.is_empty() {
        sql.push_str(" ");
        sql.push_str(&plan.order_by);
    }

    if matches!(option, LimitOption::Rows | LimitOption::RandomSampleRows) {
        match take {
            Some(take) => {
                sql.push_str(" LIMIT ");
                sql.push_param(take);
            }
            None if skip.is_some() => sql.push_str(" LIMIT 18446744073709551615"),
            None => {}
        }
        if let Some(skip) = skip {
            sql.push_str(" OFFSET ");
            sql.push_param(skip);
        }
    }
    sql.push_str(";");
    sql
}

/// Reads the written row back: by `LAST_INSERT_ID()` when the database
/// generated the identity, otherwise by the supplied key values.
fn select_inserted(plan: &WritePlan<'_, '_>) -> Result<Fragment> {
    let builder = plan.builder;
    let generated = builder
        .entries()
        .iter()
        .find(|e| e.column.is_identity && !e.insert);
    match generated {
        Some(identity) => Ok(select_statement(
            builder,
            Some(Fragment::text(format!(
                "{} = LAST_INSERT_ID()",
                identity.column.quoted_sql_name
            ))),
        )),
        None => Ok(select_statement(
            builder,
            Some(builder.build_anonymous_where_clause()?),
        )),
    }
}

fn with_read_back(plan: &WritePlan<'_, '_>, write: Fragment, read: Fragment) -> Result<TokenChain> {
    let dialect = plan.dialect();
    let write = write
        .into_token(dialect, plan.operation)?
        .with_mode(ExecutionMode::NonQuery)
        .with_row_count_check(plan.row_count_check);
    Ok(TokenChain::single(write).then(read.into_token(dialect, "ReadBack")?))
}

pub(super) fn insert(plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
    let mut sql = insert_statement(plan.builder, "")?;
    sql.push_str(";");
    match plan.returning {
        Returning::None => Ok(TokenChain::single(
            sql.into_token(plan.dialect(), plan.operation)?
                .with_row_count_check(plan.row_count_check),
        )),
        Returning::New | Returning::Old => with_read_back(plan, sql, select_inserted(plan)?),
    }
}

fn update_assignments(builder: &SqlBuilder<'_>, returning: Returning) -> Vec<String> {
    let mut assignments: Vec<String> = builder
        .entries()
        .iter()
        .filter(|e| e.update)
        .map(|e| format!("{0} = VALUES({0})", e.column.quoted_sql_name))
        .collect();
    if assignments.is_empty() && returning != Returning::None {
        assignments = builder
            .key_columns()
            .map(|c| format!("{0} = {0}", c.quoted_sql_name))
            .collect();
    }
    assignments
}

/// `INSERT ... ON DUPLICATE KEY UPDATE`, or `INSERT IGNORE` when nothing
/// can be updated.
pub(super) fn upsert(plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
    let builder = plan.builder;
    let (columns, values) = builder.build_insert_clause()?;
    let assignments = update_assignments(builder, plan.returning);
    let verb = if assignments.is_empty() {
        "INSERT IGNORE INTO"
    } else {
        "INSERT INTO"
    };
    let mut sql = Fragment::text(format!(
        "{verb} {} ({columns}) VALUES (",
        builder.quoted_name()
    ));
    sql.append(values);
    sql.push_str(")");
    if !assignments.is_empty() {
        sql.push_str(" ON DUPLICATE KEY UPDATE ");
        sql.push_str(&assignments.join(", "));
    }
    sql.push_str(";");

    match plan.returning {
        Returning::None => Ok(TokenChain::single(
            sql.into_token(plan.dialect(), plan.operation)?
                .with_row_count_check(plan.row_count_check),
        )),
        Returning::New | Returning::Old => {
            if !builder.has_key_values() {
                return Err(WeaveError::Mapping(format!(
                    "returning upserted rows from {} needs a value for every key column",
                    builder.quoted_name()
                )));
            }
            let read = select_statement(builder, Some(builder.build_anonymous_where_clause()?));
            with_read_back(plan, sql, read)
        }
    }
}
