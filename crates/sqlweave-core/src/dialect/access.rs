//! Access (Jet/ACE) statements.
//!
//! Access has no paging beyond `TOP`, no upsert statement and no way to
//! return written rows, so writes that need more than one statement are
//! expressed as token chains.

use super::{insert_statement, push_where, select_statement, update_statement};
use crate::builder::{Fragment, LimitOption, Parameter, ParameterOrigin};
use crate::command::{Returning, SelectPlan, WritePlan};
use crate::dialect::Dialect;
use crate::error::{Result, WeaveError};
use crate::metadata::DbType;
use crate::token::{ExecutionMode, Forwarder, RunCondition, TokenChain};
use crate::value::SqlValue;

pub(super) fn db_type(base: &str) -> Option<DbType> {
    Some(match base {
        "bit" | "yesno" | "logical" => DbType::Boolean,
        "byte" => DbType::TinyInt,
        "short" | "smallint" | "integer2" => DbType::SmallInt,
        "long" | "int" | "integer" | "counter" | "autoincrement" => DbType::Int,
        "bigint" => DbType::BigInt,
        "decimal" | "numeric" => DbType::Decimal,
        "currency" | "money" => DbType::Money,
        "single" | "real" => DbType::Real,
        "double" | "float" => DbType::Double,
        "char" => DbType::Char,
        "text" | "varchar" | "string" => DbType::VarChar,
        "longtext" | "memo" | "longchar" => DbType::Text,
        "binary" => DbType::Binary,
        "varbinary" | "longbinary" | "oleobject" => DbType::VarBinary,
        "datetime" | "date" => DbType::DateTime,
        "guid" | "uniqueidentifier" => DbType::Guid,
        _ => return None,
    })
}

pub(super) fn select(plan: SelectPlan) -> Result<Fragment> {
    let option = plan.limits.effective_option();
    if plan.limits.has_skip() {
        return Err(Dialect::Access.unsupported("skipping rows"));
    }
    let top = match (option, plan.limits.take) {
        (LimitOption::Rows, Some(n)) => format!("TOP {n} "),
        (LimitOption::Percentage, Some(n)) => format!("TOP {n} PERCENT "),
        (LimitOption::None | LimitOption::Rows, None) => String::new(),
        (other, _) => return Err(Dialect::Access.unsupported(other.to_string())),
    };
    let mut sql = Fragment::text(format!("SELECT {top}{} FROM ", plan.select_list));
    sql.append(plan.source);
    push_where(&mut sql, plan.predicate);
    if !plan.order_by.is_empty() {
        sql.push_str(" ");
        sql.push_str(&plan.order_by);
    }
    sql.push_str(";");
    Ok(sql)
}

/// Insert, then read the row back through `@@IDENTITY` or the key values.
pub(super) fn insert(plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
    let builder = plan.builder;
    let mut sql = insert_statement(builder, "")?;
    sql.push_str(";");
    let write = sql
        .into_token(Dialect::Access, plan.operation)?
        .with_row_count_check(plan.row_count_check);
    if plan.returning == Returning::None {
        return Ok(TokenChain::single(write));
    }

    let write = write.with_mode(ExecutionMode::NonQuery);
    let generated = builder
        .entries()
        .iter()
        .find(|e| e.column.is_identity && !e.insert);
    match generated {
        Some(identity) => {
            let fetch_identity = Fragment::text("SELECT @@IDENTITY;")
                .into_token(Dialect::Access, "FetchIdentity")?
                .with_mode(ExecutionMode::ScalarAndForward(Some(Forwarder::bind_parameter(
                    "@Identity",
                ))));
            let mut predicate = Fragment::text(format!("{} = ", identity.column.quoted_sql_name));
            predicate.push_param(
                Parameter::new("@Identity", SqlValue::Null, ParameterOrigin::Key)
                    .with_db_type(identity.column.db_type),
            );
            let read = select_statement(builder, Some(predicate))
                .into_token(Dialect::Access, "ReadBack")?;
            Ok(TokenChain::new(vec![write, fetch_identity, read]))
        }
        None => {
            let read = select_statement(builder, Some(builder.build_anonymous_where_clause()?))
                .into_token(Dialect::Access, "ReadBack")?;
            Ok(TokenChain::new(vec![write, read]))
        }
    }
}

/// Update by key, then insert when the update touched no row.
///
/// When nothing besides the key is supplied the update assigns the key to
/// itself so its affected-row count still reports whether the row exists.
pub(super) fn upsert(plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
    let builder = plan.builder;
    let predicate = builder.build_anonymous_where_clause()?;
    let has_updates = builder.entries().iter().any(|e| e.update);
    let mut update = if has_updates {
        update_statement(builder, Some(predicate.clone()), "")?
    } else {
        let self_assignment = builder
            .key_columns()
            .map(|c| format!("{0} = {0}", c.quoted_sql_name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = Fragment::text(format!(
            "UPDATE {} SET {self_assignment} WHERE ",
            builder.quoted_name()
        ));
        sql.append(predicate.clone());
        sql
    };
    update.push_str(";");
    let update = update
        .into_token(Dialect::Access, "UpsertUpdate")?
        .with_mode(ExecutionMode::NonQuery);

    let mut insert = insert_statement(builder, "")?;
    insert.push_str(";");
    let insert = insert
        .into_token(Dialect::Access, "UpsertInsert")?
        .with_condition(RunCondition::PreviousAffectedNone);

    match plan.returning {
        Returning::None => Ok(TokenChain::new(vec![update, insert])),
        Returning::New | Returning::Old => {
            if !builder.has_key_values() {
                return Err(WeaveError::Mapping(format!(
                    "returning upserted rows from {} needs a value for every key column",
                    builder.quoted_name()
                )));
            }
            let read = select_statement(builder, Some(predicate))
                .into_token(Dialect::Access, "ReadBack")?;
            Ok(TokenChain::new(vec![
                update,
                insert.with_mode(ExecutionMode::NonQuery),
                read,
            ]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Limits;

    fn plan(limits: Limits) -> SelectPlan {
        SelectPlan {
            select_list: "[Id]".into(),
            source: Fragment::text("[Orders]"),
            predicate: None,
            order_by: String::new(),
            limits,
        }
    }

    #[test]
    fn test_top_is_inlined() {
        let (sql, params) = select(plan(Limits::rows(25)))
            .unwrap()
            .render(Dialect::Access)
            .unwrap();
        assert_eq!(sql, "SELECT TOP 25 [Id] FROM [Orders];");
        assert!(params.is_empty());

        let (sql, _) = select(plan(Limits::new(LimitOption::Percentage, 10)))
            .unwrap()
            .render(Dialect::Access)
            .unwrap();
        assert_eq!(sql, "SELECT TOP 10 PERCENT [Id] FROM [Orders];");
    }

    #[test]
    fn test_skip_is_unsupported() {
        let err = select(plan(Limits::rows(5).skip(5))).unwrap_err();
        assert!(matches!(err, WeaveError::Unsupported { .. }));
    }
}
