//! Writes for engines with a `RETURNING` clause (PostgreSQL and SQLite).

use super::{delete_statement, insert_statement, select_statement, update_statement};
use crate::builder::{Fragment, SqlBuilder};
use crate::command::{Returning, WritePlan};
use crate::dialect::Dialect;
use crate::error::Result;
use crate::token::{ExecutionMode, TokenChain};

fn push_returning(sql: &mut Fragment, builder: &SqlBuilder<'_>, returning: Returning) {
    if returning != Returning::None {
        sql.push_str(" RETURNING ");
        sql.push_str(&builder.build_select_clause(None));
    }
}

fn finish(plan: &WritePlan<'_, '_>, mut sql: Fragment) -> Result<TokenChain> {
    push_returning(&mut sql, plan.builder, plan.returning);
    sql.push_str(";");
    Ok(TokenChain::single(
        sql.into_token(plan.dialect(), plan.operation)?
            .with_row_count_check(plan.row_count_check),
    ))
}

pub(super) fn insert(plan: &WritePlan<'_, '_>, infix: &str) -> Result<TokenChain> {
    finish(plan, insert_statement(plan.builder, infix)?)
}

/// `RETURNING` only sees new values, so old values are read by a select
/// that runs before the update.
pub(super) fn update(plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
    let sql = update_statement(plan.builder, plan.predicate.clone(), "")?;
    if plan.returning != Returning::Old {
        return finish(plan, sql);
    }
    let dialect = plan.dialect();
    let before = select_statement(plan.builder, plan.predicate.clone())
        .into_token(dialect, "ReadBeforeUpdate")?;
    let mut sql = sql;
    sql.push_str(";");
    let write = sql
        .into_token(dialect, plan.operation)?
        .with_mode(ExecutionMode::NonQuery)
        .with_row_count_check(plan.row_count_check);
    Ok(TokenChain::new(vec![before, write]))
}

pub(super) fn delete(plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
    finish(plan, delete_statement(plan.builder, plan.predicate.clone(), ""))
}

/// `INSERT ... ON CONFLICT (keys) DO UPDATE`.
///
/// With nothing to update, `DO NOTHING` is used unless rows are returned,
/// in which case the keys are assigned to themselves so the existing row is
/// still reported.
pub(super) fn upsert(plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
    let builder = plan.builder;
    let infix = if plan.dialect() == Dialect::PostgreSql {
        super::postgres::identity_override(plan)
    } else {
        ""
    };
    let mut sql = insert_statement(builder, infix)?;
    let keys = builder
        .key_columns()
        .map(|c| c.quoted_sql_name.as_str())
        .collect::<Vec<_>>();
    let mut assignments: Vec<String> = builder
        .entries()
        .iter()
        .filter(|e| e.update)
        .map(|e| format!("{0} = EXCLUDED.{0}", e.column.quoted_sql_name))
        .collect();
    if assignments.is_empty() && plan.returning != Returning::None {
        assignments = keys.iter().map(|k| format!("{k} = EXCLUDED.{k}")).collect();
    }

    sql.push_str(&format!(" ON CONFLICT ({})", keys.join(", ")));
    if assignments.is_empty() {
        sql.push_str(" DO NOTHING");
    } else {
        sql.push_str(" DO UPDATE SET ");
        sql.push_str(&assignments.join(", "));
    }
    finish(plan, sql)
}
