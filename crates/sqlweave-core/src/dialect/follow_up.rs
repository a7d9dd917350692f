//! Updates and deletes for engines that cannot return written rows
//! (MySQL and Access). Returned rows are read by a separate select before
//! or after the write, which needs a key predicate to find them again.

use super::{delete_statement, select_statement, update_statement};
use crate::builder::Fragment;
use crate::command::{Returning, WritePlan};
use crate::error::Result;
use crate::token::{ExecutionMode, ExecutionToken, TokenChain};

fn write_token(plan: &WritePlan<'_, '_>, mut sql: Fragment) -> Result<ExecutionToken> {
    sql.push_str(";");
    Ok(sql
        .into_token(plan.dialect(), plan.operation)?
        .with_row_count_check(plan.row_count_check))
}

fn read_token(plan: &WritePlan<'_, '_>, operation: &str) -> Result<ExecutionToken> {
    select_statement(plan.builder, plan.predicate.clone()).into_token(plan.dialect(), operation)
}

fn chain(plan: &WritePlan<'_, '_>, write: ExecutionToken, verb: &str) -> Result<TokenChain> {
    if plan.returning == Returning::None {
        return Ok(TokenChain::single(write));
    }
    if !plan.by_key {
        return Err(plan
            .dialect()
            .unsupported(format!("returning rows from a filtered {verb}")));
    }
    let write = write.with_mode(ExecutionMode::NonQuery);
    Ok(match plan.returning {
        Returning::New => {
            TokenChain::single(write).then(read_token(plan, &format!("ReadAfter{verb}"))?)
        }
        Returning::Old | Returning::None => {
            TokenChain::single(read_token(plan, &format!("ReadBefore{verb}"))?).then(write)
        }
    })
}

pub(super) fn update(plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
    let write = write_token(
        plan,
        update_statement(plan.builder, plan.predicate.clone(), "")?,
    )?;
    chain(plan, write, "Update")
}

pub(super) fn delete(plan: &WritePlan<'_, '_>) -> Result<TokenChain> {
    let write = write_token(
        plan,
        delete_statement(plan.builder, plan.predicate.clone(), ""),
    )?;
    chain(plan, write, "Delete")
}
