//! The driver boundary and the loop that walks a token chain.
//!
//! A driver only has to run one command at a time. The loop decides how
//! each link is executed, checks row counts, forwards scalars into the
//! next link and hands the materializer the result of the links that
//! belong to it.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, warn};

use crate::builder::{DesiredColumns, Parameter};
use crate::error::{Result, WeaveError};
use crate::settings::DataSourceSettings;
use crate::token::{CommandType, ExecutionMode, ExecutionToken, RunCondition, TokenChain};
use crate::value::SqlValue;

/// One command handed to a driver.
#[derive(Debug, Clone, Copy)]
pub struct Command<'a> {
    /// SQL text or procedure name.
    pub text: &'a str,
    /// How to interpret `text`.
    pub command_type: CommandType,
    /// Parameters in placeholder order.
    pub parameters: &'a [Parameter],
    /// Per-command timeout.
    pub timeout: Option<Duration>,
    /// Hint to stream large columns.
    pub sequential_access: bool,
}

impl<'a> Command<'a> {
    /// A text command without timeout.
    #[must_use]
    pub const fn new(text: &'a str, parameters: &'a [Parameter]) -> Self {
        Self {
            text,
            command_type: CommandType::Text,
            parameters,
            timeout: None,
            sequential_access: false,
        }
    }

    /// The command for a chain link.
    #[must_use]
    pub fn for_token(token: &'a ExecutionToken, settings: &DataSourceSettings) -> Self {
        Self {
            text: &token.command_text,
            command_type: token.command_type,
            parameters: &token.parameters,
            timeout: settings.command_timeout(),
            sequential_access: settings.sequential_access,
        }
    }
}

/// Rows returned by a reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    /// Creates a row set. Every row holds one value per column.
    #[must_use]
    pub const fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    /// Column names in result order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates over the rows.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    /// The first row.
    #[must_use]
    pub fn first(&self) -> Option<Row<'_>> {
        self.rows().next()
    }
}

/// A borrowed row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [SqlValue],
}

impl<'a> Row<'a> {
    /// The value of a column, matched case-insensitively.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&'a SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }

    /// The value at a position.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&'a SqlValue> {
        self.values.get(index)
    }

    /// All values in column order.
    #[must_use]
    pub const fn values(&self) -> &'a [SqlValue] {
        self.values
    }
}

/// A blocking database connection.
pub trait Connection {
    /// Executes a command and returns the affected row count.
    fn execute_non_query(&mut self, command: &Command<'_>) -> Result<u64>;

    /// Executes a command and returns the first column of the first row.
    fn execute_scalar(&mut self, command: &Command<'_>) -> Result<SqlValue>;

    /// Executes a command and returns its rows.
    fn execute_reader(&mut self, command: &Command<'_>) -> Result<RowSet>;
}

/// Opens blocking connections.
pub trait Driver: Send + Sync {
    /// The connection type.
    type Connection: Connection;

    /// Opens a connection.
    fn open_connection(&self) -> Result<Self::Connection>;
}

/// A non-blocking database connection.
#[allow(async_fn_in_trait)]
pub trait AsyncConnection {
    /// Executes a command and returns the affected row count.
    async fn execute_non_query(&mut self, command: &Command<'_>) -> Result<u64>;

    /// Executes a command and returns the first column of the first row.
    async fn execute_scalar(&mut self, command: &Command<'_>) -> Result<SqlValue>;

    /// Executes a command and returns its rows.
    async fn execute_reader(&mut self, command: &Command<'_>) -> Result<RowSet>;
}

/// How a materializer wants its links executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Read rows.
    Rows,
    /// Read one value.
    Scalar,
    /// Only count affected rows.
    NonQuery,
}

/// The result of one executed link.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Rows from a reader.
    Rows(RowSet),
    /// A scalar value.
    Scalar(SqlValue),
    /// Affected row count.
    Affected(u64),
}

impl Outcome {
    /// Row count used by the row-count check.
    #[must_use]
    pub fn affected(&self) -> u64 {
        match self {
            Self::Rows(rows) => rows.len() as u64,
            Self::Scalar(value) => u64::from(!value.is_null()),
            Self::Affected(n) => *n,
        }
    }
}

/// Turns the result of a chain into the caller's output.
pub trait Materializer {
    /// What the caller gets back.
    type Output;

    /// Columns the caller wants; used when preparing the chain.
    fn desired_columns(&self) -> DesiredColumns;

    /// How materializer links are executed.
    fn read_mode(&self) -> ReadMode;

    /// Builds the output from the last materializer link's outcome.
    fn finish(self, outcome: Outcome) -> Result<Self::Output>;
}

/// Returns the affected row count.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonQueryMaterializer;

impl Materializer for NonQueryMaterializer {
    type Output = u64;

    fn desired_columns(&self) -> DesiredColumns {
        DesiredColumns::None
    }

    fn read_mode(&self) -> ReadMode {
        ReadMode::NonQuery
    }

    fn finish(self, outcome: Outcome) -> Result<u64> {
        Ok(outcome.affected())
    }
}

/// Returns rows.
#[derive(Debug, Clone, Default)]
pub struct RowsMaterializer {
    desired: DesiredColumns,
}

impl RowsMaterializer {
    /// Reads the named columns, or every column for [`DesiredColumns::All`].
    #[must_use]
    pub const fn new(desired: DesiredColumns) -> Self {
        Self { desired }
    }

    /// Reads every column.
    #[must_use]
    pub const fn all() -> Self {
        Self::new(DesiredColumns::All)
    }
}

impl Materializer for RowsMaterializer {
    type Output = RowSet;

    fn desired_columns(&self) -> DesiredColumns {
        self.desired.clone()
    }

    fn read_mode(&self) -> ReadMode {
        ReadMode::Rows
    }

    fn finish(self, outcome: Outcome) -> Result<RowSet> {
        match outcome {
            Outcome::Rows(rows) => Ok(rows),
            Outcome::Scalar(value) => Ok(RowSet::new(vec![String::new()], vec![vec![value]])),
            Outcome::Affected(_) => Ok(RowSet::default()),
        }
    }
}

/// Returns a single value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarMaterializer;

impl Materializer for ScalarMaterializer {
    type Output = SqlValue;

    fn desired_columns(&self) -> DesiredColumns {
        DesiredColumns::None
    }

    fn read_mode(&self) -> ReadMode {
        ReadMode::Scalar
    }

    fn finish(self, outcome: Outcome) -> Result<SqlValue> {
        Ok(match outcome {
            Outcome::Scalar(value) => value,
            Outcome::Rows(rows) => rows
                .first()
                .and_then(|row| row.value(0).cloned())
                .unwrap_or(SqlValue::Null),
            Outcome::Affected(n) => SqlValue::Int(i64::try_from(n).unwrap_or(i64::MAX)),
        })
    }
}

/// Progress through a chain, shared by the blocking and async loops.
struct ChainState {
    pending: VecDeque<ExecutionToken>,
    next_index: usize,
    previous_affected: Option<u64>,
    outcome: Option<Outcome>,
}

impl ChainState {
    /// Rejects scalar-forwarding links that have nothing to forward to.
    fn new(chain: TokenChain) -> Result<Self> {
        let tokens = chain.into_tokens();
        let last = tokens.len().saturating_sub(1);
        for (index, token) in tokens.iter().enumerate() {
            if let ExecutionMode::ScalarAndForward(forwarder) = &token.execution_mode {
                if forwarder.is_none() || index == last {
                    return Err(WeaveError::MissingForwarder {
                        index,
                        operation: token.operation_name.clone(),
                    });
                }
            }
        }
        Ok(Self {
            pending: tokens.into(),
            next_index: 0,
            previous_affected: None,
            outcome: None,
        })
    }

    fn next_link(&mut self) -> Option<(usize, ExecutionToken)> {
        while let Some(token) = self.pending.pop_front() {
            let index = self.next_index;
            self.next_index += 1;
            let runs = match token.run_condition {
                RunCondition::Always => true,
                RunCondition::PreviousAffectedNone => self.previous_affected == Some(0),
            };
            if runs {
                return Some((index, token));
            }
            debug!(operation = %token.operation_name, index, "skipping link");
        }
        None
    }

    fn record(&mut self, index: usize, token: &ExecutionToken, outcome: Outcome) -> Result<()> {
        let affected = outcome.affected();
        if let Err(err) = token
            .row_count_check
            .verify(&token.operation_name, affected)
        {
            warn!(operation = %token.operation_name, index, affected, "row count check failed");
            return Err(err);
        }
        self.previous_affected = Some(affected);

        match &token.execution_mode {
            ExecutionMode::Materializer => self.outcome = Some(outcome),
            ExecutionMode::NonQuery => {}
            ExecutionMode::ScalarAndForward(forwarder) => {
                let (Some(forwarder), Some(next)) = (forwarder, self.pending.front_mut()) else {
                    return Err(WeaveError::MissingForwarder {
                        index,
                        operation: token.operation_name.clone(),
                    });
                };
                let value = match outcome {
                    Outcome::Scalar(value) => value,
                    _ => SqlValue::Null,
                };
                forwarder.forward(&value, &mut next.parameters)?;
            }
        }
        Ok(())
    }

    fn finish(self) -> Outcome {
        self.outcome
            .unwrap_or(Outcome::Affected(self.previous_affected.unwrap_or(0)))
    }
}

fn link_mode(token: &ExecutionToken, materializer_mode: ReadMode) -> ReadMode {
    match token.execution_mode {
        ExecutionMode::Materializer => materializer_mode,
        ExecutionMode::NonQuery => ReadMode::NonQuery,
        ExecutionMode::ScalarAndForward(_) => ReadMode::Scalar,
    }
}

fn log_link(index: usize, token: &ExecutionToken, mode: ReadMode) {
    debug!(
        index,
        operation = %token.operation_name,
        mode = ?mode,
        parameters = token.parameters.len(),
        sql = %token.command_text,
        "executing link"
    );
}

/// Walks a chain over a blocking connection.
pub fn execute_chain<C, M>(
    connection: &mut C,
    chain: TokenChain,
    materializer: M,
    settings: &DataSourceSettings,
) -> Result<M::Output>
where
    C: Connection + ?Sized,
    M: Materializer,
{
    let materializer_mode = materializer.read_mode();
    let mut state = ChainState::new(chain)?;
    while let Some((index, token)) = state.next_link() {
        let mode = link_mode(&token, materializer_mode);
        log_link(index, &token, mode);
        let command = Command::for_token(&token, settings);
        let outcome = match mode {
            ReadMode::Rows => Outcome::Rows(connection.execute_reader(&command)?),
            ReadMode::Scalar => Outcome::Scalar(connection.execute_scalar(&command)?),
            ReadMode::NonQuery => Outcome::Affected(connection.execute_non_query(&command)?),
        };
        state.record(index, &token, outcome)?;
    }
    materializer.finish(state.finish())
}

/// Walks a chain over an async connection.
///
/// Dropping the future abandons the chain between links; links that already
/// ran are not rolled back.
pub async fn execute_chain_async<C, M>(
    connection: &mut C,
    chain: TokenChain,
    materializer: M,
    settings: &DataSourceSettings,
) -> Result<M::Output>
where
    C: AsyncConnection + ?Sized,
    M: Materializer,
{
    let materializer_mode = materializer.read_mode();
    let mut state = ChainState::new(chain)?;
    while let Some((index, token)) = state.next_link() {
        let mode = link_mode(&token, materializer_mode);
        log_link(index, &token, mode);
        let command = Command::for_token(&token, settings);
        let outcome = match mode {
            ReadMode::Rows => Outcome::Rows(connection.execute_reader(&command).await?),
            ReadMode::Scalar => Outcome::Scalar(connection.execute_scalar(&command).await?),
            ReadMode::NonQuery => {
                Outcome::Affected(connection.execute_non_query(&command).await?)
            }
        };
        state.record(index, &token, outcome)?;
    }
    materializer.finish(state.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ParameterOrigin;
    use crate::token::{Forwarder, RowCountCheck};

    /// Replays scripted outcomes and records what it ran.
    #[derive(Default)]
    struct Script {
        outcomes: VecDeque<Outcome>,
        ran: Vec<(String, Vec<Parameter>)>,
    }

    impl Script {
        fn new(outcomes: Vec<Outcome>) -> Self {
            Self {
                outcomes: outcomes.into(),
                ran: Vec::new(),
            }
        }

        fn next(&mut self, command: &Command<'_>) -> Outcome {
            self.ran
                .push((command.text.to_string(), command.parameters.to_vec()));
            self.outcomes.pop_front().unwrap_or(Outcome::Affected(0))
        }
    }

    impl Connection for Script {
        fn execute_non_query(&mut self, command: &Command<'_>) -> Result<u64> {
            Ok(self.next(command).affected())
        }

        fn execute_scalar(&mut self, command: &Command<'_>) -> Result<SqlValue> {
            match self.next(command) {
                Outcome::Scalar(value) => Ok(value),
                other => Ok(SqlValue::Int(other.affected() as i64)),
            }
        }

        fn execute_reader(&mut self, command: &Command<'_>) -> Result<RowSet> {
            match self.next(command) {
                Outcome::Rows(rows) => Ok(rows),
                _ => Ok(RowSet::default()),
            }
        }
    }

    fn token(op: &str, text: &str) -> ExecutionToken {
        ExecutionToken::new(op, text, Vec::new())
    }

    #[test]
    fn test_forwarder_feeds_next_link() {
        let read = ExecutionToken::new(
            "ReadBack",
            "SELECT * FROM t WHERE Id = ?",
            vec![Parameter::new("@Identity", SqlValue::Null, ParameterOrigin::Key)],
        );
        let chain = TokenChain::new(vec![
            token("Insert", "INSERT").with_mode(ExecutionMode::NonQuery),
            token("FetchIdentity", "SELECT @@IDENTITY").with_mode(
                ExecutionMode::ScalarAndForward(Some(Forwarder::bind_parameter("@Identity"))),
            ),
            read,
        ]);
        let rows = RowSet::new(vec!["Id".into()], vec![vec![SqlValue::Int(42)]]);
        let mut script = Script::new(vec![
            Outcome::Affected(1),
            Outcome::Scalar(SqlValue::Int(42)),
            Outcome::Rows(rows.clone()),
        ]);
        let result = execute_chain(
            &mut script,
            chain,
            RowsMaterializer::all(),
            &DataSourceSettings::default(),
        )
        .unwrap();
        assert_eq!(result, rows);
        assert_eq!(script.ran[2].1[0].value, SqlValue::Int(42));
    }

    #[test]
    fn test_missing_forwarder() {
        let chain = TokenChain::new(vec![
            token("Scalar", "SELECT 1").with_mode(ExecutionMode::ScalarAndForward(None)),
            token("Next", "SELECT 2"),
        ]);
        let err = execute_chain(
            &mut Script::default(),
            chain,
            NonQueryMaterializer,
            &DataSourceSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, WeaveError::MissingForwarder { index: 0, .. }));
    }

    #[test]
    fn test_run_condition_skips_insert() {
        let chain = TokenChain::new(vec![
            token("UpsertUpdate", "UPDATE").with_mode(ExecutionMode::NonQuery),
            token("UpsertInsert", "INSERT").with_condition(RunCondition::PreviousAffectedNone),
        ]);
        let mut script = Script::new(vec![Outcome::Affected(1)]);
        let affected = execute_chain(
            &mut script,
            chain.clone(),
            NonQueryMaterializer,
            &DataSourceSettings::default(),
        )
        .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(script.ran.len(), 1);

        let mut script = Script::new(vec![Outcome::Affected(0), Outcome::Affected(1)]);
        execute_chain(
            &mut script,
            chain,
            NonQueryMaterializer,
            &DataSourceSettings::default(),
        )
        .unwrap();
        assert_eq!(script.ran.len(), 2);
    }

    #[test]
    fn test_row_count_mismatch() {
        let chain = TokenChain::single(
            token("UpdateObject", "UPDATE").with_row_count_check(RowCountCheck::ExactlyOne),
        );
        let err = execute_chain(
            &mut Script::new(vec![Outcome::Affected(0)]),
            chain,
            NonQueryMaterializer,
            &DataSourceSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, WeaveError::RowCountMismatch { actual: 0, .. }));
    }

    #[test]
    fn test_scalar_of_counted_write() {
        let chain = TokenChain::single(
            token("Insert", "INSERT")
                .with_mode(ExecutionMode::NonQuery)
                .with_row_count_check(RowCountCheck::ExactlyOne),
        );
        let value = execute_chain(
            &mut Script::new(vec![Outcome::Affected(1)]),
            chain,
            ScalarMaterializer,
            &DataSourceSettings::default(),
        )
        .unwrap();
        assert_eq!(value, SqlValue::Int(1));
    }
}
