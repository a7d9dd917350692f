//! Execution tokens: fully resolved units of SQL ready for a driver.
//!
//! A prepared operation is a [`TokenChain`], an ordered, immutable list of
//! [`ExecutionToken`]s. Chains reference no metadata; everything a driver
//! needs is materialized into the command text and parameter list.

use std::fmt;
use std::sync::Arc;

use crate::builder::Parameter;
use crate::error::{Result, WeaveError};
use crate::value::SqlValue;

/// How the driver should interpret the command text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandType {
    /// Plain SQL text.
    #[default]
    Text,
    /// The text is the name of a stored procedure.
    StoredProcedure,
}

/// Callback that feeds a scalar result into the parameters of the next link.
#[derive(Clone)]
pub struct Forwarder(Arc<dyn Fn(&SqlValue, &mut Vec<Parameter>) -> Result<()> + Send + Sync>);

impl Forwarder {
    /// Wraps an arbitrary forwarding closure.
    pub fn new(
        f: impl Fn(&SqlValue, &mut Vec<Parameter>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    /// A forwarder that writes the scalar into the parameter called `name`.
    ///
    /// The parameter must already exist on the next link.
    #[must_use]
    pub fn bind_parameter(name: &str) -> Self {
        let name = name.to_string();
        Self::new(move |value, params| {
            let slot = params
                .iter_mut()
                .find(|p| p.name.eq_ignore_ascii_case(&name))
                .ok_or_else(|| {
                    WeaveError::InvalidOperation(format!(
                        "forwarded parameter '{name}' does not exist on the next command"
                    ))
                })?;
            slot.value = value.clone();
            Ok(())
        })
    }

    /// Applies the forwarder.
    pub fn forward(&self, value: &SqlValue, params: &mut Vec<Parameter>) -> Result<()> {
        (self.0)(value, params)
    }
}

impl fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Forwarder(..)")
    }
}

/// What the execution loop does with a link.
#[derive(Debug, Clone, Default)]
pub enum ExecutionMode {
    /// Hand the command to the materializer.
    #[default]
    Materializer,
    /// Execute for side effects; only the row count is kept.
    NonQuery,
    /// Execute as a scalar and feed the value into the next link.
    ScalarAndForward(Option<Forwarder>),
}

/// Whether a link runs at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunCondition {
    /// Always run.
    #[default]
    Always,
    /// Run only when the previous link affected no rows.
    PreviousAffectedNone,
}

/// Expected number of rows affected by a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowCountCheck {
    /// Any count is fine.
    #[default]
    Ignore,
    /// Exactly one row.
    ExactlyOne,
    /// Zero or one row.
    AtMostOne,
}

impl RowCountCheck {
    /// Checks an affected-row count against this expectation.
    #[must_use]
    pub const fn accepts(self, affected: u64) -> bool {
        match self {
            Self::Ignore => true,
            Self::ExactlyOne => affected == 1,
            Self::AtMostOne => affected <= 1,
        }
    }

    /// Returns a `RowCountMismatch` error when `affected` is not accepted.
    pub fn verify(self, operation: &str, affected: u64) -> Result<()> {
        if self.accepts(affected) {
            Ok(())
        } else {
            Err(WeaveError::RowCountMismatch {
                operation: operation.to_string(),
                expected: self,
                actual: affected,
            })
        }
    }
}

impl fmt::Display for RowCountCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ignore => "any number of rows",
            Self::ExactlyOne => "exactly one row",
            Self::AtMostOne => "at most one row",
        })
    }
}

/// One executable statement.
#[derive(Debug, Clone)]
pub struct ExecutionToken {
    /// SQL text, or procedure name for [`CommandType::StoredProcedure`].
    pub command_text: String,
    /// How to interpret `command_text`.
    pub command_type: CommandType,
    /// Bound parameters in placeholder order.
    pub parameters: Vec<Parameter>,
    /// Logical operation, used in logs and errors.
    pub operation_name: String,
    /// What the execution loop does with the result.
    pub execution_mode: ExecutionMode,
    /// Whether the link runs.
    pub run_condition: RunCondition,
    /// Row-count expectation checked after execution.
    pub row_count_check: RowCountCheck,
}

impl ExecutionToken {
    /// Creates a materializer link that always runs and checks nothing.
    pub fn new(
        operation_name: impl Into<String>,
        command_text: impl Into<String>,
        parameters: Vec<Parameter>,
    ) -> Self {
        Self {
            command_text: command_text.into(),
            command_type: CommandType::Text,
            parameters,
            operation_name: operation_name.into(),
            execution_mode: ExecutionMode::Materializer,
            run_condition: RunCondition::Always,
            row_count_check: RowCountCheck::Ignore,
        }
    }

    /// Sets the execution mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Sets the run condition.
    #[must_use]
    pub const fn with_condition(mut self, condition: RunCondition) -> Self {
        self.run_condition = condition;
        self
    }

    /// Sets the row-count check.
    #[must_use]
    pub const fn with_row_count_check(mut self, check: RowCountCheck) -> Self {
        self.row_count_check = check;
        self
    }

    /// Marks the text as a stored-procedure name.
    #[must_use]
    pub const fn stored_procedure(mut self) -> Self {
        self.command_type = CommandType::StoredProcedure;
        self
    }
}

/// An ordered list of tokens produced by one prepare call.
#[derive(Debug, Clone, Default)]
pub struct TokenChain(Vec<ExecutionToken>);

impl TokenChain {
    /// A chain of one token.
    #[must_use]
    pub fn single(token: ExecutionToken) -> Self {
        Self(vec![token])
    }

    /// Builds a chain from tokens in execution order.
    #[must_use]
    pub const fn new(tokens: Vec<ExecutionToken>) -> Self {
        Self(tokens)
    }

    /// Appends a link.
    #[must_use]
    pub fn then(mut self, token: ExecutionToken) -> Self {
        self.0.push(token);
        self
    }

    /// Number of links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the chain has no links.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The links in order.
    #[must_use]
    pub fn tokens(&self) -> &[ExecutionToken] {
        &self.0
    }

    /// The first link.
    #[must_use]
    pub fn first(&self) -> Option<&ExecutionToken> {
        self.0.first()
    }

    /// The last link.
    #[must_use]
    pub fn last(&self) -> Option<&ExecutionToken> {
        self.0.last()
    }

    /// Consumes the chain.
    #[must_use]
    pub fn into_tokens(self) -> Vec<ExecutionToken> {
        self.0
    }
}

impl IntoIterator for TokenChain {
    type Item = ExecutionToken;
    type IntoIter = std::vec::IntoIter<ExecutionToken>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ParameterOrigin;

    #[test]
    fn test_row_count_checks() {
        assert!(RowCountCheck::Ignore.accepts(0));
        assert!(RowCountCheck::ExactlyOne.accepts(1));
        assert!(!RowCountCheck::ExactlyOne.accepts(0));
        assert!(RowCountCheck::AtMostOne.accepts(0));
        assert!(!RowCountCheck::AtMostOne.accepts(2));

        let err = RowCountCheck::ExactlyOne.verify("DeleteObject", 3).unwrap_err();
        assert!(matches!(err, WeaveError::RowCountMismatch { actual: 3, .. }));
    }

    #[test]
    fn test_bind_parameter_forwarder() {
        let mut params = vec![Parameter::new(
            "@Identity",
            SqlValue::Null,
            ParameterOrigin::Argument,
        )];
        let forwarder = Forwarder::bind_parameter("@identity");
        forwarder.forward(&SqlValue::Int(42), &mut params).unwrap();
        assert_eq!(params[0].value, SqlValue::Int(42));

        let missing = Forwarder::bind_parameter("@Other");
        assert!(missing.forward(&SqlValue::Int(1), &mut params).is_err());
    }

    #[test]
    fn test_chain_building() {
        let chain = TokenChain::single(ExecutionToken::new("UpdateObject", "UPDATE t", vec![]))
            .then(
                ExecutionToken::new("InsertObject", "INSERT t", vec![])
                    .with_condition(RunCondition::PreviousAffectedNone),
            );
        assert_eq!(chain.len(), 2);
        assert_eq!(
            chain.last().map(|t| t.run_condition),
            Some(RunCondition::PreviousAffectedNone)
        );
    }
}
