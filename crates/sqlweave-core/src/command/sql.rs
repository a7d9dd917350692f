//! Caller-written SQL, passed through without metadata.

use super::{log_prepared, CommandBuilder};
use crate::builder::{DesiredColumns, Fragment, Parameter, ParameterOrigin};
use crate::dialect::Dialect;
use crate::error::Result;
use crate::record::ArgumentValue;
use crate::token::TokenChain;

/// Parameters for caller-written text.
///
/// Pre-built parameters are forwarded as they are; named values become
/// `@name` parameters in argument order.
pub(crate) fn raw_parameters(argument: &ArgumentValue) -> Vec<Parameter> {
    match argument {
        ArgumentValue::None => Vec::new(),
        ArgumentValue::Parameters(parameters) => parameters.clone(),
        ArgumentValue::Properties(properties) => properties
            .iter()
            .map(|p| Parameter::new(p.name.clone(), p.value.clone(), ParameterOrigin::Raw))
            .collect(),
    }
}

/// Runs SQL text as written.
///
/// The text must use the dialect's placeholder syntax; parameters are bound
/// in argument order.
#[derive(Debug, Clone)]
pub struct SqlCommand {
    dialect: Dialect,
    text: String,
    argument: ArgumentValue,
}

impl SqlCommand {
    pub(crate) const fn new(dialect: Dialect, text: String, argument: ArgumentValue) -> Self {
        Self {
            dialect,
            text,
            argument,
        }
    }

    /// The command text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl CommandBuilder for SqlCommand {
    fn prepare(&self, _desired: &DesiredColumns) -> Result<TokenChain> {
        let token = Fragment::raw(self.text.clone(), raw_parameters(&self.argument))
            .into_token(self.dialect, "Sql")?;
        let chain = TokenChain::single(token);
        log_prepared("Sql", "", &chain);
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WeaveError;
    use crate::record::Property;
    use crate::value::SqlValue;

    #[test]
    fn test_text_is_forwarded_verbatim() {
        let argument = ArgumentValue::Properties(vec![
            Property::new("Id", 3),
            Property::new("Name", "x"),
        ]);
        let command = SqlCommand::new(
            Dialect::SqlServer,
            "SELECT * FROM Customer WHERE Id = @Id OR Name = @Name".into(),
            argument,
        );
        let chain = command.prepare(&DesiredColumns::All).unwrap();
        let token = &chain.tokens()[0];
        assert_eq!(
            token.command_text,
            "SELECT * FROM Customer WHERE Id = @Id OR Name = @Name"
        );
        assert_eq!(token.parameters.len(), 2);
        assert_eq!(token.parameters[0].name, "@Id");
        assert_eq!(token.parameters[1].value, SqlValue::Text("x".into()));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let argument = ArgumentValue::Parameters(vec![
            Parameter::new("@a", 1, ParameterOrigin::Raw),
            Parameter::new("@A", 2, ParameterOrigin::Raw),
        ]);
        let err = SqlCommand::new(Dialect::SqlServer, "SELECT @a".into(), argument)
            .prepare(&DesiredColumns::None)
            .unwrap_err();
        assert!(matches!(err, WeaveError::DuplicateParameter { .. }));
    }
}
