//! Stored procedure calls and routine argument binding.

use std::sync::Arc;

use tracing::debug;

use super::{log_prepared, CommandBuilder};
use crate::builder::{DesiredColumns, Parameter, ParameterOrigin};
use crate::dialect::Dialect;
use crate::error::{Result, WeaveError};
use crate::metadata::{ParameterMetadata, StoredProcedureMetadata};
use crate::record::ArgumentValue;
use crate::token::TokenChain;
use crate::value::SqlValue;

/// Maps an argument onto a routine's declared parameters.
///
/// Every declared parameter is bound in declaration order; parameters the
/// argument does not mention are bound as NULL. Argument values matching
/// no parameter are skipped, or rejected in strict mode.
pub(crate) fn bind_routine_parameters(
    routine: &str,
    declared: &[ParameterMetadata],
    argument: &ArgumentValue,
    strict: bool,
) -> Result<Vec<Parameter>> {
    let properties = argument.properties();
    for property in &properties {
        if !declared.iter().any(|p| p.matches(&property.name)) {
            if strict {
                return Err(WeaveError::Mapping(format!(
                    "property '{}' does not match any parameter of {routine}",
                    property.name
                )));
            }
            debug!(property = %property.name, routine, "ignoring unmatched property");
        }
    }
    Ok(declared
        .iter()
        .map(|parameter| {
            let value = properties
                .iter()
                .find(|p| parameter.matches(&p.name))
                .map_or(SqlValue::Null, |p| p.value.clone());
            Parameter::new(parameter.sql_name.clone(), value, ParameterOrigin::Argument)
                .with_db_type(parameter.db_type)
                .with_direction(parameter.direction)
        })
        .collect())
}

/// Calls a stored procedure.
#[derive(Debug, Clone)]
pub struct ProcedureCommand {
    dialect: Dialect,
    procedure: Arc<StoredProcedureMetadata>,
    argument: ArgumentValue,
    strict: bool,
}

impl ProcedureCommand {
    pub(crate) const fn new(
        dialect: Dialect,
        procedure: Arc<StoredProcedureMetadata>,
        argument: ArgumentValue,
        strict: bool,
    ) -> Self {
        Self {
            dialect,
            procedure,
            argument,
            strict,
        }
    }
}

impl CommandBuilder for ProcedureCommand {
    fn prepare(&self, _desired: &DesiredColumns) -> Result<TokenChain> {
        let parameters = bind_routine_parameters(
            &self.procedure.quoted_name,
            &self.procedure.parameters,
            &self.argument,
            self.strict,
        )?;
        let token = self.dialect.build_procedure_call(&self.procedure, parameters)?;
        let chain = TokenChain::single(token);
        log_prepared("ProcedureCall", &self.procedure.quoted_name, &chain);
        Ok(chain)
    }
}
