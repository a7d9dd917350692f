use crate::builder::{Parameter, ParameterOrigin};
use crate::metadata::ColumnMetadata;
use crate::value::SqlValue;

/// Per-column working record of one [`SqlBuilder`](super::SqlBuilder) pass.
#[derive(Debug, Clone)]
pub struct SqlBuilderEntry<'a> {
    /// The column this entry describes.
    pub column: &'a ColumnMetadata,
    /// Written by an insert.
    pub insert: bool,
    /// Written by an update.
    pub update: bool,
    /// Returned to the caller.
    pub read: bool,
    /// Used to identify rows.
    pub is_key: bool,
    /// A value was supplied and is bound as a parameter.
    pub use_parameter: bool,
    /// The supplied value.
    pub value: Option<SqlValue>,
    /// Where the supplied value came from.
    pub origin: ParameterOrigin,
}

impl<'a> SqlBuilderEntry<'a> {
    pub(crate) const fn new(column: &'a ColumnMetadata) -> Self {
        Self {
            column,
            insert: false,
            update: false,
            read: false,
            is_key: column.is_primary_key,
            use_parameter: false,
            value: None,
            origin: ParameterOrigin::Argument,
        }
    }

    /// The parameter carrying this entry's value, named `@{ClrName}`.
    #[must_use]
    pub fn parameter(&self) -> Parameter {
        Parameter::new(
            format!("@{}", self.column.clr_name),
            self.value.clone().unwrap_or(SqlValue::Null),
            self.origin,
        )
        .with_db_type(self.column.db_type)
    }

    pub(crate) fn assign(&mut self, value: SqlValue, origin: ParameterOrigin) {
        self.value = Some(value);
        self.use_parameter = true;
        self.origin = origin;
    }
}
