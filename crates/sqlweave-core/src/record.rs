//! Argument values: the caller-supplied data a command maps onto columns.

use std::collections::{BTreeMap, HashMap};

use crate::builder::{Parameter, ParameterOrigin};
use crate::error::{Result, WeaveError};
use crate::value::{SqlValue, ToSqlValue};

/// A named value taken from an argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Property name, matched case-insensitively against column names.
    pub name: String,
    /// The value.
    pub value: SqlValue,
    /// Whether the property was marked as a key on its record type.
    pub is_key: bool,
}

impl Property {
    /// Creates a non-key property.
    pub fn new(name: impl Into<String>, value: impl ToSqlValue) -> Self {
        Self {
            name: name.into(),
            value: value.to_sql_value(),
            is_key: false,
        }
    }

    /// Marks the property as a key.
    #[must_use]
    pub const fn key(mut self) -> Self {
        self.is_key = true;
        self
    }
}

/// One entry of a record type's static accessor table.
pub struct FieldAccessor<T: 'static> {
    /// Property name.
    pub name: &'static str,
    /// Marked with `#[column(key)]`.
    pub is_key: bool,
    /// Reads the field as a SQL value.
    pub get: fn(&T) -> SqlValue,
}

/// A type whose fields map onto table columns.
///
/// Implemented by `#[derive(Record)]`. The accessor table is built at compile
/// time, so binding a record never inspects types at runtime.
pub trait Record: Sized + 'static {
    /// The table or view this type maps to, if declared.
    const TABLE_NAME: Option<&'static str>;

    /// Field accessors in declaration order.
    const FIELDS: &'static [FieldAccessor<Self>];

    /// Reads every field into a property list.
    fn properties(&self) -> Vec<Property> {
        Self::FIELDS
            .iter()
            .map(|field| Property {
                name: field.name.to_string(),
                value: (field.get)(self),
                is_key: field.is_key,
            })
            .collect()
    }

    /// Property names in declaration order.
    fn property_names() -> Vec<&'static str> {
        Self::FIELDS.iter().map(|f| f.name).collect()
    }
}

/// The argument handed to a command builder.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ArgumentValue {
    /// No argument.
    #[default]
    None,
    /// Named values, from a record or a map.
    Properties(Vec<Property>),
    /// Pre-built parameters, forwarded as they are.
    Parameters(Vec<Parameter>),
}

impl ArgumentValue {
    /// Reads a record through its accessor table.
    pub fn from_record<R: Record>(record: &R) -> Self {
        Self::Properties(record.properties())
    }

    /// Builds an argument from a JSON object. `null` means no argument.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Null => Ok(Self::None),
            serde_json::Value::Object(map) => Ok(Self::Properties(
                map.iter()
                    .map(|(k, v)| Property {
                        name: k.clone(),
                        value: SqlValue::from_json(v),
                        is_key: false,
                    })
                    .collect(),
            )),
            other => Err(WeaveError::Mapping(format!(
                "argument must be a JSON object, got {other}"
            ))),
        }
    }

    /// True for [`ArgumentValue::None`].
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// The named values of the argument.
    ///
    /// Pre-built parameters are exposed by name without their prefix.
    #[must_use]
    pub fn properties(&self) -> Vec<Property> {
        match self {
            Self::None => Vec::new(),
            Self::Properties(props) => props.clone(),
            Self::Parameters(params) => params
                .iter()
                .map(|p| Property {
                    name: p.bare_name().to_string(),
                    value: p.value.clone(),
                    is_key: false,
                })
                .collect(),
        }
    }

    /// Replaces or adds a property, matching names case-insensitively.
    pub fn set(&mut self, name: &str, value: SqlValue) {
        if self.is_none() {
            *self = Self::Properties(Vec::new());
        }
        match self {
            Self::None => {}
            Self::Properties(props) => {
                match props.iter_mut().find(|p| p.name.eq_ignore_ascii_case(name)) {
                    Some(existing) => existing.value = value,
                    None => props.push(Property {
                        name: name.to_string(),
                        value,
                        is_key: false,
                    }),
                }
            }
            Self::Parameters(params) => {
                match params.iter_mut().find(|p| p.bare_name().eq_ignore_ascii_case(name)) {
                    Some(existing) => existing.value = value,
                    None => params.push(Parameter::new(name, value, ParameterOrigin::Audit)),
                }
            }
        }
    }
}

impl<K: Into<String>, V: ToSqlValue> FromIterator<(K, V)> for ArgumentValue {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Properties(iter.into_iter().map(|(k, v)| Property::new(k, v)).collect())
    }
}

impl<K: Into<String>, V: ToSqlValue> From<HashMap<K, V>> for ArgumentValue {
    fn from(map: HashMap<K, V>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Into<String>, V: ToSqlValue> From<BTreeMap<K, V>> for ArgumentValue {
    fn from(map: BTreeMap<K, V>) -> Self {
        map.into_iter().collect()
    }
}

impl From<Vec<Property>> for ArgumentValue {
    fn from(props: Vec<Property>) -> Self {
        Self::Properties(props)
    }
}

impl From<Vec<Parameter>> for ArgumentValue {
    fn from(params: Vec<Parameter>) -> Self {
        Self::Parameters(params)
    }
}

impl<R: Record> From<&R> for ArgumentValue {
    fn from(record: &R) -> Self {
        Self::from_record(record)
    }
}
