//! Schema-qualified database object names.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{Result, WeaveError};

/// A normalized, optionally schema-qualified object name.
///
/// Decoration (`[..]`, `` `..` ``, `".."`) is stripped on construction and
/// equality and hashing ignore case, so `[dbo].[Customer]`, `dbo.customer`
/// and `"DBO"."CUSTOMER"` all denote the same object.
#[derive(Debug, Clone)]
pub struct ObjectName {
    schema: Option<String>,
    name: String,
}

impl ObjectName {
    /// Creates a name from already separated parts, stripping decoration.
    #[must_use]
    pub fn new(schema: Option<&str>, name: &str) -> Self {
        Self {
            schema: schema
                .map(|s| strip_decoration(s.trim()))
                .filter(|s| !s.is_empty()),
            name: strip_decoration(name.trim()),
        }
    }

    /// Parses a possibly quoted, possibly schema-qualified name.
    ///
    /// A three-part `database.schema.name` keeps the last two parts.
    pub fn parse(input: &str) -> Result<Self> {
        let parts = split_parts(input)?;
        let mut parts = parts.into_iter().rev();
        let name = parts
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| WeaveError::InvalidName(input.to_string()))?;
        let schema = parts.next().filter(|s| !s.is_empty());
        Ok(Self { schema, name })
    }

    /// The schema, if the name is qualified.
    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// The unqualified object name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns this name qualified with `schema` unless it already has one.
    #[must_use]
    pub fn or_schema(&self, schema: Option<&str>) -> Self {
        match (&self.schema, schema) {
            (None, Some(default)) => Self {
                schema: Some(default.to_string()),
                name: self.name.clone(),
            },
            _ => self.clone(),
        }
    }
}

impl PartialEq for ObjectName {
    fn eq(&self, other: &Self) -> bool {
        let schema_eq = match (&self.schema, &other.schema) {
            (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
            (None, None) => true,
            _ => false,
        };
        schema_eq && self.name.to_lowercase() == other.name.to_lowercase()
    }
}

impl Eq for ObjectName {}

impl Hash for ObjectName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.schema.as_ref().map(|s| s.to_lowercase()).hash(state);
        self.name.to_lowercase().hash(state);
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for ObjectName {
    type Err = WeaveError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Removes one level of identifier quoting and un-doubles escaped closers.
fn strip_decoration(part: &str) -> String {
    let pairs = [('[', ']'), ('`', '`'), ('"', '"')];
    for (open, close) in pairs {
        if part.len() >= 2 && part.starts_with(open) && part.ends_with(close) {
            let inner = &part[open.len_utf8()..part.len() - close.len_utf8()];
            let doubled: String = [close, close].iter().collect();
            return inner.replace(&doubled, &close.to_string());
        }
    }
    part.to_string()
}

/// Splits on dots that are not inside quotes.
fn split_parts(input: &str) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.trim().chars().peekable();
    let mut closer: Option<char> = None;

    while let Some(c) = chars.next() {
        match closer {
            Some(close) if c == close => {
                if chars.peek() == Some(&close) {
                    current.push(close);
                    chars.next();
                } else {
                    closer = None;
                }
            }
            Some(_) => current.push(c),
            None => match c {
                '[' => closer = Some(']'),
                '`' => closer = Some('`'),
                '"' => closer = Some('"'),
                '.' => parts.push(std::mem::take(&mut current).trim().to_string()),
                _ => current.push(c),
            },
        }
    }

    if closer.is_some() {
        return Err(WeaveError::InvalidName(input.to_string()));
    }
    parts.push(current.trim().to_string());
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;

    fn hash_of(name: &ObjectName) -> u64 {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_decorations_and_case_are_ignored() {
        let variants = [
            "dbo.Customer",
            "[dbo].[Customer]",
            "`dbo`.`customer`",
            "\"DBO\".\"CUSTOMER\"",
            " dbo . Customer ",
        ];
        let first = ObjectName::parse(variants[0]).unwrap();
        for v in &variants[1..] {
            let other = ObjectName::parse(v).unwrap();
            assert_eq!(first, other, "{v}");
            assert_eq!(hash_of(&first), hash_of(&other), "{v}");
        }
    }

    #[test]
    fn test_schema_matters() {
        let qualified = ObjectName::parse("sales.Customer").unwrap();
        let bare = ObjectName::parse("Customer").unwrap();
        assert_ne!(qualified, bare);
        assert_eq!(bare.or_schema(Some("sales")), qualified);
    }

    #[test]
    fn test_quoted_dot_and_escaped_closer() {
        let name = ObjectName::parse("[my.schema].[Order]]Lines]").unwrap();
        assert_eq!(name.schema(), Some("my.schema"));
        assert_eq!(name.name(), "Order]Lines");
    }

    #[test]
    fn test_three_part_name_keeps_schema_and_name() {
        let name = ObjectName::parse("Sales.dbo.Customer").unwrap();
        assert_eq!(name.schema(), Some("dbo"));
        assert_eq!(name.name(), "Customer");
    }

    #[test]
    fn test_invalid_names() {
        assert!(ObjectName::parse("").is_err());
        assert!(ObjectName::parse("dbo.").is_err());
        assert!(ObjectName::parse("[dbo.Customer").is_err());
    }

    #[test]
    fn test_new_strips_decoration() {
        let name = ObjectName::new(Some("[dbo]"), "`Customer`");
        assert_eq!(name.to_string(), "dbo.Customer");
    }
}
