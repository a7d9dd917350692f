//! Parameterized SQL fragments.
//!
//! Builders never write placeholders themselves. They emit [`Fragment`]s
//! made of text and parameter pieces, and placeholders are assigned when
//! the finished statement is rendered for a dialect, so numbering always
//! follows emission order.

use std::collections::HashMap;
use std::fmt;

use crate::dialect::{Dialect, PlaceholderStyle};
use crate::error::{Result, WeaveError};
use crate::metadata::{DbType, ParameterDirection};
use crate::token::ExecutionToken;
use crate::value::{SqlValue, ToSqlValue};

/// Where a parameter came from, used to explain name collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterOrigin {
    /// The operation's argument value.
    Argument,
    /// A filter object or where-clause argument.
    Filter,
    /// A key list.
    Key,
    /// Skip and take values.
    Paging,
    /// A value injected by an audit rule.
    Audit,
    /// Caller-supplied command text.
    Raw,
}

impl fmt::Display for ParameterOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Argument => "argument value",
            Self::Filter => "filter value",
            Self::Key => "key list",
            Self::Paging => "paging clause",
            Self::Audit => "audit rule",
            Self::Raw => "command text",
        })
    }
}

/// A bound command parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Name including its `@` prefix.
    pub name: String,
    /// Bound value.
    pub value: SqlValue,
    /// Database type, when known from metadata.
    pub db_type: Option<DbType>,
    /// Direction for routine parameters.
    pub direction: ParameterDirection,
    /// Where the parameter came from.
    pub origin: ParameterOrigin,
}

impl Parameter {
    /// Creates an input parameter. A missing `@` prefix is added.
    pub fn new(name: impl Into<String>, value: impl ToSqlValue, origin: ParameterOrigin) -> Self {
        let name = name.into();
        let name = if name.starts_with(['@', ':', '$']) {
            name
        } else {
            format!("@{name}")
        };
        Self {
            name,
            value: value.to_sql_value(),
            db_type: None,
            direction: ParameterDirection::In,
            origin,
        }
    }

    /// Sets the database type.
    #[must_use]
    pub const fn with_db_type(mut self, db_type: Option<DbType>) -> Self {
        self.db_type = db_type;
        self
    }

    /// Sets the direction.
    #[must_use]
    pub const fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    /// The name without its prefix.
    #[must_use]
    pub fn bare_name(&self) -> &str {
        self.name.trim_start_matches(['@', ':', '$'])
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Text(String),
    Param(Parameter),
    Raw {
        text: String,
        parameters: Vec<Parameter>,
    },
}

/// SQL text interleaved with parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pieces: Vec<Piece>,
}

impl Fragment {
    /// Creates an empty fragment.
    #[must_use]
    pub const fn new() -> Self {
        Self { pieces: Vec::new() }
    }

    /// A fragment of plain text.
    pub fn text(text: impl Into<String>) -> Self {
        let mut fragment = Self::new();
        fragment.push_str(&text.into());
        fragment
    }

    /// A fragment holding a single parameter placeholder.
    #[must_use]
    pub fn param(parameter: Parameter) -> Self {
        Self {
            pieces: vec![Piece::Param(parameter)],
        }
    }

    /// Caller-written text emitted verbatim, with its parameters appended in
    /// order. The text must already use the dialect's placeholder syntax.
    pub fn raw(text: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            pieces: vec![Piece::Raw {
                text: text.into(),
                parameters,
            }],
        }
    }

    /// Appends plain text.
    pub fn push_str(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Piece::Text(last)) = self.pieces.last_mut() {
            last.push_str(text);
        } else {
            self.pieces.push(Piece::Text(text.to_string()));
        }
    }

    /// Appends a parameter placeholder.
    pub fn push_param(&mut self, parameter: Parameter) {
        self.pieces.push(Piece::Param(parameter));
    }

    /// Appends another fragment.
    pub fn append(&mut self, other: Self) {
        for piece in other.pieces {
            match piece {
                Piece::Text(text) => self.push_str(&text),
                other => self.pieces.push(other),
            }
        }
    }

    /// Joins fragments with a separator.
    pub fn join(parts: impl IntoIterator<Item = Self>, separator: &str) -> Self {
        let mut joined = Self::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                joined.push_str(separator);
            }
            joined.append(part);
        }
        joined
    }

    /// True when nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Parameters in emission order.
    #[must_use]
    pub fn parameters(&self) -> Vec<&Parameter> {
        self.pieces
            .iter()
            .flat_map(|piece| match piece {
                Piece::Text(_) => Vec::new(),
                Piece::Param(p) => vec![p],
                Piece::Raw { parameters, .. } => parameters.iter().collect(),
            })
            .collect()
    }

    /// Renders the fragment for a dialect.
    ///
    /// Returns the SQL text and the parameters in placeholder order. Two
    /// parameters with the same name (ignoring case) are rejected.
    pub fn render(&self, dialect: Dialect) -> Result<(String, Vec<Parameter>)> {
        let mut sql = String::new();
        let mut parameters: Vec<Parameter> = Vec::new();
        let mut seen: HashMap<String, ParameterOrigin> = HashMap::new();

        let mut register = |p: &Parameter, parameters: &mut Vec<Parameter>| -> Result<()> {
            if let Some(first) = seen.insert(p.name.to_lowercase(), p.origin) {
                return Err(WeaveError::DuplicateParameter {
                    name: p.name.clone(),
                    first: first.to_string(),
                    second: p.origin.to_string(),
                });
            }
            parameters.push(p.clone());
            Ok(())
        };

        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => sql.push_str(text),
                Piece::Param(p) => {
                    register(p, &mut parameters)?;
                    match dialect.placeholder_style() {
                        PlaceholderStyle::Named => sql.push_str(&p.name),
                        PlaceholderStyle::Numbered => {
                            sql.push('$');
                            sql.push_str(&parameters.len().to_string());
                        }
                        PlaceholderStyle::Positional => sql.push('?'),
                    }
                }
                Piece::Raw {
                    text,
                    parameters: raw,
                } => {
                    match dialect.placeholder_style() {
                        PlaceholderStyle::Numbered => {
                            sql.push_str(&shift_numbered(text, parameters.len()));
                        }
                        PlaceholderStyle::Named | PlaceholderStyle::Positional => {
                            sql.push_str(text);
                        }
                    }
                    for p in raw {
                        register(p, &mut parameters)?;
                    }
                }
            }
        }
        Ok((sql, parameters))
    }

    /// Renders the fragment into a materializer token.
    pub fn into_token(self, dialect: Dialect, operation: &str) -> Result<ExecutionToken> {
        let (sql, parameters) = self.render(dialect)?;
        Ok(ExecutionToken::new(operation, sql, parameters))
    }
}

/// Moves `$N` placeholders in caller text past the `offset` parameters
/// already emitted. Quoted strings and identifiers are left alone.
fn shift_numbered(text: &str, offset: usize) -> String {
    if offset == 0 {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        match quote {
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '$' => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    digits.push(d);
                    chars.next();
                }
                match digits.parse::<usize>() {
                    Ok(n) => out.push_str(&(n + offset).to_string()),
                    Err(_) => out.push_str(&digits),
                }
            }
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, value: i64, origin: ParameterOrigin) -> Parameter {
        Parameter::new(name, value, origin)
    }

    fn sample() -> Fragment {
        let mut f = Fragment::text("SELECT * FROM t WHERE a = ");
        f.push_param(param("@A", 1, ParameterOrigin::Filter));
        f.push_str(" AND b = ");
        f.push_param(param("B", 2, ParameterOrigin::Filter));
        f
    }

    #[test]
    fn test_render_placeholders() {
        let (sql, params) = sample().render(Dialect::SqlServer).unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = @A AND b = @B");
        assert_eq!(params.len(), 2);

        let (sql, _) = sample().render(Dialect::PostgreSql).unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = $1 AND b = $2");

        let (sql, params) = sample().render(Dialect::MySql).unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = ? AND b = ?");
        assert_eq!(params[1].name, "@B");
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut f = Fragment::text("UPDATE t SET Name = ");
        f.push_param(param("@Name", 1, ParameterOrigin::Argument));
        f.push_str(" WHERE Name = ");
        f.push_param(param("@name", 2, ParameterOrigin::Filter));
        let err = f.render(Dialect::Sqlite).unwrap_err();
        assert_eq!(
            err.to_string(),
            "the same parameter name '@name' appears in both the argument value and the filter value"
        );
    }

    #[test]
    fn test_raw_pieces_keep_their_text() {
        let mut f = Fragment::raw(
            "Name = ?",
            vec![Parameter::new("@Name", "x", ParameterOrigin::Raw)],
        );
        f.push_str(" AND Id > ");
        f.push_param(param("@Id", 3, ParameterOrigin::Filter));
        let (sql, params) = f.render(Dialect::Sqlite).unwrap();
        assert_eq!(sql, "Name = ? AND Id > ?");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_numbered_raw_text_follows_earlier_parameters() {
        let mut f = Fragment::text("UPDATE t SET \"Name\" = ");
        f.push_param(param("@Name", 1, ParameterOrigin::Argument));
        f.push_str(" WHERE (");
        f.append(Fragment::raw(
            "\"Name\" = $1 AND \"Note\" <> '$1' AND \"Id\" > $2",
            vec![
                Parameter::new("@Old", "old", ParameterOrigin::Raw),
                Parameter::new("@Id", 3, ParameterOrigin::Raw),
            ],
        ));
        f.push_str(")");
        let (sql, params) = f.render(Dialect::PostgreSql).unwrap();
        assert_eq!(
            sql,
            "UPDATE t SET \"Name\" = $1 WHERE (\"Name\" = $2 AND \"Note\" <> '$1' AND \"Id\" > $3)"
        );
        assert_eq!(params[1].name, "@Old");

        let raw = Fragment::raw("\"Id\" = $1", vec![param("@Id", 1, ParameterOrigin::Raw)]);
        assert_eq!(raw.render(Dialect::PostgreSql).unwrap().0, "\"Id\" = $1");
    }

    #[test]
    fn test_join() {
        let joined = Fragment::join(
            vec![Fragment::text("a"), Fragment::text("b"), Fragment::text("c")],
            ", ",
        );
        assert_eq!(joined.render(Dialect::Sqlite).unwrap().0, "a, b, c");
        assert!(Fragment::join(Vec::new(), ", ").is_empty());
    }
}
