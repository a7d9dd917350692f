//! Per-operation option structs, sorting and limits.

use std::fmt;

use crate::error::{Result, WeaveError};

/// Options for inserts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Write identity columns from the argument instead of letting the
    /// database generate them.
    pub identity_insert: bool,
}

impl InsertOptions {
    /// Enables identity insert.
    #[must_use]
    pub const fn identity_insert(mut self) -> Self {
        self.identity_insert = true;
        self
    }
}

/// Options for updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Use the argument's key-marked properties instead of the primary key.
    pub use_key_attribute: bool,
    /// Return the row as it was before the update.
    pub return_old_values: bool,
    /// Skip the affected-row check.
    pub ignore_rows_affected: bool,
}

impl UpdateOptions {
    /// Uses key-marked properties as keys.
    #[must_use]
    pub const fn use_key_attribute(mut self) -> Self {
        self.use_key_attribute = true;
        self
    }

    /// Returns old values instead of new ones.
    #[must_use]
    pub const fn return_old_values(mut self) -> Self {
        self.return_old_values = true;
        self
    }

    /// Disables the affected-row check.
    #[must_use]
    pub const fn ignore_rows_affected(mut self) -> Self {
        self.ignore_rows_affected = true;
        self
    }
}

/// Options for deletes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Use the argument's key-marked properties instead of the primary key.
    pub use_key_attribute: bool,
    /// Skip the affected-row check.
    pub ignore_rows_affected: bool,
}

impl DeleteOptions {
    /// Uses key-marked properties as keys.
    #[must_use]
    pub const fn use_key_attribute(mut self) -> Self {
        self.use_key_attribute = true;
        self
    }

    /// Disables the affected-row check.
    #[must_use]
    pub const fn ignore_rows_affected(mut self) -> Self {
        self.ignore_rows_affected = true;
        self
    }
}

/// Options for upserts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOptions {
    /// Use the argument's key-marked properties instead of the primary key.
    pub use_key_attribute: bool,
    /// Write identity columns from the argument.
    pub identity_insert: bool,
}

impl UpsertOptions {
    /// Uses key-marked properties as keys.
    #[must_use]
    pub const fn use_key_attribute(mut self) -> Self {
        self.use_key_attribute = true;
        self
    }

    /// Enables identity insert.
    #[must_use]
    pub const fn identity_insert(mut self) -> Self {
        self.identity_insert = true;
        self
    }
}

/// Options for filter objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// Skip null properties instead of emitting `IS NULL`.
    pub ignore_null_properties: bool,
}

impl FilterOptions {
    /// Skips null properties.
    #[must_use]
    pub const fn ignore_null_properties(mut self) -> Self {
        self.ignore_null_properties = true;
        self
    }
}

/// Which columns the caller wants back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DesiredColumns {
    /// No columns; the operation is executed for its side effects.
    #[default]
    None,
    /// Every column.
    All,
    /// Named columns, matched by SQL or property name.
    Named(Vec<String>),
}

impl DesiredColumns {
    /// Builds a named column list.
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Named(names.into_iter().map(Into::into).collect())
    }

    /// True when no column is requested.
    #[must_use]
    pub fn is_none(&self) -> bool {
        match self {
            Self::None => true,
            Self::All => false,
            Self::Named(names) => names.is_empty(),
        }
    }
}

/// A sort expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortExpression {
    /// Column name.
    pub column: String,
    /// Sort descending.
    pub descending: bool,
}

impl SortExpression {
    /// Ascending sort.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    /// Descending sort.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    /// Parses `"Name"`, `"Name ASC"` or `"Name DESC"`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parts = input.split_whitespace();
        let column = parts
            .next()
            .ok_or_else(|| WeaveError::InvalidOperation("empty sort expression".into()))?;
        let descending = match parts.next().map(str::to_ascii_uppercase).as_deref() {
            None | Some("ASC") => false,
            Some("DESC") => true,
            Some(other) => {
                return Err(WeaveError::InvalidOperation(format!(
                    "unknown sort direction '{other}'"
                )))
            }
        };
        if parts.next().is_some() {
            return Err(WeaveError::InvalidOperation(format!(
                "invalid sort expression '{input}'"
            )));
        }
        Ok(Self {
            column: column.to_string(),
            descending,
        })
    }
}

/// A pagination or sampling strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LimitOption {
    /// No limit.
    #[default]
    None,
    /// Skip and take rows.
    Rows,
    /// Take a percentage of rows.
    Percentage,
    /// Take rows, including ties on the last sort value.
    RowsWithTies,
    /// Take a percentage, including ties on the last sort value.
    PercentageWithTies,
    /// Random sample of a number of rows.
    RandomSampleRows,
    /// Random sample of a percentage of rows.
    RandomSamplePercentage,
}

impl LimitOption {
    /// With-ties variants.
    #[must_use]
    pub const fn has_ties(self) -> bool {
        matches!(self, Self::RowsWithTies | Self::PercentageWithTies)
    }

    /// Random sample variants.
    #[must_use]
    pub const fn is_random_sample(self) -> bool {
        matches!(self, Self::RandomSampleRows | Self::RandomSamplePercentage)
    }

    /// Percentage variants.
    #[must_use]
    pub const fn is_percentage(self) -> bool {
        matches!(
            self,
            Self::Percentage | Self::PercentageWithTies | Self::RandomSamplePercentage
        )
    }
}

impl fmt::Display for LimitOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "no limit",
            Self::Rows => "row limit",
            Self::Percentage => "percentage limit",
            Self::RowsWithTies => "row limit with ties",
            Self::PercentageWithTies => "percentage limit with ties",
            Self::RandomSampleRows => "random sample of rows",
            Self::RandomSamplePercentage => "random sample percentage",
        })
    }
}

/// Limits applied to a query.
///
/// `take` holds the row count, or the percentage for percentage options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    /// Strategy. `None` with a skip or take means [`LimitOption::Rows`].
    pub option: LimitOption,
    /// Rows to skip.
    pub skip: Option<i64>,
    /// Rows (or percent) to take.
    pub take: Option<i64>,
    /// Repeatability seed for random samples.
    pub seed: Option<i64>,
}

impl Limits {
    /// Takes `take` rows.
    #[must_use]
    pub const fn rows(take: i64) -> Self {
        Self {
            option: LimitOption::Rows,
            skip: None,
            take: Some(take),
            seed: None,
        }
    }

    /// Uses `option` with `take` rows or percent.
    #[must_use]
    pub const fn new(option: LimitOption, take: i64) -> Self {
        Self {
            option,
            skip: None,
            take: Some(take),
            seed: None,
        }
    }

    /// Skips rows.
    #[must_use]
    pub const fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Sets the sample seed.
    #[must_use]
    pub const fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The option actually in effect.
    #[must_use]
    pub const fn effective_option(&self) -> LimitOption {
        match self.option {
            LimitOption::None if self.skip.is_some() || self.take.is_some() => LimitOption::Rows,
            other => other,
        }
    }

    /// True when skipping more than zero rows.
    #[must_use]
    pub const fn has_skip(&self) -> bool {
        matches!(self.skip, Some(n) if n > 0)
    }
}
