//! Audit rules: soft delete and rule-supplied column values.
//!
//! Rules are matched by column name against whatever table a command
//! targets, so one rule set can serve a whole database. A table without
//! the rule's column is simply unaffected.

use chrono::Utc;

use crate::builder::{Fragment, Parameter, ParameterOrigin, SqlBuilder};
use crate::metadata::{ColumnMetadata, TableOrViewMetadata};
use crate::value::{SqlValue, ToSqlValue};

/// Marks rows deleted instead of removing them.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftDeleteRule {
    /// Flag column.
    pub column: String,
    /// Value written on delete; rows holding it are hidden from queries.
    pub deleted_value: SqlValue,
}

/// Where a rule value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleValue {
    /// A constant, such as a tenant id.
    Fixed(SqlValue),
    /// The current UTC time.
    UtcNow,
}

impl RuleValue {
    fn resolve(&self) -> SqlValue {
        match self {
            Self::Fixed(value) => value.clone(),
            Self::UtcNow => Utc::now().to_sql_value(),
        }
    }
}

/// Supplies a column value on insert, update or both.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRule {
    /// Target column.
    pub column: String,
    /// Applied to inserts and upserts.
    pub on_insert: bool,
    /// Applied to updates, upserts and soft deletes.
    pub on_update: bool,
    /// The value.
    pub value: RuleValue,
}

impl ValueRule {
    /// A value written only when a row is created.
    pub fn on_insert(column: impl Into<String>, value: RuleValue) -> Self {
        Self {
            column: column.into(),
            on_insert: true,
            on_update: false,
            value,
        }
    }

    /// A value written whenever a row changes after creation.
    pub fn on_update(column: impl Into<String>, value: RuleValue) -> Self {
        Self {
            column: column.into(),
            on_insert: false,
            on_update: true,
            value,
        }
    }

    /// A value written on every write.
    pub fn always(column: impl Into<String>, value: RuleValue) -> Self {
        Self {
            column: column.into(),
            on_insert: true,
            on_update: true,
            value,
        }
    }
}

/// The rules applied by every command of a data source.
///
/// ```
/// use sqlweave_core::audit::{AuditRules, RuleValue, ValueRule};
///
/// let rules = AuditRules::new()
///     .with_soft_delete("IsDeleted", true)
///     .with_value(ValueRule::on_insert("CreatedDate", RuleValue::UtcNow))
///     .with_value(ValueRule::on_update("UpdatedDate", RuleValue::UtcNow));
/// assert!(!rules.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditRules {
    soft_delete: Vec<SoftDeleteRule>,
    values: Vec<ValueRule>,
}

impl AuditRules {
    /// No rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a soft-delete rule.
    #[must_use]
    pub fn with_soft_delete(mut self, column: impl Into<String>, deleted_value: impl ToSqlValue) -> Self {
        self.soft_delete.push(SoftDeleteRule {
            column: column.into(),
            deleted_value: deleted_value.to_sql_value(),
        });
        self
    }

    /// Adds a value rule.
    #[must_use]
    pub fn with_value(mut self, rule: ValueRule) -> Self {
        self.values.push(rule);
        self
    }

    /// True when there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.soft_delete.is_empty() && self.values.is_empty()
    }

    /// The soft-delete rule that applies to `table`, with its column.
    pub(crate) fn soft_delete<'t>(
        &self,
        table: &'t TableOrViewMetadata,
    ) -> Option<(&SoftDeleteRule, &'t ColumnMetadata)> {
        self.soft_delete
            .iter()
            .find_map(|rule| table.column(&rule.column).map(|column| (rule, column)))
    }

    /// Binds insert-time rule values.
    pub(crate) fn apply_insert(&self, builder: &mut SqlBuilder<'_>) {
        for rule in self.values.iter().filter(|r| r.on_insert) {
            builder.apply_audit_value(&rule.column, rule.value.resolve());
        }
    }

    /// Binds update-time rule values.
    pub(crate) fn apply_update(&self, builder: &mut SqlBuilder<'_>) {
        for rule in self.values.iter().filter(|r| r.on_update) {
            builder.apply_audit_value(&rule.column, rule.value.resolve());
        }
    }

    /// Binds values for an upsert. Insert-only values stay out of the
    /// update branch and update-only values out of the insert branch.
    pub(crate) fn apply_upsert(&self, builder: &mut SqlBuilder<'_>) {
        for rule in self.values.iter().filter(|r| r.on_insert || r.on_update) {
            builder.apply_audit_value(&rule.column, rule.value.resolve());
        }
        for rule in &self.values {
            builder.restrict_roles(&rule.column, rule.on_insert, rule.on_update);
        }
    }

    /// The update set replacing a delete on a soft-delete table, or `None`
    /// when the table has no soft-delete column.
    pub(crate) fn soft_delete_values(
        &self,
        table: &TableOrViewMetadata,
    ) -> Option<Vec<(String, SqlValue)>> {
        let (rule, column) = self.soft_delete(table)?;
        let mut values = vec![(column.sql_name.clone(), rule.deleted_value.clone())];
        for rule in self.values.iter().filter(|r| r.on_update) {
            if let Some(column) = table.column(&rule.column) {
                values.push((column.sql_name.clone(), rule.value.resolve()));
            }
        }
        Some(values)
    }

    /// `(col <> @audit_Col OR col IS NULL)` hiding soft-deleted rows.
    pub(crate) fn read_filter(&self, table: &TableOrViewMetadata) -> Option<Fragment> {
        let (rule, column) = self.soft_delete(table)?;
        let mut filter = Fragment::text(format!("({} <> ", column.quoted_sql_name));
        filter.push_param(
            Parameter::new(
                format!("@audit_{}", column.clr_name),
                rule.deleted_value.clone(),
                ParameterOrigin::Audit,
            )
            .with_db_type(column.db_type),
        );
        filter.push_str(&format!(" OR {} IS NULL)", column.quoted_sql_name));
        Some(filter)
    }
}
