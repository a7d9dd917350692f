#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sqlweave_core::builder::Parameter;
use sqlweave_core::execution::{Command, Connection, Driver, Outcome, RowSet};
use sqlweave_core::{Dialect, Result, SqlValue};

/// A table the fake database reports through introspection.
#[derive(Debug, Clone)]
pub struct FakeTable {
    pub schema: Option<String>,
    pub name: String,
    pub is_table: bool,
    /// `(name, type, primary_key, identity)`
    pub columns: Vec<(String, String, bool, bool)>,
}

impl FakeTable {
    pub fn new(schema: Option<&str>, name: &str) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
            is_table: true,
            columns: Vec::new(),
        }
    }

    pub fn key(mut self, name: &str, type_name: &str) -> Self {
        self.columns
            .push((name.to_string(), type_name.to_string(), true, true));
        self
    }

    pub fn column(mut self, name: &str, type_name: &str) -> Self {
        self.columns
            .push((name.to_string(), type_name.to_string(), false, false));
        self
    }
}

/// State shared by a [`FakeDriver`] and every connection it opens.
#[derive(Debug, Default)]
pub struct FakeState {
    pub tables: Vec<FakeTable>,
    /// Introspection queries answered so far.
    pub discovery_calls: usize,
    /// Non-introspection commands in execution order.
    pub executed: Vec<(String, Vec<Parameter>)>,
    /// Replayed for non-introspection commands; `Affected(1)` when empty.
    pub outcomes: VecDeque<Outcome>,
}

/// A driver that answers the dialect's introspection queries from
/// [`FakeTable`]s and replays scripted outcomes for everything else.
#[derive(Debug, Clone)]
pub struct FakeDriver {
    pub dialect: Dialect,
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
    pub fn new(dialect: Dialect, tables: Vec<FakeTable>) -> Self {
        Self {
            dialect,
            state: Arc::new(Mutex::new(FakeState {
                tables,
                ..FakeState::default()
            })),
        }
    }

    pub fn script(&self, outcomes: Vec<Outcome>) {
        self.state.lock().unwrap().outcomes = outcomes.into();
    }

    pub fn discovery_calls(&self) -> usize {
        self.state.lock().unwrap().discovery_calls
    }

    pub fn executed(&self) -> Vec<(String, Vec<Parameter>)> {
        self.state.lock().unwrap().executed.clone()
    }
}

impl Driver for FakeDriver {
    type Connection = FakeConnection;

    fn open_connection(&self) -> Result<FakeConnection> {
        Ok(FakeConnection {
            dialect: self.dialect,
            state: Arc::clone(&self.state),
        })
    }
}

pub struct FakeConnection {
    dialect: Dialect,
    state: Arc<Mutex<FakeState>>,
}

fn parameter<'a>(command: &'a Command<'_>, name: &str) -> Option<&'a str> {
    command
        .parameters
        .iter()
        .find(|p| p.name == name)
        .and_then(|p| p.value.as_str())
}

impl FakeConnection {
    fn find<'a>(state: &'a FakeState, command: &Command<'_>) -> Option<&'a FakeTable> {
        let name = parameter(command, "@Name")?;
        let schema = parameter(command, "@Schema");
        state.tables.iter().find(|t| {
            t.name.eq_ignore_ascii_case(name)
                && match (schema, &t.schema) {
                    (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                    _ => true,
                }
        })
    }

    fn introspect(&self, state: &FakeState, command: &Command<'_>) -> Option<RowSet> {
        let queries = self.dialect.introspection()?;
        let text = |s: &Option<String>| s.clone().map_or(SqlValue::Null, SqlValue::Text);
        if command.text == queries.objects {
            let rows = state
                .tables
                .iter()
                .map(|t| {
                    let kind = if t.is_table { "TABLE" } else { "VIEW" };
                    vec![
                        text(&t.schema),
                        SqlValue::Text(t.name.clone()),
                        SqlValue::Text(kind.into()),
                    ]
                })
                .collect();
            return Some(RowSet::new(
                vec!["schema_name".into(), "object_name".into(), "object_type".into()],
                rows,
            ));
        }
        if command.text == queries.table {
            let rows = Self::find(state, command)
                .map(|t| {
                    vec![vec![
                        text(&t.schema),
                        SqlValue::Text(t.name.clone()),
                        SqlValue::Bool(t.is_table),
                    ]]
                })
                .unwrap_or_default();
            return Some(RowSet::new(
                vec!["schema_name".into(), "object_name".into(), "is_table".into()],
                rows,
            ));
        }
        if command.text == queries.columns {
            let rows = Self::find(state, command)
                .map(|t| {
                    t.columns
                        .iter()
                        .map(|(name, type_name, key, identity)| {
                            vec![
                                SqlValue::Text(name.clone()),
                                SqlValue::Text(type_name.clone()),
                                SqlValue::Bool(!key),
                                SqlValue::Bool(*identity),
                                SqlValue::Bool(false),
                                SqlValue::Bool(*key),
                                SqlValue::Null,
                                SqlValue::Null,
                                SqlValue::Null,
                            ]
                        })
                        .collect()
                })
                .unwrap_or_default();
            return Some(RowSet::new(Vec::new(), rows));
        }
        if command.text == queries.indexes {
            return Some(RowSet::default());
        }
        None
    }

    fn next(&mut self, command: &Command<'_>) -> Outcome {
        let mut state = self.state.lock().unwrap();
        if let Some(rows) = self.introspect(&state, command) {
            state.discovery_calls += 1;
            return Outcome::Rows(rows);
        }
        state
            .executed
            .push((command.text.to_string(), command.parameters.to_vec()));
        state.outcomes.pop_front().unwrap_or(Outcome::Affected(1))
    }
}

impl Connection for FakeConnection {
    fn execute_non_query(&mut self, command: &Command<'_>) -> Result<u64> {
        Ok(self.next(command).affected())
    }

    fn execute_scalar(&mut self, command: &Command<'_>) -> Result<SqlValue> {
        Ok(match self.next(command) {
            Outcome::Scalar(value) => value,
            Outcome::Rows(rows) => rows
                .first()
                .and_then(|row| row.value(0).cloned())
                .unwrap_or(SqlValue::Null),
            Outcome::Affected(n) => SqlValue::Int(n as i64),
        })
    }

    fn execute_reader(&mut self, command: &Command<'_>) -> Result<RowSet> {
        Ok(match self.next(command) {
            Outcome::Rows(rows) => rows,
            _ => RowSet::default(),
        })
    }
}

/// `dbo.Customer(Id identity key, Name, Email)` and `dbo.Order(Id, CustomerId, Total)`.
pub fn sales_tables() -> Vec<FakeTable> {
    vec![
        FakeTable::new(Some("dbo"), "Customer")
            .key("Id", "int")
            .column("Name", "nvarchar")
            .column("Email", "nvarchar"),
        FakeTable::new(Some("dbo"), "Order")
            .key("Id", "int")
            .column("CustomerId", "int")
            .column("Total", "decimal"),
    ]
}
