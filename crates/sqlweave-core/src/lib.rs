//! # sqlweave-core
//!
//! Metadata-driven SQL generation and execution.
//!
//! This crate provides:
//! - A thread-safe metadata cache that discovers tables, views, indexes,
//!   stored procedures and table functions on first use
//! - A per-call SQL builder that maps argument values onto columns
//! - Command builders for queries, inserts, updates, deletes, upserts,
//!   procedure calls and caller-written SQL, for SQL Server, PostgreSQL,
//!   MySQL, SQLite and Access
//! - Token chains and an execution loop that runs them over a blocking or
//!   async driver
//!
//! Preparing a command never touches the database; only discovery and
//! execution do.
//!
//! ## Preparing commands
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use sqlweave_core::audit::AuditRules;
//! use sqlweave_core::command::{CommandBuilder, CommandContext};
//! use sqlweave_core::metadata::{ColumnMetadata, MetadataCache, StaticSchemaSource, TableOrViewMetadata};
//! use sqlweave_core::{ArgumentValue, DataSourceSettings, DesiredColumns, Dialect, InsertOptions, ObjectName};
//!
//! let dialect = Dialect::SqlServer;
//! let source = StaticSchemaSource::new().with_table(TableOrViewMetadata::new(
//!     dialect,
//!     ObjectName::new(Some("dbo"), "Customer"),
//!     true,
//!     vec![
//!         ColumnMetadata::new(dialect, "Id", "int").primary_key().identity(),
//!         ColumnMetadata::new(dialect, "Name", "nvarchar"),
//!     ],
//! ));
//! let context = CommandContext::new(
//!     Arc::new(MetadataCache::new(dialect, source)),
//!     Arc::new(AuditRules::default()),
//!     Arc::new(DataSourceSettings::default()),
//! );
//!
//! let argument: ArgumentValue = [("Name", "Ada"), ("Nickname", "ada")].into_iter().collect();
//! let chain = context
//!     .insert("Customer", argument, InsertOptions::default())
//!     .unwrap()
//!     .prepare(&DesiredColumns::None)
//!     .unwrap();
//! assert_eq!(
//!     chain.tokens()[0].command_text,
//!     "INSERT INTO [dbo].[Customer] ([Name]) VALUES (@Name);"
//! );
//! ```
//!
//! ## Records
//!
//! `#[derive(Record)]` from `sqlweave-derive` generates a static table of
//! field accessors, so a struct can be used as an argument value without
//! runtime reflection.

pub mod audit;
pub mod builder;
pub mod command;
mod data_source;
pub mod dialect;
pub mod error;
pub mod execution;
pub mod metadata;
mod name;
mod record;
mod settings;
pub mod token;
mod value;

pub use builder::{
    DeleteOptions, DesiredColumns, FilterOptions, InsertOptions, LimitOption, Limits,
    SortExpression, UpdateOptions, UpsertOptions,
};
pub use command::{CommandBuilder, CommandContext};
pub use data_source::DataSource;
pub use dialect::Dialect;
pub use error::{Result, WeaveError};
pub use name::ObjectName;
pub use record::{ArgumentValue, FieldAccessor, Property, Record};
pub use settings::DataSourceSettings;
pub use token::{ExecutionToken, TokenChain};
pub use value::{SqlValue, ToSqlValue};
