//! # sqlweave-sqlite
//!
//! Runs `sqlweave` commands against SQLite through `sqlx`.
//!
//! [`SqliteDataSource`] owns a connection pool, reads the schema from
//! `sqlite_master` and the `pragma_table_xinfo` / `pragma_index_list`
//! table functions, and executes token chains with
//! [`execute_chain_async`](sqlweave_core::execution::execute_chain_async).
//!
//! How SQLite shows up in generated SQL:
//!
//! - Identifiers are quoted with `"`; there is no schema prefix.
//! - Parameters are positional `?` placeholders, bound in order.
//! - Upserts use `INSERT ... ON CONFLICT (...) DO UPDATE SET ...`.
//! - Inserted, updated and deleted rows come back through `RETURNING`.
//! - Paging is `LIMIT ? OFFSET ?`; random samples are
//!   `ORDER BY RANDOM() LIMIT ?` and cannot be seeded.
//! - Stored procedures do not exist.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlweave_core::{DataSourceSettings, InsertOptions, Property};
//! use sqlweave_sqlite::SqliteDataSource;
//!
//! # async fn run() -> sqlweave_core::Result<()> {
//! let source = SqliteDataSource::connect("sqlite:app.db", DataSourceSettings::default()).await?;
//! let insert = source.context().insert(
//!     "Customer",
//!     vec![Property::new("Name", "Ada")],
//!     InsertOptions::default(),
//! )?;
//! source.execute_non_query(&insert).await?;
//!
//! let rows = source.query(&source.context().from("Customer")?).await?;
//! println!("{} customers", rows.len());
//! # Ok(())
//! # }
//! ```

mod connection;
mod data_source;

pub use connection::SqliteSession;
pub use data_source::SqliteDataSource;
