//! A pooled SQLite data source.

use std::sync::Arc;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool};
use tracing::info;

use sqlweave_core::audit::AuditRules;
use sqlweave_core::execution::{
    execute_chain_async, Materializer, NonQueryMaterializer, RowSet, RowsMaterializer,
    ScalarMaterializer,
};
use sqlweave_core::metadata::{load_schema_snapshot, MetadataCache, StaticSchemaSource};
use sqlweave_core::{
    CommandBuilder, CommandContext, DataSourceSettings, Dialect, Result, SqlValue, WeaveError,
};

use crate::connection::SqliteSession;

/// Commands and metadata for one SQLite database.
///
/// The schema is read once when the data source is created; call
/// [`SqliteDataSource::refresh_metadata`] after DDL.
#[derive(Debug, Clone)]
pub struct SqliteDataSource {
    pool: SqlitePool,
    context: CommandContext,
}

impl SqliteDataSource {
    /// Opens a pool for `url` and loads the schema.
    pub async fn connect(url: &str, settings: DataSourceSettings) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(WeaveError::driver)?;
        Self::from_pool(pool, settings).await
    }

    /// Uses an existing pool and loads the schema.
    pub async fn from_pool(pool: SqlitePool, settings: DataSourceSettings) -> Result<Self> {
        let cache = MetadataCache::new(Dialect::Sqlite, StaticSchemaSource::new())
            .with_default_schema(settings.default_schema.clone());
        info!(strict = settings.strict_mode, "sqlite data source created");
        let source = Self {
            pool,
            context: CommandContext::new(
                Arc::new(cache),
                Arc::new(AuditRules::default()),
                Arc::new(settings),
            ),
        };
        source.refresh_metadata().await?;
        Ok(source)
    }

    /// Replaces the audit rules.
    #[must_use]
    pub fn with_rules(mut self, rules: AuditRules) -> Self {
        self.context = CommandContext::new(
            Arc::clone(self.context.cache()),
            Arc::new(rules),
            Arc::new(self.context.settings().clone()),
        );
        self
    }

    /// Re-reads every table, view and index and replaces the cached schema.
    pub async fn refresh_metadata(&self) -> Result<()> {
        let mut session = self.session().await?;
        let snapshot = load_schema_snapshot(&mut session, Dialect::Sqlite).await?;
        info!(tables = snapshot.table_count(), "sqlite schema loaded");
        self.context.cache().reset_with(snapshot);
        Ok(())
    }

    /// The command context, used to create command builders.
    #[must_use]
    pub const fn context(&self) -> &CommandContext {
        &self.context
    }

    /// The metadata cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<MetadataCache> {
        self.context.cache()
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn session(&self) -> Result<SqliteSession<PoolConnection<Sqlite>>> {
        let conn = self.pool.acquire().await.map_err(WeaveError::driver)?;
        Ok(SqliteSession::new(conn))
    }

    /// Prepares `command` for `materializer` and runs the chain on a pooled
    /// connection.
    pub async fn execute<B, M>(&self, command: &B, materializer: M) -> Result<M::Output>
    where
        B: CommandBuilder + ?Sized,
        M: Materializer,
    {
        let chain = command.prepare(&materializer.desired_columns())?;
        let mut session = self.session().await?;
        execute_chain_async(&mut session, chain, materializer, self.context.settings()).await
    }

    /// Like [`SqliteDataSource::execute`], with every link in one
    /// transaction. A failing link rolls back the links before it.
    pub async fn execute_in_transaction<B, M>(
        &self,
        command: &B,
        materializer: M,
    ) -> Result<M::Output>
    where
        B: CommandBuilder + ?Sized,
        M: Materializer,
    {
        let chain = command.prepare(&materializer.desired_columns())?;
        let tx = self.pool.begin().await.map_err(WeaveError::driver)?;
        let mut session = SqliteSession::new(tx);
        let output =
            execute_chain_async(&mut session, chain, materializer, self.context.settings()).await?;
        session.into_inner().commit().await.map_err(WeaveError::driver)?;
        Ok(output)
    }

    /// Runs a command for its side effects and returns the affected rows.
    pub async fn execute_non_query<B: CommandBuilder + ?Sized>(&self, command: &B) -> Result<u64> {
        self.execute(command, NonQueryMaterializer).await
    }

    /// Runs a command and returns every column of its rows.
    pub async fn query<B: CommandBuilder + ?Sized>(&self, command: &B) -> Result<RowSet> {
        self.execute(command, RowsMaterializer::all()).await
    }

    /// Runs a command and returns the first value it produces.
    pub async fn scalar<B: CommandBuilder + ?Sized>(&self, command: &B) -> Result<SqlValue> {
        self.execute(command, ScalarMaterializer).await
    }
}

#[cfg(test)]
mod tests {
    use sqlweave_core::{
        ArgumentValue, DeleteOptions, DesiredColumns, InsertOptions, Limits, Property,
        SortExpression, UpdateOptions, UpsertOptions,
    };
    use sqlweave_derive::Record;

    use super::*;

    #[derive(Debug, Clone, Record)]
    #[table(name = "Customer")]
    struct Customer {
        #[column(name = "Id", key)]
        id: i64,
        #[column(name = "Name")]
        name: String,
        #[column(name = "Email")]
        email: Option<String>,
    }

    async fn create_test_source() -> SqliteDataSource {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        sqlx::query(
            "CREATE TABLE Customer (
                Id INTEGER PRIMARY KEY,
                Name TEXT NOT NULL,
                Email TEXT,
                IsDeleted INTEGER
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("CREATE UNIQUE INDEX ix_customer_email ON Customer (Email)")
            .execute(&pool)
            .await
            .unwrap();
        SqliteDataSource::from_pool(pool, DataSourceSettings::default())
            .await
            .unwrap()
    }

    fn customer(name: &str) -> ArgumentValue {
        vec![
            Property::new("Name", name),
            Property::new("Email", format!("{}@example.com", name.to_lowercase())),
        ]
        .into()
    }

    async fn count(source: &SqliteDataSource) -> SqlValue {
        let query = source.context().from("Customer").unwrap().count();
        source.scalar(&query).await.unwrap()
    }

    #[tokio::test]
    async fn test_schema_is_discovered() {
        let source = create_test_source().await;
        let table = source.cache().get_table_or_view("customer").unwrap();
        assert_eq!(table.quoted_name(), "\"Customer\"");
        let names: Vec<&str> = table.columns().iter().map(|c| c.sql_name.as_str()).collect();
        assert_eq!(names, ["Id", "Name", "Email", "IsDeleted"]);
        assert!(table.columns()[0].is_primary_key);
        assert!(table.columns()[0].is_identity);
        assert!(!table.columns()[1].is_nullable);

        let indexes = source.cache().get_indexes_for_table("Customer").unwrap();
        assert_eq!(indexes.len(), 1);
        assert!(indexes[0].is_unique);
        assert_eq!(indexes[0].columns[0].name, "Email");
    }

    #[tokio::test]
    async fn test_insert_returns_generated_key() {
        let source = create_test_source().await;
        let insert = source
            .context()
            .insert("Customer", customer("Ada"), InsertOptions::default())
            .unwrap();
        let rows = source.query(&insert).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = rows.first().unwrap();
        assert_eq!(row.get("id"), Some(&SqlValue::Int(1)));
        assert_eq!(row.get("Name"), Some(&SqlValue::Text("Ada".into())));

        source.execute_non_query(&insert).await.unwrap_err();
        assert_eq!(count(&source).await, SqlValue::Int(1));
    }

    #[tokio::test]
    async fn test_query_filter_sort_and_page() {
        let source = create_test_source().await;
        for name in ["Ada", "Grace", "Linus"] {
            let insert = source
                .context()
                .insert("Customer", customer(name), InsertOptions::default())
                .unwrap();
            source.execute_non_query(&insert).await.unwrap();
        }
        let context = source.context();

        let rows = source
            .query(&context.from("Customer").unwrap().with_filter(vec![
                Property::new("Name", "Grace"),
                Property::new("IsDeleted", SqlValue::Null),
            ]))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.first().unwrap().get("Id"), Some(&SqlValue::Int(2)));

        let query = context
            .from("Customer")
            .unwrap()
            .with_sorting([SortExpression::desc("Name")])
            .with_limits(Limits::rows(1).skip(1));
        let rows = source.query(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows.first().unwrap().get("Name"),
            Some(&SqlValue::Text("Grace".into()))
        );

        let rows = source
            .query(&context.get_by_keys("Customer", [1, 3]).unwrap())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_update_checks_affected_rows() {
        let source = create_test_source().await;
        let context = source.context();
        let insert = context
            .insert("Customer", customer("Ada"), InsertOptions::default())
            .unwrap();
        source.execute_non_query(&insert).await.unwrap();

        let update = context
            .update(
                "Customer",
                vec![Property::new("Id", 1), Property::new("Name", "Ada L.")],
                UpdateOptions::default(),
            )
            .unwrap();
        assert_eq!(source.execute_non_query(&update).await.unwrap(), 1);
        let row = source
            .query(&context.get_by_key("Customer", 1).unwrap())
            .await
            .unwrap();
        assert_eq!(
            row.first().unwrap().get("Name"),
            Some(&SqlValue::Text("Ada L.".into()))
        );

        let missing = context
            .update(
                "Customer",
                vec![Property::new("Id", 99), Property::new("Name", "Nobody")],
                UpdateOptions::default(),
            )
            .unwrap();
        let err = source.execute_non_query(&missing).await.unwrap_err();
        assert!(matches!(err, WeaveError::RowCountMismatch { actual: 0, .. }));
    }

    #[tokio::test]
    async fn test_update_returns_old_values() {
        let source = create_test_source().await;
        let context = source.context();
        let insert = context
            .insert("Customer", customer("Ada"), InsertOptions::default())
            .unwrap();
        source.execute_non_query(&insert).await.unwrap();

        let update = context
            .update(
                "Customer",
                vec![Property::new("Id", 1), Property::new("Name", "Grace")],
                UpdateOptions::default().return_old_values(),
            )
            .unwrap();
        let rows = source.query(&update).await.unwrap();
        assert_eq!(
            rows.first().unwrap().get("Name"),
            Some(&SqlValue::Text("Ada".into()))
        );
    }

    #[tokio::test]
    async fn test_soft_delete_hides_rows() {
        let source = create_test_source()
            .await
            .with_rules(AuditRules::new().with_soft_delete("IsDeleted", true));
        let context = source.context();
        for name in ["Ada", "Grace"] {
            let insert = context
                .insert("Customer", customer(name), InsertOptions::default())
                .unwrap();
            source.execute_non_query(&insert).await.unwrap();
        }

        let delete = context.delete_by_key("Customer", 1).unwrap();
        assert_eq!(source.execute_non_query(&delete).await.unwrap(), 1);

        assert_eq!(count(&source).await, SqlValue::Int(1));
        let all = context.from("Customer").unwrap().include_deleted().count();
        assert_eq!(source.scalar(&all).await.unwrap(), SqlValue::Int(2));
    }

    #[tokio::test]
    async fn test_hard_delete_with_filter() {
        let source = create_test_source().await;
        let context = source.context();
        for name in ["Ada", "Grace"] {
            let insert = context
                .insert("Customer", customer(name), InsertOptions::default())
                .unwrap();
            source.execute_non_query(&insert).await.unwrap();
        }
        let delete = context
            .delete("Customer", vec![Property::new("Id", 2)], DeleteOptions::default())
            .unwrap();
        assert_eq!(source.execute_non_query(&delete).await.unwrap(), 1);

        let delete = context
            .delete_with_filter("Customer")
            .unwrap()
            .with_filter(vec![Property::new("Name", "Ada")]);
        assert_eq!(source.execute_non_query(&delete).await.unwrap(), 1);
        assert_eq!(count(&source).await, SqlValue::Int(0));
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let source = create_test_source().await;
        let context = source.context();
        let argument: ArgumentValue = vec![
            Property::new("Id", 10),
            Property::new("Name", "Ada"),
            Property::new("Email", "ada@example.com"),
        ]
        .into();
        let upsert = context
            .upsert("Customer", argument, UpsertOptions::default().identity_insert())
            .unwrap();
        source.execute_non_query(&upsert).await.unwrap();

        let argument: ArgumentValue = vec![
            Property::new("Id", 10),
            Property::new("Name", "Ada Lovelace"),
            Property::new("Email", "ada@example.com"),
        ]
        .into();
        let upsert = context
            .upsert("Customer", argument, UpsertOptions::default().identity_insert())
            .unwrap();
        let rows = source
            .execute(&upsert, RowsMaterializer::all())
            .await
            .unwrap();
        assert_eq!(
            rows.first().unwrap().get("Name"),
            Some(&SqlValue::Text("Ada Lovelace".into()))
        );
        assert_eq!(count(&source).await, SqlValue::Int(1));
    }

    #[tokio::test]
    async fn test_scalar_insert_reports_affected_rows() {
        let source = create_test_source().await;
        let insert = source
            .context()
            .insert("Customer", customer("Ada"), InsertOptions::default())
            .unwrap();
        assert_eq!(source.scalar(&insert).await.unwrap(), SqlValue::Int(1));
        assert_eq!(count(&source).await, SqlValue::Int(1));
    }

    #[tokio::test]
    async fn test_upsert_updates_existing_identity_row() {
        let source = create_test_source().await;
        let context = source.context();
        let insert = context
            .insert("Customer", customer("Ada"), InsertOptions::default())
            .unwrap();
        source.execute_non_query(&insert).await.unwrap();

        let argument: ArgumentValue =
            vec![Property::new("Id", 1), Property::new("Name", "Ada Lovelace")].into();
        let upsert = context
            .upsert("Customer", argument, UpsertOptions::default())
            .unwrap();
        source.execute_non_query(&upsert).await.unwrap();

        assert_eq!(count(&source).await, SqlValue::Int(1));
        let query = context
            .from("Customer")
            .unwrap()
            .with_filter(vec![Property::new("Id", 1)]);
        let rows = source.query(&query).await.unwrap();
        assert_eq!(
            rows.first().unwrap().get("Name"),
            Some(&SqlValue::Text("Ada Lovelace".into()))
        );
    }

    #[tokio::test]
    async fn test_record_round_trip() {
        let source = create_test_source().await;
        let context = source.context();
        let ada = Customer {
            id: 0,
            name: "Ada".into(),
            email: None,
        };
        let insert = context
            .insert("Customer", &ada, InsertOptions::default())
            .unwrap();
        let rows = source
            .execute(
                &insert,
                RowsMaterializer::new(DesiredColumns::named(["Id"])),
            )
            .await
            .unwrap();
        assert_eq!(rows.columns(), ["Id"]);

        let query = context.from_record::<Customer>().unwrap().count();
        assert_eq!(source.scalar(&query).await.unwrap(), SqlValue::Int(1));
    }

    #[tokio::test]
    async fn test_transaction_commits_every_link() {
        let source = create_test_source().await;
        let insert = source
            .context()
            .insert("Customer", customer("Ada"), InsertOptions::default())
            .unwrap();
        let affected = source
            .execute_in_transaction(&insert, NonQueryMaterializer)
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(count(&source).await, SqlValue::Int(1));
    }

    #[tokio::test]
    async fn test_refresh_metadata_after_ddl() {
        let source = create_test_source().await;
        let err = source.context().from("Product").unwrap_err();
        assert!(matches!(err, WeaveError::MissingObject { .. }));

        let ddl = source.context().sql(
            "CREATE TABLE Product (Code TEXT PRIMARY KEY, Price REAL)",
            ArgumentValue::None,
        );
        source.execute_non_query(&ddl).await.unwrap();
        source.refresh_metadata().await.unwrap();

        let table = source.cache().get_table_or_view("Product").unwrap();
        assert_eq!(table.columns().len(), 2);
        assert!(table.identity_column().is_none());
    }

    #[tokio::test]
    async fn test_timeout_is_applied() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        let settings = DataSourceSettings::default().with_timeout_secs(5);
        let source = SqliteDataSource::from_pool(pool, settings).await.unwrap();
        let value = source
            .scalar(&source.context().sql("SELECT 40 + 2", ArgumentValue::None))
            .await
            .unwrap();
        assert_eq!(value, SqlValue::Int(42));
    }
}
