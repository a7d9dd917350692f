//! Discovery and execution through a blocking driver.

mod common;

use std::collections::HashSet;
use std::sync::{Arc, Barrier};

use common::{sales_tables, FakeDriver, FakeTable};
use sqlweave_core::audit::AuditRules;
use sqlweave_core::execution::{Outcome, RowSet};
use sqlweave_core::metadata::{ColumnMetadata, StaticSchemaSource, TableOrViewMetadata};
use sqlweave_core::{
    ArgumentValue, CommandBuilder, DataSource, DataSourceSettings, DeleteOptions, Dialect,
    InsertOptions, ObjectName, Property, SqlValue, UpdateOptions, UpsertOptions, WeaveError,
};

fn sql_server() -> (FakeDriver, DataSource<FakeDriver>) {
    let driver = FakeDriver::new(Dialect::SqlServer, sales_tables());
    let source = DataSource::new(driver.clone(), Dialect::SqlServer, DataSourceSettings::default());
    (driver, source)
}

// =============================================================================
// Discovery
// =============================================================================

#[test]
fn test_spellings_share_one_descriptor() {
    let (driver, source) = sql_server();
    let cache = source.cache();

    let first = cache.get_table_or_view("Customer").unwrap();
    assert_eq!(driver.discovery_calls(), 2);

    for spelling in ["dbo.Customer", "[dbo].[customer]", "\"DBO\".\"CUSTOMER\""] {
        let again = cache.get_table_or_view(spelling).unwrap();
        assert!(Arc::ptr_eq(&first, &again), "{spelling}");
    }
    assert_eq!(driver.discovery_calls(), 2);
    assert_eq!(first.quoted_name(), "[dbo].[Customer]");
    assert_eq!(first.columns().len(), 3);
    assert!(first.columns()[0].is_identity);
}

#[test]
fn test_concurrent_lookups_share_one_descriptor() {
    let (_, source) = sql_server();
    let cache = source.cache();
    let spellings = ["Order", "dbo.Order", "[dbo].[order]", "\"DBO\".\"ORDER\""];
    let barrier = Barrier::new(8);

    let found: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let barrier = &barrier;
                let spelling = spellings[i % spellings.len()];
                scope.spawn(move || {
                    barrier.wait();
                    cache.get_table_or_view(spelling).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let cached = cache.get_table_or_view("dbo.Order").unwrap();
    for table in &found {
        assert!(Arc::ptr_eq(table, &cached));
    }
    assert_eq!(cached.quoted_name(), "[dbo].[Order]");
}

#[test]
fn test_object_name_hashing_ignores_case_and_quotes() {
    let names: HashSet<ObjectName> = ["dbo.Customer", "[DBO].[customer]", "`dbo`.`CUSTOMER`"]
        .into_iter()
        .map(|n| ObjectName::parse(n).unwrap())
        .collect();
    assert_eq!(names.len(), 1);
    assert_ne!(
        ObjectName::parse("sales.Customer").unwrap(),
        ObjectName::parse("dbo.Customer").unwrap()
    );
}

#[test]
fn test_missing_table() {
    let (_, source) = sql_server();
    let err = source.cache().get_table_or_view("dbo.Nope").unwrap_err();
    assert!(matches!(
        err,
        WeaveError::MissingObject { ref name, .. } if name == "dbo.Nope"
    ));
}

#[test]
fn test_preload_twice_keeps_the_cache() {
    let (driver, source) = sql_server();
    let cache = source.cache();
    cache.preload().unwrap();
    let calls = driver.discovery_calls();
    let tables = cache.cached_tables();
    let customer = cache.get_table_or_view("Customer").unwrap();

    cache.preload().unwrap();
    assert_eq!(cache.cached_tables(), tables);
    assert_eq!(tables.len(), 2);
    assert!(Arc::ptr_eq(
        &customer,
        &cache.get_table_or_view("Customer").unwrap()
    ));
    // Only the object listing runs again.
    assert_eq!(driver.discovery_calls(), calls + 1);
}

#[test]
fn test_reset_rediscovers() {
    let (driver, source) = sql_server();
    let cache = source.cache();
    let before = cache.get_table_or_view("Customer").unwrap();
    driver.state.lock().unwrap().tables[0] = FakeTable::new(Some("dbo"), "Customer")
        .key("Id", "int")
        .column("Name", "nvarchar");

    assert_eq!(cache.get_table_or_view("Customer").unwrap().columns().len(), 3);
    cache.reset();
    let after = cache.get_table_or_view("Customer").unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.columns().len(), 2);
    assert_eq!(driver.discovery_calls(), 4);
}

#[test]
fn test_quoting_round_trips() {
    let (_, source) = sql_server();
    let cache = source.cache();
    let name = ObjectName::new(Some("sales"), "Order Lines");
    let quoted = cache.quote_object_name(&name);
    assert_eq!(quoted, "[sales].[Order Lines]");
    assert_eq!(ObjectName::parse(&quoted).unwrap(), name);
    assert_eq!(cache.quote_column_name("a]b"), "[a]]b]");
}

// =============================================================================
// Execution
// =============================================================================

#[test]
fn test_insert_binds_only_known_columns() {
    let (driver, source) = sql_server();
    let argument: ArgumentValue = vec![
        Property::new("Id", 10),
        Property::new("Name", "Ada"),
        Property::new("Email", "ada@example.com"),
        Property::new("Nickname", "ada"),
    ]
    .into();
    let command = source
        .context()
        .insert("Customer", argument, InsertOptions::default())
        .unwrap();
    assert_eq!(source.execute_non_query(&command).unwrap(), 1);

    let executed = driver.executed();
    assert_eq!(
        executed[0].0,
        "INSERT INTO [dbo].[Customer] ([Name], [Email]) VALUES (@Name, @Email);"
    );
    let names: Vec<&str> = executed[0].1.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["@Name", "@Email"]);
}

#[test]
fn test_get_by_key_placeholders() {
    let (driver, source) = sql_server();
    let context = source.context();
    let rows = RowSet::new(
        vec!["Id".into(), "Name".into(), "Email".into()],
        vec![vec![SqlValue::Int(5), SqlValue::Text("Ada".into()), SqlValue::Null]],
    );
    driver.script(vec![Outcome::Rows(rows.clone())]);
    let result = source.query(&context.get_by_key("Customer", 5).unwrap()).unwrap();
    assert_eq!(result, rows);
    assert_eq!(
        result.first().and_then(|r| r.get("name").cloned()),
        Some(SqlValue::Text("Ada".into()))
    );

    source
        .query(&context.get_by_keys("Customer", [5, 6]).unwrap())
        .unwrap();
    let executed = driver.executed();
    assert!(executed[0].0.ends_with("WHERE [Id] = @Param0;"));
    assert!(executed[1].0.ends_with("WHERE [Id] IN (@Param0, @Param1);"));
}

#[test]
fn test_filter_with_null_property() {
    let (driver, source) = sql_server();
    let query = source
        .context()
        .from("Customer")
        .unwrap()
        .with_filter(vec![Property::new("Id", 5), Property::new("Name", SqlValue::Null)]);
    source.query(&query).unwrap();
    let (sql, params) = &driver.executed()[0];
    assert_eq!(
        sql,
        "SELECT [Id], [Name], [Email] FROM [dbo].[Customer] WHERE [Id] = @Id AND [Name] IS NULL;"
    );
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].value, SqlValue::Int(5));
}

#[test]
fn test_update_row_count_mismatch() {
    let (driver, source) = sql_server();
    driver.script(vec![Outcome::Affected(0)]);
    let argument: ArgumentValue = vec![Property::new("Id", 5), Property::new("Name", "x")].into();
    let command = source
        .context()
        .update("Customer", argument.clone(), UpdateOptions::default())
        .unwrap();
    let err = source.execute_non_query(&command).unwrap_err();
    assert!(matches!(err, WeaveError::RowCountMismatch { actual: 0, .. }));

    driver.script(vec![Outcome::Affected(0)]);
    let command = source
        .context()
        .update(
            "Customer",
            argument,
            UpdateOptions::default().ignore_rows_affected(),
        )
        .unwrap();
    assert_eq!(source.execute_non_query(&command).unwrap(), 0);
}

#[test]
fn test_scalar_count() {
    let (driver, source) = sql_server();
    driver.script(vec![Outcome::Scalar(SqlValue::Int(12))]);
    let query = source.context().from("dbo.Order").unwrap().count();
    assert_eq!(source.scalar(&query).unwrap(), SqlValue::Int(12));
    assert_eq!(driver.executed()[0].0, "SELECT COUNT(*) FROM [dbo].[Order];");
}

#[test]
fn test_soft_delete_is_an_update() {
    let driver = FakeDriver::new(
        Dialect::SqlServer,
        vec![FakeTable::new(Some("dbo"), "Customer")
            .key("Id", "int")
            .column("Name", "nvarchar")
            .column("IsDeleted", "bit")],
    );
    let source = DataSource::new(driver.clone(), Dialect::SqlServer, DataSourceSettings::default())
        .with_rules(AuditRules::new().with_soft_delete("IsDeleted", true));
    let argument: ArgumentValue = vec![Property::new("Id", 3)].into();
    let command = source
        .context()
        .delete("Customer", argument, DeleteOptions::default())
        .unwrap();
    source.execute_non_query(&command).unwrap();

    let (sql, params) = &driver.executed()[0];
    assert_eq!(
        sql,
        "UPDATE [dbo].[Customer] SET [IsDeleted] = @IsDeleted WHERE [Id] = @Id;"
    );
    assert_eq!(params[0].value, SqlValue::Bool(true));
}

// =============================================================================
// Access upsert
// =============================================================================

fn access() -> (FakeDriver, DataSource<FakeDriver>) {
    let dialect = Dialect::Access;
    let schema = StaticSchemaSource::new().with_table(TableOrViewMetadata::new(
        dialect,
        ObjectName::new(None, "Product"),
        true,
        vec![
            ColumnMetadata::new(dialect, "Code", "varchar").primary_key(),
            ColumnMetadata::new(dialect, "Price", "currency"),
        ],
    ));
    let driver = FakeDriver::new(dialect, Vec::new());
    let source = DataSource::with_source(
        Arc::new(driver.clone()),
        dialect,
        DataSourceSettings::default(),
        schema,
    );
    (driver, source)
}

#[test]
fn test_access_upsert_inserts_when_update_misses() {
    let (driver, source) = access();
    let argument: ArgumentValue = vec![Property::new("Code", "A1"), Property::new("Price", 3)].into();
    let command = source
        .context()
        .upsert("Product", argument, UpsertOptions::default())
        .unwrap();
    let chain = command.prepare(&Default::default()).unwrap();
    assert_eq!(chain.len(), 2);

    driver.script(vec![Outcome::Affected(0), Outcome::Affected(1)]);
    assert_eq!(source.execute_non_query(&command).unwrap(), 1);
    let executed = driver.executed();
    assert_eq!(executed.len(), 2);
    assert_eq!(executed[0].0, "UPDATE [Product] SET [Price] = ? WHERE [Code] = ?;");
    assert_eq!(executed[1].0, "INSERT INTO [Product] ([Code], [Price]) VALUES (?, ?);");
}

#[test]
fn test_access_upsert_skips_insert_when_update_hits() {
    let (driver, source) = access();
    let argument: ArgumentValue = vec![Property::new("Code", "A1"), Property::new("Price", 3)].into();
    let command = source
        .context()
        .upsert("Product", argument, UpsertOptions::default())
        .unwrap();
    driver.script(vec![Outcome::Affected(1)]);
    assert_eq!(source.execute_non_query(&command).unwrap(), 1);
    assert_eq!(driver.executed().len(), 1);
}
