//! A blocking data source: a driver, its metadata cache and the command
//! context, with helpers that prepare and execute in one call.

use std::sync::Arc;

use tracing::info;

use crate::audit::AuditRules;
use crate::command::{CommandBuilder, CommandContext};
use crate::dialect::Dialect;
use crate::error::Result;
use crate::execution::{
    execute_chain, Driver, Materializer, NonQueryMaterializer, RowSet, RowsMaterializer,
    ScalarMaterializer,
};
use crate::metadata::{DriverSchemaSource, MetadataCache, SchemaSource};
use crate::settings::DataSourceSettings;
use crate::value::SqlValue;

/// Entry point for blocking drivers.
///
/// Metadata is discovered through the driver itself unless another
/// [`SchemaSource`] is supplied.
pub struct DataSource<D: Driver> {
    driver: Arc<D>,
    context: CommandContext,
}

impl<D: Driver + 'static> DataSource<D> {
    /// Creates a data source that introspects the database through `driver`.
    pub fn new(driver: D, dialect: Dialect, settings: DataSourceSettings) -> Self {
        let driver = Arc::new(driver);
        let source = DriverSchemaSource::new(Arc::clone(&driver), dialect);
        Self::with_source(driver, dialect, settings, source)
    }

    /// Creates a data source with its own metadata source.
    pub fn with_source(
        driver: Arc<D>,
        dialect: Dialect,
        settings: DataSourceSettings,
        source: impl SchemaSource + 'static,
    ) -> Self {
        let cache = MetadataCache::new(dialect, source)
            .with_default_schema(settings.default_schema.clone());
        info!(dialect = %dialect, strict = settings.strict_mode, "data source created");
        Self {
            driver,
            context: CommandContext::new(
                Arc::new(cache),
                Arc::new(AuditRules::default()),
                Arc::new(settings),
            ),
        }
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

    /// Prepares `command` for `materializer` and runs the chain on a new
    /// connection.
    pub fn execute<B, M>(&self, command: &B, materializer: M) -> Result<M::Output>
    where
        B: CommandBuilder + ?Sized,
        M: Materializer,
    {
        let chain = command.prepare(&materializer.desired_columns())?;
        let mut connection = self.driver.open_connection()?;
        execute_chain(&mut connection, chain, materializer, self.context.settings())
    }

    /// Runs a command for its side effects and returns the affected rows.
    pub fn execute_non_query<B: CommandBuilder + ?Sized>(&self, command: &B) -> Result<u64> {
        self.execute(command, NonQueryMaterializer)
    }

    /// Runs a command and returns every column of its rows.
    pub fn query<B: CommandBuilder + ?Sized>(&self, command: &B) -> Result<RowSet> {
        self.execute(command, RowsMaterializer::all())
    }

    /// Runs a command and returns the first value it produces.
    pub fn scalar<B: CommandBuilder + ?Sized>(&self, command: &B) -> Result<SqlValue> {
        self.execute(command, ScalarMaterializer)
    }
}
