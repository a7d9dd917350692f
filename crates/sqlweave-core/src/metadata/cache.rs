//! Thread-safe, lazily populated metadata cache.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use super::{
    DbType, IndexMetadata, SchemaObject, SchemaSource, StoredProcedureMetadata,
    TableFunctionMetadata, TableOrViewMetadata, ValueKind,
};
use crate::dialect::Dialect;
use crate::error::{ObjectKind, Result, WeaveError};
use crate::name::ObjectName;
use crate::record::Record;

type Map<K, V> = RwLock<HashMap<K, Arc<V>>>;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn cached<K: Hash + Eq, V>(map: &Map<K, V>, key: &K) -> Option<Arc<V>> {
    read(map).get(key).cloned()
}

/// Stores `value` under every key unless a descriptor is already there.
///
/// Returns the descriptor that ended up in the map, so concurrent loaders
/// all observe the first writer's value.
fn store<K: Hash + Eq, V>(map: &Map<K, V>, keys: impl IntoIterator<Item = K>, value: V) -> Arc<V> {
    let mut map = write(map);
    let keys: Vec<K> = keys.into_iter().collect();
    let stored = keys
        .iter()
        .find_map(|key| map.get(key).map(Arc::clone))
        .unwrap_or_else(|| Arc::new(value));
    for key in keys {
        map.entry(key).or_insert_with(|| Arc::clone(&stored));
    }
    stored
}

/// Metadata for one database, discovered on first use.
///
/// Every lookup normalizes the requested name (qualifying it with the
/// default schema), serves it from memory when present and otherwise asks
/// the [`SchemaSource`]. Descriptors are shared as `Arc`s and never
/// mutated; [`MetadataCache::reset`] drops them all.
///
/// ```
/// use sqlweave_core::metadata::{ColumnMetadata, MetadataCache, StaticSchemaSource, TableOrViewMetadata};
/// use sqlweave_core::{Dialect, ObjectName};
///
/// let dialect = Dialect::SqlServer;
/// let source = StaticSchemaSource::new().with_table(TableOrViewMetadata::new(
///     dialect,
///     ObjectName::new(Some("dbo"), "Customer"),
///     true,
///     vec![ColumnMetadata::new(dialect, "Id", "int").primary_key()],
/// ));
/// let cache = MetadataCache::new(dialect, source);
/// let table = cache.get_table_or_view("customer").unwrap();
/// assert_eq!(table.quoted_name(), "[dbo].[Customer]");
/// ```
pub struct MetadataCache {
    dialect: Dialect,
    default_schema: Option<String>,
    source: RwLock<Arc<dyn SchemaSource>>,
    tables: Map<ObjectName, TableOrViewMetadata>,
    indexes: Map<ObjectName, Vec<IndexMetadata>>,
    procedures: Map<ObjectName, StoredProcedureMetadata>,
    functions: Map<ObjectName, TableFunctionMetadata>,
    types: Map<TypeId, TableOrViewMetadata>,
}

impl MetadataCache {
    /// Creates an empty cache over `source`.
    pub fn new(dialect: Dialect, source: impl SchemaSource + 'static) -> Self {
        Self {
            dialect,
            default_schema: dialect.default_schema().map(str::to_string),
            source: RwLock::new(Arc::new(source)),
            tables: RwLock::default(),
            indexes: RwLock::default(),
            procedures: RwLock::default(),
            functions: RwLock::default(),
            types: RwLock::default(),
        }
    }

    /// Overrides the schema used to qualify unqualified names.
    #[must_use]
    pub fn with_default_schema(mut self, schema: Option<String>) -> Self {
        if schema.is_some() {
            self.default_schema = schema;
        }
        self
    }

    /// The dialect.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The schema unqualified names resolve to.
    #[must_use]
    pub fn default_schema(&self) -> Option<&str> {
        self.default_schema.as_deref()
    }

    fn source(&self) -> Arc<dyn SchemaSource> {
        Arc::clone(&read(&self.source))
    }

    fn normalize(&self, name: &str) -> Result<ObjectName> {
        Ok(ObjectName::parse(name)?.or_schema(self.default_schema.as_deref()))
    }

    /// A table or view by name.
    pub fn get_table_or_view(&self, name: &str) -> Result<Arc<TableOrViewMetadata>> {
        let key = self.normalize(name)?;
        self.load_table(key)?
            .ok_or_else(|| WeaveError::missing(ObjectKind::TableOrView, name))
    }

    fn load_table(&self, key: ObjectName) -> Result<Option<Arc<TableOrViewMetadata>>> {
        if let Some(table) = cached(&self.tables, &key) {
            return Ok(Some(table));
        }
        debug!(table = %key, "discovering table or view");
        let Some(table) = self.source().load_table_or_view(&key)? else {
            return Ok(None);
        };
        let real = table.name().clone();
        Ok(Some(store(&self.tables, [key, real], table)))
    }

    /// The table or view a record type maps to.
    ///
    /// Uses the type's declared table name, or its type name when none is
    /// declared. The resolution is remembered per type.
    pub fn get_table_or_view_for<R: Record>(&self) -> Result<Arc<TableOrViewMetadata>> {
        let type_id = TypeId::of::<R>();
        if let Some(table) = cached(&self.types, &type_id) {
            return Ok(table);
        }
        let name = R::TABLE_NAME.unwrap_or_else(|| {
            let full = std::any::type_name::<R>();
            full.rsplit("::").next().unwrap_or(full)
        });
        let table = self.get_table_or_view(name)?;
        let mut types = write(&self.types);
        Ok(Arc::clone(types.entry(type_id).or_insert(table)))
    }

    /// The indexes of a table.
    pub fn get_indexes_for_table(&self, name: &str) -> Result<Arc<Vec<IndexMetadata>>> {
        let table = self.get_table_or_view(name)?;
        let key = table.name().clone();
        if let Some(indexes) = cached(&self.indexes, &key) {
            return Ok(indexes);
        }
        debug!(table = %key, "discovering indexes");
        let indexes = self.source().load_indexes(&key)?;
        Ok(store(&self.indexes, [key], indexes))
    }

    /// A stored procedure by name.
    pub fn get_stored_procedure(&self, name: &str) -> Result<Arc<StoredProcedureMetadata>> {
        if !self.dialect.supports_stored_procedures() {
            return Err(self.dialect.unsupported("stored procedures"));
        }
        let key = self.normalize(name)?;
        self.load_procedure(key)?
            .ok_or_else(|| WeaveError::missing(ObjectKind::StoredProcedure, name))
    }

    fn load_procedure(&self, key: ObjectName) -> Result<Option<Arc<StoredProcedureMetadata>>> {
        if let Some(procedure) = cached(&self.procedures, &key) {
            return Ok(Some(procedure));
        }
        debug!(procedure = %key, "discovering stored procedure");
        let Some(procedure) = self.source().load_stored_procedure(&key)? else {
            return Ok(None);
        };
        let real = procedure.name.clone();
        Ok(Some(store(&self.procedures, [key, real], procedure)))
    }

    /// A table-valued function by name.
    pub fn get_table_function(&self, name: &str) -> Result<Arc<TableFunctionMetadata>> {
        if !self.dialect.supports_table_functions() {
            return Err(self.dialect.unsupported("table functions"));
        }
        let key = self.normalize(name)?;
        self.load_function(key)?
            .ok_or_else(|| WeaveError::missing(ObjectKind::TableFunction, name))
    }

    fn load_function(&self, key: ObjectName) -> Result<Option<Arc<TableFunctionMetadata>>> {
        if let Some(function) = cached(&self.functions, &key) {
            return Ok(Some(function));
        }
        debug!(function = %key, "discovering table function");
        let Some(function) = self.source().load_table_function(&key)? else {
            return Ok(None);
        };
        let real = function.name.clone();
        Ok(Some(store(&self.functions, [key, real], function)))
    }

    /// Every object the source knows about.
    pub fn list_objects(&self) -> Result<Vec<SchemaObject>> {
        self.source().list_objects()
    }

    /// Loads every table, view, procedure and function.
    ///
    /// Descriptors already in the cache are kept, so preloading twice
    /// leaves the cache as it was after the first call.
    pub fn preload(&self) -> Result<()> {
        let (mut tables, mut procedures, mut functions) = (0, 0, 0);
        for object in self.list_objects()? {
            match object.kind {
                ObjectKind::Table | ObjectKind::View | ObjectKind::TableOrView => {
                    if self.load_table(object.name)?.is_some() {
                        tables += 1;
                    }
                }
                ObjectKind::StoredProcedure if self.dialect.supports_stored_procedures() => {
                    if self.load_procedure(object.name)?.is_some() {
                        procedures += 1;
                    }
                }
                ObjectKind::TableFunction if self.dialect.supports_table_functions() => {
                    if self.load_function(object.name)?.is_some() {
                        functions += 1;
                    }
                }
                ObjectKind::StoredProcedure | ObjectKind::TableFunction => {}
            }
        }
        info!(dialect = %self.dialect, tables, procedures, functions, "preloaded metadata");
        Ok(())
    }

    /// Drops every cached descriptor, including the record type map.
    pub fn reset(&self) {
        write(&self.tables).clear();
        write(&self.indexes).clear();
        write(&self.procedures).clear();
        write(&self.functions).clear();
        write(&self.types).clear();
        info!(dialect = %self.dialect, "metadata cache reset");
    }

    /// Replaces the source and drops every cached descriptor.
    pub fn reset_with(&self, source: impl SchemaSource + 'static) {
        *write(&self.source) = Arc::new(source);
        self.reset();
    }

    /// Distinct tables and views currently cached, sorted by name.
    #[must_use]
    pub fn cached_tables(&self) -> Vec<ObjectName> {
        let mut names: Vec<ObjectName> = read(&self.tables)
            .values()
            .map(|t| t.name().clone())
            .collect();
        names.sort_by_key(|n| n.to_string().to_ascii_lowercase());
        names.dedup();
        names
    }

    /// Quotes a column name for the dialect.
    #[must_use]
    pub fn quote_column_name(&self, name: &str) -> String {
        self.dialect.quote_column_name(name)
    }

    /// Quotes an object name for the dialect.
    #[must_use]
    pub fn quote_object_name(&self, name: &ObjectName) -> String {
        self.dialect.quote_object_name(name)
    }

    /// Maps a type name reported by the database.
    #[must_use]
    pub fn sql_type_name_to_db_type(&self, type_name: &str) -> Option<DbType> {
        self.dialect.sql_type_name_to_db_type(type_name)
    }

    /// The Rust-side category of a database type.
    #[must_use]
    pub const fn to_value_kind(&self, db_type: DbType) -> ValueKind {
        Dialect::to_value_kind(db_type)
    }
}

impl fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataCache")
            .field("dialect", &self.dialect)
            .field("default_schema", &self.default_schema)
            .field("tables", &read(&self.tables).len())
            .finish_non_exhaustive()
    }
}
