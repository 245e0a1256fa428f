//! The mapping engine handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use quarry_sql::{Executor, FromEnv};

use crate::cache::{CacheStore, NullStore, ObjectCache};
use crate::config::OrmConfig;
use crate::definition::Record;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::schema::DEFAULT_DATABASE;

/// Shared handle to the executors of each logical database and the object
/// cache. Cheap to clone.
///
/// ```ignore
/// let orm = Orm::builder()
///     .executor(Arc::new(SqliteExecutor::memory()?))
///     .cache_store(Arc::new(MemoryStore::default()))
///     .build();
///
/// let mut post = Post::default();
/// post.model.id = 42;
/// orm.query::<Post>().with(["user", "comments[user]"]).first(&mut post)?;
/// ```
#[derive(Clone)]
pub struct Orm {
    inner: Arc<Inner>,
}

struct Inner {
    executors: HashMap<String, Arc<dyn Executor>>,
    cache: ObjectCache,
    config: OrmConfig,
}

impl Orm {
    /// Creates an engine over a single `default` database without caching.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self::builder().executor(executor).build()
    }

    /// Starts building an engine.
    #[must_use]
    pub fn builder() -> OrmBuilder {
        OrmBuilder::default()
    }

    /// Starts an operation on records of type `T`.
    #[must_use]
    pub fn query<T: Record>(&self) -> Query<T> {
        Query::new(self.clone())
    }

    /// Executor registered for the logical `database`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDatabase`] when nothing is registered under
    /// that name.
    pub fn executor(&self, database: &str) -> Result<Arc<dyn Executor>> {
        self.inner
            .executors
            .get(database)
            .cloned()
            .ok_or_else(|| Error::UnknownDatabase(database.to_string()))
    }

    /// The object cache.
    #[must_use]
    pub fn cache(&self) -> &ObjectCache {
        &self.inner.cache
    }

    /// Settings the engine was built with.
    #[must_use]
    pub fn config(&self) -> &OrmConfig {
        &self.inner.config
    }

    /// Counts records of type `T`.
    ///
    /// # Errors
    ///
    /// See [`Query::count`].
    pub fn count<T: Record>(&self) -> Result<u64> {
        self.query::<T>().count()
    }

    /// Loads `record` by its primary key.
    ///
    /// # Errors
    ///
    /// See [`Query::first`].
    pub fn first<T: Record>(&self, record: &mut T) -> Result<()> {
        self.query::<T>().first(record)
    }

    /// Loads every record of type `T`.
    ///
    /// # Errors
    ///
    /// See [`Query::find`].
    pub fn find<T: Record>(&self, records: &mut Vec<T>) -> Result<()> {
        self.query::<T>().find(records)
    }

    /// Loads the named relations of `record`.
    ///
    /// # Errors
    ///
    /// See [`Query::load_related`].
    pub fn load_related<T: Record, S: AsRef<str>>(
        &self, record: &mut T, relations: &[S],
    ) -> Result<()> {
        self.query::<T>().load_related(record, relations)
    }

    /// Inserts `record`.
    ///
    /// # Errors
    ///
    /// See [`Query::create`].
    pub fn create<T: Record>(&self, record: &mut T) -> Result<()> {
        self.query::<T>().create(record)
    }

    /// Updates `record`, or inserts it when it has no primary key yet.
    ///
    /// # Errors
    ///
    /// See [`Query::save`].
    pub fn save<T: Record>(&self, record: &mut T) -> Result<()> {
        self.query::<T>().save(record)
    }

    /// Deletes `record` by its primary key.
    ///
    /// # Errors
    ///
    /// See [`Query::delete`].
    pub fn delete<T: Record>(&self, record: &T) -> Result<()> {
        self.query::<T>().delete(record)
    }

    /// Deletes every record of type `T`.
    ///
    /// # Errors
    ///
    /// See [`Query::delete_all`].
    pub fn delete_all<T: Record>(&self) -> Result<u64> {
        self.query::<T>().delete_all()
    }

    /// Drops the cached copy of `record`.
    ///
    /// # Errors
    ///
    /// See [`Query::delete_from_cache`].
    pub fn delete_from_cache<T: Record>(&self, record: &T) -> Result<()> {
        self.query::<T>().delete_from_cache(record)
    }
}

impl fmt::Debug for Orm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut databases: Vec<&str> = self.inner.executors.keys().map(String::as_str).collect();
        databases.sort_unstable();
        f.debug_struct("Orm")
            .field("databases", &databases)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Orm`].
#[derive(Default)]
pub struct OrmBuilder {
    executors: HashMap<String, Arc<dyn Executor>>,
    store: Option<Arc<dyn CacheStore>>,
    config: Option<OrmConfig>,
}

impl OrmBuilder {
    /// Registers the executor of the `default` database.
    #[must_use]
    pub fn executor(self, executor: Arc<dyn Executor>) -> Self {
        self.database(DEFAULT_DATABASE, executor)
    }

    /// Registers the executor of a logical database.
    #[must_use]
    pub fn database(mut self, name: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        self.executors.insert(name.into(), executor);
        self
    }

    /// Sets the byte store behind the object cache. Without one, nothing is
    /// cached.
    #[must_use]
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the engine settings.
    #[must_use]
    pub fn config(mut self, config: OrmConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Loads the engine settings from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable holds an invalid value.
    pub fn config_from_env(self) -> anyhow::Result<Self> {
        Ok(self.config(OrmConfig::from_env()?))
    }

    /// Finishes the engine.
    #[must_use]
    pub fn build(self) -> Orm {
        let config = self.config.unwrap_or_default();
        let store: Arc<dyn CacheStore> = match self.store {
            Some(store) if config.cache_enabled => store,
            _ => Arc::new(NullStore),
        };
        tracing::debug!(
            databases = self.executors.len(),
            cache_enabled = config.cache_enabled,
            cache_ttl_secs = config.cache_ttl.as_secs(),
            "orm initialized"
        );

        Orm {
            inner: Arc::new(Inner {
                executors: self.executors,
                cache: ObjectCache::new(store, config.cache_ttl),
                config,
            }),
        }
    }
}

impl fmt::Debug for OrmBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrmBuilder")
            .field("databases", &self.executors.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
