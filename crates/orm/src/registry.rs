//! Process-wide schema registry.
//!
//! Schemas are built on first use and cached for the life of the process.
//! Building a schema resolves the schemas of its related records; a record
//! type already being built further up the chain is reported as unusable, so
//! the relation pointing back at it is dropped instead of recursing.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use crate::definition::Mapped;
use crate::error::{Error, Result};
use crate::schema::Schema;

static REGISTRY: LazyLock<RwLock<Registry>> = LazyLock::new(|| RwLock::new(Registry::default()));

/// Schema cache and the stack of types currently being built.
#[derive(Default)]
pub(crate) struct Registry {
    cache: HashMap<&'static str, Arc<dyn Any + Send + Sync>>,
    stack: Vec<&'static str>,
}

impl Registry {
    fn lookup<T: Mapped>(&self) -> Option<Arc<Schema<T>>> {
        let cached = self.cache.get(type_name::<T>())?;
        Arc::clone(cached).downcast::<Schema<T>>().ok()
    }

    /// Returns the schema of `T`, building it if needed. Schemas built while
    /// another schema is in progress are returned without being cached, since
    /// their back-relations were dropped.
    pub(crate) fn resolve<T: Mapped>(&mut self) -> Option<Arc<Schema<T>>> {
        if let Some(schema) = self.lookup::<T>() {
            return Some(schema);
        }

        let name = type_name::<T>();
        if self.stack.contains(&name) {
            tracing::debug!(record = name, "recursive relation, schema not resolved");
            return None;
        }

        let depth = self.stack.len();
        self.stack.push(name);
        let built = Schema::<T>::build(self).map(Arc::new);
        self.stack.truncate(depth);

        let schema = built?;
        if depth == 0 {
            tracing::debug!(record = name, table = schema.table(), "schema registered");
            self.cache.insert(name, Arc::clone(&schema) as Arc<dyn Any + Send + Sync>);
        }
        Some(schema)
    }
}

/// Returns the schema of `T`, building and caching it on first use.
///
/// # Errors
///
/// Returns [`Error::InvalidRecord`] when `T` maps no columns.
pub fn schema<T: Mapped>() -> Result<Arc<Schema<T>>> {
    let cached = REGISTRY.read().lookup::<T>();
    if let Some(schema) = cached {
        return Ok(schema);
    }

    let resolved = REGISTRY.write().resolve::<T>();
    resolved.ok_or(Error::InvalidRecord {
        type_name: type_name::<T>(),
    })
}

/// Drops the cached schema of `T` and builds it again.
///
/// # Errors
///
/// Returns [`Error::InvalidRecord`] when `T` maps no columns.
pub fn rebuild<T: Mapped>() -> Result<Arc<Schema<T>>> {
    let mut registry = REGISTRY.write();
    registry.cache.remove(type_name::<T>());
    registry.resolve::<T>().ok_or(Error::InvalidRecord {
        type_name: type_name::<T>(),
    })
}
