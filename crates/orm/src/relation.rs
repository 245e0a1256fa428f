//! Relation loading.
//!
//! Each relation slot registered on a record is backed by a [`Link`], which
//! knows the related record type and how to store loaded values into the
//! owner.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use quarry_sql::{Condition, Value, is_empty};

use crate::cache::Cached;
use crate::definition::Record;
use crate::error::{Error, Result};
use crate::orm::Orm;
use crate::registry::{self, Registry};
use crate::schema::{Relation, SchemaInfo};
use crate::value::to_json;

/// Records already fetched through belongs-to relations during one query.
pub(crate) type Memo = HashMap<String, Box<dyn Any + Send + Sync>>;

/// State handed to a [`Link`] when loading one relation of one record.
pub(crate) struct LoadContext<'a> {
    pub(crate) orm: &'a Orm,
    pub(crate) relation: &'a Relation,
    /// Owner values of the relation's reference columns.
    pub(crate) values: Vec<Value>,
    /// Cache key of the loaded collection, for has-many relations of records
    /// with a primary key.
    pub(crate) cache_key: Option<String>,
    /// Relations to load on the related records.
    pub(crate) with: &'a [String],
    pub(crate) memo: &'a mut Memo,
}

impl LoadContext<'_> {
    fn key_conditions(&self) -> Vec<Condition> {
        self.relation
            .key
            .iter()
            .zip(&self.values)
            .map(|(column, value)| Condition::eq(column.clone(), value.clone()))
            .collect()
    }

    fn memo_key(&self) -> String {
        let mut key: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
        for (column, value) in self.relation.key.iter().zip(&self.values) {
            key.insert(column, to_json(value));
        }
        let json = serde_json::to_string(&key).unwrap_or_default();
        format!("{}{json}", self.relation.field)
    }
}

/// Type-erased access to a related record type.
pub(crate) trait Link<T>: Send + Sync {
    /// Schema of the related record, or `None` when it cannot be built.
    fn resolve(&self, registry: &mut Registry) -> Option<Arc<SchemaInfo>>;

    /// Loads the related records of `owner` and stores them in its slot.
    fn load(&self, owner: &mut T, cx: LoadContext<'_>) -> Result<()>;

    /// Drops cached collections of the related record that may contain the
    /// owner. `values` are the owner's reference values.
    fn clear(&self, _orm: &Orm, _owner: &SchemaInfo, _values: &[Value]) {}
}

/// Single related record referenced by a foreign key held on the owner.
pub(crate) struct BelongsTo<T, R> {
    set: Arc<dyn Fn(&mut T, R) + Send + Sync>,
}

impl<T, R> BelongsTo<T, R> {
    pub(crate) fn new(set: impl Fn(&mut T, R) + Send + Sync + 'static) -> Self {
        Self { set: Arc::new(set) }
    }
}

impl<T, R: Record> Link<T> for BelongsTo<T, R> {
    fn resolve(&self, registry: &mut Registry) -> Option<Arc<SchemaInfo>> {
        registry.resolve::<R>().map(|schema| schema.shared_info())
    }

    fn load(&self, owner: &mut T, mut cx: LoadContext<'_>) -> Result<()> {
        if cx.values.iter().all(is_empty) {
            return Ok(());
        }

        let memo_key = cx.memo_key();
        let memoized = cx.memo.get(&memo_key).and_then(|memo| memo.downcast_ref::<R>()).cloned();
        let mut related = if let Some(related) = memoized {
            related
        } else {
            let mut related = R::default();
            cx.orm.query::<R>().where_all(cx.key_conditions()).first(&mut related)?;
            cx.memo.insert(memo_key, Box::new(related.clone()));
            related
        };

        if !cx.with.is_empty() {
            cx.orm.query::<R>().load_related(&mut related, cx.with)?;
        }
        (self.set)(owner, related);
        Ok(())
    }

    fn clear(&self, orm: &Orm, owner: &SchemaInfo, values: &[Value]) {
        let schema = match registry::schema::<R>() {
            Ok(schema) => schema,
            Err(e) => {
                tracing::warn!(error = %e, "related schema unavailable, cache left as is");
                return;
            }
        };
        let info = schema.info();
        let Some(key) = info.primary_key(values.to_vec()).and_then(|pk| info.cache_key(&pk)) else {
            return;
        };

        for (field, relation) in &info.has_many {
            if relation.database == owner.database && relation.table == owner.table {
                orm.cache().delete(&format!("{key}.{field}"));
            }
        }
    }
}

/// Related records holding a foreign key to the owner's primary key.
pub(crate) struct HasMany<T, R> {
    set: Arc<dyn Fn(&mut T, Vec<R>) + Send + Sync>,
}

impl<T, R> HasMany<T, R> {
    pub(crate) fn new(set: impl Fn(&mut T, Vec<R>) + Send + Sync + 'static) -> Self {
        Self { set: Arc::new(set) }
    }
}

impl<T, R: Record> Link<T> for HasMany<T, R> {
    fn resolve(&self, registry: &mut Registry) -> Option<Arc<SchemaInfo>> {
        registry.resolve::<R>().map(|schema| schema.shared_info())
    }

    fn load(&self, owner: &mut T, cx: LoadContext<'_>) -> Result<()> {
        if cx.values.iter().all(is_empty) {
            return Ok(());
        }

        let cache = cx.orm.cache();
        let cached = cx.cache_key.as_deref().map(|key| cache.get::<Vec<R>>(key));
        let mut related = if let Some(Cached::Hit(related)) = cached {
            related
        } else {
            let relation = cx.relation;
            let mut query = cx.orm.query::<R>().where_all(cx.key_conditions());
            if let Some(filter) = &relation.filter {
                query = query.r#where(filter.clone());
            }
            for order in &relation.order {
                query = query.order_by(order.clone());
            }
            if relation.limit > 0 {
                query = query.limit(relation.limit);
            }

            let mut related = Vec::new();
            query.find(&mut related)?;
            if let Some(key) = &cx.cache_key {
                cache.set(key, &related);
            }
            related
        };

        if !cx.with.is_empty() {
            for item in &mut related {
                cx.orm.query::<R>().load_related(item, cx.with)?;
            }
        }
        (self.set)(owner, related);
        Ok(())
    }
}

/// Relation of an embedded struct, reached through its owner.
pub(crate) struct Lifted<T, E> {
    get_mut: fn(&mut T) -> &mut E,
    inner: Arc<dyn Link<E>>,
}

impl<T, E> Lifted<T, E> {
    pub(crate) fn new(get_mut: fn(&mut T) -> &mut E, inner: Arc<dyn Link<E>>) -> Self {
        Self { get_mut, inner }
    }
}

impl<T, E> Link<T> for Lifted<T, E> {
    fn resolve(&self, registry: &mut Registry) -> Option<Arc<SchemaInfo>> {
        self.inner.resolve(registry)
    }

    fn load(&self, owner: &mut T, cx: LoadContext<'_>) -> Result<()> {
        self.inner.load((self.get_mut)(owner), cx)
    }

    fn clear(&self, orm: &Orm, owner: &SchemaInfo, values: &[Value]) {
        self.inner.clear(orm, owner, values);
    }
}

/// A relation name with the relations to load on its records, written as
/// `name` or `name[nested, other[deeper]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RelationPath {
    pub(crate) name: String,
    pub(crate) with: Vec<String>,
}

impl RelationPath {
    pub(crate) fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let invalid = || Error::InvalidRelationName(text.to_string());

        let (name, with) = match text.find('[') {
            None => (text, Vec::new()),
            Some(open) => {
                let inner = text[open + 1..].strip_suffix(']').ok_or_else(invalid)?;
                (text[..open].trim_end(), split_top_level(inner).ok_or_else(invalid)?)
            }
        };

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid());
        }
        Ok(Self {
            name: name.to_string(),
            with,
        })
    }
}

/// Splits on commas outside brackets. `None` when brackets are unbalanced.
fn split_top_level(text: &str) -> Option<Vec<String>> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    parts.push(&text[start..]);

    let parts = parts.into_iter().map(str::trim).filter(|part| !part.is_empty());
    Some(parts.map(ToString::to_string).collect())
}
