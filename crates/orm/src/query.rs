//! Per-operation mapping queries.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::anyhow;
use quarry_sql::{Condition, Data, Executor, Expr, OrderBy, Query as Statement, Row, Value};

use crate::cache::Cached;
use crate::definition::Record;
use crate::error::{Error, Result};
use crate::orm::Orm;
use crate::registry::schema;
use crate::relation::{LoadContext, Memo, RelationPath};
use crate::schema::Schema;
use crate::value::ColumnValue;

/// One CRUD operation on records of type `T`.
///
/// Clauses accumulate through the consuming builder methods; a terminal
/// method (`first`, `find`, `save`, ...) runs the operation and consumes the
/// query. Belongs-to records fetched while loading relations are shared
/// between the rows of the same query.
pub struct Query<T> {
    orm: Orm,
    tx: Option<Arc<dyn Executor>>,
    columns: Vec<String>,
    relations: Vec<String>,
    conditions: Vec<Condition>,
    order: Vec<OrderBy>,
    limit: u64,
    offset: u64,
    memo: Memo,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Query<T> {
    pub(crate) fn new(orm: Orm) -> Self {
        Self {
            orm,
            tx: None,
            columns: Vec::new(),
            relations: Vec::new(),
            conditions: Vec::new(),
            order: Vec::new(),
            limit: 0,
            offset: 0,
            memo: Memo::new(),
            _record: PhantomData,
        }
    }

    /// Runs the operation on `executor` instead of the executor registered
    /// for the record's database, typically an open transaction. Relations
    /// are still loaded through the registered executors.
    #[must_use]
    pub fn tx(mut self, executor: Arc<dyn Executor>) -> Self {
        self.tx = Some(executor);
        self
    }

    /// Restricts the columns read by `first`/`find` or written by `save`.
    /// Reads of a column subset bypass the object cache.
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Relations to load on every record read, such as `"user"` or
    /// `"comments[user]"`.
    #[must_use]
    pub fn with<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations.extend(relations.into_iter().map(Into::into));
        self
    }

    /// Adds a condition. Conditions are AND-ed together.
    #[must_use]
    pub fn r#where(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Adds several conditions.
    #[must_use]
    pub fn where_all(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    /// Adds an ORDER BY item.
    #[must_use]
    pub fn order_by(mut self, order: impl Into<OrderBy>) -> Self {
        self.order.push(order.into());
        self
    }

    /// Maximum number of rows. Zero means no limit.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Number of rows to skip. Only applied together with a limit.
    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Counts the matching records.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or an error when `T` has no usable schema.
    pub fn count(self) -> Result<u64> {
        let schema = schema::<T>()?;
        let executor = self.executor(&schema)?;

        let row = Statement::with_executor(executor)
            .select([Expr::raw("COUNT(*)")])
            .from(schema.table())
            .where_all(self.conditions)
            .row()?;
        let value = row.and_then(|row| row.into_values().into_iter().next());
        Ok(u64::from_value(value.unwrap_or(Value::BigInt(Some(0))))?)
    }

    /// Reads the first matching record into `record`.
    ///
    /// Without conditions the record's own primary key is used. When the
    /// conditions are nothing but the primary-key equalities and every
    /// column is read, the object cache is consulted first and populated
    /// afterwards, including a marker for keys that have no row. Any other
    /// condition bypasses the cache lookup and the marker.
    ///
    /// `record` is left untouched when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no row matches, or the store's error.
    pub fn first(mut self, record: &mut T) -> Result<()> {
        let schema = schema::<T>()?;
        let info = schema.info();

        if self.conditions.is_empty()
            && let Some(pk) = schema.primary_key(record)
        {
            self.conditions = info.primary_key_conditions(&pk);
        }

        let key =
            info.primary_key_from_conditions(&self.conditions).and_then(|pk| info.cache_key(&pk));
        let cache = self.orm.cache();
        if self.columns.is_empty()
            && let Some(key) = &key
        {
            match cache.get::<T>(key) {
                Cached::Hit(cached) => {
                    *record = cached;
                    return self.load_relations(&schema, record);
                }
                Cached::Empty => return Err(Error::NotFound),
                Cached::Miss => {}
            }
        }

        let executor = self.executor(&schema)?;
        let selected = self.selected(&schema);
        let row = self.select(&schema, executor, &selected).limit(1).row()?;

        let Some(row) = row else {
            if let Some(key) = &key {
                cache.set_empty(key);
            }
            return Err(Error::NotFound);
        };
        *record = T::default();
        scan(&schema, &selected, row, record)?;

        if self.columns.is_empty()
            && let Some(key) = key.or_else(|| schema.record_key(record))
        {
            cache.set(&key, &*record);
        }
        self.load_relations(&schema, record)
    }

    /// Reads every matching record into `records`, replacing its contents.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or the first relation-loading error.
    pub fn find(mut self, records: &mut Vec<T>) -> Result<()> {
        records.clear();

        let schema = schema::<T>()?;
        let executor = self.executor(&schema)?;
        let selected = self.selected(&schema);

        let mut query = self.select(&schema, executor, &selected);
        if self.limit > 0 {
            query = query.limit(self.limit).offset(self.offset);
        }
        let rows = query.rows()?;

        records.reserve(rows.len());
        for row in rows {
            let mut record = T::default();
            scan(&schema, &selected, row, &mut record)?;

            if self.columns.is_empty()
                && let Some(key) = schema.record_key(&record)
            {
                self.orm.cache().set(&key, &record);
            }
            self.load_relations(&schema, &mut record)?;
            records.push(record);
        }
        Ok(())
    }

    /// Loads the named relations onto an already populated `record`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownRelation`] or [`Error::InvalidRelationName`]
    /// for names that do not resolve, or the store's error.
    pub fn load_related<S: AsRef<str>>(mut self, record: &mut T, relations: &[S]) -> Result<()> {
        let schema = schema::<T>()?;
        self.relations.extend(relations.iter().map(|name| name.as_ref().to_string()));
        self.load_relations(&schema, record)
    }

    /// Inserts `record`. A generated auto-increment key is written back into
    /// the record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] on a uniqueness violation, or the
    /// store's error.
    pub fn create(self, record: &mut T) -> Result<()> {
        let schema = schema::<T>()?;
        let executor = self.executor(&schema)?;
        let dialect = executor.dialect();
        let classify = |err: anyhow::Error| Error::from_write(dialect.as_ref(), err);

        let mut data = Data::new();
        let mut generated = None;
        for (index, field) in schema.fields().iter().enumerate() {
            if field.auto_increment {
                generated = Some(index);
                continue;
            }
            data.insert(field.column.clone(), schema.stored_value(record, index));
        }

        let insert = Statement::with_executor(executor).insert(schema.table(), data);
        match generated {
            None => {
                insert.exec().map_err(classify)?;
            }
            Some(index) if dialect.supports_returning() => {
                let column = schema.fields()[index].column.clone();
                let row = insert.returning(column).row().map_err(classify)?;
                let id = row.and_then(|row| row.into_values().into_iter().next());
                schema.assign(record, index, id.ok_or(Error::NotFound)?)?;
            }
            Some(index) => {
                let result = insert.exec().map_err(classify)?;
                let id = result
                    .last_insert_id
                    .ok_or_else(|| anyhow!("store did not report the generated key"))?;
                schema.assign(record, index, Value::BigInt(Some(id)))?;
            }
        }
        tracing::debug!(table = schema.table(), "record created");

        self.cache_clear(&schema, record);
        Ok(())
    }

    /// Updates `record` by its primary key, or inserts it when it has none.
    ///
    /// Every non-primary column that is not tagged `skip` is written, or
    /// only the columns given to [`Query::columns`]. An empty column set
    /// writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] on a uniqueness violation, or the
    /// store's error.
    pub fn save(self, record: &mut T) -> Result<()> {
        let schema = schema::<T>()?;
        let Some(pk) = schema.primary_key(record) else {
            return self.create(record);
        };

        let mut data = Data::new();
        for (index, field) in schema.fields().iter().enumerate() {
            if field.primary {
                continue;
            }
            let wanted = if self.columns.is_empty() {
                !field.skip
            } else {
                self.columns.contains(&field.column)
            };
            if wanted {
                data.insert(field.column.clone(), schema.stored_value(record, index));
            }
        }
        if data.is_empty() {
            tracing::debug!(table = schema.table(), "nothing to save");
            return Ok(());
        }

        let executor = self.executor(&schema)?;
        let dialect = executor.dialect();
        Statement::with_executor(executor)
            .update(schema.table(), data)
            .where_all(schema.info().primary_key_conditions(&pk))
            .exec()
            .map_err(|err| Error::from_write(dialect.as_ref(), err))?;

        self.cache_clear(&schema, record);
        Ok(())
    }

    /// Deletes `record` by its primary key and drops its cached copies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPrimaryKey`] when the record has no usable primary
    /// key, or the store's error.
    pub fn delete(self, record: &T) -> Result<()> {
        let schema = schema::<T>()?;
        let pk = schema.primary_key(record).ok_or(Error::NoPrimaryKey)?;
        let executor = self.executor(&schema)?;

        Statement::with_executor(executor)
            .delete(schema.table())
            .where_all(schema.info().primary_key_conditions(&pk))
            .exec()?;

        self.has_many_cache_clear(&schema, record);
        self.cache_clear(&schema, record);
        Ok(())
    }

    /// Deletes every matching row and returns how many were removed.
    ///
    /// The object cache is left as is: cached copies of deleted rows stay
    /// until they expire.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub fn delete_all(self) -> Result<u64> {
        let schema = schema::<T>()?;
        let executor = self.executor(&schema)?;

        let mut query =
            Statement::with_executor(executor).delete(schema.table()).where_all(self.conditions);
        for order in self.order {
            query = query.order_by(order);
        }
        if self.limit > 0 {
            query = query.limit(self.limit);
        }
        Ok(query.exec()?.rows_affected)
    }

    /// Drops the cached copies of `record` and of the collections that
    /// depend on it, without touching the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPrimaryKey`] when the record has no usable primary
    /// key.
    pub fn delete_from_cache(self, record: &T) -> Result<()> {
        let schema = schema::<T>()?;
        self.has_many_cache_clear(&schema, record);
        self.cache_clear(&schema, record);
        if schema.primary_key(record).is_none() {
            return Err(Error::NoPrimaryKey);
        }
        Ok(())
    }

    fn executor(&self, schema: &Schema<T>) -> Result<Arc<dyn Executor>> {
        match &self.tx {
            Some(tx) => Ok(Arc::clone(tx)),
            None => self.orm.executor(schema.database()),
        }
    }

    /// Indexes of the fields read by `first` and `find`.
    fn selected(&self, schema: &Schema<T>) -> Vec<usize> {
        schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, field)| {
                if self.columns.is_empty() {
                    !field.skip
                } else {
                    self.columns.contains(&field.column)
                }
            })
            .map(|(index, _)| index)
            .collect()
    }

    fn select(
        &self, schema: &Schema<T>, executor: Arc<dyn Executor>, selected: &[usize],
    ) -> Statement {
        let fields = schema.fields();
        let columns = selected.iter().map(|&index| fields[index].column.clone());

        let mut query = Statement::with_executor(executor)
            .select(columns)
            .from(schema.table())
            .where_all(self.conditions.clone());
        for order in &self.order {
            query = query.order_by(order.clone());
        }
        query
    }

    fn load_relations(&mut self, schema: &Schema<T>, record: &mut T) -> Result<()> {
        let info = schema.info();
        for text in &self.relations {
            let path = RelationPath::parse(text)?;
            let (relation, link) =
                schema.link(&path.name).ok_or_else(|| Error::UnknownRelation {
                    type_name: info.type_name,
                    name: path.name.clone(),
                })?;

            let cache_key = if info.has_many.contains_key(relation.field) {
                schema.record_key(record).map(|key| format!("{key}.{}", relation.field))
            } else {
                None
            };

            let cx = LoadContext {
                orm: &self.orm,
                relation,
                values: schema.reference_values(record, relation),
                cache_key,
                with: &path.with,
                memo: &mut self.memo,
            };
            link.load(record, cx)?;
        }
        Ok(())
    }

    /// Drops the cached record and the has-many collections of related
    /// records that may list it.
    fn cache_clear(&self, schema: &Schema<T>, record: &T) {
        let info = schema.info();
        for (name, relation) in &info.belongs_to {
            if let Some((_, link)) = schema.link(name) {
                link.clear(&self.orm, info, &schema.reference_values(record, relation));
            }
        }
        if let Some(key) = schema.record_key(record) {
            self.orm.cache().delete(&key);
        }
    }

    /// Drops the cached has-many collections of `record`.
    fn has_many_cache_clear(&self, schema: &Schema<T>, record: &T) {
        let Some(key) = schema.record_key(record) else {
            return;
        };
        for field in schema.info().has_many.keys() {
            self.orm.cache().delete(&format!("{key}.{field}"));
        }
    }
}

/// Writes the values of `row` into the selected fields, in order.
fn scan<T>(schema: &Schema<T>, selected: &[usize], row: Row, record: &mut T) -> Result<()> {
    for (&index, value) in selected.iter().zip(row.into_values()) {
        schema.assign(record, index, value)?;
    }
    Ok(())
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("columns", &self.columns)
            .field("relations", &self.relations)
            .field("conditions", &self.conditions)
            .field("order", &self.order)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}
