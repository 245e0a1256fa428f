//! Derived table metadata for mapped records.

use std::any::type_name;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use base64ct::{Base64, Encoding};
use heck::ToSnakeCase;
use quarry_sql::{CompareOp, Condition, OrderBy, Value, is_empty};
use xxhash_rust::xxh64::xxh64;

use crate::definition::{Definition, Getter, Mapped, RelationDef, RelationKind, Setter};
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::relation::Link;
use crate::value::to_json;

/// Logical database used when no `database=` tag is given.
pub const DEFAULT_DATABASE: &str = "default";

/// A mapped column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field path from the record root, through embedded structs.
    pub path: Vec<&'static str>,
    /// Column name.
    pub column: String,
    /// Part of the primary key.
    pub primary: bool,
    /// Generated by the store on insert.
    pub auto_increment: bool,
    /// Stored as base64 text.
    pub base64: bool,
    /// Left out of default column sets.
    pub skip: bool,
}

/// A resolved relation between two record types.
#[derive(Debug, Clone)]
pub struct Relation {
    /// Field name of the relation slot.
    pub field: &'static str,
    /// Field path from the record root.
    pub path: Vec<&'static str>,
    /// Rust type name of the related record.
    pub target: &'static str,
    /// Logical database of the related record.
    pub database: String,
    /// Table of the related record.
    pub table: String,
    /// Columns on the related table.
    pub key: Vec<String>,
    /// Columns on the owning record whose values match `key`.
    pub reference: Vec<String>,
    pub(crate) reference_fields: Vec<usize>,
    /// Extra condition intersected with the key equality.
    pub filter: Option<Condition>,
    /// Ordering of loaded rows.
    pub order: Vec<OrderBy>,
    /// Maximum number of loaded rows. Zero means no limit.
    pub limit: u64,
}

/// The structural description of a record type.
#[derive(Debug, Clone)]
pub struct SchemaInfo {
    /// Rust type name of the record.
    pub type_name: &'static str,
    /// Logical database name.
    pub database: String,
    /// Table name.
    pub table: String,
    /// Mapped columns, in registration order.
    pub fields: Vec<FieldInfo>,
    /// Indexes into `fields` of the primary-key columns.
    pub primary: Vec<usize>,
    /// Relations where this record holds the foreign key.
    pub belongs_to: BTreeMap<&'static str, Relation>,
    /// Relations where the related table holds the foreign key.
    pub has_many: BTreeMap<&'static str, Relation>,
    /// Hash of the structural dump, embedded in every cache key.
    pub checksum: u64,
}

impl SchemaInfo {
    /// Index of the field mapped to `column`.
    #[must_use]
    pub fn field_index(&self, column: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.column == column)
    }

    /// Primary-key column names.
    #[must_use]
    pub fn primary_columns(&self) -> Vec<&str> {
        self.primary.iter().map(|&i| self.fields[i].column.as_str()).collect()
    }

    /// Checks primary-key values taken from a record. Returns `None` when
    /// there is no primary key, or an auto-increment key is still empty.
    pub(crate) fn primary_key(&self, values: Vec<Value>) -> Option<Vec<Value>> {
        if values.is_empty() {
            return None;
        }
        let unset = self
            .primary
            .iter()
            .zip(&values)
            .any(|(&i, v)| self.fields[i].auto_increment && is_empty(v));
        if unset {
            return None;
        }
        Some(values)
    }

    /// Primary-key values of conditions that are exactly one equality per
    /// key column, possibly nested in `And` groups. Any other condition
    /// yields `None`.
    pub(crate) fn primary_key_from_conditions(
        &self, conditions: &[Condition],
    ) -> Option<Vec<Value>> {
        if self.primary.is_empty() {
            return None;
        }
        let equalities = equalities(conditions)?;
        if equalities.len() != self.primary.len() {
            return None;
        }
        let pk = self
            .primary
            .iter()
            .map(|&i| equalities.get(self.fields[i].column.as_str()).map(|v| (*v).clone()))
            .collect::<Option<Vec<Value>>>()?;
        self.primary_key(pk)
    }

    /// Equality conditions on the primary key.
    pub(crate) fn primary_key_conditions(&self, pk: &[Value]) -> Vec<Condition> {
        self.primary
            .iter()
            .zip(pk)
            .map(|(&i, value)| Condition::eq(self.fields[i].column.clone(), value.clone()))
            .collect()
    }

    /// Object-cache key for a primary key:
    /// `<type name><<checksum as 16 hex digits>><JSON key tuple>`.
    #[must_use]
    pub fn cache_key(&self, pk: &[Value]) -> Option<String> {
        if pk.is_empty() {
            return None;
        }
        let tuple: Vec<serde_json::Value> = pk.iter().map(to_json).collect();
        let json = serde_json::to_string(&tuple).ok()?;
        Some(format!("{}<{:016x}>{json}", self.type_name, self.checksum))
    }

    fn relation(&self, name: &str) -> Option<&Relation> {
        self.belongs_to.get(name).or_else(|| self.has_many.get(name))
    }
}

/// Maps each column to its bound value when `conditions` are nothing but
/// column = value equalities, possibly nested in AND groups. `None` when any
/// other condition is present.
pub(crate) fn equalities(conditions: &[Condition]) -> Option<BTreeMap<&str, &Value>> {
    let mut map = BTreeMap::new();
    for condition in conditions {
        match condition {
            Condition::And(nested) => map.extend(equalities(nested)?),
            Condition::Compare {
                op: CompareOp::Eq,
                pairs,
            } => {
                for (column, operand) in pairs {
                    let value = operand.as_value()?;
                    if map.insert(column.as_str(), value).is_some_and(|prev| prev != value) {
                        return None;
                    }
                }
            }
            _ => return None,
        }
    }
    Some(map)
}

struct Accessor<T> {
    get: Getter<T>,
    set: Setter<T>,
}

/// Schema of a record type, with typed access to its fields.
pub struct Schema<T> {
    info: Arc<SchemaInfo>,
    accessors: Vec<Accessor<T>>,
    links: BTreeMap<&'static str, Arc<dyn Link<T>>>,
}

impl<T: Mapped> Schema<T> {
    pub(crate) fn build(registry: &mut Registry) -> Option<Self> {
        let type_name = type_name::<T>();
        let def = Definition::<T>::of();

        if def.columns.is_empty() {
            tracing::warn!(record = type_name, "record maps no columns");
            return None;
        }

        let table = def.table.unwrap_or_else(|| default_table(type_name));
        let database = def.database.unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let mut fields = Vec::with_capacity(def.columns.len());
        let mut accessors = Vec::with_capacity(def.columns.len());
        let mut primary = Vec::new();
        for (i, column) in def.columns.into_iter().enumerate() {
            if column.tag.primary {
                primary.push(i);
            }
            fields.push(FieldInfo {
                path: column.path,
                column: column.column,
                primary: column.tag.primary,
                auto_increment: column.tag.auto_increment,
                base64: column.tag.base64,
                skip: column.tag.skip,
            });
            accessors.push(Accessor {
                get: column.get,
                set: column.set,
            });
        }

        let mut info = SchemaInfo {
            type_name,
            database,
            table,
            fields,
            primary,
            belongs_to: BTreeMap::new(),
            has_many: BTreeMap::new(),
            checksum: 0,
        };

        let mut links = BTreeMap::new();
        for def_relation in def.relations {
            let name = def_relation.name();
            let Some(target) = def_relation.link.resolve(registry) else {
                tracing::warn!(
                    record = type_name,
                    field = name,
                    "relation target has no usable schema, relation dropped"
                );
                continue;
            };

            let relation = match def_relation.kind {
                RelationKind::BelongsTo => belongs_to(&info, &target, &def_relation),
                RelationKind::HasMany => has_many(&info, &target, &def_relation, &def.filters),
            };
            let Some(relation) = relation else {
                continue;
            };

            match def_relation.kind {
                RelationKind::BelongsTo => info.belongs_to.insert(name, relation),
                RelationKind::HasMany => info.has_many.insert(name, relation),
            };
            links.insert(name, def_relation.link);
        }

        info.checksum = checksum(&info);

        Some(Self {
            info: Arc::new(info),
            accessors,
            links,
        })
    }
}

impl<T> Schema<T> {
    /// Structural description.
    #[must_use]
    pub fn info(&self) -> &SchemaInfo {
        &self.info
    }

    pub(crate) fn shared_info(&self) -> Arc<SchemaInfo> {
        Arc::clone(&self.info)
    }

    /// Table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.info.table
    }

    /// Logical database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.info.database
    }

    /// Structural checksum.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        self.info.checksum
    }

    /// Mapped columns.
    #[must_use]
    pub fn fields(&self) -> &[FieldInfo] {
        &self.info.fields
    }

    /// Raw value of the field at `index`.
    pub(crate) fn value(&self, record: &T, index: usize) -> Value {
        (self.accessors[index].get)(record)
    }

    /// Value of the field at `index` as written to the store.
    pub(crate) fn stored_value(&self, record: &T, index: usize) -> Value {
        let value = self.value(record, index);
        if !self.info.fields[index].base64 {
            return value;
        }
        match value {
            Value::Bytes(Some(bytes)) => {
                Value::String(Some(Box::new(Base64::encode_string(&bytes))))
            }
            other => other,
        }
    }

    /// Writes a value read from the store into the field at `index`.
    pub(crate) fn assign(&self, record: &mut T, index: usize, value: Value) -> Result<()> {
        let field = &self.info.fields[index];
        let value = if field.base64 { decode_base64(value) } else { value };
        (self.accessors[index].set)(record, value).map_err(|source| Error::Decode {
            column: field.column.clone(),
            source,
        })
    }

    /// Primary-key values of `record`, if it has a usable primary key.
    pub(crate) fn primary_key(&self, record: &T) -> Option<Vec<Value>> {
        let values = self.info.primary.iter().map(|&i| self.value(record, i)).collect();
        self.info.primary_key(values)
    }

    /// Object-cache key of `record`.
    pub(crate) fn record_key(&self, record: &T) -> Option<String> {
        self.primary_key(record).and_then(|pk| self.info.cache_key(&pk))
    }

    /// Values of the owning columns of `relation`.
    pub(crate) fn reference_values(&self, record: &T, relation: &Relation) -> Vec<Value> {
        relation.reference_fields.iter().map(|&i| self.value(record, i)).collect()
    }

    /// A declared relation and the code that loads it.
    pub(crate) fn link(&self, name: &str) -> Option<(&Relation, &Arc<dyn Link<T>>)> {
        let relation = self.info.relation(name)?;
        let link = self.links.get(name)?;
        Some((relation, link))
    }
}

impl<T> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema").field("info", &self.info).finish_non_exhaustive()
    }
}

fn belongs_to<T>(
    owner: &SchemaInfo, target: &SchemaInfo, def: &RelationDef<T>,
) -> Option<Relation> {
    let name = def.name();
    if target.primary.is_empty() {
        tracing::warn!(
            record = owner.type_name,
            field = name,
            "belongs-to target has no primary key, relation dropped"
        );
        return None;
    }

    let key: Vec<String> = target.primary_columns().into_iter().map(ToString::to_string).collect();
    let reference = foreign_key(&def.tag.foreign_key, target);
    let reference_fields = resolve_columns(owner, name, &reference)?;
    if reference.len() != key.len() {
        tracing::warn!(
            record = owner.type_name,
            field = name,
            "foreign key does not match the target primary key, relation dropped"
        );
        return None;
    }

    Some(Relation {
        field: name,
        path: def.path.clone(),
        target: target.type_name,
        database: target.database.clone(),
        table: target.table.clone(),
        key,
        reference,
        reference_fields,
        filter: None,
        order: Vec::new(),
        limit: 0,
    })
}

fn has_many<T>(
    owner: &SchemaInfo, target: &SchemaInfo, def: &RelationDef<T>,
    filters: &[(&'static str, fn() -> Condition)],
) -> Option<Relation> {
    let name = def.name();
    if owner.primary.is_empty() {
        tracing::warn!(
            record = owner.type_name,
            field = name,
            "record has no primary key, has-many relation dropped"
        );
        return None;
    }

    let key = foreign_key(&def.tag.foreign_key, owner);
    if key.len() != owner.primary.len() {
        tracing::warn!(
            record = owner.type_name,
            field = name,
            "foreign key does not match the primary key, relation dropped"
        );
        return None;
    }

    let filter = def.tag.filter.as_deref().and_then(|filter_name| {
        let found =
            filters.iter().find(|(n, _)| *n == filter_name).map(|(_, condition)| condition());
        if found.is_none() {
            tracing::warn!(
                record = owner.type_name,
                field = name,
                filter = filter_name,
                "unknown relation filter"
            );
        }
        found
    });

    Some(Relation {
        field: name,
        path: def.path.clone(),
        target: target.type_name,
        database: target.database.clone(),
        table: target.table.clone(),
        key,
        reference: owner.primary_columns().into_iter().map(ToString::to_string).collect(),
        reference_fields: owner.primary.clone(),
        filter,
        order: def.tag.order.clone(),
        limit: def.tag.limit,
    })
}

/// Explicit foreign-key columns, or `<singular table>_<primary column>` for
/// each primary column of `referenced`.
fn foreign_key(explicit: &[String], referenced: &SchemaInfo) -> Vec<String> {
    if !explicit.is_empty() {
        return explicit.to_vec();
    }
    let prefix = pluralizer::pluralize(&referenced.table, 1, false).to_snake_case();
    referenced.primary_columns().into_iter().map(|column| format!("{prefix}_{column}")).collect()
}

fn resolve_columns(owner: &SchemaInfo, name: &str, columns: &[String]) -> Option<Vec<usize>> {
    columns
        .iter()
        .map(|column| {
            let index = owner.field_index(column);
            if index.is_none() {
                tracing::warn!(
                    record = owner.type_name,
                    field = name,
                    column = column.as_str(),
                    "foreign-key column is not mapped, relation dropped"
                );
            }
            index
        })
        .collect()
}

/// Default table name: the snake-cased type name, pluralized on its last
/// word.
pub(crate) fn default_table(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let short = base.rsplit("::").next().unwrap_or(base);
    pluralizer::pluralize(&short.to_snake_case(), 2, false)
}

fn checksum(info: &SchemaInfo) -> u64 {
    xxh64(format!("{info:#?}").as_bytes(), 0)
}

fn decode_base64(value: Value) -> Value {
    match value {
        Value::String(Some(text)) => match Base64::decode_vec(&text) {
            Ok(bytes) => Value::Bytes(Some(Box::new(bytes))),
            Err(_e) => Value::Bytes(Some(Box::new((*text).into_bytes()))),
        },
        Value::Bytes(Some(raw)) => {
            let decoded = std::str::from_utf8(&raw).ok().and_then(|t| Base64::decode_vec(t).ok());
            match decoded {
                Some(bytes) => Value::Bytes(Some(Box::new(bytes))),
                None => Value::Bytes(Some(raw)),
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use quarry_sql::Column;

    use super::*;

    #[test]
    fn default_table_names() {
        assert_eq!(default_table("app::models::Post"), "posts");
        assert_eq!(default_table("app::models::BlogCategory"), "blog_categories");
        assert_eq!(default_table("Wrapper<app::Inner>"), "wrappers");
    }

    #[test]
    fn base64_decoding_falls_back_to_raw_text() {
        let encoded = Value::String(Some(Box::new("aGVsbG8=".to_string())));
        assert_eq!(decode_base64(encoded), Value::Bytes(Some(Box::new(b"hello".to_vec()))));

        let invalid = Value::String(Some(Box::new("not base64!".to_string())));
        assert_eq!(decode_base64(invalid), Value::Bytes(Some(Box::new(b"not base64!".to_vec()))));
    }

    #[test]
    fn equalities_look_through_and() {
        let conditions = vec![
            Condition::and([Condition::eq("entity_id", 5), Condition::eq("lang", "en")]),
            Condition::eq("status", 1),
        ];
        let map = equalities(&conditions).expect("only equalities");

        assert_eq!(map.len(), 3);
        assert_eq!(map.get("entity_id"), Some(&&Value::Int(Some(5))));
    }

    #[test]
    fn equalities_reject_other_conditions() {
        let nested = [Condition::and([Condition::eq("entity_id", 5), Condition::gt("status", 1)])];
        assert!(equalities(&nested).is_none());
        assert!(equalities(&[Condition::eq("a", 1), Condition::ne("b", 1)]).is_none());
        assert!(equalities(&[Condition::eq("a", Column::new("b"))]).is_none());
        assert!(equalities(&[Condition::eq("a", 1), Condition::eq("a", 2)]).is_none());
    }
}
