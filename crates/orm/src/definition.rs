//! Record registration.

use std::sync::Arc;

use heck::ToSnakeCase;
use quarry_sql::{Condition, Value};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::relation::{BelongsTo, HasMany, Lifted, Link};
use crate::tag::FieldTag;
use crate::value::ColumnValue;

/// A type that declares how its fields map to a table.
///
/// Fields are registered in declaration order. Registration runs once per
/// process, while the schema registry is locked, so `define` must not ask
/// for any schema itself.
///
/// ```ignore
/// impl Mapped for Post {
///     fn define(def: &mut Definition<Self>) {
///         fields!(def, {
///             embed model: "table=blog_posts",
///             column user_id,
///             column title,
///             belongs_to user: "foreign_key=user_id",
///             has_many comments: "foreign_key=post_id; order=entity_id",
///         });
///     }
/// }
/// ```
pub trait Mapped: Sized + 'static {
    /// Registers the mapped fields of `Self`.
    fn define(def: &mut Definition<Self>);
}

/// A mapped type usable with the mapping engine.
pub trait Record: Mapped + Default + Clone + Serialize + DeserializeOwned + Send + Sync {}

impl<T> Record for T where
    T: Mapped + Default + Clone + Serialize + DeserializeOwned + Send + Sync
{
}

pub(crate) type Getter<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;
pub(crate) type Setter<T> = Arc<dyn Fn(&mut T, Value) -> anyhow::Result<()> + Send + Sync>;

pub(crate) struct ColumnDef<T> {
    pub(crate) path: Vec<&'static str>,
    pub(crate) column: String,
    pub(crate) tag: FieldTag,
    pub(crate) get: Getter<T>,
    pub(crate) set: Setter<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelationKind {
    BelongsTo,
    HasMany,
}

pub(crate) struct RelationDef<T> {
    pub(crate) path: Vec<&'static str>,
    pub(crate) kind: RelationKind,
    pub(crate) tag: FieldTag,
    pub(crate) link: Arc<dyn Link<T>>,
}

impl<T> RelationDef<T> {
    pub(crate) fn name(&self) -> &'static str {
        self.path.last().copied().unwrap_or_default()
    }
}

/// Field registrations collected from [`Mapped::define`].
pub struct Definition<T> {
    pub(crate) database: Option<String>,
    pub(crate) table: Option<String>,
    pub(crate) columns: Vec<ColumnDef<T>>,
    pub(crate) relations: Vec<RelationDef<T>>,
    pub(crate) filters: Vec<(&'static str, fn() -> Condition)>,
}

impl<T: 'static> Definition<T> {
    pub(crate) const fn new() -> Self {
        Self {
            database: None,
            table: None,
            columns: Vec::new(),
            relations: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub(crate) fn of() -> Self
    where
        T: Mapped,
    {
        let mut def = Self::new();
        T::define(&mut def);
        def
    }

    fn apply_overrides(&mut self, tag: &FieldTag) {
        if let Some(database) = &tag.database {
            self.database = Some(database.clone());
        }
        if let Some(table) = &tag.table {
            self.table = Some(table.clone());
        }
    }

    /// Registers a scalar field stored in one column. The column name
    /// defaults to the snake-cased field name.
    pub fn column<F: ColumnValue + 'static>(
        &mut self, name: &'static str, tag: &str, get: fn(&T) -> &F, get_mut: fn(&mut T) -> &mut F,
    ) -> &mut Self {
        let Some(tag) = FieldTag::parse(tag) else {
            return self;
        };
        self.apply_overrides(&tag);

        let column = tag.column.clone().unwrap_or_else(|| name.to_snake_case());
        self.columns.push(ColumnDef {
            path: vec![name],
            column,
            tag,
            get: Arc::new(move |record: &T| get(record).to_value()),
            set: Arc::new(move |record: &mut T, value: Value| {
                *get_mut(record) = F::from_value(value)?;
                Ok(())
            }),
        });
        self
    }

    /// Flattens the fields of a nested mapped struct into this record.
    ///
    /// The nested struct's own tag contributes database and table overrides
    /// before its fields are registered.
    pub fn embed<E: Mapped>(
        &mut self, name: &'static str, tag: &str, get: fn(&T) -> &E, get_mut: fn(&mut T) -> &mut E,
    ) -> &mut Self {
        let Some(tag) = FieldTag::parse(tag) else {
            return self;
        };
        self.apply_overrides(&tag);

        let inner = Definition::<E>::of();
        if inner.database.is_some() {
            self.database = inner.database;
        }
        if inner.table.is_some() {
            self.table = inner.table;
        }

        for column in inner.columns {
            let (inner_get, inner_set) = (column.get, column.set);
            self.columns.push(ColumnDef {
                path: prefixed(name, column.path),
                column: column.column,
                tag: column.tag,
                get: Arc::new(move |record: &T| inner_get(get(record))),
                set: Arc::new(move |record: &mut T, value: Value| {
                    inner_set(get_mut(record), value)
                }),
            });
        }

        for relation in inner.relations {
            self.relations.push(RelationDef {
                path: prefixed(name, relation.path),
                kind: relation.kind,
                tag: relation.tag,
                link: Arc::new(Lifted::new(get_mut, relation.link)),
            });
        }

        self.filters.extend(inner.filters);
        self
    }

    /// Registers a belongs-to relation: this record holds the foreign key.
    pub fn belongs_to<R: Record>(
        &mut self, name: &'static str, tag: &str, get_mut: fn(&mut T) -> &mut Option<R>,
    ) -> &mut Self {
        let link: Arc<dyn Link<T>> = Arc::new(BelongsTo::new(move |record: &mut T, related: R| {
            *get_mut(record) = Some(related);
        }));
        self.relation(name, tag, RelationKind::BelongsTo, link)
    }

    /// Registers a belongs-to relation held in a box, for self-referencing
    /// records.
    pub fn belongs_to_boxed<R: Record>(
        &mut self, name: &'static str, tag: &str, get_mut: fn(&mut T) -> &mut Option<Box<R>>,
    ) -> &mut Self {
        let link: Arc<dyn Link<T>> = Arc::new(BelongsTo::new(move |record: &mut T, related: R| {
            *get_mut(record) = Some(Box::new(related));
        }));
        self.relation(name, tag, RelationKind::BelongsTo, link)
    }

    /// Registers a has-many relation: the related table holds the foreign
    /// key.
    pub fn has_many<R: Record>(
        &mut self, name: &'static str, tag: &str, get_mut: fn(&mut T) -> &mut Vec<R>,
    ) -> &mut Self {
        let link: Arc<dyn Link<T>> = Arc::new(HasMany::new(move |record: &mut T, related: Vec<R>| {
            *get_mut(record) = related;
        }));
        self.relation(name, tag, RelationKind::HasMany, link)
    }

    fn relation(
        &mut self, name: &'static str, tag: &str, kind: RelationKind, link: Arc<dyn Link<T>>,
    ) -> &mut Self {
        let Some(tag) = FieldTag::parse(tag) else {
            return self;
        };
        self.apply_overrides(&tag);
        self.relations.push(RelationDef {
            path: vec![name],
            kind,
            tag,
            link,
        });
        self
    }

    /// Registers a named condition a has-many relation can reference with
    /// `filter=<name>`.
    pub fn filter(&mut self, name: &'static str, condition: fn() -> Condition) -> &mut Self {
        self.filters.push((name, condition));
        self
    }
}

fn prefixed(name: &'static str, path: Vec<&'static str>) -> Vec<&'static str> {
    let mut full = Vec::with_capacity(path.len() + 1);
    full.push(name);
    full.extend(path);
    full
}

/// Registers fields of a [`Definition`] from a compact list.
///
/// Each entry is `<kind> <field>` with an optional `: "<tag>"`, where kind is
/// one of `column`, `embed`, `belongs_to`, `belongs_to_boxed` or `has_many`.
///
/// ```ignore
/// fields!(def, {
///     column id: "primary; auto_increment",
///     column email,
///     has_many posts,
/// });
/// ```
#[macro_export]
macro_rules! fields {
    (@field $def:ident, column, $field:ident, $tag:expr) => {
        $def.column(stringify!($field), $tag, |r| &r.$field, |r| &mut r.$field);
    };
    (@field $def:ident, embed, $field:ident, $tag:expr) => {
        $def.embed(stringify!($field), $tag, |r| &r.$field, |r| &mut r.$field);
    };
    (@field $def:ident, belongs_to, $field:ident, $tag:expr) => {
        $def.belongs_to(stringify!($field), $tag, |r| &mut r.$field);
    };
    (@field $def:ident, belongs_to_boxed, $field:ident, $tag:expr) => {
        $def.belongs_to_boxed(stringify!($field), $tag, |r| &mut r.$field);
    };
    (@field $def:ident, has_many, $field:ident, $tag:expr) => {
        $def.has_many(stringify!($field), $tag, |r| &mut r.$field);
    };
    ($def:expr, { $($kind:ident $field:ident $(: $tag:literal)?),* $(,)? }) => {{
        let def = &mut *$def;
        $(
            $crate::fields!(@field def, $kind, $field, concat!("" $(, $tag)?));
        )*
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Audit {
        created_by: String,
        revision: i32,
    }

    impl Mapped for Audit {
        fn define(def: &mut Definition<Self>) {
            fields!(def, {
                column created_by: "database=audit",
                column revision: "skip",
            });
        }
    }

    #[derive(Debug, Default)]
    struct Document {
        doc_id: i64,
        audit: Audit,
        body: String,
        ignored: bool,
    }

    impl Mapped for Document {
        fn define(def: &mut Definition<Self>) {
            fields!(def, {
                column doc_id: "column=id; primary; auto_increment",
                embed audit: "table=docs",
                column body,
                column ignored: "-",
            });
        }
    }

    #[test]
    fn registers_in_declaration_order() {
        let def = Definition::<Document>::of();

        let columns: Vec<&str> = def.columns.iter().map(|c| c.column.as_str()).collect();
        assert_eq!(columns, vec!["id", "created_by", "revision", "body"]);
        assert_eq!(def.columns[1].path, vec!["audit", "created_by"]);
        assert!(def.columns[2].tag.skip);
        assert_eq!(def.database.as_deref(), Some("audit"));
        assert_eq!(def.table.as_deref(), Some("docs"));
    }

    #[test]
    fn embedded_accessors_reach_nested_fields() {
        let def = Definition::<Document>::of();
        let mut doc = Document::default();

        (def.columns[1].set)(&mut doc, Value::String(Some(Box::new("ann".to_string()))))
            .expect("set");
        (def.columns[2].set)(&mut doc, Value::BigInt(Some(3))).expect("set");

        assert_eq!(doc.audit.created_by, "ann");
        assert_eq!(doc.audit.revision, 3);
        assert_eq!((def.columns[2].get)(&doc), Value::Int(Some(3)));
        assert!(!doc.ignored);
    }
}
