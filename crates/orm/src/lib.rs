//! Record mapping over the `quarry-sql` statement builder.
//!
//! Maps Rust structs to tables, loads belongs-to and has-many relations, and
//! keeps an object cache of records keyed by primary key.
//!
//! # Quick Start
//!
//! ## Declare a Record
//!
//! ```ignore
//! use quarry_orm::{Definition, Mapped, fields};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! pub struct Model {
//!     pub id: i64,
//! }
//!
//! impl Mapped for Model {
//!     fn define(def: &mut Definition<Self>) {
//!         fields!(def, { column id: "column=entity_id; primary; auto_increment" });
//!     }
//! }
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! pub struct Post {
//!     pub model: Model,
//!     pub user_id: i64,
//!     pub title: String,
//!     pub user: Option<User>,
//!     pub comments: Vec<Comment>,
//! }
//!
//! impl Mapped for Post {
//!     fn define(def: &mut Definition<Self>) {
//!         fields!(def, {
//!             embed model: "table=blog_posts",
//!             column user_id,
//!             column title,
//!             belongs_to user: "foreign_key=user_id",
//!             has_many comments: "foreign_key=post_id; order=entity_id",
//!         });
//!     }
//! }
//! ```
//!
//! Tables default to the plural, snake-cased type name (`Post` maps to
//! `posts`) and columns to the snake-cased field name.
//!
//! ## CRUD Operations
//!
//! ```ignore
//! let orm = Orm::builder()
//!     .executor(Arc::new(SqliteExecutor::memory()?))
//!     .cache_store(Arc::new(MemoryStore::default()))
//!     .build();
//!
//! // Insert; the generated key is written back
//! let mut post = Post { title: "Hello".to_string(), ..Post::default() };
//! orm.create(&mut post)?;
//!
//! // Load by primary key, served from the object cache when possible
//! let mut loaded = Post::default();
//! loaded.model.id = post.model.id;
//! orm.query::<Post>().with(["user", "comments[user]"]).first(&mut loaded)?;
//!
//! // Update some columns
//! loaded.title = "Hello again".to_string();
//! orm.query::<Post>().columns(["title"]).save(&mut loaded)?;
//!
//! // Query
//! let mut posts = Vec::new();
//! orm.query::<Post>()
//!     .r#where(Condition::like("title", "Hello%"))
//!     .order_by(OrderBy::desc("entity_id"))
//!     .limit(10)
//!     .find(&mut posts)?;
//! ```
//!
//! ## Tags
//!
//! | tag | meaning |
//! |---|---|
//! | `database=<name>` | logical database of the record |
//! | `table=<name>` | table of the record |
//! | `column=<name>` | column name of the field |
//! | `primary` | part of the primary key |
//! | `auto_increment` | generated by the store on insert |
//! | `foreign_key=<a>, <b>` | foreign-key columns of a relation |
//! | `filter=<name>` | registered condition applied to a has-many relation |
//! | `order=<col> [ASC\|DESC], ...` | order of a has-many relation |
//! | `limit=<n>` | row limit of a has-many relation |
//! | `base64` | binary field stored as base64 text |
//! | `skip` | left out of default reads and saves |
//! | `-` | not mapped |

mod cache;
mod config;
mod definition;
mod error;
mod orm;
mod query;
mod registry;
mod relation;
mod schema;
mod tag;
mod value;

pub use cache::{CacheStore, Cached, MemoryStore, NullStore, ObjectCache};
pub use config::OrmConfig;
pub use definition::{Definition, Mapped, Record};
pub use error::{Error, Result};
pub use orm::{Orm, OrmBuilder};
pub use query::Query;
// Re-export so records and callers can name conditions and values without a
// direct dependency.
pub use quarry_sql;
pub use registry::{rebuild, schema};
pub use schema::{DEFAULT_DATABASE, FieldInfo, Relation, Schema, SchemaInfo};
pub use tag::FieldTag;
pub use value::ColumnValue;
