//! Dialect-aware SQL statement builder.
//!
//! Builds SELECT, INSERT, UPDATE and DELETE statements from typed clauses and
//! returns the SQL text together with the ordered argument list.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use quarry_sql::{Column, Condition, Expr, OrderBy, Postgres, Query};
//!
//! let query = Query::new(Arc::new(Postgres))
//!     .select(["p.id", "p.name"])
//!     .column(Expr::raw("COUNT(c.id)"))
//!     .from("posts p")
//!     .left_join("comments c", [Condition::eq("c.post_id", Column::new("p.id"))])
//!     .r#where(Condition::or([
//!         Condition::eq("name", "hello"),
//!         Condition::op("title", "LIKE", "Hello%"),
//!     ]))
//!     .r#where(Condition::r#in("p.status", [1, 2, 3]))
//!     .group_by("p.id")
//!     .having(Condition::sql("COUNT(c.id) >= 1"))
//!     .order_by(OrderBy::desc("p.created"))
//!     .limit(10)
//!     .offset(20);
//!
//! assert!(query.sql().starts_with("SELECT \"p\".\"id\", \"p\".\"name\", COUNT(c.id)"));
//! assert_eq!(query.args().len(), 7);
//! ```
//!
//! ## Conditions
//!
//! ```ignore
//! // Comparisons bind their values as arguments
//! Condition::eq("status", "active")
//! Condition::gte("views", 1000)
//! Condition::like("title", "%rust%")
//! Condition::r#in("id", [1, 2, 3])
//! Condition::between("created", "2019-12-03", "2020-01-01")
//!
//! // Booleans and NULL compare with IS
//! Condition::eq("published", true)        // "published" IS TRUE
//! Condition::ne("content", Operand::null()) // "content" IS NOT NULL
//!
//! // Columns are inlined, not bound
//! Condition::eq("c.post_id", Column::new("p.id"))
//!
//! // Tuples
//! Composite::new(["a", "b"], "=", [1, 2])?             // ("a", "b") = ($1, $2)
//! Composite::within(["a", "b"], [[1, 2], [3, 4]])?     // ("a", "b") IN (($1, $2), ($3, $4))
//!
//! // Raw fragments reference their own arguments by position
//! Condition::expr("lower(email) = $1", ["a@b.c"])
//! ```
//!
//! ## Sub-queries
//!
//! A [`Query`] used as a value, column or table is compiled in place. Its
//! placeholders continue the numbering of the enclosing statement.
//!
//! ```ignore
//! let comments = Query::new(dialect.clone())
//!     .select([Expr::raw("COUNT(*)")])
//!     .from("comments")
//!     .r#where(Condition::eq("post_id", Column::new("posts.id")))
//!     .alias("comment_count");
//!
//! Query::new(dialect).select(["id"]).column(comments).from("posts");
//! ```

mod builder;
mod condition;
mod dialect;
mod error;
mod executor;
mod expr;
mod operand;
mod query;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

pub use builder::{Data, Kind, Statement};
pub use condition::{CompareOp, Composite, Condition, Join, JoinKind, OrderBy, Term};
pub use dialect::{Dialect, MySql, Postgres, Sqlite};
pub use error::BuildError;
pub use executor::{ExecResult, Executor, Field, Row};
pub use expr::Expr;
pub use operand::{Column, Operand, is_empty, is_null};
pub use query::{Compiled, Query};
// Re-export so callers can name argument values without depending on ``SeaQuery`` directly.
pub use sea_query::Value;
#[cfg(feature = "sqlite")]
pub use sqlite::{ConnectOptions, SqliteExecutor};
pub use traits::{Backend, FromEnv};
