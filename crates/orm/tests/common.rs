//! Common records and store setup shared across integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Once};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use quarry_orm::quarry_sql::{
    Condition, Dialect, ExecResult, Executor, Row, SqliteExecutor, Value,
};
use quarry_orm::{CacheStore, Definition, Mapped, MemoryStore, Orm, fields};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: i64,
}

impl Mapped for Model {
    fn define(def: &mut Definition<Self>) {
        fields!(def, { column id: "column=entity_id; primary; auto_increment" });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub model: Model,
    pub email: String,
    pub password: String,
    pub posts: Vec<Post>,
}

impl Mapped for User {
    fn define(def: &mut Definition<Self>) {
        fields!(def, {
            embed model,
            column email,
            column password,
            has_many posts: "foreign_key=user_id; order=entity_id",
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub model: Model,
    pub user_id: i64,
    pub name: String,
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub status: i32,
    pub user: Option<User>,
    pub comments: Vec<Comment>,
    pub visible_comments: Vec<Comment>,
    pub something: String,
}

impl Mapped for Post {
    fn define(def: &mut Definition<Self>) {
        fields!(def, {
            embed model: "table=blog_posts",
            column user_id,
            column name,
            column title,
            column content,
            column created,
            column modified,
            column status,
            belongs_to user: "foreign_key=user_id",
            has_many comments: "foreign_key=post_id; order=entity_id",
            has_many visible_comments:
                "foreign_key=post_id; filter=visible; order=entity_id DESC; limit=2",
            column something: "-",
        });
        def.filter("visible", || Condition::eq("hidden", false));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub model: Model,
    pub post_id: i64,
    pub content: String,
    pub hidden: bool,
    pub post: Option<Box<Post>>,
}

impl Mapped for Comment {
    fn define(def: &mut Definition<Self>) {
        fields!(def, {
            embed model,
            column post_id,
            column content,
            column hidden,
            belongs_to_boxed post: "foreign_key=post_id",
        });
    }
}

/// Record with a natural key, a binary field and a lazily read column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub payload: Vec<u8>,
    pub notes: Option<String>,
}

impl Mapped for Attachment {
    fn define(def: &mut Definition<Self>) {
        fields!(def, {
            column name: "primary",
            column payload: "base64",
            column notes: "skip",
        });
    }
}

pub const SCHEMA: &str = "
    CREATE TABLE users (
        entity_id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL
    );
    CREATE TABLE blog_posts (
        entity_id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        created TEXT NOT NULL,
        modified TEXT NOT NULL,
        status INTEGER NOT NULL
    );
    CREATE TABLE comments (
        entity_id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER NOT NULL,
        content TEXT NOT NULL,
        hidden INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE attachments (
        name TEXT PRIMARY KEY,
        payload TEXT NOT NULL,
        notes TEXT
    );
";

/// Installs a test subscriber once per test binary. Set `RUST_LOG` to see
/// the generated SQL.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

/// Fresh in-memory database with the test tables.
pub fn database() -> Arc<SqliteExecutor> {
    init_tracing();
    let db = SqliteExecutor::memory().expect("open database");
    db.execute_batch(SCHEMA).expect("create tables");
    Arc::new(db)
}

/// Engine over a fresh database with an in-memory object cache.
pub fn setup() -> (Orm, Arc<SqliteExecutor>, Arc<MemoryStore>) {
    let db = database();
    let store = Arc::new(MemoryStore::default());
    let orm = Orm::builder()
        .executor(Arc::clone(&db) as Arc<dyn Executor>)
        .cache_store(Arc::clone(&store) as Arc<dyn CacheStore>)
        .build();
    (orm, db, store)
}

pub fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("valid timestamp")
}

pub fn new_user(email: &str) -> User {
    User {
        email: email.to_string(),
        password: "secret".to_string(),
        ..User::default()
    }
}

pub fn new_post(user_id: i64, title: &str) -> Post {
    Post {
        user_id,
        name: title.to_lowercase().replace(' ', "-"),
        title: title.to_string(),
        content: format!("{title} content"),
        created: timestamp(1_700_000_000),
        modified: timestamp(1_700_000_000),
        status: 1,
        ..Post::default()
    }
}

pub fn new_comment(post_id: i64, content: &str, hidden: bool) -> Comment {
    Comment {
        post_id,
        content: content.to_string(),
        hidden,
        ..Comment::default()
    }
}

/// Executor decorator that records every statement it runs.
pub struct Recording {
    inner: Arc<dyn Executor>,
    log: Mutex<Vec<(String, Vec<Value>)>>,
}

impl Recording {
    pub fn new(inner: Arc<dyn Executor>) -> Self {
        Self {
            inner,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Statements run so far.
    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.log.lock().clone()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    fn record(&self, sql: &str, args: &[Value]) {
        self.log.lock().push((sql.to_string(), args.to_vec()));
    }
}

impl Executor for Recording {
    fn dialect(&self) -> Arc<dyn Dialect> {
        self.inner.dialect()
    }

    fn execute(&self, sql: &str, args: &[Value]) -> anyhow::Result<ExecResult> {
        self.record(sql, args);
        self.inner.execute(sql, args)
    }

    fn query(&self, sql: &str, args: &[Value]) -> anyhow::Result<Vec<Row>> {
        self.record(sql, args);
        self.inner.query(sql, args)
    }
}
