//! CRUD, relation loading and object caching against an in-memory database.

mod common;

use std::sync::Arc;

use common::{
    Attachment, Comment, Post, Recording, User, database, new_comment, new_post, new_user, setup,
};
use quarry_orm::quarry_sql::{Condition, Executor, OrderBy, Value};
use quarry_orm::{Definition, Error, Mapped, Orm, fields};
use serde::{Deserialize, Serialize};

fn text(value: &str) -> Value {
    Value::String(Some(Box::new(value.to_string())))
}

fn id(value: i64) -> Value {
    Value::BigInt(Some(value))
}

#[test]
fn create_writes_back_generated_key() {
    let (orm, _db, _store) = setup();

    let mut first = new_user("first@example.com");
    orm.create(&mut first).expect("create");
    let mut second = new_user("second@example.com");
    orm.create(&mut second).expect("create");

    assert!(first.model.id > 0);
    assert_eq!(second.model.id, first.model.id + 1);
    assert_eq!(orm.count::<User>().expect("count"), 2);
}

#[test]
fn save_without_key_creates() {
    let (orm, _db, _store) = setup();

    let mut user = new_user("new@example.com");
    orm.save(&mut user).expect("save");
    assert!(user.model.id > 0);

    let mut loaded = User::default();
    loaded.model.id = user.model.id;
    orm.first(&mut loaded).expect("first");
    assert_eq!(loaded.email, "new@example.com");
}

#[test]
fn first_is_served_from_cache_until_save() {
    let (orm, db, _store) = setup();
    let mut user = new_user("cached@example.com");
    orm.create(&mut user).expect("create");

    let mut loaded = User::default();
    loaded.model.id = user.model.id;
    orm.first(&mut loaded).expect("first");

    db.execute(
        "UPDATE users SET email = ?1 WHERE entity_id = ?2",
        &[text("changed@example.com"), id(user.model.id)],
    )
    .expect("raw update");

    let mut again = User::default();
    again.model.id = user.model.id;
    orm.first(&mut again).expect("first");
    assert_eq!(again.email, "cached@example.com");

    // writing one column drops the cached copy
    orm.query::<User>().columns(["password"]).save(&mut again).expect("save");
    let mut fresh = User::default();
    fresh.model.id = user.model.id;
    orm.first(&mut fresh).expect("first");
    assert_eq!(fresh.email, "changed@example.com");
}

#[test]
fn missing_rows_are_remembered() {
    let (orm, db, _store) = setup();

    let mut user = User::default();
    user.model.id = 999;
    let err = orm.first(&mut user).expect_err("no row");
    assert!(err.is_not_found());

    db.execute(
        "INSERT INTO users (entity_id, email, password) VALUES (?1, ?2, ?3)",
        &[id(999), text("late@example.com"), text("secret")],
    )
    .expect("raw insert");

    let err = orm.first(&mut user).expect_err("negative marker");
    assert!(matches!(err, Error::NotFound));

    orm.delete_from_cache(&user).expect("delete from cache");
    orm.first(&mut user).expect("first");
    assert_eq!(user.email, "late@example.com");
}

#[test]
fn filtered_miss_leaves_key_unmarked() {
    let (orm, _db, _store) = setup();
    let mut post = new_post(1, "Live");
    orm.create(&mut post).expect("create");

    let mut filtered = Post::default();
    let err = orm
        .query::<Post>()
        .r#where(Condition::eq("entity_id", post.model.id))
        .r#where(Condition::eq("status", 99))
        .first(&mut filtered)
        .expect_err("status does not match");
    assert!(err.is_not_found());

    let mut loaded = Post::default();
    loaded.model.id = post.model.id;
    orm.first(&mut loaded).expect("row exists");
    assert_eq!(loaded.title, "Live");
}

#[test]
fn filtered_first_bypasses_cached_row() {
    let (orm, _db, _store) = setup();
    let mut post = new_post(1, "Warm");
    orm.create(&mut post).expect("create");

    let mut loaded = Post::default();
    loaded.model.id = post.model.id;
    orm.first(&mut loaded).expect("first");

    let mut filtered = Post::default();
    let err = orm
        .query::<Post>()
        .where_all([Condition::eq("entity_id", post.model.id), Condition::eq("status", 99)])
        .first(&mut filtered)
        .expect_err("status does not match");
    assert!(err.is_not_found());

    orm.query::<Post>()
        .r#where(Condition::and([
            Condition::eq("entity_id", post.model.id),
            Condition::eq("status", 1),
        ]))
        .first(&mut filtered)
        .expect("status matches");
    assert_eq!(filtered.title, "Warm");
}

#[test]
fn delete_removes_row_and_cached_copy() {
    let (orm, _db, _store) = setup();
    let mut user = new_user("gone@example.com");
    orm.create(&mut user).expect("create");

    let mut loaded = User::default();
    loaded.model.id = user.model.id;
    orm.first(&mut loaded).expect("first");

    orm.delete(&loaded).expect("delete");
    let err = orm.first(&mut loaded).expect_err("deleted");
    assert!(err.is_not_found());
    assert_eq!(orm.count::<User>().expect("count"), 0);
}

#[test]
fn records_without_key_are_rejected() {
    let (orm, _db, _store) = setup();
    let user = User::default();

    assert!(matches!(orm.delete(&user), Err(Error::NoPrimaryKey)));
    assert!(matches!(orm.delete_from_cache(&user), Err(Error::NoPrimaryKey)));
}

#[test]
fn duplicate_key_is_classified() {
    let (orm, _db, _store) = setup();
    orm.create(&mut new_user("twice@example.com")).expect("create");

    let err = orm.create(&mut new_user("twice@example.com")).expect_err("duplicate");
    assert!(err.is_duplicate_key(), "unexpected error: {err:?}");
}

#[test]
fn find_with_conditions_order_and_page() {
    let (orm, _db, _store) = setup();
    for n in 1..=5 {
        let mut post = new_post(1, &format!("Post {n}"));
        post.status = if n % 2 == 0 { 2 } else { 1 };
        orm.create(&mut post).expect("create");
    }

    let mut posts = Vec::new();
    orm.query::<Post>()
        .order_by(OrderBy::desc("entity_id"))
        .limit(2)
        .offset(1)
        .find(&mut posts)
        .expect("find");
    let titles: Vec<&str> = posts.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["Post 4", "Post 3"]);
    assert_eq!(posts[0].created, common::timestamp(1_700_000_000));

    orm.query::<Post>().r#where(Condition::eq("status", 2)).find(&mut posts).expect("find");
    assert_eq!(posts.len(), 2);

    let count = orm.query::<Post>().r#where(Condition::like("title", "Post%")).count();
    assert_eq!(count.expect("count"), 5);
    let count = orm.query::<Post>().r#where(Condition::gt("status", 1)).count();
    assert_eq!(count.expect("count"), 2);
}

#[test]
fn delete_all_reports_removed_rows() {
    let (orm, _db, _store) = setup();
    for status in [1, 1, 2] {
        let mut post = new_post(1, "Bulk");
        post.status = status;
        orm.create(&mut post).expect("create");
    }

    let removed = orm.query::<Post>().r#where(Condition::eq("status", 1)).delete_all();
    assert_eq!(removed.expect("delete all"), 2);
    assert_eq!(orm.count::<Post>().expect("count"), 1);
}

#[test]
fn save_writes_requested_columns_only() {
    let db = database();
    let recording = Arc::new(Recording::new(db));
    let orm = Orm::new(Arc::clone(&recording) as Arc<dyn Executor>);

    let mut post = new_post(1, "Draft");
    orm.create(&mut post).expect("create");
    recording.clear();

    post.title = "Published".to_string();
    post.content = "not written".to_string();
    orm.query::<Post>().columns(["title"]).save(&mut post).expect("save");

    let statements = recording.statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(
        statements[0].0,
        "UPDATE \"blog_posts\"\nSET \"title\" = ?1\nWHERE \"entity_id\" = ?2"
    );
    assert_eq!(statements[0].1, vec![text("Published"), id(post.model.id)]);

    recording.clear();
    orm.query::<Post>().columns(["entity_id"]).save(&mut post).expect("save");
    assert!(recording.statements().is_empty());

    let mut loaded = Post::default();
    loaded.model.id = post.model.id;
    orm.first(&mut loaded).expect("first");
    assert_eq!(loaded.title, "Published");
    assert_eq!(loaded.content, "Draft content");
}

#[test]
fn belongs_to_loads_once_per_query() {
    let db = database();
    let recording = Arc::new(Recording::new(db));
    let orm = Orm::new(Arc::clone(&recording) as Arc<dyn Executor>);

    let mut user = new_user("author@example.com");
    orm.create(&mut user).expect("create");
    for title in ["One", "Two", "Three"] {
        orm.create(&mut new_post(user.model.id, title)).expect("create");
    }
    recording.clear();

    let mut posts = Vec::new();
    orm.query::<Post>().with(["user"]).find(&mut posts).expect("find");

    assert_eq!(posts.len(), 3);
    for post in &posts {
        let author = post.user.as_ref().expect("user loaded");
        assert_eq!(author.email, "author@example.com");
    }
    // one read for the posts, one for their shared author
    assert_eq!(recording.statements().len(), 2);
}

#[test]
fn has_many_honours_filter_order_and_limit() {
    let (orm, _db, _store) = setup();
    let mut post = new_post(1, "Discussed");
    orm.create(&mut post).expect("create");

    let mut ids = Vec::new();
    for (content, hidden) in [("a", false), ("b", true), ("c", false), ("d", false)] {
        let mut comment = new_comment(post.model.id, content, hidden);
        orm.create(&mut comment).expect("create");
        ids.push(comment.model.id);
    }

    let mut loaded = Post::default();
    loaded.model.id = post.model.id;
    orm.query::<Post>()
        .with(["comments", "visible_comments"])
        .first(&mut loaded)
        .expect("first");

    assert_eq!(loaded.comments.len(), 4);
    let visible: Vec<&str> = loaded.visible_comments.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(visible, vec!["d", "c"]);
    assert!(loaded.visible_comments.iter().all(|c| !c.hidden));
    assert_eq!(loaded.comments[0].model.id, ids[0]);
}

#[test]
fn has_many_cache_is_invalidated_by_child_writes() {
    let (orm, db, _store) = setup();
    let mut post = new_post(1, "Busy");
    orm.create(&mut post).expect("create");
    orm.create(&mut new_comment(post.model.id, "first", false)).expect("create");

    let load = || {
        let mut loaded = Post::default();
        loaded.model.id = post.model.id;
        orm.query::<Post>().with(["comments"]).first(&mut loaded).expect("first");
        loaded.comments.len()
    };
    assert_eq!(load(), 1);

    db.execute(
        "INSERT INTO comments (post_id, content, hidden) VALUES (?1, ?2, 0)",
        &[id(post.model.id), text("raw")],
    )
    .expect("raw insert");
    assert_eq!(load(), 1);

    orm.create(&mut new_comment(post.model.id, "second", false)).expect("create");
    assert_eq!(load(), 3);
}

#[test]
fn deleting_owner_drops_cached_collections() {
    let (orm, db, _store) = setup();
    let mut post = new_post(1, "Short lived");
    orm.create(&mut post).expect("create");
    orm.create(&mut new_comment(post.model.id, "only", false)).expect("create");

    let mut loaded = Post::default();
    loaded.model.id = post.model.id;
    orm.query::<Post>().with(["comments"]).first(&mut loaded).expect("first");
    assert_eq!(loaded.comments.len(), 1);

    orm.delete(&loaded).expect("delete");
    db.execute(
        "INSERT INTO blog_posts
         (entity_id, user_id, name, title, content, created, modified, status)
         VALUES (?1, 1, 'back', 'Back', 'again', ?2, ?2, 1)",
        &[id(post.model.id), text("2023-11-14T22:13:20+00:00")],
    )
    .expect("raw insert");
    db.execute("DELETE FROM comments", &[]).expect("raw delete");

    orm.query::<Post>().with(["comments"]).first(&mut loaded).expect("first");
    assert_eq!(loaded.title, "Back");
    assert!(loaded.comments.is_empty());
}

#[test]
fn nested_relations() {
    let (orm, _db, _store) = setup();
    let mut user = new_user("nested@example.com");
    orm.create(&mut user).expect("create");
    let mut post = new_post(user.model.id, "Nested");
    orm.create(&mut post).expect("create");
    let mut comment = new_comment(post.model.id, "hello", false);
    orm.create(&mut comment).expect("create");

    let mut loaded = Comment::default();
    loaded.model.id = comment.model.id;
    orm.query::<Comment>().with(["post[user, comments]"]).first(&mut loaded).expect("first");

    let post = loaded.post.as_ref().expect("post loaded");
    assert_eq!(post.title, "Nested");
    assert_eq!(post.user.as_ref().expect("user loaded").email, "nested@example.com");
    assert_eq!(post.comments.len(), 1);
    assert!(post.comments[0].post.is_none());

    let mut user = User::default();
    user.model.id = post.user_id;
    orm.first(&mut user).expect("first");
    orm.load_related(&mut user, &["posts[comments]"]).expect("load related");
    assert_eq!(user.posts.len(), 1);
    assert_eq!(user.posts[0].comments[0].content, "hello");
}

#[test]
fn empty_foreign_keys_load_nothing() {
    let (orm, _db, _store) = setup();
    let mut post = new_post(0, "Orphan");
    orm.create(&mut post).expect("create");

    orm.load_related(&mut post, &["user"]).expect("load related");
    assert!(post.user.is_none());
}

#[test]
fn relation_names_are_checked() {
    let (orm, _db, _store) = setup();
    let mut post = new_post(1, "Checked");
    orm.create(&mut post).expect("create");

    let err = orm.load_related(&mut post, &["author"]).expect_err("unknown relation");
    assert!(matches!(err, Error::UnknownRelation { name, .. } if name == "author"));

    let err = orm.load_related(&mut post, &["user[posts"]).expect_err("malformed name");
    assert!(matches!(err, Error::InvalidRelationName(_)));

    let err = orm.query::<Post>().with(["something"]).first(&mut post).expect_err("unmapped");
    assert!(matches!(err, Error::UnknownRelation { .. }));
}

#[test]
fn base64_and_skipped_columns() {
    let (orm, db, _store) = setup();
    let mut attachment = Attachment {
        name: "logo.png".to_string(),
        payload: vec![0, 1, 2, 255],
        notes: Some("draft".to_string()),
    };
    orm.create(&mut attachment).expect("create");

    let rows = db.query("SELECT payload, notes FROM attachments", &[]).expect("raw select");
    assert_eq!(rows[0].get(0), Some(&text("AAEC/w==")));
    assert_eq!(rows[0].get(1), Some(&text("draft")));

    let mut loaded = Attachment {
        name: "logo.png".to_string(),
        ..Attachment::default()
    };
    orm.first(&mut loaded).expect("first");
    assert_eq!(loaded.payload, vec![0, 1, 2, 255]);
    assert_eq!(loaded.notes, None);

    orm.query::<Attachment>()
        .columns(["name", "payload", "notes"])
        .first(&mut loaded)
        .expect("first");
    assert_eq!(loaded.notes.as_deref(), Some("draft"));

    // skipped columns are left alone by a plain save
    loaded.notes = Some("changed".to_string());
    orm.save(&mut loaded).expect("save");
    let rows = db.query("SELECT notes FROM attachments", &[]).expect("raw select");
    assert_eq!(rows[0].get(0), Some(&text("draft")));
}

#[test]
fn transaction_executor_overrides_database() {
    let db = database();
    let orm = Orm::builder().database("other", Arc::clone(&db) as Arc<dyn Executor>).build();

    let err = orm.create(&mut new_user("tx@example.com")).expect_err("no default database");
    assert!(matches!(err, Error::UnknownDatabase(name) if name == "default"));

    let mut user = new_user("tx@example.com");
    orm.query::<User>().tx(db as Arc<dyn Executor>).create(&mut user).expect("create");
    assert!(user.model.id > 0);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct AuditEntry {
    id: i64,
    action: String,
}

impl Mapped for AuditEntry {
    fn define(def: &mut Definition<Self>) {
        fields!(def, {
            column id: "database=audit; primary; auto_increment",
            column action,
        });
    }
}

#[test]
fn records_route_to_their_database() {
    let main = database();
    let audit = database();
    audit
        .execute_batch(
            "CREATE TABLE audit_entries (id INTEGER PRIMARY KEY AUTOINCREMENT, action TEXT)",
        )
        .expect("create table");

    let orm = Orm::builder()
        .executor(Arc::clone(&main) as Arc<dyn Executor>)
        .database("audit", Arc::clone(&audit) as Arc<dyn Executor>)
        .build();

    let mut entry = AuditEntry {
        action: "login".to_string(),
        ..AuditEntry::default()
    };
    orm.create(&mut entry).expect("create");
    assert_eq!(entry.id, 1);

    let rows = audit.query("SELECT action FROM audit_entries", &[]).expect("raw select");
    assert_eq!(rows.len(), 1);
    let tables = main
        .query("SELECT name FROM sqlite_master WHERE name = 'audit_entries'", &[])
        .expect("raw select");
    assert!(tables.is_empty());
}
