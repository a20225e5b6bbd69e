//! Active-record persistence and relation loading against an in-memory
//! SQLite database.

use sqlrecord::{
    Connection, DdlMode, Introspector, Mapper, Query, Record, RecordType, TypeRegistry, Value,
};

fn memory() -> Connection {
    sqlrecord::connect("sqlite::memory:").expect("sqlite memory dsn")
}

fn register_blog(conn: &Connection, types: &TypeRegistry) {
    let mapper = Mapper::new(conn, types);
    mapper
        .register_with_schema(RecordType::builder("author").columns(["name", "age"]))
        .unwrap();
    mapper
        .register_with_schema(
            RecordType::builder("post")
                .columns(["title", "views"])
                .has_one("author")
                .has_many("comments")
                .many_to_many("tags"),
        )
        .unwrap();
    mapper
        .register_with_schema(RecordType::builder("comment").columns(["body", "post_id"]))
        .unwrap();
    mapper
        .register_with_schema(RecordType::builder("tag").columns(["label"]))
        .unwrap();
    for table in ["author", "post", "comment", "tag"] {
        mapper.create_table_for(table, DdlMode::Execute).unwrap();
    }
    conn.execute("CREATE TABLE post_tag (post_id INTEGER NOT NULL, tag_id INTEGER NOT NULL)")
        .unwrap();
    conn.clear_log();
}

#[test]
fn test_created_tables_match_registered_types() {
    let conn = memory();
    let types = TypeRegistry::new();
    register_blog(&conn, &types);

    let shape = Introspector::new(&conn).describe("post").unwrap();
    assert_eq!(shape.column_names(), vec!["id", "title", "views", "author_id"]);
    assert_eq!(shape.primary_keys, vec!["id"]);
    assert_eq!(shape.foreign_keys.len(), 1);
    assert_eq!(shape.foreign_keys[0].table, "author");

    // Registering again adopts the reflected column types.
    let ty = Mapper::new(&conn, &types)
        .register_with_schema(RecordType::builder("post"))
        .unwrap();
    assert_eq!(ty.columns().len(), 4);
    assert_eq!(ty.declared_type("id"), Some("INTEGER"));
}

#[test]
fn test_save_is_idempotent_and_updates_only_changes() {
    let conn = memory();
    let types = TypeRegistry::new();
    register_blog(&conn, &types);
    let mapper = Mapper::new(&conn, &types);

    let mut author = Record::new(types.require("author").unwrap())
        .with("name", "Jane")
        .with("age", 30);
    assert!(mapper.save(&mut author).unwrap());
    assert_eq!(author.id().unwrap(), Value::Int(1));
    assert_eq!(conn.log_len(), 1);

    assert!(!mapper.save(&mut author).unwrap());
    assert_eq!(conn.log_len(), 1);

    author.set("age", 31);
    assert!(mapper.save(&mut author).unwrap());
    let log = conn.log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].sql, "UPDATE author SET age = :p0 WHERE id = :id");

    let reloaded = mapper.find("author", 1).unwrap().unwrap();
    assert_eq!(reloaded.value("age"), Some(&Value::Int(31)));
    assert_eq!(reloaded.value("name"), Some(&Value::from("Jane")));
}

#[test]
fn test_prefetch_one_to_many_in_one_query() {
    let conn = memory();
    let types = TypeRegistry::new();
    register_blog(&conn, &types);
    let mapper = Mapper::new(&conn, &types);

    conn.begin_transaction().unwrap();
    for n in 0..50 {
        let mut post =
            Record::new(types.require("post").unwrap()).with("title", format!("Post {n}"));
        post.set_many(
            "comments",
            vec![
                Record::new(types.require("comment").unwrap()).with("body", "first"),
                Record::new(types.require("comment").unwrap()).with("body", "second"),
            ],
        );
        mapper.save(&mut post).unwrap();
    }
    conn.commit().unwrap();

    let mut posts = mapper.query("post").unwrap().into_records().unwrap();
    assert_eq!(posts.len(), 50);

    let before = conn.log_len();
    assert_eq!(mapper.inject(&mut posts, "comments").unwrap(), 1);
    assert_eq!(conn.log_len(), before + 1);
    assert!(posts.iter().all(|post| post.related("comments").unwrap().len() == 2));

    let first = &posts[0];
    let bodies: Vec<Value> = first
        .get("comments")
        .as_many()
        .unwrap()
        .iter()
        .filter_map(|c| c.value("body").cloned())
        .collect();
    assert_eq!(bodies, vec![Value::from("first"), Value::from("second")]);
}

#[test]
fn test_many_to_many_link_and_prefetch() {
    let conn = memory();
    let types = TypeRegistry::new();
    register_blog(&conn, &types);
    let mapper = Mapper::new(&conn, &types);

    let mut rust = Record::new(types.require("tag").unwrap()).with("label", "rust");
    let mut sql = Record::new(types.require("tag").unwrap()).with("label", "sql");
    mapper.save(&mut rust).unwrap();
    mapper.save(&mut sql).unwrap();

    let mut posts = Vec::new();
    for title in ["One", "Two", "Three"] {
        let mut post = Record::new(types.require("post").unwrap()).with("title", title);
        mapper.save(&mut post).unwrap();
        posts.push(post);
    }
    mapper.link(&mut posts[0], "tags", &rust).unwrap();
    mapper.link(&mut posts[0], "tags", &sql).unwrap();
    mapper.link(&mut posts[1], "tags", &sql).unwrap();

    let before = conn.log_len();
    mapper.inject(&mut posts, "tags").unwrap();
    assert_eq!(conn.log_len(), before + 2);
    assert_eq!(posts[0].related("tags").unwrap().len(), 2);
    assert_eq!(posts[1].related("tags").unwrap().len(), 1);
    assert!(posts[2].related("tags").unwrap().is_empty());

    mapper.unlink(&mut posts[0], "tags", &rust).unwrap();
    assert_eq!(posts[0].related("tags").unwrap().len(), 1);
    assert_eq!(Query::table(&conn, "post_tag").count_rows().unwrap(), 2);
}

#[test]
fn test_save_links_cached_many_to_many_targets() {
    let conn = memory();
    let types = TypeRegistry::new();
    register_blog(&conn, &types);
    let mapper = Mapper::new(&conn, &types);

    let mut post = Record::new(types.require("post").unwrap()).with("title", "Tagged");
    post.set_many(
        "tags",
        vec![
            Record::new(types.require("tag").unwrap()).with("label", "rust"),
            Record::new(types.require("tag").unwrap()).with("label", "sql"),
        ],
    );
    mapper.save(&mut post).unwrap();
    assert_eq!(Query::table(&conn, "post_tag").count_rows().unwrap(), 2);

    mapper.save(&mut post).unwrap();
    assert_eq!(Query::table(&conn, "post_tag").count_rows().unwrap(), 2);

    let mut reloaded = mapper.find("post", post.id().unwrap()).unwrap().unwrap();
    assert_eq!(mapper.resolve(&mut reloaded, "tags").unwrap().len(), 2);
}

#[test]
fn test_save_inserts_record_with_assigned_key() {
    let conn = memory();
    let types = TypeRegistry::new();
    conn.execute("CREATE TABLE country (code TEXT PRIMARY KEY, name TEXT)")
        .unwrap();
    types.register(
        RecordType::builder("country")
            .primary_key(["code"])
            .columns(["name"])
            .build(),
    );
    let mapper = Mapper::new(&conn, &types);
    conn.clear_log();

    let mut country = Record::new(types.require("country").unwrap())
        .with("code", "nz")
        .with("name", "New Zealand");
    assert!(country.exists());
    assert!(mapper.save(&mut country).unwrap());
    let log = conn.log();
    assert_eq!(log.len(), 2);
    assert!(log[0].sql.starts_with("UPDATE country"));
    assert!(log[1].sql.starts_with("INSERT INTO country"));

    let found = mapper.find("country", "nz").unwrap().unwrap();
    assert_eq!(found.value("name"), Some(&Value::from("New Zealand")));
    assert!(!mapper.save(&mut country).unwrap());
    assert_eq!(conn.log_len(), 3);
}

#[test]
fn test_cascade_save_then_lazy_resolve() {
    let conn = memory();
    let types = TypeRegistry::new();
    register_blog(&conn, &types);
    let mapper = Mapper::new(&conn, &types);

    let mut post = Record::new(types.require("post").unwrap()).with("title", "Hello");
    post.set_one(
        "author",
        Some(Record::new(types.require("author").unwrap()).with("name", "Jane")),
    );
    post.set_many(
        "comments",
        vec![Record::new(types.require("comment").unwrap()).with("body", "nice")],
    );
    mapper.save(&mut post).unwrap();
    let post_id = post.id().unwrap();

    let mut fresh = mapper.find("post", post_id).unwrap().unwrap();
    assert!(!fresh.is_loaded("author"));
    let before = conn.log_len();
    let author = mapper.field(&mut fresh, "author").unwrap();
    assert_eq!(
        author.as_one().and_then(|a| a.value("name")),
        Some(&Value::from("Jane"))
    );
    assert_eq!(mapper.resolve(&mut fresh, "comments").unwrap().len(), 1);
    assert_eq!(conn.log_len(), before + 2);

    mapper.field(&mut fresh, "author").unwrap();
    assert_eq!(conn.log_len(), before + 2);

    let json = serde_json::to_value(&fresh).unwrap();
    assert_eq!(json["title"], serde_json::json!("Hello"));
    assert_eq!(json["author"]["name"], serde_json::json!("Jane"));
    assert_eq!(json["comments"][0]["body"], serde_json::json!("nice"));
}

#[test]
fn test_remove() {
    let conn = memory();
    let types = TypeRegistry::new();
    register_blog(&conn, &types);
    let mapper = Mapper::new(&conn, &types);

    let mut author = Record::new(types.require("author").unwrap()).with("name", "Jane");
    mapper.save(&mut author).unwrap();
    assert!(mapper.remove(&mut author).unwrap());
    assert!(!author.exists());
    assert!(mapper.find("author", 1).unwrap().is_none());
    assert!(!mapper.remove(&mut author).unwrap());
}

#[test]
fn test_rollback_discards_saved_records() {
    let conn = memory();
    let types = TypeRegistry::new();
    register_blog(&conn, &types);
    let mapper = Mapper::new(&conn, &types);

    conn.begin_transaction().unwrap();
    assert!(conn.in_transaction());
    let mut author = Record::new(types.require("author").unwrap()).with("name", "Jane");
    mapper.save(&mut author).unwrap();
    assert_eq!(Query::table(&conn, "author").count_rows().unwrap(), 1);
    conn.rollback().unwrap();

    assert!(!conn.in_transaction());
    assert_eq!(Query::table(&conn, "author").count_rows().unwrap(), 0);
}
