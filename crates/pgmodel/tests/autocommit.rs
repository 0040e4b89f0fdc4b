mod common;

use common::{MockPool, Todo};
use pgmodel::{Database, Model, Op, OrmError, Values, params};

fn todos() -> Model {
    Model::new("todos").fillable(["title", "description"])
}

#[tokio::test]
async fn each_terminal_acquires_and_releases() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());
    let model = todos();

    let first: Option<Todo> = model.query().where_eq("done", false).first(&db).await.unwrap();
    assert!(first.is_none());
    assert_eq!(pool.available(), 1);

    let all: Vec<Todo> = model.all(&db).await.unwrap();
    assert!(all.is_empty());
    assert_eq!(pool.available(), 1);

    assert_eq!(
        pool.statements(),
        vec![
            "SELECT * FROM todos WHERE (done = $1) LIMIT 1",
            "SELECT * FROM todos",
        ]
    );
}

#[tokio::test]
async fn failed_statement_still_releases() {
    let pool = MockPool::new(1).fail_on("SELECT");
    let db = Database::new(pool.clone());

    let err = todos().query().get_all::<Todo>(&db).await.unwrap_err();
    assert!(matches!(err, OrmError::Execution { .. }));
    assert!(!err.is_retryable());
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn find_and_find_by_use_fresh_chains() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());
    let model = Model::new("notes").primary_key("note_id");

    let found: Option<Todo> = model.find(&db, 5_i64).await.unwrap();
    assert!(found.is_none());
    let found: Vec<Todo> = model.find_by(&db, "slug", Op::Eq, "hello").await.unwrap();
    assert!(found.is_empty());
    let found: Vec<Todo> = model
        .find_by(&db, "title", Op::ILike, "%milk%")
        .await
        .unwrap();
    assert!(found.is_empty());

    assert_eq!(
        pool.statements(),
        vec![
            "SELECT * FROM notes WHERE (note_id = $1) LIMIT 1",
            "SELECT * FROM notes WHERE (slug = $1)",
            "SELECT * FROM notes WHERE (title ILIKE $1)",
        ]
    );
}

#[tokio::test]
async fn count_without_rows_is_zero() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());

    let n = todos()
        .query()
        .where_eq("done", true)
        .order_by_asc("id")
        .limit(3)
        .count(&db)
        .await
        .unwrap();
    assert_eq!(n, 0);

    let n = todos().query().count_by(&db, "DISTINCT owner_id").await.unwrap();
    assert_eq!(n, 0);

    assert_eq!(
        pool.statements(),
        vec![
            "SELECT COUNT(*) AS total FROM todos WHERE (done = $1)",
            "SELECT COUNT(DISTINCT owner_id) AS total FROM todos",
        ]
    );
}

#[tokio::test]
async fn exists_selects_one_row() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());

    let exists = todos()
        .query()
        .where_eq("title", "x")
        .exists(&db)
        .await
        .unwrap();
    assert!(!exists);
    assert_eq!(
        pool.statements(),
        vec!["SELECT 1 FROM todos WHERE (title = $1) LIMIT 1"]
    );
}

#[tokio::test]
async fn paginate_counts_then_selects_page() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());

    let page = todos()
        .query()
        .where_eq("done", false)
        .order_by_desc("created_at")
        .paginate::<Todo>(&db, 2, 10)
        .await
        .unwrap();

    assert!(page.rows.is_empty());
    assert_eq!(page.info.total, 0);
    assert_eq!(page.info.current_page, 2);
    assert_eq!(page.info.per_page, 10);
    assert_eq!(page.info.from, None);
    assert_eq!(
        pool.statements(),
        vec![
            "SELECT COUNT(*) AS total FROM todos WHERE (done = $1)",
            "SELECT * FROM todos WHERE (done = $1) ORDER BY created_at DESC LIMIT 10 OFFSET 10",
        ]
    );
}

#[tokio::test]
async fn truncate_and_raw_pass_sql_through() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());
    let model = todos();

    model.truncate(&db, false).await.unwrap();
    model.truncate(&db, true).await.unwrap();
    let rows = model
        .raw(&db, "SELECT * FROM todos WHERE id = $1", params![1_i64])
        .await
        .unwrap();
    assert!(rows.is_empty());
    let mapped: Vec<Todo> = model
        .select_raw(&db, "SELECT id, title FROM todos", params![])
        .await
        .unwrap();
    assert!(mapped.is_empty());

    assert_eq!(
        pool.statements(),
        vec![
            "TRUNCATE TABLE todos",
            "TRUNCATE TABLE todos CASCADE",
            "SELECT * FROM todos WHERE id = $1",
            "SELECT id, title FROM todos",
        ]
    );
}

#[tokio::test]
async fn insert_without_returned_row_is_not_found() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());

    let err = todos()
        .insert::<Todo>(&db, Values::new().set("title", "Buy milk").set("id", 3_i64))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::NotFound(_)));
    assert_eq!(
        pool.statements(),
        vec!["INSERT INTO todos (title) VALUES ($1) RETURNING *"]
    );
}

#[tokio::test]
async fn usage_errors_never_touch_the_pool() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());

    let err = todos()
        .query()
        .where_raw("id = ?", params![])
        .get_all::<Todo>(&db)
        .await
        .unwrap_err();
    assert!(err.is_usage());
    assert!(pool.statements().is_empty());
}
