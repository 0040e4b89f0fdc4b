mod common;

use common::{MockPool, Todo};
use pgmodel::{
    Database, Executor, Model, OrmError, ParamList, TransactionIsolation, TransactionOptions,
    TransactionState, UsageError, Values,
};
use std::time::Duration;

fn todos() -> Model {
    Model::new("todos").fillable(["title", "done"])
}

#[tokio::test]
async fn failing_transaction_rolls_back_and_releases() {
    let pool = MockPool::new(2).fail_on("DELETE");
    let db = Database::new(pool.clone());
    let model = todos();

    let result: Result<(), OrmError> = db
        .transaction(async |tx| {
            model
                .query()
                .where_eq("id", 1_i64)
                .update::<Todo>(tx, Values::new().set("done", true))
                .await?;
            model.query().where_eq("id", 2_i64).delete::<Todo>(tx).await?;
            Ok(())
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(
        err.sql(),
        Some("DELETE FROM todos WHERE (id = $1) RETURNING *")
    );
    assert_eq!(
        pool.statements(),
        vec![
            "BEGIN",
            "UPDATE todos SET done = $1 WHERE (id = $2) RETURNING *",
            "DELETE FROM todos WHERE (id = $1) RETURNING *",
            "ROLLBACK",
        ]
    );
    assert_eq!(pool.available(), 2);
}

#[tokio::test]
async fn successful_transaction_commits() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());
    let model = todos();

    let updated = db
        .transaction(async |tx| {
            model
                .query()
                .where_eq("id", 1_i64)
                .update::<Todo>(tx, Values::new().set("title", "renamed"))
                .await
        })
        .await
        .unwrap();

    assert!(updated.is_empty());
    assert_eq!(
        pool.statements(),
        vec![
            "BEGIN",
            "UPDATE todos SET title = $1 WHERE (id = $2) RETURNING *",
            "COMMIT",
        ]
    );
    assert_eq!(pool.available(), 1);
    assert_eq!(pool.discarded(), 0);
}

#[tokio::test]
async fn usage_error_rolls_back_before_any_statement() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());
    let model = todos();

    let err = db
        .transaction(async |tx| {
            model
                .query()
                .update::<Todo>(tx, Values::new().set("id", 9_i64))
                .await
        })
        .await
        .unwrap_err();

    assert!(matches!(err, OrmError::Usage(UsageError::MissingData(_))));
    assert_eq!(pool.statements(), vec!["BEGIN", "ROLLBACK"]);
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn commit_and_rollback_are_noops_once_finished() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());

    let tx = db.begin().await.unwrap();
    assert_eq!(tx.state().await, TransactionState::Active);
    assert_eq!(pool.available(), 0);

    tx.commit().await.unwrap();
    tx.commit().await.unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(tx.state().await, TransactionState::Committed);
    assert_eq!(pool.statements(), vec!["BEGIN", "COMMIT"]);
    assert_eq!(pool.available(), 1);

    let err = tx.fetch("SELECT 1", &ParamList::new()).await.unwrap_err();
    assert!(matches!(
        err,
        OrmError::TransactionState(TransactionState::Committed)
    ));

    drop(tx);
    assert_eq!(pool.available(), 1);
    assert_eq!(pool.discarded(), 0);
}

#[tokio::test]
async fn dropping_active_transaction_discards_connection() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());

    let tx = db.begin().await.unwrap();
    todos().query().get_all::<Todo>(&tx).await.unwrap();
    drop(tx);

    assert_eq!(pool.discarded(), 1);
    assert_eq!(pool.available(), 1);
    assert_eq!(pool.statements(), vec!["BEGIN", "SELECT * FROM todos"]);
}

#[tokio::test]
async fn cancelled_transaction_releases_connection() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        db.transaction(async |_tx| {
            std::future::pending::<()>().await;
            Ok(())
        }),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(pool.available(), 1);
    assert_eq!(pool.discarded(), 1);
    assert_eq!(pool.statements(), vec!["BEGIN"]);
}

#[tokio::test]
async fn nested_transaction_uses_savepoint() {
    let pool = MockPool::new(1).fail_on("DELETE");
    let db = Database::new(pool.clone());
    let model = todos();

    db.transaction(async |tx| {
        let inner = tx
            .transaction(async |tx| model.query().delete::<Todo>(tx).await)
            .await;
        assert!(inner.is_err());

        model
            .query()
            .where_eq("id", 1_i64)
            .update::<Todo>(tx, Values::new().set("done", true))
            .await?;
        Ok(())
    })
    .await
    .unwrap();

    let statements = pool.statements();
    assert_eq!(statements.len(), 6);
    assert_eq!(statements[0], "BEGIN");
    assert!(statements[1].starts_with("SAVEPOINT pgmodel_sp_"));
    assert_eq!(statements[2], "DELETE FROM todos RETURNING *");
    let name = statements[1].trim_start_matches("SAVEPOINT ");
    assert_eq!(statements[3], format!("ROLLBACK TO SAVEPOINT {name}"));
    assert!(statements[4].starts_with("UPDATE todos SET done = $1"));
    assert_eq!(statements[5], "COMMIT");
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn nested_success_releases_savepoint() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());

    let tx = db.begin().await.unwrap();
    let n = tx
        .transaction(async |tx| todos().query().count(tx).await)
        .await
        .unwrap();
    assert_eq!(n, 0);
    tx.rollback().await.unwrap();

    let statements = pool.statements();
    let name = statements[1].trim_start_matches("SAVEPOINT ").to_string();
    assert_eq!(statements[2], "SELECT COUNT(*) AS total FROM todos");
    assert_eq!(statements[3], format!("RELEASE SAVEPOINT {name}"));
    assert_eq!(statements[4], "ROLLBACK");
    assert_eq!(tx.state().await, TransactionState::RolledBack);
}

#[tokio::test]
async fn begin_with_options() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());

    let opts = TransactionOptions::new()
        .isolation_level(TransactionIsolation::Serializable)
        .read_only(true);
    db.transaction_with(opts, async |_tx| Ok(())).await.unwrap();

    assert_eq!(
        pool.statements(),
        vec!["BEGIN ISOLATION LEVEL SERIALIZABLE, READ ONLY", "COMMIT"]
    );
}

#[tokio::test]
async fn failed_begin_releases_and_reports() {
    let pool = MockPool::new(1).fail_on("BEGIN");
    let db = Database::new(pool.clone());

    let err = db.begin().await.unwrap_err();
    assert_eq!(err.sql(), Some("BEGIN"));
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn exhausted_pool_is_acquisition_error() {
    let pool = MockPool::new(1);
    let db = Database::new(pool.clone());

    let held = db.begin().await.unwrap();
    let err = db.begin().await.unwrap_err();
    assert!(matches!(err, OrmError::Acquisition { .. }));
    assert!(err.is_retryable());

    held.rollback().await.unwrap();
    assert!(db.begin().await.is_ok());
}
