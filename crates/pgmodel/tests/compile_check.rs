//! Compile-only tests for core API patterns.
//!
//! These tests verify that key API surfaces compile correctly.
//! They do NOT execute against a database; they only check types and signatures.

#![allow(dead_code)]

use pgmodel::prelude::*;
use pgmodel::{PgConnection, Transaction, TransactionOptions};

#[derive(Debug, Clone, FromRow)]
struct CompileTodo {
    id: i64,
    title: String,
    #[orm(column = "is_done")]
    done: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    description: Option<String>,
}

#[derive(Debug, FromRow)]
struct CompileCount {
    total: i64,
}

fn todos() -> Model {
    Model::new("compile_todos")
        .primary_key("id")
        .fillable(["title", "description", "is_done"])
}

async fn _autocommit_reads(db: &Database<PgPool>) -> OrmResult<()> {
    let _: Option<CompileTodo> = todos().find(db, 1_i64).await?;
    let _: Vec<CompileTodo> = todos()
        .query()
        .where_op("created_at", Op::Gte, chrono::Utc::now())
        .order_by("created_at", Order::Desc)
        .get_all(db)
        .await?;
    let _: Page<CompileTodo> = todos().query().paginate(db, 1, 15).await?;
    let _: Vec<CompileCount> = todos()
        .select_raw(db, "SELECT COUNT(*) AS total FROM compile_todos", params![])
        .await?;
    Ok(())
}

async fn _transactional_writes(db: &Database<PgPool>) -> OrmResult<CompileTodo> {
    db.transaction(async |tx: &Transaction<PgConnection>| {
        let todo: CompileTodo = todos()
            .insert(
                tx,
                Values::new()
                    .set("title", "compile")
                    .set_opt("description", None::<String>),
            )
            .await?;
        todos()
            .query()
            .where_eq("id", todo.id)
            .update::<CompileTodo>(tx, Values::new().set("is_done", true))
            .await?;
        tx.transaction(async |tx| {
            todos()
                .query()
                .where_in("id", [todo.id])
                .delete::<CompileTodo>(tx)
                .await
        })
        .await?;
        Ok(todo)
    })
    .await
}

async fn _begin_with_options(db: &Database<PgPool>) -> OrmResult<()> {
    let opts = TransactionOptions::new().read_only(true).deferrable(true);
    let tx = db.begin_with(opts).await?;
    let _ = todos().query().count(&tx).await?;
    tx.rollback().await
}

fn _executor_is_generic<E: Executor>(_exec: &E) {}

#[test]
fn compile_builder_chain() {
    let q = todos()
        .query()
        .select(["id", "title"])
        .where_not_null("title")
        .group_by(["id", "title"])
        .to_sql();
    assert!(q.is_ok());
}
