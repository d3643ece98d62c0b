//! End-to-end tests for the `potluck` binary.
//!
//! Config-file commands run against a temporary `XDG_CONFIG_HOME`; database
//! commands run against an isolated temporary database passed with
//! `--database-url`.

use std::path::Path;
use std::process::Output;

use chrono::Duration;
use tokio::process::Command;

use potluck_db::models::{MealName, MealPlanStatus};
use potluck_db::queries::{grocery_list_items, meal_plans};
use potluck_test_utils::fixtures::{self, Line};
use potluck_test_utils::{create_test_db, database_url, drop_test_db};

async fn potluck(config_home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_potluck"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home)
        .env_remove("POTLUCK_DATABASE_URL")
        .env("RUST_LOG", "warn")
        .output()
        .await
        .expect("failed to run potluck binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[tokio::test]
async fn init_writes_config_and_refuses_to_overwrite() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("potluck").join("config.toml");

    let first = potluck(tmp.path(), &["init", "--db-url", "postgresql://h:5432/meals"]).await;
    assert!(first.status.success(), "init failed: {}", stderr(&first));
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("postgresql://h:5432/meals"), "{contents}");
    assert!(contents.contains("[worker]"), "{contents}");

    let second = potluck(tmp.path(), &["init"]).await;
    assert!(!second.status.success());
    assert!(stderr(&second).contains("already exists"), "{}", stderr(&second));

    let forced = potluck(tmp.path(), &["init", "--force"]).await;
    assert!(forced.status.success(), "init --force failed: {}", stderr(&forced));
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("postgresql://localhost:5432/potluck"), "{contents}");
}

#[tokio::test]
async fn completions_are_printed() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = potluck(tmp.path(), &["completions", "bash"]).await;
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("potluck"));
}

#[tokio::test]
async fn finalize_then_show_grocery_list() {
    let (pool, db_name) = create_test_db().await;
    let url = database_url(&db_name).await;
    let tmp = tempfile::TempDir::new().unwrap();

    let (household, members) = fixtures::household(&pool, 1).await;
    let rice = fixtures::ingredient(&pool, "rice").await;
    let grams = fixtures::unit(&pool, "gram").await;
    let plan = fixtures::plan(&pool, household, Duration::hours(1)).await;
    let event = fixtures::event(&pool, plan.id, MealName::Dinner).await;
    let risotto = fixtures::meal(&pool, "risotto", &[Line::new(rice, grams, 300.0)]).await;
    let curry = fixtures::meal(&pool, "curry", &[Line::new(rice, grams, 200.0)]).await;
    let a = fixtures::option(&pool, event.id, risotto).await;
    let b = fixtures::option(&pool, event.id, curry).await;
    fixtures::ballot(&pool, members[0], &[a.id, b.id]).await;

    let plan_id = plan.id.to_string();
    let output = potluck(
        tmp.path(),
        &["--database-url", &url, "finalize", &plan_id],
    )
    .await;
    assert!(output.status.success(), "finalize failed: {}", stderr(&output));
    assert!(stdout(&output).contains("finalized"), "{}", stdout(&output));

    let stored = meal_plans::get_meal_plan(&pool, plan.id).await.unwrap().unwrap();
    assert_eq!(stored.status, MealPlanStatus::Finalized);
    let items = grocery_list_items::list_grocery_list_items_for_meal_plan(&pool, plan.id)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].minimum_quantity_needed, 300.0);

    let again = potluck(
        tmp.path(),
        &["--database-url", &url, "finalize", &plan_id],
    )
    .await;
    assert!(again.status.success(), "{}", stderr(&again));
    assert!(stdout(&again).contains("already finalized"), "{}", stdout(&again));

    let list = potluck(
        tmp.path(),
        &["grocery-list", &plan_id, "--regenerate", "--database-url", &url],
    )
    .await;
    assert!(list.status.success(), "grocery-list failed: {}", stderr(&list));
    let printed = stdout(&list);
    assert!(printed.contains("1 unchanged"), "{printed}");
    assert!(printed.contains(&rice.to_string()), "{printed}");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn finalize_rejects_bad_and_unknown_ids() {
    let (pool, db_name) = create_test_db().await;
    let url = database_url(&db_name).await;
    let tmp = tempfile::TempDir::new().unwrap();

    let bad = potluck(tmp.path(), &["--database-url", &url, "finalize", "not-a-uuid"]).await;
    assert!(!bad.status.success());
    assert!(stderr(&bad).contains("invalid plan ID"), "{}", stderr(&bad));

    let missing_id = uuid::Uuid::new_v4().to_string();
    let missing = potluck(tmp.path(), &["--database-url", &url, "finalize", &missing_id]).await;
    assert!(!missing.status.success());
    assert!(stderr(&missing).contains("not found"), "{}", stderr(&missing));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn sweep_finalizes_overdue_plans() {
    let (pool, db_name) = create_test_db().await;
    let url = database_url(&db_name).await;
    let tmp = tempfile::TempDir::new().unwrap();

    let (household, _) = fixtures::household(&pool, 2).await;
    let overdue = fixtures::plan(&pool, household, Duration::minutes(-5)).await;
    let event = fixtures::event(&pool, overdue.id, MealName::Lunch).await;
    let meal = fixtures::meal(&pool, "soup", &[]).await;
    fixtures::option(&pool, event.id, meal).await;
    let open = fixtures::plan(&pool, household, Duration::days(1)).await;

    let output = potluck(tmp.path(), &["--database-url", &url, "sweep"]).await;
    assert!(output.status.success(), "sweep failed: {}", stderr(&output));
    assert!(stdout(&output).contains("finalized=1"), "{}", stdout(&output));

    let overdue = meal_plans::get_meal_plan(&pool, overdue.id).await.unwrap().unwrap();
    assert_eq!(overdue.status, MealPlanStatus::Finalized);
    let open = meal_plans::get_meal_plan(&pool, open.id).await.unwrap().unwrap();
    assert_eq!(open.status, MealPlanStatus::AwaitingVotes);

    pool.close().await;
    drop_test_db(&db_name).await;
}
