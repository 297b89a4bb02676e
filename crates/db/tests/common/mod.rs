//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, Statement};
use tally_db::{RetryPolicy, Store};
use tally_shared::AppConfig;
use tally_shared::types::{Amount, ItemId};
use tally_db::repositories::NewItem;

/// Retry budget small enough to keep failing tests fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(5, Duration::from_millis(5), Duration::from_millis(50))
}

/// Fresh in-memory database with the schema applied.
pub async fn memory_store() -> Store {
    memory_store_with(AppConfig::default()).await
}

/// Fresh in-memory database with the schema applied, using `config`.
pub async fn memory_store_with(config: AppConfig) -> Store {
    let db = tally_db::connect_in_memory()
        .await
        .expect("Failed to open in-memory database");
    Store::from_connection(db, &config)
        .await
        .expect("Failed to migrate schema")
}

/// Runs raw SQL, bypassing the repositories.
pub async fn exec(db: &DatabaseConnection, sql: &str) {
    db.execute_unprepared(sql)
        .await
        .unwrap_or_else(|e| panic!("Failed to run `{sql}`: {e}"));
}

/// Runs a query returning one integer column.
pub async fn query_i64(db: &DatabaseConnection, sql: &str) -> i64 {
    let row = db
        .query_one(Statement::from_string(DbBackend::Sqlite, sql))
        .await
        .expect("Query failed")
        .expect("Query returned no row");
    row.try_get_by_index::<i64>(0).expect("Column is not an integer")
}

/// Runs a query returning one text column per row.
pub async fn query_strings(db: &DatabaseConnection, sql: &str) -> Vec<String> {
    db.query_all(Statement::from_string(DbBackend::Sqlite, sql))
        .await
        .expect("Query failed")
        .into_iter()
        .map(|row| {
            row.try_get_by_index::<Option<String>>(0)
                .expect("Column is not text")
                .unwrap_or_default()
        })
        .collect()
}

/// Item input with sensible defaults.
pub fn new_item(name: &str, price: &str) -> NewItem {
    NewItem {
        name: name.to_string(),
        unit: "bottle".to_string(),
        unit_price: Amount::lenient(price),
        min_threshold: 2,
    }
}

/// Item id of a created row.
pub fn item_id(model: &tally_db::entities::inventory_items::Model) -> ItemId {
    ItemId::new(model.id)
}
