//! Concurrent access tests against a file database.
//!
//! These tests verify that:
//! - Two overdrawing movements racing on one item cannot both succeed
//! - Many concurrent movements leave a balance equal to the movement sum
//! - A legacy password is migrated exactly once under concurrent logins
//! - Racing creates of one name yield one row and domain duplicate errors

use std::sync::Arc;

use futures::future::join_all;
use sea_orm::{ActiveModelTrait, Set};
use tally_core::inventory::MovementKind;
use tally_db::{Store, Visibility};
use tally_db::entities::accounts;
use tally_core::auth::Role;
use tally_db::repositories::{
    CredentialError, InventoryError, MovementRequest, NewAccount, NewItem,
};
use tally_shared::AppConfig;
use tally_shared::config::{DatabaseConfig, RetryConfig};
use tally_shared::types::{Amount, ItemId};
use tempfile::TempDir;
use tokio::sync::Barrier;

async fn file_store(dir: &TempDir) -> Store {
    let path = dir.path().join("tally.db");
    let config = AppConfig {
        database: DatabaseConfig {
            path: path.to_string_lossy().into_owned(),
            max_connections: 8,
            busy_timeout_ms: 5_000,
        },
        retry: RetryConfig {
            max_retries: 10,
            min_delay_ms: 5,
            max_delay_ms: 100,
        },
        ..AppConfig::default()
    };
    Store::open(&config).await.expect("Failed to open file store")
}

async fn stocked_item(store: &Store, name: &str, quantity: i64) -> ItemId {
    let item = store
        .inventory
        .create_item(
            NewItem {
                name: name.to_string(),
                unit: "unit".to_string(),
                unit_price: Amount::lenient("1"),
                min_threshold: 0,
            },
            "setup",
        )
        .await
        .expect("Failed to create item");
    let id = ItemId::new(item.id);
    store
        .inventory
        .record_movement(&MovementRequest {
            item_id: id,
            kind: MovementKind::In,
            quantity,
            reason: "opening".to_string(),
            actor: "setup".to_string(),
        })
        .await
        .expect("Failed to stock item");
    id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overdraw_only_one_succeeds() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = file_store(&dir).await;
    let id = stocked_item(&store, "Thin stock", 5).await;

    let barrier = Arc::new(Barrier::new(2));
    let tasks = (0..2).map(|n| {
        let inventory = store.inventory.clone();
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            inventory
                .record_movement(&MovementRequest {
                    item_id: id,
                    kind: MovementKind::Out,
                    quantity: 4,
                    reason: format!("sale {n}"),
                    actor: "clerk".to_string(),
                })
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("Task panicked"))
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(InventoryError::InsufficientStock { available: 1, .. })))
        .count();
    assert_eq!(succeeded, 1, "results: {results:?}");
    assert_eq!(rejected, 1, "results: {results:?}");

    let outcome = store.inventory.reconcile(id).await.unwrap();
    assert!(outcome.is_consistent());
    let movements = store.inventory.movements(id).await.unwrap();
    assert_eq!(movements.iter().map(|m| m.delta).sum::<i64>(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_movements_keep_balance_derivable() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = file_store(&dir).await;
    let id = stocked_item(&store, "Busy item", 100).await;

    let tasks = (0..40).map(|n| {
        let inventory = store.inventory.clone();
        tokio::spawn(async move {
            let kind = if n % 2 == 0 {
                MovementKind::In
            } else {
                MovementKind::Out
            };
            inventory
                .record_movement(&MovementRequest {
                    item_id: id,
                    kind,
                    quantity: 3,
                    reason: format!("move {n}"),
                    actor: "clerk".to_string(),
                })
                .await
        })
    });
    for joined in join_all(tasks).await {
        joined
            .expect("Task panicked")
            .expect("Movement should succeed with ample stock");
    }

    let item = store
        .inventory
        .find_item(id, tally_db::Visibility::ActiveOnly)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.quantity, 100);
    assert!(store.inventory.reconcile(id).await.unwrap().is_consistent());
    assert_eq!(store.inventory.movements(id).await.unwrap().len(), 41);
    assert_eq!(
        store.audit.count_for("inventory_items", id.into_inner()).await.unwrap(),
        42
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_legacy_logins_migrate_once() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = file_store(&dir).await;
    let now = chrono::Utc::now();
    let account = accounts::ActiveModel {
        username: Set("olivia".to_string()),
        display_name: Set("Olivia".to_string()),
        role: Set("manager".to_string()),
        password_hash: Set(None),
        legacy_password: Set(Some("letmein".to_string())),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(store.connection())
    .await
    .expect("Failed to insert legacy account");

    let barrier = Arc::new(Barrier::new(4));
    let tasks = (0..4).map(|_| {
        let credentials = store.credentials.clone();
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            credentials.login("olivia", "letmein").await
        })
    });
    for joined in join_all(tasks).await {
        let outcome = joined.expect("Task panicked").expect("Login failed");
        assert!(outcome.principal().is_some());
    }

    let history = store.audit.history("accounts", account.id).await.unwrap();
    let updates = history.iter().filter(|e| e.action == "UPDATE").count();
    assert_eq!(updates, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_item_creates_report_duplicate_name() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = file_store(&dir).await;

    let barrier = Arc::new(Barrier::new(4));
    let tasks = (0..4).map(|_| {
        let inventory = store.inventory.clone();
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            inventory
                .create_item(
                    NewItem {
                        name: "Racing name".to_string(),
                        unit: "unit".to_string(),
                        unit_price: Amount::lenient("2"),
                        min_threshold: 0,
                    },
                    "clerk",
                )
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("Task panicked"))
        .collect();

    let created = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(InventoryError::DuplicateName(name)) if name == "Racing name"))
        .count();
    assert_eq!(created, 1, "results: {results:?}");
    assert_eq!(duplicates, 3, "results: {results:?}");

    let items = store
        .inventory
        .list_items(Visibility::IncludeInactive)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(
        store
            .audit
            .count_for("inventory_items", items[0].id)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_account_creates_report_duplicate_username() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = file_store(&dir).await;

    let barrier = Arc::new(Barrier::new(3));
    let tasks = (0..3).map(|n| {
        let credentials = store.credentials.clone();
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            credentials
                .create_account(
                    NewAccount {
                        username: "mallory".to_string(),
                        display_name: String::new(),
                        role: Role::Staff,
                        password: format!("pw-{n}"),
                    },
                    "admin",
                )
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("Task panicked"))
        .collect();

    let created = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(CredentialError::DuplicateUsername(name)) if name == "mallory"))
        .count();
    assert_eq!(created, 1, "results: {results:?}");
    assert_eq!(duplicates, 2, "results: {results:?}");
}
