//! Integration tests for the credential store.

mod common;

use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tally_core::auth::{AuthOutcome, ITERATIONS, PasswordRecord, Role};
use tally_db::entities::accounts;
use tally_db::repositories::credential::FALLBACK_ADMIN_PASSWORD;
use tally_db::repositories::{CredentialError, NewAccount, SeedOutcome};
use tally_db::{CredentialStore, Store, Visibility};
use tally_shared::AppError;
use tally_shared::types::AccountId;

use common::{exec, fast_retry, memory_store};

fn new_account(username: &str, password: &str) -> NewAccount {
    NewAccount {
        username: username.to_string(),
        display_name: String::new(),
        role: Role::Staff,
        password: password.to_string(),
    }
}

/// Inserts an account the way an older release stored it.
async fn insert_raw(
    store: &Store,
    username: &str,
    hash: Option<&str>,
    legacy: Option<&str>,
) -> accounts::Model {
    let now = chrono::Utc::now();
    accounts::ActiveModel {
        username: Set(username.to_string()),
        display_name: Set(username.to_string()),
        role: Set("admin".to_string()),
        password_hash: Set(hash.map(str::to_string)),
        legacy_password: Set(legacy.map(str::to_string)),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(store.connection())
    .await
    .expect("Failed to insert account")
}

async fn reload(store: &Store, id: i64) -> accounts::Model {
    accounts::Entity::find_by_id(id)
        .one(store.connection())
        .await
        .expect("Failed to read account")
        .expect("Account should exist")
}

async fn audit_count(store: &Store, id: i64) -> u64 {
    store
        .audit
        .count_for("accounts", id)
        .await
        .expect("Failed to count audit entries")
}

#[tokio::test]
async fn test_create_account_and_login() {
    let store = memory_store().await;
    let account = store
        .credentials
        .create_account(new_account("bob", "correct horse"), "admin")
        .await
        .expect("Failed to create account");

    assert_eq!(account.display_name, "bob");
    let record = PasswordRecord::parse(account.password_hash.as_deref().unwrap())
        .expect("Stored hash should parse");
    assert_eq!(record.iterations(), ITERATIONS);

    let outcome = store
        .credentials
        .login("bob", "correct horse")
        .await
        .expect("Login failed");
    let principal = outcome.principal().expect("Should authenticate");
    assert_eq!(principal.account_id, AccountId::new(account.id));
    assert_eq!(principal.role, Role::Staff);

    let denied = store
        .credentials
        .login("bob", "wrong horse")
        .await
        .expect("Login failed");
    assert_eq!(denied, AuthOutcome::Denied);
}

#[tokio::test]
async fn test_same_password_gets_distinct_hashes() {
    let store = memory_store().await;
    let a = store
        .credentials
        .create_account(new_account("a", "shared"), "admin")
        .await
        .unwrap();
    let b = store
        .credentials
        .create_account(new_account("b", "shared"), "admin")
        .await
        .unwrap();
    assert_ne!(a.password_hash, b.password_hash);
}

#[tokio::test]
async fn test_unknown_and_inactive_users_are_denied_alike() {
    let store = memory_store().await;
    let carol = store
        .credentials
        .create_account(new_account("carol", "pw"), "admin")
        .await
        .unwrap();
    store
        .audit
        .soft_delete("accounts", carol.id, "admin")
        .await
        .expect("Failed to deactivate");

    let inactive = store.credentials.login("carol", "pw").await.unwrap();
    let unknown = store.credentials.login("nobody", "pw").await.unwrap();
    assert_eq!(inactive, AuthOutcome::Denied);
    assert_eq!(unknown, AuthOutcome::Denied);

    // Callers that propagate see one indistinct failure.
    assert!(matches!(inactive.require(), Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_malformed_hash_denies_without_error() {
    let store = memory_store().await;
    insert_raw(&store, "mallory", Some("$argon2id$v=19$garbage"), None).await;
    insert_raw(&store, "md5", Some("5f4dcc3b5aa765d61d8327deb882cf99"), None).await;

    for username in ["mallory", "md5"] {
        let outcome = store.credentials.login(username, "password").await;
        assert_eq!(outcome.expect("Malformed hash must not error"), AuthOutcome::Denied);
    }
}

#[tokio::test]
async fn test_legacy_plaintext_is_migrated_once() {
    let store = memory_store().await;
    let legacy = insert_raw(&store, "dave", None, Some("hunter2")).await;

    // Wrong password: nothing changes.
    let outcome = store.credentials.login("dave", "hunter3").await.unwrap();
    assert_eq!(outcome, AuthOutcome::Denied);
    assert_eq!(reload(&store, legacy.id).await, legacy);
    assert_eq!(audit_count(&store, legacy.id).await, 0);

    // Right password: authenticated and migrated in the same call.
    let outcome = store.credentials.login("dave", "hunter2").await.unwrap();
    assert!(outcome.principal().is_some());

    let migrated = reload(&store, legacy.id).await;
    assert!(migrated.legacy_password.is_none());
    assert!(PasswordRecord::parse(migrated.password_hash.as_deref().unwrap()).is_ok());

    let history = store.audit.history("accounts", legacy.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, "UPDATE");
    assert_eq!(history[0].actor, "dave");

    // Later logins go through the hash and write nothing.
    let again = store.credentials.login("dave", "hunter2").await.unwrap();
    assert!(again.principal().is_some());
    assert_eq!(audit_count(&store, legacy.id).await, 1);
    assert_eq!(reload(&store, legacy.id).await, migrated);
}

#[tokio::test]
async fn test_audit_snapshots_never_contain_secrets() {
    let store = memory_store().await;
    let legacy = insert_raw(&store, "erin", None, Some("plain-secret")).await;
    store.credentials.login("erin", "plain-secret").await.unwrap();
    store
        .credentials
        .change_password(AccountId::new(legacy.id), "n3w-secret", "erin")
        .await
        .unwrap();

    for entry in store.audit.entries_for_table("accounts").await.unwrap() {
        for text in [&entry.before_snapshot, &entry.after_snapshot].into_iter().flatten() {
            assert!(!text.contains("plain-secret"));
            assert!(!text.contains("password"));
            assert!(!text.contains("$argon2id$"));
        }
    }
}

#[tokio::test]
async fn test_change_password() {
    let store = memory_store().await;
    let legacy = insert_raw(&store, "frank", None, Some("old")).await;

    let updated = store
        .credentials
        .change_password(AccountId::new(legacy.id), "new", "admin")
        .await
        .expect("Failed to change password");
    assert!(updated.legacy_password.is_none());

    assert_eq!(
        store.credentials.login("frank", "old").await.unwrap(),
        AuthOutcome::Denied
    );
    assert!(store.credentials.login("frank", "new").await.unwrap().principal().is_some());

    let missing = store
        .credentials
        .change_password(AccountId::new(9999), "x", "admin")
        .await;
    assert!(matches!(missing, Err(CredentialError::AccountNotFound(_))));
}

#[tokio::test]
async fn test_account_input_validation() {
    let store = memory_store().await;
    store
        .credentials
        .create_account(new_account("grace", "pw"), "admin")
        .await
        .unwrap();

    let duplicate = store
        .credentials
        .create_account(new_account("grace", "other"), "admin")
        .await;
    assert!(matches!(duplicate, Err(CredentialError::DuplicateUsername(name)) if name == "grace"));

    let blank = store
        .credentials
        .create_account(new_account("  ", "pw"), "admin")
        .await;
    assert!(matches!(blank, Err(CredentialError::InvalidInput(_))));

    let empty = store
        .credentials
        .create_account(new_account("heidi", ""), "admin")
        .await;
    assert!(matches!(empty, Err(CredentialError::InvalidInput(_))));
}

#[tokio::test]
async fn test_list_accounts_visibility() {
    let store = memory_store().await;
    let ivan = store
        .credentials
        .create_account(new_account("ivan", "pw"), "admin")
        .await
        .unwrap();
    store
        .credentials
        .create_account(new_account("judy", "pw"), "admin")
        .await
        .unwrap();
    store.audit.soft_delete("accounts", ivan.id, "admin").await.unwrap();

    let active = store.credentials.list_accounts(Visibility::ActiveOnly).await.unwrap();
    let all = store
        .credentials
        .list_accounts(Visibility::IncludeInactive)
        .await
        .unwrap();
    assert_eq!(active.iter().map(|a| a.username.as_str()).collect::<Vec<_>>(), ["judy"]);
    assert_eq!(all.len(), 2);

    let id = AccountId::new(ivan.id);
    assert!(store.credentials.find_account(id, Visibility::ActiveOnly).await.unwrap().is_none());
    assert!(store
        .credentials
        .find_account(id, Visibility::IncludeInactive)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_seed_admin_creates_once() {
    let store = memory_store().await;

    let first = store.credentials.seed_admin(Some("s3cret")).await.unwrap();
    let second = store.credentials.seed_admin(Some("s3cret")).await.unwrap();
    assert_eq!(first, SeedOutcome::Created);
    assert_eq!(second, SeedOutcome::Unchanged);

    let admin = store
        .credentials
        .find_by_username("admin", Visibility::ActiveOnly)
        .await
        .unwrap()
        .expect("Admin should exist");
    assert_eq!(admin.role, "admin");
    assert_eq!(audit_count(&store, admin.id).await, 1);

    let outcome = store.credentials.login("admin", "s3cret").await.unwrap();
    assert_eq!(outcome.principal().unwrap().role, Role::Admin);
}

#[tokio::test]
async fn test_seed_admin_without_override_uses_fallback() {
    let store = memory_store().await;
    assert_eq!(store.credentials.seed_admin(None).await.unwrap(), SeedOutcome::Created);
    assert!(store
        .credentials
        .login("admin", FALLBACK_ADMIN_PASSWORD)
        .await
        .unwrap()
        .principal()
        .is_some());
}

#[tokio::test]
async fn test_seed_admin_never_overwrites_real_hash() {
    let store = memory_store().await;
    store.credentials.seed_admin(Some("original")).await.unwrap();

    let outcome = store.credentials.seed_admin(Some("replacement")).await.unwrap();
    assert_eq!(outcome, SeedOutcome::Unchanged);
    assert!(store.credentials.login("admin", "original").await.unwrap().principal().is_some());
    assert_eq!(
        store.credentials.login("admin", "replacement").await.unwrap(),
        AuthOutcome::Denied
    );
}

#[tokio::test]
async fn test_seed_admin_upgrades_empty_hash() {
    let store = memory_store().await;
    let admin = insert_raw(&store, "admin", Some(""), None).await;

    let outcome = store.credentials.seed_admin(Some("fresh")).await.unwrap();
    assert_eq!(outcome, SeedOutcome::Upgraded);
    assert!(store.credentials.login("admin", "fresh").await.unwrap().principal().is_some());

    let history = store.audit.history("accounts", admin.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, "UPDATE");
}

#[tokio::test]
async fn test_seed_admin_with_no_credential_gets_fallback() {
    let store = memory_store().await;
    insert_raw(&store, "admin", None, None).await;

    assert_eq!(store.credentials.seed_admin(None).await.unwrap(), SeedOutcome::Upgraded);
    assert!(store
        .credentials
        .login("admin", FALLBACK_ADMIN_PASSWORD)
        .await
        .unwrap()
        .principal()
        .is_some());
}

#[tokio::test]
async fn test_seed_admin_leaves_legacy_plaintext_for_login() {
    let store = memory_store().await;
    let admin = insert_raw(&store, "admin", Some(""), Some("legacy-pw")).await;

    assert_eq!(store.credentials.seed_admin(None).await.unwrap(), SeedOutcome::Unchanged);
    assert_eq!(reload(&store, admin.id).await, admin);

    // The first login performs the migration instead.
    assert!(store.credentials.login("admin", "legacy-pw").await.unwrap().principal().is_some());
    assert!(reload(&store, admin.id).await.legacy_password.is_none());
}

#[tokio::test]
async fn test_custom_admin_username() {
    let store = memory_store().await;
    let credentials = CredentialStore::new(store.connection().clone(), fast_retry())
        .with_admin_username("root");
    credentials.seed_admin(Some("toor")).await.unwrap();

    assert!(credentials.login("root", "toor").await.unwrap().principal().is_some());
    exec(store.connection(), "UPDATE accounts SET role = 'superuser' WHERE username = 'root'").await;
    // An unrecognized role cannot yield a principal.
    assert_eq!(credentials.login("root", "toor").await.unwrap(), AuthOutcome::Denied);
}
