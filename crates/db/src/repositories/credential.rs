//! Credential store: accounts, login, and the legacy plaintext migration.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tally_core::audit::{AuditAction, SoftDeleteTable};
use tally_core::auth::{
    AuthOutcome, PasswordError, PasswordRecord, Principal, Role, Verification, hash_password,
    legacy_password_matches, verify_decoy, verify_password,
};
use tally_shared::AppError;
use tally_shared::types::AccountId;
use tracing::{debug, info, warn};

use super::audit::{NewAuditEntry, append, snapshot};
use super::soft_delete::lock_row;
use super::{SYSTEM_ACTOR, Visibility, actor_or_system, is_unique_violation};
use crate::entities::accounts;
use crate::retry::{RetryPolicy, Transient, is_transient};

/// Username of the seeded administrator.
pub const ADMIN_USERNAME: &str = "admin";

/// Password seeded when no override is configured. Meant to be changed on
/// first login.
pub const FALLBACK_ADMIN_PASSWORD: &str = "admin";

const ACCOUNTS: &str = SoftDeleteTable::Accounts.table_name();

/// Error types for credential operations.
///
/// Rejected credentials are not errors: `login` returns
/// [`AuthOutcome::Denied`] for them.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Username already taken.
    #[error("Username '{0}' already exists")]
    DuplicateUsername(String),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Rejected input, such as an empty username or password.
    #[error("Invalid account input: {0}")]
    InvalidInput(String),

    /// Hashing failed.
    #[error(transparent)]
    Password(#[from] PasswordError),

    /// Row could not be serialized into a snapshot.
    #[error("Snapshot serialization failed: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Write lock still contended after every retry.
    #[error("Store busy after {attempts} attempts")]
    Busy {
        /// Attempts made.
        attempts: usize,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl Transient for CredentialError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Database(e) if is_transient(e))
    }

    fn exhausted(self, attempts: usize) -> Self {
        Self::Busy { attempts }
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::DuplicateUsername(_) => Self::Conflict(err.to_string()),
            CredentialError::AccountNotFound(_) => Self::NotFound(err.to_string()),
            CredentialError::InvalidInput(_) => Self::Validation(err.to_string()),
            CredentialError::Password(_) | CredentialError::Snapshot(_) => {
                Self::Internal(err.to_string())
            }
            CredentialError::Busy { .. } => Self::TransientLock(err.to_string()),
            CredentialError::Database(_) => Self::Database(err.to_string()),
        }
    }
}

/// Input for creating an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// Login name, unique.
    pub username: String,
    /// Name shown to other users. Defaults to the username when blank.
    pub display_name: String,
    /// Granted role.
    pub role: Role,
    /// Plaintext password, hashed before it is stored.
    pub password: String,
}

/// What `seed_admin` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// The administrator account was inserted.
    Created,
    /// An existing account without a usable hash received one.
    Upgraded,
    /// Nothing to do.
    Unchanged,
}

/// Credential store over the `accounts` table.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    db: DatabaseConnection,
    retry: RetryPolicy,
    admin_username: String,
}

impl CredentialStore {
    /// Creates a new credential store.
    #[must_use]
    pub fn new(db: DatabaseConnection, retry: RetryPolicy) -> Self {
        Self {
            db,
            retry,
            admin_username: ADMIN_USERNAME.to_string(),
        }
    }

    /// Seeds a different administrator username.
    #[must_use]
    pub fn with_admin_username(mut self, username: impl Into<String>) -> Self {
        self.admin_username = username.into();
        self
    }

    /// Authenticates a username and password.
    ///
    /// An account with a hash is verified against it. An account that only
    /// has a legacy plaintext is compared in constant time and, on success,
    /// migrated to a hash in the same call. Unknown users, inactive accounts,
    /// wrong passwords and malformed records all yield `Denied`.
    ///
    /// # Errors
    ///
    /// Returns an error only for storage failures.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthOutcome, CredentialError> {
        let account = accounts::Entity::find()
            .filter(accounts::Column::Username.eq(username))
            .filter(accounts::Column::Active.eq(true))
            .one(&self.db)
            .await?;

        let Some(account) = account else {
            // Same cost as a real verification.
            verify_decoy(password);
            return Ok(AuthOutcome::Denied);
        };

        if let Some(hash) = account.stored_hash() {
            return Ok(check_hash(&account, hash, password));
        }

        match account.stored_legacy_password() {
            Some(stored) if legacy_password_matches(password, stored) => {
                let id = account.id;
                self.retry
                    .run("login.migrate_legacy", || {
                        self.migrate_legacy_once(id, password)
                    })
                    .await
            }
            Some(_) => {
                // Keep the failure path as slow as a hash check.
                verify_decoy(password);
                Ok(AuthOutcome::Denied)
            }
            None => {
                warn!(account_id = account.id, "Account has no usable credential");
                verify_decoy(password);
                Ok(AuthOutcome::Denied)
            }
        }
    }

    /// Replaces a verified legacy plaintext with a hash.
    async fn migrate_legacy_once(
        &self,
        id: i64,
        password: &str,
    ) -> Result<AuthOutcome, CredentialError> {
        let txn = self.db.begin().await?;
        if !lock_row::<accounts::Entity, _>(&txn, id).await? {
            return Ok(AuthOutcome::Denied);
        }
        let Some(account) = accounts::Entity::find_by_id(id).one(&txn).await? else {
            return Ok(AuthOutcome::Denied);
        };
        if !account.active {
            return Ok(AuthOutcome::Denied);
        }

        // A concurrent login already migrated this account.
        if let Some(hash) = account.stored_hash() {
            return Ok(check_hash(&account, hash, password));
        }
        let Some(stored) = account.stored_legacy_password() else {
            return Ok(AuthOutcome::Denied);
        };
        if !legacy_password_matches(password, stored) {
            return Ok(AuthOutcome::Denied);
        }

        let actor = account.username.clone();
        let updated = store_hash(&txn, account, hash_password(password)?, &actor).await?;
        txn.commit().await?;

        info!(account_id = updated.id, "Legacy password migrated to hash");
        Ok(principal(&updated).map_or(AuthOutcome::Denied, AuthOutcome::Authenticated))
    }

    /// Ensures the administrator account exists with a usable hash.
    ///
    /// - Absent: inserted with the override password, or the fallback.
    /// - Present with an empty or unparsable hash: given the override's hash.
    ///   With no override, an account that still has a legacy plaintext is
    ///   left for its first login to migrate, and one with no credential at
    ///   all receives the fallback.
    /// - Present with a real hash: never touched.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing or the database write fails.
    pub async fn seed_admin(
        &self,
        admin_password: Option<&str>,
    ) -> Result<SeedOutcome, CredentialError> {
        let admin_password = admin_password.filter(|p| !p.is_empty());
        let outcome = self
            .retry
            .run("seed_admin", || self.seed_admin_once(admin_password))
            .await?;

        match outcome {
            SeedOutcome::Created => {
                info!(username = %self.admin_username, "Administrator account created");
            }
            SeedOutcome::Upgraded => {
                info!(username = %self.admin_username, "Administrator password hash installed");
            }
            SeedOutcome::Unchanged => {
                debug!(username = %self.admin_username, "Administrator account already seeded");
            }
        }
        Ok(outcome)
    }

    async fn seed_admin_once(
        &self,
        admin_password: Option<&str>,
    ) -> Result<SeedOutcome, CredentialError> {
        let txn = self.db.begin().await?;
        let existing = accounts::Entity::find()
            .filter(accounts::Column::Username.eq(self.admin_username.as_str()))
            .one(&txn)
            .await?;

        let Some(account) = existing else {
            let password = admin_password.unwrap_or_else(|| {
                warn!("No administrator password configured, seeding the fallback");
                FALLBACK_ADMIN_PASSWORD
            });
            let inserted = insert_account(
                &txn,
                &self.admin_username,
                &self.admin_username,
                Role::Admin,
                hash_password(password)?,
                SYSTEM_ACTOR,
            )
            .await;
            return match inserted {
                Ok(_) => {
                    txn.commit().await?;
                    Ok(SeedOutcome::Created)
                }
                // Another process seeded it first.
                Err(CredentialError::Database(db)) if is_unique_violation(&db) => {
                    Ok(SeedOutcome::Unchanged)
                }
                Err(other) => Err(other),
            };
        };

        if has_real_hash(&account) {
            return Ok(SeedOutcome::Unchanged);
        }

        // Re-read under the lock: a concurrent login may have migrated it.
        if !lock_row::<accounts::Entity, _>(&txn, account.id).await? {
            return Ok(SeedOutcome::Unchanged);
        }
        let Some(account) = accounts::Entity::find_by_id(account.id).one(&txn).await? else {
            return Ok(SeedOutcome::Unchanged);
        };
        if has_real_hash(&account) {
            return Ok(SeedOutcome::Unchanged);
        }

        let password = match (admin_password, account.stored_legacy_password()) {
            (Some(password), _) => password,
            (None, Some(_)) => return Ok(SeedOutcome::Unchanged),
            (None, None) => FALLBACK_ADMIN_PASSWORD,
        };
        store_hash(&txn, account, hash_password(password)?, SYSTEM_ACTOR).await?;
        txn.commit().await?;
        Ok(SeedOutcome::Upgraded)
    }

    /// Creates an account with a hashed password.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::InvalidInput` for a blank username or empty
    /// password, and `CredentialError::DuplicateUsername` if the name is taken
    /// by any account, active or not.
    pub async fn create_account(
        &self,
        input: NewAccount,
        actor: &str,
    ) -> Result<accounts::Model, CredentialError> {
        let username = input.username.trim();
        if username.is_empty() {
            return Err(CredentialError::InvalidInput(
                "username must not be blank".to_string(),
            ));
        }
        if input.password.is_empty() {
            return Err(CredentialError::InvalidInput(
                "password must not be empty".to_string(),
            ));
        }
        let display_name = match input.display_name.trim() {
            "" => username,
            name => name,
        };
        let record = hash_password(&input.password)?;

        let account = self
            .retry
            .run("create_account", || async {
                let txn = self.db.begin().await?;
                let taken = accounts::Entity::find()
                    .filter(accounts::Column::Username.eq(username))
                    .one(&txn)
                    .await?;
                if taken.is_some() {
                    return Err(CredentialError::DuplicateUsername(username.to_string()));
                }
                let account = insert_account(
                    &txn,
                    username,
                    display_name,
                    input.role,
                    record.clone(),
                    actor,
                )
                .await
                .map_err(|e| match e {
                    CredentialError::Database(db) if is_unique_violation(&db) => {
                        CredentialError::DuplicateUsername(username.to_string())
                    }
                    other => other,
                })?;
                txn.commit().await?;
                Ok(account)
            })
            .await?;

        info!(account_id = account.id, username = %account.username, role = %account.role, "Account created");
        Ok(account)
    }

    /// Sets a new password and clears any legacy plaintext.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::AccountNotFound` for a missing or inactive
    /// account and `CredentialError::InvalidInput` for an empty password.
    pub async fn change_password(
        &self,
        id: AccountId,
        new_password: &str,
        actor: &str,
    ) -> Result<accounts::Model, CredentialError> {
        if new_password.is_empty() {
            return Err(CredentialError::InvalidInput(
                "password must not be empty".to_string(),
            ));
        }
        let record = hash_password(new_password)?;

        let account = self
            .retry
            .run("change_password", || async {
                let txn = self.db.begin().await?;
                if !lock_row::<accounts::Entity, _>(&txn, id.into_inner()).await? {
                    return Err(CredentialError::AccountNotFound(id));
                }
                let account = accounts::Entity::find_by_id(id.into_inner())
                    .one(&txn)
                    .await?
                    .filter(|account| account.active)
                    .ok_or(CredentialError::AccountNotFound(id))?;
                let updated = store_hash(&txn, account, record.clone(), actor).await?;
                txn.commit().await?;
                Ok(updated)
            })
            .await?;

        info!(account_id = account.id, "Password changed");
        Ok(account)
    }

    /// Finds an account by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_account(
        &self,
        id: AccountId,
        visibility: Visibility,
    ) -> Result<Option<accounts::Model>, CredentialError> {
        Ok(visibility
            .apply(accounts::Entity::find_by_id(id.into_inner()))
            .one(&self.db)
            .await?)
    }

    /// Finds an account by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_username(
        &self,
        username: &str,
        visibility: Visibility,
    ) -> Result<Option<accounts::Model>, CredentialError> {
        Ok(visibility
            .apply(accounts::Entity::find())
            .filter(accounts::Column::Username.eq(username))
            .one(&self.db)
            .await?)
    }

    /// Lists accounts ordered by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_accounts(
        &self,
        visibility: Visibility,
    ) -> Result<Vec<accounts::Model>, CredentialError> {
        Ok(visibility
            .apply(accounts::Entity::find())
            .order_by_asc(accounts::Column::Username)
            .all(&self.db)
            .await?)
    }
}

fn has_real_hash(account: &accounts::Model) -> bool {
    account
        .stored_hash()
        .is_some_and(|hash| PasswordRecord::parse(hash).is_ok())
}

fn check_hash(account: &accounts::Model, hash: &str, password: &str) -> AuthOutcome {
    match verify_password(password, hash) {
        Verification::Verified => {
            principal(account).map_or(AuthOutcome::Denied, AuthOutcome::Authenticated)
        }
        Verification::Mismatch => AuthOutcome::Denied,
        Verification::Malformed => {
            warn!(account_id = account.id, "Stored password hash is malformed");
            AuthOutcome::Denied
        }
    }
}

fn principal(account: &accounts::Model) -> Option<Principal> {
    let Ok(role) = account.role.parse::<Role>() else {
        warn!(account_id = account.id, role = %account.role, "Account has an unknown role");
        return None;
    };
    Some(Principal {
        account_id: AccountId::new(account.id),
        username: account.username.clone(),
        display_name: account.display_name.clone(),
        role,
    })
}

async fn insert_account(
    txn: &DatabaseTransaction,
    username: &str,
    display_name: &str,
    role: Role,
    record: PasswordRecord,
    actor: &str,
) -> Result<accounts::Model, CredentialError> {
    let now = Utc::now();
    let account = accounts::ActiveModel {
        username: Set(username.to_string()),
        display_name: Set(display_name.to_string()),
        role: Set(role.as_str().to_string()),
        password_hash: Set(Some(record.into_encoded())),
        legacy_password: Set(None),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    append(
        txn,
        NewAuditEntry {
            actor: actor_or_system(actor),
            action: AuditAction::Create,
            table_name: ACCOUNTS,
            record_id: account.id,
            before: None,
            after: Some(snapshot(&account)?),
        },
    )
    .await?;
    Ok(account)
}

/// Writes a new hash, clears the plaintext, and records the update.
async fn store_hash(
    txn: &DatabaseTransaction,
    account: accounts::Model,
    record: PasswordRecord,
    actor: &str,
) -> Result<accounts::Model, CredentialError> {
    let before = snapshot(&account)?;
    let mut active: accounts::ActiveModel = account.into();
    active.password_hash = Set(Some(record.into_encoded()));
    active.legacy_password = Set(None);
    active.updated_at = Set(Utc::now());
    let updated = active.update(txn).await?;

    append(
        txn,
        NewAuditEntry {
            actor: actor_or_system(actor),
            action: AuditAction::Update,
            table_name: ACCOUNTS,
            record_id: updated.id,
            before: Some(before),
            after: Some(snapshot(&updated)?),
        },
    )
    .await?;
    Ok(updated)
}
