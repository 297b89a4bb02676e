//! Inventory ledger: items, the movement log, and reconciliation.
//!
//! Movements are the source of truth for stock. The `quantity` column on an
//! item is a cache, written only in the same transaction as the movement that
//! changes it.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value;
use tally_core::audit::{AuditAction, MOVEMENT_ID_KEY, SoftDeleteTable};
use tally_core::inventory::{
    InventoryRuleError, MovementKind, Reconciliation, StockRules, derive_balance,
};
use tally_shared::AppError;
use tally_shared::config::InventoryConfig;
use tally_shared::types::{Amount, ItemId};
use tracing::{debug, info, warn};

use super::audit::{NewAuditEntry, append, snapshot};
use super::soft_delete::lock_row;
use super::{Visibility, actor_or_system, is_unique_violation};
use crate::entities::{inventory_items, inventory_movements};
use crate::retry::{RetryPolicy, Transient, is_transient};

const INVENTORY_ITEMS: &str = SoftDeleteTable::InventoryItems.table_name();

/// Error types for inventory operations.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    /// Item not found.
    #[error("Inventory item not found: {0}")]
    ItemNotFound(ItemId),

    /// Item is deactivated and takes no movements.
    #[error("Inventory item {0} is inactive")]
    ItemInactive(ItemId),

    /// Item name already taken.
    #[error("Inventory item '{0}' already exists")]
    DuplicateName(String),

    /// Rejected input, such as a blank name or negative threshold.
    #[error("Invalid item input: {0}")]
    InvalidInput(String),

    /// Movement quantity was not strictly positive.
    #[error("Movement quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    /// A decrease would take the balance below zero.
    #[error("Insufficient stock for item {item_id}: {available} available, {requested} requested")]
    InsufficientStock {
        /// Affected item.
        item_id: ItemId,
        /// Balance before the movement.
        available: i64,
        /// Units the movement tried to take.
        requested: u64,
    },

    /// Other stock rule violation.
    #[error(transparent)]
    Rule(InventoryRuleError),

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

impl InventoryError {
    /// Maps a failed insert or update, turning a lost race for a unique name
    /// into `DuplicateName`.
    fn from_write(name: &str, err: DbErr) -> Self {
        if is_unique_violation(&err) {
            Self::DuplicateName(name.to_string())
        } else {
            Self::Database(err)
        }
    }

    fn from_rule(item_id: ItemId, err: InventoryRuleError) -> Self {
        match err {
            InventoryRuleError::InvalidQuantity(quantity) => Self::InvalidQuantity(quantity),
            InventoryRuleError::InsufficientStock {
                available,
                requested,
            } => Self::InsufficientStock {
                item_id,
                available,
                requested,
            },
            other => Self::Rule(other),
        }
    }
}

impl Transient for InventoryError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Database(e) if is_transient(e))
    }

    fn exhausted(self, attempts: usize) -> Self {
        Self::Busy { attempts }
    }
}

impl From<InventoryError> for AppError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::ItemNotFound(_) => Self::NotFound(err.to_string()),
            InventoryError::ItemInactive(_) => Self::BusinessRule(err.to_string()),
            InventoryError::DuplicateName(_) => Self::Conflict(err.to_string()),
            InventoryError::InvalidInput(_) | InventoryError::InvalidQuantity(_) => {
                Self::Validation(err.to_string())
            }
            InventoryError::InsufficientStock { .. } => Self::InsufficientStock(err.to_string()),
            InventoryError::Rule(_) => Self::BusinessRule(err.to_string()),
            InventoryError::Snapshot(_) => Self::Internal(err.to_string()),
            InventoryError::Busy { .. } => Self::TransientLock(err.to_string()),
            InventoryError::Database(_) => Self::Database(err.to_string()),
        }
    }
}

/// Input for creating an item. New items start with zero stock.
#[derive(Debug, Clone)]
pub struct NewItem {
    /// Unique display name.
    pub name: String,
    /// Unit of measure, e.g. `"bottle"`.
    pub unit: String,
    /// Price per unit.
    pub unit_price: Amount,
    /// Reorder threshold.
    pub min_threshold: i64,
}

/// Changes to an item's descriptive fields. The balance is not editable.
#[derive(Debug, Clone, Default)]
pub struct ItemUpdate {
    /// New name.
    pub name: Option<String>,
    /// New unit of measure.
    pub unit: Option<String>,
    /// New price per unit.
    pub unit_price: Option<Amount>,
    /// New reorder threshold.
    pub min_threshold: Option<i64>,
}

impl ItemUpdate {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.unit.is_none()
            && self.unit_price.is_none()
            && self.min_threshold.is_none()
    }
}

/// A requested stock movement.
#[derive(Debug, Clone)]
pub struct MovementRequest {
    /// Target item.
    pub item_id: ItemId,
    /// Movement kind; adjustments carry their direction.
    pub kind: MovementKind,
    /// Units moved, strictly positive.
    pub quantity: i64,
    /// Free-text reason.
    pub reason: String,
    /// Who recorded it.
    pub actor: String,
}

/// A committed movement and the item balance it produced.
#[derive(Debug, Clone)]
pub struct MovementReceipt {
    /// The appended movement row.
    pub movement: inventory_movements::Model,
    /// The item after the movement.
    pub item: inventory_items::Model,
}

/// Inventory ledger over items and movements.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    db: DatabaseConnection,
    rules: StockRules,
    retry: RetryPolicy,
}

impl InventoryLedger {
    /// Creates a new inventory ledger.
    #[must_use]
    pub const fn new(db: DatabaseConnection, config: &InventoryConfig, retry: RetryPolicy) -> Self {
        Self {
            db,
            rules: StockRules {
                allow_negative: config.allow_negative_stock,
            },
            retry,
        }
    }

    /// Creates an item with zero stock.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::DuplicateName` if any item, active or not,
    /// already has the name.
    pub async fn create_item(
        &self,
        input: NewItem,
        actor: &str,
    ) -> Result<inventory_items::Model, InventoryError> {
        let name = validate_name(&input.name)?;
        validate_threshold(input.min_threshold)?;

        let item = self
            .retry
            .run("create_item", || async {
                let txn = self.db.begin().await?;
                ensure_name_free(&txn, name, None).await?;

                let now = Utc::now();
                let item = inventory_items::ActiveModel {
                    name: Set(name.to_string()),
                    quantity: Set(0),
                    unit: Set(input.unit.trim().to_string()),
                    unit_price: Set(input.unit_price.to_string()),
                    min_threshold: Set(input.min_threshold),
                    active: Set(true),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await
                .map_err(|e| InventoryError::from_write(name, e))?;

                append(
                    &txn,
                    NewAuditEntry {
                        actor,
                        action: AuditAction::Create,
                        table_name: INVENTORY_ITEMS,
                        record_id: item.id,
                        before: None,
                        after: Some(snapshot(&item)?),
                    },
                )
                .await?;
                txn.commit().await?;
                Ok::<_, InventoryError>(item)
            })
            .await?;

        info!(item_id = item.id, name = %item.name, "Inventory item created");
        Ok(item)
    }

    /// Edits an active item's descriptive fields.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::ItemNotFound` for a missing item,
    /// `InventoryError::ItemInactive` for a deactivated one, and
    /// `InventoryError::DuplicateName` when renaming onto a taken name.
    pub async fn update_item(
        &self,
        id: ItemId,
        update: ItemUpdate,
        actor: &str,
    ) -> Result<inventory_items::Model, InventoryError> {
        let name = update.name.as_deref().map(validate_name).transpose()?;
        if let Some(threshold) = update.min_threshold {
            validate_threshold(threshold)?;
        }

        let item = self
            .retry
            .run("update_item", || async {
                let txn = self.db.begin().await?;
                if !lock_row::<inventory_items::Entity, _>(&txn, id.into_inner()).await? {
                    return Err(InventoryError::ItemNotFound(id));
                }
                let item = inventory_items::Entity::find_by_id(id.into_inner())
                    .one(&txn)
                    .await?
                    .ok_or(InventoryError::ItemNotFound(id))?;
                if !item.active {
                    return Err(InventoryError::ItemInactive(id));
                }
                if update.is_empty() {
                    return Ok(item);
                }
                if let Some(name) = name {
                    ensure_name_free(&txn, name, Some(item.id)).await?;
                }

                let before = snapshot(&item)?;
                let mut active: inventory_items::ActiveModel = item.into();
                if let Some(name) = name {
                    active.name = Set(name.to_string());
                }
                if let Some(unit) = &update.unit {
                    active.unit = Set(unit.trim().to_string());
                }
                if let Some(price) = update.unit_price {
                    active.unit_price = Set(price.to_string());
                }
                if let Some(threshold) = update.min_threshold {
                    active.min_threshold = Set(threshold);
                }
                active.updated_at = Set(Utc::now());
                let updated = active
                    .update(&txn)
                    .await
                    .map_err(|e| InventoryError::from_write(name.unwrap_or_default(), e))?;

                append(
                    &txn,
                    NewAuditEntry {
                        actor,
                        action: AuditAction::Update,
                        table_name: INVENTORY_ITEMS,
                        record_id: updated.id,
                        before: Some(before),
                        after: Some(snapshot(&updated)?),
                    },
                )
                .await?;
                txn.commit().await?;
                Ok(updated)
            })
            .await?;

        info!(item_id = item.id, "Inventory item updated");
        Ok(item)
    }

    /// Records a stock movement and updates the cached balance.
    ///
    /// The movement row, the new balance, and the `STOCK_MOVEMENT` audit
    /// entry commit together or not at all.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::InvalidQuantity` for a non-positive quantity,
    /// `InventoryError::ItemNotFound` / `InventoryError::ItemInactive` for a
    /// bad target, `InventoryError::InsufficientStock` when a decrease would
    /// overdraw, and `InventoryError::Busy` if the item stays locked.
    pub async fn record_movement(
        &self,
        request: &MovementRequest,
    ) -> Result<MovementReceipt, InventoryError> {
        let delta = request
            .kind
            .signed_delta(request.quantity)
            .map_err(|e| InventoryError::from_rule(request.item_id, e))?;

        let receipt = self
            .retry
            .run("record_movement", || self.record_movement_once(request, delta))
            .await?;

        debug!(
            item_id = receipt.item.id,
            movement_id = receipt.movement.id,
            movement_type = %receipt.movement.movement_type,
            delta,
            balance = receipt.item.quantity,
            "Stock movement recorded"
        );
        Ok(receipt)
    }

    async fn record_movement_once(
        &self,
        request: &MovementRequest,
        delta: i64,
    ) -> Result<MovementReceipt, InventoryError> {
        let item_id = request.item_id;
        let txn = self.db.begin().await?;

        if !lock_row::<inventory_items::Entity, _>(&txn, item_id.into_inner()).await? {
            return Err(InventoryError::ItemNotFound(item_id));
        }
        let item = inventory_items::Entity::find_by_id(item_id.into_inner())
            .one(&txn)
            .await?
            .ok_or(InventoryError::ItemNotFound(item_id))?;
        if !item.active {
            return Err(InventoryError::ItemInactive(item_id));
        }

        let balance = self
            .rules
            .apply(item.quantity, delta)
            .map_err(|e| InventoryError::from_rule(item_id, e))?;

        let now = Utc::now();
        let movement = inventory_movements::ActiveModel {
            item_id: Set(item.id),
            movement_type: Set(request.kind.movement_type().as_str().to_string()),
            delta: Set(delta),
            reason: Set(request.reason.trim().to_string()),
            actor: Set(actor_or_system(&request.actor).to_string()),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let before = snapshot(&item)?;
        let mut active: inventory_items::ActiveModel = item.into();
        active.quantity = Set(balance);
        active.updated_at = Set(now);
        let item = active.update(&txn).await?;

        let mut after = snapshot(&item)?;
        if let Value::Object(fields) = &mut after {
            fields.insert(MOVEMENT_ID_KEY.to_string(), Value::from(movement.id));
        }
        append(
            &txn,
            NewAuditEntry {
                actor: &request.actor,
                action: AuditAction::StockMovement,
                table_name: INVENTORY_ITEMS,
                record_id: item.id,
                before: Some(before),
                after: Some(after),
            },
        )
        .await?;

        txn.commit().await?;
        Ok(MovementReceipt { movement, item })
    }

    /// Re-derives an item's balance from its movements and compares it with
    /// the cached quantity. Drift is logged, never corrected.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::ItemNotFound` for a missing item. Inactive
    /// items are reconciled too.
    pub async fn reconcile(&self, id: ItemId) -> Result<Reconciliation, InventoryError> {
        // One read transaction so the row and its movements are one snapshot.
        let txn = self.db.begin().await?;
        let item = inventory_items::Entity::find_by_id(id.into_inner())
            .one(&txn)
            .await?
            .ok_or(InventoryError::ItemNotFound(id))?;
        let deltas: Vec<i64> = inventory_movements::Entity::find()
            .select_only()
            .column(inventory_movements::Column::Delta)
            .filter(inventory_movements::Column::ItemId.eq(item.id))
            .into_tuple()
            .all(&txn)
            .await?;
        txn.commit().await?;

        let derived = derive_balance(deltas).map_err(|e| InventoryError::from_rule(id, e))?;
        let outcome = Reconciliation::compare(id, item.quantity, derived);
        if let Some(warning) = outcome.warning() {
            warn!(
                item_id = item.id,
                cached = warning.cached,
                derived = warning.derived,
                drift = warning.drift(),
                "Data integrity warning: cached stock differs from movement history"
            );
        }
        Ok(outcome)
    }

    /// Reconciles every item, active or not.
    ///
    /// # Errors
    ///
    /// Returns an error if any query fails.
    pub async fn reconcile_all(&self) -> Result<Vec<Reconciliation>, InventoryError> {
        let ids: Vec<i64> = inventory_items::Entity::find()
            .select_only()
            .column(inventory_items::Column::Id)
            .order_by_asc(inventory_items::Column::Id)
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            outcomes.push(self.reconcile(ItemId::new(id)).await?);
        }

        let drifted = outcomes.iter().filter(|o| !o.is_consistent()).count();
        info!(items = outcomes.len(), drifted, "Inventory reconciled");
        Ok(outcomes)
    }

    /// Movements of one item, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn movements(
        &self,
        id: ItemId,
    ) -> Result<Vec<inventory_movements::Model>, InventoryError> {
        Ok(inventory_movements::Entity::find()
            .filter(inventory_movements::Column::ItemId.eq(id.into_inner()))
            .order_by_asc(inventory_movements::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Finds an item by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_item(
        &self,
        id: ItemId,
        visibility: Visibility,
    ) -> Result<Option<inventory_items::Model>, InventoryError> {
        Ok(visibility
            .apply(inventory_items::Entity::find_by_id(id.into_inner()))
            .one(&self.db)
            .await?)
    }

    /// Lists items ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_items(
        &self,
        visibility: Visibility,
    ) -> Result<Vec<inventory_items::Model>, InventoryError> {
        Ok(visibility
            .apply(inventory_items::Entity::find())
            .order_by_asc(inventory_items::Column::Name)
            .all(&self.db)
            .await?)
    }

    /// Items at or below their reorder threshold, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn low_stock(
        &self,
        visibility: Visibility,
    ) -> Result<Vec<inventory_items::Model>, InventoryError> {
        Ok(visibility
            .apply(inventory_items::Entity::find())
            .filter(
                sea_orm::sea_query::Expr::col(inventory_items::Column::Quantity)
                    .lte(sea_orm::sea_query::Expr::col(inventory_items::Column::MinThreshold)),
            )
            .order_by_asc(inventory_items::Column::Name)
            .all(&self.db)
            .await?)
    }
}

fn validate_name(name: &str) -> Result<&str, InventoryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(InventoryError::InvalidInput(
            "name must not be blank".to_string(),
        ));
    }
    Ok(name)
}

fn validate_threshold(threshold: i64) -> Result<(), InventoryError> {
    if threshold < 0 {
        return Err(InventoryError::InvalidInput(format!(
            "minimum threshold must not be negative, got {threshold}"
        )));
    }
    Ok(())
}

async fn ensure_name_free<C: sea_orm::ConnectionTrait>(
    conn: &C,
    name: &str,
    except: Option<i64>,
) -> Result<(), InventoryError> {
    let mut query = inventory_items::Entity::find().filter(inventory_items::Column::Name.eq(name));
    if let Some(id) = except {
        query = query.filter(inventory_items::Column::Id.ne(id));
    }
    if query.one(conn).await?.is_some() {
        return Err(InventoryError::DuplicateName(name.to_string()));
    }
    Ok(())
}
