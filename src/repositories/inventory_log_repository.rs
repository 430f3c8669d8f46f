use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::entities::inventory_log::{self, Entity as InventoryLog, InventoryChangeType, Model};
use crate::errors::ServiceError;

/// A ledger entry about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInventoryLogEntry {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub order_id: Option<Uuid>,
    pub change_type: InventoryChangeType,
    pub quantity_change: i32,
    pub old_stock_quantity: i32,
    pub changed_by_user_id: Option<Uuid>,
    pub description: String,
}

impl NewInventoryLogEntry {
    pub fn new_stock_quantity(&self) -> i32 {
        self.old_stock_quantity + self.quantity_change
    }
}

/// Append-only inventory ledger. Entries are written in the same
/// transaction as the stock change they describe and are never edited.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn record(
        &self,
        txn: &DatabaseTransaction,
        entry: NewInventoryLogEntry,
    ) -> Result<Model, ServiceError>;

    /// Every entry for the variant, in the order they were written.
    async fn entries_for_variant(
        &self,
        txn: &DatabaseTransaction,
        variant_id: Uuid,
    ) -> Result<Vec<Model>, ServiceError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SeaOrmInventoryLedger;

#[async_trait]
impl InventoryLedger for SeaOrmInventoryLedger {
    async fn record(
        &self,
        txn: &DatabaseTransaction,
        entry: NewInventoryLogEntry,
    ) -> Result<Model, ServiceError> {
        let new_stock_quantity = entry.new_stock_quantity();
        let row = inventory_log::ActiveModel {
            id: NotSet,
            product_id: Set(entry.product_id),
            variant_id: Set(entry.variant_id),
            order_id: Set(entry.order_id),
            change_type: Set(entry.change_type),
            quantity_change: Set(entry.quantity_change),
            old_stock_quantity: Set(entry.old_stock_quantity),
            new_stock_quantity: Set(new_stock_quantity),
            changed_by_user_id: Set(entry.changed_by_user_id),
            description: Set(entry.description),
            created_at: Set(Utc::now()),
        };
        Ok(row.insert(txn).await?)
    }

    async fn entries_for_variant(
        &self,
        txn: &DatabaseTransaction,
        variant_id: Uuid,
    ) -> Result<Vec<Model>, ServiceError> {
        Ok(InventoryLog::find()
            .filter(inventory_log::Column::VariantId.eq(variant_id))
            .order_by_asc(inventory_log::Column::Id)
            .all(txn)
            .await?)
    }
}
