use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::entities::order::{
    ActiveModel as OrderActiveModel, Entity as Order, Model as OrderModel, OrderStatus,
};
use crate::entities::order_history::{
    self, Entity as OrderHistory, Model as OrderHistoryModel,
};
use crate::entities::order_item::{
    self, ActiveModel as OrderItemActiveModel, Entity as OrderItem, Model as OrderItemModel,
};
use crate::errors::ServiceError;

/// Storage for orders, their lines and their status history. There is no
/// delete: orders leave the system only by changing status.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(
        &self,
        txn: &DatabaseTransaction,
        order: OrderActiveModel,
    ) -> Result<OrderModel, ServiceError>;

    async fn insert_items(
        &self,
        txn: &DatabaseTransaction,
        items: Vec<OrderItemActiveModel>,
    ) -> Result<Vec<OrderItemModel>, ServiceError>;

    async fn append_history(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        status: OrderStatus,
        changed_by: Option<Uuid>,
        note: Option<String>,
    ) -> Result<OrderHistoryModel, ServiceError>;

    async fn find_by_id(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
    ) -> Result<Option<OrderModel>, ServiceError>;

    /// Reads and locks the order row until the transaction ends.
    async fn find_for_update(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
    ) -> Result<Option<OrderModel>, ServiceError>;

    async fn find_items(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<Vec<OrderItemModel>, ServiceError>;

    /// Status history, oldest first.
    async fn history(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<Vec<OrderHistoryModel>, ServiceError>;

    async fn set_status(
        &self,
        txn: &DatabaseTransaction,
        order: OrderModel,
        status: OrderStatus,
    ) -> Result<OrderModel, ServiceError>;
}

/// Repository for order operations
#[derive(Debug, Default, Clone, Copy)]
pub struct SeaOrmOrderStore;

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    async fn insert_order(
        &self,
        txn: &DatabaseTransaction,
        order: OrderActiveModel,
    ) -> Result<OrderModel, ServiceError> {
        Ok(order.insert(txn).await?)
    }

    async fn insert_items(
        &self,
        txn: &DatabaseTransaction,
        items: Vec<OrderItemActiveModel>,
    ) -> Result<Vec<OrderItemModel>, ServiceError> {
        let mut inserted = Vec::with_capacity(items.len());
        for item in items {
            inserted.push(item.insert(txn).await?);
        }
        Ok(inserted)
    }

    async fn append_history(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        status: OrderStatus,
        changed_by: Option<Uuid>,
        note: Option<String>,
    ) -> Result<OrderHistoryModel, ServiceError> {
        // Callers hold the order row lock, so the count is stable.
        let existing = OrderHistory::find()
            .filter(order_history::Column::OrderId.eq(order_id))
            .count(txn)
            .await?;
        let sequence = i32::try_from(existing + 1).map_err(|_| {
            ServiceError::Conflict(format!("order {order_id} has too many history rows"))
        })?;

        let entry = order_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            sequence: Set(sequence),
            status: Set(status),
            changed_by: Set(changed_by),
            note: Set(note),
            created_at: Set(Utc::now()),
        };
        Ok(entry.insert(txn).await?)
    }

    async fn find_by_id(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(Order::find_by_id(id).one(txn).await?)
    }

    async fn find_for_update(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(Order::find_by_id(id).lock_exclusive().one(txn).await?)
    }

    async fn find_items(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<Vec<OrderItemModel>, ServiceError> {
        Ok(OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::VariantId)
            .all(txn)
            .await?)
    }

    async fn history(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<Vec<OrderHistoryModel>, ServiceError> {
        Ok(OrderHistory::find()
            .filter(order_history::Column::OrderId.eq(order_id))
            .order_by_asc(order_history::Column::Sequence)
            .all(txn)
            .await?)
    }

    async fn set_status(
        &self,
        txn: &DatabaseTransaction,
        order: OrderModel,
        status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let mut active: OrderActiveModel = order.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        Ok(active.update(txn).await?)
    }
}
