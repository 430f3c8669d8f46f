use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Select,
};
use uuid::Uuid;

use crate::entities::commerce::{product_variant, ProductVariant, ProductVariantModel};
use crate::errors::ServiceError;

/// `SELECT ... FOR UPDATE` over the given variants, deduplicated and in id
/// order so concurrent placements acquire row locks in the same sequence.
fn locking_select(ids: &[Uuid]) -> Select<ProductVariant> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    ProductVariant::find()
        .filter(product_variant::Column::Id.is_in(sorted))
        .order_by_asc(product_variant::Column::Id)
        .lock_exclusive()
}

/// Storage for the shared stock counter on product variants.
#[async_trait]
pub trait VariantStore: Send + Sync {
    /// Plain read without a lock.
    async fn find(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
    ) -> Result<Option<ProductVariantModel>, ServiceError>;

    /// Reads and locks the given variants for the rest of the transaction.
    /// Rows come back sorted by id, which is also the order the locks are
    /// taken in, so two transactions never wait on each other in a cycle.
    async fn lock_for_update(
        &self,
        txn: &DatabaseTransaction,
        ids: &[Uuid],
    ) -> Result<Vec<ProductVariantModel>, ServiceError>;

    /// Removes `quantity` units. Fails with `InsufficientStock` instead of
    /// letting the counter go negative.
    async fn decrement_stock(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError>;

    async fn increment_stock(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SeaOrmVariantStore;

#[async_trait]
impl VariantStore for SeaOrmVariantStore {
    async fn find(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
    ) -> Result<Option<ProductVariantModel>, ServiceError> {
        Ok(ProductVariant::find_by_id(id).one(txn).await?)
    }

    async fn lock_for_update(
        &self,
        txn: &DatabaseTransaction,
        ids: &[Uuid],
    ) -> Result<Vec<ProductVariantModel>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        Ok(locking_select(ids).all(txn).await?)
    }

    async fn decrement_stock(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::StockQuantity,
                Expr::col(product_variant::Column::StockQuantity).sub(quantity),
            )
            .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_variant::Column::Id.eq(id))
            .filter(product_variant::Column::StockQuantity.gte(quantity))
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!("variant {}", id)));
        }
        Ok(())
    }

    async fn increment_stock(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::StockQuantity,
                Expr::col(product_variant::Column::StockQuantity).add(quantity),
            )
            .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_variant::Column::Id.eq(id))
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Variant {} not found", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, QueryTrait};

    #[test]
    fn locks_rows_in_id_order_on_postgres() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        let sql = locking_select(&[high, low, high])
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.contains(" FOR UPDATE"), "{sql}");
        assert!(
            sql.contains(r#"ORDER BY "product_variants"."id" ASC"#),
            "{sql}"
        );
        let low_at = sql.find(&low.to_string()).unwrap();
        let high_at = sql.find(&high.to_string()).unwrap();
        assert!(low_at < high_at, "{sql}");
        assert_eq!(sql.matches(&high.to_string()).count(), 1, "{sql}");
    }

    #[test]
    fn sqlite_has_no_row_lock_clause() {
        let sql = locking_select(&[Uuid::from_u128(1)])
            .build(DbBackend::Sqlite)
            .to_string();
        assert!(!sql.contains("FOR UPDATE"), "{sql}");
    }
}
