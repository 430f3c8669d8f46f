use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, QueryFilter,
};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

use crate::entities::commerce::{
    coupon, coupon_category, coupon_product, coupon_user, Coupon, CouponCategory, CouponModel,
    CouponProduct, CouponUser,
};
use crate::errors::{CouponRejection, ServiceError};

/// A coupon together with its scoping sets. An empty set leaves the coupon
/// unrestricted along that axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouponWithScope {
    pub coupon: CouponModel,
    pub product_ids: HashSet<Uuid>,
    pub category_ids: HashSet<Uuid>,
    pub user_ids: HashSet<Uuid>,
}

impl CouponWithScope {
    /// A coupon with no product, category or user restriction.
    pub fn unrestricted(coupon: CouponModel) -> Self {
        Self {
            coupon,
            product_ids: HashSet::new(),
            category_ids: HashSet::new(),
            user_ids: HashSet::new(),
        }
    }
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn find_by_code(
        &self,
        txn: &DatabaseTransaction,
        code: &str,
    ) -> Result<Option<CouponWithScope>, ServiceError>;

    /// Spends one global use. Fails with `GlobalLimitReached` when the
    /// coupon is already at its limit, whatever the caller read earlier.
    async fn increment_used(&self, txn: &DatabaseTransaction, id: Uuid)
        -> Result<(), ServiceError>;

    /// Gives one global use back; never goes below zero.
    async fn decrement_used(&self, txn: &DatabaseTransaction, id: Uuid)
        -> Result<(), ServiceError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SeaOrmCouponStore;

#[async_trait]
impl CouponStore for SeaOrmCouponStore {
    async fn find_by_code(
        &self,
        txn: &DatabaseTransaction,
        code: &str,
    ) -> Result<Option<CouponWithScope>, ServiceError> {
        let Some(coupon) = Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .one(txn)
            .await?
        else {
            return Ok(None);
        };

        let product_ids = CouponProduct::find()
            .filter(coupon_product::Column::CouponId.eq(coupon.id))
            .all(txn)
            .await?
            .into_iter()
            .map(|row| row.product_id)
            .collect();

        let category_ids = CouponCategory::find()
            .filter(coupon_category::Column::CouponId.eq(coupon.id))
            .all(txn)
            .await?
            .into_iter()
            .map(|row| row.category_id)
            .collect();

        let user_ids = CouponUser::find()
            .filter(coupon_user::Column::CouponId.eq(coupon.id))
            .all(txn)
            .await?
            .into_iter()
            .map(|row| row.user_id)
            .collect();

        Ok(Some(CouponWithScope {
            coupon,
            product_ids,
            category_ids,
            user_ids,
        }))
    }

    async fn increment_used(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
    ) -> Result<(), ServiceError> {
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Id.eq(id))
            .filter(
                Condition::any()
                    .add(coupon::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(coupon::Column::UsedCount)
                            .lt(Expr::col(coupon::Column::UsageLimit)),
                    ),
            )
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(CouponRejection::GlobalLimitReached.into());
        }
        Ok(())
    }

    async fn decrement_used(
        &self,
        txn: &DatabaseTransaction,
        id: Uuid,
    ) -> Result<(), ServiceError> {
        Coupon::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).sub(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Id.eq(id))
            .filter(coupon::Column::UsedCount.gt(0))
            .exec(txn)
            .await?;
        Ok(())
    }
}
