use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait,
    QueryFilter, Set,
};
use uuid::Uuid;

use crate::entities::commerce::{user_coupon_usage, UserCouponUsage};
use crate::errors::{CouponRejection, ServiceError};

/// Per-user redemption counters.
#[async_trait]
pub trait CouponUsageStore: Send + Sync {
    async fn count_for_user(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        coupon_id: Uuid,
    ) -> Result<i32, ServiceError>;

    /// Records one more redemption, refusing with `PerUserLimitReached` if
    /// `per_user_limit` is already met.
    async fn increment_usage(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        coupon_id: Uuid,
        per_user_limit: Option<i32>,
    ) -> Result<(), ServiceError>;

    /// Takes one redemption back, floored at zero.
    async fn decrement_usage(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        coupon_id: Uuid,
    ) -> Result<(), ServiceError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SeaOrmCouponUsageStore;

fn usage_row(user_id: Uuid, coupon_id: Uuid) -> Condition {
    Condition::all()
        .add(user_coupon_usage::Column::UserId.eq(user_id))
        .add(user_coupon_usage::Column::CouponId.eq(coupon_id))
}

#[async_trait]
impl CouponUsageStore for SeaOrmCouponUsageStore {
    async fn count_for_user(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        coupon_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let usage = UserCouponUsage::find()
            .filter(usage_row(user_id, coupon_id))
            .one(txn)
            .await?;
        Ok(usage.map(|u| u.usage_count).unwrap_or(0))
    }

    async fn increment_usage(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        coupon_id: Uuid,
        per_user_limit: Option<i32>,
    ) -> Result<(), ServiceError> {
        if per_user_limit.is_some_and(|limit| limit <= 0) {
            return Err(CouponRejection::PerUserLimitReached.into());
        }

        let existing = UserCouponUsage::find()
            .filter(usage_row(user_id, coupon_id))
            .one(txn)
            .await?;

        if existing.is_none() {
            user_coupon_usage::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                coupon_id: Set(coupon_id),
                usage_count: Set(1),
                updated_at: Set(Utc::now()),
            }
            .insert(txn)
            .await?;
            return Ok(());
        }

        let mut update = UserCouponUsage::update_many()
            .col_expr(
                user_coupon_usage::Column::UsageCount,
                Expr::col(user_coupon_usage::Column::UsageCount).add(1),
            )
            .col_expr(user_coupon_usage::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(usage_row(user_id, coupon_id));
        if let Some(limit) = per_user_limit {
            update = update.filter(user_coupon_usage::Column::UsageCount.lt(limit));
        }

        if update.exec(txn).await?.rows_affected == 0 {
            return Err(CouponRejection::PerUserLimitReached.into());
        }
        Ok(())
    }

    async fn decrement_usage(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        coupon_id: Uuid,
    ) -> Result<(), ServiceError> {
        UserCouponUsage::update_many()
            .col_expr(
                user_coupon_usage::Column::UsageCount,
                Expr::col(user_coupon_usage::Column::UsageCount).sub(1),
            )
            .col_expr(user_coupon_usage::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(usage_row(user_id, coupon_id))
            .filter(user_coupon_usage::Column::UsageCount.gt(0))
            .exec(txn)
            .await?;
        Ok(())
    }
}
