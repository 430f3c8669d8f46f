use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::DatabaseTransaction;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::errors::{CouponRejection, ServiceError};
use crate::repositories::{CartSnapshot, CouponStore, CouponUsageStore, CouponWithScope};

/// What a coupon is being applied to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CouponCandidate {
    pub user_id: Uuid,
    pub product_ids: HashSet<Uuid>,
    pub variant_ids: HashSet<Uuid>,
    pub category_ids: HashSet<Uuid>,
    pub subtotal: Decimal,
}

impl CouponCandidate {
    /// Builds the candidate sets from a cart snapshot.
    pub fn from_cart(user_id: Uuid, cart: &CartSnapshot, subtotal: Decimal) -> Self {
        Self {
            user_id,
            product_ids: cart.items.iter().map(|line| line.product_id).collect(),
            variant_ids: cart.items.iter().map(|line| line.variant_id).collect(),
            category_ids: cart.items.iter().filter_map(|line| line.category_id).collect(),
            subtotal,
        }
    }
}

/// Applies the coupon rules in a fixed order and reports the first one that
/// fails. Depends only on its arguments, so the same inputs always give the
/// same answer.
pub fn evaluate_coupon(
    coupon: Option<&CouponWithScope>,
    user_usage_count: i32,
    candidate: &CouponCandidate,
    now: DateTime<Utc>,
) -> Result<(), CouponRejection> {
    let scoped = coupon.ok_or(CouponRejection::InvalidCode)?;
    let coupon = &scoped.coupon;

    if coupon.start_date.is_some_and(|start| now < start) {
        return Err(CouponRejection::NotYetActive);
    }
    if coupon.end_date.is_some_and(|end| now > end) {
        return Err(CouponRejection::Expired);
    }

    if coupon
        .usage_limit
        .is_some_and(|limit| coupon.used_count >= limit)
    {
        return Err(CouponRejection::GlobalLimitReached);
    }

    if coupon
        .usage_limit_per_user
        .is_some_and(|limit| user_usage_count >= limit)
    {
        return Err(CouponRejection::PerUserLimitReached);
    }

    if let Some(minimum) = coupon.min_order_amount {
        if candidate.subtotal < minimum {
            return Err(CouponRejection::BelowMinimumAmount { minimum });
        }
    }

    if !scoped.product_ids.is_empty()
        && scoped.product_ids.is_disjoint(&candidate.product_ids)
        && scoped.product_ids.is_disjoint(&candidate.variant_ids)
    {
        return Err(CouponRejection::ProductNotEligible);
    }

    if !scoped.category_ids.is_empty() && scoped.category_ids.is_disjoint(&candidate.category_ids)
    {
        return Err(CouponRejection::CategoryNotEligible);
    }

    if !scoped.user_ids.is_empty() && !scoped.user_ids.contains(&candidate.user_id) {
        return Err(CouponRejection::UserNotEligible);
    }

    Ok(())
}

/// Loads a coupon and its usage inside the caller's transaction and runs
/// [`evaluate_coupon`] over them. Never writes.
#[derive(Clone)]
pub struct CouponValidator {
    coupons: Arc<dyn CouponStore>,
    usage: Arc<dyn CouponUsageStore>,
}

impl CouponValidator {
    pub fn new(coupons: Arc<dyn CouponStore>, usage: Arc<dyn CouponUsageStore>) -> Self {
        Self { coupons, usage }
    }

    #[instrument(skip(self, txn, candidate), fields(user_id = %candidate.user_id))]
    pub async fn validate(
        &self,
        txn: &DatabaseTransaction,
        code: &str,
        candidate: &CouponCandidate,
        now: DateTime<Utc>,
    ) -> Result<CouponWithScope, ServiceError> {
        let code = code.trim();
        let scoped = if code.is_empty() {
            None
        } else {
            self.coupons.find_by_code(txn, code).await?
        };

        let usage_count = match &scoped {
            Some(found) => {
                self.usage
                    .count_for_user(txn, candidate.user_id, found.coupon.id)
                    .await?
            }
            None => 0,
        };

        if let Err(reason) = evaluate_coupon(scoped.as_ref(), usage_count, candidate, now) {
            debug!(code, reason = reason.code(), "Coupon rejected");
            return Err(reason.into());
        }

        scoped.ok_or(ServiceError::InvalidCoupon(CouponRejection::InvalidCode))
    }
}
