use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use utoipa::ToSchema;

use crate::entities::commerce::{CouponModel, DiscountType};

/// Monetary breakdown of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    #[schema(value_type = String)]
    pub discount_amount: Decimal,
    #[schema(value_type = String)]
    pub shipping_cost: Decimal,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
}

/// Rounds to cents, halves away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Discount a coupon grants on `subtotal`.
///
/// Percentage discounts honour `max_discount_amount`; no discount is ever
/// larger than the subtotal it applies to, and free shipping discounts
/// nothing here (it zeroes shipping instead).
pub fn discount_for(coupon: &CouponModel, subtotal: Decimal) -> Decimal {
    let subtotal = subtotal.max(Decimal::ZERO);
    let value = coupon.discount_value.max(Decimal::ZERO);

    let raw = match coupon.discount_type {
        DiscountType::Percentage => {
            let pct = subtotal * value / Decimal::ONE_HUNDRED;
            match coupon.max_discount_amount {
                Some(cap) => pct.min(cap.max(Decimal::ZERO)),
                None => pct,
            }
        }
        DiscountType::FixedAmount => value,
        DiscountType::FreeShipping => Decimal::ZERO,
    };

    round_money(raw.min(subtotal))
}

/// Prices an order: `total = max(subtotal - discount + shipping, 0)`.
pub fn compute_totals(
    subtotal: Decimal,
    coupon: Option<&CouponModel>,
    default_shipping: Decimal,
) -> OrderTotals {
    let subtotal = round_money(subtotal);
    let discount_amount = coupon
        .map(|c| discount_for(c, subtotal))
        .unwrap_or(Decimal::ZERO);
    let shipping_cost = match coupon {
        Some(c) if c.discount_type == DiscountType::FreeShipping => Decimal::ZERO,
        _ => round_money(default_shipping.max(Decimal::ZERO)),
    };
    let total_amount = (subtotal - discount_amount + shipping_cost).max(Decimal::ZERO);

    OrderTotals {
        subtotal,
        discount_amount,
        shipping_cost,
        total_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn coupon(
        discount_type: DiscountType,
        value: Decimal,
        max_discount: Option<Decimal>,
    ) -> CouponModel {
        CouponModel {
            id: Uuid::new_v4(),
            code: "TEST".into(),
            discount_type,
            discount_value: value,
            max_discount_amount: max_discount,
            min_order_amount: None,
            usage_limit: None,
            used_count: 0,
            usage_limit_per_user: None,
            start_date: None,
            end_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn no_coupon_adds_default_shipping() {
        let totals = compute_totals(dec!(20.00), None, dec!(5.00));
        assert_eq!(totals.discount_amount, Decimal::ZERO);
        assert_eq!(totals.shipping_cost, dec!(5.00));
        assert_eq!(totals.total_amount, dec!(25.00));
    }

    #[test]
    fn ten_percent_off_twenty() {
        let c = coupon(DiscountType::Percentage, dec!(10), None);
        let totals = compute_totals(dec!(20.00), Some(&c), dec!(5.00));
        assert_eq!(totals.discount_amount, dec!(2.00));
        assert_eq!(totals.total_amount, dec!(23.00));
    }

    #[rstest]
    #[case(dec!(50), Some(dec!(10)), dec!(10.00))]
    #[case(dec!(50), None, dec!(50.00))]
    #[case(dec!(5), Some(dec!(10)), dec!(5.00))]
    #[case(dec!(150), None, dec!(100.00))]
    fn percentage_respects_cap_and_subtotal(
        #[case] pct: Decimal,
        #[case] cap: Option<Decimal>,
        #[case] expected: Decimal,
    ) {
        let c = coupon(DiscountType::Percentage, pct, cap);
        assert_eq!(discount_for(&c, dec!(100.00)), expected);
    }

    #[test]
    fn fixed_amount_is_clamped_to_subtotal() {
        let c = coupon(DiscountType::FixedAmount, dec!(30.00), None);
        let totals = compute_totals(dec!(12.50), Some(&c), dec!(5.00));
        assert_eq!(totals.discount_amount, dec!(12.50));
        assert_eq!(totals.total_amount, dec!(5.00));
    }

    #[test]
    fn free_shipping_zeroes_shipping_only() {
        let c = coupon(DiscountType::FreeShipping, Decimal::ZERO, None);
        let totals = compute_totals(dec!(40.00), Some(&c), dec!(5.00));
        assert_eq!(totals.discount_amount, Decimal::ZERO);
        assert_eq!(totals.shipping_cost, Decimal::ZERO);
        assert_eq!(totals.total_amount, dec!(40.00));
    }

    #[test]
    fn rounds_half_cents_away_from_zero() {
        assert_eq!(round_money(dec!(0.125)), dec!(0.13));
        assert_eq!(round_money(dec!(2.675)), dec!(2.68));
        let c = coupon(DiscountType::Percentage, dec!(15), None);
        // 15% of 10.10 = 1.515
        assert_eq!(discount_for(&c, dec!(10.10)), dec!(1.52));
    }

    fn money() -> impl Strategy<Value = Decimal> {
        (0i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn totals_are_never_negative_and_add_up(
            subtotal in money(),
            shipping in money(),
            value in money(),
            kind in prop_oneof![
                Just(DiscountType::Percentage),
                Just(DiscountType::FixedAmount),
                Just(DiscountType::FreeShipping),
            ],
        ) {
            let c = coupon(kind, value, None);
            let totals = compute_totals(subtotal, Some(&c), shipping);

            prop_assert!(totals.total_amount >= Decimal::ZERO);
            prop_assert!(totals.discount_amount >= Decimal::ZERO);
            prop_assert!(totals.discount_amount <= totals.subtotal);
            prop_assert_eq!(
                totals.total_amount,
                totals.subtotal - totals.discount_amount + totals.shipping_cost
            );
        }

        #[test]
        fn pricing_is_deterministic(subtotal in money(), value in 0i64..100) {
            let c = coupon(DiscountType::Percentage, Decimal::from(value), None);
            prop_assert_eq!(
                compute_totals(subtotal, Some(&c), dec!(5.00)),
                compute_totals(subtotal, Some(&c), dec!(5.00))
            );
        }
    }
}
