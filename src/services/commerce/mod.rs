/// Commerce services module - cart, coupon and pricing rules
pub mod cart_service;
pub mod coupon_validation_service;
pub mod pricing_service;

// Re-export services for convenience
pub use cart_service::{AddToCartInput, CartResolution, CartService, CartTransition, ResolvedCart};
pub use coupon_validation_service::{evaluate_coupon, CouponCandidate, CouponValidator};
pub use pricing_service::{compute_totals, discount_for, round_money, OrderTotals};
