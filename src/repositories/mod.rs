//! Storage interfaces, one per entity, each exposing only what the order
//! core needs. Every method runs on the caller's transaction so a service
//! can compose several stores into one atomic unit of work.

use std::sync::Arc;

pub mod cart_repository;
pub mod coupon_repository;
pub mod coupon_usage_repository;
pub mod inventory_log_repository;
pub mod order_repository;
pub mod variant_repository;

pub use cart_repository::{CartLine, CartSnapshot, CartStore, SeaOrmCartStore};
pub use coupon_repository::{CouponStore, CouponWithScope, SeaOrmCouponStore};
pub use coupon_usage_repository::{CouponUsageStore, SeaOrmCouponUsageStore};
pub use inventory_log_repository::{InventoryLedger, NewInventoryLogEntry, SeaOrmInventoryLedger};
pub use order_repository::{OrderStore, SeaOrmOrderStore};
pub use variant_repository::{SeaOrmVariantStore, VariantStore};

/// The full set of stores handed to the services.
#[derive(Clone)]
pub struct Stores {
    pub variants: Arc<dyn VariantStore>,
    pub coupons: Arc<dyn CouponStore>,
    pub coupon_usage: Arc<dyn CouponUsageStore>,
    pub carts: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderStore>,
    pub ledger: Arc<dyn InventoryLedger>,
}

impl Stores {
    /// Stores backed by the SeaORM entities.
    pub fn sea_orm() -> Self {
        Self {
            variants: Arc::new(SeaOrmVariantStore),
            coupons: Arc::new(SeaOrmCouponStore),
            coupon_usage: Arc::new(SeaOrmCouponUsageStore),
            carts: Arc::new(SeaOrmCartStore),
            orders: Arc::new(SeaOrmOrderStore),
            ledger: Arc::new(SeaOrmInventoryLedger),
        }
    }
}

impl Default for Stores {
    fn default() -> Self {
        Self::sea_orm()
    }
}
