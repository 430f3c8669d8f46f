/// Commerce entities module
pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod coupon_category;
pub mod coupon_product;
pub mod coupon_user;
pub mod product_variant;
pub mod user_coupon_usage;

// Re-export entities
pub use super::product::{Entity as Product, Model as ProductModel};
pub use cart::{CartStatus, Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use coupon::{DiscountType, Entity as Coupon, Model as CouponModel};
pub use coupon_category::Entity as CouponCategory;
pub use coupon_product::Entity as CouponProduct;
pub use coupon_user::Entity as CouponUser;
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
pub use user_coupon_usage::{Entity as UserCouponUsage, Model as UserCouponUsageModel};
