use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::commerce::{
    cart, cart_item, Cart, CartItem, CartModel, CartStatus, Product, ProductVariant,
};
use crate::entities::product;
use crate::errors::ServiceError;

/// One cart line with the variant data current at the time the snapshot was
/// taken.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub sku: String,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    pub stock_available: i32,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Read-only view of a cart used to price and place an order.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub cart_id: Uuid,
    pub items: Vec<CartLine>,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
}

impl CartSnapshot {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
pub trait CartStore: Send + Sync {
    /// Most recently touched active cart owned by `user_id`.
    async fn find_active_by_user(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
    ) -> Result<Option<CartModel>, ServiceError>;

    /// Active guest cart for an anonymous session.
    async fn find_active_by_session(
        &self,
        txn: &DatabaseTransaction,
        session_id: &str,
    ) -> Result<Option<CartModel>, ServiceError>;

    async fn create_cart(
        &self,
        txn: &DatabaseTransaction,
        user_id: Option<Uuid>,
        session_id: Option<String>,
    ) -> Result<CartModel, ServiceError>;

    /// Hands a guest cart to a user.
    async fn claim(
        &self,
        txn: &DatabaseTransaction,
        cart_id: Uuid,
        user_id: Uuid,
    ) -> Result<CartModel, ServiceError>;

    async fn set_status(
        &self,
        txn: &DatabaseTransaction,
        cart_id: Uuid,
        status: CartStatus,
    ) -> Result<(), ServiceError>;

    /// Adds `quantity` to the line for `variant_id`, creating it if needed.
    async fn add_quantity(
        &self,
        txn: &DatabaseTransaction,
        cart_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError>;

    /// Overwrites a line's quantity; zero or less removes the line. Returns
    /// false when the cart has no line for the variant.
    async fn set_quantity(
        &self,
        txn: &DatabaseTransaction,
        cart_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<bool, ServiceError>;

    async fn items(
        &self,
        txn: &DatabaseTransaction,
        cart_id: Uuid,
    ) -> Result<Vec<cart_item::Model>, ServiceError>;

    async fn snapshot(
        &self,
        txn: &DatabaseTransaction,
        cart_id: Uuid,
    ) -> Result<CartSnapshot, ServiceError>;

    /// Snapshot of the user's active cart, if they have one.
    async fn snapshot_for_user(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
    ) -> Result<Option<CartSnapshot>, ServiceError> {
        match self.find_active_by_user(txn, user_id).await? {
            Some(cart) => Ok(Some(self.snapshot(txn, cart.id).await?)),
            None => Ok(None),
        }
    }

    async fn clear_cart(&self, txn: &DatabaseTransaction, cart_id: Uuid)
        -> Result<(), ServiceError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SeaOrmCartStore;

#[async_trait]
impl CartStore for SeaOrmCartStore {
    async fn find_active_by_user(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
    ) -> Result<Option<CartModel>, ServiceError> {
        Ok(Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .order_by_desc(cart::Column::UpdatedAt)
            .one(txn)
            .await?)
    }

    async fn find_active_by_session(
        &self,
        txn: &DatabaseTransaction,
        session_id: &str,
    ) -> Result<Option<CartModel>, ServiceError> {
        Ok(Cart::find()
            .filter(cart::Column::SessionId.eq(session_id))
            .filter(cart::Column::UserId.is_null())
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .order_by_desc(cart::Column::UpdatedAt)
            .one(txn)
            .await?)
    }

    async fn create_cart(
        &self,
        txn: &DatabaseTransaction,
        user_id: Option<Uuid>,
        session_id: Option<String>,
    ) -> Result<CartModel, ServiceError> {
        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            session_id: Set(session_id),
            status: Set(CartStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(cart.insert(txn).await?)
    }

    async fn claim(
        &self,
        txn: &DatabaseTransaction,
        cart_id: Uuid,
        user_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        let cart = Cart::find_by_id(cart_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        let mut active: cart::ActiveModel = cart.into();
        active.user_id = Set(Some(user_id));
        active.updated_at = Set(Utc::now());
        Ok(active.update(txn).await?)
    }

    async fn set_status(
        &self,
        txn: &DatabaseTransaction,
        cart_id: Uuid,
        status: CartStatus,
    ) -> Result<(), ServiceError> {
        Cart::update_many()
            .col_expr(cart::Column::Status, Expr::value(status))
            .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart::Column::Id.eq(cart_id))
            .exec(txn)
            .await?;
        Ok(())
    }

    async fn add_quantity(
        &self,
        txn: &DatabaseTransaction,
        cart_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::VariantId.eq(variant_id))
            .one(txn)
            .await?;

        if let Some(item) = existing {
            let current_quantity = item.quantity;
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(current_quantity.saturating_add(quantity));
            item.updated_at = Set(now);
            item.update(txn).await?;
        } else {
            cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart_id),
                variant_id: Set(variant_id),
                quantity: Set(quantity),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(txn)
            .await?;
        }

        touch(txn, cart_id).await
    }

    async fn set_quantity(
        &self,
        txn: &DatabaseTransaction,
        cart_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<bool, ServiceError> {
        let Some(item) = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::VariantId.eq(variant_id))
            .one(txn)
            .await?
        else {
            return Ok(false);
        };

        if quantity <= 0 {
            CartItem::delete_by_id(item.id).exec(txn).await?;
        } else {
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.updated_at = Set(Utc::now());
            item.update(txn).await?;
        }

        touch(txn, cart_id).await?;
        Ok(true)
    }

    async fn items(
        &self,
        txn: &DatabaseTransaction,
        cart_id: Uuid,
    ) -> Result<Vec<cart_item::Model>, ServiceError> {
        Ok(CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .order_by_asc(cart_item::Column::Id)
            .all(txn)
            .await?)
    }

    async fn snapshot(
        &self,
        txn: &DatabaseTransaction,
        cart_id: Uuid,
    ) -> Result<CartSnapshot, ServiceError> {
        let rows = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .order_by_asc(cart_item::Column::Id)
            .find_also_related(ProductVariant)
            .all(txn)
            .await?;

        let product_ids: Vec<Uuid> = rows
            .iter()
            .filter_map(|(_, variant)| variant.as_ref().map(|v| v.product_id))
            .collect();

        let categories: HashMap<Uuid, Option<Uuid>> = if product_ids.is_empty() {
            HashMap::new()
        } else {
            Product::find()
                .filter(product::Column::Id.is_in(product_ids))
                .all(txn)
                .await?
                .into_iter()
                .map(|p| (p.id, p.category_id))
                .collect()
        };

        let mut items = Vec::with_capacity(rows.len());
        for (item, variant) in rows {
            let Some(variant) = variant else {
                warn!(cart_id = %cart_id, variant_id = %item.variant_id, "Cart line points at a missing variant");
                continue;
            };
            items.push(CartLine {
                variant_id: variant.id,
                product_id: variant.product_id,
                category_id: categories.get(&variant.product_id).copied().flatten(),
                name: variant.name,
                sku: variant.sku,
                quantity: item.quantity,
                unit_price: variant.price,
                stock_available: variant.stock_quantity,
            });
        }

        let total_amount = items.iter().map(CartLine::line_total).sum();

        Ok(CartSnapshot {
            cart_id,
            items,
            total_amount,
        })
    }

    async fn clear_cart(
        &self,
        txn: &DatabaseTransaction,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(txn)
            .await?;
        touch(txn, cart_id).await
    }
}

async fn touch(txn: &DatabaseTransaction, cart_id: Uuid) -> Result<(), ServiceError> {
    Cart::update_many()
        .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(cart::Column::Id.eq(cart_id))
        .exec(txn)
        .await?;
    Ok(())
}
