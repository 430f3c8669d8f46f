use crate::{
    auth::Actor,
    config::AppConfig,
    db,
    entities::{
        inventory_log::InventoryChangeType,
        order::{self, Model as OrderModel, OrderStatus, PaymentStatus},
        order_history::Model as OrderHistoryModel,
        order_item::{self, Model as OrderItemModel},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{CartSnapshot, NewInventoryLogEntry, Stores},
    services::commerce::{
        compute_totals, CouponCandidate, CouponValidator, OrderTotals,
    },
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, DatabaseTransaction, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Request to turn the caller's cart into an order
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderInput {
    pub shipping_address_id: Uuid,
    #[validate(length(min = 1, max = 64, message = "Coupon code must be 1-64 characters"))]
    pub coupon_code: Option<String>,
}

/// A freshly placed order and its lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedOrder {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

/// An order with everything recorded about it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderDetails {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
    pub history: Vec<OrderHistoryModel>,
}

/// Order settings taken from configuration.
#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub default_shipping_cost: Decimal,
    pub currency: String,
    pub lock_timeout: Duration,
}

impl From<&AppConfig> for OrderSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            default_shipping_cost: cfg.default_shipping_cost,
            currency: cfg.currency.clone(),
            lock_timeout: Duration::from_millis(cfg.lock_timeout_ms),
        }
    }
}

/// Places, updates and cancels orders. Each operation is one database
/// transaction; events go out only after it commits.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    stores: Stores,
    coupon_validator: CouponValidator,
    event_sender: Arc<EventSender>,
    settings: OrderSettings,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        stores: Stores,
        event_sender: Arc<EventSender>,
        settings: OrderSettings,
    ) -> Self {
        let coupon_validator =
            CouponValidator::new(stores.coupons.clone(), stores.coupon_usage.clone());
        Self {
            db,
            stores,
            coupon_validator,
            event_sender,
            settings,
        }
    }

    /// Converts the user's cart into a pending, unpaid order.
    ///
    /// Stock for every line is checked and reserved under row locks, the
    /// coupon (if any) is validated and spent, and the cart is emptied, all
    /// in a single transaction. Nothing is left behind on failure.
    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        input: PlaceOrderInput,
    ) -> Result<PlacedOrder, ServiceError> {
        input.validate()?;

        let txn = db::begin_locking_transaction(&self.db, self.settings.lock_timeout).await?;
        let result = self.place_order_in(&txn, user_id, input, Utc::now()).await;
        let (placed, events) = db::finish(txn, result).await.map_err(|e| {
            counter!("storefront.orders.rejected", 1, "reason" => e.code());
            e
        })?;

        counter!("storefront.orders.placed", 1);
        info!(
            order_id = %placed.order.id,
            order_number = %placed.order.order_number,
            total = %placed.order.total_amount,
            "Order placed"
        );

        for event in events {
            self.event_sender.send_or_log(event).await;
        }
        Ok(placed)
    }

    async fn place_order_in(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        input: PlaceOrderInput,
        now: DateTime<Utc>,
    ) -> Result<(PlacedOrder, Vec<Event>), ServiceError> {
        let cart = match self.stores.carts.snapshot_for_user(txn, user_id).await? {
            Some(cart) if !cart.is_empty() => cart,
            _ => return Err(ServiceError::EmptyCart),
        };

        let mut stock = self.lock_and_check_stock(txn, &cart).await?;

        let subtotal: Decimal = cart.items.iter().map(|line| line.line_total()).sum();

        let coupon = match input.coupon_code.as_deref() {
            Some(code) => {
                let candidate = CouponCandidate::from_cart(user_id, &cart, subtotal);
                let scoped = self
                    .coupon_validator
                    .validate(txn, code, &candidate, now)
                    .await?;
                self.stores
                    .coupons
                    .increment_used(txn, scoped.coupon.id)
                    .await?;
                self.stores
                    .coupon_usage
                    .increment_usage(
                        txn,
                        user_id,
                        scoped.coupon.id,
                        scoped.coupon.usage_limit_per_user,
                    )
                    .await?;
                Some(scoped.coupon)
            }
            None => None,
        };

        let totals: OrderTotals = compute_totals(
            subtotal,
            coupon.as_ref(),
            self.settings.default_shipping_cost,
        );

        let order_id = Uuid::new_v4();
        let order_number = order_number(order_id, now);
        let order = self
            .stores
            .orders
            .insert_order(
                txn,
                order::ActiveModel {
                    id: Set(order_id),
                    order_number: Set(order_number.clone()),
                    user_id: Set(user_id),
                    status: Set(OrderStatus::Pending),
                    payment_status: Set(PaymentStatus::Unpaid),
                    subtotal: Set(totals.subtotal),
                    discount_amount: Set(totals.discount_amount),
                    shipping_cost: Set(totals.shipping_cost),
                    total_amount: Set(totals.total_amount),
                    currency: Set(self.settings.currency.clone()),
                    shipping_address_id: Set(input.shipping_address_id),
                    coupon_id: Set(coupon.as_ref().map(|c| c.id)),
                    created_at: Set(now),
                    updated_at: Set(now),
                },
            )
            .await?;

        self.stores
            .orders
            .append_history(
                txn,
                order_id,
                OrderStatus::Pending,
                Some(user_id),
                Some("Order created".to_string()),
            )
            .await?;

        let items = self
            .stores
            .orders
            .insert_items(
                txn,
                cart.items
                    .iter()
                    .map(|line| order_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        order_id: Set(order_id),
                        variant_id: Set(line.variant_id),
                        product_id: Set(line.product_id),
                        sku: Set(line.sku.clone()),
                        name: Set(line.name.clone()),
                        quantity: Set(line.quantity),
                        price_at_purchase: Set(line.unit_price),
                    })
                    .collect(),
            )
            .await?;

        let mut events = vec![Event::OrderCreated {
            order_id,
            user_id,
            total_amount: order.total_amount,
        }];

        for line in &cart.items {
            let old = stock.get(&line.variant_id).copied().unwrap_or(line.stock_available);
            self.stores
                .variants
                .decrement_stock(txn, line.variant_id, line.quantity)
                .await
                .map_err(|e| match e {
                    ServiceError::InsufficientStock(_) => {
                        ServiceError::InsufficientStock(line.name.clone())
                    }
                    other => other,
                })?;
            self.stores
                .ledger
                .record(
                    txn,
                    NewInventoryLogEntry {
                        product_id: line.product_id,
                        variant_id: line.variant_id,
                        order_id: Some(order_id),
                        change_type: InventoryChangeType::Reserve,
                        quantity_change: -line.quantity,
                        old_stock_quantity: old,
                        changed_by_user_id: Some(user_id),
                        description: format!("Reserved for order {}", order_number),
                    },
                )
                .await?;
            let remaining = old - line.quantity;
            stock.insert(line.variant_id, remaining);

            events.push(Event::InventoryReserved {
                variant_id: line.variant_id,
                order_id,
                quantity: line.quantity,
                remaining,
            });
        }

        if let Some(coupon) = &coupon {
            events.push(Event::CouponRedeemed {
                coupon_id: coupon.id,
                user_id,
                order_id,
            });
        }

        self.stores.carts.clear_cart(txn, cart.cart_id).await?;

        Ok((PlacedOrder { order, items }, events))
    }

    /// Locks every variant in the cart and checks each line against the
    /// locked stock. Returns the locked stock levels keyed by variant.
    async fn lock_and_check_stock(
        &self,
        txn: &DatabaseTransaction,
        cart: &CartSnapshot,
    ) -> Result<HashMap<Uuid, i32>, ServiceError> {
        let ids: Vec<Uuid> = cart.items.iter().map(|line| line.variant_id).collect();
        let locked: HashMap<Uuid, i32> = self
            .stores
            .variants
            .lock_for_update(txn, &ids)
            .await?
            .into_iter()
            .map(|variant| (variant.id, variant.stock_quantity))
            .collect();

        for line in &cart.items {
            let available = locked.get(&line.variant_id).copied().ok_or_else(|| {
                ServiceError::NotFound(format!("Variant {} not found", line.variant_id))
            })?;
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Invalid quantity {} for {}",
                    line.quantity, line.name
                )));
            }
            if available < line.quantity {
                warn!(
                    variant_id = %line.variant_id,
                    requested = line.quantity,
                    available,
                    "Insufficient stock"
                );
                return Err(ServiceError::InsufficientStock(line.name.clone()));
            }
        }

        Ok(locked)
    }

    /// Moves an order to a new status and records who did it.
    ///
    /// Cancellation has its own compensation and must go through
    /// [`OrderService::cancel_order`]. Cancelled and refunded orders stay put,
    /// and a delivered order can only be refunded.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        changed_by: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        if new_status == OrderStatus::Cancelled {
            return Err(ServiceError::InvalidTransition(
                "use the cancel operation to cancel an order".to_string(),
            ));
        }

        let txn = db::begin_locking_transaction(&self.db, self.settings.lock_timeout).await?;
        let result = async {
            let order = self
                .stores
                .orders
                .find_for_update(&txn, order_id)
                .await?
                .ok_or(ServiceError::OrderNotFound(order_id))?;
            let old_status = order.status;

            if old_status == new_status {
                return Ok((order, None));
            }
            if !old_status.can_move_to(new_status) {
                return Err(ServiceError::InvalidTransition(format!(
                    "order {} cannot move from {} to {}",
                    order_id, old_status, new_status
                )));
            }

            let updated = self
                .stores
                .orders
                .set_status(&txn, order, new_status)
                .await?;
            self.stores
                .orders
                .append_history(&txn, order_id, new_status, Some(changed_by), None)
                .await?;
            Ok((updated, Some(old_status)))
        }
        .await;
        let (order, old_status) = db::finish(txn, result).await?;

        if let Some(old_status) = old_status {
            info!(%old_status, "Order status updated successfully");
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status,
                    new_status,
                })
                .await;
        }
        Ok(order)
    }

    /// Cancels an order and undoes what placing it did: stock goes back to
    /// the variants (with `restock` ledger entries) and the coupon use is
    /// released.
    #[instrument(skip(self, reason), fields(order_id = %order_id, actor = %actor.user_id))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let txn = db::begin_locking_transaction(&self.db, self.settings.lock_timeout).await?;
        let result = self.cancel_order_in(&txn, order_id, actor, reason).await;
        let (order, events) = db::finish(txn, result).await?;

        counter!("storefront.orders.cancelled", 1);
        info!("Order cancelled");

        for event in events {
            self.event_sender.send_or_log(event).await;
        }
        Ok(order)
    }

    async fn cancel_order_in(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<(OrderModel, Vec<Event>), ServiceError> {
        let order = self
            .stores
            .orders
            .find_for_update(txn, order_id)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;

        if !actor.can_access(order.user_id) {
            return Err(ServiceError::AccessDenied(format!(
                "order {} belongs to another user",
                order_id
            )));
        }
        if order.status.is_final() {
            return Err(ServiceError::InvalidTransition(format!(
                "cannot cancel an order that is {}",
                order.status
            )));
        }

        let items = self.stores.orders.find_items(txn, order_id).await?;
        let ids: Vec<Uuid> = items.iter().map(|item| item.variant_id).collect();
        let mut stock: HashMap<Uuid, i32> = self
            .stores
            .variants
            .lock_for_update(txn, &ids)
            .await?
            .into_iter()
            .map(|variant| (variant.id, variant.stock_quantity))
            .collect();

        let mut events = vec![Event::OrderCancelled {
            order_id,
            cancelled_by: actor.user_id,
        }];

        for item in &items {
            let old = stock.get(&item.variant_id).copied().ok_or_else(|| {
                ServiceError::NotFound(format!("Variant {} not found", item.variant_id))
            })?;
            self.stores
                .variants
                .increment_stock(txn, item.variant_id, item.quantity)
                .await?;
            self.stores
                .ledger
                .record(
                    txn,
                    NewInventoryLogEntry {
                        product_id: item.product_id,
                        variant_id: item.variant_id,
                        order_id: Some(order_id),
                        change_type: InventoryChangeType::Restock,
                        quantity_change: item.quantity,
                        old_stock_quantity: old,
                        changed_by_user_id: Some(actor.user_id),
                        description: format!("Restocked from cancelled order {}", order.order_number),
                    },
                )
                .await?;
            stock.insert(item.variant_id, old + item.quantity);
            events.push(Event::InventoryRestocked {
                variant_id: item.variant_id,
                order_id,
                quantity: item.quantity,
            });
        }

        if let Some(coupon_id) = order.coupon_id {
            self.stores.coupons.decrement_used(txn, coupon_id).await?;
            self.stores
                .coupon_usage
                .decrement_usage(txn, order.user_id, coupon_id)
                .await?;
            events.push(Event::CouponReleased {
                coupon_id,
                user_id: order.user_id,
                order_id,
            });
        }

        let owner = order.user_id;
        let cancelled = self
            .stores
            .orders
            .set_status(txn, order, OrderStatus::Cancelled)
            .await?;
        self.stores
            .orders
            .append_history(
                txn,
                order_id,
                OrderStatus::Cancelled,
                Some(actor.user_id),
                Some(reason.unwrap_or_else(|| {
                    if actor.user_id == owner {
                        "Cancelled by customer".to_string()
                    } else {
                        "Cancelled by staff".to_string()
                    }
                })),
            )
            .await?;

        Ok((cancelled, events))
    }

    /// Order, lines and status history, visible to the owner and admins.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        actor: &Actor,
    ) -> Result<OrderDetails, ServiceError> {
        let txn = self.db.begin().await?;
        let result = async {
            let order = self
                .stores
                .orders
                .find_by_id(&txn, order_id)
                .await?
                .ok_or(ServiceError::OrderNotFound(order_id))?;
            if !actor.can_access(order.user_id) {
                return Err(ServiceError::AccessDenied(format!(
                    "order {} belongs to another user",
                    order_id
                )));
            }
            let items = self.stores.orders.find_items(&txn, order_id).await?;
            let history = self.stores.orders.history(&txn, order_id).await?;
            Ok(OrderDetails {
                order,
                items,
                history,
            })
        }
        .await;
        db::finish(txn, result).await
    }
}

/// Human-facing order number, e.g. `ORD-20250101-9F3A1C2B`.
fn order_number(order_id: Uuid, now: DateTime<Utc>) -> String {
    let suffix: String = order_id.simple().to_string()[..8].to_ascii_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}
