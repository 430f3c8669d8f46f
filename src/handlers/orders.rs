use super::common::{created_response, map_service_error, success_response, validate_input};
use crate::{
    auth::Actor,
    entities::{
        order::{Model as OrderModel, OrderStatus, PaymentStatus},
        order_history::Model as OrderHistoryModel,
        order_item::Model as OrderItemModel,
    },
    errors::ApiError,
    services::orders::{OrderDetails, PlaceOrderInput},
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(place_order))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_order_status))
        .route("/:id/cancel", post(cancel_order))
}

/// Order header as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub shipping_cost: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub coupon_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<&OrderModel> for OrderSummary {
    fn from(order: &OrderModel) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            status: order.status,
            payment_status: order.payment_status,
            subtotal: order.subtotal,
            discount_amount: order.discount_amount,
            shipping_cost: order.shipping_cost,
            total_amount: order.total_amount,
            currency: order.currency.clone(),
            coupon_id: order.coupon_id,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineResponse {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub price_at_purchase: Decimal,
    pub line_total: Decimal,
}

impl From<&OrderItemModel> for OrderLineResponse {
    fn from(item: &OrderItemModel) -> Self {
        Self {
            variant_id: item.variant_id,
            product_id: item.product_id,
            sku: item.sku.clone(),
            name: item.name.clone(),
            quantity: item.quantity,
            price_at_purchase: item.price_at_purchase,
            line_total: item.price_at_purchase * Decimal::from(item.quantity),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderHistoryEntry {
    pub status: OrderStatus,
    pub changed_by: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&OrderHistoryModel> for OrderHistoryEntry {
    fn from(entry: &OrderHistoryModel) -> Self {
        Self {
            status: entry.status,
            changed_by: entry.changed_by,
            note: entry.note.clone(),
            created_at: entry.created_at,
        }
    }
}

/// Order with its lines and status history
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetailsResponse {
    pub order: OrderSummary,
    pub items: Vec<OrderLineResponse>,
    pub history: Vec<OrderHistoryEntry>,
}

impl From<&OrderDetails> for OrderDetailsResponse {
    fn from(details: &OrderDetails) -> Self {
        Self {
            order: OrderSummary::from(&details.order),
            items: details.items.iter().map(OrderLineResponse::from).collect(),
            history: details.history.iter().map(OrderHistoryEntry::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CancelOrderRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 500, message = "Reason must be 1-500 characters"))]
    pub reason: Option<String>,
}

/// Place an order from the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Place order",
    description = "Turn the caller's active cart into a pending order, reserving stock and spending the coupon if one is given",
    request_body = PlaceOrderInput,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderSummary>),
        (status = 400, description = "Empty cart, invalid coupon or invalid input", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent update, retry", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn place_order(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<PlaceOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let placed = state
        .services
        .orders
        .place_order(actor.user_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(OrderSummary::from(&placed.order)))
}

/// Get an order with its lines and history
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderDetailsResponse>),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse),
        (status = 403, description = "Order belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<impl IntoResponse, ApiError> {
    let details = state
        .services
        .orders
        .get_order(id, &actor)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(OrderDetailsResponse::from(&details)))
}

/// Move an order to a new status (staff only)
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderSummary>),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    actor.require_admin()?;
    let order = state
        .services
        .orders
        .update_order_status(id, payload.status, actor.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(OrderSummary::from(&order)))
}

/// Cancel an order, returning its stock and coupon use
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    summary = "Cancel order",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderSummary>),
        (status = 403, description = "Order belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order can no longer be cancelled", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<CancelOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let order = state
        .services
        .orders
        .cancel_order(id, &actor, payload.reason)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(OrderSummary::from(&order)))
}
