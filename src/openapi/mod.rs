use utoipa::OpenApi;

use crate::{
    entities::order::{OrderStatus, PaymentStatus},
    errors::ErrorResponse,
    handlers::{
        commerce::carts::UpdateCartItemRequest,
        orders::{
            CancelOrderRequest, OrderDetailsResponse, OrderHistoryEntry, OrderLineResponse,
            OrderSummary, UpdateOrderStatusRequest,
        },
    },
    repositories::{CartLine, CartSnapshot},
    services::{
        commerce::AddToCartInput,
        inventory::{AdjustStockInput, LedgerDiscrepancy, ReconciliationReport, StockAdjustment},
        orders::PlaceOrderInput,
    },
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
Order placement core for the storefront.

Callers are identified by headers set by the gateway:
- `x-user-id`: signed-in user (UUID)
- `x-user-role`: `admin` for staff
- `x-session-id`: anonymous shopping session (cart routes only)

Errors share one body shape with a stable `code`, e.g. `insufficient_stock`
or `coupon_expired`. A `409` with code `conflict` means the request raced
another update and may be retried as-is.
"#
    ),
    paths(
        crate::handlers::orders::place_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::cancel_order,
        crate::handlers::commerce::carts::get_cart,
        crate::handlers::commerce::carts::add_to_cart,
        crate::handlers::commerce::carts::update_cart_item,
        crate::handlers::inventory::reconcile_variant,
        crate::handlers::inventory::adjust_variant_stock,
    ),
    components(schemas(
        ErrorResponse,
        OrderStatus,
        PaymentStatus,
        PlaceOrderInput,
        OrderSummary,
        OrderLineResponse,
        OrderHistoryEntry,
        OrderDetailsResponse,
        UpdateOrderStatusRequest,
        CancelOrderRequest,
        CartLine,
        CartSnapshot,
        AddToCartInput,
        UpdateCartItemRequest,
        AdjustStockInput,
        StockAdjustment,
        LedgerDiscrepancy,
        ReconciliationReport,
    )),
    tags(
        (name = "orders", description = "Order placement and lifecycle"),
        (name = "cart", description = "Shopping cart"),
        (name = "inventory", description = "Stock adjustments and ledger audits"),
    )
)]
pub struct ApiDoc;
