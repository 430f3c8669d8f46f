use crate::handlers::common::{map_service_error, success_response, validate_input};
use crate::{
    auth::CartOwner,
    errors::ApiError,
    repositories::CartSnapshot,
    services::commerce::AddToCartInput,
    ApiResponse, AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_to_cart))
        .route("/items/:variant_id", put(update_cart_item))
}

/// Request body for changing a cart line
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    /// New quantity; zero removes the line
    pub quantity: i32,
}

/// Get the caller's cart, merging a guest cart after login
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Current cart", body = ApiResponse<CartSnapshot>),
        (status = 401, description = "Neither user nor session given", body = crate::errors::ErrorResponse),
    ),
    tag = "cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    owner: CartOwner,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .carts
        .view_cart(owner.user_id, owner.session_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

/// Add a variant to the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    request_body = AddToCartInput,
    responses(
        (status = 200, description = "Item added", body = ApiResponse<CartSnapshot>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Variant not found", body = crate::errors::ErrorResponse),
    ),
    tag = "cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    owner: CartOwner,
    Json(payload): Json<AddToCartInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let cart = state
        .services
        .carts
        .add_item(owner.user_id, owner.session_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

/// Change or remove a cart line
#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{variant_id}",
    params(("variant_id" = Uuid, Path, description = "Variant ID")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Cart updated", body = ApiResponse<CartSnapshot>),
        (status = 404, description = "Variant is not in the cart", body = crate::errors::ErrorResponse),
    ),
    tag = "cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
    owner: CartOwner,
    Json(payload): Json<UpdateCartItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .carts
        .update_item_quantity(owner.user_id, owner.session_id, variant_id, payload.quantity)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}
