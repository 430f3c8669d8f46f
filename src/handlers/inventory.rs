use super::common::{created_response, map_service_error, success_response, validate_input};
use crate::{
    auth::Actor,
    errors::ApiError,
    services::inventory::{AdjustStockInput, ReconciliationReport, StockAdjustment},
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

pub fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/variants/:id/reconciliation", get(reconcile_variant))
        .route("/variants/:id/adjustments", post(adjust_variant_stock))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileQuery {
    /// Stock level to replay from; defaults to where the ledger starts
    pub opening_stock: Option<i32>,
}

/// Replay a variant's inventory ledger against its live stock (staff only)
#[utoipa::path(
    get,
    path = "/api/v1/inventory/variants/{id}/reconciliation",
    params(("id" = Uuid, Path, description = "Variant ID"), ReconcileQuery),
    responses(
        (status = 200, description = "Reconciliation report", body = ApiResponse<ReconciliationReport>),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Variant not found", body = crate::errors::ErrorResponse),
    ),
    tag = "inventory"
)]
pub async fn reconcile_variant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ReconcileQuery>,
    actor: Actor,
) -> Result<impl IntoResponse, ApiError> {
    actor.require_admin()?;
    let report = state
        .services
        .inventory
        .reconcile(id, query.opening_stock)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(report))
}

/// Correct a variant's stock by hand (staff only)
#[utoipa::path(
    post,
    path = "/api/v1/inventory/variants/{id}/adjustments",
    params(("id" = Uuid, Path, description = "Variant ID")),
    request_body = AdjustStockInput,
    responses(
        (status = 201, description = "Stock adjusted", body = ApiResponse<StockAdjustment>),
        (status = 400, description = "Invalid adjustment", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Variant not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Adjustment would make stock negative", body = crate::errors::ErrorResponse),
    ),
    tag = "inventory"
)]
pub async fn adjust_variant_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<AdjustStockInput>,
) -> Result<impl IntoResponse, ApiError> {
    actor.require_admin()?;
    validate_input(&payload)?;
    let adjustment = state
        .services
        .inventory
        .adjust_stock(id, payload, actor.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(adjustment))
}
