pub mod commerce;
pub mod common;
pub mod health;
pub mod inventory;
pub mod orders;

use crate::{
    config::AppConfig,
    events::EventSender,
    openapi::ApiDoc,
    repositories::Stores,
    services::{commerce::CartService, orders::OrderSettings, InventoryService, OrderService},
    AppState,
};
use axum::{routing::get, Json, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use utoipa::OpenApi;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub carts: Arc<CartService>,
    pub inventory: Arc<InventoryService>,
}

impl AppServices {
    /// Wires every service to the SeaORM-backed stores.
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
    ) -> Self {
        Self::with_stores(db, Stores::sea_orm(), event_sender, config)
    }

    pub fn with_stores(
        db: Arc<DatabaseConnection>,
        stores: Stores,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
    ) -> Self {
        let carts = Arc::new(CartService::new(
            db.clone(),
            stores.carts.clone(),
            stores.variants.clone(),
        ));
        let inventory = Arc::new(InventoryService::new(
            db.clone(),
            stores.variants.clone(),
            stores.ledger.clone(),
            event_sender.clone(),
            config,
        ));
        let orders = Arc::new(OrderService::new(
            db,
            stores,
            event_sender,
            OrderSettings::from(config),
        ));

        Self {
            orders,
            carts,
            inventory,
        }
    }
}

/// Every route the service exposes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::health_routes())
        .nest("/api/v1/orders", orders::orders_routes())
        .nest("/api/v1/cart", commerce::carts::carts_routes())
        .nest("/api/v1/inventory", inventory::inventory_routes())
        .route("/api-docs/openapi.json", get(openapi_json))
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
