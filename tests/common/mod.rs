#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde_json::Value;
use storefront_api::{
    auth::{SESSION_ID_HEADER, USER_ID_HEADER, USER_ROLE_HEADER},
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        commerce::{
            coupon, coupon_category, coupon_product, coupon_user, product_variant,
            user_coupon_usage, Coupon, CouponModel, DiscountType, ProductVariant,
            ProductVariantModel, UserCouponUsage,
        },
        inventory_log::{self, Model as InventoryLogModel},
        order, product,
    },
    events::Event,
    handlers::{self, AppServices},
    services::{commerce::AddToCartInput, orders::PlaceOrderInput},
    AppState,
};
use tempfile::TempDir;
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

/// Application state on a throwaway SQLite file. The pool holds a single
/// connection, so transactions run one at a time like row locks would force
/// them to on PostgreSQL.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    events: Mutex<mpsc::Receiver<Event>>,
    _dir: TempDir,
}

/// Coupon fixture with everything optional except the discount.
#[derive(Debug, Clone)]
pub struct CouponSeed {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub max_discount_amount: Option<Decimal>,
    pub min_order_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub usage_limit_per_user: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub product_ids: Vec<Uuid>,
    pub category_ids: Vec<Uuid>,
    pub user_ids: Vec<Uuid>,
}

impl CouponSeed {
    pub fn new(code: &str, discount_type: DiscountType, discount_value: Decimal) -> Self {
        Self {
            code: code.to_string(),
            discount_type,
            discount_value,
            max_discount_amount: None,
            min_order_amount: None,
            usage_limit: None,
            used_count: 0,
            usage_limit_per_user: None,
            start_date: None,
            end_date: None,
            product_ids: Vec::new(),
            category_ids: Vec::new(),
            user_ids: Vec::new(),
        }
    }

    pub fn percentage(code: &str, percent: Decimal) -> Self {
        Self::new(code, DiscountType::Percentage, percent)
    }
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("storefront_test.db");
        let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

        let config = AppConfig::new(
            database_url.clone(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );

        let pool = db::establish_connection_with_config(&DbConfig {
            url: database_url,
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            ..DbConfig::default()
        })
        .await
        .expect("failed to create test database");

        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(1024);
        let event_sender = Arc::new(storefront_api::events::EventSender::new(event_tx));

        let state = AppState {
            db: db_arc.clone(),
            config: config.clone(),
            event_sender: event_sender.clone(),
            services: AppServices::new(db_arc.clone(), event_sender, &config),
        };
        let router = handlers::router(state.clone());

        Self {
            router,
            state,
            db: db_arc,
            config,
            events: Mutex::new(event_rx),
            _dir: dir,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    /// Everything published since the last call.
    pub async fn drain_events(&self) -> Vec<Event> {
        let mut rx = self.events.lock().await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub async fn seed_product(&self, category_id: Option<Uuid>) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            category_id: Set(category_id),
            name: Set("Test Product".to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("insert product")
    }

    pub async fn seed_variant_for(
        &self,
        product_id: Uuid,
        name: &str,
        price: Decimal,
        stock: i32,
    ) -> ProductVariantModel {
        let now = Utc::now();
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            sku: Set(format!("SKU-{}", Uuid::new_v4().simple())),
            name: Set(name.to_string()),
            price: Set(price),
            stock_quantity: Set(stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("insert variant")
    }

    /// A variant under its own uncategorized product.
    pub async fn seed_variant(&self, name: &str, price: Decimal, stock: i32) -> ProductVariantModel {
        let product = self.seed_product(None).await;
        self.seed_variant_for(product.id, name, price, stock).await
    }

    pub async fn seed_coupon(&self, seed: CouponSeed) -> CouponModel {
        let now = Utc::now();
        let coupon = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(seed.code),
            discount_type: Set(seed.discount_type),
            discount_value: Set(seed.discount_value),
            max_discount_amount: Set(seed.max_discount_amount),
            min_order_amount: Set(seed.min_order_amount),
            usage_limit: Set(seed.usage_limit),
            used_count: Set(seed.used_count),
            usage_limit_per_user: Set(seed.usage_limit_per_user),
            start_date: Set(seed.start_date),
            end_date: Set(seed.end_date),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("insert coupon");

        for product_id in seed.product_ids {
            coupon_product::ActiveModel {
                coupon_id: Set(coupon.id),
                product_id: Set(product_id),
            }
            .insert(&*self.db)
            .await
            .expect("insert coupon product");
        }
        for category_id in seed.category_ids {
            coupon_category::ActiveModel {
                coupon_id: Set(coupon.id),
                category_id: Set(category_id),
            }
            .insert(&*self.db)
            .await
            .expect("insert coupon category");
        }
        for user_id in seed.user_ids {
            coupon_user::ActiveModel {
                coupon_id: Set(coupon.id),
                user_id: Set(user_id),
            }
            .insert(&*self.db)
            .await
            .expect("insert coupon user");
        }

        coupon
    }

    pub async fn add_to_cart(&self, user_id: Uuid, variant_id: Uuid, quantity: i32) {
        self.services()
            .carts
            .add_item(
                Some(user_id),
                None,
                AddToCartInput {
                    variant_id,
                    quantity,
                },
            )
            .await
            .expect("add to cart");
    }

    pub fn place_input(coupon_code: Option<&str>) -> PlaceOrderInput {
        PlaceOrderInput {
            shipping_address_id: Uuid::new_v4(),
            coupon_code: coupon_code.map(str::to_string),
        }
    }

    pub async fn stock_of(&self, variant_id: Uuid) -> i32 {
        ProductVariant::find_by_id(variant_id)
            .one(&*self.db)
            .await
            .expect("query variant")
            .expect("variant exists")
            .stock_quantity
    }

    pub async fn ledger_for(&self, variant_id: Uuid) -> Vec<InventoryLogModel> {
        inventory_log::Entity::find()
            .filter(inventory_log::Column::VariantId.eq(variant_id))
            .order_by_asc(inventory_log::Column::Id)
            .all(&*self.db)
            .await
            .expect("query ledger")
    }

    pub async fn coupon(&self, coupon_id: Uuid) -> CouponModel {
        Coupon::find_by_id(coupon_id)
            .one(&*self.db)
            .await
            .expect("query coupon")
            .expect("coupon exists")
    }

    pub async fn user_usage(&self, user_id: Uuid, coupon_id: Uuid) -> i32 {
        UserCouponUsage::find()
            .filter(user_coupon_usage::Column::UserId.eq(user_id))
            .filter(user_coupon_usage::Column::CouponId.eq(coupon_id))
            .one(&*self.db)
            .await
            .expect("query usage")
            .map(|usage| usage.usage_count)
            .unwrap_or(0)
    }

    pub async fn order_count(&self) -> u64 {
        order::Entity::find()
            .count(&*self.db)
            .await
            .expect("count orders")
    }

    /// Sends a request through the router as `user_id` (and optionally as
    /// an admin).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        user_id: Option<Uuid>,
        admin: bool,
        body: Option<Value>,
    ) -> Response {
        self.request_with_session(method, uri, user_id, None, admin, body)
            .await
    }

    pub async fn request_with_session(
        &self,
        method: Method,
        uri: &str,
        user_id: Option<Uuid>,
        session_id: Option<&str>,
        admin: bool,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user_id) = user_id {
            builder = builder.header(USER_ID_HEADER, user_id.to_string());
        }
        if let Some(session_id) = session_id {
            builder = builder.header(SESSION_ID_HEADER, session_id);
        }
        if admin {
            builder = builder.header(USER_ROLE_HEADER, "admin");
        }

        let body = body
            .map(|value| Body::from(value.to_string()))
            .unwrap_or_else(Body::empty);

        self.router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
