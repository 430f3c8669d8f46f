//! HTTP surface: identity headers, status codes and error bodies.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, CouponSeed, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn health_endpoints_respond() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/health", None, false, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::GET, "/health/ready", None, false, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn placing_an_order_requires_a_user() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            None,
            false,
            Some(json!({ "shippingAddressId": Uuid::new_v4() })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn cart_to_order_over_http() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let variant = app.seed_variant("Mug", dec!(10.00), 10).await;
    app.seed_coupon(CouponSeed::percentage("SAVE10", dec!(10)))
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            Some(user),
            false,
            Some(json!({ "variantId": variant.id, "quantity": 2 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(user),
            false,
            Some(json!({ "shippingAddressId": Uuid::new_v4(), "couponCode": "SAVE10" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let order = &body["data"];
    assert_eq!(order["status"], "pending");
    assert_eq!(order["paymentStatus"], "unpaid");
    let order_id = order["orderId"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{order_id}"),
            Some(user),
            false,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["history"].as_array().unwrap().len(), 1);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/cancel"),
            Some(user),
            false,
            Some(json!({})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(app.stock_of(variant.id).await, 10);
}

#[tokio::test]
async fn error_bodies_carry_stable_codes() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(user),
            false,
            Some(json!({ "shippingAddressId": Uuid::new_v4() })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(response).await["code"], "empty_cart");

    let variant = app.seed_variant("Lamp", dec!(40.00), 1).await;
    app.add_to_cart(user, variant.id, 2).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(user),
            false,
            Some(json!({ "shippingAddressId": Uuid::new_v4() })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response_json(response).await["code"], "insufficient_stock");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", Uuid::new_v4()),
            Some(user),
            false,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response_json(response).await["code"], "order_not_found");
}

#[tokio::test]
async fn status_updates_are_staff_only() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let variant = app.seed_variant("Mug", dec!(10.00), 10).await;
    app.add_to_cart(user, variant.id, 1).await;
    let placed = app
        .services()
        .orders
        .place_order(user, TestApp::place_input(None))
        .await
        .unwrap();
    let uri = format!("/api/v1/orders/{}/status", placed.order.id);

    let response = app
        .request(
            Method::PUT,
            &uri,
            Some(user),
            false,
            Some(json!({ "status": "shipped" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::PUT,
            &uri,
            Some(Uuid::new_v4()),
            true,
            Some(json!({ "status": "shipped" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["status"], "shipped");

    let response = app
        .request(
            Method::PUT,
            &uri,
            Some(Uuid::new_v4()),
            true,
            Some(json!({ "status": "cancelled" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(response_json(response).await["code"], "invalid_transition");
}

#[tokio::test]
async fn guest_cart_over_http_needs_a_session() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("Mug", dec!(10.00), 10).await;

    let response = app
        .request(Method::GET, "/api/v1/cart", None, false, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request_with_session(
            Method::POST,
            "/api/v1/cart/items",
            None,
            Some("guest-1"),
            false,
            Some(json!({ "variantId": variant.id, "quantity": 1 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request_with_session(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", variant.id),
            None,
            Some("guest-1"),
            false,
            Some(json!({ "quantity": 4 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"][0]["quantity"], 4);
}

#[tokio::test]
async fn inventory_routes_require_admin() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("Mug", dec!(10.00), 10).await;
    let adjust_uri = format!("/api/v1/inventory/variants/{}/adjustments", variant.id);

    let response = app
        .request(
            Method::POST,
            &adjust_uri,
            Some(Uuid::new_v4()),
            false,
            Some(json!({ "delta": 3, "reason": "Recount" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::POST,
            &adjust_uri,
            Some(Uuid::new_v4()),
            true,
            Some(json!({ "delta": 3, "reason": "Recount" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response_json(response).await["data"]["newStockQuantity"],
        13
    );

    let response = app
        .request(
            Method::GET,
            &format!(
                "/api/v1/inventory/variants/{}/reconciliation?openingStock=10",
                variant.id
            ),
            Some(Uuid::new_v4()),
            true,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["expectedStock"], 13);
    assert_eq!(body["data"]["discrepancies"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None, false, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert!(body["paths"]["/api/v1/orders"].is_object());
}
