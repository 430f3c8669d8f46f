//! Cart resolution for users, guests and guests who sign in.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use storefront_api::{
    errors::ServiceError,
    services::commerce::{AddToCartInput, CartTransition},
};
use uuid::Uuid;

fn line(variant_id: Uuid, quantity: i32) -> AddToCartInput {
    AddToCartInput {
        variant_id,
        quantity,
    }
}

#[tokio::test]
async fn creates_then_reuses_a_user_cart() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let carts = &app.services().carts;

    let first = carts.resolve_cart(Some(user), None).await.unwrap();
    assert_eq!(first.transition, CartTransition::CreateNew);
    assert_eq!(first.cart.user_id, Some(user));

    let second = carts.resolve_cart(Some(user), None).await.unwrap();
    assert_eq!(second.transition, CartTransition::UserCartExists);
    assert_eq!(second.cart.id, first.cart.id);
}

#[tokio::test]
async fn guest_session_keeps_its_cart() {
    let app = TestApp::new().await;
    let carts = &app.services().carts;
    let variant = app.seed_variant("Mug", dec!(10.00), 10).await;

    let snapshot = carts
        .add_item(None, Some("sess-1".into()), line(variant.id, 2))
        .await
        .unwrap();
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.total_amount, dec!(20.00));

    let resolved = carts.resolve_cart(None, Some("sess-1".into())).await.unwrap();
    assert_eq!(resolved.transition, CartTransition::GuestOnly);
    assert_eq!(resolved.cart.id, snapshot.cart_id);
}

#[tokio::test]
async fn login_merges_guest_lines_into_user_cart() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let carts = &app.services().carts;
    let mug = app.seed_variant("Mug", dec!(10.00), 10).await;
    let plate = app.seed_variant("Plate", dec!(12.50), 10).await;

    carts
        .add_item(Some(user), None, line(mug.id, 1))
        .await
        .unwrap();
    carts
        .add_item(None, Some("sess-2".into()), line(mug.id, 2))
        .await
        .unwrap();
    carts
        .add_item(None, Some("sess-2".into()), line(plate.id, 1))
        .await
        .unwrap();

    let resolved = carts
        .resolve_cart(Some(user), Some("sess-2".into()))
        .await
        .unwrap();
    assert_eq!(resolved.transition, CartTransition::Merge);
    assert_eq!(resolved.cart.user_id, Some(user));

    let snapshot = carts.get_snapshot(user).await.unwrap().unwrap();
    let mug_line = snapshot.items.iter().find(|l| l.variant_id == mug.id).unwrap();
    let plate_line = snapshot.items.iter().find(|l| l.variant_id == plate.id).unwrap();
    assert_eq!(mug_line.quantity, 3);
    assert_eq!(plate_line.quantity, 1);
    assert_eq!(snapshot.total_amount, dec!(42.50));

    // The guest cart is spent; the session now starts fresh.
    let guest = carts.resolve_cart(None, Some("sess-2".into())).await.unwrap();
    assert_eq!(guest.transition, CartTransition::CreateNew);
}

#[tokio::test]
async fn login_without_user_cart_claims_guest_cart() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let carts = &app.services().carts;
    let mug = app.seed_variant("Mug", dec!(10.00), 10).await;

    let guest = carts
        .add_item(None, Some("sess-3".into()), line(mug.id, 2))
        .await
        .unwrap();

    let resolved = carts
        .resolve_cart(Some(user), Some("sess-3".into()))
        .await
        .unwrap();
    assert_eq!(resolved.transition, CartTransition::Merge);
    assert_eq!(resolved.cart.id, guest.cart_id);
    assert_eq!(resolved.cart.user_id, Some(user));

    let again = carts.resolve_cart(Some(user), None).await.unwrap();
    assert_eq!(again.transition, CartTransition::UserCartExists);
    assert_eq!(again.cart.id, guest.cart_id);
}

#[tokio::test]
async fn update_quantity_and_remove_lines() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let carts = &app.services().carts;
    let mug = app.seed_variant("Mug", dec!(10.00), 10).await;

    carts
        .add_item(Some(user), None, line(mug.id, 1))
        .await
        .unwrap();
    let snapshot = carts
        .add_item(Some(user), None, line(mug.id, 2))
        .await
        .unwrap();
    assert_eq!(snapshot.items[0].quantity, 3);

    let snapshot = carts
        .update_item_quantity(Some(user), None, mug.id, 5)
        .await
        .unwrap();
    assert_eq!(snapshot.items[0].quantity, 5);
    assert_eq!(snapshot.total_amount, dec!(50.00));

    let snapshot = carts
        .update_item_quantity(Some(user), None, mug.id, 0)
        .await
        .unwrap();
    assert!(snapshot.is_empty());

    let err = carts
        .update_item_quantity(Some(user), None, mug.id, 1)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn rejects_unknown_variants_and_anonymous_callers() {
    let app = TestApp::new().await;
    let carts = &app.services().carts;

    let err = carts
        .add_item(Some(Uuid::new_v4()), None, line(Uuid::new_v4(), 1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let err = carts.resolve_cart(None, None).await.unwrap_err();
    assert_matches!(err, ServiceError::Unauthorized(_));

    let variant = app.seed_variant("Mug", dec!(10.00), 10).await;
    let err = carts
        .add_item(Some(Uuid::new_v4()), None, line(variant.id, 0))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}
