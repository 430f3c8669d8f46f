//! Every stock change leaves a ledger entry, and the ledger replays to the
//! live stock level.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use storefront_api::{
    auth::Actor,
    entities::inventory_log::InventoryChangeType,
    errors::ServiceError,
    events::Event,
    services::inventory::{AdjustStockInput, LedgerDiscrepancy},
};
use uuid::Uuid;

fn adjustment(delta: i32, reason: &str) -> AdjustStockInput {
    AdjustStockInput {
        delta,
        reason: reason.to_string(),
    }
}

#[tokio::test]
async fn ledger_reconciles_after_place_cancel_and_adjust() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let staff = Uuid::new_v4();
    let variant = app.seed_variant("Mug", dec!(10.00), 10).await;

    app.add_to_cart(user, variant.id, 4).await;
    let placed = app
        .services()
        .orders
        .place_order(user, TestApp::place_input(None))
        .await
        .unwrap();
    app.services()
        .orders
        .cancel_order(placed.order.id, &Actor::customer(user), None)
        .await
        .unwrap();
    app.services()
        .inventory
        .adjust_stock(variant.id, adjustment(5, "Received shipment"), staff)
        .await
        .unwrap();

    assert_eq!(app.stock_of(variant.id).await, 15);

    let ledger = app.ledger_for(variant.id).await;
    let kinds: Vec<_> = ledger.iter().map(|e| e.change_type).collect();
    assert_eq!(
        kinds,
        vec![
            InventoryChangeType::Reserve,
            InventoryChangeType::Restock,
            InventoryChangeType::Adjustment
        ]
    );
    for entry in &ledger {
        assert_eq!(
            entry.old_stock_quantity + entry.quantity_change,
            entry.new_stock_quantity
        );
    }

    let report = app
        .services()
        .inventory
        .reconcile(variant.id, None)
        .await
        .unwrap();
    assert!(report.is_consistent(), "{:?}", report.discrepancies);
    assert_eq!(report.opening_stock, 10);
    assert_eq!(report.entry_count, 3);
    assert_eq!(report.net_change, 5);
    assert_eq!(report.expected_stock, 15);
    assert_eq!(report.actual_stock, 15);
}

#[tokio::test]
async fn adjustment_cannot_make_stock_negative() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("Mug", dec!(10.00), 2).await;

    let err = app
        .services()
        .inventory
        .adjust_stock(variant.id, adjustment(-3, "Damaged"), Uuid::new_v4())
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InsufficientStock(name) if name == "Mug");
    assert_eq!(app.stock_of(variant.id).await, 2);
    assert!(app.ledger_for(variant.id).await.is_empty());
}

#[tokio::test]
async fn adjustment_records_entry_and_event() {
    let app = TestApp::new().await;
    let staff = Uuid::new_v4();
    let variant = app.seed_variant("Mug", dec!(10.00), 6).await;
    app.drain_events().await;

    let result = app
        .services()
        .inventory
        .adjust_stock(variant.id, adjustment(-2, "Damaged in storage"), staff)
        .await
        .unwrap();

    assert_eq!(result.old_stock_quantity, 6);
    assert_eq!(result.new_stock_quantity, 4);
    assert_eq!(app.stock_of(variant.id).await, 4);

    let ledger = app.ledger_for(variant.id).await;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].id, result.log_entry_id);
    assert_eq!(ledger[0].changed_by_user_id, Some(staff));
    assert_eq!(ledger[0].description, "Damaged in storage");
    assert!(ledger[0].order_id.is_none());

    let events = app.drain_events().await;
    assert!(events.contains(&Event::InventoryAdjusted {
        variant_id: variant.id,
        old_quantity: 6,
        new_quantity: 4,
    }));
}

#[tokio::test]
async fn invalid_adjustments_are_rejected() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("Mug", dec!(10.00), 6).await;
    let inventory = &app.services().inventory;

    let err = inventory
        .adjust_stock(variant.id, adjustment(0, "Nothing"), Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = inventory
        .adjust_stock(variant.id, adjustment(1, ""), Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = inventory
        .adjust_stock(Uuid::new_v4(), adjustment(1, "Found one"), Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn reconcile_reports_out_of_band_stock_changes() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let variant = app.seed_variant("Mug", dec!(10.00), 10).await;
    app.add_to_cart(user, variant.id, 1).await;
    app.services()
        .orders
        .place_order(user, TestApp::place_input(None))
        .await
        .unwrap();

    // Opening stock of 12 does not match the first entry (10).
    let report = app
        .services()
        .inventory
        .reconcile(variant.id, Some(12))
        .await
        .unwrap();
    assert!(!report.is_consistent());
    assert!(report
        .discrepancies
        .iter()
        .any(|d| matches!(d, LedgerDiscrepancy::StockMismatch { expected: 11, actual: 9 })));

    let fresh = app.seed_variant("Untouched", dec!(5.00), 7).await;
    let report = app
        .services()
        .inventory
        .reconcile(fresh.id, None)
        .await
        .unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.entry_count, 0);
    assert_eq!(report.opening_stock, 7);
}
