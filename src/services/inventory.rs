use crate::{
    config::AppConfig,
    db,
    entities::inventory_log::{InventoryChangeType, Model as InventoryLogModel},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{InventoryLedger, NewInventoryLogEntry, VariantStore},
};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Manual stock correction
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStockInput {
    /// Units to add (positive) or remove (negative)
    pub delta: i32,
    #[validate(length(min = 1, max = 500, message = "Reason must be 1-500 characters"))]
    pub reason: String,
}

/// Outcome of a manual stock adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustment {
    pub variant_id: Uuid,
    pub old_stock_quantity: i32,
    pub new_stock_quantity: i32,
    pub log_entry_id: i32,
}

/// Something in a variant's ledger that does not add up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LedgerDiscrepancy {
    /// `old + change != new` on a single entry
    Arithmetic {
        entry_id: i32,
        old_stock_quantity: i32,
        quantity_change: i32,
        new_stock_quantity: i32,
    },
    /// An entry does not start where the previous one ended
    BrokenChain {
        entry_id: i32,
        expected_old: i32,
        actual_old: i32,
    },
    /// Replaying the ledger does not land on the live stock level
    StockMismatch { expected: i32, actual: i32 },
}

/// Result of replaying a variant's ledger against its current stock.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub variant_id: Uuid,
    pub opening_stock: i32,
    pub entry_count: usize,
    pub net_change: i64,
    pub expected_stock: i64,
    pub actual_stock: i32,
    pub discrepancies: Vec<LedgerDiscrepancy>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Replays `entries` (oldest first) from `opening_stock`.
pub fn reconcile_entries(
    variant_id: Uuid,
    opening_stock: i32,
    entries: &[InventoryLogModel],
    actual_stock: i32,
) -> ReconciliationReport {
    let mut discrepancies = Vec::new();
    let mut running = i64::from(opening_stock);
    let mut net_change: i64 = 0;

    for entry in entries {
        if i64::from(entry.old_stock_quantity) != running {
            discrepancies.push(LedgerDiscrepancy::BrokenChain {
                entry_id: entry.id,
                expected_old: i32::try_from(running).unwrap_or(i32::MAX),
                actual_old: entry.old_stock_quantity,
            });
        }
        if i64::from(entry.old_stock_quantity) + i64::from(entry.quantity_change)
            != i64::from(entry.new_stock_quantity)
        {
            discrepancies.push(LedgerDiscrepancy::Arithmetic {
                entry_id: entry.id,
                old_stock_quantity: entry.old_stock_quantity,
                quantity_change: entry.quantity_change,
                new_stock_quantity: entry.new_stock_quantity,
            });
        }
        net_change += i64::from(entry.quantity_change);
        running = i64::from(entry.new_stock_quantity);
    }

    let expected_stock = i64::from(opening_stock) + net_change;
    if expected_stock != i64::from(actual_stock) {
        discrepancies.push(LedgerDiscrepancy::StockMismatch {
            expected: i32::try_from(expected_stock).unwrap_or(i32::MAX),
            actual: actual_stock,
        });
    }

    ReconciliationReport {
        variant_id,
        opening_stock,
        entry_count: entries.len(),
        net_change,
        expected_stock,
        actual_stock,
        discrepancies,
    }
}

/// Service for manual stock changes and ledger audits
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    variants: Arc<dyn VariantStore>,
    ledger: Arc<dyn InventoryLedger>,
    event_sender: Arc<EventSender>,
    lock_timeout: Duration,
}

impl InventoryService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        variants: Arc<dyn VariantStore>,
        ledger: Arc<dyn InventoryLedger>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
    ) -> Self {
        Self {
            db,
            variants,
            ledger,
            event_sender,
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
        }
    }

    /// Adds or removes stock by hand, logging an `adjustment` entry.
    /// The result may not go below zero.
    #[instrument(skip(self, input), fields(variant_id = %variant_id, delta = input.delta))]
    pub async fn adjust_stock(
        &self,
        variant_id: Uuid,
        input: AdjustStockInput,
        changed_by: Uuid,
    ) -> Result<StockAdjustment, ServiceError> {
        input.validate()?;
        if input.delta == 0 {
            return Err(ServiceError::ValidationError(
                "Adjustment must change the stock level".to_string(),
            ));
        }

        let txn = db::begin_locking_transaction(&self.db, self.lock_timeout).await?;
        let result = async {
            let variant = self
                .variants
                .lock_for_update(&txn, &[variant_id])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;

            let old = variant.stock_quantity;
            let new = old.checked_add(input.delta).ok_or_else(|| {
                ServiceError::ValidationError("Adjustment overflows stock level".to_string())
            })?;
            if new < 0 {
                return Err(ServiceError::InsufficientStock(variant.name));
            }

            if input.delta > 0 {
                self.variants
                    .increment_stock(&txn, variant_id, input.delta)
                    .await?;
            } else {
                self.variants
                    .decrement_stock(&txn, variant_id, -input.delta)
                    .await?;
            }

            let entry = self
                .ledger
                .record(
                    &txn,
                    NewInventoryLogEntry {
                        product_id: variant.product_id,
                        variant_id,
                        order_id: None,
                        change_type: InventoryChangeType::Adjustment,
                        quantity_change: input.delta,
                        old_stock_quantity: old,
                        changed_by_user_id: Some(changed_by),
                        description: input.reason.clone(),
                    },
                )
                .await?;

            Ok(StockAdjustment {
                variant_id,
                old_stock_quantity: old,
                new_stock_quantity: entry.new_stock_quantity,
                log_entry_id: entry.id,
            })
        }
        .await;
        let adjustment = db::finish(txn, result).await?;

        info!(
            old = adjustment.old_stock_quantity,
            new = adjustment.new_stock_quantity,
            "Stock adjusted"
        );
        self.event_sender
            .send_or_log(Event::InventoryAdjusted {
                variant_id,
                old_quantity: adjustment.old_stock_quantity,
                new_quantity: adjustment.new_stock_quantity,
            })
            .await;

        Ok(adjustment)
    }

    /// Checks a variant's ledger against its live stock.
    ///
    /// Without `opening_stock` the first entry's starting level is used (or
    /// the live level when the ledger is empty).
    #[instrument(skip(self))]
    pub async fn reconcile(
        &self,
        variant_id: Uuid,
        opening_stock: Option<i32>,
    ) -> Result<ReconciliationReport, ServiceError> {
        let txn = self.db.begin().await?;
        let result = async {
            let variant = self
                .variants
                .find(&txn, variant_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;
            let entries = self.ledger.entries_for_variant(&txn, variant_id).await?;
            Ok((variant, entries))
        }
        .await;
        let (variant, entries) = db::finish(txn, result).await?;

        let opening = opening_stock.unwrap_or_else(|| {
            entries
                .first()
                .map(|entry| entry.old_stock_quantity)
                .unwrap_or(variant.stock_quantity)
        });
        let report = reconcile_entries(variant_id, opening, &entries, variant.stock_quantity);

        if !report.is_consistent() {
            warn!(
                discrepancies = report.discrepancies.len(),
                "Inventory ledger does not reconcile"
            );
        }
        Ok(report)
    }
}
