use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::Display;
use utoipa::ToSchema;
use uuid::Uuid;

/// Inventory ledger entry.
///
/// Rows are only ever inserted. The integer id is assigned in insertion order,
/// so replaying a variant's entries by id reproduces its stock history, and
/// `new_stock_quantity = old_stock_quantity + quantity_change` on every row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub product_id: Uuid,
    pub variant_id: Uuid,
    #[sea_orm(nullable)]
    pub order_id: Option<Uuid>,
    pub change_type: InventoryChangeType,
    pub quantity_change: i32,
    pub old_stock_quantity: i32,
    pub new_stock_quantity: i32,
    #[sea_orm(nullable)]
    pub changed_by_user_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::commerce::product_variant::Entity",
        from = "Column::VariantId",
        to = "super::commerce::product_variant::Column::Id"
    )]
    ProductVariant,
}

impl Related<super::commerce::product_variant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductVariant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InventoryChangeType {
    /// Stock taken by a placed order
    #[sea_orm(string_value = "reserve")]
    Reserve,
    /// Stock returned by a cancelled order
    #[sea_orm(string_value = "restock")]
    Restock,
    /// Manual correction or receipt of goods
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
}
