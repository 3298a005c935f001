use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use shared::{InventoryRecord, WarehouseStock};
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::products)]
pub struct Product {
    pub product_code: String,
    pub item_number: Option<String>,
    pub product_name: String,
    pub specification: Option<String>,
    pub category: Option<String>,
    pub cost_price: Option<BigDecimal>,
    pub selling_price: Option<BigDecimal>,
    pub memo: Option<String>,
    pub warehouse_106: i32,
    pub warehouse_3333: i32,
    pub total: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Columns a sync in `upsert_all` mode is allowed to write.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::products)]
pub struct SnapshotProduct {
    pub product_code: String,
    pub item_number: Option<String>,
    pub product_name: String,
    pub specification: Option<String>,
    pub warehouse_106: i32,
    pub warehouse_3333: i32,
    pub total: i32,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = crate::schema::products)]
pub struct ProductChanges {
    pub item_number: Option<String>,
    pub product_name: Option<String>,
    pub specification: Option<String>,
    pub category: Option<String>,
    pub cost_price: Option<BigDecimal>,
    pub selling_price: Option<BigDecimal>,
    pub memo: Option<String>,
    #[serde(skip)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Product> for InventoryRecord {
    fn from(p: Product) -> Self {
        Self {
            product_code: p.product_code,
            item_number: p.item_number,
            product_name: p.product_name,
            specification: p.specification,
            category: p.category,
            cost_price: p.cost_price,
            selling_price: p.selling_price,
            memo: p.memo,
            stock: WarehouseStock {
                warehouse_106: p.warehouse_106,
                warehouse_3333: p.warehouse_3333,
            },
            total: p.total,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Columns a sync in `update_existing_only` mode refreshes on a stored product.
#[derive(Debug, Clone, PartialEq, AsChangeset)]
#[diesel(table_name = crate::schema::products)]
pub struct StockUpdate {
    pub warehouse_106: i32,
    pub warehouse_3333: i32,
    pub total: i32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&InventoryRecord> for StockUpdate {
    fn from(r: &InventoryRecord) -> Self {
        Self {
            warehouse_106: r.stock.warehouse_106,
            warehouse_3333: r.stock.warehouse_3333,
            total: r.total,
            updated_at: r.updated_at,
        }
    }
}

impl From<InventoryRecord> for SnapshotProduct {
    fn from(r: InventoryRecord) -> Self {
        Self {
            product_code: r.product_code,
            item_number: r.item_number,
            product_name: r.product_name,
            specification: r.specification,
            warehouse_106: r.stock.warehouse_106,
            warehouse_3333: r.stock.warehouse_3333,
            total: r.total,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::inventory_history)]
pub struct InventoryHistory {
    pub id: Uuid,
    pub product_code: String,
    pub warehouse_106: i32,
    pub warehouse_3333: i32,
    pub total: i32,
    pub sync_mode: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::set_products)]
pub struct SetProduct {
    pub id: Uuid,
    pub item_prefix: String,
    pub set_name: String,
    pub memo: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = crate::schema::set_products)]
pub struct SetProductChanges {
    pub item_prefix: Option<String>,
    pub set_name: Option<String>,
    pub memo: Option<String>,
    #[serde(skip)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::sales_channels)]
pub struct SalesChannel {
    pub id: Uuid,
    pub channel_code: String,
    pub channel_name: String,
    pub commission_rate: Option<BigDecimal>,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = crate::schema::sales_channels)]
pub struct SalesChannelChanges {
    pub channel_code: Option<String>,
    pub channel_name: Option<String>,
    pub commission_rate: Option<BigDecimal>,
    pub is_active: Option<bool>,
    #[serde(skip)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::sales_plans)]
pub struct SalesPlan {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub product_code: String,
    pub plan_month: NaiveDate,
    pub target_quantity: i32,
    pub target_amount: BigDecimal,
    pub memo: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = crate::schema::sales_plans)]
pub struct SalesPlanChanges {
    pub channel_id: Option<Uuid>,
    pub product_code: Option<String>,
    pub plan_month: Option<NaiveDate>,
    pub target_quantity: Option<i32>,
    pub target_amount: Option<BigDecimal>,
    pub memo: Option<String>,
    #[serde(skip)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::sales_performance)]
pub struct SalesPerformance {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub product_code: String,
    pub sale_date: NaiveDate,
    pub quantity: i32,
    pub amount: BigDecimal,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = crate::schema::sales_performance)]
pub struct SalesPerformanceChanges {
    pub channel_id: Option<Uuid>,
    pub product_code: Option<String>,
    pub sale_date: Option<NaiveDate>,
    pub quantity: Option<i32>,
    pub amount: Option<BigDecimal>,
    #[serde(skip)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::operational_quantities)]
pub struct OperationalQuantity {
    pub product_code: String,
    pub item_number: Option<String>,
    pub specification: Option<String>,
    pub quantity: i32,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::sync_settings)]
pub struct SyncSetting {
    pub sync_type: String,
    pub last_synced_at: Option<DateTime<Utc>>,
}
