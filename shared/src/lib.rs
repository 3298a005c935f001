use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod erp;
pub mod reconcile;
pub mod size;

pub use reconcile::{reconcile, UpsertBatch};
pub use size::{compare_sizes, compare_sizes_with, SizeOrdering};

/// Warehouse codes that have their own quantity column.
pub const WAREHOUSE_CODES: [&str; 2] = ["106", "3333"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseStock {
    pub warehouse_106: i32,
    pub warehouse_3333: i32,
}

impl WarehouseStock {
    pub fn slot_mut(&mut self, warehouse_code: &str) -> Option<&mut i32> {
        match warehouse_code {
            "106" => Some(&mut self.warehouse_106),
            "3333" => Some(&mut self.warehouse_3333),
            _ => None,
        }
    }
}

/// A product row together with its current stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub product_code: String,
    pub item_number: Option<String>,
    pub product_name: String,
    pub specification: Option<String>,
    pub category: Option<String>,
    pub cost_price: Option<BigDecimal>,
    pub selling_price: Option<BigDecimal>,
    pub memo: Option<String>,
    #[serde(flatten)]
    pub stock: WarehouseStock,
    pub total: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl InventoryRecord {
    pub fn new(product_code: String) -> Self {
        Self {
            product_code,
            item_number: None,
            product_name: String::new(),
            specification: None,
            category: None,
            cost_price: None,
            selling_price: None,
            memo: None,
            stock: WarehouseStock::default(),
            total: 0,
            created_at: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Refresh stock of products already stored; ignore the rest.
    #[default]
    UpdateExistingOnly,
    /// Write every product in the snapshot.
    UpsertAll,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::UpdateExistingOnly => "update_existing_only",
            SyncMode::UpsertAll => "upsert_all",
        }
    }

    /// Key of the rate-limit row in `sync_settings`.
    pub fn sync_type(&self) -> &'static str {
        match self {
            SyncMode::UpdateExistingOnly => "inventory_sync",
            SyncMode::UpsertAll => "product_sync",
        }
    }
}

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

/// Normalizes 1-based paging input into (page, page_size, offset).
pub fn page_window(page: Option<i64>, page_size: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, size, (page - 1).saturating_mul(size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_window_clamps() {
        assert_eq!(page_window(None, None), (1, DEFAULT_PAGE_SIZE, 0));
        assert_eq!(page_window(Some(3), Some(10)), (3, 10, 20));
        assert_eq!(page_window(Some(0), Some(10_000)), (1, MAX_PAGE_SIZE, 0));
        assert_eq!(page_window(Some(-2), Some(0)), (1, 1, 0));
        let (page, size, offset) = page_window(Some(i64::MAX), Some(20));
        assert_eq!((page, size), (i64::MAX, 20));
        assert_eq!(offset, i64::MAX);
    }

    #[test]
    fn sync_mode_uses_snake_case() {
        let mode: SyncMode = serde_json::from_str("\"upsert_all\"").unwrap();
        assert_eq!(mode, SyncMode::UpsertAll);
        assert_eq!(SyncMode::default().as_str(), "update_existing_only");
    }

    #[test]
    fn warehouse_slots_match_codes() {
        let mut stock = WarehouseStock::default();
        for (i, code) in WAREHOUSE_CODES.iter().enumerate() {
            *stock.slot_mut(code).unwrap() += i as i32 + 1;
        }
        assert_eq!(stock.warehouse_106, 1);
        assert_eq!(stock.warehouse_3333, 2);
        assert!(stock.slot_mut("999").is_none());
    }
}
