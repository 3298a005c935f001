use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::erp::BalanceRow;
use crate::size::item_prefix;
use crate::{InventoryRecord, SyncMode, WarehouseStock, WAREHOUSE_CODES};

/// Result of one reconciliation pass, ready for a bulk upsert keyed by product code.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertBatch {
    pub mode: SyncMode,
    pub rows: Vec<InventoryRecord>,
    /// Snapshot codes left out because they are not stored yet (update_existing_only).
    pub dropped: Vec<String>,
    /// Snapshot rows without a product code.
    pub skipped_rows: usize,
}

/// Per-code sums, kept wide until the row is written.
#[derive(Debug, Default)]
struct Aggregate {
    product_name: String,
    specification: String,
    slots: [i64; WAREHOUSE_CODES.len()],
    total: i64,
}

impl Aggregate {
    fn add(&mut self, warehouse_code: &str, qty: i32) {
        self.total += qty as i64;
        if let Some(i) = WAREHOUSE_CODES.iter().position(|c| *c == warehouse_code) {
            self.slots[i] += qty as i64;
        }
    }

    fn stock(&self) -> WarehouseStock {
        let mut stock = WarehouseStock::default();
        for (code, qty) in WAREHOUSE_CODES.iter().zip(self.slots) {
            if let Some(slot) = stock.slot_mut(code) {
                *slot = saturate(qty);
            }
        }
        stock
    }
}

fn saturate(n: i64) -> i32 {
    n.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Parses an ERP quantity. Anything unparseable counts as zero; fractions truncate.
pub fn parse_quantity(raw: &str) -> i32 {
    let raw = raw.trim().replace(',', "");
    if let Ok(n) = raw.parse::<i64>() {
        return saturate(n);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => f.trunc().clamp(i32::MIN as f64, i32::MAX as f64) as i32,
        _ => 0,
    }
}

/// Token inside a trailing `[...]`, e.g. "Tee shirt [XL]" -> "XL".
pub fn extract_specification(size_description: &str) -> String {
    let text = size_description.trim_end();
    let Some(body) = text.strip_suffix(']') else {
        return String::new();
    };
    match body.rfind('[') {
        Some(open) => body[open + 1..].trim().to_string(),
        None => String::new(),
    }
}

fn aggregate(snapshot: &[BalanceRow]) -> (Vec<(String, Aggregate)>, usize) {
    let mut order: Vec<(String, Aggregate)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0;

    for row in snapshot {
        let code = row.product_code.trim();
        if code.is_empty() {
            skipped += 1;
            continue;
        }
        let slot = *index.entry(code.to_string()).or_insert_with(|| {
            order.push((code.to_string(), Aggregate::default()));
            order.len() - 1
        });
        let agg = &mut order[slot].1;

        if agg.product_name.is_empty() {
            agg.product_name = row.product_name.trim().to_string();
        }
        if agg.specification.is_empty() {
            agg.specification = extract_specification(&row.size_description);
        }

        agg.add(row.warehouse_code.trim(), parse_quantity(&row.quantity));
    }

    (order, skipped)
}

/// Folds an ERP balance snapshot into upsert rows.
///
/// `UpdateExistingOnly` keeps every stored field and only overwrites stock,
/// total and `updated_at`; codes not in `existing` are dropped.
/// `UpsertAll` emits snapshot-derived rows for every code in the snapshot.
/// Stored rows missing from the snapshot never appear in the batch.
pub fn reconcile(
    snapshot: &[BalanceRow],
    existing: &[InventoryRecord],
    mode: SyncMode,
    now: DateTime<Utc>,
) -> UpsertBatch {
    let (aggregates, skipped_rows) = aggregate(snapshot);
    let stored: HashMap<&str, &InventoryRecord> = existing
        .iter()
        .map(|r| (r.product_code.as_str(), r))
        .collect();

    let mut rows = Vec::with_capacity(aggregates.len());
    let mut dropped = Vec::new();

    for (code, agg) in aggregates {
        match mode {
            SyncMode::UpdateExistingOnly => match stored.get(code.as_str()) {
                Some(prev) => rows.push(InventoryRecord {
                    stock: agg.stock(),
                    total: saturate(agg.total),
                    updated_at: Some(now),
                    ..(*prev).clone()
                }),
                None => dropped.push(code),
            },
            SyncMode::UpsertAll => rows.push(InventoryRecord {
                item_number: Some(item_prefix(&code).to_string()),
                stock: agg.stock(),
                total: saturate(agg.total),
                product_name: agg.product_name,
                specification: Some(agg.specification),
                updated_at: Some(now),
                ..InventoryRecord::new(code)
            }),
        }
    }

    UpsertBatch {
        mode,
        rows,
        dropped,
        skipped_rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn row(code: &str, wh: &str, qty: &str) -> BalanceRow {
        BalanceRow {
            product_code: code.to_string(),
            product_name: format!("{code} name"),
            size_description: format!("{code} [M]"),
            warehouse_code: wh.to_string(),
            quantity: qty.to_string(),
        }
    }

    fn stored(code: &str) -> InventoryRecord {
        InventoryRecord {
            product_name: "Registered name".to_string(),
            item_number: Some("REG".to_string()),
            specification: Some("L".to_string()),
            category: Some("tops".to_string()),
            cost_price: Some(BigDecimal::from(1200)),
            stock: WarehouseStock {
                warehouse_106: 99,
                warehouse_3333: 99,
            },
            total: 198,
            ..InventoryRecord::new(code.to_string())
        }
    }

    #[test]
    fn sums_quantities_per_warehouse() {
        let snapshot = vec![row("A", "106", "5"), row("A", "3333", "3")];
        let batch = reconcile(&snapshot, &[], SyncMode::UpsertAll, Utc::now());

        assert_eq!(batch.rows.len(), 1);
        let a = &batch.rows[0];
        assert_eq!(a.total, 8);
        assert_eq!(a.stock.warehouse_106, 5);
        assert_eq!(a.stock.warehouse_3333, 3);
    }

    #[test]
    fn unknown_warehouse_counts_toward_total_only() {
        let snapshot = vec![row("A", "106", "2"), row("A", "999", "4")];
        let batch = reconcile(&snapshot, &[], SyncMode::UpsertAll, Utc::now());

        let a = &batch.rows[0];
        assert_eq!(a.total, 6);
        assert_eq!(a.stock.warehouse_106, 2);
        assert_eq!(a.stock.warehouse_3333, 0);
    }

    #[test]
    fn total_is_exact_sum_near_i32_limits() {
        let snapshot = vec![
            row("A", "106", "2147483647"),
            row("A", "3333", "5"),
            row("A", "999", "-10"),
        ];
        let batch = reconcile(&snapshot, &[], SyncMode::UpsertAll, Utc::now());

        let a = &batch.rows[0];
        assert_eq!(a.total, 2_147_483_642);
        assert_eq!(a.stock.warehouse_106, i32::MAX);
        assert_eq!(a.stock.warehouse_3333, 5);
    }

    #[test]
    fn malformed_quantities_are_zero() {
        assert_eq!(parse_quantity(""), 0);
        assert_eq!(parse_quantity("abc"), 0);
        assert_eq!(parse_quantity(" 12 "), 12);
        assert_eq!(parse_quantity("7.9"), 7);
        assert_eq!(parse_quantity("-3"), -3);
        assert_eq!(parse_quantity("1,200"), 1200);
    }

    #[test]
    fn specification_comes_from_trailing_brackets() {
        assert_eq!(extract_specification("Basic tee [XL]"), "XL");
        assert_eq!(extract_specification("Pants [black] [95] "), "95");
        assert_eq!(extract_specification("No size"), "");
        assert_eq!(extract_specification("[M] trailing text"), "");
        assert_eq!(extract_specification(""), "");
    }

    #[test]
    fn update_existing_only_drops_unseen_codes_and_preserves_fields() {
        let now = Utc::now();
        let snapshot = vec![row("A", "106", "5"), row("NEW", "106", "1")];
        let existing = vec![stored("A"), stored("UNTOUCHED")];

        let batch = reconcile(&snapshot, &existing, SyncMode::UpdateExistingOnly, now);

        assert_eq!(batch.dropped, vec!["NEW".to_string()]);
        assert_eq!(batch.rows.len(), 1);
        let a = &batch.rows[0];
        assert_eq!(a.product_code, "A");
        assert_eq!(a.product_name, "Registered name");
        assert_eq!(a.specification.as_deref(), Some("L"));
        assert_eq!(a.category.as_deref(), Some("tops"));
        assert_eq!(a.cost_price, Some(BigDecimal::from(1200)));
        assert_eq!(a.total, 5);
        assert_eq!(a.stock.warehouse_3333, 0);
        assert_eq!(a.updated_at, Some(now));
        assert!(batch.rows.iter().all(|r| r.product_code != "UNTOUCHED"));
    }

    #[test]
    fn upsert_all_emits_every_snapshot_code_without_merging() {
        let snapshot = vec![
            row("TS100-M", "106", "1"),
            row("NEW-S", "3333", "2"),
            row("  ", "106", "9"),
        ];
        let existing = vec![stored("TS100-M")];

        let batch = reconcile(&snapshot, &existing, SyncMode::UpsertAll, Utc::now());

        let codes: Vec<_> = batch.rows.iter().map(|r| r.product_code.as_str()).collect();
        assert_eq!(codes, vec!["TS100-M", "NEW-S"]);
        assert!(batch.dropped.is_empty());
        assert_eq!(batch.skipped_rows, 1);

        let first = &batch.rows[0];
        assert_eq!(first.product_name, "TS100-M name");
        assert_eq!(first.item_number.as_deref(), Some("TS100"));
        assert_eq!(first.specification.as_deref(), Some("M"));
        assert_eq!(first.category, None);
        assert_eq!(first.cost_price, None);
    }

    #[test]
    fn upsert_all_is_idempotent_apart_from_timestamp() {
        let snapshot = vec![row("A", "106", "5"), row("A", "3333", "3"), row("B", "106", "x")];
        let first = reconcile(&snapshot, &[], SyncMode::UpsertAll, Utc::now());
        let second = reconcile(&snapshot, &first.rows, SyncMode::UpsertAll, Utc::now());

        let strip = |rows: &[InventoryRecord]| -> Vec<InventoryRecord> {
            rows.iter()
                .cloned()
                .map(|r| InventoryRecord { updated_at: None, ..r })
                .collect()
        };
        assert_eq!(strip(&first.rows), strip(&second.rows));
    }
}
