use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use shared::size::{group_by_item_number, SizeGroup};
use shared::{page_window, Page, SizeOrdering, SyncMode};

use crate::api::{like_pattern, non_blank, AppState};
use crate::error::{ApiError, StorageResultExt};
use crate::handlers::{load_sync_setting, next_eligible_at, SyncHandler, SyncReport};
use crate::models::{InventoryHistory, Product};
use crate::schema::{inventory_history, products};

#[derive(Debug, Default, Deserialize)]
pub struct GroupedQuery {
    pub search: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InventoryGroup {
    pub item_number: String,
    pub total: i64,
    pub variants: Vec<Product>,
}

impl From<SizeGroup<Product>> for InventoryGroup {
    fn from(group: SizeGroup<Product>) -> Self {
        Self {
            total: group.variants.iter().map(|p| p.total as i64).sum(),
            item_number: group.item_number,
            variants: group.variants,
        }
    }
}

/// Products grouped by item number, each group's variants in size order.
pub async fn grouped_inventory(
    State(state): State<AppState>,
    Query(query): Query<GroupedQuery>,
) -> Result<Json<Vec<InventoryGroup>>, ApiError> {
    let mut q = products::table.into_boxed::<Pg>();
    if let Some(search) = non_blank(query.search.as_deref()) {
        let pattern = like_pattern(search);
        q = q.filter(
            products::product_code
                .ilike(pattern.clone())
                .or(products::product_name.ilike(pattern)),
        );
    }
    if let Some(category) = non_blank(query.category.as_deref()) {
        q = q.filter(products::category.eq(category.to_string()));
    }

    let mut conn = state.pool.get().await.storage("acquire connection")?;
    let rows = q
        .order(products::product_code.asc())
        .load::<Product>(&mut conn)
        .await
        .storage("load inventory")?;

    let groups = group_by_item_number(
        rows,
        SizeOrdering::Standard,
        |p| p.item_number.as_deref(),
        |p| p.specification.as_deref(),
    );
    Ok(Json(groups.into_iter().map(InventoryGroup::from).collect()))
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    #[serde(default)]
    pub mode: SyncMode,
}

pub async fn sync_inventory(
    State(state): State<AppState>,
    Query(params): Query<SyncParams>,
) -> Result<Json<SyncReport>, ApiError> {
    let handler = SyncHandler::new(state.pool, state.erp, state.sync_cooldown);
    let report = handler.run(params.mode).await?;
    Ok(Json(report))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub product_code: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

fn filtered_history(query: &HistoryQuery) -> inventory_history::BoxedQuery<'static, Pg> {
    let mut q = inventory_history::table.into_boxed();
    if let Some(code) = non_blank(query.product_code.as_deref()) {
        q = q.filter(inventory_history::product_code.eq(code.to_string()));
    }
    if let Some(from) = query.from {
        q = q.filter(inventory_history::recorded_at.ge(from));
    }
    if let Some(to) = query.to {
        q = q.filter(inventory_history::recorded_at.lt(to));
    }
    q
}

pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Page<InventoryHistory>>, ApiError> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(ApiError::validation("from must not be after to"));
        }
    }
    let (page, page_size, offset) = page_window(query.page, query.page_size);
    let mut conn = state.pool.get().await.storage("acquire connection")?;

    let total = filtered_history(&query)
        .count()
        .get_result::<i64>(&mut conn)
        .await
        .storage("count inventory history")?;
    let items = filtered_history(&query)
        .order((inventory_history::recorded_at.desc(), inventory_history::product_code.asc()))
        .limit(page_size)
        .offset(offset)
        .load::<InventoryHistory>(&mut conn)
        .await
        .storage("load inventory history")?;

    Ok(Json(Page {
        items,
        total,
        page,
        page_size,
    }))
}

#[derive(Debug, Serialize)]
pub struct SyncSettingResponse {
    pub sync_type: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub next_eligible_at: Option<DateTime<Utc>>,
    pub cooldown_minutes: i64,
}

pub async fn get_sync_setting(
    State(state): State<AppState>,
    Path(sync_type): Path<String>,
) -> Result<Json<SyncSettingResponse>, ApiError> {
    let mut conn = state.pool.get().await.storage("acquire connection")?;
    let last_synced_at = load_sync_setting(&mut conn, &sync_type)
        .await?
        .and_then(|s| s.last_synced_at);

    Ok(Json(SyncSettingResponse {
        next_eligible_at: next_eligible_at(last_synced_at, state.sync_cooldown, Utc::now()),
        cooldown_minutes: state.sync_cooldown.num_minutes(),
        last_synced_at,
        sync_type,
    }))
}
