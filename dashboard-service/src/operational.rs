use std::cmp::Ordering;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use shared::size::{item_prefix, UNKNOWN_ITEM};
use shared::{compare_sizes_with, page_window, Page, SizeOrdering};
use tracing::info;

use crate::api::{like_pattern, non_blank, AppState};
use crate::error::{ApiError, StorageResultExt};
use crate::models::{OperationalQuantity, Product};
use crate::schema::{operational_quantities, products};

#[derive(Debug, Default, Deserialize)]
pub struct QuantityQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
    pub item_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertQuantityRequest {
    pub quantity: i32,
    pub item_number: Option<String>,
    pub specification: Option<String>,
}

/// Item number first, then size with "FREE" at the end of each item.
pub fn operational_order(a: &OperationalQuantity, b: &OperationalQuantity) -> Ordering {
    let item = |q: &OperationalQuantity| {
        non_blank(q.item_number.as_deref())
            .unwrap_or(UNKNOWN_ITEM)
            .to_string()
    };
    item(a).cmp(&item(b)).then_with(|| {
        compare_sizes_with(
            a.specification.as_deref().unwrap_or(""),
            b.specification.as_deref().unwrap_or(""),
            SizeOrdering::FreeLast,
        )
    })
}

fn page_slice<T>(rows: Vec<T>, offset: i64, page_size: i64) -> Vec<T> {
    let skip = usize::try_from(offset).unwrap_or(usize::MAX);
    let take = usize::try_from(page_size).unwrap_or(0);
    rows.into_iter().skip(skip).take(take).collect()
}

fn filtered(query: &QuantityQuery) -> operational_quantities::BoxedQuery<'static, Pg> {
    let mut q = operational_quantities::table.into_boxed();
    if let Some(search) = non_blank(query.search.as_deref()) {
        q = q.filter(operational_quantities::product_code.ilike(like_pattern(search)));
    }
    if let Some(item_number) = non_blank(query.item_number.as_deref()) {
        q = q.filter(operational_quantities::item_number.eq(item_number.to_string()));
    }
    q
}

pub async fn list_quantities(
    State(state): State<AppState>,
    Query(query): Query<QuantityQuery>,
) -> Result<Json<Page<OperationalQuantity>>, ApiError> {
    let (page, page_size, offset) = page_window(query.page, query.page_size);
    let mut conn = state.pool.get().await.storage("acquire connection")?;

    // Size order is not expressible in SQL, so sort everything and page in memory.
    let mut rows = filtered(&query)
        .load::<OperationalQuantity>(&mut conn)
        .await
        .storage("load operational quantities")?;
    rows.sort_by(operational_order);

    let total = rows.len() as i64;
    let items = page_slice(rows, offset, page_size);

    Ok(Json(Page {
        items,
        total,
        page,
        page_size,
    }))
}

pub async fn upsert_quantity(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<UpsertQuantityRequest>,
) -> Result<Json<OperationalQuantity>, ApiError> {
    let code = code.trim().to_string();
    if code.is_empty() {
        return Err(ApiError::validation("product_code is required"));
    }
    if request.quantity < 0 {
        return Err(ApiError::validation("quantity must not be negative"));
    }

    let mut conn = state.pool.get().await.storage("acquire connection")?;
    let product = products::table
        .find(code.as_str())
        .first::<Product>(&mut conn)
        .await
        .optional()
        .storage("load product")?;

    let item_number = non_blank(request.item_number.as_deref())
        .map(str::to_string)
        .or_else(|| product.as_ref().and_then(|p| p.item_number.clone()))
        .unwrap_or_else(|| item_prefix(&code).to_string());
    let specification = non_blank(request.specification.as_deref())
        .map(str::to_string)
        .or_else(|| product.as_ref().and_then(|p| p.specification.clone()))
        .unwrap_or_default();

    let row = OperationalQuantity {
        product_code: code,
        item_number: Some(item_number),
        specification: Some(specification),
        quantity: request.quantity,
        updated_at: Some(Utc::now()),
    };

    let saved = diesel::insert_into(operational_quantities::table)
        .values(&row)
        .on_conflict(operational_quantities::product_code)
        .do_update()
        .set((
            operational_quantities::item_number.eq(excluded(operational_quantities::item_number)),
            operational_quantities::specification.eq(excluded(operational_quantities::specification)),
            operational_quantities::quantity.eq(excluded(operational_quantities::quantity)),
            operational_quantities::updated_at.eq(excluded(operational_quantities::updated_at)),
        ))
        .get_result::<OperationalQuantity>(&mut conn)
        .await
        .storage("save operational quantity")?;

    info!("Operational quantity for {} set to {}", saved.product_code, saved.quantity);
    Ok(Json(saved))
}

pub async fn delete_quantity(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.pool.get().await.storage("acquire connection")?;
    let deleted = diesel::delete(operational_quantities::table.find(code.as_str()))
        .execute(&mut conn)
        .await
        .storage("delete operational quantity")?;

    if deleted == 0 {
        return Err(ApiError::not_found(format!("operational quantity for {code} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}
