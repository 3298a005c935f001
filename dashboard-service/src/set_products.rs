use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use shared::size::{item_prefix, sort_by_size};
use shared::{page_window, Page, SizeOrdering};
use tracing::info;
use uuid::Uuid;

use crate::api::{escape_like, like_pattern, non_blank, required, AppState};
use crate::error::{ApiError, StorageResultExt};
use crate::models::{Product, SetProduct, SetProductChanges};
use crate::schema::{products, set_products};

#[derive(Debug, Default, Deserialize)]
pub struct SetProductQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSetProductRequest {
    pub item_prefix: String,
    pub set_name: String,
    pub memo: Option<String>,
}

impl CreateSetProductRequest {
    fn into_set_product(self) -> Result<SetProduct, ApiError> {
        let prefix = item_prefix(required(&self.item_prefix, "item_prefix")?);
        if prefix.is_empty() {
            return Err(ApiError::validation("item_prefix must not start with '-'"));
        }
        let now = Utc::now();
        Ok(SetProduct {
            id: Uuid::new_v4(),
            item_prefix: prefix.to_string(),
            set_name: required(&self.set_name, "set_name")?.to_string(),
            memo: self.memo,
            created_at: Some(now),
            updated_at: Some(now),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SetVariants {
    pub set_product: SetProduct,
    pub total: i64,
    pub variants: Vec<Product>,
}

fn filtered(query: &SetProductQuery) -> set_products::BoxedQuery<'static, Pg> {
    let mut q = set_products::table.into_boxed();
    if let Some(search) = non_blank(query.search.as_deref()) {
        let pattern = like_pattern(search);
        q = q.filter(
            set_products::item_prefix
                .ilike(pattern.clone())
                .or(set_products::set_name.ilike(pattern)),
        );
    }
    q
}

pub async fn list_set_products(
    State(state): State<AppState>,
    Query(query): Query<SetProductQuery>,
) -> Result<Json<Page<SetProduct>>, ApiError> {
    let (page, page_size, offset) = page_window(query.page, query.page_size);
    let mut conn = state.pool.get().await.storage("acquire connection")?;

    let total = filtered(&query)
        .count()
        .get_result::<i64>(&mut conn)
        .await
        .storage("count set products")?;
    let items = filtered(&query)
        .order(set_products::item_prefix.asc())
        .limit(page_size)
        .offset(offset)
        .load::<SetProduct>(&mut conn)
        .await
        .storage("load set products")?;

    Ok(Json(Page {
        items,
        total,
        page,
        page_size,
    }))
}

async fn find_set_product(state: &AppState, id: Uuid) -> Result<SetProduct, ApiError> {
    let mut conn = state.pool.get().await.storage("acquire connection")?;
    set_products::table
        .find(id)
        .first::<SetProduct>(&mut conn)
        .await
        .optional()
        .storage("load set product")?
        .ok_or_else(|| ApiError::not_found(format!("set product {id} not found")))
}

pub async fn get_set_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SetProduct>, ApiError> {
    find_set_product(&state, id).await.map(Json)
}

/// Products whose item number shares the set's prefix, smallest size first.
pub async fn list_variants(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SetVariants>, ApiError> {
    let set_product = find_set_product(&state, id).await?;
    let mut conn = state.pool.get().await.storage("acquire connection")?;

    let candidates = products::table
        .filter(products::item_number.like(format!("{}%", escape_like(&set_product.item_prefix))))
        .load::<Product>(&mut conn)
        .await
        .storage("load set variants")?;

    let mut variants: Vec<Product> = candidates
        .into_iter()
        .filter(|p| {
            p.item_number
                .as_deref()
                .map(|n| item_prefix(n) == set_product.item_prefix)
                .unwrap_or(false)
        })
        .collect();
    sort_by_size(&mut variants, SizeOrdering::Standard, |p| {
        p.specification.as_deref().unwrap_or("")
    });

    Ok(Json(SetVariants {
        total: variants.iter().map(|p| p.total as i64).sum(),
        set_product,
        variants,
    }))
}

pub async fn create_set_product(
    State(state): State<AppState>,
    Json(request): Json<CreateSetProductRequest>,
) -> Result<(StatusCode, Json<SetProduct>), ApiError> {
    let set_product = request.into_set_product()?;
    let mut conn = state.pool.get().await.storage("acquire connection")?;

    let saved = diesel::insert_into(set_products::table)
        .values(&set_product)
        .get_result::<SetProduct>(&mut conn)
        .await
        .map_err(|e| ApiError::from_write("create set product", e))?;

    info!("Created set product {} ({})", saved.item_prefix, saved.id);
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn update_set_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut changes): Json<SetProductChanges>,
) -> Result<Json<SetProduct>, ApiError> {
    if let Some(prefix) = changes.item_prefix.take() {
        let prefix = item_prefix(required(&prefix, "item_prefix")?).to_string();
        if prefix.is_empty() {
            return Err(ApiError::validation("item_prefix must not start with '-'"));
        }
        changes.item_prefix = Some(prefix);
    }
    if let Some(name) = &changes.set_name {
        required(name, "set_name")?;
    }
    changes.updated_at = Some(Utc::now());

    let mut conn = state.pool.get().await.storage("acquire connection")?;
    diesel::update(set_products::table.find(id))
        .set(&changes)
        .get_result::<SetProduct>(&mut conn)
        .await
        .optional()
        .map_err(|e| ApiError::from_write("update set product", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("set product {id} not found")))
}

pub async fn delete_set_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.pool.get().await.storage("acquire connection")?;
    let deleted = diesel::delete(set_products::table.find(id))
        .execute(&mut conn)
        .await
        .storage("delete set product")?;

    if deleted == 0 {
        return Err(ApiError::not_found(format!("set product {id} not found")));
    }
    info!("Deleted set product {}", id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_cut_at_first_dash() {
        let set = CreateSetProductRequest {
            item_prefix: " TS100-BK ".into(),
            set_name: "Basic tee".into(),
            memo: None,
        }
        .into_set_product()
        .unwrap();
        assert_eq!(set.item_prefix, "TS100");
    }

    #[test]
    fn prefix_must_have_content_before_dash() {
        let result = CreateSetProductRequest {
            item_prefix: "-BK".into(),
            set_name: "Broken".into(),
            memo: None,
        }
        .into_set_product();
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }
}
