use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use shared::{page_window, size::item_prefix, Page};
use tracing::info;

use crate::api::{like_pattern, non_blank, required, AppState};
use crate::error::{ApiError, StorageResultExt};
use crate::models::{Product, ProductChanges};
use crate::schema::products;

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub item_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub product_code: String,
    pub product_name: String,
    pub item_number: Option<String>,
    pub specification: Option<String>,
    pub category: Option<String>,
    pub cost_price: Option<BigDecimal>,
    pub selling_price: Option<BigDecimal>,
    pub memo: Option<String>,
}

impl CreateProductRequest {
    fn into_product(self) -> Result<Product, ApiError> {
        let product_code = required(&self.product_code, "product_code")?.to_string();
        let product_name = required(&self.product_name, "product_name")?.to_string();
        let item_number = non_blank(self.item_number.as_deref())
            .unwrap_or_else(|| item_prefix(&product_code))
            .to_string();
        let now = Utc::now();

        Ok(Product {
            item_number: Some(item_number),
            product_name,
            specification: self.specification,
            category: self.category,
            cost_price: self.cost_price,
            selling_price: self.selling_price,
            memo: self.memo,
            warehouse_106: 0,
            warehouse_3333: 0,
            total: 0,
            created_at: Some(now),
            updated_at: Some(now),
            product_code,
        })
    }
}

fn filtered(query: &ProductQuery) -> products::BoxedQuery<'static, Pg> {
    let mut q = products::table.into_boxed();
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
    if let Some(item_number) = non_blank(query.item_number.as_deref()) {
        q = q.filter(products::item_number.eq(item_number.to_string()));
    }
    q
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Page<Product>>, ApiError> {
    let (page, page_size, offset) = page_window(query.page, query.page_size);
    let mut conn = state.pool.get().await.storage("acquire connection")?;

    let total = filtered(&query)
        .count()
        .get_result::<i64>(&mut conn)
        .await
        .storage("count products")?;
    let items = filtered(&query)
        .order(products::product_code.asc())
        .limit(page_size)
        .offset(offset)
        .load::<Product>(&mut conn)
        .await
        .storage("load products")?;

    Ok(Json(Page {
        items,
        total,
        page,
        page_size,
    }))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let mut conn = state.pool.get().await.storage("acquire connection")?;
    products::table
        .find(code.as_str())
        .first::<Product>(&mut conn)
        .await
        .optional()
        .storage("load product")?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("product {code} not found")))
}

pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = request.into_product()?;
    let mut conn = state.pool.get().await.storage("acquire connection")?;

    let saved = diesel::insert_into(products::table)
        .values(&product)
        .get_result::<Product>(&mut conn)
        .await
        .map_err(|e| ApiError::from_write("register product", e))?;

    info!("Registered product {}", saved.product_code);
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(mut changes): Json<ProductChanges>,
) -> Result<Json<Product>, ApiError> {
    if let Some(name) = &changes.product_name {
        required(name, "product_name")?;
    }
    changes.updated_at = Some(Utc::now());

    let mut conn = state.pool.get().await.storage("acquire connection")?;
    diesel::update(products::table.find(code.as_str()))
        .set(&changes)
        .get_result::<Product>(&mut conn)
        .await
        .optional()
        .map_err(|e| ApiError::from_write("update product", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("product {code} not found")))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.pool.get().await.storage("acquire connection")?;
    let deleted = diesel::delete(products::table.find(code.as_str()))
        .execute(&mut conn)
        .await
        .storage("delete product")?;

    if deleted == 0 {
        return Err(ApiError::not_found(format!("product {code} not found")));
    }
    info!("Deleted product {}", code);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(code: &str, name: &str) -> CreateProductRequest {
        CreateProductRequest {
            product_code: code.to_string(),
            product_name: name.to_string(),
            item_number: None,
            specification: Some("XL".into()),
            category: None,
            cost_price: None,
            selling_price: None,
            memo: None,
        }
    }

    #[test]
    fn registration_derives_item_number_from_code() {
        let product = request(" TS100-BK-XL ", "Basic tee").into_product().unwrap();
        assert_eq!(product.product_code, "TS100-BK-XL");
        assert_eq!(product.item_number.as_deref(), Some("TS100"));
        assert_eq!(product.total, 0);
    }

    #[test]
    fn explicit_item_number_wins() {
        let mut req = request("TS100-XL", "Basic tee");
        req.item_number = Some("TEE-2024".into());
        let product = req.into_product().unwrap();
        assert_eq!(product.item_number.as_deref(), Some("TEE-2024"));
    }

    #[test]
    fn registration_requires_code_and_name() {
        assert!(matches!(
            request("", "Basic tee").into_product(),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            request("TS100", "  ").into_product(),
            Err(ApiError::Validation(_))
        ));
    }
}
