use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use shared::{page_window, Page};
use tracing::info;
use uuid::Uuid;

use crate::api::{non_blank, required, AppState};
use crate::error::{ApiError, StorageResultExt};
use crate::models::{SalesPerformance, SalesPerformanceChanges, SalesPlan, SalesPlanChanges};
use crate::schema::{sales_performance, sales_plans};

/// Plans are stored against the first day of their month.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn check_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<(), ApiError> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(ApiError::validation("from must not be after to")),
        _ => Ok(()),
    }
}

fn check_targets(quantity: Option<i32>, amount: Option<&BigDecimal>) -> Result<(), ApiError> {
    if quantity.map_or(false, |q| q < 0) {
        return Err(ApiError::validation("target_quantity must not be negative"));
    }
    if amount.map_or(false, |a| *a < BigDecimal::from(0)) {
        return Err(ApiError::validation("target_amount must not be negative"));
    }
    Ok(())
}

// ---- sales plans ----

#[derive(Debug, Default, Deserialize)]
pub struct PlanQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub channel_id: Option<Uuid>,
    pub product_code: Option<String>,
    pub from_month: Option<NaiveDate>,
    pub to_month: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub channel_id: Uuid,
    pub product_code: String,
    pub plan_month: NaiveDate,
    pub target_quantity: i32,
    pub target_amount: BigDecimal,
    pub memo: Option<String>,
}

impl CreatePlanRequest {
    fn into_plan(self) -> Result<SalesPlan, ApiError> {
        check_targets(Some(self.target_quantity), Some(&self.target_amount))?;
        let now = Utc::now();
        Ok(SalesPlan {
            id: Uuid::new_v4(),
            channel_id: self.channel_id,
            product_code: required(&self.product_code, "product_code")?.to_string(),
            plan_month: month_start(self.plan_month),
            target_quantity: self.target_quantity,
            target_amount: self.target_amount,
            memo: self.memo,
            created_at: Some(now),
            updated_at: Some(now),
        })
    }
}

fn filtered_plans(query: &PlanQuery) -> sales_plans::BoxedQuery<'static, Pg> {
    let mut q = sales_plans::table.into_boxed();
    if let Some(channel_id) = query.channel_id {
        q = q.filter(sales_plans::channel_id.eq(channel_id));
    }
    if let Some(code) = non_blank(query.product_code.as_deref()) {
        q = q.filter(sales_plans::product_code.eq(code.to_string()));
    }
    if let Some(from) = query.from_month {
        q = q.filter(sales_plans::plan_month.ge(month_start(from)));
    }
    if let Some(to) = query.to_month {
        q = q.filter(sales_plans::plan_month.le(month_start(to)));
    }
    q
}

pub async fn list_plans(
    State(state): State<AppState>,
    Query(query): Query<PlanQuery>,
) -> Result<Json<Page<SalesPlan>>, ApiError> {
    check_range(query.from_month, query.to_month)?;
    let (page, page_size, offset) = page_window(query.page, query.page_size);
    let mut conn = state.pool.get().await.storage("acquire connection")?;

    let total = filtered_plans(&query)
        .count()
        .get_result::<i64>(&mut conn)
        .await
        .storage("count sales plans")?;
    let items = filtered_plans(&query)
        .order((sales_plans::plan_month.desc(), sales_plans::product_code.asc()))
        .limit(page_size)
        .offset(offset)
        .load::<SalesPlan>(&mut conn)
        .await
        .storage("load sales plans")?;

    Ok(Json(Page {
        items,
        total,
        page,
        page_size,
    }))
}

pub async fn get_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SalesPlan>, ApiError> {
    let mut conn = state.pool.get().await.storage("acquire connection")?;
    sales_plans::table
        .find(id)
        .first::<SalesPlan>(&mut conn)
        .await
        .optional()
        .storage("load sales plan")?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("sales plan {id} not found")))
}

pub async fn create_plan(
    State(state): State<AppState>,
    Json(request): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<SalesPlan>), ApiError> {
    let plan = request.into_plan()?;
    let mut conn = state.pool.get().await.storage("acquire connection")?;

    let saved = diesel::insert_into(sales_plans::table)
        .values(&plan)
        .get_result::<SalesPlan>(&mut conn)
        .await
        .map_err(|e| ApiError::from_write("create sales plan", e))?;

    info!("Created sales plan {} for {} {}", saved.id, saved.product_code, saved.plan_month);
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn update_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut changes): Json<SalesPlanChanges>,
) -> Result<Json<SalesPlan>, ApiError> {
    check_targets(changes.target_quantity, changes.target_amount.as_ref())?;
    if let Some(code) = &changes.product_code {
        required(code, "product_code")?;
    }
    changes.plan_month = changes.plan_month.map(month_start);
    changes.updated_at = Some(Utc::now());

    let mut conn = state.pool.get().await.storage("acquire connection")?;
    diesel::update(sales_plans::table.find(id))
        .set(&changes)
        .get_result::<SalesPlan>(&mut conn)
        .await
        .optional()
        .map_err(|e| ApiError::from_write("update sales plan", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("sales plan {id} not found")))
}

pub async fn delete_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.pool.get().await.storage("acquire connection")?;
    let deleted = diesel::delete(sales_plans::table.find(id))
        .execute(&mut conn)
        .await
        .storage("delete sales plan")?;

    if deleted == 0 {
        return Err(ApiError::not_found(format!("sales plan {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---- sales performance ----

#[derive(Debug, Default, Deserialize)]
pub struct PerformanceQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub channel_id: Option<Uuid>,
    pub product_code: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePerformanceRequest {
    pub channel_id: Uuid,
    pub product_code: String,
    pub sale_date: NaiveDate,
    pub quantity: i32,
    pub amount: BigDecimal,
}

impl CreatePerformanceRequest {
    fn into_performance(self) -> Result<SalesPerformance, ApiError> {
        let now = Utc::now();
        Ok(SalesPerformance {
            id: Uuid::new_v4(),
            channel_id: self.channel_id,
            product_code: required(&self.product_code, "product_code")?.to_string(),
            sale_date: self.sale_date,
            quantity: self.quantity,
            amount: self.amount,
            created_at: Some(now),
            updated_at: Some(now),
        })
    }
}

fn filtered_performance(query: &PerformanceQuery) -> sales_performance::BoxedQuery<'static, Pg> {
    let mut q = sales_performance::table.into_boxed();
    if let Some(channel_id) = query.channel_id {
        q = q.filter(sales_performance::channel_id.eq(channel_id));
    }
    if let Some(code) = non_blank(query.product_code.as_deref()) {
        q = q.filter(sales_performance::product_code.eq(code.to_string()));
    }
    if let Some(from) = query.from {
        q = q.filter(sales_performance::sale_date.ge(from));
    }
    if let Some(to) = query.to {
        q = q.filter(sales_performance::sale_date.le(to));
    }
    q
}

pub async fn list_performance(
    State(state): State<AppState>,
    Query(query): Query<PerformanceQuery>,
) -> Result<Json<Page<SalesPerformance>>, ApiError> {
    check_range(query.from, query.to)?;
    let (page, page_size, offset) = page_window(query.page, query.page_size);
    let mut conn = state.pool.get().await.storage("acquire connection")?;

    let total = filtered_performance(&query)
        .count()
        .get_result::<i64>(&mut conn)
        .await
        .storage("count sales performance")?;
    let items = filtered_performance(&query)
        .order((sales_performance::sale_date.desc(), sales_performance::product_code.asc()))
        .limit(page_size)
        .offset(offset)
        .load::<SalesPerformance>(&mut conn)
        .await
        .storage("load sales performance")?;

    Ok(Json(Page {
        items,
        total,
        page,
        page_size,
    }))
}

pub async fn get_performance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SalesPerformance>, ApiError> {
    let mut conn = state.pool.get().await.storage("acquire connection")?;
    sales_performance::table
        .find(id)
        .first::<SalesPerformance>(&mut conn)
        .await
        .optional()
        .storage("load sales performance")?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("sales performance {id} not found")))
}

pub async fn create_performance(
    State(state): State<AppState>,
    Json(request): Json<CreatePerformanceRequest>,
) -> Result<(StatusCode, Json<SalesPerformance>), ApiError> {
    let record = request.into_performance()?;
    let mut conn = state.pool.get().await.storage("acquire connection")?;

    let saved = diesel::insert_into(sales_performance::table)
        .values(&record)
        .get_result::<SalesPerformance>(&mut conn)
        .await
        .map_err(|e| ApiError::from_write("record sales performance", e))?;

    info!("Recorded sales of {} x{} on {}", saved.product_code, saved.quantity, saved.sale_date);
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn update_performance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut changes): Json<SalesPerformanceChanges>,
) -> Result<Json<SalesPerformance>, ApiError> {
    if let Some(code) = &changes.product_code {
        required(code, "product_code")?;
    }
    changes.updated_at = Some(Utc::now());

    let mut conn = state.pool.get().await.storage("acquire connection")?;
    diesel::update(sales_performance::table.find(id))
        .set(&changes)
        .get_result::<SalesPerformance>(&mut conn)
        .await
        .optional()
        .map_err(|e| ApiError::from_write("update sales performance", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("sales performance {id} not found")))
}

pub async fn delete_performance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.pool.get().await.storage("acquire connection")?;
    let deleted = diesel::delete(sales_performance::table.find(id))
        .execute(&mut conn)
        .await
        .storage("delete sales performance")?;

    if deleted == 0 {
        return Err(ApiError::not_found(format!("sales performance {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn plan_month_is_normalized() {
        let plan = CreatePlanRequest {
            channel_id: Uuid::new_v4(),
            product_code: "TS100-M".into(),
            plan_month: date(2024, 7, 19),
            target_quantity: 30,
            target_amount: BigDecimal::from(900_000),
            memo: None,
        }
        .into_plan()
        .unwrap();
        assert_eq!(plan.plan_month, date(2024, 7, 1));
    }

    #[test]
    fn negative_targets_are_rejected() {
        assert!(check_targets(Some(-1), None).is_err());
        assert!(check_targets(None, Some(&BigDecimal::from(-5))).is_err());
        assert!(check_targets(Some(0), Some(&BigDecimal::from(0))).is_ok());
    }

    #[test]
    fn reversed_ranges_are_rejected() {
        assert!(check_range(Some(date(2024, 2, 1)), Some(date(2024, 1, 1))).is_err());
        assert!(check_range(Some(date(2024, 1, 1)), None).is_ok());
    }
}
