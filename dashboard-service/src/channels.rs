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
use shared::{page_window, Page};
use tracing::info;
use uuid::Uuid;

use crate::api::{like_pattern, non_blank, required, AppState};
use crate::error::{ApiError, StorageResultExt};
use crate::models::{SalesChannel, SalesChannelChanges};
use crate::schema::sales_channels;

#[derive(Debug, Default, Deserialize)]
pub struct ChannelQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub channel_code: String,
    pub channel_name: String,
    pub commission_rate: Option<BigDecimal>,
    pub is_active: Option<bool>,
}

fn check_rate(rate: Option<&BigDecimal>) -> Result<(), ApiError> {
    if let Some(rate) = rate {
        if *rate < BigDecimal::from(0) || *rate > BigDecimal::from(100) {
            return Err(ApiError::validation("commission_rate must be between 0 and 100"));
        }
    }
    Ok(())
}

impl CreateChannelRequest {
    fn into_channel(self) -> Result<SalesChannel, ApiError> {
        check_rate(self.commission_rate.as_ref())?;
        let now = Utc::now();
        Ok(SalesChannel {
            id: Uuid::new_v4(),
            channel_code: required(&self.channel_code, "channel_code")?.to_string(),
            channel_name: required(&self.channel_name, "channel_name")?.to_string(),
            commission_rate: self.commission_rate,
            is_active: self.is_active.unwrap_or(true),
            created_at: Some(now),
            updated_at: Some(now),
        })
    }
}

fn filtered(query: &ChannelQuery) -> sales_channels::BoxedQuery<'static, Pg> {
    let mut q = sales_channels::table.into_boxed();
    if let Some(search) = non_blank(query.search.as_deref()) {
        let pattern = like_pattern(search);
        q = q.filter(
            sales_channels::channel_code
                .ilike(pattern.clone())
                .or(sales_channels::channel_name.ilike(pattern)),
        );
    }
    if let Some(active) = query.active {
        q = q.filter(sales_channels::is_active.eq(active));
    }
    q
}

pub async fn list_channels(
    State(state): State<AppState>,
    Query(query): Query<ChannelQuery>,
) -> Result<Json<Page<SalesChannel>>, ApiError> {
    let (page, page_size, offset) = page_window(query.page, query.page_size);
    let mut conn = state.pool.get().await.storage("acquire connection")?;

    let total = filtered(&query)
        .count()
        .get_result::<i64>(&mut conn)
        .await
        .storage("count channels")?;
    let items = filtered(&query)
        .order(sales_channels::channel_name.asc())
        .limit(page_size)
        .offset(offset)
        .load::<SalesChannel>(&mut conn)
        .await
        .storage("load channels")?;

    Ok(Json(Page {
        items,
        total,
        page,
        page_size,
    }))
}

pub async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SalesChannel>, ApiError> {
    let mut conn = state.pool.get().await.storage("acquire connection")?;
    sales_channels::table
        .find(id)
        .first::<SalesChannel>(&mut conn)
        .await
        .optional()
        .storage("load channel")?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("channel {id} not found")))
}

pub async fn create_channel(
    State(state): State<AppState>,
    Json(request): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<SalesChannel>), ApiError> {
    let channel = request.into_channel()?;
    let mut conn = state.pool.get().await.storage("acquire connection")?;

    let saved = diesel::insert_into(sales_channels::table)
        .values(&channel)
        .get_result::<SalesChannel>(&mut conn)
        .await
        .map_err(|e| ApiError::from_write("create channel", e))?;

    info!("Created sales channel {} ({})", saved.channel_name, saved.id);
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn update_channel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut changes): Json<SalesChannelChanges>,
) -> Result<Json<SalesChannel>, ApiError> {
    check_rate(changes.commission_rate.as_ref())?;
    if let Some(code) = &changes.channel_code {
        required(code, "channel_code")?;
    }
    if let Some(name) = &changes.channel_name {
        required(name, "channel_name")?;
    }
    changes.updated_at = Some(Utc::now());

    let mut conn = state.pool.get().await.storage("acquire connection")?;
    diesel::update(sales_channels::table.find(id))
        .set(&changes)
        .get_result::<SalesChannel>(&mut conn)
        .await
        .optional()
        .map_err(|e| ApiError::from_write("update channel", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("channel {id} not found")))
}

pub async fn delete_channel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut conn = state.pool.get().await.storage("acquire connection")?;
    let deleted = diesel::delete(sales_channels::table.find(id))
        .execute(&mut conn)
        .await
        .map_err(|e| ApiError::from_write("delete channel", e))?;

    if deleted == 0 {
        return Err(ApiError::not_found(format!("channel {id} not found")));
    }
    info!("Deleted sales channel {}", id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{create_router, test_support::offline_state};
    use axum::{body::Body, http::Request};
    use std::str::FromStr;
    use tower::ServiceExt;

    #[test]
    fn new_channels_default_to_active() {
        let channel = CreateChannelRequest {
            channel_code: "SS".into(),
            channel_name: "Smart Store".into(),
            commission_rate: Some(BigDecimal::from_str("5.5").unwrap()),
            is_active: None,
        }
        .into_channel()
        .unwrap();
        assert!(channel.is_active);
        assert_eq!(channel.channel_code, "SS");
    }

    #[test]
    fn commission_rate_is_a_percentage() {
        assert!(check_rate(Some(&BigDecimal::from(101))).is_err());
        assert!(check_rate(Some(&BigDecimal::from(-1))).is_err());
        assert!(check_rate(Some(&BigDecimal::from(0))).is_ok());
        assert!(check_rate(None).is_ok());
    }

    #[tokio::test]
    async fn create_without_name_is_rejected_before_storage() {
        let app = create_router(offline_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/channels")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"channel_code":"SS","channel_name":" "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
