use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::{ApiError, StorageResultExt};
use crate::models::{SalesChannel, SalesPerformance, SalesPlan};
use crate::sales::month_start;
use crate::schema::{sales_channels, sales_performance, sales_plans};

#[derive(Debug, Default, Deserialize)]
pub struct StatisticsQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub channel_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SalesFigures {
    pub quantity: i64,
    pub amount: BigDecimal,
    pub target_quantity: i64,
    pub target_amount: BigDecimal,
    /// Percent of target amount reached; `None` without a target.
    pub achievement_rate: Option<f64>,
}

impl SalesFigures {
    fn add_sale(&mut self, quantity: i32, amount: &BigDecimal) {
        self.quantity += quantity as i64;
        self.amount += amount;
    }

    fn add_target(&mut self, quantity: i32, amount: &BigDecimal) {
        self.target_quantity += quantity as i64;
        self.target_amount += amount;
    }

    fn finish(&mut self) {
        self.achievement_rate = if self.target_amount.is_zero() {
            None
        } else {
            (&self.amount * BigDecimal::from(100) / &self.target_amount)
                .to_f64()
                .map(|rate| (rate * 100.0).round() / 100.0)
        };
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatistics {
    pub channel_id: Uuid,
    pub channel_name: String,
    #[serde(flatten)]
    pub figures: SalesFigures,
    pub commission: BigDecimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductStatistics {
    pub product_code: String,
    #[serde(flatten)]
    pub figures: SalesFigures,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesStatistics {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub totals: SalesFigures,
    pub channels: Vec<ChannelStatistics>,
    pub products: Vec<ProductStatistics>,
}

/// Rolls sales and plans up per channel and per product. Plans count toward a
/// period when their month falls inside it.
pub fn summarize(
    from: NaiveDate,
    to: NaiveDate,
    performance: &[SalesPerformance],
    plans: &[SalesPlan],
    channels: &[SalesChannel],
) -> SalesStatistics {
    let mut totals = SalesFigures::default();
    let mut by_channel: BTreeMap<Uuid, SalesFigures> = BTreeMap::new();
    let mut by_product: BTreeMap<String, SalesFigures> = BTreeMap::new();

    for sale in performance {
        totals.add_sale(sale.quantity, &sale.amount);
        by_channel
            .entry(sale.channel_id)
            .or_default()
            .add_sale(sale.quantity, &sale.amount);
        by_product
            .entry(sale.product_code.clone())
            .or_default()
            .add_sale(sale.quantity, &sale.amount);
    }
    for plan in plans {
        totals.add_target(plan.target_quantity, &plan.target_amount);
        by_channel
            .entry(plan.channel_id)
            .or_default()
            .add_target(plan.target_quantity, &plan.target_amount);
        by_product
            .entry(plan.product_code.clone())
            .or_default()
            .add_target(plan.target_quantity, &plan.target_amount);
    }

    totals.finish();

    let mut channel_rows: Vec<ChannelStatistics> = by_channel
        .into_iter()
        .map(|(channel_id, mut figures)| {
            figures.finish();
            let channel = channels.iter().find(|c| c.id == channel_id);
            let commission = channel
                .and_then(|c| c.commission_rate.as_ref())
                .map(|rate| &figures.amount * rate / BigDecimal::from(100))
                .unwrap_or_default();
            ChannelStatistics {
                channel_id,
                channel_name: channel.map(|c| c.channel_name.clone()).unwrap_or_default(),
                figures,
                commission,
            }
        })
        .collect();
    channel_rows.sort_by(|a, b| b.figures.amount.cmp(&a.figures.amount));

    let mut product_rows: Vec<ProductStatistics> = by_product
        .into_iter()
        .map(|(product_code, mut figures)| {
            figures.finish();
            ProductStatistics {
                product_code,
                figures,
            }
        })
        .collect();
    product_rows.sort_by(|a, b| b.figures.amount.cmp(&a.figures.amount));

    SalesStatistics {
        from,
        to,
        totals,
        channels: channel_rows,
        products: product_rows,
    }
}

fn current_month(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = month_start(today);
    let next = if start.month() == 12 {
        NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
    };
    let end = next.and_then(|d| d.pred_opt()).unwrap_or(today);
    (start, end)
}

pub async fn sales_statistics(
    State(state): State<AppState>,
    Query(query): Query<StatisticsQuery>,
) -> Result<Json<SalesStatistics>, ApiError> {
    let (default_from, default_to) = current_month(Utc::now().date_naive());
    let from = query.from.unwrap_or(default_from);
    let to = query.to.unwrap_or(default_to);
    if from > to {
        return Err(ApiError::validation("from must not be after to"));
    }

    let mut conn = state.pool.get().await.storage("acquire connection")?;

    let mut sales_q = sales_performance::table
        .filter(sales_performance::sale_date.between(from, to))
        .into_boxed();
    let mut plans_q = sales_plans::table
        .filter(sales_plans::plan_month.between(month_start(from), to))
        .into_boxed();
    if let Some(channel_id) = query.channel_id {
        sales_q = sales_q.filter(sales_performance::channel_id.eq(channel_id));
        plans_q = plans_q.filter(sales_plans::channel_id.eq(channel_id));
    }

    let performance = sales_q
        .load::<SalesPerformance>(&mut conn)
        .await
        .storage("load sales performance")?;
    let plans = plans_q
        .load::<SalesPlan>(&mut conn)
        .await
        .storage("load sales plans")?;
    let channels = sales_channels::table
        .load::<SalesChannel>(&mut conn)
        .await
        .storage("load channels")?;

    Ok(Json(summarize(from, to, &performance, &plans, &channels)))
}
