use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use shared::{reconcile, InventoryRecord, SyncMode, UpsertBatch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::DbPool;
use crate::erp::ErpClient;
use crate::error::{ApiError, StorageResultExt};
use crate::models::*;
use crate::schema::*;

/// Rows per INSERT statement; keeps bind parameters under the Postgres limit.
const UPSERT_CHUNK: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub sync_type: String,
    pub fetched_rows: usize,
    pub upserted: usize,
    pub dropped: Vec<String>,
    pub skipped_rows: usize,
    pub synced_at: DateTime<Utc>,
}

/// When the next sync may start, or `None` if one may start now.
pub fn next_eligible_at(
    last_synced_at: Option<DateTime<Utc>>,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let next = last_synced_at? + cooldown;
    (now < next).then_some(next)
}

pub struct SyncHandler {
    pool: DbPool,
    erp: Arc<ErpClient>,
    cooldown: Duration,
}

impl SyncHandler {
    pub fn new(pool: DbPool, erp: Arc<ErpClient>, cooldown: Duration) -> Self {
        Self { pool, erp, cooldown }
    }

    /// Claims the cooldown slot for `mode`, pulls an ERP snapshot and writes
    /// the reconciled batch. The slot is handed back if anything after the
    /// claim fails.
    pub async fn run(&self, mode: SyncMode) -> Result<SyncReport, ApiError> {
        let sync_type = mode.sync_type();
        let now = Utc::now().trunc_subsecs(6);

        let previous = {
            let mut conn = self.pool.get().await.storage("acquire connection")?;
            self.claim_slot(&mut conn, sync_type, now).await?
        };

        match self.sync(mode, now).await {
            Ok(report) => Ok(report),
            Err(e) => {
                if let Err(release_err) = self.release_slot(sync_type, now, previous).await {
                    error!("Failed to release {} slot: {}", sync_type, release_err);
                }
                Err(e)
            }
        }
    }

    /// Compare-and-swap on `sync_settings.last_synced_at`. Returns the value
    /// that was replaced.
    async fn claim_slot(
        &self,
        conn: &mut AsyncPgConnection,
        sync_type: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ApiError> {
        diesel::insert_into(sync_settings::table)
            .values(&SyncSetting {
                sync_type: sync_type.to_string(),
                last_synced_at: None,
            })
            .on_conflict_do_nothing()
            .execute(conn)
            .await
            .storage("initialize sync setting")?;

        let current = load_sync_setting(conn, sync_type).await?;
        let previous = current.and_then(|s| s.last_synced_at);

        if let Some(next) = next_eligible_at(previous, self.cooldown, now) {
            return Err(ApiError::RateLimited {
                sync_type: sync_type.to_string(),
                next_eligible_at: next,
            });
        }

        let target = sync_settings::table.filter(sync_settings::sync_type.eq(sync_type));
        let swapped = match previous {
            Some(prev) => {
                diesel::update(target.filter(sync_settings::last_synced_at.eq(prev)))
                    .set(sync_settings::last_synced_at.eq(Some(now)))
                    .execute(conn)
                    .await
            }
            None => {
                diesel::update(target.filter(sync_settings::last_synced_at.is_null()))
                    .set(sync_settings::last_synced_at.eq(Some(now)))
                    .execute(conn)
                    .await
            }
        }
        .storage("claim sync slot")?;

        if swapped == 0 {
            // Another request claimed the slot between our read and write.
            let winner = load_sync_setting(conn, sync_type)
                .await?
                .and_then(|s| s.last_synced_at)
                .unwrap_or(now);
            warn!("Concurrent {} claim lost", sync_type);
            return Err(ApiError::RateLimited {
                sync_type: sync_type.to_string(),
                next_eligible_at: winner + self.cooldown,
            });
        }

        info!("Claimed {} slot at {}", sync_type, now);
        Ok(previous)
    }

    async fn release_slot(
        &self,
        sync_type: &str,
        claimed_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<(), ApiError> {
        let mut conn = self.pool.get().await.storage("acquire connection")?;
        diesel::update(
            sync_settings::table
                .filter(sync_settings::sync_type.eq(sync_type))
                .filter(sync_settings::last_synced_at.eq(claimed_at)),
        )
        .set(sync_settings::last_synced_at.eq(previous))
        .execute(&mut conn)
        .await
        .storage("release sync slot")?;
        Ok(())
    }

    async fn sync(&self, mode: SyncMode, now: DateTime<Utc>) -> Result<SyncReport, ApiError> {
        let snapshot = self.erp.fetch_snapshot(now.date_naive()).await?;

        let mut conn = self.pool.get().await.storage("acquire connection")?;

        let mut codes: Vec<&str> = snapshot.iter().map(|r| r.product_code.trim()).collect();
        codes.sort_unstable();
        codes.dedup();

        let existing: Vec<InventoryRecord> = products::table
            .filter(products::product_code.eq_any(codes))
            .load::<Product>(&mut conn)
            .await
            .storage("load stored products")?
            .into_iter()
            .map(InventoryRecord::from)
            .collect();

        let batch = reconcile(&snapshot, &existing, mode, now);
        if !batch.dropped.is_empty() {
            warn!(
                "Sync skipped {} product codes not registered yet: {:?}",
                batch.dropped.len(),
                batch.dropped
            );
        }

        let dropped = batch.dropped.clone();
        let skipped_rows = batch.skipped_rows;
        let batch_rows = batch.rows.len();
        let upserted = store_batch(&mut conn, batch, now).await?;
        if upserted < batch_rows {
            warn!("{} products were deleted while the sync ran", batch_rows - upserted);
        }

        let report = SyncReport {
            mode,
            sync_type: mode.sync_type().to_string(),
            fetched_rows: snapshot.len(),
            upserted,
            dropped,
            skipped_rows,
            synced_at: now,
        };

        info!(
            "{} finished: fetched={}, upserted={}, dropped={}",
            report.sync_type,
            report.fetched_rows,
            report.upserted,
            report.dropped.len()
        );
        Ok(report)
    }
}

pub async fn load_sync_setting(
    conn: &mut AsyncPgConnection,
    sync_type: &str,
) -> Result<Option<SyncSetting>, ApiError> {
    sync_settings::table
        .filter(sync_settings::sync_type.eq(sync_type))
        .first::<SyncSetting>(conn)
        .await
        .optional()
        .storage("load sync setting")
}

/// Refreshes stock on one stored product. Matches nothing if the product is gone.
fn stock_update(
    row: &InventoryRecord,
) -> diesel::dsl::Update<diesel::dsl::Find<products::table, String>, StockUpdate> {
    diesel::update(products::table.find(row.product_code.clone())).set(StockUpdate::from(row))
}

fn history_row(row: &InventoryRecord, mode: SyncMode, now: DateTime<Utc>) -> InventoryHistory {
    InventoryHistory {
        id: Uuid::new_v4(),
        product_code: row.product_code.clone(),
        warehouse_106: row.stock.warehouse_106,
        warehouse_3333: row.stock.warehouse_3333,
        total: row.total,
        sync_mode: mode.as_str().to_string(),
        recorded_at: now,
    }
}

/// Writes the batch and appends history for every row written, in one
/// transaction. Returns the number of products written.
///
/// `update_existing_only` touches only the stock columns of rows that still
/// exist; `upsert_all` inserts or overwrites the snapshot columns.
async fn store_batch(
    conn: &mut AsyncPgConnection,
    batch: UpsertBatch,
    now: DateTime<Utc>,
) -> Result<usize, ApiError> {
    if batch.rows.is_empty() {
        return Ok(0);
    }
    let mode = batch.mode;
    let rows = batch.rows;

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        Box::pin(async move {
            let written = match mode {
                SyncMode::UpdateExistingOnly => {
                    let mut written = Vec::with_capacity(rows.len());
                    for row in rows {
                        if stock_update(&row).execute(conn).await? > 0 {
                            written.push(row);
                        }
                    }
                    written
                }
                SyncMode::UpsertAll => {
                    let snapshot: Vec<SnapshotProduct> =
                        rows.iter().cloned().map(SnapshotProduct::from).collect();
                    for chunk in snapshot.chunks(UPSERT_CHUNK) {
                        diesel::insert_into(products::table)
                            .values(chunk)
                            .on_conflict(products::product_code)
                            .do_update()
                            .set((
                                products::item_number.eq(excluded(products::item_number)),
                                products::product_name.eq(excluded(products::product_name)),
                                products::specification.eq(excluded(products::specification)),
                                products::warehouse_106.eq(excluded(products::warehouse_106)),
                                products::warehouse_3333.eq(excluded(products::warehouse_3333)),
                                products::total.eq(excluded(products::total)),
                                products::updated_at.eq(excluded(products::updated_at)),
                            ))
                            .execute(conn)
                            .await?;
                    }
                    rows
                }
            };

            let history: Vec<InventoryHistory> = written
                .iter()
                .map(|r| history_row(r, mode, now))
                .collect();
            for chunk in history.chunks(UPSERT_CHUNK) {
                diesel::insert_into(inventory_history::table)
                    .values(chunk)
                    .execute(conn)
                    .await?;
            }

            Ok(written.len())
        })
    })
    .await
    .storage("write inventory batch")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn first_sync_is_always_eligible() {
        assert_eq!(
            next_eligible_at(None, Duration::minutes(10), at("2024-05-01T10:00:00Z")),
            None
        );
    }

    #[test]
    fn sync_inside_cooldown_reports_next_time() {
        let last = at("2024-05-01T10:00:00Z");
        assert_eq!(
            next_eligible_at(Some(last), Duration::minutes(10), at("2024-05-01T10:09:59Z")),
            Some(at("2024-05-01T10:10:00Z"))
        );
    }

    #[test]
    fn sync_after_cooldown_is_eligible() {
        let last = at("2024-05-01T10:00:00Z");
        let cooldown = Duration::minutes(10);
        assert_eq!(next_eligible_at(Some(last), cooldown, at("2024-05-01T10:10:00Z")), None);
        assert_eq!(next_eligible_at(Some(last), cooldown, at("2024-05-02T00:00:00Z")), None);
    }

    #[test]
    fn existing_only_sync_writes_stock_columns_only() {
        let mut row = InventoryRecord::new("TS100-M".to_string());
        row.product_name = "Basic tee".into();
        row.category = Some("tops".into());
        row.memo = Some("hand edited".into());
        row.stock.warehouse_106 = 5;
        row.total = 5;
        row.updated_at = Some(Utc::now());

        let sql = diesel::debug_query::<diesel::pg::Pg, _>(&stock_update(&row)).to_string();
        assert!(sql.starts_with("UPDATE \"products\" SET"), "{sql}");
        for column in ["warehouse_106", "warehouse_3333", "\"total\"", "updated_at"] {
            assert!(sql.contains(column), "{column} missing from {sql}");
        }
        for column in ["product_name", "category", "memo", "INSERT"] {
            assert!(!sql.contains(column), "{column} in {sql}");
        }
    }

    /// Needs a scratch Postgres in `TEST_DATABASE_URL`.
    mod with_database {
        use super::*;
        use crate::erp::ErpConfig;
        use diesel::{Connection, PgConnection};
        use diesel_async::pooled_connection::AsyncDieselConnectionManager;
        use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

        const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

        async fn handler() -> SyncHandler {
            let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL not set");
            let mut conn = PgConnection::establish(&url).unwrap();
            conn.run_pending_migrations(MIGRATIONS).unwrap();

            let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(url);
            let pool = bb8::Pool::builder().build(manager).await.unwrap();
            // No credentials: every sync fails right after the claim.
            let erp = ErpClient::new(ErpConfig {
                com_code: String::new(),
                user_id: String::new(),
                api_key: String::new(),
                warehouses: vec!["106".into(), "3333".into()],
                lan_type: "ko-KR".into(),
                test_mode: true,
                timeout: std::time::Duration::from_secs(1),
                expose_details: true,
            })
            .unwrap();
            SyncHandler::new(pool, Arc::new(erp), Duration::minutes(10))
        }

        #[tokio::test]
        #[ignore]
        async fn second_claim_inside_cooldown_is_rate_limited() {
            let handler = handler().await;
            let sync_type = format!("test_{}", Uuid::new_v4());
            let mut conn = handler.pool.get().await.unwrap();
            let now = Utc::now().trunc_subsecs(6);

            assert_eq!(handler.claim_slot(&mut conn, &sync_type, now).await.unwrap(), None);
            match handler
                .claim_slot(&mut conn, &sync_type, now + Duration::minutes(1))
                .await
            {
                Err(ApiError::RateLimited { next_eligible_at, .. }) => {
                    assert_eq!(next_eligible_at, now + Duration::minutes(10));
                }
                other => panic!("unexpected {other:?}"),
            }

            handler.release_slot(&sync_type, now, None).await.unwrap();
            let setting = load_sync_setting(&mut conn, &sync_type).await.unwrap().unwrap();
            assert_eq!(setting.last_synced_at, None);

            diesel::delete(sync_settings::table.find(sync_type))
                .execute(&mut conn)
                .await
                .unwrap();
        }

        #[tokio::test]
        #[ignore]
        async fn failed_sync_hands_the_slot_back() {
            let handler = handler().await;
            let sync_type = SyncMode::UpdateExistingOnly.sync_type();
            let mut conn = handler.pool.get().await.unwrap();
            diesel::insert_into(sync_settings::table)
                .values(&SyncSetting {
                    sync_type: sync_type.to_string(),
                    last_synced_at: None,
                })
                .on_conflict(sync_settings::sync_type)
                .do_update()
                .set(sync_settings::last_synced_at.eq(None::<DateTime<Utc>>))
                .execute(&mut conn)
                .await
                .unwrap();

            for _ in 0..2 {
                assert!(matches!(
                    handler.run(SyncMode::UpdateExistingOnly).await,
                    Err(ApiError::ExternalService { .. })
                ));
                let setting = load_sync_setting(&mut conn, sync_type).await.unwrap().unwrap();
                assert_eq!(setting.last_synced_at, None);
            }
        }
    }
}
