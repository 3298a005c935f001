use std::time::Duration;

use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Serialize};
use shared::erp::*;
use tracing::{info, warn};

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct ErpConfig {
    pub com_code: String,
    pub user_id: String,
    pub api_key: String,
    pub warehouses: Vec<String>,
    pub lan_type: String,
    /// Use the sandbox hosts instead of production.
    pub test_mode: bool,
    pub timeout: Duration,
    /// Attach status/body of failed calls to error responses.
    pub expose_details: bool,
}

/// HTTP client for the ERP open API.
pub struct ErpClient {
    client: reqwest::Client,
    config: ErpConfig,
}

impl ErpClient {
    pub fn new(config: ErpConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn warehouses(&self) -> &[String] {
        &self.config.warehouses
    }

    fn host_prefix(&self) -> &'static str {
        if self.config.test_mode {
            "sboapi"
        } else {
            "oapi"
        }
    }

    fn zone_url(&self) -> String {
        format!("https://{}.ecount.com/OAPI/V2/Zone", self.host_prefix())
    }

    fn zone_host(&self, zone: &str) -> String {
        format!("https://{}{}.ecount.com", self.host_prefix(), zone)
    }

    fn failure(&self, message: String, details: serde_json::Value) -> ApiError {
        warn!(%message, %details, "ERP call failed");
        ApiError::ExternalService {
            message,
            details: self.config.expose_details.then_some(details),
        }
    }

    fn request<B: Serialize + ?Sized>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> reqwest::RequestBuilder {
        self.client.post(url).query(query).json(body)
    }

    /// POSTs `body` as JSON. `label` is what gets logged and reported instead of
    /// the URL, whose query may carry a session id.
    async fn post<B, R>(
        &self,
        label: &str,
        url: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .request(url, query, body)
            .send()
            .await
            .map_err(|e| {
                self.failure(
                    format!("ERP {label} request failed"),
                    serde_json::json!({ "call": label, "cause": e.to_string() }),
                )
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(self.failure(
                format!("ERP {label} returned HTTP {}", status.as_u16()),
                serde_json::json!({ "call": label, "status": status.as_u16(), "body": text }),
            ));
        }

        serde_json::from_str(&text).map_err(|e| {
            self.failure(
                format!("ERP {label} response could not be parsed"),
                serde_json::json!({ "call": label, "cause": e.to_string(), "body": text }),
            )
        })
    }

    fn check_status(
        &self,
        label: &str,
        status: &str,
        error: Option<&ErpErrorBody>,
    ) -> Result<(), ApiError> {
        if status == STATUS_OK {
            return Ok(());
        }
        let reason = error
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| "no message".to_string());
        Err(self.failure(
            format!("ERP {label} failed with status {status}: {reason}"),
            serde_json::json!({ "call": label, "status": status, "error_code": error.map(|e| e.code.clone()) }),
        ))
    }

    pub async fn fetch_zone(&self) -> Result<String, ApiError> {
        let request = ZoneRequest {
            com_code: self.config.com_code.clone(),
        };
        let response: ZoneResponse = self.post("zone", &self.zone_url(), &[], &request).await?;
        self.check_status("zone", &response.status, response.error.as_ref())?;

        match response.data {
            Some(data) if !data.zone.is_empty() => Ok(data.zone),
            _ => Err(self.failure(
                "ERP zone response has no zone".to_string(),
                serde_json::json!({ "call": "zone" }),
            )),
        }
    }

    pub async fn login(&self, zone: &str) -> Result<String, ApiError> {
        let request = LoginRequest {
            com_code: self.config.com_code.clone(),
            user_id: self.config.user_id.clone(),
            api_cert_key: self.config.api_key.clone(),
            lan_type: self.config.lan_type.clone(),
            zone: zone.to_string(),
        };
        let url = format!("{}/OAPI/V2/OAPILogin", self.zone_host(zone));
        let response: LoginResponse = self.post("login", &url, &[], &request).await?;
        self.check_status("login", &response.status, response.error.as_ref())?;

        let data = response.data.ok_or_else(|| {
            self.failure(
                "ERP login response has no data".to_string(),
                serde_json::json!({ "call": "login" }),
            )
        })?;
        if data.code != LOGIN_OK {
            return Err(self.failure(
                format!(
                    "ERP login rejected with code {}: {}",
                    data.code,
                    data.message.as_deref().unwrap_or("no message")
                ),
                serde_json::json!({ "call": "login", "code": data.code }),
            ));
        }
        data.datas.map(|d| d.session_id).ok_or_else(|| {
            self.failure(
                "ERP login response has no session".to_string(),
                serde_json::json!({ "call": "login" }),
            )
        })
    }

    pub async fn fetch_balances(
        &self,
        zone: &str,
        session_id: &str,
        base_date: NaiveDate,
    ) -> Result<Vec<BalanceRow>, ApiError> {
        let request = BalanceRequest::new(base_date, &self.config.warehouses);
        let url = format!(
            "{}/OAPI/V2/InventoryBalance/GetListInventoryBalanceStatusByLocation",
            self.zone_host(zone)
        );
        let response: BalanceResponse = self
            .post("balance", &url, &[("SESSION_ID", session_id)], &request)
            .await?;
        self.check_status("balance", &response.status, response.error.as_ref())?;

        match response.data {
            Some(data) if data.is_success => Ok(data.result),
            _ => Err(self.failure(
                "ERP balance query was not successful".to_string(),
                serde_json::json!({ "call": "balance" }),
            )),
        }
    }

    /// Zone lookup, login and balance query for every configured warehouse.
    pub async fn fetch_snapshot(&self, base_date: NaiveDate) -> Result<Vec<BalanceRow>, ApiError> {
        if self.config.com_code.is_empty() || self.config.user_id.is_empty() || self.config.api_key.is_empty() {
            return Err(ApiError::ExternalService {
                message: "ERP credentials are not configured".to_string(),
                details: None,
            });
        }

        let zone = self.fetch_zone().await?;
        let session_id = self.login(&zone).await?;
        let rows = self.fetch_balances(&zone, &session_id, base_date).await?;

        info!(
            zone = %zone,
            warehouses = %self.config.warehouses.join(","),
            rows = rows.len(),
            "Fetched ERP balance snapshot"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(test_mode: bool, expose_details: bool) -> ErpConfig {
        ErpConfig {
            com_code: "12345".into(),
            user_id: "admin".into(),
            api_key: "key".into(),
            warehouses: vec!["106".into(), "3333".into()],
            lan_type: "ko-KR".into(),
            test_mode,
            timeout: Duration::from_secs(5),
            expose_details,
        }
    }

    #[test]
    fn hosts_follow_test_mode() {
        let live = ErpClient::new(config(false, false)).unwrap();
        assert_eq!(live.zone_url(), "https://oapi.ecount.com/OAPI/V2/Zone");
        assert_eq!(live.zone_host("CC"), "https://oapiCC.ecount.com");

        let sandbox = ErpClient::new(config(true, false)).unwrap();
        assert_eq!(sandbox.zone_url(), "https://sboapi.ecount.com/OAPI/V2/Zone");
        assert_eq!(sandbox.zone_host("CC"), "https://sboapiCC.ecount.com");
    }

    #[test]
    fn session_id_is_query_encoded() {
        let client = ErpClient::new(config(false, false)).unwrap();
        let request = client
            .request(
                "https://oapiCC.ecount.com/OAPI/V2/InventoryBalance/GetListInventoryBalanceStatusByLocation",
                &[("SESSION_ID", "a b&c=d")],
                &serde_json::json!({}),
            )
            .build()
            .unwrap();
        assert_eq!(request.url().query(), Some("SESSION_ID=a+b%26c%3Dd"));
        assert_eq!(request.method(), reqwest::Method::POST);
    }

    #[test]
    fn non_ok_status_is_external_error() {
        let client = ErpClient::new(config(false, true)).unwrap();
        let body = ErpErrorBody {
            code: "E01".into(),
            message: Some("invalid key".into()),
        };
        match client.check_status("login", "500", Some(&body)) {
            Err(ApiError::ExternalService { message, details }) => {
                assert!(message.contains("invalid key"));
                assert_eq!(details.unwrap()["error_code"], "E01");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(client.check_status("login", STATUS_OK, None).is_ok());
    }

    #[test]
    fn details_hidden_in_production() {
        let client = ErpClient::new(config(false, false)).unwrap();
        match client.check_status("zone", "404", None) {
            Err(ApiError::ExternalService { details, .. }) => assert!(details.is_none()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_call() {
        let mut cfg = config(false, true);
        cfg.api_key.clear();
        let client = ErpClient::new(cfg).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(matches!(
            client.fetch_snapshot(date).await,
            Err(ApiError::ExternalService { .. })
        ));
    }
}
