//! Wire types for the ERP open API (zone lookup, login, balance by location).

use serde::{Deserialize, Deserializer, Serialize};

/// Separator the balance query expects between warehouse codes.
pub const WAREHOUSE_DELIMITER: &str = "∬";

pub const STATUS_OK: &str = "200";
pub const LOGIN_OK: &str = "00";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ZoneRequest {
    pub com_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneResponse {
    #[serde(rename = "Status", deserialize_with = "text", default)]
    pub status: String,
    #[serde(rename = "Data")]
    pub data: Option<ZoneData>,
    #[serde(rename = "Error")]
    pub error: Option<ErpErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneData {
    #[serde(rename = "ZONE")]
    pub zone: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LoginRequest {
    pub com_code: String,
    pub user_id: String,
    pub api_cert_key: String,
    pub lan_type: String,
    pub zone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "Status", deserialize_with = "text", default)]
    pub status: String,
    #[serde(rename = "Data")]
    pub data: Option<LoginData>,
    #[serde(rename = "Error")]
    pub error: Option<ErpErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    #[serde(rename = "Code", deserialize_with = "text", default)]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
    #[serde(rename = "Datas")]
    pub datas: Option<LoginSession>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginSession {
    #[serde(rename = "SESSION_ID")]
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BalanceRequest {
    /// YYYYMMDD
    pub base_date: String,
    pub wh_cd: String,
}

impl BalanceRequest {
    pub fn new(base_date: chrono::NaiveDate, warehouses: &[String]) -> Self {
        Self {
            base_date: base_date.format("%Y%m%d").to_string(),
            wh_cd: warehouses.join(WAREHOUSE_DELIMITER),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    #[serde(rename = "Status", deserialize_with = "text", default)]
    pub status: String,
    #[serde(rename = "Data")]
    pub data: Option<BalanceData>,
    #[serde(rename = "Error")]
    pub error: Option<ErpErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceData {
    #[serde(rename = "IsSuccess", default = "default_true")]
    pub is_success: bool,
    #[serde(rename = "Result", default)]
    pub result: Vec<BalanceRow>,
}

/// One product's balance in one warehouse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceRow {
    #[serde(rename = "PROD_CD", deserialize_with = "text", default)]
    pub product_code: String,
    #[serde(rename = "PROD_DES", deserialize_with = "text", default)]
    pub product_name: String,
    #[serde(rename = "PROD_SIZE_DES", deserialize_with = "text", default)]
    pub size_description: String,
    #[serde(rename = "WH_CD", deserialize_with = "text", default)]
    pub warehouse_code: String,
    #[serde(rename = "BAL_QTY", deserialize_with = "text", default)]
    pub quantity: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErpErrorBody {
    #[serde(rename = "Code", deserialize_with = "text", default)]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
}

fn default_true() -> bool {
    true
}

/// The API mixes strings, numbers and nulls for the same field.
fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_response_accepts_mixed_field_types() {
        let body = r#"{
            "Status": 200,
            "Data": {
                "IsSuccess": true,
                "Result": [
                    {"PROD_CD": "TS100-XL", "PROD_DES": "Tee", "PROD_SIZE_DES": "Tee [XL]", "WH_CD": "106", "BAL_QTY": "5"},
                    {"PROD_CD": "TS100-XL", "WH_CD": 3333, "BAL_QTY": 3.0, "PROD_SIZE_DES": null}
                ]
            }
        }"#;
        let parsed: BalanceResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.status, STATUS_OK);
        let rows = parsed.data.unwrap().result;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].warehouse_code, "3333");
        assert_eq!(rows[1].quantity, "3.0");
        assert_eq!(rows[1].size_description, "");
        assert_eq!(rows[1].product_name, "");
    }

    #[test]
    fn login_response_exposes_session() {
        let body = r#"{"Status":"200","Data":{"Code":"00","Datas":{"SESSION_ID":"abc"}}}"#;
        let parsed: LoginResponse = serde_json::from_str(body).unwrap();
        let data = parsed.data.unwrap();
        assert_eq!(data.code, LOGIN_OK);
        assert_eq!(data.datas.unwrap().session_id, "abc");
    }

    #[test]
    fn balance_request_joins_warehouses() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let request = BalanceRequest::new(date, &["106".to_string(), "3333".to_string()]);
        assert_eq!(request.base_date, "20240309");
        assert_eq!(request.wh_cd, "106∬3333");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["BASE_DATE"], "20240309");
        assert_eq!(json["WH_CD"], "106∬3333");
    }
}
