//! Report fixtures and mock reporting API responders

use epi_sync::catalog::REPORT_TYPES;
use serde_json::{Map, Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock reporting API listens on
pub const API_PATH: &str = "/api/report_data";

/// Facility code used for a province's rows
pub fn facility_for(province: &str) -> String {
    format!("{province}001")
}

/// Area code used for a province's rows
pub fn area_for(province: &str) -> String {
    format!("{province}010100")
}

/// Target value of report type `k` (index into the catalog) for month `m`
pub fn target_value(k: usize, month: usize) -> i64 {
    (100 * (k + 1) + month) as i64
}

/// Result value of report type `k` for month `m`
pub fn result_value(k: usize, month: usize) -> i64 {
    (10 * (k + 1) + month) as i64
}

/// One wide row as the API returns it: strings for codes and year, numbers for counts
pub fn wide_row(province: &str, b_year: u32, k: usize) -> Value {
    let (id, _) = REPORT_TYPES[k];
    let mut row = Map::new();
    row.insert("id".into(), json!(id));
    row.insert("hospcode".into(), json!(facility_for(province)));
    row.insert("areacode".into(), json!(area_for(province)));
    row.insert("b_year".into(), json!(b_year.to_string()));
    for month in 1..=12 {
        row.insert(format!("target{month:02}"), json!(target_value(k, month)));
        row.insert(format!("result{month:02}"), json!(result_value(k, month)));
    }
    Value::Object(row)
}

/// All five report types for one province
pub fn province_rows(province: &str, b_year: u32) -> Vec<Value> {
    (0..REPORT_TYPES.len())
        .map(|k| wide_row(province, b_year, k))
        .collect()
}

/// Answer requests for `province` with `rows`
pub async fn mount_province(server: &MockServer, province: &str, rows: Vec<Value>) {
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({ "province": province })))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(rows)))
        .mount(server)
        .await;
}

/// Answer requests for `province` with an error status
pub async fn mount_province_status(server: &MockServer, province: &str, status: u16) {
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({ "province": province })))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Answer every otherwise unmatched request with `status` and an empty array
pub async fn mount_fallback(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!([])))
        .with_priority(10)
        .mount(server)
        .await;
}
