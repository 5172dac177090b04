use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, Token, TokenProvider};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::dates::StartDate;
use crate::settings::AnalyticsSettings;

pub const METRIC_PAGEVIEWS: &str = "ga:pageviews";
pub const DIMENSION_DATE: &str = "ga:date";
pub const DIMENSION_PAGE_PATH: &str = "ga:pagePath";
const END_DATE: &str = "today";
const MAX_PAGES: usize = 50;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("service account credentials unusable: {0}")]
    Credentials(String),
    #[error("reporting API unavailable: {0}")]
    Unavailable(String),
    #[error("reporting API rejected request ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("unexpected report payload: {0}")]
    Decode(String),
}

// ── Request shapes ──

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGetRequest {
    pub report_requests: Vec<ReportRequest>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub view_id: String,
    pub date_ranges: Vec<DateRange>,
    pub metrics: Vec<Metric>,
    pub dimensions: Vec<Dimension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub expression: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dimension {
    pub name: String,
}

// ── Response shapes ──

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGetResponse {
    #[serde(default)]
    pub reports: Vec<Report>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(default)]
    pub column_header: ColumnHeader,
    #[serde(default)]
    pub data: ReportData,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHeader {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub metric_header: MetricHeader,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricHeader {
    #[serde(default)]
    pub metric_header_entries: Vec<MetricHeaderEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricHeaderEntry {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    #[serde(default)]
    pub rows: Vec<ReportRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportRow {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<DateRangeValues>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateRangeValues {
    #[serde(default)]
    pub values: Vec<String>,
}

/// Pageviews by (date, page path) for one view, from `start` through today.
#[derive(Debug, Clone)]
pub struct ReportQuery {
    pub view_id: String,
    pub start: StartDate,
    pub page_size: Option<u32>,
}

impl ReportQuery {
    pub fn new(view_id: impl Into<String>, start: StartDate) -> Self {
        Self {
            view_id: view_id.into(),
            start,
            page_size: None,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn request(&self, page_token: Option<String>) -> BatchGetRequest {
        BatchGetRequest {
            report_requests: vec![ReportRequest {
                view_id: self.view_id.clone(),
                date_ranges: vec![DateRange {
                    start_date: self.start.to_string(),
                    end_date: END_DATE.to_string(),
                }],
                metrics: vec![Metric {
                    expression: METRIC_PAGEVIEWS.to_string(),
                }],
                dimensions: vec![
                    Dimension {
                        name: DIMENSION_DATE.to_string(),
                    },
                    Dimension {
                        name: DIMENSION_PAGE_PATH.to_string(),
                    },
                ],
                page_size: self.page_size,
                page_token,
            }],
        }
    }
}

/// Anything that can answer a `reports:batchGet` call.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn batch_get(&self, request: &BatchGetRequest) -> Result<BatchGetResponse, ReportError>;
}

/// Run `query`, following `nextPageToken` until the report is complete.
pub async fn fetch_report(
    source: &dyn ReportSource,
    query: &ReportQuery,
) -> Result<BatchGetResponse, ReportError> {
    info!("Fetching report for view {} since {}", query.view_id, query.start);
    let mut response = source.batch_get(&query.request(None)).await?;

    let mut pages = 1;
    loop {
        let Some(token) = response
            .reports
            .first()
            .and_then(|r| r.next_page_token.clone())
        else {
            break;
        };
        if pages >= MAX_PAGES {
            warn!(
                "View {}: stopping after {} pages, report truncated",
                query.view_id, pages
            );
            break;
        }

        let next = source.batch_get(&query.request(Some(token))).await?;
        let Some(more) = next.reports.into_iter().next() else {
            break;
        };
        if let Some(first) = response.reports.first_mut() {
            first.data.rows.extend(more.data.rows);
            first.next_page_token = more.next_page_token;
        }
        pages += 1;
    }

    let rows: usize = response.reports.iter().map(|r| r.data.rows.len()).sum();
    info!("View {}: {} rows in {} page(s)", query.view_id, rows, pages);
    Ok(response)
}

/// Reporting API v4 client authenticated with a service-account key.
pub struct AnalyticsClient {
    http: reqwest::Client,
    credentials: CustomServiceAccount,
    endpoint: String,
    scopes: Vec<String>,
}

impl AnalyticsClient {
    pub fn new(settings: &AnalyticsSettings) -> Result<Self, ReportError> {
        let credentials = CustomServiceAccount::from_file(&settings.key_file).map_err(|e| {
            ReportError::Credentials(format!("{}: {}", settings.key_file.display(), e))
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ReportError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            credentials,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            scopes: settings.scopes.clone(),
        })
    }

    async fn access_token(&self) -> Result<Arc<Token>, ReportError> {
        let scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        self.credentials
            .token(&scopes)
            .await
            .map_err(|e| ReportError::Credentials(e.to_string()))
    }
}

#[async_trait]
impl ReportSource for AnalyticsClient {
    async fn batch_get(&self, request: &BatchGetRequest) -> Result<BatchGetResponse, ReportError> {
        let token = self.access_token().await?;
        let url = format!("{}/v4/reports:batchGet", self.endpoint);

        let start = Instant::now();
        let response = self
            .http
            .post(&url)
            .bearer_auth(token.as_str())
            .json(request)
            .send()
            .await
            .map_err(|e| ReportError::Unavailable(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReportError::Unavailable(e.to_string()))?;

        let result = decode_response(status, &body);
        if let Err(e) = &result {
            warn!("batchGet failed with {} after {:?}: {}", status, start.elapsed(), e);
        }
        result
    }
}

/// Map a batchGet reply onto the report or the matching `ReportError`.
fn decode_response(
    status: reqwest::StatusCode,
    body: &str,
) -> Result<BatchGetResponse, ReportError> {
    if !status.is_success() {
        return Err(ReportError::Api {
            status: status.as_u16(),
            message: api_error_message(body),
        });
    }
    serde_json::from_str(body).map_err(|e| ReportError::Decode(e.to_string()))
}

/// Pull `error.message` out of a Google API error body, else the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serves canned responses in order, recording the requests it saw.
    pub(crate) struct CannedSource {
        responses: Mutex<Vec<Result<BatchGetResponse, ReportError>>>,
        pub seen: Mutex<Vec<serde_json::Value>>,
    }

    impl CannedSource {
        pub(crate) fn new(mut responses: Vec<Result<BatchGetResponse, ReportError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn fixture(name: &str) -> Self {
            Self::new(vec![Ok(load_fixture(name))])
        }
    }

    #[async_trait]
    impl ReportSource for CannedSource {
        async fn batch_get(
            &self,
            request: &BatchGetRequest,
        ) -> Result<BatchGetResponse, ReportError> {
            self.seen
                .lock()
                .unwrap()
                .push(serde_json::to_value(request).unwrap());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ReportError::Unavailable("no more responses".into())))
        }
    }

    pub(crate) fn load_fixture(name: &str) -> BatchGetResponse {
        let json = std::fs::read_to_string(format!("tests/fixtures/{}.json", name)).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn request_body_shape() {
        let query = ReportQuery::new("252616533", StartDate::DaysAgo(7));
        let body = serde_json::to_value(query.request(None)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "reportRequests": [{
                    "viewId": "252616533",
                    "dateRanges": [{"startDate": "7daysAgo", "endDate": "today"}],
                    "metrics": [{"expression": "ga:pageviews"}],
                    "dimensions": [{"name": "ga:date"}, {"name": "ga:pagePath"}]
                }]
            })
        );
    }

    #[test]
    fn request_carries_paging_fields() {
        let query = ReportQuery::new("1", StartDate::Today).with_page_size(500);
        let body = serde_json::to_value(query.request(Some("1000".into()))).unwrap();
        let req = &body["reportRequests"][0];
        assert_eq!(req["pageSize"], 500);
        assert_eq!(req["pageToken"], "1000");
    }

    #[test]
    fn decodes_fixture_report() {
        let response = load_fixture("pageviews");
        assert_eq!(response.reports.len(), 1);
        let report = &response.reports[0];
        assert_eq!(report.column_header.dimensions, vec!["ga:date", "ga:pagePath"]);
        assert_eq!(
            report.column_header.metric_header.metric_header_entries[0].name,
            "ga:pageviews"
        );
        assert!(!report.data.rows.is_empty());
    }

    #[test]
    fn error_message_prefers_api_field() {
        let body = r#"{"error":{"code":403,"message":"User does not have sufficient permissions for this profile.","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(
            api_error_message(body),
            "User does not have sufficient permissions for this profile."
        );
        assert_eq!(api_error_message("  bad gateway \n"), "bad gateway");
    }

    #[test]
    fn rejected_reply_keeps_status_and_message() {
        let body = r#"{"error":{"code":403,"message":"User does not have sufficient permissions for this profile.","status":"PERMISSION_DENIED"}}"#;
        match decode_response(reqwest::StatusCode::FORBIDDEN, body) {
            Err(ReportError::Api { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(
                    message,
                    "User does not have sufficient permissions for this profile."
                );
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn malformed_success_body_is_decode_error() {
        let err = decode_response(reqwest::StatusCode::OK, "<html>oops</html>").unwrap_err();
        assert!(matches!(err, ReportError::Decode(_)));
        let err = decode_response(reqwest::StatusCode::OK, r#"{"reports": 3}"#).unwrap_err();
        assert!(matches!(err, ReportError::Decode(_)));
    }

    #[test]
    fn success_body_decodes() {
        let body = std::fs::read_to_string("tests/fixtures/two_rows.json").unwrap();
        let response = decode_response(reqwest::StatusCode::OK, &body).unwrap();
        assert_eq!(response.reports[0].data.rows.len(), 2);
    }

    #[tokio::test]
    async fn fetch_follows_page_tokens() {
        let source = CannedSource::new(vec![
            Ok(load_fixture("paged_first")),
            Ok(load_fixture("paged_second")),
        ]);
        let query = ReportQuery::new("277875383", StartDate::DaysAgo(30));
        let response = fetch_report(&source, &query).await.unwrap();

        assert_eq!(response.reports[0].data.rows.len(), 3);
        assert!(response.reports[0].next_page_token.is_none());

        let seen = source.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0]["reportRequests"][0].get("pageToken").is_none());
        assert_eq!(seen[1]["reportRequests"][0]["pageToken"], "2");
    }

    #[tokio::test]
    async fn fetch_propagates_upstream_failure() {
        let source = CannedSource::new(vec![Err(ReportError::Api {
            status: 400,
            message: "Invalid value 'viewId'".into(),
        })]);
        let query = ReportQuery::new("nope", StartDate::DaysAgo(7));
        let err = fetch_report(&source, &query).await.unwrap_err();
        assert!(matches!(err, ReportError::Api { status: 400, .. }));
    }
}
