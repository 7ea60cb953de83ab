//! Google Sheets v4 values API client

use super::{AppendOutcome, SpreadsheetApi};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const SERVICE: &str = "spreadsheet";
const USER_AGENT: &str = concat!("canvass-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Spreadsheet API client authenticated with a bearer token
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: Url,
    access_token: String,
}

impl SheetsClient {
    pub fn new(base_url: &str, access_token: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SyncError::Config(format!("Invalid spreadsheet base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Config(format!("Invalid spreadsheet base URL '{}'", base_url)));
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            access_token: access_token.into(),
        })
    }

    /// `{base}/v4/spreadsheets/{id}/values/{range}` with each segment percent-encoded
    fn values_url(&self, spreadsheet_id: &str, range: &str) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base() was rejected in new(), so this is always Ok
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v4", "spreadsheets", spreadsheet_id, "values", range]);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> SyncResult<Response> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| SyncError::Transport {
                service: SERVICE,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Api {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> SyncResult<T> {
        response.json().await.map_err(|e| SyncError::Decode {
            service: SERVICE,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl SpreadsheetApi for SheetsClient {
    async fn append_row(
        &self,
        spreadsheet_id: &str,
        range: &str,
        row: Vec<String>,
    ) -> SyncResult<AppendOutcome> {
        let url = self.values_url(spreadsheet_id, &format!("{}:append", range));
        tracing::debug!(spreadsheet_id, range, "Appending spreadsheet row");

        let request = self
            .http
            .post(url)
            .query(&[("valueInputOption", "USER_ENTERED"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": [row] }));

        let response: AppendResponse = Self::decode(self.send(request).await?).await?;

        Ok(AppendOutcome {
            updated_range: response.updates.and_then(|u| u.updated_range),
        })
    }

    async fn read_column(&self, spreadsheet_id: &str, range: &str) -> SyncResult<Vec<String>> {
        let url = self.values_url(spreadsheet_id, range);
        tracing::debug!(spreadsheet_id, range, "Reading spreadsheet column");

        let request = self.http.get(url).query(&[("majorDimension", "ROWS")]);
        let response: ValueRange = Self::decode(self.send(request).await?).await?;

        Ok(response
            .values
            .into_iter()
            .map(|row| match row.into_iter().next() {
                Some(Value::String(s)) => s,
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            })
            .collect())
    }

    async fn update_row(
        &self,
        spreadsheet_id: &str,
        range: &str,
        row: Vec<String>,
    ) -> SyncResult<()> {
        let url = self.values_url(spreadsheet_id, range);
        tracing::debug!(spreadsheet_id, range, "Updating spreadsheet row");

        let request = self
            .http
            .put(url)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": [row] }));

        self.send(request).await?;
        Ok(())
    }
}
