//! Coverage service HTTP client

use super::{CoverageApi, CoverageStatus, RegistrationPayload};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const SERVICE: &str = "coverage";
const USER_AGENT: &str = concat!("canvass-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    data: CoverageStatus,
}

/// Coverage API client, authenticated with a static API key header
pub struct CoverageClient {
    http: reqwest::Client,
    base_url: Url,
    key_header: HeaderName,
    api_key: HeaderValue,
}

impl CoverageClient {
    pub fn new(base_url: &str, key_header: &str, api_key: &str, timeout: Duration) -> SyncResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SyncError::Config(format!("Invalid coverage base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Config(format!("Invalid coverage base URL '{}'", base_url)));
        }

        let key_header = HeaderName::from_bytes(key_header.as_bytes())
            .map_err(|e| SyncError::Config(format!("Invalid API key header '{}': {}", key_header, e)))?;
        let mut api_key = HeaderValue::from_str(api_key)
            .map_err(|e| SyncError::Config(format!("Invalid coverage API key: {}", e)))?;
        api_key.set_sensitive(true);

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            key_header,
            api_key,
        })
    }

    fn endpoint(&self, correlation_id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["api", "check-coverage"]);
            if let Some(id) = correlation_id {
                segments.push(id);
            }
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> SyncResult<Response> {
        request
            .header(self.key_header.clone(), self.api_key.clone())
            .send()
            .await
            .map_err(|e| SyncError::Transport {
                service: SERVICE,
                message: e.to_string(),
            })
    }

    async fn api_error(response: Response) -> SyncError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        SyncError::Api {
            service: SERVICE,
            status,
            body,
        }
    }

    fn decode_error(message: impl Into<String>) -> SyncError {
        SyncError::Decode {
            service: SERVICE,
            message: message.into(),
        }
    }
}

/// Correlation id from `data[0].id`, numeric or string
fn correlation_id(response: RegisterResponse) -> SyncResult<String> {
    let first = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| CoverageClient::decode_error("registration response has no data"))?;

    match first.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(CoverageClient::decode_error("registration response has no id")),
    }
}

#[async_trait]
impl CoverageApi for CoverageClient {
    async fn register(&self, payload: &RegistrationPayload) -> SyncResult<String> {
        tracing::debug!(submission_id = %payload.reference_id, "Registering coverage check");

        let response = self
            .send(self.http.post(self.endpoint(None)).json(payload))
            .await?;

        // Only 200 and 201 count as accepted
        if !matches!(response.status(), StatusCode::OK | StatusCode::CREATED) {
            return Err(Self::api_error(response).await);
        }

        let body: RegisterResponse = response
            .json()
            .await
            .map_err(|e| Self::decode_error(e.to_string()))?;
        correlation_id(body)
    }

    async fn status(&self, correlation_id: &str) -> SyncResult<CoverageStatus> {
        tracing::debug!(correlation_id, "Querying coverage status");

        let response = self
            .send(self.http.get(self.endpoint(Some(correlation_id))))
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| Self::decode_error(e.to_string()))?;
        Ok(body.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    #[derive(Clone, Default)]
    struct Seen {
        keys: Arc<Mutex<Vec<Option<String>>>>,
        bodies: Arc<Mutex<Vec<Value>>>,
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base: &str) -> CoverageClient {
        CoverageClient::new(base, "x-api-key", "secret", Duration::from_secs(5)).unwrap()
    }

    fn payload() -> RegistrationPayload {
        RegistrationPayload {
            reference_id: Uuid::new_v4(),
            customer_name: "Budi".to_string(),
            address: "Jl. Merdeka".to_string(),
            house_number: "12A".to_string(),
            building_type: "House".to_string(),
            salesperson: "Dewi".to_string(),
            remarks: String::new(),
            postal_code: "12345".to_string(),
            village: "VillageX".to_string(),
            subdistrict: "DistrictY".to_string(),
            city: "CityZ".to_string(),
            province: "ProvinceW".to_string(),
            latitude: "1.0".to_string(),
            longitude: "2.0".to_string(),
            photos: vec![],
        }
    }

    async fn register_handler(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (axum::http::StatusCode, Json<Value>) {
        seen.keys.lock().unwrap().push(
            headers
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
        seen.bodies.lock().unwrap().push(body);
        (
            axum::http::StatusCode::CREATED,
            Json(json!({ "data": [{ "id": 981, "status": "queued" }] })),
        )
    }

    #[tokio::test]
    async fn test_register_returns_numeric_id_as_text() {
        let seen = Seen::default();
        let app = Router::new()
            .route("/api/check-coverage", post(register_handler))
            .with_state(seen.clone());
        let base = serve(app).await;

        let id = client(&base).register(&payload()).await.unwrap();
        assert_eq!(id, "981");
        assert_eq!(seen.keys.lock().unwrap()[0].as_deref(), Some("secret"));
        assert_eq!(seen.bodies.lock().unwrap()[0]["subdistrict"], "DistrictY");
    }

    #[tokio::test]
    async fn test_register_rejects_other_success_codes() {
        let app = Router::new().route(
            "/api/check-coverage",
            post(|| async { (axum::http::StatusCode::ACCEPTED, Json(json!({ "data": [{ "id": "x" }] }))) }),
        );
        let base = serve(app).await;

        let err = client(&base).register(&payload()).await.unwrap_err();
        assert!(matches!(err, SyncError::Api { status: 202, .. }));
    }

    #[tokio::test]
    async fn test_register_without_id_is_decode_error() {
        let app = Router::new().route(
            "/api/check-coverage",
            post(|| async { Json(json!({ "data": [] })) }),
        );
        let base = serve(app).await;

        let err = client(&base).register(&payload()).await.unwrap_err();
        assert!(matches!(err, SyncError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_status_parses_envelope() {
        let app = Router::new().route(
            "/api/check-coverage/:id",
            get(|Path(id): Path<String>| async move {
                Json(json!({
                    "data": {
                        "id": id,
                        "is_covered": "1",
                        "homepassed_id": "HP1",
                        "operator_remarks": null
                    }
                }))
            }),
        );
        let base = serve(app).await;

        let status = client(&base).status("bot-7").await.unwrap();
        assert_eq!(status.is_covered, Some(true));
        assert_eq!(status.homepassed_id.as_deref(), Some("HP1"));
        assert_eq!(status.operator_remarks, None);
        assert!(status.is_terminal());
    }

    #[tokio::test]
    async fn test_status_error_status() {
        let app = Router::new().route(
            "/api/check-coverage/:id",
            get(|| async { (axum::http::StatusCode::NOT_FOUND, "unknown id") }),
        );
        let base = serve(app).await;

        let err = client(&base).status("missing").await.unwrap_err();
        assert!(matches!(err, SyncError::Api { status: 404, .. }));
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        assert!(matches!(
            CoverageClient::new("http://localhost", "bad header", "k", Duration::from_secs(1)),
            Err(SyncError::Config(_))
        ));
    }
}
