//! HTTP client for the twin server's REST API

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use twin_lib::{Alert, HostTwinState, MetricsBatch, TwinState};
use url::Url;

/// Non-2xx answer from the server
#[derive(Debug, Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Vec<String>,
}

/// Error body the server attaches to every failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub details: Vec<String>,
}

/// Acknowledgement for an accepted batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAck {
    pub accepted: usize,
    pub dropped: usize,
    pub received_at: String,
}

/// API client for the twin server
pub struct TwinClient {
    client: Client,
    base_url: Url,
}

impl TwinClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request, with an optional JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: Url,
        body: Option<&B>,
    ) -> Result<T> {
        let mut request = self.client.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(parsed) => ApiError {
                    status,
                    message: parsed.error,
                    details: parsed.details,
                },
                Err(_) => ApiError {
                    status,
                    message: body,
                    details: Vec::new(),
                },
            };
            return Err(error.into());
        }

        response.json().await.context("Failed to parse response")
    }

    /// Resolve an API path against the base URL, one segment per element
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn state(&self) -> Result<TwinState> {
        self.get(self.endpoint(&["api", "twin", "state"])?).await
    }

    pub async fn host(&self, hostname: &str) -> Result<HostTwinState> {
        self.get(self.endpoint(&["api", "twin", "hosts", hostname])?)
            .await
    }

    pub async fn active_alerts(&self) -> Result<Vec<Alert>> {
        self.get(self.endpoint(&["api", "alerts", "active"])?).await
    }

    pub async fn resolve_alert(&self, id: &str) -> Result<Alert> {
        self.post::<_, ()>(self.endpoint(&["api", "alerts", id, "resolve"])?, None)
            .await
    }

    pub async fn push_batch(&self, batch: &MetricsBatch) -> Result<BatchAck> {
        self.post(self.endpoint(&["api", "metrics", "batch"])?, Some(batch))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn host_json(hostname: &str, ip: &str, status: &str) -> serde_json::Value {
        json!({
            "hostname": hostname,
            "displayName": format!("REFLECTOR-{}", hostname.to_uppercase()),
            "label": hostname,
            "ip": ip,
            "status": status,
            "lastSeen": "2026-01-01T00:00:00.000Z",
            "agentVersion": "0.1.0",
            "platform": "Linux-x86_64",
            "metrics": {
                "cpuLoad": 42.5,
                "memoryUsedPercent": 63.2,
                "loadAverage": 1.5,
                "uptimeSeconds": 7200.0,
                "netThroughputGbps": 0.1
            },
            "position": { "x": 0.0, "y": 0.0, "z": 0.0 }
        })
    }

    #[test]
    fn test_endpoint_keeps_base_path_and_encodes_segments() {
        let client = TwinClient::new("http://twin.local:3000/prefix/").unwrap();
        let url = client.endpoint(&["api", "twin", "hosts", "rack a/01"]).unwrap();

        assert_eq!(
            url.as_str(),
            "http://twin.local:3000/prefix/api/twin/hosts/rack%20a%2F01"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(TwinClient::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_fetch_state() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "type": "twin-state",
            "twinId": "twin-abc",
            "generatedAt": "2026-01-01T00:00:00.000Z",
            "hosts": [
                host_json("ego-hub", "10.0.0.100", "online"),
                host_json("titan-01", "10.0.0.10", "stale")
            ],
            "links": [{
                "id": "ego-hub::titan-01",
                "source": "ego-hub",
                "target": "titan-01",
                "throughputGbps": 0.1,
                "utilization": 0.01,
                "capacityGbps": 10.0
            }]
        });
        let mock = server
            .mock("GET", "/api/twin/state")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = TwinClient::new(&server.url()).unwrap();
        let state = client.state().await.unwrap();

        mock.assert_async().await;
        assert_eq!(state.twin_id, "twin-abc");
        assert_eq!(state.hosts.len(), 2);
        assert_eq!(state.links[0].capacity_gbps, Some(10.0));
        assert_eq!(state.host("titan-01").unwrap().ip, "10.0.0.10");
    }

    #[tokio::test]
    async fn test_server_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/twin/hosts/missing")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(json!({ "error": "host missing not found", "details": [] }).to_string())
            .create_async()
            .await;

        let client = TwinClient::new(&server.url()).unwrap();
        let err = client.host("missing").await.unwrap_err();

        mock.assert_async().await;
        let api_error = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert_eq!(api_error.message, "host missing not found");
    }

    #[tokio::test]
    async fn test_plain_text_error_is_kept_verbatim() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/alerts/active")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = TwinClient::new(&server.url()).unwrap();
        let err = client.active_alerts().await.unwrap_err();

        let api_error = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api_error.status, StatusCode::BAD_GATEWAY);
        assert_eq!(api_error.message, "bad gateway");
    }

    #[tokio::test]
    async fn test_push_batch_posts_samples() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/metrics/batch")
            .match_body(Matcher::PartialJson(json!({
                "samples": [{ "hostname": "titan-01" }]
            })))
            .with_status(202)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "accepted": 1, "dropped": 0, "receivedAt": "2026-01-01T00:00:00.000Z" })
                    .to_string(),
            )
            .create_async()
            .await;

        let batch: MetricsBatch = serde_json::from_value(json!({
            "samples": [{
                "hostname": "titan-01",
                "timestamp": "2026-01-01T00:00:00Z",
                "cpu_load": 10.0,
                "memory_used_percent": 20.0,
                "load_average": 0.5,
                "uptime_seconds": 60
            }]
        }))
        .unwrap();

        let client = TwinClient::new(&server.url()).unwrap();
        let ack = client.push_batch(&batch).await.unwrap();

        mock.assert_async().await;
        assert_eq!(ack.accepted, 1);
        assert_eq!(ack.dropped, 0);
    }

    #[tokio::test]
    async fn test_resolve_alert() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/alerts/alert-1/resolve")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "alert-1",
                    "hostname": "titan-01",
                    "metric": "cpu_load_high",
                    "severity": "warning",
                    "message": "CPU load 95.0%",
                    "threshold": 80.0,
                    "currentValue": 95.0,
                    "status": "resolved",
                    "createdAt": "2026-01-01T00:00:00.000Z",
                    "updatedAt": "2026-01-01T00:01:00.000Z",
                    "resolvedAt": "2026-01-01T00:01:00.000Z"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = TwinClient::new(&server.url()).unwrap();
        let alert = client.resolve_alert("alert-1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(alert.status, twin_lib::AlertStatus::Resolved);
        assert_eq!(alert.resolved_at.as_deref(), Some("2026-01-01T00:01:00.000Z"));
    }
}
