//! API client for communicating with the remediation agent

use anyhow::{Context, Result};
use guard_lib::remediation::HandlerResponse;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

/// API client for the remediation agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    ///
    /// Health probes answer 503 with a JSON body, so any status whose body
    /// parses as `T` is accepted.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response")?;
        serde_json::from_str(&body).with_context(|| format!("API error ({}): {}", status, body))
    }

    /// POST an event and return the `{statusCode, body}` envelope
    ///
    /// Error statuses still carry an envelope; only transport failures and
    /// bodies that are not an envelope are errors.
    pub async fn post_event<B: Serialize>(&self, path: &str, event: &B) -> Result<HandlerResponse> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(event)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response")?;
        serde_json::from_str(&body).with_context(|| format!("API error ({}): {}", status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_lib::health::{ComponentStatus, HealthResponse};
    use serde_json::json;

    #[tokio::test]
    async fn test_post_event_keeps_error_envelope() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/alarms")
            .match_body(mockito::Matcher::Json(json!({"InstanceId": "i-1"})))
            .with_status(500)
            .with_header("content-type", "application/json")
            .with_body(r#"{"statusCode": 500, "body": "backend unavailable"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response = client
            .post_event("v1/alarms", &json!({"InstanceId": "i-1"}))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status_code, 500);
        assert_eq!(response.body, "backend unavailable");
    }

    #[tokio::test]
    async fn test_post_event_rejects_non_envelope() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/reboot")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .post_event("v1/reboot", &json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_get_degraded_health() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(200)
            .with_body(
                json!({
                    "status": "degraded",
                    "components": {
                        "inference": {
                            "status": "degraded",
                            "message": "Models not loaded: anomaly",
                            "last_check_timestamp": 1700000000
                        }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let health: HealthResponse = client.get("healthz").await.unwrap();
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(health.components.len(), 1);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
