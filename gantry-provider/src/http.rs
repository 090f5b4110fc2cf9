//! HTTP provider
//!
//! REST adapter for providers that expose an API instead of a CLI.

use async_trait::async_trait;
use gantry_core::domain::instance::{GpuAvailability, GpuMetrics, GpuPricing, InstanceStatus};
use gantry_core::domain::job::Requirements;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ProvisioningProvider;
use crate::error::{ProviderError, Result};

/// HTTP client for the provider API
#[derive(Debug, Clone)]
pub struct HttpProvider {
    /// Base URL of the provider API (e.g., "https://api.cloudrift.io")
    base_url: String,
    /// Bearer token, sent when non-empty
    api_key: String,
    /// HTTP client instance
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AllocateRequest<'a> {
    gpu_type: &'a str,
    requirements: &'a Requirements,
}

#[derive(Debug, Deserialize)]
struct AllocateResponse {
    id: String,
}

impl HttpProvider {
    /// Create a new provider client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the provider API
    /// * `api_key` - Bearer token, may be empty
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_client(base_url, api_key, Client::new())
    }

    /// Create a new provider client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Get the base URL of the provider
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Map a non-success status to a provider error
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(match status.as_u16() {
            404 => ProviderError::NotFound(error_text),
            429 => ProviderError::Unavailable(format!("rate limited: {}", error_text)),
            code if code >= 500 => {
                ProviderError::Unavailable(format!("status {}: {}", code, error_text))
            }
            code => ProviderError::rejected(i32::from(code), error_text),
        })
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("Failed to parse JSON response: {}", e)))
    }
}

#[async_trait]
impl ProvisioningProvider for HttpProvider {
    async fn allocate(&self, resource_type: &str, requirements: &Requirements) -> Result<String> {
        let response = self
            .request(Method::POST, "/v1/instances")
            .json(&AllocateRequest {
                gpu_type: resource_type,
                requirements,
            })
            .send()
            .await?;

        let allocated: AllocateResponse = Self::handle_response(response).await?;
        info!("Allocated {} instance {}", resource_type, allocated.id);
        Ok(allocated.id)
    }

    async fn status(&self, instance_id: &str) -> Result<InstanceStatus> {
        let path = format!("/v1/instances/{}", instance_id);
        let response = self.request(Method::GET, &path).send().await?;
        Self::handle_response(response).await
    }

    async fn terminate(&self, instance_id: &str) -> Result<()> {
        let path = format!("/v1/instances/{}", instance_id);
        let response = self.request(Method::DELETE, &path).send().await?;
        Self::check_status(response).await?;
        info!("Terminated instance {}", instance_id);
        Ok(())
    }

    async fn list_available(&self) -> Result<Vec<GpuAvailability>> {
        let response = self
            .request(Method::GET, "/v1/gpus/available")
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn pricing(&self) -> Result<Vec<GpuPricing>> {
        let response = self.request(Method::GET, "/v1/pricing").send().await?;
        Self::handle_response(response).await
    }

    async fn metrics(&self, instance_id: &str) -> Result<GpuMetrics> {
        let path = format!("/v1/instances/{}/metrics", instance_id);
        let response = self.request(Method::GET, &path).send().await?;
        Self::handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_provider_trims_trailing_slash() {
        let provider = HttpProvider::new("http://localhost:9000/", "");
        assert_eq!(provider.base_url(), "http://localhost:9000");
    }

    #[tokio::test]
    async fn test_allocate_sends_gpu_type_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/instances"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(json!({"gpuType": "A100", "requirements": {"vram": 40}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "gpu-123"})))
            .mount(&server)
            .await;

        let provider = HttpProvider::new(server.uri(), "secret");
        let mut requirements = Requirements::new();
        requirements.insert("vram".to_string(), json!(40));

        let id = provider.allocate("A100", &requirements).await.unwrap();
        assert_eq!(id, "gpu-123");
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/instances/gpu-1"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = HttpProvider::new(server.uri(), "")
            .status("gpu-1")
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err}");
    }

    #[tokio::test]
    async fn test_client_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/instances"))
            .respond_with(ResponseTemplate::new(400).set_body_string("unknown gpu type"))
            .mount(&server)
            .await;

        let err = HttpProvider::new(server.uri(), "")
            .allocate("Z9000", &Requirements::new())
            .await
            .unwrap_err();
        match err {
            ProviderError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "unknown gpu type");
            }
            other => panic!("expected rejection, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_instance_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/instances/gpu-404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = HttpProvider::new(server.uri(), "")
            .terminate("gpu-404")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transient() {
        // Nothing listens on port 9 on a test machine.
        let err = HttpProvider::new("http://127.0.0.1:9", "")
            .list_available()
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err}");
    }

    #[tokio::test]
    async fn test_list_available() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/gpus/available"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"type": "H100", "available": 1}])),
            )
            .mount(&server)
            .await;

        let gpus = HttpProvider::new(server.uri(), "")
            .list_available()
            .await
            .unwrap();
        assert_eq!(gpus.len(), 1);
        assert_eq!(gpus[0].gpu_type, "H100");
    }
}
