//! HTTP client for the Rancher metadata API

use async_trait::async_trait;
use loglink_core::{Error, Result};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::{HostInfo, MetadataClient, MetadataContainer};

/// Metadata client speaking `http://{address}/2016-07-29`
pub struct RancherClient {
    client: reqwest::Client,
    base_url: String,
}

impl RancherClient {
    /// Create a client for a versioned base URL, e.g. from `Settings::metadata_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build metadata client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .map_err(|e| classify_request_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(&url, status));
        }

        response
            .text()
            .await
            .map_err(|e| Error::transient(format!("Reading body of {} failed: {}", url, e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.get_text(path).await?;
        serde_json::from_str(&body).map_err(|e| {
            Error::protocol(format!(
                "Unexpected response from {}{}: {}",
                self.base_url, path, e
            ))
        })
    }
}

/// Network-level failures are always worth retrying
fn classify_request_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::transient(format!("Request to {} timed out", url))
    } else {
        Error::transient(format!("Request to {} failed: {}", url, err))
    }
}

/// Server-side trouble is transient; a missing or rejected path means the
/// service does not speak our API version.
fn classify_status(url: &str, status: StatusCode) -> Error {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Error::transient(format!("{} returned {}", url, status))
    } else {
        Error::protocol(format!("{} returned {}", url, status))
    }
}

#[async_trait]
impl MetadataClient for RancherClient {
    async fn version(&self) -> Result<String> {
        let body = self.get_text("/version").await?;
        let trimmed = body.trim();
        // Served as a JSON string when asked for JSON, plain text otherwise
        Ok(serde_json::from_str::<String>(trimmed).unwrap_or_else(|_| trimmed.to_string()))
    }

    async fn self_host(&self) -> Result<HostInfo> {
        self.get_json("/self/host").await
    }

    async fn containers(&self) -> Result<Vec<MetadataContainer>> {
        self.get_json("/containers").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::get, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/2016-07-29", addr)
    }

    fn metadata_app() -> Router {
        Router::new()
            .route("/2016-07-29/version", get(|| async { "\"17\"" }))
            .route(
                "/2016-07-29/self/host",
                get(|| async { r#"{"uuid":"host-1","name":"node1","hostname":"node1.local"}"# }),
            )
            .route(
                "/2016-07-29/containers",
                get(|| async {
                    r#"[
                        {"name":"web","uuid":"u1","external_id":"abc","state":"running","host_uuid":"host-1","labels":{"io.rancher.stack.name":"shop"}},
                        {"name":"db","uuid":"u2","external_id":"def","state":"stopped","host_uuid":"host-2"}
                    ]"#
                }),
            )
    }

    #[tokio::test]
    async fn test_fetch_version_host_and_containers() {
        let base = serve(metadata_app()).await;
        let client = RancherClient::new(base, Duration::from_secs(5)).unwrap();

        assert_eq!(client.version().await.unwrap(), "17");

        let host = client.self_host().await.unwrap();
        assert_eq!(host.uuid, "host-1");
        assert_eq!(host.hostname, "node1.local");

        let containers = client.containers().await.unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].external_id, "abc");
        assert_eq!(containers[0].state, "running");
        assert_eq!(containers[0].labels.get("io.rancher.stack.name").unwrap(), "shop");
        assert_eq!(containers[1].host_uuid, "host-2");
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let app = Router::new().route(
            "/2016-07-29/containers",
            get(|| async { (AxumStatus::SERVICE_UNAVAILABLE, "busy") }),
        );
        let base = serve(app).await;
        let client = RancherClient::new(base, Duration::from_secs(5)).unwrap();

        let err = client.containers().await.unwrap_err();
        assert!(err.is_transient(), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_missing_api_version_is_fatal() {
        let base = serve(Router::new()).await;
        let client = RancherClient::new(base, Duration::from_secs(5)).unwrap();

        let err = client.self_host().await.unwrap_err();
        assert!(err.is_fatal(), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_garbage_body_is_fatal() {
        let app = Router::new().route("/2016-07-29/containers", get(|| async { "<html>" }));
        let base = serve(app).await;
        let client = RancherClient::new(base, Duration::from_secs(5)).unwrap();

        let err = client.containers().await.unwrap_err();
        assert!(matches!(err, Error::FatalProtocol(_)));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transient() {
        // Bind and drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RancherClient::new(
            format!("http://{}/2016-07-29", addr),
            Duration::from_secs(2),
        )
        .unwrap();

        let err = client.version().await.unwrap_err();
        assert!(err.is_transient(), "got {:?}", err);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = RancherClient::new("http://meta/2016-07-29/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://meta/2016-07-29");
    }
}
