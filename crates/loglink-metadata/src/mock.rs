//! Mock implementations for testing

use async_trait::async_trait;
use loglink_core::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::{HostInfo, MetadataClient, MetadataContainer};

/// A metadata client serving canned records
pub struct MockMetadataClient {
    host: HostInfo,
    containers: Mutex<Vec<MetadataContainer>>,
    version: Mutex<String>,
    /// `(transient, message)` returned by every call when set
    failure: Option<(bool, String)>,
    delay: Option<Duration>,
    call_count: AtomicUsize,
}

impl MockMetadataClient {
    pub fn new(host: HostInfo, containers: Vec<MetadataContainer>) -> Self {
        Self {
            host,
            containers: Mutex::new(containers),
            version: Mutex::new("1".to_string()),
            failure: None,
            delay: None,
            call_count: AtomicUsize::new(0),
        }
    }

    /// A client whose every call fails like `err`
    pub fn failing(err: Error) -> Self {
        let mut client = Self::new(HostInfo::default(), Vec::new());
        client.failure = Some((err.is_transient(), err.to_string()));
        client
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_version(&self, version: &str) {
        *self.version.lock().unwrap() = version.to_string();
    }

    pub fn set_containers(&self, containers: Vec<MetadataContainer>) {
        *self.containers.lock().unwrap() = containers;
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.failure {
            Some((true, msg)) => Err(Error::transient(msg.clone())),
            Some((false, msg)) => Err(Error::protocol(msg.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MetadataClient for MockMetadataClient {
    async fn version(&self) -> Result<String> {
        self.enter().await?;
        Ok(self.version.lock().unwrap().clone())
    }

    async fn self_host(&self) -> Result<HostInfo> {
        self.enter().await?;
        Ok(self.host.clone())
    }

    async fn containers(&self) -> Result<Vec<MetadataContainer>> {
        self.enter().await?;
        Ok(self.containers.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_serves_records() {
        let client = MockMetadataClient::new(HostInfo::default(), vec![MetadataContainer::default()]);
        assert_eq!(client.containers().await.unwrap().len(), 1);
        assert_eq!(client.version().await.unwrap(), "1");
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_failing_keeps_classification() {
        let client = MockMetadataClient::failing(Error::protocol("api mismatch"));
        assert!(client.version().await.unwrap_err().is_fatal());
    }
}
