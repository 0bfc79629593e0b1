//! Mock platform implementation for testing
//!
//! This module provides a configurable mock platform that can simulate
//! successes, failures and delays. It's designed for use in integration tests
//! to verify dispatch logic without requiring platform credentials or network
//! access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::Platform;

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name (e.g., "twitter", "mock-facebook")
    pub name: String,

    /// Whether publishing should succeed
    pub publish_succeeds: bool,

    /// Error to return on publishing failure
    pub publish_error: Option<PlatformError>,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Whether the platform is configured
    pub is_configured: bool,

    /// Posts that have been made (caption, image URL)
    pub published: Arc<Mutex<Vec<(String, Option<String>)>>>,

    /// Number of times publish has been called
    pub publish_call_count: Arc<Mutex<usize>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            publish_succeeds: true,
            publish_error: None,
            delay: Duration::from_millis(0),
            is_configured: true,
            published: Arc::new(Mutex::new(Vec::new())),
            publish_call_count: Arc::new(Mutex::new(0)),
        }
    }
}

/// Mock platform for testing
///
/// Clones share their call records.
#[derive(Clone)]
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock platform that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock platform that fails publishing
    pub fn failure(name: &str, error: PlatformError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            publish_succeeds: false,
            publish_error: Some(error),
            ..Default::default()
        })
    }

    /// Create a mock platform with a delay
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// Create a mock platform that is not configured
    ///
    /// Publishing fails with an authentication error, like a real adapter
    /// missing its credentials.
    pub fn not_configured(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            is_configured: false,
            ..Default::default()
        })
    }

    pub fn publish_call_count(&self) -> usize {
        *self.config.publish_call_count.lock().unwrap()
    }

    /// Everything that was published, in order
    pub fn published(&self) -> Vec<(String, Option<String>)> {
        self.config.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured
    }

    async fn publish(&self, caption: &str, image_url: Option<&str>) -> Result<String> {
        *self.config.publish_call_count.lock().unwrap() += 1;

        if !self.config.is_configured {
            return Err(PlatformError::Authentication(format!(
                "{} credentials are not configured",
                self.config.name
            ))
            .into());
        }

        // Simulate delay
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if self.config.publish_succeeds {
            self.config
                .published
                .lock()
                .unwrap()
                .push((caption.to_string(), image_url.map(str::to_string)));

            let post_id = format!("{}:mock-{}", self.config.name, uuid::Uuid::new_v4());
            Ok(post_id)
        } else {
            let error = self
                .config
                .publish_error
                .clone()
                .unwrap_or_else(|| PlatformError::Posting("Mock publishing failed".to_string()));
            Err(error.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_success() {
        let platform = MockPlatform::success("test");

        assert!(platform.is_configured());
        assert_eq!(platform.name(), "test");

        let post_id = platform.publish("Test content", Some("https://img/x.png")).await.unwrap();
        assert!(post_id.starts_with("test:mock-"));
        assert_eq!(platform.publish_call_count(), 1);

        let published = platform.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "Test content");
        assert_eq!(published[0].1.as_deref(), Some("https://img/x.png"));
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let platform = MockPlatform::failure("test", PlatformError::Network("timeout".to_string()));

        let err = platform.publish("Test content", None).await.unwrap_err();
        assert!(err.to_string().contains("timeout"));
        assert_eq!(platform.publish_call_count(), 1);
        assert!(platform.published().is_empty());
    }

    #[tokio::test]
    async fn test_mock_with_delay() {
        let platform = MockPlatform::with_delay("test", Duration::from_millis(50));

        let start = std::time::Instant::now();
        platform.publish("Test", None).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_mock_not_configured() {
        let platform = MockPlatform::not_configured("test");

        assert!(!platform.is_configured());
        let err = platform.publish("Test", None).await.unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let platform = MockPlatform::success("test");
        let handle = platform.clone();

        platform.publish("one", None).await.unwrap();
        assert_eq!(handle.publish_call_count(), 1);
    }
}
