//! Mock generation backends for testing
//!
//! Configurable text and image backends that can simulate successes,
//! generic failures, rate limits and latency without network access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::BackendError;
use crate::generation::{AttachmentPart, ImageBackend, TextBackend};

/// One recorded invocation of a [`MockTextBackend`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_instruction: Option<String>,
    pub prompt: String,
    pub attachments: Vec<AttachmentPart>,
}

/// Configuration for mock backend behavior
#[derive(Debug, Clone)]
pub struct MockBackendConfig {
    pub name: String,

    /// `Ok` text to return, or the error to fail with
    pub response: std::result::Result<String, BackendError>,

    /// Delay before completing (simulates network latency)
    pub delay: Duration,

    pub calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl Default for MockBackendConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            response: Ok("Mock caption #mock".to_string()),
            delay: Duration::from_millis(0),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock text backend
pub struct MockTextBackend {
    config: MockBackendConfig,
}

impl MockTextBackend {
    pub fn new(config: MockBackendConfig) -> Self {
        Self { config }
    }

    /// Always returns `text`
    pub fn replying(name: &str, text: &str) -> Self {
        Self::new(MockBackendConfig {
            name: name.to_string(),
            response: Ok(text.to_string()),
            ..Default::default()
        })
    }

    /// Always fails with a generic error
    pub fn failing(name: &str, message: &str) -> Self {
        Self::new(MockBackendConfig {
            name: name.to_string(),
            response: Err(BackendError::new(message)),
            ..Default::default()
        })
    }

    /// Always fails with a 429 quota error
    pub fn rate_limited(name: &str) -> Self {
        Self::new(MockBackendConfig {
            name: name.to_string(),
            response: Err(BackendError::with_status(
                429,
                "Resource has been exhausted (e.g. check quota).",
            )),
            ..Default::default()
        })
    }

    /// Returns `text` after `delay`
    pub fn with_delay(name: &str, text: &str, delay: Duration) -> Self {
        Self::new(MockBackendConfig {
            name: name.to_string(),
            response: Ok(text.to_string()),
            delay,
            ..Default::default()
        })
    }

    /// Number of times invoke was called
    pub fn calls(&self) -> usize {
        self.config.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<RecordedCall> {
        self.config.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextBackend for MockTextBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn invoke(
        &self,
        system_instruction: Option<&str>,
        prompt: &str,
        attachments: &[AttachmentPart],
    ) -> std::result::Result<String, BackendError> {
        self.config.calls.lock().unwrap().push(RecordedCall {
            system_instruction: system_instruction.map(str::to_string),
            prompt: prompt.to_string(),
            attachments: attachments.to_vec(),
        });

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        self.config.response.clone()
    }
}

/// Mock image backend
pub struct MockImageBackend {
    name: String,
    response: std::result::Result<String, BackendError>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockImageBackend {
    pub fn replying(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            response: Ok(url.to_string()),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            response: Err(BackendError::new(message)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ImageBackend for MockImageBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.response.clone()
    }
}
