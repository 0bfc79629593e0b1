//! Pollinations image backend
//!
//! Pollinations renders on first fetch, so "generating" an image is just
//! building its URL. Dispatchers download it when they need the bytes.

use async_trait::async_trait;

use crate::config::DEFAULT_IMAGE_URL;
use crate::error::BackendError;
use crate::generation::ImageBackend;

pub struct PollinationsBackend {
    base_url: String,
    nologo: bool,
}

impl PollinationsBackend {
    pub fn new(base_url: &str, nologo: bool) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            nologo,
        }
    }

    pub fn image_url(&self, prompt: &str) -> String {
        let mut url = format!("{}/{}", self.base_url, urlencoding::encode(prompt));
        if self.nologo {
            url.push_str("?nologo=true");
        }
        url
    }
}

impl Default for PollinationsBackend {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_URL, true)
    }
}

#[async_trait]
impl ImageBackend for PollinationsBackend {
    fn name(&self) -> &str {
        "pollinations"
    }

    async fn invoke(&self, prompt: &str) -> Result<String, BackendError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(BackendError::new("image prompt is empty"));
        }
        Ok(self.image_url(prompt))
    }
}
