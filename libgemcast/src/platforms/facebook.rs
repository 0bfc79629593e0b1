//! Facebook Page platform implementation
//!
//! Uses the Graph API v19.0. With an image the post goes to
//! `/{page}/photos` (the Graph API fetches the URL itself); otherwise to
//! `/{page}/feed`.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::config::FacebookConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::{error_for_status, network_error, Platform};

pub const DEFAULT_GRAPH_URL: &str = "https://graph.facebook.com/v19.0";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Graph API error codes for throttling
const THROTTLE_CODES: [i64; 4] = [4, 17, 32, 613];
/// Graph API error code for invalid or expired tokens
const INVALID_TOKEN_CODE: i64 = 190;

#[derive(Serialize)]
#[serde(untagged)]
enum PageRequest<'a> {
    Photo {
        url: &'a str,
        caption: &'a str,
        access_token: &'a str,
        published: bool,
    },
    Feed {
        message: &'a str,
        access_token: &'a str,
        published: bool,
    },
}

#[derive(Deserialize)]
struct PageResponse {
    id: Option<String>,
    post_id: Option<String>,
}

#[derive(Deserialize)]
struct GraphErrorEnvelope {
    error: GraphError,
}

#[derive(Deserialize)]
struct GraphError {
    message: Option<String>,
    code: Option<i64>,
}

fn graph_error(status: u16, body: &str) -> PlatformError {
    let Ok(envelope) = serde_json::from_str::<GraphErrorEnvelope>(body) else {
        return error_for_status("facebook", status, "Failed to post to Facebook".to_string());
    };

    let message = envelope
        .error
        .message
        .unwrap_or_else(|| "Failed to post to Facebook".to_string());

    match envelope.error.code {
        Some(INVALID_TOKEN_CODE) => PlatformError::Authentication(format!("facebook: {}", message)),
        Some(code) if THROTTLE_CODES.contains(&code) => {
            PlatformError::RateLimit(format!("facebook: {}", message))
        }
        _ => error_for_status("facebook", status, message),
    }
}

pub struct FacebookPlatform {
    page_id: Option<String>,
    access_token: Option<SecretString>,
    graph_url: String,
    client: Client,
}

impl FacebookPlatform {
    pub fn new(config: &FacebookConfig) -> Self {
        Self {
            page_id: config.page_id.clone().filter(|s| !s.is_empty()),
            access_token: config
                .access_token
                .clone()
                .filter(|s| !s.is_empty())
                .map(SecretString::from),
            graph_url: DEFAULT_GRAPH_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Override the versioned Graph API base URL
    pub fn with_graph_url(mut self, graph_url: &str) -> Self {
        self.graph_url = graph_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Platform for FacebookPlatform {
    fn name(&self) -> &str {
        "facebook"
    }

    fn is_configured(&self) -> bool {
        self.page_id.is_some() && self.access_token.is_some()
    }

    async fn publish(&self, caption: &str, image_url: Option<&str>) -> Result<String> {
        let (Some(page_id), Some(token)) = (&self.page_id, &self.access_token) else {
            return Err(PlatformError::Authentication(
                "FACEBOOK_PAGE_ID or FACEBOOK_ACCESS_TOKEN is not set".to_string(),
            )
            .into());
        };
        let access_token = token.expose_secret();

        let (url, request) = match image_url {
            Some(image_url) => (
                format!("{}/{}/photos", self.graph_url, page_id),
                PageRequest::Photo {
                    url: image_url,
                    caption,
                    access_token,
                    published: true,
                },
            ),
            None => (
                format!("{}/{}/feed", self.graph_url, page_id),
                PageRequest::Feed {
                    message: caption,
                    access_token,
                    published: true,
                },
            ),
        };

        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| network_error("facebook", e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| network_error("facebook", e))?;
        if !status.is_success() {
            return Err(graph_error(status.as_u16(), &body).into());
        }

        let page: PageResponse = serde_json::from_str(&body).map_err(|e| {
            PlatformError::Posting(format!("facebook: unexpected response: {}", e))
        })?;

        let post_id = page.post_id.or(page.id).ok_or_else(|| {
            PlatformError::Posting("facebook: response carried no post id".to_string())
        })?;

        info!("Facebook post published: {}", post_id);
        Ok(post_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn platform(server: &MockServer) -> FacebookPlatform {
        FacebookPlatform::new(&FacebookConfig {
            page_id: Some("123".to_string()),
            access_token: Some("tok".to_string()),
        })
        .with_graph_url(&server.uri())
    }

    #[tokio::test]
    async fn test_text_goes_to_feed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/123/feed"))
            .and(body_json(serde_json::json!({
                "message": "Hello page",
                "access_token": "tok",
                "published": true
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "123_456" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(platform(&server).publish("Hello page", None).await.unwrap(), "123_456");
    }

    #[tokio::test]
    async fn test_image_goes_to_photos() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/123/photos"))
            .and(body_json(serde_json::json!({
                "url": "https://img/1.png",
                "caption": "Look",
                "access_token": "tok",
                "published": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "789",
                "post_id": "123_789"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let post_id = platform(&server)
            .publish("Look", Some("https://img/1.png"))
            .await
            .unwrap();
        assert_eq!(post_id, "123_789");
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_fast() {
        let platform = FacebookPlatform::new(&FacebookConfig {
            page_id: Some("123".to_string()),
            access_token: None,
        });
        assert!(!platform.is_configured());

        let err = platform.publish("x", None).await.unwrap_err();
        assert!(err.to_string().contains("FACEBOOK_ACCESS_TOKEN"));
    }

    #[tokio::test]
    async fn test_graph_error_message_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {
                    "message": "Error validating access token: Session has expired",
                    "type": "OAuthException",
                    "code": 190
                }
            })))
            .mount(&server)
            .await;

        let err = platform(&server).publish("x", None).await.unwrap_err();
        assert!(matches!(
            err,
            crate::GemcastError::Platform(PlatformError::Authentication(_))
        ));
        assert!(err.to_string().contains("Session has expired"));
    }

    #[test]
    fn test_graph_error_throttle_and_fallback() {
        let throttled = graph_error(
            400,
            r#"{"error":{"message":"Application request limit reached","code":4}}"#,
        );
        assert!(matches!(throttled, PlatformError::RateLimit(_)));

        let opaque = graph_error(500, "<html>");
        assert!(opaque.to_string().contains("Failed to post to Facebook"));
    }
}
