//! Twitter/X platform implementation
//!
//! Posts through API v2 `POST /2/tweets` with OAuth 1.0a user-context
//! signing. Images are downloaded and pushed through the v1.1 media upload
//! endpoint, then attached by media id.
//!
//! Only the `oauth_*` parameters are signed: the tweet body is JSON and the
//! media upload is multipart, and neither contributes to the signature.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::TwitterConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::{error_for_status, network_error, Platform};

type HmacSha1 = Hmac<Sha1>;

pub const DEFAULT_API_URL: &str = "https://api.twitter.com";
pub const DEFAULT_UPLOAD_URL: &str = "https://upload.twitter.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// OAuth 1.0a user-context credentials
pub struct OAuthCredentials {
    pub consumer_key: String,
    pub consumer_secret: SecretString,
    pub token: String,
    pub token_secret: SecretString,
}

impl OAuthCredentials {
    /// `None` unless all four values are present and non-empty
    pub fn from_config(config: &TwitterConfig) -> Option<Self> {
        let present = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        Some(Self {
            consumer_key: present(&config.app_key)?,
            consumer_secret: SecretString::from(present(&config.app_secret)?),
            token: present(&config.access_token)?,
            token_secret: SecretString::from(present(&config.access_secret)?),
        })
    }

    /// Build the `Authorization` header for a request with no signed body parameters
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        nonce: &str,
        timestamp: i64,
    ) -> Result<String> {
        let timestamp = timestamp.to_string();
        let mut params = [
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.token.as_str()),
            ("oauth_version", "1.0"),
        ];
        params.sort_by_key(|(k, _)| *k);

        let base = signature_base_string(method, url, &params);
        let signature = self.sign(&base)?;

        let mut fields: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, percent_encode(v)))
            .collect();
        fields.push(format!("oauth_signature=\"{}\"", percent_encode(&signature)));
        fields.sort();

        Ok(format!("OAuth {}", fields.join(", ")))
    }

    fn sign(&self, base: &str) -> Result<String> {
        let key = format!(
            "{}&{}",
            percent_encode(self.consumer_secret.expose_secret()),
            percent_encode(self.token_secret.expose_secret())
        );
        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
            .map_err(|e| {
                PlatformError::Authentication(format!("twitter: signing key rejected: {}", e))
            })?;
        mac.update(base.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// RFC 3986 encoding: everything but `A-Z a-z 0-9 - . _ ~`
fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// `METHOD&url&params`, with params already sorted by key
fn signature_base_string(method: &str, url: &str, sorted_params: &[(&str, &str)]) -> String {
    let params = sorted_params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&params)
    )
}

#[derive(Serialize)]
struct TweetRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<TweetMedia>,
}

#[derive(Serialize)]
struct TweetMedia {
    media_ids: Vec<String>,
}

#[derive(Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

#[derive(Deserialize)]
struct MediaUploadResponse {
    media_id_string: String,
}

/// Twitter API error bodies come in v1.1 and v2 shapes
fn error_message(body: &str) -> String {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return body.trim().to_string(),
    };

    value
        .get("detail")
        .and_then(|d| d.as_str())
        .or_else(|| {
            value
                .get("errors")
                .and_then(|e| e.get(0))
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
        })
        .or_else(|| value.get("title").and_then(|t| t.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

pub struct TwitterPlatform {
    credentials: Option<OAuthCredentials>,
    api_url: String,
    upload_url: String,
    client: Client,
}

impl TwitterPlatform {
    pub fn new(config: &TwitterConfig) -> Self {
        Self {
            credentials: OAuthCredentials::from_config(config),
            api_url: DEFAULT_API_URL.to_string(),
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Override the API and upload hosts
    pub fn with_endpoints(mut self, api_url: &str, upload_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self.upload_url = upload_url.trim_end_matches('/').to_string();
        self
    }

    fn credentials(&self) -> Result<&OAuthCredentials> {
        self.credentials.as_ref().ok_or_else(|| {
            PlatformError::Authentication(
                "Twitter API keys are not fully configured (app_key, app_secret, access_token, access_secret)"
                    .to_string(),
            )
            .into()
        })
    }

    fn authorization(
        &self,
        credentials: &OAuthCredentials,
        method: &str,
        url: &str,
    ) -> Result<String> {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let timestamp = chrono::Utc::now().timestamp();
        credentials.authorization_header(method, url, &nonce, timestamp)
    }

    async fn download_image(&self, image_url: &str) -> Result<Vec<u8>> {
        debug!("Downloading image for Twitter: {}", image_url);
        let response = self
            .client
            .get(image_url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| network_error("twitter", e))?;

        if !response.status().is_success() {
            return Err(PlatformError::Posting(format!(
                "twitter: image download returned HTTP {}",
                response.status().as_u16()
            ))
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| network_error("twitter", e))?;
        Ok(bytes.to_vec())
    }

    async fn upload_media(&self, credentials: &OAuthCredentials, image: Vec<u8>) -> Result<String> {
        let url = format!("{}/1.1/media/upload.json", self.upload_url);
        let form = reqwest::multipart::Form::new()
            .part("media", reqwest::multipart::Part::bytes(image).file_name("image"));

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.authorization(credentials, "POST", &url)?)
            .timeout(REQUEST_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|e| network_error("twitter", e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| network_error("twitter", e))?;
        if !status.is_success() {
            return Err(error_for_status("twitter", status.as_u16(), error_message(&body)).into());
        }

        let uploaded: MediaUploadResponse = serde_json::from_str(&body).map_err(|e| {
            PlatformError::Posting(format!("twitter: unexpected media upload response: {}", e))
        })?;
        Ok(uploaded.media_id_string)
    }
}

#[async_trait]
impl Platform for TwitterPlatform {
    fn name(&self) -> &str {
        "twitter"
    }

    fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    async fn publish(&self, caption: &str, image_url: Option<&str>) -> Result<String> {
        let credentials = self.credentials()?;

        let media = match image_url {
            Some(image_url) => {
                let image = self.download_image(image_url).await?;
                let media_id = self.upload_media(credentials, image).await?;
                debug!("Uploaded Twitter media {}", media_id);
                Some(TweetMedia {
                    media_ids: vec![media_id],
                })
            }
            None => None,
        };

        let url = format!("{}/2/tweets", self.api_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.authorization(credentials, "POST", &url)?)
            .timeout(REQUEST_TIMEOUT)
            .json(&TweetRequest {
                text: caption,
                media,
            })
            .send()
            .await
            .map_err(|e| network_error("twitter", e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| network_error("twitter", e))?;
        if !status.is_success() {
            return Err(error_for_status("twitter", status.as_u16(), error_message(&body)).into());
        }

        let tweet: TweetResponse = serde_json::from_str(&body).map_err(|e| {
            PlatformError::Posting(format!("twitter: unexpected tweet response: {}", e))
        })?;

        info!("Tweet posted: {}", tweet.data.id);
        Ok(tweet.data.id)
    }
}
