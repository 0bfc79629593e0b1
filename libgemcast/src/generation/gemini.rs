//! Google Gemini text backend
//!
//! Calls the REST `generateContent` endpoint for a single model. The Gem's
//! instructions travel as the system instruction; attachments become
//! `inlineData` (base64) or `fileData` parts after the prompt text.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::DEFAULT_GEMINI_URL;
use crate::error::BackendError;
use crate::generation::{AttachmentPart, TextBackend};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum Part<'a> {
    Text(&'a str),
    InlineData(Blob<'a>),
    FileData(FileRef<'a>),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileRef<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

/// One Gemini model
pub struct GeminiBackend {
    model: String,
    api_key: SecretString,
    base_url: String,
    client: Client,
}

impl GeminiBackend {
    pub fn new(model: &str, api_key: impl Into<String>) -> Self {
        Self {
            model: model.to_string(),
            api_key: SecretString::from(api_key.into()),
            base_url: DEFAULT_GEMINI_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Point at a different API host (proxies, tests)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

fn build_request<'a>(
    system_instruction: Option<&'a str>,
    prompt: &'a str,
    attachments: &'a [AttachmentPart],
) -> GenerateRequest<'a> {
    let mut parts = vec![Part::Text(prompt)];
    parts.extend(attachments.iter().map(|a| match a {
        AttachmentPart::Inline { mime_type, data } => Part::InlineData(Blob {
            mime_type,
            data: STANDARD.encode(data),
        }),
        AttachmentPart::Remote { mime_type, uri } => Part::FileData(FileRef {
            mime_type,
            file_uri: uri,
        }),
    }));

    GenerateRequest {
        system_instruction: system_instruction.map(|text| Content {
            role: None,
            parts: vec![Part::Text(text)],
        }),
        contents: vec![Content {
            role: Some("user"),
            parts,
        }],
    }
}

/// Turn a non-success response body into a backend error
fn error_from_body(status: u16, body: &str) -> BackendError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match (envelope.error.status, envelope.error.message) {
            (Some(s), Some(m)) => format!("{}: {}", s, m),
            (None, Some(m)) => m,
            (Some(s), None) => s,
            (None, None) => format!("HTTP {}", status),
        },
        Err(_) if body.trim().is_empty() => format!("HTTP {}", status),
        Err(_) => body.trim().to_string(),
    };
    BackendError::with_status(status, message)
}

#[async_trait]
impl TextBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn invoke(
        &self,
        system_instruction: Option<&str>,
        prompt: &str,
        attachments: &[AttachmentPart],
    ) -> Result<String, BackendError> {
        let request = build_request(system_instruction, prompt, attachments);
        debug!(
            "Calling Gemini model {} with {} attachment(s)",
            self.model,
            attachments.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::new(format!("Request to {} failed: {}", self.model, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::with_status(status.as_u16(), e.to_string()))?;

        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &body));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| BackendError::new(format!("Invalid Gemini response: {}", e)))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        Ok(text)
    }
}
