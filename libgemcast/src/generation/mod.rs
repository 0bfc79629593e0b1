//! Content generation pipeline
//!
//! A pipeline run goes through three stages, strictly in order:
//!
//! 1. **Caption**: the Gem's instructions are sent to an ordered list of
//!    text backends. A generic failure moves on to the next backend; a
//!    rate-limit failure abandons the stage at once, since provider quotas
//!    are account-wide.
//! 2. **Image prompt** (only when an image is wanted): one backend call turns
//!    the caption into an image-generation prompt.
//! 3. **Image**: the image backend turns the prompt into an image URL.
//!
//! Failures in stages 2 and 3 are fatal to the run.
//!
//! # Example
//!
//! ```no_run
//! use libgemcast::config::Config;
//! use libgemcast::generation::create_pipeline;
//!
//! # async fn example() -> libgemcast::Result<()> {
//! let config = Config::load()?;
//! let pipeline = create_pipeline(&config)?;
//! let artifact = pipeline
//!     .generate("You are a cheerful barista.", &[], true)
//!     .await?;
//! println!("{}", artifact.caption);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{BackendError, GenerationError};
use crate::types::{Gem, GemFile, GeneratedArtifact};

pub mod enhance;
pub mod gemini;
pub mod pollinations;

// Mock backends are available for all builds to support integration tests
pub mod mock;

/// Task prompt for the caption stage; the Gem's instructions are the system instruction
pub const CAPTION_PROMPT: &str = "Generate a social media caption based on the system instructions. \
Keep it engaging and suitable for Twitter (X). Include hashtags. \
CRITICAL: Return ONLY the caption text. Do NOT include conversational filler like 'Here we go' or 'Sure'. \
Do NOT include quotes around the caption.";

/// URIs with this prefix are files in local upload storage
pub const LOCAL_UPLOAD_PREFIX: &str = "/uploads/";

/// A Gem file prepared for a backend request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentPart {
    /// File bytes sent inline
    Inline { mime_type: String, data: Vec<u8> },
    /// An opaque reference the backend resolves itself
    Remote { mime_type: String, uri: String },
}

impl AttachmentPart {
    pub fn mime_type(&self) -> &str {
        match self {
            AttachmentPart::Inline { mime_type, .. } | AttachmentPart::Remote { mime_type, .. } => {
                mime_type
            }
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type().to_ascii_lowercase().starts_with("image/")
    }
}

/// A text-generation backend (one model on one provider)
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Identifier used in logs and errors, e.g. the model name
    fn name(&self) -> &str;

    async fn invoke(
        &self,
        system_instruction: Option<&str>,
        prompt: &str,
        attachments: &[AttachmentPart],
    ) -> Result<String, BackendError>;
}

/// An image-generation backend
#[async_trait]
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Returns a URL (or data URI) for the generated image
    async fn invoke(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Decides whether a backend failure is a quota/rate-limit signal
pub type RateLimitClassifier = Arc<dyn Fn(&BackendError) -> bool + Send + Sync>;

/// HTTP 429, or a message carrying "429" or the Gemini quota wording
pub fn is_rate_limit_error(error: &BackendError) -> bool {
    error.status == Some(429)
        || error.message.contains("429")
        || error.message.contains("Resource has been exhausted")
        || error.message.contains("RESOURCE_EXHAUSTED")
}

/// Turns Gem file references into request attachments
#[derive(Debug, Clone)]
pub struct AttachmentResolver {
    uploads_root: PathBuf,
}

impl AttachmentResolver {
    /// `uploads_root` is the directory holding the `uploads/` folder
    pub fn new(uploads_root: impl Into<PathBuf>) -> Self {
        Self {
            uploads_root: uploads_root.into(),
        }
    }

    /// Local uploads are read and inlined; anything else is passed by reference.
    /// Unreadable files are skipped with a warning.
    pub async fn resolve(&self, files: &[GemFile]) -> Vec<AttachmentPart> {
        let mut parts = Vec::with_capacity(files.len());

        for file in files {
            if !file.uri.starts_with(LOCAL_UPLOAD_PREFIX) {
                parts.push(AttachmentPart::Remote {
                    mime_type: file.mime_type.clone(),
                    uri: file.uri.clone(),
                });
                continue;
            }

            let Some(path) = self.local_path(&file.uri) else {
                warn!("Skipping attachment with unsafe path: {}", file.uri);
                continue;
            };

            match tokio::fs::read(&path).await {
                Ok(data) => parts.push(AttachmentPart::Inline {
                    mime_type: file.mime_type.clone(),
                    data,
                }),
                Err(e) => warn!("Failed to read local file {}: {}", file.uri, e),
            }
        }

        parts
    }

    fn local_path(&self, uri: &str) -> Option<PathBuf> {
        let relative = Path::new(uri.trim_start_matches('/'));
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        safe.then(|| self.uploads_root.join(relative))
    }
}

impl Default for AttachmentResolver {
    fn default() -> Self {
        Self::new("public")
    }
}

/// Caption → image prompt → image
pub struct GenerationPipeline {
    caption_backends: Vec<Arc<dyn TextBackend>>,
    prompt_backend: Arc<dyn TextBackend>,
    image_backend: Arc<dyn ImageBackend>,
    resolver: AttachmentResolver,
    is_rate_limit: RateLimitClassifier,
}

impl GenerationPipeline {
    /// `caption_backends` are tried in order
    pub fn new(
        caption_backends: Vec<Arc<dyn TextBackend>>,
        prompt_backend: Arc<dyn TextBackend>,
        image_backend: Arc<dyn ImageBackend>,
    ) -> Self {
        Self {
            caption_backends,
            prompt_backend,
            image_backend,
            resolver: AttachmentResolver::default(),
            is_rate_limit: Arc::new(is_rate_limit_error),
        }
    }

    pub fn with_attachment_resolver(mut self, resolver: AttachmentResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_rate_limit_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&BackendError) -> bool + Send + Sync + 'static,
    {
        self.is_rate_limit = Arc::new(classifier);
        self
    }

    /// Generate content for a Gem
    pub async fn generate_for(
        &self,
        gem: &Gem,
        want_image: bool,
    ) -> Result<GeneratedArtifact, GenerationError> {
        self.generate(&gem.instructions, &gem.files, want_image).await
    }

    /// Run the full pipeline
    ///
    /// # Errors
    ///
    /// - `RateLimitExceeded` if a caption backend reports an exhausted quota
    /// - `AllBackendsFailed` if every caption backend fails otherwise
    /// - `ImagePrompt` / `Image` if an image was wanted and its stages fail
    pub async fn generate(
        &self,
        instructions: &str,
        files: &[GemFile],
        want_image: bool,
    ) -> Result<GeneratedArtifact, GenerationError> {
        let attachments = self.resolver.resolve(files).await;
        let caption = self.generate_caption(instructions, &attachments).await?;

        if !want_image {
            return Ok(GeneratedArtifact::caption_only(caption));
        }

        let reference_images: Vec<AttachmentPart> =
            attachments.into_iter().filter(AttachmentPart::is_image).collect();
        let image_prompt = self.generate_image_prompt(&caption, &reference_images).await?;
        let image_url = self.generate_image(&image_prompt).await?;

        Ok(GeneratedArtifact {
            caption,
            image_prompt: Some(image_prompt),
            image_url: Some(image_url),
        })
    }

    /// Caption stage: fold over the backends, stopping at the first success or rate limit
    pub async fn generate_caption(
        &self,
        instructions: &str,
        attachments: &[AttachmentPart],
    ) -> Result<String, GenerationError> {
        let mut last_failure: Option<(String, BackendError)> = None;

        for backend in &self.caption_backends {
            debug!("Generating caption with {}", backend.name());

            match backend
                .invoke(Some(instructions), CAPTION_PROMPT, attachments)
                .await
            {
                Ok(text) => {
                    let caption = text.trim();
                    if caption.is_empty() {
                        warn!(
                            "Model {} returned an empty caption, attempting next model",
                            backend.name()
                        );
                        last_failure = Some((
                            backend.name().to_string(),
                            BackendError::new("empty response"),
                        ));
                        continue;
                    }
                    info!("Caption generated by {}", backend.name());
                    return Ok(caption.to_string());
                }
                Err(e) if (self.is_rate_limit)(&e) => {
                    warn!("Model {} is rate limited: {}", backend.name(), e);
                    return Err(GenerationError::RateLimitExceeded(format!(
                        "{}: {}",
                        backend.name(),
                        e
                    )));
                }
                Err(e) => {
                    warn!("Model {} failed: {}. Attempting next model", backend.name(), e);
                    last_failure = Some((backend.name().to_string(), e));
                }
            }
        }

        match last_failure {
            Some((backend, source)) => Err(GenerationError::AllBackendsFailed { backend, source }),
            None => Err(GenerationError::NoBackends),
        }
    }

    /// Image-prompt stage
    ///
    /// With reference images, the prompt asks the model to describe the
    /// subject's likeness and carry it into the image prompt.
    pub async fn generate_image_prompt(
        &self,
        caption: &str,
        reference_images: &[AttachmentPart],
    ) -> Result<String, GenerationError> {
        let prompt = image_prompt_request(caption, !reference_images.is_empty());

        let text = self
            .prompt_backend
            .invoke(None, &prompt, reference_images)
            .await
            .map_err(GenerationError::ImagePrompt)?;

        let image_prompt = text.trim();
        if image_prompt.is_empty() {
            return Err(GenerationError::ImagePrompt(BackendError::new(
                "empty image prompt",
            )));
        }

        Ok(image_prompt.to_string())
    }

    /// Image stage
    pub async fn generate_image(&self, image_prompt: &str) -> Result<String, GenerationError> {
        let url = self
            .image_backend
            .invoke(image_prompt)
            .await
            .map_err(GenerationError::Image)?;
        info!("Image generated by {}", self.image_backend.name());
        Ok(url)
    }
}

/// Build the request text for the image-prompt stage
pub fn image_prompt_request(caption: &str, preserve_likeness: bool) -> String {
    if !preserve_likeness {
        return format!(
            "Based on this social media caption, create a detailed image generation prompt \
for an AI art generator. Only return the prompt text, nothing else.\n\nCaption: \"{}\"",
            caption
        );
    }

    format!(
        "Analyze the attached image(s) and write an EXTREMELY DETAILED visual description of the \
character's face, hair and distinctive features, focusing on facial identity.\n\n\
Then create a detailed image generation prompt for an AI art generator that shows THIS SPECIFIC \
CHARACTER in the scene described by this caption.\n\n\
Caption: \"{}\"\n\n\
CRITICAL:\n\
1. Output ONLY the image generation prompt text.\n\
2. Do not include explanations.\n\
3. Include the detailed physical description of the character (face, hair, age, ethnicity, \
distinguishing marks) so the generated image matches the reference exactly.\n\
4. Use keywords like \"consistent character\", \"highly detailed face\", \"exact likeness\".",
        caption
    )
}

/// Build the production pipeline from configuration
///
/// # Errors
///
/// Returns a configuration error if no Gemini API key is available.
pub fn create_pipeline(config: &Config) -> crate::Result<GenerationPipeline> {
    let api_key = config.gemini.resolve_api_key()?;

    let caption_backends: Vec<Arc<dyn TextBackend>> = config
        .gemini
        .models
        .iter()
        .map(|model| {
            Arc::new(
                gemini::GeminiBackend::new(model, api_key.clone())
                    .with_base_url(&config.gemini.base_url),
            ) as Arc<dyn TextBackend>
        })
        .collect();

    let prompt_backend = Arc::new(
        gemini::GeminiBackend::new(&config.gemini.prompt_model, api_key)
            .with_base_url(&config.gemini.base_url),
    );

    let image_backend = Arc::new(pollinations::PollinationsBackend::new(
        &config.image.base_url,
        config.image.nologo,
    ));

    Ok(
        GenerationPipeline::new(caption_backends, prompt_backend, image_backend)
            .with_attachment_resolver(AttachmentResolver::new(config.uploads.root_path())),
    )
}
