//! Publication dispatch
//!
//! Fans one generated artifact out to every requested platform. Each
//! platform's outcome is recorded as data: a failure on one platform never
//! prevents the others from being attempted, and `publish` itself never
//! fails.

use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, FacebookConfig, TwitterConfig, DEFAULT_PLATFORM};
use crate::platforms::{facebook::FacebookPlatform, twitter::TwitterPlatform, Platform};
use crate::types::{GeneratedArtifact, PublicationResult};

/// Per-platform outcomes, keyed by platform name
pub type PublicationResults = BTreeMap<String, PublicationResult>;

/// Routes artifacts to registered platform adapters
pub struct Dispatcher {
    platforms: Vec<Arc<dyn Platform>>,
    default_platform: String,
}

impl Dispatcher {
    /// Create a dispatcher that falls back to `twitter` for empty requests
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use libgemcast::config::Config;
    /// use libgemcast::poster::{create_platforms, Dispatcher};
    ///
    /// # fn example() -> libgemcast::Result<()> {
    /// let config = Config::load()?;
    /// let dispatcher =
    ///     Dispatcher::new(create_platforms(&config)).with_default_platform("facebook");
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(platforms: Vec<Arc<dyn Platform>>) -> Self {
        Self {
            platforms,
            default_platform: DEFAULT_PLATFORM.to_string(),
        }
    }

    pub fn with_default_platform(mut self, name: &str) -> Self {
        self.default_platform = name.to_string();
        self
    }

    /// Platform targeted by an empty request
    pub fn default_platform(&self) -> &str {
        &self.default_platform
    }

    /// Names of the registered adapters
    pub fn platform_names(&self) -> Vec<&str> {
        self.platforms.iter().map(|p| p.name()).collect()
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Platform>> {
        self.platforms.iter().find(|p| p.name() == name)
    }

    /// Publish to each distinct requested platform
    ///
    /// An empty request targets the default platform. Requested names with
    /// no registered adapter get a `Failed` entry.
    pub async fn publish(
        &self,
        artifact: &GeneratedArtifact,
        platforms: &[String],
    ) -> PublicationResults {
        let requested: BTreeSet<&str> = if platforms.is_empty() {
            BTreeSet::from([self.default_platform.as_str()])
        } else {
            platforms.iter().map(String::as_str).collect()
        };

        let caption = artifact.caption.as_str();
        let image_url = artifact.image_url.as_deref();

        let attempts = requested.into_iter().map(|name| async move {
            let Some(platform) = self.find(name) else {
                warn!("No adapter registered for platform '{}'", name);
                return (
                    name.to_string(),
                    PublicationResult::Failed {
                        error: format!("Unknown platform: {}", name),
                    },
                );
            };

            info!("Publishing to platform: {}", name);
            let outcome = match platform.publish(caption, image_url).await {
                Ok(post_id) => {
                    info!("Successfully published to {}: {}", name, post_id);
                    PublicationResult::Published { post_id }
                }
                Err(e) => {
                    warn!("Failed to publish to {}: {}", name, e);
                    PublicationResult::Failed {
                        error: e.to_string(),
                    }
                }
            };
            (name.to_string(), outcome)
        });

        join_all(attempts).await.into_iter().collect()
    }
}

/// True when at least one platform accepted the post
pub fn any_success(results: &PublicationResults) -> bool {
    results.values().any(PublicationResult::is_success)
}

/// Build the Twitter and Facebook adapters from configuration
///
/// Both are always registered; an adapter without credentials fails its own
/// publish attempts.
pub fn create_platforms(config: &Config) -> Vec<Arc<dyn Platform>> {
    let twitter = config
        .twitter
        .clone()
        .unwrap_or_else(TwitterConfig::default)
        .with_env_fallback();
    let facebook = config
        .facebook
        .clone()
        .unwrap_or_else(FacebookConfig::default)
        .with_env_fallback();

    let platforms: Vec<Arc<dyn Platform>> = vec![
        Arc::new(TwitterPlatform::new(&twitter)),
        Arc::new(FacebookPlatform::new(&facebook)),
    ];

    for platform in &platforms {
        if !platform.is_configured() {
            tracing::debug!("Platform {} has no credentials configured", platform.name());
        }
    }

    platforms
}

/// Dispatcher over [`create_platforms`] whose default is the first
/// configured `[defaults] platforms` entry
pub fn create_dispatcher(config: &Config) -> Dispatcher {
    let dispatcher = Dispatcher::new(create_platforms(config));
    match config.default_platforms().first() {
        Some(name) => dispatcher.with_default_platform(name),
        None => dispatcher,
    }
}
