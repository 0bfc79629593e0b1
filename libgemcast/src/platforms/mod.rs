//! Platform abstraction and implementations
//!
//! Each adapter publishes one caption (and optionally one image) to a
//! single social platform. Adapters check their own credentials and fail
//! fast; they never retry.
//!
//! # Examples
//!
//! ```no_run
//! use libgemcast::config::FacebookConfig;
//! use libgemcast::platforms::{facebook::FacebookPlatform, Platform};
//!
//! # async fn example() -> libgemcast::Result<()> {
//! let platform = FacebookPlatform::new(&FacebookConfig::default().with_env_fallback());
//!
//! if platform.is_configured() {
//!     let post_id = platform.publish("Hello from Gemcast!", None).await?;
//!     println!("Posted: {}", post_id);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::{PlatformError, Result};

pub mod facebook;
pub mod twitter;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Unified publishing interface
#[async_trait]
pub trait Platform: Send + Sync {
    /// Lowercase identifier used as the dispatch key (e.g. "twitter")
    fn name(&self) -> &str;

    /// True when every credential the adapter needs is present
    fn is_configured(&self) -> bool;

    /// Publish and return the platform's post id
    ///
    /// # Errors
    ///
    /// - `PlatformError::Authentication` for missing or rejected credentials
    /// - `PlatformError::RateLimit` when the platform throttles the request
    /// - `PlatformError::Network` / `PlatformError::Posting` otherwise
    async fn publish(&self, caption: &str, image_url: Option<&str>) -> Result<String>;
}

/// Map an HTTP status from a platform API to the error taxonomy
pub(crate) fn error_for_status(platform: &str, status: u16, message: String) -> PlatformError {
    match status {
        401 | 403 => PlatformError::Authentication(format!("{}: {}", platform, message)),
        429 => PlatformError::RateLimit(format!("{}: {}", platform, message)),
        400 | 422 => PlatformError::Validation(format!("{}: {}", platform, message)),
        _ => PlatformError::Posting(format!("{} (HTTP {}): {}", platform, status, message)),
    }
}

pub(crate) fn network_error(platform: &str, error: reqwest::Error) -> PlatformError {
    PlatformError::Network(format!("{} request failed: {}", platform, error))
}
