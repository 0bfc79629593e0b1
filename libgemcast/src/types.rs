//! Core types for Gemcast

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default timezone for daily schedules
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Default period for interval schedules that do not carry one
pub const DEFAULT_INTERVAL_MINUTES: u32 = 60;

/// A reusable generation persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gem {
    pub id: String,
    pub name: String,
    pub instructions: String,
    #[serde(default)]
    pub files: Vec<GemFile>,
}

impl Gem {
    pub fn new(name: String, instructions: String, files: Vec<GemFile>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            instructions,
            files,
        }
    }

    /// True when at least one attached file is an image
    pub fn has_image_files(&self) -> bool {
        self.files.iter().any(GemFile::is_image)
    }
}

/// A reference file attached to a Gem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GemFile {
    pub uri: String,
    pub name: String,
    pub mime_type: String,
}

impl GemFile {
    pub fn is_image(&self) -> bool {
        self.mime_type.to_ascii_lowercase().starts_with("image/")
    }
}

/// When a job fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recurrence {
    /// Every `minutes` since the last successful run
    Interval { minutes: Option<u32> },
    /// At fixed wall-clock times ("HH:MM") in `timezone`
    Daily {
        times: Vec<String>,
        timezone: Option<String>,
    },
    /// A recurrence kind this build does not understand; never fires
    Unknown(String),
}

impl Recurrence {
    pub fn interval(minutes: u32) -> Self {
        Recurrence::Interval {
            minutes: Some(minutes),
        }
    }

    pub fn daily<S: Into<String>>(times: impl IntoIterator<Item = S>, timezone: &str) -> Self {
        Recurrence::Daily {
            times: times.into_iter().map(Into::into).collect(),
            timezone: Some(timezone.to_string()),
        }
    }

    /// The stored `type` discriminator
    pub fn kind(&self) -> &str {
        match self {
            Recurrence::Interval { .. } => "interval",
            Recurrence::Daily { .. } => "daily",
            Recurrence::Unknown(kind) => kind,
        }
    }

    /// Rebuild a recurrence from its stored columns
    ///
    /// A missing `type` is an interval job. A legacy single `daily_time` is
    /// used when no `daily_times` list is present.
    pub fn from_parts(
        kind: Option<&str>,
        interval_minutes: Option<u32>,
        daily_times: Option<Vec<String>>,
        daily_time: Option<String>,
        timezone: Option<String>,
    ) -> Self {
        match kind {
            None | Some("interval") => Recurrence::Interval {
                minutes: interval_minutes,
            },
            Some("daily") => {
                let times = match daily_times {
                    Some(times) if !times.is_empty() => times,
                    _ => daily_time.into_iter().collect(),
                };
                Recurrence::Daily { times, timezone }
            }
            Some(other) => Recurrence::Unknown(other.to_string()),
        }
    }
}

/// A recurring generation job bound to one Gem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredJob", into = "StoredJob")]
pub struct ScheduledJob {
    pub id: String,
    pub gem_id: String,
    pub recurrence: Recurrence,
    pub active: bool,
    /// Epoch milliseconds of the last successful fire
    pub last_run: Option<i64>,
}

impl ScheduledJob {
    pub fn new(gem_id: String, recurrence: Recurrence) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            gem_id,
            recurrence,
            active: true,
            last_run: None,
        }
    }
}

/// Flat wire form of a job, tolerant of older records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredJob {
    id: String,
    gem_id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interval_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    daily_times: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    daily_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timezone: Option<String>,
    #[serde(default)]
    last_run: Option<i64>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

impl From<StoredJob> for ScheduledJob {
    fn from(stored: StoredJob) -> Self {
        Self {
            id: stored.id,
            gem_id: stored.gem_id,
            recurrence: Recurrence::from_parts(
                stored.kind.as_deref(),
                stored.interval_minutes,
                stored.daily_times,
                stored.daily_time,
                stored.timezone,
            ),
            active: stored.active,
            last_run: stored.last_run,
        }
    }
}

impl From<ScheduledJob> for StoredJob {
    fn from(job: ScheduledJob) -> Self {
        let kind = Some(job.recurrence.kind().to_string());
        let (interval_minutes, daily_times, timezone) = match job.recurrence {
            Recurrence::Interval { minutes } => (minutes, None, None),
            Recurrence::Daily { times, timezone } => (None, Some(times), timezone),
            Recurrence::Unknown(_) => (None, None, None),
        };
        Self {
            id: job.id,
            gem_id: job.gem_id,
            kind,
            interval_minutes,
            daily_times,
            daily_time: None,
            timezone,
            last_run: job.last_run,
            active: job.active,
        }
    }
}

/// Partial update applied to a stored job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub gem_id: Option<String>,
    pub recurrence: Option<Recurrence>,
    pub active: Option<bool>,
    pub last_run: Option<i64>,
}

impl JobUpdate {
    pub fn last_run(at_ms: i64) -> Self {
        Self {
            last_run: Some(at_ms),
            ..Default::default()
        }
    }

    pub fn active(active: bool) -> Self {
        Self {
            active: Some(active),
            ..Default::default()
        }
    }

    pub fn apply(&self, job: &mut ScheduledJob) {
        if let Some(gem_id) = &self.gem_id {
            job.gem_id = gem_id.clone();
        }
        if let Some(recurrence) = &self.recurrence {
            job.recurrence = recurrence.clone();
        }
        if let Some(active) = self.active {
            job.active = active;
        }
        if let Some(last_run) = self.last_run {
            job.last_run = Some(last_run);
        }
    }
}

/// Output of one generation pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    pub caption: String,
    pub image_prompt: Option<String>,
    pub image_url: Option<String>,
}

impl GeneratedArtifact {
    pub fn caption_only(caption: String) -> Self {
        Self {
            caption,
            image_prompt: None,
            image_url: None,
        }
    }
}

/// Outcome of publishing to a single platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PublicationResult {
    Published {
        #[serde(rename = "postId")]
        post_id: String,
    },
    Failed {
        error: String,
    },
}

impl PublicationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PublicationResult::Published { .. })
    }

    pub fn post_id(&self) -> Option<&str> {
        match self {
            PublicationResult::Published { post_id } => Some(post_id),
            PublicationResult::Failed { .. } => None,
        }
    }
}
