//! Due-ness evaluation and schedule parsing
//!
//! [`is_due`] decides whether a job should fire at a given instant. It is a
//! pure function of the job and the instant: it recomputes everything from
//! absolute timestamps, so calling it twice within a minute or not at all for
//! hours never double-fires or starves a job.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::types::{Recurrence, ScheduledJob, DEFAULT_INTERVAL_MINUTES, DEFAULT_TIMEZONE};
use crate::{GemcastError, Result};

const MS_PER_MINUTE: i64 = 60_000;

/// Decide whether `job` should fire at `now`
pub fn is_due(job: &ScheduledJob, now: DateTime<Utc>) -> bool {
    if !job.active {
        return false;
    }

    match &job.recurrence {
        Recurrence::Interval { minutes } => interval_due(*minutes, job.last_run, now),
        Recurrence::Daily { times, timezone } => {
            daily_due(times, timezone.as_deref(), job.last_run, now)
        }
        Recurrence::Unknown(_) => false,
    }
}

fn interval_due(minutes: Option<u32>, last_run: Option<i64>, now: DateTime<Utc>) -> bool {
    let Some(last_run) = last_run else {
        return true;
    };

    let minutes = match minutes {
        Some(m) if m > 0 => m,
        _ => DEFAULT_INTERVAL_MINUTES,
    };

    now.timestamp_millis() - last_run >= i64::from(minutes) * MS_PER_MINUTE
}

fn daily_due(
    times: &[String],
    timezone: Option<&str>,
    last_run: Option<i64>,
    now: DateTime<Utc>,
) -> bool {
    let Ok(tz) = timezone.unwrap_or(DEFAULT_TIMEZONE).parse::<Tz>() else {
        return false;
    };

    let Some(slot) = current_slot(times, tz, now) else {
        return false;
    };

    let Some(last_run) = last_run.and_then(DateTime::<Utc>::from_timestamp_millis) else {
        return true;
    };

    let today = now.with_timezone(&tz).date_naive();
    let ran_today = last_run.with_timezone(&tz).date_naive() == today;

    !(ran_today && last_run >= slot)
}

/// The latest configured slot whose instant today is at or before `now`
pub fn current_slot(times: &[String], tz: Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(&tz).date_naive();

    times
        .iter()
        .filter_map(|t| parse_daily_time(t).ok())
        .filter_map(|t| slot_instant(tz, today, t))
        .filter(|slot| *slot <= now)
        .max()
}

/// Resolve a wall-clock time on `date` in `tz` to an instant
///
/// Ambiguous times (clocks falling back) resolve to the earlier instant.
/// Times inside a spring-forward gap move forward by one hour.
fn slot_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let local = date.and_time(time);
    let resolved = match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz.from_local_datetime(&(local + Duration::hours(1))).earliest(),
    };
    resolved.map(|dt| dt.with_timezone(&Utc))
}

/// Parse a "HH:MM" time of day
pub fn parse_daily_time(input: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M").map_err(|_| {
        GemcastError::InvalidInput(format!(
            "Invalid time of day '{}': expected HH:MM (24-hour)",
            input
        ))
    })
}

/// Validate and normalize a list of daily times: parsed, zero-padded, sorted, deduplicated
pub fn normalize_daily_times(times: &[String]) -> Result<Vec<String>> {
    if times.is_empty() {
        return Err(GemcastError::InvalidInput(
            "Daily schedules need at least one time of day".to_string(),
        ));
    }

    let mut parsed = times
        .iter()
        .map(|t| parse_daily_time(t))
        .collect::<Result<Vec<_>>>()?;
    parsed.sort();
    parsed.dedup();

    Ok(parsed.iter().map(|t| t.format("%H:%M").to_string()).collect())
}

/// Validate an IANA timezone name
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| GemcastError::InvalidInput(format!("Unknown timezone: {}", name)))
}

/// Parse an interval such as "90m", "2h" or "1h 30m" into whole minutes
pub fn parse_interval_minutes(input: &str) -> Result<u32> {
    let duration = humantime::parse_duration(input.trim()).map_err(|e| {
        GemcastError::InvalidInput(format!("Could not parse interval '{}': {}", input, e))
    })?;

    let minutes = duration.as_secs() / 60;
    if minutes == 0 {
        return Err(GemcastError::InvalidInput(
            "Interval must be at least one minute".to_string(),
        ));
    }

    u32::try_from(minutes)
        .map_err(|_| GemcastError::InvalidInput("Interval out of range".to_string()))
}
