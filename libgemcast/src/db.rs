//! Database operations for Gemcast

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use tracing::warn;

use crate::error::{DbError, Result};
use crate::store::{GemStore, JobStore};
use crate::types::{Gem, GemFile, JobUpdate, Recurrence, ScheduledJob};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    ///
    /// `:memory:` opens a private in-memory database on a single connection.
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = if db_path == ":memory:" {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .map_err(DbError::SqlxError)?
        } else {
            let expanded_path = shellexpand::tilde(db_path).to_string();
            if let Some(parent) = Path::new(&expanded_path).parent() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }

            // mode=rwc creates the file on first use
            let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));
            SqlitePool::connect(&db_url)
                .await
                .map_err(DbError::SqlxError)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn encode_json<T: serde::Serialize>(value: &T, column: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| {
        DbError::Corrupt {
            column: column.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: &str, column: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        DbError::Corrupt {
            column: column.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Split a recurrence into its (type, interval_minutes, daily_times, timezone) columns
fn recurrence_columns(
    recurrence: &Recurrence,
) -> Result<(String, Option<i64>, String, Option<String>)> {
    let kind = recurrence.kind().to_string();
    match recurrence {
        Recurrence::Interval { minutes } => {
            Ok((kind, minutes.map(i64::from), "[]".to_string(), None))
        }
        Recurrence::Daily { times, timezone } => Ok((
            kind,
            None,
            encode_json(times, "daily_times")?,
            timezone.clone(),
        )),
        Recurrence::Unknown(_) => Ok((kind, None, "[]".to_string(), None)),
    }
}

fn job_from_row(row: &SqliteRow) -> Result<ScheduledJob> {
    let kind: Option<String> = row.get("type");
    let interval_minutes = row
        .get::<Option<i64>, _>("interval_minutes")
        .and_then(|m| u32::try_from(m).ok());
    let id: String = row.get("id");

    // An unreadable time list leaves the job with no slots rather than
    // failing the whole listing
    let raw_times: String = row.get("daily_times");
    let daily_times = decode_json::<Vec<String>>(&raw_times, "daily_times").unwrap_or_else(|e| {
        warn!("Job {} has unreadable daily times and will not fire: {}", id, e);
        Vec::new()
    });

    Ok(ScheduledJob {
        id,
        gem_id: row.get("gem_id"),
        recurrence: Recurrence::from_parts(
            kind.as_deref(),
            interval_minutes,
            Some(daily_times),
            row.get("daily_time"),
            row.get("timezone"),
        ),
        active: row.get::<i64, _>("active") != 0,
        last_run: row.get("last_run"),
    })
}

fn gem_from_row(row: &SqliteRow) -> Result<Gem> {
    let files: Vec<GemFile> = decode_json(&row.get::<String, _>("files"), "files")?;
    Ok(Gem {
        id: row.get("id"),
        name: row.get("name"),
        instructions: row.get("instructions"),
        files,
    })
}

#[async_trait]
impl JobStore for Database {
    async fn list_jobs(&self) -> Result<Vec<ScheduledJob>> {
        let rows = sqlx::query(
            r#"
            SELECT id, gem_id, type, interval_minutes, daily_times, daily_time, timezone, last_run, active
            FROM schedules
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(job_from_row).collect()
    }

    async fn get_job(&self, id: &str) -> Result<Option<ScheduledJob>> {
        let row = sqlx::query(
            r#"
            SELECT id, gem_id, type, interval_minutes, daily_times, daily_time, timezone, last_run, active
            FROM schedules WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn create_job(&self, job: &ScheduledJob) -> Result<()> {
        let (kind, interval_minutes, daily_times, timezone) = recurrence_columns(&job.recurrence)?;

        sqlx::query(
            r#"
            INSERT INTO schedules (id, gem_id, type, interval_minutes, daily_times, timezone, last_run, active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.gem_id)
        .bind(kind)
        .bind(interval_minutes)
        .bind(daily_times)
        .bind(timezone)
        .bind(job.last_run)
        .bind(job.active as i64)
        .bind(now_ms())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn update_job(&self, id: &str, update: &JobUpdate) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        let result = sqlx::query(
            r#"
            UPDATE schedules
            SET gem_id = COALESCE(?, gem_id),
                active = COALESCE(?, active),
                last_run = COALESCE(?, last_run)
            WHERE id = ?
            "#,
        )
        .bind(&update.gem_id)
        .bind(update.active.map(|a| a as i64))
        .bind(update.last_run)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        if let Some(recurrence) = &update.recurrence {
            let (kind, interval_minutes, daily_times, timezone) = recurrence_columns(recurrence)?;
            sqlx::query(
                r#"
                UPDATE schedules
                SET type = ?, interval_minutes = ?, daily_times = ?, daily_time = NULL, timezone = ?
                WHERE id = ?
                "#,
            )
            .bind(kind)
            .bind(interval_minutes)
            .bind(daily_times)
            .bind(timezone)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(true)
    }

    async fn delete_job(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl GemStore for Database {
    async fn list_gems(&self) -> Result<Vec<Gem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, instructions, files
            FROM gems
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(gem_from_row).collect()
    }

    async fn get_gem(&self, id: &str) -> Result<Option<Gem>> {
        let row = sqlx::query("SELECT id, name, instructions, files FROM gems WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(gem_from_row).transpose()
    }

    async fn create_gem(&self, gem: &Gem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO gems (id, name, instructions, files, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&gem.id)
        .bind(&gem.name)
        .bind(&gem.instructions)
        .bind(encode_json(&gem.files, "files")?)
        .bind(now_ms())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn update_gem(&self, gem: &Gem) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE gems SET name = ?, instructions = ?, files = ? WHERE id = ?
            "#,
        )
        .bind(&gem.name)
        .bind(&gem.instructions)
        .bind(encode_json(&gem.files, "files")?)
        .bind(&gem.id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_gem(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM gems WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GemcastError;
    use tempfile::TempDir;

    async fn create_test_db() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        (temp_dir, db)
    }

    #[tokio::test]
    async fn test_database_creates_parent_directories() {
        let (temp_dir, _db) = create_test_db().await;
        assert!(temp_dir.path().join("nested").join("test.db").exists());
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(":memory:").await.unwrap();
        let gem = Gem::new("Mem".to_string(), "Remember".to_string(), vec![]);
        db.create_gem(&gem).await.unwrap();
        assert_eq!(db.list_gems().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_interval_job_round_trip() {
        let (_dir, db) = create_test_db().await;
        let job = ScheduledJob::new("gem-1".to_string(), Recurrence::interval(45));
        db.create_job(&job).await.unwrap();

        let fetched = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(fetched, job);
    }

    #[tokio::test]
    async fn test_daily_job_round_trip() {
        let (_dir, db) = create_test_db().await;
        let mut job = ScheduledJob::new(
            "gem-1".to_string(),
            Recurrence::daily(["09:00", "18:00"], "America/Chicago"),
        );
        job.last_run = Some(1_700_000_000_123);
        db.create_job(&job).await.unwrap();

        let fetched = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(fetched, job);
    }

    #[tokio::test]
    async fn test_list_jobs_newest_first() {
        let (_dir, db) = create_test_db().await;
        let first = ScheduledJob::new("g".to_string(), Recurrence::interval(1));
        let second = ScheduledJob::new("g".to_string(), Recurrence::interval(2));
        db.create_job(&first).await.unwrap();
        db.create_job(&second).await.unwrap();

        let ids: Vec<String> = db.list_jobs().await.unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_partial_update_leaves_other_fields() {
        let (_dir, db) = create_test_db().await;
        let job = ScheduledJob::new("gem-1".to_string(), Recurrence::interval(30));
        db.create_job(&job).await.unwrap();

        assert!(db.update_job(&job.id, &JobUpdate::last_run(5_000)).await.unwrap());
        let fetched = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(fetched.last_run, Some(5_000));
        assert!(fetched.active);
        assert_eq!(fetched.recurrence, Recurrence::interval(30));

        assert!(db.update_job(&job.id, &JobUpdate::active(false)).await.unwrap());
        let fetched = db.get_job(&job.id).await.unwrap().unwrap();
        assert!(!fetched.active);
        assert_eq!(fetched.last_run, Some(5_000));
    }

    #[tokio::test]
    async fn test_update_recurrence() {
        let (_dir, db) = create_test_db().await;
        let job = ScheduledJob::new("gem-1".to_string(), Recurrence::interval(30));
        db.create_job(&job).await.unwrap();

        let update = JobUpdate {
            recurrence: Some(Recurrence::daily(["07:15"], "Europe/Berlin")),
            ..Default::default()
        };
        assert!(db.update_job(&job.id, &update).await.unwrap());

        let fetched = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(fetched.recurrence, Recurrence::daily(["07:15"], "Europe/Berlin"));
    }

    #[tokio::test]
    async fn test_update_missing_job() {
        let (_dir, db) = create_test_db().await;
        assert!(!db.update_job("nope", &JobUpdate::last_run(1)).await.unwrap());
        assert!(!db.delete_job("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_legacy_rows_are_readable() {
        let (_dir, db) = create_test_db().await;
        sqlx::query(
            "INSERT INTO schedules (id, gem_id, type, interval_minutes, active, created_at) VALUES ('old', 'g', NULL, 15, 1, 0)",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO schedules (id, gem_id, type, daily_time, active, created_at) VALUES ('older', 'g', 'daily', '08:00', 1, 0)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let old = db.get_job("old").await.unwrap().unwrap();
        assert_eq!(old.recurrence, Recurrence::Interval { minutes: Some(15) });

        let older = db.get_job("older").await.unwrap().unwrap();
        assert_eq!(
            older.recurrence,
            Recurrence::Daily {
                times: vec!["08:00".to_string()],
                timezone: None
            }
        );
    }

    #[tokio::test]
    async fn test_corrupt_daily_times_do_not_hide_other_jobs() {
        let (_dir, db) = create_test_db().await;
        let healthy = ScheduledJob::new("g".to_string(), Recurrence::interval(30));
        db.create_job(&healthy).await.unwrap();
        sqlx::query(
            "INSERT INTO schedules (id, gem_id, type, daily_times, active, created_at) VALUES ('bad', 'g', 'daily', 'not json', 1, 0)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let jobs = db.list_jobs().await.unwrap();
        assert_eq!(jobs.len(), 2);

        let bad = db.get_job("bad").await.unwrap().unwrap();
        assert_eq!(
            bad.recurrence,
            Recurrence::Daily {
                times: vec![],
                timezone: None
            }
        );
        assert!(!crate::scheduling::is_due(&bad, chrono::Utc::now()));
        assert_eq!(db.get_job(&healthy.id).await.unwrap().unwrap(), healthy);
    }

    #[tokio::test]
    async fn test_gem_crud() {
        let (_dir, db) = create_test_db().await;
        let mut gem = Gem::new(
            "Travel".to_string(),
            "Post about travel".to_string(),
            vec![GemFile {
                uri: "/uploads/me.jpg".to_string(),
                name: "me.jpg".to_string(),
                mime_type: "image/jpeg".to_string(),
            }],
        );
        db.create_gem(&gem).await.unwrap();
        assert_eq!(db.get_gem(&gem.id).await.unwrap().unwrap(), gem);

        gem.name = "Wanderlust".to_string();
        gem.files.clear();
        assert!(db.update_gem(&gem).await.unwrap());
        assert_eq!(db.get_gem(&gem.id).await.unwrap().unwrap(), gem);

        assert!(db.delete_gem(&gem.id).await.unwrap());
        assert!(db.get_gem(&gem.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_database_initialization_with_invalid_path() {
        #[cfg(unix)]
        let invalid_path = "/tmp/test\0invalid.db";

        #[cfg(windows)]
        let invalid_path = "C:\\invalid<>path\\test.db";

        let result = Database::new(invalid_path).await;
        assert!(matches!(result, Err(GemcastError::Database(_))));
    }
}
