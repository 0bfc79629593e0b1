//! Integration tests for the gem-send daemon

use assert_cmd::Command;
use libgemcast::{Database, Gem, GemStore, JobStore, Recurrence, ScheduledJob};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Setup test environment with config and database
///
/// The Gemini and Graph endpoints point at a closed local port so a due
/// job fails fast instead of reaching the network.
async fn setup_test_env() -> (TempDir, String, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("test.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[gemini]
api_key = "test-key"
base_url = "http://127.0.0.1:9"

[scheduler]
poll_interval = 1
initial_delay = 0
generate_images = false
"#,
        db_path.display().to_string().replace('\\', "/")
    );

    fs::write(&config_path, config_content).unwrap();

    // Initialize database
    let _db = Database::new(db_path.to_str().unwrap()).await.unwrap();

    (
        temp_dir,
        config_path.to_str().unwrap().to_string(),
        db_path.to_str().unwrap().to_string(),
    )
}

/// Create a Gem with an interval job that has never run
async fn create_due_job(db_path: &str) -> String {
    let db = Database::new(db_path).await.unwrap();

    let gem = Gem::new(
        "Tester".to_string(),
        "You write test captions.".to_string(),
        vec![],
    );
    db.create_gem(&gem).await.unwrap();

    let job = ScheduledJob::new(gem.id.clone(), Recurrence::interval(60));
    db.create_job(&job).await.unwrap();
    job.id
}

fn gem_send(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("gem-send").unwrap();
    cmd.env("GEMCAST_CONFIG", config_path)
        .env_remove("GEMCAST_DB_PATH")
        .env_remove("RUST_LOG")
        .env("GEMCAST_LOG_LEVEL", "info");
    cmd
}

// BASIC FUNCTIONALITY TESTS

#[tokio::test]
async fn test_once_flag_exits_immediately() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    gem_send(&config_path)
        .arg("--once")
        .assert()
        .success()
        .stderr(predicate::str::contains("gem-send daemon starting"))
        .stderr(predicate::str::contains("processed jobs once, exiting"));
}

#[tokio::test]
async fn test_invalid_config_is_exit_code_2() {
    let temp_dir = TempDir::new().unwrap();
    let invalid_config = temp_dir.path().join("invalid.toml");
    fs::write(&invalid_config, "invalid toml content [[[").unwrap();

    gem_send(invalid_config.to_str().unwrap())
        .arg("--once")
        .assert()
        .code(2);
}

#[tokio::test]
async fn test_missing_api_key_is_exit_code_2() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("test.db");
    fs::write(
        &config_path,
        format!(
            "[database]\npath = \"{}\"\n",
            db_path.display().to_string().replace('\\', "/")
        ),
    )
    .unwrap();

    gem_send(config_path.to_str().unwrap())
        .env_remove("GEMINI_API_KEY")
        .arg("--once")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("gemini.api_key"));
}

#[tokio::test]
async fn test_custom_poll_interval() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    gem_send(&config_path)
        .arg("--once")
        .arg("--poll-interval")
        .arg("30")
        .assert()
        .success()
        .stderr(predicate::str::contains("Poll interval: 30s"));
}

#[tokio::test]
async fn test_json_log_format() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    gem_send(&config_path)
        .arg("--once")
        .arg("--log-format")
        .arg("json")
        .assert()
        .success()
        .stderr(predicate::str::contains("\"message\":\"gem-send daemon starting\""));
}

#[tokio::test]
async fn test_invalid_log_format_rejected() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    gem_send(&config_path)
        .arg("--once")
        .arg("--log-format")
        .arg("yaml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid log format"));
}

// JOB PROCESSING TESTS

#[tokio::test]
async fn test_failed_generation_keeps_job_due() {
    let (_temp_dir, config_path, db_path) = setup_test_env().await;
    let job_id = create_due_job(&db_path).await;

    // Gemini is unreachable: the job fails but the daemon keeps going
    gem_send(&config_path)
        .arg("--once")
        .assert()
        .success()
        .stderr(predicate::str::contains("Generation failed for job"));

    let db = Database::new(&db_path).await.unwrap();
    let job = db.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.last_run, None);
}

#[tokio::test]
async fn test_paused_job_is_ignored() {
    let (_temp_dir, config_path, db_path) = setup_test_env().await;
    let job_id = create_due_job(&db_path).await;

    let db = Database::new(&db_path).await.unwrap();
    db.update_job(&job_id, &libgemcast::JobUpdate::active(false))
        .await
        .unwrap();

    gem_send(&config_path)
        .arg("--once")
        .assert()
        .success()
        .stderr(predicate::str::contains("Executing scheduled job").not());
}

#[tokio::test]
async fn test_db_path_env_override() {
    let (temp_dir, config_path, _db_path) = setup_test_env().await;
    let override_path = temp_dir.path().join("nested").join("override.db");

    gem_send(&config_path)
        .env("GEMCAST_DB_PATH", override_path.to_str().unwrap())
        .arg("--once")
        .assert()
        .success();

    assert!(override_path.exists());
}
