//! Shared helpers for gem-queue integration tests

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
pub fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config_path: String,
    pub db_path: String,
}

impl TestEnv {
    /// Config and database in a temp dir; `extra` is appended to the config
    pub fn new(extra: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let db_path = temp_dir.path().join("gemcast.db");

        let config_content = format!(
            "[database]\npath = \"{}\"\n{}",
            escape_path_for_toml(&db_path.to_string_lossy()),
            extra
        );
        fs::write(&config_path, config_content).unwrap();

        Self {
            temp_dir,
            config_path: config_path.to_string_lossy().to_string(),
            db_path: db_path.to_string_lossy().to_string(),
        }
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("gem-queue").unwrap();
        cmd.env("GEMCAST_CONFIG", &self.config_path)
            .env_remove("GEMCAST_DB_PATH")
            .env_remove("GEMINI_API_KEY")
            .env_remove("TWITTER_APP_KEY")
            .env_remove("FACEBOOK_PAGE_ID")
            .env_remove("FACEBOOK_ACCESS_TOKEN")
            .env_remove("RUST_LOG");
        cmd
    }

    /// Run a command that must succeed and return its trimmed stdout
    pub fn run(&self, args: &[&str]) -> String {
        let output = self.cmd().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "gem-queue {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    /// Create a Gem through the CLI and return its id
    pub fn add_gem(&self, name: &str, instructions: &str) -> String {
        self.run(&["gems", "add", name, "--instructions", instructions])
    }
}
