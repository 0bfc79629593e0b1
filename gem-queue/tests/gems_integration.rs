//! Integration tests for gem-queue gems commands

mod common;

use common::TestEnv;
use libgemcast::{Database, GemStore, JobStore};
use predicates::prelude::*;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn test_add_prints_id_and_list_shows_gem() {
    let env = TestEnv::new("");

    let id = env.add_gem("Chef Luna", "You are a warm chef.");
    assert_eq!(id.len(), 36);

    env.cmd()
        .args(["gems", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&id))
        .stdout(predicate::str::contains("Chef Luna | 0 files | You are a warm chef."));
}

#[test]
fn test_add_with_files_json() {
    let env = TestEnv::new("");

    let output = env.run(&[
        "--format",
        "json",
        "gems",
        "add",
        "Luna",
        "--instructions",
        "Chef persona",
        "--file",
        "/uploads/luna.png",
        "--file",
        "/uploads/menu.pdf",
    ]);

    let gem: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(gem["name"], "Luna");
    assert_eq!(gem["files"][0]["uri"], "/uploads/luna.png");
    assert_eq!(gem["files"][0]["mimeType"], "image/png");
    assert_eq!(gem["files"][0]["name"], "luna.png");
    assert_eq!(gem["files"][1]["mimeType"], "application/pdf");
}

#[test]
fn test_add_rejects_empty_instructions() {
    let env = TestEnv::new("");

    env.cmd()
        .args(["gems", "add", "Nobody", "--instructions", "   "])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("instructions cannot be empty"));
}

#[test]
fn test_list_json_is_empty_array_on_fresh_store() {
    let env = TestEnv::new("");

    let output = env.run(&["gems", "list", "--format", "json"]);
    let gems: Vec<serde_json::Value> = serde_json::from_str(&output).unwrap();
    assert!(gems.is_empty());
}

#[test]
fn test_invalid_format_is_exit_code_3() {
    let env = TestEnv::new("");

    env.cmd()
        .args(["gems", "list", "--format", "yaml"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid format 'yaml'"));
}

#[tokio::test]
async fn test_remove_deletes_gem_and_its_jobs() {
    let env = TestEnv::new("");
    let keep = env.add_gem("Keep", "Stays scheduled");
    let doomed = env.add_gem("Drop", "Goes away");
    env.run(&["jobs", "add", &keep, "--every", "1h"]);
    env.run(&["jobs", "add", &doomed, "--every", "2h"]);
    env.run(&["jobs", "add", &doomed, "--at", "09:00"]);

    env.cmd()
        .args(["gems", "remove", doomed.as_str()])
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed 2 jobs"));

    let db = Database::new(&env.db_path).await.unwrap();
    assert!(db.get_gem(&doomed).await.unwrap().is_none());
    let jobs = db.list_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].gem_id, keep);
}

#[test]
fn test_remove_unknown_gem_is_exit_code_3() {
    let env = TestEnv::new("");

    env.cmd()
        .args(["gems", "remove", "no-such-gem"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Gem not found: no-such-gem"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_enhance_apply_updates_gem() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/enhancer:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{ "content": { "parts": [{
                "text": "```json\n{\"name\": \"Chef Luna\", \"instructions\": \"You are Luna, a warm Italian chef.\"}\n```"
            }] } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let env = TestEnv::new(&format!(
        "\n[gemini]\napi_key = \"test-key\"\nprompt_model = \"enhancer\"\nbase_url = \"{}\"\n",
        server.uri()
    ));
    let id = env.add_gem("chef", "cooks");

    env.cmd()
        .args(["gems", "enhance", id.as_str(), "--apply"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Chef Luna"))
        .stdout(predicate::str::contains("You are Luna, a warm Italian chef."));

    let db = Database::new(&env.db_path).await.unwrap();
    let gem = db.get_gem(&id).await.unwrap().unwrap();
    assert_eq!(gem.name, "Chef Luna");
    assert_eq!(gem.instructions, "You are Luna, a warm Italian chef.");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_enhance_without_apply_leaves_gem() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{ "content": { "parts": [{
                "text": "{\"name\": \"Better\", \"instructions\": \"Sharper persona\"}"
            }] } }]
        })))
        .mount(&server)
        .await;

    let env = TestEnv::new(&format!(
        "\n[gemini]\napi_key = \"test-key\"\nbase_url = \"{}\"\n",
        server.uri()
    ));
    let id = env.add_gem("Plain", "First draft");

    let output = env.run(&["--format", "json", "gems", "enhance", &id]);
    let enhanced: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(enhanced["name"], "Better");

    let db = Database::new(&env.db_path).await.unwrap();
    let gem = db.get_gem(&id).await.unwrap().unwrap();
    assert_eq!(gem.instructions, "First draft");
}

#[test]
fn test_enhance_requires_api_key() {
    let env = TestEnv::new("");
    let id = env.add_gem("Plain", "First draft");

    env.cmd()
        .args(["gems", "enhance", id.as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("gemini.api_key"));
}

#[tokio::test]
async fn test_edit_updates_only_given_fields() {
    let env = TestEnv::new("");
    let id = env.run(&[
        "gems",
        "add",
        "Luna",
        "--instructions",
        "Chef persona",
        "--file",
        "/uploads/luna.png",
    ]);

    env.run(&["gems", "edit", &id, "--instructions", "You are Luna, a pastry chef."]);

    let db = Database::new(&env.db_path).await.unwrap();
    let gem = db.get_gem(&id).await.unwrap().unwrap();
    assert_eq!(gem.name, "Luna");
    assert_eq!(gem.instructions, "You are Luna, a pastry chef.");
    assert_eq!(gem.files.len(), 1);
    assert_eq!(gem.files[0].uri, "/uploads/luna.png");
}

#[tokio::test]
async fn test_edit_replaces_and_clears_files() {
    let env = TestEnv::new("");
    let id = env.add_gem("Luna", "Chef persona");

    let output = env.run(&[
        "--format",
        "json",
        "gems",
        "edit",
        &id,
        "--name",
        "Chef Luna",
        "--file",
        "/uploads/kitchen.jpg",
    ]);
    let gem: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(gem["name"], "Chef Luna");
    assert_eq!(gem["files"][0]["mimeType"], "image/jpeg");

    env.run(&["gems", "edit", &id, "--clear-files"]);

    let db = Database::new(&env.db_path).await.unwrap();
    let gem = db.get_gem(&id).await.unwrap().unwrap();
    assert_eq!(gem.name, "Chef Luna");
    assert!(gem.files.is_empty());
}

#[test]
fn test_edit_rejects_empty_name_and_unknown_gem() {
    let env = TestEnv::new("");
    let id = env.add_gem("Luna", "Chef persona");

    env.cmd()
        .args(["gems", "edit", id.as_str(), "--name", " "])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("name cannot be empty"));

    env.cmd()
        .args(["gems", "edit", "ghost", "--name", "Someone"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Gem not found: ghost"));

    env.cmd()
        .args(["gems", "edit", id.as_str()])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Nothing to change"));
}

#[test]
fn test_remove_help_mentions_job_cascade() {
    let env = TestEnv::new("");

    env.cmd()
        .args(["gems", "remove", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("every job that references it"));
}
