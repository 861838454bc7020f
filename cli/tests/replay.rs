use std::path::Path;
use std::path::PathBuf;

use anyhow::Result;
use predicates::str::contains;
use pretty_assertions::assert_eq;
use serde_json::Value as JsonValue;
use serde_json::json;
use tempfile::TempDir;

fn rollcall_command() -> Result<assert_cmd::Command> {
    let mut cmd = assert_cmd::Command::cargo_bin("rollcall")?;
    for key in [
        "ROLLCALL_TOKEN",
        "ROLLCALL_GUILD_ID",
        "ROLLCALL_BULK_FETCH_THRESHOLD",
        "ROLLCALL_READY_TIMEOUT_MS",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    Ok(cmd)
}

fn member(id: &str, status: &str) -> JsonValue {
    json!({
        "user": { "id": id, "username": format!("user-{id}"), "avatar": format!("hash-{id}") },
        "status": status,
        "cached": true,
    })
}

fn write_fixture(dir: &Path, credential: Option<&str>) -> Result<PathBuf> {
    let fixture = json!({
        "id": "guild-9",
        "credential": credential,
        "members": [
            member("a", "online"),
            member("b", "idle"),
            member("c", "offline"),
            member("d", "dnd"),
        ],
    });
    let path = dir.join("fixture.json");
    std::fs::write(&path, serde_json::to_string(&fixture)?)?;
    Ok(path)
}

fn write_events(dir: &Path, lines: &[&str]) -> Result<PathBuf> {
    let path = dir.join("events.jsonl");
    std::fs::write(&path, lines.join("\n"))?;
    Ok(path)
}

fn ids(summary: &JsonValue) -> Vec<String> {
    summary["members"]
        .as_array()
        .map(|members| {
            members
                .iter()
                .filter_map(|member| member["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn replay_prints_count_independent_of_limit() -> Result<()> {
    let dir = TempDir::new()?;
    let fixture = write_fixture(dir.path(), Some("secret"))?;
    let events = write_events(
        dir.path(),
        &[
            r#"{"type":"presence_update","new":{"user":{"id":"e","username":"user-e"},"status":"online"}}"#,
            r#"{"type":"presence_update","new":{"user_id":"a","status":"offline"}}"#,
            r#"{"type":"member_remove","member":{"user":{"id":"b"}}}"#,
        ],
    )?;

    let output = rollcall_command()?
        .arg("replay")
        .arg("--fixture")
        .arg(&fixture)
        .arg("--events")
        .arg(&events)
        .args(["--limit", "1"])
        .output()?;
    assert!(output.status.success());

    let summary: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(summary["enabled"], json!(true));
    assert_eq!(summary["count"], json!(2));
    assert_eq!(ids(&summary), vec!["d".to_string()]);
    assert_eq!(summary["members"][0]["status"], json!("dnd"));
    Ok(())
}

#[test]
fn replay_without_credential_reports_disabled() -> Result<()> {
    let dir = TempDir::new()?;
    let fixture = write_fixture(dir.path(), None)?;

    let output = rollcall_command()?
        .arg("replay")
        .arg("--fixture")
        .arg(&fixture)
        .output()?;
    assert!(output.status.success());

    let summary: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(
        summary,
        json!({ "enabled": false, "count": 0, "members": [] })
    );
    Ok(())
}

#[test]
fn credential_from_environment_enables_tracking() -> Result<()> {
    let dir = TempDir::new()?;
    let fixture = write_fixture(dir.path(), None)?;

    let output = rollcall_command()?
        .env("ROLLCALL_TOKEN", "from-env")
        .arg("replay")
        .arg("--fixture")
        .arg(&fixture)
        .output()?;
    assert!(output.status.success());

    let summary: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(summary["enabled"], json!(true));
    assert_eq!(ids(&summary), vec!["a", "b", "d"]);
    Ok(())
}

#[test]
fn malformed_lines_are_skipped() -> Result<()> {
    let dir = TempDir::new()?;
    let fixture = write_fixture(dir.path(), Some("secret"))?;
    let events = write_events(
        dir.path(),
        &[
            "# comment",
            "{not json",
            "",
            r#"{"type":"presence_update","new":{"user_id":"d","status":"offline"}}"#,
        ],
    )?;

    let output = rollcall_command()?
        .arg("replay")
        .arg("--fixture")
        .arg(&fixture)
        .arg("--events")
        .arg(&events)
        .output()?;
    assert!(output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("skipping malformed event"));

    let summary: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(ids(&summary), vec!["a", "b"]);
    Ok(())
}

#[test]
fn missing_fixture_fails_with_context() -> Result<()> {
    let dir = TempDir::new()?;

    rollcall_command()?
        .arg("replay")
        .arg("--fixture")
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(contains("failed to read fixture"));
    Ok(())
}
