use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// The binary, run from an empty directory so no local homeflow.toml is picked up.
fn homeflow(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("homeflow").expect("binary built");
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env_remove("HOMEFLOW_PARALLEL_LIMIT")
        .env_remove("HOMEFLOW_NOTIFY_WEBHOOK_URL")
        .env_remove("HOMEFLOW_CONSOLE_OUTPUT");
    cmd
}

#[test]
fn list_shows_every_job_with_its_schedule() {
    let dir = TempDir::new().expect("temp dir");
    homeflow(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("blog-tweeter"))
        .stdout(predicate::str::contains("git-push"))
        .stdout(predicate::str::contains("0 21 * * 5"))
        .stdout(predicate::str::contains("liked-tweets"))
        .stdout(predicate::str::contains("manual"));
}

#[test]
fn list_reflects_configured_overrides() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(
        dir.path().join("homeflow.toml"),
        "[jobs.price-watcher]\nschedule = \"15 9 * * 1\"\n",
    )
    .expect("write config");
    homeflow(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("15 9 * * 1"));
}

#[test]
fn next_prints_the_requested_number_of_ticks() {
    let dir = TempDir::new().expect("temp dir");
    let output = homeflow(&dir)
        .args(["next", "0 21 * * 5", "--count", "2"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        let tick = chrono::DateTime::parse_from_rfc3339(line).expect("rfc3339");
        assert_eq!(tick.format("%H:%M").to_string(), "21:00");
    }
}

#[test]
fn next_rejects_a_malformed_expression() {
    let dir = TempDir::new().expect("temp dir");
    homeflow(&dir)
        .args(["next", "every friday"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("FLOW-SCHED-001"));
}

#[test]
fn explain_describes_the_flow() {
    let dir = TempDir::new().expect("temp dir");
    homeflow(&dir)
        .args(["explain", "price-watcher"])
        .assert()
        .success()
        .stdout(predicate::str::contains("get_price"))
        .stdout(predicate::str::contains("send_email"));
}

#[test]
fn explain_renders_dot_and_json() {
    let dir = TempDir::new().expect("temp dir");
    homeflow(&dir)
        .args(["explain", "stock-summary", "--format", "dot"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph"))
        .stdout(predicate::str::contains("flatten_prices"));

    let output = homeflow(&dir)
        .args(["explain", "liked-tweets", "--format", "json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(json["flow"], "liked-tweets");
}

#[test]
fn unknown_job_is_a_usage_error() {
    let dir = TempDir::new().expect("temp dir");
    homeflow(&dir)
        .args(["run", "laundry"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown job 'laundry'"));
}

#[test]
fn missing_parameters_exit_with_code_two() {
    let dir = TempDir::new().expect("temp dir");
    homeflow(&dir)
        .args(["run", "price-watcher", "-p", "email=me@example.com"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("FLOW-PARAM-001"))
        .stderr(predicate::str::contains("price_point, url"));
}

#[test]
fn malformed_config_exits_with_code_two() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("homeflow.toml"), "[runner\n").expect("write config");
    homeflow(&dir)
        .arg("list")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("loading configuration"));
}

#[test]
fn serve_without_a_schedule_is_refused() {
    let dir = TempDir::new().expect("temp dir");
    homeflow(&dir)
        .args(["serve", "price-watcher"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("has no schedule"));
}

#[test]
fn failed_task_exits_with_code_one() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(
        dir.path().join("homeflow.toml"),
        "[jobs.git-push]\nbase_path = \"/nonexistent/homeflow\"\nrepos = [\"site\"]\n",
    )
    .expect("write config");
    homeflow(&dir)
        .args(["run", "git-push"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("git-push"))
        .stdout(predicate::str::contains("failed"))
        .stdout(predicate::str::contains("commit_and_push"));
}

#[tokio::test(flavor = "multi_thread")]
async fn price_watcher_runs_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<span class="price value" content="42.00">$42</span>"#),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let url = format!("url={}/item", server.uri());
    let output = homeflow(&dir)
        .args([
            "run",
            "price-watcher",
            "-p",
            "email=me@example.com",
            "-p",
            "price_point=50",
            "-p",
            url.as_str(),
            "--json",
        ])
        .output()
        .expect("run");

    assert_eq!(output.status.code(), Some(0));
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json result");
    assert_eq!(result["flow"], "price-watcher");
    assert_eq!(result["tasks"]["get_price"]["output"], 42.0);
    assert_eq!(result["tasks"]["send_email"]["state"], "success");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("notifications are only logged"),
        "stderr: {}",
        stderr
    );
}
