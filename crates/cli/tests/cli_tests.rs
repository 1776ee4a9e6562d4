//! End-to-end tests of the repofetch binary.

use assert_cmd::Command;
use flate2::Compression;
use flate2::write::GzEncoder;
use predicates::prelude::*;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::process::Output;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROXY_VARIABLES: &[&str] = &[
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "NO_PROXY",
    "no_proxy",
];

fn png_tarball() -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, content) in [
        ("png-1.0/png.c", b"int png;\n".as_slice()),
        ("png-1.0/README", b"libpng\n".as_slice()),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn write_workspace(dir: &Path, content: &str) {
    std::fs::write(dir.join("WORKSPACE.toml"), content).unwrap();
}

fn repofetch(dir: &Path) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("repofetch").unwrap();
    cmd.current_dir(dir)
        .env("REPOFETCH_OUTPUT_BASE", dir.join("out"))
        .env_remove("RUST_LOG");
    for name in PROXY_VARIABLES {
        cmd.env_remove(name);
    }
    cmd
}

/// Run the binary off the async runtime so the mock server keeps serving.
async fn run(mut cmd: Command) -> Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

async fn serve_png(server: &MockServer, status: u16) -> String {
    Mock::given(method("GET"))
        .and(path("/png-1.0.tar.gz"))
        .respond_with(ResponseTemplate::new(status).set_body_bytes(png_tarball()))
        .mount(server)
        .await;
    format!("{}/png-1.0.tar.gz", server.uri())
}

#[test]
fn test_help_lists_subcommands() {
    let temp = TempDir::new().unwrap();
    repofetch(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fetch"))
        .stdout(predicate::str::contains("path"))
        .stdout(predicate::str::contains("clean"));
}

#[test]
fn test_path_prints_repository_directory() {
    let temp = TempDir::new().unwrap();
    write_workspace(
        temp.path(),
        "[[http_archive]]\nname = \"png\"\nurl = \"https://example.com/png.tar.gz\"\n",
    );

    repofetch(temp.path())
        .args(["path", "png"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            temp.path().join("out").join("external").join("png").display().to_string(),
        ));
}

#[test]
fn test_unknown_rule_is_usage_error() {
    let temp = TempDir::new().unwrap();
    write_workspace(
        temp.path(),
        "[[http_archive]]\nname = \"png\"\nurl = \"https://example.com/png.tar.gz\"\n",
    );

    repofetch(temp.path())
        .args(["path", "zlib"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("zlib"));
}

#[test]
fn test_missing_workspace_is_usage_error() {
    let temp = TempDir::new().unwrap();
    repofetch(temp.path())
        .args(["fetch", "--json"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"status\":\"error\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_then_clean() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let url = serve_png(&server, 200).await;
    let sha256 = hex::encode(Sha256::digest(png_tarball()));
    write_workspace(
        temp.path(),
        &format!(
            "[[http_archive]]\nname = \"png\"\nurl = \"{url}\"\nsha256 = \"{sha256}\"\nstrip_prefix = \"png-1.0\"\n"
        ),
    );
    let repository = temp.path().join("out").join("external").join("png");

    let mut cmd = repofetch(temp.path());
    cmd.args(["fetch", "png"]);
    let output = run(cmd).await;

    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&format!("png\t{}", repository.display())), "{stdout}");
    assert_eq!(
        std::fs::read_to_string(repository.join("png.c")).unwrap(),
        "int png;\n"
    );
    assert!(!repository.join("png-1.0.tar.gz").exists());

    // A second fetch is served from disk.
    let mut cmd = repofetch(temp.path());
    cmd.args(["fetch", "png"]);
    assert!(run(cmd).await.status.success());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    repofetch(temp.path())
        .args(["clean", "png"])
        .assert()
        .success()
        .stdout(predicate::str::contains("png"));
    assert!(!repository.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_json_reports_persistent_failure() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let url = serve_png(&server, 404).await;
    write_workspace(
        temp.path(),
        &format!("[[http_archive]]\nname = \"png\"\nurl = \"{url}\"\n"),
    );

    let mut cmd = repofetch(temp.path());
    cmd.args(["fetch", "--json"]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let last = stdout.lines().last().unwrap();
    let envelope: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(envelope["status"], "error");
    assert_eq!(envelope["error"]["failed"], 1);
    assert_eq!(envelope["error"]["repositories"][0]["status"], "failed");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_transient_failure_exits_tempfail() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let url = serve_png(&server, 503).await;
    write_workspace(
        temp.path(),
        &format!("[[http_archive]]\nname = \"png\"\nurl = \"{url}\"\n"),
    );

    let mut cmd = repofetch(temp.path());
    cmd.args(["fetch", "png"]);
    let output = run(cmd).await;

    assert_eq!(
        output.status.code(),
        Some(75),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(!temp.path().join("out/external/@png.marker").exists());
}
