use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn bucket_sync() -> Command {
    let mut cmd = Command::cargo_bin("bucket-sync").unwrap();
    cmd.env_remove("BUCKET_SYNC_CONFIG");
    cmd
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn help_lists_commands() {
    bucket_sync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn sync_help_lists_flags() {
    bucket_sync()
        .args(["sync", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--cleanup-after-copy"));
}

#[test]
fn missing_config_fails() {
    bucket_sync()
        .args(["--config", "/nonexistent/bucket-sync.toml", "sync"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn invalid_config_fails_before_any_work() {
    let file = config_file(
        r#"
[[regions]]
id = "us-west-2"
suffix = ""

[[buckets]]
source_bucket = "src"
source_region = "us-west-2"
dest_bucket = "dest"
dest_regions = ["eu-west-1"]
"#,
    );
    bucket_sync()
        .arg("--config")
        .arg(file.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown region eu-west-1"));
}

#[test]
fn region_key_without_secret_fails() {
    let file = config_file(
        r#"
[[regions]]
id = "cn-north-1"
suffix = ".cn"
access_key = "AKIACN"
"#,
    );
    bucket_sync()
        .arg("--config")
        .arg(file.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "region cn-north-1: access key and secret key must be set together",
        ));
}

#[test]
fn watch_requires_queue_section() {
    let file = config_file("[logging]\nlevel = \"warn\"\n");
    bucket_sync()
        .arg("--config")
        .arg(file.path())
        .arg("watch")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no [queue] section configured"));
}

#[test]
fn unknown_command_is_rejected() {
    bucket_sync().arg("replicate").assert().failure();
}
