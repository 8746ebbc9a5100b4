//! CLI-level smoke tests, driving the compiled binary end-to-end against a
//! throwaway data directory rather than exercising library internals.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn forge(data_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("forge").unwrap();
    cmd.arg("--data-dir").arg(data_dir);
    cmd
}

#[test]
fn create_and_list_loop() {
    let dir = tempdir().unwrap();

    forge(dir.path())
        .args(["loop", "create", "nightly-refactor", "/tmp/repo", "--prompt", "do the thing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created loop"));

    forge(dir.path())
        .args(["loop", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nightly-refactor"));
}

#[test]
fn profile_and_pool_round_trip() {
    let dir = tempdir().unwrap();

    forge(dir.path())
        .args(["profile", "add", "claude-cli", "shell", "echo {{prompt_path}}"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created profile"));

    forge(dir.path())
        .args(["pool", "create", "default-pool"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created pool"));

    forge(dir.path())
        .args(["pool", "add-member", "default-pool", "claude-cli"])
        .assert()
        .success()
        .stdout(predicate::str::contains("added claude-cli to default-pool"));
}

#[test]
fn queue_push_requires_a_known_kind() {
    let dir = tempdir().unwrap();
    forge(dir.path())
        .args(["queue", "push", "some-loop-id", "bogus-kind"])
        .assert()
        .failure();
}

#[test]
fn queue_push_message_enqueues() {
    let dir = tempdir().unwrap();
    forge(dir.path())
        .args(["queue", "push", "some-loop-id", "message", "hello there"])
        .assert()
        .success()
        .stdout(predicate::str::contains("enqueued"));
}
