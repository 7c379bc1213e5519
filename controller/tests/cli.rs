use assert_cmd::Command;
use predicates::prelude::*;

fn controller() -> Command {
    let mut cmd = Command::cargo_bin("image-clone-controller").unwrap();
    for var in &[
        "REPO_URL",
        "DOCKER_CONFIG",
        "NAMESPACES_TO_SKIP",
        "DELAY_PERIOD",
        "IS_DEV_ENV",
        "KUBECONFIG",
        "EPHEMERAL_MIN_VERSION",
        "REQUEST_TIMEOUT",
        "CONNECT_TIMEOUT",
        "INSECURE_REGISTRIES",
        "METRICS_ADDR",
        "LOG_LEVEL",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_settings() {
    controller()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--repo-url"))
        .stdout(predicate::str::contains("REPO_URL"))
        .stdout(predicate::str::contains("DELAY_PERIOD"));
}

#[test]
fn required_settings() {
    controller()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--repo-url"));
}

#[test]
fn delay_period_must_be_positive() {
    controller()
        .args(["--repo-url", "docker.io/kube456", "--docker-config", "/nonexistent"])
        .env("DELAY_PERIOD", "0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("delay-period"));
}

#[test]
fn bad_cache_root_stops_startup() {
    let dir = tempfile::tempdir().unwrap();
    controller()
        .arg("--repo-url")
        .arg("Not A Registry")
        .arg("--docker-config")
        .arg(dir.path())
        .env("LOG_LEVEL", "error")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("is not a valid image repository prefix"));
}
