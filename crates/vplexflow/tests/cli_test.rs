use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

/// The binary run from `dir`, isolated from any settings file and `VPLEX_*` variable
fn vplexflow(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("vplexflow").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env("NO_COLOR", "1")
        .env_remove("VPLEXFLOW_CONFIG")
        .env_remove("VPLEX_HOST")
        .env_remove("VPLEX_USER")
        .env_remove("VPLEX_PASSWORD")
        .env_remove("VPLEX_VERIFY_CERT")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let temp_dir = tempfile::tempdir().unwrap();
    vplexflow(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("teardown"))
        .stdout(predicate::str::contains("gather-facts"));
}

#[test]
fn test_version() {
    let temp_dir = tempfile::tempdir().unwrap();
    vplexflow(temp_dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("vplexflow "));
}

#[test]
fn test_verify_cert_flag_overrides_settings_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        temp_dir.path().join("vplexflow.yaml"),
        "connection:\n  verify_cert: true\n",
    )
    .unwrap();
    let connection = [
        "--host",
        "127.0.0.1",
        "--port",
        "1",
        "--user",
        "service",
        "--password",
        "secret",
        "--timeout",
        "1",
    ];

    vplexflow(temp_dir.path())
        .arg("gather-facts")
        .args(connection)
        .assert()
        .failure()
        .stderr(predicate::str::contains("ssl_ca_cert"));

    // verification is off, so the run gets as far as the refused connection
    vplexflow(temp_dir.path())
        .args(["gather-facts", "--verify-cert", "false"])
        .args(connection)
        .assert()
        .failure()
        .stderr(predicate::str::contains("ssl_ca_cert").not());
}

#[test]
fn test_provision_help_shows_volume_flag() {
    let temp_dir = tempfile::tempdir().unwrap();
    vplexflow(temp_dir.path())
        .args(["provision", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--storage-volume"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_provision_dry_run_needs_no_server() {
    let temp_dir = tempfile::tempdir().unwrap();
    vplexflow(temp_dir.path())
        .args([
            "provision",
            "--cluster",
            "cluster-1",
            "--storage-volume",
            "sv_1",
            "--storage-volume",
            "sv_2",
            "--storage-view",
            "esx_view",
            "--port",
            "P000000003CA00147-A0-FC00",
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Provision plan"))
        .stdout(predicate::str::contains("2 to claim"))
        .stdout(predicate::str::contains("to create"))
        .stdout(predicate::str::contains("Dry run"));
}

#[test]
fn test_provision_cluster_from_settings_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        temp_dir.path().join("vplexflow.yaml"),
        "clusters:\n  source: cluster-1\n",
    )
    .unwrap();

    vplexflow(temp_dir.path())
        .args([
            "provision",
            "--storage-volume",
            "sv_1",
            "--storage-view",
            "esx_view",
            "--port",
            "P000000003CA00147-A0-FC00",
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 to claim"));
}

#[test]
fn test_provision_without_cluster_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    vplexflow(temp_dir.path())
        .args([
            "provision",
            "--storage-volume",
            "sv_1",
            "--storage-view",
            "esx_view",
            "--port",
            "P000000003CA00147-A0-FC00",
            "--dry-run",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no cluster given"));
}

#[test]
fn test_invalid_stripe_depth_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    vplexflow(temp_dir.path())
        .args([
            "provision",
            "--cluster",
            "cluster-1",
            "--storage-volume",
            "sv_1",
            "--storage-view",
            "esx_view",
            "--port",
            "P000000003CA00147-A0-FC00",
            "--stripe-depth",
            "3KB",
            "--dry-run",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported stripe depth"));
}

#[test]
fn test_unsupported_filter_operator_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    vplexflow(temp_dir.path())
        .args(["gather-facts", "--filter", "capacity:bigger:1GB"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not supported"));
}

#[test]
fn test_teardown_without_host_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    vplexflow(temp_dir.path())
        .args([
            "teardown",
            "--cluster",
            "cluster-1",
            "--storage-view",
            "esx_view",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no management server given"));
}
