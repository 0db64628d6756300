//! gripper-cli 退出码测试（仿真夹爪）

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 写入测试配置（快速轮询，隔离用户配置目录）
fn test_config(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[defaults]
speed = 0.2

[sequencer]
poll_interval_ms = 1
"#,
    )
    .unwrap();
    path
}

fn cli(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("gripper-cli").unwrap();
    cmd.arg("--config").arg(config);
    cmd
}

#[test]
fn move_within_limits_succeeds() {
    let dir = TempDir::new().unwrap();
    cli(&test_config(&dir))
        .args(["--sim", "move", "--width", "0.04"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("succeeded"));
}

#[test]
fn move_outside_limits_is_rejected() {
    let dir = TempDir::new().unwrap();
    cli(&test_config(&dir))
        .args(["--sim", "move", "--width", "0.2"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("rejected"));
}

#[test]
fn excessive_force_is_rejected() {
    let dir = TempDir::new().unwrap();
    cli(&test_config(&dir))
        .args(["--sim", "grasp", "--width", "0.02", "--force", "500"])
        .assert()
        .code(3);
}

#[test]
fn grasp_object_succeeds() {
    let dir = TempDir::new().unwrap();
    cli(&test_config(&dir))
        .args([
            "--sim",
            "--sim-object",
            "0.03",
            "grasp",
            "--width",
            "0.02",
            "--force",
            "40",
        ])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("grasped true"));
}

#[test]
fn grasp_without_object_times_out() {
    let dir = TempDir::new().unwrap();
    cli(&test_config(&dir))
        .args(["--sim", "--timeout", "0.3", "grasp", "--width", "0.06"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("timed out"));
}

#[test]
fn zero_timeout_is_rejected() {
    let dir = TempDir::new().unwrap();
    cli(&test_config(&dir))
        .args(["--sim", "--timeout", "0", "open"])
        .assert()
        .code(3);
}

#[test]
fn state_prints_feedback() {
    let dir = TempDir::new().unwrap();
    cli(&test_config(&dir))
        .args(["--sim", "state"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("width:").and(predicate::str::contains("0.0800")));
}

#[test]
fn unreachable_service_is_setup_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let dir = TempDir::new().unwrap();
    cli(&test_config(&dir))
        .args(["--address", &address, "state"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Failed to connect"));
}

#[test]
fn missing_config_file_is_setup_error() {
    let dir = TempDir::new().unwrap();
    cli(&dir.path().join("absent.toml"))
        .args(["--sim", "state"])
        .assert()
        .code(4);
}

#[test]
fn config_init_then_show() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    cli(&path).args(["config", "init"]).assert().code(0);
    assert!(path.exists());

    cli(&path)
        .args(["config", "show"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("[limits]").and(predicate::str::contains("policy = \"queue\"")));

    // 已存在时需要 --force
    cli(&path).args(["config", "init"]).assert().code(4);
    cli(&path).args(["config", "init", "--force"]).assert().code(0);
}

#[test]
fn usage_errors_exit_with_setup_code() {
    Command::cargo_bin("gripper-cli")
        .unwrap()
        .args(["move"])
        .assert()
        .code(4);

    Command::cargo_bin("gripper-cli")
        .unwrap()
        .arg("--help")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("grasp"));
}

#[cfg(target_os = "linux")]
#[test]
fn default_config_dir_is_used_without_flag() {
    let dir = TempDir::new().unwrap();
    let config_dir = dir.path().join("gripper-manager");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        "[limits]\nmax_width = 0.06\n\n[sequencer]\npoll_interval_ms = 1\n",
    )
    .unwrap();

    Command::cargo_bin("gripper-cli")
        .unwrap()
        .env("XDG_CONFIG_HOME", dir.path())
        .args(["--sim", "state"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("width [0.0000, 0.0600] m"));
}
