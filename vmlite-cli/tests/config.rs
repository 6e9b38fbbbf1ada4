use predicates::prelude::*;

mod common;

#[test]
fn test_config_init_writes_defaults() {
    let mut ctx = common::vmlite();
    ctx.cmd.args(["config", "init"]);
    ctx.cmd
        .assert()
        .success()
        .stdout(predicate::str::contains("vmlite.json"));

    let content = std::fs::read_to_string(ctx.config_path()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(json["vmm"]["binary"], "cloud-hypervisor");
    assert!(json["kernel"]["sources"].as_array().unwrap().len() >= 1);
}

#[test]
fn test_config_init_refuses_overwrite() {
    let mut ctx = common::vmlite();
    ctx.cmd.args(["config", "init"]);
    ctx.cmd.assert().success();

    ctx.new_cmd()
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    ctx.new_cmd()
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_config_show_without_file_prints_defaults() {
    let mut ctx = common::vmlite();
    ctx.cmd.args(["config", "show"]);
    ctx.cmd
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kernel\""))
        .stdout(predicate::str::contains("\"require_kvm\": true"));
}

#[test]
fn test_config_set_updates_vm_section() {
    let mut ctx = common::vmlite();
    ctx.cmd
        .args(["config", "set", "--vcpus", "4", "--memory", "1024", "--serial", "off"]);
    ctx.cmd.assert().success();

    ctx.new_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"vcpus\": 4"))
        .stdout(predicate::str::contains("\"memory_mib\": 1024"))
        .stdout(predicate::str::contains("\"serial\": \"off\""));

    // Later updates keep earlier fields.
    ctx.new_cmd()
        .args(["config", "set", "--vcpus", "2"])
        .assert()
        .success();
    ctx.new_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"vcpus\": 2"))
        .stdout(predicate::str::contains("\"memory_mib\": 1024"));
}

#[test]
fn test_config_set_rejects_bad_console_mode() {
    let mut ctx = common::vmlite();
    ctx.cmd.args(["config", "set", "--console", "serial-port"]);
    ctx.cmd
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid console mode"));
}

#[test]
fn test_invalid_config_file_is_reported() {
    let mut ctx = common::vmlite();
    std::fs::write(ctx.config_path(), "{ not json").unwrap();
    ctx.cmd.args(["config", "show"]);
    ctx.cmd
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config"));
}
