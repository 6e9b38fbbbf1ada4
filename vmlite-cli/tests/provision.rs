use predicates::prelude::*;
use vmlite_test_utils::StaticServer;

mod common;

fn write_config(ctx: &common::TestContext, server: &StaticServer, kernel_path: &str) {
    let config = serde_json::json!({
        "kernel": {
            "sources": [{"url": server.url(kernel_path)}],
            "build": null,
        },
        "rootfs": {
            "busybox": {"url": server.url("/busybox")},
            "applets": ["sh", "ls"],
        },
        "vmm": {"require_kvm": false},
    });
    std::fs::write(ctx.config_path(), config.to_string()).unwrap();
}

#[test]
fn test_provision_downloads_and_writes_script() {
    let mut ctx = common::vmlite();
    let rt = common::runtime();
    let server = rt.block_on(async {
        StaticServer::start([
            ("/vmlinux", 200, b"vmlinux-bytes".to_vec()),
            ("/busybox", 200, b"#!/bin/sh\n".to_vec()),
        ])
    });
    write_config(&ctx, &server, "/vmlinux");

    ctx.cmd.args(["provision", "--vcpus", "3"]);
    ctx.cmd
        .assert()
        .success()
        .stdout(predicate::str::contains("vmlinux"))
        .stdout(predicate::str::contains("launch.sh"));

    let script = std::fs::read_to_string(ctx.path().join("launch.sh")).unwrap();
    assert!(script.contains("boot=3"));
    assert!(ctx.path().join("initramfs.cpio.gz").exists());

    // Second run reuses artifacts.
    ctx.new_cmd().arg("provision").assert().success();
    let kernel_hits = server.hits().iter().filter(|p| *p == "/vmlinux").count();
    assert_eq!(kernel_hits, 1);
}

#[test]
fn test_provision_without_sources_or_build_fails() {
    let mut ctx = common::vmlite();
    let rt = common::runtime();
    let server = rt.block_on(async {
        StaticServer::start([("/busybox", 200, b"#!/bin/sh\n".to_vec())])
    });
    write_config(&ctx, &server, "/missing/vmlinux");

    ctx.cmd.arg("provision");
    ctx.cmd
        .assert()
        .failure()
        .stderr(predicate::str::contains("asset unavailable"))
        .stderr(predicate::str::contains("404"));

    assert!(!ctx.path().join("vmlinux").exists());
    assert!(!ctx.path().join("vmlinux.part").exists());
}
