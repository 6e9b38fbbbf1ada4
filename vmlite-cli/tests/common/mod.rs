#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct TestContext {
    pub cmd: Command,
    pub workdir: tempfile::TempDir,
}

impl TestContext {
    /// Another `vmlite` invocation against the same working directory.
    pub fn new_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_vmlite");
        let mut cmd = Command::new(bin_path);
        cmd.timeout(Duration::from_secs(60));
        cmd.env_remove("VMLITE_HOME");
        cmd.arg("--workdir").arg(self.workdir.path());
        cmd
    }

    pub fn path(&self) -> &Path {
        self.workdir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.workdir.path().join("vmlite.json")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.workdir.path().join("sockets").join("api.sock")
    }
}

/// A fresh working directory per test, short enough for Unix socket paths.
pub fn vmlite() -> TestContext {
    let workdir = vmlite_test_utils::short_tempdir();

    let bin_path: &str = env!("CARGO_BIN_EXE_vmlite");
    let mut cmd = Command::new(bin_path);
    // You can override this with .timeout(Duration::from_secs(N))
    cmd.timeout(Duration::from_secs(60));
    cmd.env_remove("VMLITE_HOME");
    cmd.arg("--workdir").arg(workdir.path());

    TestContext { cmd, workdir }
}

/// Multi-threaded runtime for test doubles that serve while a command runs.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("build runtime")
}
