//! Test doubles for vmlite: a fake VMM control API and a static HTTP server.

pub mod fake_vmm;
pub mod static_server;

pub use fake_vmm::{FakeVmm, FakeVmmHandle, serve_api};
pub use static_server::StaticServer;

use std::path::PathBuf;

/// A scratch directory with a short path.
///
/// Unix socket paths are limited to ~108 bytes, which deep build temp dirs
/// can exceed, so these live under `/tmp`.
pub fn short_tempdir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("vml")
        .tempdir_in("/tmp")
        .expect("create temp dir")
}

/// Socket path inside `dir`.
pub fn socket_in(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("api.sock")
}
