//! In-process stand-in for the cloud-hypervisor control API.
//!
//! Serves the same endpoints over a Unix socket and keeps a tiny guest state
//! machine so lifecycle tests can observe transitions without KVM.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use hyperlocal::UnixServerExt;
use serde_json::json;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use vmlite_shared::api::{VmmState, endpoints};

#[derive(Debug)]
struct FakeState {
    vm: VmmState,
    hang: bool,
    pid: Option<u32>,
    boot_vcpus: u8,
    memory_bytes: u64,
    requests: Vec<String>,
}

/// Shared view of a fake VMM's state, usable while it serves.
#[derive(Clone)]
pub struct FakeVmmHandle {
    state: Arc<Mutex<FakeState>>,
    stop: Arc<Notify>,
}

impl FakeVmmHandle {
    /// A VMM whose guest is already running. `pid` is what `vmm.ping`
    /// reports; leave it `None` for in-process servers so nothing ever
    /// signals the test process.
    pub fn new(pid: Option<u32>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                vm: VmmState::Running,
                hang: false,
                pid,
                boot_vcpus: 2,
                memory_bytes: 256 << 20,
                requests: Vec::new(),
            })),
            stop: Arc::new(Notify::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake vmm state poisoned")
    }

    /// Accept requests but never answer them.
    pub fn set_hang(&self, hang: bool) {
        self.lock().hang = hang;
    }

    pub fn vm_state(&self) -> VmmState {
        self.lock().vm
    }

    pub fn set_vm_state(&self, vm: VmmState) {
        self.lock().vm = vm;
    }

    pub fn set_resources(&self, boot_vcpus: u8, memory_mib: u64) {
        let mut state = self.lock();
        state.boot_vcpus = boot_vcpus;
        state.memory_bytes = memory_mib << 20;
    }

    /// Every request seen so far, as `"METHOD /path"`.
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    /// Count of requests to `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.ends_with(path))
            .count()
    }

    /// Stop serving, as `vmm.shutdown` does.
    pub fn stop(&self) {
        self.stop.notify_one();
    }
}

/// Serve the control API on `socket` until `vmm.shutdown` or
/// [`FakeVmmHandle::stop`], then remove the socket.
pub async fn serve_api(socket: PathBuf, handle: FakeVmmHandle) -> std::io::Result<()> {
    let _ = std::fs::remove_file(&socket);

    let service_handle = handle.clone();
    let make_svc = make_service_fn(move |_| {
        let handle = service_handle.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| respond(handle.clone(), req)))
        }
    });

    let stop = handle.stop.clone();
    let result = Server::bind_unix(&socket)?
        .serve(make_svc)
        .with_graceful_shutdown(async move { stop.notified().await })
        .await;

    let _ = std::fs::remove_file(&socket);
    result.map_err(std::io::Error::other)
}

async fn respond(handle: FakeVmmHandle, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let hang = {
        let mut state = handle.lock();
        state.requests.push(format!("{} {}", method, path));
        state.hang
    };
    if hang {
        std::future::pending::<()>().await;
    }

    Ok(route(&handle, &method, &path))
}

fn route(handle: &FakeVmmHandle, method: &Method, path: &str) -> Response<Body> {
    let mut state = handle.lock();
    match (method, path) {
        (&Method::GET, endpoints::VMM_PING) => json_response(json!({
            "build_version": "fake",
            "version": "fake-vmm",
            "pid": state.pid,
            "features": [],
        })),
        (&Method::GET, endpoints::VM_INFO) => json_response(json!({
            "state": state.vm,
            "config": {
                "cpus": {"boot_vcpus": state.boot_vcpus, "max_vcpus": state.boot_vcpus},
                "memory": {"size": state.memory_bytes},
            },
        })),
        (&Method::PUT, endpoints::VM_PAUSE) => match state.vm {
            VmmState::Running => {
                state.vm = VmmState::Paused;
                no_content()
            }
            _ => error_response("VM is not running"),
        },
        (&Method::PUT, endpoints::VM_RESUME) => match state.vm {
            VmmState::Paused => {
                state.vm = VmmState::Running;
                no_content()
            }
            _ => error_response("VM is not paused"),
        },
        (&Method::PUT, endpoints::VM_REBOOT) => match state.vm {
            VmmState::Running => no_content(),
            _ => error_response("VM is not running"),
        },
        (&Method::PUT, endpoints::VM_SHUTDOWN) => match state.vm {
            VmmState::Running | VmmState::Paused => {
                state.vm = VmmState::Shutdown;
                no_content()
            }
            _ => error_response("VM is not booted"),
        },
        (&Method::PUT, endpoints::VMM_SHUTDOWN) => {
            handle.stop.notify_one();
            no_content()
        }
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap_or_default(),
    }
}

fn json_response(value: serde_json::Value) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        .body(Body::from(value.to_string()))
        .unwrap_or_default()
}

fn no_content() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Body::empty())
        .unwrap_or_default()
}

fn error_response(message: &str) -> Response<Body> {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(Body::from(message.to_string()))
        .unwrap_or_default()
}

/// A fake VMM served from a background task of the current runtime.
///
/// Dropping it aborts the server and removes the socket.
pub struct FakeVmm {
    socket: PathBuf,
    handle: FakeVmmHandle,
    task: JoinHandle<std::io::Result<()>>,
}

impl FakeVmm {
    /// Start serving on `socket` and wait until it is bound.
    pub async fn spawn(socket: impl Into<PathBuf>) -> Self {
        let socket = socket.into();
        let handle = FakeVmmHandle::new(None);
        let task = tokio::spawn(serve_api(socket.clone(), handle.clone()));

        for _ in 0..200 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(socket.exists(), "fake vmm never bound {}", socket.display());

        Self {
            socket,
            handle,
            task,
        }
    }

    pub fn handle(&self) -> &FakeVmmHandle {
        &self.handle
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Whether the server task is still running.
    pub fn is_serving(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for FakeVmm {
    fn drop(&mut self) {
        self.task.abort();
        let _ = std::fs::remove_file(&self.socket);
    }
}
