//! Lifecycle controller: owns the VMM child process and drives the state
//! machine through the control API.
//!
//! All operations on one controller are serialized by an async mutex held for
//! the operation's full duration, so a pause racing a shutdown is applied in
//! request order rather than interleaved.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;
use vmlite_shared::api::{PingResponse, VmInfo};
use vmlite_shared::constants::{self, timeouts};
use vmlite_shared::errors::{VmliteError, VmliteResult};

use super::state::{VmState, VmStatus};
use crate::api::ApiClient;
use crate::util::{find_executable, is_process_alive, kill_process, remove_file_if_exists};
use crate::vmm::{LaunchSpec, VmmSettings};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Binary name looked up on PATH, or a path.
    pub vmm_binary: String,
    pub api_timeout: Duration,
    pub start_timeout: Duration,
    pub shutdown_timeout: Duration,
    /// VMM stdout/stderr are appended here; discarded when `None`.
    pub log_file: Option<PathBuf>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            vmm_binary: constants::DEFAULT_VMM_BINARY.to_string(),
            api_timeout: Duration::from_secs(timeouts::API_SECS),
            start_timeout: Duration::from_secs(timeouts::START_SECS),
            shutdown_timeout: Duration::from_secs(timeouts::SHUTDOWN_SECS),
            log_file: None,
        }
    }
}

impl ControllerOptions {
    pub fn from_settings(settings: &VmmSettings, log_file: Option<PathBuf>) -> Self {
        Self {
            vmm_binary: settings.binary.clone(),
            api_timeout: settings.api_timeout(),
            start_timeout: settings.start_timeout(),
            shutdown_timeout: settings.shutdown_timeout(),
            log_file,
        }
    }
}

struct Inner {
    state: VmState,
    child: Option<Child>,
    api: Option<ApiClient>,
}

/// Handle to a single microVM.
///
/// Cloning yields another handle to the same VM. Dropping every handle does
/// not stop the VMM.
#[derive(Clone)]
pub struct VmController {
    inner: Arc<Mutex<Inner>>,
    options: Arc<ControllerOptions>,
}

impl fmt::Debug for VmController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmController")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl VmController {
    pub fn new(options: ControllerOptions) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: VmState::new(),
                child: None,
                api: None,
            })),
            options: Arc::new(options),
        }
    }

    /// Take control of a VMM started elsewhere (e.g. by an earlier `vmlite run
    /// --detach`), syncing status from `vm.info`.
    pub async fn attach(socket: &Path, options: ControllerOptions) -> VmliteResult<Self> {
        let api = ApiClient::new(socket, options.api_timeout);
        let ping = api.ping().await?;
        let info = api.info().await?;

        let mut state = VmState::new();
        state.force_status(VmStatus::from_vmm_state(info.state));
        state.pid = ping.pid;
        tracing::debug!(
            socket = %socket.display(),
            status = %state.status,
            pid = ?state.pid,
            "Attached to running VMM"
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                state,
                child: None,
                api: Some(api),
            })),
            options: Arc::new(options),
        })
    }

    /// Current status, after noticing a VMM that exited on its own.
    pub async fn status(&self) -> VmStatus {
        let mut inner = self.inner.lock().await;
        refresh(&mut inner);
        inner.state.status
    }

    pub async fn state(&self) -> VmState {
        let mut inner = self.inner.lock().await;
        refresh(&mut inner);
        inner.state.clone()
    }

    /// Spawn the VMM described by `spec` and wait for its API socket.
    ///
    /// Legal from `Unstarted` and `Stopped`. On any failure the child is
    /// reaped and the status is left unchanged.
    pub async fn start(&self, spec: &LaunchSpec) -> VmliteResult<()> {
        let mut inner = self.inner.lock().await;
        refresh(&mut inner);

        let status = inner.state.status;
        if !status.can_start() {
            return Err(VmliteError::StateConflict(format!(
                "cannot start a VM that is {}",
                status
            )));
        }

        let binary = find_executable(&self.options.vmm_binary).ok_or_else(|| {
            VmliteError::Launch(format!(
                "VMM binary '{}' not found on PATH",
                self.options.vmm_binary
            ))
        })?;

        let socket = spec.api_socket();
        if let Some(parent) = socket.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VmliteError::Storage(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        // A socket left by a crashed VMM would make the readiness wait succeed at once.
        remove_file_if_exists(socket)?;

        let (stdout, stderr) = self.output_stdio()?;
        let mut cmd = Command::new(&binary);
        cmd.args(spec.to_args())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            // Own process group: a terminal Ctrl-C reaches vmlite, not the VMM.
            .process_group(0);

        tracing::info!(
            binary = %binary.display(),
            vcpus = spec.vcpus(),
            memory_mib = spec.memory_mib(),
            socket = %socket.display(),
            "Starting VMM"
        );

        let mut child = cmd.spawn().map_err(|e| {
            tracing::error!(binary = %binary.display(), error = %e, "Failed to spawn VMM");
            VmliteError::Launch(format!("failed to spawn {}: {}", binary.display(), e))
        })?;
        let pid = child.id();

        if let Err(e) = wait_for_socket(&mut child, socket, self.options.start_timeout).await {
            let _ = child.kill().await;
            let _ = remove_file_if_exists(socket);
            tracing::error!(error = %e, "VMM failed to come up");
            return Err(e);
        }

        inner.state.mark_running(pid)?;
        inner.child = Some(child);
        inner.api = Some(ApiClient::new(socket, self.options.api_timeout));

        tracing::info!(pid = ?pid, socket = %socket.display(), "✅ VM started");
        Ok(())
    }

    /// Read-only liveness check.
    pub async fn ping(&self) -> VmliteResult<PingResponse> {
        let mut inner = self.inner.lock().await;
        refresh(&mut inner);
        active_api(&inner)?.ping().await
    }

    /// Read-only snapshot of the VM as the VMM reports it.
    pub async fn get_info(&self) -> VmliteResult<VmInfo> {
        let mut inner = self.inner.lock().await;
        refresh(&mut inner);
        active_api(&inner)?.info().await
    }

    /// Halt the guest. Pausing a paused VM succeeds without contacting the VMM.
    pub async fn pause(&self) -> VmliteResult<()> {
        let mut inner = self.inner.lock().await;
        refresh(&mut inner);

        match inner.state.status {
            VmStatus::Paused => {
                tracing::debug!("VM already paused");
                Ok(())
            }
            VmStatus::Running => {
                active_api(&inner)?.pause().await?;
                inner.state.transition_to(VmStatus::Paused)?;
                tracing::info!("VM paused");
                Ok(())
            }
            other => Err(VmliteError::StateConflict(format!(
                "cannot pause a VM that is {}",
                other
            ))),
        }
    }

    /// Continue a paused guest. Legal only from `Paused`.
    pub async fn resume(&self) -> VmliteResult<()> {
        let mut inner = self.inner.lock().await;
        refresh(&mut inner);

        match inner.state.status {
            VmStatus::Paused => {
                active_api(&inner)?.resume().await?;
                inner.state.transition_to(VmStatus::Running)?;
                tracing::info!("VM resumed");
                Ok(())
            }
            other => Err(VmliteError::StateConflict(format!(
                "cannot resume a VM that is {}",
                other
            ))),
        }
    }

    /// Reboot the guest. The VMM process and status are unchanged.
    pub async fn reboot(&self) -> VmliteResult<()> {
        let mut inner = self.inner.lock().await;
        refresh(&mut inner);

        match inner.state.status {
            VmStatus::Running => {
                active_api(&inner)?.reboot().await?;
                tracing::info!("VM rebooting");
                Ok(())
            }
            other => Err(VmliteError::StateConflict(format!(
                "cannot reboot a VM that is {}",
                other
            ))),
        }
    }

    /// Stop the guest and the VMM.
    ///
    /// Asks the guest and then the VMM to shut down, waits for the process to
    /// exit and kills it when it does not. Already stopped is a no-op.
    pub async fn shutdown(&self) -> VmliteResult<()> {
        let mut inner = self.inner.lock().await;
        refresh(&mut inner);

        match inner.state.status {
            VmStatus::Stopped => {
                tracing::debug!("VM already stopped");
                return Ok(());
            }
            VmStatus::Running | VmStatus::Paused => {}
            other => {
                return Err(VmliteError::StateConflict(format!(
                    "cannot shut down a VM that is {}",
                    other
                )));
            }
        }

        inner.state.transition_to(VmStatus::ShuttingDown)?;
        let api = inner.api.clone();
        let timeout = self.options.shutdown_timeout;

        if let Some(api) = &api {
            if let Err(e) = api.shutdown().await {
                tracing::warn!(error = %e, "Graceful guest shutdown failed");
            }
            match api.shutdown_vmm().await {
                Ok(()) => {}
                // The VMM may already be gone after the guest shut down.
                Err(VmliteError::NotRunning(_)) => {}
                Err(e) => tracing::warn!(error = %e, "VMM shutdown request failed"),
            }
        }

        if let Some(child) = inner.child.as_mut() {
            match tokio::time::timeout(timeout, child.wait()).await {
                Ok(Ok(status)) => tracing::info!(exit_status = %status, "VMM exited"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Failed to wait for VMM"),
                Err(_) => {
                    tracing::warn!(?timeout, "VMM did not exit in time, killing");
                    if let Err(e) = child.kill().await {
                        tracing::error!(error = %e, "Failed to kill VMM");
                    }
                }
            }
        } else if let Some(api) = &api {
            wait_until_gone(api, inner.state.pid, timeout).await;
        }

        if let Some(api) = &api {
            let _ = remove_file_if_exists(api.socket());
        }
        inner.child = None;
        inner.api = None;
        inner.state.mark_stop();

        tracing::info!("✅ VM stopped");
        Ok(())
    }

    /// Resolve once the VM is no longer active.
    pub async fn wait_for_exit(&self) -> VmStatus {
        loop {
            let status = self.status().await;
            if !status.is_active() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    fn output_stdio(&self) -> VmliteResult<(Stdio, Stdio)> {
        let Some(path) = &self.options.log_file else {
            return Ok((Stdio::null(), Stdio::null()));
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VmliteError::Storage(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        let open_err =
            |e: std::io::Error| VmliteError::Storage(format!("failed to open {}: {}", path.display(), e));
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(open_err)?;
        let err_file = file.try_clone().map_err(open_err)?;
        Ok((Stdio::from(file), Stdio::from(err_file)))
    }
}

/// Notice a VMM that exited without being asked to.
fn refresh(inner: &mut Inner) {
    if let Some(child) = inner.child.as_mut() {
        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::warn!(exit_status = %status, "VMM process exited");
                if let Some(api) = &inner.api {
                    let _ = remove_file_if_exists(api.socket());
                }
                inner.child = None;
                inner.api = None;
                inner.state.mark_stop();
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to poll VMM process"),
        }
        return;
    }

    // Attached: only the pid reported by the VMM is known.
    if inner.state.status.is_active()
        && let Some(pid) = inner.state.pid
        && !is_process_alive(pid)
    {
        tracing::warn!(pid, "Attached VMM process is gone");
        inner.api = None;
        inner.state.mark_stop();
    }
}

fn active_api(inner: &Inner) -> VmliteResult<&ApiClient> {
    if !inner.state.status.is_active() {
        return Err(VmliteError::NotRunning(format!(
            "VM is {}",
            inner.state.status
        )));
    }
    inner
        .api
        .as_ref()
        .ok_or_else(|| VmliteError::NotRunning("no API socket".to_string()))
}

async fn wait_for_socket(child: &mut Child, socket: &Path, timeout: Duration) -> VmliteResult<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if socket.exists() {
            return Ok(());
        }
        match child.try_wait() {
            Ok(Some(status)) => {
                return Err(VmliteError::Launch(format!(
                    "VMM exited ({}) before creating API socket {}",
                    status,
                    socket.display()
                )));
            }
            Ok(None) => {}
            Err(e) => {
                return Err(VmliteError::Launch(format!(
                    "failed to poll VMM process: {}",
                    e
                )));
            }
        }
        if Instant::now() >= deadline {
            return Err(VmliteError::Launch(format!(
                "API socket {} did not appear within {:?}",
                socket.display(),
                timeout
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// For an attached VMM: poll until the API stops answering, killing the
/// reported pid if it outlives `timeout`.
async fn wait_until_gone(api: &ApiClient, pid: Option<u32>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        match api.ping().await {
            Err(VmliteError::NotRunning(_)) => return,
            _ if Instant::now() >= deadline => {
                tracing::warn!(?pid, ?timeout, "Attached VMM still alive, killing");
                if let Some(pid) = pid
                    && !kill_process(pid)
                {
                    tracing::error!(pid, "Failed to kill VMM");
                }
                return;
            }
            _ => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }
}
