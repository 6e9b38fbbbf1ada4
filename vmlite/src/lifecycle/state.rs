//! VM lifecycle status and state machine.
//!
//! ```text
//! start()     Unstarted/Stopped → Running
//! pause()     Running → Paused
//! resume()    Paused → Running
//! shutdown()  Running/Paused → ShuttingDown → Stopped
//! (exit)      Running/Paused → Stopped
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vmlite_shared::api::VmmState;
use vmlite_shared::errors::{VmliteError, VmliteResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VmStatus {
    /// No VMM process has been started by this controller.
    Unstarted,

    /// VMM is up and the guest is executing.
    Running,

    /// Guest vCPUs are halted; memory is kept.
    Paused,

    /// Shutdown requested, waiting for the VMM to exit (transient).
    ShuttingDown,

    /// VMM process has exited. The VM can be started again.
    Stopped,
}

impl VmStatus {
    /// A VMM process exists and answers on its API socket.
    pub fn is_active(&self) -> bool {
        matches!(self, VmStatus::Running | VmStatus::Paused)
    }

    pub fn can_start(&self) -> bool {
        matches!(self, VmStatus::Unstarted | VmStatus::Stopped)
    }

    pub fn can_transition_to(&self, target: VmStatus) -> bool {
        use VmStatus::*;
        matches!(
            (self, target),
            (Unstarted, Running) |
            // Pause/resume, graceful shutdown, or process exit
            (Running, Paused) |
            (Running, ShuttingDown) |
            (Running, Stopped) |
            (Paused, Running) |
            (Paused, ShuttingDown) |
            (Paused, Stopped) |
            (ShuttingDown, Stopped) |
            // Relaunch
            (Stopped, Running)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VmStatus::Unstarted => "unstarted",
            VmStatus::Running => "running",
            VmStatus::Paused => "paused",
            VmStatus::ShuttingDown => "shutting-down",
            VmStatus::Stopped => "stopped",
        }
    }

    /// Map the VMM's own report onto a lifecycle status.
    pub fn from_vmm_state(state: VmmState) -> Self {
        match state {
            VmmState::Paused => VmStatus::Paused,
            VmmState::Shutdown => VmStatus::Stopped,
            // A created-but-not-booted VM still owns a live VMM process.
            VmmState::Created | VmmState::Running | VmmState::Unknown => VmStatus::Running,
        }
    }
}

impl std::str::FromStr for VmStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unstarted" => Ok(VmStatus::Unstarted),
            "running" => Ok(VmStatus::Running),
            "paused" => Ok(VmStatus::Paused),
            "shutting-down" => Ok(VmStatus::ShuttingDown),
            "stopped" => Ok(VmStatus::Stopped),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for VmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Dynamic VM state, validated on every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmState {
    pub status: VmStatus,
    pub pid: Option<u32>,
    pub last_updated: DateTime<Utc>,
}

impl VmState {
    pub fn new() -> Self {
        Self {
            status: VmStatus::Unstarted,
            pid: None,
            last_updated: Utc::now(),
        }
    }

    /// Move to `new_status`, or fail with [`VmliteError::StateConflict`]
    /// leaving the state untouched.
    pub fn transition_to(&mut self, new_status: VmStatus) -> VmliteResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(VmliteError::StateConflict(format!(
                "cannot transition from {} to {}",
                self.status, new_status
            )));
        }
        self.status = new_status;
        self.last_updated = Utc::now();
        Ok(())
    }

    /// Record a freshly spawned (or attached) VMM.
    pub fn mark_running(&mut self, pid: Option<u32>) -> VmliteResult<()> {
        self.transition_to(VmStatus::Running)?;
        self.pid = pid;
        Ok(())
    }

    /// Set status without validation, for syncing with an already-running VMM.
    pub fn force_status(&mut self, status: VmStatus) {
        self.status = status;
        self.last_updated = Utc::now();
    }

    /// The VMM process is gone, for whatever reason.
    pub fn mark_stop(&mut self) {
        self.status = VmStatus::Stopped;
        self.pid = None;
        self.last_updated = Utc::now();
    }
}

impl Default for VmState {
    fn default() -> Self {
        Self::new()
    }
}
