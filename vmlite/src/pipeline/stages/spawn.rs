//! Stage 5: VMM spawn.

use vmlite_shared::errors::{VmliteError, VmliteResult};

use crate::api::ApiClient;
use crate::lifecycle::VmController;
use crate::pipeline::types::SpawnInput;
use crate::vmm::host_check::check_virtualization_support;

/// Start the VMM and hand back its controller.
///
/// **Single Responsibility**: Preflight, then process creation and readiness.
pub async fn run(input: SpawnInput<'_>) -> VmliteResult<VmController> {
    if input.require_kvm {
        let support = check_virtualization_support()?;
        tracing::debug!(reason = %support.reason, "Virtualization check passed");
    }

    // Starting would unlink the socket of a VM that is still alive.
    let socket = input.spec.api_socket();
    if socket.exists()
        && ApiClient::new(socket, input.options.api_timeout)
            .ping()
            .await
            .is_ok()
    {
        return Err(VmliteError::StateConflict(format!(
            "a VM is already running on {}",
            socket.display()
        )));
    }

    let controller = VmController::new(input.options);
    controller.start(input.spec).await?;
    Ok(controller)
}
