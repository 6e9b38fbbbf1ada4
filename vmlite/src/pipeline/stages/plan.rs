//! Stage 4: Launch planning.

use vmlite_shared::errors::{VmliteError, VmliteResult};

use crate::pipeline::types::PlanInput;
use crate::util::set_mode;
use crate::vmm::{LaunchSpec, build_launch_spec};

/// Build the launch spec and write the launch script next to the artifacts.
///
/// **Single Responsibility**: Turn assets and overrides into a `LaunchSpec`.
pub async fn run(input: PlanInput<'_>) -> VmliteResult<LaunchSpec> {
    let spec = build_launch_spec(input.kernel, input.rootfs, input.overrides, input.api_socket)?;

    let script = spec.render_script(input.vmm_binary);
    std::fs::write(input.script_path, script).map_err(|e| {
        VmliteError::Storage(format!(
            "failed to write {}: {}",
            input.script_path.display(),
            e
        ))
    })?;
    set_mode(input.script_path, 0o755)?;

    tracing::info!(script = %input.script_path.display(), "Launch script written");
    Ok(spec)
}
