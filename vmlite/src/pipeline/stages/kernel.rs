//! Stage 1: Kernel resolution.

use vmlite_shared::errors::VmliteResult;

use crate::assets::{KernelAsset, KernelOrigin};
use crate::pipeline::types::KernelInput;

/// Reuse, download or build the guest kernel.
///
/// **Single Responsibility**: Put a bootable `vmlinux` at the layout path.
pub async fn run(input: KernelInput<'_>) -> VmliteResult<KernelAsset> {
    let asset = input.resolver.resolve(input.dest).await?;
    match &asset.origin {
        KernelOrigin::Existing => {}
        KernelOrigin::Downloaded { source } => {
            tracing::debug!(source = %source, "Kernel fetched")
        }
        KernelOrigin::Built => tracing::debug!("Kernel compiled"),
    }
    Ok(asset)
}
