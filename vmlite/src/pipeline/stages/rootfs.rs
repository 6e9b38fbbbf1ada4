//! Stage 2: Guest rootfs.

use vmlite_shared::errors::VmliteResult;

use crate::pipeline::types::RootfsInput;
use crate::rootfs::RootfsAsset;

/// Build the initramfs unless one already exists.
///
/// **Single Responsibility**: Put a complete initramfs at the layout path.
pub async fn run(input: RootfsInput<'_>) -> VmliteResult<RootfsAsset> {
    input.builder.ensure_rootfs(input.target).await
}
