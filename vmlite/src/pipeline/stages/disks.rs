//! Stage 3: Disk images.

use vmlite_shared::errors::VmliteResult;

use crate::pipeline::types::DisksInput;
use crate::vmm::disk::ensure_disk;

/// Create missing sized disk images. Returns how many were created.
///
/// **Single Responsibility**: Disk files exist before planning validates them.
pub async fn run(input: DisksInput<'_>) -> VmliteResult<usize> {
    let mut created = 0;
    for disk in input.disks {
        if ensure_disk(disk)? {
            created += 1;
        }
    }
    Ok(created)
}
