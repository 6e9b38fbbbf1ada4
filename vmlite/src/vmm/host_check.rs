//! Host preflight checks run before the VMM is launched.
//!
//! cloud-hypervisor needs KVM; failing here gives a clear diagnostic instead of
//! an opaque VMM exit later.

use std::path::Path;

use vmlite_shared::errors::{VmliteError, VmliteResult};

const KVM_DEVICE: &str = "/dev/kvm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualizationSupport {
    pub reason: String,
}

/// Verify that `/dev/kvm` exists and can be opened read-write.
///
/// # Errors
///
/// [`VmliteError::Unsupported`] with remediation hints.
pub fn check_virtualization_support() -> VmliteResult<VirtualizationSupport> {
    if !cfg!(target_os = "linux") {
        return Err(VmliteError::Unsupported(
            "cloud-hypervisor guests require a Linux host with KVM".into(),
        ));
    }
    check_kvm_device(Path::new(KVM_DEVICE))
}

fn check_kvm_device(kvm_path: &Path) -> VmliteResult<VirtualizationSupport> {
    if !kvm_path.exists() {
        let mut message = format!(
            "{} does not exist\n\n\
             Suggestions:\n\
             - Enable VT-x/AMD-V in your BIOS/UEFI settings\n\
             - Check if the kvm module is loaded: lsmod | grep kvm\n\
             - Try: sudo modprobe kvm_intel  # Intel\n\
             \x20      sudo modprobe kvm_amd    # AMD",
            kvm_path.display()
        );
        if Path::new("/proc/sys/fs/binfmt_misc/WSLInterop").exists() {
            message.push_str(
                "\n\nWSL2 detected: enable nested virtualization with \
                 'nestedVirtualization=true' in .wslconfig, then run: wsl --shutdown",
            );
        }
        return Err(VmliteError::Unsupported(message));
    }

    match std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(kvm_path)
    {
        Ok(_) => Ok(VirtualizationSupport {
            reason: "KVM is available and accessible".to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(VmliteError::Unsupported(format!(
                "{} exists but access denied\n\n\
                 Suggestions:\n\
                 - Add your user to the kvm group: sudo usermod -aG kvm $USER\n\
                 - Log out and back in for the group change to apply",
                kvm_path.display()
            )))
        }
        Err(e) => Err(VmliteError::Unsupported(format!(
            "{} exists but couldn't be opened: {}",
            kvm_path.display(),
            e
        ))),
    }
}
