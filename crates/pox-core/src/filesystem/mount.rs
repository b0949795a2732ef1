//! Mount utilities for the chroot tree.
//!
//! The support directories a chrooted program expects (`/sys`, `/proc`,
//! `/dev`) are described by the [`CHROOT_MOUNTS`] table and mounted through
//! a [`MountBackend`], which is the only place `mount(2)` and `umount2(2)`
//! are called.

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags};
use pox_common::error::{PoxError, Result};

/// A support mount inside the chroot tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountDescriptor {
    /// Host path (or pseudo source for procfs).
    pub source: &'static str,
    /// Target relative to the tree root.
    pub target: &'static str,
    /// Filesystem type; `None` for bind mounts.
    pub fstype: Option<&'static str>,
    /// Mount flags.
    pub flags: MsFlags,
    /// Filesystem-specific data.
    pub data: Option<&'static str>,
    /// Permission of the target directory when it has to be created.
    pub mode: u32,
}

impl MountDescriptor {
    /// Target directory under `root`.
    #[must_use]
    pub fn target_in(&self, root: &Path) -> PathBuf {
        root.join(self.target)
    }

    /// The mount call for this descriptor under `root`.
    #[must_use]
    pub fn request(&self, root: &Path) -> MountRequest {
        MountRequest {
            source: PathBuf::from(self.source),
            target: self.target_in(root),
            fstype: self.fstype.map(str::to_owned),
            flags: self.flags,
            data: self.data.map(str::to_owned),
        }
    }
}

/// Support mounts, in mount order. Teardown runs in reverse.
pub const CHROOT_MOUNTS: [MountDescriptor; 3] = [
    // mount --bind /sys <root>/sys
    MountDescriptor {
        source: "/sys",
        target: "sys",
        fstype: None,
        flags: MsFlags::MS_BIND,
        data: None,
        mode: 0o555,
    },
    // mount -t proc /proc <root>/proc
    MountDescriptor {
        source: "/proc",
        target: "proc",
        fstype: Some("proc"),
        flags: MsFlags::empty(),
        data: None,
        mode: 0o555,
    },
    // mount --bind /dev <root>/dev
    MountDescriptor {
        source: "/dev",
        target: "dev",
        fstype: None,
        flags: MsFlags::MS_BIND,
        data: None,
        mode: 0o755,
    },
];

/// Arguments of one `mount(2)` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    /// Device, directory, or pseudo source.
    pub source: PathBuf,
    /// Mount point.
    pub target: PathBuf,
    /// Filesystem type; `None` for bind mounts.
    pub fstype: Option<String>,
    /// Mount flags.
    pub flags: MsFlags,
    /// Filesystem-specific data.
    pub data: Option<String>,
}

/// Performs mounts and unmounts.
pub trait MountBackend {
    /// Mounts `request.source` at `request.target`.
    ///
    /// # Errors
    ///
    /// Returns [`PoxError::Mount`] if the mount fails.
    fn mount(&self, request: &MountRequest) -> Result<()>;

    /// Unmounts `target`. A target that is no longer mounted counts as
    /// success.
    ///
    /// # Errors
    ///
    /// Returns [`PoxError::Mount`] if the unmount fails for another reason.
    fn unmount(&self, target: &Path) -> Result<()>;
}

/// Backend issuing real `mount(2)` / `umount2(2)` syscalls.
#[derive(Debug, Default, Clone, Copy)]
pub struct NixMountBackend;

impl MountBackend for NixMountBackend {
    fn mount(&self, request: &MountRequest) -> Result<()> {
        tracing::debug!(
            source = %request.source.display(),
            target = %request.target.display(),
            fstype = ?request.fstype,
            flags = ?request.flags,
            "mounting"
        );
        nix::mount::mount(
            Some(request.source.as_path()),
            request.target.as_path(),
            request.fstype.as_deref(),
            request.flags,
            request.data.as_deref(),
        )
        .map_err(|e| PoxError::Mount {
            operation: "mount",
            path: request.target.clone(),
            source: e.into(),
        })
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        match nix::mount::umount2(target, MntFlags::empty()) {
            Ok(()) => {
                tracing::debug!(target = %target.display(), "unmounted");
                Ok(())
            }
            // EINVAL: not a mount point any more. ENOENT: target is gone.
            Err(Errno::EINVAL | Errno::ENOENT) => {
                tracing::debug!(target = %target.display(), "already unmounted");
                Ok(())
            }
            Err(e) => Err(PoxError::Mount {
                operation: "unmount",
                path: target.to_path_buf(),
                source: e.into(),
            }),
        }
    }
}
