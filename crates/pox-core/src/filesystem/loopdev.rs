//! Loop-device management for mounting image archives.
//!
//! An image archive is attached read-only to a free `/dev/loopN` through the
//! kernel's loop-control interface and detached again after it has been
//! unmounted.

#![allow(unsafe_code)]

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use pox_common::error::{PoxError, Result};

/// Default loop-control node.
pub const LOOP_CONTROL: &str = "/dev/loop-control";

mod ioctl {
    const LOOP_SET_FD: u32 = 0x4C00;
    const LOOP_CLR_FD: u32 = 0x4C01;
    const LOOP_CTL_GET_FREE: u32 = 0x4C82;

    nix::ioctl_none_bad!(loop_ctl_get_free, LOOP_CTL_GET_FREE);
    nix::ioctl_write_int_bad!(loop_set_fd, LOOP_SET_FD);
    nix::ioctl_none_bad!(loop_clr_fd, LOOP_CLR_FD);
}

/// A loop device bound to a backing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopDevice {
    /// Block device node, e.g. `/dev/loop3`.
    pub path: PathBuf,
    /// File the device reads from.
    pub backing: PathBuf,
}

impl fmt::Display for LoopDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.backing.display())
    }
}

/// Attaches and detaches loop devices.
pub trait LoopManager {
    /// Binds `backing` to a free loop device, read-only.
    ///
    /// # Errors
    ///
    /// Returns [`PoxError::Io`] if the backing file cannot be opened and
    /// [`PoxError::Mount`] if no device can be allocated or bound.
    fn attach(&self, backing: &Path) -> Result<LoopDevice>;

    /// Unbinds `device`. A device that is already detached counts as
    /// success.
    ///
    /// # Errors
    ///
    /// Returns [`PoxError::Mount`] if the kernel refuses the detach.
    fn detach(&self, device: &LoopDevice) -> Result<()>;
}

/// Loop manager driving the kernel ioctls directly.
#[derive(Debug, Clone)]
pub struct KernelLoopManager {
    control: PathBuf,
}

impl KernelLoopManager {
    /// Uses the system's `/dev/loop-control`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            control: PathBuf::from(LOOP_CONTROL),
        }
    }

    fn free_device(&self) -> Result<PathBuf> {
        let control = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.control)
            .map_err(|e| loop_error("open", &self.control, e))?;
        // SAFETY: `control` is an open descriptor for the whole call and the
        // request takes no argument.
        let index = unsafe { ioctl::loop_ctl_get_free(control.as_raw_fd()) }
            .map_err(|e| loop_error("allocate loop device via", &self.control, e.into()))?;
        Ok(PathBuf::from(format!("/dev/loop{index}")))
    }
}

impl Default for KernelLoopManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopManager for KernelLoopManager {
    fn attach(&self, backing: &Path) -> Result<LoopDevice> {
        let file = File::open(backing).map_err(|e| PoxError::io(backing, e))?;
        let path = self.free_device()?;

        // Opening the device without write access makes the binding
        // read-only.
        let device = File::open(&path).map_err(|e| loop_error("open", &path, e))?;
        // SAFETY: both descriptors stay open for the duration of the call;
        // the kernel takes its own reference to the backing file.
        unsafe { ioctl::loop_set_fd(device.as_raw_fd(), file.as_raw_fd()) }
            .map_err(|e| loop_error("attach", &path, e.into()))?;

        tracing::info!(device = %path.display(), backing = %backing.display(), "loop device attached");
        Ok(LoopDevice {
            path,
            backing: backing.to_path_buf(),
        })
    }

    fn detach(&self, device: &LoopDevice) -> Result<()> {
        let node = match File::open(&device.path) {
            Ok(node) => node,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(device = %device.path.display(), "loop device node gone");
                return Ok(());
            }
            Err(e) => return Err(loop_error("open", &device.path, e)),
        };

        // SAFETY: `node` is an open descriptor for the whole call and the
        // request takes no argument.
        match unsafe { ioctl::loop_clr_fd(node.as_raw_fd()) } {
            Ok(_) => {
                tracing::info!(device = %device, "loop device detached");
                Ok(())
            }
            Err(Errno::ENXIO) => {
                tracing::debug!(device = %device, "loop device already detached");
                Ok(())
            }
            Err(e) => Err(loop_error("detach", &device.path, e.into())),
        }
    }
}

fn loop_error(operation: &'static str, path: &Path, source: io::Error) -> PoxError {
    PoxError::Mount {
        operation,
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_missing_backing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = KernelLoopManager::new()
            .attach(&dir.path().join("missing.tcz"))
            .expect_err("missing archive");
        assert!(matches!(err, PoxError::Io { .. }));
    }

    #[test]
    fn detaching_a_vanished_device_is_tolerated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let device = LoopDevice {
            path: dir.path().join("loop99"),
            backing: PathBuf::from("/tmp/pox.tcz"),
        };
        KernelLoopManager::new()
            .detach(&device)
            .expect("missing node counts as detached");
    }

    #[test]
    fn loop_device_display_names_backing_file() {
        let device = LoopDevice {
            path: PathBuf::from("/dev/loop3"),
            backing: PathBuf::from("/tmp/pox.tcz"),
        };
        assert_eq!(device.to_string(), "/dev/loop3 (/tmp/pox.tcz)");
    }
}
