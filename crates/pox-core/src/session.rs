//! Execution session: the unwind stack of one run.
//!
//! A [`Session`] owns the temporary root a program runs in and every
//! resource acquired on top of it (loop attachment, archive mount, support
//! mounts). Each acquisition goes through the session so its release is
//! registered at the same moment; [`Session::release`] pops the stack in
//! reverse order and also runs from `Drop`, so early returns tear down too.

use std::path::{Path, PathBuf};

use pox_common::constants::TEMP_PREFIX;
use pox_common::error::{PoxError, Result};
use tempfile::TempDir;

use crate::filesystem::loopdev::{LoopDevice, LoopManager};
use crate::filesystem::mount::{MountBackend, MountRequest};

/// A resource whose release is pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handle {
    /// Active mount at this target.
    Mount(PathBuf),
    /// Attached loop device.
    Loop(LoopDevice),
}

/// Per-run resource ledger with reverse-order teardown.
pub struct Session<'a> {
    root: PathBuf,
    dir: Option<TempDir>,
    handles: Vec<Handle>,
    keep_root: bool,
    mounts: &'a dyn MountBackend,
    loops: &'a dyn LoopManager,
}

impl<'a> Session<'a> {
    /// Creates a fresh root under the system temp directory.
    ///
    /// With `keep_root` the directory survives [`Session::release`].
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn open(
        keep_root: bool,
        mounts: &'a dyn MountBackend,
        loops: &'a dyn LoopManager,
    ) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir()
            .map_err(|e| PoxError::io(std::env::temp_dir(), e))?;
        let root = dir.path().to_path_buf();
        tracing::debug!(root = %root.display(), "session opened");

        Ok(Self {
            root,
            dir: Some(dir),
            handles: Vec::new(),
            keep_root,
            mounts,
            loops,
        })
    }

    /// Root directory of the tree.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pending releases, oldest first.
    #[must_use]
    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    /// Mounts `request` and registers its unmount.
    ///
    /// # Errors
    ///
    /// Returns the backend's error; nothing is registered in that case.
    pub fn mount(&mut self, request: &MountRequest) -> Result<()> {
        self.mounts.mount(request)?;
        self.handles.push(Handle::Mount(request.target.clone()));
        Ok(())
    }

    /// Attaches `backing` to a loop device and registers its detach.
    ///
    /// # Errors
    ///
    /// Returns the loop manager's error; nothing is registered in that case.
    pub fn attach_loop(&mut self, backing: &Path) -> Result<PathBuf> {
        let device = self.loops.attach(backing)?;
        let path = device.path.clone();
        self.handles.push(Handle::Loop(device));
        Ok(path)
    }

    /// Releases every handle in reverse order, then the root directory.
    ///
    /// Failures do not stop the unwind; they are logged and returned so the
    /// caller can report them without masking its own error. Calling this
    /// again is a no-op.
    ///
    /// If an unmount failed the root is left on disk: removing it
    /// recursively could reach into a still-mounted host `/dev` or `/sys`.
    pub fn release(&mut self) -> Vec<PoxError> {
        let mut failures = Vec::new();
        let mut mounted_left = false;

        while let Some(handle) = self.handles.pop() {
            let result = match &handle {
                Handle::Mount(target) => self.mounts.unmount(target),
                Handle::Loop(device) => self.loops.detach(device),
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "teardown step failed");
                mounted_left |= matches!(handle, Handle::Mount(_));
                failures.push(e);
            }
        }

        if let Some(dir) = self.dir.take() {
            if mounted_left {
                let path = dir.keep();
                tracing::warn!(root = %path.display(), "leaving root in place, a mount could not be released");
            } else if self.keep_root {
                let path = dir.keep();
                tracing::info!(root = %path.display(), "root retained");
            } else if let Err(e) = dir.close() {
                tracing::warn!(root = %self.root.display(), error = %e, "removing root failed");
                failures.push(PoxError::io(&self.root, e));
            }
        }

        failures
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
