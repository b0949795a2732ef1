//! Process spawning inside the archive root.
//!
//! The child changes its root to the mounted tree between fork and exec;
//! the caller keeps its own root so it can still tear down host-side mounts.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use pox_common::error::{PoxError, Result};
use pox_common::types::ToolStatus;

/// Everything needed to start the program inside the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Directory that becomes `/` for the child.
    pub root: PathBuf,
    /// Program path as seen from inside `root`.
    pub program: PathBuf,
    /// Arguments, excluding the program name.
    pub args: Vec<String>,
    /// Variables set on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

/// Starts a program under a new root and waits for it.
pub trait Spawner {
    /// Runs `request` to completion with the caller's standard streams.
    ///
    /// A non-zero exit is returned as a status, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`PoxError::Permission`] if the root change is denied and
    /// [`PoxError::Io`] if the program cannot be started.
    fn spawn(&self, request: &SpawnRequest) -> Result<ToolStatus>;
}

/// Spawner performing a real `chroot(2)` in the child.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChrootSpawner;

impl Spawner for ChrootSpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<ToolStatus> {
        // Allocated before fork: the pre-exec hook must not allocate.
        let root = CString::new(request.root.as_os_str().as_bytes()).map_err(|e| {
            PoxError::io(&request.root, io::Error::new(io::ErrorKind::InvalidInput, e))
        })?;

        let enter_root = move || {
            // SAFETY: runs in the forked child; chroot(2) and chdir(2) are
            // async-signal-safe and only read memory owned by this closure.
            unsafe {
                if libc::chroot(root.as_ptr()) != 0 {
                    return Err(io::Error::last_os_error());
                }
                if libc::chdir(c"/".as_ptr()) != 0 {
                    return Err(io::Error::last_os_error());
                }
            }
            Ok(())
        };

        tracing::debug!(
            root = %request.root.display(),
            program = %request.program.display(),
            args = ?request.args,
            "spawning chrooted program"
        );
        let mut cmd = Command::new(&request.program);
        // SAFETY: `enter_root` performs no allocation and touches no state
        // shared with the parent.
        let status = unsafe { cmd.pre_exec(enter_root) }
            .args(&request.args)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| spawn_error(request, e))?;
        Ok(status.into())
    }
}

fn spawn_error(request: &SpawnRequest, source: io::Error) -> PoxError {
    if source.raw_os_error() == Some(libc::EPERM) {
        PoxError::Permission {
            message: format!(
                "changing root to {} requires elevated privileges: {source}",
                request.root.display()
            ),
        }
    } else {
        PoxError::io(&request.program, source)
    }
}
