//! Running a program inside a mounted archive tree.

use std::fs::{self, DirBuilder, Permissions};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use pox_common::constants::{CHILD_PWD, PROGRAM_DIR};
use pox_common::error::{PoxError, Result};
use pox_common::types::ToolStatus;
use pox_core::filesystem::mount::CHROOT_MOUNTS;
use pox_core::session::Session;

use crate::process::{SpawnRequest, Spawner};

/// Program path as looked up inside the new root.
///
/// A bare name refers to `/bin/<name>`; anything containing a `/` is used
/// unchanged.
#[must_use]
pub fn normalize_program(program: &str) -> PathBuf {
    if program.contains('/') {
        PathBuf::from(program)
    } else {
        Path::new(PROGRAM_DIR).join(program)
    }
}

/// Mounts the support filesystems into the session root, then runs
/// `program` chrooted there and waits for it.
///
/// Each support mount is registered with `session` as soon as it succeeds,
/// so releasing the session unmounts them in reverse order. A non-zero exit
/// of the program is logged and returned, not treated as an error.
///
/// # Errors
///
/// Returns [`PoxError::Io`] if a mount point cannot be created,
/// [`PoxError::Mount`] if a support mount fails, and whatever the spawner
/// reports (notably [`PoxError::Permission`]).
pub fn run_isolated(
    session: &mut Session<'_>,
    spawner: &dyn Spawner,
    program: &str,
    args: &[String],
) -> Result<ToolStatus> {
    let root = session.root().to_path_buf();

    for mount in &CHROOT_MOUNTS {
        let target = mount.target_in(&root);
        ensure_dir(&target, mount.mode)?;
        session.mount(&mount.request(&root))?;
    }

    let request = SpawnRequest {
        root,
        program: normalize_program(program),
        args: args.to_vec(),
        env: vec![("PWD".to_owned(), CHILD_PWD.to_owned())],
    };
    let status = spawner.spawn(&request)?;

    if status.success() {
        tracing::info!(program = %request.program.display(), "program finished");
    } else {
        tracing::debug!(program = %request.program.display(), %status, "program exited unsuccessfully");
    }
    Ok(status)
}

// Archive trees already carry the mount points; a squashfs root is
// read-only, so only missing directories are created.
fn ensure_dir(target: &Path, mode: u32) -> Result<()> {
    if target.is_dir() {
        return Ok(());
    }
    DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(target)
        .map_err(|e| PoxError::io(target, e))?;
    fs::set_permissions(target, Permissions::from_mode(mode)).map_err(|e| PoxError::io(target, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_program_name_is_looked_up_in_bin() {
        assert_eq!(normalize_program("ls"), PathBuf::from("/bin/ls"));
    }

    #[test]
    fn program_with_separator_is_unchanged() {
        assert_eq!(normalize_program("/usr/bin/env"), PathBuf::from("/usr/bin/env"));
        assert_eq!(normalize_program("./tool"), PathBuf::from("./tool"));
        assert_eq!(normalize_program("bin/tool"), PathBuf::from("bin/tool"));
    }

    #[test]
    fn missing_mount_point_is_created_with_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("proc");
        ensure_dir(&target, 0o555).expect("create");
        let mode = fs::metadata(&target).expect("stat").permissions().mode() & 0o777;
        assert_eq!(mode, 0o555);
    }

    #[test]
    fn existing_mount_point_is_left_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("dev");
        fs::create_dir(&target).expect("mkdir");
        fs::set_permissions(&target, Permissions::from_mode(0o700)).expect("chmod");

        ensure_dir(&target, 0o755).expect("exists");
        let mode = fs::metadata(&target).expect("stat").permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }
}
