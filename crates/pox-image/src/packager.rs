//! Archive packaging.
//!
//! Encodes a staging tree into a single archive file with an external tool
//! that runs from inside the tree, so every member path is relative to the
//! tree root.

use std::fs;
use std::io;
use std::path::Path;

use pox_common::constants::{MKSQUASHFS, ZIP};
use pox_common::error::{PoxError, Result};
use pox_common::types::{Encoding, ToolStatus};
use pox_core::command::{CommandRunner, Invocation};

/// Builds the packaging command for `encoding`.
///
/// `archive` must be absolute: the tool runs with `staging_root` as its
/// working directory.
#[must_use]
pub fn packaging_invocation(staging_root: &Path, archive: &Path, encoding: Encoding) -> Invocation {
    let invocation = match encoding {
        Encoding::Image => Invocation::new(MKSQUASHFS)
            .arg(".")
            .arg(archive)
            .arg("-noappend"),
        Encoding::Zip => Invocation::new(ZIP).arg("-r").arg(archive).arg("."),
    };
    invocation.current_dir(staging_root)
}

/// Writes the tree at `staging_root` to `archive`, replacing any existing
/// file there.
///
/// # Errors
///
/// Returns [`PoxError::Io`] if an existing archive cannot be removed, and
/// [`PoxError::Packaging`] if the tool cannot be started or exits non-zero.
pub fn package(
    runner: &dyn CommandRunner,
    staging_root: &Path,
    archive: &Path,
    encoding: Encoding,
) -> Result<()> {
    remove_archive(archive)?;

    let invocation = packaging_invocation(staging_root, archive, encoding);
    let output = runner.run(&invocation).map_err(|e| PoxError::Packaging {
        command: invocation.to_string(),
        output: e.to_string(),
        status: ToolStatus::NOT_RUN,
    })?;
    tracing::debug!(command = %invocation, output = %output.combined(), "packaging tool finished");

    if !output.success() {
        return Err(PoxError::Packaging {
            command: invocation.to_string(),
            output: output.combined(),
            status: output.status,
        });
    }

    tracing::info!(archive = %archive.display(), %encoding, "archive written");
    Ok(())
}

/// Removes the file at `archive`; a missing file is not an error.
///
/// # Errors
///
/// Returns [`PoxError::Io`] for any failure other than "not found".
pub fn remove_archive(archive: &Path) -> Result<()> {
    match fs::remove_file(archive) {
        Ok(()) => {
            tracing::debug!(archive = %archive.display(), "removed existing archive");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PoxError::io(archive, e)),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::PathBuf;

    use pox_core::command::CommandOutput;

    use super::*;

    struct Recorder {
        code: Option<i32>,
        seen: RefCell<Vec<Invocation>>,
    }

    impl Recorder {
        fn exiting(code: i32) -> Self {
            Self {
                code: Some(code),
                seen: RefCell::new(Vec::new()),
            }
        }

        fn missing() -> Self {
            Self {
                code: None,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for Recorder {
        fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
            self.seen.borrow_mut().push(invocation.clone());
            let code = self
                .code
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "mksquashfs: not found"))?;
            Ok(CommandOutput {
                status: ToolStatus(Some(code)),
                stdout: b"Parallel mksquashfs\n".to_vec(),
                stderr: if code == 0 { Vec::new() } else { b"FATAL ERROR\n".to_vec() },
            })
        }
    }

    #[test]
    fn image_packaging_runs_mksquashfs_from_staging_root() {
        let inv = packaging_invocation(Path::new("/tmp/pox1"), Path::new("/tmp/pox.tcz"), Encoding::Image);
        assert_eq!(inv.program, "mksquashfs");
        assert_eq!(inv.args_lossy(), [".", "/tmp/pox.tcz", "-noappend"]);
        assert_eq!(inv.current_dir, Some(PathBuf::from("/tmp/pox1")));
    }

    #[test]
    fn zip_packaging_runs_zip_recursively_from_staging_root() {
        let inv = packaging_invocation(Path::new("/tmp/pox1"), Path::new("/out/a.zip"), Encoding::Zip);
        assert_eq!(inv.program, "zip");
        assert_eq!(inv.args_lossy(), ["-r", "/out/a.zip", "."]);
        assert_eq!(inv.current_dir, Some(PathBuf::from("/tmp/pox1")));
    }

    #[test]
    fn package_replaces_existing_archive_before_running_tool() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = dir.path().join("pox.tcz");
        fs::write(&archive, b"stale").expect("write");

        let runner = Recorder::exiting(0);
        package(&runner, dir.path(), &archive, Encoding::Image).expect("package");
        assert!(!archive.exists());
        assert_eq!(runner.seen.borrow().len(), 1);
    }

    #[test]
    fn failing_tool_is_packaging_error_with_output_and_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = Recorder::exiting(1);

        let err = package(&runner, dir.path(), &dir.path().join("a.zip"), Encoding::Zip)
            .expect_err("tool failed");
        match err {
            PoxError::Packaging { command, output, status } => {
                assert!(command.starts_with("zip -r"));
                assert_eq!(output, "Parallel mksquashfs\nFATAL ERROR\n");
                assert_eq!(status, ToolStatus(Some(1)));
            }
            other => unreachable!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_tool_is_packaging_error_without_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = package(&Recorder::missing(), dir.path(), &dir.path().join("p.tcz"), Encoding::Image)
            .expect_err("tool missing");
        assert!(matches!(
            err,
            PoxError::Packaging { status: ToolStatus::NOT_RUN, ref output, .. } if output.contains("not found")
        ));
    }

    #[test]
    fn removing_absent_archive_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        remove_archive(&dir.path().join("absent.tcz")).expect("absent is fine");
    }

    #[test]
    fn removing_archive_that_is_a_directory_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = remove_archive(dir.path()).expect_err("directory");
        assert!(matches!(err, PoxError::Io { .. }));
    }
}
