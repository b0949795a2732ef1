//! Staging tree assembly.
//!
//! Copies every file that goes into an archive into a private temporary
//! directory, laid out the way it should appear inside the archive, and
//! pre-creates the directories the chroot support mounts will land on.

use std::collections::HashSet;
use std::fs::{self, DirBuilder, File, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use pox_common::constants::{STAGING_DIR_MODE, TEMP_PREFIX};
use pox_common::error::{PoxError, Result};
use pox_core::filesystem::mount::CHROOT_MOUNTS;
use tempfile::TempDir;

/// A populated staging directory.
///
/// The directory is removed when the tree is dropped, unless it was built
/// with retention enabled.
#[derive(Debug)]
pub struct StagingTree {
    root: PathBuf,
    dir: Option<TempDir>,
    keep: bool,
    staged: Vec<PathBuf>,
}

impl StagingTree {
    /// Builds a tree holding `files`, each placed at its path relative to
    /// `cwd` (see [`relative_path`]).
    ///
    /// The first failure aborts the build and removes the partial tree
    /// (unless `keep` is set).
    ///
    /// # Errors
    ///
    /// Returns [`PoxError::Io`] if the temp directory cannot be created or a
    /// file cannot be read, created, or copied.
    pub fn build(files: &[PathBuf], cwd: &Path, keep: bool) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir()
            .map_err(|e| PoxError::io(std::env::temp_dir(), e))?;
        let mut tree = Self {
            root: dir.path().to_path_buf(),
            dir: Some(dir),
            keep,
            staged: Vec::new(),
        };
        tracing::debug!(root = %tree.root.display(), "staging tree created");

        let mut seen = HashSet::new();
        for file in files {
            let relative = relative_path(file, cwd);
            if !seen.insert(relative.clone()) {
                continue;
            }
            tree.stage_file(file, &relative)?;
            tree.staged.push(relative);
        }
        tree.create_mount_points()?;

        tracing::info!(root = %tree.root.display(), files = tree.staged.len(), "staging tree populated");
        Ok(tree)
    }

    /// Root directory of the tree.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Staged files, relative to [`StagingTree::root`], in staging order.
    #[must_use]
    pub fn staged(&self) -> &[PathBuf] {
        &self.staged
    }

    fn stage_file(&self, source: &Path, relative: &Path) -> Result<()> {
        tracing::debug!(source = %source.display(), staged = %relative.display(), "staging file");

        let metadata = fs::metadata(source).map_err(|e| PoxError::io(source, e))?;
        let mode = metadata.permissions().mode() & 0o777;
        let dest = self.root.join(relative);

        if let Some(parent) = dest.parent() {
            DirBuilder::new()
                .recursive(true)
                .mode(STAGING_DIR_MODE)
                .create(parent)
                .map_err(|e| PoxError::io(parent, e))?;
        }

        let mut input = File::open(source).map_err(|e| PoxError::io(source, e))?;
        let mut output = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&dest)
            .map_err(|e| PoxError::io(&dest, e))?;
        let _ = io::copy(&mut input, &mut output).map_err(|e| PoxError::io(source, e))?;

        // The umask may have narrowed the mode given at creation.
        fs::set_permissions(&dest, Permissions::from_mode(mode)).map_err(|e| PoxError::io(&dest, e))
    }

    fn create_mount_points(&self) -> Result<()> {
        for mount in &CHROOT_MOUNTS {
            let target = mount.target_in(&self.root);
            // A staged file such as /dev/null may have created it already.
            if !target.is_dir() {
                DirBuilder::new()
                    .recursive(true)
                    .mode(mount.mode)
                    .create(&target)
                    .map_err(|e| PoxError::io(&target, e))?;
            }
            fs::set_permissions(&target, Permissions::from_mode(mount.mode))
                .map_err(|e| PoxError::io(&target, e))?;
        }
        Ok(())
    }
}

impl Drop for StagingTree {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        if self.keep {
            let path = dir.keep();
            tracing::info!(root = %path.display(), "staging tree retained");
        } else if let Err(e) = dir.close() {
            tracing::warn!(root = %self.root.display(), error = %e, "removing staging tree failed");
        }
    }
}

/// Path of `file` inside the archive.
///
/// A file nested under `cwd` is placed relative to it; anything else keeps
/// its full path below the archive root. Nesting is decided per path
/// component, so `/work` is not treated as a parent of `/workshop/lib`.
/// `..` components are resolved lexically and can never climb above the
/// archive root.
#[must_use]
pub fn relative_path(file: &Path, cwd: &Path) -> PathBuf {
    let nested = file
        .strip_prefix(cwd)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty());
    let raw = nested.unwrap_or(file);

    let mut out = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::ParentDir => {
                let _ = out.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &[u8], mode: u32) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
        fs::set_permissions(path, Permissions::from_mode(mode)).expect("chmod");
    }

    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).expect("stat").permissions().mode() & 0o777
    }

    #[test]
    fn relative_path_strips_only_a_true_ancestor() {
        let cwd = Path::new("/home/dev/work");
        assert_eq!(
            relative_path(Path::new("/home/dev/work/bin/tool"), cwd),
            PathBuf::from("bin/tool")
        );
        assert_eq!(
            relative_path(Path::new("/home/dev/workshop/lib/a.so"), cwd),
            PathBuf::from("home/dev/workshop/lib/a.so")
        );
        assert_eq!(
            relative_path(Path::new("/lib/libc.so.6"), cwd),
            PathBuf::from("lib/libc.so.6")
        );
    }

    #[test]
    fn relative_path_cannot_escape_root() {
        assert_eq!(
            relative_path(Path::new("/../../etc/passwd"), Path::new("/work")),
            PathBuf::from("etc/passwd")
        );
        assert_eq!(
            relative_path(Path::new("/work/../x/./y"), Path::new("/srv")),
            PathBuf::from("x/y")
        );
    }

    #[test]
    fn staging_places_files_relative_to_cwd() {
        let host = tempfile::tempdir().expect("tempdir");
        let cwd = host.path().join("prefix");
        let tool = cwd.join("bin/tool");
        let lib = cwd.join("lib/libtool.so");
        write(&tool, b"#!/bin/sh\necho hi\n", 0o755);
        write(&lib, b"library", 0o644);

        let tree = StagingTree::build(&[tool, lib], &cwd, false).expect("build");
        assert_eq!(
            tree.staged(),
            [PathBuf::from("bin/tool"), PathBuf::from("lib/libtool.so")]
        );
        assert_eq!(
            fs::read(tree.root().join("bin/tool")).expect("read"),
            b"#!/bin/sh\necho hi\n"
        );
        assert_eq!(fs::read(tree.root().join("lib/libtool.so")).expect("read"), b"library");
    }

    #[test]
    fn staging_preserves_permission_bits() {
        let host = tempfile::tempdir().expect("tempdir");
        let exe = host.path().join("bin/exe");
        let secret = host.path().join("etc/secret");
        write(&exe, b"x", 0o751);
        write(&secret, b"y", 0o600);

        let tree = StagingTree::build(&[exe, secret], host.path(), false).expect("build");
        assert_eq!(mode_of(&tree.root().join("bin/exe")), 0o751);
        assert_eq!(mode_of(&tree.root().join("etc/secret")), 0o600);
        assert_eq!(mode_of(&tree.root().join("bin")) & !STAGING_DIR_MODE, 0);
    }

    #[test]
    fn staging_creates_mount_points_with_configured_modes() {
        let host = tempfile::tempdir().expect("tempdir");
        let file = host.path().join("f");
        write(&file, b"z", 0o644);

        let tree = StagingTree::build(&[file], host.path(), false).expect("build");
        assert_eq!(mode_of(&tree.root().join("sys")), 0o555);
        assert_eq!(mode_of(&tree.root().join("proc")), 0o555);
        assert_eq!(mode_of(&tree.root().join("dev")), 0o755);
        assert_eq!(fs::read_dir(tree.root().join("dev")).expect("ls").count(), 0);
    }

    #[test]
    fn mount_point_created_by_a_staged_file_gets_its_table_mode() {
        let host = tempfile::tempdir().expect("tempdir");
        let file = host.path().join("sys/kernel/notes");
        write(&file, b"n", 0o644);

        let tree = StagingTree::build(&[file], host.path(), false).expect("build");
        let sys = tree.root().join("sys");
        assert_eq!(mode_of(&sys), 0o555);
        assert!(sys.join("kernel/notes").is_file());

        // Writable again so the tree can be removed without privileges.
        fs::set_permissions(&sys, Permissions::from_mode(0o755)).expect("chmod");
    }

    #[test]
    fn repeated_read_only_file_is_staged_once() {
        let host = tempfile::tempdir().expect("tempdir");
        let file = host.path().join("ro");
        write(&file, b"ro", 0o444);

        let tree = StagingTree::build(&[file.clone(), file], host.path(), false).expect("build");
        assert_eq!(tree.staged().len(), 1);
        assert_eq!(mode_of(&tree.root().join("ro")), 0o444);
    }

    #[test]
    fn missing_file_aborts_with_io_error() {
        let host = tempfile::tempdir().expect("tempdir");
        let ok = host.path().join("ok");
        write(&ok, b"ok", 0o644);

        let err = StagingTree::build(&[ok, host.path().join("missing")], host.path(), false)
            .expect_err("missing file");
        assert!(matches!(err, PoxError::Io { ref path, .. } if path.ends_with("missing")));
    }

    #[test]
    fn tree_is_removed_on_drop_unless_kept() {
        let host = tempfile::tempdir().expect("tempdir");
        let file = host.path().join("f");
        write(&file, b"f", 0o644);

        let dropped = StagingTree::build(std::slice::from_ref(&file), host.path(), false).expect("build");
        let dropped_root = dropped.root().to_path_buf();
        drop(dropped);
        assert!(!dropped_root.exists());

        let kept = StagingTree::build(&[file], host.path(), true).expect("build");
        let kept_root = kept.root().to_path_buf();
        drop(kept);
        assert!(kept_root.join("f").is_file());
        fs::remove_dir_all(&kept_root).expect("cleanup");
    }
}
