//! Archive mounting.
//!
//! Makes an archive's tree visible at a session root: image archives are
//! loop-attached and mounted read-only, zip archives are extracted.

use std::path::{Path, PathBuf};

use nix::mount::MsFlags;
use pox_common::constants::{SQUASHFS, UNZIP};
use pox_common::error::{PoxError, Result};
use pox_common::types::{Encoding, ToolStatus};
use pox_core::command::{CommandRunner, Invocation};
use pox_core::filesystem::mount::MountRequest;
use pox_core::session::Session;

/// Mount call placing the filesystem on `device` at `root`, read-only.
#[must_use]
pub fn image_mount_request(device: &Path, root: &Path) -> MountRequest {
    MountRequest {
        source: device.to_path_buf(),
        target: root.to_path_buf(),
        fstype: Some(SQUASHFS.to_owned()),
        flags: MsFlags::MS_RDONLY,
        data: None,
    }
}

/// Extraction command unpacking `archive` into `root`.
#[must_use]
pub fn extraction_invocation(archive: &Path, root: &Path) -> Invocation {
    Invocation::new(UNZIP).arg(archive).arg("-d").arg(root)
}

/// Makes the contents of `archive` appear at the session root.
///
/// Every acquired resource is registered with `session`, so it is released
/// even if a later step fails.
///
/// # Errors
///
/// Returns [`PoxError::Io`] or [`PoxError::Mount`] if an image archive
/// cannot be attached or mounted, and [`PoxError::Extraction`] if a zip
/// archive cannot be unpacked.
pub fn mount_archive(
    session: &mut Session<'_>,
    runner: &dyn CommandRunner,
    archive: &Path,
    encoding: Encoding,
) -> Result<PathBuf> {
    let root = session.root().to_path_buf();
    match encoding {
        Encoding::Image => {
            let device = session.attach_loop(archive)?;
            session.mount(&image_mount_request(&device, &root))?;
        }
        Encoding::Zip => extract(runner, archive, &root)?,
    }
    tracing::info!(archive = %archive.display(), root = %root.display(), %encoding, "archive mounted");
    Ok(root)
}

fn extract(runner: &dyn CommandRunner, archive: &Path, root: &Path) -> Result<()> {
    let invocation = extraction_invocation(archive, root);
    let output = runner.run(&invocation).map_err(|e| PoxError::Extraction {
        command: invocation.to_string(),
        output: e.to_string(),
        status: ToolStatus::NOT_RUN,
    })?;
    tracing::debug!(command = %invocation, output = %output.combined(), "extraction finished");

    if output.success() {
        Ok(())
    } else {
        Err(PoxError::Extraction {
            command: invocation.to_string(),
            output: output.combined(),
            status: output.status,
        })
    }
}
