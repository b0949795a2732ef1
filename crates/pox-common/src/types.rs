//! Domain primitive types used across the pox workspace.

use std::fmt;

/// How a staging tree is encoded into the archive file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Compressed read-only squashfs image, mounted through a loop device.
    #[default]
    Image,
    /// Zip archive, extracted with `unzip` before running.
    Zip,
}

impl Encoding {
    /// Selects the encoding from the `--zip` flag.
    #[must_use]
    pub const fn from_zip_flag(zip: bool) -> Self {
        if zip { Self::Zip } else { Self::Image }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "squashfs"),
            Self::Zip => write!(f, "zip"),
        }
    }
}

/// Exit status of an external tool.
///
/// `None` means the tool did not exit normally (killed by a signal, or it
/// could not be started at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolStatus(pub Option<i32>);

impl ToolStatus {
    /// Status reported when the tool never ran.
    pub const NOT_RUN: Self = Self(None);

    /// Returns whether the tool exited with code zero.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self.0, Some(0))
    }
}

impl From<std::process::ExitStatus> for ToolStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self(status.code())
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit status {code}"),
            None => write!(f, "no exit status"),
        }
    }
}
