//! Configuration model passed explicitly into every component call.

use std::path::{Path, PathBuf};

use crate::types::Encoding;

/// Settings shared by the create and run flows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoxConfig {
    /// Emit tool output and per-file progress.
    pub verbose: bool,
    /// Keep staging and mount directories (and partial archives) after exit.
    pub keep_temp: bool,
    /// Archive file to write or read.
    pub archive: PathBuf,
    /// Archive encoding.
    pub encoding: Encoding,
}

impl PoxConfig {
    /// Config with the `--debug` behavior: verbose output plus retention.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self.keep_temp = enabled;
        self
    }

    /// Sets the archive path.
    #[must_use]
    pub fn with_archive(mut self, archive: impl Into<PathBuf>) -> Self {
        self.archive = archive.into();
        self
    }

    /// Sets the encoding.
    #[must_use]
    pub const fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Archive path made absolute against `cwd`.
    ///
    /// Packaging tools run inside the staging tree, so a relative archive
    /// path would otherwise land there.
    #[must_use]
    pub fn absolute_archive(&self, cwd: &Path) -> PathBuf {
        if self.archive.is_absolute() {
            self.archive.clone()
        } else {
            cwd.join(&self.archive)
        }
    }
}

impl Default for PoxConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            keep_temp: false,
            archive: PathBuf::from(crate::constants::DEFAULT_ARCHIVE),
            encoding: Encoding::default(),
        }
    }
}
