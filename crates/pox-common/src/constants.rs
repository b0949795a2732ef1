//! System-wide constants and default paths.

/// Default archive location, shared by create and run.
pub const DEFAULT_ARCHIVE: &str = "/tmp/pox.tcz";

/// Prefix for staging and mount directories under the system temp dir.
pub const TEMP_PREFIX: &str = "pox";

/// Environment variable that overrides the archive path.
pub const ARCHIVE_ENV: &str = "POX_FILE";

/// Directory searched for programs given without a path separator.
pub const PROGRAM_DIR: &str = "/bin";

/// Working-directory value handed to the chrooted child.
pub const CHILD_PWD: &str = ".";

/// Dependency inspector.
pub const LDD: &str = "ldd";

/// Squashfs image builder.
pub const MKSQUASHFS: &str = "mksquashfs";

/// Zip archiver.
pub const ZIP: &str = "zip";

/// Zip extractor.
pub const UNZIP: &str = "unzip";

/// Filesystem type of image archives.
pub const SQUASHFS: &str = "squashfs";

/// Mode for parent directories created while staging.
pub const STAGING_DIR_MODE: u32 = 0o755;

/// Binary name for the CLI.
pub const BIN_NAME: &str = "pox";
