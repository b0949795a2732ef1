//! Human-readable report lines.

use std::path::Path;

/// Byte count in the largest binary unit it fills, one decimal place.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    match bytes {
        b if b >= GIB => format!("{:.1} GiB", b as f64 / GIB as f64),
        b if b >= MIB => format!("{:.1} MiB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{:.1} KiB", b as f64 / KIB as f64),
        b => format!("{b} B"),
    }
}

/// One-line summary of a written archive, with its size when readable.
#[must_use]
pub fn archive_summary(archive: &Path) -> String {
    match std::fs::metadata(archive) {
        Ok(meta) => format!("wrote {} ({})", archive.display(), format_bytes(meta.len())),
        Err(_) => format!("wrote {}", archive.display()),
    }
}
