//! Shared-library dependency resolution.
//!
//! Runs the dynamic-linker inspector (`ldd`) over all inputs in one batch
//! and turns its report into the list of libraries that must travel with
//! them. The inspector already prints the full closure, so one pass is
//! transitive.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use pox_common::constants::LDD;
use pox_common::error::{PoxError, Result};
use pox_common::types::ToolStatus;
use pox_core::command::{CommandOutput, CommandRunner, Invocation};

/// Notice printed for inputs that are not dynamically linked.
const NOT_DYNAMIC: &str = "not a dynamic executable";
/// Notice printed by some loaders for static executables.
const STATIC: &str = "statically linked";

/// One resolved library from the inspector's report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEntry {
    /// Name the input asked for (the soname, or the interpreter path).
    pub name: String,
    /// Absolute path the loader resolved it to.
    pub path: PathBuf,
}

#[derive(Debug, PartialEq, Eq)]
enum Line {
    Entry(DependencyEntry),
    Missing(String),
    Notice,
    Ignored,
}

/// Resolves the shared libraries `inputs` need.
///
/// Returns absolute library paths, deduplicated in first-seen order and
/// excluding the inputs themselves.
///
/// # Errors
///
/// Returns [`PoxError::Resolution`] if an input does not exist, the
/// inspector cannot be run or rejects an input, or a library cannot be
/// found.
pub fn resolve(runner: &dyn CommandRunner, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let entries = inspect(runner, inputs)?;
    let mut seen: HashSet<&Path> = inputs.iter().map(PathBuf::as_path).collect();
    let mut libraries = Vec::new();

    for entry in &entries {
        if seen.insert(entry.path.as_path()) {
            tracing::debug!(library = %entry.path.display(), name = %entry.name, "dependency");
            libraries.push(entry.path.clone());
        }
    }

    tracing::info!(inputs = inputs.len(), libraries = libraries.len(), "dependencies resolved");
    Ok(libraries)
}

/// Runs the inspector over `inputs` and returns every entry it reports.
///
/// Inputs that are not dynamic executables (data files, static binaries)
/// contribute no entries and are not an error, even though the inspector
/// exits non-zero for them.
///
/// # Errors
///
/// See [`resolve`].
pub fn inspect(runner: &dyn CommandRunner, inputs: &[PathBuf]) -> Result<Vec<DependencyEntry>> {
    if inputs.is_empty() {
        return Ok(Vec::new());
    }

    if let Some(missing) = inputs.iter().find(|p| !p.exists()) {
        return Err(resolution_error(
            inputs,
            format!("{}: No such file or directory", missing.display()),
            ToolStatus::NOT_RUN,
        ));
    }

    let invocation = Invocation::new(LDD).args(inputs);
    let output = runner
        .run(&invocation)
        .map_err(|e| resolution_error(inputs, e.to_string(), ToolStatus::NOT_RUN))?;

    let mut entries = Vec::new();
    let mut missing = Vec::new();
    for line in output.stdout_lossy().lines() {
        match parse_line(line) {
            Line::Entry(entry) => entries.push(entry),
            Line::Missing(name) => missing.push(format!("{name} => not found")),
            Line::Notice | Line::Ignored => {}
        }
    }

    if !missing.is_empty() {
        return Err(resolution_error(inputs, missing.join("; "), output.status));
    }
    if !output.success() && !only_notices(&output) {
        return Err(resolution_error(
            inputs,
            output.combined().trim().to_string(),
            output.status,
        ));
    }

    Ok(entries)
}

/// True when every diagnostic the inspector printed is a "not dynamic"
/// notice.
fn only_notices(output: &CommandOutput) -> bool {
    let stderr = output.stderr_lossy();
    let mut lines = stderr.lines().filter(|l| !l.trim().is_empty()).peekable();
    if lines.peek().is_none() {
        // Some inspectors print the notice on stdout instead.
        return output
            .stdout_lossy()
            .lines()
            .any(|l| parse_line(l) == Line::Notice);
    }
    lines.all(|l| parse_line(l) == Line::Notice)
}

fn parse_line(line: &str) -> Line {
    let line = line.trim();
    if line.is_empty() {
        return Line::Ignored;
    }
    if line.contains(NOT_DYNAMIC) || line.contains(STATIC) {
        return Line::Notice;
    }
    // Per-input header when several inputs are inspected at once.
    if line.ends_with(':') && !line.contains("=>") {
        return Line::Ignored;
    }

    if let Some((name, target)) = line.split_once("=>") {
        let name = name.trim();
        let target = target.trim();
        if target.starts_with("not found") {
            return Line::Missing(name.to_string());
        }
        let path = strip_load_address(target);
        if !path.starts_with('/') {
            return Line::Ignored;
        }
        return Line::Entry(DependencyEntry {
            name: name.to_string(),
            path: PathBuf::from(path),
        });
    }

    // The program interpreter is listed by absolute path only.
    if line.starts_with('/') {
        let path = strip_load_address(line);
        return Line::Entry(DependencyEntry {
            name: path.to_string(),
            path: PathBuf::from(path),
        });
    }

    // Virtual objects such as linux-vdso.so.1 have no file.
    Line::Ignored
}

fn strip_load_address(s: &str) -> &str {
    s.split_once(" (").map_or(s, |(path, _)| path).trim()
}

fn resolution_error(inputs: &[PathBuf], diagnostic: String, status: ToolStatus) -> PoxError {
    let inputs = inputs
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" ");
    PoxError::Resolution {
        inputs,
        diagnostic,
        status,
    }
}
