//! Mode selection from command-line flags.

use std::path::PathBuf;

use pox_common::error::{PoxError, Result};

/// What a single invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Build an archive from these files and their libraries.
    Create(Vec<PathBuf>),
    /// Run a program from an existing archive.
    Run {
        /// Program name or path inside the archive.
        program: String,
        /// Arguments passed through verbatim.
        args: Vec<String>,
    },
}

impl Operation {
    /// Picks the operation from the `--create` / `--run` flags and the
    /// positional arguments. Touches nothing on disk.
    ///
    /// # Errors
    ///
    /// Returns [`PoxError::Usage`] if neither or both modes are selected, or
    /// the chosen mode is missing its operands.
    pub fn select(create: bool, run: bool, args: Vec<String>) -> Result<Self> {
        match (create, run) {
            (true, true) | (false, false) => Err(PoxError::usage(
                "exactly one of --create and --run is required",
            )),
            (true, false) => {
                if args.is_empty() {
                    return Err(PoxError::usage("--create needs at least one file"));
                }
                Ok(Self::Create(args.into_iter().map(PathBuf::from).collect()))
            }
            (false, true) => {
                let mut args = args.into_iter();
                let program = args
                    .next()
                    .ok_or_else(|| PoxError::usage("--run needs a program"))?;
                // `pox -r PROGRAM -- ARGS...`: the separator belongs to pox.
                let mut args = args.peekable();
                let _ = args.next_if(|a| a == "--");
                Ok(Self::Run {
                    program,
                    args: args.collect(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn neither_or_both_modes_is_usage_error() {
        assert!(matches!(
            Operation::select(false, false, strings(&["ls"])),
            Err(PoxError::Usage { .. })
        ));
        assert!(matches!(
            Operation::select(true, true, strings(&["ls"])),
            Err(PoxError::Usage { .. })
        ));
    }

    #[test]
    fn create_collects_paths() {
        let op = Operation::select(true, false, strings(&["/bin/ls", "lib/x.so"])).expect("create");
        assert_eq!(
            op,
            Operation::Create(vec![PathBuf::from("/bin/ls"), PathBuf::from("lib/x.so")])
        );
    }

    #[test]
    fn create_without_files_is_usage_error() {
        let err = Operation::select(true, false, Vec::new()).expect_err("no files");
        assert!(err.to_string().contains("--create"));
    }

    #[test]
    fn run_splits_program_from_arguments() {
        let op = Operation::select(false, true, strings(&["ls", "-la", "--", "x"])).expect("run");
        assert_eq!(
            op,
            Operation::Run {
                program: "ls".into(),
                args: strings(&["-la", "--", "x"]),
            }
        );
    }

    #[test]
    fn separator_right_after_program_is_dropped_once() {
        let op = Operation::select(false, true, strings(&["/bin/ls", "--", "-la"])).expect("run");
        assert_eq!(
            op,
            Operation::Run {
                program: "/bin/ls".into(),
                args: strings(&["-la"]),
            }
        );

        let op = Operation::select(false, true, strings(&["echo", "--", "--"])).expect("run");
        assert_eq!(
            op,
            Operation::Run {
                program: "echo".into(),
                args: strings(&["--"]),
            }
        );
    }

    #[test]
    fn run_without_program_is_usage_error() {
        let err = Operation::select(false, true, Vec::new()).expect_err("no program");
        assert!(err.to_string().contains("--run"));
    }
}
