//! Engine that drives the create and run flows.

use std::fmt;
use std::path::{Path, PathBuf};

use pox_common::config::PoxConfig;
use pox_common::error::Result;
use pox_common::types::ToolStatus;
use pox_core::command::{CommandRunner, SystemRunner};
use pox_core::filesystem::loopdev::{KernelLoopManager, LoopManager};
use pox_core::filesystem::mount::{MountBackend, NixMountBackend};
use pox_core::session::Session;
use pox_image::staging::StagingTree;
use pox_image::{mounter, packager, resolver};

use crate::exec;
use crate::operation::Operation;
use crate::process::{ChrootSpawner, Spawner};

/// The collaborators the engine talks to the system through.
pub struct Backends {
    /// Runs `ldd`, the packagers, and `unzip`.
    pub runner: Box<dyn CommandRunner>,
    /// Mounts and unmounts.
    pub mounts: Box<dyn MountBackend>,
    /// Loop device attach and detach.
    pub loops: Box<dyn LoopManager>,
    /// Starts the chrooted program.
    pub spawner: Box<dyn Spawner>,
}

impl Backends {
    /// The real system implementations.
    #[must_use]
    pub fn system() -> Self {
        Self {
            runner: Box::new(SystemRunner),
            mounts: Box::new(NixMountBackend),
            loops: Box::new(KernelLoopManager::new()),
            spawner: Box::new(ChrootSpawner),
        }
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

/// Result of [`Engine::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// An archive was written here.
    Created(PathBuf),
    /// The program ran and exited with this status.
    Ran(ToolStatus),
}

/// Coordinates resolution, staging, packaging, mounting, and execution.
#[derive(Debug)]
pub struct Engine {
    config: PoxConfig,
    backends: Backends,
}

impl Engine {
    /// Creates an engine backed by the real system.
    #[must_use]
    pub fn new(config: PoxConfig) -> Self {
        Self::with_backends(config, Backends::system())
    }

    /// Creates an engine with substitute collaborators.
    #[must_use]
    pub const fn with_backends(config: PoxConfig, backends: Backends) -> Self {
        Self { config, backends }
    }

    /// Returns the engine's configuration.
    #[must_use]
    pub const fn config(&self) -> &PoxConfig {
        &self.config
    }

    /// Dispatches `operation`. Relative paths are taken against `cwd`.
    ///
    /// # Errors
    ///
    /// Returns the error of the flow that ran; see [`Engine::create`] and
    /// [`Engine::run`].
    pub fn execute(&self, operation: &Operation, cwd: &Path) -> Result<Outcome> {
        match operation {
            Operation::Create(inputs) => self.create(inputs, cwd).map(Outcome::Created),
            Operation::Run { program, args } => self.run(program, args).map(Outcome::Ran),
        }
    }

    /// Packages `inputs` and their shared libraries into the configured
    /// archive, returning its absolute path.
    ///
    /// Files under `cwd` are stored relative to it; all others keep their
    /// full path. A partially written archive is removed on failure unless
    /// temp retention is on.
    ///
    /// # Errors
    ///
    /// Returns [`PoxError::Resolution`], [`PoxError::Io`], or
    /// [`PoxError::Packaging`] from the failing phase.
    ///
    /// [`PoxError::Resolution`]: pox_common::error::PoxError::Resolution
    /// [`PoxError::Io`]: pox_common::error::PoxError::Io
    /// [`PoxError::Packaging`]: pox_common::error::PoxError::Packaging
    pub fn create(&self, inputs: &[PathBuf], cwd: &Path) -> Result<PathBuf> {
        let inputs: Vec<PathBuf> = inputs.iter().map(|p| cwd.join(p)).collect();
        tracing::info!(inputs = inputs.len(), encoding = %self.config.encoding, "creating archive");

        let libraries = resolver::resolve(self.backends.runner.as_ref(), &inputs)?;
        let files: Vec<PathBuf> = inputs.into_iter().chain(libraries).collect();

        let tree = StagingTree::build(&files, cwd, self.config.keep_temp)?;
        let archive = self.config.absolute_archive(cwd);

        if let Err(e) = packager::package(
            self.backends.runner.as_ref(),
            tree.root(),
            &archive,
            self.config.encoding,
        ) {
            if self.config.keep_temp {
                tracing::info!(archive = %archive.display(), "keeping partial archive");
            } else if let Err(cleanup) = packager::remove_archive(&archive) {
                tracing::warn!(error = %cleanup, "removing partial archive failed");
            }
            return Err(e);
        }

        Ok(archive)
    }

    /// Runs `program` with `args` from the configured archive, returning its
    /// exit status.
    ///
    /// Everything acquired for the run is released before returning, in
    /// reverse order, whether or not the run succeeded. Teardown failures
    /// are logged and never replace the run's own result.
    ///
    /// # Errors
    ///
    /// Returns the first error of the mount or execution phase, including
    /// [`PoxError::Permission`] when the root change is denied.
    ///
    /// [`PoxError::Permission`]: pox_common::error::PoxError::Permission
    pub fn run(&self, program: &str, args: &[String]) -> Result<ToolStatus> {
        let mut session = Session::open(
            self.config.keep_temp,
            self.backends.mounts.as_ref(),
            self.backends.loops.as_ref(),
        )?;

        let outcome = mounter::mount_archive(
            &mut session,
            self.backends.runner.as_ref(),
            &self.config.archive,
            self.config.encoding,
        )
        .and_then(|_| exec::run_isolated(&mut session, self.backends.spawner.as_ref(), program, args));

        let failures = session.release();
        if !failures.is_empty() {
            tracing::warn!(failures = failures.len(), "teardown incomplete");
        }
        outcome
    }
}
