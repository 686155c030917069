//! Subprocess spawning for supervised helpers.

use remoteplay_shared::errors::{RemoteplayError, RemoteplayResult};
use std::fmt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

/// Executable plus arguments for a supervised child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Observed state of a spawned child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    /// Exit code, or `None` when the child was ended by a signal.
    Exited(Option<i32>),
}

/// Runtime operations on a spawned child.
///
/// Separates runtime operations (poll, terminate) from spawning
/// (`ProcessLauncher`), the same split used for the machine provider.
pub trait ProcessHandle: Send {
    fn pid(&self) -> u32;

    /// Non-blocking exit check.
    fn poll(&mut self) -> RemoteplayResult<ProcessStatus>;

    /// Ask the child to exit. Does not wait.
    fn terminate(&mut self) -> RemoteplayResult<()>;
}

/// Trait for spawning supervised children.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> RemoteplayResult<Box<dyn ProcessHandle>>;
}

/// Launches real OS processes with null stdio and no console window.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, spec: &LaunchSpec) -> RemoteplayResult<Box<dyn ProcessHandle>> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);

        // Children are detached from our terminal; their output is not consumed.
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let child = cmd.spawn().map_err(|e| {
            let err_msg = format!("Failed to spawn {}: {}", spec.program.display(), e);
            tracing::error!("{}", err_msg);
            RemoteplayError::ProcessLaunch(err_msg)
        })?;

        tracing::debug!(pid = child.id(), command = %spec, "Spawned child process");
        Ok(Box::new(ChildHandle { child }))
    }
}

struct ChildHandle {
    child: Child,
}

impl ProcessHandle for ChildHandle {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn poll(&mut self) -> RemoteplayResult<ProcessStatus> {
        Ok(match self.child.try_wait()? {
            None => ProcessStatus::Running,
            Some(status) => ProcessStatus::Exited(status.code()),
        })
    }

    fn terminate(&mut self) -> RemoteplayResult<()> {
        #[cfg(unix)]
        {
            if !crate::util::terminate_process(self.child.id()) {
                return Err(RemoteplayError::Internal(format!(
                    "failed to signal pid {}",
                    self.child.id()
                )));
            }
            Ok(())
        }

        #[cfg(not(unix))]
        {
            self.child.kill().map_err(RemoteplayError::from)
        }
    }
}
