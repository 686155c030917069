//! Reverse SSH tunnel supervisor.
//!
//! Keeps one `ssh -N -R` child that forwards a port on the remote machine back
//! to the same port on localhost. The target host is resolved lazily through a
//! `HostProvider` so the tunnel can be created before the address is known.

use super::launcher::{LaunchSpec, ProcessHandle, ProcessLauncher, ProcessStatus};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Returns the current tunnel target, or `None` if there is nothing to connect to yet.
pub type HostProvider = Box<dyn Fn() -> Option<String> + Send + Sync>;

/// Tunnel state derived from the owned child handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TunnelState {
    /// Never started, stopped, or exited cleanly.
    Closed,
    /// Child exists and has not exited.
    Open,
    /// Child exited with a non-zero code or could not be launched.
    Error,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TunnelState::Closed => "closed",
            TunnelState::Open => "open",
            TunnelState::Error => "error",
        })
    }
}

pub struct TunnelSupervisor {
    host_provider: HostProvider,
    launcher: Arc<dyn ProcessLauncher>,
    ssh_binary: PathBuf,
    port: u16,
    child: Option<Box<dyn ProcessHandle>>,
    /// Terminated children waiting to be reaped.
    exiting: Vec<Box<dyn ProcessHandle>>,
    launch_error: Option<String>,
}

impl TunnelSupervisor {
    pub fn new(
        host_provider: HostProvider,
        launcher: Arc<dyn ProcessLauncher>,
        ssh_binary: impl Into<PathBuf>,
        port: u16,
    ) -> Self {
        Self {
            host_provider,
            launcher,
            ssh_binary: ssh_binary.into(),
            port,
            child: None,
            exiting: Vec::new(),
            launch_error: None,
        }
    }

    /// Current tunnel target.
    pub fn host(&self) -> Option<String> {
        (self.host_provider)()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.launch_error.as_deref()
    }

    fn command(&self, host: &str) -> LaunchSpec {
        LaunchSpec::new(&self.ssh_binary)
            .arg("-N")
            .arg("-R")
            .arg(format!("{port}:localhost:{port}", port = self.port))
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg(host)
    }

    fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|child| matches!(child.poll(), Ok(ProcessStatus::Running)))
    }

    /// Open the tunnel.
    ///
    /// No-op if the tunnel is already running or there is no host yet. Launch
    /// failures are reported by the next `status()` call.
    pub fn start(&mut self) {
        if self.is_running() {
            tracing::trace!("Tunnel already running");
            return;
        }

        let Some(host) = self.host() else {
            tracing::debug!("No tunnel host available, not starting tunnel");
            return;
        };

        // A previous child that exited on its own is replaced.
        self.child = None;
        self.launch_error = None;

        let spec = self.command(&host);
        match self.launcher.launch(&spec) {
            Ok(child) => {
                tracing::info!(host = %host, port = self.port, pid = child.pid(), "Opened SSH tunnel");
                self.child = Some(child);
            }
            Err(e) => {
                tracing::warn!(host = %host, error = %e, "Failed to open SSH tunnel");
                self.launch_error = Some(e.to_string());
            }
        }
    }

    /// Close the tunnel. Sends a terminate signal and returns immediately.
    pub fn stop(&mut self) {
        self.launch_error = None;

        let Some(mut child) = self.child.take() else {
            return;
        };

        if !matches!(child.poll(), Ok(ProcessStatus::Running)) {
            return;
        }

        tracing::info!(pid = child.pid(), "Closing SSH tunnel");
        if let Err(e) = child.terminate() {
            tracing::warn!(pid = child.pid(), error = %e, "Failed to terminate SSH tunnel");
        }
        self.exiting.push(child);
    }

    /// Non-blocking tunnel status.
    pub fn status(&mut self) -> TunnelState {
        self.exiting
            .retain_mut(|child| matches!(child.poll(), Ok(ProcessStatus::Running)));

        if self.launch_error.is_some() {
            return TunnelState::Error;
        }

        match self.child.as_mut().map(|child| child.poll()) {
            None => TunnelState::Closed,
            Some(Ok(ProcessStatus::Running)) => TunnelState::Open,
            Some(Ok(ProcessStatus::Exited(None))) | Some(Ok(ProcessStatus::Exited(Some(0)))) => {
                TunnelState::Closed
            }
            Some(Ok(ProcessStatus::Exited(Some(code)))) => {
                tracing::debug!(code, "SSH tunnel exited with failure");
                TunnelState::Error
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Failed to poll SSH tunnel");
                TunnelState::Error
            }
        }
    }
}

impl Drop for TunnelSupervisor {
    fn drop(&mut self) {
        if self.is_running() {
            tracing::warn!("TunnelSupervisor dropped while tunnel still open, terminating");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLauncher;

    fn supervisor(launcher: &Arc<FakeLauncher>, host: Option<&str>) -> TunnelSupervisor {
        let host = host.map(str::to_string);
        TunnelSupervisor::new(
            Box::new(move || host.clone()),
            Arc::clone(launcher) as Arc<dyn ProcessLauncher>,
            "ssh",
            7575,
        )
    }

    #[test]
    fn test_start_twice_launches_once() {
        let launcher = Arc::new(FakeLauncher::new());
        let mut tunnel = supervisor(&launcher, Some("Arcturus"));

        tunnel.start();
        tunnel.start();

        assert_eq!(launcher.launch_count(), 1);
        assert_eq!(tunnel.status(), TunnelState::Open);
    }

    #[test]
    fn test_command_line() {
        let launcher = Arc::new(FakeLauncher::new());
        let mut tunnel = supervisor(&launcher, Some("Arcturus"));
        tunnel.start();

        let spec = launcher.launched().remove(0);
        assert_eq!(
            spec.to_string(),
            "ssh -N -R 7575:localhost:7575 -o StrictHostKeyChecking=no Arcturus"
        );
    }

    #[test]
    fn test_no_host_is_noop() {
        let launcher = Arc::new(FakeLauncher::new());
        let mut tunnel = supervisor(&launcher, None);

        tunnel.start();

        assert_eq!(launcher.launch_count(), 0);
        assert_eq!(tunnel.status(), TunnelState::Closed);
    }

    #[test]
    fn test_stop_terminates_once() {
        let launcher = Arc::new(FakeLauncher::new());
        let mut tunnel = supervisor(&launcher, Some("Arcturus"));

        tunnel.start();
        tunnel.stop();
        tunnel.stop();

        assert_eq!(launcher.terminate_count(), 1);
        assert_eq!(tunnel.status(), TunnelState::Closed);
    }

    #[test]
    fn test_stop_when_never_started_is_noop() {
        let launcher = Arc::new(FakeLauncher::new());
        let mut tunnel = supervisor(&launcher, Some("Arcturus"));
        tunnel.stop();
        assert_eq!(launcher.terminate_count(), 0);
    }

    #[test]
    fn test_nonzero_exit_is_error() {
        let launcher = Arc::new(FakeLauncher::new());
        let mut tunnel = supervisor(&launcher, Some("Arcturus"));
        tunnel.start();

        launcher.exit_all(Some(255));
        assert_eq!(tunnel.status(), TunnelState::Error);
    }

    #[test]
    fn test_clean_exit_is_closed_and_restartable() {
        let launcher = Arc::new(FakeLauncher::new());
        let mut tunnel = supervisor(&launcher, Some("Arcturus"));
        tunnel.start();

        launcher.exit_all(Some(0));
        assert_eq!(tunnel.status(), TunnelState::Closed);

        tunnel.start();
        assert_eq!(launcher.launch_count(), 2);
        assert_eq!(tunnel.status(), TunnelState::Open);
    }

    #[test]
    fn test_launch_failure_surfaces_in_status() {
        let launcher = Arc::new(FakeLauncher::failing());
        let mut tunnel = supervisor(&launcher, Some("Arcturus"));

        tunnel.start();

        assert_eq!(tunnel.status(), TunnelState::Error);
        assert!(tunnel.last_error().is_some());
    }
}
