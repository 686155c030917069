//! USB bridge service supervisor.
//!
//! The bridge may already be running for reasons unrelated to this program, so
//! its state comes from a process-table scan rather than from an owned handle.
//! It is started on demand and never stopped here.

use super::launcher::{LaunchSpec, ProcessHandle, ProcessLauncher, ProcessStatus};
use crate::util::process_running_with_marker;
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceState {
    Inactive,
    Active,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServiceState::Inactive => "inactive",
            ServiceState::Active => "active",
        })
    }
}

/// Process-table lookup by name substring.
pub trait ProcessTable: Send + Sync {
    fn contains(&self, marker: &str) -> bool;
}

/// `ProcessTable` backed by `sysinfo`.
pub struct SysinfoProcessTable {
    system: Mutex<sysinfo::System>,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(sysinfo::System::new()),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn contains(&self, marker: &str) -> bool {
        process_running_with_marker(&mut self.system.lock(), marker)
    }
}

pub struct ServiceSupervisor {
    executable: PathBuf,
    marker: String,
    launcher: Arc<dyn ProcessLauncher>,
    table: Arc<dyn ProcessTable>,
    /// Child we launched ourselves, kept only so it can be reaped.
    child: Option<Box<dyn ProcessHandle>>,
    launch_error: Option<String>,
}

impl ServiceSupervisor {
    pub fn new(
        executable: impl Into<PathBuf>,
        marker: impl Into<String>,
        launcher: Arc<dyn ProcessLauncher>,
        table: Arc<dyn ProcessTable>,
    ) -> Self {
        Self {
            executable: executable.into(),
            marker: marker.into(),
            launcher,
            table,
            child: None,
            launch_error: None,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.launch_error.as_deref()
    }

    fn reap(&mut self) {
        if let Some(child) = self.child.as_mut()
            && let Ok(ProcessStatus::Exited(code)) = child.poll()
        {
            tracing::debug!(pid = child.pid(), code = ?code, "USB bridge process exited");
            self.child = None;
        }
    }

    /// Start the bridge unless a matching process is already running.
    pub fn start(&mut self) {
        if self.status() == ServiceState::Active {
            tracing::trace!(marker = %self.marker, "USB bridge already active");
            return;
        }
        if self.child.is_some() {
            tracing::debug!("USB bridge launched but not yet visible in process table");
            return;
        }

        match self.launcher.launch(&LaunchSpec::new(&self.executable)) {
            Ok(child) => {
                tracing::info!(
                    executable = %self.executable.display(),
                    pid = child.pid(),
                    "Started USB bridge"
                );
                self.launch_error = None;
                self.child = Some(child);
            }
            Err(e) => {
                tracing::warn!(executable = %self.executable.display(), error = %e, "Failed to start USB bridge");
                self.launch_error = Some(e.to_string());
            }
        }
    }

    /// Scan the process table. Never cached.
    pub fn status(&mut self) -> ServiceState {
        self.reap();
        if self.table.contains(&self.marker) {
            ServiceState::Active
        } else {
            ServiceState::Inactive
        }
    }
}
