//! Supervision of the two local helper processes.
//!
//! ## Architecture
//!
//! - **ProcessLauncher**: spawning operations (creates a `ProcessHandle`)
//! - **ProcessHandle**: runtime operations on a spawned child (poll, terminate)
//! - **TunnelSupervisor**: owns the reverse SSH tunnel child
//! - **ServiceSupervisor**: starts the USB bridge and detects it by process name
//!
//! Supervisors never fail because a process is already in the desired state,
//! and launch failures only show up through `status()`.

mod launcher;
mod service;
mod tunnel;

pub use launcher::{LaunchSpec, ProcessHandle, ProcessLauncher, ProcessStatus, SystemLauncher};
pub use service::{ProcessTable, ServiceState, ServiceSupervisor, SysinfoProcessTable};
pub use tunnel::{HostProvider, TunnelState, TunnelSupervisor};
