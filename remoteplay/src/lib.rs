//! remoteplay: power a cloud workstation on and off and keep a reverse SSH
//! tunnel and a USB bridge in step with its state.
//!
//! The crate is organized around a single-writer `LifecycleController` that
//! owns the cached machine state, a `TunnelSupervisor`, a `ServiceSupervisor`
//! and at most one outstanding `TransitionWorker`.

pub mod controller;
pub mod logging;
pub mod machine;
pub mod provider;
pub mod runtime;
pub mod supervisor;
pub mod transition;
pub mod util;

#[cfg(test)]
mod testing;

pub use controller::{
    ControlState, ControllerCommand, ControllerHandle, ControllerSnapshot, LifecycleController,
    TransitionDecision,
};
pub use logging::init_logging;
pub use machine::{Machine, MachineId, MachineState, Severity};
pub use provider::{MachineProvider, PaperspaceProvider, find_machine};
pub use remoteplay_shared::{RemoteplayError, RemoteplayResult};
pub use runtime::{RemoteplayOptions, StoredConfig};
pub use supervisor::{ServiceState, ServiceSupervisor, TunnelState, TunnelSupervisor};
pub use transition::{TransitionAction, TransitionOutcome};
