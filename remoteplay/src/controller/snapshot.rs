use crate::machine::{MachineId, MachineState, Severity};
use crate::supervisor::{ServiceState, TunnelState};
use crate::transition::TransitionAction;
use std::fmt;

/// What the user can do right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlState {
    /// A stable state was reached and `action` moves away from it.
    AwaitingInput(TransitionAction),
    /// Transitioning or in an unknown/error state.
    Busy,
}

impl ControlState {
    /// Derive from the cached state. Always `Busy` while a transition is pending.
    pub fn derive(state: MachineState, transition_pending: bool) -> Self {
        if transition_pending {
            return ControlState::Busy;
        }
        match state {
            MachineState::Off => ControlState::AwaitingInput(TransitionAction::Start),
            MachineState::Ready => ControlState::AwaitingInput(TransitionAction::Stop),
            _ => ControlState::Busy,
        }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlState::AwaitingInput(action) => write!(f, "awaiting {}", action),
            ControlState::Busy => f.write_str("busy"),
        }
    }
}

/// Point-in-time view of everything an observer can display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub machine_id: MachineId,
    pub machine_name: String,
    /// Tunnel target, if one could be resolved.
    pub hostname: Option<String>,
    pub public_address: Option<String>,
    pub machine_state: MachineState,
    pub severity: Severity,
    pub tunnel: TunnelState,
    pub service: ServiceState,
    /// A transition worker is outstanding.
    pub transition_pending: bool,
    pub control: ControlState,
}

impl fmt::Display for ControllerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) machine={} tunnel={} usb={} host={} [{}]",
            self.machine_name,
            self.machine_id,
            self.machine_state,
            self.tunnel,
            self.service,
            self.hostname.as_deref().unwrap_or("-"),
            self.control,
        )
    }
}
